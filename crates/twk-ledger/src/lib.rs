//! Mutation ledger for twk.
//!
//! Before twk writes to any store address it records the value that was
//! there (a *pre-image*). The ledger holds at most one pre-image per address:
//! the first capture is authoritative until the entry is cleared by a
//! successful restore. This crate provides:
//!
//! - [`LedgerEntry`] -- one captured pre-image
//! - [`LedgerCodec`] -- the versioned, CRC-32 checksummed line format
//! - [`LedgerFile`] -- atomic write-through persistence (temp sibling + rename)
//! - [`MutationLedger`] -- capture, lookup, restore, and bulk restore
//!
//! Loading never fails hard: a missing file is an empty ledger, and a file
//! that fails its integrity check is logged and ignored.

pub mod codec;
pub mod entry;
pub mod error;
pub mod file;
pub mod ledger;

pub use codec::{LedgerCodec, FORMAT_V1, FORMAT_V2};
pub use entry::LedgerEntry;
pub use error::{LedgerError, Result};
pub use file::LedgerFile;
pub use ledger::{MutationLedger, RestoreReport};
