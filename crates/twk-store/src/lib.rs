//! Value store contract for twk.
//!
//! The host's configuration database is an external collaborator. twk only
//! depends on the [`ValueStore`] trait: raw and typed reads, writes, and
//! deletes of values addressed by [`Address`](twk_types::Address).
//!
//! # Backends
//!
//! - [`InMemoryValueStore`] -- `HashMap`-based store for tests, with hooks to
//!   simulate protected values and a non-elevated caller
//! - [`JsonFileValueStore`] -- in-memory store mirrored to a JSON document,
//!   used as a sandbox stand-in for the host store
//!
//! # Contract
//!
//! 1. A missing value reads as `Ok(None)`, never as an error.
//! 2. A typed read of a value of another kind reads as `Ok(None)`.
//! 3. Deleting a missing value fails with [`StoreError::NotFound`].
//! 4. Write failures carry enough detail to tell access-denied from the rest.

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::JsonFileValueStore;
pub use memory::InMemoryValueStore;
pub use traits::ValueStore;
