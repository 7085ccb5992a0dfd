//! Line-oriented ledger encoding.
//!
//! On-disk format (one field per line, `\n` terminated):
//!
//! ```text
//! VAX_BACKUP_V2
//! <entry count>
//! <root tag>        \
//! <path>             |
//! <value name>       | repeated <entry count> times
//! <kind tag>         |
//! <hex bytes>        |
//! <1|0 existed>     /
//! CRC32:<8 lowercase hex digits over every preceding byte>
//! ```
//!
//! `VAX_BACKUP_V1` files carry no checksum and are read without verification.
//! A checksum trailer, when present, is always verified.

use std::borrow::Cow;

use twk_types::{Address, RootNamespace, ValueKind};

use crate::entry::LedgerEntry;
use crate::error::{LedgerError, Result};

/// Current, checksummed format tag.
pub const FORMAT_V2: &str = "VAX_BACKUP_V2";
/// Legacy format tag without a checksum trailer.
pub const FORMAT_V1: &str = "VAX_BACKUP_V1";

const CRC_PREFIX: &str = "CRC32:";
const FIELDS_PER_ENTRY: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Version {
    V1,
    V2,
}

/// Encoder/decoder for the ledger file format.
pub struct LedgerCodec;

impl LedgerCodec {
    /// Encode entries into the header, count, and entry lines.
    pub fn encode_body(entries: &[LedgerEntry]) -> String {
        let mut body = String::new();
        body.push_str(FORMAT_V2);
        body.push('\n');
        body.push_str(&entries.len().to_string());
        body.push('\n');
        for entry in entries {
            let kind_tag = entry.kind.map_or(ValueKind::ABSENT_TAG, ValueKind::tag);
            body.push_str(entry.address.root.tag());
            body.push('\n');
            body.push_str(&entry.address.path);
            body.push('\n');
            body.push_str(&entry.address.name);
            body.push('\n');
            body.push_str(&kind_tag.to_string());
            body.push('\n');
            body.push_str(&hex::encode(&entry.data));
            body.push('\n');
            body.push_str(if entry.existed { "1" } else { "0" });
            body.push('\n');
        }
        body
    }

    /// Encode entries into the complete file content, checksum trailer included.
    pub fn encode(entries: &[LedgerEntry]) -> String {
        let mut content = Self::encode_body(entries);
        let crc = crc32fast::hash(content.as_bytes());
        content.push_str(&format!("{CRC_PREFIX}{crc:08x}\n"));
        content
    }

    /// Decode raw file bytes.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Vec<LedgerEntry>> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| LedgerError::Integrity(format!("ledger is not valid UTF-8: {e}")))?;
        Self::decode(text)
    }

    /// Decode file content, verifying the checksum trailer.
    ///
    /// Empty content decodes to an empty ledger.
    pub fn decode(content: &str) -> Result<Vec<LedgerEntry>> {
        let content: Cow<'_, str> = if content.contains("\r\n") {
            Cow::Owned(content.replace("\r\n", "\n"))
        } else {
            Cow::Borrowed(content)
        };
        if content.is_empty() {
            return Ok(Vec::new());
        }

        let header = content.lines().next().unwrap_or_default();
        let version = match header {
            FORMAT_V2 => Version::V2,
            FORMAT_V1 => Version::V1,
            other => return Err(LedgerError::UnsupportedVersion(other.to_string())),
        };

        let body = match split_trailer(&content) {
            Some((body, checksum)) => {
                verify_checksum(body, checksum)?;
                body
            }
            None if version == Version::V2 => {
                return Err(LedgerError::Integrity(
                    "checksum trailer missing; file may be tampered".into(),
                ));
            }
            None => content.as_ref(),
        };

        parse_entries(body)
    }
}

/// Split `content` into the checksummed body and the checksum text.
fn split_trailer(content: &str) -> Option<(&str, &str)> {
    let pos = content.rfind(&format!("\n{CRC_PREFIX}"))?;
    let body = &content[..=pos];
    let checksum = content[pos + 1 + CRC_PREFIX.len()..].trim_end_matches('\n');
    Some((body, checksum))
}

fn verify_checksum(body: &str, checksum: &str) -> Result<()> {
    if checksum.is_empty()
        || checksum.len() > 8
        || !checksum.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return Err(LedgerError::Integrity(format!(
            "invalid checksum format {checksum:?}"
        )));
    }
    let expected = u32::from_str_radix(checksum, 16)
        .map_err(|e| LedgerError::Integrity(format!("invalid checksum: {e}")))?;
    let actual = crc32fast::hash(body.as_bytes());
    if actual != expected {
        return Err(LedgerError::Integrity(format!(
            "checksum mismatch: expected {expected:08x}, computed {actual:08x}"
        )));
    }
    Ok(())
}

fn parse_entries(body: &str) -> Result<Vec<LedgerEntry>> {
    let mut lines = body.lines().enumerate().skip(1);

    let (count_line, count_text) = lines.next().ok_or_else(|| LedgerError::Malformed {
        line: 2,
        reason: "missing entry count".into(),
    })?;
    let count: usize = count_text.parse().map_err(|_| LedgerError::Malformed {
        line: count_line + 1,
        reason: format!("invalid entry count {count_text:?}"),
    })?;

    let mut entries = Vec::new();
    for index in 0..count {
        let mut fields = [""; FIELDS_PER_ENTRY];
        let mut first_line = 0;
        for (slot, field) in fields.iter_mut().enumerate() {
            let (line_no, text) = lines.next().ok_or_else(|| LedgerError::Malformed {
                line: count_line + 2 + index * FIELDS_PER_ENTRY + slot,
                reason: format!("truncated entry {index} of {count}"),
            })?;
            if slot == 0 {
                first_line = line_no + 1;
            }
            *field = text;
        }
        entries.push(parse_entry(first_line, fields)?);
    }
    Ok(entries)
}

fn parse_entry(line: usize, fields: [&str; FIELDS_PER_ENTRY]) -> Result<LedgerEntry> {
    let [root_tag, path, name, kind_tag, hex_data, existed] = fields;
    let malformed = |offset: usize, reason: String| LedgerError::Malformed {
        line: line + offset,
        reason,
    };

    let root = RootNamespace::from_tag(root_tag)
        .ok_or_else(|| malformed(0, format!("unknown root namespace {root_tag:?}")))?;
    let tag: u32 = kind_tag
        .parse()
        .map_err(|_| malformed(3, format!("invalid kind tag {kind_tag:?}")))?;
    let kind = match tag {
        ValueKind::ABSENT_TAG => None,
        other => Some(ValueKind::from_tag(other).map_err(|e| malformed(3, e.to_string()))?),
    };
    let data = hex::decode(hex_data).map_err(|e| malformed(4, format!("invalid hex: {e}")))?;
    let existed = match existed {
        "1" => true,
        "0" => false,
        other => return Err(malformed(5, format!("invalid existed flag {other:?}"))),
    };
    if existed && kind.is_none() {
        return Err(malformed(3, "existing value recorded without a kind".into()));
    }

    Ok(LedgerEntry {
        address: Address::new(root, path, name),
        existed,
        kind,
        data,
    })
}
