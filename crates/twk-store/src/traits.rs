use twk_types::{Address, RawValue};

use crate::error::StoreResult;

/// Hierarchical key-value store holding the values tweaks mutate.
///
/// Implementations provide the three raw operations; the typed helpers are
/// derived from them. All implementations must satisfy these invariants:
/// - `read_raw` returns `Ok(None)` for a missing value.
/// - `write_raw` creates intermediate keys as needed.
/// - `delete` of a missing value returns `Err(StoreError::NotFound)`.
pub trait ValueStore: Send + Sync {
    /// Read a value with its kind and raw bytes.
    fn read_raw(&self, address: &Address) -> StoreResult<Option<RawValue>>;

    /// Create or overwrite a value.
    fn write_raw(&self, address: &Address, value: &RawValue) -> StoreResult<()>;

    /// Delete a value.
    fn delete(&self, address: &Address) -> StoreResult<()>;

    /// Read an integer value. Absent or another kind reads as `None`.
    fn read_integer(&self, address: &Address) -> StoreResult<Option<u32>> {
        Ok(self.read_raw(address)?.and_then(|v| v.as_integer()))
    }

    /// Read a text value. Absent or another kind reads as `None`.
    fn read_text(&self, address: &Address) -> StoreResult<Option<String>> {
        Ok(self.read_raw(address)?.and_then(|v| v.as_text()))
    }

    /// Read a binary value. Absent or another kind reads as `None`.
    fn read_binary(&self, address: &Address) -> StoreResult<Option<Vec<u8>>> {
        Ok(self
            .read_raw(address)?
            .and_then(|v| v.as_binary().map(<[u8]>::to_vec)))
    }

    fn write_integer(&self, address: &Address, value: u32) -> StoreResult<()> {
        self.write_raw(address, &RawValue::integer(value))
    }

    fn write_text(&self, address: &Address, value: &str) -> StoreResult<()> {
        self.write_raw(address, &RawValue::text(value))
    }

    fn write_binary(&self, address: &Address, value: &[u8]) -> StoreResult<()> {
        self.write_raw(address, &RawValue::binary(value.to_vec()))
    }
}
