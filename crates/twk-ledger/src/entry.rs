use twk_types::{Address, RawValue, ValueKind};

/// The captured pre-image of one address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerEntry {
    pub address: Address,
    /// Whether a value existed at capture time.
    pub existed: bool,
    /// Kind of the captured value; `None` when nothing existed.
    pub kind: Option<ValueKind>,
    /// Raw bytes at capture time; empty when nothing existed.
    pub data: Vec<u8>,
}

impl LedgerEntry {
    /// Pre-image of an address that held no value.
    pub fn absent(address: Address) -> Self {
        Self {
            address,
            existed: false,
            kind: None,
            data: Vec::new(),
        }
    }

    /// Pre-image of an address holding `value`.
    pub fn present(address: Address, value: RawValue) -> Self {
        Self {
            address,
            existed: true,
            kind: Some(value.kind),
            data: value.data,
        }
    }

    /// Build from the result of a raw read.
    pub fn capture(address: Address, value: Option<RawValue>) -> Self {
        match value {
            Some(v) => Self::present(address, v),
            None => Self::absent(address),
        }
    }

    /// The value to write back on restore, or `None` if restore means delete.
    pub fn raw_value(&self) -> Option<RawValue> {
        if !self.existed {
            return None;
        }
        self.kind.map(|kind| RawValue::new(kind, self.data.clone()))
    }
}
