/// Reports whether the current process may write under elevated namespaces.
pub trait ElevationProvider: Send + Sync {
    fn is_elevated(&self) -> bool;
}

/// Fixed answer, taken from configuration or a command-line flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StaticElevation(pub bool);

impl StaticElevation {
    pub fn elevated() -> Self {
        Self(true)
    }

    pub fn unelevated() -> Self {
        Self(false)
    }
}

impl ElevationProvider for StaticElevation {
    fn is_elevated(&self) -> bool {
        self.0
    }
}
