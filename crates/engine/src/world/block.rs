/// Global block-state id. The engine stores these without interpreting them;
/// a registry above it maps ids to block names and property values.
///
/// The only semantic the engine enforces is that `StateId::AIR` (0) is the
/// empty block: sections count every other id as solid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct StateId(pub u32);

impl StateId {
    pub const AIR: StateId = StateId(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl From<u32> for StateId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Global biome id. Fresh columns hold biome 0 everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct BiomeId(pub u32);

impl BiomeId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl From<u32> for BiomeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}
