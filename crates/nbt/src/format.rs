/// Wire variant of the binary encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NbtFormat {
    /// Big-endian fixed-width integers (Java edition files and protocol).
    Big,
    /// Little-endian fixed-width integers (Bedrock edition files).
    Little,
    /// Little-endian with zigzag varint ints/longs and varint lengths
    /// (Bedrock network protocol).
    LittleVarint,
}

impl NbtFormat {
    /// Order in which [`crate::parse`] tries the variants.
    pub const ALL: [NbtFormat; 3] = [NbtFormat::Big, NbtFormat::Little, NbtFormat::LittleVarint];
}
