/// Side length of a region in chunks.
pub const REGION_SIZE: i32 = 32;

/// Absolute block position in the world. `y` is world Y and may be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The chunk column this block belongs to.
    pub const fn chunk(&self) -> ChunkPos {
        ChunkPos {
            x: self.x >> 4,
            z: self.z >> 4,
        }
    }

    /// Position within the column (x, z in 0..16, y unchanged).
    pub const fn local(&self) -> LocalBlockPos {
        LocalBlockPos {
            x: (self.x & 0xF) as u8,
            y: self.y,
            z: (self.z & 0xF) as u8,
        }
    }
}

/// Chunk column position (each column is 16x16 blocks horizontally).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub const fn block_origin(&self, y: i32) -> BlockPos {
        BlockPos::new(self.x << 4, y, self.z << 4)
    }

    /// Region containing this column: `(x >> 5, z >> 5)`.
    pub const fn region(&self) -> (i32, i32) {
        (self.x >> 5, self.z >> 5)
    }

    /// Slot within the region, each axis in 0..32.
    pub const fn region_local(&self) -> (usize, usize) {
        (
            self.x.rem_euclid(REGION_SIZE) as usize,
            self.z.rem_euclid(REGION_SIZE) as usize,
        )
    }
}

impl std::fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Block position local to a column (x, z in 0..16, y in world coordinates).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalBlockPos {
    pub x: u8,
    pub y: i32,
    pub z: u8,
}

impl LocalBlockPos {
    pub const fn new(x: u8, y: i32, z: u8) -> Self {
        Self { x, y, z }
    }

    pub const fn section_local_y(&self) -> u8 {
        self.y.rem_euclid(16) as u8
    }

    /// Back to world coordinates for the column at `chunk`.
    pub const fn to_world(&self, chunk: ChunkPos) -> BlockPos {
        BlockPos::new((chunk.x << 4) | self.x as i32, self.y, (chunk.z << 4) | self.z as i32)
    }
}
