//! Anvil region files (`r.<x>.<z>.mca`).
//!
//! A region holds the 32x32 chunks of one region square. The file starts
//! with two 4096-byte header sectors:
//!
//! - an offset table of 1024 big-endian entries: the top 24 bits give the
//!   first sector of the chunk, the low 8 bits how many sectors it spans;
//! - a timestamp table of 1024 big-endian unix-second entries.
//!
//! Each chunk payload starts at a sector boundary with a 4-byte big-endian
//! length (counting the version byte), a 1-byte compression version and the
//! compressed NBT.
//!
//! Space is handed out first-fit from an occupancy bitmap and the file grows
//! by appending when nothing fits. The file is never compacted.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use strata_nbt::compression::{gunzip, inflate, zlib};
use strata_nbt::{NbtError, NbtFormat, Root, parse_uncompressed, write_uncompressed};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

pub const SECTOR_BYTES: usize = 4096;
/// Chunks along each side of a region.
pub const REGION_WIDTH: usize = 32;
const CHUNKS_PER_REGION: usize = REGION_WIDTH * REGION_WIDTH;
const HEADER_SECTORS: usize = 2;
/// Length field plus version byte.
const CHUNK_HEADER_BYTES: usize = 5;
/// The sector count is stored in 8 bits.
const MAX_CHUNK_SECTORS: usize = 255;

const VERSION_GZIP: u8 = 1;
const VERSION_DEFLATE: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    #[error("region file I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("chunk payload: {0}")]
    Nbt(#[from] NbtError),
    #[error("unknown chunk compression version {0}")]
    UnknownCompression(u8),
    #[error("chunk needs {sectors} sectors, at most {MAX_CHUNK_SECTORS} fit in a region entry")]
    ChunkTooLarge { sectors: usize },
    #[error("region-local chunk ({x}, {z}) is outside 0..32")]
    OutOfBounds { x: usize, z: usize },
}

/// One open region file with its header mirrored in memory.
///
/// Access must be serialised per file: every method that touches the header
/// takes `&mut self`. `close` consumes the handle.
#[derive(Debug)]
pub struct RegionFile {
    path: PathBuf,
    file: File,
    offsets: Vec<u32>,
    timestamps: Vec<u32>,
    /// One entry per sector in the file; `true` when unused.
    sector_free: Vec<bool>,
}

impl RegionFile {
    /// Opens or creates a region file, padding it to whole sectors and to at
    /// least the two header sectors. Header entries that point outside the
    /// file are kept but claim no sectors; reads of them report absence.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RegionError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;

        let mut len = file.metadata().await?.len() as usize;
        if len < HEADER_SECTORS * SECTOR_BYTES {
            len = HEADER_SECTORS * SECTOR_BYTES;
            file.set_len(len as u64).await?;
        } else if len % SECTOR_BYTES != 0 {
            len = len.next_multiple_of(SECTOR_BYTES);
            file.set_len(len as u64).await?;
        }

        let mut header = vec![0u8; HEADER_SECTORS * SECTOR_BYTES];
        file.seek(SeekFrom::Start(0)).await?;
        file.read_exact(&mut header).await?;

        let entry = |i: usize| {
            u32::from_be_bytes([header[i * 4], header[i * 4 + 1], header[i * 4 + 2], header[i * 4 + 3]])
        };
        let offsets: Vec<u32> = (0..CHUNKS_PER_REGION).map(entry).collect();
        let timestamps: Vec<u32> = (CHUNKS_PER_REGION..2 * CHUNKS_PER_REGION).map(entry).collect();

        let sector_count = len / SECTOR_BYTES;
        let mut sector_free = vec![true; sector_count];
        sector_free[0] = false;
        sector_free[1] = false;

        let mut chunks = 0usize;
        for (i, &offset) in offsets.iter().enumerate() {
            if offset == 0 {
                continue;
            }
            let (start, count) = split_offset(offset);
            if start < HEADER_SECTORS || start + count > sector_count {
                tracing::warn!(
                    "{}: chunk slot {} points at sectors {}..{} outside the file, ignoring",
                    path.display(),
                    i,
                    start,
                    start + count,
                );
                continue;
            }
            sector_free[start..start + count].fill(false);
            chunks += 1;
        }

        tracing::debug!(
            "Opened region {} ({} sectors, {} chunks)",
            path.display(),
            sector_count,
            chunks,
        );

        Ok(Self {
            path,
            file,
            offsets,
            timestamps,
            sector_free,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sectors currently tracked, header included.
    pub fn sector_count(&self) -> usize {
        self.sector_free.len()
    }

    pub fn has_chunk(&self, x: usize, z: usize) -> bool {
        slot(x, z).is_ok_and(|i| self.offsets[i] != 0)
    }

    /// Unix seconds of the last write to the slot, 0 if never written.
    pub fn timestamp(&self, x: usize, z: usize) -> u32 {
        slot(x, z).map_or(0, |i| self.timestamps[i])
    }

    /// Number of occupied slots.
    pub fn chunk_count(&self) -> usize {
        self.offsets.iter().filter(|&&offset| offset != 0).count()
    }

    /// Region-local coordinates of every occupied slot.
    pub fn chunks(&self) -> Vec<(usize, usize)> {
        (0..CHUNKS_PER_REGION)
            .filter(|&i| self.offsets[i] != 0)
            .map(|i| (i % REGION_WIDTH, i / REGION_WIDTH))
            .collect()
    }

    /// Reads and decompresses a chunk payload. `None` when the slot is empty
    /// or its header entry or length prefix cannot describe a valid payload.
    pub async fn read_chunk_bytes(&mut self, x: usize, z: usize) -> Result<Option<Vec<u8>>, RegionError> {
        let offset = self.offsets[slot(x, z)?];
        if offset == 0 {
            return Ok(None);
        }
        let (start, count) = split_offset(offset);
        if start < HEADER_SECTORS || start + count > self.sector_free.len() {
            tracing::warn!(
                "{}: chunk ({}, {}) sector run {}+{} is outside the file",
                self.path.display(),
                x,
                z,
                start,
                count,
            );
            return Ok(None);
        }

        self.file
            .seek(SeekFrom::Start((start * SECTOR_BYTES) as u64))
            .await?;
        let mut header = [0u8; CHUNK_HEADER_BYTES];
        self.file.read_exact(&mut header).await?;
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let version = header[4];

        if length <= 1 || length + 4 > count * SECTOR_BYTES {
            tracing::warn!(
                "{}: chunk ({}, {}) has bad length {} for {} sectors",
                self.path.display(),
                x,
                z,
                length,
                count,
            );
            return Ok(None);
        }

        let mut compressed = vec![0u8; length - 1];
        self.file.read_exact(&mut compressed).await?;

        let data = match version {
            VERSION_GZIP => gunzip(&compressed)?,
            VERSION_DEFLATE => inflate(&compressed)?,
            other => return Err(RegionError::UnknownCompression(other)),
        };
        Ok(Some(data))
    }

    /// Reads a chunk and parses it as big-endian NBT.
    pub async fn read_chunk(&mut self, x: usize, z: usize) -> Result<Option<Root>, RegionError> {
        match self.read_chunk_bytes(x, z).await? {
            Some(data) => Ok(Some(parse_uncompressed(&data, NbtFormat::Big)?)),
            None => Ok(None),
        }
    }

    /// Serialises `root` as big-endian NBT and stores it in the slot.
    pub async fn write_chunk(&mut self, x: usize, z: usize, root: &Root) -> Result<(), RegionError> {
        let data = write_uncompressed(root, NbtFormat::Big)?;
        self.write_chunk_bytes(x, z, &data).await
    }

    /// Compresses an uncompressed NBT payload with zlib and stores it in
    /// the slot.
    ///
    /// Placement: the current run if its sector count matches exactly, else
    /// the first free run that fits, else new sectors at the end of the file.
    pub async fn write_chunk_bytes(&mut self, x: usize, z: usize, data: &[u8]) -> Result<(), RegionError> {
        let index = slot(x, z)?;
        let compressed = zlib(data)?;
        let length = compressed.len() + 1;
        let needed = (length + CHUNK_HEADER_BYTES) / SECTOR_BYTES + 1;
        if needed > MAX_CHUNK_SECTORS {
            return Err(RegionError::ChunkTooLarge { sectors: needed });
        }

        let (old_start, old_count) = split_offset(self.offsets[index]);
        let old_valid = self.offsets[index] != 0
            && old_start >= HEADER_SECTORS
            && old_start + old_count <= self.sector_free.len();

        let start = if old_valid && old_count == needed {
            old_start
        } else {
            if old_valid {
                self.sector_free[old_start..old_start + old_count].fill(true);
            }
            let start = match self.find_free_run(needed) {
                Some(start) => start,
                None => {
                    let start = self.sector_free.len();
                    self.sector_free.resize(start + needed, true);
                    tracing::debug!(
                        "{}: growing to {} sectors",
                        self.path.display(),
                        self.sector_free.len(),
                    );
                    start
                }
            };
            self.sector_free[start..start + needed].fill(false);
            start
        };

        let mut payload = Vec::with_capacity(needed * SECTOR_BYTES);
        payload.extend_from_slice(&(length as u32).to_be_bytes());
        payload.push(VERSION_DEFLATE);
        payload.extend_from_slice(&compressed);
        payload.resize(needed * SECTOR_BYTES, 0);

        self.file
            .seek(SeekFrom::Start((start * SECTOR_BYTES) as u64))
            .await?;
        self.file.write_all(&payload).await?;

        if start != old_start || needed != old_count || self.offsets[index] == 0 {
            self.offsets[index] = ((start as u32) << 8) | needed as u32;
            self.write_header_entry(index, self.offsets[index]).await?;
        }
        self.timestamps[index] = unix_now();
        self.write_header_entry(CHUNKS_PER_REGION + index, self.timestamps[index])
            .await?;

        self.file.flush().await?;
        Ok(())
    }

    fn find_free_run(&self, needed: usize) -> Option<usize> {
        let mut run_start = 0;
        let mut run_len = 0;
        for (i, &free) in self.sector_free.iter().enumerate() {
            if !free {
                run_len = 0;
                continue;
            }
            if run_len == 0 {
                run_start = i;
            }
            run_len += 1;
            if run_len == needed {
                return Some(run_start);
            }
        }
        None
    }

    async fn write_header_entry(&mut self, entry: usize, value: u32) -> Result<(), RegionError> {
        self.file.seek(SeekFrom::Start((entry * 4) as u64)).await?;
        self.file.write_all(&value.to_be_bytes()).await?;
        Ok(())
    }

    /// Flushes and releases the file handle.
    pub async fn close(mut self) -> Result<(), RegionError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        tracing::debug!("Closed region {}", self.path.display());
        Ok(())
    }
}

fn slot(x: usize, z: usize) -> Result<usize, RegionError> {
    if x >= REGION_WIDTH || z >= REGION_WIDTH {
        return Err(RegionError::OutOfBounds { x, z });
    }
    Ok(x + z * REGION_WIDTH)
}

/// `(first sector, sector count)` of an offset-table entry.
fn split_offset(offset: u32) -> (usize, usize) {
    ((offset >> 8) as usize, (offset & 0xff) as usize)
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as u32)
}

/// File name of the region containing chunk `(chunk_x, chunk_z)`.
pub fn region_file_name(chunk_x: i32, chunk_z: i32) -> String {
    format!("r.{}.{}.mca", chunk_x >> 5, chunk_z >> 5)
}

/// Region coordinates parsed from an `r.<x>.<z>.mca` file name.
pub fn parse_region_file_name(name: &str) -> Option<(i32, i32)> {
    let rest = name.strip_prefix("r.")?.strip_suffix(".mca")?;
    let (x, z) = rest.split_once('.')?;
    Some((x.parse().ok()?, z.parse().ok()?))
}
