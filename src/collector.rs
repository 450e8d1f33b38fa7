//! Host-side collector: persisting received blocks
//!
//! The downstream collector sees each node's block as a byte stream: one
//! bulk chunk for SPI, byte pairs for UART, single bytes for the two-wire
//! bus. [`BlockAssembler`] regroups the stream into whole blocks and
//! [`BlockWriter`] persists each one as a flat file of little-endian 16-bit
//! values, named to avoid collisions across blocks and sources.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

/// Writes one flat file per completed block.
pub struct BlockWriter {
    dir: PathBuf,
    source: String,
    seq: u64,
}

impl BlockWriter {
    /// Collector output under `dir` for blocks arriving from `source`
    /// (typically the node name). Creates the directory if needed.
    pub fn new(dir: impl Into<PathBuf>, source: impl Into<String>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            source: source.into(),
            seq: 0,
        })
    }

    /// Persist one block, returning the path written.
    ///
    /// Names carry the source, a per-writer sequence number, and a
    /// millisecond timestamp, so concurrent writers for different nodes
    /// never collide.
    pub fn write_block(&mut self, bytes: &[u8]) -> io::Result<PathBuf> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let path = self
            .dir
            .join(format!("{}_{:06}_{}.bin", self.source, self.seq, millis));
        fs::write(&path, bytes)?;
        self.seq += 1;
        debug!(
            "[{}] wrote block {} ({} bytes) to {}",
            self.source,
            self.seq,
            bytes.len(),
            path.display()
        );
        Ok(path)
    }
}

/// Regroups a transport byte stream into fixed-size blocks and hands each
/// completed block to a [`BlockWriter`].
pub struct BlockAssembler {
    writer: BlockWriter,
    block_bytes: usize,
    pending: Vec<u8>,
}

impl BlockAssembler {
    /// `capacity` is the node's buffer capacity in samples; a block is
    /// complete after `capacity * 2` bytes.
    pub fn new(writer: BlockWriter, capacity: usize) -> Self {
        Self {
            writer,
            block_bytes: capacity * 2,
            pending: Vec::with_capacity(capacity * 2),
        }
    }

    /// Feed one received chunk; returns the paths of any blocks completed
    /// by it.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> io::Result<Vec<PathBuf>> {
        self.pending.extend_from_slice(chunk);
        let mut written = Vec::new();
        while self.pending.len() >= self.block_bytes {
            let rest = self.pending.split_off(self.block_bytes);
            let block = std::mem::replace(&mut self.pending, rest);
            let path = self.writer.write_block(&block)?;
            info!("block complete: {}", path.display());
            written.push(path);
        }
        Ok(written)
    }

    /// Bytes received toward the next block.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }
}

/// Decode a persisted block file back into samples (little-endian u16, as
/// written by [`BlockWriter`]).
pub fn read_block(path: impl AsRef<Path>) -> io::Result<Vec<u16>> {
    let bytes = fs::read(path)?;
    if bytes.len() % 2 != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "block file has an odd byte count",
        ));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = BlockWriter::new(dir.path(), "node-0").unwrap();

        let samples = [10u16, 11, 12, 13];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let path = writer.write_block(&bytes).unwrap();

        assert_eq!(read_block(&path).unwrap(), samples);
    }

    #[test]
    fn sequential_blocks_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = BlockWriter::new(dir.path(), "node-1").unwrap();

        let first = writer.write_block(&[1, 0]).unwrap();
        let second = writer.write_block(&[2, 0]).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn assembler_regroups_chunked_streams() {
        let dir = tempfile::tempdir().unwrap();
        let writer = BlockWriter::new(dir.path(), "node-0").unwrap();
        // capacity 2 -> 4 bytes per block
        let mut assembler = BlockAssembler::new(writer, 2);

        // UART-style byte pairs across a block boundary.
        assert!(assembler.push_chunk(&[0x0A, 0x00]).unwrap().is_empty());
        let done = assembler.push_chunk(&[0x0B, 0x00, 0x0C, 0x00]).unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(assembler.pending_bytes(), 2);
        assert_eq!(read_block(&done[0]).unwrap(), vec![0x0A, 0x0B]);
    }

    #[test]
    fn assembler_handles_bulk_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let writer = BlockWriter::new(dir.path(), "node-0").unwrap();
        let mut assembler = BlockAssembler::new(writer, 2);

        // SPI-style: two whole blocks in one chunk.
        let done = assembler
            .push_chunk(&[1, 0, 2, 0, 3, 0, 4, 0])
            .unwrap();
        assert_eq!(done.len(), 2);
        assert_eq!(read_block(&done[0]).unwrap(), vec![1, 2]);
        assert_eq!(read_block(&done[1]).unwrap(), vec![3, 4]);
    }

    #[test]
    fn read_block_rejects_odd_length_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        fs::write(&path, [1u8, 2, 3]).unwrap();
        assert!(read_block(&path).is_err());
    }
}
