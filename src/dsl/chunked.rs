//! Chunked storage: an append-only block writer and a random-access block
//! reader over the index file.
//!
//! Each block is written as `(size: u32, bytes)`. A block id is the
//! absolute file offset of the block's first payload byte, so the reader
//! finds the size prefix four bytes earlier.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::error::{DslError, Result};

/// Append-only writer. One block is buffered at a time and flushed when
/// the next block starts or the writer finishes, so block ids are known
/// up front.
pub struct ChunkWriter<'a> {
    file: &'a mut File,
    region_start: Option<u64>,
    current: Vec<u8>,
    /// Id (payload offset) of the buffered block, if any.
    current_id: Option<u32>,
    next_offset: u64,
}

impl<'a> ChunkWriter<'a> {
    pub fn new(file: &'a mut File) -> Result<ChunkWriter<'a>> {
        let pos = file.stream_position()?;
        Ok(ChunkWriter {
            file,
            region_start: None,
            current: Vec::new(),
            current_id: None,
            next_offset: pos,
        })
    }

    /// Begin a new block and return its id.
    pub fn start_new_block(&mut self) -> Result<u32> {
        self.flush_current()?;
        if self.region_start.is_none() {
            self.region_start = Some(self.next_offset);
        }
        let id = self.next_offset + 4;
        if id > u32::MAX as u64 {
            return Err(DslError::InvalidFormat(
                "index file exceeds the 4 GiB chunk address space".to_string(),
            ));
        }
        self.current_id = Some(id as u32);
        Ok(id as u32)
    }

    /// Append bytes to the block opened by the last `start_new_block`.
    pub fn add_to_block(&mut self, bytes: &[u8]) {
        debug_assert!(self.current_id.is_some(), "no open block");
        self.current.extend_from_slice(bytes);
    }

    /// Flush the last block and return the file offset of the chunk region.
    pub fn finish(mut self) -> Result<u32> {
        self.flush_current()?;
        let start = self.region_start.unwrap_or(self.next_offset);
        Ok(start as u32)
    }

    fn flush_current(&mut self) -> Result<()> {
        if self.current_id.is_none() {
            return Ok(());
        }
        self.file.write_u32::<LittleEndian>(self.current.len() as u32)?;
        self.file.write_all(&self.current)?;
        self.next_offset += 4 + self.current.len() as u64;
        self.current.clear();
        self.current_id = None;
        Ok(())
    }
}

/// Random-access reader over the chunk region of an opened index file.
/// Concurrent use is serialized by the caller (the per-dictionary index
/// mutex).
pub struct ChunkReader;

impl ChunkReader {
    pub fn get_block(file: &mut File, block_id: u32) -> Result<Vec<u8>> {
        if block_id < 4 {
            return Err(DslError::InvalidFormat(format!(
                "bad chunk block id {}",
                block_id
            )));
        }
        file.seek(SeekFrom::Start(block_id as u64 - 4))?;
        let size = file.read_u32::<LittleEndian>()?;
        let mut buf = vec![0u8; size as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"header..").unwrap();

        let mut writer = ChunkWriter::new(&mut file).unwrap();
        let first = writer.start_new_block().unwrap();
        writer.add_to_block(b"alpha");
        writer.add_to_block(b"-beta");
        let second = writer.start_new_block().unwrap();
        writer.add_to_block(&7u32.to_le_bytes());
        let region = writer.finish().unwrap();
        drop(file);

        assert_eq!(region, 8);
        assert_eq!(first, 12);
        // Second block starts after (4 + 10) bytes of the first.
        assert_eq!(second, first + 10 + 4);

        let mut file = File::open(&path).unwrap();
        assert_eq!(ChunkReader::get_block(&mut file, first).unwrap(), b"alpha-beta");
        assert_eq!(
            ChunkReader::get_block(&mut file, second).unwrap(),
            7u32.to_le_bytes()
        );
    }

    #[test]
    fn empty_writer_reports_current_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx");
        let mut file = File::create(&path).unwrap();
        file.write_all(&[0u8; 16]).unwrap();
        let writer = ChunkWriter::new(&mut file).unwrap();
        assert_eq!(writer.finish().unwrap(), 16);
    }
}
