//! Resource archive access: walks a companion `.files.zip` and extracts
//! single entries.
//!
//! Only the structures the engine needs are parsed: the end-of-central-
//! directory record to find the central directory, central entries for
//! indexing, and local headers for extraction. Stored and deflated
//! entries are supported.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::DeflateDecoder;
use log::{debug, warn};

use super::btree::IndexedWords;
use super::error::{DslError, Result};

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const CENTRAL_SIGNATURE: u32 = 0x0201_4b50;
const LOCAL_SIGNATURE: u32 = 0x0403_4b50;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;

pub struct IndexedZip {
    file: File,
}

impl IndexedZip {
    pub fn open(path: &Path) -> Result<IndexedZip> {
        let file = File::open(path)?;
        Ok(IndexedZip { file })
    }

    /// Walk the central directory and add every entry name (folded) to
    /// `words`, mapping it to the entry's local-header offset. Returns the
    /// number of entries indexed.
    pub fn index_entries(&mut self, words: &mut IndexedWords) -> Result<usize> {
        let (dir_offset, entry_count) = self.find_central_directory()?;
        self.file.seek(SeekFrom::Start(dir_offset))?;

        let mut indexed = 0usize;
        for _ in 0..entry_count {
            let signature = self.file.read_u32::<LittleEndian>()?;
            if signature != CENTRAL_SIGNATURE {
                return Err(DslError::InvalidFormat(
                    "bad central directory entry signature".to_string(),
                ));
            }
            // Skip: versions, flags, method, time, date, crc, sizes.
            self.file.seek(SeekFrom::Current(2 + 2 + 2 + 2 + 2 + 2 + 4 + 4 + 4))?;
            let name_len = self.file.read_u16::<LittleEndian>()? as usize;
            let extra_len = self.file.read_u16::<LittleEndian>()? as i64;
            let comment_len = self.file.read_u16::<LittleEndian>()? as i64;
            // Skip: disk start, internal attrs, external attrs.
            self.file.seek(SeekFrom::Current(2 + 2 + 4))?;
            let local_offset = self.file.read_u32::<LittleEndian>()?;

            let mut name_bytes = vec![0u8; name_len];
            self.file.read_exact(&mut name_bytes)?;
            self.file.seek(SeekFrom::Current(extra_len + comment_len))?;

            let name = String::from_utf8_lossy(&name_bytes).replace('\\', "/");
            if name.ends_with('/') {
                continue; // Directory entry.
            }
            words.add_single_word(&name, local_offset);
            indexed += 1;
        }
        debug!("Indexed {} zip entries", indexed);
        Ok(indexed)
    }

    /// Extract the entry whose local header starts at `local_offset`.
    pub fn load_file_at(&mut self, local_offset: u32) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(local_offset as u64))?;
        let signature = self.file.read_u32::<LittleEndian>()?;
        if signature != LOCAL_SIGNATURE {
            return Err(DslError::InvalidFormat(
                "bad local file header signature".to_string(),
            ));
        }
        self.file.seek(SeekFrom::Current(2))?; // version needed
        let flags = self.file.read_u16::<LittleEndian>()?;
        let method = self.file.read_u16::<LittleEndian>()?;
        self.file.seek(SeekFrom::Current(2 + 2 + 4))?; // time, date, crc
        let comp_size = self.file.read_u32::<LittleEndian>()? as u64;
        let uncomp_size = self.file.read_u32::<LittleEndian>()? as u64;
        let name_len = self.file.read_u16::<LittleEndian>()? as i64;
        let extra_len = self.file.read_u16::<LittleEndian>()? as i64;
        self.file.seek(SeekFrom::Current(name_len + extra_len))?;

        match method {
            METHOD_STORED => {
                if comp_size == 0 && flags & 0x08 != 0 {
                    return Err(DslError::InvalidFormat(
                        "stored zip entry with deferred sizes".to_string(),
                    ));
                }
                let mut data = vec![0u8; comp_size as usize];
                self.file.read_exact(&mut data)?;
                Ok(data)
            }
            METHOD_DEFLATE => {
                let mut data = Vec::with_capacity(uncomp_size as usize);
                if comp_size > 0 {
                    let mut decoder = DeflateDecoder::new((&mut self.file).take(comp_size));
                    decoder
                        .read_to_end(&mut data)
                        .map_err(|e| DslError::Decompress(format!("zip entry: {}", e)))?;
                } else {
                    // Deferred sizes: inflate until the deflate stream ends.
                    let mut decoder = DeflateDecoder::new(&mut self.file);
                    decoder
                        .read_to_end(&mut data)
                        .map_err(|e| DslError::Decompress(format!("zip entry: {}", e)))?;
                }
                Ok(data)
            }
            other => Err(DslError::Decompress(format!(
                "unsupported zip compression method {}",
                other
            ))),
        }
    }

    /// Locate the end-of-central-directory record by scanning backwards
    /// over the trailing comment area.
    fn find_central_directory(&mut self) -> Result<(u64, usize)> {
        let file_len = self.file.metadata()?.len();
        // EOCD is 22 bytes plus up to 65535 bytes of comment.
        let scan_len = file_len.min(22 + 65535);
        let scan_start = file_len - scan_len;
        self.file.seek(SeekFrom::Start(scan_start))?;
        let mut tail = vec![0u8; scan_len as usize];
        self.file.read_exact(&mut tail)?;

        let mut pos = tail.len().checked_sub(22).ok_or_else(|| {
            DslError::InvalidFormat("file too small to be a zip archive".to_string())
        })?;
        loop {
            if u32::from_le_bytes([tail[pos], tail[pos + 1], tail[pos + 2], tail[pos + 3]])
                == EOCD_SIGNATURE
            {
                let mut reader = &tail[pos + 4..];
                let _disk = reader.read_u16::<LittleEndian>()?;
                let _dir_disk = reader.read_u16::<LittleEndian>()?;
                let _disk_entries = reader.read_u16::<LittleEndian>()?;
                let total_entries = reader.read_u16::<LittleEndian>()? as usize;
                let _dir_size = reader.read_u32::<LittleEndian>()?;
                let dir_offset = reader.read_u32::<LittleEndian>()? as u64;
                return Ok((dir_offset, total_entries));
            }
            if pos == 0 {
                warn!("No end-of-central-directory record found");
                return Err(DslError::InvalidFormat(
                    "not a zip archive: end record missing".to_string(),
                ));
            }
            pos -= 1;
        }
    }
}
