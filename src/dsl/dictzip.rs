//! Block-addressable reader over `.dsl` and `.dsl.dz` sources.
//!
//! Article offsets recorded in the index are byte offsets into the
//! *uncompressed* source. Plain files are read directly; dictzip files
//! (gzip with the `RA` random-access extra field) are read by inflating
//! only the chunks covering the requested range. A gzip file without the
//! `RA` field is inflated once into memory and served from there.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::{Decompress, FlushDecompress, Status};
use log::debug;

use super::error::{DslError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const FLG_FEXTRA: u8 = 0x04;
const FLG_FNAME: u8 = 0x08;
const FLG_FCOMMENT: u8 = 0x10;
const FLG_FHCRC: u8 = 0x02;

/// Reader yielding uncompressed byte ranges of a possibly-compressed source.
pub struct DzReader {
    file: File,
    kind: DzKind,
}

enum DzKind {
    /// Uncompressed `.dsl`.
    Plain { len: u64 },
    /// Dictzip: fixed-size chunks, each an independent raw-deflate stream.
    Dictzip {
        chunk_len: u64,
        /// File offset of each chunk's first compressed byte.
        chunk_offsets: Vec<u64>,
        /// Compressed size of each chunk.
        chunk_sizes: Vec<u64>,
    },
    /// Plain gzip without random access, fully inflated at open.
    InMemory(Vec<u8>),
}

impl DzReader {
    pub fn open(path: &Path) -> Result<DzReader> {
        let mut file = File::open(path)?;

        let mut magic = [0u8; 2];
        let is_gzip = match file.read_exact(&mut magic) {
            Ok(()) => magic == GZIP_MAGIC,
            Err(_) => false,
        };
        file.seek(SeekFrom::Start(0))?;

        if !is_gzip {
            let len = file.metadata()?.len();
            return Ok(DzReader {
                file,
                kind: DzKind::Plain { len },
            });
        }

        match parse_dictzip_header(&mut file)? {
            Some((chunk_len, chunk_sizes, data_start)) => {
                let mut chunk_offsets = Vec::with_capacity(chunk_sizes.len());
                let mut pos = data_start;
                for &size in &chunk_sizes {
                    chunk_offsets.push(pos);
                    pos += size;
                }
                debug!(
                    "dictzip source {}: {} chunks of {} bytes",
                    path.display(),
                    chunk_sizes.len(),
                    chunk_len
                );
                Ok(DzReader {
                    file,
                    kind: DzKind::Dictzip {
                        chunk_len,
                        chunk_offsets,
                        chunk_sizes,
                    },
                })
            }
            None => {
                // Ordinary gzip. No random access is possible, so inflate the
                // whole member once.
                file.seek(SeekFrom::Start(0))?;
                let mut data = Vec::new();
                flate2::read::GzDecoder::new(&mut file)
                    .read_to_end(&mut data)
                    .map_err(|e| DslError::Decompress(format!("gzip source: {}", e)))?;
                Ok(DzReader {
                    file,
                    kind: DzKind::InMemory(data),
                })
            }
        }
    }

    /// Read `size` uncompressed bytes starting at uncompressed `offset`.
    /// A range past the end is truncated, not an error.
    pub fn read(&mut self, offset: u64, size: u64) -> Result<Vec<u8>> {
        match &self.kind {
            DzKind::Plain { len } => {
                let end = (offset + size).min(*len);
                if offset >= end {
                    return Ok(Vec::new());
                }
                self.file.seek(SeekFrom::Start(offset))?;
                let mut buf = vec![0u8; (end - offset) as usize];
                self.file.read_exact(&mut buf)?;
                Ok(buf)
            }
            DzKind::InMemory(data) => {
                let start = (offset as usize).min(data.len());
                let end = ((offset + size) as usize).min(data.len());
                Ok(data[start..end].to_vec())
            }
            DzKind::Dictzip {
                chunk_len,
                chunk_offsets,
                chunk_sizes,
            } => {
                let chunk_len = *chunk_len;
                let first = (offset / chunk_len) as usize;
                let last = ((offset + size).saturating_sub(1) / chunk_len) as usize;
                if first >= chunk_offsets.len() {
                    return Ok(Vec::new());
                }
                let last = last.min(chunk_offsets.len() - 1);

                let mut plain = Vec::with_capacity(((last - first + 1) as u64 * chunk_len) as usize);
                for idx in first..=last {
                    self.file.seek(SeekFrom::Start(chunk_offsets[idx]))?;
                    let mut comp = vec![0u8; chunk_sizes[idx] as usize];
                    self.file.read_exact(&mut comp)?;
                    inflate_chunk(&comp, chunk_len as usize, &mut plain)?;
                }

                let skip = (offset - first as u64 * chunk_len) as usize;
                let start = skip.min(plain.len());
                let end = (skip + size as usize).min(plain.len());
                Ok(plain[start..end].to_vec())
            }
        }
    }

    /// Read the entire uncompressed content. Used by the scanner at build
    /// time; serve-time reads go through [`DzReader::read`].
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let total = match &self.kind {
            DzKind::Plain { len } => *len,
            DzKind::InMemory(data) => return Ok(data.clone()),
            DzKind::Dictzip {
                chunk_len,
                chunk_offsets,
                ..
            } => *chunk_len * chunk_offsets.len() as u64,
        };
        self.read(0, total)
    }
}

/// Parse a gzip header and, when the dictzip `RA` extra field is present,
/// return `(chunk_len, compressed chunk sizes, data start offset)`.
fn parse_dictzip_header(file: &mut File) -> Result<Option<(u64, Vec<u64>, u64)>> {
    let mut fixed = [0u8; 10];
    file.read_exact(&mut fixed)?;
    if fixed[0..2] != GZIP_MAGIC || fixed[2] != 8 {
        return Err(DslError::InvalidFormat("not a gzip member".to_string()));
    }
    let flags = fixed[3];

    let mut ra: Option<(u64, Vec<u64>)> = None;

    if flags & FLG_FEXTRA != 0 {
        let xlen = file.read_u16::<LittleEndian>()? as u64;
        let extra_end = file.stream_position()? + xlen;
        while file.stream_position()? + 4 <= extra_end {
            let mut si = [0u8; 2];
            file.read_exact(&mut si)?;
            let sublen = file.read_u16::<LittleEndian>()? as u64;
            if &si == b"RA" {
                let _version = file.read_u16::<LittleEndian>()?;
                let chunk_len = file.read_u16::<LittleEndian>()? as u64;
                let chunk_count = file.read_u16::<LittleEndian>()? as usize;
                let mut sizes = Vec::with_capacity(chunk_count);
                for _ in 0..chunk_count {
                    sizes.push(file.read_u16::<LittleEndian>()? as u64);
                }
                ra = Some((chunk_len, sizes));
            } else {
                file.seek(SeekFrom::Current(sublen as i64))?;
            }
        }
        file.seek(SeekFrom::Start(extra_end))?;
    }

    if flags & FLG_FNAME != 0 {
        skip_zero_terminated(file)?;
    }
    if flags & FLG_FCOMMENT != 0 {
        skip_zero_terminated(file)?;
    }
    if flags & FLG_FHCRC != 0 {
        file.seek(SeekFrom::Current(2))?;
    }

    let data_start = file.stream_position()?;
    Ok(ra.map(|(chunk_len, sizes)| (chunk_len, sizes, data_start)))
}

fn skip_zero_terminated(file: &mut File) -> Result<()> {
    let mut byte = [0u8; 1];
    loop {
        file.read_exact(&mut byte)?;
        if byte[0] == 0 {
            return Ok(());
        }
    }
}

/// Inflate one dictzip chunk. Chunks are raw deflate data terminated by a
/// full flush rather than a stream end, so decompression stops once the
/// input is consumed or the expected output is produced.
fn inflate_chunk(comp: &[u8], expected_len: usize, out: &mut Vec<u8>) -> Result<()> {
    let mut inflater = Decompress::new(false);
    let start = out.len();
    out.resize(start + expected_len, 0);

    let mut in_pos = 0usize;
    let mut out_pos = start;
    loop {
        let status = inflater
            .decompress(
                &comp[in_pos..],
                &mut out[out_pos..],
                FlushDecompress::Sync,
            )
            .map_err(|e| DslError::Decompress(format!("dictzip chunk: {}", e)))?;
        in_pos = inflater.total_in() as usize;
        out_pos = start + inflater.total_out() as usize;

        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if in_pos >= comp.len() || out_pos >= out.len() {
                    break;
                }
            }
        }
    }
    out.truncate(out_pos);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plain_file_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.dsl");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"hello world")
            .unwrap();

        let mut reader = DzReader::open(&path).unwrap();
        assert_eq!(reader.read(6, 5).unwrap(), b"world");
        assert_eq!(reader.read(6, 100).unwrap(), b"world");
        assert_eq!(reader.read(100, 5).unwrap(), b"");
        assert_eq!(reader.read_all().unwrap(), b"hello world");
    }

    #[test]
    fn plain_gzip_is_served_from_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.dsl.dz");
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"compressed body text").unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let mut reader = DzReader::open(&path).unwrap();
        assert_eq!(reader.read(11, 4).unwrap(), b"body");
        assert_eq!(reader.read_all().unwrap(), b"compressed body text");
    }
}
