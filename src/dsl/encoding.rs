//! Encoding detection and decoding of DSL source bytes.
//!
//! Sources carry a BOM, an explicit `#ENCODING` directive, or neither, in
//! which case UTF-16LE is assumed (the historical default for DSL files).

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use encoding_rs::{UTF_16BE, UTF_16LE, WINDOWS_1250, WINDOWS_1251, WINDOWS_1252};

use super::error::{DslError, Result};
use super::models::DslEncoding;

/// Recognize a byte-order mark. Returns the encoding and the BOM length
/// in bytes. The UTF-32 marks are checked before the UTF-16 ones because
/// the UTF-32LE BOM starts with the UTF-16LE one.
pub fn detect_bom(data: &[u8]) -> Option<(DslEncoding, usize)> {
    if data.starts_with(&[0xff, 0xfe, 0x00, 0x00]) {
        Some((DslEncoding::Utf32LE, 4))
    } else if data.starts_with(&[0x00, 0x00, 0xfe, 0xff]) {
        Some((DslEncoding::Utf32BE, 4))
    } else if data.starts_with(&[0xff, 0xfe]) {
        Some((DslEncoding::Utf16LE, 2))
    } else if data.starts_with(&[0xfe, 0xff]) {
        Some((DslEncoding::Utf16BE, 2))
    } else if data.starts_with(&[0xef, 0xbb, 0xbf]) {
        Some((DslEncoding::Utf8, 3))
    } else {
        None
    }
}

/// Decode `bytes` under `encoding`, failing on any invalid sequence.
pub fn decode(bytes: &[u8], encoding: DslEncoding) -> Result<String> {
    match encoding {
        DslEncoding::Utf8 => decode_with(bytes, encoding_rs::UTF_8, "UTF-8"),
        DslEncoding::Utf16LE => decode_with(bytes, UTF_16LE, "UTF-16LE"),
        DslEncoding::Utf16BE => decode_with(bytes, UTF_16BE, "UTF-16BE"),
        DslEncoding::Windows1250 => decode_with(bytes, WINDOWS_1250, "WINDOWS-1250"),
        DslEncoding::Windows1251 => decode_with(bytes, WINDOWS_1251, "WINDOWS-1251"),
        DslEncoding::Windows1252 => decode_with(bytes, WINDOWS_1252, "WINDOWS-1252"),
        DslEncoding::Utf32LE => decode_utf32(bytes, false),
        DslEncoding::Utf32BE => decode_utf32(bytes, true),
    }
}

fn decode_with(
    bytes: &[u8],
    encoding: &'static encoding_rs::Encoding,
    name: &'static str,
) -> Result<String> {
    match encoding.decode_without_bom_handling_and_without_replacement(bytes) {
        Some(cow) => Ok(cow.into_owned()),
        None => Err(DslError::Encoding {
            encoding: name,
            offset: 0,
        }),
    }
}

// encoding_rs has no UTF-32 decoder, so the 4-byte units are read directly.
fn decode_utf32(bytes: &[u8], big_endian: bool) -> Result<String> {
    let name = if big_endian { "UTF-32BE" } else { "UTF-32LE" };
    if bytes.len() % 4 != 0 {
        return Err(DslError::Encoding {
            encoding: name,
            offset: bytes.len() & !3,
        });
    }
    let mut out = String::with_capacity(bytes.len() / 4);
    for (i, unit) in bytes.chunks_exact(4).enumerate() {
        let value = if big_endian {
            BigEndian::read_u32(unit)
        } else {
            LittleEndian::read_u32(unit)
        };
        match char::from_u32(value) {
            Some(c) => out.push(c),
            None => {
                return Err(DslError::Encoding {
                    encoding: name,
                    offset: i * 4,
                })
            }
        }
    }
    Ok(out)
}

/// Encode a line-feed / carriage-return pair in the given encoding's code
/// units, for locating line terminators in the raw byte stream.
pub fn encode_unit(c: u8, encoding: DslEncoding, out: &mut [u8; 4]) -> usize {
    match encoding {
        DslEncoding::Utf32LE => {
            out.copy_from_slice(&(c as u32).to_le_bytes());
            4
        }
        DslEncoding::Utf32BE => {
            out.copy_from_slice(&(c as u32).to_be_bytes());
            4
        }
        DslEncoding::Utf16LE => {
            out[0] = c;
            out[1] = 0;
            2
        }
        DslEncoding::Utf16BE => {
            out[0] = 0;
            out[1] = c;
            2
        }
        _ => {
            out[0] = c;
            1
        }
    }
}
