//! Data structures shared across the DSL engine: the on-disk index header,
//! the source-encoding tag and the build/serve configuration.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::btree;
use super::error::{DslError, Result};
use super::folding;

/// Index file signature: ASCII `DSLX` read as a little-endian u32.
pub const SIGNATURE: u32 = 0x584c_5344;

/// Version of the serialized index format proper. Bumped whenever the
/// header, chunk or headword-collection logic changes.
pub const SERIALIZED_FORMAT_VERSION: u32 = 23;

/// Combined format version persisted in the header. A mismatch in any of
/// the three constituents forces a full rebuild.
pub const CURRENT_FORMAT_VERSION: u32 =
    SERIALIZED_FORMAT_VERSION + btree::FORMAT_VERSION + folding::VERSION;

/// Version of the zip-resource index schema.
pub const CURRENT_ZIP_SUPPORT_VERSION: u32 = 2;

/// Source text encoding of a DSL file.
///
/// The discriminant is persisted in the index header (`dsl_encoding`),
/// so the values are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DslEncoding {
    Utf8 = 0,
    Utf16LE = 1,
    Utf16BE = 2,
    Utf32LE = 3,
    Utf32BE = 4,
    Windows1250 = 5,
    Windows1251 = 6,
    Windows1252 = 7,
}

impl DslEncoding {
    /// The canonical encoding label, as accepted by the `#ENCODING` directive.
    pub fn name(self) -> &'static str {
        match self {
            DslEncoding::Utf8 => "UTF-8",
            DslEncoding::Utf16LE => "UTF-16LE",
            DslEncoding::Utf16BE => "UTF-16BE",
            DslEncoding::Utf32LE => "UTF-32LE",
            DslEncoding::Utf32BE => "UTF-32BE",
            DslEncoding::Windows1250 => "WINDOWS-1250",
            DslEncoding::Windows1251 => "WINDOWS-1251",
            DslEncoding::Windows1252 => "WINDOWS-1252",
        }
    }

    /// Resolve an encoding label. Unknown labels fall back to UTF-8, which
    /// mirrors what the historical DSL compiler did.
    pub fn from_name(name: &str) -> DslEncoding {
        match name.to_ascii_uppercase().as_str() {
            "UTF-16LE" | "UNICODE" => DslEncoding::Utf16LE,
            "UTF-16BE" => DslEncoding::Utf16BE,
            "UTF-32LE" => DslEncoding::Utf32LE,
            "UTF-32BE" => DslEncoding::Utf32BE,
            "WINDOWS-1250" | "LATIN2" => DslEncoding::Windows1250,
            "WINDOWS-1251" | "CYRILLIC" => DslEncoding::Windows1251,
            "WINDOWS-1252" | "LATIN1" | "WESTERN" => DslEncoding::Windows1252,
            _ => DslEncoding::Utf8,
        }
    }

    /// Width of one code unit in bytes. Line terminators in the encoded
    /// stream occupy exactly one code unit.
    pub fn code_unit_width(self) -> usize {
        match self {
            DslEncoding::Utf32LE | DslEncoding::Utf32BE => 4,
            DslEncoding::Utf16LE | DslEncoding::Utf16BE => 2,
            _ => 1,
        }
    }
}

impl TryFrom<i32> for DslEncoding {
    type Error = DslError;
    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(DslEncoding::Utf8),
            1 => Ok(DslEncoding::Utf16LE),
            2 => Ok(DslEncoding::Utf16BE),
            3 => Ok(DslEncoding::Utf32LE),
            4 => Ok(DslEncoding::Utf32BE),
            5 => Ok(DslEncoding::Windows1250),
            6 => Ok(DslEncoding::Windows1251),
            7 => Ok(DslEncoding::Windows1252),
            _ => Err(DslError::IndexOldOrBad(format!(
                "unknown encoding tag {}",
                value
            ))),
        }
    }
}

/// The fixed-size index file header. All fields are little-endian and
/// written back-to-back with no padding; the byte layout is part of the
/// on-disk format.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdxHeader {
    pub signature: u32,
    pub format_version: u32,
    pub zip_support_version: u32,
    /// Tag of the source encoding; see [`DslEncoding`].
    pub dsl_encoding: i32,
    /// File offset of the chunk region.
    pub chunks_offset: u32,
    /// Non-zero means an abbreviation table exists at `abrv_address`.
    pub has_abrv: u32,
    pub abrv_address: u32,
    pub index_btree_max_elements: u32,
    pub index_root_offset: u32,
    /// Parent articles plus embedded cards.
    pub article_count: u32,
    /// Distinct folded headwords inserted into the B-tree.
    pub word_count: u32,
    pub lang_from: u32,
    pub lang_to: u32,
    pub has_zip_file: u32,
    pub has_sound_dictionary_name: u32,
    pub zip_index_btree_max_elements: u32,
    pub zip_index_root_offset: u32,
}

/// Serialized size of the header in bytes: 17 fields, 4 bytes each.
pub const IDX_HEADER_SIZE: u64 = 17 * 4;

impl IdxHeader {
    pub fn read(reader: &mut impl Read) -> Result<IdxHeader> {
        Ok(IdxHeader {
            signature: reader.read_u32::<LittleEndian>()?,
            format_version: reader.read_u32::<LittleEndian>()?,
            zip_support_version: reader.read_u32::<LittleEndian>()?,
            dsl_encoding: reader.read_i32::<LittleEndian>()?,
            chunks_offset: reader.read_u32::<LittleEndian>()?,
            has_abrv: reader.read_u32::<LittleEndian>()?,
            abrv_address: reader.read_u32::<LittleEndian>()?,
            index_btree_max_elements: reader.read_u32::<LittleEndian>()?,
            index_root_offset: reader.read_u32::<LittleEndian>()?,
            article_count: reader.read_u32::<LittleEndian>()?,
            word_count: reader.read_u32::<LittleEndian>()?,
            lang_from: reader.read_u32::<LittleEndian>()?,
            lang_to: reader.read_u32::<LittleEndian>()?,
            has_zip_file: reader.read_u32::<LittleEndian>()?,
            has_sound_dictionary_name: reader.read_u32::<LittleEndian>()?,
            zip_index_btree_max_elements: reader.read_u32::<LittleEndian>()?,
            zip_index_root_offset: reader.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.signature)?;
        writer.write_u32::<LittleEndian>(self.format_version)?;
        writer.write_u32::<LittleEndian>(self.zip_support_version)?;
        writer.write_i32::<LittleEndian>(self.dsl_encoding)?;
        writer.write_u32::<LittleEndian>(self.chunks_offset)?;
        writer.write_u32::<LittleEndian>(self.has_abrv)?;
        writer.write_u32::<LittleEndian>(self.abrv_address)?;
        writer.write_u32::<LittleEndian>(self.index_btree_max_elements)?;
        writer.write_u32::<LittleEndian>(self.index_root_offset)?;
        writer.write_u32::<LittleEndian>(self.article_count)?;
        writer.write_u32::<LittleEndian>(self.word_count)?;
        writer.write_u32::<LittleEndian>(self.lang_from)?;
        writer.write_u32::<LittleEndian>(self.lang_to)?;
        writer.write_u32::<LittleEndian>(self.has_zip_file)?;
        writer.write_u32::<LittleEndian>(self.has_sound_dictionary_name)?;
        writer.write_u32::<LittleEndian>(self.zip_index_btree_max_elements)?;
        writer.write_u32::<LittleEndian>(self.zip_index_root_offset)?;
        Ok(())
    }
}

/// Build and serve configuration, passed into the builder and the
/// dictionary instance rather than held globally.
#[derive(Debug, Clone, Copy)]
pub struct DslConfig {
    /// Headword keys longer than this many code points are silently
    /// dropped from the B-tree (treated as spurious).
    pub max_headword_size: usize,
    /// Pictures wider than this get a `gdpicture://` wrapper link.
    /// Zero disables the check.
    pub max_picture_width: u32,
}

impl Default for DslConfig {
    fn default() -> Self {
        DslConfig {
            max_headword_size: 256,
            max_picture_width: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_round_trips_bit_exact() {
        let header = IdxHeader {
            signature: SIGNATURE,
            format_version: CURRENT_FORMAT_VERSION,
            zip_support_version: CURRENT_ZIP_SUPPORT_VERSION,
            dsl_encoding: DslEncoding::Utf16LE as i32,
            chunks_offset: 0x1234,
            has_abrv: 1,
            abrv_address: 0x80,
            index_btree_max_elements: 32,
            index_root_offset: 0x2000,
            article_count: 7,
            word_count: 19,
            lang_from: 0x6e65,
            lang_to: 0x7572,
            has_zip_file: 1,
            has_sound_dictionary_name: 0,
            zip_index_btree_max_elements: 16,
            zip_index_root_offset: 0x3000,
        };

        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, IDX_HEADER_SIZE);
        // Signature comes first, little-endian: "DSLX".
        assert_eq!(&buf[0..4], b"DSLX");

        let read = IdxHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(read.signature, header.signature);
        assert_eq!(read.dsl_encoding, header.dsl_encoding);
        assert_eq!(read.zip_index_root_offset, header.zip_index_root_offset);
        assert_eq!(read.word_count, header.word_count);
    }

    #[test]
    fn encoding_tags_are_stable() {
        for tag in 0..8 {
            let enc = DslEncoding::try_from(tag).unwrap();
            assert_eq!(enc as i32, tag);
        }
        assert!(DslEncoding::try_from(8).is_err());
        assert_eq!(DslEncoding::from_name("utf-16le"), DslEncoding::Utf16LE);
        assert_eq!(DslEncoding::from_name("bogus"), DslEncoding::Utf8);
    }
}
