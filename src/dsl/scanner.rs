//! Streaming line scanner for DSL sources.
//!
//! Decodes a possibly-compressed source into lines carrying their byte
//! offset in the uncompressed stream, consumes the leading `#` header
//! directives, and strips `{{ … }}` comments while threading the
//! open-comment state across lines.

use std::path::Path;

use log::{debug, warn};

use super::dictzip::DzReader;
use super::encoding::{self, detect_bom};
use super::error::Result;
use super::markup;
use super::models::DslEncoding;

pub struct DslScanner {
    encoding: DslEncoding,
    /// Total length of the uncompressed source in bytes.
    source_len: u64,
    /// Decoded lines (without terminators) with their source-byte offsets.
    lines: Vec<(String, u64)>,
    next: usize,
    lines_read: u32,
    in_comment: bool,

    dictionary_name: String,
    lang_from: String,
    lang_to: String,
    sound_dictionary: String,
}

impl DslScanner {
    /// Open a `.dsl` or `.dsl.dz` source and position the scanner on the
    /// first line after the header directives.
    pub fn open(path: &Path) -> Result<DslScanner> {
        let mut dz = DzReader::open(path)?;
        let data = dz.read_all()?;
        Self::from_bytes(&data)
    }

    pub fn from_bytes(data: &[u8]) -> Result<DslScanner> {
        let (bom_encoding, bom_len) = match detect_bom(data) {
            Some((enc, len)) => (Some(enc), len),
            None => (None, 0),
        };

        // An explicit #ENCODING directive wins over the BOM; with neither,
        // historical DSL files are UTF-16LE.
        let encoding = probe_encoding_directive(data, bom_len)
            .or(bom_encoding)
            .unwrap_or(DslEncoding::Utf16LE);

        let lines = split_lines(data, encoding, bom_len)?;

        let mut scanner = DslScanner {
            encoding,
            source_len: data.len() as u64,
            lines,
            next: 0,
            lines_read: 0,
            in_comment: false,
            dictionary_name: String::new(),
            lang_from: String::new(),
            lang_to: String::new(),
            sound_dictionary: String::new(),
        };
        scanner.consume_directives();
        Ok(scanner)
    }

    fn consume_directives(&mut self) {
        while self.next < self.lines.len() {
            let line = markup::trim_dsl_ws(&self.lines[self.next].0).to_string();
            if !line.starts_with('#') {
                break;
            }
            self.next += 1;
            self.lines_read += 1;

            let (key, value) = parse_directive(&line);
            match key.as_str() {
                "#NAME" => self.dictionary_name = value,
                "#INDEX_LANGUAGE" => self.lang_from = value,
                "#CONTENTS_LANGUAGE" => self.lang_to = value,
                "#SOUND_DICTIONARY" => self.sound_dictionary = value,
                "#ENCODING" => {} // already applied during detection
                _ => debug!("Skipping unknown DSL directive: {}", key),
            }
        }
    }

    /// Return the next line and its source-byte offset, stripping comments.
    /// With `skip_blank`, lines that are empty after comment stripping are
    /// silently consumed.
    pub fn read_next_line(&mut self, skip_blank: bool) -> Option<(String, u64)> {
        while self.next < self.lines.len() {
            let (raw, offset) = &self.lines[self.next];
            let offset = *offset;
            let stripped = markup::strip_comments(raw, &mut self.in_comment);
            self.next += 1;
            self.lines_read += 1;

            if skip_blank && stripped.is_empty() {
                continue;
            }
            return Some((stripped, offset));
        }
        None
    }

    /// 1-based count of physical lines consumed so far, for diagnostics.
    pub fn lines_read(&self) -> u32 {
        self.lines_read
    }

    pub fn encoding(&self) -> DslEncoding {
        self.encoding
    }

    /// Length of the uncompressed source in bytes; serves as the end
    /// offset of the final article.
    pub fn source_len(&self) -> u64 {
        self.source_len
    }

    pub fn dictionary_name(&self) -> &str {
        &self.dictionary_name
    }

    pub fn lang_from(&self) -> &str {
        &self.lang_from
    }

    pub fn lang_to(&self) -> &str {
        &self.lang_to
    }

    pub fn sound_dictionary_name(&self) -> &str {
        &self.sound_dictionary
    }
}

/// Parse `#KEY "value"` (or `#KEY value`) into its parts.
fn parse_directive(line: &str) -> (String, String) {
    let mut parts = line.splitn(2, |c| markup::is_dsl_ws(c));
    let key = parts.next().unwrap_or("").to_ascii_uppercase();
    let value = parts
        .next()
        .map(|v| markup::trim_dsl_ws(v).trim_matches('"').to_string())
        .unwrap_or_default();
    (key, value)
}

/// Look for an `#ENCODING` directive at the head of the file, trying the
/// plausible code-unit interpretations. The directive takes precedence
/// over the BOM.
fn probe_encoding_directive(data: &[u8], bom_len: usize) -> Option<DslEncoding> {
    for candidate in [
        DslEncoding::Utf8,
        DslEncoding::Utf16LE,
        DslEncoding::Utf16BE,
    ] {
        if let Some(first) = first_line(data, candidate, bom_len) {
            if let Ok(text) = encoding::decode(&first, candidate) {
                let text = markup::trim_dsl_ws(&text);
                if let Some(rest) = text.strip_prefix("#ENCODING") {
                    let name = markup::trim_dsl_ws(rest).trim_matches('"');
                    return Some(DslEncoding::from_name(name));
                }
            }
        }
    }
    None
}

fn first_line(data: &[u8], encoding: DslEncoding, bom_len: usize) -> Option<Vec<u8>> {
    let width = encoding.code_unit_width();
    let mut lf = [0u8; 4];
    let lf_len = encoding::encode_unit(b'\n', encoding, &mut lf);
    let mut cr = [0u8; 4];
    encoding::encode_unit(b'\r', encoding, &mut cr);

    let body = &data[bom_len.min(data.len())..];
    let mut i = 0;
    while i + width <= body.len() {
        let unit = &body[i..i + width];
        if unit == &lf[..lf_len] || unit == &cr[..lf_len] {
            return Some(body[..i].to_vec());
        }
        i += width;
    }
    if body.is_empty() {
        None
    } else {
        Some(body.to_vec())
    }
}

/// Split the raw byte stream into decoded lines, each tagged with the byte
/// offset of its first byte. Terminators are `\n`, `\r` or `\r\n` encoded
/// at the encoding's code-unit width.
fn split_lines(data: &[u8], encoding: DslEncoding, bom_len: usize) -> Result<Vec<(String, u64)>> {
    let width = encoding.code_unit_width();
    let mut lf = [0u8; 4];
    encoding::encode_unit(b'\n', encoding, &mut lf);
    let mut cr = [0u8; 4];
    encoding::encode_unit(b'\r', encoding, &mut cr);
    let lf = &lf[..width];
    let cr = &cr[..width];

    // Ignore a trailing partial code unit rather than failing the whole file.
    let usable = bom_len + (data.len() - bom_len) / width * width;
    if usable < data.len() {
        warn!("Source ends with a partial code unit; trailing bytes ignored");
    }
    let data = &data[..usable];

    let mut lines = Vec::new();
    let mut line_start = bom_len;
    let mut i = bom_len;
    while i + width <= data.len() {
        let unit = &data[i..i + width];
        if unit == lf || unit == cr {
            let text = encoding::decode(&data[line_start..i], encoding)?;
            lines.push((text, line_start as u64));
            i += width;
            if unit == cr && i + width <= data.len() && &data[i..i + width] == lf {
                i += width;
            }
            line_start = i;
        } else {
            i += width;
        }
    }
    if line_start < data.len() {
        let text = encoding::decode(&data[line_start..], encoding)?;
        lines.push((text, line_start as u64));
    }
    Ok(lines)
}

/// Map a `#INDEX_LANGUAGE` / `#CONTENTS_LANGUAGE` name to a packed
/// two-letter ISO 639-1 code. Unknown names map to zero.
pub fn language_code(name: &str) -> u32 {
    let code2 = match name.to_ascii_lowercase().as_str() {
        "english" => "en",
        "russian" => "ru",
        "german" => "de",
        "french" => "fr",
        "spanish" => "es",
        "italian" => "it",
        "portuguese" => "pt",
        "dutch" => "nl",
        "polish" => "pl",
        "czech" => "cs",
        "ukrainian" => "uk",
        "belarusian" => "be",
        "bulgarian" => "bg",
        "hungarian" => "hu",
        "finnish" => "fi",
        "swedish" => "sv",
        "norwegian" => "no",
        "danish" => "da",
        "turkish" => "tr",
        "arabic" => "ar",
        "hebrew" => "he",
        "greek" => "el",
        "latin" => "la",
        "chinese" => "zh",
        "japanese" => "ja",
        "korean" => "ko",
        _ => return 0,
    };
    let bytes = code2.as_bytes();
    bytes[0] as u32 | (bytes[1] as u32) << 8
}
