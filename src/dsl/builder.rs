//! Index builder: drives the scanner over a DSL source, collects
//! headwords (including embedded-card headwords) into the B-tree, writes
//! article metadata into chunked storage and finalizes the header.
//!
//! Parse problems are diagnostics, not failures: they are logged with
//! their line number and the build continues.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, info, warn};

use super::btree::{self, IndexedWords};
use super::chunked::ChunkWriter;
use super::dom::ArticleDom;
use super::error::Result;
use super::folding;
use super::indexed_zip::IndexedZip;
use super::markup;
use super::models::{
    DslConfig, IdxHeader, CURRENT_FORMAT_VERSION, CURRENT_ZIP_SUPPORT_VERSION, SIGNATURE,
};
use super::scanner::{self, DslScanner};

/// Headword lines longer than this can never be real headwords and are
/// skipped before any expansion happens.
const MAX_HEADWORD_LINE: usize = 100;

#[derive(Debug, Clone)]
struct InsidedCard {
    offset: u32,
    size: u32,
    headwords: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct BuildStats {
    pub article_count: u32,
    pub word_count: u32,
}

/// Build the index file for `dsl_path`. Returns `None` when the source is
/// an abbreviations pseudo-dictionary, which never becomes a top-level
/// dictionary of its own.
pub fn build_index_file(
    dsl_path: &Path,
    abrv_path: Option<&Path>,
    zip_path: Option<&Path>,
    index_path: &Path,
    config: &DslConfig,
) -> Result<Option<BuildStats>> {
    let mut scanner = DslScanner::open(dsl_path)?;

    if scanner.dictionary_name() == "Abbrev" {
        debug!("Skipping abbreviations dictionary {}", dsl_path.display());
        return Ok(None);
    }

    info!(
        "Building the index for dictionary: {}",
        scanner.dictionary_name()
    );

    let mut idx = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(index_path)?;

    let mut header = IdxHeader::default();

    // A dummy header goes first; it is rewritten with real values at the
    // end of the build.
    header.write(&mut idx)?;

    let dictionary_name = if scanner.dictionary_name().is_empty() {
        dsl_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        scanner.dictionary_name().to_string()
    };
    idx.write_u32::<LittleEndian>(dictionary_name.len() as u32)?;
    idx.write_all(dictionary_name.as_bytes())?;

    let sound_dictionary = scanner.sound_dictionary_name().to_string();
    if !sound_dictionary.is_empty() {
        header.has_sound_dictionary_name = 1;
        idx.write_u32::<LittleEndian>(sound_dictionary.len() as u32)?;
        idx.write_all(sound_dictionary.as_bytes())?;
    }

    header.dsl_encoding = scanner.encoding() as i32;

    let mut indexed_words = IndexedWords::new();
    let mut chunks = ChunkWriter::new(&mut idx)?;

    // Read the abbreviations, if a companion file exists.
    if let Some(abrv_path) = abrv_path {
        match scan_abbreviations(abrv_path) {
            Ok(abrv) if !abrv.is_empty() => {
                header.has_abrv = 1;
                header.abrv_address = chunks.start_new_block()?;
                chunks.add_to_block(&(abrv.len() as u32).to_le_bytes());
                for (key, value) in &abrv {
                    chunks.add_to_block(&(key.len() as u32).to_le_bytes());
                    chunks.add_to_block(key.as_bytes());
                    chunks.add_to_block(&(value.len() as u32).to_le_bytes());
                    chunks.add_to_block(value.as_bytes());
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    "Error reading abbreviation file {}: {}. Skipping it.",
                    abrv_path.display(),
                    e
                );
            }
        }
    }

    let mut article_count: u32 = 0;
    let mut word_count: u32 = 0;

    let mut has_string = false;
    let mut cur_string = String::new();
    let mut cur_offset: u64 = 0;

    'articles: loop {
        // Find the main headword.
        if !has_string {
            match scanner.read_next_line(true) {
                Some((line, offset)) => {
                    cur_string = line;
                    cur_offset = offset;
                }
                None => break, // Clean end of file.
            }
        }
        has_string = false;

        // A line this long can never be a headword.
        if cur_string.is_empty() || cur_string.chars().count() > MAX_HEADWORD_LINE {
            continue;
        }

        if cur_string.starts_with(|c| markup::is_dsl_ws(c)) {
            // The first character is blank; all the others must be too.
            if cur_string.chars().any(|c| !markup::is_dsl_ws(c)) {
                warn!(
                    "Garbage string in {} at offset {:#x}",
                    dsl_path.display(),
                    cur_offset
                );
            }
            continue;
        }

        // Got the headword.
        let processed = markup::process_unsorted_parts(&cur_string, true);
        let mut all_entry_words = markup::expand_optional_parts(&processed);
        let article_offset = cur_offset;

        // More headwords may follow.
        let mut premature_eof = false;
        loop {
            match scanner.read_next_line(false) {
                Some((line, offset)) => {
                    has_string = true;
                    cur_string = line;
                    cur_offset = offset;
                }
                None => {
                    warn!("Premature end of file {}", dsl_path.display());
                    premature_eof = true;
                    break;
                }
            }

            // Lingvo skips empty strings between the headwords.
            if cur_string.is_empty() {
                continue;
            }
            if cur_string.starts_with(|c| markup::is_dsl_ws(c)) {
                break; // No more headwords.
            }

            let processed = markup::process_unsorted_parts(&cur_string, true);
            let expanded = markup::expand_tildes(&processed, &all_entry_words[0]);
            all_entry_words.extend(markup::expand_optional_parts(&expanded));
        }

        if premature_eof {
            break;
        }

        // Insert the new entry.
        let desc_offset = chunks.start_new_block()?;
        chunks.add_to_block(&(article_offset as u32).to_le_bytes());

        for word in &all_entry_words {
            let normalized = markup::normalize_headword(&markup::unescape_dsl(word));
            indexed_words.add_word(&normalized, desc_offset, config.max_headword_size);
        }
        article_count += 1;
        word_count += all_entry_words.len() as u32;

        // Scan the article body, accumulating embedded cards.
        let mut inside_insided = false;
        let mut insided_cards: Vec<InsidedCard> = Vec::new();
        let mut insided_headwords: Vec<String> = Vec::new();
        let mut offset = cur_offset;
        let mut lines_inside_card: u32 = 0;
        let mut dog_line: u32 = 0;
        let mut was_empty_line = false;
        let headword_line = scanner.lines_read().saturating_sub(2);
        let mut no_significant_lines = folding::apply_whitespace_only(&cur_string).is_empty();
        let mut have_line = !no_significant_lines;

        loop {
            if have_line {
                has_string = true;
            } else {
                match scanner.read_next_line(false) {
                    Some((line, line_offset)) => {
                        has_string = true;
                        cur_string = line;
                        cur_offset = line_offset;
                    }
                    None => {
                        has_string = false;
                        cur_offset = scanner.source_len();
                    }
                }
            }
            have_line = false;

            if !has_string
                || (!cur_string.is_empty() && !cur_string.starts_with(|c| markup::is_dsl_ws(c)))
            {
                if inside_insided {
                    warn!("Unclosed tag '@' at line {}", dog_line);
                    insided_cards.push(InsidedCard {
                        offset: offset as u32,
                        size: (cur_offset - offset) as u32,
                        headwords: insided_headwords.clone(),
                    });
                }
                if no_significant_lines {
                    warn!("Orphan headword at line {}", headword_line);
                }
                break;
            }

            if cur_string.is_empty() {
                was_empty_line = true;
                continue;
            } else if was_empty_line && !folding::apply_whitespace_only(&cur_string).is_empty() {
                warn!("Orphan string at line {}", scanner.lines_read().saturating_sub(1));
            }

            if no_significant_lines {
                no_significant_lines = folding::apply_whitespace_only(&cur_string).is_empty();
            }

            // Find embedded cards.
            match find_unescaped_at(&cur_string) {
                None => {
                    if inside_insided {
                        lines_inside_card += 1;
                    }
                    continue;
                }
                Some(at_pos) => {
                    // The card tag must be the first thing on its line.
                    if !markup::is_at_sign_first(&cur_string) {
                        warn!(
                            "Unescaped '@' symbol at line {}",
                            scanner.lines_read().saturating_sub(1)
                        );
                        if inside_insided {
                            lines_inside_card += 1;
                        }
                        continue;
                    }

                    dog_line = scanner.lines_read().saturating_sub(1);

                    if inside_insided {
                        if lines_inside_card > 0 {
                            // A body separated this group from the next card.
                            insided_cards.push(InsidedCard {
                                offset: offset as u32,
                                size: (cur_offset - offset) as u32,
                                headwords: insided_headwords.clone(),
                            });
                            insided_headwords.clear();
                            lines_inside_card = 0;
                            offset = cur_offset;
                        }
                    } else {
                        offset = cur_offset;
                        lines_inside_card = 0;
                    }

                    let headword =
                        folding::trim_whitespace(&cur_string[at_pos + 1..]).to_string();
                    if !headword.is_empty() {
                        let processed = markup::process_unsorted_parts(&headword, true);
                        let expanded = markup::expand_tildes(&processed, &all_entry_words[0]);
                        insided_headwords.push(expanded);
                        inside_insided = true;
                    } else {
                        inside_insided = false;
                    }
                }
            }
        }

        // The offset of the first line after the article (or the end of
        // file) fixes the article's size.
        let article_size = (cur_offset - article_offset) as u32;
        chunks.add_to_block(&article_size.to_le_bytes());

        for card in &insided_cards {
            let desc_offset = chunks.start_new_block()?;
            chunks.add_to_block(&card.offset.to_le_bytes());
            chunks.add_to_block(&card.size.to_le_bytes());

            for headword in &card.headwords {
                let alternatives = markup::expand_optional_parts(headword);
                for alternative in &alternatives {
                    let normalized =
                        markup::normalize_headword(&markup::unescape_dsl(alternative));
                    indexed_words.add_word(&normalized, desc_offset, config.max_headword_size);
                }
                word_count += alternatives.len() as u32;
            }
            article_count += 1;
        }

        if !has_string {
            break 'articles;
        }
    }

    // Finish with the chunks.
    header.chunks_offset = chunks.finish()?;

    // Build the headword index.
    let idx_info = btree::build_index(&indexed_words, &mut idx)?;
    header.index_btree_max_elements = idx_info.btree_max_elements;
    header.index_root_offset = idx_info.root_offset;
    drop(indexed_words); // Release memory, the data is on disk now.

    // If there is a zip file, index it too.
    if let Some(zip_path) = zip_path {
        debug!("Indexing zip file {}", zip_path.display());
        header.has_zip_file = 1;

        let mut zip_names = IndexedWords::new();
        match IndexedZip::open(zip_path).and_then(|mut zip| zip.index_entries(&mut zip_names)) {
            Ok(_) if !zip_names.is_empty() => {
                let zip_info = btree::build_index(&zip_names, &mut idx)?;
                header.zip_index_btree_max_elements = zip_info.btree_max_elements;
                header.zip_index_root_offset = zip_info.root_offset;
            }
            Ok(_) => {
                // Bad zip file: no index, though the mark that we have one
                // remains.
                header.zip_index_btree_max_elements = 0;
                header.zip_index_root_offset = 0;
            }
            Err(e) => {
                warn!("Failed indexing zip {}: {}", zip_path.display(), e);
                header.zip_index_btree_max_elements = 0;
                header.zip_index_root_offset = 0;
            }
        }
    }

    // That concludes it. Update the header.
    header.signature = SIGNATURE;
    header.format_version = CURRENT_FORMAT_VERSION;
    header.zip_support_version = CURRENT_ZIP_SUPPORT_VERSION;
    header.article_count = article_count;
    header.word_count = word_count;
    header.lang_from = scanner::language_code(scanner.lang_from());
    header.lang_to = scanner::language_code(scanner.lang_to());

    idx.seek(SeekFrom::Start(0))?;
    header.write(&mut idx)?;
    idx.flush()?;

    info!(
        "Index built: {} articles, {} words",
        article_count, word_count
    );
    Ok(Some(BuildStats {
        article_count,
        word_count,
    }))
}

/// Position of the first `@` not preceded by a backslash.
fn find_unescaped_at(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'@' && (i == 0 || bytes[i - 1] != b'\\') {
            return Some(i);
        }
    }
    None
}

/// Parse an abbreviation companion: records of one-or-more key lines
/// followed by one indented value line. Values lose their DSL markup.
fn scan_abbreviations(abrv_path: &Path) -> Result<BTreeMap<String, String>> {
    let mut scanner = DslScanner::open(abrv_path)?;
    let mut abrv = BTreeMap::new();

    'records: loop {
        let mut cur = match scanner.read_next_line(true) {
            Some((line, _)) => line,
            None => break,
        };
        if cur.is_empty() || cur.starts_with(|c| markup::is_dsl_ws(c)) {
            continue;
        }

        let mut keys: Vec<String> = Vec::new();
        let value_line;

        // Insert the key and read more, or get to the definition.
        loop {
            let processed = markup::process_unsorted_parts(&cur, true);
            let processed = if keys.is_empty() {
                processed
            } else {
                markup::expand_tildes(&processed, &keys[0])
            };
            keys.extend(markup::expand_optional_parts(&processed));

            match scanner.read_next_line(false) {
                None => {
                    warn!("Premature end of file {}", abrv_path.display());
                    break 'records;
                }
                Some((line, _)) if line.is_empty() => {
                    warn!("Premature end of file {}", abrv_path.display());
                    break 'records;
                }
                Some((line, _)) => {
                    if line.starts_with(|c| markup::is_dsl_ws(c)) {
                        value_line = line;
                        break;
                    }
                    cur = line;
                }
            }
        }

        let mut value = value_line
            .trim_start_matches(|c| markup::is_dsl_ws(c))
            .to_string();
        if !keys.is_empty() {
            value = markup::expand_tildes(&value, &keys[0]);
        }

        // If the string has any DSL markup, strip it.
        let value_text = ArticleDom::parse(&value).root.render_as_text();

        for key in keys {
            let normalized = markup::normalize_headword(&markup::unescape_dsl(&key));
            abrv.insert(
                folding::trim_whitespace(&normalized).to_string(),
                value_text.clone(),
            );
        }
    }

    Ok(abrv)
}
