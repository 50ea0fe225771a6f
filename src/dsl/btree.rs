//! Persistent prefix B-tree mapping folded headword keys to article
//! locations.
//!
//! The tree is built once during indexing and queried read-only. Nodes are
//! serialized little-endian and zlib-compressed; leaves are chained so
//! prefix scans can walk rightward without touching inner nodes.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{debug, warn};

use super::error::{DslError, Result};
use super::folding;

/// Version of the B-tree node format; participates in the index format
/// version.
pub const FORMAT_VERSION: u32 = 4;

/// One match returned by a lookup: the stored (display-form) word and the
/// chunk block id of its article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordArticleLink {
    pub word: String,
    pub article_offset: u32,
}

/// Location of a built B-tree inside the index file. Both fields zero
/// means "no index" (used for absent zip indexes).
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexInfo {
    pub btree_max_elements: u32,
    pub root_offset: u32,
}

/// In-memory collection of words gathered during the build, keyed by the
/// fully folded form. Multiplicity is preserved: the same key may map to
/// several links.
#[derive(Debug, Default)]
pub struct IndexedWords {
    map: BTreeMap<String, Vec<WordArticleLink>>,
}

impl IndexedWords {
    pub fn new() -> IndexedWords {
        IndexedWords::default()
    }

    /// Insert a headword. Words longer than `max_headword_size` code
    /// points are spurious and silently dropped (with a log line).
    pub fn add_word(&mut self, word: &str, article_offset: u32, max_headword_size: usize) {
        let trimmed = folding::trim_whitespace(word);
        if trimmed.is_empty() {
            return;
        }
        if trimmed.chars().count() > max_headword_size {
            warn!(
                "Skipping over-long headword ({} chars): {:.40}…",
                trimmed.chars().count(),
                trimmed
            );
            return;
        }
        let key = folding::fold_key(trimmed);
        if key.is_empty() {
            return;
        }
        self.map.entry(key).or_default().push(WordArticleLink {
            word: trimmed.to_string(),
            article_offset,
        });
    }

    /// Insert a name with no length cap (resource-archive entries).
    pub fn add_single_word(&mut self, word: &str, article_offset: u32) {
        let key = folding::fold_key(word);
        if key.is_empty() {
            return;
        }
        self.map.entry(key).or_default().push(WordArticleLink {
            word: word.to_string(),
            article_offset,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of distinct folded keys.
    pub fn key_count(&self) -> usize {
        self.map.len()
    }
}

// On-disk node layout: [comp_len: u32][raw_len: u32][next_leaf: u32]
// followed by comp_len bytes of zlib data. The decompressed payload is
// [is_leaf: u8][count: u32] followed by entries (leaf) or fences (inner).

enum NodeData {
    Leaf {
        entries: Vec<(String, Vec<WordArticleLink>)>,
        next_leaf: u32,
    },
    Inner {
        // (first key of subtree, child node offset)
        children: Vec<(String, u32)>,
    },
}

/// Build the B-tree from `words` at the file's current position and return
/// its location.
pub fn build_index(words: &IndexedWords, file: &mut File) -> Result<IndexInfo> {
    let entries: Vec<(&String, &Vec<WordArticleLink>)> = words.map.iter().collect();
    let count = entries.len();
    let max_elements = ((count as f64).sqrt().ceil() as usize).max(16);
    debug!(
        "Building B-tree: {} keys, up to {} per node",
        count, max_elements
    );

    // Serialize and compress every leaf payload first so leaf offsets and
    // next-leaf pointers are known before anything is written.
    let mut leaf_blobs: Vec<Vec<u8>> = Vec::new();
    if entries.is_empty() {
        leaf_blobs.push(compress_node(&serialize_leaf(&[])?)?);
    } else {
        for chunk in entries.chunks(max_elements) {
            leaf_blobs.push(compress_node(&serialize_leaf(chunk)?)?);
        }
    }

    let mut offset = file.stream_position()?;
    let mut leaf_offsets = Vec::with_capacity(leaf_blobs.len());
    for blob in &leaf_blobs {
        leaf_offsets.push(offset as u32);
        // On disk: comp_len + next_leaf prefixes (8 bytes) plus the framed
        // blob, which already carries its 4-byte raw-length prefix.
        offset += 8 + blob.len() as u64;
    }

    for (i, blob) in leaf_blobs.iter().enumerate() {
        let next = leaf_offsets.get(i + 1).copied().unwrap_or(0);
        write_node(file, blob, next)?;
    }

    // Fences for the level above: first key of each leaf.
    let mut level: Vec<(String, u32)> = if entries.is_empty() {
        vec![(String::new(), leaf_offsets[0])]
    } else {
        entries
            .chunks(max_elements)
            .zip(&leaf_offsets)
            .map(|(chunk, &off)| (chunk[0].0.clone(), off))
            .collect()
    };

    while level.len() > 1 {
        let mut upper = Vec::new();
        for chunk in level.chunks(max_elements) {
            let node_offset = file.stream_position()? as u32;
            let blob = compress_node(&serialize_inner(chunk)?)?;
            write_node(file, &blob, 0)?;
            upper.push((chunk[0].0.clone(), node_offset));
        }
        level = upper;
    }

    Ok(IndexInfo {
        btree_max_elements: max_elements as u32,
        root_offset: level[0].1,
    })
}

fn serialize_leaf(entries: &[(&String, &Vec<WordArticleLink>)]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.write_u8(1)?;
    buf.write_u32::<LittleEndian>(entries.len() as u32)?;
    for (key, links) in entries {
        write_string(&mut buf, key)?;
        buf.write_u32::<LittleEndian>(links.len() as u32)?;
        for link in links.iter() {
            write_string(&mut buf, &link.word)?;
            buf.write_u32::<LittleEndian>(link.article_offset)?;
        }
    }
    Ok(buf)
}

fn serialize_inner(children: &[(String, u32)]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.write_u8(0)?;
    buf.write_u32::<LittleEndian>(children.len() as u32)?;
    for (key, offset) in children {
        write_string(&mut buf, key)?;
        buf.write_u32::<LittleEndian>(*offset)?;
    }
    Ok(buf)
}

fn compress_node(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    let mut blob = encoder
        .finish()
        .map_err(|e| DslError::Decompress(format!("B-tree node deflate: {}", e)))?;
    // Prepend the raw length so the reader can size its buffer.
    let mut framed = Vec::with_capacity(blob.len() + 4);
    framed.write_u32::<LittleEndian>(raw.len() as u32)?;
    framed.append(&mut blob);
    Ok(framed)
}

fn write_node(file: &mut File, framed: &[u8], next_leaf: u32) -> Result<()> {
    // framed = [raw_len][zlib bytes]; on disk we store
    // [comp_len][raw_len][next_leaf][zlib bytes].
    let comp_len = framed.len() as u32 - 4;
    file.write_u32::<LittleEndian>(comp_len)?;
    file.write_all(&framed[..4])?;
    file.write_u32::<LittleEndian>(next_leaf)?;
    file.write_all(&framed[4..])?;
    Ok(())
}

fn write_string(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    buf.write_u32::<LittleEndian>(s.len() as u32)?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn read_string(reader: &mut impl Read) -> Result<String> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes)
        .map_err(|_| DslError::InvalidFormat("non-UTF-8 string in B-tree node".to_string()))
}

/// Read-only view of a built tree. Queries take the index file explicitly;
/// the caller holds the per-dictionary index lock around each call.
#[derive(Debug, Clone, Copy)]
pub struct BtreeIndex {
    info: IndexInfo,
}

impl BtreeIndex {
    pub fn new(info: IndexInfo) -> BtreeIndex {
        BtreeIndex { info }
    }

    pub fn is_present(&self) -> bool {
        self.info.root_offset != 0 || self.info.btree_max_elements != 0
    }

    /// Exact lookup of a headword. `ignore_diacritics` widens the match to
    /// the diacritic-stripped form; otherwise links whose stored word
    /// differs in more than case are filtered out.
    pub fn find_articles(
        &self,
        file: &mut File,
        word: &str,
        ignore_diacritics: bool,
    ) -> Result<Vec<WordArticleLink>> {
        if !self.is_present() {
            return Ok(Vec::new());
        }
        let requested = folding::trim_whitespace(word);
        let key = folding::fold_key(requested);

        let mut offset = self.info.root_offset;
        loop {
            match read_node(file, offset)? {
                NodeData::Inner { children } => {
                    offset = descend(&children, &key);
                }
                NodeData::Leaf { entries, .. } => {
                    let links = match entries.binary_search_by(|(k, _)| k.as_str().cmp(key.as_str())) {
                        Ok(pos) => entries[pos].1.clone(),
                        Err(_) => Vec::new(),
                    };
                    let requested_cased = folding::apply_simple_case_only(requested);
                    return Ok(links
                        .into_iter()
                        .filter(|link| {
                            ignore_diacritics
                                || folding::apply_simple_case_only(&link.word) == requested_cased
                        })
                        .collect());
                }
            }
        }
    }

    /// Collect up to `limit` links whose folded key starts with the folded
    /// `prefix`, in key order. Used by the search UI.
    pub fn prefix_matches(
        &self,
        file: &mut File,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<WordArticleLink>> {
        if !self.is_present() || limit == 0 {
            return Ok(Vec::new());
        }
        let key = folding::fold_key(folding::trim_whitespace(prefix));

        let mut offset = self.info.root_offset;
        let mut out = Vec::new();
        loop {
            match read_node(file, offset)? {
                NodeData::Inner { children } => {
                    offset = descend(&children, &key);
                }
                NodeData::Leaf { entries, next_leaf } => {
                    let start = entries
                        .binary_search_by(|(k, _)| k.as_str().cmp(key.as_str()))
                        .unwrap_or_else(|pos| pos);
                    for (k, links) in &entries[start..] {
                        if !k.starts_with(&key) {
                            return Ok(out);
                        }
                        for link in links {
                            out.push(link.clone());
                            if out.len() >= limit {
                                return Ok(out);
                            }
                        }
                    }
                    if next_leaf == 0 {
                        return Ok(out);
                    }
                    // Continue in the chained leaf.
                    match read_node(file, next_leaf)? {
                        NodeData::Leaf { .. } => offset = next_leaf,
                        NodeData::Inner { .. } => {
                            return Err(DslError::InvalidFormat(
                                "leaf chain points at an inner node".to_string(),
                            ))
                        }
                    }
                }
            }
        }
    }
}

/// Pick the child subtree that may contain `key`: the last fence not
/// greater than the key, or the first child when the key precedes all
/// fences.
fn descend(children: &[(String, u32)], key: &str) -> u32 {
    let pos = children
        .partition_point(|(fence, _)| fence.as_str() <= key)
        .saturating_sub(1);
    children[pos].1
}

fn read_node(file: &mut File, offset: u32) -> Result<NodeData> {
    file.seek(SeekFrom::Start(offset as u64))?;
    let comp_len = file.read_u32::<LittleEndian>()? as usize;
    let raw_len = file.read_u32::<LittleEndian>()? as usize;
    let next_leaf = file.read_u32::<LittleEndian>()?;
    let mut comp = vec![0u8; comp_len];
    file.read_exact(&mut comp)?;

    let mut raw = Vec::with_capacity(raw_len);
    ZlibDecoder::new(&comp[..])
        .read_to_end(&mut raw)
        .map_err(|e| DslError::Decompress(format!("B-tree node inflate: {}", e)))?;
    if raw.len() != raw_len {
        return Err(DslError::InvalidFormat(format!(
            "B-tree node size mismatch: expected {}, got {}",
            raw_len,
            raw.len()
        )));
    }

    let mut reader = &raw[..];
    let is_leaf = reader.read_u8()? == 1;
    let count = reader.read_u32::<LittleEndian>()? as usize;

    if is_leaf {
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let key = read_string(&mut reader)?;
            let link_count = reader.read_u32::<LittleEndian>()? as usize;
            let mut links = Vec::with_capacity(link_count);
            for _ in 0..link_count {
                let word = read_string(&mut reader)?;
                let article_offset = reader.read_u32::<LittleEndian>()?;
                links.push(WordArticleLink {
                    word,
                    article_offset,
                });
            }
            entries.push((key, links));
        }
        Ok(NodeData::Leaf { entries, next_leaf })
    } else {
        let mut children = Vec::with_capacity(count);
        for _ in 0..count {
            let key = read_string(&mut reader)?;
            let child = reader.read_u32::<LittleEndian>()?;
            children.push((key, child));
        }
        Ok(NodeData::Inner { children })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;

    fn build_in_temp(words: &IndexedWords) -> (tempfile::TempDir, std::path::PathBuf, IndexInfo) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx");
        let mut file = File::create(&path).unwrap();
        let info = build_index(words, &mut file).unwrap();
        (dir, path, info)
    }

    fn rw(path: &std::path::Path) -> File {
        OpenOptions::new().read(true).open(path).unwrap()
    }

    #[test]
    fn exact_lookup() {
        let mut words = IndexedWords::new();
        words.add_word("Cat", 100, 256);
        words.add_word("dog", 200, 256);
        words.add_word("dogs", 300, 256);

        let (_dir, path, info) = build_in_temp(&words);
        let index = BtreeIndex::new(info);
        let mut file = rw(&path);

        let cat = index.find_articles(&mut file, "cat", false).unwrap();
        assert_eq!(cat.len(), 1);
        assert_eq!(cat[0].word, "Cat");
        assert_eq!(cat[0].article_offset, 100);

        assert!(index.find_articles(&mut file, "bird", false).unwrap().is_empty());
    }

    #[test]
    fn multiplicity_is_preserved() {
        let mut words = IndexedWords::new();
        words.add_word("bank", 1, 256);
        words.add_word("bank", 2, 256);

        let (_dir, path, info) = build_in_temp(&words);
        let mut file = rw(&path);
        let links = BtreeIndex::new(info)
            .find_articles(&mut file, "bank", false)
            .unwrap();
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn diacritic_insensitive_lookup() {
        let mut words = IndexedWords::new();
        words.add_word("café", 5, 256);

        let (_dir, path, info) = build_in_temp(&words);
        let index = BtreeIndex::new(info);
        let mut file = rw(&path);

        assert!(index.find_articles(&mut file, "cafe", false).unwrap().is_empty());
        let hits = index.find_articles(&mut file, "cafe", true).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].word, "café");
    }

    #[test]
    fn over_long_words_are_dropped() {
        let mut words = IndexedWords::new();
        let long: String = std::iter::repeat('x').take(300).collect();
        words.add_word(&long, 1, 256);
        words.add_word("short", 2, 256);
        assert_eq!(words.key_count(), 1);
    }

    #[test]
    fn prefix_scan_walks_leaves() {
        let mut words = IndexedWords::new();
        // Enough keys to span several leaves (max_elements floor is 16).
        for i in 0..120 {
            words.add_word(&format!("prefix{:03}", i), i, 256);
        }
        words.add_word("other", 999, 256);

        let (_dir, path, info) = build_in_temp(&words);
        let index = BtreeIndex::new(info);
        let mut file = rw(&path);

        let all = index.prefix_matches(&mut file, "prefix", 1000).unwrap();
        assert_eq!(all.len(), 120);
        let capped = index.prefix_matches(&mut file, "prefix", 10).unwrap();
        assert_eq!(capped.len(), 10);
        let none = index.prefix_matches(&mut file, "zzz", 10).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn empty_index_finds_nothing() {
        let words = IndexedWords::new();
        let (_dir, path, info) = build_in_temp(&words);
        let mut file = rw(&path);
        let hits = BtreeIndex::new(info)
            .find_articles(&mut file, "anything", false)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn absent_index_is_inert() {
        let index = BtreeIndex::new(IndexInfo::default());
        assert!(!index.is_present());
    }
}
