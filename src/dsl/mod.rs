//! DSL dictionary engine.
//!
//! A [`DslDictionary`] opens a previously built index read-only, performs
//! a deferred initialization on first use (header regions, abbreviation
//! table, decompressor, resource archive) and then serves lookup,
//! rendering and resource requests until dropped. Index building lives in
//! [`builder`]; [`make_dictionaries`] ties discovery, rebuild checks and
//! opening together.

pub mod btree;
pub mod builder;
pub mod chunked;
pub mod dictzip;
pub mod dom;
pub mod encoding;
pub mod error;
pub mod filetype;
pub mod folding;
pub mod html;
pub mod imgsize;
pub mod indexed_zip;
pub mod loader;
pub mod markup;
pub mod models;
pub mod scanner;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, info, warn};
use regex::Regex;

use self::btree::{BtreeIndex, IndexInfo, WordArticleLink};
use self::chunked::ChunkReader;
use self::dictzip::DzReader;
use self::error::{DslError, Result};
use self::html::{HtmlRenderer, ResourceAccess};
use self::indexed_zip::IndexedZip;
use self::loader::LoadedArticle;
use self::models::{
    DslConfig, DslEncoding, IdxHeader, CURRENT_FORMAT_VERSION, CURRENT_ZIP_SUPPORT_VERSION,
    SIGNATURE,
};

/// Cancellation flag shared between a caller and an in-flight request.
/// Sampled before and after every I/O step; a cancelled request finishes
/// with no data and no error.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> CancelFlag {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// The source files making up one dictionary.
#[derive(Debug, Clone)]
pub struct DictionaryFiles {
    pub main: PathBuf,
    pub abrv: Option<PathBuf>,
    pub zip: Option<PathBuf>,
}

/// Everything opened by the deferred initialization. The three mutexes
/// guard the three independently lockable resources; an operation holds
/// at most one of them at a time.
struct DictState {
    idx: Mutex<File>,
    dz: Mutex<DzReader>,
    resource_zip: Mutex<Option<IndexedZip>>,
    abrv: HashMap<String, String>,
    index: BtreeIndex,
    zip_index: BtreeIndex,
}

impl ResourceAccess for DictState {
    fn zip_has_file(&self, name: &str) -> bool {
        if !self.zip_index.is_present() {
            return false;
        }
        let mut idx = match self.idx.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        self.zip_index
            .find_articles(&mut idx, name, false)
            .map(|links| !links.is_empty())
            .unwrap_or(false)
    }

    fn zip_load_file(&self, name: &str) -> Option<Vec<u8>> {
        let links = {
            let mut idx = self.idx.lock().ok()?;
            self.zip_index.find_articles(&mut idx, name, false).ok()?
        };
        let link = links.first()?;
        let mut zip_guard = self.resource_zip.lock().ok()?;
        let zip = zip_guard.as_mut()?;
        zip.load_file_at(link.article_offset).ok()
    }
}

/// A read-only view of one built dictionary.
pub struct DslDictionary {
    id: String,
    index_path: PathBuf,
    files: DictionaryFiles,
    config: DslConfig,

    header: IdxHeader,
    encoding: DslEncoding,
    name: String,
    preferred_sound_dictionary: String,
    resource_dir1: PathBuf,
    resource_dir2: PathBuf,

    state: OnceLock<std::result::Result<DictState, String>>,
}

impl DslDictionary {
    /// Open an index file. The header and dictionary name are read
    /// eagerly (a bad or outdated index fails here); everything else
    /// waits for the first request.
    pub fn open(
        index_path: &Path,
        files: DictionaryFiles,
        config: DslConfig,
    ) -> Result<DslDictionary> {
        let mut idx = File::open(index_path)?;
        let header = IdxHeader::read(&mut idx).map_err(|_| {
            DslError::IndexOldOrBad("index header is truncated".to_string())
        })?;
        if header.signature != SIGNATURE {
            return Err(DslError::IndexOldOrBad("bad signature".to_string()));
        }
        if header.format_version != CURRENT_FORMAT_VERSION {
            return Err(DslError::IndexOldOrBad(format!(
                "format version {} (current is {})",
                header.format_version, CURRENT_FORMAT_VERSION
            )));
        }
        let encoding = DslEncoding::try_from(header.dsl_encoding)?;

        let name = read_prefixed_string(&mut idx)?;
        let preferred_sound_dictionary = if header.has_sound_dictionary_name != 0 {
            read_prefixed_string(&mut idx)?
        } else {
            String::new()
        };

        let (resource_dir1, resource_dir2) = html::resource_dirs(&files.main);

        Ok(DslDictionary {
            id: make_dictionary_id(&files),
            index_path: index_path.to_path_buf(),
            files,
            config,
            header,
            encoding,
            name,
            preferred_sound_dictionary,
            resource_dir1,
            resource_dir2,
            state: OnceLock::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn article_count(&self) -> u32 {
        self.header.article_count
    }

    pub fn word_count(&self) -> u32 {
        self.header.word_count
    }

    pub fn lang_from(&self) -> u32 {
        self.header.lang_from
    }

    pub fn lang_to(&self) -> u32 {
        self.header.lang_to
    }

    pub fn main_file(&self) -> &Path {
        &self.files.main
    }

    /// Run the deferred initialization once; afterwards every caller
    /// observes the same outcome. A failed init is captured as a string
    /// and returned as `InitFailed` forever after.
    fn ensure_init(&self) -> Result<&DictState> {
        let state = self
            .state
            .get_or_init(|| self.do_deferred_init().map_err(|e| e.to_string()));
        match state {
            Ok(state) => Ok(state),
            Err(message) => Err(DslError::InitFailed(message.clone())),
        }
    }

    fn do_deferred_init(&self) -> Result<DictState> {
        debug!("Deferred init of dictionary {}", self.name);
        let mut idx = File::open(&self.index_path)?;

        // Open the .dsl file.
        let dz = DzReader::open(&self.files.main)?;

        // Read the abbreviation table, if any.
        let mut abrv = HashMap::new();
        if self.header.has_abrv != 0 {
            let block = ChunkReader::get_block(&mut idx, self.header.abrv_address)?;
            let mut reader = &block[..];
            let total = reader.read_u32::<LittleEndian>()?;
            debug!("Loading {} abbreviations", total);
            for _ in 0..total {
                let key = read_sized(&mut reader)?;
                let value = read_sized(&mut reader)?;
                abrv.insert(key, value);
            }
        }

        let index = BtreeIndex::new(IndexInfo {
            btree_max_elements: self.header.index_btree_max_elements,
            root_offset: self.header.index_root_offset,
        });
        let zip_index = BtreeIndex::new(IndexInfo {
            btree_max_elements: self.header.zip_index_btree_max_elements,
            root_offset: self.header.zip_index_root_offset,
        });

        // Open the resource archive when the index says one took part in
        // the build.
        let resource_zip = if self.header.has_zip_file != 0 && zip_index.is_present() {
            match &self.files.zip {
                Some(zip_path) => Some(IndexedZip::open(zip_path)?),
                None => None,
            }
        } else {
            None
        };

        Ok(DictState {
            idx: Mutex::new(idx),
            dz: Mutex::new(dz),
            resource_zip: Mutex::new(resource_zip),
            abrv,
            index,
            zip_index,
        })
    }

    /// Exact headword lookup in the article B-tree.
    pub fn find_articles(
        &self,
        word: &str,
        ignore_diacritics: bool,
    ) -> Result<Vec<WordArticleLink>> {
        let state = self.ensure_init()?;
        let mut idx = state.idx.lock()?;
        state.index.find_articles(&mut idx, word, ignore_diacritics)
    }

    /// Prefix search over the article B-tree, for the search UI.
    pub fn get_search_results(&self, prefix: &str, limit: usize) -> Result<Vec<WordArticleLink>> {
        let state = self.ensure_init()?;
        let mut idx = state.idx.lock()?;
        state.index.prefix_matches(&mut idx, prefix, limit)
    }

    /// Load and render the articles for `word` (plus `alts`) as HTML.
    /// Returns `Ok(None)` when the request was cancelled; an empty string
    /// means nothing matched.
    pub fn get_article(
        &self,
        word: &str,
        alts: &[String],
        ignore_diacritics: bool,
        cancel: &CancelFlag,
    ) -> Result<Option<String>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let state = self.ensure_init()?;

        let mut chain = {
            let mut idx = state.idx.lock()?;
            let mut chain = state.index.find_articles(&mut idx, word, ignore_diacritics)?;
            for alt in alts {
                chain.extend(state.index.find_articles(&mut idx, alt, ignore_diacritics)?);
            }
            chain
        };
        // Keep chain order deterministic across alt duplicates.
        chain.dedup_by(|a, b| a.article_offset == b.article_offset && a.word == b.word);

        // Some synonyms make the same article appear several times; an
        // article is identified by its block and matched headword ordinal.
        let mut articles_included: HashSet<(u32, u32)> = HashSet::new();

        let word_case_folded = folding::apply_simple_case_only(folding::trim_whitespace(word));

        let sound_dictionary = if self.header.has_sound_dictionary_name != 0 {
            Some(self.preferred_sound_dictionary.as_str())
        } else {
            None
        };
        let mut renderer = HtmlRenderer::new(
            &self.id,
            &self.name,
            &state.abrv,
            self.resource_dir1.clone(),
            self.resource_dir2.clone(),
            containing_folder(&self.files.main),
            state,
            self.config.max_picture_width,
            sound_dictionary,
        );

        let mut result = String::new();
        for link in chain {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            let loaded =
                match self.load_article(state, link.article_offset, &word_case_folded, ignore_diacritics) {
                    Ok(loaded) => loaded,
                    Err(e) => {
                        warn!("Failed loading article from {}: {}", self.name, e);
                        result.push_str("<span class=\"dsl_article\">Article loading error</span>");
                        continue;
                    }
                };

            if !articles_included.insert((link.article_offset, loaded.headword_index)) {
                continue; // We already have this article in the body.
            }

            renderer.next_article();

            let mut displayed = loaded.displayed_headword.clone();
            if displayed.is_empty() || displayed.starts_with(|c| markup::is_dsl_ws(c)) {
                displayed = word.to_string(); // Embedded-card special case.
            }

            result.push_str("<div class=\"dsl_article\">");
            result.push_str("<div class=\"dsl_headwords\"");
            if is_rtl(self.header.lang_from) {
                result.push_str(" dir=\"rtl\"");
            }
            result.push_str("><p>");
            if displayed == "<" {
                // The renderer can't pass a bare "<" through untouched.
                result.push('<');
            } else {
                result.push_str(&renderer.dsl_to_html(&displayed, &displayed));
            }
            result.push_str("</p></div>");

            let body = markup::expand_tildes(&loaded.body, &loaded.tilde_value);

            result.push_str("<div class=\"dsl_definition\"");
            if is_rtl(self.header.lang_to) {
                result.push_str(" dir=\"rtl\"");
            }
            result.push('>');
            result.push_str(&renderer.dsl_to_html(&body, &displayed));
            result.push_str("</div></div>");
        }

        if cancel.is_cancelled() {
            return Ok(None);
        }
        Ok(Some(result))
    }

    /// Load a resource by name, trying the two resource directories, the
    /// containing folder and finally the archive. `Ok(None)` on
    /// cancellation.
    pub fn get_resource(&self, name: &str, cancel: &CancelFlag) -> Result<Option<Vec<u8>>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let state = self.ensure_init()?;

        for dir in [
            &self.resource_dir1,
            &self.resource_dir2,
            &containing_folder(&self.files.main),
        ] {
            if let Ok(data) = std::fs::read(dir.join(name)) {
                return Ok(Some(data));
            }
            if cancel.is_cancelled() {
                return Ok(None);
            }
        }

        if let Some(data) = state.zip_load_file(name) {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            return Ok(Some(data));
        }

        Err(DslError::ResourceMissing(name.to_string()))
    }

    /// Headword and tag-stripped plain text of an article, for the
    /// external full-text index builder.
    pub fn get_article_text(&self, block_id: u32) -> Result<(String, String)> {
        let state = self.ensure_init()?;
        let article_data = match self.read_article_data(state, block_id) {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed reading article text from {}: {}", self.name, e);
                return Ok((String::new(), String::new()));
            }
        };

        let loaded = loader::resolve_article(&article_data, "", false);
        let headword = markup::normalize_headword(&markup::unescape_dsl(&loaded.displayed_headword));
        let body = markup::expand_tildes(&loaded.body, &loaded.tilde_value);
        Ok((headword, strip_markup_for_text(&body)))
    }

    /// Resolve an article block against a requested (case-folded)
    /// headword. Read failures yield a placeholder body rather than an
    /// error, so one bad article cannot poison the dictionary.
    fn load_article(
        &self,
        state: &DictState,
        block_id: u32,
        requested_folded: &str,
        ignore_diacritics: bool,
    ) -> Result<LoadedArticle> {
        let article_data = match self.read_article_data(state, block_id) {
            Ok(data) => data,
            Err(e) => format!("\n\r\t{}", e),
        };
        Ok(loader::resolve_article(
            &article_data,
            requested_folded,
            ignore_diacritics,
        ))
    }

    fn read_article_data(&self, state: &DictState, block_id: u32) -> Result<String> {
        let props = {
            let mut idx = state.idx.lock()?;
            ChunkReader::get_block(&mut idx, block_id)?
        };
        if props.len() < 8 {
            return Err(DslError::InvalidFormat(format!(
                "short article descriptor in block {}",
                block_id
            )));
        }
        let mut reader = &props[..];
        let article_offset = reader.read_u32::<LittleEndian>()?;
        let article_size = reader.read_u32::<LittleEndian>()?;

        let bytes = {
            let mut dz = state.dz.lock()?;
            dz.read(article_offset as u64, article_size as u64)?
        };

        let mut text = encoding::decode(&bytes, self.encoding)?;
        let mut in_comment = false;
        text = markup::strip_comments(&text, &mut in_comment);
        Ok(text)
    }
}

fn read_prefixed_string(file: &mut File) -> Result<String> {
    let len = file.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    file.read_exact(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_sized(reader: &mut &[u8]) -> Result<String> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    if reader.len() < len {
        return Err(DslError::InvalidFormat(
            "truncated abbreviation block".to_string(),
        ));
    }
    let (head, tail) = reader.split_at(len);
    let out = String::from_utf8_lossy(head).into_owned();
    *reader = tail;
    Ok(out)
}

fn containing_folder(main_file: &Path) -> PathBuf {
    main_file
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Stable hex id derived from the dictionary's file names (FNV-1a).
fn make_dictionary_id(files: &DictionaryFiles) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for path in [Some(&files.main), files.abrv.as_ref(), files.zip.as_ref()]
        .into_iter()
        .flatten()
    {
        for byte in path.to_string_lossy().as_bytes() {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }
    format!("{:016x}", hash)
}

fn is_rtl(lang: u32) -> bool {
    const RTL: [&[u8; 2]; 5] = [b"ar", b"he", b"fa", b"ur", b"yi"];
    let code = [(lang & 0xff) as u8, ((lang >> 8) & 0xff) as u8];
    RTL.iter().any(|c| **c == code)
}

// --- Plain-text extraction -------------------------------------------------

static STRIP_REGION_RES: OnceLock<Vec<Regex>> = OnceLock::new();
static STRIP_TAG_RE: OnceLock<Regex> = OnceLock::new();
static STRIP_LANG_RE: OnceLock<Regex> = OnceLock::new();
static STRIP_OTHER_RE: OnceLock<Regex> = OnceLock::new();

/// Reduce a DSL body to plain text for full-text indexing: media and
/// transcription regions go away entirely, structural tags become spaces,
/// anything else bracketed is dropped.
fn strip_markup_for_text(body: &str) -> String {
    let regions = STRIP_REGION_RES.get_or_init(|| {
        ["s", "url", "!trs", "video", "preview"]
            .iter()
            .map(|tag| {
                Regex::new(&format!(
                    r"(?si)\[{0}\].*?\[/{0}\]",
                    regex::escape(tag)
                ))
                .expect("invalid region pattern")
            })
            .collect()
    });
    let tag_re = STRIP_TAG_RE.get_or_init(|| {
        Regex::new(r"(?i)\[(|/)(p|trn|ex|com|\*|t|br|m[0-9]?)\]").expect("invalid tag pattern")
    });
    let lang_re = STRIP_LANG_RE.get_or_init(|| {
        Regex::new(r"(?i)\[(|/)lang(\s[^\]]*)?\]").expect("invalid lang pattern")
    });
    let other_re = STRIP_OTHER_RE
        .get_or_init(|| Regex::new(r"\[[^\\\[\]]+\]").expect("invalid bracket pattern"));

    let mut text = body.to_string();
    for re in regions {
        text = re.replace_all(&text, " ").into_owned();
    }
    text = tag_re.replace_all(&text, " ").into_owned();
    text = lang_re.replace_all(&text, " ").into_owned();
    text = other_re.replace_all(&text, "").into_owned();
    text = text.replace("<<", "").replace(">>", "");

    if find_unescaped_at_sign(&text) {
        // Articles with embedded cards keep their structure readable.
        dom::ArticleDom::parse(&text).root.render_as_text()
    } else {
        markup::unescape_dsl(&text)
    }
}

fn find_unescaped_at_sign(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes
        .iter()
        .enumerate()
        .any(|(i, b)| *b == b'@' && (i == 0 || bytes[i - 1] != b'\\'))
}

// --- Discovery -------------------------------------------------------------

/// Case-insensitive sibling lookup: returns the real path of `name` in
/// `dir` regardless of the case it is stored with.
fn find_sibling(dir: &Path, name: &str) -> Option<PathBuf> {
    let wanted = name.to_lowercase();
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().to_lowercase() == wanted {
            return Some(entry.path());
        }
    }
    None
}

/// Split a main-file name into its stem (without `.dsl` / `.dsl.dz`).
fn dsl_stem(name: &str) -> Option<&str> {
    let lower = name.to_lowercase();
    if lower.ends_with(".dsl.dz") {
        Some(&name[..name.len() - 7])
    } else if lower.ends_with(".dsl") {
        Some(&name[..name.len() - 4])
    } else {
        None
    }
}

/// Resolve the companion files for one candidate main file. `None` when
/// the candidate is not a DSL dictionary at all, or is an `_abrv`
/// companion of another one.
pub fn collect_dictionary_files(main: &Path) -> Option<DictionaryFiles> {
    let file_name = main.file_name()?.to_string_lossy().into_owned();
    let stem = dsl_stem(&file_name)?;

    // Names ending in _abrv.dsl* belong to another dictionary.
    if stem.to_lowercase().ends_with("_abrv") {
        return None;
    }

    let dir = main.parent().unwrap_or_else(|| Path::new("."));
    let abrv = find_sibling(dir, &format!("{}_abrv.dsl", stem))
        .or_else(|| find_sibling(dir, &format!("{}_abrv.dsl.dz", stem)));
    let zip = find_sibling(dir, &format!("{}.dsl.files.zip", stem))
        .or_else(|| find_sibling(dir, &format!("{}.dsl.dz.files.zip", stem)));

    Some(DictionaryFiles {
        main: main.to_path_buf(),
        abrv,
        zip,
    })
}

/// Whether `index_path` must be rebuilt for `files`: missing, older than
/// any source, bad signature, wrong format version, or a zip-presence /
/// zip-schema mismatch.
pub fn needs_rebuild(index_path: &Path, files: &DictionaryFiles) -> bool {
    let index_meta = match std::fs::metadata(index_path) {
        Ok(meta) => meta,
        Err(_) => return true,
    };
    let index_mtime = index_meta.modified().ok();

    for source in [Some(&files.main), files.abrv.as_ref(), files.zip.as_ref()]
        .into_iter()
        .flatten()
    {
        let newer = std::fs::metadata(source)
            .and_then(|m| m.modified())
            .ok()
            .zip(index_mtime)
            .map(|(source_time, index_time)| source_time > index_time)
            .unwrap_or(true);
        if newer {
            return true;
        }
    }

    index_is_old_or_bad(index_path, files.zip.is_some())
}

fn index_is_old_or_bad(index_path: &Path, has_zip: bool) -> bool {
    let mut file = match File::open(index_path) {
        Ok(file) => file,
        Err(_) => return true,
    };
    match IdxHeader::read(&mut file) {
        Ok(header) => {
            header.signature != SIGNATURE
                || header.format_version != CURRENT_FORMAT_VERSION
                || (header.has_zip_file != 0) != has_zip
                || (has_zip && header.zip_support_version != CURRENT_ZIP_SUPPORT_VERSION)
        }
        Err(_) => true,
    }
}

/// Discover, (re)index and open every DSL dictionary among `file_names`.
/// Index files are kept in `indices_dir`, named by dictionary id.
/// Individual failures are logged and skip only the affected dictionary.
pub fn make_dictionaries(
    file_names: &[PathBuf],
    indices_dir: &Path,
    config: &DslConfig,
) -> Result<Vec<DslDictionary>> {
    std::fs::create_dir_all(indices_dir)?;
    let mut dictionaries = Vec::new();

    for file_name in file_names {
        let files = match collect_dictionary_files(file_name) {
            Some(files) => files,
            None => continue,
        };

        let id = make_dictionary_id(&files);
        let index_path = indices_dir.join(&id);

        if needs_rebuild(&index_path, &files) {
            info!("Rebuilding index for {}", files.main.display());
            match builder::build_index_file(
                &files.main,
                files.abrv.as_deref(),
                files.zip.as_deref(),
                &index_path,
                config,
            ) {
                Ok(Some(_)) => {}
                Ok(None) => continue, // An abbreviations pseudo-dictionary.
                Err(e) => {
                    warn!("DSL dictionary indexing failed: {}: {}", file_name.display(), e);
                    continue;
                }
            }
        }

        match DslDictionary::open(&index_path, files, *config) {
            Ok(dictionary) => dictionaries.push(dictionary),
            Err(e) => warn!("Cannot open dictionary {}: {}", file_name.display(), e),
        }
    }

    Ok(dictionaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_id_is_stable() {
        let files = DictionaryFiles {
            main: PathBuf::from("/dicts/test.dsl"),
            abrv: None,
            zip: None,
        };
        assert_eq!(make_dictionary_id(&files), make_dictionary_id(&files));
        let other = DictionaryFiles {
            main: PathBuf::from("/dicts/other.dsl"),
            abrv: None,
            zip: None,
        };
        assert_ne!(make_dictionary_id(&files), make_dictionary_id(&other));
    }

    #[test]
    fn stems_and_abrv_exclusion() {
        assert_eq!(dsl_stem("big.dsl"), Some("big"));
        assert_eq!(dsl_stem("big.DSL.dz"), Some("big"));
        assert_eq!(dsl_stem("big.txt"), None);

        assert!(collect_dictionary_files(Path::new("/x/dict_abrv.dsl")).is_none());
        assert!(collect_dictionary_files(Path::new("/x/Dict_ABRV.DSL.dz")).is_none());
    }

    #[test]
    fn rtl_detection() {
        assert!(is_rtl(('a' as u32) | ('r' as u32) << 8));
        assert!(!is_rtl(('e' as u32) | ('n' as u32) << 8));
        assert!(!is_rtl(0));
    }

    #[test]
    fn markup_stripping_for_fts() {
        let text = strip_markup_for_text(
            "[m1][trn]to [i]run[/i][/trn][/m1] [s]run.wav[/s] <<fast>>",
        );
        assert!(text.contains("to run"));
        assert!(text.contains("fast"));
        assert!(!text.contains("run.wav"));
        assert!(!text.contains('['));
        assert!(!text.contains("<<"));
    }
}
