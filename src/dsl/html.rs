//! DOM → HTML conversion.
//!
//! A deterministic walk emitting `dsl_*`-classed elements. The renderer is
//! total: unfamiliar markup becomes a visible `dsl_unknown` span rather
//! than an error. Media references resolve against the two resource
//! directories, the containing folder and the resource archive, in that
//! order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::warn;

use super::dom::{ArticleDom, Node, TagNode};
use super::filetype;
use super::imgsize;
use super::markup;
use super::scanner;

/// Archive probing capability handed to the renderer, so it stays
/// decoupled from the dictionary's locking.
pub trait ResourceAccess {
    /// Whether the resource archive (if any) contains `name`.
    fn zip_has_file(&self, name: &str) -> bool;
    /// Load `name` from the archive.
    fn zip_load_file(&self, name: &str) -> Option<Vec<u8>>;
}

/// A no-archive implementation for callers without a companion zip.
pub struct NoArchive;

impl ResourceAccess for NoArchive {
    fn zip_has_file(&self, _name: &str) -> bool {
        false
    }
    fn zip_load_file(&self, _name: &str) -> Option<Vec<u8>> {
        None
    }
}

/// HTML-escape text content and attribute values.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Percent-encode a URL path segment, keeping unreserved characters and
/// path separators.
pub fn encode_url_path(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                out.push(*byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

pub struct HtmlRenderer<'a> {
    dict_id: &'a str,
    dict_name: &'a str,
    abrv: &'a HashMap<String, String>,
    resource_dir1: PathBuf,
    resource_dir2: PathBuf,
    containing_folder: PathBuf,
    resources: &'a dyn ResourceAccess,
    max_picture_width: u32,
    /// Preferred sound dictionary, appended as a fragment to `search` URLs.
    sound_dictionary: Option<&'a str>,

    article_nom: u32,
    optional_part_nom: u32,
    current_headword: String,
}

impl<'a> HtmlRenderer<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dict_id: &'a str,
        dict_name: &'a str,
        abrv: &'a HashMap<String, String>,
        resource_dir1: PathBuf,
        resource_dir2: PathBuf,
        containing_folder: PathBuf,
        resources: &'a dyn ResourceAccess,
        max_picture_width: u32,
        sound_dictionary: Option<&'a str>,
    ) -> HtmlRenderer<'a> {
        HtmlRenderer {
            dict_id,
            dict_name,
            abrv,
            resource_dir1,
            resource_dir2,
            containing_folder,
            resources,
            max_picture_width,
            sound_dictionary,
            article_nom: 0,
            optional_part_nom: 0,
            current_headword: String::new(),
        }
    }

    /// Begin a new article: bump the article ordinal and reset the
    /// optional-part counter used for `dsl_opt` ids.
    pub fn next_article(&mut self) {
        self.article_nom += 1;
        self.optional_part_nom = 0;
    }

    /// Whether the article rendered since `next_article` contained any
    /// collapsible `[*]` zones.
    pub fn has_hidden_zones(&self) -> bool {
        self.optional_part_nom != 0
    }

    /// Convert a DSL fragment to HTML. `headword` is used for diagnostics.
    pub fn dsl_to_html(&mut self, text: &str, headword: &str) -> String {
        self.current_headword = headword.to_string();
        let dom = ArticleDom::parse(text);
        self.process_children(&dom.root)
    }

    fn process_children(&mut self, node: &TagNode) -> String {
        let mut result = String::new();
        for child in &node.children {
            result.push_str(&self.node_to_html(child));
        }
        result
    }

    fn node_to_html(&mut self, node: &Node) -> String {
        let tag = match node {
            Node::Text(text) => {
                // Strip '\r'; every '\n' becomes a paragraph break.
                return escape(text).replace('\r', "").replace('\n', "<p></p>");
            }
            Node::Tag(tag) => tag,
        };

        match tag.name.as_str() {
            "b" => format!("<b class=\"dsl_b\">{}</b>", self.process_children(tag)),
            "i" => format!("<i class=\"dsl_i\">{}</i>", self.process_children(tag)),
            "u" => {
                let inner = self.process_children(tag);
                // In "foo[u] bar[/u]" the leading space would get
                // underlined; move it out of the span.
                let lead = if inner.starts_with(|c| markup::is_dsl_ws(c)) {
                    " "
                } else {
                    ""
                };
                format!("{}<span class=\"dsl_u\">{}</span>", lead, inner)
            }
            "c" => {
                if tag.attrs.is_empty() {
                    format!(
                        "<span class=\"c_default_color\">{}</span>",
                        self.process_children(tag)
                    )
                } else {
                    format!(
                        "<font color=\"{}\">{}</font>",
                        escape(&tag.attrs),
                        self.process_children(tag)
                    )
                }
            }
            "*" => {
                let id = format!(
                    "O{}_{}_opt_{}",
                    &self.dict_id[..self.dict_id.len().min(7)],
                    self.article_nom,
                    self.optional_part_nom
                );
                self.optional_part_nom += 1;
                format!(
                    "<span class=\"dsl_opt\" id=\"{}\">{}</span>",
                    id,
                    self.process_children(tag)
                )
            }
            "m" => format!("<div class=\"dsl_m\">{}</div>", self.process_children(tag)),
            name if name.len() == 2
                && name.starts_with('m')
                && name.as_bytes()[1].is_ascii_digit() =>
            {
                format!(
                    "<div class=\"dsl_{}\">{}</div>",
                    name,
                    self.process_children(tag)
                )
            }
            "trn" => format!("<span class=\"dsl_trn\">{}</span>", self.process_children(tag)),
            "ex" => format!("<span class=\"dsl_ex\">{}</span>", self.process_children(tag)),
            "com" => format!("<span class=\"dsl_com\">{}</span>", self.process_children(tag)),
            "t" => format!("<span class=\"dsl_t\">{}</span>", self.process_children(tag)),
            "!trs" => format!("<span class=\"dsl_trs\">{}</span>", self.process_children(tag)),
            "s" | "video" => self.media_to_html(tag),
            "url" => self.url_to_html(tag),
            "p" => {
                let key = tag.render_as_text();
                let mut open = String::from("<span class=\"dsl_p\"");
                if let Some(expansion) = self.abrv.get(&key) {
                    open.push_str(&format!(" title=\"{}\"", escape(expansion)));
                }
                format!("{}>{}</span>", open, self.process_children(tag))
            }
            "'" => {
                // Two variants, with and without the combining accent; the
                // stylesheet picks one.
                let data = self.process_children(tag);
                format!(
                    "<span class=\"dsl_stress\"><span class=\"dsl_stress_without_accent\">{}</span><span class=\"dsl_stress_with_accent\">{}\u{301}</span></span>",
                    data, data
                )
            }
            "lang" => {
                let mut open = String::from("<span class=\"dsl_lang\"");
                if let Some(code) = lang_attr_code(&tag.attrs) {
                    open.push_str(&format!(" lang=\"{}\"", code));
                }
                format!("{}>{}</span>", open, self.process_children(tag))
            }
            "ref" => self.ref_to_html(tag),
            "@" => {
                // An embedded-card header that was not indexed separately:
                // link to it by headword.
                let word = markup::normalize_headword(&tag.render_as_text());
                format!(
                    "<a class=\"dsl_ref\" href=\"gdlookup://localhost/{}\">{}</a>",
                    encode_url_path(&word),
                    self.process_children(tag)
                )
            }
            "sub" => format!("<sub>{}</sub>", self.process_children(tag)),
            "sup" => format!("<sup>{}</sup>", self.process_children(tag)),
            "br" => "<br />".to_string(),
            other => {
                warn!(
                    "Unknown tag [{}] with attributes {:?} in {}, article {:?}",
                    other, tag.attrs, self.dict_name, self.current_headword
                );
                let mut result = format!("<span class=\"dsl_unknown\">[{}", escape(other));
                if !tag.attrs.is_empty() {
                    result.push(' ');
                    result.push_str(&escape(&tag.attrs));
                }
                result.push(']');
                result.push_str(&self.process_children(tag));
                result.push_str("</span>");
                result
            }
        }
    }

    fn media_to_html(&mut self, tag: &TagNode) -> String {
        let filename = tag.render_as_text().trim().to_string();
        let encoded = encode_url_path(&filename);

        if filetype::is_name_of_sound(&filename) {
            // With the file present anywhere, reference this dictionary;
            // otherwise emit a global "search" URL.
            let search = !self.resource_exists(&filename);
            let host = if search { "search" } else { self.dict_id };
            let mut url = format!("gdau://{}/{}", host, encoded);
            if search {
                if let Some(sound_dict) = self.sound_dictionary {
                    url.push('#');
                    url.push_str(&encode_url_path(sound_dict));
                }
            }
            return format!(
                "<span class=\"dsl_s_wav\"><a href=\"{}\">{}</a></span>",
                url,
                self.process_children(tag)
            );
        }

        if filetype::is_name_of_picture(&filename) {
            let url = format!("bres://{}/{}", self.dict_id, encoded);
            let resize = self.max_picture_width > 0
                && !filetype::is_name_of_svg(&filename)
                && self
                    .load_resource(&filename)
                    .as_deref()
                    .and_then(imgsize::probe_dimensions)
                    .map(|(width, _)| width > self.max_picture_width)
                    .unwrap_or(false);

            if resize {
                let wrapper = format!("gdpicture://{}/{}", self.dict_id, encoded);
                return format!(
                    "<a href=\"{}\"><img src=\"{}\" alt=\"{}\" width=\"{}\"/></a>",
                    wrapper,
                    url,
                    escape(&filename),
                    self.max_picture_width
                );
            }
            return format!("<img src=\"{}\" alt=\"{}\"/>", url, escape(&filename));
        }

        if filetype::is_name_of_video(&filename) {
            let children = self.process_children(tag);
            return format!(
                "<a class=\"dsl_s dsl_video\" href=\"gdvideo://{}/{}\"><span class=\"img\"></span><span class=\"filename\">{}</span></a>",
                self.dict_id,
                encoded,
                children
            );
        }

        // Unknown file type, downgrade to a hyperlink.
        let children = self.process_children(tag);
        format!(
            "<a class=\"dsl_s\" href=\"bres://{}/{}\">{}</a>",
            self.dict_id,
            encoded,
            children
        )
    }

    fn url_to_html(&mut self, tag: &TagNode) -> String {
        let mut link = self.node_link(tag);
        if !link.contains("://") {
            link = format!("http://{}", link);
        }
        format!(
            "<a class=\"dsl_url\" href=\"{}\">{}</a>",
            link,
            self.process_children(tag)
        )
    }

    fn ref_to_html(&mut self, tag: &TagNode) -> String {
        let word = markup::normalize_headword(&markup::unescape_dsl(&self.node_link(tag)));
        let mut url = format!("gdlookup://localhost/{}", encode_url_path(&word));

        // Attributes of the form key=value become query parameters.
        let attrs = tag.attrs.replace('"', "");
        if let Some(eq) = attrs.find('=') {
            let (key, value) = attrs.split_at(eq);
            url.push_str(&format!(
                "?{}={}",
                encode_url_path(key.trim()),
                encode_url_path(value[1..].trim())
            ));
        }

        format!(
            "<a class=\"dsl_ref\" href=\"{}\">{}</a>",
            url,
            self.process_children(tag)
        )
    }

    /// Link target of a `ref`/`url` node: a `target="…"` attribute wins,
    /// the rendered text is the fallback.
    fn node_link(&self, tag: &TagNode) -> String {
        if let Some(pos) = tag.attrs.find("target=\"") {
            let rest = &tag.attrs[pos + 8..];
            if let Some(end) = rest.find('"') {
                return rest[..end].to_string();
            }
        }
        tag.render_as_text().trim().to_string()
    }

    fn resource_exists(&self, filename: &str) -> bool {
        self.resource_dir1.join(filename).is_file()
            || self.resource_dir2.join(filename).is_file()
            || self.containing_folder.join(filename).is_file()
            || self.resources.zip_has_file(filename)
    }

    /// Load resource bytes from the candidate directories, then the archive.
    fn load_resource(&self, filename: &str) -> Option<Vec<u8>> {
        for dir in [
            &self.resource_dir1,
            &self.resource_dir2,
            &self.containing_folder,
        ] {
            if let Ok(data) = std::fs::read(dir.join(filename)) {
                return Some(data);
            }
        }
        self.resources.zip_load_file(filename)
    }
}

/// Map a `[lang name="English"]` attribute to an ISO 639-1 code. Numeric
/// `id=` attributes refer to vendor language tables and are ignored.
fn lang_attr_code(attrs: &str) -> Option<String> {
    let pos = attrs.find("name=\"")?;
    let rest = &attrs[pos + 6..];
    let end = rest.find('"')?;
    let packed = scanner::language_code(&rest[..end]);
    if packed == 0 {
        return None;
    }
    Some(
        [
            (packed & 0xff) as u8 as char,
            ((packed >> 8) & 0xff) as u8 as char,
        ]
        .iter()
        .collect(),
    )
}

/// Resource candidate directories for a dictionary main file:
/// `<name>.files/` and `<stem>.files/` (the latter drops a `.dz` suffix).
pub fn resource_dirs(main_file: &Path) -> (PathBuf, PathBuf) {
    let name = main_file.to_string_lossy();
    let dir1 = PathBuf::from(format!("{}.files", name));
    let stem = name
        .strip_suffix(".dz")
        .or_else(|| name.strip_suffix(".DZ"))
        .unwrap_or(&name);
    let dir2 = PathBuf::from(format!("{}.files", stem));
    (dir1, dir2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer<'a>(abrv: &'a HashMap<String, String>) -> HtmlRenderer<'a> {
        HtmlRenderer::new(
            "0123456789abcdef",
            "Test Dictionary",
            abrv,
            PathBuf::from("/nonexistent/a.files"),
            PathBuf::from("/nonexistent/b.files"),
            PathBuf::from("/nonexistent"),
            &NoArchive,
            0,
            None,
        )
    }

    #[test]
    fn basic_styling_tags() {
        let abrv = HashMap::new();
        let mut r = renderer(&abrv);
        assert_eq!(
            r.dsl_to_html("The [i]cat[/i].", "cat"),
            "The <i class=\"dsl_i\">cat</i>."
        );
        assert_eq!(
            r.dsl_to_html("[b]x[/b]", ""),
            "<b class=\"dsl_b\">x</b>"
        );
        assert_eq!(
            r.dsl_to_html("[m1]y[/m1]", ""),
            "<div class=\"dsl_m1\">y</div>"
        );
    }

    #[test]
    fn text_nodes_are_escaped_and_paragraphed() {
        let abrv = HashMap::new();
        let mut r = renderer(&abrv);
        assert_eq!(r.dsl_to_html("a<b\nc\r\n", ""), "a&lt;b<p></p>c<p></p>");
    }

    #[test]
    fn color_tag_variants() {
        let abrv = HashMap::new();
        let mut r = renderer(&abrv);
        assert_eq!(
            r.dsl_to_html("[c]x[/c]", ""),
            "<span class=\"c_default_color\">x</span>"
        );
        assert_eq!(
            r.dsl_to_html("[c red]x[/c]", ""),
            "<font color=\"red\">x</font>"
        );
    }

    #[test]
    fn optional_zone_ids_count_up() {
        let abrv = HashMap::new();
        let mut r = renderer(&abrv);
        r.next_article();
        let html = r.dsl_to_html("[*]one[/*][*]two[/*]", "");
        assert!(html.contains("id=\"O0123456_1_opt_0\""));
        assert!(html.contains("id=\"O0123456_1_opt_1\""));
        assert!(r.has_hidden_zones());
    }

    #[test]
    fn abbreviation_tooltip() {
        let mut abrv = HashMap::new();
        abrv.insert("n".to_string(), "noun".to_string());
        let mut r = renderer(&abrv);
        assert_eq!(
            r.dsl_to_html("[p]n[/p]", ""),
            "<span class=\"dsl_p\" title=\"noun\">n</span>"
        );
        assert_eq!(
            r.dsl_to_html("[p]xyz[/p]", ""),
            "<span class=\"dsl_p\">xyz</span>"
        );
    }

    #[test]
    fn stress_tag_has_two_variants() {
        let abrv = HashMap::new();
        let mut r = renderer(&abrv);
        let html = r.dsl_to_html("c[']a[/']t", "");
        assert!(html.contains("dsl_stress_without_accent\">a</span>"));
        assert!(html.contains(&format!("a\u{301}</span>")));
    }

    #[test]
    fn missing_sound_uses_search_host() {
        let abrv = HashMap::new();
        let mut r = renderer(&abrv);
        let html = r.dsl_to_html("[s]bark.wav[/s]", "");
        assert!(html.contains("href=\"gdau://search/bark.wav\""), "{}", html);
        assert!(html.contains("dsl_s_wav"));
    }

    #[test]
    fn cross_reference_link() {
        let abrv = HashMap::new();
        let mut r = renderer(&abrv);
        let html = r.dsl_to_html("<<other word>>", "");
        assert_eq!(
            html,
            "<a class=\"dsl_ref\" href=\"gdlookup://localhost/other%20word\">other word</a>"
        );
    }

    #[test]
    fn ref_attrs_become_query_params() {
        let abrv = HashMap::new();
        let mut r = renderer(&abrv);
        let html = r.dsl_to_html("[ref dict=\"Other\"]word[/ref]", "");
        assert!(html.contains("href=\"gdlookup://localhost/word?dict=Other\""), "{}", html);
    }

    #[test]
    fn unknown_tag_is_visible() {
        let abrv = HashMap::new();
        let mut r = renderer(&abrv);
        let html = r.dsl_to_html("[mystery a=1]x[/mystery]", "");
        assert_eq!(html, "<span class=\"dsl_unknown\">[mystery a=1]x</span>");
    }

    #[test]
    fn url_gets_scheme_when_missing() {
        let abrv = HashMap::new();
        let mut r = renderer(&abrv);
        let html = r.dsl_to_html("[url]example.org/page[/url]", "");
        assert!(html.contains("href=\"http://example.org/page\""));
        let html = r.dsl_to_html("[url]https://example.org[/url]", "");
        assert!(html.contains("href=\"https://example.org\""));
    }

    #[test]
    fn resource_dir_candidates() {
        let (dir1, dir2) = resource_dirs(Path::new("/dicts/big.dsl.dz"));
        assert_eq!(dir1, PathBuf::from("/dicts/big.dsl.dz.files"));
        assert_eq!(dir2, PathBuf::from("/dicts/big.dsl.files"));
    }
}
