use std::fs;
use std::path::{Path, PathBuf};

use dsl_dict::dsl::builder::build_index_file;
use dsl_dict::dsl::{collect_dictionary_files, make_dictionaries};
use dsl_dict::{CancelFlag, DslConfig, DslDictionary};

fn utf16le_bytes(text: &str) -> Vec<u8> {
    let mut out = vec![0xff, 0xfe];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

fn write_utf16le(path: &Path, text: &str) {
    fs::write(path, utf16le_bytes(text)).expect("write source");
}

fn open_single(dir: &Path, main: &Path, config: &DslConfig) -> DslDictionary {
    let indices = dir.join("indices");
    let mut dicts = make_dictionaries(&[main.to_path_buf()], &indices, config).expect("build");
    assert_eq!(dicts.len(), 1, "expected exactly one dictionary");
    dicts.pop().unwrap()
}

fn article_html(dict: &DslDictionary, word: &str) -> String {
    dict.get_article(word, &[], false, &CancelFlag::new())
        .expect("get_article")
        .expect("not cancelled")
}

#[test]
fn simple_article_is_indexed_loaded_and_rendered() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("test.dsl");
    write_utf16le(
        &main,
        "#NAME \"Test\"\n#INDEX_LANGUAGE \"English\"\ncat\n\tThe [i]cat[/i].\n",
    );

    let dict = open_single(dir.path(), &main, &DslConfig::default());
    assert_eq!(dict.name(), "Test");
    assert_eq!(dict.article_count(), 1);
    assert_eq!(dict.word_count(), 1);

    let links = dict.find_articles("cat", false).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].word, "cat");

    let html = article_html(&dict, "cat");
    assert!(html.contains("<i class=\"dsl_i\">cat</i>"), "{}", html);
    assert!(html.contains("dsl_headwords"));
    assert!(html.contains("dsl_definition"));
}

#[test]
fn optional_parts_produce_both_keys_and_tilde_value() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("dogs.dsl");
    write_utf16le(&main, "#NAME \"Dogs\"\ndog(s)\n\t~ bark.\n");

    let dict = open_single(dir.path(), &main, &DslConfig::default());

    // Both alternatives index the same article.
    let plural = dict.find_articles("dogs", false).unwrap();
    let singular = dict.find_articles("dog", false).unwrap();
    assert_eq!(plural.len(), 1);
    assert_eq!(singular.len(), 1);
    assert_eq!(plural[0].article_offset, singular[0].article_offset);
    assert_eq!(dict.word_count(), 2);

    // The tilde value is the first optional alternative.
    let html = article_html(&dict, "dog");
    assert!(html.contains("dogs bark."), "{}", html);
}

#[test]
fn embedded_card_gets_its_own_entry() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("birds.dsl");
    write_utf16le(
        &main,
        "#NAME \"Birds\"\nbird\n\tsomething\n\t@robin\n\t\tred-breasted\n",
    );

    let dict = open_single(dir.path(), &main, &DslConfig::default());
    // One parent article plus one embedded card.
    assert_eq!(dict.article_count(), 2);

    let links = dict.find_articles("robin", false).unwrap();
    assert_eq!(links.len(), 1);

    let html = article_html(&dict, "robin");
    assert!(html.contains("red-breasted"), "{}", html);
    assert!(!html.contains("something"), "{}", html);

    let parent = article_html(&dict, "bird");
    assert!(parent.contains("something"), "{}", parent);
}

#[test]
fn encoding_directive_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("umlaut.dsl");
    fs::write(
        &main,
        "#ENCODING \"UTF-8\"\n#NAME \"Umlaut\"\nwört\n\tDas [b]wört[/b] schön.\n".as_bytes(),
    )
    .unwrap();

    let dict = open_single(dir.path(), &main, &DslConfig::default());
    let links = dict.find_articles("wört", false).unwrap();
    assert_eq!(links.len(), 1);

    // Article bytes are re-decoded as UTF-8 at load time.
    let html = article_html(&dict, "wört");
    assert!(html.contains("schön"), "{}", html);
    assert!(html.contains("<b class=\"dsl_b\">wört</b>"), "{}", html);
}

#[test]
fn missing_sound_resource_uses_search_host() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("sounds.dsl");
    write_utf16le(&main, "#NAME \"Sounds\"\nbark\n\t[s]bark.wav[/s]\n");

    let dict = open_single(dir.path(), &main, &DslConfig::default());
    let html = article_html(&dict, "bark");
    assert!(html.contains("gdau://search/bark.wav"), "{}", html);
}

#[test]
fn over_long_alt_headword_is_dropped_but_siblings_survive() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("long.dsl");
    let long_alt: String = std::iter::repeat('x').take(300).collect();
    write_utf16le(
        &main,
        &format!("#NAME \"Long\"\nshortword\n{}\ncat\n\tbody text\n", long_alt),
    );

    let dict = open_single(dir.path(), &main, &DslConfig::default());

    assert!(dict.find_articles(&long_alt, false).unwrap().is_empty());
    let by_sibling = dict.find_articles("cat", false).unwrap();
    assert_eq!(by_sibling.len(), 1);
    let by_first = dict.find_articles("shortword", false).unwrap();
    assert_eq!(by_first.len(), 1);
    assert_eq!(by_sibling[0].article_offset, by_first[0].article_offset);
}

#[test]
fn abbreviation_companion_becomes_tooltips() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("gram.dsl");
    write_utf16le(&main, "#NAME \"Gram\"\nword\n\t[p]n[/p] thing\n");
    let abrv = dir.path().join("gram_abrv.dsl");
    write_utf16le(&abrv, "#NAME \"Abbrev\"\nn\n\tnoun\n");

    let files = collect_dictionary_files(&main).expect("main recognized");
    assert_eq!(files.abrv.as_deref(), Some(abrv.as_path()));

    let dict = open_single(dir.path(), &main, &DslConfig::default());
    let html = article_html(&dict, "word");
    assert!(
        html.contains("<span class=\"dsl_p\" title=\"noun\">n</span>"),
        "{}",
        html
    );
}

#[test]
fn abrv_companion_is_not_a_top_level_dictionary() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("x_abrv.dsl");
    write_utf16le(&main, "#NAME \"X Abbrev\"\nn\n\tnoun\n");

    let indices = dir.path().join("indices");
    let dicts =
        make_dictionaries(&[main.clone()], &indices, &DslConfig::default()).expect("scan");
    assert!(dicts.is_empty());
}

#[test]
fn rebuild_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("stable.dsl");
    write_utf16le(
        &main,
        "#NAME \"Stable\"\nalpha\n\tfirst\nbeta\ngamma\n\tsecond ~ body\n",
    );

    let first_index = dir.path().join("index1");
    let second_index = dir.path().join("index2");
    let config = DslConfig::default();
    build_index_file(&main, None, None, &first_index, &config)
        .unwrap()
        .expect("built");
    build_index_file(&main, None, None, &second_index, &config)
        .unwrap()
        .expect("built");

    let a = fs::read(&first_index).unwrap();
    let b = fs::read(&second_index).unwrap();
    assert_eq!(a, b, "index files differ between identical rebuilds");
}

#[test]
fn multiple_headwords_share_one_article() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("alts.dsl");
    write_utf16le(&main, "#NAME \"Alts\"\ncat\nfeline\n~s\n\tThe body.\n");

    let dict = open_single(dir.path(), &main, &DslConfig::default());
    assert_eq!(dict.article_count(), 1);
    assert_eq!(dict.word_count(), 3);

    let cat = dict.find_articles("cat", false).unwrap();
    let feline = dict.find_articles("feline", false).unwrap();
    // "~s" expands against the first headword.
    let cats = dict.find_articles("cats", false).unwrap();
    assert_eq!(cat.len(), 1);
    assert_eq!(feline.len(), 1);
    assert_eq!(cats.len(), 1);
    assert_eq!(cat[0].article_offset, feline[0].article_offset);
    assert_eq!(cat[0].article_offset, cats[0].article_offset);

    let html = article_html(&dict, "feline");
    assert!(html.contains("The body."), "{}", html);
}

#[test]
fn prefix_search_returns_matches_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("many.dsl");
    let mut source = String::from("#NAME \"Many\"\n");
    for i in 0..40 {
        source.push_str(&format!("word{:02}\n\tbody {}\n", i, i));
    }
    source.push_str("zzz\n\tlast\n");
    write_utf16le(&main, &source);

    let dict = open_single(dir.path(), &main, &DslConfig::default());
    let hits = dict.get_search_results("word", 100).unwrap();
    assert_eq!(hits.len(), 40);
    assert_eq!(hits[0].word, "word00");
    let capped = dict.get_search_results("word", 5).unwrap();
    assert_eq!(capped.len(), 5);
}

#[test]
fn cancelled_request_returns_no_data_and_no_error() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("c.dsl");
    write_utf16le(&main, "#NAME \"C\"\ncat\n\tbody\n");

    let dict = open_single(dir.path(), &main, &DslConfig::default());
    let cancel = CancelFlag::new();
    cancel.cancel();
    let result = dict.get_article("cat", &[], false, &cancel).unwrap();
    assert!(result.is_none());
    let resource = dict.get_resource("bark.wav", &cancel).unwrap();
    assert!(resource.is_none());
}

#[test]
fn index_survives_reopen_without_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("keep.dsl");
    write_utf16le(&main, "#NAME \"Keep\"\ncat\n\tbody\n");

    let indices = dir.path().join("indices");
    let config = DslConfig::default();
    {
        let dicts = make_dictionaries(&[main.clone()], &indices, &config).unwrap();
        assert_eq!(dicts.len(), 1);
    }
    // Second discovery run must reuse the index and still serve requests.
    let dicts = make_dictionaries(&[main.clone()], &indices, &config).unwrap();
    assert_eq!(dicts.len(), 1);
    let html = article_html(&dicts[0], "cat");
    assert!(html.contains("body"));
}

#[test]
fn article_text_is_plain() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("plain.dsl");
    write_utf16le(
        &main,
        "#NAME \"Plain\"\nrun\n\t[m1][trn]to [i]move[/i] fast[/trn][/m1]\n",
    );

    let dict = open_single(dir.path(), &main, &DslConfig::default());
    let links = dict.find_articles("run", false).unwrap();
    let (headword, text) = dict.get_article_text(links[0].article_offset).unwrap();
    assert_eq!(headword, "run");
    assert!(text.contains("to move fast"), "{:?}", text);
    assert!(!text.contains('['), "{:?}", text);
}

#[test]
fn resources_are_served_from_sibling_directory() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("res.dsl");
    write_utf16le(&main, "#NAME \"Res\"\ncat\n\t[s]meow.wav[/s]\n");
    let res_dir = dir.path().join("res.dsl.files");
    fs::create_dir(&res_dir).unwrap();
    fs::write(res_dir.join("meow.wav"), b"RIFF....").unwrap();

    let dict = open_single(dir.path(), &main, &DslConfig::default());

    // With the file present the URL references this dictionary, not the
    // global search host.
    let html = article_html(&dict, "cat");
    assert!(html.contains(&format!("gdau://{}/meow.wav", dict.id())), "{}", html);

    let data = dict
        .get_resource("meow.wav", &CancelFlag::new())
        .unwrap()
        .expect("not cancelled");
    assert_eq!(data, b"RIFF....");
}

fn stem_paths(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.path())
        .collect()
}

#[test]
fn concurrent_requests_share_one_dictionary() {
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("par.dsl");
    let mut source = String::from("#NAME \"Par\"\n");
    for i in 0..25 {
        source.push_str(&format!("entry{:02}\n\tdefinition number {}\n", i, i));
    }
    write_utf16le(&main, &source);

    let dict = Arc::new(open_single(dir.path(), &main, &DslConfig::default()));

    let mut handles = Vec::new();
    for t in 0..4 {
        let dict = Arc::clone(&dict);
        handles.push(std::thread::spawn(move || {
            for i in 0..25 {
                let word = format!("entry{:02}", (i + t * 7) % 25);
                let html = dict
                    .get_article(&word, &[], false, &CancelFlag::new())
                    .expect("request")
                    .expect("not cancelled");
                assert!(html.contains("definition number"), "{}", html);
            }
        }));
    }
    for handle in handles {
        handle.join().expect("worker");
    }
}

#[test]
fn garbage_and_comments_do_not_break_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("messy.dsl");
    write_utf16le(
        &main,
        "#NAME \"Messy\"\n{{a comment\nspanning lines}}cat\n\tThe body. {{inline}}\n   \ndog\n\tbodies\n",
    );

    let dict = open_single(dir.path(), &main, &DslConfig::default());
    assert_eq!(dict.article_count(), 2);
    let html = article_html(&dict, "cat");
    assert!(html.contains("The body."), "{}", html);
    assert!(!html.contains("inline"), "{}", html);
    // Nothing beyond the expected files was created next to the source.
    assert!(stem_paths(dir.path()).len() >= 2);
}
