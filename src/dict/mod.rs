//! In-memory dictionary index.
//!
//! The index maps a lookup key (midashi) to its candidates, built from
//! one or more SKK dictionary files loaded at startup. Loading takes the
//! write lock; every client connection searches under a shared read lock.

mod loader;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use thiserror::Error;

/// Errors raised while loading a dictionary file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open dictionary file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read dictionary {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unsupported encoding: {name}")]
    UnsupportedEncoding { name: String },
}

/// One conversion candidate for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The conversion result.
    pub text: String,
    /// Free-text note attached after a `;` in the dictionary, possibly empty.
    pub annotation: String,
}

impl Candidate {
    fn new(text: &str, annotation: &str) -> Self {
        Self {
            text: text.to_owned(),
            annotation: annotation.to_owned(),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.annotation.is_empty() {
            f.write_str(&self.text)
        } else {
            write!(f, "{}; {}", self.text, self.annotation)
        }
    }
}

/// The candidates recorded for one key.
///
/// Invariant: `seen` holds exactly the `text` values of `candidates`,
/// which stay in first-seen order across all loaded files.
#[derive(Debug, Default)]
struct Entry {
    candidates: Vec<Candidate>,
    seen: HashSet<String>,
}

impl Entry {
    /// Append a candidate unless its text is already present. The first
    /// `(text, annotation)` pair wins; later annotations are discarded.
    fn add(&mut self, text: &str, annotation: &str) -> bool {
        if self.seen.contains(text) {
            return false;
        }
        self.seen.insert(text.to_owned());
        self.candidates.push(Candidate::new(text, annotation));
        true
    }
}

/// Keyword-to-candidates table shared by all connections.
#[derive(Debug, Default)]
pub struct Dictionary {
    table: RwLock<HashMap<String, Entry>>,
}

impl Dictionary {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load one dictionary file into the index.
    ///
    /// Candidates merge into existing entries in first-seen order. A
    /// failure partway through may leave the lines read so far indexed;
    /// callers decide whether to keep serving the partial result.
    pub fn add(&self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let mut table = self.table.write();
        loader::load_file(path.as_ref(), &mut table)
    }

    /// Look up the candidates for a key, in insertion order.
    ///
    /// Returns an owned copy so the read lock is released before the
    /// caller serializes a reply. Unknown keys yield an empty vec.
    pub fn search(&self, key: &str) -> Vec<Candidate> {
        let table = self.table.read();
        table
            .get(key)
            .map(|entry| entry.candidates.clone())
            .unwrap_or_default()
    }

    /// Number of distinct keys indexed.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn dict_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    fn utf8_dict(lines: &str) -> tempfile::NamedTempFile {
        let mut content = String::from(";; -*- mode: fundamental; coding: utf-8 -*-\n");
        content.push_str(lines);
        dict_file(content.as_bytes())
    }

    fn texts(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn candidate_string_form() {
        let plain = Candidate::new("漢字", "");
        assert_eq!(plain.to_string(), "漢字");

        let annotated = Candidate::new("今日", "today");
        assert_eq!(annotated.to_string(), "今日; today");
    }

    #[test]
    fn search_missing_key_is_empty() {
        let dict = Dictionary::new();
        assert!(dict.search("かんじ").is_empty());
    }

    #[test]
    fn loads_entries_in_file_order() {
        let file = utf8_dict("かんじ /漢字/感じ/\nきょう /今日/京/\n");
        let dict = Dictionary::new();
        dict.add(file.path()).unwrap();

        assert_eq!(dict.len(), 2);
        assert_eq!(texts(&dict.search("かんじ")), ["漢字", "感じ"]);
        assert_eq!(texts(&dict.search("きょう")), ["今日", "京"]);
    }

    #[test]
    fn duplicate_text_keeps_first_annotation() {
        let file = utf8_dict("きょう /今日;today/京/今日;another/\n");
        let dict = Dictionary::new();
        dict.add(file.path()).unwrap();

        let candidates = dict.search("きょう");
        assert_eq!(texts(&candidates), ["今日", "京"]);
        assert_eq!(candidates[0].annotation, "today");
    }

    #[test]
    fn duplicate_texts_across_lines_and_files_dedup() {
        let first = utf8_dict("かんじ /漢字/\nかんじ /感じ/漢字/\n");
        let second = utf8_dict("かんじ /幹事/漢字;kanji/\n");
        let dict = Dictionary::new();
        dict.add(first.path()).unwrap();
        dict.add(second.path()).unwrap();

        // Global first-seen order, duplicates suppressed across files.
        let candidates = dict.search("かんじ");
        assert_eq!(texts(&candidates), ["漢字", "感じ", "幹事"]);
        assert_eq!(candidates[0].annotation, "");
    }

    #[test]
    fn comment_and_malformed_lines_are_skipped() {
        let file = utf8_dict(";; okuri-ari entries.\nnospace\nかんじ /漢字/\n");
        let dict = Dictionary::new();
        dict.add(file.path()).unwrap();

        assert_eq!(dict.len(), 1);
        assert_eq!(texts(&dict.search("かんじ")), ["漢字"]);
    }

    #[test]
    fn empty_candidate_segments_are_skipped() {
        let file = utf8_dict("かんじ //漢字//感じ/\n");
        let dict = Dictionary::new();
        dict.add(file.path()).unwrap();
        assert_eq!(texts(&dict.search("かんじ")), ["漢字", "感じ"]);
    }

    #[test]
    fn first_line_is_consumed_by_encoding_detection() {
        // Even a well-formed entry on line one only feeds detection.
        let file = dict_file("first /one/\nsecond /two/\n".as_bytes());
        let dict = Dictionary::new();
        dict.add(file.path()).unwrap();

        assert!(dict.search("first").is_empty());
        assert_eq!(texts(&dict.search("second")), ["two"]);
    }

    #[test]
    fn defaults_to_euc_jp_without_magic_comment() {
        let mut content = b";; no coding declared\n".to_vec();
        let (line, _, _) = encoding_rs::EUC_JP.encode("かんじ /漢字/\n");
        content.extend_from_slice(&line);

        let file = dict_file(&content);
        let dict = Dictionary::new();
        dict.add(file.path()).unwrap();
        assert_eq!(texts(&dict.search("かんじ")), ["漢字"]);
    }

    #[test]
    fn honors_sjis_magic_comment() {
        let mut content = b";; -*- coding: sjis -*-\n".to_vec();
        let (line, _, _) = encoding_rs::SHIFT_JIS.encode("きょう /今日/\n");
        content.extend_from_slice(&line);

        let file = dict_file(&content);
        let dict = Dictionary::new();
        dict.add(file.path()).unwrap();
        assert_eq!(texts(&dict.search("きょう")), ["今日"]);
    }

    #[test]
    fn unknown_coding_name_is_rejected() {
        let file = dict_file(b";; -*- coding: iso-2022-jp -*-\nkey /value/\n");
        let dict = Dictionary::new();
        let err = dict.add(file.path()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::UnsupportedEncoding { ref name } if name == "iso-2022-jp"
        ));
        assert!(dict.is_empty());
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let dict = Dictionary::new();
        let err = dict.add("/nonexistent/SKK-JISYO.L").unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }

    #[test]
    fn file_without_first_line_is_a_read_error() {
        let file = dict_file(b"");
        let dict = Dictionary::new();
        let err = dict.add(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }));
    }

    #[test]
    fn earlier_files_survive_a_failed_load() {
        let good = utf8_dict("かんじ /漢字/\n");
        let bad = dict_file(b";; -*- coding: nonsense -*-\n");
        let dict = Dictionary::new();
        dict.add(good.path()).unwrap();
        assert!(dict.add(bad.path()).is_err());
        assert_eq!(texts(&dict.search("かんじ")), ["漢字"]);
    }
}
