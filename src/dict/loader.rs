//! Dictionary file loading.
//!
//! A dictionary is line-oriented text. The first physical line only
//! feeds encoding detection: it may carry an Emacs-style magic comment
//! (`;; -*- coding: NAME -*-`), otherwise EUC-JP is assumed. Every
//! following line is either a `;` comment or `KEY CAND1/CAND2/.../`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::{Entry, LoadError};
use crate::encoding;

/// Captures the coding name out of a first-line magic comment.
const MAGIC_COMMENT: &str = r"-\*-.*[ \t]coding:[ \t]*([^ \t;]+?)[ \t;].*-\*-";

const DEFAULT_ENCODING: &str = "euc-jp";

fn magic_comment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MAGIC_COMMENT).expect("magic comment pattern"))
}

/// Read one dictionary file and merge its entries into `table`.
///
/// A mid-file failure leaves earlier lines of this file in the table;
/// rollback is not attempted.
pub(super) fn load_file(
    path: &Path,
    table: &mut HashMap<String, Entry>,
) -> Result<(), LoadError> {
    let mut file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_owned(),
        source,
    })?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|source| LoadError::Read {
        path: path.to_owned(),
        source,
    })?;

    // The first line must be newline-terminated; an unterminated or
    // empty file never reaches the entry grammar.
    let Some(newline) = bytes.iter().position(|&b| b == b'\n') else {
        return Err(LoadError::Read {
            path: path.to_owned(),
            source: io::Error::new(io::ErrorKind::UnexpectedEof, "missing first line"),
        });
    };

    let first = String::from_utf8_lossy(&bytes[..newline]);
    let coding = match magic_comment_regex().captures(&first) {
        Some(captures) => captures[1].to_owned(),
        None => DEFAULT_ENCODING.to_owned(),
    };
    let Some(decoder) = encoding::file_decoder(&coding) else {
        return Err(LoadError::UnsupportedEncoding { name: coding });
    };

    let text = encoding::decode(decoder, &bytes[newline + 1..]);
    for line in text.lines() {
        parse_line(line, table);
    }

    Ok(())
}

/// Parse one entry line. Comment lines and lines without a space are
/// skipped silently.
fn parse_line(line: &str, table: &mut HashMap<String, Entry>) {
    if line.starts_with(';') {
        return;
    }
    let Some(space) = line.find(' ') else {
        return;
    };

    let key = &line[..space];
    let entry = table.entry(key.to_owned()).or_default();

    for candidate in line[space + 1..].split('/') {
        if candidate.is_empty() {
            continue;
        }
        match candidate.split_once(';') {
            Some((text, annotation)) => entry.add(text, annotation),
            None => entry.add(candidate, ""),
        };
    }
}
