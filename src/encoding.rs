//! Character-set handling.
//!
//! SKK dictionaries are human-edited text files that declare their own
//! encoding in a first-line magic comment; clients negotiate a separate
//! wire encoding per server instance. Both sides funnel through
//! `encoding_rs` here, so the rest of the crate only ever sees UTF-8.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use encoding_rs::{Encoding, EUC_JP, SHIFT_JIS, UTF_8};
use thiserror::Error;

/// A wire-encoding selector that is not one of `utf-8`, `euc-jp`, `sjis`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid encoding: {0}")]
pub struct InvalidEncoding(pub String);

/// Resolve a dictionary-file encoding name from a magic comment.
///
/// Returns `None` for names no decoder is registered under. Matching is
/// case-sensitive; `euc-jis-2004` is accepted on the file side only and
/// decodes as plain EUC-JP.
pub fn file_decoder(name: &str) -> Option<&'static Encoding> {
    match name {
        "euc-jp" | "euc-jis-2004" => Some(EUC_JP),
        "sjis" => Some(SHIFT_JIS),
        "utf-8" => Some(UTF_8),
        _ => None,
    }
}

/// Decode a whole buffer to UTF-8, replacing malformed sequences with
/// U+FFFD rather than failing.
pub fn decode(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    text.into_owned()
}

/// The character encoding spoken on client connections.
///
/// The accepted set is the strict trio the SKK ecosystem actually uses;
/// dictionary files may additionally declare `euc-jis-2004`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireEncoding {
    Utf8,
    EucJp,
    ShiftJis,
}

impl WireEncoding {
    fn encoding(self) -> &'static Encoding {
        match self {
            WireEncoding::Utf8 => UTF_8,
            WireEncoding::EucJp => EUC_JP,
            WireEncoding::ShiftJis => SHIFT_JIS,
        }
    }

    /// Decode one request frame from the wire encoding to UTF-8.
    pub fn decode<'a>(self, bytes: &'a [u8]) -> Cow<'a, str> {
        let (text, _) = self.encoding().decode_without_bom_handling(bytes);
        text
    }

    /// Encode one reply from UTF-8 to the wire encoding.
    pub fn encode<'a>(self, text: &'a str) -> Cow<'a, [u8]> {
        let (bytes, _, _) = self.encoding().encode(text);
        bytes
    }
}

impl Default for WireEncoding {
    fn default() -> Self {
        WireEncoding::Utf8
    }
}

impl FromStr for WireEncoding {
    type Err = InvalidEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "utf-8" => Ok(WireEncoding::Utf8),
            "euc-jp" | "eucjp" => Ok(WireEncoding::EucJp),
            "sjis" => Ok(WireEncoding::ShiftJis),
            _ => Err(InvalidEncoding(s.to_owned())),
        }
    }
}

impl fmt::Display for WireEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WireEncoding::Utf8 => "utf-8",
            WireEncoding::EucJp => "euc-jp",
            WireEncoding::ShiftJis => "sjis",
        };
        f.write_str(name)
    }
}
