//! SKK wire protocol.
//!
//! A request frame is whatever one socket read returns: the first byte
//! is the command code, the rest is command-specific. Replies carry a
//! status byte followed by command-specific text. Deployed clients send
//! one small request per write and wait for the reply, so there is no
//! framing to reassemble.

use std::fmt::Write;

use crate::dict::Candidate;

// Client command codes.
pub const CLIENT_END: u8 = b'0';
pub const CLIENT_REQUEST: u8 = b'1';
pub const CLIENT_VERSION: u8 = b'2';
pub const CLIENT_HOST: u8 = b'3';
pub const CLIENT_COMPLETION: u8 = b'4';

// Server reply codes. Error and full are part of the protocol grammar
// but this server never emits them.
pub const SERVER_ERROR: u8 = b'0';
pub const SERVER_FOUND: u8 = b'1';
pub const SERVER_NOT_FOUND: u8 = b'4';
pub const SERVER_FULL: u8 = b'9';

/// Version string reported for the `'2'` command. Kept stable for
/// clients that pin the goskkserv banner.
pub const SERVER_VERSION: &str = "goskkserv-1.0";

/// Reply to the completion stub: found, zero candidates.
pub const COMPLETION_STUB: &str = "1//\n";

/// One read is one request; longer requests are truncated, never
/// reassembled.
pub const READ_BUF_SIZE: usize = 1024;

/// Initial reply accumulator capacity.
pub const REPLY_CAPACITY: usize = 4096;

/// Extract the lookup key from a decoded `'1'` request (command byte
/// included).
///
/// The key runs from after the command byte to the first space, else the
/// first LF, else the end of the frame.
pub fn lookup_key(request: &str) -> &str {
    let terminator = request
        .find(' ')
        .or_else(|| request.find('\n'))
        .unwrap_or(request.len());
    &request[1..terminator]
}

/// Append a found reply: `'1'`, each candidate preceded by `/`, then `/\n`.
pub fn push_found(reply: &mut String, candidates: &[Candidate]) {
    reply.push(SERVER_FOUND as char);
    for candidate in candidates {
        reply.push('/');
        let _ = write!(reply, "{candidate}");
    }
    reply.push_str("/\n");
}

/// Append a not-found reply: `'4'` followed by the request payload,
/// terminator included. No extra LF.
pub fn push_not_found(reply: &mut String, request: &str) {
    reply.push(SERVER_NOT_FOUND as char);
    reply.push_str(&request[1..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(text: &str, annotation: &str) -> Candidate {
        Candidate {
            text: text.to_owned(),
            annotation: annotation.to_owned(),
        }
    }

    #[test]
    fn key_terminates_at_space() {
        assert_eq!(lookup_key("1かんじ "), "かんじ");
        assert_eq!(lookup_key("1かんじ trailing"), "かんじ");
    }

    #[test]
    fn key_falls_back_to_lf_then_frame_end() {
        assert_eq!(lookup_key("1かんじ\n"), "かんじ");
        assert_eq!(lookup_key("1かんじ"), "かんじ");
    }

    #[test]
    fn key_of_bare_command_is_empty() {
        assert_eq!(lookup_key("1"), "");
        assert_eq!(lookup_key("1 "), "");
    }

    #[test]
    fn found_reply_joins_candidates_with_slashes() {
        let mut reply = String::new();
        push_found(
            &mut reply,
            &[candidate("漢字", ""), candidate("感じ", "")],
        );
        assert_eq!(reply, "1/漢字/感じ/\n");
    }

    #[test]
    fn found_reply_renders_annotations() {
        let mut reply = String::new();
        push_found(
            &mut reply,
            &[candidate("今日", "today"), candidate("京", "")],
        );
        assert_eq!(reply, "1/今日; today/京/\n");
    }

    #[test]
    fn not_found_reply_echoes_payload_with_terminator() {
        let mut reply = String::new();
        push_not_found(&mut reply, "1かんじ ");
        assert_eq!(reply, "4かんじ ");
    }
}
