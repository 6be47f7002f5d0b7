//! Dialect parsers for the two accepted XML syndication formats.
//!
//! Each submodule exposes a dialect-detect check and a decode operation over
//! raw bytes, per spec §4.1. Both share the charset-decoding and raw-inner-
//! payload extraction helpers below, since both requirements are identical
//! across dialects — only the root element name and the field set differ.

pub mod atom;
pub mod rss;

use quick_xml::events::Event;
use quick_xml::Reader;

/// A dialect decode failure, distinguishing "wrong dialect" and "structurally
/// broken" from "zero items/entries" — the normalizer treats the last one as
/// a distinct `EmptyFeed` outcome rather than folding it into `ParseFailure`
/// (spec §7 lists them as separate error kinds).
#[derive(Debug, Clone)]
pub enum DecodeError {
    NotDialect(String),
    Malformed(String),
    EmptyItems(String),
}

impl DecodeError {
    pub fn message(&self) -> &str {
        match self {
            DecodeError::NotDialect(m) => m,
            DecodeError::Malformed(m) => m,
            DecodeError::EmptyItems(m) => m,
        }
    }

    pub fn is_empty_items(&self) -> bool {
        matches!(self, DecodeError::EmptyItems(_))
    }
}

/// Decode `data` to a `String` using the charset the document declares in its
/// XML declaration (`<?xml version="1.0" encoding="..."?>`), falling back to
/// UTF-8 if it declares none or declares one `encoding_rs` doesn't recognize.
pub(crate) fn decode_charset(data: &[u8]) -> String {
    let mut reader = Reader::from_reader(data);
    let mut buf = Vec::new();
    let label = match reader.read_event_into(&mut buf) {
        Ok(Event::Decl(decl)) => decl
            .encoding()
            .and_then(|r| r.ok())
            .map(|cow| cow.to_vec()),
        _ => None,
    };

    let encoding = label
        .and_then(|l| encoding_rs::Encoding::for_label(&l))
        .unwrap_or(encoding_rs::UTF_8);
    let (text, _, _) = encoding.decode(data);
    text.into_owned()
}

/// Scan `data` for its first significant start element and compare its local
/// name to `root_local`. Mirrors the original's token-based `IsFeed`: it stops
/// at the first `StartElement`, so a document with no start element at all
/// (truncated, empty) is simply "not this dialect" rather than an error.
pub(crate) fn root_is(data: &[u8], root_local: &str) -> bool {
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return e.local_name().as_ref() == root_local.as_bytes();
            }
            Ok(Event::Eof) => return false,
            Err(_) => return false,
            _ => {}
        }
        buf.clear();
    }
}

/// Extract the raw bytes between the root element's opening and closing tags
/// (its "inner payload"), used for the `sum` fingerprint. Returns `None` if
/// `root_local` never opens and closes at depth 0.
pub(crate) fn root_inner_bytes(text: &str, root_local: &str) -> Option<Vec<u8>> {
    let data = text.as_bytes();
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut depth = 0i32;
    let mut inner_start: Option<usize> = None;

    loop {
        let pos_before = reader.buffer_position() as usize;
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if depth == 0 {
                    if e.local_name().as_ref() != root_local.as_bytes() {
                        return None;
                    }
                    depth += 1;
                    inner_start = Some(reader.buffer_position() as usize);
                } else {
                    depth += 1;
                }
            }
            Ok(Event::End(_)) => {
                depth -= 1;
                if depth == 0 {
                    let start = inner_start?;
                    return Some(data[start..pos_before].to_vec());
                }
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}
