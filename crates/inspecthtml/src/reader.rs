//! The instrumenting reader: drives a [`TokenSource`] one token at a time,
//! records every token's source range through the cursor, and hands the tree
//! constructor a transformed byte stream whose payloads carry lookup keys.
//!
//! The transformation per token kind:
//!
//! | kind        | stand-in emitted downstream                            |
//! |-------------|--------------------------------------------------------|
//! | start tag   | original bytes + synthetic ` o="<key>"` before the `>` |
//! | end tag     | original bytes + trailing `<!--<range>-->` marker      |
//! | comment     | `<!--c<key>-->`                                        |
//! | text        | `t<key>`, or `<!--t<key>-->` for whitespace-only runs  |
//! | doctype     | unchanged                                              |
//!
//! Keys are decimal only: when the tree constructor merges adjacent text
//! runs the boundary inside `t17t18` stays unambiguous.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::sync::LazyLock;

use regex::bytes::Regex;
use rustc_hash::FxHashMap;
use text_cursor::{TextOffset, TextOffsetRange, TextWriter};

use crate::metadata::{NodeAttributeMetadata, NodeMetadata};
use crate::text::{decode_character_references, is_all_whitespace, normalize_newlines};
use crate::token_scanner::{RawAttr, RawToken, TextKind, TokenSource};

static RE_TAG_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u)^<([^\t\n\x0C\r /<>]+)").unwrap());
static RE_ATTR_KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u).*?[\t\n\x0C\r <>]*([^=\t\n\x0C\r /<>]+)(([\t\n\x0C\r ]*=[\t\n\x0C\r ]*)(.))?")
        .unwrap()
});
static RE_ATTR_VALUE_DOUBLE_QUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?-u).*?""#).unwrap());
static RE_ATTR_VALUE_SINGLE_QUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u).*?'").unwrap());
static RE_ATTR_VALUE_UNQUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u)[^\t\n\x0C\r >]+").unwrap());

/// Original content and source range for a token replaced by a keyed
/// stand-in.
#[derive(Debug, Clone)]
pub(crate) struct SwapEntry {
    pub original: String,
    pub offsets: TextOffsetRange,
}

/// Everything the rebuilder needs once the tree constructor has finished.
pub(crate) struct ReaderHarvest {
    pub tag_metadata_by_key: FxHashMap<String, NodeMetadata>,
    pub swap_by_key: FxHashMap<String, SwapEntry>,
    pub doctype_offsets: VecDeque<TextOffsetRange>,
    pub final_position: TextOffset,
}

pub(crate) struct ReaderState {
    source: Box<dyn TokenSource>,
    doc: TextWriter,

    buf: Vec<u8>,
    buf_at: usize,
    done: bool,

    node_idx: u64,
    tag_metadata_by_key: FxHashMap<String, NodeMetadata>,
    swap_by_key: FxHashMap<String, SwapEntry>,
    doctype_offsets: VecDeque<TextOffsetRange>,

    /// True until the first token that would start real document content;
    /// whitespace before that point is dropped by the tree constructor, so
    /// it gets no stand-in (and no node to attach metadata to).
    prologue: bool,
}

impl ReaderState {
    pub fn new(source: Box<dyn TokenSource>, doc: TextWriter) -> Self {
        Self {
            source,
            doc,
            buf: Vec::new(),
            buf_at: 0,
            done: false,
            node_idx: 0,
            tag_metadata_by_key: FxHashMap::default(),
            swap_by_key: FxHashMap::default(),
            doctype_offsets: VecDeque::new(),
            prologue: true,
        }
    }

    pub fn finish(&mut self) -> ReaderHarvest {
        ReaderHarvest {
            tag_metadata_by_key: std::mem::take(&mut self.tag_metadata_by_key),
            swap_by_key: std::mem::take(&mut self.swap_by_key),
            doctype_offsets: std::mem::take(&mut self.doctype_offsets),
            final_position: self.doc.position(),
        }
    }

    fn next_key(&mut self) -> String {
        self.node_idx += 1;
        self.node_idx.to_string()
    }

    /// Advances to the next token and fills the stand-in buffer. Returns
    /// false at end of input.
    fn advance(&mut self) -> bool {
        loop {
            let Some(token) = self.source.next_token() else {
                return false;
            };

            self.buf.clear();
            self.buf_at = 0;

            match token {
                RawToken::StartTag {
                    raw,
                    self_closing,
                    attrs,
                } => {
                    self.start_tag(raw, self_closing, &attrs);
                    return true;
                }

                RawToken::EndTag { raw } => {
                    self.prologue = false;

                    let offsets = self.doc.write_for_offset_range(&raw);
                    self.buf.extend_from_slice(&raw);
                    self.buf
                        .extend_from_slice(format!("<!--{}-->", offsets).as_bytes());
                    return true;
                }

                RawToken::Comment { raw, body } => {
                    let key = self.next_key();
                    let original = normalize_newlines(&raw[body]);
                    let offsets = self.doc.write_for_offset_range(&raw);

                    self.swap_by_key
                        .insert(key.clone(), SwapEntry { original, offsets });
                    self.buf
                        .extend_from_slice(format!("<!--c{}-->", key).as_bytes());
                    return true;
                }

                RawToken::Text {
                    raw,
                    body,
                    kind,
                    strip_leading_newline,
                } => {
                    if self.text(raw, body, kind, strip_leading_newline) {
                        return true;
                    }
                    // prologue whitespace: cursor advanced, nothing emitted
                }

                RawToken::Doctype { raw } => {
                    let offsets = self.doc.write_for_offset_range(&raw);
                    self.doctype_offsets.push_back(offsets);
                    self.buf.extend_from_slice(&raw);
                    return true;
                }

                RawToken::Passthrough { raw } => {
                    self.doc.write(&raw);
                    self.buf.extend_from_slice(&raw);
                    return true;
                }
            }
        }
    }

    fn text(
        &mut self,
        raw: Vec<u8>,
        body: std::ops::Range<usize>,
        kind: TextKind,
        strip_leading_newline: bool,
    ) -> bool {
        let is_data = kind == TextKind::Data;
        let whitespace_only = is_all_whitespace(&raw);

        if is_data && whitespace_only && self.prologue {
            self.doc.write(&raw);
            return false;
        }

        if !whitespace_only {
            self.prologue = false;
        }

        let mut original = normalize_newlines(&raw[body]);
        if matches!(kind, TextKind::Data | TextKind::RcData) {
            original = decode_character_references(&original);
        }
        if strip_leading_newline && original.starts_with('\n') {
            original.remove(0);
        }

        let key = self.next_key();
        let offsets = self.doc.write_for_offset_range(&raw);
        self.swap_by_key
            .insert(key.clone(), SwapEntry { original, offsets });

        /*
         * Whitespace-significance matters to the tokenizer (e.g. inside
         * <head>), so whitespace-only runs masquerade as comments instead of
         * text. Only in DATA state though: inside RAWTEXT or RCDATA content
         * a comment would be literal text.
         */
        if is_data && whitespace_only {
            self.buf
                .extend_from_slice(format!("<!--t{}-->", key).as_bytes());
        } else {
            self.buf.extend_from_slice(format!("t{}", key).as_bytes());
        }

        true
    }

    fn start_tag(&mut self, raw: Vec<u8>, self_closing: bool, attrs: &[RawAttr]) {
        let mut cut: &[u8] = &raw;

        let mut metadata = NodeMetadata {
            token_offsets: TextOffsetRange::collapsed(self.doc.position()),
            tag_name_offsets: None,
            tag_attr: Vec::new(),
            tag_self_closing: self_closing,
            end_tag_token_offsets: None,
        };

        if let Some(captures) = RE_TAG_NAME.captures(cut) {
            let name = captures.get(1).expect("tag name group always captures");

            if !name.as_bytes().eq_ignore_ascii_case(b"html") {
                self.prologue = false;
            }

            self.doc.write(&cut[..name.start()]);
            metadata.tag_name_offsets = Some(self.doc.write_for_offset_range(name.as_bytes()));
            cut = &cut[name.end()..];
        }

        let mut last_attr_suffix: Option<&'static [u8]> = None;

        for attr in attrs {
            let Some(captures) = RE_ATTR_KEY_VALUE.captures(cut) else {
                /*
                 * Dissection lost track of this attribute (e.g. a stray
                 * quote inside an unquoted value). Do not advance the
                 * cursor; keep the aligned slot as a gap.
                 */
                metadata.tag_attr.push(None);
                continue;
            };

            let key = captures.get(1).expect("attribute key group always captures");
            self.doc.write(&cut[..key.start()]);

            let mut attr_metadata = NodeAttributeMetadata {
                key_offsets: self.doc.write_for_offset_range(key.as_bytes()),
                value_offsets: None,
            };

            if let (Some(equals), Some(value_start)) = (captures.get(3), captures.get(4)) {
                self.doc.write(&cut[equals.start()..equals.end()]);
                cut = &cut[value_start.start()..];

                let mut consume_len = 0;

                if cut[0] == b'"' {
                    if let Some(closer) = RE_ATTR_VALUE_DOUBLE_QUOTE.find(&cut[1..]) {
                        consume_len = closer.end() + 1;
                    }
                    last_attr_suffix = None;
                } else if cut[0] == b'\'' {
                    if let Some(closer) = RE_ATTR_VALUE_SINGLE_QUOTE.find(&cut[1..]) {
                        consume_len = closer.end() + 1;
                    }
                    last_attr_suffix = None;
                } else if !matches!(cut[0], b'\t' | b'\n' | b'\x0C' | b'\r' | b' ' | b'>') {
                    if let Some(run) = RE_ATTR_VALUE_UNQUOTED.find(cut) {
                        consume_len = run.end();
                    }
                    last_attr_suffix = None;
                }

                if consume_len > 0 {
                    attr_metadata.value_offsets =
                        Some(self.doc.write_for_offset_range(&cut[..consume_len]));
                    cut = &cut[consume_len..];
                } else {
                    // `title=` with nothing usable after; the stand-in needs
                    // an explicit empty value so the synthetic attribute
                    // does not become this one's value.
                    last_attr_suffix = Some(b"\"\"");
                }
            } else if attr.value.as_deref().is_some_and(|value| !value.is_empty()) {
                log::warn!(
                    "attribute dissection mismatch (raw={:?}, key={:?}); subsequent spans of this tag may be off",
                    String::from_utf8_lossy(cut),
                    String::from_utf8_lossy(&attr.name),
                );
            } else {
                cut = &cut[key.end()..];
                last_attr_suffix = Some(b"=\"\"");
            }

            metadata.tag_attr.push(Some(attr_metadata));
        }

        self.doc.write(cut);
        metadata.token_offsets.until = self.doc.position();

        let key = self.next_key();
        self.tag_metadata_by_key.insert(key.clone(), metadata);

        let (body, closer): (&[u8], &[u8]) = if self_closing && raw.ends_with(b"/>") {
            (&raw[..raw.len() - 2], b"/>")
        } else if raw.ends_with(b">") {
            (&raw[..raw.len() - 1], b">")
        } else {
            (&raw, b"")
        };

        self.buf.extend_from_slice(body);
        if let Some(suffix) = last_attr_suffix {
            self.buf.extend_from_slice(suffix);
        }
        self.buf
            .extend_from_slice(format!(" o=\"{}\"", key).as_bytes());
        self.buf.extend_from_slice(closer);
    }
}

/// The byte stream handed to the tree constructor.
pub(crate) struct InstrumentingReader {
    state: Rc<RefCell<ReaderState>>,
}

impl InstrumentingReader {
    pub fn new(state: Rc<RefCell<ReaderState>>) -> Self {
        Self { state }
    }
}

impl io::Read for InstrumentingReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.borrow_mut();

        loop {
            if state.buf_at < state.buf.len() {
                let n = (state.buf.len() - state.buf_at).min(out.len());
                out[..n].copy_from_slice(&state.buf[state.buf_at..state.buf_at + n]);
                state.buf_at += n;
                return Ok(n);
            }

            if state.done {
                return Ok(0);
            }

            if !state.advance() {
                state.done = true;
                return Ok(0);
            }
        }
    }
}
