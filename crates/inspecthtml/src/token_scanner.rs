use std::collections::VecDeque;
use std::ops::Range;

use crate::macros::{strcspn, strspn};
use crate::str_fns::{stripos, strpos};

/// How the text of a [`RawToken::Text`] token was produced, which decides
/// whether character references in it are decoded when it is restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    /// Ordinary DATA-state text; character references decode.
    Data,
    /// RCDATA element content (`title`, `textarea`); character references
    /// decode but markup does not apply.
    RcData,
    /// RAWTEXT element content (`script`, `style`, ...); kept verbatim.
    RawText,
    /// Everything following a `plaintext` start tag.
    Plaintext,
    /// A `<![CDATA[...]]>` section inside foreign content.
    CdataSection,
}

/// An attribute as lexed from a start tag, in source order. `value` is absent
/// when the attribute had no `=`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttr {
    pub name: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

/// One token of the input document together with its raw bytes.
///
/// Every byte of the input appears in exactly one token's `raw`, in order, so
/// a consumer feeding them through a cursor reconstructs exact offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawToken {
    StartTag {
        raw: Vec<u8>,
        self_closing: bool,
        attrs: Vec<RawAttr>,
    },
    EndTag {
        raw: Vec<u8>,
    },
    Text {
        raw: Vec<u8>,
        /// Content span within `raw` (differs for CDATA sections).
        body: Range<usize>,
        kind: TextKind,
        /// The token immediately follows a `pre`, `listing`, or `textarea`
        /// start tag, whose first newline the tree constructor ignores.
        strip_leading_newline: bool,
    },
    Comment {
        raw: Vec<u8>,
        /// Data span within `raw`, per comment flavor, matching what an HTML
        /// parser stores for the comment node.
        body: Range<usize>,
    },
    Doctype {
        raw: Vec<u8>,
    },
    /// Bytes forwarded unchanged; the downstream tokenizer handles them the
    /// same way whether or not they pass through the shim (`</>`, tags
    /// truncated by end-of-file).
    Passthrough {
        raw: Vec<u8>,
    },
}

impl RawToken {
    pub fn raw(&self) -> &[u8] {
        match self {
            RawToken::StartTag { raw, .. }
            | RawToken::EndTag { raw }
            | RawToken::Text { raw, .. }
            | RawToken::Comment { raw, .. }
            | RawToken::Doctype { raw }
            | RawToken::Passthrough { raw } => raw,
        }
    }
}

/// The tokenizer seam: something that yields one [`RawToken`] at a time until
/// the document is exhausted.
pub trait TokenSource {
    fn next_token(&mut self) -> Option<RawToken>;
}

#[derive(Debug, Clone)]
struct RawtextElement {
    name: Vec<u8>,
    kind: TextKind,
    script: bool,
}

#[derive(Debug, Clone)]
struct ForeignFrame {
    name: Vec<u8>,
    mathml: bool,
    integration_point: bool,
}

enum AttrStep {
    Attr(AttrLex),
    End,
    Truncated,
}

struct AttrLex {
    name_start: usize,
    name_length: usize,
    value: Option<(usize, usize)>,
    end: usize,
}

#[derive(PartialEq)]
enum ScriptState {
    Unescaped,
    Escaped,
    DoubleEscaped,
}

/// Splits an HTML document into tokens with exact byte spans.
///
/// The scanner follows the WHATWG tokenization states far enough to agree
/// with a conforming HTML tokenizer on token boundaries: tag-open dispatch,
/// comment flavors (including abruptly-closed comments and the invalid
/// `--!>` closer), DOCTYPE, CDATA inside foreign content, bogus comments,
/// RCDATA/RAWTEXT element content with the script-data escape states, and
/// `plaintext`. It does not build a tree and it does not decode character
/// references; it only reports where tokens are and what raw bytes they hold.
pub struct TokenScanner {
    html_bytes: Vec<u8>,
    at: usize,
    pending: VecDeque<RawToken>,
    rawtext: Option<RawtextElement>,
    plaintext: bool,
    skip_newline_at: Option<usize>,
    foreign: Vec<ForeignFrame>,
    scripting_enabled: bool,
}

impl TokenScanner {
    pub fn new(html: Vec<u8>) -> Self {
        Self {
            html_bytes: html,
            at: 0,
            pending: VecDeque::new(),
            rawtext: None,
            plaintext: false,
            skip_newline_at: None,
            foreign: Vec::new(),
            scripting_enabled: true,
        }
    }

    /// Whether `noscript` content is scanned as RAWTEXT, matching the tree
    /// constructor's scripting flag.
    pub fn set_scripting_enabled(&mut self, enabled: bool) {
        self.scripting_enabled = enabled;
    }

    fn scan_next(&mut self) -> Option<RawToken> {
        if let Some(token) = self.pending.pop_front() {
            return Some(token);
        }

        if self.at >= self.html_bytes.len() {
            return None;
        }

        if self.plaintext {
            let raw = self.html_bytes[self.at..].to_vec();
            self.at = self.html_bytes.len();
            return Some(RawToken::Text {
                body: 0..raw.len(),
                raw,
                kind: TextKind::Plaintext,
                strip_leading_newline: false,
            });
        }

        if let Some(element) = self.rawtext.take() {
            return Some(self.rawtext_content(element));
        }

        Some(self.scan_data())
    }

    /// Content of a RAWTEXT or RCDATA element, followed by its end tag.
    fn rawtext_content(&mut self, element: RawtextElement) -> RawToken {
        let len = self.html_bytes.len();
        let strip_leading_newline = self.skip_newline_at == Some(self.at);

        let closer = if element.script {
            self.script_closer()
        } else {
            self.rcdata_closer(&element.name)
        };

        match closer {
            Some((text_end, closer_end)) => {
                let end_tag = RawToken::EndTag {
                    raw: self.html_bytes[text_end..closer_end].to_vec(),
                };

                if text_end > self.at {
                    let raw = self.html_bytes[self.at..text_end].to_vec();
                    self.at = closer_end;
                    self.pending.push_back(end_tag);

                    RawToken::Text {
                        body: 0..raw.len(),
                        raw,
                        kind: element.kind,
                        strip_leading_newline,
                    }
                } else {
                    self.at = closer_end;
                    end_tag
                }
            }
            None => {
                // No closer before end-of-file; the rest of the document is
                // element content.
                let raw = self.html_bytes[self.at..].to_vec();
                self.at = len;

                RawToken::Text {
                    body: 0..raw.len(),
                    raw,
                    kind: element.kind,
                    strip_leading_newline,
                }
            }
        }
    }

    /// Finds `</name ...>` at or after the cursor, skipping close-tag
    /// lookalikes whose name does not terminate (`</titlerug`).
    ///
    /// Returns the span boundaries (closer start, one past `>`).
    fn rcdata_closer(&self, name: &[u8]) -> Option<(usize, usize)> {
        let html = &self.html_bytes;
        let len = html.len();

        let mut needle = Vec::with_capacity(name.len() + 2);
        needle.extend_from_slice(b"</");
        needle.extend_from_slice(name);

        let mut search = self.at;

        loop {
            let candidate = stripos(html, &needle, search)?;
            let mut cursor = candidate + needle.len();

            if cursor >= len {
                return None;
            }

            /*
             * Ensure that the tag name terminates to avoid matching on
             * substrings of a longer tag name, e.g. "</textarearug" must not
             * close "</textarea".
             */
            if !matches!(
                html[cursor],
                b' ' | b'\t' | b'\x0C' | b'\r' | b'\n' | b'/' | b'>'
            ) {
                search = cursor;
                continue;
            }

            loop {
                match self.lex_attribute(&mut cursor) {
                    AttrStep::Attr(_) => {}
                    AttrStep::End => break,
                    AttrStep::Truncated => return None,
                }
            }

            if cursor >= len {
                return None;
            }

            if html[cursor] == b'>' {
                return Some((candidate, cursor + 1));
            }

            search = cursor + 1;
        }
    }

    /// Scans script element content honoring the escaped and double-escaped
    /// script data states.
    ///
    /// @see https://html.spec.whatwg.org/multipage/parsing.html#script-data-escaped-state
    fn script_closer(&self) -> Option<(usize, usize)> {
        let html = &self.html_bytes;
        let len = html.len();

        let mut state = ScriptState::Unescaped;
        let mut at = self.at;

        while at < len {
            at += strcspn!(html, b'-' | b'<', at);

            /*
             * For all script states a "-->" transitions back into the normal
             * unescaped script mode, even if that's the current state.
             */
            if at + 2 < len && html[at] == b'-' && html[at + 1] == b'-' && html[at + 2] == b'>' {
                at += 3;
                state = ScriptState::Unescaped;
                continue;
            }

            if at + 1 >= len {
                return None;
            }

            at += 1;
            if html[at - 1] != b'<' {
                continue;
            }

            /*
             * Unlike with "-->", the "<!--" only transitions into the escaped
             * mode if not already there; it must never break out of the
             * double-escaped mode.
             */
            if at + 2 < len && html[at] == b'!' && html[at + 1] == b'-' && html[at + 2] == b'-' {
                at += 3;
                if state == ScriptState::Unescaped {
                    state = ScriptState::Escaped;
                }
                continue;
            }

            let is_closing = if html[at] == b'/' {
                let closer_potentially_starts_at = at - 1;
                at += 1;
                Some(closer_potentially_starts_at)
            } else {
                None
            };

            /*
             * Only <script> and </script> change state past this point;
             * anything else is plain script text.
             */
            if !(at + 6 < len && html[at..at + 6].eq_ignore_ascii_case(b"script")) {
                at += 1;
                continue;
            }

            at += 6;
            if !matches!(html[at], b' ' | b'\t' | b'\x0C' | b'\r' | b'\n' | b'/' | b'>') {
                at += 1;
                continue;
            }

            if state == ScriptState::Escaped && is_closing.is_none() {
                state = ScriptState::DoubleEscaped;
                continue;
            }

            if state == ScriptState::DoubleEscaped && is_closing.is_some() {
                state = ScriptState::Escaped;
                continue;
            }

            if let Some(closer_starts_at) = is_closing {
                let mut cursor = at;

                loop {
                    match self.lex_attribute(&mut cursor) {
                        AttrStep::Attr(_) => {}
                        AttrStep::End => break,
                        AttrStep::Truncated => return None,
                    }
                }

                if cursor >= len {
                    return None;
                }

                if html[cursor] == b'>' {
                    return Some((closer_starts_at, cursor + 1));
                }
            }

            at += 1;
        }

        None
    }

    /// Finds the next token in DATA state, starting at the cursor.
    fn scan_data(&mut self) -> RawToken {
        let len = self.html_bytes.len();
        let was_at = self.at;
        let mut at = was_at;

        loop {
            let Some(tag_at) = strpos(&self.html_bytes, b"<", at) else {
                break;
            };
            at = tag_at;

            if at > was_at {
                /*
                 * A "<" only opens a token when the next character can
                 * produce one; otherwise it is plaintext ("<3" renders as
                 * text, not a tag).
                 *
                 * @see https://html.spec.whatwg.org/multipage/parsing.html#tag-open-state
                 */
                if at + 1 >= len
                    || !matches!(
                        self.html_bytes[at + 1],
                        b'!' | b'/' | b'?' | b'a'..=b'z' | b'A'..=b'Z'
                    )
                {
                    at += 1;
                    continue;
                }

                return self.text_token(was_at, at);
            }

            let is_closing = at + 1 < len && self.html_bytes[at + 1] == b'/';
            let probe_at = at + 1 + usize::from(is_closing);

            if probe_at >= len {
                // A trailing "<" or "</" is emitted as text.
                break;
            }

            let name_prefix = strspn!(self.html_bytes, b'a'..=b'z' | b'A'..=b'Z', probe_at);
            if name_prefix > 0 {
                return self.scan_tag(at, probe_at, is_closing);
            }

            if !is_closing && self.html_bytes[probe_at] == b'!' {
                return self.scan_markup_declaration(at);
            }

            if self.html_bytes[probe_at] == b'>' {
                if !is_closing {
                    // "<>" is plaintext.
                    at += 1;
                    continue;
                }

                /*
                 * "</>" is a missing end tag name, ignored entirely; forward
                 * it so the downstream tokenizer ignores it the same way.
                 *
                 * @see https://html.spec.whatwg.org/#parse-error-missing-end-tag-name
                 */
                self.at = probe_at + 1;
                return RawToken::Passthrough {
                    raw: self.html_bytes[at..probe_at + 1].to_vec(),
                };
            }

            if !is_closing && self.html_bytes[probe_at] == b'?' {
                // "<?" transitions to the bogus comment state; its data keeps
                // the "?".
                return self.scan_bogus_comment(at, 1);
            }

            if is_closing {
                /*
                 * A non-alpha character where the closer's tag name belongs
                 * is a bogus comment whose data starts after the solidus.
                 *
                 * @see https://html.spec.whatwg.org/#parse-error-invalid-first-character-of-tag-name
                 */
                return self.scan_bogus_comment(at, 2);
            }

            at += 1;
        }

        self.text_token(was_at, len)
    }

    fn text_token(&mut self, from: usize, until: usize) -> RawToken {
        let raw = self.html_bytes[from..until].to_vec();
        self.at = until;

        RawToken::Text {
            body: 0..raw.len(),
            raw,
            kind: TextKind::Data,
            strip_leading_newline: self.skip_newline_at == Some(from),
        }
    }

    /// `<!...`: comment, DOCTYPE, CDATA, or bogus comment.
    fn scan_markup_declaration(&mut self, at: usize) -> RawToken {
        let len = self.html_bytes.len();

        if at + 4 <= len && &self.html_bytes[at + 2..at + 4] == b"--" {
            return self.scan_comment(at);
        }

        // `<!DOCTYPE` is ASCII-case-insensitive.
        if len > at + 8 && self.html_bytes[at + 2..at + 9].eq_ignore_ascii_case(b"DOCTYPE") {
            let token_end = match strpos(&self.html_bytes, b">", at + 9) {
                Some(closer_at) => closer_at + 1,
                // Truncated; the downstream tokenizer emits it at EOF too.
                None => len,
            };
            self.at = token_end;

            return RawToken::Doctype {
                raw: self.html_bytes[at..token_end].to_vec(),
            };
        }

        /*
         * CDATA sections only exist inside foreign content; in HTML content
         * the same bytes are a bogus comment spanning to the nearest ">".
         *
         * @see https://html.spec.whatwg.org/multipage/parsing.html#markup-declaration-open-state
         */
        if !self.in_html_rules() && len > at + 8 && &self.html_bytes[at + 2..at + 9] == b"[CDATA[" {
            let (token_end, body_end) = match strpos(&self.html_bytes, b"]]>", at + 9) {
                Some(closer_at) => (closer_at + 3, closer_at - at),
                None => (len, len - at),
            };
            self.at = token_end;

            return RawToken::Text {
                body: 9..body_end,
                raw: self.html_bytes[at..token_end].to_vec(),
                kind: TextKind::CdataSection,
                strip_leading_newline: false,
            };
        }

        self.scan_bogus_comment(at, 2)
    }

    /// `<!--`: a comment, possibly abruptly closed.
    fn scan_comment(&mut self, at: usize) -> RawToken {
        let len = self.html_bytes.len();
        let closer_at = at + 4;

        if closer_at >= len {
            self.at = len;
            return RawToken::Comment {
                body: 4..len - at,
                raw: self.html_bytes[at..].to_vec(),
            };
        }

        // Abruptly-closed comments are a run of dashes followed by ">"
        // (`<!-->`, `<!--->`); longer runs keep the inner dashes as data.
        let span_of_dashes = strspn!(self.html_bytes, b'-', closer_at);
        if closer_at + span_of_dashes < len && self.html_bytes[closer_at + span_of_dashes] == b'>' {
            let token_end = closer_at + span_of_dashes + 1;
            let body = if span_of_dashes >= 2 {
                4..4 + span_of_dashes - 2
            } else {
                4..4
            };
            self.at = token_end;

            return RawToken::Comment {
                body,
                raw: self.html_bytes[at..token_end].to_vec(),
            };
        }

        /*
         * Comments may be closed by either a --> or an invalid --!>; the
         * first occurrence closes the comment.
         *
         * @see https://html.spec.whatwg.org/#parse-error-incorrectly-closed-comment
         */
        let mut search = closer_at;
        while let Some(dashes_at) = strpos(&self.html_bytes, b"--", search) {
            if dashes_at + 2 < len && self.html_bytes[dashes_at + 2] == b'>' {
                let token_end = dashes_at + 3;
                self.at = token_end;

                return RawToken::Comment {
                    body: 4..dashes_at - at,
                    raw: self.html_bytes[at..token_end].to_vec(),
                };
            }

            if dashes_at + 3 < len
                && self.html_bytes[dashes_at + 2] == b'!'
                && self.html_bytes[dashes_at + 3] == b'>'
            {
                let token_end = dashes_at + 4;
                self.at = token_end;

                return RawToken::Comment {
                    body: 4..dashes_at - at,
                    raw: self.html_bytes[at..token_end].to_vec(),
                };
            }

            search = dashes_at + 1;
        }

        self.at = len;
        RawToken::Comment {
            body: 4..len - at,
            raw: self.html_bytes[at..].to_vec(),
        }
    }

    /// Everything up to the nearest `>`; the data starts `body_skip` bytes in
    /// (after `<!`, `</`, or just `<` for `<?`).
    fn scan_bogus_comment(&mut self, at: usize, body_skip: usize) -> RawToken {
        let len = self.html_bytes.len();

        let (token_end, body_end) = match strpos(&self.html_bytes, b">", at + body_skip) {
            Some(closer_at) => (closer_at + 1, closer_at - at),
            None => (len, len - at),
        };
        self.at = token_end;

        RawToken::Comment {
            body: body_skip..body_end,
            raw: self.html_bytes[at..token_end].to_vec(),
        }
    }

    fn scan_tag(&mut self, at: usize, name_at: usize, is_closing: bool) -> RawToken {
        let len = self.html_bytes.len();

        let name_prefix = strspn!(self.html_bytes, b'a'..=b'z' | b'A'..=b'Z', name_at);
        let name_length = name_prefix
            + strcspn!(
                self.html_bytes,
                b' ' | b'\t' | b'\x0C' | b'\r' | b'\n' | b'/' | b'>',
                name_at + name_prefix
            );
        let name_end = name_at + name_length;

        let mut attrs = Vec::new();
        let mut cursor = name_end;
        let mut last_attr_end = name_end;

        loop {
            match self.lex_attribute(&mut cursor) {
                AttrStep::Attr(attr) => {
                    last_attr_end = attr.end;

                    if !is_closing {
                        attrs.push(RawAttr {
                            name: self.html_bytes[attr.name_start..attr.name_start + attr.name_length]
                                .to_vec(),
                            value: attr.value.map(|(start, length)| {
                                self.html_bytes[start..start + length].to_vec()
                            }),
                        });
                    }
                }
                AttrStep::End => break,
                AttrStep::Truncated => {
                    // EOF inside a tag; every conforming tokenizer drops it.
                    self.at = len;
                    return RawToken::Passthrough {
                        raw: self.html_bytes[at..].to_vec(),
                    };
                }
            }
        }

        let tag_end = if cursor < len && self.html_bytes[cursor] == b'>' {
            cursor
        } else {
            match strpos(&self.html_bytes, b">", cursor) {
                Some(end) => end,
                None => {
                    self.at = len;
                    return RawToken::Passthrough {
                        raw: self.html_bytes[at..].to_vec(),
                    };
                }
            }
        };

        let token_end = tag_end + 1;
        let raw = self.html_bytes[at..token_end].to_vec();
        self.at = token_end;

        let name = self.html_bytes[name_at..name_end].to_ascii_lowercase();

        if is_closing {
            self.close_foreign_element(&name);
            return RawToken::EndTag { raw };
        }

        /*
         * The solidus right before ">" is the self-closing flag only when it
         * is not already part of an attribute: `<a href=/>` is an ordinary
         * start tag whose href value is "/".
         */
        let self_closing =
            self.html_bytes[tag_end - 1] == b'/' && tag_end - 1 >= last_attr_end;

        self.open_element(&name, &attrs, self_closing, token_end);

        RawToken::StartTag {
            raw,
            self_closing,
            attrs,
        }
    }

    fn lex_attribute(&self, cursor: &mut usize) -> AttrStep {
        let html = &self.html_bytes;
        let len = html.len();

        // Skip whitespace and stray solidi.
        *cursor += strspn!(html, b' ' | b'\t' | b'\x0C' | b'\r' | b'\n' | b'/', *cursor);
        if *cursor >= len {
            return AttrStep::Truncated;
        }

        /*
         * The equal sign joins the attribute name when it is the first
         * encountered byte.
         *
         * @see https://html.spec.whatwg.org/multipage/parsing.html#before-attribute-name-state
         */
        let starts_with_equal = html[*cursor] == b'=';
        let start_shift = usize::from(starts_with_equal);
        let name_length = start_shift
            + strcspn!(
                html,
                b'=' | b'/' | b'>' | b' ' | b'\t' | b'\x0C' | b'\r' | b'\n',
                *cursor + start_shift
            );

        if name_length == 0 {
            // No attribute, just the tag closer.
            return AttrStep::End;
        }

        let name_start = *cursor;
        *cursor += name_length;
        if *cursor >= len {
            return AttrStep::Truncated;
        }

        *cursor += strspn!(html, b' ' | b'\t' | b'\x0C' | b'\r' | b'\n', *cursor);
        if *cursor >= len {
            return AttrStep::Truncated;
        }

        if html[*cursor] != b'=' {
            return AttrStep::Attr(AttrLex {
                name_start,
                name_length,
                value: None,
                end: name_start + name_length,
            });
        }

        *cursor += 1;
        *cursor += strspn!(html, b' ' | b'\t' | b'\x0C' | b'\r' | b'\n', *cursor);
        if *cursor >= len {
            return AttrStep::Truncated;
        }

        match html[*cursor] {
            quote @ (b'"' | b'\'') => {
                let value_start = *cursor + 1;
                let Some(end_quote_at) = strpos(html, &[quote], value_start) else {
                    return AttrStep::Truncated;
                };
                let attribute_end = end_quote_at + 1;
                *cursor = attribute_end;

                AttrStep::Attr(AttrLex {
                    name_start,
                    name_length,
                    value: Some((value_start, end_quote_at - value_start)),
                    end: attribute_end,
                })
            }
            _ => {
                let value_start = *cursor;
                let value_length = strcspn!(
                    html,
                    b'>' | b' ' | b'\t' | b'\x0C' | b'\r' | b'\n',
                    value_start
                );
                let attribute_end = value_start + value_length;
                *cursor = attribute_end;

                AttrStep::Attr(AttrLex {
                    name_start,
                    name_length,
                    value: Some((value_start, value_length)),
                    end: attribute_end,
                })
            }
        }
    }

    /// Whether the current position parses with HTML rules (outside foreign
    /// content, or inside an integration point).
    fn in_html_rules(&self) -> bool {
        self.foreign
            .last()
            .map_or(true, |frame| frame.integration_point)
    }

    fn open_element(&mut self, name: &[u8], attrs: &[RawAttr], self_closing: bool, content_at: usize) {
        if self.in_html_rules() {
            self.open_html_element(name, self_closing, content_at);
        } else {
            self.open_foreign_element(name, attrs, self_closing);
        }
    }

    fn open_html_element(&mut self, name: &[u8], self_closing: bool, content_at: usize) {
        match name {
            b"svg" | b"math" => {
                // Self-closing foreign roots produce no subtree.
                if !self_closing {
                    self.foreign.push(ForeignFrame {
                        name: name.to_vec(),
                        mathml: name == b"math",
                        integration_point: false,
                    });
                }
            }

            /*
             * The self-closing flag is ignored on HTML elements, so these
             * switch the tokenizer even when written as `<script/>`.
             */
            b"script" => {
                self.rawtext = Some(RawtextElement {
                    name: name.to_vec(),
                    kind: TextKind::RawText,
                    script: true,
                });
            }

            b"title" | b"textarea" => {
                self.rawtext = Some(RawtextElement {
                    name: name.to_vec(),
                    kind: TextKind::RcData,
                    script: false,
                });

                if name == b"textarea" {
                    self.skip_newline_at = Some(content_at);
                }
            }

            b"style" | b"iframe" | b"xmp" | b"noembed" | b"noframes" => {
                self.rawtext = Some(RawtextElement {
                    name: name.to_vec(),
                    kind: TextKind::RawText,
                    script: false,
                });
            }

            b"noscript" if self.scripting_enabled => {
                self.rawtext = Some(RawtextElement {
                    name: name.to_vec(),
                    kind: TextKind::RawText,
                    script: false,
                });
            }

            b"plaintext" => {
                self.plaintext = true;
            }

            /*
             * For LISTING and PRE an immediately-following newline is an
             * authoring convenience the tree constructor drops.
             */
            b"pre" | b"listing" => {
                self.skip_newline_at = Some(content_at);
            }

            _ => {}
        }
    }

    fn open_foreign_element(&mut self, name: &[u8], attrs: &[RawAttr], self_closing: bool) {
        if is_breakout_tag(name, attrs) {
            /*
             * An HTML element token in foreign content pops the whole
             * foreign subtree and is reprocessed with HTML rules.
             *
             * @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-inforeign
             */
            self.foreign.clear();
            self.open_html_element(name, self_closing, self.at);
            return;
        }

        if self_closing {
            return;
        }

        let inherited_mathml = self.foreign.last().map_or(false, |frame| frame.mathml);
        let mathml = match name {
            b"svg" => false,
            b"math" => true,
            _ => inherited_mathml,
        };

        let integration_point = if mathml {
            matches!(name, b"mi" | b"mo" | b"mn" | b"ms" | b"mtext")
                || (name == b"annotation-xml" && has_html_encoding(attrs))
        } else {
            matches!(name, b"foreignobject" | b"desc" | b"title")
        };

        self.foreign.push(ForeignFrame {
            name: name.to_vec(),
            mathml,
            integration_point,
        });
    }

    fn close_foreign_element(&mut self, name: &[u8]) {
        if let Some(position) = self.foreign.iter().rposition(|frame| frame.name == name) {
            self.foreign.truncate(position);
        }
    }
}

impl TokenSource for TokenScanner {
    fn next_token(&mut self) -> Option<RawToken> {
        self.scan_next()
    }
}

fn has_html_encoding(attrs: &[RawAttr]) -> bool {
    attrs.iter().any(|attr| {
        attr.name.eq_ignore_ascii_case(b"encoding")
            && attr.value.as_deref().is_some_and(|value| {
                value.eq_ignore_ascii_case(b"text/html")
                    || value.eq_ignore_ascii_case(b"application/xhtml+xml")
            })
    })
}

/// Start tags that break out of foreign content back into HTML parsing.
fn is_breakout_tag(name: &[u8], attrs: &[RawAttr]) -> bool {
    match name {
        b"b" | b"big" | b"blockquote" | b"body" | b"br" | b"center" | b"code" | b"dd" | b"div"
        | b"dl" | b"dt" | b"em" | b"embed" | b"h1" | b"h2" | b"h3" | b"h4" | b"h5" | b"h6"
        | b"head" | b"hr" | b"i" | b"img" | b"li" | b"listing" | b"menu" | b"meta" | b"nobr"
        | b"ol" | b"p" | b"pre" | b"ruby" | b"s" | b"small" | b"span" | b"strong" | b"strike"
        | b"sub" | b"sup" | b"table" | b"tt" | b"u" | b"ul" | b"var" => true,
        b"font" => attrs.iter().any(|attr| {
            attr.name.eq_ignore_ascii_case(b"color")
                || attr.name.eq_ignore_ascii_case(b"face")
                || attr.name.eq_ignore_ascii_case(b"size")
        }),
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tokens(html: &str) -> Vec<RawToken> {
        let mut scanner = TokenScanner::new(html.as_bytes().to_vec());
        let mut out = Vec::new();
        while let Some(token) = scanner.next_token() {
            out.push(token);
        }
        out
    }

    fn raw_strings(html: &str) -> Vec<String> {
        tokens(html)
            .iter()
            .map(|t| String::from_utf8_lossy(t.raw()).into_owned())
            .collect()
    }

    #[test]
    fn splits_tags_and_text() {
        assert_eq!(raw_strings("<p>Hello world!</p>"), ["<p>", "Hello world!", "</p>"]);
    }

    #[test]
    fn every_byte_lands_in_exactly_one_token() {
        for html in [
            "<p>x</p>",
            "plain",
            "a <3 b",
            "<!-- note --><p a=1 b='2' c>x",
            "<script>if (a < b) { run() }</script>tail",
            "<!doctype html><html><body>x",
            "<p",
            "<p class=\"x",
            "<",
            "</",
            "</>x",
            "<svg><![CDATA[a<b]]></svg>",
        ] {
            let total: usize = tokens(html).iter().map(|t| t.raw().len()).sum();
            assert_eq!(total, html.len(), "byte coverage for {html:?}");
        }
    }

    #[test]
    fn tag_attributes_are_reported_in_order() {
        let all = tokens("<p one two=2 three='3' four=\"4\">");
        let RawToken::StartTag { attrs, self_closing, .. } = &all[0] else {
            panic!("expected start tag");
        };

        assert!(!self_closing);
        assert_eq!(
            attrs
                .iter()
                .map(|a| String::from_utf8_lossy(&a.name).into_owned())
                .collect::<Vec<_>>(),
            ["one", "two", "three", "four"]
        );
        assert_eq!(attrs[0].value, None);
        assert_eq!(attrs[1].value.as_deref(), Some(b"2".as_slice()));
        assert_eq!(attrs[2].value.as_deref(), Some(b"3".as_slice()));
        assert_eq!(attrs[3].value.as_deref(), Some(b"4".as_slice()));
    }

    #[test]
    fn self_closing_flag_requires_free_solidus() {
        let all = tokens("<br/><a href=/>");

        let RawToken::StartTag { self_closing, .. } = &all[0] else {
            panic!("expected start tag");
        };
        assert!(*self_closing);

        let RawToken::StartTag { self_closing, attrs, .. } = &all[1] else {
            panic!("expected start tag");
        };
        assert!(!*self_closing);
        assert_eq!(attrs[0].value.as_deref(), Some(b"/".as_slice()));
    }

    #[test]
    fn quoted_values_may_contain_tag_closers() {
        assert_eq!(raw_strings("<p a=\">\">x"), ["<p a=\">\">", "x"]);
    }

    #[test]
    fn comment_flavors_cover_token_and_body() {
        for (html, body) in [
            ("<!---->", ""),
            ("<!-->", ""),
            ("<!--->", ""),
            ("<!-- comment -->", " comment "),
            ("<!--a--!>", "a"),
            ("<?php echo ?>", "?php echo ?"),
            ("</3>", "3"),
            ("<!x>", "x"),
            ("<!>", ""),
        ] {
            let all = tokens(html);
            assert_eq!(all.len(), 1, "one token for {html:?}");
            let RawToken::Comment { raw, body: span } = &all[0] else {
                panic!("expected comment for {html:?}");
            };
            assert_eq!(raw.len(), html.len());
            assert_eq!(&raw[span.clone()], body.as_bytes(), "body of {html:?}");
        }
    }

    #[test]
    fn rawtext_content_is_not_markup() {
        assert_eq!(
            raw_strings("<script>if (a<b) document.write(\"</p>\")</script>"),
            ["<script>", "if (a<b) document.write(\"</p>\")", "</script>"]
        );
        assert_eq!(
            raw_strings("<style>a>b{}</style>"),
            ["<style>", "a>b{}", "</style>"]
        );
    }

    #[test]
    fn script_double_escape_keeps_inner_closer() {
        let html = "<script><!--<script></script>--></script>";
        assert_eq!(
            raw_strings(html),
            ["<script>", "<!--<script></script>-->", "</script>"]
        );
    }

    #[test]
    fn rcdata_closer_must_terminate() {
        assert_eq!(
            raw_strings("<title>a</titles>b</title>"),
            ["<title>", "a</titles>b", "</title>"]
        );
    }

    #[test]
    fn rcdata_closer_is_case_insensitive() {
        assert_eq!(raw_strings("<title>a</TITLE>"), ["<title>", "a", "</TITLE>"]);
    }

    #[test]
    fn plaintext_consumes_the_rest() {
        assert_eq!(
            raw_strings("<plaintext></plaintext><p>"),
            ["<plaintext>", "</plaintext><p>"]
        );
    }

    #[test]
    fn svg_title_is_not_rcdata() {
        assert_eq!(
            raw_strings("<svg><title><rect/></title></svg>"),
            ["<svg>", "<title>", "<rect/>", "</title>", "</svg>"]
        );
    }

    #[test]
    fn html_title_after_svg_is_rcdata_again() {
        assert_eq!(
            raw_strings("<svg></svg><title><b></title>"),
            ["<svg>", "</svg>", "<title>", "<b>", "</title>"]
        );
    }

    #[test]
    fn foreign_cdata_is_text() {
        let all = tokens("<svg><![CDATA[a<b]]></svg>");
        let RawToken::Text { body, kind, raw, .. } = &all[1] else {
            panic!("expected text");
        };
        assert_eq!(*kind, TextKind::CdataSection);
        assert_eq!(&raw[body.clone()], b"a<b");
    }

    #[test]
    fn breakout_tag_leaves_foreign_content() {
        // The div pops the svg subtree, so the following title is RCDATA.
        assert_eq!(
            raw_strings("<svg><div></div><title><b></title>"),
            ["<svg>", "<div>", "</div>", "<title>", "<b>", "</title>"]
        );
    }

    #[test]
    fn pre_marks_following_text_for_newline_removal() {
        let all = tokens("<pre>\nx</pre>\ny");

        let RawToken::Text { strip_leading_newline, .. } = &all[1] else {
            panic!("expected text");
        };
        assert!(*strip_leading_newline);

        let RawToken::Text { strip_leading_newline, .. } = &all[3] else {
            panic!("expected text");
        };
        assert!(!*strip_leading_newline);
    }

    #[test]
    fn truncated_tag_is_forwarded_as_is() {
        let all = tokens("x<p class=\"y");
        assert!(matches!(&all[1], RawToken::Passthrough { .. }));
    }
}
