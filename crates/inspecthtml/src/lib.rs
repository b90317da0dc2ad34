//! HTML5 parsing with a source-position side table.
//!
//! This crate wraps the stock html5ever tree constructor so that every
//! element, attribute, text run, and comment surviving tree construction can
//! be traced back to byte- and line/column-precise ranges in the original
//! input: the producing token's span, the tag-name span, each attribute's
//! key and value spans, and the explicit or inferred end-tag span from which
//! inner and outer ranges derive.
//!
//! The tree constructor performs aggressive error recovery (implicit
//! `<head>`/`<body>`, implied end tags, foster-parenting text out of tables,
//! merging adjacent text runs) and never reports source offsets. The shim
//! survives those edits by tokenizing the input itself, recording each
//! token's range, and feeding the parser *stand-in* bytes whose payloads
//! carry lookup keys; after tree construction a rebuild pass restores the
//! original content and attaches the recorded ranges to the surviving nodes.
//!
//! ```no_run
//! use markup5ever_rcdom::NodeData;
//!
//! let (dom, metadata) = inspecthtml::parse(std::io::stdin().lock())?;
//!
//! for child in dom.document.children.borrow().iter() {
//!     if let NodeData::Element { .. } = child.data {
//!         let spans = metadata.node_metadata(child).expect("parsed element");
//!         println!("document element spans {}", spans.outer_offsets());
//!     }
//! }
//! # Ok::<(), inspecthtml::ParseError>(())
//! ```
//!
//! The parse either returns a complete tree with (possibly partial)
//! metadata, or an upstream error and no tree; a partial tree is never
//! returned. Nodes the parser synthesized during recovery have no metadata.

use std::cell::RefCell;
use std::io::Read;
use std::rc::Rc;

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use text_cursor::TextWriter;

mod errors;
mod macros;
mod metadata;
mod reader;
mod rebuild;
mod str_fns;
mod text;
mod token_scanner;

pub use errors::ParseError;
pub use html5ever::ParseOpts;
pub use markup5ever_rcdom::{Handle, RcDom};
pub use metadata::{NodeAttributeMetadata, NodeMetadata, ParseMetadata};
pub use text_cursor::{TextOffset, TextOffsetRange};
pub use token_scanner::{RawAttr, RawToken, TextKind, TokenScanner, TokenSource};

/// Parses a complete HTML document, returning the DOM and its source-span
/// side table.
pub fn parse<R: Read>(input: R) -> Result<(RcDom, ParseMetadata), ParseError> {
    Parser::new(input).parse()
}

/// Like [`parse`], forwarding options to the tree constructor.
pub fn parse_with_options<R: Read>(
    input: R,
    opts: ParseOpts,
) -> Result<(RcDom, ParseMetadata), ParseError> {
    Parser::new(input).parse_with_options(opts)
}

/// Wraps the token source, e.g. to filter or log tokens before they are
/// recorded.
pub type TokenizerInterceptor = Box<dyn FnOnce(Box<dyn TokenSource>) -> Box<dyn TokenSource>>;

/// Wraps the byte stream the tree constructor consumes, e.g. to tee the
/// stand-in bytes.
pub type ReaderInterceptor = Box<dyn FnOnce(Box<dyn Read>) -> Box<dyn Read>>;

/// Construction-time configuration for [`Parser`].
#[derive(Default)]
pub struct ParserConfig {
    initial_offset: TextOffset,
    tokenizer_interceptor: Option<TokenizerInterceptor>,
    reader_interceptor: Option<ReaderInterceptor>,
}

impl ParserConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the cursor, for callers parsing a fragment of a larger
    /// document. Defaults to zero.
    pub fn set_initial_offset(mut self, offset: TextOffset) -> Self {
        self.initial_offset = offset;
        self
    }

    pub fn set_tokenizer_interceptor(
        mut self,
        intercept: impl FnOnce(Box<dyn TokenSource>) -> Box<dyn TokenSource> + 'static,
    ) -> Self {
        self.tokenizer_interceptor = Some(Box::new(intercept));
        self
    }

    pub fn set_reader_interceptor(
        mut self,
        intercept: impl FnOnce(Box<dyn Read>) -> Box<dyn Read> + 'static,
    ) -> Self {
        self.reader_interceptor = Some(Box::new(intercept));
        self
    }
}

/// A single-use parser; each instance owns its own cursor, key tables, and
/// token source for one parse.
pub struct Parser<R> {
    input: R,
    config: ParserConfig,
}

impl<R: Read> Parser<R> {
    pub fn new(input: R) -> Self {
        Self::with_config(input, ParserConfig::new())
    }

    pub fn with_config(input: R, config: ParserConfig) -> Self {
        Self { input, config }
    }

    pub fn parse(self) -> Result<(RcDom, ParseMetadata), ParseError> {
        self.parse_with_options(ParseOpts::default())
    }

    pub fn parse_with_options(mut self, opts: ParseOpts) -> Result<(RcDom, ParseMetadata), ParseError> {
        let mut input = Vec::new();
        self.input.read_to_end(&mut input)?;

        let mut scanner = TokenScanner::new(input);
        scanner.set_scripting_enabled(opts.tree_builder.scripting_enabled);

        let mut source: Box<dyn TokenSource> = Box::new(scanner);
        if let Some(intercept) = self.config.tokenizer_interceptor.take() {
            source = intercept(source);
        }

        let state = Rc::new(RefCell::new(reader::ReaderState::new(
            source,
            TextWriter::new(self.config.initial_offset),
        )));

        let mut byte_stream: Box<dyn Read> =
            Box::new(reader::InstrumentingReader::new(Rc::clone(&state)));
        if let Some(intercept) = self.config.reader_interceptor.take() {
            byte_stream = intercept(byte_stream);
        }

        let dom = parse_document(RcDom::default(), opts)
            .from_utf8()
            .read_from(&mut byte_stream)?;
        drop(byte_stream);

        let harvest = state.borrow_mut().finish();
        let metadata = rebuild::rebuild(&dom.document, harvest)?;

        Ok((dom, metadata))
    }
}
