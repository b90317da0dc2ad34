use std::cell::RefCell;
use std::rc::Rc;

use markup5ever_rcdom::Handle;
use rustc_hash::FxHashMap;
use text_cursor::{TextOffset, TextOffsetRange};

/// Source spans for one attribute, aligned by index with the node's
/// attribute list. `value_offsets` is absent when the attribute had no `=`;
/// for quoted values the span includes the quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAttributeMetadata {
    pub key_offsets: TextOffsetRange,
    pub value_offsets: Option<TextOffsetRange>,
}

/// Source spans for one surviving node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMetadata {
    /// The producing token's span.
    pub token_offsets: TextOffsetRange,

    /// The tag name's span; elements only.
    pub tag_name_offsets: Option<TextOffsetRange>,

    /// Attribute spans aligned with the node's attribute list; an entry is
    /// `None` when the attribute could not be located in source.
    pub tag_attr: Vec<Option<NodeAttributeMetadata>>,

    /// The source token carried the self-closing flag.
    pub tag_self_closing: bool,

    /// The end tag's span: the explicit one, or a zero-width range at the
    /// point where the parser implicitly closed the element.
    pub end_tag_token_offsets: Option<TextOffsetRange>,
}

impl NodeMetadata {
    pub(crate) fn for_token(token_offsets: TextOffsetRange) -> Self {
        Self {
            token_offsets,
            tag_name_offsets: None,
            tag_attr: Vec::new(),
            tag_self_closing: false,
            end_tag_token_offsets: None,
        }
    }

    /// Start of the open tag through the end of the close tag; just the
    /// token span when there is no end tag.
    pub fn outer_offsets(&self) -> TextOffsetRange {
        match self.end_tag_token_offsets {
            None => self.token_offsets,
            Some(end_tag) => TextOffsetRange {
                from: self.token_offsets.from,
                until: end_tag.until,
            },
        }
    }

    pub fn has_inner(&self) -> bool {
        self.end_tag_token_offsets.is_some()
    }

    /// The content span between open and close tags; absent without an end
    /// tag.
    pub fn inner_offsets(&self) -> Option<TextOffsetRange> {
        self.end_tag_token_offsets.map(|end_tag| TextOffsetRange {
            from: self.token_offsets.until,
            until: end_tag.from,
        })
    }
}

struct MetadataEntry {
    /// Strong handle so the pointer key cannot be reused while this table is
    /// alive.
    node: Handle,
    metadata: RefCell<NodeMetadata>,
}

/// The side table mapping nodes of the returned DOM to their source spans.
///
/// Lookups are by node identity. End tags of implicitly-closed elements that
/// could not be placed during the rebuild are completed lazily on lookup,
/// so this type is not safe for unsynchronized concurrent reads.
pub struct ParseMetadata {
    by_node: FxHashMap<usize, MetadataEntry>,
    final_position: TextOffset,
}

fn node_key(node: &Handle) -> usize {
    Rc::as_ptr(node) as usize
}

/// Reads the parent link without disturbing the cell.
fn parent_of(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take();
    node.parent.set(weak.clone());
    weak.and_then(|parent| parent.upgrade())
}

fn next_sibling(node: &Handle) -> Option<Handle> {
    let parent = parent_of(node)?;
    let children = parent.children.borrow();
    let at = children.iter().position(|child| Rc::ptr_eq(child, node))?;

    children.get(at + 1).cloned()
}

impl ParseMetadata {
    pub(crate) fn new(final_position: TextOffset) -> Self {
        Self {
            by_node: FxHashMap::default(),
            final_position,
        }
    }

    pub(crate) fn insert(&mut self, node: &Handle, metadata: NodeMetadata) {
        self.by_node.insert(
            node_key(node),
            MetadataEntry {
                node: node.clone(),
                metadata: RefCell::new(metadata),
            },
        );
    }

    fn entry(&self, node: &Handle) -> Option<&MetadataEntry> {
        self.by_node
            .get(&node_key(node))
            .filter(|entry| Rc::ptr_eq(&entry.node, node))
    }

    /// Metadata for `node`, if the node survived from source. Unknown nodes
    /// (parser-synthesized, or from another parse) return `None`.
    pub fn node_metadata(&self, node: &Handle) -> Option<NodeMetadata> {
        self.complete_end_tag(node);

        Some(self.entry(node)?.metadata.borrow().clone())
    }

    /// The cursor's end position: for a whole-document parse, `byte` equals
    /// the input length. Useful as the `initial_offset` of a follow-up
    /// fragment parse.
    pub fn final_position(&self) -> TextOffset {
        self.final_position
    }

    pub(crate) fn set_end_tag(&self, node: &Handle, offsets: TextOffsetRange) {
        if let Some(entry) = self.entry(node) {
            let mut metadata = entry.metadata.borrow_mut();

            // The first encountered offset is the most accurate; a repeat
            // means the parser reordered nodes.
            if metadata.end_tag_token_offsets.is_none() {
                metadata.end_tag_token_offsets = Some(offsets);
            }
        }
    }

    /// Completes the implicit end tag of an element that the parser closed
    /// without an end-tag token, when enough neighboring metadata exists.
    pub(crate) fn complete_end_tag(&self, node: &Handle) {
        let Some(entry) = self.entry(node) else {
            return;
        };

        {
            let metadata = entry.metadata.borrow();
            if metadata.tag_name_offsets.is_none()
                || metadata.tag_self_closing
                || metadata.end_tag_token_offsets.is_some()
            {
                return;
            }
        }

        if let Some(inferred) = self.infer_end_tag(node) {
            entry.metadata.borrow_mut().end_tag_token_offsets = Some(inferred);
        }
    }

    fn infer_end_tag(&self, node: &Handle) -> Option<TextOffsetRange> {
        // Collapse at the end of the last child: its end tag when it has
        // one, its own token otherwise.
        let last_child = node.children.borrow().last().cloned();
        if let Some(last_child) = last_child {
            if let Some(entry) = self.entry(&last_child) {
                let metadata = entry.metadata.borrow();
                let at = metadata
                    .end_tag_token_offsets
                    .map(|end_tag| end_tag.until)
                    .unwrap_or(metadata.token_offsets.until);

                return Some(TextOffsetRange::collapsed(at));
            }
        }

        // Collapse where the following sibling starts.
        if let Some(sibling) = next_sibling(node) {
            if let Some(entry) = self.entry(&sibling) {
                return Some(TextOffsetRange::collapsed(
                    entry.metadata.borrow().token_offsets.from,
                ));
            }
        }

        // Collapse where the parent's end tag starts.
        if let Some(parent) = parent_of(node) {
            if let Some(entry) = self.entry(&parent) {
                if let Some(end_tag) = entry.metadata.borrow().end_tag_token_offsets {
                    return Some(TextOffsetRange::collapsed(end_tag.from));
                }
            }
        }

        None
    }
}
