//! Post-parse restoration: walks the finished DOM, swaps stand-in payloads
//! back to their original content, attaches end-tag ranges from marker
//! comments, and infers end tags for elements the parser closed implicitly.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use html5ever::tendril::StrTendril;
use html5ever::Attribute;
use markup5ever_rcdom::{Handle, Node, NodeData};
use rustc_hash::FxHashMap;
use text_cursor::TextOffsetRange;

use crate::errors::ParseError;
use crate::metadata::{NodeMetadata, ParseMetadata};
use crate::reader::{ReaderHarvest, SwapEntry};

pub(crate) fn rebuild(document: &Handle, harvest: ReaderHarvest) -> Result<ParseMetadata, ParseError> {
    let mut rebuilder = Rebuilder {
        tag_metadata_by_key: harvest.tag_metadata_by_key,
        swap_by_key: harvest.swap_by_key,
        doctype_offsets: harvest.doctype_offsets,
        metadata: ParseMetadata::new(harvest.final_position),
    };

    rebuilder.walk(document)?;

    let metadata = rebuilder.metadata;

    /*
     * Elements still missing an end tag get a zero-width one inferred from
     * relatives. Bottom-up first, so a parent sees its last child's freshly
     * completed end tag; then top-down for elements whose only anchor is
     * where their parent closed.
     */
    complete_post_order(&metadata, document);
    complete_pre_order(&metadata, document);

    Ok(metadata)
}

struct Rebuilder {
    tag_metadata_by_key: FxHashMap<String, NodeMetadata>,
    swap_by_key: FxHashMap<String, SwapEntry>,
    doctype_offsets: VecDeque<TextOffsetRange>,
    metadata: ParseMetadata,
}

impl Rebuilder {
    fn walk(&mut self, parent: &Handle) -> Result<(), ParseError> {
        let mut at = 0;

        loop {
            let child = {
                let children = parent.children.borrow();
                match children.get(at) {
                    Some(child) => child.clone(),
                    None => break,
                }
            };

            match &child.data {
                NodeData::Element {
                    attrs,
                    template_contents,
                    ..
                } => {
                    self.lift_marker_attribute(&child, attrs);
                    self.walk(&child)?;

                    let contents = template_contents.borrow().clone();
                    if let Some(contents) = contents {
                        self.walk(&contents)?;
                    }

                    at += 1;
                }

                NodeData::Text { contents } => {
                    self.restore_text(parent, &child, contents, at);
                    at += 1;
                }

                NodeData::Comment { contents } => {
                    if self.restore_comment(parent, contents, at)? {
                        at += 1;
                    }
                }

                NodeData::Doctype { .. } => {
                    if let Some(offsets) = self.doctype_offsets.pop_front() {
                        self.metadata.insert(&child, NodeMetadata::for_token(offsets));
                    }
                    at += 1;
                }

                _ => {
                    at += 1;
                }
            }
        }

        Ok(())
    }

    /// The synthetic `o` attribute carries the key of the start tag that
    /// produced this element. Parser-synthesized elements never have it.
    fn lift_marker_attribute(&mut self, node: &Handle, attrs: &RefCell<Vec<Attribute>>) {
        let mut attrs = attrs.borrow_mut();

        /*
         * Usually the synthetic attribute is the last one, but the parser
         * merges attributes of repeated <html>/<body> tags onto the existing
         * element, which can bury it. Scan from the end and require the key
         * to resolve, so a user's own attribute named "o" survives.
         */
        let resolved = attrs.iter().enumerate().rev().find_map(|(at, attr)| {
            if &*attr.name.local != "o" {
                return None;
            }

            self.tag_metadata_by_key
                .get(&*attr.value)
                .map(|metadata| (at, metadata.clone()))
        });

        match resolved {
            Some((at, metadata)) => {
                attrs.remove(at);
                self.metadata.insert(node, metadata);
            }
            None => {
                if attrs.last().is_some_and(|attr| &*attr.name.local == "o") {
                    log::debug!(
                        "trailing o attribute does not resolve to tag metadata; element left unannotated"
                    );
                }
            }
        }
    }

    /// Text data is one or more `t<key>` payloads; merged runs (the parser
    /// concatenates reparented text) split back into separate nodes.
    fn restore_text(&mut self, parent: &Handle, node: &Handle, contents: &RefCell<StrTendril>, at: usize) {
        let data = contents.borrow().to_string();

        if !data.starts_with('t') {
            log::warn!("unexpected text payload {data:?}; node left unannotated");
            return;
        }

        let (key, merged_tail) = match data[1..].find('t') {
            Some(split_at) => (&data[1..1 + split_at], Some(&data[2 + split_at..])),
            None => (&data[1..], None),
        };

        let Some(swap) = self.swap_by_key.get(key).cloned() else {
            log::warn!("text stand-in {key:?} has no swap entry; node left unannotated");
            return;
        };

        *contents.borrow_mut() = StrTendril::from(swap.original);
        self.metadata.insert(node, NodeMetadata::for_token(swap.offsets));

        if let Some(tail) = merged_tail {
            let inject = Node::new(NodeData::Text {
                contents: RefCell::new(StrTendril::from(format!("t{}", tail))),
            });
            inject.parent.set(Some(Rc::downgrade(parent)));
            parent.children.borrow_mut().insert(at + 1, inject);
        }
    }

    /// Returns whether the walk should advance past this slot (false when
    /// the node was removed).
    fn restore_comment(
        &mut self,
        parent: &Handle,
        contents: &StrTendril,
        at: usize,
    ) -> Result<bool, ParseError> {
        let data = contents.to_string();

        match data.as_bytes().first() {
            Some(b'c') => {
                let Some(swap) = self.swap_by_key.get(&data[1..]).cloned() else {
                    log::warn!("comment stand-in {:?} has no swap entry", &data[1..]);
                    return Ok(true);
                };

                let restored = Node::new(NodeData::Comment {
                    contents: StrTendril::from(swap.original),
                });
                self.replace_child(parent, at, &restored);
                self.metadata
                    .insert(&restored, NodeMetadata::for_token(swap.offsets));

                Ok(true)
            }

            Some(b't') => {
                // A whitespace-only run that crossed the parser disguised as
                // a comment; it becomes a text node again.
                let Some(swap) = self.swap_by_key.get(&data[1..]).cloned() else {
                    log::warn!("text stand-in {:?} has no swap entry", &data[1..]);
                    return Ok(true);
                };

                if swap.original.is_empty() {
                    // A lone newline after <pre> or <textarea>; a direct
                    // parse has no node here at all.
                    parent.children.borrow_mut().remove(at);
                    return Ok(false);
                }

                let restored = Node::new(NodeData::Text {
                    contents: RefCell::new(StrTendril::from(swap.original)),
                });
                self.replace_child(parent, at, &restored);
                self.metadata
                    .insert(&restored, NodeMetadata::for_token(swap.offsets));

                Ok(true)
            }

            _ => {
                /*
                 * An end-tag marker: its data is the serialized range of the
                 * end tag that the preceding sibling was closed by. A failed
                 * parse here is a shim bug, not bad input.
                 */
                let offsets: TextOffsetRange = data
                    .parse()
                    .map_err(|_| ParseError::CorruptEndTagMarker(data.clone()))?;

                if at > 0 {
                    let previous = parent.children.borrow()[at - 1].clone();

                    /*
                     * No metadata means the parser restarted or reparented
                     * the element that owned this end tag; rather than
                     * fabricate token offsets, drop the marker.
                     */
                    self.metadata.set_end_tag(&previous, offsets);
                }

                parent.children.borrow_mut().remove(at);
                Ok(false)
            }
        }
    }

    fn replace_child(&mut self, parent: &Handle, at: usize, replacement: &Handle) {
        replacement.parent.set(Some(Rc::downgrade(parent)));
        parent.children.borrow_mut()[at] = replacement.clone();
    }
}

fn complete_post_order(metadata: &ParseMetadata, node: &Handle) {
    let children: Vec<Handle> = node.children.borrow().iter().cloned().collect();
    for child in &children {
        complete_post_order(metadata, child);
    }

    if let NodeData::Element {
        template_contents, ..
    } = &node.data
    {
        let contents = template_contents.borrow().clone();
        if let Some(contents) = contents {
            complete_post_order(metadata, &contents);
        }
    }

    metadata.complete_end_tag(node);
}

fn complete_pre_order(metadata: &ParseMetadata, node: &Handle) {
    metadata.complete_end_tag(node);

    let children: Vec<Handle> = node.children.borrow().iter().cloned().collect();
    for child in &children {
        complete_pre_order(metadata, child);
    }

    if let NodeData::Element {
        template_contents, ..
    } = &node.data
    {
        let contents = template_contents.borrow().clone();
        if let Some(contents) = contents {
            complete_pre_order(metadata, &contents);
        }
    }
}
