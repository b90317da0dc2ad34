//! Reads an HTML document on stdin and prints the parsed tree with the
//! source offsets recorded for each node.
//!
//!     cargo run --example parse_dump < page.html

use markup5ever_rcdom::{Handle, NodeData};

use inspecthtml::ParseMetadata;

fn main() -> Result<(), inspecthtml::ParseError> {
    let (dom, metadata) = inspecthtml::parse(std::io::stdin().lock())?;

    dump_node(&metadata, &dom.document, "");

    Ok(())
}

fn dump_node(metadata: &ParseMetadata, node: &Handle, indent: &str) {
    let node_metadata = metadata.node_metadata(node);

    match &node.data {
        NodeData::Comment { contents } => {
            if let Some(m) = &node_metadata {
                println!("{indent}// CommentToken={}", m.token_offsets);
            }

            println!("{indent}<!--{contents}-->");
        }
        NodeData::Text { contents } => {
            if let Some(m) = &node_metadata {
                println!("{indent}// TextToken={}", m.token_offsets);
            }

            println!("{indent}{}", contents.borrow());
        }
        NodeData::Doctype { name, .. } => {
            if let Some(m) = &node_metadata {
                println!("{indent}// DoctypeToken={}", m.token_offsets);
            }

            println!("{indent}<!DOCTYPE {name}>");
        }
        NodeData::Element { name, attrs, .. } => {
            if let Some(m) = &node_metadata {
                print!(
                    "{indent}// StartTagToken={} OuterOffsets={}",
                    m.token_offsets,
                    m.outer_offsets()
                );

                if let Some(inner) = m.inner_offsets() {
                    print!(" InnerOffsets={inner}");
                }

                if m.tag_self_closing {
                    print!(" SelfClosing");
                }

                println!();
            }

            print!("{indent}<{}", name.local);

            let attrs = attrs.borrow();
            if !attrs.is_empty() {
                for (attr_idx, attr) in attrs.iter().enumerate() {
                    print!("\n{indent}  // Attr");

                    if let Some(m) = &node_metadata {
                        if let Some(Some(attr_metadata)) = m.tag_attr.get(attr_idx) {
                            print!(" KeyOffsets={}", attr_metadata.key_offsets);

                            if let Some(value_offsets) = attr_metadata.value_offsets {
                                print!(" ValueOffsets={value_offsets}");
                            }
                        }
                    }

                    print!("\n{indent}  {}={:?}", attr.name.local, &*attr.value);
                }

                print!("\n{indent}");
            }

            println!(">");
        }
        _ => {}
    }

    let child_indent = format!("{indent}  ");
    for child in node.children.borrow().iter() {
        dump_node(metadata, child, &child_indent);
    }

    if let NodeData::Element { name, .. } = &node.data {
        if let Some(m) = &node_metadata {
            if let Some(end_tag) = m.end_tag_token_offsets {
                println!("{indent}// EndTagToken={end_tag}");
            }
        }

        println!("{indent}</{}>", name.local);
    }
}
