//! HTML front end
//!
//! Parsing goes through tree-sitter with the HTML grammar. The grammar treats
//! whitespace between tags as extras, so text is not read from its `text`
//! nodes: everything between two structural children of an element is taken
//! from the source as one text node. That keeps the authored whitespace and
//! lets a parsed document serialize back to the same markup.
//!
//! # Example
//!
//! ```ignore
//! let doc = html::parse_document("<p>a &amp; b</p>")?;
//! assert_eq!(html::to_html(&doc), "<p>a &amp; b</p>");
//! ```

use crate::dom::{Document, NodeData, NodeId, NodeKind};
use crate::error::{LangConvError, LangConvResult};
use regex::Regex;
use std::sync::LazyLock;
use tree_sitter::{Node, Parser as TSParser};
use tracing::warn;

/// Attribute carrying the serialized [`NodeData`]
pub const METADATA_ATTRIBUTE: &str = "data-mw-langconv";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z][A-Za-z0-9]*);").unwrap());

/// Decode character references. Unknown named entities are left as written.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    _ => None,
                }
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

/// Parse HTML markup into a [`Document`]
pub fn parse_document(source: &str) -> LangConvResult<Document> {
    let mut ts_parser = TSParser::new();
    ts_parser
        .set_language(&tree_sitter_html::LANGUAGE.into())
        .map_err(|e| LangConvError::Markup(format!("Error loading HTML grammar: {}", e)))?;
    let tree = ts_parser
        .parse(source, None)
        .ok_or_else(|| LangConvError::Markup("Failed to parse HTML".to_string()))?;

    let mut builder = TreeBuilder {
        source,
        doc: Document::new(),
    };
    let root = builder.doc.root();
    builder.walk_children(tree.root_node(), root, 0, source.len());
    Ok(builder.doc)
}

struct TreeBuilder<'a> {
    source: &'a str,
    doc: Document,
}

impl TreeBuilder<'_> {
    fn node_text(&self, node: Node) -> &str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    /// Add the content of `node` between `start` and `end` to `parent`
    fn walk_children(&mut self, node: Node, parent: NodeId, start: usize, end: usize) {
        let mut pos = start;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.start_byte() < pos || child.end_byte() > end {
                continue;
            }
            match child.kind() {
                "element" | "script_element" | "style_element" | "comment" | "doctype" => {
                    self.push_text(parent, pos, child.start_byte());
                    self.process_node(child, parent);
                    pos = child.end_byte();
                }
                "erroneous_end_tag" => {
                    self.push_text(parent, pos, child.start_byte());
                    pos = child.end_byte();
                }
                "ERROR" => {
                    self.push_text(parent, pos, child.start_byte());
                    self.walk_children(child, parent, child.start_byte(), child.end_byte());
                    pos = child.end_byte();
                }
                // text and entities are picked up from the gaps
                _ => {}
            }
        }
        self.push_text(parent, pos, end);
    }

    fn push_text(&mut self, parent: NodeId, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let raw = &self.source[start..end];
        let text = self.doc.create_text(&decode_entities(raw));
        self.doc.append_child(parent, text);
    }

    fn process_node(&mut self, node: Node, parent: NodeId) {
        match node.kind() {
            "comment" => {
                let text = self.node_text(node);
                let inner = text
                    .strip_prefix("<!--")
                    .map(|t| t.strip_suffix("-->").unwrap_or(t))
                    .unwrap_or(text)
                    .to_string();
                let comment = self.doc.create_comment(&inner);
                self.doc.append_child(parent, comment);
            }
            "doctype" => {
                let text = self.node_text(node).to_string();
                let doctype = self.doc.create_doctype(&text);
                self.doc.append_child(parent, doctype);
            }
            _ => self.process_element(node, parent),
        }
    }

    fn process_element(&mut self, node: Node, parent: NodeId) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        let Some(tag) = children
            .iter()
            .find(|c| c.kind() == "start_tag" || c.kind() == "self_closing_tag")
        else {
            // Nothing to hang the content on; keep it in the parent
            self.walk_children(node, parent, node.start_byte(), node.end_byte());
            return;
        };

        let name = self.tag_name(*tag);
        let element = self.doc.create_element(&name);
        self.doc.append_child(parent, element);
        self.read_attributes(*tag, element);
        if tag.kind() == "self_closing_tag" {
            return;
        }

        let content_start = tag.end_byte();
        let content_end = children
            .iter()
            .find(|c| c.kind() == "end_tag")
            .map(|c| c.start_byte())
            .unwrap_or(node.end_byte());

        if node.kind() == "script_element" || node.kind() == "style_element" {
            if content_start < content_end {
                let raw = self.source[content_start..content_end].to_string();
                let text = self.doc.create_text(&raw);
                self.doc.append_child(element, text);
            }
            return;
        }
        self.walk_children(node, element, content_start, content_end);
    }

    fn tag_name(&self, tag: Node) -> String {
        let mut cursor = tag.walk();
        let name = tag
            .children(&mut cursor)
            .find(|c| c.kind() == "tag_name")
            .map(|n| self.node_text(n).to_string())
            .unwrap_or_default();
        name
    }

    fn read_attributes(&mut self, tag: Node, element: NodeId) {
        let mut cursor = tag.walk();
        let attributes: Vec<Node> = tag
            .children(&mut cursor)
            .filter(|c| c.kind() == "attribute")
            .collect();
        for attribute in attributes {
            let (name, value) = self.attribute(attribute);
            if name.is_empty() {
                continue;
            }
            if name.eq_ignore_ascii_case(METADATA_ATTRIBUTE) {
                match serde_json::from_str::<NodeData>(&value) {
                    Ok(data) => *self.doc.data_mut(element) = data,
                    Err(e) => warn!("Ignoring malformed {}: {}", METADATA_ATTRIBUTE, e),
                }
                continue;
            }
            if let Some(e) = self.doc.element_mut(element) {
                e.attrs.push((name, value));
            }
        }
    }

    fn attribute(&self, attribute: Node) -> (String, String) {
        let mut name = String::new();
        let mut value = String::new();
        let mut cursor = attribute.walk();
        for part in attribute.children(&mut cursor) {
            match part.kind() {
                "attribute_name" => name = self.node_text(part).to_ascii_lowercase(),
                "attribute_value" => value = decode_entities(self.node_text(part)),
                "quoted_attribute_value" => {
                    let quoted = self.node_text(part);
                    let inner = quoted
                        .get(1..quoted.len().saturating_sub(1))
                        .unwrap_or("");
                    value = decode_entities(inner);
                }
                _ => {}
            }
        }
        (name, value)
    }
}

/// Writes a [`Document`] back to markup
#[derive(Debug, Clone)]
pub struct HtmlSerializer {
    wrappers: bool,
    metadata: bool,
}

impl Default for HtmlSerializer {
    fn default() -> Self {
        HtmlSerializer::new()
    }
}

impl HtmlSerializer {
    pub fn new() -> Self {
        HtmlSerializer {
            wrappers: true,
            metadata: true,
        }
    }

    /// Keep synthetic round-trip wrappers; when off only their content is written
    pub fn with_wrappers(&mut self, wrappers: bool) -> &mut Self {
        self.wrappers = wrappers;
        self
    }

    /// Write node metadata as `data-mw-langconv`
    pub fn with_metadata(&mut self, metadata: bool) -> &mut Self {
        self.metadata = metadata;
        self
    }

    pub fn serialize(&self, doc: &Document) -> String {
        self.serialize_node(doc, doc.root())
    }

    /// Markup for `node` and its subtree
    pub fn serialize_node(&self, doc: &Document, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(doc, node, false, &mut out);
        out
    }

    fn write_children(&self, doc: &Document, node: NodeId, raw: bool, out: &mut String) {
        for &child in doc.children(node) {
            self.write_node(doc, child, raw, out);
        }
    }

    fn write_node(&self, doc: &Document, node: NodeId, raw: bool, out: &mut String) {
        match doc.kind(node) {
            NodeKind::Document => self.write_children(doc, node, false, out),
            NodeKind::Doctype(text) => out.push_str(text),
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Text(text) if raw => out.push_str(text),
            NodeKind::Text(text) => escape_text(text, out),
            NodeKind::Element(element) => {
                if !self.wrappers && doc.is_new(node) {
                    self.write_children(doc, node, false, out);
                    return;
                }
                out.push('<');
                out.push_str(&element.tag);
                for (name, value) in &element.attrs {
                    out.push(' ');
                    out.push_str(name);
                    if !value.is_empty() {
                        out.push_str("=\"");
                        escape_attr(value, out);
                        out.push('"');
                    }
                }
                let data = doc.data(node);
                if self.metadata && !data.is_new && !data.is_empty() {
                    if let Ok(json) = serde_json::to_string(data) {
                        out.push(' ');
                        out.push_str(METADATA_ATTRIBUTE);
                        out.push_str("=\"");
                        escape_attr(&json, out);
                        out.push('"');
                    }
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&element.tag.as_str()) {
                    return;
                }
                let raw = RAW_TEXT_ELEMENTS.contains(&element.tag.as_str());
                self.write_children(doc, node, raw, out);
                out.push_str("</");
                out.push_str(&element.tag);
                out.push('>');
            }
        }
    }
}

/// Serialize with the default settings
pub fn to_html(doc: &Document) -> String {
    HtmlSerializer::new().serialize(doc)
}
