//! A small mutable document tree
//!
//! Nodes live in an arena owned by [`Document`] and are addressed by
//! [`NodeId`]. Detached nodes stay in the arena; they are simply no longer
//! reachable from the root. Every node carries a [`NodeData`] slot where the
//! converter records round-trip metadata.

use crate::error::{LangConvError, LangConvResult};
use crate::variant::VariantCode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self
            .attrs
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value.to_string(),
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let idx = self
            .attrs
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.attrs.remove(idx).1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Doctype(String),
    Element(Element),
    Text(String),
    Comment(String),
}

/// Per-node metadata slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeData {
    /// Inserted by the converter rather than authored
    #[serde(skip)]
    pub is_new: bool,
    /// Variant the text directly inside this element was converted from
    #[serde(default, rename = "src", skip_serializing_if = "Option::is_none")]
    pub source_variant: Option<VariantCode>,
    /// Variant this subtree was converted to (set on the traversal root)
    #[serde(default, rename = "target", skip_serializing_if = "Option::is_none")]
    pub converted_to: Option<VariantCode>,
}

impl NodeData {
    /// True when there is nothing worth persisting
    pub fn is_empty(&self) -> bool {
        self.source_variant.is_none() && self.converted_to.is_none()
    }
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Document {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
                data: NodeData::default(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The `<body>` element, or the root for fragments without one
    pub fn body(&self) -> NodeId {
        self.descendants(self.root())
            .into_iter()
            .find(|&id| self.tag(id) == Some("body"))
            .unwrap_or_else(|| self.root())
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
            data: NodeData::default(),
        });
        id
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element(Element::new(tag)))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Comment(text.to_string()))
    }

    pub fn create_doctype(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Doctype(text.to_string()))
    }

    /// Detach `node` from its parent, if it has one
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != node);
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Insert `child` before `reference`; appends when `reference` is not a child of `parent`
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        let children = &mut self.nodes[parent.0].children;
        match children.iter().position(|&c| c == reference) {
            Some(idx) => children.insert(idx, child),
            None => children.push(child),
        }
    }

    /// Put `replacements` where `node` was, in order, and detach `node`
    pub fn replace_with(&mut self, node: NodeId, replacements: &[NodeId]) {
        let Some(parent) = self.nodes[node.0].parent else {
            return;
        };
        for &replacement in replacements {
            self.insert_before(parent, replacement, node);
        }
        self.detach(node);
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    /// Elements and the document node can hold children
    pub fn is_container(&self, id: NodeId) -> bool {
        matches!(
            self.nodes[id.0].kind,
            NodeKind::Element(_) | NodeKind::Document
        )
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attr(name))
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(element) = self.element_mut(id) {
            element.set_attr(name, value);
        }
    }

    /// Content of a text node
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Replace the content of a text node; other nodes are left alone
    pub fn set_text(&mut self, id: NodeId, value: &str) {
        if let NodeKind::Text(text) = &mut self.nodes[id.0].kind {
            *text = value.to_string();
        }
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    pub fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0].data
    }

    pub fn is_new(&self, id: NodeId) -> bool {
        self.nodes[id.0].data.is_new
    }

    pub fn set_is_new(&mut self, id: NodeId, is_new: bool) {
        self.nodes[id.0].data.is_new = is_new;
    }

    /// `id` and everything below it, in document order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            result.push(node);
            stack.extend(self.nodes[node.0].children.iter().rev());
        }
        result
    }

    /// Elements below `id` (not `id` itself) matching `selector`, in document order
    pub fn query_selector_all(&self, id: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .skip(1)
            .filter(|&n| self.element(n).is_some_and(|e| selector.matches(e)))
            .collect()
    }

    pub fn query_selector(&self, id: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .skip(1)
            .find(|&n| self.element(n).is_some_and(|e| selector.matches(e)))
    }

    /// Merge adjacent text nodes and drop empty ones below `id`
    pub fn normalize(&mut self, id: NodeId) {
        for node in self.descendants(id) {
            if !self.is_container(node) {
                continue;
            }
            let children = self.nodes[node.0].children.clone();
            let mut previous_text: Option<NodeId> = None;
            for child in children {
                let Some(text) = self.text(child).map(str::to_string) else {
                    previous_text = None;
                    continue;
                };
                match previous_text {
                    _ if text.is_empty() => self.detach(child),
                    Some(previous) => {
                        if let NodeKind::Text(existing) = &mut self.nodes[previous.0].kind {
                            existing.push_str(&text);
                        }
                        self.detach(child);
                    }
                    None => previous_text = Some(child),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    /// `~=`: one of the whitespace-separated words
    Includes(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrMatcher {
    name: String,
    op: AttrOp,
}

/// A compound selector: optional tag name followed by attribute tests,
/// e.g. `span[typeof="mw:LanguageVariant"][data-mw-variant]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    tag: Option<String>,
    attrs: Vec<AttrMatcher>,
}

static COMPOUND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z0-9-]*|\*)?((?:\[[^\]]*\])*)\s*$").unwrap()
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\[\s*([A-Za-z_:][-A-Za-z0-9_:.]*)\s*(?:(~?=)\s*(?:"([^"]*)"|'([^']*)'|([^\s"'\]]+)))?\s*\]"#,
    )
    .unwrap()
});

impl Selector {
    pub fn parse(selector: &str) -> LangConvResult<Self> {
        let invalid = || LangConvError::Selector(selector.to_string());
        let caps = COMPOUND_RE.captures(selector).ok_or_else(invalid)?;
        let tag = caps
            .get(1)
            .map(|m| m.as_str().to_ascii_lowercase())
            .filter(|t| t != "*");
        let attr_text = caps.get(2).map(|m| m.as_str()).unwrap_or("");

        let mut attrs = Vec::new();
        let mut consumed = 0;
        for cap in ATTR_RE.captures_iter(attr_text) {
            let whole = cap.get(0).ok_or_else(invalid)?;
            if whole.start() != consumed {
                return Err(invalid());
            }
            consumed = whole.end();
            let name = cap[1].to_ascii_lowercase();
            let value = cap
                .get(3)
                .or_else(|| cap.get(4))
                .or_else(|| cap.get(5))
                .map(|m| m.as_str().to_string());
            let op = match (cap.get(2).map(|m| m.as_str()), value) {
                (None, _) => AttrOp::Exists,
                (Some("="), Some(v)) => AttrOp::Equals(v),
                (Some("~="), Some(v)) => AttrOp::Includes(v),
                _ => return Err(invalid()),
            };
            attrs.push(AttrMatcher { name, op });
        }
        if consumed != attr_text.len() || (tag.is_none() && attrs.is_empty() && caps.get(1).is_none()) {
            return Err(invalid());
        }
        Ok(Selector { tag, attrs })
    }

    pub fn matches(&self, element: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if element.tag != *tag {
                return false;
            }
        }
        self.attrs.iter().all(|m| match (element.attr(&m.name), &m.op) {
            (None, _) => false,
            (Some(_), AttrOp::Exists) => true,
            (Some(actual), AttrOp::Equals(expected)) => actual == expected,
            (Some(actual), AttrOp::Includes(word)) => actual.split_whitespace().any(|w| w == word),
        })
    }
}

impl FromStr for Selector {
    type Err = LangConvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}
