//! Conversion traverser
//!
//! Walks a subtree depth-first with an explicit stack, converts every text
//! leaf with the replacement machine and writes the result back. The walk is
//! split in two phases: planning only reads the tree and may fail, committing
//! only writes and cannot. A failed traversal leaves the tree as it was.
//!
//! Lossy segments are wrapped so the original text travels with the output:
//!
//! ```text
//! <span typeof="mw:LanguageVariant"
//!       data-mw-variant='{"twoway":[{"l":"zh-hant","t":"髮"},{"l":"zh-hans","t":"发"}],"rt":true}'>发</span>
//! ```

use crate::dom::{Document, NodeId};
use crate::error::LangConvResult;
use crate::guesser::{GuessResult, LanguageGuesser};
use crate::machine::{Conversion, ReplacementMachine, SegmentKind};
use crate::variant::VariantCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

pub const WRAPPER_TYPEOF: &str = "mw:LanguageVariant";
pub const VARIANT_ATTRIBUTE: &str = "data-mw-variant";
pub const NOCONVERT_ATTRIBUTE: &str = "data-noconvert";

/// Elements whose content is never converted
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "code", "pre"];

/// How an element opts out of conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptOut {
    None,
    /// The element's own text stays; child elements are still converted
    Local,
    /// Nothing below the element is converted
    Sticky,
}

pub fn opt_out(doc: &Document, node: NodeId) -> OptOut {
    let Some(element) = doc.element(node) else {
        return OptOut::None;
    };
    if SKIPPED_ELEMENTS.contains(&element.tag.as_str()) || is_wrapper(doc, node) {
        return OptOut::Sticky;
    }
    match element.attr(NOCONVERT_ATTRIBUTE) {
        Some("inherit") => OptOut::Sticky,
        Some(_) => OptOut::Local,
        None => OptOut::None,
    }
}

/// Any `mw:LanguageVariant` element, authored or synthetic
pub fn is_wrapper(doc: &Document, node: NodeId) -> bool {
    doc.attr(node, "typeof")
        .is_some_and(|t| t.split_whitespace().any(|w| w == WRAPPER_TYPEOF))
}

/// One side of a two-way variant pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantText {
    #[serde(rename = "l")]
    pub variant: String,
    #[serde(rename = "t")]
    pub text: String,
}

/// Payload of the `data-mw-variant` attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantPayload {
    #[serde(default)]
    pub twoway: Vec<VariantText>,
    /// Inserted by the converter for round-tripping
    #[serde(default)]
    pub rt: bool,
}

impl VariantPayload {
    pub fn round_trip(source: &VariantCode, original: &str, target: &VariantCode, converted: &str) -> Self {
        VariantPayload {
            twoway: vec![
                VariantText {
                    variant: source.mw_code().to_string(),
                    text: original.to_string(),
                },
                VariantText {
                    variant: target.mw_code().to_string(),
                    text: converted.to_string(),
                },
            ],
            rt: true,
        }
    }

    /// The text as authored
    pub fn original(&self) -> Option<&str> {
        self.twoway.first().map(|v| v.text.as_str())
    }

    /// Read the payload of a wrapper element; `None` when absent or malformed
    pub fn from_element(doc: &Document, node: NodeId) -> Option<Self> {
        doc.attr(node, VARIANT_ATTRIBUTE)
            .and_then(|json| serde_json::from_str(json).ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    Idle,
    Descending(NodeId),
    ConvertingLeaf(NodeId),
    Ascending(NodeId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalReport {
    /// Text leaves converted
    pub converted: usize,
    /// Round-trip wrappers inserted
    pub wrappers: usize,
    /// Subtrees skipped as opted out
    pub skipped: usize,
    /// Elements whose source variant was guessed
    pub guessed: usize,
    /// The root was already converted to the target
    pub already_converted: bool,
}

enum Step {
    Enter(NodeId),
    Leave(NodeId),
}

struct LeafPlan {
    leaf: NodeId,
    parent: NodeId,
    source: VariantCode,
    conversion: Conversion,
}

pub struct ConversionTraverser<'a> {
    machine: &'a ReplacementMachine,
    guesser: &'a dyn LanguageGuesser,
    target: VariantCode,
    state: TraversalState,
    guesses: HashMap<NodeId, GuessResult>,
}

impl<'a> ConversionTraverser<'a> {
    pub fn new(
        machine: &'a ReplacementMachine,
        guesser: &'a dyn LanguageGuesser,
        target: VariantCode,
    ) -> Self {
        ConversionTraverser {
            machine,
            guesser,
            target,
            state: TraversalState::Idle,
            guesses: HashMap::new(),
        }
    }

    pub fn state(&self) -> TraversalState {
        self.state
    }

    pub fn target(&self) -> &VariantCode {
        &self.target
    }

    /// Convert the subtree under `root` to the target variant.
    ///
    /// # Errors
    /// `UnsupportedVariant` when a guessed source has no table; the tree is
    /// left untouched.
    pub fn traverse(&mut self, doc: &mut Document, root: NodeId) -> LangConvResult<TraversalReport> {
        let mut report = TraversalReport::default();
        if doc.data(root).converted_to.as_ref() == Some(&self.target) {
            debug!("Subtree already converted to {}", self.target);
            report.already_converted = true;
            return Ok(report);
        }

        let plans = match self.plan(doc, root, &mut report) {
            Ok(plans) => plans,
            Err(e) => {
                self.state = TraversalState::Idle;
                return Err(e);
            }
        };
        self.commit(doc, root, plans, &mut report);
        self.state = TraversalState::Idle;
        debug!(
            "Converted {} text nodes to {} ({} wrappers, {} skipped subtrees)",
            report.converted, self.target, report.wrappers, report.skipped
        );
        Ok(report)
    }

    fn plan(
        &mut self,
        doc: &Document,
        root: NodeId,
        report: &mut TraversalReport,
    ) -> LangConvResult<Vec<LeafPlan>> {
        let mut plans = Vec::new();
        let mut stack = vec![Step::Enter(root)];

        while let Some(step) = stack.pop() {
            let node = match step {
                Step::Leave(node) => {
                    self.state = TraversalState::Ascending(node);
                    continue;
                }
                Step::Enter(node) => node,
            };
            self.state = TraversalState::Descending(node);
            let policy = opt_out(doc, node);
            if policy == OptOut::Sticky {
                trace!("Skipping opted-out subtree at {:?}", node);
                report.skipped += 1;
                continue;
            }
            stack.push(Step::Leave(node));

            // Text directly inside an element that already records a source
            // was converted by an earlier pass
            let convert_text = policy == OptOut::None && doc.data(node).source_variant.is_none();
            for &child in doc.children(node) {
                let Some(text) = doc.text(child) else {
                    continue;
                };
                if !convert_text {
                    continue;
                }
                self.state = TraversalState::ConvertingLeaf(child);
                let source = self.source_for(doc, node, report);
                if source == self.target {
                    continue;
                }
                let conversion = self.machine.convert(text, &source, &self.target)?;
                trace!("Leaf {:?}: {} segments from {}", child, conversion.segments.len(), source);
                plans.push(LeafPlan {
                    leaf: child,
                    parent: node,
                    source,
                    conversion,
                });
            }
            for &child in doc.children(node).iter().rev() {
                if doc.is_container(child) {
                    stack.push(Step::Enter(child));
                }
            }
        }
        Ok(plans)
    }

    /// Guess for the element holding a leaf, at most once per element
    fn source_for(&mut self, doc: &Document, element: NodeId, report: &mut TraversalReport) -> VariantCode {
        let guesser = self.guesser;
        self.guesses
            .entry(element)
            .or_insert_with(|| {
                report.guessed += 1;
                guesser.guess_lang(doc, element)
            })
            .variant
            .clone()
    }

    fn commit(&self, doc: &mut Document, root: NodeId, plans: Vec<LeafPlan>, report: &mut TraversalReport) {
        for plan in plans {
            let segments = &plan.conversion.segments;
            match segments.as_slice() {
                [] => {}
                [only] if only.kind == SegmentKind::Clean => doc.set_text(plan.leaf, &only.converted),
                _ => {
                    let mut replacements = Vec::with_capacity(segments.len());
                    for segment in segments {
                        let node = match segment.kind {
                            SegmentKind::Clean => doc.create_text(&segment.converted),
                            SegmentKind::Lossy => {
                                report.wrappers += 1;
                                self.create_wrapper(doc, &plan.source, &segment.source, &segment.converted)
                            }
                        };
                        replacements.push(node);
                    }
                    doc.replace_with(plan.leaf, &replacements);
                }
            }
            doc.data_mut(plan.parent).source_variant = Some(plan.source);
            report.converted += 1;
        }
        doc.data_mut(root).converted_to = Some(self.target.clone());
    }

    fn create_wrapper(&self, doc: &mut Document, source: &VariantCode, original: &str, converted: &str) -> NodeId {
        let payload = VariantPayload::round_trip(source, original, &self.target, converted);
        let span = doc.create_element("span");
        doc.set_attr(span, "typeof", WRAPPER_TYPEOF);
        if let Ok(json) = serde_json::to_string(&payload) {
            doc.set_attr(span, VARIANT_ATTRIBUTE, &json);
        }
        doc.set_is_new(span, true);
        let text = doc.create_text(converted);
        doc.append_child(span, text);
        span
    }
}
