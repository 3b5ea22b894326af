//! Restoring the authored text of a converted subtree
//!
//! Clean text is turned back by table lookup from the source variant each
//! element recorded; lossy text is taken from the round-trip wrappers.

use crate::dom::{Document, NodeId};
use crate::error::LangConvResult;
use crate::machine::ReplacementMachine;
use crate::traverser::{VariantPayload, is_wrapper};
use tracing::debug;

/// Undo the conversion of the subtree under `root`.
///
/// Returns the number of text nodes and wrappers that were restored. Wrappers
/// the converter did not insert are left alone. Nothing is modified when a
/// recorded source variant has no table.
pub fn restore_source(
    doc: &mut Document,
    root: NodeId,
    machine: &ReplacementMachine,
) -> LangConvResult<usize> {
    let mut texts = Vec::new();
    let mut wrappers = Vec::new();
    for node in doc.descendants(root) {
        if is_wrapper(doc, node) {
            if let Some(original) = VariantPayload::from_element(doc, node)
                .filter(|p| p.rt)
                .and_then(|p| p.original().map(str::to_string))
            {
                wrappers.push((node, original));
            }
            continue;
        }
        let Some(source) = doc.data(node).source_variant.as_ref() else {
            continue;
        };
        for &child in doc.children(node) {
            if let Some(text) = doc.text(child) {
                texts.push((child, machine.unconvert(text, source)?));
            }
        }
    }

    let restored = texts.len() + wrappers.len();
    for (node, text) in texts {
        doc.set_text(node, &text);
    }
    for (wrapper, original) in wrappers {
        let text = doc.create_text(&original);
        doc.replace_with(wrapper, &[text]);
    }
    for node in doc.descendants(root) {
        let data = doc.data_mut(node);
        data.source_variant = None;
        data.converted_to = None;
    }
    doc.normalize(root);
    debug!("Restored {} nodes", restored);
    Ok(restored)
}
