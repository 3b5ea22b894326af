//! Source variant guessing
//!
//! When the caller does not say which variant a page was written in, the
//! [`MachineGuesser`] asks the replacement machine how much of each element's
//! text would convert cleanly from every candidate variant, and picks the one
//! that explains the text best.

use crate::dom::{Document, NodeId};
use crate::language::Language;
use crate::machine::{BracketCount, ReplacementMachine};
use crate::traverser::{OptOut, opt_out};
use crate::variant::VariantCode;
use std::collections::HashMap;
use tracing::debug;

/// Minimum score (clean minus lossy characters) a candidate must beat
const SCORE_THRESHOLD: i64 = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct GuessResult {
    pub variant: VariantCode,
    /// Between 0 and 1
    pub confidence: f64,
}

impl GuessResult {
    pub fn new(variant: VariantCode, confidence: f64) -> Self {
        GuessResult {
            variant,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Decides which variant the text under a node was authored in.
///
/// Implementations never fail: a node they know nothing about gets a
/// fallback guess.
pub trait LanguageGuesser {
    fn guess_lang(&self, doc: &Document, node: NodeId) -> GuessResult;
}

/// Always answers with the variant the caller declared
#[derive(Debug, Clone)]
pub struct ConstantGuesser {
    variant: VariantCode,
}

impl ConstantGuesser {
    pub fn new(variant: VariantCode) -> Self {
        ConstantGuesser { variant }
    }
}

impl LanguageGuesser for ConstantGuesser {
    fn guess_lang(&self, _doc: &Document, _node: NodeId) -> GuessResult {
        GuessResult::new(self.variant.clone(), 1.0)
    }
}

/// Heuristic guesser backed by the replacement machine.
///
/// All guesses for a subtree are computed up front: bracket counts are summed
/// bottom-up once per element, then each element takes the best candidate for
/// its own subtree. Elements where no candidate scores above the threshold
/// inherit the guess of their nearest ancestor that had one, and otherwise the
/// language's first declared variant. That default may be the target itself,
/// in which case the traverser leaves the text alone.
#[derive(Debug, Clone)]
pub struct MachineGuesser {
    guesses: HashMap<NodeId, GuessResult>,
    fallback: GuessResult,
}

impl MachineGuesser {
    pub fn new(language: &Language, doc: &Document, root: NodeId, target: &VariantCode) -> Self {
        let candidates = match language.machine() {
            Some(machine) => ranked_candidates(language, machine, target),
            None => Vec::new(),
        };
        let fallback = GuessResult::new(fallback_variant(language, target), 0.0);

        let mut guesser = MachineGuesser {
            guesses: HashMap::new(),
            fallback,
        };
        if let (Some(machine), false) = (language.machine(), candidates.is_empty()) {
            let counts = count_subtree(machine, doc, root, &candidates, target);
            guesser.assign(doc, root, &candidates, &counts);
        }
        debug!(
            "Guessed source variants for {} elements of {} (fallback {})",
            guesser.guesses.len(),
            language.code(),
            guesser.fallback.variant
        );
        guesser
    }

    /// Walk top-down so every element can see its parent's guess
    fn assign(
        &mut self,
        doc: &Document,
        root: NodeId,
        candidates: &[VariantCode],
        counts: &HashMap<NodeId, Vec<BracketCount>>,
    ) {
        for node in doc.descendants(root) {
            let Some(node_counts) = counts.get(&node) else {
                continue;
            };
            let guess = best_candidate(candidates, node_counts).unwrap_or_else(|| {
                doc.parent(node)
                    .filter(|_| node != root)
                    .and_then(|p| self.guesses.get(&p))
                    .cloned()
                    .unwrap_or_else(|| self.fallback.clone())
            });
            self.guesses.insert(node, guess);
        }
    }

    /// The guess used where nothing better is known
    pub fn fallback(&self) -> &GuessResult {
        &self.fallback
    }
}

impl LanguageGuesser for MachineGuesser {
    fn guess_lang(&self, doc: &Document, node: NodeId) -> GuessResult {
        let mut current = Some(node);
        while let Some(id) = current {
            if let Some(guess) = self.guesses.get(&id) {
                return guess.clone();
            }
            current = doc.parent(id);
        }
        self.fallback.clone()
    }
}

/// Implemented variants other than the target, best tie-break first.
///
/// The base variant only counts when it has entries of its own. Ties go to
/// the earlier entry in the target's fallbacks, then to declaration order.
fn ranked_candidates(
    language: &Language,
    machine: &ReplacementMachine,
    target: &VariantCode,
) -> Vec<VariantCode> {
    let fallbacks = language.fallbacks_for(target);
    let declared = language.variants();
    let rank = |code: &VariantCode, list: &[VariantCode]| {
        list.iter().position(|c| c == code).unwrap_or(usize::MAX)
    };

    let mut candidates: Vec<(usize, VariantCode)> = machine
        .codes()
        .iter()
        .enumerate()
        .filter(|(_, code)| *code != target)
        .filter(|(_, code)| {
            let empty_base = language.base() == Some(*code)
                && machine.table(code).is_some_and(|t| t.is_empty());
            !empty_base
        })
        .map(|(i, code)| (i, code.clone()))
        .collect();
    candidates.sort_by_key(|(i, code)| (rank(code, fallbacks), rank(code, declared), *i));
    candidates.into_iter().map(|(_, code)| code).collect()
}

/// First declared variant, else the first implemented one, else the target
fn fallback_variant(language: &Language, target: &VariantCode) -> VariantCode {
    language
        .variants()
        .first()
        .or_else(|| language.machine().and_then(|m| m.codes().first()))
        .unwrap_or(target)
        .clone()
}

/// Per-element bracket counts for every candidate, summed bottom-up.
///
/// Sticky opt-outs contribute nothing; local opt-outs contribute only their
/// child elements.
fn count_subtree(
    machine: &ReplacementMachine,
    doc: &Document,
    root: NodeId,
    candidates: &[VariantCode],
    target: &VariantCode,
) -> HashMap<NodeId, Vec<BracketCount>> {
    let mut counts: HashMap<NodeId, Vec<BracketCount>> = HashMap::new();
    // Reversed pre-order visits children before their parents
    for node in doc.descendants(root).into_iter().rev() {
        if !doc.is_container(node) {
            continue;
        }
        let policy = opt_out(doc, node);
        if policy == OptOut::Sticky {
            continue;
        }
        let mut totals = vec![BracketCount::default(); candidates.len()];
        for &child in doc.children(node) {
            if let Some(text) = doc.text(child) {
                if policy == OptOut::Local {
                    continue;
                }
                for (total, candidate) in totals.iter_mut().zip(candidates) {
                    *total += machine
                        .count_brackets(text, candidate, target)
                        .unwrap_or_default();
                }
            } else if let Some(child_counts) = counts.get(&child) {
                for (total, count) in totals.iter_mut().zip(child_counts) {
                    *total += *count;
                }
            }
        }
        counts.insert(node, totals);
    }
    counts
}

/// Highest score above the threshold; earlier candidates win ties
fn best_candidate(candidates: &[VariantCode], counts: &[BracketCount]) -> Option<GuessResult> {
    let mut best: Option<(usize, i64)> = None;
    for (i, count) in counts.iter().enumerate() {
        let score = count.score();
        if score > SCORE_THRESHOLD && best.is_none_or(|(_, s)| score > s) {
            best = Some((i, score));
        }
    }
    best.map(|(i, score)| {
        let length = counts[i].length.max(1) as f64;
        GuessResult::new(candidates[i].clone(), score as f64 / length)
    })
}
