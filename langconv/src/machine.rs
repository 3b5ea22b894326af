//! Replacement machine: table-driven conversion with round-trip bracketing
//!
//! The machine owns one [`ReplacementTable`] per implemented variant. Converting
//! from `source` to `target` applies the target's table; the source's table is
//! the reverse direction, used to decide which parts of the output can be
//! turned back into the original by lookup alone.
//!
//! # Bracketing
//!
//! The input is cut into units: the longest table entry at each position, or a
//! single unmatched character. A unit is *clean* when converting its output
//! back with the source table gives the unit's text again, and *lossy*
//! otherwise (the entry is flagged irreversible, the reverse mapping picks a
//! different candidate, or the reverse table rewrites text the forward table
//! left alone). Runs of clean units are verified once more as a whole, since
//! reverse lookups can match across unit boundaries:
//!
//! ```text
//! sr-ec "конјункција" -> sr-el "konjunkcija"
//! units:    к о н ј у н к ц и ј а      all clean on their own
//! reverse:  "konjunkcija" -> "коњункција"   (nj -> њ) so the run is split
//! segments: clean "kon" | lossy "j" | clean "unkcija"
//! ```

use crate::error::{LangConvError, LangConvResult};
use crate::table::ReplacementTable;
use crate::variant::VariantCode;
use std::collections::HashMap;
use std::ops::{Add, AddAssign, Range};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Reversible by table lookup alone
    Clean,
    /// The original text has to travel with the output
    Lossy,
}

/// A span of the input and its conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    /// Byte offsets into the input text
    pub range: Range<usize>,
    pub source: String,
    pub converted: String,
}

impl Segment {
    pub fn is_lossy(&self) -> bool {
        self.kind == SegmentKind::Lossy
    }
}

/// Result of converting one string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversion {
    pub segments: Vec<Segment>,
}

impl Conversion {
    /// The converted text
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.converted.as_str()).collect()
    }

    /// The input text, rebuilt from the segments
    pub fn source_text(&self) -> String {
        self.segments.iter().map(|s| s.source.as_str()).collect()
    }

    pub fn has_lossy(&self) -> bool {
        self.segments.iter().any(Segment::is_lossy)
    }

    pub fn lossy_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| s.is_lossy())
    }
}

/// Character counts from bracketing a text, used to score source variants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BracketCount {
    /// Characters in clean segments
    pub clean: usize,
    /// Characters in lossy segments
    pub lossy: usize,
    /// Characters covered by a table entry
    pub matched: usize,
    pub length: usize,
}

impl BracketCount {
    /// Clean characters minus lossy ones
    pub fn score(&self) -> i64 {
        self.clean as i64 - self.lossy as i64
    }
}

impl Add for BracketCount {
    type Output = BracketCount;

    fn add(self, other: BracketCount) -> BracketCount {
        BracketCount {
            clean: self.clean + other.clean,
            lossy: self.lossy + other.lossy,
            matched: self.matched + other.matched,
            length: self.length + other.length,
        }
    }
}

impl AddAssign for BracketCount {
    fn add_assign(&mut self, other: BracketCount) {
        *self = *self + other;
    }
}

#[derive(Debug)]
struct Unit {
    range: Range<usize>,
    converted: String,
    matched: bool,
    clean: bool,
}

/// Conversion tables for one language family
#[derive(Debug, Clone)]
pub struct ReplacementMachine {
    language: String,
    tables: HashMap<VariantCode, ReplacementTable>,
    // Insertion order, so codes() is deterministic
    codes: Vec<VariantCode>,
}

impl ReplacementMachine {
    pub fn new(language: &str) -> Self {
        ReplacementMachine {
            language: language.to_string(),
            tables: HashMap::new(),
            codes: Vec::new(),
        }
    }

    /// Add a table, replacing any earlier table for the same variant
    pub fn with_table(&mut self, table: ReplacementTable) -> &mut Self {
        let code = table.variant().clone();
        if !self.tables.contains_key(&code) {
            self.codes.push(code.clone());
        }
        self.tables.insert(code, table);
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// The variants this machine can convert into and out of
    pub fn codes(&self) -> &[VariantCode] {
        &self.codes
    }

    pub fn implements(&self, code: &VariantCode) -> bool {
        self.tables.contains_key(code)
    }

    pub fn table(&self, code: &VariantCode) -> Option<&ReplacementTable> {
        self.tables.get(code)
    }

    /// Whether text authored in `source` can be converted to `target`
    pub fn is_valid_code_pair(&self, target: &VariantCode, source: &VariantCode) -> bool {
        self.implements(target) && self.implements(source)
    }

    fn tables_for(
        &self,
        source: &VariantCode,
        target: &VariantCode,
    ) -> LangConvResult<(&ReplacementTable, &ReplacementTable)> {
        match (self.tables.get(target), self.tables.get(source)) {
            (Some(forward), Some(reverse)) => Ok((forward, reverse)),
            _ => Err(LangConvError::UnsupportedVariant {
                from: source.clone(),
                to: target.clone(),
            }),
        }
    }

    /// Convert `text`, authored in `source`, into `target`.
    ///
    /// The segments cover the input exactly, in order, without overlap.
    pub fn convert(
        &self,
        text: &str,
        source: &VariantCode,
        target: &VariantCode,
    ) -> LangConvResult<Conversion> {
        let (forward, reverse) = self.tables_for(source, target)?;
        let units = split_units(text, forward, reverse);
        let segments = bracket(text, &units, reverse);
        trace!(
            "{}: {} -> {}: {} units, {} segments",
            self.language,
            source,
            target,
            units.len(),
            segments.len()
        );
        Ok(Conversion { segments })
    }

    /// Count how much of `text` would convert cleanly if it were authored in `source`
    pub fn count_brackets(
        &self,
        text: &str,
        source: &VariantCode,
        target: &VariantCode,
    ) -> LangConvResult<BracketCount> {
        let (forward, reverse) = self.tables_for(source, target)?;
        let units = split_units(text, forward, reverse);
        let mut count = BracketCount::default();
        for unit in units.iter().filter(|u| u.matched) {
            count.matched += text[unit.range.clone()].chars().count();
        }
        for segment in bracket(text, &units, reverse) {
            let chars = segment.source.chars().count();
            count.length += chars;
            match segment.kind {
                SegmentKind::Clean => count.clean += chars,
                SegmentKind::Lossy => count.lossy += chars,
            }
        }
        Ok(count)
    }

    /// Convert text back into `source` by table lookup. Exact for clean segments.
    pub fn unconvert(&self, text: &str, source: &VariantCode) -> LangConvResult<String> {
        let table = self
            .tables
            .get(source)
            .ok_or_else(|| LangConvError::UnsupportedVariant {
                from: source.clone(),
                to: source.clone(),
            })?;
        Ok(table.replace_all(text))
    }
}

fn split_units(text: &str, forward: &ReplacementTable, reverse: &ReplacementTable) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        let rest = &text[pos..];
        let (len, converted, matched, lossy) = match forward.longest_match(rest) {
            Some(r) => (r.from.len(), r.to.clone(), true, r.lossy),
            None => {
                let ch = rest.chars().next().unwrap_or_default();
                (ch.len_utf8(), ch.to_string(), false, false)
            }
        };
        let range = pos..pos + len;
        let clean = !lossy && reverse.replace_all(&converted) == text[range.clone()];
        units.push(Unit {
            range,
            converted,
            matched,
            clean,
        });
        pos += len;
    }
    units
}

fn bracket(text: &str, units: &[Unit], reverse: &ReplacementTable) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut i = 0;
    while i < units.len() {
        let clean = units[i].clean;
        let mut j = i;
        while j < units.len() && units[j].clean == clean {
            j += 1;
        }
        if clean {
            push_clean_run(text, &units[i..j], reverse, &mut segments);
        } else {
            push_segment(&mut segments, SegmentKind::Lossy, text, &units[i..j]);
        }
        i = j;
    }
    segments
}

/// Emit a run of individually clean units, splitting it where the reverse
/// conversion of the joined output stops reproducing the source.
fn push_clean_run(text: &str, run: &[Unit], reverse: &ReplacementTable, out: &mut Vec<Segment>) {
    if reverse.replace_all(&joined(run)) == text[span(run)] {
        push_segment(out, SegmentKind::Clean, text, run);
        return;
    }

    let mut scan = ReverseScan::new(reverse);
    let mut start = 0;
    for k in 0..run.len() {
        let source = &text[run[start].range.start..run[k].range.end];
        if scan.extend(&run[k].converted, source) {
            continue;
        }
        if k > start {
            push_segment(out, SegmentKind::Clean, text, &run[start..k]);
        }
        push_segment(out, SegmentKind::Lossy, text, &run[k..=k]);
        start = k + 1;
        scan.reset();
    }
    if start < run.len() {
        push_segment(out, SegmentKind::Clean, text, &run[start..]);
    }
}

/// Reverse conversion of a growing segment.
///
/// A reverse token never looks more than `max_key_len` bytes ahead, so
/// appending a unit only rescans the tokens that start within that distance
/// of the old end. Everything before them is known to reproduce the source.
struct ReverseScan<'a> {
    reverse: &'a ReplacementTable,
    converted: String,
    /// Start of each token in `converted` and in the source
    tokens: Vec<(usize, usize)>,
    /// Source bytes reproduced so far
    restored: usize,
}

impl<'a> ReverseScan<'a> {
    fn new(reverse: &'a ReplacementTable) -> Self {
        ReverseScan {
            reverse,
            converted: String::new(),
            tokens: Vec::new(),
            restored: 0,
        }
    }

    fn reset(&mut self) {
        self.converted.clear();
        self.tokens.clear();
        self.restored = 0;
    }

    /// Append the output of one unit. `source` is the source text of the whole
    /// segment, this unit included. False once the reverse no longer matches;
    /// the scan must be reset before it is used again.
    fn extend(&mut self, converted: &str, source: &str) -> bool {
        let scanned = self.converted.len();
        self.converted.push_str(converted);

        let max_key = self.reverse.max_key_len();
        let stable = self
            .tokens
            .partition_point(|&(at, _)| at + max_key <= scanned);
        let (mut pos, mut restored) = self
            .tokens
            .get(stable)
            .copied()
            .unwrap_or((scanned, self.restored));
        self.tokens.truncate(stable);

        while pos < self.converted.len() {
            let (len, to) = self.reverse.next_token(&self.converted[pos..]);
            if !source.get(restored..).is_some_and(|rest| rest.starts_with(to)) {
                return false;
            }
            self.tokens.push((pos, restored));
            pos += len;
            restored += to.len();
        }
        self.restored = restored;
        restored == source.len()
    }
}

fn joined(units: &[Unit]) -> String {
    units.iter().map(|u| u.converted.as_str()).collect()
}

fn span(units: &[Unit]) -> Range<usize> {
    match (units.first(), units.last()) {
        (Some(first), Some(last)) => first.range.start..last.range.end,
        _ => 0..0,
    }
}

/// Append a segment; consecutive lossy segments are merged.
/// Clean segments are never merged, each was verified on its own.
fn push_segment(out: &mut Vec<Segment>, kind: SegmentKind, text: &str, units: &[Unit]) {
    let range = span(units);
    let converted = joined(units);
    if kind == SegmentKind::Lossy {
        if let Some(last) = out.last_mut().filter(|s| s.is_lossy() && s.range.end == range.start) {
            last.range.end = range.end;
            last.source.push_str(&text[range]);
            last.converted.push_str(&converted);
            return;
        }
    }
    out.push(Segment {
        kind,
        source: text[range.clone()].to_string(),
        range,
        converted,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{code, sr_machine, zh_machine};
    use std::time::{Duration, Instant};

    fn assert_covers(conversion: &Conversion, input: &str) {
        assert_eq!(conversion.source_text(), input);
        let mut expected_start = 0;
        for segment in &conversion.segments {
            assert_eq!(segment.range.start, expected_start);
            assert_eq!(&input[segment.range.clone()], segment.source);
            expected_start = segment.range.end;
        }
        assert_eq!(expected_start, input.len());
    }

    #[test]
    fn test_clean_conversion() {
        let machine = zh_machine();
        let conversion = machine
            .convert("繁體", &code("zh-hant"), &code("zh-hans"))
            .unwrap();
        assert_eq!(conversion.text(), "繁体");
        assert!(!conversion.has_lossy());
        assert_covers(&conversion, "繁體");
    }

    #[test]
    fn test_ambiguous_reverse_is_lossy() {
        let machine = zh_machine();
        let conversion = machine
            .convert("頭髮", &code("zh-hant"), &code("zh-hans"))
            .unwrap();
        assert_eq!(conversion.text(), "头发");
        let lossy: Vec<_> = conversion.lossy_segments().collect();
        assert_eq!(lossy.len(), 1);
        assert_eq!(lossy[0].source, "髮");
        assert_eq!(lossy[0].converted, "发");
        assert_covers(&conversion, "頭髮");
    }

    #[test]
    fn test_phrase_entry_round_trips() {
        let machine = zh_machine();
        let conversion = machine
            .convert("头发", &code("zh-hans"), &code("zh-hant"))
            .unwrap();
        assert_eq!(conversion.text(), "頭髮");
        assert!(!conversion.has_lossy());
    }

    #[test]
    fn test_unmatched_text_the_reverse_would_alter() {
        let machine = zh_machine();
        // 体 is already simplified; claiming it was authored in zh-hant loses it
        let conversion = machine
            .convert("身体", &code("zh-hant"), &code("zh-hans"))
            .unwrap();
        assert_eq!(conversion.text(), "身体");
        assert_eq!(conversion.segments.len(), 2);
        assert!(!conversion.segments[0].is_lossy());
        assert!(conversion.segments[1].is_lossy());
    }

    #[test]
    fn test_run_split_across_digraph() {
        let machine = sr_machine();
        let input = "конјункција";
        let conversion = machine
            .convert(input, &code("sr-ec"), &code("sr-el"))
            .unwrap();
        assert_eq!(conversion.text(), "konjunkcija");
        let kinds: Vec<_> = conversion
            .segments
            .iter()
            .map(|s| (s.kind, s.converted.as_str()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (SegmentKind::Clean, "kon"),
                (SegmentKind::Lossy, "j"),
                (SegmentKind::Clean, "unkcija"),
            ]
        );
        assert_covers(&conversion, input);
        for segment in conversion.segments.iter().filter(|s| !s.is_lossy()) {
            assert_eq!(
                machine.unconvert(&segment.converted, &code("sr-ec")).unwrap(),
                segment.source
            );
        }
    }

    #[test]
    fn test_long_run_splits_in_linear_time() {
        let machine = sr_machine();
        let input = format!("{}нја", "а".repeat(50_000));
        let started = Instant::now();
        let conversion = machine
            .convert(&input, &code("sr-ec"), &code("sr-el"))
            .unwrap();
        let elapsed = started.elapsed();

        let kinds: Vec<_> = conversion
            .segments
            .iter()
            .map(|s| (s.kind, s.converted.len()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (SegmentKind::Clean, 50_001),
                (SegmentKind::Lossy, 1),
                (SegmentKind::Clean, 1),
            ]
        );
        assert!(
            elapsed < Duration::from_secs(5),
            "bracketing took {:?}",
            elapsed
        );
    }

    #[test]
    fn test_split_runs_unconvert_exactly() {
        let machine = sr_machine();
        for input in ["нјнјнј", "коњ конј љ лј", "анјаљаналјанњ", "нјањ"] {
            let conversion = machine
                .convert(input, &code("sr-ec"), &code("sr-el"))
                .unwrap();
            assert_covers(&conversion, input);
            for segment in conversion.segments.iter().filter(|s| !s.is_lossy()) {
                assert_eq!(
                    machine.unconvert(&segment.converted, &code("sr-ec")).unwrap(),
                    segment.source,
                    "{}",
                    input
                );
            }
        }
    }

    #[test]
    fn test_digraph_letter_is_clean() {
        let machine = sr_machine();
        let conversion = machine
            .convert("коњ", &code("sr-ec"), &code("sr-el"))
            .unwrap();
        assert_eq!(conversion.text(), "konj");
        assert!(!conversion.has_lossy());
    }

    #[test]
    fn test_flagged_entries_are_lossy() {
        let mut machine = zh_machine();
        let mut table = machine.table(&code("zh-hans")).unwrap().clone();
        table.mark_lossy("體");
        machine.with_table(table);
        let conversion = machine
            .convert("體", &code("zh-hant"), &code("zh-hans"))
            .unwrap();
        assert!(conversion.has_lossy());
    }

    #[test]
    fn test_segment_coverage() {
        let machine = zh_machine();
        for input in ["", "a", "頭髮和身体 abc", "这個們說话", "  \n"] {
            for (source, target) in [("zh-hant", "zh-hans"), ("zh-hans", "zh-hant")] {
                let conversion = machine.convert(input, &code(source), &code(target)).unwrap();
                assert_covers(&conversion, input);
            }
        }
        let empty = machine
            .convert("", &code("zh-hant"), &code("zh-hans"))
            .unwrap();
        assert!(empty.segments.is_empty());
    }

    #[test]
    fn test_unsupported_variant() {
        let machine = zh_machine();
        let result = machine.convert("abc", &code("zh-tw"), &code("zh-hans"));
        assert!(matches!(
            result,
            Err(LangConvError::UnsupportedVariant { .. })
        ));
        assert!(machine.unconvert("abc", &code("sr-el")).is_err());
        assert!(!machine.is_valid_code_pair(&code("zh-hans"), &code("zh-tw")));
        assert!(machine.is_valid_code_pair(&code("zh-hans"), &code("zh-hant")));
    }

    #[test]
    fn test_count_brackets() {
        let machine = zh_machine();
        let as_hant = machine
            .count_brackets("頭髮", &code("zh-hant"), &code("zh-hans"))
            .unwrap();
        assert_eq!(
            as_hant,
            BracketCount {
                clean: 1,
                lossy: 1,
                matched: 2,
                length: 2
            }
        );
        assert_eq!(as_hant.score(), 0);

        let sum = as_hant + as_hant;
        assert_eq!(sum.length, 4);
    }

    #[test]
    fn test_codes_keep_insertion_order() {
        let machine = zh_machine();
        let codes: Vec<_> = machine.codes().iter().map(|c| c.mw_code()).collect();
        assert_eq!(codes, vec!["zh-hans", "zh-hant"]);
    }
}
