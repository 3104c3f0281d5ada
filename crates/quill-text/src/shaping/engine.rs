//! Glyph substitution engine
//!
//! Applies a parsed [`GsubTable`] to a [`GlyphStream`]: features in font
//! order, each feature's lookups over a left-to-right cursor, the first
//! matching subtable consuming the position. Context and chained-context
//! matches honor lookup-flag skipping and run their nested lookups through
//! an explicit depth counter so a malformed font fails deterministically
//! instead of recursing forever.

use tracing::{debug, trace};

use crate::font::{GlyphId, Tag};
use crate::shaping::gdef::{GlyphClass, GlyphClasses};
use crate::{Result, TextError};

use super::common::{ClassDef, Coverage};
use super::gsub::{
    ChainedContextSubst, ChainedRule, ContextSubst, GsubTable, Lookup, ReverseChainSubst,
    SequenceLookup, SequenceRule, SubstSubtable,
};
use super::stream::GlyphStream;

/// Upper bound on nested lookup application depth. Any real font nests a
/// handful of levels; hitting the cap means the lookup graph is cyclic.
pub const MAX_NESTED_LOOKUPS: usize = 64;

/// Outcome of one successful subtable application.
struct Applied {
    /// Stream positions the match occupies after mutation; the cursor
    /// advances past them.
    advance: usize,
    changed: bool,
}

/// One substitution pass over a stream.
///
/// Holds only shared references; the engine itself is stateless and one
/// instance may serve any number of runs.
pub struct SubstitutionEngine<'a> {
    gsub: &'a GsubTable,
    classes: Option<&'a GlyphClasses>,
}

/// Apply every enabled feature of `script`/`language` to `stream`.
/// Returns whether any slot was rewritten.
pub fn run_gsub(
    stream: &mut GlyphStream,
    gsub: &GsubTable,
    classes: Option<&GlyphClasses>,
    script: Tag,
    language: Option<Tag>,
    features: &[Tag],
) -> Result<bool> {
    SubstitutionEngine::new(gsub, classes).run(stream, script, language, features)
}

impl<'a> SubstitutionEngine<'a> {
    pub fn new(gsub: &'a GsubTable, classes: Option<&'a GlyphClasses>) -> Self {
        Self { gsub, classes }
    }

    /// Features are applied sequentially in the order the font lists them;
    /// later features see the stream rewritten by earlier ones. A feature's
    /// lookups apply at a slot when the feature is in `enabled` or the slot
    /// requests it.
    pub fn run(
        &self,
        stream: &mut GlyphStream,
        script: Tag,
        language: Option<Tag>,
        enabled: &[Tag],
    ) -> Result<bool> {
        let Some(lang_sys) = self.gsub.lang_sys(script, language) else {
            return Ok(false);
        };

        let mut changed = false;
        let required = lang_sys.required_feature.into_iter();
        for index in required.chain(lang_sys.feature_indices.iter().copied()) {
            let Some(feature) = self.gsub.feature(index) else {
                continue;
            };
            let globally = enabled.contains(&feature.tag)
                || lang_sys.required_feature == Some(index);
            if !globally && !self.any_slot_requests(stream, feature.tag) {
                continue;
            }
            trace!(feature = %feature.tag, lookups = feature.lookup_indices.len(), "applying feature");
            for &lookup_index in &feature.lookup_indices {
                changed |= self.apply_lookup(stream, lookup_index, feature.tag, globally)?;
            }
        }

        debug!(%script, changed, "glyph substitution finished");
        Ok(changed)
    }

    fn any_slot_requests(&self, stream: &GlyphStream, tag: Tag) -> bool {
        (0..stream.len()).any(|i| stream.has_feature(i, tag))
    }

    fn applies_at(&self, stream: &GlyphStream, index: usize, tag: Tag, globally: bool) -> bool {
        globally || stream.has_feature(index, tag)
    }

    fn apply_lookup(
        &self,
        stream: &mut GlyphStream,
        lookup_index: u16,
        tag: Tag,
        globally: bool,
    ) -> Result<bool> {
        let Some(lookup) = self.gsub.lookup(lookup_index) else {
            return Ok(false);
        };
        if lookup.is_reverse() {
            return self.apply_reverse_lookup(stream, lookup, tag, globally);
        }

        let mut changed = false;
        let mut i = 0;
        while i < stream.len() {
            if !self.applies_at(stream, i, tag, globally)
                || self.skipped(lookup, stream.first_glyph(i))
            {
                i += 1;
                continue;
            }
            match self.apply_at(stream, lookup, i, 0)? {
                Some(applied) => {
                    changed |= applied.changed;
                    i += applied.advance.max(1);
                }
                None => i += 1,
            }
        }
        Ok(changed)
    }

    /// Try the lookup's subtables at one position; the first match wins.
    fn apply_at(
        &self,
        stream: &mut GlyphStream,
        lookup: &Lookup,
        index: usize,
        depth: usize,
    ) -> Result<Option<Applied>> {
        if depth > MAX_NESTED_LOOKUPS {
            return Err(TextError::NestingLimitExceeded);
        }
        for subtable in &lookup.subtables {
            let applied = match subtable {
                SubstSubtable::Single(sub) => {
                    sub.substitute(stream.first_glyph(index)).map(|out| {
                        stream.replace(index, out);
                        Applied {
                            advance: 1,
                            changed: true,
                        }
                    })
                }
                SubstSubtable::Multiple(sub) => {
                    match sub.sequence(stream.first_glyph(index)) {
                        // A slot never holds zero glyphs; an empty sequence
                        // (glyph deletion) is treated as no match.
                        Some(seq) if !seq.is_empty() => {
                            let seq = seq.to_vec();
                            stream.expand(index, &seq);
                            Some(Applied {
                                advance: 1,
                                changed: true,
                            })
                        }
                        _ => None,
                    }
                }
                SubstSubtable::Alternate(sub) => {
                    // Without caller input the default alternate is the first.
                    sub.alternate(stream.first_glyph(index), 0).map(|out| {
                        stream.replace(index, out);
                        Applied {
                            advance: 1,
                            changed: true,
                        }
                    })
                }
                SubstSubtable::Ligature(sub) => self.apply_ligature(stream, sub, index),
                SubstSubtable::Context(sub) => {
                    self.apply_context(stream, lookup, sub, index, depth)?
                }
                SubstSubtable::ChainedContext(sub) => {
                    self.apply_chained(stream, lookup, sub, index, depth)?
                }
                // Reverse-chained subtables only run in the dedicated
                // right-to-left pass.
                SubstSubtable::ReverseChainSingle(_) => None,
            };
            if applied.is_some() {
                return Ok(applied);
            }
        }
        Ok(None)
    }

    fn apply_ligature(
        &self,
        stream: &mut GlyphStream,
        sub: &super::gsub::LigatureSubst,
        index: usize,
    ) -> Option<Applied> {
        let candidates = sub.ligatures(stream.first_glyph(index))?;
        for ligature in candidates {
            let len = ligature.components.len() + 1;
            if index + len > stream.len() {
                continue;
            }
            let matches = ligature
                .components
                .iter()
                .enumerate()
                .all(|(k, &component)| stream.first_glyph(index + 1 + k) == component);
            if matches {
                stream.merge(index, len, ligature.glyph);
                return Some(Applied {
                    advance: 1,
                    changed: true,
                });
            }
        }
        None
    }

    fn apply_context(
        &self,
        stream: &mut GlyphStream,
        lookup: &Lookup,
        sub: &ContextSubst,
        index: usize,
        depth: usize,
    ) -> Result<Option<Applied>> {
        let first = stream.first_glyph(index);
        match sub {
            ContextSubst::Glyphs {
                coverage,
                rule_sets,
            } => {
                let Some(rank) = coverage.index_of(first) else {
                    return Ok(None);
                };
                let Some(rules) = rule_sets.get(rank as usize) else {
                    return Ok(None);
                };
                self.apply_rules(stream, lookup, rules, index, depth, None)
            }
            ContextSubst::Classes {
                coverage,
                classes,
                rule_sets,
            } => {
                if coverage.index_of(first).is_none() {
                    return Ok(None);
                }
                let class = classes.class_of(first);
                let Some(rules) = rule_sets.get(class as usize) else {
                    return Ok(None);
                };
                self.apply_rules(stream, lookup, rules, index, depth, Some(classes))
            }
            ContextSubst::Coverages { coverages, lookups } => {
                if coverages[0].index_of(first).is_none() {
                    return Ok(None);
                }
                let Some(positions) =
                    self.match_forward(stream, lookup, index, &Pattern::Coverages(&coverages[1..]))
                else {
                    return Ok(None);
                };
                self.finish_context(stream, lookups, positions, depth)
                    .map(Some)
            }
        }
    }

    /// First matching rule of a format 1/2 rule set wins.
    fn apply_rules(
        &self,
        stream: &mut GlyphStream,
        lookup: &Lookup,
        rules: &[SequenceRule],
        index: usize,
        depth: usize,
        classes: Option<&ClassDef>,
    ) -> Result<Option<Applied>> {
        for rule in rules {
            let pattern = match classes {
                Some(classes) => Pattern::Classes(&rule.input, classes),
                None => Pattern::Glyphs(&rule.input),
            };
            if let Some(positions) = self.match_forward(stream, lookup, index, &pattern) {
                return self
                    .finish_context(stream, &rule.lookups, positions, depth)
                    .map(Some);
            }
        }
        Ok(None)
    }

    fn apply_chained(
        &self,
        stream: &mut GlyphStream,
        lookup: &Lookup,
        sub: &ChainedContextSubst,
        index: usize,
        depth: usize,
    ) -> Result<Option<Applied>> {
        let first = stream.first_glyph(index);
        match sub {
            ChainedContextSubst::Glyphs {
                coverage,
                rule_sets,
            } => {
                let Some(rank) = coverage.index_of(first) else {
                    return Ok(None);
                };
                let Some(rules) = rule_sets.get(rank as usize) else {
                    return Ok(None);
                };
                self.apply_chained_rules(stream, lookup, rules, index, depth, None)
            }
            ChainedContextSubst::Classes {
                coverage,
                backtrack_classes,
                input_classes,
                lookahead_classes,
                rule_sets,
            } => {
                if coverage.index_of(first).is_none() {
                    return Ok(None);
                }
                let class = input_classes.class_of(first);
                let Some(rules) = rule_sets.get(class as usize) else {
                    return Ok(None);
                };
                self.apply_chained_rules(
                    stream,
                    lookup,
                    rules,
                    index,
                    depth,
                    Some((backtrack_classes, input_classes, lookahead_classes)),
                )
            }
            ChainedContextSubst::Coverages {
                backtrack,
                input,
                lookahead,
                lookups,
            } => {
                if input[0].index_of(first).is_none() {
                    return Ok(None);
                }
                if !self.match_backtrack(stream, lookup, index, &Pattern::Coverages(backtrack)) {
                    return Ok(None);
                }
                let Some(positions) =
                    self.match_forward(stream, lookup, index, &Pattern::Coverages(&input[1..]))
                else {
                    return Ok(None);
                };
                if !self.match_lookahead(
                    stream,
                    lookup,
                    *positions.last().expect("input match is never empty"),
                    &Pattern::Coverages(lookahead),
                ) {
                    return Ok(None);
                }
                self.finish_context(stream, lookups, positions, depth)
                    .map(Some)
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn apply_chained_rules(
        &self,
        stream: &mut GlyphStream,
        lookup: &Lookup,
        rules: &[ChainedRule],
        index: usize,
        depth: usize,
        classes: Option<(&ClassDef, &ClassDef, &ClassDef)>,
    ) -> Result<Option<Applied>> {
        for rule in rules {
            let (back, input, ahead) = match classes {
                Some((b, i, l)) => (
                    Pattern::Classes(&rule.backtrack, b),
                    Pattern::Classes(&rule.input, i),
                    Pattern::Classes(&rule.lookahead, l),
                ),
                None => (
                    Pattern::Glyphs(&rule.backtrack),
                    Pattern::Glyphs(&rule.input),
                    Pattern::Glyphs(&rule.lookahead),
                ),
            };
            if !self.match_backtrack(stream, lookup, index, &back) {
                continue;
            }
            let Some(positions) = self.match_forward(stream, lookup, index, &input) else {
                continue;
            };
            if !self.match_lookahead(
                stream,
                lookup,
                *positions.last().expect("input match is never empty"),
                &ahead,
            ) {
                continue;
            }
            return self
                .finish_context(stream, &rule.lookups, positions, depth)
                .map(Some);
        }
        Ok(None)
    }

    /// Apply a matched context's nested lookups and report how far the
    /// match now reaches. Sequence indices address the matched input
    /// counting only unskipped slots; positions shift left as nested
    /// ligatures shrink the stream.
    fn finish_context(
        &self,
        stream: &mut GlyphStream,
        records: &[SequenceLookup],
        positions: Vec<usize>,
        depth: usize,
    ) -> Result<Applied> {
        let start = positions[0];
        let mut adjusted = positions;
        let mut changed = false;

        for record in records {
            let Some(&target) = adjusted.get(record.sequence_index as usize) else {
                continue;
            };
            let Some(nested) = self.gsub.lookup(record.lookup_index) else {
                continue;
            };
            let before = stream.len();
            if let Some(applied) = self.apply_at(stream, nested, target, depth + 1)? {
                changed |= applied.changed;
            }
            let removed = before - stream.len();
            if removed > 0 {
                for p in adjusted.iter_mut() {
                    if *p > target {
                        *p -= removed.min(*p - target);
                    }
                }
            }
        }

        let end = *adjusted.last().expect("input match is never empty");
        Ok(Applied {
            advance: end - start + 1,
            changed,
        })
    }

    /// Reverse chaining walks right-to-left, substitutes in place and never
    /// applies nested lookups.
    fn apply_reverse_lookup(
        &self,
        stream: &mut GlyphStream,
        lookup: &Lookup,
        tag: Tag,
        globally: bool,
    ) -> Result<bool> {
        let mut changed = false;
        for index in (0..stream.len()).rev() {
            if !self.applies_at(stream, index, tag, globally)
                || self.skipped(lookup, stream.first_glyph(index))
            {
                continue;
            }
            for subtable in &lookup.subtables {
                let SubstSubtable::ReverseChainSingle(sub) = subtable else {
                    continue;
                };
                if let Some(out) = self.match_reverse(stream, lookup, sub, index) {
                    stream.replace(index, out);
                    changed = true;
                    break;
                }
            }
        }
        Ok(changed)
    }

    fn match_reverse(
        &self,
        stream: &GlyphStream,
        lookup: &Lookup,
        sub: &ReverseChainSubst,
        index: usize,
    ) -> Option<GlyphId> {
        let rank = sub.coverage.index_of(stream.first_glyph(index))?;
        if !self.match_backtrack(stream, lookup, index, &Pattern::Coverages(&sub.backtrack)) {
            return None;
        }
        if !self.match_lookahead(stream, lookup, index, &Pattern::Coverages(&sub.lookahead)) {
            return None;
        }
        sub.substitutes.get(rank as usize).copied()
    }

    /// Match the pattern against the unskipped slots after `start`.
    /// Returns the matched positions, `start` included.
    fn match_forward(
        &self,
        stream: &GlyphStream,
        lookup: &Lookup,
        start: usize,
        pattern: &Pattern,
    ) -> Option<Vec<usize>> {
        let mut positions = Vec::with_capacity(pattern.len() + 1);
        positions.push(start);
        let mut at = start;
        for k in 0..pattern.len() {
            at = self.next_unskipped(stream, lookup, at)?;
            if !pattern.matches(k, stream.first_glyph(at)) {
                return None;
            }
            positions.push(at);
        }
        Some(positions)
    }

    /// Backtrack elements are stored closest-first and matched against the
    /// unskipped slots preceding `start`.
    fn match_backtrack(
        &self,
        stream: &GlyphStream,
        lookup: &Lookup,
        start: usize,
        pattern: &Pattern,
    ) -> bool {
        let mut at = start;
        for k in 0..pattern.len() {
            let Some(prev) = self.prev_unskipped(stream, lookup, at) else {
                return false;
            };
            if !pattern.matches(k, stream.first_glyph(prev)) {
                return false;
            }
            at = prev;
        }
        true
    }

    fn match_lookahead(
        &self,
        stream: &GlyphStream,
        lookup: &Lookup,
        after: usize,
        pattern: &Pattern,
    ) -> bool {
        let mut at = after;
        for k in 0..pattern.len() {
            let Some(next) = self.next_unskipped(stream, lookup, at) else {
                return false;
            };
            if !pattern.matches(k, stream.first_glyph(next)) {
                return false;
            }
            at = next;
        }
        true
    }

    fn next_unskipped(&self, stream: &GlyphStream, lookup: &Lookup, from: usize) -> Option<usize> {
        let mut i = from + 1;
        while i < stream.len() {
            if !self.skipped(lookup, stream.first_glyph(i)) {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    fn prev_unskipped(&self, stream: &GlyphStream, lookup: &Lookup, from: usize) -> Option<usize> {
        let mut i = from;
        while i > 0 {
            i -= 1;
            if !self.skipped(lookup, stream.first_glyph(i)) {
                return Some(i);
            }
        }
        None
    }

    /// Whether the lookup's flags exclude a glyph from matching. The cursor
    /// never lands on a skipped slot either.
    fn skipped(&self, lookup: &Lookup, glyph: GlyphId) -> bool {
        let Some(classes) = self.classes else {
            return false;
        };
        let flags = lookup.flags;
        match classes.glyph_class(glyph) {
            Some(GlyphClass::Base) => flags.ignore_base_glyphs(),
            Some(GlyphClass::Ligature) => flags.ignore_ligatures(),
            Some(GlyphClass::Mark) => {
                if flags.ignore_marks() {
                    true
                } else if flags.use_mark_filtering_set() {
                    match lookup.mark_filtering_set {
                        Some(set) => !classes.mark_set_covers(set, glyph),
                        None => false,
                    }
                } else {
                    let filter = flags.mark_attachment_class();
                    filter != 0 && classes.mark_attachment_class(glyph) != filter
                }
            }
            _ => false,
        }
    }
}

/// One context pattern element source.
enum Pattern<'a> {
    Glyphs(&'a [u16]),
    Classes(&'a [u16], &'a ClassDef),
    Coverages(&'a [Coverage]),
}

impl Pattern<'_> {
    fn len(&self) -> usize {
        match self {
            Pattern::Glyphs(v) => v.len(),
            Pattern::Classes(v, _) => v.len(),
            Pattern::Coverages(v) => v.len(),
        }
    }

    fn matches(&self, k: usize, glyph: GlyphId) -> bool {
        match self {
            Pattern::Glyphs(v) => v[k] == glyph.0,
            Pattern::Classes(v, classes) => classes.class_of(glyph) == v[k],
            Pattern::Coverages(v) => v[k].contains(glyph),
        }
    }
}
