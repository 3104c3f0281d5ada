//! Glyph substitution table (GSUB)
//!
//! Parses the OpenType GSUB binary layout into owned sum-typed lookups:
//! script list, feature list and the lookup list with all eight lookup
//! types. Extension subtables (type 7) are resolved here, so the engine
//! only ever sees the seven concrete substitution variants.
//!
//! Every malformed condition (bad format codes, out-of-range offsets or
//! lookup indices) is fatal at parse time; nothing recoverable is deferred
//! to shaping.

use tracing::debug;

use crate::font::reader::FontReader;
use crate::font::{GlyphId, Tag};
use crate::Result;

use super::common::{ClassDef, Coverage, PResult, ParseIssue};

/// One `(sequenceIndex, lookupListIndex)` nested substitution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceLookup {
    pub sequence_index: u16,
    pub lookup_index: u16,
}

/// Lookup qualifier bits controlling which slots a match may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LookupFlags(pub u16);

impl LookupFlags {
    pub const RIGHT_TO_LEFT: u16 = 0x0001;
    pub const IGNORE_BASE_GLYPHS: u16 = 0x0002;
    pub const IGNORE_LIGATURES: u16 = 0x0004;
    pub const IGNORE_MARKS: u16 = 0x0008;
    pub const USE_MARK_FILTERING_SET: u16 = 0x0010;

    pub fn ignore_base_glyphs(self) -> bool {
        self.0 & Self::IGNORE_BASE_GLYPHS != 0
    }

    pub fn ignore_ligatures(self) -> bool {
        self.0 & Self::IGNORE_LIGATURES != 0
    }

    pub fn ignore_marks(self) -> bool {
        self.0 & Self::IGNORE_MARKS != 0
    }

    pub fn use_mark_filtering_set(self) -> bool {
        self.0 & Self::USE_MARK_FILTERING_SET != 0
    }

    /// Mark attachment class filter from the high byte; 0 means no filter.
    pub fn mark_attachment_class(self) -> u16 {
        self.0 >> 8
    }
}

/// A script record with its language systems.
#[derive(Debug, Clone)]
pub struct Script {
    pub tag: Tag,
    pub default_lang_sys: Option<LangSys>,
    pub lang_systems: Vec<(Tag, LangSys)>,
}

/// Feature indices enabled for one script/language combination.
#[derive(Debug, Clone)]
pub struct LangSys {
    pub required_feature: Option<u16>,
    pub feature_indices: Vec<u16>,
}

/// A feature record: its tag and the lookups it drives, in order.
#[derive(Debug, Clone)]
pub struct FeatureRecord {
    pub tag: Tag,
    pub lookup_indices: Vec<u16>,
}

/// One lookup: qualifier flags plus its subtables in declaration order.
#[derive(Debug, Clone)]
pub struct Lookup {
    pub flags: LookupFlags,
    pub mark_filtering_set: Option<u16>,
    pub subtables: Vec<SubstSubtable>,
}

impl Lookup {
    /// Reverse-chained lookups walk the stream right-to-left.
    pub fn is_reverse(&self) -> bool {
        matches!(
            self.subtables.first(),
            Some(SubstSubtable::ReverseChainSingle(_))
        )
    }
}

/// The seven concrete substitution subtable variants.
#[derive(Debug, Clone)]
pub enum SubstSubtable {
    Single(SingleSubst),
    Multiple(MultipleSubst),
    Alternate(AlternateSubst),
    Ligature(LigatureSubst),
    Context(ContextSubst),
    ChainedContext(ChainedContextSubst),
    ReverseChainSingle(ReverseChainSubst),
}

/// Type 1: one glyph to one glyph.
#[derive(Debug, Clone)]
pub struct SingleSubst {
    pub(crate) coverage: Coverage,
    pub(crate) kind: SingleKind,
}

#[derive(Debug, Clone)]
pub(crate) enum SingleKind {
    /// Format 1: one delta added to every covered glyph id.
    Delta(i16),
    /// Format 2: explicit substitute per coverage rank.
    Substitutes(Vec<GlyphId>),
}

impl SingleSubst {
    pub fn substitute(&self, glyph: GlyphId) -> Option<GlyphId> {
        let index = self.coverage.index_of(glyph)?;
        match &self.kind {
            SingleKind::Delta(delta) => {
                Some(GlyphId((glyph.0 as i32 + *delta as i32) as u16))
            }
            SingleKind::Substitutes(subs) => subs.get(index as usize).copied(),
        }
    }
}

/// Type 2: one glyph to an ordered sequence.
#[derive(Debug, Clone)]
pub struct MultipleSubst {
    pub(crate) coverage: Coverage,
    pub(crate) sequences: Vec<Vec<GlyphId>>,
}

impl MultipleSubst {
    pub fn sequence(&self, glyph: GlyphId) -> Option<&[GlyphId]> {
        let index = self.coverage.index_of(glyph)?;
        self.sequences.get(index as usize).map(Vec::as_slice)
    }
}

/// Type 3: one glyph to one of several alternates.
#[derive(Debug, Clone)]
pub struct AlternateSubst {
    pub(crate) coverage: Coverage,
    pub(crate) sets: Vec<Vec<GlyphId>>,
}

impl AlternateSubst {
    pub fn alternates(&self, glyph: GlyphId) -> Option<&[GlyphId]> {
        let index = self.coverage.index_of(glyph)?;
        self.sets.get(index as usize).map(Vec::as_slice)
    }

    pub fn alternate(&self, glyph: GlyphId, index: usize) -> Option<GlyphId> {
        self.alternates(glyph)?.get(index).copied()
    }
}

/// Type 4: a glyph sequence to one ligature glyph.
#[derive(Debug, Clone)]
pub struct LigatureSubst {
    pub(crate) coverage: Coverage,
    pub(crate) sets: Vec<Vec<Ligature>>,
}

#[derive(Debug, Clone)]
pub struct Ligature {
    pub glyph: GlyphId,
    /// Components after the covered first glyph.
    pub components: Vec<GlyphId>,
}

impl LigatureSubst {
    /// Candidate ligatures starting with `glyph`, in font order.
    pub fn ligatures(&self, glyph: GlyphId) -> Option<&[Ligature]> {
        let index = self.coverage.index_of(glyph)?;
        self.sets.get(index as usize).map(Vec::as_slice)
    }
}

/// Type 5: contextual substitution.
#[derive(Debug, Clone)]
pub enum ContextSubst {
    /// Format 1: rules over literal glyph sequences.
    Glyphs {
        coverage: Coverage,
        rule_sets: Vec<Vec<SequenceRule>>,
    },
    /// Format 2: rules over glyph classes.
    Classes {
        coverage: Coverage,
        classes: ClassDef,
        rule_sets: Vec<Vec<SequenceRule>>,
    },
    /// Format 3: one coverage table per input position.
    Coverages {
        coverages: Vec<Coverage>,
        lookups: Vec<SequenceLookup>,
    },
}

/// A context rule. `input` holds glyph ids (format 1) or classes
/// (format 2) for positions after the first.
#[derive(Debug, Clone)]
pub struct SequenceRule {
    pub input: Vec<u16>,
    pub lookups: Vec<SequenceLookup>,
}

/// Type 6: chained contextual substitution.
#[derive(Debug, Clone)]
pub enum ChainedContextSubst {
    Glyphs {
        coverage: Coverage,
        rule_sets: Vec<Vec<ChainedRule>>,
    },
    Classes {
        coverage: Coverage,
        backtrack_classes: ClassDef,
        input_classes: ClassDef,
        lookahead_classes: ClassDef,
        rule_sets: Vec<Vec<ChainedRule>>,
    },
    Coverages {
        backtrack: Vec<Coverage>,
        input: Vec<Coverage>,
        lookahead: Vec<Coverage>,
        lookups: Vec<SequenceLookup>,
    },
}

/// A chained rule; `backtrack` is stored closest-first.
#[derive(Debug, Clone)]
pub struct ChainedRule {
    pub backtrack: Vec<u16>,
    pub input: Vec<u16>,
    pub lookahead: Vec<u16>,
    pub lookups: Vec<SequenceLookup>,
}

/// Type 8: reverse chaining contextual single substitution.
#[derive(Debug, Clone)]
pub struct ReverseChainSubst {
    pub(crate) coverage: Coverage,
    pub(crate) backtrack: Vec<Coverage>,
    pub(crate) lookahead: Vec<Coverage>,
    pub(crate) substitutes: Vec<GlyphId>,
}

/// Fully parsed GSUB table.
#[derive(Debug, Clone)]
pub struct GsubTable {
    scripts: Vec<Script>,
    features: Vec<FeatureRecord>,
    lookups: Vec<Lookup>,
}

impl GsubTable {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let table = Self::parse_impl(data).map_err(|e| e.into_error("GSUB"))?;
        debug!(
            scripts = table.scripts.len(),
            features = table.features.len(),
            lookups = table.lookups.len(),
            "parsed GSUB table"
        );
        Ok(table)
    }

    fn parse_impl(data: &[u8]) -> PResult<Self> {
        let mut r = FontReader::new(data);
        let major = r.read_u16()?;
        let _minor = r.read_u16()?;
        if major != 1 {
            return Err(ParseIssue::at(0, "unsupported GSUB version"));
        }
        let script_list = r.read_offset16()?.0 as usize;
        let feature_list = r.read_offset16()?.0 as usize;
        let lookup_list = r.read_offset16()?.0 as usize;

        // Lookups first: feature records and nested sequence records are
        // validated against the lookup count.
        let lookups = parse_lookup_list(data, lookup_list)?;
        let features = parse_feature_list(data, feature_list, lookups.len())?;
        let scripts = parse_script_list(data, script_list, features.len())?;

        Ok(Self {
            scripts,
            features,
            lookups,
        })
    }

    pub fn script(&self, tag: Tag) -> Option<&Script> {
        self.scripts.iter().find(|s| s.tag == tag)
    }

    /// Resolve the language system for a run, falling back to `DFLT` and to
    /// the script's default language system the way shapers do.
    pub fn lang_sys(&self, script: Tag, language: Option<Tag>) -> Option<&LangSys> {
        let script = self
            .script(script)
            .or_else(|| self.script(Tag::DEFAULT_SCRIPT))?;
        if let Some(lang) = language {
            if let Some((_, lang_sys)) =
                script.lang_systems.iter().find(|(tag, _)| *tag == lang)
            {
                return Some(lang_sys);
            }
        }
        script
            .default_lang_sys
            .as_ref()
            .or_else(|| script.lang_systems.first().map(|(_, l)| l))
    }

    pub fn feature(&self, index: u16) -> Option<&FeatureRecord> {
        self.features.get(index as usize)
    }

    pub fn lookup(&self, index: u16) -> Option<&Lookup> {
        self.lookups.get(index as usize)
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.len()
    }
}

fn parse_script_list(data: &[u8], base: usize, feature_count: usize) -> PResult<Vec<Script>> {
    let mut r = FontReader::new(data);
    r.seek(base);
    let count = r.read_u16()? as usize;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let tag = r.read_tag()?;
        let offset = r.read_offset16()?.0 as usize;
        records.push((tag, base + offset));
    }

    let mut scripts = Vec::with_capacity(count);
    for (tag, script_base) in records {
        let mut r = FontReader::new(data);
        r.seek(script_base);
        let default_offset = r.read_offset16()?;
        let lang_count = r.read_u16()? as usize;
        let mut lang_records = Vec::with_capacity(lang_count);
        for _ in 0..lang_count {
            let lang_tag = r.read_tag()?;
            let offset = r.read_offset16()?.0 as usize;
            lang_records.push((lang_tag, script_base + offset));
        }

        let default_lang_sys = default_offset
            .non_null()
            .map(|off| parse_lang_sys(data, script_base + off, feature_count))
            .transpose()?;
        let mut lang_systems = Vec::with_capacity(lang_count);
        for (lang_tag, lang_base) in lang_records {
            lang_systems.push((lang_tag, parse_lang_sys(data, lang_base, feature_count)?));
        }

        scripts.push(Script {
            tag,
            default_lang_sys,
            lang_systems,
        });
    }
    Ok(scripts)
}

fn parse_lang_sys(data: &[u8], base: usize, feature_count: usize) -> PResult<LangSys> {
    let mut r = FontReader::new(data);
    r.seek(base);
    let _lookup_order = r.read_u16()?;
    let required = r.read_u16()?;
    let count = r.read_u16()? as usize;
    let mut feature_indices = Vec::with_capacity(count);
    for _ in 0..count {
        let index = r.read_u16()?;
        if index as usize >= feature_count {
            return Err(ParseIssue::at(base, "feature index out of range"));
        }
        feature_indices.push(index);
    }
    let required_feature = (required != 0xffff).then_some(required);
    if let Some(required) = required_feature {
        if required as usize >= feature_count {
            return Err(ParseIssue::at(base, "required feature index out of range"));
        }
    }
    Ok(LangSys {
        required_feature,
        feature_indices,
    })
}

fn parse_feature_list(
    data: &[u8],
    base: usize,
    lookup_count: usize,
) -> PResult<Vec<FeatureRecord>> {
    let mut r = FontReader::new(data);
    r.seek(base);
    let count = r.read_u16()? as usize;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let tag = r.read_tag()?;
        let offset = r.read_offset16()?.0 as usize;
        records.push((tag, base + offset));
    }

    let mut features = Vec::with_capacity(count);
    for (tag, feature_base) in records {
        let mut r = FontReader::new(data);
        r.seek(feature_base);
        let _params = r.read_offset16()?;
        let index_count = r.read_u16()? as usize;
        let mut lookup_indices = Vec::with_capacity(index_count);
        for _ in 0..index_count {
            let index = r.read_u16()?;
            if index as usize >= lookup_count {
                return Err(ParseIssue::at(feature_base, "lookup index out of range"));
            }
            lookup_indices.push(index);
        }
        features.push(FeatureRecord {
            tag,
            lookup_indices,
        });
    }
    Ok(features)
}

fn parse_lookup_list(data: &[u8], base: usize) -> PResult<Vec<Lookup>> {
    let mut r = FontReader::new(data);
    r.seek(base);
    let count = r.read_u16()? as usize;
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        offsets.push(base + r.read_offset16()?.0 as usize);
    }

    let mut lookups = Vec::with_capacity(count);
    for offset in offsets {
        lookups.push(parse_lookup(data, offset, count)?);
    }
    Ok(lookups)
}

fn parse_lookup(data: &[u8], base: usize, lookup_count: usize) -> PResult<Lookup> {
    let mut r = FontReader::new(data);
    r.seek(base);
    let lookup_type = r.read_u16()?;
    let flags = LookupFlags(r.read_u16()?);
    let subtable_count = r.read_u16()? as usize;
    let mut offsets = Vec::with_capacity(subtable_count);
    for _ in 0..subtable_count {
        offsets.push(base + r.read_offset16()?.0 as usize);
    }
    let mark_filtering_set = if flags.use_mark_filtering_set() {
        Some(r.read_u16()?)
    } else {
        None
    };

    let mut subtables = Vec::with_capacity(subtable_count);
    for offset in offsets {
        // Extension subtables point at the real payload with a 32-bit
        // offset; resolve the indirection before dispatching.
        let (kind, table_base) = if lookup_type == 7 {
            let mut r = FontReader::new(data);
            r.seek(offset);
            let format = r.read_u16()?;
            if format != 1 {
                return Err(ParseIssue::at(offset, "invalid extension format"));
            }
            let extension_type = r.read_u16()?;
            if extension_type == 7 {
                return Err(ParseIssue::at(offset, "extension subtable may not nest"));
            }
            let extension_offset = r.read_offset32()?.0 as usize;
            (extension_type, offset + extension_offset)
        } else {
            (lookup_type, offset)
        };

        subtables.push(parse_subtable(data, table_base, kind, lookup_count)?);
    }

    Ok(Lookup {
        flags,
        mark_filtering_set,
        subtables,
    })
}

fn parse_subtable(
    data: &[u8],
    base: usize,
    kind: u16,
    lookup_count: usize,
) -> PResult<SubstSubtable> {
    match kind {
        1 => parse_single(data, base).map(SubstSubtable::Single),
        2 => parse_multiple(data, base).map(SubstSubtable::Multiple),
        3 => parse_alternate(data, base).map(SubstSubtable::Alternate),
        4 => parse_ligature(data, base).map(SubstSubtable::Ligature),
        5 => parse_context(data, base, lookup_count).map(SubstSubtable::Context),
        6 => parse_chained(data, base, lookup_count).map(SubstSubtable::ChainedContext),
        8 => parse_reverse_chain(data, base).map(SubstSubtable::ReverseChainSingle),
        _ => Err(ParseIssue::at(base, "invalid lookup type")),
    }
}

fn parse_single(data: &[u8], base: usize) -> PResult<SingleSubst> {
    let mut r = FontReader::new(data);
    r.seek(base);
    let format = r.read_u16()?;
    let coverage_offset = r.read_offset16()?.0 as usize;
    let kind = match format {
        1 => SingleKind::Delta(r.read_i16()?),
        2 => {
            let count = r.read_u16()? as usize;
            let mut subs = Vec::with_capacity(count);
            for _ in 0..count {
                subs.push(GlyphId(r.read_u16()?));
            }
            SingleKind::Substitutes(subs)
        }
        _ => return Err(ParseIssue::at(base, "invalid single substitution format")),
    };
    Ok(SingleSubst {
        coverage: Coverage::parse(data, base + coverage_offset)?,
        kind,
    })
}

fn parse_glyph_sequences(data: &[u8], base: usize) -> PResult<(Coverage, Vec<Vec<GlyphId>>)> {
    let mut r = FontReader::new(data);
    r.seek(base);
    let format = r.read_u16()?;
    if format != 1 {
        return Err(ParseIssue::at(base, "invalid sequence substitution format"));
    }
    let coverage_offset = r.read_offset16()?.0 as usize;
    let count = r.read_u16()? as usize;
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        offsets.push(base + r.read_offset16()?.0 as usize);
    }

    let mut sequences = Vec::with_capacity(count);
    for offset in offsets {
        let mut r = FontReader::new(data);
        r.seek(offset);
        let glyph_count = r.read_u16()? as usize;
        let mut glyphs = Vec::with_capacity(glyph_count);
        for _ in 0..glyph_count {
            glyphs.push(GlyphId(r.read_u16()?));
        }
        sequences.push(glyphs);
    }
    Ok((Coverage::parse(data, base + coverage_offset)?, sequences))
}

fn parse_multiple(data: &[u8], base: usize) -> PResult<MultipleSubst> {
    let (coverage, sequences) = parse_glyph_sequences(data, base)?;
    Ok(MultipleSubst {
        coverage,
        sequences,
    })
}

fn parse_alternate(data: &[u8], base: usize) -> PResult<AlternateSubst> {
    // Same wire layout as multiple substitution, different semantics.
    let (coverage, sets) = parse_glyph_sequences(data, base)?;
    Ok(AlternateSubst { coverage, sets })
}

fn parse_ligature(data: &[u8], base: usize) -> PResult<LigatureSubst> {
    let mut r = FontReader::new(data);
    r.seek(base);
    let format = r.read_u16()?;
    if format != 1 {
        return Err(ParseIssue::at(base, "invalid ligature substitution format"));
    }
    let coverage_offset = r.read_offset16()?.0 as usize;
    let set_count = r.read_u16()? as usize;
    let mut set_offsets = Vec::with_capacity(set_count);
    for _ in 0..set_count {
        set_offsets.push(base + r.read_offset16()?.0 as usize);
    }

    let mut sets = Vec::with_capacity(set_count);
    for set_base in set_offsets {
        let mut r = FontReader::new(data);
        r.seek(set_base);
        let lig_count = r.read_u16()? as usize;
        let mut lig_offsets = Vec::with_capacity(lig_count);
        for _ in 0..lig_count {
            lig_offsets.push(set_base + r.read_offset16()?.0 as usize);
        }

        let mut ligatures = Vec::with_capacity(lig_count);
        for lig_base in lig_offsets {
            let mut r = FontReader::new(data);
            r.seek(lig_base);
            let glyph = GlyphId(r.read_u16()?);
            let component_count = r.read_u16()? as usize;
            if component_count == 0 {
                return Err(ParseIssue::at(lig_base, "ligature with zero components"));
            }
            // The count includes the covered first glyph.
            let mut components = Vec::with_capacity(component_count - 1);
            for _ in 1..component_count {
                components.push(GlyphId(r.read_u16()?));
            }
            ligatures.push(Ligature { glyph, components });
        }
        sets.push(ligatures);
    }

    Ok(LigatureSubst {
        coverage: Coverage::parse(data, base + coverage_offset)?,
        sets,
    })
}

fn parse_sequence_lookups(
    r: &mut FontReader,
    count: usize,
    base: usize,
    lookup_count: usize,
) -> PResult<Vec<SequenceLookup>> {
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let sequence_index = r.read_u16()?;
        let lookup_index = r.read_u16()?;
        if lookup_index as usize >= lookup_count {
            return Err(ParseIssue::at(base, "nested lookup index out of range"));
        }
        records.push(SequenceLookup {
            sequence_index,
            lookup_index,
        });
    }
    Ok(records)
}

/// Rule sets shared by context formats 1 and 2. A null set offset means the
/// coverage rank has no rules.
fn parse_rule_sets(
    data: &[u8],
    base: usize,
    offsets: Vec<Option<usize>>,
    lookup_count: usize,
) -> PResult<Vec<Vec<SequenceRule>>> {
    let mut rule_sets = Vec::with_capacity(offsets.len());
    for set_offset in offsets {
        let Some(set_off) = set_offset else {
            rule_sets.push(Vec::new());
            continue;
        };
        let set_base = base + set_off;
        let mut r = FontReader::new(data);
        r.seek(set_base);
        let rule_count = r.read_u16()? as usize;
        let mut rule_offsets = Vec::with_capacity(rule_count);
        for _ in 0..rule_count {
            rule_offsets.push(set_base + r.read_offset16()?.0 as usize);
        }

        let mut rules = Vec::with_capacity(rule_count);
        for rule_base in rule_offsets {
            let mut r = FontReader::new(data);
            r.seek(rule_base);
            let glyph_count = r.read_u16()? as usize;
            if glyph_count == 0 {
                return Err(ParseIssue::at(rule_base, "context rule with empty input"));
            }
            let lookup_record_count = r.read_u16()? as usize;
            let mut input = Vec::with_capacity(glyph_count - 1);
            for _ in 1..glyph_count {
                input.push(r.read_u16()?);
            }
            let lookups =
                parse_sequence_lookups(&mut r, lookup_record_count, rule_base, lookup_count)?;
            rules.push(SequenceRule { input, lookups });
        }
        rule_sets.push(rules);
    }
    Ok(rule_sets)
}

fn read_set_offsets(r: &mut FontReader, count: usize) -> PResult<Vec<Option<usize>>> {
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        offsets.push(r.read_offset16()?.non_null());
    }
    Ok(offsets)
}

fn read_coverages(
    data: &[u8],
    base: usize,
    r: &mut FontReader,
    count: usize,
) -> PResult<Vec<Coverage>> {
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        offsets.push(base + r.read_offset16()?.0 as usize);
    }
    let mut coverages = Vec::with_capacity(count);
    for offset in offsets {
        coverages.push(Coverage::parse(data, offset)?);
    }
    Ok(coverages)
}

fn parse_context(data: &[u8], base: usize, lookup_count: usize) -> PResult<ContextSubst> {
    let mut r = FontReader::new(data);
    r.seek(base);
    match r.read_u16()? {
        1 => {
            let coverage_offset = r.read_offset16()?.0 as usize;
            let set_count = r.read_u16()? as usize;
            let offsets = read_set_offsets(&mut r, set_count)?;
            Ok(ContextSubst::Glyphs {
                coverage: Coverage::parse(data, base + coverage_offset)?,
                rule_sets: parse_rule_sets(data, base, offsets, lookup_count)?,
            })
        }
        2 => {
            let coverage_offset = r.read_offset16()?.0 as usize;
            let class_def_offset = r.read_offset16()?.0 as usize;
            let set_count = r.read_u16()? as usize;
            let offsets = read_set_offsets(&mut r, set_count)?;
            Ok(ContextSubst::Classes {
                coverage: Coverage::parse(data, base + coverage_offset)?,
                classes: ClassDef::parse(data, base + class_def_offset)?,
                rule_sets: parse_rule_sets(data, base, offsets, lookup_count)?,
            })
        }
        3 => {
            let glyph_count = r.read_u16()? as usize;
            if glyph_count == 0 {
                return Err(ParseIssue::at(base, "context rule with empty input"));
            }
            let lookup_record_count = r.read_u16()? as usize;
            let coverages = read_coverages(data, base, &mut r, glyph_count)?;
            let lookups =
                parse_sequence_lookups(&mut r, lookup_record_count, base, lookup_count)?;
            Ok(ContextSubst::Coverages { coverages, lookups })
        }
        _ => Err(ParseIssue::at(base, "invalid context substitution format")),
    }
}

/// Chained rule sets for formats 1 and 2.
fn parse_chained_rule_sets(
    data: &[u8],
    base: usize,
    offsets: Vec<Option<usize>>,
    lookup_count: usize,
) -> PResult<Vec<Vec<ChainedRule>>> {
    let mut rule_sets = Vec::with_capacity(offsets.len());
    for set_offset in offsets {
        let Some(set_off) = set_offset else {
            rule_sets.push(Vec::new());
            continue;
        };
        let set_base = base + set_off;
        let mut r = FontReader::new(data);
        r.seek(set_base);
        let rule_count = r.read_u16()? as usize;
        let mut rule_offsets = Vec::with_capacity(rule_count);
        for _ in 0..rule_count {
            rule_offsets.push(set_base + r.read_offset16()?.0 as usize);
        }

        let mut rules = Vec::with_capacity(rule_count);
        for rule_base in rule_offsets {
            let mut r = FontReader::new(data);
            r.seek(rule_base);

            let backtrack_count = r.read_u16()? as usize;
            let mut backtrack = Vec::with_capacity(backtrack_count);
            for _ in 0..backtrack_count {
                backtrack.push(r.read_u16()?);
            }

            let input_count = r.read_u16()? as usize;
            if input_count == 0 {
                return Err(ParseIssue::at(rule_base, "context rule with empty input"));
            }
            let mut input = Vec::with_capacity(input_count - 1);
            for _ in 1..input_count {
                input.push(r.read_u16()?);
            }

            let lookahead_count = r.read_u16()? as usize;
            let mut lookahead = Vec::with_capacity(lookahead_count);
            for _ in 0..lookahead_count {
                lookahead.push(r.read_u16()?);
            }

            let lookup_record_count = r.read_u16()? as usize;
            let lookups =
                parse_sequence_lookups(&mut r, lookup_record_count, rule_base, lookup_count)?;
            rules.push(ChainedRule {
                backtrack,
                input,
                lookahead,
                lookups,
            });
        }
        rule_sets.push(rules);
    }
    Ok(rule_sets)
}

fn parse_chained(data: &[u8], base: usize, lookup_count: usize) -> PResult<ChainedContextSubst> {
    let mut r = FontReader::new(data);
    r.seek(base);
    match r.read_u16()? {
        1 => {
            let coverage_offset = r.read_offset16()?.0 as usize;
            let set_count = r.read_u16()? as usize;
            let offsets = read_set_offsets(&mut r, set_count)?;
            Ok(ChainedContextSubst::Glyphs {
                coverage: Coverage::parse(data, base + coverage_offset)?,
                rule_sets: parse_chained_rule_sets(data, base, offsets, lookup_count)?,
            })
        }
        2 => {
            let coverage_offset = r.read_offset16()?.0 as usize;
            let backtrack_offset = r.read_offset16()?.0 as usize;
            let input_offset = r.read_offset16()?.0 as usize;
            let lookahead_offset = r.read_offset16()?.0 as usize;
            let set_count = r.read_u16()? as usize;
            let offsets = read_set_offsets(&mut r, set_count)?;
            Ok(ChainedContextSubst::Classes {
                coverage: Coverage::parse(data, base + coverage_offset)?,
                backtrack_classes: ClassDef::parse(data, base + backtrack_offset)?,
                input_classes: ClassDef::parse(data, base + input_offset)?,
                lookahead_classes: ClassDef::parse(data, base + lookahead_offset)?,
                rule_sets: parse_chained_rule_sets(data, base, offsets, lookup_count)?,
            })
        }
        3 => {
            let backtrack_count = r.read_u16()? as usize;
            let backtrack = read_coverages(data, base, &mut r, backtrack_count)?;
            let input_count = r.read_u16()? as usize;
            if input_count == 0 {
                return Err(ParseIssue::at(base, "context rule with empty input"));
            }
            let input = read_coverages(data, base, &mut r, input_count)?;
            let lookahead_count = r.read_u16()? as usize;
            let lookahead = read_coverages(data, base, &mut r, lookahead_count)?;
            let lookup_record_count = r.read_u16()? as usize;
            let lookups =
                parse_sequence_lookups(&mut r, lookup_record_count, base, lookup_count)?;
            Ok(ChainedContextSubst::Coverages {
                backtrack,
                input,
                lookahead,
                lookups,
            })
        }
        _ => Err(ParseIssue::at(base, "invalid chained context format")),
    }
}

fn parse_reverse_chain(data: &[u8], base: usize) -> PResult<ReverseChainSubst> {
    let mut r = FontReader::new(data);
    r.seek(base);
    let format = r.read_u16()?;
    if format != 1 {
        return Err(ParseIssue::at(base, "invalid reverse chain format"));
    }
    let coverage_offset = r.read_offset16()?.0 as usize;
    let backtrack_count = r.read_u16()? as usize;
    let backtrack = read_coverages(data, base, &mut r, backtrack_count)?;
    let lookahead_count = r.read_u16()? as usize;
    let lookahead = read_coverages(data, base, &mut r, lookahead_count)?;
    let substitute_count = r.read_u16()? as usize;
    let mut substitutes = Vec::with_capacity(substitute_count);
    for _ in 0..substitute_count {
        substitutes.push(GlyphId(r.read_u16()?));
    }

    Ok(ReverseChainSubst {
        coverage: Coverage::parse(data, base + coverage_offset)?,
        backtrack,
        lookahead,
        substitutes,
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn parse_single_subst_formats() {
        let table = gsub(
            &[(*b"smcp", &[0, 1])],
            &[
                lookup(1, 0, &[single_subst(&[5, 6], &[105, 106])]),
                lookup(1, 0, &[single_subst_delta(&[40], 10)]),
            ],
        );
        let gsub = GsubTable::parse(&table).unwrap();
        assert_eq!(gsub.lookup_count(), 2);

        let SubstSubtable::Single(sub) = &gsub.lookup(0).unwrap().subtables[0] else {
            panic!("expected single substitution");
        };
        assert_eq!(sub.substitute(GlyphId(5)), Some(GlyphId(105)));
        assert_eq!(sub.substitute(GlyphId(7)), None);

        let SubstSubtable::Single(delta) = &gsub.lookup(1).unwrap().subtables[0] else {
            panic!("expected single substitution");
        };
        assert_eq!(delta.substitute(GlyphId(40)), Some(GlyphId(50)));
    }

    #[test]
    fn parse_ligature_sets() {
        // f + i -> fi, f + f + i -> ffi; longer candidates listed first
        let subtable = ligature_subst(&[(&[1, 1, 2], 31), (&[1, 2], 30)]);
        let table = gsub(&[(*b"liga", &[0])], &[lookup(4, 0, &[subtable])]);
        let gsub = GsubTable::parse(&table).unwrap();

        let SubstSubtable::Ligature(lig) = &gsub.lookup(0).unwrap().subtables[0] else {
            panic!("expected ligature substitution");
        };
        let candidates = lig.ligatures(GlyphId(1)).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].glyph, GlyphId(31));
        assert_eq!(candidates[0].components, vec![GlyphId(1), GlyphId(2)]);
        assert_eq!(candidates[1].glyph, GlyphId(30));
        assert_eq!(candidates[1].components, vec![GlyphId(2)]);
        assert!(lig.ligatures(GlyphId(9)).is_none());
    }

    #[test]
    fn parse_extension_indirection() {
        let subtable = extension(1, &single_subst(&[5], &[6]));
        let table = gsub(&[(*b"ccmp", &[0])], &[lookup(7, 0, &[subtable])]);
        let gsub = GsubTable::parse(&table).unwrap();
        let SubstSubtable::Single(sub) = &gsub.lookup(0).unwrap().subtables[0] else {
            panic!("extension should resolve to the wrapped subtable");
        };
        assert_eq!(sub.substitute(GlyphId(5)), Some(GlyphId(6)));
    }

    #[test]
    fn script_and_language_resolution() {
        let table = gsub(
            &[(*b"liga", &[0])],
            &[lookup(1, 0, &[single_subst(&[5], &[6])])],
        );
        let gsub = GsubTable::parse(&table).unwrap();

        // Unknown scripts fall back to DFLT; unknown languages fall back to
        // the script's default language system.
        let lang_sys = gsub.lang_sys(Tag(*b"latn"), Some(Tag(*b"TRK "))).unwrap();
        assert_eq!(lang_sys.feature_indices, vec![0]);
        assert_eq!(lang_sys.required_feature, None);
        assert_eq!(gsub.feature(0).unwrap().tag, Tag(*b"liga"));
    }

    #[test]
    fn rejects_invalid_lookup_type() {
        let table = gsub(&[(*b"liga", &[0])], &[lookup(9, 0, &[vec![0, 0]])]);
        let err = GsubTable::parse(&table).unwrap_err();
        assert!(matches!(
            err,
            crate::TextError::MalformedFont {
                table: "GSUB",
                reason: "invalid lookup type",
                ..
            }
        ));
    }

    #[test]
    fn rejects_out_of_range_feature_lookup() {
        let table = gsub(
            &[(*b"liga", &[3])], // only one lookup exists
            &[lookup(1, 0, &[single_subst(&[5], &[6])])],
        );
        let err = GsubTable::parse(&table).unwrap_err();
        assert!(matches!(
            err,
            crate::TextError::MalformedFont {
                reason: "lookup index out of range",
                ..
            }
        ));
    }

    #[test]
    fn rejects_bad_subtable_format() {
        let table = gsub(&[(*b"liga", &[0])], &[lookup(1, 0, &[vec![0, 9, 0, 0]])]);
        let err = GsubTable::parse(&table).unwrap_err();
        assert!(matches!(
            err,
            crate::TextError::MalformedFont {
                reason: "invalid single substitution format",
                ..
            }
        ));
    }
}
