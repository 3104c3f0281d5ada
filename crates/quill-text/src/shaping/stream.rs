//! Glyph substitution stream
//!
//! The mutable token stream the substitution engine rewrites. Each slot is
//! keyed by the original codepoint offset of the run; ligature collapses
//! remove offsets without renumbering the survivors, so dense position
//! access goes through an offset vector while slot storage is an offset map.

use std::collections::{HashMap, HashSet};

use smallvec::SmallVec;

use crate::font::{GlyphId, Tag};

#[derive(Debug, Clone)]
struct Slot {
    codepoint: char,
    glyphs: SmallVec<[GlyphId; 2]>,
}

/// Position-indexed stream of resolved glyphs for one text run.
///
/// Offsets are strictly increasing and stable: a merged region keeps the
/// offset of its first slot, deletions never renumber. Index/offset
/// violations are programmer errors and panic.
#[derive(Debug, Clone, Default)]
pub struct GlyphStream {
    offsets: Vec<u32>,
    slots: HashMap<u32, Slot>,
    features: HashMap<u32, HashSet<Tag>>,
}

impl GlyphStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Append a slot. `offset` must exceed every offset already present.
    pub fn add(&mut self, glyph: GlyphId, codepoint: char, offset: u32) {
        if let Some(&last) = self.offsets.last() {
            assert!(
                offset > last,
                "stream offsets must be strictly increasing: {offset} after {last}"
            );
        }
        self.offsets.push(offset);
        self.slots.insert(
            offset,
            Slot {
                codepoint,
                glyphs: SmallVec::from_slice(&[glyph]),
            },
        );
    }

    fn slot(&self, index: usize) -> &Slot {
        let offset = self.offsets[index];
        &self.slots[&offset]
    }

    fn slot_mut(&mut self, index: usize) -> &mut Slot {
        let offset = self.offsets[index];
        self.slots.get_mut(&offset).expect("offset without slot")
    }

    /// Glyphs of the slot at dense position `index`.
    pub fn glyphs(&self, index: usize) -> &[GlyphId] {
        &self.slot(index).glyphs
    }

    /// First glyph of a slot; what coverage tests look at.
    pub fn first_glyph(&self, index: usize) -> GlyphId {
        self.slot(index).glyphs[0]
    }

    /// Codepoint, original offset and glyphs of the slot at `index`.
    pub fn cp_and_glyphs(&self, index: usize) -> (char, u32, &[GlyphId]) {
        let offset = self.offsets[index];
        let slot = &self.slots[&offset];
        (slot.codepoint, offset, &slot.glyphs)
    }

    /// Look a slot up by its original offset. Offsets consumed by a
    /// ligature collapse are gone and return `None`.
    pub fn at_offset(&self, offset: u32) -> Option<(char, &[GlyphId])> {
        let slot = self.slots.get(&offset)?;
        Some((slot.codepoint, &slot.glyphs))
    }

    /// Rewrite a slot to a single glyph.
    pub fn replace(&mut self, index: usize, glyph: GlyphId) {
        let glyphs = &mut self.slot_mut(index).glyphs;
        glyphs.clear();
        glyphs.push(glyph);
    }

    /// Collapse `count` consecutive slots into one carrying `glyph`.
    /// The first slot's offset survives; the rest are discarded.
    pub fn merge(&mut self, index: usize, count: usize, glyph: GlyphId) {
        assert!(count >= 1, "merge needs at least one slot");
        assert!(
            index + count <= self.offsets.len(),
            "merge of {count} slots at {index} exceeds stream length {}",
            self.offsets.len()
        );
        for offset in self.offsets.drain(index + 1..index + count) {
            self.slots.remove(&offset);
            self.features.remove(&offset);
        }
        self.replace(index, glyph);
    }

    /// Expand a slot to carry an ordered glyph sequence. The position count
    /// is unchanged; a slot never holds an empty sequence.
    pub fn expand(&mut self, index: usize, glyphs: &[GlyphId]) {
        assert!(!glyphs.is_empty(), "a slot cannot hold zero glyphs");
        self.slot_mut(index).glyphs = SmallVec::from_slice(glyphs);
    }

    /// Request a feature for the slot at `index`.
    pub fn add_feature(&mut self, index: usize, tag: Tag) {
        let offset = self.offsets[index];
        self.features.entry(offset).or_default().insert(tag);
    }

    pub fn has_feature(&self, index: usize, tag: Tag) -> bool {
        let offset = self.offsets[index];
        self.features
            .get(&offset)
            .is_some_and(|set| set.contains(&tag))
    }

    /// Features requested for the slot at `index`.
    pub fn features(&self, index: usize) -> impl Iterator<Item = Tag> + '_ {
        let offset = self.offsets[index];
        self.features
            .get(&offset)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn clear(&mut self) {
        self.offsets.clear();
        self.slots.clear();
        self.features.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_of(glyphs: &[(u16, char)]) -> GlyphStream {
        let mut stream = GlyphStream::new();
        for (i, &(gid, cp)) in glyphs.iter().enumerate() {
            stream.add(GlyphId(gid), cp, i as u32);
        }
        stream
    }

    fn offsets(stream: &GlyphStream) -> Vec<u32> {
        (0..stream.len())
            .map(|i| stream.cp_and_glyphs(i).1)
            .collect()
    }

    #[test]
    fn add_and_lookup() {
        let stream = stream_of(&[(1, 'a'), (2, 'b')]);
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.glyphs(0), &[GlyphId(1)]);
        assert_eq!(stream.cp_and_glyphs(1), ('b', 1, &[GlyphId(2)][..]));
        assert_eq!(stream.at_offset(0), Some(('a', &[GlyphId(1)][..])));
        assert_eq!(stream.at_offset(7), None);
    }

    #[test]
    #[should_panic(expected = "strictly increasing")]
    fn duplicate_offset_panics() {
        let mut stream = GlyphStream::new();
        stream.add(GlyphId(1), 'a', 5);
        stream.add(GlyphId(2), 'b', 5);
    }

    #[test]
    fn merge_keeps_first_offset() {
        let mut stream = stream_of(&[(1, 'f'), (2, 'f'), (3, 'i'), (4, 'x')]);
        stream.merge(1, 2, GlyphId(99));
        assert_eq!(stream.len(), 3);
        assert_eq!(offsets(&stream), vec![0, 1, 3]);
        assert_eq!(stream.glyphs(1), &[GlyphId(99)]);
        // The consumed offset is gone, not renumbered.
        assert_eq!(stream.at_offset(2), None);
        assert_eq!(stream.at_offset(3), Some(('x', &[GlyphId(4)][..])));
    }

    #[test]
    fn expand_keeps_position_count() {
        let mut stream = stream_of(&[(7, 'ﬃ')]);
        stream.expand(0, &[GlyphId(10), GlyphId(10), GlyphId(11)]);
        assert_eq!(stream.len(), 1);
        assert_eq!(
            stream.glyphs(0),
            &[GlyphId(10), GlyphId(10), GlyphId(11)]
        );
    }

    #[test]
    #[should_panic(expected = "zero glyphs")]
    fn expand_to_empty_panics() {
        let mut stream = stream_of(&[(1, 'a')]);
        stream.expand(0, &[]);
    }

    #[test]
    fn offsets_stay_monotonic_through_mutation() {
        let mut stream = stream_of(&[(1, 'a'), (2, 'b'), (3, 'c'), (4, 'd'), (5, 'e')]);
        stream.merge(0, 2, GlyphId(20));
        stream.expand(1, &[GlyphId(30), GlyphId(31)]);
        stream.merge(1, 3, GlyphId(40));
        let offs = offsets(&stream);
        assert!(offs.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(offs, vec![0, 2]);
        assert_eq!(stream.len(), 2);
    }

    #[test]
    fn merged_slot_drops_features() {
        let liga = Tag(*b"liga");
        let mut stream = stream_of(&[(1, 'a'), (2, 'b')]);
        stream.add_feature(1, liga);
        assert!(stream.has_feature(1, liga));
        stream.merge(0, 2, GlyphId(9));
        assert!(!stream.has_feature(0, liga));
        assert_eq!(stream.features(0).count(), 0);
    }

    #[test]
    fn clear_empties_everything() {
        let mut stream = stream_of(&[(1, 'a')]);
        stream.add_feature(0, Tag(*b"kern"));
        stream.clear();
        assert!(stream.is_empty());
        assert_eq!(stream.at_offset(0), None);
        // Offsets restart from scratch after a clear.
        stream.add(GlyphId(3), 'z', 0);
        assert_eq!(stream.len(), 1);
    }
}
