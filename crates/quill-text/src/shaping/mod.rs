//! Glyph substitution
//!
//! The stream the engine rewrites ([`GlyphStream`]), the parsed GSUB/GDEF
//! table models, the substitution engine itself and the [`Shaper`] that
//! ties them to a font face.

mod common;
mod engine;
mod gdef;
mod gsub;
mod shaper;
mod stream;

pub use common::{ClassDef, Coverage};
pub use engine::{run_gsub, SubstitutionEngine, MAX_NESTED_LOOKUPS};
pub use gdef::{GlyphClass, GlyphClasses};
pub use gsub::{
    AlternateSubst, ChainedContextSubst, ChainedRule, ContextSubst, FeatureRecord, GsubTable,
    LangSys, Ligature, LigatureSubst, Lookup, LookupFlags, MultipleSubst, ReverseChainSubst,
    Script, SequenceLookup, SequenceRule, SingleSubst, SubstSubtable,
};
pub use shaper::Shaper;
pub use stream::GlyphStream;
