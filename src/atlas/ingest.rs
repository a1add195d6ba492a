//! Atlas ingest: metadata + charset -> glyph table

use super::{AtlasGlyph, AtlasMetadata, Charset, FontMetrics, GlyphRecord, GlyphTable};
use crate::core::errors::{PipelineError, PipelineResult};
use std::collections::HashMap;

pub(crate) fn record_from(character: char, glyph: &AtlasGlyph) -> GlyphRecord {
    GlyphRecord {
        character,
        advance: glyph.advance,
        plane_bounds: glyph.plane_bounds,
        atlas_bounds: glyph.atlas_bounds,
    }
}

/// Index generator glyphs by character; the first occurrence wins
fn index_glyphs(metadata: &AtlasMetadata) -> HashMap<char, &AtlasGlyph> {
    let mut index = HashMap::with_capacity(metadata.glyphs.len());
    for glyph in &metadata.glyphs {
        match char::from_u32(glyph.unicode) {
            Some(c) => {
                index.entry(c).or_insert(glyph);
            }
            None => tracing::warn!(
                "Ignoring atlas glyph with invalid codepoint {:#X}",
                glyph.unicode
            ),
        }
    }
    index
}

/// Build the glyph table for `charset`, in charset order
///
/// Every requested character absent from the generator output is reported
/// in one `MissingGlyph` error.
pub fn ingest(metadata: &AtlasMetadata, charset: &Charset) -> PipelineResult<GlyphTable> {
    let index = index_glyphs(metadata);

    let mut glyphs = Vec::with_capacity(charset.len());
    let mut missing = Vec::new();
    for &c in charset.chars() {
        match index.get(&c) {
            Some(glyph) => glyphs.push(record_from(c, glyph)),
            None => missing.push(c),
        }
    }

    if !missing.is_empty() {
        return Err(PipelineError::MissingGlyph { missing });
    }

    tracing::info!("Ingested {} glyphs", glyphs.len());
    Ok(GlyphTable {
        glyphs,
        metrics: FontMetrics::from_metadata(metadata),
    })
}

/// Every glyph the generator produced, in generator order
pub fn ingest_all(metadata: &AtlasMetadata) -> PipelineResult<GlyphTable> {
    let charset = Charset::from_chars(
        metadata
            .glyphs
            .iter()
            .filter_map(|g| char::from_u32(g.unicode)),
    );
    ingest(metadata, &charset)
}
