use super::{SynthesisInput, Synthesizer};
use crate::atlas::GlyphRecord;
use crate::core::errors::PipelineResult;
use crate::library::{EngineScale, Entry, LibraryFragment, LibraryKind, LocalId, Placeholder, Role};

/// Engine name of the single font metrics object
pub const FONT_METRICS_NAME: &str = "NeFontMetricsObj";

pub(crate) fn glyph_metrics_id(character: char) -> LocalId {
    LocalId::named(
        Placeholder::glyph(Role::GlyphMetrics, character),
        format!("glyphMetrics{}", character as u32),
    )
}

fn glyph_metrics(glyph: &GlyphRecord, scale: EngineScale) -> Entry {
    let entry = Entry::new("NEGLYPHMETRICS").attr("advanceWidth", scale.to_engine(glyph.advance));
    let entry = match glyph.plane_bounds {
        Some(bounds) => entry
            .attr("horizontalBearing", scale.to_engine(bounds.left))
            .attr("verticalBearing", scale.to_engine(bounds.top))
            .attr("physicalWidth", scale.to_engine(bounds.width()))
            .attr("physicalHeight", scale.to_engine(bounds.height())),
        None => entry
            .attr("horizontalBearing", 0)
            .attr("verticalBearing", 0)
            .attr("physicalWidth", 0)
            .attr("physicalHeight", 0),
    };
    entry
        .attr("codePoint", glyph.codepoint())
        .with_id(glyph_metrics_id(glyph.character))
}

/// `NEGLYPHMETRICS`: one entry per glyph
pub struct GlyphMetricsSynthesizer;

impl Synthesizer for GlyphMetricsSynthesizer {
    fn kind(&self) -> LibraryKind {
        LibraryKind::GlyphMetrics
    }

    fn synthesize(&self, input: &SynthesisInput<'_>) -> PipelineResult<LibraryFragment> {
        let mut fragment = LibraryFragment::new(self.kind());
        for glyph in &input.glyphs.glyphs {
            fragment.push(glyph_metrics(glyph, input.shape.scale));
        }
        Ok(fragment)
    }
}

/// `NEFONTMETRICS`: the font-wide object plus a reference to every glyph's
/// metrics entry
pub struct FontMetricsSynthesizer;

impl Synthesizer for FontMetricsSynthesizer {
    fn kind(&self) -> LibraryKind {
        LibraryKind::FontMetrics
    }

    fn synthesize(&self, input: &SynthesisInput<'_>) -> PipelineResult<LibraryFragment> {
        let scale = input.shape.scale;
        let metrics = &input.glyphs.metrics;

        let mut font = Entry::new("NEFONTMETRICS")
            .attr("scale", scale.value())
            .attr("ascender", scale.to_engine(metrics.ascender))
            .attr("descender", scale.to_engine(metrics.descender))
            .attr("maximumAdvanceWidth", scale.to_engine(input.glyphs.max_advance()))
            .attr("numCharacters", input.glyphs.len())
            .attr("hasKerningData", 0)
            .with_id(LocalId::named(
                Placeholder::shared(Role::FontMetrics),
                FONT_METRICS_NAME,
            ));
        for glyph in &input.glyphs.glyphs {
            font = font.child(Entry::new("NEGLYPHMETRICSREF").reference(
                "glyphMetricsRef",
                Placeholder::glyph(Role::GlyphMetrics, glyph.character),
            ));
        }

        let mut fragment = LibraryFragment::new(self.kind());
        fragment.push(font);
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::run;
    use super::*;
    use crate::atlas::test_support::{ATLAS_A, ATLAS_ABC};
    use crate::library::AttrValue;

    #[test]
    fn test_glyph_metrics_for_scenario_a() {
        let fragment = run(&GlyphMetricsSynthesizer, ATLAS_A);
        assert_eq!(fragment.entries.len(), 1);
        let entry = &fragment.entries[0];
        assert_eq!(entry.literal("advanceWidth"), Some("600"));
        assert_eq!(entry.literal("horizontalBearing"), Some("0"));
        assert_eq!(entry.literal("verticalBearing"), Some("700"));
        assert_eq!(entry.literal("physicalWidth"), Some("500"));
        assert_eq!(entry.literal("physicalHeight"), Some("700"));
        assert_eq!(entry.literal("codePoint"), Some("65"));
        let id = entry.id.as_ref().unwrap();
        assert_eq!(id.engine_name.as_deref(), Some("glyphMetrics65"));
    }

    #[test]
    fn test_metrics_only_glyph_has_zero_geometry() {
        let fragment = run(&GlyphMetricsSynthesizer, ATLAS_ABC);
        let space = &fragment.entries[0];
        assert_eq!(space.literal("codePoint"), Some("32"));
        assert_eq!(space.literal("advanceWidth"), Some("250"));
        assert_eq!(space.literal("physicalWidth"), Some("0"));
        assert_eq!(space.literal("verticalBearing"), Some("0"));
    }

    #[test]
    fn test_font_metrics_reference_every_glyph() {
        let fragment = run(&FontMetricsSynthesizer, ATLAS_ABC);
        assert_eq!(fragment.entries.len(), 1);
        let font = &fragment.entries[0];
        assert_eq!(font.literal("scale"), Some("1000"));
        assert_eq!(font.literal("ascender"), Some("900"));
        assert_eq!(font.literal("descender"), Some("-250"));
        assert_eq!(font.literal("maximumAdvanceWidth"), Some("620"));
        assert_eq!(font.literal("numCharacters"), Some("4"));

        let targets: Vec<Placeholder> = font
            .children
            .iter()
            .filter_map(|child| match &child.attributes[0].1 {
                AttrValue::Ref(target) => Some(*target),
                AttrValue::Literal(_) => None,
            })
            .collect();
        assert_eq!(
            targets,
            " BAC"
                .chars()
                .map(|c| Placeholder::glyph(Role::GlyphMetrics, c))
                .collect::<Vec<_>>()
        );
    }
}
