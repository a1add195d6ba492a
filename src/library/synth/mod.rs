//! Library synthesizers
//!
//! One synthesizer per library kind. Each reads the glyph table and the
//! validated template shape and emits a fragment whose ids and references
//! are placeholders; final ids only exist after the merge.

mod geometry;
mod metrics;
mod nodes;
mod shaders;

pub use geometry::{
    decode_vertices, encode_vertices, quad_vertices, QuadVertex, RenderInterfaceBoundSynthesizer,
    SegmentSetSynthesizer, QUAD_VERTICES,
};
pub use metrics::{FontMetricsSynthesizer, GlyphMetricsSynthesizer};
pub use nodes::NodeSynthesizer;
pub use shaders::{ShaderGroupSynthesizer, ShaderInstanceSynthesizer};

use super::{FragmentSet, LibraryFragment, LibraryKind, LibrarySchema, TemplateShape};
use crate::atlas::GlyphTable;
use crate::core::errors::PipelineResult;
use crate::template::ReferenceTemplate;

/// Engine-visible names of the font's shared entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontNaming {
    /// Shader instance id, e.g. `din_cnd_bold_msdf_0`
    pub font_name: String,
    /// Texture id, the atlas image file name
    pub texture_name: String,
}

impl FontNaming {
    pub fn new(font_name: impl Into<String>) -> Self {
        let font_name = font_name.into();
        let texture_name = format!("{font_name}.png");
        Self {
            font_name,
            texture_name,
        }
    }

    pub fn with_texture_name(mut self, texture_name: impl Into<String>) -> Self {
        self.texture_name = texture_name.into();
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub glyphs: &'a GlyphTable,
    pub shape: &'a TemplateShape,
    pub naming: &'a FontNaming,
}

pub trait Synthesizer {
    fn kind(&self) -> LibraryKind;
    fn synthesize(&self, input: &SynthesisInput<'_>) -> PipelineResult<LibraryFragment>;
}

/// All seven synthesizers
pub fn synthesizers() -> Vec<Box<dyn Synthesizer>> {
    vec![
        Box::new(ShaderGroupSynthesizer),
        Box::new(ShaderInstanceSynthesizer),
        Box::new(RenderInterfaceBoundSynthesizer),
        Box::new(SegmentSetSynthesizer),
        Box::new(GlyphMetricsSynthesizer),
        Box::new(FontMetricsSynthesizer),
        Box::new(NodeSynthesizer),
    ]
}

/// Validated template shape plus the seven fragments built against it
#[derive(Debug, Clone)]
pub struct SynthesizedFont {
    pub shape: TemplateShape,
    pub fragments: FragmentSet,
}

/// Validate the template once, then run every synthesizer
///
/// The first failing synthesizer aborts the run; no partial fragment set is
/// returned.
pub fn synthesize_all(
    glyphs: &GlyphTable,
    template: &ReferenceTemplate,
    schema: &LibrarySchema,
    naming: &FontNaming,
) -> PipelineResult<SynthesizedFont> {
    let shape = schema.validate(template)?;
    let input = SynthesisInput {
        glyphs,
        shape: &shape,
        naming,
    };

    let mut fragments = FragmentSet::new();
    for synthesizer in synthesizers() {
        let fragment = synthesizer.synthesize(&input)?;
        tracing::debug!(
            "Synthesized {} library: {} entries",
            fragment.kind,
            fragment.entries.len()
        );
        fragments.insert(synthesizer.kind(), fragment);
    }
    tracing::info!(
        "Synthesized {} libraries for {} glyphs",
        fragments.len(),
        glyphs.len()
    );

    Ok(SynthesizedFont { shape, fragments })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::atlas::{ingest_all, AtlasMetadata};

    pub fn table(json: &str) -> GlyphTable {
        ingest_all(&AtlasMetadata::from_json(json).unwrap()).unwrap()
    }

    pub fn shape() -> TemplateShape {
        LibrarySchema::standard()
            .validate(&ReferenceTemplate::bundled().unwrap())
            .unwrap()
    }

    pub fn run(synthesizer: &dyn Synthesizer, json: &str) -> LibraryFragment {
        let glyphs = table(json);
        let shape = shape();
        let naming = FontNaming::new("test_font");
        synthesizer
            .synthesize(&SynthesisInput {
                glyphs: &glyphs,
                shape: &shape,
                naming: &naming,
            })
            .unwrap()
    }
}
