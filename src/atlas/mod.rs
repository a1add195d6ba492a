//! MTSDF atlas metadata
//!
//! Models the JSON layout written by `msdf-atlas-gen -json` and the glyph
//! table built from it. Plane bounds and metrics are em-normalized; atlas
//! bounds are texel rectangles in the generated image.

pub mod charset;
pub mod ingest;

pub use charset::Charset;
pub use ingest::{ingest, ingest_all};

use crate::core::errors::{FileContext, PipelineError, PipelineResult};
use kurbo::Rect;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl Bounds {
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YOrigin {
    #[default]
    Bottom,
    Top,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasInfo {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub distance_range: f64,
    #[serde(default)]
    pub size: f64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub y_origin: YOrigin,
}

fn default_em_size() -> f64 {
    1.0
}

fn default_line_height() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsInfo {
    #[serde(default = "default_em_size")]
    pub em_size: f64,
    #[serde(default = "default_line_height")]
    pub line_height: f64,
    #[serde(default)]
    pub ascender: f64,
    #[serde(default)]
    pub descender: f64,
    #[serde(default)]
    pub underline_y: Option<f64>,
    #[serde(default)]
    pub underline_thickness: Option<f64>,
}

impl Default for MetricsInfo {
    fn default() -> Self {
        Self {
            em_size: default_em_size(),
            line_height: default_line_height(),
            ascender: 0.0,
            descender: 0.0,
            underline_y: None,
            underline_thickness: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasGlyph {
    pub unicode: u32,
    #[serde(default)]
    pub advance: f64,
    #[serde(default)]
    pub plane_bounds: Option<Bounds>,
    #[serde(default)]
    pub atlas_bounds: Option<Bounds>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KerningPair {
    pub unicode1: u32,
    pub unicode2: u32,
    pub advance: f64,
}

/// Root of the atlas generator's JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtlasMetadata {
    pub atlas: AtlasInfo,
    #[serde(default)]
    pub metrics: MetricsInfo,
    pub glyphs: Vec<AtlasGlyph>,
    #[serde(default)]
    pub kerning: Vec<KerningPair>,
}

impl AtlasMetadata {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let json = std::fs::read_to_string(path).with_file_context("read", path)?;
        let metadata = Self::from_json(&json).map_err(|e| PipelineError::AtlasParse {
            file: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if metadata.atlas.width == 0 || metadata.atlas.height == 0 {
            return Err(PipelineError::AtlasParse {
                file: path.to_path_buf(),
                reason: "atlas width and height must be non-zero".to_string(),
            });
        }
        tracing::debug!(
            "Loaded atlas metadata from {:?}: {}x{}, {} glyphs",
            path,
            metadata.atlas.width,
            metadata.atlas.height,
            metadata.glyphs.len()
        );
        Ok(metadata)
    }
}

/// Font-level metrics of one atlas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontMetrics {
    pub em_size: f64,
    pub line_height: f64,
    pub ascender: f64,
    pub descender: f64,
    pub distance_range: f64,
    pub font_size: f64,
    pub atlas_width: u32,
    pub atlas_height: u32,
    pub y_origin: YOrigin,
}

impl FontMetrics {
    pub fn from_metadata(metadata: &AtlasMetadata) -> Self {
        Self {
            em_size: metadata.metrics.em_size,
            line_height: metadata.metrics.line_height,
            ascender: metadata.metrics.ascender,
            descender: metadata.metrics.descender,
            distance_range: metadata.atlas.distance_range,
            font_size: metadata.atlas.size,
            atlas_width: metadata.atlas.width,
            atlas_height: metadata.atlas.height,
            y_origin: metadata.atlas.y_origin,
        }
    }
}

/// One ingested glyph; `character` is the unique key within an atlas
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphRecord {
    pub character: char,
    pub advance: f64,
    pub plane_bounds: Option<Bounds>,
    pub atlas_bounds: Option<Bounds>,
}

impl GlyphRecord {
    pub fn codepoint(&self) -> u32 {
        self.character as u32
    }

    /// Whitespace and control glyphs come without bounds and render nothing
    pub fn has_geometry(&self) -> bool {
        self.plane_bounds.is_some() && self.atlas_bounds.is_some()
    }

    /// Texture-space rectangle with V growing downwards
    ///
    /// Atlases generated with a bottom origin are flipped here; this is the
    /// only place the V axis is converted.
    pub fn uv_rect(&self, metrics: &FontMetrics) -> Rect {
        let Some(bounds) = self.atlas_bounds.filter(|_| self.plane_bounds.is_some()) else {
            return Rect::ZERO;
        };
        let width = metrics.atlas_width as f64;
        let height = metrics.atlas_height as f64;
        let (v_top, v_bottom) = match metrics.y_origin {
            YOrigin::Bottom => (1.0 - bounds.top / height, 1.0 - bounds.bottom / height),
            YOrigin::Top => (bounds.top / height, bounds.bottom / height),
        };
        Rect::new(
            bounds.left / width,
            v_top.min(v_bottom),
            bounds.right / width,
            v_top.max(v_bottom),
        )
    }
}

/// Glyph records in charset order plus the atlas metrics
#[derive(Debug, Clone)]
pub struct GlyphTable {
    pub glyphs: Vec<GlyphRecord>,
    pub metrics: FontMetrics,
}

impl GlyphTable {
    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn get(&self, character: char) -> Option<&GlyphRecord> {
        self.glyphs.iter().find(|g| g.character == character)
    }

    pub fn characters(&self) -> Vec<char> {
        self.glyphs.iter().map(|g| g.character).collect()
    }

    /// Glyphs that only contribute metrics
    pub fn metrics_only(&self) -> impl Iterator<Item = &GlyphRecord> {
        self.glyphs.iter().filter(|g| !g.has_geometry())
    }

    pub fn max_advance(&self) -> f64 {
        self.glyphs
            .iter()
            .map(|g| g.advance)
            .fold(0.0_f64, f64::max)
    }
}

/// Human-readable overview of an atlas, printed by `pssgfont summary`
#[derive(Debug, Clone, Serialize)]
pub struct AtlasSummary {
    pub width: u32,
    pub height: u32,
    pub glyph_count: usize,
    pub metrics_only_count: usize,
    pub first_glyph: Option<char>,
    pub first_glyph_uv: Option<Rect>,
}

impl AtlasSummary {
    pub fn of(metadata: &AtlasMetadata) -> Self {
        let metrics = FontMetrics::from_metadata(metadata);
        let first = metadata
            .glyphs
            .first()
            .and_then(|g| char::from_u32(g.unicode).map(|c| ingest::record_from(c, g)));
        Self {
            width: metadata.atlas.width,
            height: metadata.atlas.height,
            glyph_count: metadata.glyphs.len(),
            metrics_only_count: metadata
                .glyphs
                .iter()
                .filter(|g| g.plane_bounds.is_none())
                .count(),
            first_glyph: first.as_ref().map(|g| g.character),
            first_glyph_uv: first
                .as_ref()
                .filter(|g| g.has_geometry())
                .map(|g| g.uv_rect(&metrics)),
        }
    }
}

impl std::fmt::Display for AtlasSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Atlas size: {}x{}", self.width, self.height)?;
        writeln!(
            f,
            "Glyphs: {} ({} metrics only)",
            self.glyph_count, self.metrics_only_count
        )?;
        if let Some(c) = self.first_glyph {
            write!(f, "First glyph: U+{:04X} ({:?})", c as u32, c)?;
            match self.first_glyph_uv {
                Some(uv) => write!(
                    f,
                    ", UV U=[{:.6}, {:.6}] V=[{:.6}, {:.6}]",
                    uv.x0, uv.x1, uv.y0, uv.y1
                )?,
                None => write!(f, ", no atlas bounds (non-rendering glyph)")?,
            }
        }
        Ok(())
    }
}
