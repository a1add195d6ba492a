//! Coordinate extraction
//!
//! Follows the reference chain the engine itself walks for a glyph:
//! render node (id = codepoint) -> stream instance -> data source -> render
//! stream -> datablock, then reads the glyph and font metrics to move the
//! stored top-aligned quad into the line frame.

use super::{CoordinateRecord, CoordinateSet, FontFrame, LibrarySet, Origin};
use crate::core::errors::{PipelineError, PipelineResult};
use crate::library::schema::VertexLayout;
use crate::library::synth::{decode_vertices, QuadVertex};
use crate::library::{EngineScale, LibraryKind};
use crate::pssg::number::decode_hex;
use crate::pssg::Element;
use kurbo::{Point, Rect, Vec2};
use std::collections::HashMap;

/// Lookup tables over one library set
struct Index<'a> {
    ids: HashMap<&'a str, &'a Element>,
    nodes: HashMap<&'a str, &'a Element>,
    glyph_metrics: HashMap<u32, &'a Element>,
    scale: EngineScale,
    frame: FontFrame,
}

fn corrupt(libraries: &LibrarySet, reason: impl Into<String>) -> PipelineError {
    PipelineError::CorruptTemplate {
        file: libraries.source.clone(),
        reason: reason.into(),
    }
}

fn number(element: &Element, name: &str) -> Option<f64> {
    element.attr(name)?.trim().parse().ok()
}

impl<'a> Index<'a> {
    fn build(libraries: &'a LibrarySet) -> PipelineResult<Self> {
        let library = |kind: LibraryKind| {
            libraries
                .library(kind)
                .ok_or_else(|| corrupt(libraries, format!("no {kind} library")))
        };

        let font = library(LibraryKind::FontMetrics)?
            .find(|el| el.name == "NEFONTMETRICS")
            .ok_or_else(|| corrupt(libraries, "no NEFONTMETRICS entry"))?;
        let scale = number(font, "scale")
            .and_then(EngineScale::new)
            .ok_or_else(|| corrupt(libraries, "NEFONTMETRICS@scale is not a positive number"))?;
        let frame = FontFrame {
            scale: scale.value(),
            ascender: scale.to_em(number(font, "ascender").unwrap_or(0.0)),
            descender: scale.to_em(number(font, "descender").unwrap_or(0.0)),
        };

        let mut ids = HashMap::new();
        for kind in LibraryKind::ALL {
            if let Some(lib) = libraries.library(kind) {
                for element in lib.descendants() {
                    if let Some(id) = element.id() {
                        ids.insert(id, element);
                    }
                }
            }
        }

        let nodes = library(LibraryKind::Node)?
            .descendants()
            .into_iter()
            .filter(|el| el.name == "RENDERNODE")
            .filter_map(|el| Some((el.id()?, el)))
            .collect();

        let glyph_metrics = library(LibraryKind::GlyphMetrics)?
            .children_named("NEGLYPHMETRICS")
            .filter_map(|el| Some((number(el, "codePoint")? as u32, el)))
            .collect();

        Ok(Self {
            ids,
            nodes,
            glyph_metrics,
            scale,
            frame,
        })
    }

    fn target(&self, element: &Element, field: &str) -> Result<&'a Element, String> {
        let value = element
            .attr(field)
            .ok_or_else(|| format!("<{}> has no {field}", element.name))?;
        let id = value.strip_prefix('#').unwrap_or(value);
        self.ids
            .get(id)
            .copied()
            .ok_or_else(|| format!("{field} {value} does not resolve"))
    }

    fn vertices(&self, character: char) -> Result<Vec<QuadVertex>, String> {
        let codepoint = (character as u32).to_string();
        let node = self
            .nodes
            .get(codepoint.as_str())
            .ok_or_else(|| "no render node".to_string())?;
        let instance = node
            .child("RENDERSTREAMINSTANCE")
            .ok_or_else(|| "render node has no stream instance".to_string())?;
        let source = self.target(instance, "indices")?;
        let stream = source
            .child("RENDERSTREAM")
            .ok_or_else(|| "data source has no render stream".to_string())?;
        let block = self.target(stream, "dataBlock")?;

        let layout = VertexLayout::from_datablock(block).map_err(|e| format!("datablock lacks {e}"))?;
        let data = block
            .child("DATABLOCKDATA")
            .and_then(|data| data.text.as_deref())
            .ok_or_else(|| "datablock has no data".to_string())?;
        let bytes = decode_hex(data).map_err(|e| e.to_string())?;
        decode_vertices(&bytes, &layout)
            .filter(|vertices| !vertices.is_empty())
            .ok_or_else(|| "vertex data does not match the stream layout".to_string())
    }

    fn record(&self, character: char, origin: Origin) -> Result<CoordinateRecord, String> {
        let stored = self.vertices(character)?;
        let metrics = self
            .glyph_metrics
            .get(&(character as u32))
            .ok_or_else(|| "no glyph metrics".to_string())?;
        let em = |name: &str| self.scale.to_em(number(metrics, name).unwrap_or(0.0));
        let bearing = Vec2::new(em("horizontalBearing"), em("verticalBearing"));

        // storage keeps the glyph top at y = 0; the line frame puts the
        // ascender line there instead
        let shift = Vec2::new(0.0, bearing.y - self.frame.ascender);
        let vertices: Vec<QuadVertex> = stored
            .iter()
            .map(|v| QuadVertex {
                position: v.position + shift,
                uv: v.uv,
            })
            .collect();

        let uv = vertices
            .iter()
            .skip(1)
            .fold(Rect::from_points(vertices[0].uv, vertices[0].uv), |rect, v| {
                rect.union_pt(v.uv)
            });

        Ok(CoordinateRecord {
            character,
            origin,
            position: vertices.first().map(|v| v.position).unwrap_or(Point::ZERO),
            uv,
            advance: em("advanceWidth"),
            bearing,
            vertices,
        })
    }
}

/// Extract every requested character; characters that cannot be resolved
/// are returned separately
pub fn extract_available(
    libraries: &LibrarySet,
    chars: &[char],
    origin: Origin,
) -> PipelineResult<(CoordinateSet, Vec<char>)> {
    let index = Index::build(libraries)?;
    let mut records = Vec::with_capacity(chars.len());
    let mut missing = Vec::new();
    for &c in chars {
        match index.record(c, origin) {
            Ok(record) => records.push(record),
            Err(reason) => {
                tracing::debug!("U+{:04X} not extracted from {} libraries: {}", c as u32, origin, reason);
                missing.push(c);
            }
        }
    }
    Ok((
        CoordinateSet {
            origin,
            frame: index.frame,
            records,
        },
        missing,
    ))
}

/// Extract every requested character or fail listing all that are missing
pub fn extract(libraries: &LibrarySet, chars: &[char], origin: Origin) -> PipelineResult<CoordinateSet> {
    let (set, missing) = extract_available(libraries, chars, origin)?;
    if !missing.is_empty() {
        return Err(PipelineError::CharacterNotFound { origin, missing });
    }
    tracing::debug!("Extracted {} glyphs from {} libraries", set.records.len(), origin);
    Ok(set)
}
