//! Glyph quads: vertex datablocks and the segment sets that draw them

use super::{SynthesisInput, Synthesizer};
use crate::atlas::{FontMetrics, GlyphRecord};
use crate::core::errors::PipelineResult;
use crate::library::schema::VertexLayout;
use crate::library::{Entry, LibraryFragment, LibraryKind, LocalId, Placeholder, Role};
use crate::pssg::number::{encode_hex, read_f32_be, write_f32_be};
use kurbo::Point;
use serde::Serialize;

/// Vertices per glyph quad
pub const QUAD_VERTICES: usize = 4;

/// Stored vertex: position in the top-aligned glyph frame plus texture UV
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct QuadVertex {
    pub position: Point,
    pub uv: Point,
}

/// Quad corners in storage order: top-left, bottom-left, bottom-right,
/// top-right. The glyph's top edge sits at y = 0, so the bottom edge is at
/// `bottom - top`.
pub fn quad_vertices(glyph: &GlyphRecord, metrics: &FontMetrics) -> [QuadVertex; QUAD_VERTICES] {
    let Some(bounds) = glyph.plane_bounds.filter(|_| glyph.has_geometry()) else {
        return [QuadVertex::default(); QUAD_VERTICES];
    };
    let uv = glyph.uv_rect(metrics);
    let bottom = bounds.bottom - bounds.top;
    [
        QuadVertex {
            position: Point::new(bounds.left, 0.0),
            uv: Point::new(uv.x0, uv.y0),
        },
        QuadVertex {
            position: Point::new(bounds.left, bottom),
            uv: Point::new(uv.x0, uv.y1),
        },
        QuadVertex {
            position: Point::new(bounds.right, bottom),
            uv: Point::new(uv.x1, uv.y1),
        },
        QuadVertex {
            position: Point::new(bounds.right, 0.0),
            uv: Point::new(uv.x1, uv.y0),
        },
    ]
}

/// Interleave vertices into a big-endian buffer; streams other than
/// position and UV are left zeroed
pub fn encode_vertices(vertices: &[QuadVertex], layout: &VertexLayout) -> Vec<u8> {
    let mut buffer = vec![0u8; layout.stride * vertices.len()];
    for (index, vertex) in vertices.iter().enumerate() {
        let base = index * layout.stride;
        let position = base + layout.position_offset;
        write_f32_be(&mut buffer, position, vertex.position.x);
        write_f32_be(&mut buffer, position + 4, vertex.position.y);
        write_f32_be(&mut buffer, position + 8, 0.0);
        let uv = base + layout.uv_offset;
        write_f32_be(&mut buffer, uv, vertex.uv.x);
        write_f32_be(&mut buffer, uv + 4, vertex.uv.y);
    }
    buffer
}

/// Inverse of [`encode_vertices`]; `None` when the buffer is not a whole
/// number of vertices
pub fn decode_vertices(bytes: &[u8], layout: &VertexLayout) -> Option<Vec<QuadVertex>> {
    if layout.stride == 0 || bytes.len() % layout.stride != 0 {
        return None;
    }
    bytes
        .chunks(layout.stride)
        .map(|vertex| {
            let position = layout.position_offset;
            let uv = layout.uv_offset;
            Some(QuadVertex {
                position: Point::new(
                    read_f32_be(vertex, position)?,
                    read_f32_be(vertex, position + 4)?,
                ),
                uv: Point::new(read_f32_be(vertex, uv)?, read_f32_be(vertex, uv + 4)?),
            })
        })
        .collect()
}

fn datablock(glyph: &GlyphRecord, metrics: &FontMetrics, layout: &VertexLayout) -> Entry {
    let vertices = quad_vertices(glyph, metrics);
    let mut block = Entry::new("DATABLOCK")
        .attr("streamCount", layout.streams.len())
        .attr("size", layout.stride * QUAD_VERTICES)
        .attr("elementCount", QUAD_VERTICES)
        .with_id(LocalId::anonymous(Placeholder::glyph(
            Role::DataBlock,
            glyph.character,
        )));
    for stream in &layout.streams {
        block = block.child(
            Entry::new("DATABLOCKSTREAM")
                .attr("renderType", &stream.render_type)
                .attr("dataType", &stream.data_type)
                .attr("offset", stream.offset)
                .attr("stride", layout.stride),
        );
    }
    block.child(Entry::new("DATABLOCKDATA").text(encode_hex(&encode_vertices(&vertices, layout))))
}

/// The engine's 4x4 DXT1 stand-in; the real atlas ships as a DDS file
fn texture(name: &str) -> Entry {
    const ATTRIBUTES: [(&str, &str); 17] = [
        ("width", "4"),
        ("height", "4"),
        ("texelFormat", "dxt1"),
        ("transient", "0"),
        ("wrapS", "1"),
        ("wrapT", "1"),
        ("wrapR", "1"),
        ("minFilter", "5"),
        ("magFilter", "1"),
        ("gammaRemapR", "0"),
        ("gammaRemapG", "0"),
        ("gammaRemapB", "0"),
        ("gammaRemapA", "0"),
        ("automipmap", "0"),
        ("numberMipMapLevels", "2"),
        ("arraySize", "1"),
        ("imageBlockCount", "1"),
    ];
    let entry = ATTRIBUTES
        .iter()
        .fold(Entry::new("TEXTURE"), |entry, (key, value)| entry.attr(key, value));
    entry
        .with_id(LocalId::named(Placeholder::shared(Role::Texture), name))
        .child(
            Entry::new("TEXTUREIMAGEBLOCK")
                .attr("typename", "Raw")
                .attr("size", 24)
                .child(Entry::new("TEXTUREIMAGEBLOCKDATA").text(encode_hex(&[0u8; 24]))),
        )
}

/// `RENDERINTERFACEBOUND`: a vertex datablock per glyph and the shared
/// texture
pub struct RenderInterfaceBoundSynthesizer;

impl Synthesizer for RenderInterfaceBoundSynthesizer {
    fn kind(&self) -> LibraryKind {
        LibraryKind::RenderInterfaceBound
    }

    fn synthesize(&self, input: &SynthesisInput<'_>) -> PipelineResult<LibraryFragment> {
        let mut fragment = LibraryFragment::new(self.kind());
        for glyph in &input.glyphs.glyphs {
            fragment.push(datablock(
                glyph,
                &input.glyphs.metrics,
                &input.shape.vertex,
            ));
        }
        fragment.push(texture(&input.naming.texture_name));
        Ok(fragment)
    }
}

/// `SEGMENTSET`: per glyph, the index topology copied from the template and
/// one render stream per declared vertex stream
pub struct SegmentSetSynthesizer;

impl Synthesizer for SegmentSetSynthesizer {
    fn kind(&self) -> LibraryKind {
        LibraryKind::SegmentSet
    }

    fn synthesize(&self, input: &SynthesisInput<'_>) -> PipelineResult<LibraryFragment> {
        let segment = &input.shape.segment;
        let streams = &input.shape.vertex.streams;
        let index_data = format!(
            "\n{} ",
            segment
                .indices
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        );
        let maximum_index = segment.indices.iter().copied().max().unwrap_or(0);

        let mut fragment = LibraryFragment::new(self.kind());
        for glyph in &input.glyphs.glyphs {
            let c = glyph.character;
            let index_source = Entry::new("RENDERINDEXSOURCE")
                .attr("primitive", &segment.index_primitive)
                .attr("maximumIndex", maximum_index)
                .attr("format", &segment.index_format)
                .attr("count", segment.indices.len())
                .with_id(LocalId::anonymous(Placeholder::glyph(Role::IndexSource, c)))
                .child(Entry::new("INDEXSOURCEDATA").text(index_data.clone()));

            let mut source = Entry::new("RENDERDATASOURCE")
                .attr("streamCount", streams.len())
                .attr("primitive", &segment.source_primitive)
                .with_id(LocalId::anonymous(Placeholder::glyph(Role::DataSource, c)))
                .child(index_source);
            for slot in 0..streams.len() {
                source = source.child(
                    Entry::new("RENDERSTREAM")
                        .reference("dataBlock", Placeholder::glyph(Role::DataBlock, c))
                        .attr("subStream", slot)
                        .with_id(LocalId::anonymous(
                            Placeholder::glyph(Role::Stream, c).with_slot(slot as u16),
                        )),
                );
            }

            fragment.push(
                Entry::new("SEGMENTSET")
                    .attr("segmentCount", 1)
                    .with_id(LocalId::anonymous(Placeholder::glyph(Role::SegmentSet, c)))
                    .child(source),
            );
        }
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{run, shape, table};
    use super::*;
    use crate::atlas::test_support::{ATLAS_A, ATLAS_ABC};
    use crate::pssg::number::decode_hex;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_quad_is_top_aligned() {
        let glyphs = table(ATLAS_A);
        let quad = quad_vertices(&glyphs.glyphs[0], &glyphs.metrics);
        assert!(close(quad[0].position.y, 0.0));
        assert!(close(quad[1].position.y, -0.7));
        assert!(close(quad[2].position.x, 0.5));
        assert!(close(quad[0].uv.y, 0.3));
        assert!(close(quad[1].uv.y, 1.0));
        assert!(close(quad[3].uv.x, 0.5));
    }

    #[test]
    fn test_vertex_buffer_decodes_back() {
        let glyphs = table(ATLAS_ABC);
        let layout = shape().vertex;
        let glyph = glyphs.get('B').unwrap();
        let quad = quad_vertices(glyph, &glyphs.metrics);
        let bytes = encode_vertices(&quad, &layout);
        assert_eq!(bytes.len(), 80);
        let decoded = decode_vertices(&bytes, &layout).unwrap();
        for (a, b) in quad.iter().zip(&decoded) {
            assert!(close(a.position.x, b.position.x) && close(a.position.y, b.position.y));
            assert!(close(a.uv.x, b.uv.x) && close(a.uv.y, b.uv.y));
        }
        assert!(decode_vertices(&bytes[..30], &layout).is_none());
    }

    #[test]
    fn test_datablock_layout_follows_template() {
        let fragment = run(&RenderInterfaceBoundSynthesizer, ATLAS_A);
        assert_eq!(fragment.count("DATABLOCK"), 1);
        assert_eq!(fragment.count("TEXTURE"), 1);
        let block = &fragment.entries[0];
        assert_eq!(block.literal("size"), Some("80"));
        assert_eq!(block.literal("streamCount"), Some("2"));
        let data = block.children.last().unwrap().text.as_deref().unwrap();
        assert_eq!(data.lines().filter(|l| !l.trim().is_empty()).count(), 5);
        assert_eq!(decode_hex(data).unwrap().len(), 80);

        let texture = fragment.entries.last().unwrap();
        assert_eq!(texture.literal("texelFormat"), Some("dxt1"));
        let id = texture.id.as_ref().unwrap();
        assert_eq!(id.engine_name.as_deref(), Some("test_font.png"));
    }

    #[test]
    fn test_segment_sets_reference_their_own_datablock() {
        let fragment = run(&SegmentSetSynthesizer, ATLAS_ABC);
        assert_eq!(fragment.entries.len(), 4);
        assert_eq!(fragment.count("RENDERSTREAM"), 8);
        for (entry, c) in fragment.entries.iter().zip(" BAC".chars()) {
            for stream in entry.walk().into_iter().filter(|e| e.tag == "RENDERSTREAM") {
                assert_eq!(
                    stream.attributes[0].1,
                    crate::library::AttrValue::Ref(Placeholder::glyph(Role::DataBlock, c))
                );
            }
        }
        let index_source = fragment.entries[0]
            .walk()
            .into_iter()
            .find(|e| e.tag == "RENDERINDEXSOURCE")
            .unwrap();
        assert_eq!(index_source.literal("maximumIndex"), Some("3"));
        assert_eq!(index_source.literal("count"), Some("6"));
        assert_eq!(index_source.children[0].text.as_deref(), Some("\n0 1 2 0 2 3 "));
    }
}
