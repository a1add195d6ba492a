//! Explicit description of the seven-library schema
//!
//! The engine does not document its node-graph schema, so the expected
//! entry kinds, parents, attributes and reference fields are spelled out
//! here once. The schema is validated against the reference template a
//! single time per run; the resulting [`TemplateShape`] is what every
//! synthesizer reads, and the merge engine re-checks its output against the
//! same reference table.

use super::{EngineScale, LibraryKind, Role};
use crate::core::errors::{PipelineError, PipelineResult};
use crate::pssg::{self, Element};
use crate::template::ReferenceTemplate;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Required,
    /// Present on some entries only, e.g. `SHADERINPUT@texture` exists on
    /// texture-typed inputs and nowhere else
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceSpec {
    pub attribute: &'static str,
    pub target: Role,
    pub arity: Arity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySpec {
    pub tag: &'static str,
    pub parent: &'static str,
    pub role: Option<Role>,
    pub per_glyph: bool,
    pub attributes: &'static [&'static str],
    pub references: &'static [ReferenceSpec],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibrarySpec {
    pub kind: LibraryKind,
    pub entries: &'static [EntrySpec],
}

const fn entry(tag: &'static str, parent: &'static str) -> EntrySpec {
    EntrySpec {
        tag,
        parent,
        role: None,
        per_glyph: false,
        attributes: &[],
        references: &[],
    }
}

const fn required(attribute: &'static str, target: Role) -> ReferenceSpec {
    ReferenceSpec {
        attribute,
        target,
        arity: Arity::Required,
    }
}

const LIB: &str = pssg::LIBRARY_TAG;

const FONT_METRICS: &[EntrySpec] = &[
    EntrySpec {
        role: Some(Role::FontMetrics),
        attributes: &["scale", "ascender", "descender"],
        ..entry("NEFONTMETRICS", LIB)
    },
    EntrySpec {
        references: &[required("glyphMetricsRef", Role::GlyphMetrics)],
        ..entry("NEGLYPHMETRICSREF", "NEFONTMETRICS")
    },
];

const GLYPH_METRICS: &[EntrySpec] = &[EntrySpec {
    role: Some(Role::GlyphMetrics),
    per_glyph: true,
    attributes: &[
        "advanceWidth",
        "horizontalBearing",
        "verticalBearing",
        "physicalWidth",
        "physicalHeight",
        "codePoint",
    ],
    ..entry("NEGLYPHMETRICS", LIB)
}];

const SHADER_GROUP: &[EntrySpec] = &[
    EntrySpec {
        role: Some(Role::ShaderGroup),
        attributes: &["parameterCount"],
        ..entry("SHADERGROUP", LIB)
    },
    EntrySpec {
        attributes: &["name", "type"],
        ..entry("SHADERINPUTDEFINITION", "SHADERGROUP")
    },
];

const SHADER_INSTANCE: &[EntrySpec] = &[
    EntrySpec {
        role: Some(Role::ShaderInstance),
        attributes: &["parameterCount"],
        references: &[required("shaderGroup", Role::ShaderGroup)],
        ..entry("SHADERINSTANCE", LIB)
    },
    EntrySpec {
        attributes: &["parameterID", "type"],
        references: &[ReferenceSpec {
            attribute: "texture",
            target: Role::Texture,
            arity: Arity::Optional,
        }],
        ..entry("SHADERINPUT", "SHADERINSTANCE")
    },
];

const RENDER_INTERFACE_BOUND: &[EntrySpec] = &[
    EntrySpec {
        role: Some(Role::DataBlock),
        per_glyph: true,
        attributes: &["streamCount", "size", "elementCount"],
        ..entry("DATABLOCK", LIB)
    },
    EntrySpec {
        attributes: &["renderType", "dataType", "offset", "stride"],
        ..entry("DATABLOCKSTREAM", "DATABLOCK")
    },
    entry("DATABLOCKDATA", "DATABLOCK"),
    EntrySpec {
        role: Some(Role::Texture),
        attributes: &["width", "height", "texelFormat"],
        ..entry("TEXTURE", LIB)
    },
];

const SEGMENT_SET: &[EntrySpec] = &[
    EntrySpec {
        role: Some(Role::SegmentSet),
        per_glyph: true,
        attributes: &["segmentCount"],
        ..entry("SEGMENTSET", LIB)
    },
    EntrySpec {
        role: Some(Role::DataSource),
        per_glyph: true,
        attributes: &["streamCount", "primitive"],
        ..entry("RENDERDATASOURCE", "SEGMENTSET")
    },
    EntrySpec {
        role: Some(Role::IndexSource),
        per_glyph: true,
        attributes: &["primitive", "format", "count"],
        ..entry("RENDERINDEXSOURCE", "RENDERDATASOURCE")
    },
    entry("INDEXSOURCEDATA", "RENDERINDEXSOURCE"),
    EntrySpec {
        role: Some(Role::Stream),
        attributes: &["subStream"],
        references: &[required("dataBlock", Role::DataBlock)],
        ..entry("RENDERSTREAM", "RENDERDATASOURCE")
    },
];

const NODE: &[EntrySpec] = &[
    EntrySpec {
        role: Some(Role::RootNode),
        ..entry("ROOTNODE", LIB)
    },
    EntrySpec {
        role: Some(Role::RenderNode),
        per_glyph: true,
        ..entry("RENDERNODE", "ROOTNODE")
    },
    entry("TRANSFORM", "RENDERNODE"),
    entry("BOUNDINGBOX", "RENDERNODE"),
    EntrySpec {
        role: Some(Role::StreamInstance),
        per_glyph: true,
        references: &[
            required("indices", Role::DataSource),
            required("shader", Role::ShaderInstance),
        ],
        ..entry("RENDERSTREAMINSTANCE", "RENDERNODE")
    },
    EntrySpec {
        references: &[required("source", Role::DataSource)],
        ..entry("RENDERINSTANCESOURCE", "RENDERSTREAMINSTANCE")
    },
];

const STANDARD: &[LibrarySpec] = &[
    LibrarySpec {
        kind: LibraryKind::FontMetrics,
        entries: FONT_METRICS,
    },
    LibrarySpec {
        kind: LibraryKind::GlyphMetrics,
        entries: GLYPH_METRICS,
    },
    LibrarySpec {
        kind: LibraryKind::Node,
        entries: NODE,
    },
    LibrarySpec {
        kind: LibraryKind::RenderInterfaceBound,
        entries: RENDER_INTERFACE_BOUND,
    },
    LibrarySpec {
        kind: LibraryKind::SegmentSet,
        entries: SEGMENT_SET,
    },
    LibrarySpec {
        kind: LibraryKind::ShaderGroup,
        entries: SHADER_GROUP,
    },
    LibrarySpec {
        kind: LibraryKind::ShaderInstance,
        entries: SHADER_INSTANCE,
    },
];

#[derive(Debug, Clone, Copy)]
pub struct LibrarySchema {
    libraries: &'static [LibrarySpec],
}

impl Default for LibrarySchema {
    fn default() -> Self {
        Self::standard()
    }
}

/// One `DATABLOCKSTREAM` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDecl {
    pub render_type: String,
    pub data_type: String,
    pub offset: usize,
}

/// Interleaved vertex layout of a glyph quad's datablock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: usize,
    pub position_offset: usize,
    pub uv_offset: usize,
    pub streams: Vec<StreamDecl>,
}

impl VertexLayout {
    /// Read the layout from a `DATABLOCK`'s stream declarations; the error
    /// names what was expected
    pub fn from_datablock(block: &Element) -> Result<Self, String> {
        let number = |stream: &Element, name: &str| -> Result<usize, String> {
            stream
                .attr(name)
                .and_then(|v| v.trim().parse().ok())
                .ok_or_else(|| format!("numeric `{name}` on <DATABLOCKSTREAM>"))
        };

        let mut streams = Vec::new();
        let mut stride = None;
        for stream in block.children_named("DATABLOCKSTREAM") {
            let this_stride = number(stream, "stride")?;
            if *stride.get_or_insert(this_stride) != this_stride {
                return Err("a single interleaved stride for all streams".to_string());
            }
            streams.push(StreamDecl {
                render_type: stream.attr("renderType").unwrap_or_default().to_string(),
                data_type: stream.attr("dataType").unwrap_or_default().to_string(),
                offset: number(stream, "offset")?,
            });
        }
        let stride = stride.ok_or_else(|| "DATABLOCKSTREAM declarations".to_string())?;

        let find = |render_type: &str, data_type: &str| {
            streams
                .iter()
                .find(|s| s.render_type == render_type && s.data_type == data_type)
                .map(|s| s.offset)
                .ok_or_else(|| format!("a {render_type} stream of type {data_type}"))
        };
        let position_offset = find("Vertex", "float3")?;
        let uv_offset = find("ST", "float2")?;

        if position_offset + 12 > stride || uv_offset + 8 > stride {
            return Err(format!("Vertex and ST streams to fit inside stride {stride}"));
        }

        Ok(Self {
            stride,
            position_offset,
            uv_offset,
            streams,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentShape {
    pub source_primitive: String,
    pub index_primitive: String,
    pub index_format: String,
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderGroupShape {
    pub id: String,
    pub attributes: Vec<(String, String)>,
    pub definitions: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderInstanceShape {
    pub attributes: Vec<(String, String)>,
    pub inputs: Vec<Element>,
}

/// Everything the synthesizers need from a validated template
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateShape {
    pub scale: EngineScale,
    pub file_attributes: Vec<(String, String)>,
    pub database_attributes: Vec<(String, String)>,
    pub vertex: VertexLayout,
    pub segment: SegmentShape,
    pub shader_group: ShaderGroupShape,
    pub shader_instance: ShaderInstanceShape,
}

fn mismatch(kind: LibraryKind, expected: impl Into<String>) -> PipelineError {
    PipelineError::TemplateShapeMismatch {
        kind,
        expected: expected.into(),
    }
}

fn without(attributes: &[(String, String)], names: &[&str]) -> Vec<(String, String)> {
    attributes
        .iter()
        .filter(|(key, _)| !names.contains(&key.as_str()))
        .cloned()
        .collect()
}

fn parse_attr<T: std::str::FromStr>(
    kind: LibraryKind,
    element: &Element,
    name: &str,
) -> PipelineResult<T> {
    element
        .attr(name)
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| mismatch(kind, format!("numeric `{name}` on <{}>", element.name)))
}

impl LibrarySchema {
    pub fn standard() -> Self {
        Self {
            libraries: STANDARD,
        }
    }

    pub fn libraries(&self) -> &'static [LibrarySpec] {
        self.libraries
    }

    pub fn library(&self, kind: LibraryKind) -> Option<&'static LibrarySpec> {
        self.libraries.iter().find(|spec| spec.kind == kind)
    }

    pub fn entry(&self, tag: &str) -> Option<&'static EntrySpec> {
        self.libraries
            .iter()
            .flat_map(|lib| lib.entries.iter())
            .find(|spec| spec.tag == tag)
    }

    /// The reference fields declared for a tag
    pub fn references(&self, tag: &str) -> &'static [ReferenceSpec] {
        self.entry(tag).map(|spec| spec.references).unwrap_or(&[])
    }

    /// Check the template against the schema and extract its shape
    pub fn validate(&self, template: &ReferenceTemplate) -> PipelineResult<TemplateShape> {
        let ids = template_ids(template);
        for spec in self.libraries {
            self.validate_library(spec, template, &ids)?;
        }

        let shape = TemplateShape {
            scale: font_scale(template)?,
            file_attributes: template.file_attributes.clone(),
            database_attributes: template.database_attributes.clone(),
            vertex: vertex_layout(template)?,
            segment: segment_shape(template)?,
            shader_group: shader_group_shape(template)?,
            shader_instance: shader_instance_shape(template)?,
        };
        if shape.vertex.streams.len() != stream_count(template) {
            return Err(mismatch(
                LibraryKind::SegmentSet,
                format!(
                    "one RENDERSTREAM per DATABLOCKSTREAM ({} declared)",
                    shape.vertex.streams.len()
                ),
            ));
        }
        tracing::debug!(
            "Template shape: scale={}, stride={}, {} indices, shader group {:?}",
            shape.scale.value(),
            shape.vertex.stride,
            shape.segment.indices.len(),
            shape.shader_group.id
        );
        Ok(shape)
    }

    fn validate_library(
        &self,
        spec: &LibrarySpec,
        template: &ReferenceTemplate,
        ids: &HashMap<String, String>,
    ) -> PipelineResult<()> {
        let kind = spec.kind;
        let library = template.library(kind);
        let pairs = library.descendants_with_parent();

        for entry_spec in spec.entries {
            let matches: Vec<&Element> = pairs
                .iter()
                .filter(|(parent, el)| {
                    el.name == entry_spec.tag
                        && parent.map(|p| p.name.as_str()) == Some(entry_spec.parent)
                })
                .map(|(_, el)| *el)
                .collect();

            if matches.is_empty() {
                return Err(mismatch(
                    kind,
                    format!("<{}> inside <{}>", entry_spec.tag, entry_spec.parent),
                ));
            }

            for element in matches {
                if entry_spec.role.is_some() && element.id().is_none() {
                    return Err(mismatch(kind, format!("an id on every <{}>", element.name)));
                }
                for attribute in entry_spec.attributes {
                    if element.attr(attribute).is_none() {
                        return Err(mismatch(
                            kind,
                            format!("attribute `{attribute}` on <{}>", element.name),
                        ));
                    }
                }
                for reference in entry_spec.references {
                    self.check_reference(kind, template, ids, element, reference)?;
                }
            }
        }
        Ok(())
    }

    fn check_reference(
        &self,
        kind: LibraryKind,
        template: &ReferenceTemplate,
        ids: &HashMap<String, String>,
        element: &Element,
        reference: &ReferenceSpec,
    ) -> PipelineResult<()> {
        let corrupt = |reason: String| PipelineError::CorruptTemplate {
            file: template.file(kind),
            reason,
        };
        let Some(value) = element.attr(reference.attribute) else {
            return match reference.arity {
                Arity::Required => Err(corrupt(format!(
                    "<{}> is missing its `{}` reference",
                    element.name, reference.attribute
                ))),
                Arity::Optional => Ok(()),
            };
        };

        let target = value.strip_prefix('#').ok_or_else(|| {
            corrupt(format!(
                "<{}> {}=\"{value}\" is not a #id reference",
                element.name, reference.attribute
            ))
        })?;
        let target_tag = ids.get(target).ok_or_else(|| {
            corrupt(format!(
                "<{}> {} references unknown id \"{target}\"",
                element.name, reference.attribute
            ))
        })?;
        if target_tag != reference.target.tag() {
            return Err(mismatch(
                kind,
                format!(
                    "`{}` on <{}> to reference a <{}>, found <{}>",
                    reference.attribute,
                    element.name,
                    reference.target.tag(),
                    target_tag
                ),
            ));
        }
        Ok(())
    }
}

/// Every id in the template mapped to its element tag
fn template_ids(template: &ReferenceTemplate) -> HashMap<String, String> {
    let mut ids = HashMap::new();
    for kind in LibraryKind::ALL {
        for element in template.library(kind).descendants() {
            if let Some(id) = element.id() {
                ids.insert(id.to_string(), element.name.clone());
            }
        }
    }
    ids
}

fn first<'a>(template: &'a ReferenceTemplate, kind: LibraryKind, tag: &str) -> PipelineResult<&'a Element> {
    template
        .library(kind)
        .find(|el| el.name == tag)
        .ok_or_else(|| mismatch(kind, format!("a <{tag}> entry")))
}

fn font_scale(template: &ReferenceTemplate) -> PipelineResult<EngineScale> {
    let kind = LibraryKind::FontMetrics;
    let metrics = first(template, kind, "NEFONTMETRICS")?;
    let scale: f64 = parse_attr(kind, metrics, "scale")?;
    EngineScale::new(scale).ok_or_else(|| mismatch(kind, "a positive NEFONTMETRICS@scale"))
}

fn vertex_layout(template: &ReferenceTemplate) -> PipelineResult<VertexLayout> {
    let kind = LibraryKind::RenderInterfaceBound;
    let block = first(template, kind, "DATABLOCK")?;
    VertexLayout::from_datablock(block).map_err(|expected| mismatch(kind, expected))
}

fn stream_count(template: &ReferenceTemplate) -> usize {
    template
        .library(LibraryKind::SegmentSet)
        .find(|el| el.name == "RENDERDATASOURCE")
        .map(|source| source.children_named("RENDERSTREAM").count())
        .unwrap_or(0)
}

fn segment_shape(template: &ReferenceTemplate) -> PipelineResult<SegmentShape> {
    let kind = LibraryKind::SegmentSet;
    let source = first(template, kind, "RENDERDATASOURCE")?;
    let index_source = source
        .child("RENDERINDEXSOURCE")
        .ok_or_else(|| mismatch(kind, "<RENDERINDEXSOURCE> inside <RENDERDATASOURCE>"))?;

    let indices: Vec<u32> = index_source
        .child("INDEXSOURCEDATA")
        .and_then(|data| data.text.as_deref())
        .map(|text| text.split_whitespace().map(str::parse).collect())
        .transpose()
        .map_err(|_| mismatch(kind, "integer INDEXSOURCEDATA"))?
        .unwrap_or_default();

    if indices.is_empty() || indices.iter().any(|i| *i > 3) {
        return Err(mismatch(
            kind,
            "index data addressing a single four-vertex quad",
        ));
    }

    Ok(SegmentShape {
        source_primitive: source.attr("primitive").unwrap_or("triangles").to_string(),
        index_primitive: index_source.attr("primitive").unwrap_or("triangles").to_string(),
        index_format: index_source.attr("format").unwrap_or("ushort").to_string(),
        indices,
    })
}

fn shader_group_shape(template: &ReferenceTemplate) -> PipelineResult<ShaderGroupShape> {
    let group = first(template, LibraryKind::ShaderGroup, "SHADERGROUP")?;
    Ok(ShaderGroupShape {
        id: group.id().unwrap_or_default().to_string(),
        attributes: without(&group.attributes, &["id"]),
        definitions: group.children.clone(),
    })
}

fn shader_instance_shape(template: &ReferenceTemplate) -> PipelineResult<ShaderInstanceShape> {
    let kind = LibraryKind::ShaderInstance;
    let instance = first(template, kind, "SHADERINSTANCE")?;
    let inputs: Vec<Element> = instance.children_named("SHADERINPUT").cloned().collect();
    if !inputs.iter().any(|input| input.attr("type") == Some("texture")) {
        return Err(mismatch(kind, "a texture-typed SHADERINPUT to bind the atlas"));
    }
    Ok(ShaderInstanceShape {
        attributes: without(&instance.attributes, &["id", "shaderGroup"]),
        inputs,
    })
}
