//! Coordinate verification
//!
//! Reads glyph quads back out of a set of libraries (the shipped font or our
//! merged output), moves them into the font's line frame and compares two
//! such sets after aligning their baselines.

pub mod compare;
pub mod extract;

pub use compare::{compare, AlignmentOptions, CharacterDelta, ComparisonReport, Presence, UndecodedGlyph};
pub use extract::{extract, extract_available};

use crate::core::errors::{FileContext, PipelineError, PipelineResult};
use crate::library::synth::QuadVertex;
use crate::library::LibraryKind;
use crate::pssg::{self, Element};
use crate::template::ReferenceTemplate;
use kurbo::{Point, Rect, Vec2};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Which side of a comparison a coordinate set came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Original,
    Generated,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Original => f.write_str("original"),
            Origin::Generated => f.write_str("generated"),
        }
    }
}

/// Libraries keyed by kind, from whatever source they were read
#[derive(Debug, Clone)]
pub struct LibrarySet {
    pub source: PathBuf,
    libraries: BTreeMap<LibraryKind, Element>,
}

impl LibrarySet {
    /// Every typed `LIBRARY` below a `PSSGFILE`
    pub fn from_document(root: &Element) -> Self {
        Self::from_document_at(root, PathBuf::from("<merged document>"))
    }

    fn from_document_at(root: &Element, source: PathBuf) -> Self {
        let libraries = pssg::libraries(root)
            .into_iter()
            .filter_map(|lib| {
                let kind = LibraryKind::from_type_name(lib.attr("type")?)?;
                Some((kind, lib.clone()))
            })
            .collect();
        Self { source, libraries }
    }

    pub fn from_template(template: &ReferenceTemplate) -> Self {
        Self {
            source: template.file(LibraryKind::Node),
            libraries: LibraryKind::ALL
                .into_iter()
                .map(|kind| (kind, template.library(kind).clone()))
                .collect(),
        }
    }

    /// A merged `node.xml`, or a directory of `LIBRARY_*.xml` files
    pub fn load(path: &Path) -> PipelineResult<Self> {
        if path.is_dir() {
            return Ok(Self::from_template(&ReferenceTemplate::load_dir(path)?));
        }
        let text = std::fs::read_to_string(path).with_file_context("read", path)?;
        let root = pssg::parse_document(&text).map_err(|reason| PipelineError::CorruptTemplate {
            file: path.to_path_buf(),
            reason,
        })?;
        Ok(Self::from_document_at(&root, path.to_path_buf()))
    }

    pub fn library(&self, kind: LibraryKind) -> Option<&Element> {
        self.libraries.get(&kind)
    }

    /// Characters with a render node, in node order
    pub fn characters(&self) -> Vec<char> {
        self.library(LibraryKind::Node)
            .map(|lib| {
                lib.descendants()
                    .into_iter()
                    .filter(|el| el.name == "RENDERNODE")
                    .filter_map(|el| el.id()?.parse::<u32>().ok())
                    .filter_map(char::from_u32)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Font-wide vertical metrics in em
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FontFrame {
    pub scale: f64,
    pub ascender: f64,
    pub descender: f64,
}

impl FontFrame {
    /// Baseline height in the line frame, where the ascender line is y = 0
    pub fn baseline(&self) -> f64 {
        -self.ascender
    }

    pub fn extent(&self) -> f64 {
        self.ascender - self.descender
    }
}

/// One glyph's quad in the font's line frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinateRecord {
    pub character: char,
    pub origin: Origin,
    pub vertices: Vec<QuadVertex>,
    /// Top-left vertex
    pub position: Point,
    pub uv: Rect,
    pub advance: f64,
    /// Horizontal and vertical bearing
    pub bearing: Vec2,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinateSet {
    pub origin: Origin,
    pub frame: FontFrame,
    pub records: Vec<CoordinateRecord>,
}

impl CoordinateSet {
    pub fn get(&self, character: char) -> Option<&CoordinateRecord> {
        self.records.iter().find(|r| r.character == character)
    }

    pub fn characters(&self) -> Vec<char> {
        self.records.iter().map(|r| r.character).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_library_set_lists_render_nodes() {
        let set = LibrarySet::from_template(&ReferenceTemplate::bundled().unwrap());
        assert_eq!(set.characters(), vec!['A']);
        assert!(set.library(LibraryKind::SegmentSet).is_some());
    }

    #[test]
    fn test_load_reads_node_xml_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        crate::template::test_support::write_bundled(dir.path());
        let from_dir = LibrarySet::load(dir.path()).unwrap();
        assert_eq!(from_dir.characters(), vec!['A']);

        let document = crate::merge::MergedDocument::from_libraries(
            &ReferenceTemplate::bundled().unwrap(),
            &crate::library::LibrarySchema::standard(),
        )
        .unwrap();
        let node = dir.path().join("node.xml");
        document.write(&node).unwrap();
        let from_file = LibrarySet::load(&node).unwrap();
        assert_eq!(from_file.source, node);
        assert_eq!(
            from_file.library(LibraryKind::Node),
            from_dir.library(LibraryKind::Node)
        );
    }

    #[test]
    fn test_origin_display() {
        assert_eq!(Origin::Original.to_string(), "original");
        assert_eq!(Origin::Generated.to_string(), "generated");
    }
}
