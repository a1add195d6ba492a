//! Library fragments
//!
//! A PSSG font asset is split into seven typed libraries. Before merging,
//! synthesized entries carry fragment-local placeholders instead of final
//! ids; every per-glyph placeholder is keyed by the glyph's character so no
//! fragment relies on another fragment's array order.

pub mod schema;
pub mod synth;
pub mod units;

pub use schema::{LibrarySchema, TemplateShape};
pub use units::EngineScale;

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LibraryKind {
    FontMetrics,
    GlyphMetrics,
    Node,
    RenderInterfaceBound,
    SegmentSet,
    ShaderGroup,
    ShaderInstance,
}

impl LibraryKind {
    pub const ALL: [LibraryKind; 7] = [
        LibraryKind::FontMetrics,
        LibraryKind::GlyphMetrics,
        LibraryKind::Node,
        LibraryKind::RenderInterfaceBound,
        LibraryKind::SegmentSet,
        LibraryKind::ShaderGroup,
        LibraryKind::ShaderInstance,
    ];

    /// Id allocation order: referenced kinds before the kinds that use them
    pub const MERGE_ORDER: [LibraryKind; 7] = [
        LibraryKind::ShaderGroup,
        LibraryKind::ShaderInstance,
        LibraryKind::RenderInterfaceBound,
        LibraryKind::SegmentSet,
        LibraryKind::GlyphMetrics,
        LibraryKind::FontMetrics,
        LibraryKind::Node,
    ];

    /// Library order inside the engine's own `node.xml`
    pub const DOCUMENT_ORDER: [LibraryKind; 7] = [
        LibraryKind::FontMetrics,
        LibraryKind::GlyphMetrics,
        LibraryKind::ShaderInstance,
        LibraryKind::ShaderGroup,
        LibraryKind::SegmentSet,
        LibraryKind::RenderInterfaceBound,
        LibraryKind::Node,
    ];

    /// Value of the `LIBRARY@type` attribute
    pub fn type_name(self) -> &'static str {
        match self {
            LibraryKind::FontMetrics => "NEFONTMETRICS",
            LibraryKind::GlyphMetrics => "NEGLYPHMETRICS",
            LibraryKind::Node => "NODE",
            LibraryKind::RenderInterfaceBound => "RENDERINTERFACEBOUND",
            LibraryKind::SegmentSet => "SEGMENTSET",
            LibraryKind::ShaderGroup => "SHADERGROUP",
            LibraryKind::ShaderInstance => "SHADERINSTANCE",
        }
    }

    /// Position in [`LibraryKind::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.type_name() == name)
    }

    pub fn file_name(self) -> String {
        format!("LIBRARY_{}.xml", self.type_name())
    }
}

impl std::fmt::Display for LibraryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

/// What an id-carrying entry is, independent of its final id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    FontMetrics,
    GlyphMetrics,
    ShaderGroup,
    ShaderInstance,
    Texture,
    DataBlock,
    SegmentSet,
    DataSource,
    IndexSource,
    Stream,
    RootNode,
    RenderNode,
    StreamInstance,
}

impl Role {
    pub fn tag(self) -> &'static str {
        match self {
            Role::FontMetrics => "NEFONTMETRICS",
            Role::GlyphMetrics => "NEGLYPHMETRICS",
            Role::ShaderGroup => "SHADERGROUP",
            Role::ShaderInstance => "SHADERINSTANCE",
            Role::Texture => "TEXTURE",
            Role::DataBlock => "DATABLOCK",
            Role::SegmentSet => "SEGMENTSET",
            Role::DataSource => "RENDERDATASOURCE",
            Role::IndexSource => "RENDERINDEXSOURCE",
            Role::Stream => "RENDERSTREAM",
            Role::RootNode => "ROOTNODE",
            Role::RenderNode => "RENDERNODE",
            Role::StreamInstance => "RENDERSTREAMINSTANCE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GlyphKey {
    Shared,
    Glyph(char),
}

/// Fragment-local identifier, rewritten to a final id by the merge engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Placeholder {
    pub role: Role,
    pub key: GlyphKey,
    pub slot: u16,
}

impl Placeholder {
    pub fn shared(role: Role) -> Self {
        Self {
            role,
            key: GlyphKey::Shared,
            slot: 0,
        }
    }

    pub fn glyph(role: Role, character: char) -> Self {
        Self {
            role,
            key: GlyphKey::Glyph(character),
            slot: 0,
        }
    }

    pub fn with_slot(mut self, slot: u16) -> Self {
        self.slot = slot;
        self
    }
}

impl std::fmt::Display for Placeholder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.role.tag())?;
        if let GlyphKey::Glyph(c) = self.key {
            write!(f, "[U+{:04X}]", c as u32)?;
        }
        if self.slot != 0 {
            write!(f, "#{}", self.slot)?;
        }
        Ok(())
    }
}

/// Placeholder plus the name the engine looks the entry up by, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalId {
    pub placeholder: Placeholder,
    pub engine_name: Option<String>,
}

impl LocalId {
    pub fn anonymous(placeholder: Placeholder) -> Self {
        Self {
            placeholder,
            engine_name: None,
        }
    }

    pub fn named(placeholder: Placeholder, name: impl Into<String>) -> Self {
        Self {
            placeholder,
            engine_name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Literal(String),
    Ref(Placeholder),
}

/// One synthesized element with placeholder ids and references
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub tag: String,
    pub id: Option<LocalId>,
    pub attributes: Vec<(String, AttrValue)>,
    pub text: Option<String>,
    pub children: Vec<Entry>,
}

impl Entry {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            id: None,
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: LocalId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn attr(mut self, name: &str, value: impl ToString) -> Self {
        self.attributes
            .push((name.to_string(), AttrValue::Literal(value.to_string())));
        self
    }

    pub fn reference(mut self, name: &str, target: Placeholder) -> Self {
        self.attributes
            .push((name.to_string(), AttrValue::Ref(target)));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn child(mut self, child: Entry) -> Self {
        self.children.push(child);
        self
    }

    /// Literal copy of a template element and its subtree
    pub fn from_element(element: &crate::pssg::Element) -> Self {
        Self {
            tag: element.name.clone(),
            id: None,
            attributes: element
                .attributes
                .iter()
                .map(|(key, value)| (key.clone(), AttrValue::Literal(value.clone())))
                .collect(),
            text: element.text.clone(),
            children: element.children.iter().map(Entry::from_element).collect(),
        }
    }

    pub fn literal(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find_map(|(key, value)| match value {
            AttrValue::Literal(v) if key == name => Some(v.as_str()),
            _ => None,
        })
    }

    /// Pre-order walk including `self`
    pub fn walk(&self) -> Vec<&Entry> {
        let mut out = vec![self];
        let mut index = 0;
        while index < out.len() {
            let entry = out[index];
            out.splice(index + 1..index + 1, entry.children.iter());
            index += 1;
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LibraryFragment {
    pub kind: LibraryKind,
    pub entries: Vec<Entry>,
}

impl LibraryFragment {
    pub fn new(kind: LibraryKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Count of entries (at any depth) with the given tag
    pub fn count(&self, tag: &str) -> usize {
        self.entries
            .iter()
            .flat_map(|e| e.walk())
            .filter(|e| e.tag == tag)
            .count()
    }
}

/// The seven synthesized fragments, keyed by kind
pub type FragmentSet = BTreeMap<LibraryKind, LibraryFragment>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in LibraryKind::ALL {
            assert_eq!(LibraryKind::from_type_name(kind.type_name()), Some(kind));
            assert_eq!(LibraryKind::ALL[kind.index()], kind);
        }
        assert_eq!(LibraryKind::SegmentSet.file_name(), "LIBRARY_SEGMENTSET.xml");
        assert_eq!(LibraryKind::from_type_name("TEXTURE"), None);
    }

    #[test]
    fn test_orders_cover_every_kind() {
        for order in [LibraryKind::MERGE_ORDER, LibraryKind::DOCUMENT_ORDER] {
            let mut sorted = order.to_vec();
            sorted.sort();
            let mut all = LibraryKind::ALL.to_vec();
            all.sort();
            assert_eq!(sorted, all);
        }
    }

    #[test]
    fn test_walk_is_pre_order() {
        let entry = Entry::new("A")
            .child(Entry::new("B").child(Entry::new("C")))
            .child(Entry::new("D"));
        let tags: Vec<&str> = entry.walk().iter().map(|e| e.tag.as_str()).collect();
        assert_eq!(tags, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_placeholder_display() {
        let p = Placeholder::glyph(Role::Stream, 'A').with_slot(1);
        assert_eq!(p.to_string(), "RENDERSTREAM[U+0041]#1");
        assert_eq!(Placeholder::shared(Role::RootNode).to_string(), "ROOTNODE");
    }
}
