//! Node-graph merge
//!
//! Combines the seven synthesized fragments into one document in two passes:
//! allocation gives every id-carrying entry a final id from a single
//! namespace, then a rewrite pass builds fresh element trees with every
//! placeholder replaced. Render nodes are attached to the root by their
//! character key, never by array position. The finished tree is validated
//! before it is handed out; nothing is written on failure.

mod document;
mod namespace;

pub use document::{validate_document, write_atomic, MergedDocument};
pub use namespace::{anonymous_name, FinalId, IdNamespace};

use crate::core::errors::{EntryLabel, IntegrityViolation, PipelineResult};
use crate::library::{
    AttrValue, Entry, FragmentSet, GlyphKey, LibraryKind, LibrarySchema, Role, TemplateShape,
};
use crate::pssg::{self, Element};
use std::collections::HashMap;

/// First serial handed out by a fresh namespace
pub const DEFAULT_FIRST_ID: u32 = 1;

pub struct MergeEngine<'a> {
    schema: &'a LibrarySchema,
    shape: &'a TemplateShape,
    first_id: u32,
}

impl<'a> MergeEngine<'a> {
    pub fn new(schema: &'a LibrarySchema, shape: &'a TemplateShape) -> Self {
        Self {
            schema,
            shape,
            first_id: DEFAULT_FIRST_ID,
        }
    }

    pub fn with_first_id(mut self, first_id: u32) -> Self {
        self.first_id = first_id;
        self
    }

    /// Merge `fragments` into one document; `charset` fixes the order render
    /// nodes are attached to the root
    pub fn merge(&self, fragments: &FragmentSet, charset: &[char]) -> PipelineResult<MergedDocument> {
        for kind in LibraryKind::ALL {
            if fragments.get(&kind).map_or(true, |f| f.entries.is_empty()) {
                return Err(IntegrityViolation::MissingFragment { kind }.into());
            }
        }

        let namespace = self.allocate(fragments)?;

        let mut libraries: HashMap<LibraryKind, Element> = HashMap::new();
        for (kind, fragment) in fragments {
            let children = match kind {
                LibraryKind::Node => assemble_nodes(&fragment.entries, &namespace, charset)?,
                _ => fragment
                    .entries
                    .iter()
                    .map(|entry| rewrite(entry, &namespace))
                    .collect::<Result<Vec<_>, _>>()?,
            };
            let mut library = Element::new(pssg::LIBRARY_TAG);
            library.set_attr("type", kind.type_name());
            library.children = children;
            libraries.insert(*kind, library);
        }

        let ordered = LibraryKind::DOCUMENT_ORDER
            .iter()
            .filter_map(|kind| libraries.remove(kind))
            .collect();
        let root = pssg::wrap_libraries(
            &self.shape.file_attributes,
            &self.shape.database_attributes,
            ordered,
        );
        validate_document(self.schema, &root)?;

        tracing::info!(
            "Merged {} glyphs into one document with {} ids",
            charset.len(),
            namespace.len()
        );
        Ok(MergedDocument::new(root))
    }

    /// First pass: ids for every entry, referenced kinds first
    fn allocate(&self, fragments: &FragmentSet) -> Result<IdNamespace, IntegrityViolation> {
        let mut namespace = IdNamespace::starting_at(self.first_id);
        for kind in LibraryKind::MERGE_ORDER {
            let Some(fragment) = fragments.get(&kind) else {
                continue;
            };
            for entry in fragment.entries.iter().flat_map(Entry::walk) {
                if let Some(local) = &entry.id {
                    namespace.allocate(&entry.tag, local)?;
                }
            }
        }
        tracing::debug!("Allocated {} ids", namespace.len());
        Ok(namespace)
    }
}

fn label(entry: &Entry, namespace: &IdNamespace) -> EntryLabel {
    EntryLabel {
        tag: entry.tag.clone(),
        id: entry
            .id
            .as_ref()
            .and_then(|local| namespace.resolve(&local.placeholder))
            .map(|id| id.name.clone()),
    }
}

/// Second pass: a fresh element for `entry` with final ids and references
fn rewrite(entry: &Entry, namespace: &IdNamespace) -> Result<Element, IntegrityViolation> {
    let mut element = Element::new(entry.tag.clone());
    for (name, value) in &entry.attributes {
        let value = match value {
            AttrValue::Literal(literal) => literal.clone(),
            AttrValue::Ref(target) => namespace
                .resolve(target)
                .map(|id| id.reference())
                .ok_or_else(|| IntegrityViolation::DanglingPlaceholder {
                    entry: label(entry, namespace),
                    field: name.clone(),
                    target: *target,
                })?,
        };
        element.attributes.push((name.clone(), value));
    }
    if let Some(local) = &entry.id {
        let id = namespace
            .resolve(&local.placeholder)
            .ok_or_else(|| IntegrityViolation::UnattachedNode {
                entry: label(entry, namespace),
            })?;
        element.attributes.push(("id".to_string(), id.name.clone()));
    }
    element.text = entry.text.clone();
    element.children = entry
        .children
        .iter()
        .map(|child| rewrite(child, namespace))
        .collect::<Result<_, _>>()?;
    Ok(element)
}

fn render_node_key(entry: &Entry) -> Option<char> {
    match entry.id.as_ref()?.placeholder {
        p if p.role == Role::RenderNode => match p.key {
            GlyphKey::Glyph(c) => Some(c),
            GlyphKey::Shared => None,
        },
        _ => None,
    }
}

/// Rewrite the node fragment and hang every render node under the root, in
/// charset order
fn assemble_nodes(
    entries: &[Entry],
    namespace: &IdNamespace,
    charset: &[char],
) -> Result<Vec<Element>, IntegrityViolation> {
    let mut roots = Vec::new();
    let mut others = Vec::new();
    let mut render_nodes: HashMap<char, (&Entry, Element)> = HashMap::new();

    for entry in entries {
        let element = rewrite(entry, namespace)?;
        if let Some(c) = render_node_key(entry) {
            render_nodes.insert(c, (entry, element));
        } else if entry.id.as_ref().map(|id| id.placeholder.role) == Some(Role::RootNode) {
            roots.push(element);
        } else {
            others.push(element);
        }
    }

    let mut root = match roots.len() {
        1 => roots.remove(0),
        _ => {
            return Err(IntegrityViolation::MissingFragment {
                kind: LibraryKind::Node,
            })
        }
    };

    for &c in charset {
        let (_, node) = render_nodes
            .remove(&c)
            .ok_or(IntegrityViolation::MissingGlyphNode { character: c })?;
        root.children.push(node);
    }
    if let Some((entry, _)) = render_nodes.values().next() {
        return Err(IntegrityViolation::UnattachedNode {
            entry: label(entry, namespace),
        });
    }

    let mut children = vec![root];
    children.extend(others);
    Ok(children)
}
