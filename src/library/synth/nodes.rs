use super::{SynthesisInput, Synthesizer};
use crate::atlas::GlyphRecord;
use crate::core::errors::PipelineResult;
use crate::library::{Entry, LibraryFragment, LibraryKind, LocalId, Placeholder, Role};
use crate::pssg::number::{format_sci_list, identity_transform};

pub const ROOT_NODE_NAME: &str = "Root";

fn root_node() -> Entry {
    Entry::new("ROOTNODE")
        .attr("stopTraversal", 0)
        .attr("nickname", ROOT_NODE_NAME)
        .with_id(LocalId::named(
            Placeholder::shared(Role::RootNode),
            ROOT_NODE_NAME,
        ))
        .child(Entry::new("TRANSFORM").text(identity_transform()))
        .child(Entry::new("BOUNDINGBOX").text(format_sci_list(&[0.0; 6])))
}

fn render_node(glyph: &GlyphRecord) -> Entry {
    let c = glyph.character;
    let codepoint = glyph.codepoint().to_string();
    let bounding_box = match glyph.plane_bounds {
        Some(b) => [b.left, b.bottom, -0.0, b.right, b.top, -0.0],
        None => [0.0, 0.0, -0.0, 0.0, 0.0, -0.0],
    };
    let source = Placeholder::glyph(Role::DataSource, c);

    let stream_instance = Entry::new("RENDERSTREAMINSTANCE")
        .attr("sourceCount", 1)
        .reference("indices", source)
        .attr("streamCount", 0)
        .reference("shader", Placeholder::shared(Role::ShaderInstance))
        .with_id(LocalId::named(
            Placeholder::glyph(Role::StreamInstance, c),
            format!("{codepoint}_SI"),
        ))
        .child(Entry::new("RENDERINSTANCESOURCE").reference("source", source));

    Entry::new("RENDERNODE")
        .attr("stopTraversal", 0)
        .attr("nickname", &codepoint)
        .with_id(LocalId::named(Placeholder::glyph(Role::RenderNode, c), codepoint))
        .child(Entry::new("TRANSFORM").text(identity_transform()))
        .child(Entry::new("BOUNDINGBOX").text(format_sci_list(&bounding_box)))
        .child(stream_instance)
}

/// `NODE`: the root node followed by one render node per glyph
///
/// Render nodes are emitted as top-level entries; the merge attaches them to
/// the root by codepoint.
pub struct NodeSynthesizer;

impl Synthesizer for NodeSynthesizer {
    fn kind(&self) -> LibraryKind {
        LibraryKind::Node
    }

    fn synthesize(&self, input: &SynthesisInput<'_>) -> PipelineResult<LibraryFragment> {
        let mut fragment = LibraryFragment::new(self.kind());
        fragment.push(root_node());
        for glyph in &input.glyphs.glyphs {
            fragment.push(render_node(glyph));
        }
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::run;
    use super::*;
    use crate::atlas::test_support::{ATLAS_A, ATLAS_ABC};
    use crate::library::AttrValue;
    use crate::pssg::number::parse_floats;

    #[test]
    fn test_render_node_for_scenario_a() {
        let fragment = run(&NodeSynthesizer, ATLAS_A);
        assert_eq!(fragment.count("ROOTNODE"), 1);
        assert_eq!(fragment.count("RENDERNODE"), 1);

        let node = &fragment.entries[1];
        assert_eq!(node.id.as_ref().unwrap().engine_name.as_deref(), Some("65"));
        let bbox = parse_floats(node.children[1].text.as_deref().unwrap()).unwrap();
        assert_eq!(bbox, vec![0.0, 0.0, 0.0, 0.5, 0.7, 0.0]);

        let instance = &node.children[2];
        let refs: Vec<&AttrValue> = instance
            .attributes
            .iter()
            .filter(|(_, v)| matches!(v, AttrValue::Ref(_)))
            .map(|(_, v)| v)
            .collect();
        assert_eq!(
            refs,
            vec![
                &AttrValue::Ref(Placeholder::glyph(Role::DataSource, 'A')),
                &AttrValue::Ref(Placeholder::shared(Role::ShaderInstance)),
            ]
        );
    }

    #[test]
    fn test_metrics_only_glyph_gets_a_node() {
        let fragment = run(&NodeSynthesizer, ATLAS_ABC);
        assert_eq!(fragment.count("RENDERNODE"), 4);
        let space = &fragment.entries[1];
        assert_eq!(space.literal("nickname"), Some("32"));
        let bbox = parse_floats(space.children[1].text.as_deref().unwrap()).unwrap();
        assert!(bbox.iter().all(|v| *v == 0.0));
    }
}
