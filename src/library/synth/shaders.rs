use super::{SynthesisInput, Synthesizer};
use crate::core::errors::PipelineResult;
use crate::library::{AttrValue, Entry, LibraryFragment, LibraryKind, LocalId, Placeholder, Role};
use crate::pssg::Element;

/// `SHADERGROUP`: the template's effect definition under its effect id
pub struct ShaderGroupSynthesizer;

impl Synthesizer for ShaderGroupSynthesizer {
    fn kind(&self) -> LibraryKind {
        LibraryKind::ShaderGroup
    }

    fn synthesize(&self, input: &SynthesisInput<'_>) -> PipelineResult<LibraryFragment> {
        let group = &input.shape.shader_group;
        let mut entry = Entry::new("SHADERGROUP").with_id(LocalId::named(
            Placeholder::shared(Role::ShaderGroup),
            group.id.clone(),
        ));
        for (key, value) in &group.attributes {
            entry = entry.attr(key, value);
        }
        for definition in &group.definitions {
            entry = entry.child(Entry::from_element(definition));
        }

        let mut fragment = LibraryFragment::new(self.kind());
        fragment.push(entry);
        Ok(fragment)
    }
}

/// Shader parameter with its texture binding pointed at our texture
fn shader_input(input: &Element) -> Entry {
    let mut entry = Entry::from_element(input);
    for (key, value) in entry.attributes.iter_mut() {
        if key == "texture" {
            *value = AttrValue::Ref(Placeholder::shared(Role::Texture));
        }
    }
    entry
}

/// `SHADERINSTANCE`: one instance shared by every glyph, named after the
/// font
pub struct ShaderInstanceSynthesizer;

impl Synthesizer for ShaderInstanceSynthesizer {
    fn kind(&self) -> LibraryKind {
        LibraryKind::ShaderInstance
    }

    fn synthesize(&self, input: &SynthesisInput<'_>) -> PipelineResult<LibraryFragment> {
        let shape = &input.shape.shader_instance;
        let mut entry = Entry::new("SHADERINSTANCE")
            .reference("shaderGroup", Placeholder::shared(Role::ShaderGroup))
            .with_id(LocalId::named(
                Placeholder::shared(Role::ShaderInstance),
                input.naming.font_name.clone(),
            ));
        for (key, value) in &shape.attributes {
            entry = entry.attr(key, value);
        }
        for parameter in &shape.inputs {
            entry = entry.child(shader_input(parameter));
        }

        let mut fragment = LibraryFragment::new(self.kind());
        fragment.push(entry);
        Ok(fragment)
    }
}
