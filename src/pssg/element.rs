//! Owned PSSG element tree
//!
//! PSSG libraries are plain XML: elements with string attributes and an
//! optional text payload (matrices, hex vertex data, index lists). This tree
//! is what templates parse into and what the merge engine produces.

use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Depth-first, pre-order walk including `self`
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        self.collect_descendants(&mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, out: &mut Vec<&'a Element>) {
        out.push(self);
        for child in &self.children {
            child.collect_descendants(out);
        }
    }

    /// Like [`Element::descendants`], paired with each element's parent
    pub fn descendants_with_parent(&self) -> Vec<(Option<&Element>, &Element)> {
        let mut out = vec![(None, self)];
        let mut index = 0;
        while index < out.len() {
            let parent = out[index].1;
            for child in &parent.children {
                out.push((Some(parent), child));
            }
            index += 1;
        }
        out
    }

    pub fn find(&self, predicate: impl Fn(&Element) -> bool) -> Option<&Element> {
        self.descendants().into_iter().find(|el| predicate(el))
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        self.find(|el| el.id() == Some(id))
    }

    /// Convert a parsed roxmltree node; comments and processing
    /// instructions are dropped, whitespace-only text is ignored
    pub fn from_xml_node(node: roxmltree::Node<'_, '_>) -> Self {
        let mut element = Element::new(node.tag_name().name());
        element.attributes = node
            .attributes()
            .map(|attr| (attr.name().to_string(), attr.value().to_string()))
            .collect();

        let mut text = String::new();
        for child in node.children() {
            if child.is_element() {
                element.children.push(Element::from_xml_node(child));
            } else if child.is_text() {
                if let Some(fragment) = child.text() {
                    text.push_str(fragment);
                }
            }
        }
        if !text.trim().is_empty() {
            element.text = Some(text);
        }
        element
    }

    /// Serialize the way the engine's exporter does: one element per line,
    /// no indentation, text payloads kept verbatim
    pub fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            let _ = write!(out, " {}=\"{}\"", key, escape(value));
        }

        if self.children.is_empty() && self.text.is_none() {
            out.push_str(" />");
            return;
        }

        out.push('>');
        if let Some(text) = &self.text {
            out.push_str(&escape(text));
        }
        if !self.children.is_empty() {
            out.push('\n');
            for child in &self.children {
                child.write_xml(out);
                out.push('\n');
            }
        }
        let _ = write!(out, "</{}>", self.name);
    }
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
