//! PSSG container format
//!
//! Every PSSG file is `PSSGFILE > PSSGDATABASE > LIBRARY*`. Library files
//! extracted from a shipped asset and the merged `node.xml` share this layout.

pub mod element;
pub mod number;

pub use element::Element;

pub const FILE_TAG: &str = "PSSGFILE";
pub const DATABASE_TAG: &str = "PSSGDATABASE";
pub const LIBRARY_TAG: &str = "LIBRARY";

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>"#;

/// Parse XML text into an owned element tree rooted at the document element
pub fn parse_document(text: &str) -> Result<Element, String> {
    let doc = roxmltree::Document::parse(text).map_err(|e| e.to_string())?;
    Ok(Element::from_xml_node(doc.root_element()))
}

/// Serialize a `PSSGFILE` tree with the engine's XML declaration
pub fn to_document_string(root: &Element) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str(XML_DECLARATION);
    out.push('\n');
    root.write_xml(&mut out);
    out.push('\n');
    out
}

/// Wrap libraries into `PSSGFILE > PSSGDATABASE`
pub fn wrap_libraries(
    file_attributes: &[(String, String)],
    database_attributes: &[(String, String)],
    libraries: Vec<Element>,
) -> Element {
    let mut database = Element::new(DATABASE_TAG);
    database.attributes = database_attributes.to_vec();
    database.children = libraries;

    let mut file = Element::new(FILE_TAG);
    file.attributes = file_attributes.to_vec();
    file.children.push(database);
    file
}

/// All `LIBRARY` elements under `PSSGFILE > PSSGDATABASE`
pub fn libraries(file: &Element) -> Vec<&Element> {
    file.child(DATABASE_TAG)
        .map(|db| db.children_named(LIBRARY_TAG).collect())
        .unwrap_or_default()
}
