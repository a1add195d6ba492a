use crate::core::errors::{
    EntryLabel, FileContext, IntegrityViolation, PipelineResult,
};
use crate::library::schema::Arity;
use crate::library::{LibraryKind, LibrarySchema};
use crate::pssg::{self, Element};
use crate::template::ReferenceTemplate;
use crate::verify::LibrarySet;
use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// A complete `PSSGFILE` with one id namespace and no dangling references
#[derive(Debug, Clone, PartialEq)]
pub struct MergedDocument {
    root: Element,
}

impl MergedDocument {
    /// Wrap a tree that already passed [`validate_document`]
    pub(crate) fn new(root: Element) -> Self {
        Self { root }
    }

    /// Combine seven already-final library files into one document, in the
    /// engine's library order
    pub fn from_libraries(libraries: &ReferenceTemplate, schema: &LibrarySchema) -> PipelineResult<Self> {
        let root = pssg::wrap_libraries(
            &libraries.file_attributes,
            &libraries.database_attributes,
            LibraryKind::DOCUMENT_ORDER
                .iter()
                .map(|kind| libraries.library(*kind).clone())
                .collect(),
        );
        validate_document(schema, &root)?;
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn library(&self, kind: LibraryKind) -> Option<&Element> {
        pssg::libraries(&self.root)
            .into_iter()
            .find(|lib| lib.attr("type") == Some(kind.type_name()))
    }

    /// Number of elements carrying an id
    pub fn id_count(&self) -> usize {
        self.root
            .descendants()
            .iter()
            .filter(|el| el.id().is_some())
            .count()
    }

    pub fn to_xml(&self) -> String {
        pssg::to_document_string(&self.root)
    }

    /// Write `node.xml`; the target is replaced only once the whole document
    /// is on disk
    pub fn write(&self, path: &Path) -> PipelineResult<()> {
        write_atomic(path, self.to_xml().as_bytes())?;
        tracing::info!("Wrote merged document {:?}", path);
        Ok(())
    }

    /// Write one `LIBRARY_<TYPE>.xml` per library, in the template layout
    pub fn write_libraries(&self, dir: &Path) -> PipelineResult<Vec<PathBuf>> {
        let file_attributes = &self.root.attributes;
        let database_attributes = self
            .root
            .child(pssg::DATABASE_TAG)
            .map(|db| db.attributes.clone())
            .unwrap_or_default();

        let mut written = Vec::new();
        for kind in LibraryKind::DOCUMENT_ORDER {
            let Some(library) = self.library(kind) else {
                continue;
            };
            let file = pssg::wrap_libraries(file_attributes, &database_attributes, vec![library.clone()]);
            let path = dir.join(kind.file_name());
            write_atomic(&path, pssg::to_document_string(&file).as_bytes())?;
            written.push(path);
        }
        tracing::debug!("Wrote {} library files to {:?}", written.len(), dir);
        Ok(written)
    }

    pub fn library_set(&self) -> LibrarySet {
        LibrarySet::from_document(&self.root)
    }
}

/// Write through a temporary file in the target directory, then rename
pub fn write_atomic(path: &Path, contents: &[u8]) -> PipelineResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).with_file_context("create directory", &dir)?;

    let mut file = tempfile::NamedTempFile::new_in(&dir).with_file_context("create temporary file in", &dir)?;
    file.write_all(contents).with_file_context("write", file.path())?;
    file.persist(path)
        .map_err(|e| e.error)
        .with_file_context("replace", path)?;
    Ok(())
}

fn label(element: &Element) -> EntryLabel {
    EntryLabel {
        tag: element.name.clone(),
        id: element.id().map(str::to_string),
    }
}

/// Check a finished document: every library present and non-empty, ids
/// unique, every reference field declared by the schema resolves to an
/// element of the expected kind
pub fn validate_document(schema: &LibrarySchema, root: &Element) -> Result<(), IntegrityViolation> {
    let libraries = pssg::libraries(root);
    for kind in LibraryKind::ALL {
        let present = libraries
            .iter()
            .any(|lib| lib.attr("type") == Some(kind.type_name()) && !lib.children.is_empty());
        if !present {
            return Err(IntegrityViolation::MissingFragment { kind });
        }
    }

    let elements = root.descendants();
    let mut ids: HashMap<&str, &str> = HashMap::new();
    for element in &elements {
        if let Some(id) = element.id() {
            if ids.insert(id, element.name.as_str()).is_some() {
                return Err(IntegrityViolation::DuplicateId {
                    entry: label(element),
                    id: id.to_string(),
                });
            }
        }
    }

    for element in &elements {
        for reference in schema.references(&element.name) {
            let Some(value) = element.attr(reference.attribute) else {
                if reference.arity == Arity::Required {
                    return Err(IntegrityViolation::MissingReference {
                        entry: label(element),
                        field: reference.attribute.to_string(),
                    });
                }
                continue;
            };
            let resolved = value
                .strip_prefix('#')
                .and_then(|target| ids.get(target))
                .is_some_and(|tag| *tag == reference.target.tag());
            if !resolved {
                return Err(IntegrityViolation::DanglingReference {
                    entry: label(element),
                    field: reference.attribute.to_string(),
                    target: value.to_string(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::test_support::bundled_with;

    #[test]
    fn test_bundled_libraries_form_a_valid_document() {
        let template = ReferenceTemplate::bundled().unwrap();
        let document = MergedDocument::from_libraries(&template, &LibrarySchema::standard()).unwrap();
        let order: Vec<&str> = pssg::libraries(document.root())
            .iter()
            .filter_map(|lib| lib.attr("type"))
            .collect();
        assert_eq!(
            order,
            vec![
                "NEFONTMETRICS",
                "NEGLYPHMETRICS",
                "SHADERINSTANCE",
                "SHADERGROUP",
                "SEGMENTSET",
                "RENDERINTERFACEBOUND",
                "NODE"
            ]
        );
        assert!(document.id_count() > 10);
    }

    #[test]
    fn test_reference_to_wrong_kind_is_dangling() {
        let template = bundled_with(LibraryKind::SegmentSet, |lib| {
            if let Some(segment) = lib.children.first_mut() {
                if let Some(source) = segment.children.first_mut() {
                    for stream in source.children.iter_mut().filter(|c| c.name == "RENDERSTREAM") {
                        stream.set_attr("dataBlock", "#Root");
                    }
                }
            }
        });
        let result = MergedDocument::from_libraries(&template, &LibrarySchema::standard());
        match result {
            Err(crate::core::errors::PipelineError::MergeIntegrity(
                IntegrityViolation::DanglingReference { field, target, .. },
            )) => {
                assert_eq!(field, "dataBlock");
                assert_eq!(target, "#Root");
            }
            other => panic!("expected DanglingReference, got {other:?}"),
        }
    }

    #[test]
    fn test_write_and_write_libraries() {
        let dir = tempfile::tempdir().unwrap();
        let template = ReferenceTemplate::bundled().unwrap();
        let document = MergedDocument::from_libraries(&template, &LibrarySchema::standard()).unwrap();

        let node = dir.path().join("out").join("node.xml");
        document.write(&node).unwrap();
        let text = std::fs::read_to_string(&node).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"yes\"?>\n<PSSGFILE"));
        assert_eq!(pssg::parse_document(&text).unwrap(), *document.root());

        let written = document.write_libraries(dir.path()).unwrap();
        assert_eq!(written.len(), 7);
        let reloaded = ReferenceTemplate::load_dir(dir.path()).unwrap();
        for kind in LibraryKind::ALL {
            assert_eq!(reloaded.library(kind), template.library(kind));
        }
    }
}
