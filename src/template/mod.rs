//! Reference template
//!
//! The seven libraries extracted from the game's shipped font asset. The
//! template is only ever read: the schema is validated against it and the
//! extractor reads the original coordinates from it. It is never copied into
//! generated output.

use crate::core::errors::{FileContext, PipelineError, PipelineResult};
use crate::library::LibraryKind;
use crate::pssg::{self, Element};
use std::path::{Path, PathBuf};

/// Reference set compiled into the binary, in `LibraryKind::ALL` order
const BUNDLED: [(LibraryKind, &str); 7] = [
    (
        LibraryKind::FontMetrics,
        include_str!("../../resources/reference/LIBRARY_NEFONTMETRICS.xml"),
    ),
    (
        LibraryKind::GlyphMetrics,
        include_str!("../../resources/reference/LIBRARY_NEGLYPHMETRICS.xml"),
    ),
    (
        LibraryKind::Node,
        include_str!("../../resources/reference/LIBRARY_NODE.xml"),
    ),
    (
        LibraryKind::RenderInterfaceBound,
        include_str!("../../resources/reference/LIBRARY_RENDERINTERFACEBOUND.xml"),
    ),
    (
        LibraryKind::SegmentSet,
        include_str!("../../resources/reference/LIBRARY_SEGMENTSET.xml"),
    ),
    (
        LibraryKind::ShaderGroup,
        include_str!("../../resources/reference/LIBRARY_SHADERGROUP.xml"),
    ),
    (
        LibraryKind::ShaderInstance,
        include_str!("../../resources/reference/LIBRARY_SHADERINSTANCE.xml"),
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Bundled,
    Directory(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ReferenceTemplate {
    pub source: TemplateSource,
    pub file_attributes: Vec<(String, String)>,
    pub database_attributes: Vec<(String, String)>,
    libraries: [Element; 7],
}

/// Header attributes and the single `LIBRARY` of one template file
struct LibraryFile {
    file_attributes: Vec<(String, String)>,
    database_attributes: Vec<(String, String)>,
    library: Element,
}

fn parse_library_file(kind: LibraryKind, text: &str, file: &Path) -> PipelineResult<LibraryFile> {
    let corrupt = |reason: String| PipelineError::CorruptTemplate {
        file: file.to_path_buf(),
        reason,
    };

    let root = pssg::parse_document(text).map_err(|e| corrupt(format!("malformed XML: {e}")))?;
    if root.name != pssg::FILE_TAG {
        return Err(corrupt(format!(
            "root element is <{}>, expected <{}>",
            root.name,
            pssg::FILE_TAG
        )));
    }
    let database = root
        .child(pssg::DATABASE_TAG)
        .ok_or_else(|| corrupt(format!("no <{}> element", pssg::DATABASE_TAG)))?;

    let mut libraries = database.children_named(pssg::LIBRARY_TAG);
    let library = libraries
        .next()
        .ok_or_else(|| corrupt("no <LIBRARY> element".to_string()))?;
    if libraries.next().is_some() {
        return Err(corrupt("more than one <LIBRARY> element".to_string()));
    }

    match library.attr("type") {
        Some(name) if name == kind.type_name() => {}
        other => {
            return Err(corrupt(format!(
                "LIBRARY type is {:?}, expected {:?}",
                other.unwrap_or(""),
                kind.type_name()
            )))
        }
    }

    Ok(LibraryFile {
        file_attributes: root.attributes.clone(),
        database_attributes: database.attributes.clone(),
        library: library.clone(),
    })
}

impl ReferenceTemplate {
    /// Read `LIBRARY_<TYPE>.xml` for every library kind from `dir`
    pub fn load_dir(dir: &Path) -> PipelineResult<Self> {
        let mut files = Vec::with_capacity(LibraryKind::ALL.len());
        for kind in LibraryKind::ALL {
            let path = dir.join(kind.file_name());
            if !path.is_file() {
                return Err(PipelineError::CorruptTemplate {
                    file: path,
                    reason: "library file is missing".to_string(),
                });
            }
            let text = std::fs::read_to_string(&path).with_file_context("read", &path)?;
            files.push((kind, parse_library_file(kind, &text, &path)?));
        }
        let template = Self::from_files(TemplateSource::Directory(dir.to_path_buf()), files)?;
        tracing::info!("Loaded reference template from {:?}", dir);
        Ok(template)
    }

    /// The reference set shipped inside the binary
    pub fn bundled() -> PipelineResult<Self> {
        let mut files = Vec::with_capacity(BUNDLED.len());
        for (kind, text) in BUNDLED {
            let path = TemplateSource::Bundled.file(kind);
            files.push((kind, parse_library_file(kind, text, &path)?));
        }
        Self::from_files(TemplateSource::Bundled, files)
    }

    /// Load from `dir` when given, otherwise use the bundled set
    pub fn load(dir: Option<&Path>) -> PipelineResult<Self> {
        match dir {
            Some(dir) => Self::load_dir(dir),
            None => {
                tracing::debug!("No template directory configured, using bundled reference set");
                Self::bundled()
            }
        }
    }

    fn from_files(
        source: TemplateSource,
        files: Vec<(LibraryKind, LibraryFile)>,
    ) -> PipelineResult<Self> {
        // Document headers come from the node library, like the engine's own merge
        let (file_attributes, database_attributes) = files
            .iter()
            .find(|(kind, _)| *kind == LibraryKind::Node)
            .map(|(_, file)| (file.file_attributes.clone(), file.database_attributes.clone()))
            .unwrap_or_default();

        let count = files.len();
        let libraries: [Element; 7] = files
            .into_iter()
            .map(|(_, file)| file.library)
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|_| PipelineError::CorruptTemplate {
                file: source.file(LibraryKind::Node),
                reason: format!("expected 7 libraries, found {count}"),
            })?;

        Ok(Self {
            source,
            file_attributes,
            database_attributes,
            libraries,
        })
    }

    /// The `LIBRARY` element of one kind
    pub fn library(&self, kind: LibraryKind) -> &Element {
        &self.libraries[kind.index()]
    }

    pub fn file(&self, kind: LibraryKind) -> PathBuf {
        self.source.file(kind)
    }
}

impl TemplateSource {
    pub fn file(&self, kind: LibraryKind) -> PathBuf {
        match self {
            TemplateSource::Bundled => Path::new("<bundled>").join(kind.file_name()),
            TemplateSource::Directory(dir) => dir.join(kind.file_name()),
        }
    }
}

impl std::fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateSource::Bundled => f.write_str("bundled reference set"),
            TemplateSource::Directory(dir) => write!(f, "{}", dir.display()),
        }
    }
}
