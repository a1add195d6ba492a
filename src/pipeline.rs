//! Pipeline orchestration
//!
//! Sequences the stages of a font build and the verification run. The core
//! stages are synchronous; only the external tools run on the async runtime.
//! Cancellation is checked between stages, never inside one, and a cancelled
//! run writes nothing after the check that noticed it. Output files are
//! staged next to their destination and only moved into place once the whole
//! set is on disk.

use crate::atlas::{ingest, ingest_all, AtlasMetadata, Charset, GlyphTable};
use crate::core::errors::{describe_chars, FileContext, PipelineError, PipelineResult};
use crate::library::synth::{synthesize_all, FontNaming};
use crate::library::LibrarySchema;
use crate::merge::{write_atomic, MergeEngine, MergedDocument};
use crate::template::ReferenceTemplate;
use crate::tools::{AtlasGenOptions, AtlasGenerator, TextureCompressor};
use crate::verify::{self, AlignmentOptions, ComparisonReport, LibrarySet, Origin, UndecodedGlyph};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DOCUMENT_NAME: &str = "node.xml";
pub const LIBRARY_DIR_NAME: &str = "generated_library";
pub const SKIPPED_GLYPHS_NAME: &str = "skipped_glyphs.txt";

const RETRY_DELAY: Duration = Duration::from_millis(500);
const STAGING_PREFIX: &str = ".pssgfont-";

/// Shared cancellation request, set from a signal handler
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` if a cancellation was requested before `stage`
    pub fn checkpoint(&self, stage: &'static str) -> PipelineResult<()> {
        if self.is_cancelled() {
            tracing::warn!("Cancelled before {}", stage);
            return Err(PipelineError::Cancelled { stage });
        }
        Ok(())
    }

    /// Set the flag on Ctrl-C; must be called inside a tokio runtime
    pub fn listen_for_ctrl_c(&self) {
        let flag = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current stage");
                flag.cancel();
            }
        });
    }
}

/// Inputs of the atlas -> node graph conversion
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub atlas_json: PathBuf,
    /// Characters to emit, in order; `None` takes every generated glyph
    pub charset: Option<Charset>,
    pub template_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub naming: FontNaming,
}

#[derive(Debug, Clone)]
pub struct ConvertOutcome {
    pub document: PathBuf,
    pub libraries: Vec<PathBuf>,
    pub glyph_count: usize,
    pub id_count: usize,
    /// Metrics-only glyphs, in charset order
    pub skipped: Vec<char>,
    pub skipped_report: Option<PathBuf>,
}

fn load_glyphs(request: &ConvertRequest) -> PipelineResult<GlyphTable> {
    let metadata = AtlasMetadata::load(&request.atlas_json)?;
    match &request.charset {
        Some(charset) => ingest(&metadata, charset),
        None => ingest_all(&metadata),
    }
}

/// One line with every metrics-only character, as written next to the libraries
pub fn skipped_glyphs_text(skipped: &[char]) -> String {
    let mut line: String = skipped.iter().collect();
    line.push('\n');
    line
}

/// Build the merged document without touching the filesystem
pub fn build_document(
    glyphs: &GlyphTable,
    template: &ReferenceTemplate,
    naming: &FontNaming,
    cancel: &CancelFlag,
) -> PipelineResult<MergedDocument> {
    let schema = LibrarySchema::standard();
    cancel.checkpoint("synthesis")?;
    let font = synthesize_all(glyphs, template, &schema, naming)?;
    cancel.checkpoint("merge")?;
    MergeEngine::new(&schema, &font.shape).merge(&font.fragments, &glyphs.characters())
}

/// Atlas metadata -> `node.xml` plus the per-library files
pub fn convert(request: &ConvertRequest, cancel: &CancelFlag) -> PipelineResult<ConvertOutcome> {
    cancel.checkpoint("ingest")?;
    let glyphs = load_glyphs(request)?;
    cancel.checkpoint("template loading")?;
    let template = ReferenceTemplate::load(request.template_dir.as_deref())?;
    tracing::info!("Using reference template from {}", template.source);

    let document = build_document(&glyphs, &template, &request.naming, cancel)?;
    cancel.checkpoint("writing output")?;

    let output_dir = &request.output_dir;
    std::fs::create_dir_all(output_dir).with_file_context("create", output_dir)?;
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(output_dir)
        .with_file_context("create staging directory in", output_dir)?;

    let staged_libraries = staging.path().join(LIBRARY_DIR_NAME);
    std::fs::create_dir(&staged_libraries).with_file_context("create", &staged_libraries)?;
    let staged = document.write_libraries(&staged_libraries)?;
    let skipped: Vec<char> = glyphs.metrics_only().map(|g| g.character).collect();
    if !skipped.is_empty() {
        let path = staged_libraries.join(SKIPPED_GLYPHS_NAME);
        write_atomic(&path, skipped_glyphs_text(&skipped).as_bytes())?;
    }
    document.write(&staging.path().join(DOCUMENT_NAME))?;

    let library_dir = output_dir.join(LIBRARY_DIR_NAME);
    let document_path = output_dir.join(DOCUMENT_NAME);
    publish(staging.path(), &library_dir, &document_path)?;

    let libraries = staged
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| library_dir.join(name))
        .collect();
    let skipped_report = (!skipped.is_empty()).then(|| library_dir.join(SKIPPED_GLYPHS_NAME));
    if let Some(path) = &skipped_report {
        tracing::info!("{} metrics-only glyphs listed in {}", skipped.len(), path.display());
    }
    tracing::info!(
        "Wrote {} ({} glyphs, {} ids)",
        document_path.display(),
        glyphs.len(),
        document.id_count()
    );

    Ok(ConvertOutcome {
        document: document_path,
        libraries,
        glyph_count: glyphs.len(),
        id_count: document.id_count(),
        skipped,
        skipped_report,
    })
}

/// Move a staged library directory and document into place
///
/// A previous library directory is kept inside `staging` until the document
/// is replaced, and put back if either move fails.
fn publish(staging: &Path, library_dir: &Path, document_path: &Path) -> PipelineResult<()> {
    let previous = staging.join("previous");
    let had_previous = library_dir.exists();
    if had_previous {
        std::fs::rename(library_dir, &previous).with_file_context("move aside", library_dir)?;
    }
    let restore = || {
        if had_previous {
            if let Err(e) = std::fs::rename(&previous, library_dir) {
                tracing::error!("Could not restore {}: {}", library_dir.display(), e);
            }
        }
    };

    if let Err(e) = std::fs::rename(staging.join(LIBRARY_DIR_NAME), library_dir) {
        restore();
        return Err(e).with_file_context("replace", library_dir);
    }
    if let Err(e) = std::fs::rename(staging.join(DOCUMENT_NAME), document_path) {
        if let Err(e) = std::fs::remove_dir_all(library_dir) {
            tracing::error!("Could not remove {}: {}", library_dir.display(), e);
        }
        restore();
        return Err(e).with_file_context("replace", document_path);
    }
    Ok(())
}

/// Seven `LIBRARY_*.xml` files -> one validated `node.xml`
pub fn merge_directory(library_dir: &Path, output: &Path) -> PipelineResult<MergedDocument> {
    let libraries = ReferenceTemplate::load_dir(library_dir)?;
    let document = MergedDocument::from_libraries(&libraries, &LibrarySchema::standard())?;
    document.write(output)?;
    tracing::info!("Merged {} into {}", library_dir.display(), output.display());
    Ok(document)
}

/// Run `operation` until it succeeds, fails for good, or `attempts` runs out
pub async fn with_retries<T, F, Fut>(stage: &str, attempts: u32, mut operation: F) -> PipelineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PipelineResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::warn!("{} failed (attempt {}/{}): {}", stage, attempt, attempts, e);
                attempt += 1;
                tokio::time::sleep(RETRY_DELAY).await;
            }
            result => return result,
        }
    }
}

/// Full build: atlas generator, conversion, texture compression
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub atlas: AtlasGenOptions,
    pub generator: AtlasGenerator,
    pub compressor: Option<TextureCompressor>,
    pub template_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub font_name: String,
    pub retries: u32,
}

#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub convert: ConvertOutcome,
    pub texture: Option<PathBuf>,
}

pub async fn generate(request: &GenerateRequest, cancel: &CancelFlag) -> PipelineResult<GenerateOutcome> {
    let attempts = request.retries.saturating_add(1);
    // the generator sorts its charset by codepoint; the libraries follow the file
    let charset = match &request.atlas.charset {
        Some(path) => Charset::load(path)?,
        None => Charset::basic(),
    };
    std::fs::create_dir_all(&request.output_dir).with_file_context("create", &request.output_dir)?;

    tracing::info!("[1/4] Generating MTSDF atlas");
    cancel.checkpoint("atlas generation")?;
    let atlas = with_retries("atlas generation", attempts, || {
        request.generator.generate(&request.atlas, &request.output_dir)
    })
    .await?;

    tracing::info!("[2/4] Converting atlas metadata to libraries");
    tracing::info!("[3/4] Merging libraries");
    let convert_request = ConvertRequest {
        atlas_json: atlas.json,
        charset: Some(charset),
        template_dir: request.template_dir.clone(),
        output_dir: request.output_dir.clone(),
        naming: FontNaming::new(request.font_name.clone())
            .with_texture_name(request.atlas.image_file()),
    };
    // off the runtime thread, so the Ctrl-C listener keeps running
    let blocking_cancel = cancel.clone();
    let converted = match tokio::task::spawn_blocking(move || convert(&convert_request, &blocking_cancel)).await {
        Ok(result) => result?,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => return Err(PipelineError::Cancelled { stage: "conversion" }),
    };

    let texture = match &request.compressor {
        Some(compressor) => {
            tracing::info!("[4/4] Converting atlas texture to DDS");
            cancel.checkpoint("texture conversion")?;
            Some(
                with_retries("texture conversion", attempts, || {
                    compressor.compress(&atlas.image, &request.output_dir)
                })
                .await?,
            )
        }
        None => {
            tracing::info!("[4/4] Texture conversion skipped");
            None
        }
    };
    cancel.checkpoint("completion")?;

    Ok(GenerateOutcome {
        convert: converted,
        texture,
    })
}

/// Coordinate sets on both sides, then the aligned comparison
///
/// With `chars`, every listed character must exist on both sides. Without,
/// each side contributes the characters it has and the report lists the
/// presence differences.
pub fn compare_libraries(
    original: &LibrarySet,
    generated: &LibrarySet,
    chars: Option<&[char]>,
    options: AlignmentOptions,
) -> PipelineResult<ComparisonReport> {
    let Some(chars) = chars else {
        let (old, old_missing) = verify::extract_available(original, &original.characters(), Origin::Original)?;
        let (new, new_missing) = verify::extract_available(generated, &generated.characters(), Origin::Generated)?;
        let mut report = verify::compare(&old, &new, options);
        for (origin, missing) in [(Origin::Original, old_missing), (Origin::Generated, new_missing)] {
            if !missing.is_empty() {
                tracing::warn!(
                    "Render nodes in {} libraries could not be decoded: {}",
                    origin,
                    describe_chars(&missing)
                );
            }
            report
                .undecoded
                .extend(missing.into_iter().map(|c| UndecodedGlyph::new(origin, c)));
        }
        return Ok(report);
    };
    let old = verify::extract(original, chars, Origin::Original)?;
    let new = verify::extract(generated, chars, Origin::Generated)?;
    Ok(verify::compare(&old, &new, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::test_support::ATLAS_ABC;
    use crate::library::LibraryKind;

    fn request(dir: &Path) -> ConvertRequest {
        let atlas_json = dir.join("font-atlas.json");
        std::fs::write(&atlas_json, ATLAS_ABC).unwrap();
        ConvertRequest {
            atlas_json,
            charset: None,
            template_dir: None,
            output_dir: dir.join("out"),
            naming: FontNaming::new("din_cnd_bold_msdf_0"),
        }
    }

    #[test]
    fn test_convert_writes_document_and_libraries() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = convert(&request(dir.path()), &CancelFlag::new()).unwrap();

        assert!(outcome.document.exists());
        assert_eq!(outcome.libraries.len(), 7);
        assert_eq!(outcome.glyph_count, 4);
        assert_eq!(outcome.skipped, vec![' ']);
        let report = outcome.skipped_report.as_ref().unwrap();
        assert_eq!(std::fs::read_to_string(report).unwrap(), " \n");
        let set = LibrarySet::load(&outcome.document).unwrap();
        assert_eq!(set.characters(), vec![' ', 'B', 'A', 'C']);
        for kind in LibraryKind::ALL {
            assert!(outcome.libraries.contains(&dir.path().join("out").join(LIBRARY_DIR_NAME).join(kind.file_name())));
        }
    }

    #[test]
    fn test_cancelled_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = convert(&request(dir.path()), &cancel).unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { stage: "ingest" }));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_charset_missing_glyphs_fail_the_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(dir.path());
        req.charset = Some(Charset::from_text("AZB가"));
        match convert(&req, &CancelFlag::new()) {
            Err(PipelineError::MissingGlyph { missing }) => assert_eq!(missing, vec!['Z', '가']),
            other => panic!("expected MissingGlyph, got {other:?}"),
        }
        assert!(!dir.path().join("out").join(DOCUMENT_NAME).exists());
    }

    #[test]
    fn test_skipped_glyph_line() {
        assert_eq!(skipped_glyphs_text(&[' ', '\u{3000}']), " \u{3000}\n");
    }

    #[tokio::test]
    async fn test_retries_only_retryable_failures() {
        let mut calls = 0;
        let result: PipelineResult<()> = with_retries("tool", 3, || {
            calls += 1;
            async {
                Err(PipelineError::ExternalToolFailure {
                    tool: "t".to_string(),
                    reason: "flaky".to_string(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);

        let mut calls = 0;
        let result: PipelineResult<()> = with_retries("ingest", 3, || {
            calls += 1;
            async { Err(PipelineError::MissingGlyph { missing: vec!['A'] }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_compare_without_chars_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = convert(&request(dir.path()), &CancelFlag::new()).unwrap();
        let original = LibrarySet::from_template(&ReferenceTemplate::bundled().unwrap());
        let generated = LibrarySet::load(&outcome.document).unwrap();

        let report = compare_libraries(
            &original,
            &generated,
            None,
            AlignmentOptions {
                baseline: true,
                scale: false,
            },
        )
        .unwrap();
        assert_eq!(report.count(verify::Presence::InBoth), 1);
        assert_eq!(report.count(verify::Presence::OnlyInNew), 3);

        let strict = compare_libraries(&original, &generated, Some(&['A', 'B']), AlignmentOptions::default());
        assert!(matches!(
            strict,
            Err(PipelineError::CharacterNotFound {
                origin: Origin::Original,
                ..
            })
        ));
    }
    #[test]
    fn test_failed_publish_keeps_the_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let previous = out.join(LIBRARY_DIR_NAME);
        std::fs::create_dir_all(&previous).unwrap();
        std::fs::write(previous.join("LIBRARY_NODE.xml"), "previous run").unwrap();
        // a directory where node.xml should go makes the final move fail
        std::fs::create_dir_all(out.join(DOCUMENT_NAME).join("blocked")).unwrap();

        let err = convert(&request(dir.path()), &CancelFlag::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }), "{err:?}");

        assert_eq!(
            std::fs::read_to_string(previous.join("LIBRARY_NODE.xml")).unwrap(),
            "previous run"
        );
        assert_eq!(std::fs::read_dir(&previous).unwrap().count(), 1);
        let mut entries: Vec<String> = std::fs::read_dir(&out)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        assert_eq!(entries, vec![DOCUMENT_NAME.to_string(), LIBRARY_DIR_NAME.to_string()]);
    }

    #[test]
    fn test_convert_replaces_an_earlier_run() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("out").join(LIBRARY_DIR_NAME).join("stale.txt");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, "old").unwrap();

        let outcome = convert(&request(dir.path()), &CancelFlag::new()).unwrap();
        assert!(!stale.exists());
        assert!(outcome.libraries.iter().all(|path| path.exists()));
        let leftovers = std::fs::read_dir(dir.path().join("out"))
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with(STAGING_PREFIX)
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    fn clear_datablock(element: &mut crate::pssg::Element, id: &str) {
        if element.id() == Some(id) {
            for data in element.children.iter_mut().filter(|c| c.name == "DATABLOCKDATA") {
                data.text = Some(String::new());
            }
        }
        for child in &mut element.children {
            clear_datablock(child, id);
        }
    }

    #[test]
    fn test_compare_lists_glyphs_that_do_not_decode() {
        let glyphs = crate::library::synth::test_support::table(ATLAS_ABC);
        let document = build_document(
            &glyphs,
            &ReferenceTemplate::bundled().unwrap(),
            &FontNaming::new("din_cnd_bold_msdf_0"),
            &CancelFlag::new(),
        )
        .unwrap();
        let mut root = document.root().clone();
        let block_id = {
            let node = root
                .descendants()
                .into_iter()
                .find(|el| el.name == "RENDERNODE" && el.id() == Some("65"))
                .unwrap();
            let indices = node.child("RENDERSTREAMINSTANCE").unwrap().attr("indices").unwrap();
            let source = root.find_by_id(indices.trim_start_matches('#')).unwrap();
            let block = source.child("RENDERSTREAM").unwrap().attr("dataBlock").unwrap();
            block.trim_start_matches('#').to_string()
        };
        clear_datablock(&mut root, &block_id);
        let broken = LibrarySet::from_document(&root);

        let report = compare_libraries(&broken, &broken, None, AlignmentOptions::default()).unwrap();
        let undecoded: Vec<(Origin, char)> = report.undecoded.iter().map(|u| (u.origin, u.character)).collect();
        assert_eq!(undecoded, vec![(Origin::Original, 'A'), (Origin::Generated, 'A')]);
        assert!(report.deltas.iter().all(|d| d.character != 'A'));
        assert!(report.to_string().contains("U+0041"));
    }

    #[cfg(unix)]
    fn generate_request(dir: &Path, charset: &str, first_attempt_fails: bool) -> GenerateRequest {
        use crate::tools::test_support::fake_program;
        use crate::tools::ExternalTool;

        let fixture = dir.join("fixture.json");
        std::fs::write(&fixture, ATLAS_ABC).unwrap();
        let charset_path = dir.join("charset.txt");
        std::fs::write(&charset_path, charset).unwrap();

        let flaky = if first_attempt_fails {
            "if [ ! -f attempted ]; then touch attempted; exit 1; fi\n"
        } else {
            ""
        };
        let atlas_gen = fake_program(
            dir,
            "fake-atlas-gen",
            &format!(
                "{flaky}cp '{}' font-atlas.json\ntouch din_cnd_bold_msdf_0.png",
                fixture.display()
            ),
        );
        let texconv = fake_program(dir, "fake-texconv", "touch din_cnd_bold_msdf_0.dds");

        GenerateRequest {
            atlas: AtlasGenOptions {
                font: dir.join("font.ttf"),
                size: 74,
                pxrange: 4.0,
                image_name: "din_cnd_bold_msdf_0".to_string(),
                charset: Some(charset_path),
            },
            generator: AtlasGenerator::new(ExternalTool::new("msdf-atlas-gen", atlas_gen)),
            compressor: Some(TextureCompressor::new(ExternalTool::new("texconv", texconv))),
            template_dir: None,
            output_dir: dir.join("out"),
            font_name: "din_cnd_bold_msdf_0".to_string(),
            retries: 1,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_generate_builds_every_output_in_charset_order() {
        let dir = tempfile::tempdir().unwrap();
        let request = generate_request(dir.path(), "\"CA B\"", true);
        let outcome = generate(&request, &CancelFlag::new()).await.unwrap();

        let out = dir.path().join("out");
        assert_eq!(outcome.texture, Some(out.join("din_cnd_bold_msdf_0.dds")));
        assert_eq!(outcome.convert.document, out.join(DOCUMENT_NAME));
        assert_eq!(outcome.convert.glyph_count, 4);
        assert_eq!(outcome.convert.skipped, vec![' ']);
        let set = LibrarySet::load(&outcome.convert.document).unwrap();
        assert_eq!(set.characters(), vec!['C', 'A', ' ', 'B']);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_generate_fails_on_glyphs_the_atlas_lacks() {
        let dir = tempfile::tempdir().unwrap();
        let request = generate_request(dir.path(), "\"AZ\"", false);
        match generate(&request, &CancelFlag::new()).await {
            Err(PipelineError::MissingGlyph { missing }) => assert_eq!(missing, vec!['Z']),
            other => panic!("expected MissingGlyph, got {other:?}"),
        }
        let out = dir.path().join("out");
        assert!(!out.join(DOCUMENT_NAME).exists());
        assert!(!out.join(LIBRARY_DIR_NAME).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interrupt_during_the_run_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = generate_request(dir.path(), "\"AB\"", false);
        let cancel = CancelFlag::new();
        let flag = cancel.clone();
        let compressor = request.compressor.take().unwrap();
        let slow = crate::tools::test_support::fake_program(
            dir.path(),
            "slow-texconv",
            "sleep 0.3\ntouch din_cnd_bold_msdf_0.dds",
        );
        request.compressor = Some(TextureCompressor::new(crate::tools::ExternalTool {
            program: slow,
            ..compressor.tool
        }));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            flag.cancel();
        });
        let result = generate(&request, &cancel).await;
        assert!(matches!(result, Err(PipelineError::Cancelled { .. })), "{result:?}");
    }
}
