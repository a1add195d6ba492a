//! Application runner logic
//!
//! Dispatches each subcommand to the pipeline

use crate::atlas::{AtlasMetadata, AtlasSummary, Charset};
use crate::core::cli::{CliArgs, Command, CompareArgs, ConvertArgs, GenerateArgs};
use crate::core::config_file::ConfigFile;
use crate::core::errors::PipelineResult;
use crate::library::synth::FontNaming;
use crate::logging;
use crate::merge::write_atomic;
use crate::pipeline::{self, CancelFlag, ConvertRequest, GenerateRequest};
use crate::template::ReferenceTemplate;
use crate::tools::{AtlasGenOptions, AtlasGenerator, ExternalTool, TextureCompressor};
use crate::verify::LibrarySet;
use anyhow::{anyhow, Context, Result};

/// Run the command selected on the command line.
pub fn run_app(cli_args: CliArgs) -> Result<()> {
    if let Command::InitConfig = cli_args.command {
        return ConfigFile::initialize_config_directory()
            .context("Failed to initialize config directory");
    }

    let _log_guard = logging::init(cli_args.verbose);
    cli_args.validate().map_err(|message| anyhow!(message))?;
    let config = ConfigFile::load().unwrap_or_default();

    match &cli_args.command {
        Command::Generate(args) => run_generate(args, &config),
        Command::Convert(args) => run_convert(args, &config),
        Command::Merge(args) => {
            let document = pipeline::merge_directory(&args.library_dir, &args.output)?;
            println!(
                "Merged {} ids into {}",
                document.id_count(),
                args.output.display()
            );
            Ok(())
        }
        Command::Compare(args) => run_compare(args, &config),
        Command::Summary(args) => {
            let summary = AtlasSummary::of(&AtlasMetadata::load(&args.atlas_json)?);
            tracing::info!("Atlas summary for {}", args.atlas_json.display());
            println!("{summary}");
            Ok(())
        }
        Command::InitConfig => Ok(()),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

/// Run a synchronous stage sequence while Ctrl-C sets the cancel flag
fn run_cancellable<T, F>(stages: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&CancelFlag) -> PipelineResult<T> + Send + 'static,
{
    let cancel = CancelFlag::new();
    runtime()?.block_on(async move {
        cancel.listen_for_ctrl_c();
        let result = tokio::task::spawn_blocking(move || stages(&cancel))
            .await
            .context("Pipeline task failed")?;
        Ok::<T, anyhow::Error>(result?)
    })
}

fn run_convert(args: &ConvertArgs, config: &ConfigFile) -> Result<()> {
    let charset = args.charset.as_deref().map(Charset::load).transpose()?;
    let mut naming = FontNaming::new(args.font_name(config));
    if let Some(texture_name) = &args.texture_name {
        naming = naming.with_texture_name(texture_name.clone());
    }
    let request = ConvertRequest {
        atlas_json: args.atlas_json.clone(),
        charset,
        template_dir: args.template_dir(config),
        output_dir: args.output.clone(),
        naming,
    };

    let outcome = run_cancellable(move |cancel| pipeline::convert(&request, cancel))?;
    println!(
        "Wrote {} with {} glyphs ({} metrics only)",
        outcome.document.display(),
        outcome.glyph_count,
        outcome.skipped.len()
    );
    Ok(())
}

fn run_generate(args: &GenerateArgs, config: &ConfigFile) -> Result<()> {
    let timeout = args
        .timeout
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| config.tool_timeout());
    let font_name = args.font_name(config);

    let generator = AtlasGenerator::new(
        ExternalTool::new(
            "msdf-atlas-gen",
            args.atlas_gen.clone().unwrap_or_else(|| config.atlas_generator()),
        )
        .with_timeout(timeout),
    );
    let compressor = (!args.no_texture).then(|| {
        TextureCompressor::new(
            ExternalTool::new(
                "texconv",
                args.texconv.clone().unwrap_or_else(|| config.texture_compressor()),
            )
            .with_timeout(timeout),
        )
    });

    let request = GenerateRequest {
        atlas: AtlasGenOptions {
            font: args.font.clone(),
            size: args.size.unwrap_or_else(|| config.font_size()),
            pxrange: args.pxrange.unwrap_or_else(|| config.pxrange()),
            image_name: font_name.clone(),
            charset: args.charset.clone(),
        },
        generator,
        compressor,
        template_dir: args.template_dir(config),
        output_dir: args.output.clone(),
        font_name,
        retries: args.retries.unwrap_or_else(|| config.tool_retries()),
    };

    let cancel = CancelFlag::new();
    let outcome = runtime()?.block_on(async {
        cancel.listen_for_ctrl_c();
        pipeline::generate(&request, &cancel).await
    })?;

    println!(
        "Wrote {} with {} glyphs",
        outcome.convert.document.display(),
        outcome.convert.glyph_count
    );
    if let Some(texture) = outcome.texture {
        println!("Texture: {}", texture.display());
    }
    Ok(())
}

fn run_compare(args: &CompareArgs, config: &ConfigFile) -> Result<()> {
    let generated = LibrarySet::load(&args.generated)?;
    let original = match args.original.as_ref().or(config.template_dir.as_ref()) {
        Some(path) => LibrarySet::load(path)?,
        None => LibrarySet::from_template(&ReferenceTemplate::bundled()?),
    };
    tracing::info!(
        "Comparing {} against {}",
        generated.source.display(),
        original.source.display()
    );

    let chars = args.char_list();
    let report =
        pipeline::compare_libraries(&original, &generated, chars.as_deref(), args.alignment())?;
    println!("{report}");

    if let Some(path) = &args.json {
        let json = report.to_json().context("Failed to serialize comparison report")?;
        write_atomic(path, json.as_bytes())?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}
