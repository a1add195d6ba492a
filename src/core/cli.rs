//! Command line interface for pssgfont
//!
//! Handles parsing command line arguments and provides validation for user
//! inputs. Values left out on the command line fall back to the user's
//! settings file, then to the built-in defaults.

use crate::atlas::Charset;
use crate::core::config_file::ConfigFile;
use crate::verify::AlignmentOptions;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// pssgfont CLI arguments
///
/// Examples:
///   pssgfont generate --font NotoSansKR-Bold.ttf --charset charset.txt
///   pssgfont convert out/font-atlas.json --output out
///   pssgfont merge out/generated_library --output out/node.xml
///   pssgfont compare out/node.xml --original game/libraries --chars "AB가"
///   pssgfont summary out/font-atlas.json
///   pssgfont init-config
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "pssgfont",
    version,
    about = "Builds PSSG node-graph fonts from MTSDF atlases",
    long_about = "pssgfont turns msdf-atlas-gen output into the seven PSSG font libraries, merges them into a node.xml the engine loads in place of its shipped font, and checks the generated glyph coordinates against the original."
)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub command: Command,

    /// Log debug output (RUST_LOG overrides)
    #[clap(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the full build: atlas generation, conversion, merge, DDS texture
    Generate(GenerateArgs),
    /// Convert existing atlas metadata into libraries and node.xml
    Convert(ConvertArgs),
    /// Merge a directory of LIBRARY_*.xml files into node.xml
    Merge(MergeArgs),
    /// Compare generated glyph coordinates against the original font
    Compare(CompareArgs),
    /// Print an overview of atlas metadata
    Summary(SummaryArgs),
    /// Write ~/.config/pssgfont/settings.json with the defaults
    InitConfig,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Font file (TTF/OTF) to rasterize
    #[clap(long)]
    pub font: PathBuf,

    /// Charset file in msdf-atlas-gen syntax; printable ASCII when omitted
    #[clap(long)]
    pub charset: Option<PathBuf>,

    /// Glyph size in pixels [default: 74]
    #[clap(long)]
    pub size: Option<u32>,

    /// Distance field range in pixels [default: 4]
    #[clap(long)]
    pub pxrange: Option<f64>,

    /// Shader instance and texture name [default: din_cnd_bold_msdf_0]
    #[clap(long)]
    pub font_name: Option<String>,

    #[clap(long, short = 'o', default_value = "output")]
    pub output: PathBuf,

    /// Directory with the game's LIBRARY_*.xml files; bundled set when omitted
    #[clap(long)]
    pub template: Option<PathBuf>,

    /// msdf-atlas-gen executable
    #[clap(long)]
    pub atlas_gen: Option<PathBuf>,

    /// texconv executable
    #[clap(long)]
    pub texconv: Option<PathBuf>,

    /// Keep the PNG atlas and skip DDS conversion
    #[clap(long)]
    pub no_texture: bool,

    /// Seconds before an external tool is abandoned [default: 300]
    #[clap(long)]
    pub timeout: Option<u64>,

    /// Extra attempts after an external tool fails [default: 1]
    #[clap(long)]
    pub retries: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    /// font-atlas.json written by msdf-atlas-gen
    pub atlas_json: PathBuf,

    /// Charset file restricting and ordering the glyphs; every atlas glyph when omitted
    #[clap(long)]
    pub charset: Option<PathBuf>,

    #[clap(long)]
    pub font_name: Option<String>,

    /// Texture id referenced by the shader instance [default: <font name>.png]
    #[clap(long)]
    pub texture_name: Option<String>,

    #[clap(long, short = 'o', default_value = "output")]
    pub output: PathBuf,

    #[clap(long)]
    pub template: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    /// Directory holding the seven LIBRARY_*.xml files
    pub library_dir: PathBuf,

    #[clap(long, short = 'o', default_value = "node.xml")]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    /// Generated node.xml or LIBRARY_*.xml directory
    pub generated: PathBuf,

    /// Original node.xml or LIBRARY_*.xml directory; the template directory
    /// from the settings file, then the bundled set, when omitted
    #[clap(long)]
    pub original: Option<PathBuf>,

    /// Characters to compare; each side's own characters when omitted
    #[clap(long)]
    pub chars: Option<String>,

    /// Compare in each file's own frame instead of aligning baselines
    #[clap(long)]
    pub no_baseline: bool,

    /// Also scale the original to the generated ascender-descender extent
    #[clap(long)]
    pub scale: bool,

    /// Write the report as JSON
    #[clap(long)]
    pub json: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SummaryArgs {
    pub atlas_json: PathBuf,
}

fn require_file(path: &Path, what: &str) -> Result<(), String> {
    if !path.is_file() {
        return Err(format!(
            "{what} does not exist: {}\nMake sure the path is correct and the file exists.",
            path.display()
        ));
    }
    Ok(())
}

fn require_dir(path: &Path, what: &str) -> Result<(), String> {
    if !path.is_dir() {
        return Err(format!(
            "{what} is not a directory: {}",
            path.display()
        ));
    }
    Ok(())
}

fn require_source(path: &Path, what: &str) -> Result<(), String> {
    if !path.exists() {
        return Err(format!(
            "{what} does not exist: {}\nExpected a node.xml file or a directory of LIBRARY_*.xml files.",
            path.display()
        ));
    }
    Ok(())
}

impl CliArgs {
    /// Validate the CLI arguments after parsing
    ///
    /// Checks that input paths exist before any stage runs, so mistakes are
    /// reported without partial output.
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Command::Generate(args) => {
                require_file(&args.font, "Font file")?;
                if let Some(charset) = &args.charset {
                    require_file(charset, "Charset file")?;
                }
                if let Some(template) = &args.template {
                    require_dir(template, "Template directory")?;
                }
                if args.size == Some(0) {
                    return Err("Glyph size must be greater than zero".to_string());
                }
                if args.pxrange.is_some_and(|r| !r.is_finite() || r <= 0.0) {
                    return Err("Distance range must be greater than zero".to_string());
                }
            }
            Command::Convert(args) => {
                require_file(&args.atlas_json, "Atlas metadata")?;
                if let Some(charset) = &args.charset {
                    require_file(charset, "Charset file")?;
                }
                if let Some(template) = &args.template {
                    require_dir(template, "Template directory")?;
                }
            }
            Command::Merge(args) => require_dir(&args.library_dir, "Library directory")?,
            Command::Compare(args) => {
                require_source(&args.generated, "Generated font")?;
                if let Some(original) = &args.original {
                    require_source(original, "Original font")?;
                }
                if args.chars.as_deref().is_some_and(|c| c.trim().is_empty()) {
                    return Err("--chars needs at least one character".to_string());
                }
            }
            Command::Summary(args) => require_file(&args.atlas_json, "Atlas metadata")?,
            Command::InitConfig => {}
        }
        Ok(())
    }
}

impl ConvertArgs {
    pub fn font_name(&self, config: &ConfigFile) -> String {
        self.font_name.clone().unwrap_or_else(|| config.font_name())
    }

    pub fn template_dir(&self, config: &ConfigFile) -> Option<PathBuf> {
        self.template.clone().or_else(|| config.template_dir.clone())
    }
}

impl GenerateArgs {
    pub fn font_name(&self, config: &ConfigFile) -> String {
        self.font_name.clone().unwrap_or_else(|| config.font_name())
    }

    pub fn template_dir(&self, config: &ConfigFile) -> Option<PathBuf> {
        self.template.clone().or_else(|| config.template_dir.clone())
    }
}

impl CompareArgs {
    pub fn alignment(&self) -> AlignmentOptions {
        AlignmentOptions {
            baseline: !self.no_baseline,
            scale: self.scale,
        }
    }

    /// Requested characters in order, duplicates removed
    pub fn char_list(&self) -> Option<Vec<char>> {
        self.chars
            .as_deref()
            .map(|text| Charset::from_chars(text.chars().filter(|c| !c.is_whitespace())).chars().to_vec())
    }
}
