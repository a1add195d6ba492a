//! `msdf-atlas-gen` invocation

use super::ExternalTool;
use crate::core::errors::{FileContext, PipelineError, PipelineResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Metadata file name the rest of the pipeline expects next to the atlas
pub const ATLAS_JSON_NAME: &str = "font-atlas.json";

#[derive(Debug, Clone, PartialEq)]
pub struct AtlasGenOptions {
    pub font: PathBuf,
    pub size: u32,
    pub pxrange: f64,
    /// Atlas image stem, normally the font name
    pub image_name: String,
    /// Charset file; `None` uses the generator's printable-ASCII default
    pub charset: Option<PathBuf>,
}

impl AtlasGenOptions {
    pub fn image_file(&self) -> String {
        format!("{}.png", self.image_name)
    }

    /// Arguments for a run whose working directory is the output directory
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-font".into(),
            self.font.clone().into(),
            "-type".into(),
            "mtsdf".into(),
            "-size".into(),
            self.size.to_string().into(),
            "-pxrange".into(),
            self.pxrange.to_string().into(),
            "-yorigin".into(),
            "bottom".into(),
            "-imageout".into(),
            self.image_file().into(),
            "-json".into(),
            ATLAS_JSON_NAME.into(),
        ];
        if let Some(charset) = &self.charset {
            args.push("-charset".into());
            args.push(charset.clone().into());
        }
        args
    }
}

/// Files left behind by a successful generator run
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasOutputs {
    pub json: PathBuf,
    pub image: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AtlasGenerator {
    pub tool: ExternalTool,
}

impl AtlasGenerator {
    pub fn new(tool: ExternalTool) -> Self {
        Self { tool }
    }

    pub async fn generate(
        &self,
        options: &AtlasGenOptions,
        output_dir: &Path,
    ) -> PipelineResult<AtlasOutputs> {
        // the tool runs inside output_dir, so caller-relative inputs must be absolute
        let mut options = options.clone();
        options.font = std::path::absolute(&options.font).with_file_context("resolve", &options.font)?;
        if let Some(charset) = options.charset.take() {
            options.charset =
                Some(std::path::absolute(&charset).with_file_context("resolve", &charset)?);
        }

        let output = self
            .tool
            .run(&options.args(), output_dir, Path::new(ATLAS_JSON_NAME))
            .await?;
        let image = output_dir.join(options.image_file());
        if !image.exists() {
            return Err(PipelineError::ExternalToolFailure {
                tool: self.tool.name.to_string(),
                reason: format!("exited successfully but did not write {}", image.display()),
            });
        }
        tracing::info!("Generated MTSDF atlas {}", output.output.display());
        Ok(AtlasOutputs {
            json: output.output,
            image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(charset: Option<&str>) -> AtlasGenOptions {
        AtlasGenOptions {
            font: PathBuf::from("/fonts/NotoSansKR-Bold.ttf"),
            size: 74,
            pxrange: 4.0,
            image_name: "din_cnd_bold_msdf_0".to_string(),
            charset: charset.map(PathBuf::from),
        }
    }

    #[test]
    fn test_arguments_follow_the_generator_contract() {
        let args: Vec<String> = options(None)
            .args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-font",
                "/fonts/NotoSansKR-Bold.ttf",
                "-type",
                "mtsdf",
                "-size",
                "74",
                "-pxrange",
                "4",
                "-yorigin",
                "bottom",
                "-imageout",
                "din_cnd_bold_msdf_0.png",
                "-json",
                "font-atlas.json",
            ]
        );

        let with_charset = options(Some("/fonts/charset.txt")).args();
        assert_eq!(with_charset[with_charset.len() - 2], "-charset");
        assert_eq!(with_charset[with_charset.len() - 1], "/fonts/charset.txt");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_generate_with_a_stand_in_program() {
        let dir = tempfile::tempdir().unwrap();
        let program = crate::tools::test_support::fake_program(
            dir.path(),
            "fake-atlas-gen",
            r#"echo '{}' > font-atlas.json; touch din_cnd_bold_msdf_0.png"#,
        );
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();

        let generator = AtlasGenerator::new(ExternalTool::new("msdf-atlas-gen", program));
        let outputs = generator.generate(&options(None), &out).await.unwrap();
        assert_eq!(outputs.json, out.join(ATLAS_JSON_NAME));
        assert!(outputs.image.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_atlas_image_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let program = crate::tools::test_support::fake_program(
            dir.path(),
            "fake-atlas-gen",
            r#"echo '{}' > font-atlas.json"#,
        );
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();

        let generator = AtlasGenerator::new(ExternalTool::new("msdf-atlas-gen", program));
        let err = generator.generate(&options(None), &out).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("din_cnd_bold_msdf_0.png"), "{err}");
    }
}
