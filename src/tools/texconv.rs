//! `texconv` invocation: atlas PNG -> uncompressed sRGB DDS

use super::ExternalTool;
use crate::core::errors::{FileContext, PipelineResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct TextureCompressor {
    pub tool: ExternalTool,
}

impl TextureCompressor {
    pub fn new(tool: ExternalTool) -> Self {
        Self { tool }
    }

    pub fn args(png: &Path, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-f", "R8G8B8A8_UNORM", "-w", "0", "-h", "0", "-m", "1", "-srgb", "-y", "-o"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(output_dir.as_os_str().to_owned());
        args.push(png.as_os_str().to_owned());
        args
    }

    /// Name of the DDS written for `png`
    pub fn dds_name(png: &Path) -> PathBuf {
        png.with_extension("dds")
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("texture.dds"))
    }

    /// Convert `png`, writing `<stem>.dds` into `output_dir`
    pub async fn compress(&self, png: &Path, output_dir: &Path) -> PipelineResult<PathBuf> {
        let png = std::path::absolute(png).with_file_context("resolve", png)?;
        let output_dir = std::path::absolute(output_dir).with_file_context("resolve", output_dir)?;
        let output = self
            .tool
            .run(
                &Self::args(&png, &output_dir),
                &output_dir,
                &Self::dds_name(&png),
            )
            .await?;
        tracing::info!("Converted texture to {}", output.output.display());
        Ok(output.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_and_output_name() {
        let args = TextureCompressor::args(Path::new("/out/font.png"), Path::new("/out"));
        let args: Vec<&str> = args.iter().filter_map(|a| a.to_str()).collect();
        assert_eq!(
            args,
            vec![
                "-f",
                "R8G8B8A8_UNORM",
                "-w",
                "0",
                "-h",
                "0",
                "-m",
                "1",
                "-srgb",
                "-y",
                "-o",
                "/out",
                "/out/font.png"
            ]
        );
        assert_eq!(
            TextureCompressor::dds_name(Path::new("/out/din_cnd_bold_msdf_0.png")),
            PathBuf::from("din_cnd_bold_msdf_0.dds")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_dds_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("font.png");
        std::fs::write(&png, b"png").unwrap();

        let quiet = crate::tools::test_support::fake_program(dir.path(), "quiet", "exit 0");
        let compressor = TextureCompressor::new(ExternalTool::new("texconv", quiet));
        assert!(compressor.compress(&png, dir.path()).await.is_err());

        let working = crate::tools::test_support::fake_program(dir.path(), "working", "touch font.dds");
        let compressor = TextureCompressor::new(ExternalTool::new("texconv", working));
        let dds = compressor.compress(&png, dir.path()).await.unwrap();
        assert_eq!(dds, dir.path().join("font.dds"));
    }
}
