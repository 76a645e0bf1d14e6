//! Tesseract command-line engine
//!
//! Runs the `tesseract` binary on a temporary PNG and parses its TSV output,
//! which carries a confidence per word.

use async_trait::async_trait;
use image::RgbaImage;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::recognition::{EngineFactory, EngineOutput, RecognitionConfig, RecognitionEngine};
use crate::error::RecognitionError;

/// Checks the installation and builds [`TesseractEngine`]s
pub struct TesseractFactory {
    config: RecognitionConfig,
}

impl TesseractFactory {
    pub fn new(config: RecognitionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineFactory for TesseractFactory {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn create(&self) -> Result<Arc<dyn RecognitionEngine>, RecognitionError> {
        let output = Command::new(&self.config.tesseract_path)
            .arg("--list-langs")
            .output()
            .await
            .map_err(|e| {
                RecognitionError::EngineUnavailable(format!(
                    "Failed to run {}: {}",
                    self.config.tesseract_path, e
                ))
            })?;

        if !output.status.success() {
            return Err(RecognitionError::EngineUnavailable(format!(
                "tesseract --list-langs failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // Older versions print the list on stderr
        let listing = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let languages = parse_language_list(&listing);
        if !languages.iter().any(|l| l == &self.config.language) {
            return Err(RecognitionError::EngineUnavailable(format!(
                "Language data '{}' not installed (available: {})",
                self.config.language,
                languages.join(", ")
            )));
        }

        debug!("Tesseract languages: {:?}", languages);
        Ok(Arc::new(TesseractEngine {
            config: self.config.clone(),
            temp_dir: std::env::temp_dir(),
        }))
    }
}

/// One configured tesseract invocation
pub struct TesseractEngine {
    config: RecognitionConfig,
    /// Where input images are written for the binary to read
    temp_dir: PathBuf,
}

impl TesseractEngine {
    fn temp_input_path(&self) -> PathBuf {
        self.temp_dir
            .join(format!("cardscan_ocr_{}.png", uuid::Uuid::new_v4()))
    }

    async fn write_input(&self, image: &RgbaImage) -> Result<PathBuf, RecognitionError> {
        let path = self.temp_input_path();
        let image = image.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || image.save(&target))
            .await
            .map_err(|e| RecognitionError::InvalidImage(format!("Temp file writer failed: {}", e)))?
            .map_err(|e| RecognitionError::InvalidImage(format!("Failed to write temp file: {}", e)))?;
        Ok(path)
    }
}

#[async_trait]
impl RecognitionEngine for TesseractEngine {
    async fn recognize(&self, image: &RgbaImage) -> Result<EngineOutput, RecognitionError> {
        let input_path = self.write_input(image).await?;

        let run = Command::new(&self.config.tesseract_path)
            .arg(&input_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.language)
            .arg("--psm")
            .arg(self.config.page_seg_mode.to_string())
            .arg("tsv")
            .kill_on_drop(true)
            .output();
        let result = tokio::time::timeout(Duration::from_secs(self.config.timeout_secs), run).await;

        if let Err(e) = tokio::fs::remove_file(&input_path).await {
            debug!("Failed to remove {:?}: {}", input_path, e);
        }

        let output = result
            .map_err(|_| {
                RecognitionError::EngineUnavailable(format!(
                    "tesseract timed out after {}s",
                    self.config.timeout_secs
                ))
            })?
            .map_err(|e| RecognitionError::EngineUnavailable(format!("Failed to run tesseract: {}", e)))?;

        if !output.status.success() {
            return Err(RecognitionError::EngineUnavailable(format!(
                "tesseract failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Language codes from `tesseract --list-langs`
fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of") && !l.contains(' '))
        .map(str::to_string)
        .collect()
}

/// Rebuild text lines and mean word confidence from TSV output
///
/// Columns: level, page, block, par, line, word, left, top, width, height,
/// conf, text. Only word rows (level 5) with a non-negative confidence count.
pub fn parse_tsv(tsv: &str) -> EngineOutput {
    let mut lines: BTreeMap<(u32, u32, u32, u32), Vec<String>> = BTreeMap::new();
    let mut confidence_sum = 0.0f32;
    let mut words = 0usize;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }

        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if conf < 0.0 || text.is_empty() {
            continue;
        }

        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        lines.entry(key).or_default().push(text.to_string());
        confidence_sum += conf;
        words += 1;
    }

    let text = lines
        .values()
        .map(|words| words.join(" "))
        .collect::<Vec<_>>()
        .join("\n");

    EngineOutput {
        text,
        confidence: if words == 0 {
            0.0
        } else {
            confidence_sum / words as f32
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t400\t560\t-1\t
4\t1\t1\t1\t1\t0\t20\t16\t300\t30\t-1\t
5\t1\t1\t1\t1\t1\t20\t16\t120\t30\t91.5\tLightning
5\t1\t1\t1\t1\t2\t150\t16\t60\t30\t88.5\tBolt
5\t1\t1\t1\t1\t3\t300\t16\t20\t30\t40\tR
5\t1\t2\t1\t1\t1\t20\t300\t120\t20\t80\tInstant
5\t1\t2\t1\t1\t2\t20\t300\t120\t20\t-1\t
";

    #[test]
    fn test_parse_tsv_lines_and_confidence() {
        let output = parse_tsv(TSV);
        assert_eq!(output.text, "Lightning Bolt R\nInstant");
        assert!((output.confidence - 75.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_tsv_empty() {
        let output = parse_tsv("level\tpage_num\n");
        assert_eq!(output.text, "");
        assert_eq!(output.confidence, 0.0);
    }

    #[test]
    fn test_parse_language_list() {
        let listing = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\nosd\nspa\n";
        assert_eq!(parse_language_list(listing), vec!["eng", "osd", "spa"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let factory = TesseractFactory::new(RecognitionConfig {
            tesseract_path: "/nonexistent/tesseract-binary".to_string(),
            ..RecognitionConfig::default()
        });
        let err = factory.create().await.err().unwrap();
        assert!(matches!(err, RecognitionError::EngineUnavailable(_)));
    }

    #[tokio::test]
    async fn test_temp_input_removed_after_failed_run() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TesseractEngine {
            config: RecognitionConfig {
                tesseract_path: "/nonexistent/tesseract-binary".to_string(),
                ..RecognitionConfig::default()
            },
            temp_dir: dir.path().to_path_buf(),
        };

        let err = engine.recognize(&RgbaImage::new(8, 8)).await.unwrap_err();
        assert!(matches!(err, RecognitionError::EngineUnavailable(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_write_input_creates_png() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TesseractEngine {
            config: RecognitionConfig::default(),
            temp_dir: dir.path().to_path_buf(),
        };

        let path = engine.write_input(&RgbaImage::new(8, 8)).await.unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(image::image_dimensions(&path).unwrap(), (8, 8));
    }
}
