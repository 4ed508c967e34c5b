//! Batch inference over a directory of images with a tuned model.

use ht_types::{HtError, HtResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// One predicted box, in pixel coordinates of the source image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDetections {
    pub image: PathBuf,
    pub detections: Vec<Detection>,
}

pub trait Detector {
    /// Returns one entry per input image.
    fn detect(&mut self, images: &[PathBuf]) -> HtResult<Vec<ImageDetections>>;
}

/// Regular files in `dir` whose extension matches, ignoring case, sorted.
pub fn list_images(dir: &Path, extension: &str) -> HtResult<Vec<PathBuf>> {
    let wanted = extension.trim_start_matches('.');
    let entries = std::fs::read_dir(dir)
        .map_err(|e| HtError::Detection(format!("reading {}: {e}", dir.display())))?;

    let mut images = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted));
        if matches && path.is_file() {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Runs a detection program with the image paths appended; it prints one
/// JSON [`ImageDetections`] per line. Other stdout lines are ignored.
#[derive(Debug, Clone)]
pub struct CommandDetector {
    program: String,
    args: Vec<String>,
}

impl CommandDetector {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Detector for CommandDetector {
    fn detect(&mut self, images: &[PathBuf]) -> HtResult<Vec<ImageDetections>> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .args(images)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| HtError::Detection(format!("failed to launch {}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(HtError::Detection(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut results = Vec::new();
        for line in stdout.lines().map(str::trim) {
            if !line.starts_with('{') {
                if !line.is_empty() {
                    debug!("{}: {}", self.program, line);
                }
                continue;
            }
            let parsed: ImageDetections = serde_json::from_str(line)
                .map_err(|e| HtError::Detection(format!("bad detection line ({e}): {line}")))?;
            results.push(parsed);
        }
        Ok(results)
    }
}

/// Detect objects in every matching image under `dir`.
pub fn run_inference<D: Detector + ?Sized>(
    detector: &mut D,
    dir: &Path,
    extension: &str,
) -> HtResult<Vec<ImageDetections>> {
    let images = list_images(dir, extension)?;
    if images.is_empty() {
        warn!("no *.{} images in {}", extension.trim_start_matches('.'), dir.display());
        return Ok(Vec::new());
    }
    info!("running detection on {} images from {}", images.len(), dir.display());

    let results = detector.detect(&images)?;
    if results.len() != images.len() {
        return Err(HtError::Detection(format!(
            "detector returned {} results for {} images",
            results.len(),
            images.len()
        )));
    }
    for result in &results {
        info!("{}: {} detections", result.image.display(), result.detections.len());
    }
    Ok(results)
}
