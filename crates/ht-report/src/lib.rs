//! # ht-report
//!
//! Renders the convergence chart of a finished search: every evaluation's
//! score as a marker and the best score so far as a line, against the
//! evaluation index.

use ht_optimizer::{best_so_far, record_scores, Reporter, SearchResult};
use ht_types::{HtError, HtResult};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use tracing::info;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const FRAME: Rgb<u8> = Rgb([90, 90, 90]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const SAMPLE: Rgb<u8> = Rgb([230, 120, 60]);
const BEST: Rgb<u8> = Rgb([40, 90, 200]);

const GRID_LINES: u32 = 4;

/// Chart geometry in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartStyle {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
    pub marker_radius: i32,
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            width: 800,
            height: 500,
            margin: 40,
            marker_radius: 3,
        }
    }
}

/// Maps (evaluation index, score) into pixel space.
struct Frame {
    left: f32,
    top: f32,
    width: f32,
    height: f32,
    count: usize,
    low: f64,
    high: f64,
}

impl Frame {
    fn x(&self, index: usize) -> f32 {
        if self.count <= 1 {
            return self.left + self.width / 2.0;
        }
        self.left + self.width * index as f32 / (self.count - 1) as f32
    }

    fn y(&self, score: f64) -> f32 {
        let t = (self.high - score) / (self.high - self.low);
        self.top + self.height * t as f32
    }
}

/// Draw the convergence chart for `scores` (lower is better).
pub fn render_convergence(scores: &[f64], style: &ChartStyle) -> HtResult<RgbImage> {
    if scores.is_empty() {
        return Err(HtError::Report("no evaluations to plot".into()));
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(HtError::Report(format!("cannot plot non-finite score {bad}")));
    }
    let min_side = style.margin.saturating_mul(2).saturating_add(1);
    if style.width <= min_side || style.height <= min_side {
        return Err(HtError::Report(format!(
            "chart {}x{} is too small for a {}px margin",
            style.width, style.height, style.margin
        )));
    }

    let mut low = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let mut high = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if high - low < 1e-12 {
        low -= 0.5;
        high += 0.5;
    }
    let pad = (high - low) * 0.05;

    let plot_w = style.width - 2 * style.margin;
    let plot_h = style.height - 2 * style.margin;
    let frame = Frame {
        left: style.margin as f32,
        top: style.margin as f32,
        width: plot_w as f32,
        height: plot_h as f32,
        count: scores.len(),
        low: low - pad,
        high: high + pad,
    };

    let mut img = RgbImage::from_pixel(style.width, style.height, BACKGROUND);

    for i in 1..GRID_LINES {
        let y = frame.top + frame.height * i as f32 / GRID_LINES as f32;
        draw_line_segment_mut(
            &mut img,
            (frame.left, y),
            (frame.left + frame.width, y),
            GRID,
        );
    }
    draw_hollow_rect_mut(
        &mut img,
        Rect::at(style.margin as i32, style.margin as i32).of_size(plot_w, plot_h),
        FRAME,
    );

    for (i, score) in scores.iter().enumerate() {
        let center = (frame.x(i).round() as i32, frame.y(*score).round() as i32);
        draw_filled_circle_mut(&mut img, center, style.marker_radius, SAMPLE);
    }

    let best = best_so_far(scores);
    for (i, pair) in best.windows(2).enumerate() {
        draw_line_segment_mut(
            &mut img,
            (frame.x(i), frame.y(pair[0])),
            (frame.x(i + 1), frame.y(pair[1])),
            BEST,
        );
    }
    for (i, score) in best.iter().enumerate() {
        let center = (frame.x(i).round() as i32, frame.y(*score).round() as i32);
        draw_filled_circle_mut(&mut img, center, (style.marker_radius - 1).max(1), BEST);
    }

    Ok(img)
}

/// Charts are always encoded as PNG; reject any other extension up front.
pub fn check_chart_path(path: &Path) -> HtResult<()> {
    let is_png = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    if is_png {
        Ok(())
    } else {
        Err(HtError::Report(format!(
            "chart path {} must end in .png",
            path.display()
        )))
    }
}

/// Writes the convergence chart of a finished search to an image file.
#[derive(Debug, Clone)]
pub struct ConvergencePlot {
    path: PathBuf,
    style: ChartStyle,
}

impl ConvergencePlot {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            style: ChartStyle::default(),
        }
    }

    pub fn with_style(mut self, style: ChartStyle) -> Self {
        self.style = style;
        self
    }
}

impl Reporter for ConvergencePlot {
    fn report(&mut self, result: &SearchResult) -> HtResult<()> {
        check_chart_path(&self.path)?;
        let img = render_convergence(&record_scores(&result.records), &self.style)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        img.save_with_format(&self.path, ImageFormat::Png)
            .map_err(|e| HtError::Report(format!("saving {}: {e}", self.path.display())))?;
        info!("convergence chart written to {}", self.path.display());
        Ok(())
    }
}
