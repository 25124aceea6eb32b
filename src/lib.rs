// Library exports for figspec

pub mod backend;
pub mod cli;
pub mod data;
pub mod error;
pub mod graph;
pub mod initializer;
pub mod ir;
pub mod loader;
pub mod merge;
pub mod output;
pub mod preset;
pub mod resolve;
pub mod runtime;
pub mod style;
pub mod synonyms;

pub use backend::{Backend, SaveTarget};
pub use error::{FigspecError, Result};
pub use loader::SpecSource;
pub use preset::PresetRegistry;
pub use runtime::{DrawOptions, Renderer, ReportSummary};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::path::Path;

/// File formats the plotters backend writes. `pdf` and `gif` are paginated:
/// each figure sent to the same path becomes one page (or frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum OutputFormat {
    #[serde(rename = "png")]
    #[default]
    Png,
    #[serde(rename = "svg")]
    Svg,
    #[serde(rename = "pdf")]
    Pdf,
    #[serde(rename = "gif")]
    Gif,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(OutputFormat::Png),
            "svg" => Some(OutputFormat::Svg),
            "pdf" => Some(OutputFormat::Pdf),
            "gif" => Some(OutputFormat::Gif),
            _ => None,
        }
    }

    pub fn is_paginated(self) -> bool {
        matches!(self, OutputFormat::Pdf | OutputFormat::Gif)
    }
}

/// Arguments read by `draw_figure`.
#[derive(Debug, Clone, Deserialize)]
pub struct FigureArgs {
    /// Inches.
    #[serde(default = "default_fig_width")]
    pub fig_width: f64,
    /// Inches.
    #[serde(default = "default_fig_height")]
    pub fig_height: f64,
    #[serde(default = "default_dpi")]
    pub dpi: f64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub title_fp: Option<Value>,
    #[serde(default)]
    pub gridspec: Option<Mapping>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub outfile: Option<String>,
    /// Milliseconds between pages of a paginated document.
    #[serde(default = "default_frame_delay")]
    pub frame_delay: u32,
}

fn default_fig_width() -> f64 { 6.4 }
fn default_fig_height() -> f64 { 4.8 }
fn default_dpi() -> f64 { 100.0 }
fn default_frame_delay() -> u32 { 1000 }

impl FigureArgs {
    /// Canvas size in pixels, or `None` when a side is negative, not finite
    /// or does not fit in `u32`.
    pub fn pixel_size(&self) -> Option<(u32, u32)> {
        let px = |inches: f64| {
            let px = (inches * self.dpi).round();
            (px.is_finite() && (0.0..=f64::from(u32::MAX)).contains(&px)).then_some(px as u32)
        };
        Some((px(self.fig_width)?, px(self.fig_height)?))
    }
}

/// Arguments read by `draw_subplot`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubplotArgs {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub title_fp: Option<Value>,
    #[serde(default)]
    pub xlabel: Option<String>,
    #[serde(default)]
    pub ylabel: Option<String>,
    #[serde(default)]
    pub label_fp: Option<Value>,
    #[serde(default)]
    pub tick_fp: Option<Value>,
    #[serde(default)]
    pub xlim: Option<(f64, f64)>,
    #[serde(default)]
    pub ylim: Option<(f64, f64)>,
    /// Number of tick labels on each axis.
    #[serde(default)]
    pub xticks: Option<usize>,
    #[serde(default)]
    pub yticks: Option<usize>,
    #[serde(default)]
    pub xticklabels: Option<Vec<String>>,
    #[serde(default)]
    pub legend: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    #[default]
    Line,
    Scatter,
    Bar,
}

/// Arguments read by `draw_dataset`. `y` is required; `x` defaults to the
/// row index. Either may be an inline sequence or a column of `infile`.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetArgs {
    #[serde(default)]
    pub kind: DatasetKind,
    #[serde(default)]
    pub x: Option<Value>,
    pub y: Value,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "default_linewidth")]
    pub linewidth: f64,
    #[serde(default = "default_markersize")]
    pub markersize: f64,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_bar_width")]
    pub bar_width: f64,
}

fn default_linewidth() -> f64 { 1.0 }
fn default_markersize() -> f64 { 3.0 }
fn default_alpha() -> f64 { 1.0 }
fn default_bar_width() -> f64 { 0.8 }
