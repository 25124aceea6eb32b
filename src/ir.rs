use crate::style::FontProps;
use plotters::style::RGBColor;

// =============================================================================
// Figure scene recorded by the plotters backend
// =============================================================================

/// Everything needed to rasterize one figure. Built up by `create_figure`,
/// `draw_subplot` and `draw_dataset`, consumed at save time.
#[derive(Debug, Clone)]
pub struct FigureScene {
    pub width: u32,
    pub height: u32,
    pub dpi: f64,
    pub title: Option<String>,
    pub title_font: FontProps,
    pub background: RGBColor,
    pub nrows: usize,
    pub ncols: usize,
    pub panels: Vec<PanelScene>,
}

/// One subplot cell.
#[derive(Debug, Clone)]
pub struct PanelScene {
    pub index: u64,
    pub row: usize,
    pub col: usize,
    pub title: Option<String>,
    pub title_font: FontProps,
    pub xlabel: Option<String>,
    pub ylabel: Option<String>,
    pub label_font: FontProps,
    pub tick_font: FontProps,
    pub xlim: Option<(f64, f64)>,
    pub ylim: Option<(f64, f64)>,
    pub xticks: usize,
    pub yticks: usize,
    pub xticklabels: Option<Vec<String>>,
    pub legend: bool,
    pub commands: Vec<DrawCommand>,
}

impl PanelScene {
    /// Empty panel at a grid cell with default styling.
    pub fn new(index: u64, row: usize, col: usize) -> Self {
        PanelScene {
            index,
            row,
            col,
            title: None,
            title_font: FontProps::default(),
            xlabel: None,
            ylabel: None,
            label_font: FontProps::default(),
            tick_font: FontProps::default(),
            xlim: None,
            ylim: None,
            xticks: 5,
            yticks: 5,
            xticklabels: None,
            legend: false,
            commands: Vec::new(),
        }
    }

    /// Axis ranges: explicit limits win, otherwise the data extent padded by
    /// 5% (a degenerate extent is widened by 1 on each side).
    pub fn ranges(&self) -> ((f64, f64), (f64, f64)) {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for command in &self.commands {
            match command {
                DrawCommand::Line { points, .. } | DrawCommand::Scatter { points, .. } => {
                    xs.extend(points.iter().map(|p| p.0));
                    ys.extend(points.iter().map(|p| p.1));
                }
                DrawCommand::Bars { bars, width, .. } => {
                    for (x, h) in bars {
                        xs.push(x - width / 2.0);
                        xs.push(x + width / 2.0);
                        ys.push(*h);
                    }
                    ys.push(0.0);
                }
            }
        }
        (
            self.xlim.unwrap_or_else(|| padded(&xs)),
            self.ylim.unwrap_or_else(|| padded(&ys)),
        )
    }
}

fn padded(values: &[f64]) -> (f64, f64) {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() {
        return (0.0, 1.0);
    }
    if min == max {
        return (min - 1.0, max + 1.0);
    }
    let padding = (max - min) * 0.05;
    (min - padding, max + padding)
}

/// Stroke/fill for one series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStyle {
    pub color: RGBColor,
    pub alpha: f64,
    pub width: u32,
    pub size: u32,
}

/// Primitive drawing commands within a panel.
#[derive(Debug, Clone)]
pub enum DrawCommand {
    Line {
        points: Vec<(f64, f64)>,
        style: SeriesStyle,
        legend: Option<String>,
    },
    Scatter {
        points: Vec<(f64, f64)>,
        style: SeriesStyle,
        legend: Option<String>,
    },
    Bars {
        /// `(center, height)` per bar
        bars: Vec<(f64, f64)>,
        width: f64,
        style: SeriesStyle,
        legend: Option<String>,
    },
}

impl DrawCommand {
    pub fn legend(&self) -> Option<&str> {
        match self {
            DrawCommand::Line { legend, .. }
            | DrawCommand::Scatter { legend, .. }
            | DrawCommand::Bars { legend, .. } => legend.as_deref(),
        }
    }

    pub fn style(&self) -> &SeriesStyle {
        match self {
            DrawCommand::Line { style, .. }
            | DrawCommand::Scatter { style, .. }
            | DrawCommand::Bars { style, .. } => style,
        }
    }
}
