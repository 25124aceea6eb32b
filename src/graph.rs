use crate::backend::{Backend, SaveTarget};
use crate::data::Dataset;
use crate::error::{FigspecError, Result};
use crate::initializer::{GridSpec, GRIDSPEC_KEY};
use crate::ir::{DrawCommand, FigureScene, PanelScene, SeriesStyle};
use crate::merge::type_name;
use crate::style::{cycle_color, parse_color, FontProps};
use crate::synonyms;
use crate::{DatasetArgs, DatasetKind, FigureArgs, OutputFormat, SubplotArgs};
use anyhow::Context;
use image::ImageEncoder;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle, TextStyle};
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const FIGURE: &str = "draw_figure";
const SUBPLOT: &str = "draw_subplot";
const DATASET: &str = "draw_dataset";

/// Backend that records figures as scenes and rasterizes them with plotters
/// when they are saved.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlottersBackend;

/// Position of a panel in its figure's scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelHandle(pub usize);

/// What `draw_dataset` hands back for each labelled series.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub label: String,
    pub color: RGBColor,
}

/// Largest canvas, in pixels, a figure may ask for.
pub const MAX_CANVAS_PIXELS: u64 = 1 << 26;

/// An open multi-page output: one PDF page or one GIF frame per figure.
#[derive(Debug)]
pub enum PageDocument {
    Pdf(PdfDocument),
    Gif(GifDocument),
}

impl PageDocument {
    pub fn path(&self) -> &Path {
        match self {
            PageDocument::Pdf(doc) => &doc.path,
            PageDocument::Gif(doc) => &doc.path,
        }
    }

    pub fn pages(&self) -> usize {
        match self {
            PageDocument::Pdf(doc) => doc.pages.len(),
            PageDocument::Gif(doc) => doc.frames,
        }
    }

    fn push(&mut self, scene: &FigureScene, frame_delay: u32) -> anyhow::Result<()> {
        match self {
            PageDocument::Pdf(doc) => doc.push(scene),
            PageDocument::Gif(doc) => doc.push(scene, frame_delay),
        }
    }

    fn finish(self) -> anyhow::Result<()> {
        match self {
            PageDocument::Pdf(doc) => doc.finish(),
            // Dropping the drawing area flushes the GIF trailer.
            PageDocument::Gif(doc) => {
                drop(doc);
                Ok(())
            }
        }
    }
}

/// A PDF assembled in memory, one page per figure. Each page embeds the
/// rasterized figure and is sized in points from the figure's inches. The
/// file is written by [`PdfDocument::finish`].
pub struct PdfDocument {
    path: PathBuf,
    doc: lopdf::Document,
    pages_id: ObjectId,
    pages: Vec<ObjectId>,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("path", &self.path)
            .field("pages", &self.pages.len())
            .finish()
    }
}

impl PdfDocument {
    fn new(path: &Path) -> Self {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        PdfDocument {
            path: path.to_path_buf(),
            doc,
            pages_id,
            pages: Vec::new(),
        }
    }

    fn push(&mut self, scene: &FigureScene) -> anyhow::Result<()> {
        let rgb = rasterize(scene)?;
        let image_id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => scene.width,
                "Height" => scene.height,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            rgb,
        ));

        let points = |px: u32| (f64::from(px) / scene.dpi * 72.0) as f32;
        let (width, height) = (points(scene.width), points(scene.height));
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![width.into(), 0.into(), 0.into(), height.into(), 0.into(), 0.into()],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = self.doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().context("Failed to encode page content")?,
        ));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        self.pages.push(page_id);
        Ok(())
    }

    fn finish(mut self) -> anyhow::Result<()> {
        let kids: Vec<Object> = self.pages.iter().map(|&id| id.into()).collect();
        let count = kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();

        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes).context("Failed to encode PDF")?;
        std::fs::write(&self.path, bytes).context("Failed to write file")?;
        Ok(())
    }
}

/// An animated GIF being written one frame per figure. The file is finalized
/// when the document is dropped.
pub struct GifDocument {
    path: PathBuf,
    area: Option<DrawingArea<BitMapBackend<'static>, Shift>>,
    size: (u32, u32),
    frames: usize,
}

impl std::fmt::Debug for GifDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GifDocument")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("frames", &self.frames)
            .finish()
    }
}

impl GifDocument {
    fn new(path: &Path) -> Self {
        GifDocument {
            path: path.to_path_buf(),
            area: None,
            size: (0, 0),
            frames: 0,
        }
    }

    fn push(&mut self, scene: &FigureScene, frame_delay: u32) -> anyhow::Result<()> {
        let size = (scene.width, scene.height);
        if self.area.is_none() {
            let backend = BitMapBackend::gif(&self.path, size, frame_delay)
                .context("Failed to open GIF document")?;
            self.size = size;
            self.area = Some(backend.into_drawing_area());
        } else if self.size != size {
            anyhow::bail!(
                "page size {}x{} differs from the document's {}x{}",
                size.0,
                size.1,
                self.size.0,
                self.size.1
            );
        }
        let area = self.area.as_ref().context("GIF document is not open")?;
        render_scene(area, scene)?;
        self.frames += 1;
        Ok(())
    }
}

/// Deserialize resolved arguments into their typed form after folding
/// synonyms onto canonical names.
fn typed<T: DeserializeOwned>(routine: &str, args: &Mapping) -> Result<T> {
    serde_yaml::from_value(Value::Mapping(synonyms::canonicalize(args)))
        .map_err(|e| FigspecError::argument(routine, e))
}

fn font(routine: &str, key: &str, value: Option<&Value>, fallback: FontProps) -> Result<FontProps> {
    match value {
        None => Ok(fallback),
        Some(value) => FontProps::from_value(value)
            .ok_or_else(|| FigspecError::argument(routine, format!("invalid font properties for '{}'", key))),
    }
}

fn color(routine: &str, text: &str) -> Result<RGBColor> {
    parse_color(text).ok_or_else(|| FigspecError::argument(routine, format!("unknown color '{}'", text)))
}

fn panel<'f>(figure: &'f mut FigureScene, handle: &PanelHandle) -> Result<&'f mut PanelScene> {
    figure
        .panels
        .get_mut(handle.0)
        .ok_or_else(|| FigspecError::Backend(format!("no panel at position {}", handle.0)))
}

/// Values of one axis: numbers, or category names placed at 0, 1, 2, ...
#[derive(Debug, Clone, PartialEq)]
enum Axis {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl Axis {
    fn len(&self) -> usize {
        match self {
            Axis::Numeric(v) => v.len(),
            Axis::Categorical(v) => v.len(),
        }
    }

    fn positions(&self) -> Vec<f64> {
        match self {
            Axis::Numeric(v) => v.clone(),
            Axis::Categorical(v) => (0..v.len()).map(|i| i as f64).collect(),
        }
    }
}

/// Read an axis from an inline sequence or a dataset column.
fn axis(dataset: &Dataset, value: &Value, name: &str) -> Result<Axis> {
    match value {
        Value::Sequence(items) => {
            if let Some(numbers) = items.iter().map(Value::as_f64).collect::<Option<Vec<_>>>() {
                return Ok(Axis::Numeric(numbers));
            }
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(Axis::Categorical)
                .ok_or_else(|| {
                    FigspecError::argument(DATASET, format!("'{}' must hold numbers or strings", name))
                })
        }
        Value::String(column) => match dataset.numeric_column(column) {
            Ok(values) => Ok(Axis::Numeric(values)),
            Err(_) if dataset.column_index(column).is_some() => dataset
                .text_column(column)
                .map(Axis::Categorical)
                .map_err(|e| FigspecError::argument(DATASET, e)),
            Err(e) => Err(FigspecError::argument(DATASET, e)),
        },
        other => Err(FigspecError::argument(
            DATASET,
            format!("'{}' must be a sequence or a column name, found {}", name, type_name(other)),
        )),
    }
}

impl Backend for PlottersBackend {
    type Figure = FigureScene;
    type Subplot = PanelHandle;
    type Document = PageDocument;
    type Legend = LegendEntry;

    fn create_figure(&mut self, args: &Mapping) -> Result<(FigureScene, BTreeMap<u64, PanelHandle>)> {
        let args: FigureArgs = typed(FIGURE, args)?;
        let (width, height) = args.pixel_size().ok_or_else(|| {
            FigspecError::argument(
                FIGURE,
                format!(
                    "figure size {}x{} in at {} dpi is out of range",
                    args.fig_width, args.fig_height, args.dpi
                ),
            )
        })?;
        if width == 0 || height == 0 {
            return Err(FigspecError::argument(
                FIGURE,
                format!("figure size {}x{} px is empty", width, height),
            ));
        }
        let pixels = u64::from(width).checked_mul(u64::from(height));
        if pixels.map_or(true, |n| n > MAX_CANVAS_PIXELS) {
            return Err(FigspecError::argument(
                FIGURE,
                format!(
                    "figure size {}x{} px exceeds the {} pixel limit",
                    width, height, MAX_CANVAS_PIXELS
                ),
            ));
        }
        let grid = match &args.gridspec {
            Some(grid) => GridSpec::from_mapping(grid, GRIDSPEC_KEY)?,
            None => GridSpec { nrows: 1, ncols: 1, nsubplots: 1 },
        };
        let background = match &args.background {
            Some(text) => color(FIGURE, text)?,
            None => WHITE,
        };
        let title_font = font(
            FIGURE,
            "title_fp",
            args.title_fp.as_ref(),
            FontProps { size: 14.0, ..Default::default() },
        )?;

        let mut scene = FigureScene {
            width,
            height,
            dpi: args.dpi,
            title: args.title,
            title_font,
            background,
            nrows: grid.nrows as usize,
            ncols: grid.ncols as usize,
            panels: Vec::new(),
        };
        let mut handles = BTreeMap::new();
        for index in 0..grid.nsubplots {
            if let Some((row, col)) = grid.cell(index) {
                handles.insert(index, PanelHandle(scene.panels.len()));
                scene.panels.push(PanelScene::new(index, row as usize, col as usize));
            }
        }
        debug!(width, height, panels = handles.len(), "created figure");
        Ok((scene, handles))
    }

    fn draw_subplot(&mut self, figure: &mut FigureScene, subplot: &PanelHandle, args: &Mapping) -> Result<()> {
        let args: SubplotArgs = typed(SUBPLOT, args)?;
        let panel = panel(figure, subplot)?;

        panel.title_font = font(SUBPLOT, "title_fp", args.title_fp.as_ref(), FontProps { size: 12.0, ..Default::default() })?;
        panel.label_font = font(SUBPLOT, "label_fp", args.label_fp.as_ref(), FontProps::default())?;
        panel.tick_font = font(SUBPLOT, "tick_fp", args.tick_fp.as_ref(), FontProps::default())?;
        panel.title = args.title;
        panel.xlabel = args.xlabel;
        panel.ylabel = args.ylabel;
        panel.xlim = args.xlim;
        panel.ylim = args.ylim;
        if let Some(n) = args.xticks {
            panel.xticks = n;
        }
        if let Some(n) = args.yticks {
            panel.yticks = n;
        }
        if args.xticklabels.is_some() {
            panel.xticklabels = args.xticklabels;
        }
        panel.legend = args.legend;
        Ok(())
    }

    fn draw_dataset(
        &mut self,
        figure: &mut FigureScene,
        subplot: &PanelHandle,
        dataset: &Dataset,
        args: &Mapping,
    ) -> Result<Option<LegendEntry>> {
        let args: DatasetArgs = typed(DATASET, args)?;
        let ys = match axis(dataset, &args.y, "y")? {
            Axis::Numeric(values) => values,
            Axis::Categorical(_) => {
                return Err(FigspecError::argument(DATASET, "'y' must be numeric"))
            }
        };
        let xs = match &args.x {
            Some(value) => axis(dataset, value, "x")?,
            None => Axis::Numeric((0..ys.len()).map(|i| i as f64).collect()),
        };
        if xs.len() != ys.len() {
            return Err(FigspecError::argument(
                DATASET,
                format!(
                    "X and Y data must have the same length (x: {}, y: {})",
                    xs.len(),
                    ys.len()
                ),
            ));
        }

        let panel = panel(figure, subplot)?;
        let rgb = match &args.color {
            Some(text) => color(DATASET, text)?,
            None => cycle_color(panel.commands.len()),
        };
        let style = SeriesStyle {
            color: rgb,
            alpha: args.alpha.clamp(0.0, 1.0),
            width: args.linewidth.round().max(1.0) as u32,
            size: args.markersize.round().max(1.0) as u32,
        };
        let positions = xs.positions();
        if let Axis::Categorical(names) = xs {
            if panel.xticklabels.is_none() {
                panel.xticks = panel.xticks.max(names.len());
                panel.xticklabels = Some(names);
            }
        }

        let points: Vec<(f64, f64)> = positions.into_iter().zip(ys).collect();
        let legend = args.label.clone();
        panel.commands.push(match args.kind {
            DatasetKind::Line => DrawCommand::Line { points, style, legend },
            DatasetKind::Scatter => DrawCommand::Scatter { points, style, legend },
            DatasetKind::Bar => DrawCommand::Bars {
                bars: points,
                width: args.bar_width,
                style,
                legend,
            },
        });

        Ok(args.label.map(|label| LegendEntry { label, color: rgb }))
    }

    fn is_paginated(&self, path: &Path) -> bool {
        OutputFormat::from_path(path).is_some_and(OutputFormat::is_paginated)
    }

    fn open_document(&mut self, path: &Path) -> Result<PageDocument> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(FigspecError::output(path, "parent directory does not exist"));
            }
        }
        match OutputFormat::from_path(path) {
            Some(OutputFormat::Pdf) => Ok(PageDocument::Pdf(PdfDocument::new(path))),
            Some(OutputFormat::Gif) => Ok(PageDocument::Gif(GifDocument::new(path))),
            _ => Err(FigspecError::output(path, "not a paginated format")),
        }
    }

    fn save_figure(
        &mut self,
        figure: &FigureScene,
        target: SaveTarget<'_, PageDocument>,
        options: &Mapping,
    ) -> Result<()> {
        let args: FigureArgs = typed(FIGURE, options)?;
        match target {
            SaveTarget::File(path) => {
                let format = OutputFormat::from_path(path)
                    .ok_or_else(|| FigspecError::output(path, "unsupported output format"))?;
                save_file(figure, path, format, args.frame_delay)
                    .map_err(|e| FigspecError::output(path, format!("{:#}", e)))
            }
            SaveTarget::Page(document) => document
                .push(figure, args.frame_delay)
                .map_err(|e| FigspecError::output(document.path(), format!("{:#}", e))),
        }
    }

    fn close_document(&mut self, document: PageDocument) -> Result<()> {
        if document.pages() == 0 {
            warn!(path = %document.path().display(), "closing document without pages");
        }
        let path = document.path().to_path_buf();
        document
            .finish()
            .map_err(|e| FigspecError::output(path, format!("{:#}", e)))
    }
}

/// Render a scene into a packed RGB buffer.
fn rasterize(scene: &FigureScene) -> anyhow::Result<Vec<u8>> {
    let len = (scene.width as usize)
        .checked_mul(scene.height as usize)
        .and_then(|n| n.checked_mul(3))
        .context("Canvas too large")?;
    let mut buffer = vec![0u8; len];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (scene.width, scene.height))
            .into_drawing_area();
        render_scene(&root, scene)?;
    }
    Ok(buffer)
}

/// Write a single figure. Paginated formats become one-page documents here;
/// the renderer routes them through `open_document` instead.
fn save_file(scene: &FigureScene, path: &Path, format: OutputFormat, frame_delay: u32) -> anyhow::Result<()> {
    let (width, height) = (scene.width, scene.height);
    match format {
        OutputFormat::Png => {
            let buffer = rasterize(scene)?;
            let mut png_bytes = Vec::new();
            image::codecs::png::PngEncoder::new(&mut png_bytes)
                .write_image(&buffer, width, height, image::ColorType::Rgb8)
                .context("Failed to encode PNG")?;
            std::fs::write(path, png_bytes).context("Failed to write file")?;
        }
        OutputFormat::Svg => {
            let mut svg = String::new();
            {
                let root = SVGBackend::with_string(&mut svg, (width, height)).into_drawing_area();
                render_scene(&root, scene)?;
            }
            std::fs::write(path, svg).context("Failed to write file")?;
        }
        OutputFormat::Pdf => {
            let mut document = PdfDocument::new(path);
            document.push(scene)?;
            document.finish()?;
        }
        OutputFormat::Gif => {
            let mut document = GifDocument::new(path);
            document.push(scene, frame_delay)?;
        }
    }
    Ok(())
}

fn text_style(font: &FontProps, dpi: f64) -> TextStyle<'_> {
    let style = if font.bold {
        FontStyle::Bold
    } else if font.italic {
        FontStyle::Italic
    } else {
        FontStyle::Normal
    };
    TextStyle::from(FontDesc::new(
        FontFamily::from(font.family.as_str()),
        font.pixel_size(dpi),
        style,
    ))
}

/// Label for a tick at `x` on a categorical axis; only integer positions
/// carry a name.
fn category_label(labels: &[String], x: f64) -> String {
    let nearest = x.round();
    if nearest < 0.0 || (x - nearest).abs() > 1e-6 {
        return String::new();
    }
    labels.get(nearest as usize).cloned().unwrap_or_default()
}

/// Paint a whole figure onto `root` and present it.
fn render_scene<DB>(root: &DrawingArea<DB, Shift>, scene: &FigureScene) -> anyhow::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&scene.background).context("Failed to fill background")?;
    let body = match &scene.title {
        Some(title) => root
            .titled(title, text_style(&scene.title_font, scene.dpi))
            .context("Failed to draw figure title")?,
        None => root.clone(),
    };

    let cells = body.split_evenly((scene.nrows, scene.ncols));
    for panel in &scene.panels {
        let cell = cells
            .get(panel.row * scene.ncols + panel.col)
            .context("Subplot outside the figure grid")?;
        draw_panel(cell, panel, scene.dpi)
            .with_context(|| format!("Failed to draw subplot {}", panel.index))?;
    }

    root.present().context("Failed to present drawing")?;
    Ok(())
}

fn draw_panel<DB>(area: &DrawingArea<DB, Shift>, panel: &PanelScene, dpi: f64) -> anyhow::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let ((x0, x1), (y0, y1)) = panel.ranges();
    let tick_style = text_style(&panel.tick_font, dpi);
    let label_px = panel.label_font.pixel_size(dpi);

    let mut builder = ChartBuilder::on(area);
    builder
        .margin(10)
        .x_label_area_size((label_px * 3.0) as u32)
        .y_label_area_size((label_px * 4.5) as u32);
    if let Some(title) = &panel.title {
        builder.caption(title, text_style(&panel.title_font, dpi));
    }
    let mut chart = builder
        .build_cartesian_2d(x0..x1, y0..y1)
        .context("Failed to build chart")?;

    let labels = panel.xticklabels.clone().unwrap_or_default();
    let formatter = move |x: &f64| category_label(&labels, *x);
    {
        let mut mesh = chart.configure_mesh();
        mesh.x_labels(panel.xticks)
            .y_labels(panel.yticks)
            .label_style(tick_style.clone())
            .axis_desc_style(text_style(&panel.label_font, dpi));
        if let Some(xlabel) = &panel.xlabel {
            mesh.x_desc(xlabel.as_str());
        }
        if let Some(ylabel) = &panel.ylabel {
            mesh.y_desc(ylabel.as_str());
        }
        if panel.xticklabels.is_some() {
            mesh.x_label_formatter(&formatter);
        }
        mesh.draw().context("Failed to draw mesh")?;
    }

    for command in &panel.commands {
        let style = command.style();
        let color = style.color.mix(style.alpha);
        let anno = match command {
            DrawCommand::Line { points, .. } => chart.draw_series(LineSeries::new(
                points.iter().copied(),
                color.stroke_width(style.width),
            )),
            DrawCommand::Scatter { points, .. } => chart.draw_series(
                points
                    .iter()
                    .map(|&point| Circle::new(point, style.size, color.filled())),
            ),
            DrawCommand::Bars { bars, width, .. } => chart.draw_series(bars.iter().map(|&(x, h)| {
                Rectangle::new([(x - width / 2.0, 0.0), (x + width / 2.0, h)], color.filled())
            })),
        }
        .context("Failed to draw series")?;

        if let Some(label) = command.legend() {
            anno.label(label)
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
        }
    }

    if panel.legend && panel.commands.iter().any(|c| c.legend().is_some()) {
        chart
            .configure_series_labels()
            .label_font(tick_style)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()
            .context("Failed to draw legend")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Mapping {
        serde_yaml::from_str(s).unwrap()
    }

    fn figure(backend: &mut PlottersBackend, args: &str) -> (FigureScene, BTreeMap<u64, PanelHandle>) {
        backend.create_figure(&yaml(args)).unwrap()
    }

    #[test]
    fn test_create_figure_grid() {
        let mut backend = PlottersBackend;
        let (scene, handles) = figure(
            &mut backend,
            "{fig_width: 4, fig_height: 3, dpi: 50, gridspec: {nrows: 2, ncols: 2, nsubplots: 3}}",
        );
        assert_eq!((scene.width, scene.height), (200, 150));
        assert_eq!(handles.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!((scene.panels[2].row, scene.panels[2].col), (1, 0));
    }

    #[test]
    fn test_create_figure_single_panel_and_aliases() {
        let mut backend = PlottersBackend;
        let (scene, handles) = figure(&mut backend, "{suptitle: Report, background: '#eeeeee'}");
        assert_eq!(handles.len(), 1);
        assert_eq!(scene.title.as_deref(), Some("Report"));
        assert_eq!(scene.background, RGBColor(0xee, 0xee, 0xee));
    }

    #[test]
    fn test_create_figure_rejects_bad_args() {
        let mut backend = PlottersBackend;
        let err = backend.create_figure(&yaml("{fig_width: 0}")).unwrap_err();
        assert!(matches!(err, FigspecError::Argument { .. }));
        let err = backend.create_figure(&yaml("{background: notacolor}")).unwrap_err();
        assert!(err.to_string().contains("notacolor"));
    }

    #[test]
    fn test_create_figure_rejects_oversize_canvas() {
        let mut backend = PlottersBackend;
        let err = backend
            .create_figure(&yaml("{fig_width: 40, fig_height: 40, dpi: 1000}"))
            .unwrap_err();
        assert!(matches!(err, FigspecError::Argument { ref routine, .. } if routine == "draw_figure"));
        assert!(err.to_string().contains("pixel limit"), "{err}");

        let err = backend.create_figure(&yaml("{fig_width: 1e12}")).unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
        assert!(!err.aborts_run());
    }

    #[test]
    fn test_draw_subplot_sets_panel() {
        let mut backend = PlottersBackend;
        let (mut scene, handles) = figure(&mut backend, "{}");
        backend
            .draw_subplot(
                &mut scene,
                &handles[&0],
                &yaml("{title: A, title_fp: 10b, xlabel: t, xlim: [0, 5], ticks: 7, legend: true}"),
            )
            .unwrap();
        let panel = &scene.panels[0];
        assert_eq!(panel.title.as_deref(), Some("A"));
        assert!(panel.title_font.bold);
        assert_eq!(panel.xlim, Some((0.0, 5.0)));
        assert_eq!((panel.xticks, panel.yticks), (7, 7));
        assert!(panel.legend);
    }

    #[test]
    fn test_draw_subplot_bad_font() {
        let mut backend = PlottersBackend;
        let (mut scene, handles) = figure(&mut backend, "{}");
        let err = backend
            .draw_subplot(&mut scene, &handles[&0], &yaml("{label_fp: huge}"))
            .unwrap_err();
        assert!(matches!(err, FigspecError::Argument { ref routine, .. } if routine == "draw_subplot"));
    }

    #[test]
    fn test_draw_dataset_inline_and_color_cycle() {
        let mut backend = PlottersBackend;
        let (mut scene, handles) = figure(&mut backend, "{}");
        let empty = Dataset::empty();
        let legend = backend
            .draw_dataset(&mut scene, &handles[&0], &empty, &yaml("{y: [1, 2, 3], label: first}"))
            .unwrap();
        backend
            .draw_dataset(&mut scene, &handles[&0], &empty, &yaml("{x: [0, 1], y: [4, 5], kind: scatter, c: C3}"))
            .unwrap();

        assert_eq!(legend, Some(LegendEntry { label: "first".into(), color: cycle_color(0) }));
        let commands = &scene.panels[0].commands;
        match &commands[0] {
            DrawCommand::Line { points, .. } => assert_eq!(points[2], (2.0, 3.0)),
            other => panic!("expected line, got {:?}", other),
        }
        assert_eq!(commands[1].style().color, cycle_color(3));
    }

    #[test]
    fn test_draw_dataset_columns_and_categories() {
        let mut backend = PlottersBackend;
        let (mut scene, handles) = figure(&mut backend, "{}");
        let data = Dataset::new(
            vec!["name".into(), "count".into()],
            vec![vec!["a".into(), "3".into()], vec!["b".into(), "5".into()]],
        );
        backend
            .draw_dataset(&mut scene, &handles[&0], &data, &yaml("{x: name, y: count, kind: bar}"))
            .unwrap();
        let panel = &scene.panels[0];
        assert_eq!(panel.xticklabels, Some(vec!["a".to_string(), "b".to_string()]));
        match &panel.commands[0] {
            DrawCommand::Bars { bars, width, .. } => {
                assert_eq!(bars, &vec![(0.0, 3.0), (1.0, 5.0)]);
                assert_eq!(*width, 0.8);
            }
            other => panic!("expected bars, got {:?}", other),
        }
    }

    #[test]
    fn test_draw_dataset_errors() {
        let mut backend = PlottersBackend;
        let (mut scene, handles) = figure(&mut backend, "{}");
        let empty = Dataset::empty();
        let mismatch = backend
            .draw_dataset(&mut scene, &handles[&0], &empty, &yaml("{x: [1, 2, 3], y: [1, 2]}"))
            .unwrap_err();
        assert!(mismatch.to_string().contains("same length"));
        let missing = backend
            .draw_dataset(&mut scene, &handles[&0], &empty, &yaml("{y: temp}"))
            .unwrap_err();
        assert!(missing.to_string().contains("temp"));
        let categorical_y = backend
            .draw_dataset(&mut scene, &handles[&0], &empty, &yaml("{y: [a, b]}"))
            .unwrap_err();
        assert!(matches!(categorical_y, FigspecError::Argument { .. }));
        assert!(scene.panels[0].commands.is_empty());
    }

    #[test]
    fn test_is_paginated() {
        let backend = PlottersBackend;
        assert!(backend.is_paginated(Path::new("/tmp/report.gif")));
        assert!(backend.is_paginated(Path::new("/tmp/report.PDF")));
        assert!(!backend.is_paginated(Path::new("/tmp/report.png")));
        assert!(!backend.is_paginated(Path::new("/tmp/report")));
    }

    #[test]
    fn test_open_document_needs_parent_dir() {
        let mut backend = PlottersBackend;
        let err = backend
            .open_document(Path::new("/definitely/not/here/report.gif"))
            .unwrap_err();
        assert!(matches!(err, FigspecError::Output { .. }));
        let err = backend.open_document(Path::new("report.png")).unwrap_err();
        assert!(err.to_string().contains("not a paginated format"));
    }

    /// Small figure with one line so rendering has axes and a series.
    fn small_figure(backend: &mut PlottersBackend, args: &str) -> FigureScene {
        let (mut scene, handles) = figure(backend, args);
        backend
            .draw_dataset(&mut scene, &handles[&0], &Dataset::empty(), &yaml("{y: [1, 3, 2]}"))
            .unwrap();
        scene
    }

    const SMALL: &str = "{fig_width: 2, fig_height: 1.5, dpi: 50}";

    #[test]
    fn test_save_png_and_svg_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = PlottersBackend;
        let scene = small_figure(&mut backend, SMALL);

        let png = dir.path().join("figure.png");
        backend
            .save_figure(&scene, SaveTarget::File(&png), &yaml(SMALL))
            .unwrap();
        let decoded = image::open(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 75));

        let svg = dir.path().join("figure.svg");
        backend
            .save_figure(&scene, SaveTarget::File(&svg), &yaml(SMALL))
            .unwrap();
        assert!(std::fs::read_to_string(&svg).unwrap().contains("<svg"));
    }

    #[test]
    fn test_gif_document_writes_one_frame_per_figure() {
        use image::AnimationDecoder;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.gif");
        let mut backend = PlottersBackend;
        let scene = small_figure(&mut backend, SMALL);

        let mut document = backend.open_document(&path).unwrap();
        for _ in 0..3 {
            backend
                .save_figure(&scene, SaveTarget::Page(&mut document), &yaml(SMALL))
                .unwrap();
        }
        assert_eq!(document.pages(), 3);
        backend.close_document(document).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let frames = image::codecs::gif::GifDecoder::new(file)
            .unwrap()
            .into_frames()
            .collect_frames()
            .unwrap();
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn test_gif_document_rejects_other_page_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = PlottersBackend;
        let first = small_figure(&mut backend, SMALL);
        let second = small_figure(&mut backend, "{fig_width: 3, fig_height: 1.5, dpi: 50}");

        let mut document = backend.open_document(&dir.path().join("r.gif")).unwrap();
        backend
            .save_figure(&first, SaveTarget::Page(&mut document), &yaml(SMALL))
            .unwrap();
        let err = backend
            .save_figure(&second, SaveTarget::Page(&mut document), &yaml(SMALL))
            .unwrap_err();
        assert!(err.to_string().contains("differs"), "{err}");
        assert_eq!(document.pages(), 1);
    }

    #[test]
    fn test_pdf_document_writes_one_page_per_figure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        let mut backend = PlottersBackend;
        let first = small_figure(&mut backend, SMALL);
        let second = small_figure(&mut backend, "{fig_width: 3, fig_height: 2, dpi: 50}");

        let mut document = backend.open_document(&path).unwrap();
        backend
            .save_figure(&first, SaveTarget::Page(&mut document), &yaml(SMALL))
            .unwrap();
        backend
            .save_figure(&second, SaveTarget::Page(&mut document), &yaml(SMALL))
            .unwrap();
        assert!(!path.exists());
        backend.close_document(document).unwrap();

        let written = lopdf::Document::load(&path).unwrap();
        assert_eq!(written.get_pages().len(), 2);
    }

    #[test]
    fn test_pdf_saved_straight_to_file_has_one_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("single.pdf");
        let mut backend = PlottersBackend;
        let scene = small_figure(&mut backend, SMALL);
        backend
            .save_figure(&scene, SaveTarget::File(&path), &yaml(SMALL))
            .unwrap();
        assert_eq!(lopdf::Document::load(&path).unwrap().get_pages().len(), 1);
    }

    #[test]
    fn test_save_unsupported_format() {
        let mut backend = PlottersBackend;
        let (scene, _) = figure(&mut backend, "{}");
        let err = backend
            .save_figure(&scene, SaveTarget::File(Path::new("/tmp/figure.xyz")), &Mapping::new())
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_category_label() {
        let labels = vec!["a".to_string(), "b".to_string()];
        assert_eq!(category_label(&labels, 1.0), "b");
        assert_eq!(category_label(&labels, 0.5), "");
        assert_eq!(category_label(&labels, -1.0), "");
        assert_eq!(category_label(&labels, 7.0), "");
    }
}
