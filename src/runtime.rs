// Report driver: resolve, draw and emit every figure of a spec

use crate::backend::Backend;
use crate::data::{DatasetCache, DatasetLoader, FileLoader};
use crate::error::{FigspecError, Result};
use crate::graph::PlottersBackend;
use crate::initializer::{self, children, Indexed, Level, NodePath};
use crate::loader::{self, SpecSource};
use crate::merge;
use crate::output::{Emitted, OutputMultiplexer};
use crate::preset::{PresetInfo, PresetRegistry};
use crate::resolve::{preset_names, slice_sequence, ArgumentResolver};
use crate::synonyms;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Top-level key of the document's preset catalog.
pub const PRESETS_KEY: &str = "presets";
/// Top-level key of the document's defaults.
pub const DEFAULTS_KEY: &str = "defaults";

/// Arguments every figure starts from.
pub const BUILTIN_DEFAULTS: &str = r#"
draw_figure:
  fig_width: 6.4
  fig_height: 4.8
  dpi: 100
draw_subplot:
  legend: false
draw_dataset:
  kind: line
"#;

/// Catalog shipped with the renderer. Document presets may `inherits` from it.
pub const BUILTIN_PRESETS: &str = r#"
notebook:
  _class: size
  help: Screen-sized figure for interactive viewing
  draw_figure: {fig_width: 6.4, fig_height: 4.8, dpi: 80}
presentation:
  _class: size
  help: Large canvas and fonts for slides
  draw_figure: {fig_width: 10, fig_height: 7.5, title_fp: 20b}
  draw_subplot: {title_fp: 16b, label_fp: 14, tick_fp: 12}
paper:
  _class: size
  help: Single-column journal figure
  draw_figure: {fig_width: 3.5, fig_height: 2.6, dpi: 300, title_fp: 9b}
  draw_subplot: {title_fp: 8b, label_fp: 8, tick_fp: 7}
paper_wide:
  extends: paper
  help: Two-column journal figure
  draw_figure: {fig_width: 7.0}
legend:
  _class: style
  help: Show a legend in every subplot
  draw_subplot: {legend: true}
scatter:
  _class: style
  help: Draw datasets as markers
  draw_dataset: {kind: scatter}
bars:
  _class: style
  help: Draw datasets as bars
  draw_dataset: {kind: bar}
"#;

/// Per-call settings of [`Renderer::draw_report`].
#[derive(Debug, Clone, Default)]
pub struct DrawOptions {
    /// Presets selected for every figure, lowest priority first.
    pub presets: Vec<String>,
    /// Routine-keyed arguments that win over everything else.
    pub overrides: Mapping,
    /// Fail on unknown preset names in a selection instead of skipping them.
    pub strict: bool,
}

/// A figure that could not be drawn or written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FigureFailure {
    pub index: u64,
    pub error: String,
    pub exit_code: i32,
}

/// A paginated document closed at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosedDocument {
    pub path: PathBuf,
    pub pages: usize,
}

/// Outcome of one `draw_report` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub outputs: Vec<Emitted>,
    pub failures: Vec<FigureFailure>,
    pub documents: Vec<ClosedDocument>,
    pub datasets_loaded: usize,
    pub dataset_cache_hits: usize,
}

impl ReportSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// 0 when every figure was written, otherwise the code of the first failure.
    pub fn exit_code(&self) -> i32 {
        self.failures.first().map_or(0, |f| f.exit_code)
    }
}

/// Drives a [`Backend`] over every figure of a spec.
pub struct Renderer<B: Backend> {
    backend: B,
    registry: Arc<PresetRegistry>,
    defaults: Mapping,
    loader: Box<dyn DatasetLoader>,
    cache: DatasetCache,
}

impl Renderer<PlottersBackend> {
    /// Renderer writing PNG, SVG and GIF files with plotters.
    pub fn plotters() -> Result<Self> {
        Self::new(PlottersBackend)
    }
}

impl<B: Backend> Renderer<B> {
    /// Renderer with the built-in defaults and preset catalog.
    pub fn new(backend: B) -> Result<Self> {
        let registry = PresetRegistry::from_mapping(&loader::parse_document(BUILTIN_PRESETS)?)?;
        Ok(Self {
            backend,
            registry: Arc::new(registry),
            defaults: loader::parse_document(BUILTIN_DEFAULTS)?,
            loader: Box::new(FileLoader),
            cache: DatasetCache::new(),
        })
    }

    /// Replace the built-in preset catalog.
    pub fn with_registry(mut self, registry: PresetRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Replace the built-in defaults.
    pub fn with_defaults(mut self, defaults: Mapping) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_loader(mut self, loader: impl DatasetLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self.cache.clear();
        self
    }

    pub fn registry(&self) -> &Arc<PresetRegistry> {
        &self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn cache(&self) -> &DatasetCache {
        &self.cache
    }

    /// Registry of a document: its `presets` catalog on top of the renderer's.
    pub fn document_registry(&self, spec: &Mapping) -> Result<PresetRegistry> {
        let catalog = match spec.get(PRESETS_KEY) {
            None | Some(Value::Null) => Mapping::new(),
            Some(Value::Mapping(m)) => m.clone(),
            Some(other) => return Err(FigspecError::shape(PRESETS_KEY, other)),
        };
        Ok(PresetRegistry::from_mapping(&catalog)?.with_base(Arc::clone(&self.registry)))
    }

    /// Draw every figure in `source` and write it to its `outfile`.
    ///
    /// Spec-shape and preset-registry errors abort the run. Any other error
    /// stops only the figure that raised it and is reported in the summary.
    /// Paginated documents are closed before returning either way.
    pub fn draw_report(&mut self, source: &SpecSource, options: &DrawOptions) -> Result<ReportSummary> {
        let spec = loader::load(source)?;
        let expanded = initializer::expand(&spec)?;
        let root = expanded.root();

        let catalog = self.document_registry(root)?.resolve_all()?;
        let defaults = match root.get(DEFAULTS_KEY) {
            None | Some(Value::Null) => self.defaults.clone(),
            Some(Value::Mapping(m)) => merge::merge_mappings(&self.defaults, m),
            Some(other) => return Err(FigspecError::shape(DEFAULTS_KEY, other)),
        };
        let resolver =
            ArgumentResolver::new(&defaults, &catalog, &options.overrides).strict(options.strict);

        let mut selection = options.presets.clone();
        for name in preset_names(root, &NodePath::root())? {
            if !selection.contains(&name) {
                selection.push(name);
            }
        }

        let (hits_before, misses_before) = self.cache.stats();
        let mut multiplexer = OutputMultiplexer::new();
        let mut summary = ReportSummary::default();
        let mut fatal = None;

        for figure in expanded.figures() {
            match self.draw_figure(&resolver, root, &figure, &selection, &mut multiplexer) {
                Ok(emitted) => summary.outputs.push(emitted),
                Err(err) if err.aborts_run() => {
                    fatal = Some(err);
                    break;
                }
                Err(err) => {
                    warn!(figure = figure.index, error = %err, "figure failed");
                    summary.failures.push(FigureFailure {
                        index: figure.index,
                        error: err.to_string(),
                        exit_code: err.exit_code(),
                    });
                }
            }
        }

        let closed = multiplexer.close_all(&mut self.backend);
        if let Some(err) = fatal {
            return Err(err);
        }
        summary.documents = closed?
            .into_iter()
            .map(|(path, pages)| ClosedDocument { path, pages })
            .collect();

        let (hits, misses) = self.cache.stats();
        summary.dataset_cache_hits = hits - hits_before;
        summary.datasets_loaded = misses - misses_before;
        info!(
            figures = summary.outputs.len(),
            failures = summary.failures.len(),
            "report finished"
        );
        Ok(summary)
    }

    fn draw_figure(
        &mut self,
        resolver: &ArgumentResolver<'_>,
        root: &Mapping,
        figure: &Indexed<'_>,
        selection: &[String],
        multiplexer: &mut OutputMultiplexer<B::Document>,
    ) -> Result<Emitted> {
        let path = NodePath::root().join(Level::Figures, figure.key);
        let slices = slice_sequence(root, &[], figure.node, Level::Figures);
        let figure_args = resolver.resolve(Level::Figures.routine(), &path, selection, &slices)?;
        let (mut canvas, handles) = self.backend.create_figure(&figure_args.args)?;

        for subplot in children(figure.node, Level::Subplots) {
            let subplot_path = path.join(Level::Subplots, subplot.key);
            let Some(handle) = handles.get(&subplot.index) else {
                warn!(subplot = %subplot_path, "no grid cell for subplot, skipping");
                continue;
            };
            let slices = slice_sequence(root, &[figure.node], subplot.node, Level::Subplots);
            let subplot_args = resolver.resolve(
                Level::Subplots.routine(),
                &subplot_path,
                &figure_args.selected,
                &slices,
            )?;
            self.backend.draw_subplot(&mut canvas, handle, &subplot_args.args)?;

            for dataset in children(subplot.node, Level::Datasets) {
                let dataset_path = subplot_path.join(Level::Datasets, dataset.key);
                let slices = slice_sequence(
                    root,
                    &[figure.node, subplot.node],
                    dataset.node,
                    Level::Datasets,
                );
                let dataset_args = resolver.resolve(
                    Level::Datasets.routine(),
                    &dataset_path,
                    &subplot_args.selected,
                    &slices,
                )?;
                let data = self.cache.get_or_load(self.loader.as_ref(), &dataset_args.args)?;
                if self
                    .backend
                    .draw_dataset(&mut canvas, handle, &data, &dataset_args.args)?
                    .is_some()
                {
                    debug!(dataset = %dataset_path, "dataset added a legend entry");
                }
            }
        }

        let outfile = synonyms::multi_kw(&figure_args.args, "outfile")
            .and_then(Value::as_str)
            .ok_or_else(|| FigspecError::argument(Level::Figures.routine(), "no 'outfile' given"))?;
        multiplexer.emit(&mut self.backend, &canvas, outfile, &figure_args.args)
    }
}

/// Presets visible for `spec` (or only the built-in catalog), for listing.
pub fn list_presets<B: Backend>(
    renderer: &Renderer<B>,
    spec: Option<&Mapping>,
    full_only: bool,
) -> Result<Vec<PresetInfo>> {
    match spec {
        Some(spec) => Ok(renderer.document_registry(spec)?.list(full_only)),
        None => Ok(renderer.registry().list(full_only)),
    }
}
