//! Command-line front end.

use crate::error::FigspecError;
use crate::loader::{self, SpecSource};
use crate::merge;
use crate::preset::PresetInfo;
use crate::resolve::ROUTINES;
use crate::runtime::{list_presets, DrawOptions, Renderer};
use anyhow::Context;
use clap::Parser;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "figspec")]
#[command(about = "Render figures described by a YAML spec", long_about = None)]
pub struct Cli {
    /// Spec document to render
    #[arg(long, short = 's', required_unless_present_any = ["list_presets", "all_presets"])]
    pub spec: Option<PathBuf>,

    /// Select a preset for every figure (repeatable, later wins)
    #[arg(long = "preset", short = 'p', value_name = "NAME")]
    pub presets: Vec<String>,

    /// Override an argument, e.g. `draw_figure.dpi=200` (VALUE is YAML)
    #[arg(long = "set", value_name = "ROUTINE.KEY=VALUE", value_parser = parse_override)]
    pub overrides: Vec<Override>,

    /// Fail on unknown preset names instead of skipping them
    #[arg(long)]
    pub strict: bool,

    /// List presets (refinements built with `extends` are left out)
    #[arg(long)]
    pub list_presets: bool,

    /// List every preset, refinements included
    #[arg(long, conflicts_with = "list_presets")]
    pub all_presets: bool,

    /// Print the run summary or preset listing as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Log each written figure
    #[arg(short, long, conflicts_with_all = ["quiet", "debug"])]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "debug")]
    pub quiet: bool,

    /// Log resolved arguments of every node
    #[arg(long)]
    pub debug: bool,
}

/// One `--set` argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    /// Routine followed by the key path below it.
    pub path: Vec<String>,
    pub value: Value,
}

/// Parse `ROUTINE.KEY[.KEY...]=VALUE`.
pub fn parse_override(text: &str) -> Result<Override, String> {
    let (key, raw) = text
        .split_once('=')
        .ok_or_else(|| format!("expected ROUTINE.KEY=VALUE, got '{}'", text))?;
    let path: Vec<String> = key.trim().split('.').map(str::to_string).collect();
    if path.len() < 2 || path.iter().any(String::is_empty) {
        return Err(format!("expected ROUTINE.KEY=VALUE, got '{}'", text));
    }
    if !ROUTINES.contains(&path[0].as_str()) {
        return Err(format!(
            "unknown routine '{}' (expected one of {})",
            path[0],
            ROUTINES.join(", ")
        ));
    }
    let value = serde_yaml::from_str(raw).map_err(|e| format!("invalid value '{}': {}", raw, e))?;
    Ok(Override { path, value })
}

/// Fold `--set` arguments into one routine-keyed mapping; later ones win.
pub fn overrides_mapping(overrides: &[Override]) -> Mapping {
    let mut out = Mapping::new();
    for item in overrides {
        let mut nested = item.value.clone();
        for key in item.path.iter().rev() {
            let mut level = Mapping::new();
            level.insert(Value::String(key.clone()), nested);
            nested = Value::Mapping(level);
        }
        if let Value::Mapping(layer) = nested {
            merge::merge_into(&mut out, &layer);
        }
    }
    out
}

impl Cli {
    /// Install the stderr log subscriber. `RUST_LOG` wins over the flags.
    pub fn init_logging(&self) {
        let level = if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }

    /// Run the command and return the process exit code.
    pub fn execute(&self) -> anyhow::Result<i32> {
        let mut renderer = Renderer::plotters()?;

        if self.list_presets || self.all_presets {
            let spec = match &self.spec {
                Some(path) => Some(loader::load(&SpecSource::from(path.clone()))?),
                None => None,
            };
            let presets = list_presets(&renderer, spec.as_ref(), self.list_presets)?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            if self.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&presets)?)?;
            } else {
                write_preset_listing(&mut out, &presets)?;
            }
            return Ok(0);
        }

        let spec = self.spec.clone().context("--spec is required")?;
        let options = DrawOptions {
            presets: self.presets.clone(),
            overrides: overrides_mapping(&self.overrides),
            strict: self.strict,
        };
        let summary = renderer.draw_report(&SpecSource::from(spec), &options)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        for failure in &summary.failures {
            eprintln!("figure {}: {}", failure.index, failure.error);
        }
        Ok(summary.exit_code())
    }
}

/// Presets grouped by `_class`, unclassified last.
pub fn write_preset_listing<W: Write>(out: &mut W, presets: &[PresetInfo]) -> std::io::Result<()> {
    let mut groups: BTreeMap<Option<&str>, Vec<&PresetInfo>> = BTreeMap::new();
    for info in presets {
        groups.entry(info.class.as_deref()).or_default().push(info);
    }
    let width = presets.iter().map(|p| p.name.len()).max().unwrap_or(0);

    let mut ordered: Vec<_> = groups.into_iter().collect();
    ordered.sort_by_key(|(class, _)| (class.is_none(), *class));
    for (class, members) in ordered {
        writeln!(out, "{}:", class.unwrap_or("other"))?;
        for info in members {
            match &info.help {
                Some(help) => writeln!(out, "  {:<width$}  {}", info.name, help, width = width)?,
                None => writeln!(out, "  {}", info.name)?,
            }
        }
    }
    Ok(())
}

/// Exit code for an error returned by [`Cli::execute`].
pub fn error_exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<FigspecError>()
        .map_or(1, FigspecError::exit_code)
}
