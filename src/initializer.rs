//! Spec expansion
//!
//! Turns a loaded spec into a canonical tree where every indexed level
//! (`figures` → `subplots` → `datasets`) holds only index entries and named
//! attributes:
//!
//! ```text
//! figures:                      figures:
//!   all: {title_fp: 10b}          0: {title_fp: 10b, gridspec: {...},
//!   0:                                subplots: {0: {}, 1: {}}}
//!     gridspec: {nrows: 1,   =>   1: {title_fp: 12b}
//!                ncols: 2}
//!   1: {title_fp: 12b}
//! ```
//!
//! `all` templates are merged under each sibling index, `gridspec` synthesizes
//! missing subplot entries, and the result is read-only for the resolver.

use crate::error::{FigspecError, Result};
use crate::merge::{self, index_of, key_to_string};
use serde_yaml::{Mapping, Value};
use std::fmt;
use tracing::debug;

/// Key of the template entry at an indexed level.
pub const ALL_KEY: &str = "all";

/// Key of the figure-level grid declaration.
pub const GRIDSPEC_KEY: &str = "gridspec";

/// The three indexed levels, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Figures,
    Subplots,
    Datasets,
}

impl Level {
    /// Key under which this level is stored in its parent.
    pub fn key(self) -> &'static str {
        match self {
            Level::Figures => "figures",
            Level::Subplots => "subplots",
            Level::Datasets => "datasets",
        }
    }

    /// Drawing routine that consumes nodes of this level.
    pub fn routine(self) -> &'static str {
        match self {
            Level::Figures => "draw_figure",
            Level::Subplots => "draw_subplot",
            Level::Datasets => "draw_dataset",
        }
    }

    pub fn child(self) -> Option<Level> {
        match self {
            Level::Figures => Some(Level::Subplots),
            Level::Subplots => Some(Level::Datasets),
            Level::Datasets => None,
        }
    }
}

/// Dotted location of a node, e.g. `figures.3.subplots.1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePath(Vec<String>);

impl NodePath {
    pub fn root() -> Self {
        NodePath(Vec::new())
    }

    /// Path extended by one level key and one entry key.
    pub fn join(&self, level: Level, key: &Value) -> Self {
        let mut parts = self.0.clone();
        parts.push(level.key().to_string());
        parts.push(key_to_string(key));
        NodePath(parts)
    }

    fn with_segment(&self, segment: &str) -> Self {
        let mut parts = self.0.clone();
        parts.push(segment.to_string());
        NodePath(parts)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0.join("."))
        }
    }
}

/// One instance of an indexed level.
#[derive(Debug, Clone, Copy)]
pub struct Indexed<'a> {
    pub index: u64,
    pub key: &'a Value,
    pub node: &'a Mapping,
}

/// Fully expanded spec tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedSpec {
    root: Mapping,
}

impl ExpandedSpec {
    pub fn root(&self) -> &Mapping {
        &self.root
    }

    /// Figure entries in numeric index order.
    pub fn figures(&self) -> Vec<Indexed<'_>> {
        children(&self.root, Level::Figures)
    }
}

/// Entries of `level` below `node`, in numeric index order.
pub fn children(node: &Mapping, level: Level) -> Vec<Indexed<'_>> {
    let Some(entries) = merge::get_mapping(node, level.key()) else {
        return Vec::new();
    };
    sorted_indices(entries)
        .into_iter()
        .filter_map(|(index, key)| {
            entries
                .get(key)
                .and_then(Value::as_mapping)
                .map(|node| Indexed { index, key, node })
        })
        .collect()
}

/// Index keys of an indexed level sorted by numeric value, ties broken by the
/// original key text.
pub fn sorted_indices(level: &Mapping) -> Vec<(u64, &Value)> {
    let mut indices: Vec<(u64, &Value)> = level
        .keys()
        .filter_map(|key| index_of(key).map(|i| (i, key)))
        .collect();
    indices.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| key_to_string(a.1).cmp(&key_to_string(b.1))));
    indices
}

/// Expand a loaded spec.
pub fn expand(source: &Mapping) -> Result<ExpandedSpec> {
    let mut root = source.clone();
    if let Some(figures) = source.get(Level::Figures.key()) {
        let path = NodePath::root().with_segment(Level::Figures.key());
        let expanded = expand_level(figures, Level::Figures, &NodePath::root(), &path)?;
        root.insert(Level::Figures.key().into(), Value::Mapping(expanded));
    }
    Ok(ExpandedSpec { root })
}

fn expand_level(
    value: &Value,
    level: Level,
    parent: &NodePath,
    path: &NodePath,
) -> Result<Mapping> {
    let entries = match value {
        Value::Null => return Ok(Mapping::new()),
        Value::Mapping(m) => m,
        other => return Err(FigspecError::shape(path.to_string(), other)),
    };

    let template = match entries.get(ALL_KEY) {
        None | Some(Value::Null) => None,
        Some(Value::Mapping(m)) => Some(m),
        Some(other) => {
            return Err(FigspecError::shape(path.with_segment(ALL_KEY).to_string(), other))
        }
    };

    let mut out = Mapping::new();
    for (key, entry) in entries {
        if key.as_str() == Some(ALL_KEY) {
            continue;
        }
        if index_of(key).is_none() {
            out.insert(key.clone(), entry.clone());
            continue;
        }
        let node_path = parent.join(level, key);
        let node = match entry {
            Value::Null => Mapping::new(),
            Value::Mapping(m) => m.clone(),
            other => return Err(FigspecError::shape(node_path.to_string(), other)),
        };
        let node = match template {
            Some(template) => merge::merge_mappings(template, &node),
            None => node,
        };
        out.insert(key.clone(), Value::Mapping(expand_node(node, level, &node_path)?));
    }
    Ok(out)
}

fn expand_node(mut node: Mapping, level: Level, path: &NodePath) -> Result<Mapping> {
    if level == Level::Figures {
        apply_gridspec(&mut node, path)?;
    }
    if let Some(child) = level.child() {
        if let Some(entries) = node.get(child.key()) {
            let level_path = path.with_segment(child.key());
            let expanded = expand_level(entries, child, path, &level_path)?;
            node.insert(child.key().into(), Value::Mapping(expanded));
        }
    }
    Ok(node)
}

/// Declared grid of a figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSpec {
    pub nrows: u64,
    pub ncols: u64,
    pub nsubplots: u64,
}

impl GridSpec {
    /// Read a `gridspec` mapping. `nsubplots` defaults to and is capped at
    /// `nrows * ncols`.
    pub fn from_mapping(grid: &Mapping, path: &str) -> Result<Self> {
        let nrows = positive(grid, "nrows", path)?.unwrap_or(1);
        let ncols = positive(grid, "ncols", path)?.unwrap_or(1);
        let cells = nrows.saturating_mul(ncols);
        let nsubplots = positive(grid, "nsubplots", path)?.map_or(cells, |n| n.min(cells));
        Ok(GridSpec { nrows, ncols, nsubplots })
    }

    /// Row and column of subplot `index`, filled row-major.
    pub fn cell(&self, index: u64) -> Option<(u64, u64)> {
        if index >= self.nsubplots {
            return None;
        }
        Some((index / self.ncols, index % self.ncols))
    }
}

fn positive(grid: &Mapping, key: &str, path: &str) -> Result<Option<u64>> {
    match grid.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match index_of(value) {
            Some(n) if n >= 1 => Ok(Some(n)),
            _ => Err(FigspecError::SpecShape {
                path: format!("{}.{}", path, key),
                found: format!("{} (expected an integer >= 1)", key_to_string(value)),
            }),
        },
    }
}

fn apply_gridspec(node: &mut Mapping, path: &NodePath) -> Result<()> {
    let grid_path = path.with_segment(GRIDSPEC_KEY).to_string();
    let grid = match node.get(GRIDSPEC_KEY) {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Mapping(m)) => GridSpec::from_mapping(m, &grid_path)?,
        Some(other) => return Err(FigspecError::shape(grid_path, other)),
    };

    let subplots_key: Value = Level::Subplots.key().into();
    let mut subplots = match node.get(&subplots_key) {
        None | Some(Value::Null) => Mapping::new(),
        Some(Value::Mapping(m)) => m.clone(),
        Some(other) => {
            return Err(FigspecError::shape(
                path.with_segment(Level::Subplots.key()).to_string(),
                other,
            ))
        }
    };

    let existing: Vec<u64> = subplots.keys().filter_map(index_of).collect();
    for i in 0..grid.nsubplots {
        if !existing.contains(&i) {
            subplots.insert(Value::Number(i.into()), Value::Mapping(Mapping::new()));
        }
    }
    for index in existing.iter().filter(|i| **i >= grid.nsubplots) {
        debug!(figure = %path, index, "subplot index lies outside gridspec");
    }
    node.insert(subplots_key, Value::Mapping(subplots));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(s: &str) -> Mapping {
        serde_yaml::from_str(s).unwrap()
    }

    fn indices(node: &Mapping, level: Level) -> Vec<u64> {
        children(node, level).iter().map(|c| c.index).collect()
    }

    #[test]
    fn test_all_propagation() {
        let expanded = expand(&spec(
            r#"
figures:
  all: {title_fp: 10b, size: {w: 1, h: 1}}
  0: {}
  1: {title_fp: 12b, size: {w: 2}}
"#,
        ))
        .unwrap();
        let figures = expanded.figures();
        assert_eq!(figures.len(), 2);
        assert_eq!(figures[0].node.get("title_fp").unwrap().as_str(), Some("10b"));
        assert_eq!(figures[1].node.get("title_fp").unwrap().as_str(), Some("12b"));
        assert_eq!(
            figures[1].node.get("size").unwrap(),
            &serde_yaml::from_str::<Value>("{w: 2, h: 1}").unwrap()
        );
        let figures_level = merge::get_mapping(expanded.root(), "figures").unwrap();
        assert!(!figures_level.contains_key(ALL_KEY));
    }

    #[test]
    fn test_nested_all_reaches_grid_subplots() {
        let expanded = expand(&spec(
            r#"
figures:
  all:
    gridspec: {nrows: 1, ncols: 2}
    subplots:
      all: {xlabel: Time}
  0:
    subplots:
      1: {xlabel: Step}
"#,
        ))
        .unwrap();
        let fig = expanded.figures()[0].node;
        let subs = children(fig, Level::Subplots);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].node.get("xlabel").unwrap().as_str(), Some("Time"));
        assert_eq!(subs[1].node.get("xlabel").unwrap().as_str(), Some("Step"));
    }

    #[test]
    fn test_grid_expansion() {
        let expanded = expand(&spec(
            "figures:\n  0:\n    gridspec: {nrows: 2, ncols: 2, nsubplots: 3}\n",
        ))
        .unwrap();
        let fig = expanded.figures()[0].node;
        assert_eq!(indices(fig, Level::Subplots), vec![0, 1, 2]);
        for sub in children(fig, Level::Subplots) {
            assert!(sub.node.is_empty());
        }
    }

    #[test]
    fn test_grid_keeps_existing_and_out_of_range() {
        let expanded = expand(&spec(
            r#"
figures:
  0:
    gridspec: {nrows: 1, ncols: 2, nsubplots: 10}
    subplots:
      0: {title: kept}
      5: {title: extra}
"#,
        ))
        .unwrap();
        let fig = expanded.figures()[0].node;
        assert_eq!(indices(fig, Level::Subplots), vec![0, 1, 5]);
        let subs = children(fig, Level::Subplots);
        assert_eq!(subs[0].node.get("title").unwrap().as_str(), Some("kept"));
    }

    #[test]
    fn test_numeric_ordering_preserves_keys() {
        let expanded = expand(&spec(
            r#"
figures:
  "10": {}
  2: {}
  "03": {}
  name: attribute
"#,
        ))
        .unwrap();
        let figures = expanded.figures();
        let order: Vec<u64> = figures.iter().map(|f| f.index).collect();
        assert_eq!(order, vec![2, 3, 10]);
        assert_eq!(figures[1].key.as_str(), Some("03"));
        let level = merge::get_mapping(expanded.root(), "figures").unwrap();
        assert_eq!(level.get("name").unwrap().as_str(), Some("attribute"));
    }

    #[test]
    fn test_no_recursion_into_attributes() {
        let expanded = expand(&spec(
            "figures:\n  0:\n    legend_kw:\n      all: {keep: me}\n",
        ))
        .unwrap();
        let legend = expanded.figures()[0].node.get("legend_kw").unwrap();
        assert!(legend.as_mapping().unwrap().contains_key(ALL_KEY));
    }

    #[test]
    fn test_null_entry_is_empty() {
        let expanded = expand(&spec("figures:\n  all: {a: 1}\n  0:\n")).unwrap();
        assert_eq!(expanded.figures()[0].node.get("a").unwrap().as_u64(), Some(1));
    }

    #[test]
    fn test_shape_errors() {
        let err = expand(&spec("figures:\n  0: [1, 2]\n")).unwrap_err();
        match err {
            FigspecError::SpecShape { path, found } => {
                assert_eq!(path, "figures.0");
                assert_eq!(found, "sequence");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = expand(&spec("figures:\n  0:\n    subplots:\n      1: text\n")).unwrap_err();
        assert!(matches!(err, FigspecError::SpecShape { ref path, .. } if path == "figures.0.subplots.1"));

        let err = expand(&spec("figures: 3\n")).unwrap_err();
        assert!(matches!(err, FigspecError::SpecShape { .. }));

        let err = expand(&spec("figures:\n  0:\n    gridspec: {nrows: 0}\n")).unwrap_err();
        assert!(matches!(err, FigspecError::SpecShape { .. }));
    }

    #[test]
    fn test_grid_cells() {
        let grid = GridSpec::from_mapping(&spec("{nrows: 2, ncols: 3, nsubplots: 4}"), "g").unwrap();
        assert_eq!(grid.cell(0), Some((0, 0)));
        assert_eq!(grid.cell(3), Some((1, 0)));
        assert_eq!(grid.cell(4), None);
    }

    #[test]
    fn test_source_untouched() {
        let source = spec("figures:\n  all: {a: 1}\n  0: {}\n");
        let before = source.clone();
        let _ = expand(&source).unwrap();
        assert_eq!(source, before);
    }
}
