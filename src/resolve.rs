//! Argument resolution
//!
//! For each node the resolver merges, lowest priority first: the routine's
//! defaults, the selected presets, the spec slices along the node's path and
//! the call overrides. Every bundle is scoped by routine (`draw_figure`,
//! `draw_subplot`, `draw_dataset`) before it is merged.

use crate::error::{FigspecError, Result};
use crate::initializer::{Level, NodePath, ALL_KEY};
use crate::merge::{self, get_mapping, index_of};
use crate::preset::RESERVED_KEYS;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Node attribute naming the presets activated at that node.
pub const PRESET_KEY: &str = "preset";

/// Routine names that scope defaults, presets, overrides and spec slices.
pub const ROUTINES: [&str; 3] = ["draw_figure", "draw_subplot", "draw_dataset"];

/// Arguments resolved for one node, plus the preset selection handed down to
/// its children.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub args: Mapping,
    pub selected: Vec<String>,
}

/// Merges defaults, presets, spec slices and call overrides for each node.
///
/// Precedence, lowest first: defaults, selected presets in selection order,
/// spec slices in path order, call overrides.
#[derive(Debug, Clone)]
pub struct ArgumentResolver<'a> {
    defaults: &'a Mapping,
    presets: &'a BTreeMap<String, Mapping>,
    overrides: &'a Mapping,
    strict: bool,
}

impl<'a> ArgumentResolver<'a> {
    /// `defaults` and `overrides` are routine-keyed bundles; `presets` is the
    /// flattened catalog.
    pub fn new(
        defaults: &'a Mapping,
        presets: &'a BTreeMap<String, Mapping>,
        overrides: &'a Mapping,
    ) -> Self {
        Self {
            defaults,
            presets,
            overrides,
            strict: false,
        }
    }

    /// Treat unknown preset names in a selection as errors.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Resolve the arguments of `routine` for the node at `path`.
    pub fn resolve(
        &self,
        routine: &str,
        path: &NodePath,
        inherited: &[String],
        slices: &[Mapping],
    ) -> Result<Resolution> {
        let selected = self.select_presets(path, inherited, slices)?;

        let defaults = scoped(self.defaults, routine);
        let preset_layers: Vec<Mapping> = selected
            .iter()
            .filter_map(|name| self.presets.get(name))
            .map(|preset| scoped(preset, routine))
            .collect();
        let overrides = scoped(self.overrides, routine);

        let args = merge_layers(&defaults, &preset_layers, slices, &overrides);
        if tracing::enabled!(tracing::Level::DEBUG) {
            let dump = serde_yaml::to_string(&args).unwrap_or_default();
            debug!(routine, path = %path, presets = ?selected, "resolved arguments:\n{}", dump);
        }
        Ok(Resolution { args, selected })
    }

    /// Parent selection followed by the `preset` names of each slice, in
    /// slice order, without duplicates. Names missing from the catalog are
    /// dropped with a warning unless the resolver is strict.
    pub fn select_presets(
        &self,
        path: &NodePath,
        inherited: &[String],
        slices: &[Mapping],
    ) -> Result<Vec<String>> {
        let mut selected: Vec<String> = Vec::with_capacity(inherited.len());
        let push = |name: &str, selected: &mut Vec<String>| -> Result<()> {
            if selected.iter().any(|s| s == name) {
                return Ok(());
            }
            if !self.presets.contains_key(name) {
                if self.strict {
                    return Err(FigspecError::UnknownPreset {
                        name: name.to_string(),
                        referenced_by: path.to_string(),
                    });
                }
                warn!(preset = name, node = %path, "unknown preset ignored");
                return Ok(());
            }
            selected.push(name.to_string());
            Ok(())
        };

        for name in inherited {
            push(name, &mut selected)?;
        }
        for slice in slices {
            for name in preset_names(slice, path)? {
                push(&name, &mut selected)?;
            }
        }
        Ok(selected)
    }
}

/// Merge already-scoped layers in precedence order and drop keys that never
/// reach a drawing routine.
pub fn merge_layers(
    defaults: &Mapping,
    presets: &[Mapping],
    slices: &[Mapping],
    overrides: &Mapping,
) -> Mapping {
    let mut args = Mapping::new();
    merge::merge_into(&mut args, defaults);
    for preset in presets {
        merge::merge_into(&mut args, preset);
    }
    for slice in slices {
        merge::merge_into(&mut args, slice);
    }
    merge::merge_into(&mut args, overrides);

    let mut dropped: Vec<&str> = vec![PRESET_KEY, ALL_KEY];
    dropped.extend_from_slice(&RESERVED_KEYS);
    merge::without_keys(&args, &dropped)
}

/// Subtree of `bundle` under `routine`, or an empty mapping.
pub fn scoped(bundle: &Mapping, routine: &str) -> Mapping {
    get_mapping(bundle, routine).cloned().unwrap_or_default()
}

/// Spec slices for `level`'s routine at a node, lowest priority first: the
/// root's routine-scoped mapping, each ancestor's routine-scoped mapping, the
/// named attributes of the level holding the node, then the node's own
/// attributes.
pub fn slice_sequence(root: &Mapping, ancestors: &[&Mapping], node: &Mapping, level: Level) -> Vec<Mapping> {
    let routine = level.routine();
    let parent = ancestors.last().copied().unwrap_or(root);
    let mut slices = Vec::with_capacity(ancestors.len() + 3);
    slices.push(scoped(root, routine));
    for ancestor in ancestors {
        slices.push(scoped(ancestor, routine));
    }
    slices.push(level_attributes(parent, level));
    slices.push(local_attributes(node, level));
    slices
}

/// Named keys stored beside the index entries of `level` under `parent`,
/// e.g. `xlabel` in `subplots: {xlabel: t, 0: {}, 1: {}}`. They apply to
/// every entry of that level.
pub fn level_attributes(parent: &Mapping, level: Level) -> Mapping {
    let Some(entries) = get_mapping(parent, level.key()) else {
        return Mapping::new();
    };
    entries
        .iter()
        .filter(|(key, _)| index_of(key).is_none())
        .filter(|(key, _)| {
            !key.as_str()
                .is_some_and(|k| k == ALL_KEY || ROUTINES.contains(&k))
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// A node's own attributes: everything except its child level and
/// routine-scoped mappings.
pub fn local_attributes(node: &Mapping, level: Level) -> Mapping {
    let mut excluded: Vec<&str> = ROUTINES.to_vec();
    if let Some(child) = level.child() {
        excluded.push(child.key());
    }
    merge::without_keys(node, &excluded)
}

/// Names under a mapping's `preset` attribute: a string or a sequence of
/// strings.
pub fn preset_names(mapping: &Mapping, path: &NodePath) -> Result<Vec<String>> {
    match mapping.get(PRESET_KEY) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(name)) => Ok(vec![name.clone()]),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(name) => Ok(name.clone()),
                other => Err(FigspecError::shape(format!("{}.{}", path, PRESET_KEY), other)),
            })
            .collect(),
        Some(other) => Err(FigspecError::shape(format!("{}.{}", path, PRESET_KEY), other)),
    }
}
