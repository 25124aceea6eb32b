//! Named preset catalog with `extends` / `inherits` flattening.
//!
//! A preset is an argument bundle organized by drawing routine:
//!
//! ```yaml
//! presets:
//!   wide:
//!     _class: size
//!     help: Two-column figure
//!     draw_figure: {fig_width: 7.0}
//!   wide_notitle:
//!     extends: wide
//!     draw_subplot: {title: ~}
//! ```
//!
//! `extends` names a preset in the same registry; `inherits` names a preset in
//! the base registry (the renderer's built-in catalog). The flattened form is
//! `inherits` < `extends` < the preset itself, with reserved keys removed.

use crate::error::{FigspecError, Result};
use crate::merge;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const HELP_KEY: &str = "help";
pub const EXTENDS_KEY: &str = "extends";
pub const INHERITS_KEY: &str = "inherits";
pub const CLASS_KEY: &str = "_class";

/// Keys that describe a preset rather than contribute arguments.
pub const RESERVED_KEYS: [&str; 4] = [HELP_KEY, EXTENDS_KEY, INHERITS_KEY, CLASS_KEY];

/// Listing entry for a preset.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PresetInfo {
    pub name: String,
    pub help: Option<String>,
    pub class: Option<String>,
    pub extends: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PresetRegistry {
    presets: BTreeMap<String, Mapping>,
    base: Option<Arc<PresetRegistry>>,
}

impl PresetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a `presets:` catalog mapping.
    pub fn from_mapping(catalog: &Mapping) -> Result<Self> {
        let mut registry = Self::new();
        for (key, value) in catalog {
            let name = merge::key_to_string(key);
            match value {
                Value::Mapping(preset) => registry.register(name, preset.clone()),
                Value::Null => registry.register(name, Mapping::new()),
                other => return Err(FigspecError::shape(format!("presets.{}", name), other)),
            }
        }
        Ok(registry)
    }

    /// Attach the registry consulted for `inherits`.
    pub fn with_base(mut self, base: Arc<PresetRegistry>) -> Self {
        self.base = Some(base);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, preset: Mapping) {
        self.presets.insert(name.into(), preset);
    }

    /// True if `name` is defined here or in any base registry.
    pub fn contains(&self, name: &str) -> bool {
        self.presets.contains_key(name) || self.base.as_ref().is_some_and(|b| b.contains(name))
    }

    /// Effective preset with `extends`/`inherits` applied and reserved keys
    /// removed.
    pub fn resolve(&self, name: &str) -> Result<Mapping> {
        if self.presets.contains_key(name) {
            let mut stack = Vec::new();
            return self.flatten(name, "selection", &mut stack, 0);
        }
        match &self.base {
            Some(base) => base.resolve(name),
            None => Err(FigspecError::UnknownPreset {
                name: name.to_string(),
                referenced_by: "selection".to_string(),
            }),
        }
    }

    /// Every preset visible from this registry, flattened. Definitions here
    /// shadow base definitions of the same name.
    pub fn resolve_all(&self) -> Result<BTreeMap<String, Mapping>> {
        let mut out = match &self.base {
            Some(base) => base.resolve_all()?,
            None => BTreeMap::new(),
        };
        for name in self.presets.keys() {
            out.insert(name.clone(), self.resolve(name)?);
        }
        Ok(out)
    }

    /// Presets visible from this registry, sorted by name. With `full_only`,
    /// refinements built with `extends` are left out.
    pub fn list(&self, full_only: bool) -> Vec<PresetInfo> {
        let mut seen: BTreeMap<String, PresetInfo> = BTreeMap::new();
        let mut registry = Some(self);
        while let Some(current) = registry {
            for (name, preset) in &current.presets {
                if seen.contains_key(name) {
                    continue;
                }
                seen.insert(
                    name.clone(),
                    PresetInfo {
                        name: name.clone(),
                        help: string_field(preset, HELP_KEY),
                        class: string_field(preset, CLASS_KEY),
                        extends: string_field(preset, EXTENDS_KEY),
                    },
                );
            }
            registry = current.base.as_deref();
        }
        seen.into_values()
            .filter(|info| !full_only || info.extends.is_none())
            .collect()
    }

    fn flatten(
        &self,
        name: &str,
        referenced_by: &str,
        stack: &mut Vec<(usize, String)>,
        depth: usize,
    ) -> Result<Mapping> {
        if stack.iter().any(|(d, n)| *d == depth && n == name) {
            let mut chain: Vec<String> = stack.iter().map(|(_, n)| n.clone()).collect();
            chain.push(name.to_string());
            return Err(FigspecError::PresetCycle { chain });
        }
        let preset = self.presets.get(name).ok_or_else(|| FigspecError::UnknownPreset {
            name: name.to_string(),
            referenced_by: referenced_by.to_string(),
        })?;

        let inherits = reference(preset, name, INHERITS_KEY)?;
        let extends = reference(preset, name, EXTENDS_KEY)?;

        stack.push((depth, name.to_string()));
        let mut base = Mapping::new();
        if let Some(parent) = inherits {
            let inherited = match &self.base {
                Some(registry) => registry.flatten(&parent, name, stack, depth + 1)?,
                None => self.flatten(&parent, name, stack, depth)?,
            };
            merge::merge_into(&mut base, &inherited);
        }
        if let Some(parent) = extends {
            let extended = self.flatten(&parent, name, stack, depth)?;
            merge::merge_into(&mut base, &extended);
        }
        stack.pop();

        merge::merge_into(&mut base, preset);
        Ok(merge::without_keys(&base, &RESERVED_KEYS))
    }
}

fn string_field(preset: &Mapping, key: &str) -> Option<String> {
    preset.get(key).and_then(Value::as_str).map(str::to_string)
}

fn reference(preset: &Mapping, name: &str, key: &str) -> Result<Option<String>> {
    match preset.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(FigspecError::shape(format!("presets.{}.{}", name, key), other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(s: &str) -> PresetRegistry {
        PresetRegistry::from_mapping(&serde_yaml::from_str(s).unwrap()).unwrap()
    }

    fn yaml(s: &str) -> Mapping {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_extends() {
        let reg = registry("{base: {fig_w: 5}, child: {extends: base, fig_h: 7}}");
        assert_eq!(reg.resolve("child").unwrap(), yaml("{fig_w: 5, fig_h: 7}"));
    }

    #[test]
    fn test_child_wins_and_deep_merges() {
        let reg = registry(
            r#"
base:
  help: Base preset
  _class: content
  draw_subplot: {title: base, xlabel: x}
child:
  extends: base
  help: Child preset
  draw_subplot: {title: child}
"#,
        );
        assert_eq!(
            reg.resolve("child").unwrap(),
            yaml("{draw_subplot: {title: child, xlabel: x}}")
        );
    }

    #[test]
    fn test_inherits_below_extends() {
        let base = Arc::new(registry("{shared: {a: base, b: base, c: base}}"));
        let reg = PresetRegistry::from_mapping(&yaml(
            r#"
parent: {b: parent}
child: {inherits: shared, extends: parent, c: child}
"#,
        ))
        .unwrap()
        .with_base(base);
        assert_eq!(
            reg.resolve("child").unwrap(),
            yaml("{a: base, b: parent, c: child}")
        );
    }

    #[test]
    fn test_inherits_same_name_in_base() {
        let base = Arc::new(registry("{notitle: {draw_subplot: {title: ~, size: 1}}}"));
        let reg = PresetRegistry::from_mapping(&yaml("{notitle: {inherits: notitle, extra: 1}}"))
            .unwrap()
            .with_base(base);
        let resolved = reg.resolve("notitle").unwrap();
        assert_eq!(resolved.get("extra").unwrap().as_u64(), Some(1));
        assert!(resolved.contains_key("draw_subplot"));
    }

    #[test]
    fn test_cycle() {
        let reg = registry("{a: {extends: b}, b: {extends: a}}");
        for name in ["a", "b"] {
            let err = reg.resolve(name).unwrap_err();
            assert!(matches!(err, FigspecError::PresetCycle { .. }), "{name}: {err}");
        }
        let reg = registry("{self_ref: {extends: self_ref}}");
        assert!(matches!(
            reg.resolve("self_ref").unwrap_err(),
            FigspecError::PresetCycle { .. }
        ));
    }

    #[test]
    fn test_unknown_reference() {
        let reg = registry("{a: {extends: missing}}");
        match reg.resolve("a").unwrap_err() {
            FigspecError::UnknownPreset { name, referenced_by } => {
                assert_eq!(name, "missing");
                assert_eq!(referenced_by, "a");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            reg.resolve("nope").unwrap_err(),
            FigspecError::UnknownPreset { .. }
        ));
    }

    #[test]
    fn test_reserved_keys_removed() {
        let reg = registry("{p: {help: h, _class: c, extends: q, x: 1}, q: {inherits: r, y: 2}, r: {z: 3}}");
        let resolved = reg.resolve("p").unwrap();
        for key in RESERVED_KEYS {
            assert!(!resolved.contains_key(key), "{key} leaked");
        }
        assert_eq!(resolved, yaml("{z: 3, y: 2, x: 1}"));
    }

    #[test]
    fn test_lookup_falls_back_to_base() {
        let base = Arc::new(registry("{builtin: {a: 1}}"));
        let reg = registry("{local: {b: 2}}").with_base(base);
        assert!(reg.contains("builtin"));
        assert_eq!(reg.resolve("builtin").unwrap(), yaml("{a: 1}"));
        let all = reg.resolve_all().unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["builtin", "local"]);
    }

    #[test]
    fn test_list() {
        let base = Arc::new(registry("{builtin: {help: From base, _class: size}}"));
        let reg = registry("{full: {help: Full}, refined: {extends: full, help: Refined}}")
            .with_base(base);
        let names: Vec<String> = reg.list(true).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["builtin", "full"]);
        let all = reg.list(false);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].class.as_deref(), Some("size"));
        assert_eq!(all[2].help.as_deref(), Some("Refined"));
    }

    #[test]
    fn test_bad_reference_type() {
        let reg = registry("{a: {extends: [b]}, b: {}}");
        assert!(matches!(reg.resolve("a").unwrap_err(), FigspecError::SpecShape { .. }));
    }
}
