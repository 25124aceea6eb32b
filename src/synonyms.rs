//! Frozen table of argument aliases.
//!
//! Drawing routines look arguments up by canonical name; a spec may use any
//! alias listed for it. The first name present (canonical first, then aliases
//! in table order) wins.

use serde_yaml::{Mapping, Value};

/// `(canonical, aliases)` pairs.
pub const SYNONYMS: &[(&str, &[&str])] = &[
    ("title", &["caption", "suptitle"]),
    ("title_fp", &["title_font"]),
    ("xlabel", &["x_label"]),
    ("ylabel", &["y_label"]),
    ("label_fp", &["label_font"]),
    ("tick_fp", &["ticklabel_fp", "tick_font"]),
    ("xticks", &["ticks"]),
    ("yticks", &["ticks"]),
    ("xticklabels", &["ticklabels"]),
    ("yticklabels", &["ticklabels"]),
    ("xlim", &["xbound"]),
    ("ylim", &["ybound"]),
    ("color", &["c", "colour"]),
    ("linewidth", &["lw"]),
    ("markersize", &["ms"]),
    ("outfile", &["output"]),
    ("legend", &["show_legend"]),
];

/// Aliases registered for `canonical`, empty if none.
pub fn aliases(canonical: &str) -> &'static [&'static str] {
    SYNONYMS
        .iter()
        .find(|(name, _)| *name == canonical)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[])
}

/// Value of the first non-null key among `canonical` and its aliases.
pub fn multi_kw<'a>(args: &'a Mapping, canonical: &str) -> Option<&'a Value> {
    std::iter::once(canonical)
        .chain(aliases(canonical).iter().copied())
        .filter_map(|name| args.get(name))
        .find(|value| !value.is_null())
}

/// Rewrite aliases to canonical keys. A canonical key already present wins;
/// otherwise the first alias in table order supplies the value. Keys are
/// moved, so other entries keep their positions.
pub fn canonicalize(args: &Mapping) -> Mapping {
    let mut out = Mapping::new();
    for (key, value) in args {
        let Some(name) = key.as_str() else {
            out.insert(key.clone(), value.clone());
            continue;
        };
        let canonical_targets: Vec<&str> = SYNONYMS
            .iter()
            .filter(|(_, aliases)| aliases.contains(&name))
            .map(|(canonical, _)| *canonical)
            .collect();
        if canonical_targets.is_empty() {
            if !out.contains_key(name) {
                out.insert(key.clone(), value.clone());
            }
            continue;
        }
        for canonical in canonical_targets {
            if args.contains_key(canonical) || out.contains_key(canonical) {
                continue;
            }
            out.insert(Value::String(canonical.to_string()), value.clone());
        }
    }
    out
}
