//! Datasets read by `draw_dataset`: CSV, TSV or JSON tables loaded from
//! `infile`, shared through a per-renderer cache keyed by canonical path.

use crate::error::{FigspecError, Result};
use crate::output::canonical_path;
use serde_json::Value as JsonValue;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const ROUTINE: &str = "draw_dataset";

/// Tabular data handed to `draw_dataset`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Dataset with no columns, used when values are given inline.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read delimited text with a header row.
    pub fn from_delimited<R: Read>(reader: R, delimiter: u8) -> anyhow::Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    /// Create a dataset from a JSON array of objects; headers come from the
    /// first object.
    pub fn from_json(value: &JsonValue) -> anyhow::Result<Self> {
        let array = value
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Input data must be a JSON array of objects"))?;
        let Some(first) = array.first() else {
            return Ok(Self::empty());
        };
        let first = first
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("Items in array must be objects"))?;
        let headers: Vec<String> = first.keys().cloned().collect();

        let mut rows = Vec::with_capacity(array.len());
        for item in array {
            let obj = item
                .as_object()
                .ok_or_else(|| anyhow::anyhow!("Items in array must be objects"))?;
            let row = headers
                .iter()
                .map(|header| match obj.get(header) {
                    Some(JsonValue::String(s)) => Ok(s.clone()),
                    Some(JsonValue::Number(n)) => Ok(n.to_string()),
                    Some(JsonValue::Bool(b)) => Ok(b.to_string()),
                    Some(JsonValue::Null) | None => Ok(String::new()),
                    _ => Err(anyhow::anyhow!("Unsupported value type for field '{}'", header)),
                })
                .collect::<anyhow::Result<Vec<String>>>()?;
            rows.push(row);
        }
        Ok(Self { headers, rows })
    }

    /// Case-insensitive column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.eq_ignore_ascii_case(name))
    }

    pub fn text_column(&self, name: &str) -> anyhow::Result<Vec<String>> {
        let index = self
            .column_index(name)
            .ok_or_else(|| anyhow::anyhow!("Column '{}' not found", name))?;
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(index).cloned().unwrap_or_default())
            .collect())
    }

    pub fn numeric_column(&self, name: &str) -> anyhow::Result<Vec<f64>> {
        self.text_column(name)?
            .iter()
            .enumerate()
            .map(|(row, text)| {
                text.parse::<f64>().map_err(|_| {
                    anyhow::anyhow!(
                        "Failed to parse '{}' as number in column '{}' at row {}",
                        text,
                        name,
                        row + 1
                    )
                })
            })
            .collect()
    }
}

/// Identity of a loaded dataset for reuse across nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(pub Vec<String>);

/// Source of datasets for `draw_dataset`.
pub trait DatasetLoader {
    /// `None` disables caching for this call.
    fn cache_key(&self, args: &Mapping) -> Option<CacheKey>;

    fn load(&self, args: &Mapping) -> Result<Dataset>;
}

/// Loads `infile` as CSV, TSV or JSON (by extension). Datasets without
/// `infile` are inline and load as [`Dataset::empty`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl FileLoader {
    fn infile(args: &Mapping) -> Option<&str> {
        args.get("infile").and_then(Value::as_str)
    }

    fn delimiter(args: &Mapping, path: &Path) -> u8 {
        if let Some(d) = args.get("delimiter").and_then(Value::as_str) {
            if let [byte] = d.as_bytes() {
                return *byte;
            }
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
            _ => b',',
        }
    }
}

impl DatasetLoader for FileLoader {
    fn cache_key(&self, args: &Mapping) -> Option<CacheKey> {
        let path = canonical_path(Self::infile(args)?).ok()?;
        let delimiter = Self::delimiter(args, &path);
        Some(CacheKey(vec![
            "file".to_string(),
            path.display().to_string(),
            (delimiter as char).to_string(),
        ]))
    }

    fn load(&self, args: &Mapping) -> Result<Dataset> {
        let Some(raw) = Self::infile(args) else {
            return Ok(Dataset::empty());
        };
        let path = canonical_path(raw).map_err(|e| FigspecError::argument(ROUTINE, e))?;
        debug!(path = %path.display(), "loading dataset");
        let file = std::fs::File::open(&path).map_err(|e| {
            FigspecError::argument(ROUTINE, format!("cannot open infile '{}': {}", path.display(), e))
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let dataset = if is_json {
            serde_json::from_reader::<_, JsonValue>(file)
                .map_err(anyhow::Error::from)
                .and_then(|value| Dataset::from_json(&value))
        } else {
            Dataset::from_delimited(file, Self::delimiter(args, &path))
        };
        dataset.map_err(|e| {
            FigspecError::argument(ROUTINE, format!("cannot parse '{}': {:#}", path.display(), e))
        })
    }
}

/// Datasets already loaded by one renderer. Cached values are shared and must
/// be treated as read-only.
#[derive(Debug, Default)]
pub struct DatasetCache {
    entries: HashMap<CacheKey, Arc<Dataset>>,
    hits: usize,
    misses: usize,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached dataset for `args`, loading and storing it on a miss.
    pub fn get_or_load(&mut self, loader: &dyn DatasetLoader, args: &Mapping) -> Result<Arc<Dataset>> {
        let Some(key) = loader.cache_key(args) else {
            return Ok(Arc::new(loader.load(args)?));
        };
        if let Some(dataset) = self.entries.get(&key) {
            self.hits += 1;
            debug!(key = ?key.0, "dataset cache hit");
            return Ok(Arc::clone(dataset));
        }
        self.misses += 1;
        let dataset = Arc::new(loader.load(args)?);
        self.entries.insert(key, Arc::clone(&dataset));
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Write;

    fn yaml(s: &str) -> Mapping {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_from_delimited() {
        let data = "time, temp\n0, 1.5\n1, 2.5\n";
        let ds = Dataset::from_delimited(data.as_bytes(), b',').unwrap();
        assert_eq!(ds.headers, vec!["time", "temp"]);
        assert_eq!(ds.numeric_column("TEMP").unwrap(), vec![1.5, 2.5]);
        assert!(ds.numeric_column("missing").is_err());
    }

    #[test]
    fn test_numeric_column_reports_row() {
        let ds = Dataset::new(vec!["y".into()], vec![vec!["1".into()], vec!["oops".into()]]);
        let err = ds.numeric_column("y").unwrap_err().to_string();
        assert!(err.contains("row 2"), "{err}");
    }

    #[test]
    fn test_from_json() {
        let value: JsonValue = serde_json::from_str(r#"[{"x": 1, "g": "a"}, {"x": 2, "g": null}]"#).unwrap();
        let ds = Dataset::from_json(&value).unwrap();
        assert_eq!(ds.headers, vec!["x", "g"]);
        assert_eq!(ds.rows[1], vec!["2".to_string(), String::new()]);
        assert!(Dataset::from_json(&serde_json::json!({"x": 1})).is_err());
    }

    #[test]
    fn test_file_loader_csv_and_key() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "x,y\n1,2\n3,4").unwrap();
        let args = yaml(&format!("{{infile: '{}'}}", file.path().display()));
        let loader = FileLoader;
        let key = loader.cache_key(&args).unwrap();
        assert_eq!(key.0[0], "file");
        let ds = loader.load(&args).unwrap();
        assert_eq!(ds.numeric_column("y").unwrap(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_inline_not_cached() {
        let loader = FileLoader;
        let args = yaml("{x: [1, 2], y: [3, 4]}");
        assert!(loader.cache_key(&args).is_none());
        let mut cache = DatasetCache::new();
        let ds = cache.get_or_load(&loader, &args).unwrap();
        assert!(ds.headers.is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_missing_infile_is_argument_error() {
        let args = yaml("{infile: /no/such/file.csv}");
        let err = FileLoader.load(&args).unwrap_err();
        assert!(matches!(err, FigspecError::Argument { .. }));
    }

    struct CountingLoader {
        loads: Cell<usize>,
    }

    impl DatasetLoader for CountingLoader {
        fn cache_key(&self, args: &Mapping) -> Option<CacheKey> {
            args.get("name")
                .and_then(Value::as_str)
                .map(|n| CacheKey(vec![n.to_string()]))
        }

        fn load(&self, _args: &Mapping) -> Result<Dataset> {
            self.loads.set(self.loads.get() + 1);
            Ok(Dataset::new(vec!["n".into()], vec![vec![self.loads.get().to_string()]]))
        }
    }

    #[test]
    fn test_cache_hits_share_object() {
        let loader = CountingLoader { loads: Cell::new(0) };
        let mut cache = DatasetCache::new();
        let first = cache.get_or_load(&loader, &yaml("{name: a}")).unwrap();
        let second = cache.get_or_load(&loader, &yaml("{name: a, color: red}")).unwrap();
        let other = cache.get_or_load(&loader, &yaml("{name: b}")).unwrap();
        let uncached = cache.get_or_load(&loader, &yaml("{}")).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(loader.loads.get(), 3);
        assert_eq!(uncached.rows[0][0], "3");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats(), (1, 2));
    }
}
