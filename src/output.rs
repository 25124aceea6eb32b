//! Output routing for one `draw_report` run.
//!
//! Figures that name the same paginated destination become successive pages
//! of one document; everything else is written per figure.

use crate::backend::{Backend, SaveTarget};
use crate::error::{FigspecError, Result};
use serde_yaml::Mapping;
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

/// Expand `$VAR`, `${VAR}` and `~`, then make the path absolute with `.` and
/// `..` removed lexically.
pub fn canonical_path(raw: &str) -> std::result::Result<PathBuf, String> {
    let expanded = shellexpand::full(raw)
        .map_err(|e| format!("cannot expand '{}': {}", raw, e))?;
    let path = Path::new(&*expanded);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| format!("cannot resolve current directory: {}", e))?
            .join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

/// Where one figure ended up.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum Emitted {
    File(PathBuf),
    Page { path: PathBuf, page: usize },
}

struct OpenDocument<D> {
    path: PathBuf,
    document: D,
    pages: usize,
}

/// Canonical path → open multi-page document, in first-opened order.
pub struct OutputMultiplexer<D> {
    open: Vec<OpenDocument<D>>,
}

impl<D> Default for OutputMultiplexer<D> {
    fn default() -> Self {
        Self { open: Vec::new() }
    }
}

impl<D> std::fmt::Debug for OutputMultiplexer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputMultiplexer")
            .field("open", &self.open_paths())
            .finish()
    }
}

impl<D> OutputMultiplexer<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths of currently open documents.
    pub fn open_paths(&self) -> Vec<&Path> {
        self.open.iter().map(|d| d.path.as_path()).collect()
    }

    /// Write `figure` to `outfile`: a new page of the document at that path if
    /// the format is paginated, otherwise a standalone file.
    pub fn emit<B>(
        &mut self,
        backend: &mut B,
        figure: &B::Figure,
        outfile: &str,
        options: &Mapping,
    ) -> Result<Emitted>
    where
        B: Backend<Document = D>,
    {
        let path = canonical_path(outfile).map_err(|e| FigspecError::output(outfile, e))?;

        if !backend.is_paginated(&path) {
            backend.save_figure(figure, SaveTarget::File(&path), options)?;
            info!(path = %path.display(), "wrote figure");
            return Ok(Emitted::File(path));
        }

        let slot = match self.open.iter().position(|d| d.path == path) {
            Some(slot) => slot,
            None => {
                let document = backend.open_document(&path)?;
                self.open.push(OpenDocument {
                    path: path.clone(),
                    document,
                    pages: 0,
                });
                self.open.len() - 1
            }
        };
        let entry = &mut self.open[slot];
        backend.save_figure(figure, SaveTarget::Page(&mut entry.document), options)?;
        entry.pages += 1;
        info!(path = %path.display(), page = entry.pages, "wrote figure page");
        Ok(Emitted::Page {
            path,
            page: entry.pages,
        })
    }

    /// Close every open document. All documents are closed even if one fails;
    /// the first failure is returned.
    pub fn close_all<B>(&mut self, backend: &mut B) -> Result<Vec<(PathBuf, usize)>>
    where
        B: Backend<Document = D>,
    {
        let mut closed = Vec::with_capacity(self.open.len());
        let mut first_error = None;
        for entry in self.open.drain(..) {
            match backend.close_document(entry.document) {
                Ok(()) => {
                    info!(path = %entry.path.display(), pages = entry.pages, "closed document");
                    closed.push((entry.path, entry.pages));
                }
                Err(err) => {
                    warn!(path = %entry.path.display(), error = %err, "failed to close document");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(closed),
        }
    }
}
