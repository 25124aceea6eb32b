//! The drawing collaborator consumed by the renderer.

use crate::data::Dataset;
use crate::error::Result;
use serde_yaml::Mapping;
use std::collections::BTreeMap;
use std::path::Path;

/// Where `save_figure` should put a figure.
#[derive(Debug)]
pub enum SaveTarget<'a, D> {
    /// A single-page destination, written and closed immediately.
    File(&'a Path),
    /// The next page of an open multi-page document.
    Page(&'a mut D),
}

/// Synchronous drawing hooks. The renderer makes no assumptions beyond these
/// signatures.
pub trait Backend {
    /// Canvas for one figure.
    type Figure;
    /// Handle to one subplot of a figure.
    type Subplot;
    /// Open multi-page output document.
    type Document;
    /// What `draw_dataset` may hand back for legend building.
    type Legend;

    /// Create a figure canvas and its subplot handles keyed by index.
    fn create_figure(
        &mut self,
        args: &Mapping,
    ) -> Result<(Self::Figure, BTreeMap<u64, Self::Subplot>)>;

    fn draw_subplot(
        &mut self,
        figure: &mut Self::Figure,
        subplot: &Self::Subplot,
        args: &Mapping,
    ) -> Result<()>;

    fn draw_dataset(
        &mut self,
        figure: &mut Self::Figure,
        subplot: &Self::Subplot,
        dataset: &Dataset,
        args: &Mapping,
    ) -> Result<Option<Self::Legend>>;

    /// True if `path` names a paginated format.
    fn is_paginated(&self, path: &Path) -> bool;

    fn open_document(&mut self, path: &Path) -> Result<Self::Document>;

    fn save_figure(
        &mut self,
        figure: &Self::Figure,
        target: SaveTarget<'_, Self::Document>,
        options: &Mapping,
    ) -> Result<()>;

    fn close_document(&mut self, document: Self::Document) -> Result<()>;
}
