//! Coordinate translation between a multi-widget host document and per-language virtual
//! documents.
//!
//! A notebook shows the user many cells; a language server wants one continuous file per
//! language. This crate keeps four coordinate spaces in step:
//!
//! - [`RootPosition`]: the host document, cells concatenated in display order
//! - [`VirtualPosition`]: one synthetic document per embedded language
//! - [`SourcePosition`]: a document's raw block text before overrides
//! - [`EditorPosition`]: local to one widget
//!
//! The [`VirtualDocument`] tree owns every region boundary and its [`Generation`]. A
//! [`VirtualEditor`] answers widget questions on top of it: [`FileEditor`] for a single text
//! widget, [`NotebookEditor`] for cells, [`ProxyEditor`] for widgets owned by the host.
//!
//! ```
//! use cellmap::{Cell, Config, RootPosition, VirtualEditor, VirtualPosition, WidgetId};
//!
//! let config = Config::load_embedded()?;
//! let mut notebook = config.notebook_editor("analysis.ipynb")?;
//! notebook.set_cells([
//!     Cell::new(WidgetId(1), "import pandas as pd"),
//!     Cell::new(WidgetId(2), "%%R\nsummary(df)"),
//! ])?;
//!
//! let (document, position) =
//!     notebook.resolve_document_and_virtual_position(RootPosition::new(2, 4))?;
//! assert_eq!(document.language(), "r");
//! assert_eq!(position, VirtualPosition::new(0, 4));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod column_map;
pub mod config;
pub mod document;
pub mod editor;
mod error;
pub mod extractors;
pub mod overrides;
mod position;

pub use config::Config;
pub use document::{Resolution, VirtualDocument};
pub use editor::{Cell, FileEditor, HostWidget, NotebookEditor, ProxyEditor, VirtualEditor};
pub use error::{Error, Result};
pub use extractors::{ExtractorsRegistry, ForeignCodeExtractor};
pub use overrides::{OverrideRule, OverridesRegistry};
pub use position::{
    EditorPosition, EditorRange, Generation, RootPosition, SourcePosition, Space, Stamped,
    Tagged, VirtualPosition, WidgetId,
};
