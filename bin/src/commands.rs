pub mod dump;
pub mod resolve;

use crate::notebook::Notebook;
use anyhow::{Context, Result};
use cellmap::{Config, NotebookEditor};
use std::path::Path;
use tracing::debug;

/// Load a notebook and build its virtual documents.
///
/// The notebook's own kernel language wins over the configured default.
pub fn open(config: &Config, path: &Path) -> Result<NotebookEditor> {
    let notebook = Notebook::load(path)?;

    let mut config = config.clone();
    if let Some(language) = notebook.language() {
        config.language = language.to_lowercase();
    }
    let mut editor = config
        .notebook_editor(path.display().to_string())
        .context("Failed to compile configured rules")?;

    let cells = notebook.code_cells();
    debug!(
        path = %path.display(),
        language = %config.language,
        cells = cells.len(),
        "loaded notebook"
    );
    editor
        .set_cells(cells)
        .with_context(|| format!("Failed to build documents for {}", path.display()))?;
    Ok(editor)
}
