use anyhow::{Context, Result};
use cellmap::{
    Config, EditorPosition, RootPosition, SourcePosition, VirtualEditor, VirtualPosition,
};
use serde::Serialize;
use std::{io::Write, path::Path};

#[derive(Debug, Serialize)]
pub struct Resolved {
    pub uri: String,
    pub language: String,
    pub virtual_position: VirtualPosition,
    pub source_position: SourcePosition,
    /// Id of the owning widget, its cell index in the notebook file.
    pub widget_id: u64,
    /// Position of the owning widget among the code cells.
    pub widget_index: usize,
    pub editor_position: EditorPosition,
}

/// Resolve one root position of a notebook.
pub fn resolve(config: &Config, path: &Path, position: RootPosition) -> Result<Resolved> {
    let editor = super::open(config, path)?;
    let resolution = editor
        .resolve(position)
        .with_context(|| format!("Cannot resolve {position} in {}", path.display()))?;
    let source_position = resolution
        .document
        .transform_virtual_to_source(resolution.virtual_position)?;
    let widget_index = editor
        .cells()
        .iter()
        .position(|cell| cell.widget == resolution.widget)
        .with_context(|| format!("{} has no cell in {}", resolution.widget, path.display()))?;

    Ok(Resolved {
        uri: resolution.document.uri(),
        language: resolution.document.language().to_string(),
        virtual_position: resolution.virtual_position,
        source_position,
        widget_id: resolution.widget.0,
        widget_index,
        editor_position: resolution.editor_position,
    })
}

pub fn run(
    config: &Config,
    path: &Path,
    position: RootPosition,
    out: &mut impl Write,
) -> Result<()> {
    let resolved = resolve(config, path, position)?;
    serde_json::to_writer_pretty(&mut *out, &resolved)?;
    writeln!(out)?;
    Ok(())
}
