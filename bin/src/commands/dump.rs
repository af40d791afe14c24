use anyhow::Result;
use cellmap::{Config, VirtualEditor};
use std::{io::Write, path::Path};

/// Print every virtual document of a notebook, root first.
pub fn run(config: &Config, path: &Path, out: &mut impl Write) -> Result<()> {
    let editor = super::open(config, path)?;
    for document in editor.virtual_document().documents() {
        writeln!(
            out,
            "=== {} ({}, {} lines)",
            document.uri(),
            document.language(),
            document.line_count()
        )?;
        writeln!(out, "{}", document.text())?;
    }
    Ok(())
}
