//! Minimal `.ipynb` reader: just enough to turn code cells into widgets.

use anyhow::{Context, Result};
use cellmap::{Cell, WidgetId};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Notebook {
    pub cells: Vec<RawCell>,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
pub struct RawCell {
    pub cell_type: String,
    #[serde(default)]
    source: Source,
}

/// Cell source, stored either as one string or as a list of lines.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Source {
    Text(String),
    Lines(Vec<String>),
}

impl Default for Source {
    fn default() -> Self {
        Source::Text(String::new())
    }
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    kernelspec: Option<KernelSpec>,
    #[serde(default)]
    language_info: Option<LanguageInfo>,
}

#[derive(Debug, Deserialize)]
struct KernelSpec {
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LanguageInfo {
    name: String,
}

impl RawCell {
    pub fn text(&self) -> String {
        match &self.source {
            Source::Text(text) => text.clone(),
            Source::Lines(lines) => lines.concat(),
        }
    }

    pub fn is_code(&self) -> bool {
        self.cell_type == "code"
    }
}

impl Notebook {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read notebook: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse notebook: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Kernel language declared in the notebook metadata, if any.
    pub fn language(&self) -> Option<&str> {
        self.metadata
            .language_info
            .as_ref()
            .map(|info| info.name.as_str())
            .or_else(|| {
                self.metadata
                    .kernelspec
                    .as_ref()
                    .and_then(|spec| spec.language.as_deref())
            })
    }

    /// Code cells in display order.
    ///
    /// The widget id of a cell is its index among all cells, so markdown cells leave gaps.
    pub fn code_cells(&self) -> Vec<Cell> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_code())
            .map(|(ix, cell)| Cell::new(WidgetId(ix as u64), cell.text()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_string_and_list_sources() {
        let notebook = Notebook::parse(
            r##"{
                "cells": [
                    {"cell_type": "code", "source": ["import os\n", "os.getcwd()"]},
                    {"cell_type": "markdown", "source": "# Notes"},
                    {"cell_type": "code", "source": "%%R\nx <- 1"}
                ],
                "metadata": {"kernelspec": {"language": "python", "name": "python3"}}
            }"##,
        )
        .unwrap();

        let cells = notebook.code_cells();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].text, "import os\nos.getcwd()");
        assert_eq!(cells[1].widget, WidgetId(2));
        assert_eq!(notebook.language(), Some("python"));
    }

    #[test]
    fn language_info_wins_over_kernelspec() {
        let notebook = Notebook::parse(
            r#"{
                "cells": [],
                "metadata": {
                    "kernelspec": {"language": "python"},
                    "language_info": {"name": "R"}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(notebook.language(), Some("R"));
    }

    #[test]
    fn missing_cells_is_an_error() {
        assert!(Notebook::parse("{}").is_err());
    }
}
