//! Configuration for building virtual documents, loaded from `config.toml`.
//!
//! [`Config::load_with_overrides`] picks the file: CLI override > discovered path > the
//! embedded default, which covers IPython notebooks. [`Config::registries`] compiles the
//! per-language rule tables into the registries a [`VirtualDocument`] is built with.
//!
//! ```toml
//! blank_lines_between_cells = 2
//! language = "python"
//!
//! [[languages.python.extractors]]
//! language = "r"
//! pattern = '(?s)^%%R[^\n]*\n(.*)'
//!
//! [[languages.python.overrides]]
//! pattern = '^(\s*)!(.*)$'
//! replacement = '${1}get_ipython().system("$2")'
//! ```

use crate::{
    document::{VirtualDocument, DEFAULT_BLANK_LINES_BETWEEN_BLOCKS},
    editor::NotebookEditor,
    extractors::{ExtractorsRegistry, ForeignCodeExtractor},
    overrides::{MappingHint, OverrideRule, OverridesRegistry, Scope},
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{collections::BTreeMap, path::Path, sync::Arc};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Blank lines inserted between consecutive cells in every virtual document.
    pub blank_lines_between_cells: u32,

    /// Language of the host document's own code.
    pub language: String,

    /// Rules keyed by the language they apply to.
    pub languages: BTreeMap<String, LanguageConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            blank_lines_between_cells: DEFAULT_BLANK_LINES_BETWEEN_BLOCKS,
            language: "python".to_string(),
            languages: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LanguageConfig {
    /// Applied in order to every line of this language's documents.
    pub overrides: Vec<OverrideConfig>,
    /// Spans of other languages embedded in this one.
    pub extractors: Vec<ExtractorConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverrideConfig {
    pub pattern: String,
    pub replacement: String,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub mapping: MappingHint,
    #[serde(default)]
    pub reverse: Option<ReverseConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReverseConfig {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractorConfig {
    /// Language of the extracted code.
    pub language: String,
    pub pattern: String,
    /// Capture group holding the foreign code.
    #[serde(default = "default_capture")]
    pub capture: usize,
    #[serde(default)]
    pub keep_in_host: bool,
    #[serde(default)]
    pub standalone: bool,
    #[serde(default)]
    pub file_extension: Option<String>,
}

fn default_capture() -> usize {
    1
}

impl OverrideConfig {
    fn compile(&self) -> crate::Result<OverrideRule> {
        let rule = OverrideRule::new(&self.pattern, self.replacement.as_str())?
            .with_scope(self.scope)
            .with_mapping(self.mapping);
        match &self.reverse {
            Some(reverse) => rule.with_reverse(&reverse.pattern, reverse.replacement.as_str()),
            None => Ok(rule),
        }
    }
}

impl ExtractorConfig {
    fn compile(&self) -> crate::Result<ForeignCodeExtractor> {
        let extractor =
            ForeignCodeExtractor::new(self.language.as_str(), &self.pattern, self.capture)?
                .keep_in_host(self.keep_in_host)
                .standalone(self.standalone);
        Ok(match &self.file_extension {
            Some(extension) => extractor.file_extension(extension.as_str()),
            None => extractor,
        })
    }
}

impl Config {
    /// Read and deserialize a TOML config file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration with priority: CLI override > discovered path > embedded default.
    pub fn load_with_overrides(
        cli_override: Option<&Path>,
        discovered_path: Option<&Path>,
    ) -> Result<Self> {
        if let Some(path) = cli_override {
            return Self::load(path);
        }
        if let Some(path) = discovered_path {
            return Self::load(path);
        }
        Self::load_embedded()
    }

    pub fn load_embedded() -> Result<Self> {
        let source = include_str!("../../config.toml");
        toml::from_str(source).context("Failed to parse embedded config.toml")
    }

    /// Compile every rule table into registries.
    pub fn registries(&self) -> crate::Result<(Arc<OverridesRegistry>, Arc<ExtractorsRegistry>)> {
        let mut overrides = OverridesRegistry::new();
        let mut extractors = ExtractorsRegistry::new();
        for (language, rules) in &self.languages {
            for rule in &rules.overrides {
                overrides.register(language.as_str(), rule.compile()?);
            }
            for extractor in &rules.extractors {
                extractors.register(language.as_str(), extractor.compile()?);
            }
        }
        Ok((Arc::new(overrides), Arc::new(extractors)))
    }

    /// Empty root document for a host file at `path`.
    pub fn root_document(&self, path: impl Into<String>) -> crate::Result<VirtualDocument> {
        let (overrides, extractors) = self.registries()?;
        Ok(
            VirtualDocument::new_root(self.language.as_str(), path, overrides, extractors)
                .with_blank_lines_between_blocks(self.blank_lines_between_cells),
        )
    }

    /// Empty notebook editor for a host file at `path`.
    pub fn notebook_editor(&self, path: impl Into<String>) -> crate::Result<NotebookEditor> {
        Ok(NotebookEditor::with_document(self.root_document(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{editor::Cell, position::WidgetId, RootPosition, VirtualEditor};
    use tempfile::tempdir;

    #[test]
    fn loads_empty_config() {
        let tmp_dir = tempdir().unwrap();
        let config_path = tmp_dir.path().join("config.toml");
        std::fs::write(&config_path, "").unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.blank_lines_between_cells, 2);
        assert_eq!(config.language, "python");
        assert!(config.languages.is_empty());
    }

    #[test]
    fn errors_on_invalid_toml() {
        let tmp_dir = tempdir().unwrap();
        let config_path = tmp_dir.path().join("config.toml");
        std::fs::write(&config_path, "invalid toml {{{{").unwrap();

        let result = Config::load(&config_path);
        assert!(result.unwrap_err().to_string().contains("Failed to parse"));
    }

    #[test]
    fn errors_on_nonexistent_file() {
        let tmp_dir = tempdir().unwrap();
        let config_path = tmp_dir.path().join("nonexistent.toml");

        let result = Config::load(&config_path);
        assert!(result.unwrap_err().to_string().contains("Failed to read"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let tmp_dir = tempdir().unwrap();
        let config_path = tmp_dir.path().join("config.toml");
        std::fs::write(&config_path, "blank_lines = 3").unwrap();

        assert!(Config::load(&config_path).is_err());
    }

    #[test]
    fn cli_override_takes_priority() {
        let tmp_dir = tempdir().unwrap();
        let cli_path = tmp_dir.path().join("cli.toml");
        let discovered_path = tmp_dir.path().join("discovered.toml");
        std::fs::write(&cli_path, "blank_lines_between_cells = 1").unwrap();
        std::fs::write(&discovered_path, "blank_lines_between_cells = 5").unwrap();

        let config = Config::load_with_overrides(Some(&cli_path), Some(&discovered_path)).unwrap();
        assert_eq!(config.blank_lines_between_cells, 1);

        let config = Config::load_with_overrides(None, Some(&discovered_path)).unwrap();
        assert_eq!(config.blank_lines_between_cells, 5);
    }

    #[test]
    fn embedded_default_is_used_when_no_paths() {
        let config = Config::load_with_overrides(None, None).unwrap();
        let python = &config.languages["python"];

        assert_eq!(config.language, "python");
        assert!(python.extractors.iter().any(|e| e.language == "r"));
        assert!(python.overrides.iter().all(|o| o.reverse.is_some()));
    }

    #[test]
    fn loads_rule_tables() {
        let tmp_dir = tempdir().unwrap();
        let config_path = tmp_dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
language = "markdown"

[[languages.markdown.extractors]]
language = "python"
pattern = '(?s)```python\n(.*?)\n```'
standalone = true
file_extension = "py"

[[languages.python.overrides]]
pattern = '%%foo'
replacement = 'foo_line_magic(...)'
scope = "cell"
mapping = "span-start"
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        let extractor = &config.languages["markdown"].extractors[0];
        assert_eq!(extractor.capture, 1);
        assert!(extractor.standalone);
        assert!(!extractor.keep_in_host);

        let rule = &config.languages["python"].overrides[0];
        assert_eq!(rule.scope, Scope::Cell);
        assert_eq!(rule.mapping, MappingHint::SpanStart);

        let (overrides, extractors) = config.registries().unwrap();
        assert_eq!(overrides.rules_for("python").len(), 1);
        assert_eq!(extractors.extractors_for("markdown").len(), 1);
    }

    #[test]
    fn invalid_rule_pattern_fails_registries() {
        let tmp_dir = tempdir().unwrap();
        let config_path = tmp_dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[[languages.python.overrides]]
pattern = '(unclosed'
replacement = ''
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        let err = config.registries().unwrap_err();
        assert!(matches!(err, crate::Error::InvalidPattern { .. }));
    }

    #[test]
    fn embedded_default_handles_ipython_magics() {
        let config = Config::load_embedded().unwrap();
        let mut notebook = config.notebook_editor("demo.ipynb").unwrap();
        notebook
            .set_cells([
                Cell::new(WidgetId(1), "%time x = 1\n!ls"),
                Cell::new(WidgetId(2), "%%R\nsummary(df)"),
                Cell::new(WidgetId(3), "%%time\ny = 2"),
            ])
            .unwrap();
        let root = notebook.virtual_document();

        assert_eq!(
            root.text(),
            [
                r#"get_ipython().run_line_magic("time", "x = 1")"#,
                r#"get_ipython().system("ls")"#,
                "",
                "",
                "",
                "",
                "",
                "",
                "# %%time",
                "y = 2",
            ]
            .join("\n")
        );
        let restored = root.overrides().reverse("python", &root.text());
        assert_eq!(restored.lines().next(), Some("%time x = 1"));
        assert_eq!(restored.lines().nth(8), Some("%%time"));

        let (document, _) = notebook
            .resolve_document_and_virtual_position(RootPosition::new(3, 3))
            .unwrap();
        assert_eq!(document.uri(), "demo.ipynb.python-r.r");
        assert_eq!(document.text(), "summary(df)");
    }
}
