//! Foreign code extraction: which spans of a block belong to another language.
//!
//! An extractor is a regex whose `capture` group holds the foreign code. The group's range in
//! the block becomes the foreign code's [`EditorRange`], so the extracted text maps back to the
//! block character for character. Unless `keep_in_host` is set, the whole match is then blanked
//! out of the host text (newlines survive, so host line numbers never move).
//!
//! ```text
//! block:     %%R -n        <- match starts
//!            x <- c(1, 2)  <- capture group (R code) ...
//!            mean(x)       <- ... ends
//! host:      ""            (blanked, 3 lines kept)
//! R:         x <- c(1, 2)
//!            mean(x)
//! ```

use crate::{
    column_map::{char_column, ColumnMap, Splice},
    error::{InvalidPatternSnafu, Result},
    position::{EditorPosition, EditorRange},
};
use regex::Regex;
use rustc_hash::FxHashMap;
use snafu::ResultExt;
use std::ops::Range;
use tracing::{debug, warn};

/// Rule extracting spans of one foreign language from a host language.
#[derive(Clone, Debug)]
pub struct ForeignCodeExtractor {
    language: String,
    pattern: Regex,
    capture: usize,
    keep_in_host: bool,
    standalone: bool,
    file_extension: Option<String>,
}

impl ForeignCodeExtractor {
    /// Extract the text of group `capture` of every match of `pattern` as `language` code.
    pub fn new(language: impl Into<String>, pattern: &str, capture: usize) -> Result<Self> {
        Ok(Self {
            language: language.into(),
            pattern: Regex::new(pattern).context(InvalidPatternSnafu { pattern })?,
            capture,
            keep_in_host: false,
            standalone: false,
            file_extension: None,
        })
    }

    /// Leave the matched text in the host document as well.
    pub fn keep_in_host(mut self, keep: bool) -> Self {
        self.keep_in_host = keep;
        self
    }

    /// Give every match its own foreign document instead of sharing one per language.
    pub fn standalone(mut self, standalone: bool) -> Self {
        self.standalone = standalone;
        self
    }

    pub fn file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = Some(extension.into());
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// One span of foreign code found in a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedCode {
    pub language: String,
    pub code: String,
    /// Block-local range of `code`; the end is the position right after its last character.
    pub range: EditorRange,
    pub standalone: bool,
    pub file_extension: Option<String>,
    /// Byte range of the whole match to blank out of the host, if not kept.
    removal: Option<Range<usize>>,
}

/// Ordered extractors per host language.
#[derive(Debug, Default)]
pub struct ExtractorsRegistry {
    languages: FxHashMap<String, Vec<ForeignCodeExtractor>>,
}

impl ExtractorsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, host_language: impl Into<String>, extractor: ForeignCodeExtractor) {
        self.languages
            .entry(host_language.into())
            .or_default()
            .push(extractor);
    }

    pub fn extractors_for(&self, host_language: &str) -> &[ForeignCodeExtractor] {
        self.languages
            .get(host_language)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Find every foreign span in `code`, ordered by position.
    ///
    /// When matches overlap, the one starting first wins (ties go to the extractor registered
    /// first) and the rest are skipped.
    pub fn extract(&self, host_language: &str, code: &str) -> Vec<ExtractedCode> {
        let mut candidates = Vec::new();
        for (order, extractor) in self.extractors_for(host_language).iter().enumerate() {
            for captures in extractor.pattern.captures_iter(code) {
                let Some(whole) = captures.get(0) else {
                    continue;
                };
                let Some(group) = captures.get(extractor.capture) else {
                    warn!(
                        pattern = extractor.pattern(),
                        capture = extractor.capture,
                        "extractor matched without its capture group"
                    );
                    continue;
                };
                candidates.push((whole.range(), group.range(), order, extractor));
            }
        }
        candidates.sort_by_key(|(whole, _, order, _)| (whole.start, *order));

        let mut extracted: Vec<ExtractedCode> = Vec::new();
        let mut claimed_until = 0;
        for (whole, group, _, extractor) in candidates {
            if !extracted.is_empty() && whole.start < claimed_until {
                debug!(
                    language = extractor.language(),
                    start = whole.start,
                    "skipping overlapping foreign span"
                );
                continue;
            }
            claimed_until = whole.end;
            extracted.push(ExtractedCode {
                language: extractor.language.clone(),
                code: code[group.clone()].to_string(),
                range: EditorRange::new(
                    position_at(code, group.start),
                    position_at(code, group.end),
                ),
                standalone: extractor.standalone,
                file_extension: extractor.file_extension.clone(),
                removal: (!extractor.keep_in_host).then_some(whole),
            });
        }
        extracted
    }
}

/// Block-local position of a byte offset.
fn position_at(code: &str, byte: usize) -> EditorPosition {
    let before = &code[..byte];
    let line = before.matches('\n').count() as u32;
    let line_start = before.rfind('\n').map(|ix| ix + 1).unwrap_or(0);
    EditorPosition::new(line, char_column(&code[line_start..], byte - line_start))
}

/// Blank every non-kept span out of `code`.
///
/// Returns the host text and one [`ColumnMap`] per line. Newlines inside removed spans are
/// kept so the host has exactly as many lines as `code`.
pub fn strip_host(code: &str, extracted: &[ExtractedCode]) -> (String, Vec<ColumnMap>) {
    let removals: Vec<&Range<usize>> = extracted
        .iter()
        .filter_map(|code| code.removal.as_ref())
        .collect();

    let mut host_lines = Vec::new();
    let mut maps = Vec::new();
    let mut line_start = 0;
    for line in code.split('\n') {
        let line_end = line_start + line.len();
        let mut text = String::with_capacity(line.len());
        let mut splices = Vec::new();
        let mut cursor = line_start;
        for removal in &removals {
            let start = removal.start.max(line_start);
            let end = removal.end.min(line_end);
            if start >= end {
                continue;
            }
            text.push_str(&code[cursor..start]);
            cursor = end;
            splices.push(Splice::removal(
                char_column(line, start - line_start)..char_column(line, end - line_start),
            ));
        }
        text.push_str(&code[cursor..line_end]);

        host_lines.push(text);
        maps.push(ColumnMap::new(splices));
        line_start = line_end + 1;
    }

    (host_lines.join("\n"), maps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_map::ColumnTransform;

    fn registry() -> ExtractorsRegistry {
        let mut registry = ExtractorsRegistry::new();
        registry.register(
            "python",
            ForeignCodeExtractor::new("r", r"(?s)^%%R[^\n]*\n(.*)", 1).unwrap(),
        );
        registry.register(
            "python",
            ForeignCodeExtractor::new("r", r"(?m)^%R (.*)$", 1)
                .unwrap()
                .keep_in_host(true),
        );
        registry
    }

    #[test]
    fn extracts_cell_magic_body() {
        let code = "%%R -n\nx <- 1\nmean(x)";
        let extracted = registry().extract("python", code);

        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].language, "r");
        assert_eq!(extracted[0].code, "x <- 1\nmean(x)");
        assert_eq!(
            extracted[0].range,
            EditorRange::new(EditorPosition::new(1, 0), EditorPosition::new(2, 7))
        );
    }

    #[test]
    fn strips_removed_spans_but_keeps_lines() {
        let code = "%%R -n\nx <- 1\nmean(x)";
        let extracted = registry().extract("python", code);
        let (host, maps) = strip_host(code, &extracted);

        assert_eq!(host, "\n\n");
        assert_eq!(maps.len(), 3);
        assert_eq!(maps[1].to_target(3), 0);
    }

    #[test]
    fn keeps_line_magic_in_host() {
        let code = "y = 2\n%R z <- y\nprint(y)";
        let extracted = registry().extract("python", code);
        let (host, maps) = strip_host(code, &extracted);

        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].code, "z <- y");
        assert_eq!(
            extracted[0].range,
            EditorRange::new(EditorPosition::new(1, 3), EditorPosition::new(1, 9))
        );
        assert_eq!(host, code);
        assert!(maps.iter().all(ColumnMap::is_identity));
    }

    #[test]
    fn partial_line_removal_shifts_following_columns() {
        let mut registry = ExtractorsRegistry::new();
        registry.register(
            "markdown",
            ForeignCodeExtractor::new("python", r"`py ([^`]*)`", 1).unwrap(),
        );
        let code = "see `py f(x)` here";
        let extracted = registry.extract("markdown", code);
        let (host, maps) = strip_host(code, &extracted);

        assert_eq!(host, "see  here");
        assert_eq!(maps[0].to_target(14), 5);
        assert_eq!(maps[0].to_source(5), 14);
    }

    #[test]
    fn overlapping_spans_keep_the_first() {
        let mut registry = registry();
        registry.register(
            "python",
            ForeignCodeExtractor::new("bash", r"(?s)^%%(.*)", 1).unwrap(),
        );
        let extracted = registry.extract("python", "%%R\nx");

        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].language, "r");
    }

    #[test]
    fn unknown_host_extracts_nothing() {
        assert!(registry().extract("julia", "%%R\nx").is_empty());
    }

    #[test]
    fn multibyte_columns_count_chars() {
        let mut registry = ExtractorsRegistry::new();
        registry.register(
            "python",
            ForeignCodeExtractor::new("sql", r"«(.*)»", 1).unwrap(),
        );
        let extracted = registry.extract("python", "é = «select 1»");

        assert_eq!(extracted[0].range.start, EditorPosition::new(0, 5));
        assert_eq!(extracted[0].range.end, EditorPosition::new(0, 13));
    }
}
