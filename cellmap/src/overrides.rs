//! Syntax overrides: line-local rewrites applied before text enters a virtual document.
//!
//! An override turns host-specific syntax the language server cannot parse (IPython magics,
//! shell escapes) into equivalent valid code, e.g. `%time f()` into
//! `get_ipython().run_line_magic("time", "f()")`. Each applied rewrite is recorded as a
//! [`ColumnMap`] so positions inside the rewritten text can be mapped back to the source.
//!
//! Rules never add or remove lines. [`Scope::Cell`] rules only look at the first line of a
//! block, which is where cell magics live.

use crate::{
    column_map::{char_column, ColumnMap, Splice},
    error::{InvalidPatternSnafu, Result},
};
use regex::{Captures, Regex};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use snafu::ResultExt;

/// Which lines of a block a rule applies to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Every line.
    #[default]
    Line,
    /// Only the first line of each block.
    Cell,
}

/// How a rule declares the inverse of its rewriting.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MappingHint {
    /// Characters copied from capture groups map back to their source; template literals map
    /// to the start of the match. Same-length identity rewrites become linear.
    #[default]
    Captures,
    /// Every virtual column inside the rewrite maps back to the start of the match.
    SpanStart,
}

/// Rewrite that turns virtual text back into source text, e.g. for completions.
#[derive(Clone, Debug)]
pub struct ReverseRule {
    pattern: Regex,
    replacement: String,
}

/// A single substitution rule for one language.
#[derive(Clone, Debug)]
pub struct OverrideRule {
    pattern: Regex,
    replacement: String,
    scope: Scope,
    mapping: MappingHint,
    reverse: Option<ReverseRule>,
}

impl OverrideRule {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        Ok(Self {
            pattern: compile(pattern)?,
            replacement: replacement.into(),
            scope: Scope::default(),
            mapping: MappingHint::default(),
            reverse: None,
        })
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_mapping(mut self, mapping: MappingHint) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn with_reverse(mut self, pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        self.reverse = Some(ReverseRule {
            pattern: compile(pattern)?,
            replacement: replacement.into(),
        });
        Ok(self)
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn mapping(&self) -> MappingHint {
        self.mapping
    }

    /// Rewrite one line, returning the new text and the column map of this pass.
    ///
    /// Returns `None` when the rule does not apply to the line.
    pub fn apply(&self, line: &str, first_line: bool) -> Option<(String, ColumnMap)> {
        if self.scope == Scope::Cell && !first_line {
            return None;
        }

        let mut output = String::with_capacity(line.len());
        let mut splices = Vec::new();
        let mut last = 0;
        for captures in self.pattern.captures_iter(line) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            output.push_str(&line[last..whole.start()]);
            last = whole.end();

            let start = char_column(line, whole.start());
            let end = char_column(line, whole.end());
            let (text, table) = expand(line, &captures, &self.replacement, start);
            output.push_str(&text);

            let splice = match self.mapping {
                MappingHint::Captures => Splice::from_table(start..end, table),
                MappingHint::SpanStart => Splice::opaque(start..end, table.len() as u32),
            };
            splices.push(splice);
        }

        if splices.is_empty() {
            return None;
        }
        output.push_str(&line[last..]);
        Some((output, ColumnMap::new(splices)))
    }

    fn reverse_text(&self, text: &str) -> Option<String> {
        let reverse = self.reverse.as_ref()?;
        Some(
            reverse
                .pattern
                .replace_all(text, reverse.replacement.as_str())
                .into_owned(),
        )
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).context(InvalidPatternSnafu { pattern })
}

/// Expand a replacement template, tracking where every output character came from.
///
/// Supports `$N`, `${N}`, `$name`, `${name}` and `$$`. Characters copied from a group record
/// their source offset relative to `match_start` (a char column); literals record `0`.
fn expand(
    line: &str,
    captures: &Captures<'_>,
    template: &str,
    match_start: u32,
) -> (String, Vec<u32>) {
    fn literal(text: &mut String, table: &mut Vec<u32>, ch: char) {
        text.push(ch);
        table.push(0);
    }

    let mut text = String::new();
    let mut table = Vec::new();

    let mut rest = template;
    while let Some(dollar) = rest.find('$') {
        for ch in rest[..dollar].chars() {
            literal(&mut text, &mut table, ch);
        }
        rest = &rest[dollar + 1..];

        let (name, consumed) = if let Some(braced) = rest.strip_prefix('{') {
            match braced.find('}') {
                Some(close) => (&braced[..close], close + 2),
                None => {
                    literal(&mut text, &mut table, '$');
                    continue;
                }
            }
        } else if rest.starts_with('$') {
            literal(&mut text, &mut table, '$');
            rest = &rest[1..];
            continue;
        } else {
            let len = rest
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .unwrap_or(rest.len());
            (&rest[..len], len)
        };
        rest = &rest[consumed..];

        if name.is_empty() {
            literal(&mut text, &mut table, '$');
            continue;
        }
        let group = match name.parse::<usize>() {
            Ok(index) => captures.get(index),
            Err(_) => captures.name(name),
        };
        if let Some(group) = group {
            let group_start = char_column(line, group.start()) - match_start;
            for (ix, ch) in group.as_str().chars().enumerate() {
                text.push(ch);
                table.push(group_start + ix as u32);
            }
        }
    }
    for ch in rest.chars() {
        literal(&mut text, &mut table, ch);
    }

    (text, table)
}

/// Ordered override rules per language.
#[derive(Debug, Default)]
pub struct OverridesRegistry {
    languages: FxHashMap<String, Vec<OverrideRule>>,
}

impl OverridesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, language: impl Into<String>, rule: OverrideRule) {
        self.languages.entry(language.into()).or_default().push(rule);
    }

    pub fn rules_for(&self, language: &str) -> &[OverrideRule] {
        self.languages
            .get(language)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Look up a rule by its trigger pattern.
    pub fn rule(&self, language: &str, pattern: &str) -> Option<&OverrideRule> {
        self.rules_for(language)
            .iter()
            .find(|rule| rule.pattern() == pattern)
    }

    /// Apply every rule for `language` to one line, in registration order.
    ///
    /// Each rule sees the output of the previous one; the returned maps are in the same order.
    pub fn rewrite_line(
        &self,
        language: &str,
        line: &str,
        first_line: bool,
    ) -> (String, Vec<ColumnMap>) {
        let mut text = line.to_string();
        let mut maps = Vec::new();
        for rule in self.rules_for(language) {
            if let Some((rewritten, map)) = rule.apply(&text, first_line) {
                text = rewritten;
                maps.push(map);
            }
        }
        (text, maps)
    }

    /// Undo overrides in virtual text, restoring the syntax the user wrote.
    ///
    /// Reverse rules run in the opposite order of the forward rules.
    pub fn reverse(&self, language: &str, text: &str) -> String {
        self.rules_for(language)
            .iter()
            .rev()
            .fold(text.to_string(), |text, rule| {
                rule.reverse_text(&text).unwrap_or(text)
            })
    }
}
