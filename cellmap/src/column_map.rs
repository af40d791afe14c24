//! Per-line column mapping between raw source text and rewritten virtual text.
//!
//! Every rewrite applied while assembling a virtual document keeps line counts intact and
//! is recorded as a list of [`Splice`]s on the line it touched. A [`ColumnMap`] holds the
//! splices of one rewrite pass; a [`LineMap`] stacks the passes applied to a line (foreign
//! code removal first, then each override that matched).
//!
//! ```text
//! source:  %time x = 1
//!          ^^^^^^^^^^^ one splice, source [0, 11), Table mapping
//! virtual: get_ipython().run_line_magic("time", "x = 1")
//!                                        ^^^^    ^^^^^ copied from captures
//! ```
//!
//! Columns outside every splice shift by the accumulated length difference of the splices
//! before them. Columns inside a splice follow the splice's [`SpliceMapping`].
//!
//! # Inverse tie-break
//!
//! When a splice expands source text into target text with no natural correspondence
//! ([`SpliceMapping::SpanStart`], or template literals inside a [`SpliceMapping::Table`]),
//! every target column inside it maps back to the start of the source span.

use smallvec::SmallVec;
use std::ops::Range;

/// Bidirectional column conversion for one line.
///
/// Implementations must satisfy `to_source(to_target(c)) == c` for every column `c` that lies
/// outside all rewritten spans or inside a span with a one-to-one correspondence.
pub trait ColumnTransform {
    /// Source column to target (virtual) column.
    fn to_target(&self, column: u32) -> u32;

    /// Target (virtual) column back to source column.
    fn to_source(&self, column: u32) -> u32;
}

/// How columns inside a rewritten span correspond to each other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpliceMapping {
    /// Source and target have equal length; offset `k` maps to offset `k`.
    Linear,
    /// One entry per target character: the source offset (relative to the span start) it was
    /// produced from.
    Table(Box<[u32]>),
    /// Every target offset maps back to the span start.
    SpanStart,
}

/// One rewritten span of a line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Splice {
    /// Source columns replaced by this splice.
    pub source: Range<u32>,
    /// Number of characters the span became.
    pub target_len: u32,
    pub mapping: SpliceMapping,
}

impl Splice {
    /// A span replaced by `target_len` characters, each mapped through `table`.
    ///
    /// Collapses to [`SpliceMapping::Linear`] when the table is the identity.
    pub fn from_table(source: Range<u32>, table: Vec<u32>) -> Self {
        let source_len = source.end - source.start;
        let identity = table.len() as u32 == source_len
            && table.iter().enumerate().all(|(ix, offset)| *offset == ix as u32);
        let target_len = table.len() as u32;
        let mapping = if identity {
            SpliceMapping::Linear
        } else {
            SpliceMapping::Table(table.into_boxed_slice())
        };
        Self {
            source,
            target_len,
            mapping,
        }
    }

    /// A span replaced by `target_len` characters with no per-character correspondence.
    pub fn opaque(source: Range<u32>, target_len: u32) -> Self {
        Self {
            source,
            target_len,
            mapping: SpliceMapping::SpanStart,
        }
    }

    /// A span removed from the line.
    pub fn removal(source: Range<u32>) -> Self {
        Self::opaque(source, 0)
    }

    fn source_len(&self) -> u32 {
        self.source.end - self.source.start
    }

    fn delta(&self) -> i64 {
        i64::from(self.target_len) - i64::from(self.source_len())
    }

    fn offset_to_target(&self, offset: u32) -> u32 {
        match &self.mapping {
            SpliceMapping::Linear => offset.min(self.target_len),
            SpliceMapping::Table(table) => table
                .iter()
                .position(|source| *source == offset)
                .map(|ix| ix as u32)
                .unwrap_or(0),
            SpliceMapping::SpanStart => 0,
        }
    }

    fn offset_to_source(&self, offset: u32) -> u32 {
        match &self.mapping {
            SpliceMapping::Linear => offset.min(self.source_len()),
            SpliceMapping::Table(table) => table.get(offset as usize).copied().unwrap_or(0),
            SpliceMapping::SpanStart => 0,
        }
    }
}

/// Character column of a byte offset within `text`.
pub(crate) fn char_column(text: &str, byte: usize) -> u32 {
    text[..byte].chars().count() as u32
}

fn shift(column: u32, delta: i64) -> u32 {
    (i64::from(column) + delta).max(0) as u32
}

/// Splices of a single rewrite pass over one line, sorted and non-overlapping in source
/// columns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnMap {
    splices: Vec<Splice>,
}

impl ColumnMap {
    pub fn identity() -> Self {
        Self::default()
    }

    /// Build a map from splices; they are sorted by source start.
    ///
    /// Splices must not overlap. Callers guarantee this by construction (regex matches never
    /// overlap and extraction skips overlapping spans).
    pub fn new(mut splices: Vec<Splice>) -> Self {
        splices.sort_by_key(|splice| splice.source.start);
        debug_assert!(splices
            .windows(2)
            .all(|pair| pair[0].source.end <= pair[1].source.start));
        Self { splices }
    }

    pub fn is_identity(&self) -> bool {
        self.splices.is_empty()
    }

    pub fn splices(&self) -> &[Splice] {
        &self.splices
    }
}

impl ColumnTransform for ColumnMap {
    fn to_target(&self, column: u32) -> u32 {
        let mut delta = 0i64;
        for splice in &self.splices {
            if column < splice.source.start {
                break;
            }
            if column < splice.source.end {
                let start = shift(splice.source.start, delta);
                return start + splice.offset_to_target(column - splice.source.start);
            }
            delta += splice.delta();
        }
        shift(column, delta)
    }

    fn to_source(&self, column: u32) -> u32 {
        let mut delta = 0i64;
        for splice in &self.splices {
            let target_start = shift(splice.source.start, delta);
            if column < target_start {
                break;
            }
            if column < target_start + splice.target_len {
                return splice.source.start + splice.offset_to_source(column - target_start);
            }
            delta += splice.delta();
        }
        shift(column, -delta)
    }
}

/// All rewrite passes applied to one line, in application order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineMap {
    stages: SmallVec<[ColumnMap; 2]>,
}

impl LineMap {
    pub fn identity() -> Self {
        Self::default()
    }

    /// Append a pass; identity passes are dropped.
    pub fn push(&mut self, stage: ColumnMap) {
        if !stage.is_identity() {
            self.stages.push(stage);
        }
    }

    pub fn is_identity(&self) -> bool {
        self.stages.is_empty()
    }
}

impl ColumnTransform for LineMap {
    fn to_target(&self, column: u32) -> u32 {
        self.stages
            .iter()
            .fold(column, |column, stage| stage.to_target(column))
    }

    fn to_source(&self, column: u32) -> u32 {
        self.stages
            .iter()
            .rev()
            .fold(column, |column, stage| stage.to_source(column))
    }
}
