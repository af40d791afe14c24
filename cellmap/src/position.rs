//! Tagged coordinate spaces.
//!
//! Every position handled by this crate lives in exactly one of four spaces:
//!
//! ```text
//! RootPosition     host document, all cells concatenated in display order
//!   | VirtualDocument::resolve_source_position
//! VirtualPosition  per-language synthetic document handed to the language server
//!   | VirtualDocument::transform_virtual_to_source
//! SourcePosition   raw text of one document's blocks, before overrides and extraction
//!   | VirtualDocument::transform_virtual_to_editor
//! EditorPosition   local to one physical widget (one cell)
//! ```
//!
//! The types share a layout but are distinct, so the compiler rejects mixing them:
//!
//! ```compile_fail
//! use cellmap::{RootPosition, VirtualPosition};
//! let root = RootPosition::new(3, 1);
//! let virtual_position: VirtualPosition = root;
//! ```
//!
//! There are no `From` impls between the spaces. The only way across is one of
//! the transformation operations on [`VirtualDocument`](crate::VirtualDocument) or
//! [`VirtualEditor`](crate::VirtualEditor).

use serde::Serialize;
use std::fmt;

macro_rules! position_type {
    ($(#[$meta:meta])* $name:ident, $space:expr) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        pub struct $name {
            pub line: u32,
            pub column: u32,
        }

        impl $name {
            pub const fn new(line: u32, column: u32) -> Self {
                Self { line, column }
            }

            pub const fn zero() -> Self {
                Self { line: 0, column: 0 }
            }
        }

        impl Tagged for $name {
            const SPACE: Space = $space;

            fn line(&self) -> u32 {
                self.line
            }

            fn column(&self) -> u32 {
                self.column
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", self.line, self.column)
            }
        }
    };
}

position_type!(
    /// Position in the host's outermost document, e.g. a notebook line counted across all cells.
    RootPosition,
    Space::Root
);

position_type!(
    /// Position in a per-language virtual document, including injected separator lines.
    VirtualPosition,
    Space::Virtual
);

position_type!(
    /// Position local to one physical editing widget.
    EditorPosition,
    Space::Editor
);

position_type!(
    /// Position in the raw text of a document's blocks, before any rewriting.
    SourcePosition,
    Space::Source
);

/// Common view over the four position types, used where only the tag matters.
pub trait Tagged: Copy {
    const SPACE: Space;

    fn line(&self) -> u32;
    fn column(&self) -> u32;
}

/// Names of the four coordinate spaces, used in error reporting.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Space {
    Root,
    Virtual,
    Editor,
    Source,
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Space::Root => "root",
            Space::Virtual => "virtual",
            Space::Editor => "editor",
            Space::Source => "source",
        };
        f.write_str(name)
    }
}

/// Inclusive range of editor positions.
///
/// Both ends are inclusive: a cursor sitting right after the last character of an extracted
/// span is still inside it, so completion at the end of a foreign block goes to the foreign
/// document.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct EditorRange {
    pub start: EditorPosition,
    pub end: EditorPosition,
}

impl EditorRange {
    pub const fn new(start: EditorPosition, end: EditorPosition) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, position: EditorPosition) -> bool {
        self.start <= position && position <= self.end
    }

    /// Translate a position inside this range into coordinates relative to [`Self::start`].
    ///
    /// Only the first line is shifted horizontally; later lines start at column zero of the
    /// range just as they do in the enclosing text.
    pub fn relative(&self, position: EditorPosition) -> EditorPosition {
        let line = position.line - self.start.line;
        let column = if line == 0 {
            position.column - self.start.column
        } else {
            position.column
        };
        EditorPosition::new(line, column)
    }
}

/// Identity of one physical editing widget, e.g. one notebook cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct WidgetId(pub u64);

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "widget#{}", self.0)
    }
}

/// Content generation of a root virtual document.
///
/// Bumped every time the document's mappings are rebuilt. Positions computed against an older
/// generation are meaningless against a newer one.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// A position remembered together with the generation it was computed against.
///
/// Produced by [`VirtualEditor::stamp`](crate::VirtualEditor::stamp) and checked by
/// [`VirtualEditor::unstamp`](crate::VirtualEditor::unstamp), which refuses it once the
/// content has moved on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Stamped<P> {
    pub(crate) generation: Generation,
    pub(crate) position: P,
}

impl<P> Stamped<P> {
    pub fn generation(&self) -> Generation {
        self.generation
    }
}
