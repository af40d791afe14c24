//! The adapter between physical editing widgets and the virtual document tree.
//!
//! A [`VirtualEditor`] presents one logical editing surface backed by one or many widgets.
//! Implementations only know widget geometry (which widget renders which root lines); every
//! question about region boundaries is forwarded to the root [`VirtualDocument`], the single
//! owner of the current mapping generation.
//!
//! Variants:
//!
//! - [`FileEditor`]: one widget is the whole document, editor space equals root space.
//! - [`NotebookEditor`]: cells concatenated in display order.
//! - [`ProxyEditor`]: forwards to a widget owned by the host and refuses to answer while the
//!   widget has edits that were not synced yet.
//!
//! # Re-resolve, don't cache
//!
//! Lookups borrow the editor, so a [`VirtualDocument`] reference or a [`Resolution`] cannot
//! outlive the next edit. Plain positions are `Copy` and can; carry them across an edit with
//! [`VirtualEditor::stamp`] and [`VirtualEditor::unstamp`], which detect the generation change.

mod file;
mod notebook;
mod proxy;

pub use file::FileEditor;
pub use notebook::{Cell, NotebookEditor};
pub use proxy::{HostWidget, ProxyEditor};

use crate::{
    document::{Resolution, VirtualDocument},
    error::{not_found, Result, StaleGenerationSnafu},
    position::{
        EditorPosition, RootPosition, SourcePosition, Stamped, VirtualPosition, WidgetId,
    },
};

/// Coordinate transformation over one host document.
///
/// The four required methods depend on how the host lays out its widgets; everything else is
/// provided on top of them and the tree's own lookups.
pub trait VirtualEditor {
    /// Root document owned by this editor.
    fn virtual_document(&self) -> &VirtualDocument;

    /// Root document, if it is safe to query right now.
    ///
    /// Every provided operation goes through this, so implementations that can detect
    /// out-of-date content refuse here.
    fn current_document(&self) -> Result<&VirtualDocument> {
        Ok(self.virtual_document())
    }

    /// Index of the widget containing a position of the root virtual document.
    ///
    /// Deterministic for a given generation. Separator lines and positions past the content
    /// are errors.
    fn editor_index(&self, position: VirtualPosition) -> Result<usize>;

    /// Undo overrides and extraction for a position of the root virtual document.
    ///
    /// Positions inside a rewrite with no one-to-one correspondence resolve to the start of
    /// the rewritten source span.
    fn virtual_to_source(&self, position: VirtualPosition) -> Result<SourcePosition>;

    /// Root position of a position inside `widget`.
    fn editor_to_root(&self, widget: WidgetId, position: EditorPosition) -> Result<RootPosition>;

    /// Widget currently rendering a root position.
    fn widget_at(&self, position: RootPosition) -> Result<WidgetId>;

    /// Deepest document owning a root position, with the position inside it.
    fn resolve_document_and_virtual_position(
        &self,
        position: RootPosition,
    ) -> Result<(&VirtualDocument, VirtualPosition)> {
        let root = self.current_document()?;
        Ok((
            root.document_at_source_position(position)?,
            root.virtual_position_at_document(position)?,
        ))
    }

    /// Everything the tree knows about a root position, from a single walk.
    fn resolve(&self, position: RootPosition) -> Result<Resolution<'_>> {
        self.current_document()?.resolve_source_position(position)
    }

    /// Widget owning a root position, according to the tree.
    fn resolve_widget_for_root(&self, position: RootPosition) -> Result<WidgetId> {
        self.current_document()?.get_editor_at_source_line(position)
    }

    fn root_to_editor(&self, position: RootPosition) -> Result<EditorPosition> {
        self.current_document()?.transform_source_to_editor(position)
    }

    /// Root position of a position in any document of this editor's tree.
    fn virtual_to_root(
        &self,
        document: &VirtualDocument,
        position: VirtualPosition,
    ) -> Result<RootPosition> {
        self.current_document()?;
        let (widget, editor_position) = document.transform_virtual_to_editor(position)?;
        self.editor_to_root(widget, editor_position)
    }

    /// Remember a position together with the current generation.
    fn stamp<P>(&self, position: P) -> Stamped<P>
    where
        Self: Sized,
    {
        Stamped {
            generation: self.virtual_document().generation(),
            position,
        }
    }

    /// Recover a stamped position, failing if the content changed since it was stamped.
    fn unstamp<P>(&self, stamped: Stamped<P>) -> Result<P>
    where
        Self: Sized,
    {
        let actual = self.current_document()?.generation();
        if stamped.generation != actual {
            return StaleGenerationSnafu {
                expected: stamped.generation,
                actual,
            }
            .fail();
        }
        Ok(stamped.position)
    }
}

/// Width in chars of line `line` of `text`, if it exists.
fn line_width(text: &str, line: u32) -> Option<u32> {
    text.split('\n')
        .nth(line as usize)
        .map(|line| line.chars().count() as u32)
}

/// Check that `position` addresses a character boundary of `text`.
fn check_text_position(text: &str, position: EditorPosition) -> Result<()> {
    match line_width(text, position.line) {
        Some(width) if position.column <= width => Ok(()),
        _ => Err(not_found(position)),
    }
}
