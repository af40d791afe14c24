use super::{check_text_position, VirtualEditor};
use crate::{
    document::VirtualDocument,
    error::{ClosedSnafu, Result, WidgetNotFoundSnafu},
    extractors::ExtractorsRegistry,
    overrides::OverridesRegistry,
    position::{EditorPosition, RootPosition, SourcePosition, VirtualPosition, WidgetId},
};
use std::sync::Arc;

/// A single widget showing the whole host document.
///
/// Editor space and root space coincide, so every editor position maps to the root position
/// with the same coordinates and the only editor index is `0`.
#[derive(Debug)]
pub struct FileEditor {
    document: VirtualDocument,
    widget: WidgetId,
    text: String,
}

impl FileEditor {
    pub fn new(
        widget: WidgetId,
        language: impl Into<String>,
        path: impl Into<String>,
        overrides: Arc<OverridesRegistry>,
        extractors: Arc<ExtractorsRegistry>,
    ) -> Self {
        Self {
            document: VirtualDocument::new_root(language, path, overrides, extractors),
            widget,
            text: String::new(),
        }
    }

    pub fn with_document(widget: WidgetId, document: VirtualDocument) -> Self {
        Self {
            document,
            widget,
            text: String::new(),
        }
    }

    pub fn widget(&self) -> WidgetId {
        self.widget
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the content and rebuild the tree. Returns the uris of closed children.
    pub fn set_text(&mut self, text: impl Into<String>) -> Result<Vec<String>> {
        if self.document.is_closed() {
            return ClosedSnafu {
                uri: self.document.uri(),
            }
            .fail();
        }
        self.text = text.into();
        self.document.rebuild([(self.widget, self.text.as_str())])
    }

    pub fn close(&mut self) {
        self.document.close();
    }
}

impl VirtualEditor for FileEditor {
    fn virtual_document(&self) -> &VirtualDocument {
        &self.document
    }

    fn editor_index(&self, position: VirtualPosition) -> Result<usize> {
        self.document.widget_at_virtual_line(position)?;
        Ok(0)
    }

    fn virtual_to_source(&self, position: VirtualPosition) -> Result<SourcePosition> {
        self.document.transform_virtual_to_source(position)
    }

    fn editor_to_root(&self, widget: WidgetId, position: EditorPosition) -> Result<RootPosition> {
        if widget != self.widget || self.document.is_closed() {
            return WidgetNotFoundSnafu { widget }.fail();
        }
        check_text_position(&self.text, position)?;
        Ok(RootPosition::new(position.line, position.column))
    }

    fn widget_at(&self, position: RootPosition) -> Result<WidgetId> {
        if self.document.is_within_foreign(position)? {
            return self.document.get_editor_at_source_line(position);
        }
        Ok(self.widget)
    }
}
