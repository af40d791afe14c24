use super::{check_text_position, VirtualEditor};
use crate::{
    document::VirtualDocument,
    error::{ClosedSnafu, Result, WidgetNotFoundSnafu, WidgetOutOfSyncSnafu},
    extractors::ExtractorsRegistry,
    overrides::OverridesRegistry,
    position::{EditorPosition, RootPosition, SourcePosition, VirtualPosition, WidgetId},
};
use std::{borrow::Cow, sync::Arc};
use tracing::trace;

/// Widget owned by the host application.
pub trait HostWidget {
    fn id(&self) -> WidgetId;

    /// Current content.
    fn text(&self) -> Cow<'_, str>;

    /// Counter the host bumps on every content change.
    fn revision(&self) -> u64;
}

/// Editor over a single widget owned by the host.
///
/// The widget may change behind the proxy's back. Until [`ProxyEditor::sync`] is called again
/// every lookup fails with [`Error::WidgetOutOfSync`](crate::Error::WidgetOutOfSync) instead of
/// answering from a document built for older content.
#[derive(Debug)]
pub struct ProxyEditor<W> {
    widget: W,
    document: VirtualDocument,
    synced: Option<u64>,
}

impl<W: HostWidget> ProxyEditor<W> {
    /// Wrap `widget` and build its document right away.
    pub fn new(
        widget: W,
        language: impl Into<String>,
        path: impl Into<String>,
        overrides: Arc<OverridesRegistry>,
        extractors: Arc<ExtractorsRegistry>,
    ) -> Result<Self> {
        Self::with_document(
            widget,
            VirtualDocument::new_root(language, path, overrides, extractors),
        )
    }

    pub fn with_document(widget: W, document: VirtualDocument) -> Result<Self> {
        let mut proxy = Self {
            widget,
            document,
            synced: None,
        };
        proxy.sync()?;
        Ok(proxy)
    }

    pub fn widget(&self) -> &W {
        &self.widget
    }

    /// Mutable access to the widget; lookups fail until the next [`Self::sync`] if its
    /// revision changes.
    pub fn widget_mut(&mut self) -> &mut W {
        &mut self.widget
    }

    pub fn is_synced(&self) -> bool {
        self.synced == Some(self.widget.revision())
    }

    /// Rebuild from the widget's current content if it changed since the last sync.
    ///
    /// Returns the uris of foreign documents closed by the rebuild.
    pub fn sync(&mut self) -> Result<Vec<String>> {
        if self.document.is_closed() {
            return ClosedSnafu {
                uri: self.document.uri(),
            }
            .fail();
        }
        let revision = self.widget.revision();
        if self.synced == Some(revision) {
            return Ok(Vec::new());
        }
        let text = self.widget.text();
        let expired = self.document.rebuild([(self.widget.id(), text.as_ref())])?;
        trace!(widget = %self.widget.id(), revision, "synced proxy editor");
        self.synced = Some(revision);
        Ok(expired)
    }

    /// Tear down the document once the host closes it. The widget stays with the proxy, but
    /// every later lookup is not-found and [`Self::sync`] fails.
    pub fn close(&mut self) {
        self.document.close();
    }
}

impl<W: HostWidget> VirtualEditor for ProxyEditor<W> {
    fn virtual_document(&self) -> &VirtualDocument {
        &self.document
    }

    fn current_document(&self) -> Result<&VirtualDocument> {
        let current = self.widget.revision();
        match self.synced {
            Some(synced) if synced == current => Ok(&self.document),
            synced => WidgetOutOfSyncSnafu {
                widget: self.widget.id(),
                synced: synced.unwrap_or_default(),
                current,
            }
            .fail(),
        }
    }

    fn editor_index(&self, position: VirtualPosition) -> Result<usize> {
        self.current_document()?.widget_at_virtual_line(position)?;
        Ok(0)
    }

    fn virtual_to_source(&self, position: VirtualPosition) -> Result<SourcePosition> {
        self.current_document()?.transform_virtual_to_source(position)
    }

    fn editor_to_root(&self, widget: WidgetId, position: EditorPosition) -> Result<RootPosition> {
        let document = self.current_document()?;
        if widget != self.widget.id() || document.is_closed() {
            return WidgetNotFoundSnafu { widget }.fail();
        }
        check_text_position(&self.widget.text(), position)?;
        Ok(RootPosition::new(position.line, position.column))
    }

    fn widget_at(&self, position: RootPosition) -> Result<WidgetId> {
        let document = self.current_document()?;
        if document.is_within_foreign(position)? {
            return document.get_editor_at_source_line(position);
        }
        Ok(self.widget.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Error, extractors::ForeignCodeExtractor};

    struct TextArea {
        text: String,
        revision: u64,
    }

    impl TextArea {
        fn new(text: &str) -> Self {
            Self {
                text: text.to_string(),
                revision: 1,
            }
        }

        fn type_text(&mut self, text: &str) {
            self.text.push_str(text);
            self.revision += 1;
        }
    }

    impl HostWidget for TextArea {
        fn id(&self) -> WidgetId {
            WidgetId(3)
        }

        fn text(&self) -> Cow<'_, str> {
            Cow::Borrowed(&self.text)
        }

        fn revision(&self) -> u64 {
            self.revision
        }
    }

    fn proxy(text: &str) -> ProxyEditor<TextArea> {
        let mut extractors = ExtractorsRegistry::new();
        extractors.register(
            "markdown",
            ForeignCodeExtractor::new("python", r"(?s)```python\n(.*?)\n```", 1).unwrap(),
        );
        ProxyEditor::new(
            TextArea::new(text),
            "markdown",
            "README.md",
            Arc::new(OverridesRegistry::new()),
            Arc::new(extractors),
        )
        .unwrap()
    }

    #[test]
    fn resolves_fenced_code() {
        let proxy = proxy("# Title\n```python\nx = 1\n```\ndone");
        let (document, position) = proxy
            .resolve_document_and_virtual_position(RootPosition::new(2, 4))
            .unwrap();

        assert_eq!(document.language(), "python");
        assert_eq!(document.uri(), "README.md.markdown-python.python");
        assert_eq!(position, VirtualPosition::new(0, 4));
        assert_eq!(proxy.widget_at(RootPosition::new(2, 4)).unwrap(), WidgetId(3));
        assert_eq!(
            proxy.virtual_to_root(document, position).unwrap(),
            RootPosition::new(2, 4)
        );
    }

    #[test]
    fn unsynced_edits_block_lookups() {
        let mut proxy = proxy("hello");
        proxy.widget_mut().type_text(" world");

        assert!(!proxy.is_synced());
        let err = proxy.root_to_editor(RootPosition::new(0, 8)).unwrap_err();
        assert!(matches!(
            err,
            Error::WidgetOutOfSync {
                synced: 1,
                current: 2,
                ..
            }
        ));
        assert!(proxy
            .editor_to_root(WidgetId(3), EditorPosition::zero())
            .is_err());

        proxy.sync().unwrap();
        assert_eq!(
            proxy.root_to_editor(RootPosition::new(0, 8)).unwrap(),
            EditorPosition::new(0, 8)
        );
    }

    #[test]
    fn sync_without_changes_is_a_no_op() {
        let mut proxy = proxy("x");
        let generation = proxy.virtual_document().generation();

        assert!(proxy.sync().unwrap().is_empty());
        assert_eq!(proxy.virtual_document().generation(), generation);
    }

    #[test]
    fn closed_proxy_resolves_nothing() {
        let mut proxy = proxy("# Title\n```python\nx = 1\n```");
        proxy.close();

        assert!(proxy.virtual_document().is_closed());
        assert!(proxy
            .root_to_editor(RootPosition::new(2, 1))
            .unwrap_err()
            .is_not_found());
        assert!(proxy
            .widget_at(RootPosition::new(2, 1))
            .unwrap_err()
            .is_not_found());
        assert!(proxy
            .editor_to_root(WidgetId(3), EditorPosition::zero())
            .unwrap_err()
            .is_not_found());

        proxy.widget_mut().type_text("\nmore");
        assert!(matches!(proxy.sync().unwrap_err(), Error::Closed { .. }));
    }

    #[test]
    fn stamps_survive_until_the_next_sync() {
        let mut proxy = proxy("abc");
        let stamped = proxy.stamp(EditorPosition::new(0, 1));
        assert!(proxy.unstamp(stamped).is_ok());

        proxy.widget_mut().type_text("d");
        assert!(matches!(
            proxy.unstamp(stamped).unwrap_err(),
            Error::WidgetOutOfSync { .. }
        ));
        proxy.sync().unwrap();
        assert!(matches!(
            proxy.unstamp(stamped).unwrap_err(),
            Error::StaleGeneration { .. }
        ));
    }
}
