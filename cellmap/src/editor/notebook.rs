use super::{check_text_position, VirtualEditor};
use crate::{
    document::VirtualDocument,
    error::{not_found, ClosedSnafu, DuplicateWidgetSnafu, Result, WidgetNotFoundSnafu},
    extractors::ExtractorsRegistry,
    overrides::OverridesRegistry,
    position::{EditorPosition, RootPosition, SourcePosition, VirtualPosition, WidgetId},
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::debug;

/// One code cell of a notebook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    pub widget: WidgetId,
    pub text: String,
}

impl Cell {
    pub fn new(widget: WidgetId, text: impl Into<String>) -> Self {
        Self {
            widget,
            text: text.into(),
        }
    }

    fn line_count(&self) -> u32 {
        self.text.split('\n').count() as u32
    }
}

/// Cells concatenated in display order, each one a widget.
///
/// Root line `n` belongs to the cell whose first root line is the greatest one not after `n`.
/// Every mutation rebuilds the virtual document, so lookups always see the current cell
/// layout.
#[derive(Debug)]
pub struct NotebookEditor {
    document: VirtualDocument,
    cells: Vec<Cell>,
    /// First root line of each cell.
    line_offsets: Vec<u32>,
    index: FxHashMap<WidgetId, usize>,
}

impl NotebookEditor {
    pub fn new(
        language: impl Into<String>,
        path: impl Into<String>,
        overrides: Arc<OverridesRegistry>,
        extractors: Arc<ExtractorsRegistry>,
    ) -> Self {
        Self::with_document(VirtualDocument::new_root(
            language, path, overrides, extractors,
        ))
    }

    /// Wrap an already configured, still empty root document.
    pub fn with_document(document: VirtualDocument) -> Self {
        Self {
            document,
            cells: Vec::new(),
            line_offsets: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, widget: WidgetId) -> Option<&Cell> {
        self.index.get(&widget).map(|ix| &self.cells[*ix])
    }

    /// Replace every cell. Returns the uris of foreign documents closed by the rebuild.
    ///
    /// Fails without changing anything if two cells share a widget.
    pub fn set_cells(&mut self, cells: impl IntoIterator<Item = Cell>) -> Result<Vec<String>> {
        self.ensure_open()?;
        let cells: Vec<Cell> = cells.into_iter().collect();
        let mut seen = FxHashSet::default();
        if let Some(cell) = cells.iter().find(|cell| !seen.insert(cell.widget)) {
            return DuplicateWidgetSnafu {
                widget: cell.widget,
            }
            .fail();
        }
        self.cells = cells;
        self.refresh()
    }

    /// Insert a cell before position `at`, or at the end if `at` is past the last cell.
    pub fn insert_cell(&mut self, at: usize, cell: Cell) -> Result<Vec<String>> {
        self.ensure_open()?;
        if self.index.contains_key(&cell.widget) {
            return DuplicateWidgetSnafu {
                widget: cell.widget,
            }
            .fail();
        }
        let at = at.min(self.cells.len());
        self.cells.insert(at, cell);
        self.refresh()
    }

    pub fn remove_cell(&mut self, widget: WidgetId) -> Result<Vec<String>> {
        let ix = self.cell_index(widget)?;
        self.cells.remove(ix);
        self.refresh()
    }

    pub fn edit_cell(&mut self, widget: WidgetId, text: impl Into<String>) -> Result<Vec<String>> {
        let ix = self.cell_index(widget)?;
        self.cells[ix].text = text.into();
        self.refresh()
    }

    /// Move a cell to position `to` in display order.
    pub fn move_cell(&mut self, widget: WidgetId, to: usize) -> Result<Vec<String>> {
        let ix = self.cell_index(widget)?;
        let cell = self.cells.remove(ix);
        self.cells.insert(to.min(self.cells.len()), cell);
        self.refresh()
    }

    pub fn close(&mut self) {
        self.cells.clear();
        self.line_offsets.clear();
        self.index.clear();
        self.document.close();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.document.is_closed() {
            return ClosedSnafu {
                uri: self.document.uri(),
            }
            .fail();
        }
        Ok(())
    }

    fn cell_index(&self, widget: WidgetId) -> Result<usize> {
        match self.index.get(&widget) {
            Some(ix) => Ok(*ix),
            None => WidgetNotFoundSnafu { widget }.fail(),
        }
    }

    fn refresh(&mut self) -> Result<Vec<String>> {
        self.line_offsets.clear();
        self.index.clear();
        let mut offset = 0;
        for (ix, cell) in self.cells.iter().enumerate() {
            self.line_offsets.push(offset);
            offset += cell.line_count();
            self.index.insert(cell.widget, ix);
        }
        debug!(cells = self.cells.len(), lines = offset, "laid out notebook cells");

        self.document.rebuild(
            self.cells
                .iter()
                .map(|cell| (cell.widget, cell.text.as_str())),
        )
    }

    /// Cell rendering a root line, with the line local to that cell.
    fn cell_at_root_line(&self, line: u32) -> Option<(usize, u32)> {
        let ix = self
            .line_offsets
            .partition_point(|offset| *offset <= line)
            .checked_sub(1)?;
        let local = line - self.line_offsets[ix];
        (local < self.cells[ix].line_count()).then_some((ix, local))
    }
}

impl VirtualEditor for NotebookEditor {
    fn virtual_document(&self) -> &VirtualDocument {
        &self.document
    }

    fn editor_index(&self, position: VirtualPosition) -> Result<usize> {
        let widget = self.document.widget_at_virtual_line(position)?;
        self.cell_index(widget)
    }

    fn virtual_to_source(&self, position: VirtualPosition) -> Result<SourcePosition> {
        self.document.transform_virtual_to_source(position)
    }

    fn editor_to_root(&self, widget: WidgetId, position: EditorPosition) -> Result<RootPosition> {
        let ix = self.cell_index(widget)?;
        check_text_position(&self.cells[ix].text, position)?;
        Ok(RootPosition::new(
            self.line_offsets[ix] + position.line,
            position.column,
        ))
    }

    fn widget_at(&self, position: RootPosition) -> Result<WidgetId> {
        if self.document.is_within_foreign(position)? {
            return self.document.get_editor_at_source_line(position);
        }
        let (ix, _) = self
            .cell_at_root_line(position.line)
            .ok_or_else(|| not_found(position))?;
        Ok(self.cells[ix].widget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Error, extractors::ForeignCodeExtractor, overrides::OverrideRule};

    const A: WidgetId = WidgetId(10);
    const B: WidgetId = WidgetId(20);
    const C: WidgetId = WidgetId(30);

    fn notebook() -> NotebookEditor {
        let mut overrides = OverridesRegistry::new();
        overrides.register(
            "python",
            OverrideRule::new(r"^%(\w+)(.*)$", r#"magic("$1", "$2")"#).unwrap(),
        );
        let mut extractors = ExtractorsRegistry::new();
        extractors.register(
            "python",
            ForeignCodeExtractor::new("r", r"(?s)^%%R[^\n]*\n(.*)", 1).unwrap(),
        );
        NotebookEditor::new(
            "python",
            "analysis.ipynb",
            Arc::new(overrides),
            Arc::new(extractors),
        )
    }

    fn three_cells() -> NotebookEditor {
        let mut notebook = notebook();
        notebook
            .set_cells([
                Cell::new(A, "import math\nx = 1"),
                Cell::new(B, "%%R\ny <- 2\nprint(y)"),
                Cell::new(C, "print(x)"),
            ])
            .unwrap();
        notebook
    }

    #[test]
    fn root_lines_map_into_cells() {
        let notebook = three_cells();

        assert_eq!(
            notebook.root_to_editor(RootPosition::new(1, 2)).unwrap(),
            EditorPosition::new(1, 2)
        );
        assert_eq!(
            notebook.root_to_editor(RootPosition::new(5, 3)).unwrap(),
            EditorPosition::new(0, 3)
        );
        assert_eq!(notebook.widget_at(RootPosition::new(5, 0)).unwrap(), C);
        assert_eq!(
            notebook.editor_to_root(C, EditorPosition::new(0, 3)).unwrap(),
            RootPosition::new(5, 3)
        );
    }

    #[test]
    fn foreign_cell_resolves_to_child_document() {
        let notebook = three_cells();

        let (document, position) = notebook
            .resolve_document_and_virtual_position(RootPosition::new(4, 2))
            .unwrap();
        assert_eq!(document.language(), "r");
        assert_eq!(position, VirtualPosition::new(1, 2));
        assert_eq!(notebook.widget_at(RootPosition::new(4, 2)).unwrap(), B);
        assert_eq!(
            notebook.virtual_to_root(document, position).unwrap(),
            RootPosition::new(4, 2)
        );
    }

    #[test]
    fn editor_index_follows_display_order() {
        let notebook = three_cells();
        let root = notebook.virtual_document();

        // cells start at virtual lines 0, 4 and 9
        assert_eq!(root.text().lines().nth(9), Some("print(x)"));
        assert_eq!(notebook.editor_index(VirtualPosition::new(1, 0)).unwrap(), 0);
        assert_eq!(notebook.editor_index(VirtualPosition::new(5, 0)).unwrap(), 1);
        assert_eq!(notebook.editor_index(VirtualPosition::new(9, 0)).unwrap(), 2);
        assert!(notebook
            .editor_index(VirtualPosition::new(2, 0))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn removing_a_cell_shifts_later_cells_up() {
        let mut notebook = three_cells();
        let expired = notebook.remove_cell(B).unwrap();

        assert_eq!(expired, vec!["analysis.ipynb.python-r.r".to_string()]);
        assert_eq!(notebook.widget_at(RootPosition::new(2, 0)).unwrap(), C);
        assert!(notebook
            .widget_at(RootPosition::new(3, 0))
            .unwrap_err()
            .is_not_found());
        assert!(notebook
            .editor_to_root(B, EditorPosition::zero())
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn edits_and_moves_rebuild_offsets() {
        let mut notebook = three_cells();
        notebook.edit_cell(A, "x = 1").unwrap();
        assert_eq!(
            notebook.editor_to_root(C, EditorPosition::zero()).unwrap(),
            RootPosition::new(4, 0)
        );

        notebook.move_cell(C, 0).unwrap();
        assert_eq!(notebook.widget_at(RootPosition::new(0, 0)).unwrap(), C);
        assert_eq!(notebook.cells()[1].widget, A);

        notebook.insert_cell(99, Cell::new(WidgetId(40), "z")).unwrap();
        assert_eq!(notebook.cells().len(), 4);
        assert_eq!(notebook.cell(WidgetId(40)).unwrap().text, "z");
    }

    #[test]
    fn stamped_positions_expire_with_the_generation() {
        let mut notebook = three_cells();
        let stamped = notebook.stamp(RootPosition::new(4, 1));
        assert_eq!(notebook.unstamp(stamped).unwrap(), RootPosition::new(4, 1));

        notebook.edit_cell(C, "print(x + 1)").unwrap();
        let err = notebook.unstamp(stamped).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn line_magic_override_maps_back() {
        let mut notebook = notebook();
        notebook.set_cells([Cell::new(A, "%time run()")]).unwrap();
        let root = notebook.virtual_document();

        assert_eq!(root.text(), r#"magic("time", " run()")"#);
        let (_, position) = notebook
            .resolve_document_and_virtual_position(RootPosition::new(0, 6))
            .unwrap();
        assert_eq!(
            notebook.virtual_to_source(position).unwrap(),
            SourcePosition::new(0, 6)
        );
    }

    #[test]
    fn closed_notebook_ignores_later_mutations() {
        let mut notebook = three_cells();
        notebook.close();

        let err = notebook
            .set_cells([Cell::new(A, "x = 1\ny = 2")])
            .unwrap_err();
        assert!(matches!(err, Error::Closed { .. }));
        assert!(notebook.insert_cell(0, Cell::new(B, "z")).is_err());
        assert!(notebook.edit_cell(A, "x").is_err());
        assert!(notebook.cells().is_empty());

        assert!(notebook
            .editor_to_root(A, EditorPosition::new(1, 2))
            .unwrap_err()
            .is_not_found());
        assert!(notebook
            .root_to_editor(RootPosition::new(1, 2))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn duplicate_widgets_are_rejected() {
        let mut notebook = three_cells();

        let err = notebook
            .set_cells([Cell::new(A, "x = 1"), Cell::new(A, "y = 2")])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateWidget { widget: A }));
        assert_eq!(notebook.cells().len(), 3);
        assert_eq!(notebook.editor_index(VirtualPosition::new(0, 0)).unwrap(), 0);

        assert!(notebook.insert_cell(1, Cell::new(C, "w")).is_err());
        assert_eq!(notebook.cells().len(), 3);
    }

    #[test]
    fn unknown_widget_operations_fail() {
        let mut notebook = three_cells();
        assert!(notebook.edit_cell(WidgetId(99), "x").is_err());
        assert!(notebook.remove_cell(WidgetId(99)).is_err());
        assert!(notebook.move_cell(WidgetId(99), 0).is_err());
    }
}
