//! Virtual documents: one synthetic document per embedded language.
//!
//! A root [`VirtualDocument`] is assembled from blocks (one per widget, e.g. one per notebook
//! cell). While appending a block it:
//!
//! 1. extracts foreign code spans into child documents, recursively,
//! 2. blanks non-kept foreign spans out of its own text,
//! 3. applies its language's overrides line by line,
//! 4. separates blocks with blank lines.
//!
//! ```text
//! root (python)                         r child
//! ----------------------------------    ----------------------
//! 0  import numpy        block 0        0  x <- 1     block 0
//! 1  x = 1                              1  mean(x)
//! 2                      separator
//! 3                      separator
//! 4                      block 1 (%%R, blanked)
//! 5
//! 6
//! ```
//!
//! Every block keeps enough bookkeeping to answer lookups in both directions: its widget, the
//! widget position of its first character, its first source and virtual line, and a
//! [`LineMap`] per line. Lookups never recompute boundaries; they read the records of the
//! current [`Generation`]. [`VirtualDocument::rebuild`] throws all records away and starts
//! over, so a stale record can never answer a query.

use crate::{
    column_map::{ColumnTransform, LineMap},
    error::{not_found, ClosedSnafu, Result},
    extractors::{strip_host, ExtractedCode, ExtractorsRegistry},
    overrides::OverridesRegistry,
    position::{
        EditorPosition, EditorRange, Generation, RootPosition, SourcePosition, VirtualPosition,
        WidgetId,
    },
};
use rustc_hash::FxHashMap;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, trace};

/// Blank lines inserted between consecutive blocks of a virtual document.
pub const DEFAULT_BLANK_LINES_BETWEEN_BLOCKS: u32 = 2;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum VirtualLine {
    Block { block: usize, line: u32 },
    Separator,
}

/// A span of a block that was handed to a child document.
#[derive(Clone, Debug)]
struct ForeignSpan {
    /// Block-local, inclusive.
    range: EditorRange,
    document: String,
    block: usize,
}

#[derive(Clone, Debug)]
struct Block {
    widget: WidgetId,
    /// Widget position of the block's first character.
    editor_shift: EditorPosition,
    source_start: u32,
    virtual_start: u32,
    source_line_lens: Vec<u32>,
    line_maps: Vec<LineMap>,
    foreign: Vec<ForeignSpan>,
}

impl Block {
    fn line_count(&self) -> u32 {
        self.source_line_lens.len() as u32
    }
}

/// Result of walking the tree for one root position.
#[derive(Copy, Clone, Debug)]
pub struct Resolution<'a> {
    /// Deepest document owning the position.
    pub document: &'a VirtualDocument,
    pub virtual_position: VirtualPosition,
    pub widget: WidgetId,
    pub editor_position: EditorPosition,
}

/// Widget position of a block-local position, given the block's own widget position.
fn shift_by(shift: EditorPosition, local: EditorPosition) -> EditorPosition {
    let column = if local.line == 0 {
        shift.column + local.column
    } else {
        local.column
    };
    EditorPosition::new(shift.line + local.line, column)
}

/// State shared by every document of one tree.
#[derive(Debug)]
struct Shared {
    path: String,
    overrides: Arc<OverridesRegistry>,
    extractors: Arc<ExtractorsRegistry>,
}

#[derive(Debug)]
pub struct VirtualDocument {
    language: String,
    virtual_id: String,
    id_path: String,
    file_extension: Option<String>,
    shared: Arc<Shared>,
    blank_lines_between_blocks: u32,
    foreign_extract: bool,
    standalone: bool,
    generation: Generation,
    closed: bool,

    lines: Vec<String>,
    virtual_lines: Vec<VirtualLine>,
    blocks: Vec<Block>,
    source_line_count: u32,

    foreign_documents: BTreeMap<String, VirtualDocument>,
    standalone_counts: FxHashMap<String, u32>,
}

impl VirtualDocument {
    /// Create the root document of a host document.
    pub fn new_root(
        language: impl Into<String>,
        path: impl Into<String>,
        overrides: Arc<OverridesRegistry>,
        extractors: Arc<ExtractorsRegistry>,
    ) -> Self {
        let language = language.into();
        let shared = Arc::new(Shared {
            path: path.into(),
            overrides,
            extractors,
        });
        Self {
            virtual_id: language.clone(),
            id_path: language.clone(),
            language,
            file_extension: None,
            shared,
            blank_lines_between_blocks: DEFAULT_BLANK_LINES_BETWEEN_BLOCKS,
            foreign_extract: false,
            standalone: false,
            generation: Generation::default(),
            closed: false,
            lines: Vec::new(),
            virtual_lines: Vec::new(),
            blocks: Vec::new(),
            source_line_count: 0,
            foreign_documents: BTreeMap::new(),
            standalone_counts: FxHashMap::default(),
        }
    }

    pub fn with_blank_lines_between_blocks(mut self, lines: u32) -> Self {
        self.blank_lines_between_blocks = lines;
        self
    }

    pub fn with_file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = Some(extension.into());
        self
    }

    fn new_foreign(
        shared: &Arc<Shared>,
        parent_id_path: &str,
        blank_lines_between_blocks: u32,
        generation: Generation,
        virtual_id: String,
        code: &ExtractedCode,
    ) -> Self {
        Self {
            language: code.language.clone(),
            id_path: format!("{parent_id_path}-{virtual_id}"),
            virtual_id,
            file_extension: code.file_extension.clone(),
            shared: shared.clone(),
            blank_lines_between_blocks,
            foreign_extract: true,
            standalone: code.standalone,
            generation,
            closed: false,
            lines: Vec::new(),
            virtual_lines: Vec::new(),
            blocks: Vec::new(),
            source_line_count: 0,
            foreign_documents: BTreeMap::new(),
            standalone_counts: FxHashMap::default(),
        }
    }

    pub fn overrides(&self) -> &OverridesRegistry {
        &self.shared.overrides
    }

    pub fn extractors(&self) -> &ExtractorsRegistry {
        &self.shared.extractors
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn path(&self) -> &str {
        &self.shared.path
    }

    pub fn virtual_id(&self) -> &str {
        &self.virtual_id
    }

    /// `virtual_id`s from the root down to this document, joined with `-`.
    pub fn id_path(&self) -> &str {
        &self.id_path
    }

    pub fn file_extension(&self) -> Option<&str> {
        self.file_extension.as_deref()
    }

    /// Identifier handed to the language server.
    ///
    /// The root uses the host path; children append their id path and extension
    /// (`notebook.ipynb.python-r.r`).
    pub fn uri(&self) -> String {
        if self.is_root() {
            return self.shared.path.clone();
        }
        let extension = self.file_extension.as_deref().unwrap_or(&self.language);
        format!("{}.{}.{}", self.shared.path, self.id_path, extension)
    }

    /// Whether this document was created for a host document rather than extracted from one.
    pub fn is_root(&self) -> bool {
        !self.foreign_extract
    }

    pub fn is_standalone(&self) -> bool {
        self.standalone
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Full virtual text, separators included.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn line(&self, line: u32) -> Option<&str> {
        self.lines.get(line as usize).map(String::as_str)
    }

    pub fn line_count(&self) -> u32 {
        self.lines.len() as u32
    }

    /// Lines of raw block text held by this document.
    pub fn source_line_count(&self) -> u32 {
        self.source_line_count
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn foreign_document(&self, virtual_id: &str) -> Option<&VirtualDocument> {
        self.foreign_documents.get(virtual_id)
    }

    pub fn foreign_documents(&self) -> impl Iterator<Item = &VirtualDocument> {
        self.foreign_documents.values()
    }

    /// This document and all its descendants, depth first.
    pub fn documents(&self) -> Vec<&VirtualDocument> {
        let mut documents = vec![self];
        for child in self.foreign_documents.values() {
            documents.extend(child.documents());
        }
        documents
    }

    /// Append the code of one widget (or one foreign span of it) as a new block.
    ///
    /// `editor_shift` is the widget position of the first character of `code`. Returns the
    /// index of the new block.
    pub fn append_block(
        &mut self,
        widget: WidgetId,
        code: &str,
        editor_shift: EditorPosition,
    ) -> Result<usize> {
        if self.closed {
            return ClosedSnafu { uri: self.uri() }.fail();
        }

        let extracted = self.shared.extractors.extract(&self.language, code);
        let (host, strip_maps) = strip_host(code, &extracted);

        let mut foreign = Vec::with_capacity(extracted.len());
        for span in &extracted {
            let document = self.foreign_id(span);
            let (shared, id_path) = (&self.shared, &self.id_path);
            let (blank_lines, generation) = (self.blank_lines_between_blocks, self.generation);
            let child = self
                .foreign_documents
                .entry(document.clone())
                .or_insert_with(|| {
                    debug!(parent = %id_path, id = %document, "opening foreign document");
                    Self::new_foreign(
                        shared,
                        id_path,
                        blank_lines,
                        generation,
                        document.clone(),
                        span,
                    )
                });
            let shift = shift_by(editor_shift, span.range.start);
            let block = child.append_block(widget, &span.code, shift)?;
            foreign.push(ForeignSpan {
                range: span.range,
                document,
                block,
            });
        }

        if !self.blocks.is_empty() {
            for _ in 0..self.blank_lines_between_blocks {
                self.lines.push(String::new());
                self.virtual_lines.push(VirtualLine::Separator);
            }
        }

        let block_ix = self.blocks.len();
        let virtual_start = self.lines.len() as u32;
        let mut line_maps = Vec::new();
        for (ix, (line, strip)) in host.split('\n').zip(strip_maps).enumerate() {
            let (text, override_maps) =
                self.shared
                    .overrides
                    .rewrite_line(&self.language, line, ix == 0);
            let mut map = LineMap::identity();
            map.push(strip);
            for stage in override_maps {
                map.push(stage);
            }
            self.lines.push(text);
            self.virtual_lines.push(VirtualLine::Block {
                block: block_ix,
                line: ix as u32,
            });
            line_maps.push(map);
        }

        let source_line_lens: Vec<u32> = code
            .split('\n')
            .map(|line| line.chars().count() as u32)
            .collect();
        let block = Block {
            widget,
            editor_shift,
            source_start: self.source_line_count,
            virtual_start,
            source_line_lens,
            line_maps,
            foreign,
        };
        self.source_line_count += block.line_count();
        trace!(
            uri = %self.uri(),
            %widget,
            block = block_ix,
            virtual_start,
            lines = block.line_count(),
            "appended block"
        );
        self.blocks.push(block);

        Ok(block_ix)
    }

    /// Which child a span goes to: shared per language, or a fresh one per standalone span.
    fn foreign_id(&mut self, span: &ExtractedCode) -> String {
        if !span.standalone {
            return span.language.clone();
        }
        let count = self
            .standalone_counts
            .entry(span.language.clone())
            .or_default();
        let id = format!("{}-{}", span.language, count);
        *count += 1;
        id
    }

    /// Replace the whole content with `blocks`, starting a new generation.
    ///
    /// Children that receive no block in the new generation are closed. Returns the uris of
    /// the documents that were closed.
    pub fn rebuild<I, S>(&mut self, blocks: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (WidgetId, S)>,
        S: AsRef<str>,
    {
        if self.closed {
            return ClosedSnafu { uri: self.uri() }.fail();
        }

        let generation = self.generation.next();
        self.reset(generation);
        for (widget, code) in blocks {
            self.append_block(widget, code.as_ref(), EditorPosition::zero())?;
        }

        let mut expired = Vec::new();
        self.close_expired(&mut expired);
        debug!(
            uri = %self.uri(),
            %generation,
            lines = self.line_count(),
            documents = self.documents().len(),
            expired = expired.len(),
            "rebuilt virtual document"
        );
        Ok(expired)
    }

    fn reset(&mut self, generation: Generation) {
        self.generation = generation;
        self.lines.clear();
        self.virtual_lines.clear();
        self.blocks.clear();
        self.source_line_count = 0;
        self.standalone_counts.clear();
        for child in self.foreign_documents.values_mut() {
            child.reset(generation);
        }
    }

    fn close_expired(&mut self, expired: &mut Vec<String>) {
        self.foreign_documents.retain(|_, child| {
            if child.blocks.is_empty() {
                child.close_into(expired);
                false
            } else {
                child.close_expired(expired);
                true
            }
        });
    }

    fn close_into(&mut self, closed: &mut Vec<String>) {
        for child in self.foreign_documents.values_mut() {
            child.close_into(closed);
        }
        debug!(uri = %self.uri(), "closing foreign document");
        closed.push(self.uri());
        self.foreign_documents.clear();
        self.closed = true;
    }

    /// Tear the document down. Every later lookup fails with a position-not-found error.
    pub fn close(&mut self) {
        let generation = self.generation.next();
        self.reset(generation);
        let mut closed = Vec::new();
        self.close_into(&mut closed);
    }

    fn block_at_source_line(&self, line: u32) -> Option<(usize, &Block)> {
        let ix = self
            .blocks
            .partition_point(|block| block.source_start <= line)
            .checked_sub(1)?;
        let block = &self.blocks[ix];
        (line < block.source_start + block.line_count()).then_some((ix, block))
    }

    /// Walk from a block-local position down to the deepest document owning it.
    fn walk(&self, block_ix: usize, local: EditorPosition) -> Option<Resolution<'_>> {
        let block = self.blocks.get(block_ix)?;
        for span in &block.foreign {
            if !span.range.contains(local) {
                continue;
            }
            if let Some(child) = self.foreign_documents.get(&span.document) {
                return child.walk(span.block, span.range.relative(local));
            }
        }

        let map = block.line_maps.get(local.line as usize)?;
        Some(Resolution {
            document: self,
            virtual_position: VirtualPosition::new(
                block.virtual_start + local.line,
                map.to_target(local.column),
            ),
            widget: block.widget,
            editor_position: shift_by(block.editor_shift, local),
        })
    }

    /// Resolve a root position in one walk: owning document, virtual position, widget and
    /// editor position.
    ///
    /// Only the root document resolves root positions; on a foreign document this always
    /// fails.
    pub fn resolve_source_position(&self, position: RootPosition) -> Result<Resolution<'_>> {
        if !self.is_root() {
            return Err(not_found(position));
        }
        let (block_ix, block) = self
            .block_at_source_line(position.line)
            .ok_or_else(|| not_found(position))?;
        let line = position.line - block.source_start;
        if position.column > block.source_line_lens[line as usize] {
            return Err(not_found(position));
        }

        let resolution = self
            .walk(block_ix, EditorPosition::new(line, position.column))
            .ok_or_else(|| not_found(position))?;
        trace!(
            %position,
            uri = %resolution.document.uri(),
            virtual_position = %resolution.virtual_position,
            "resolved root position"
        );
        Ok(resolution)
    }

    /// Deepest document owning a root position.
    pub fn document_at_source_position(&self, position: RootPosition) -> Result<&VirtualDocument> {
        Ok(self.resolve_source_position(position)?.document)
    }

    /// Virtual position of a root position within its owning document.
    pub fn virtual_position_at_document(&self, position: RootPosition) -> Result<VirtualPosition> {
        Ok(self.resolve_source_position(position)?.virtual_position)
    }

    /// Widget rendering a root position.
    pub fn get_editor_at_source_line(&self, position: RootPosition) -> Result<WidgetId> {
        Ok(self.resolve_source_position(position)?.widget)
    }

    /// Position of a root position inside its widget.
    pub fn transform_source_to_editor(&self, position: RootPosition) -> Result<EditorPosition> {
        Ok(self.resolve_source_position(position)?.editor_position)
    }

    /// Whether a root position falls inside extracted foreign code.
    pub fn is_within_foreign(&self, position: RootPosition) -> Result<bool> {
        let resolution = self.resolve_source_position(position)?;
        Ok(!std::ptr::eq(resolution.document, self))
    }

    fn block_at_virtual(&self, position: VirtualPosition) -> Result<(&Block, u32)> {
        let Some(VirtualLine::Block { block, line }) =
            self.virtual_lines.get(position.line as usize).copied()
        else {
            return Err(not_found(position));
        };
        let width = self.lines[position.line as usize].chars().count() as u32;
        if position.column > width {
            return Err(not_found(position));
        }
        Ok((&self.blocks[block], line))
    }

    /// Widget owning a virtual line. Separator lines belong to no widget.
    pub fn widget_at_virtual_line(&self, position: VirtualPosition) -> Result<WidgetId> {
        Ok(self.block_at_virtual(position)?.0.widget)
    }

    /// Undo overrides and extraction to find the raw text position in this document's
    /// blocks.
    pub fn transform_virtual_to_source(&self, position: VirtualPosition) -> Result<SourcePosition> {
        let (block, line) = self.block_at_virtual(position)?;
        let column = block.line_maps[line as usize].to_source(position.column);
        Ok(SourcePosition::new(block.source_start + line, column))
    }

    /// Widget and widget-local position of a virtual position.
    pub fn transform_virtual_to_editor(
        &self,
        position: VirtualPosition,
    ) -> Result<(WidgetId, EditorPosition)> {
        let (block, line) = self.block_at_virtual(position)?;
        let column = block.line_maps[line as usize].to_source(position.column);
        Ok((
            block.widget,
            shift_by(block.editor_shift, EditorPosition::new(line, column)),
        ))
    }
}
