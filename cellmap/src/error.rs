use crate::position::{Generation, Space, Tagged, WidgetId};
use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by position lookups and registry construction.
///
/// Every lookup error is local to a single call. Callers placing cursors or diagnostics should
/// check [`Error::is_not_found`] and drop the update.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("No {space} position at {line}:{column}"))]
    PositionNotFound { space: Space, line: u32, column: u32 },

    #[snafu(display("{widget} is not hosted by this editor"))]
    WidgetNotFound { widget: WidgetId },

    #[snafu(display("Position computed at {expected} used at {actual}"))]
    StaleGeneration {
        expected: Generation,
        actual: Generation,
    },

    #[snafu(display("{widget} already hosts a cell"))]
    DuplicateWidget { widget: WidgetId },

    #[snafu(display("{widget} is at revision {current}, last synced at {synced}"))]
    WidgetOutOfSync {
        widget: WidgetId,
        synced: u64,
        current: u64,
    },

    #[snafu(display("Invalid pattern {pattern:?}: {source}"))]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[snafu(display("Document {uri} is closed"))]
    Closed { uri: String },
}

impl Error {
    /// Whether this error means "there is no usable position for this interaction".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::PositionNotFound { .. }
                | Error::WidgetNotFound { .. }
                | Error::StaleGeneration { .. }
        )
    }
}

/// Build a [`Error::PositionNotFound`] for any tagged position.
pub(crate) fn not_found<P: Tagged>(position: P) -> Error {
    PositionNotFoundSnafu {
        space: P::SPACE,
        line: position.line(),
        column: position.column(),
    }
    .build()
}
