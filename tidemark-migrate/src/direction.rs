//! Migration direction and the dispatch rules of the reversible context.
//!
//! The direction is threaded through [`MigrationContext`](crate::MigrationContext)
//! by value. The `NotReversible` mode only exists inside this crate: it marks a
//! context whose operations must run literally, which is how inverse operations
//! and reversible-block callbacks avoid inverting themselves again.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction of migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Apply the migration (up).
    Up,
    /// Reverse the migration (down).
    Down,
}

impl Direction {
    /// Lowercase name, as used in logs and markers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The mode a migration context runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Up,
    Down,
    NotReversible,
}

impl From<Direction> for Mode {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Up => Self::Up,
            Direction::Down => Self::Down,
        }
    }
}

/// How a structural operation behaves in a given mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// Perform the operation as written.
    Literal,
    /// Perform the paired inverse operation instead.
    Invert,
}

/// Decide whether a structural operation runs literally or inverted.
pub(crate) fn dispatch(mode: Mode) -> Dispatch {
    match mode {
        Mode::Down => Dispatch::Invert,
        Mode::Up | Mode::NotReversible => Dispatch::Literal,
    }
}

/// Pick the branch of a reversible block for the mode active on entry.
///
/// Returns `None` when the block is entered from a context that is already
/// `NotReversible`, in which case neither branch runs.
pub(crate) fn reversible_branch(entry: Mode) -> Option<Direction> {
    match entry {
        Mode::Up => Some(Direction::Up),
        Mode::Down => Some(Direction::Down),
        Mode::NotReversible => None,
    }
}
