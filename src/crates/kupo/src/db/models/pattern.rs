//! Pattern model for database persistence

use sqlx::FromRow;

/// A registered pattern, stored in its canonical text form.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PatternRow {
    /// Canonical text of the pattern
    pub pattern: String,
}
