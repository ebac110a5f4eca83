//! Represents one node of the catalog classification hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A catalog entity (group, sub-group or leaf item).
///
/// The hierarchy is encoded through `parent_id`; an entity's lineage is the
/// chain of ancestor titles from the top-level group down to itself, and is
/// what target store keys are derived from. Titles are free text and must be
/// sanitized before any use in a key.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct CatalogEntity {
    /// Unique identifier (UUID for internal DB use).
    pub id: Uuid,

    /// Parent entity, `None` for top-level groups.
    pub parent_id: Option<Uuid>,

    /// Human-entered display title.
    pub title: String,

    /// When this entity was created.
    pub created_at: DateTime<Utc>,
}
