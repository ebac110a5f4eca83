//! Represents the join row between a stored object and the entity slot it
//! fills.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// "This stored object fills slot `slot` on entity `owner_id`."
///
/// Steady state is one row per filled slot; more than one row for the same
/// `(object_id, owner_id, slot)` exists only transiently during reassignment.
/// The table intentionally has no foreign keys, so rows whose object or owner
/// has vanished are representable. Those are a corruption class the hygiene
/// pass removes.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct LinkRecord {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// The stored object filling the slot.
    pub object_id: Uuid,

    /// The entity whose slot is filled.
    pub owner_id: Uuid,

    /// Free-form discriminator of the owning entity's type.
    pub owner_kind: String,

    /// Slot name on the owner (e.g. "attachment").
    pub slot: String,
}
