//! `Content` entity (§3) — immutable blob reference, keyed by its own digest.
//!
//! Deviates from the teacher's i32-autoincrement-plus-Uuid convention used
//! by the other entities: the primary key here *is* the digest (a
//! `CHAR(64)` hex string), because content is addressed by its hash, not a
//! synthetic id.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "contents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Char(Some(64))")]
    pub id: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::file_snapshot::Entity")]
    Snapshots,
}

impl Related<super::file_snapshot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Snapshots.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
