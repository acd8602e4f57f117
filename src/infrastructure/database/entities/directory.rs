//! `Directory` entity (§3) — a tracked root on this host.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "directories")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// The 128-bit identifier named in §3; `id` above is the internal
    /// autoincrement key used for foreign keys, matching the teacher's
    /// hybrid i32+Uuid convention.
    #[sea_orm(unique)]
    pub uuid: Uuid,
    /// Absolute, canonicalized path. Unique; antichain-under-prefix is
    /// enforced at `track` time, not by the schema (§3 invariant).
    #[sea_orm(unique)]
    pub path: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::file::Entity")]
    Files,
}

impl Related<super::file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Files.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
