//! `FileSnapshot` entity (§3) — point-in-time record of a file. Append-only;
//! never updated after insert.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file_snapshots")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub uuid: Uuid,
    pub file_id: i32,
    /// Digest of the payload; FK to `contents.id` (a `CHAR(64)`, not a
    /// synthetic key — see `Content`).
    pub content_id: String,
    pub created_at: DateTimeUtc,
    pub size: i64,
    pub permissions: i64,
    pub uid: i64,
    pub gid: i64,
    pub accessed_at: i64,
    pub modified_at: i64,
    pub changed_at: i64,
    pub born_at: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::file::Entity",
        from = "Column::FileId",
        to = "super::file::Column::Id"
    )]
    File,
    #[sea_orm(
        belongs_to = "super::content::Entity",
        from = "Column::ContentId",
        to = "super::content::Column::Id"
    )]
    Content,
}

impl Related<super::file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::File.def()
    }
}

impl Related<super::content::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Content.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
