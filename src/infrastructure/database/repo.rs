//! `MetadataStore` — the operations listed in §4.2 against the entities in
//! `entities/`.
//!
//! Grounded on `core-new/src/location/mod.rs::create_location` and
//! `location/manager.rs` for the transactional insert pattern (`db.begin()`
//! → `ActiveModel` inserts/updates → `Entity::find().filter(...)` existence
//! checks → `commit()`). The consolidation algorithm in `create_directory`
//! is a new composition of that pattern against §4.2's contract: the
//! teacher's own location hierarchy has no "absorb children" operation.

use std::path::{Path, PathBuf};

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use uuid::Uuid;

use super::entities::{content, directory, file, file_snapshot};
use crate::domain::{Digest, FileStats};

#[derive(Clone)]
pub struct MetadataStore {
    conn: DatabaseConnection,
}

fn is_ancestor(ancestor: &Path, descendant: &Path) -> bool {
    descendant.starts_with(ancestor)
}

/// The path suffix of `child` relative to `parent`, forward-slash joined.
/// Empty if `child == parent`.
fn relative_suffix(parent: &Path, child: &Path) -> String {
    child
        .strip_prefix(parent)
        .unwrap_or(child)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl MetadataStore {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn find_directory_by_path(
        &self,
        path: &Path,
    ) -> Result<Option<directory::Model>, DbErr> {
        directory::Entity::find()
            .filter(directory::Column::Path.eq(path_key(path)))
            .one(&self.conn)
            .await
    }

    /// The tracked directory that is `path` itself or an ancestor of it
    /// (§4.2). With the antichain invariant (§3) at most one such directory
    /// can exist; `max_by_key` on path length is defensive.
    pub async fn search_directory_for_path(
        &self,
        path: &Path,
    ) -> Result<Option<directory::Model>, DbErr> {
        let all = directory::Entity::find().all(&self.conn).await?;
        Ok(all
            .into_iter()
            .filter(|d| is_ancestor(Path::new(&d.path), path))
            .max_by_key(|d| d.path.len()))
    }

    /// Tracked directories strictly under `path`; used by consolidation.
    pub async fn find_directories_by_path_prefix(
        &self,
        path: &Path,
    ) -> Result<Vec<directory::Model>, DbErr> {
        let all = directory::Entity::find().all(&self.conn).await?;
        Ok(all
            .into_iter()
            .filter(|d| d.path != path_key(path) && is_ancestor(path, Path::new(&d.path)))
            .collect())
    }

    pub async fn list_directories(&self) -> Result<Vec<directory::Model>, DbErr> {
        directory::Entity::find().all(&self.conn).await
    }

    pub async fn find_or_create_file(
        &self,
        directory_id: i32,
        relative_name: &str,
    ) -> Result<file::Model, DbErr> {
        if let Some(existing) = file::Entity::find()
            .filter(file::Column::DirectoryId.eq(directory_id))
            .filter(file::Column::Name.eq(relative_name))
            .one(&self.conn)
            .await?
        {
            return Ok(existing);
        }

        let model = file::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            directory_id: Set(directory_id),
            name: Set(relative_name.to_string()),
            current_snapshot_id: Set(None),
            deleted: Set(false),
            ..Default::default()
        };
        model.insert(&self.conn).await
    }

    pub async fn list_files_in_directory(
        &self,
        directory_id: i32,
    ) -> Result<Vec<file::Model>, DbErr> {
        file::Entity::find()
            .filter(file::Column::DirectoryId.eq(directory_id))
            .all(&self.conn)
            .await
    }

    pub async fn get_file_by_id(&self, file_id: i32) -> Result<Option<file::Model>, DbErr> {
        file::Entity::find_by_id(file_id).one(&self.conn).await
    }

    pub async fn set_file_deleted(&self, file_id: i32, deleted: bool) -> Result<(), DbErr> {
        let mut active: file::ActiveModel = file::Entity::find_by_id(file_id)
            .one(&self.conn)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("file {file_id}")))?
            .into();
        active.deleted = Set(deleted);
        active.update(&self.conn).await?;
        Ok(())
    }

    /// Transactionally inserts `Directory` at `path`, reparenting files from
    /// every directory `find_directories_by_path_prefix` returns (rewriting
    /// `File.directory_id` and prepending the absorbed directory's suffix to
    /// `File.name`), then deletes those child directories (§4.2).
    pub async fn create_directory(&self, path: &Path) -> Result<directory::Model, DbErr> {
        let txn = self.conn.begin().await?;

        let children = {
            let all = directory::Entity::find().all(&txn).await?;
            all.into_iter()
                .filter(|d| is_ancestor(path, Path::new(&d.path)))
                .collect::<Vec<_>>()
        };

        let new_dir = directory::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            path: Set(path_key(path)),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        let new_dir = new_dir.insert(&txn).await?;

        for child in children {
            let suffix = relative_suffix(path, Path::new(&child.path));
            let files = file::Entity::find()
                .filter(file::Column::DirectoryId.eq(child.id))
                .all(&txn)
                .await?;
            for f in files {
                let new_name = if suffix.is_empty() {
                    f.name.clone()
                } else {
                    format!("{suffix}/{}", f.name)
                };
                let mut active: file::ActiveModel = f.into();
                active.directory_id = Set(new_dir.id);
                active.name = Set(new_name);
                active.update(&txn).await?;
            }
            directory::Entity::delete_by_id(child.id).exec(&txn).await?;
        }

        txn.commit().await?;
        Ok(new_dir)
    }

    pub async fn get_or_create_content(&self, digest: &Digest) -> Result<content::Model, DbErr> {
        get_or_create_content_in(&self.conn, digest).await
    }

    /// The commit protocol's step 2 (§4.4): in one transaction,
    /// `get_or_create_content` → `append_snapshot` → update
    /// `File.current_snapshot_id`.
    pub async fn commit_snapshot(
        &self,
        file_id: i32,
        digest: &Digest,
        stats: &FileStats,
    ) -> Result<file_snapshot::Model, DbErr> {
        let txn = self.conn.begin().await?;

        get_or_create_content_in(&txn, digest).await?;

        let snapshot = file_snapshot::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            file_id: Set(file_id),
            content_id: Set(digest.as_str().to_string()),
            created_at: Set(Utc::now()),
            size: Set(stats.size as i64),
            permissions: Set(stats.permissions as i64),
            uid: Set(stats.uid as i64),
            gid: Set(stats.gid as i64),
            accessed_at: Set(stats.accessed_at),
            modified_at: Set(stats.modified_at),
            changed_at: Set(stats.changed_at),
            born_at: Set(stats.birthtime),
            ..Default::default()
        };
        let snapshot = snapshot.insert(&txn).await?;

        let mut file_active: file::ActiveModel = file::Entity::find_by_id(file_id)
            .one(&txn)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("file {file_id}")))?
            .into();
        file_active.current_snapshot_id = Set(Some(snapshot.id));
        file_active.update(&txn).await?;

        txn.commit().await?;
        Ok(snapshot)
    }

    pub async fn list_snapshots(&self, file_id: i32) -> Result<Vec<file_snapshot::Model>, DbErr> {
        file_snapshot::Entity::find()
            .filter(file_snapshot::Column::FileId.eq(file_id))
            .order_by_desc(file_snapshot::Column::CreatedAt)
            .all(&self.conn)
            .await
    }

    pub async fn find_snapshot_by_digest(
        &self,
        file_id: i32,
        digest: &Digest,
    ) -> Result<Option<file_snapshot::Model>, DbErr> {
        file_snapshot::Entity::find()
            .filter(file_snapshot::Column::FileId.eq(file_id))
            .filter(file_snapshot::Column::ContentId.eq(digest.as_str()))
            .order_by_desc(file_snapshot::Column::CreatedAt)
            .one(&self.conn)
            .await
    }

    pub async fn get_snapshot_by_id(
        &self,
        id: i32,
    ) -> Result<Option<file_snapshot::Model>, DbErr> {
        file_snapshot::Entity::find_by_id(id).one(&self.conn).await
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }
}

async fn get_or_create_content_in<C: ConnectionTrait>(
    conn: &C,
    digest: &Digest,
) -> Result<content::Model, DbErr> {
    if let Some(existing) = content::Entity::find_by_id(digest.as_str().to_string())
        .one(conn)
        .await?
    {
        return Ok(existing);
    }
    let model = content::ActiveModel {
        id: Set(digest.as_str().to_string()),
        created_at: Set(Utc::now()),
    };
    model.insert(conn).await
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestor_respects_component_boundaries() {
        assert!(is_ancestor(Path::new("/t"), Path::new("/t/sub")));
        assert!(!is_ancestor(Path::new("/t"), Path::new("/tother")));
        assert!(is_ancestor(Path::new("/t"), Path::new("/t")));
    }

    #[test]
    fn suffix_is_forward_slash_joined() {
        assert_eq!(
            relative_suffix(Path::new("/t"), Path::new("/t/sub/deeper")),
            "sub/deeper"
        );
        assert_eq!(relative_suffix(Path::new("/t"), Path::new("/t")), "");
    }
}
