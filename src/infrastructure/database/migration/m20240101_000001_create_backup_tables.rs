//! Initial migration: `directories` / `files` / `file_snapshots` /
//! `contents`, one fresh table set per §3. `ColumnDef`/`Table::create` idiom
//! grounded on the teacher's `m20240101_000001_create_initial_tables.rs`.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Contents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Contents::Id)
                            .char_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Contents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Directories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Directories::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Directories::Uuid)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Directories::Path)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Directories::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Files::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Files::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Files::Uuid).uuid().not_null().unique_key())
                    .col(ColumnDef::new(Files::DirectoryId).integer().not_null())
                    .col(ColumnDef::new(Files::Name).string().not_null())
                    .col(ColumnDef::new(Files::CurrentSnapshotId).integer())
                    .col(
                        ColumnDef::new(Files::Deleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_files_directory")
                            .from(Files::Table, Files::DirectoryId)
                            .to(Directories::Table, Directories::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .index(
                        Index::create()
                            .name("idx_files_directory_name")
                            .table(Files::Table)
                            .col(Files::DirectoryId)
                            .col(Files::Name)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FileSnapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FileSnapshots::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FileSnapshots::Uuid)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(FileSnapshots::FileId).integer().not_null())
                    .col(
                        ColumnDef::new(FileSnapshots::ContentId)
                            .char_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FileSnapshots::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FileSnapshots::Size).big_integer().not_null())
                    .col(
                        ColumnDef::new(FileSnapshots::Permissions)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FileSnapshots::Uid).big_integer().not_null())
                    .col(ColumnDef::new(FileSnapshots::Gid).big_integer().not_null())
                    .col(
                        ColumnDef::new(FileSnapshots::AccessedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FileSnapshots::ModifiedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FileSnapshots::ChangedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FileSnapshots::BornAt).big_integer())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_file_snapshots_file")
                            .from(FileSnapshots::Table, FileSnapshots::FileId)
                            .to(Files::Table, Files::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_file_snapshots_content")
                            .from(FileSnapshots::Table, FileSnapshots::ContentId)
                            .to(Contents::Table, Contents::Id),
                    )
                    .index(
                        Index::create()
                            .name("idx_file_snapshots_file_created")
                            .table(FileSnapshots::Table)
                            .col(FileSnapshots::FileId)
                            .col(FileSnapshots::CreatedAt),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FileSnapshots::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Files::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Directories::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Contents::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(Iden)]
enum Directories {
    Table,
    Id,
    Uuid,
    Path,
    CreatedAt,
}

#[derive(Iden)]
enum Files {
    Table,
    Id,
    Uuid,
    DirectoryId,
    Name,
    CurrentSnapshotId,
    Deleted,
}

#[derive(Iden)]
enum FileSnapshots {
    Table,
    Id,
    Uuid,
    FileId,
    ContentId,
    CreatedAt,
    Size,
    Permissions,
    Uid,
    Gid,
    AccessedAt,
    ModifiedAt,
    ChangedAt,
    BornAt,
}

#[derive(Iden)]
enum Contents {
    Table,
    Id,
    CreatedAt,
}
