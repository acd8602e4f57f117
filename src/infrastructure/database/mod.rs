//! SQLite-backed metadata store, reused near-verbatim from the teacher's
//! `infrastructure/database/mod.rs` `Database` wrapper (`ConnectOptions` +
//! PRAGMA tuning for write throughput).

use std::path::Path;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database as SeaDatabase, DatabaseConnection, DbErr, Statement};
use sea_orm::ConnectionTrait;
use sea_orm_migration::MigratorTrait;
use tracing::info;

pub mod entities;
pub mod migration;
pub mod repo;

async fn apply_pragmas(conn: &DatabaseConnection) {
    for pragma in [
        "PRAGMA journal_mode=WAL",
        "PRAGMA synchronous=NORMAL",
        "PRAGMA temp_store=MEMORY",
        "PRAGMA cache_size=-20000",
        "PRAGMA mmap_size=67108864",
        "PRAGMA foreign_keys=ON",
    ] {
        let _ = conn
            .execute(Statement::from_string(
                sea_orm::DatabaseBackend::Sqlite,
                pragma,
            ))
            .await;
    }
}

/// Handle to the local metadata database (§4.2). Single-writer from the
/// service process; `open_readonly` is for external CLI readers
/// (`status`/`log`) per §4.2 "Isolation".
pub struct Database {
    conn: DatabaseConnection,
}

impl Database {
    /// Creates (or opens) the database at `path`, running migrations.
    pub async fn create(path: &Path) -> Result<Self, DbErr> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DbErr::Custom(format!("creating {}: {e}", parent.display())))?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", path.display());
        let mut opt = ConnectOptions::new(db_url);
        opt.max_connections(10)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(8))
            .idle_timeout(Duration::from_secs(8))
            .sqlx_logging(false);

        let conn = SeaDatabase::connect(opt).await?;
        apply_pragmas(&conn).await;
        migration::Migrator::up(&conn, None).await?;
        info!(path = %path.display(), "opened metadata database");
        Ok(Self { conn })
    }

    /// Opens `path` read-only, for `status`/`log` while a backup may be
    /// running concurrently (§4.2 "Isolation").
    pub async fn open_readonly(path: &Path) -> Result<Self, DbErr> {
        if !path.exists() {
            return Err(DbErr::Custom(format!(
                "database does not exist: {}",
                path.display()
            )));
        }
        let db_url = format!("sqlite://{}?mode=ro", path.display());
        let mut opt = ConnectOptions::new(db_url);
        opt.max_connections(4).sqlx_logging(false);
        let conn = SeaDatabase::connect(opt).await?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Forces the WAL back into the main database file. Used by the commit
    /// protocol's durability step (§4.4 step 3) and before uploading the DB
    /// to a vault (§4.4 "After the queue drains").
    pub async fn checkpoint_full(&self) -> Result<(), DbErr> {
        self.conn
            .execute(Statement::from_string(
                sea_orm::DatabaseBackend::Sqlite,
                "PRAGMA wal_checkpoint(FULL)",
            ))
            .await?;
        Ok(())
    }
}
