//! Table rendering for `bt status` and `bt log`, grounded on the
//! `comfy-table`-based display helpers in `beyondessential-bestool`'s
//! `psql` crate (`query/display/normal.rs`: build headers, add rows,
//! write the rendered table).

use comfy_table::{Cell, Table};

use crate::infrastructure::database::entities::file_snapshot;
use crate::service::FileStatusEntry;

pub fn print_status(entries: &[FileStatusEntry]) {
    let mut table = Table::new();
    table.set_header(vec!["STATUS", "PATH"]);
    for entry in entries {
        table.add_row(vec![
            Cell::new(entry.status.to_string()),
            Cell::new(&entry.relative_name),
        ]);
    }
    println!("{table}");
}

pub fn print_snapshots(snapshots: &[file_snapshot::Model]) {
    let mut table = Table::new();
    table.set_header(vec!["CREATED_AT", "DIGEST", "SIZE", "MODE", "UID", "GID"]);
    for snapshot in snapshots {
        table.add_row(vec![
            Cell::new(snapshot.created_at.to_rfc3339()),
            Cell::new(&snapshot.content_id),
            Cell::new(snapshot.size.to_string()),
            Cell::new(format!("{:o}", snapshot.permissions)),
            Cell::new(snapshot.uid.to_string()),
            Cell::new(snapshot.gid.to_string()),
        ]);
    }
    println!("{table}");
}
