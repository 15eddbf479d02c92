//! Database schema for upload_queue.db.
//!
//! Version 0 shipped without the `arena` / `quadra` labels; version 1 appends
//! them to `queue_entries`.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};
use anyhow::Result;
use rusqlite::Connection;

// =============================================================================
// Version 0
// =============================================================================

const QUEUE_ENTRIES_TABLE_V0: Table = Table {
    name: "queue_entries",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_autoincrement = true
        ),
        sqlite_column!("artifact_path", &SqlType::Text, non_null = true),
        sqlite_column!("camera_id", &SqlType::Text, non_null = true),
        sqlite_column!("session_id", &SqlType::Text),
        sqlite_column!("file_size", &SqlType::Integer, non_null = true),
        sqlite_column!("checksum", &SqlType::Text, non_null = true),
        sqlite_column!(
            "priority",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!(
            "retry_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("max_retries", &SqlType::Integer, non_null = true),
        sqlite_column!("last_attempt_at", &SqlType::Integer),
        sqlite_column!("next_eligible_at", &SqlType::Integer),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("completed_at", &SqlType::Integer),
        sqlite_column!("error_kind", &SqlType::Text),
        sqlite_column!("error_message", &SqlType::Text),
        sqlite_column!("destination", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_entries_status_priority", "status, priority, created_at"),
        ("idx_entries_next_eligible", "next_eligible_at"),
        ("idx_entries_artifact", "artifact_path, checksum"),
    ],
};

const CONNECTIVITY_EVENTS_TABLE_V0: Table = Table {
    name: "connectivity_events",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_autoincrement = true
        ),
        sqlite_column!("timestamp", &SqlType::Integer, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("latency_ms", &SqlType::Integer),
        sqlite_column!("error", &SqlType::Text),
    ],
    indices: &[("idx_connectivity_timestamp", "timestamp")],
};

// =============================================================================
// Version 1 - arena / quadra labels
// =============================================================================

const QUEUE_ENTRIES_TABLE_V1: Table = Table {
    name: "queue_entries",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_autoincrement = true
        ),
        sqlite_column!("artifact_path", &SqlType::Text, non_null = true),
        sqlite_column!("camera_id", &SqlType::Text, non_null = true),
        sqlite_column!("session_id", &SqlType::Text),
        sqlite_column!("file_size", &SqlType::Integer, non_null = true),
        sqlite_column!("checksum", &SqlType::Text, non_null = true),
        sqlite_column!(
            "priority",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!(
            "retry_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("max_retries", &SqlType::Integer, non_null = true),
        sqlite_column!("last_attempt_at", &SqlType::Integer),
        sqlite_column!("next_eligible_at", &SqlType::Integer),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("completed_at", &SqlType::Integer),
        sqlite_column!("error_kind", &SqlType::Text),
        sqlite_column!("error_message", &SqlType::Text),
        sqlite_column!("destination", &SqlType::Text, non_null = true),
        sqlite_column!("arena", &SqlType::Text),
        sqlite_column!("quadra", &SqlType::Text),
    ],
    indices: &[
        ("idx_entries_status_priority", "status, priority, created_at"),
        ("idx_entries_next_eligible", "next_eligible_at"),
        ("idx_entries_artifact", "artifact_path, checksum"),
    ],
};

fn migrate_v1_location_labels(conn: &Connection) -> Result<()> {
    QUEUE_ENTRIES_TABLE_V1.add_column(conn, "arena")?;
    QUEUE_ENTRIES_TABLE_V1.add_column(conn, "quadra")?;
    Ok(())
}

pub const UPLOAD_QUEUE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[QUEUE_ENTRIES_TABLE_V0, CONNECTIVITY_EVENTS_TABLE_V0],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[QUEUE_ENTRIES_TABLE_V1, CONNECTIVITY_EVENTS_TABLE_V0],
        migration: Some(migrate_v1_location_labels),
    },
];
