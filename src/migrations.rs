//! Schema migration framework for the reference store.
//!
//! Numbered SQL migrations are embedded at compile time via `include_str!`.
//! Each migration runs exactly once, tracked by the `schema_version` table.
//! A hot backup of the database file is taken before any pending migration
//! is applied.

use rusqlite::Connection;

struct Migration {
    version: i32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("migrations/001_baseline.sql"),
}];

/// Create the `schema_version` table if it doesn't exist.
fn ensure_schema_version_table(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("Failed to create schema_version table: {}", e))
}

/// Return the highest applied migration version, or 0 if none.
fn current_version(conn: &Connection) -> Result<i32, String> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| format!("Failed to read schema version: {}", e))
}

/// Back up the database before applying migrations.
///
/// Uses SQLite's online backup API to create a hot copy at
/// `<db_path>.pre-migration.bak`. Only called when there are pending
/// migrations.
fn backup_before_migration(conn: &Connection) -> Result<(), String> {
    let db_path: String = conn
        .query_row("PRAGMA database_list", [], |row| row.get(2))
        .map_err(|e| format!("Failed to get database path: {}", e))?;

    if db_path.is_empty() || db_path == ":memory:" {
        // In-memory or temp database, nothing to back up
        return Ok(());
    }

    let backup_path = format!("{}.pre-migration.bak", db_path);
    let mut backup_conn = rusqlite::Connection::open(&backup_path)
        .map_err(|e| format!("Failed to open backup file: {}", e))?;

    let backup = rusqlite::backup::Backup::new(conn, &mut backup_conn)
        .map_err(|e| format!("Failed to initialize pre-migration backup: {}", e))?;

    backup
        .step(-1)
        .map_err(|e| format!("Pre-migration backup failed: {}", e))?;

    log::info!("Pre-migration backup created at {}", backup_path);
    Ok(())
}

/// Run all pending migrations.
///
/// Returns the number of migrations applied (0 if already up-to-date).
///
/// Forward-compat guard: if the database has a higher version than the
/// highest known migration, returns an error telling the user to update.
pub fn run_migrations(conn: &Connection) -> Result<usize, String> {
    ensure_schema_version_table(conn)?;

    let current = current_version(conn)?;
    let max_known = MIGRATIONS.last().map(|m| m.version).unwrap_or(0);

    if current > max_known {
        return Err(format!(
            "Database schema version ({}) is newer than this build supports ({}). \
             Update bidledger to the latest version.",
            current, max_known
        ));
    }

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        return Ok(0);
    }

    backup_before_migration(conn)?;

    for migration in &pending {
        conn.execute_batch(migration.sql)
            .map_err(|e| format!("Migration v{} failed: {}", migration.version, e))?;

        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [migration.version],
        )
        .map_err(|e| format!("Failed to record migration v{}: {}", migration.version, e))?;

        log::info!("Applied migration v{}", migration.version);
    }

    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn mem_db() -> Connection {
        Connection::open_in_memory().expect("in-memory db")
    }

    #[test]
    fn test_fresh_db_applies_baseline() {
        let conn = mem_db();
        let applied = run_migrations(&conn).expect("migrations should succeed");
        assert_eq!(applied, 1, "should apply exactly 1 migration (baseline)");

        let version = current_version(&conn).expect("version query");
        assert_eq!(version, 1);

        // Verify reference tables exist with their unique keys
        conn.execute(
            "INSERT INTO projects (name, owner, created_at) VALUES ('Main St', 'Jane', '2026-01-01')",
            [],
        )
        .expect("projects table should exist");

        conn.execute(
            "INSERT INTO contractors (name, location, created_at)
             VALUES ('Acme', 'Newark NJ', '2026-01-01')",
            [],
        )
        .expect("contractors table should exist");

        conn.execute(
            "INSERT INTO materials (name, default_unit, created_at)
             VALUES ('Concrete', 'SF', '2026-01-01')",
            [],
        )
        .expect("materials table should exist");

        conn.execute(
            "INSERT INTO project_locations
             (project_name, address, status, coordinates, checklist, notes, date_added)
             VALUES ('Main St', '12 Elm Ave', 'Not Started', NULL, '{}', '', '2026-01-01')",
            [],
        )
        .expect("project_locations table should exist");
    }

    #[test]
    fn test_forward_compat_guard() {
        let conn = mem_db();

        ensure_schema_version_table(&conn).unwrap();
        conn.execute("INSERT INTO schema_version (version) VALUES (999)", [])
            .unwrap();

        let result = run_migrations(&conn);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(
            err.contains("newer than this build"),
            "error should mention version mismatch: {}",
            err
        );
    }

    #[test]
    fn test_idempotency() {
        let conn = mem_db();

        let first = run_migrations(&conn).expect("first run");
        assert_eq!(first, 1);

        let second = run_migrations(&conn).expect("second run");
        assert_eq!(second, 0, "second run should apply no migrations");

        let version = current_version(&conn).expect("version query");
        assert_eq!(version, 1);
    }

    #[test]
    fn test_pre_migration_backup_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("test_backup.db");

        let conn = Connection::open(&db_path).expect("open db");
        conn.execute_batch("PRAGMA journal_mode=WAL;").unwrap();

        let applied = run_migrations(&conn).expect("migrations should succeed");
        assert_eq!(applied, 1);

        let backup_path = dir.path().join("test_backup.db.pre-migration.bak");
        assert!(
            backup_path.exists(),
            "pre-migration backup should be created at {}",
            backup_path.display()
        );
    }

    #[test]
    fn test_duplicate_project_rejected_by_schema() {
        let conn = mem_db();
        run_migrations(&conn).expect("migrations");

        conn.execute(
            "INSERT INTO projects (name, owner, created_at) VALUES ('Main St', 'Jane', '2026-01-01')",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO projects (name, owner, created_at) VALUES ('Main St', 'Bob', '2026-01-01')",
            [],
        );
        assert!(dup.is_err(), "duplicate project name must violate the key");
    }

    #[test]
    fn test_location_unique_per_project_and_address() {
        let conn = mem_db();
        run_migrations(&conn).expect("migrations");

        conn.execute(
            "INSERT INTO projects (name, owner, created_at) VALUES ('Main St', 'Jane', '2026-01-01')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO project_locations
             (project_name, address, status, notes, date_added)
             VALUES ('Main St', '12 Elm Ave', 'Not Started', '', '2026-01-01')",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO project_locations
             (project_name, address, status, notes, date_added)
             VALUES ('Main St', '12 Elm Ave', 'Completed', '', '2026-01-02')",
            [],
        );
        assert!(dup.is_err(), "same address under one project must be unique");

        // Same address under a different project is fine
        conn.execute(
            "INSERT INTO projects (name, owner, created_at) VALUES ('Oak Ct', 'Ann', '2026-01-01')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO project_locations
             (project_name, address, status, notes, date_added)
             VALUES ('Oak Ct', '12 Elm Ave', 'Not Started', '', '2026-01-01')",
            [],
        )
        .unwrap();
    }
}
