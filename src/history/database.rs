// SQLite schema/bootstrap and render history persistence routines.
use super::*;

pub(super) fn database_path(app: &AppHandle) -> Result<PathBuf, String> {
    let data_dir = app
        .path()
        .app_data_dir()
        .map_err(|error| format!("Failed to resolve app data dir: {error}"))?;
    std::fs::create_dir_all(&data_dir)
        .map_err(|error| format!("Failed to create data dir: {error}"))?;
    Ok(data_dir.join(DATABASE_FILE_NAME))
}

pub(super) fn initialize_database(connection: &Connection) -> Result<(), String> {
    connection
        .execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS renders (
                id TEXT PRIMARY KEY NOT NULL,
                created_at_unix INTEGER NOT NULL,
                kind TEXT NOT NULL,
                source TEXT NOT NULL,
                output_path TEXT NOT NULL,
                format TEXT NOT NULL,
                trim_start REAL NOT NULL DEFAULT 0,
                pad_start REAL NOT NULL DEFAULT 0,
                with_audio INTEGER NOT NULL DEFAULT 0,
                duration_seconds INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_renders_created
              ON renders(created_at_unix DESC);
            "#,
        )
        .map_err(|error| format!("Failed to apply database schema: {error}"))?;
    ensure_render_optional_columns(connection)?;
    Ok(())
}

pub(super) fn open_database(app: &AppHandle) -> Result<Connection, String> {
    let db_path = database_path(app)?;
    let connection = Connection::open(&db_path)
        .map_err(|error| format!("Failed to open database {db_path:?}: {error}"))?;

    connection
        .execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )
        .map_err(|error| format!("Failed to apply database PRAGMAs: {error}"))?;

    let bootstrap_state = DB_BOOTSTRAP_STATE.get_or_init(|| Mutex::new(false));
    let mut initialized = bootstrap_state
        .lock()
        .map_err(|_| "Failed to acquire DB bootstrap lock.".to_string())?;
    if !*initialized {
        initialize_database(&connection)?;
        *initialized = true;
    }

    Ok(connection)
}

pub(super) fn ensure_render_optional_columns(connection: &Connection) -> Result<(), String> {
    let alter_statements = ["ALTER TABLE renders ADD COLUMN duration_seconds INTEGER"];

    for sql in alter_statements {
        if let Err(error) = connection.execute(sql, []) {
            let message = error.to_string().to_lowercase();
            if !message.contains("duplicate column name") {
                return Err(format!("Failed to migrate renders schema: {error}"));
            }
        }
    }

    Ok(())
}

pub(super) fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<RenderEntry> {
    Ok(RenderEntry {
        id: row.get("id")?,
        created_at_unix: row.get("created_at_unix")?,
        kind: row.get("kind")?,
        source: row.get("source")?,
        output_path: row.get("output_path")?,
        format: row.get("format")?,
        trim_start: row.get("trim_start")?,
        pad_start: row.get("pad_start")?,
        with_audio: row.get::<_, i64>("with_audio")? != 0,
        duration_seconds: row
            .get::<_, Option<i64>>("duration_seconds")?
            .map(|value| value.max(0) as u32),
    })
}

pub(super) fn load_entries(connection: &Connection, limit: usize) -> Result<Vec<RenderEntry>, String> {
    let mut statement = connection
        .prepare(
            r#"
            SELECT
              id, created_at_unix, kind, source, output_path, format,
              trim_start, pad_start, with_audio, duration_seconds
            FROM renders
            ORDER BY created_at_unix DESC
            LIMIT ?1
            "#,
        )
        .map_err(|error| format!("Failed to prepare history query: {error}"))?;

    let rows = statement
        .query_map([limit as i64], row_to_entry)
        .map_err(|error| format!("Failed to load render history: {error}"))?;

    let mut entries: Vec<RenderEntry> = Vec::new();
    for row in rows {
        entries.push(row.map_err(|error| format!("Failed to read history row: {error}"))?);
    }
    Ok(entries)
}

pub(super) fn insert_entry(connection: &Connection, entry: &RenderEntry) -> Result<(), String> {
    connection
        .execute(
            r#"
            INSERT INTO renders (
              id, created_at_unix, kind, source, output_path, format,
              trim_start, pad_start, with_audio, duration_seconds
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                entry.id,
                entry.created_at_unix,
                entry.kind,
                entry.source,
                entry.output_path,
                entry.format,
                entry.trim_start,
                entry.pad_start,
                entry.with_audio as i64,
                entry.duration_seconds.map(|value| value as i64),
            ],
        )
        .map_err(|error| format!("Failed to record render entry: {error}"))?;
    Ok(())
}

pub(super) fn delete_entry(connection: &Connection, entry_id: &str) -> Result<bool, String> {
    let affected = connection
        .execute("DELETE FROM renders WHERE id = ?1", [entry_id])
        .map_err(|error| format!("Failed to delete render entry: {error}"))?;
    Ok(affected > 0)
}

pub(super) fn clear_entries(connection: &Connection) -> Result<u32, String> {
    let affected = connection
        .execute("DELETE FROM renders", [])
        .map_err(|error| format!("Failed to clear render history: {error}"))?;
    Ok(affected as u32)
}

pub(super) fn output_dir_is_recorded(
    connection: &Connection,
    target_dir: &Path,
) -> Result<bool, String> {
    let mut statement = connection
        .prepare("SELECT output_path FROM renders ORDER BY created_at_unix DESC LIMIT ?1")
        .map_err(|error| format!("Failed to prepare history query: {error}"))?;
    let rows = statement
        .query_map([HISTORY_LIMIT as i64], |row| row.get::<_, String>(0))
        .map_err(|error| format!("Failed to load render history: {error}"))?;

    for row in rows {
        let output_path =
            row.map_err(|error| format!("Failed to read history row: {error}"))?;
        let recorded_dir = Path::new(&output_path).parent();
        if recorded_dir == Some(target_dir) {
            return Ok(true);
        }
    }
    Ok(false)
}

pub(super) fn validate_kind(value: &str) -> Result<String, String> {
    let normalized = value.trim().to_lowercase();
    if normalized == "download" || normalized == "adjust" {
        Ok(normalized)
    } else {
        Err("Invalid render kind.".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_database() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize_database(&connection).unwrap();
        connection
    }

    fn sample_entry(id: &str, created_at_unix: i64, output_path: &str) -> RenderEntry {
        RenderEntry {
            id: id.to_string(),
            created_at_unix,
            kind: "download".to_string(),
            source: "https://youtu.be/abc".to_string(),
            output_path: output_path.to_string(),
            format: "webm".to_string(),
            trim_start: 0.0,
            pad_start: 1.5,
            with_audio: false,
            duration_seconds: Some(213),
        }
    }

    #[test]
    fn schema_bootstrap_is_idempotent() {
        let connection = open_test_database();
        initialize_database(&connection).unwrap();
        assert!(load_entries(&connection, 10).unwrap().is_empty());
    }

    #[test]
    fn entries_round_trip_newest_first() {
        let connection = open_test_database();
        insert_entry(&connection, &sample_entry("r1", 100, "/songs/a/video.webm")).unwrap();
        insert_entry(&connection, &sample_entry("r2", 200, "/songs/b/video.webm")).unwrap();

        let entries = load_entries(&connection, 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "r2");
        assert_eq!(entries[1].id, "r1");
        assert_eq!(entries[1].pad_start, 1.5);
        assert_eq!(entries[1].duration_seconds, Some(213));
        assert!(!entries[1].with_audio);
    }

    #[test]
    fn load_respects_the_limit() {
        let connection = open_test_database();
        for index in 0..5 {
            insert_entry(
                &connection,
                &sample_entry(&format!("r{index}"), index, "/songs/a/video.webm"),
            )
            .unwrap();
        }
        assert_eq!(load_entries(&connection, 3).unwrap().len(), 3);
    }

    #[test]
    fn delete_reports_whether_a_row_was_removed() {
        let connection = open_test_database();
        insert_entry(&connection, &sample_entry("r1", 100, "/songs/a/video.webm")).unwrap();
        assert!(delete_entry(&connection, "r1").unwrap());
        assert!(!delete_entry(&connection, "r1").unwrap());
        assert!(load_entries(&connection, 10).unwrap().is_empty());
    }

    #[test]
    fn clear_removes_everything() {
        let connection = open_test_database();
        insert_entry(&connection, &sample_entry("r1", 100, "/songs/a/video.webm")).unwrap();
        insert_entry(&connection, &sample_entry("r2", 200, "/songs/b/video.webm")).unwrap();
        assert_eq!(clear_entries(&connection).unwrap(), 2);
        assert!(load_entries(&connection, 10).unwrap().is_empty());
    }

    #[test]
    fn recorded_output_dirs_match_by_parent() {
        let connection = open_test_database();
        insert_entry(&connection, &sample_entry("r1", 100, "/songs/a/video.webm")).unwrap();
        assert!(output_dir_is_recorded(&connection, Path::new("/songs/a")).unwrap());
        assert!(!output_dir_is_recorded(&connection, Path::new("/songs/b")).unwrap());
    }

    #[test]
    fn kinds_are_restricted() {
        assert_eq!(validate_kind("Download").unwrap(), "download");
        assert_eq!(validate_kind(" adjust ").unwrap(), "adjust");
        assert!(validate_kind("export").is_err());
    }
}
