use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::ffi::ErrorCode;
use rusqlite::{Connection, Error as SqliteError, OpenFlags, OptionalExtension};
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};

/// Key holding the JSON array of user-added place names.
pub const USER_LOCATIONS_KEY: &str = "userLocations";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
}

pub struct SqliteStore {
    connection: Mutex<Connection>,
    path: Option<PathBuf>,
    recovered: bool,
}

impl SqliteStore {
    /// Opens (or creates) the store file. A file that is not a readable
    /// database is moved aside and replaced by an empty store.
    pub fn open<P: AsRef<Path>>(data_dir: P, file_name: &str) -> AppResult<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(file_name);

        match establish_connection(&db_path) {
            Ok(connection) => {
                info!(target: "store", path = %db_path.display(), "key-value store opened");
                Ok(Self {
                    connection: Mutex::new(connection),
                    path: Some(db_path),
                    recovered: false,
                })
            }
            Err(AppError::Database(err)) if should_attempt_recovery(&err, &db_path) => {
                warn!(
                    target: "store",
                    path = %db_path.display(),
                    error = %err,
                    "store failed to open, moving it aside"
                );
                move_aside(&db_path)?;
                let connection = establish_connection(&db_path)?;
                Ok(Self {
                    connection: Mutex::new(connection),
                    path: Some(db_path),
                    recovered: true,
                })
            }
            Err(err) => Err(err),
        }
    }

    pub fn in_memory() -> AppResult<Self> {
        let connection = Connection::open_in_memory()?;
        run_migrations(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
            path: None,
            recovered: false,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn recovered(&self) -> bool {
        self.recovered
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.connection.lock();
        conn.query_row(
            "SELECT value FROM kv_entries WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()
        .map_err(AppError::from)
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let conn = self.connection.lock();
        conn.execute(
            "INSERT INTO kv_entries (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            (key, value, now_timestamp()),
        )?;
        Ok(())
    }
}

/// Reads the persisted user list. A value that does not decode loads as an
/// empty list.
pub fn load_user_names(store: &dyn KeyValueStore) -> AppResult<Vec<String>> {
    let Some(raw) = store.get(USER_LOCATIONS_KEY)? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(names) => Ok(names),
        Err(err) => {
            warn!(target: "store", error = ?err, "stored user locations unreadable; starting empty");
            Ok(Vec::new())
        }
    }
}

/// Rewrites the whole user list.
pub fn save_user_names(store: &dyn KeyValueStore, names: &[String]) -> AppResult<()> {
    let serialized = serde_json::to_string(names)?;
    store.set(USER_LOCATIONS_KEY, &serialized)
}

fn establish_connection(db_path: &Path) -> AppResult<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let connection = Connection::open_with_flags(db_path, flags)?;
    connection.execute_batch("PRAGMA journal_mode = WAL;")?;
    run_migrations(&connection)?;
    Ok(connection)
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS kv_entries (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn should_attempt_recovery(err: &SqliteError, db_path: &Path) -> bool {
    if !db_path.exists() {
        return false;
    }

    match err {
        SqliteError::SqliteFailure(code, message) => {
            matches!(code.code, ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt)
                || message
                    .as_deref()
                    .map(|msg| msg.contains("database disk image is malformed"))
                    .unwrap_or(false)
        }
        _ => false,
    }
}

fn move_aside(db_path: &Path) -> AppResult<()> {
    let aside = sibling(db_path, "corrupt");
    std::fs::rename(db_path, &aside)?;
    remove_if_exists(&sibling(db_path, "wal"))?;
    remove_if_exists(&sibling(db_path, "shm"))?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> AppResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(AppError::Io(err)),
    }
}

fn sibling(db_path: &Path, suffix: &str) -> PathBuf {
    let file_name = db_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "store".into());
    db_path.with_file_name(format!("{file_name}-{suffix}"))
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}
