use rusqlite::{params, Connection};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::data::{CatalogEntry, InitReport};
use crate::error::{CatalogError, Result};
use crate::scan;

/// Schema of the single catalog table.
/// Kept untyped and index-free so existing catalog files stay readable.
pub const IMAGES_TABLE_SQL: &str = "CREATE TABLE images (filepath TEXT, result TEXT)";

/// The Registry owns the SQLite catalog file.
/// It records one row per image path, with a result column for line-finder output.
///
/// A registry starts closed. Data operations on a closed registry return
/// `CatalogError::NotOpen` and touch nothing on disk.
#[derive(Default)]
pub struct Registry {
    conn: Option<Connection>,
    db_path: Option<PathBuf>,
}

impl Registry {
    /// Create a registry with no database open
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or create) the database at `path`.
    ///
    /// Any previously open connection is dropped and replaced. The schema is
    /// not checked here; `init` creates it.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Ensure the parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
            }
        }

        let conn = Connection::open(path)?;

        self.conn = Some(conn);
        self.db_path = Some(path.to_path_buf());

        info!(db = %path.display(), "📁 database opened");
        Ok(())
    }

    /// Release the connection and forget the path
    pub fn close(&mut self) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            warn!("no database open");
            return Err(CatalogError::NotOpen);
        };

        if !conn.is_autocommit() {
            warn!("closing with uncommitted images, they are discarded");
        }

        if let Err((conn, e)) = conn.close() {
            // Connection is still usable, keep it
            self.conn = Some(conn);
            warn!(error = %e, "failed to close database");
            return Err(e.into());
        }

        if let Some(path) = self.db_path.take() {
            debug!(db = %path.display(), "database closed");
        }
        Ok(())
    }

    /// Whether a connection is currently held
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Get the path to the open database file
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn connection(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(CatalogError::NotOpen)
    }

    /// Whether rows added since the last commit are still waiting
    pub fn has_pending(&self) -> bool {
        self.conn.as_ref().is_some_and(|conn| !conn.is_autocommit())
    }

    /// Insert one image path with an empty result.
    ///
    /// The path is bound as a parameter, never spliced into SQL. The row is
    /// not committed: the first add opens a transaction that stays open until
    /// `commit` or `rollback`. Closing with rows pending discards them.
    pub fn add(&self, filepath: &str) -> Result<()> {
        let conn = self.connection().map_err(|e| {
            warn!(filepath, "no database open to add image");
            e
        })?;

        let began = conn.is_autocommit();
        if began {
            conn.execute_batch("BEGIN")?;
        }

        if let Err(e) = conn.execute(
            "INSERT INTO images (filepath, result) VALUES (?1, NULL)",
            params![filepath],
        ) {
            // Don't leave an empty transaction behind for a failed first add
            if began {
                let _ = conn.execute_batch("ROLLBACK");
            }
            return Err(e.into());
        }

        debug!(filepath, "image added");
        Ok(())
    }

    /// Commit every row added since the last commit.
    /// Nothing pending is not an error.
    pub fn commit(&self) -> Result<()> {
        let conn = self.connection().map_err(|e| {
            warn!("no database open to commit");
            e
        })?;

        if conn.is_autocommit() {
            debug!("nothing to commit");
            return Ok(());
        }

        conn.execute_batch("COMMIT")?;
        debug!("catalog changes committed");
        Ok(())
    }

    /// Discard every row added since the last commit
    pub fn rollback(&self) -> Result<()> {
        let conn = self.connection()?;

        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
            debug!("catalog changes rolled back");
        }
        Ok(())
    }

    /// Rebuild the catalog from every image under `folder`.
    ///
    /// The backing file is deleted and recreated, the table is created, and
    /// all discovered paths are added and committed once at the end. If
    /// `folder` is not a directory nothing on disk changes. A folder with no
    /// images leaves an empty table and reports a zero count.
    pub fn init(&mut self, folder: &Path) -> Result<InitReport> {
        if !folder.is_dir() {
            warn!(folder = %folder.display(), "invalid top level folder");
            return Err(CatalogError::InvalidFolder(folder.to_path_buf()));
        }

        let db_path = match (&self.conn, &self.db_path) {
            (Some(_), Some(path)) => path.clone(),
            _ => {
                warn!(folder = %folder.display(), "init image db failed, no database open");
                return Err(CatalogError::NotOpen);
            }
        };

        // Walk before destroying anything so a failed scan leaves the old catalog
        let image_paths = scan::scan(folder)?;

        self.recreate_file(&db_path, |path| fs::remove_file(path))?;

        self.connection()?.execute(IMAGES_TABLE_SQL, [])?;
        info!(db = %db_path.display(), "✅ images table created");

        if image_paths.is_empty() {
            return Ok(InitReport { image_count: 0 });
        }

        for image in &image_paths {
            if let Err(e) = self.add(&image.to_string_lossy()) {
                let _ = self.rollback();
                return Err(e);
            }
        }
        self.commit()?;

        info!(count = image_paths.len(), "✅ catalog initialized");

        Ok(InitReport {
            image_count: image_paths.len(),
        })
    }

    /// Close, delete and reopen the backing file.
    ///
    /// If the old file cannot be deleted the registry reconnects to it, so a
    /// failure leaves the previous catalog open and usable. The path is kept
    /// through every failure so the caller can retry `open`.
    fn recreate_file(
        &mut self,
        db_path: &Path,
        remove: impl FnOnce(&Path) -> io::Result<()>,
    ) -> Result<()> {
        self.close()?;
        self.db_path = Some(db_path.to_path_buf());

        match remove(db_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(db = %db_path.display(), error = %e, "could not delete old catalog");
                self.open(db_path)?;
                return Err(CatalogError::io(db_path, e));
            }
        }

        self.open(db_path)
    }

    /// Get a count of images in the catalog
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .connection()?
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Get all catalog rows in insertion order
    pub fn entries(&self) -> Result<Vec<CatalogEntry>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT filepath, result FROM images ORDER BY rowid")?;

        let entry_iter = stmt.query_map([], |row| {
            Ok(CatalogEntry {
                filepath: row.get(0)?,
                result: row.get(1)?,
            })
        })?;

        let mut entries = Vec::new();
        for entry in entry_iter {
            entries.push(entry?);
        }

        Ok(entries)
    }

    /// Store line-finder output for an image.
    /// Returns the number of rows updated (0 if the path is not catalogued).
    pub fn set_result(&self, filepath: &str, result: &str) -> Result<usize> {
        let updated = self.connection()?.execute(
            "UPDATE images SET result = ?1 WHERE filepath = ?2",
            params![result, filepath],
        )?;

        if updated == 0 {
            warn!(filepath, "no catalog row to record result for");
        }
        Ok(updated)
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("db_path", &self.db_path)
            .field("open", &self.conn.is_some())
            .finish()
    }
}
