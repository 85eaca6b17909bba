use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::schema::Record;

use super::snapshot::{read_snapshot, write_snapshot};
use super::table::Table;
use super::types::{RecordId, StoreError};

static DB_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_db_lock_poison_once(operation: &'static str) {
    if DB_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "catalog db lock poisoned; recovered inner value");
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct DbState {
    tables: BTreeMap<String, TableRows>,
}

impl DbState {
    pub(crate) fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub(crate) fn table(&self, name: &str) -> Option<&TableRows> {
        self.tables.get(name)
    }

    pub(crate) fn table_mut(&mut self, name: &str) -> &mut TableRows {
        self.tables.entry(name.to_string()).or_default()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TableRows {
    next_id: u64,
    rows: BTreeMap<u64, Value>,
}

impl TableRows {
    pub(crate) fn allocate_id(&mut self) -> u64 {
        self.next_id = self.next_id.saturating_add(1);
        self.next_id
    }

    pub(crate) fn put(&mut self, id: u64, row: Value) {
        self.rows.insert(id, row);
    }

    pub(crate) fn get(&self, id: u64) -> Option<&Value> {
        self.rows.get(&id)
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.rows.contains_key(&id)
    }

    pub(crate) fn remove(&mut self, id: u64) -> Option<Value> {
        self.rows.remove(&id)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Value> {
        self.rows.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    fn retain(&mut self, mut keep: impl FnMut(&Value) -> bool) -> usize {
        let before = self.rows.len();
        self.rows.retain(|_, row| keep(row));
        before - self.rows.len()
    }
}

#[derive(Debug, Clone)]
pub struct CatalogDb {
    state: Arc<RwLock<DbState>>,
    path: Option<Arc<PathBuf>>,
}

impl CatalogDb {
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(RwLock::new(DbState::default())),
            path: None,
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            read_snapshot(&path)?
        } else {
            DbState::default()
        };
        info!(
            path = %path.display(),
            table_count = state.table_count(),
            "catalog_db_opened"
        );
        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            path: Some(Arc::new(path)),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    pub fn table<R: Record>(&self, name: &'static str) -> Table<R> {
        Table::new(name, self.clone())
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.read(|state| state.table(table).map_or(0, TableRows::len))
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        let guard = self.read_guard();
        self.persist(&*guard)
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&DbState) -> T) -> T {
        let guard = self.read_guard();
        f(&*guard)
    }

    /// `f` runs against a staged copy; the shared state only changes once
    /// `f` succeeds and the snapshot is written.
    pub(crate) fn write<T>(
        &self,
        f: impl FnOnce(&mut DbState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.write_guard();
        let mut staged = guard.clone();
        let out = f(&mut staged)?;
        self.persist(&staged)?;
        *guard = staged;
        Ok(out)
    }

    /// Removes row `id` of `table` together with every row of `children`
    /// whose `field` holds `id`, in one write. Returns the child count.
    pub(crate) fn delete_cascade(
        &self,
        table: &'static str,
        id: RecordId,
        children: &[&'static str],
        field: &str,
    ) -> Result<usize, StoreError> {
        self.write(|state| {
            state
                .table_mut(table)
                .remove(id.0)
                .ok_or(StoreError::NotFound { table, id })?;
            let mut removed = 0usize;
            for child in children {
                removed += state
                    .table_mut(child)
                    .retain(|row| row.get(field).and_then(Value::as_u64) != Some(id.0));
            }
            Ok(removed)
        })
    }

    fn persist(&self, state: &DbState) -> Result<(), StoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        write_snapshot(path, state)?;
        debug!(path = %path.display(), "catalog_db_snapshot_written");
        Ok(())
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, DbState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn_db_lock_poison_once("read");
                poisoned.into_inner()
            }
        }
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, DbState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn_db_lock_poison_once("write");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn reopened_file_db_sees_previous_writes() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("catalog.db");

        let db = CatalogDb::open(&path).expect("open");
        db.write(|state| {
            let rows = state.table_mut("games");
            let id = rows.allocate_id();
            rows.put(id, json!({"id": id, "name": "Deck Builder"}));
            Ok(())
        })
        .expect("write");
        drop(db);

        let reopened = CatalogDb::open(&path).expect("reopen");
        assert_eq!(reopened.row_count("games"), 1);
    }

    #[test]
    fn opening_missing_file_does_not_create_it() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("fresh.db");

        let db = CatalogDb::open(&path).expect("open");
        assert_eq!(db.row_count("games"), 0);
        assert!(!path.exists());
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let db = CatalogDb::in_memory();
        let (first, second) = db
            .write(|state| {
                let rows = state.table_mut("cards");
                let first = rows.allocate_id();
                rows.put(first, json!({"id": first}));
                rows.remove(first);
                Ok((first, rows.allocate_id()))
            })
            .expect("write");
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn cascade_removes_parent_and_matching_children_only() {
        let db = CatalogDb::in_memory();
        db.write(|state| {
            state.table_mut("games").put(1, json!({"id": 1}));
            let rows = state.table_mut("cards");
            rows.put(1, json!({"id": 1, "gameId": 1}));
            rows.put(2, json!({"id": 2, "gameId": 2}));
            rows.put(3, json!({"id": 3, "gameId": 1}));
            Ok(())
        })
        .expect("seed");

        let removed = db
            .delete_cascade("games", RecordId(1), &["cards", "assets"], "gameId")
            .expect("cascade");
        assert_eq!(removed, 2);
        assert_eq!(db.row_count("games"), 0);
        assert_eq!(db.row_count("cards"), 1);

        let missing = db
            .delete_cascade("games", RecordId(1), &["cards"], "gameId")
            .expect_err("already gone");
        assert!(matches!(missing, StoreError::NotFound { .. }));
    }

    #[test]
    fn failed_snapshot_write_leaves_state_untouched() {
        let temp = TempDir::new().expect("temp");
        let blocker = temp.path().join("sub");
        let db = CatalogDb::open(blocker.join("catalog.db")).expect("open");
        std::fs::write(&blocker, b"not a directory").expect("block snapshot dir");

        let error = db
            .write(|state| {
                let rows = state.table_mut("games");
                let id = rows.allocate_id();
                rows.put(id, json!({"id": id, "name": "Ghost"}));
                Ok(id)
            })
            .expect_err("snapshot blocked");
        assert!(matches!(error, StoreError::Snapshot(_)));
        assert_eq!(db.row_count("games"), 0);

        std::fs::remove_file(&blocker).expect("unblock");
        let id = db
            .write(|state| Ok(state.table_mut("games").allocate_id()))
            .expect("write after unblock");
        assert_eq!(id, 1);
    }

    #[test]
    fn failed_closure_discards_partial_changes() {
        let db = CatalogDb::in_memory();
        let result: Result<(), StoreError> = db.write(|state| {
            state.table_mut("cards").put(1, json!({"id": 1}));
            Err(StoreError::NotFound {
                table: "cards",
                id: RecordId(9),
            })
        });
        assert!(result.is_err());
        assert_eq!(db.row_count("cards"), 0);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let db = CatalogDb::in_memory();
        let state = Arc::clone(&db.state);
        let _ = thread::spawn(move || {
            let _guard = state.write().expect("write guard");
            panic!("poison catalog lock");
        })
        .join();

        assert_eq!(db.row_count("games"), 0);
        db.write(|state| {
            state.table_mut("games").put(1, json!({"id": 1}));
            Ok(())
        })
        .expect("write after poison");
        assert_eq!(db.row_count("games"), 1);
    }
}
