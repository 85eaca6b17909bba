use std::fmt;
use std::marker::PhantomData;

use serde_json::Value;

use crate::schema::{FieldDescriptor, Record};

use super::database::CatalogDb;
use super::search::{run_search, SearchParameters, SearchResult};
use super::types::{RecordId, StoreError};

pub struct Table<R> {
    name: &'static str,
    db: CatalogDb,
    _marker: PhantomData<fn() -> R>,
}

impl<R> Clone for Table<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            db: self.db.clone(),
            _marker: PhantomData,
        }
    }
}

impl<R> fmt::Debug for Table<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table").field("name", &self.name).finish()
    }
}

impl<R: Record> Table<R> {
    pub(crate) fn new(name: &'static str, db: CatalogDb) -> Self {
        Self {
            name,
            db,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn insert(&self, mut record: R) -> Result<R, StoreError> {
        self.db.write(|state| {
            let rows = state.table_mut(self.name);
            let id = rows.allocate_id();
            record.set_id(RecordId(id));
            let row = self.encode(&record)?;
            rows.put(id, row);
            Ok(record)
        })
    }

    pub fn get(&self, id: RecordId) -> Result<R, StoreError> {
        self.db.read(|state| {
            let row = state
                .table(self.name)
                .and_then(|rows| rows.get(id.0))
                .ok_or(StoreError::NotFound {
                    table: self.name,
                    id,
                })?;
            self.decode(row)
        })
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.db.read(|state| {
            state
                .table(self.name)
                .is_some_and(|rows| rows.contains(id.0))
        })
    }

    pub fn get_all(&self) -> Result<Vec<R>, StoreError> {
        self.db.read(|state| match state.table(self.name) {
            Some(rows) => rows.values().map(|row| self.decode(row)).collect(),
            None => Ok(Vec::new()),
        })
    }

    /// Rows whose `field` holds `id`, in insertion order. Matching happens on
    /// the stored document, so rows of other parents are never decoded.
    pub fn where_eq(&self, field: &str, id: RecordId) -> Result<Vec<R>, StoreError> {
        self.db.read(|state| match state.table(self.name) {
            Some(rows) => rows
                .values()
                .filter(|row| row.get(field).and_then(Value::as_u64) == Some(id.0))
                .map(|row| self.decode(row))
                .collect(),
            None => Ok(Vec::new()),
        })
    }

    pub fn update(&self, id: RecordId, mut record: R) -> Result<R, StoreError> {
        self.db.write(|state| {
            let rows = state.table_mut(self.name);
            if !rows.contains(id.0) {
                return Err(StoreError::NotFound {
                    table: self.name,
                    id,
                });
            }
            record.set_id(id);
            let row = self.encode(&record)?;
            rows.put(id.0, row);
            Ok(record)
        })
    }

    pub fn delete(&self, id: RecordId) -> Result<(), StoreError> {
        self.db.write(|state| {
            state
                .table_mut(self.name)
                .remove(id.0)
                .map(|_| ())
                .ok_or(StoreError::NotFound {
                    table: self.name,
                    id,
                })
        })
    }

    pub fn search(
        &self,
        params: &SearchParameters,
        fields: &[FieldDescriptor],
    ) -> Result<SearchResult<R>, StoreError> {
        Ok(run_search(self.get_all()?, params, fields))
    }

    pub fn search_where(
        &self,
        field: &str,
        id: RecordId,
        params: &SearchParameters,
        fields: &[FieldDescriptor],
    ) -> Result<SearchResult<R>, StoreError> {
        Ok(run_search(self.where_eq(field, id)?, params, fields))
    }

    fn encode(&self, record: &R) -> Result<Value, StoreError> {
        serde_json::to_value(record).map_err(|source| StoreError::Encode {
            table: self.name,
            source,
        })
    }

    fn decode(&self, row: &Value) -> Result<R, StoreError> {
        serde_path_to_error::deserialize(row).map_err(|error| StoreError::Decode {
            table: self.name,
            path: error.path().to_string(),
            message: error.inner().to_string(),
        })
    }
}
