//! Generic CRUD for records owned by the selected game.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::CatalogError;
use crate::schema::{
    find_field, missing_required_field, ChildRecord, FieldDescriptor, GAME_ID_FIELD,
};
use crate::store::{RecordId, SearchParameters, SearchResult, Table};

use super::games::GamesService;

pub trait EntityHooks<R>: Send + Sync {
    fn before_write(&self, record: R) -> Result<R, CatalogError> {
        Ok(record)
    }

    fn after_read(&self, record: R) -> R {
        record
    }

    fn entity_name(&self, record: &R) -> String;
}

pub struct DisplayName<R> {
    accessor: fn(&R) -> String,
    _marker: PhantomData<fn(&R)>,
}

impl<R> DisplayName<R> {
    pub fn new(accessor: fn(&R) -> String) -> Self {
        Self {
            accessor,
            _marker: PhantomData,
        }
    }
}

impl<R> EntityHooks<R> for DisplayName<R> {
    fn entity_name(&self, record: &R) -> String {
        (self.accessor)(record)
    }
}

/// CRUD and search over one child table, always scoped to the game that is
/// selected in [`GamesService`] at the time of the call.
pub struct ScopedStore<R> {
    table: Table<R>,
    games: GamesService,
    fields: &'static [FieldDescriptor],
    hooks: Arc<dyn EntityHooks<R>>,
}

impl<R> Clone for ScopedStore<R> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            games: self.games.clone(),
            fields: self.fields,
            hooks: Arc::clone(&self.hooks),
        }
    }
}

impl<R> fmt::Debug for ScopedStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedStore")
            .field("table", &self.table)
            .field("fields", &self.fields.len())
            .finish()
    }
}

impl<R: ChildRecord> ScopedStore<R> {
    pub fn new(
        table: Table<R>,
        games: GamesService,
        fields: &'static [FieldDescriptor],
        hooks: Arc<dyn EntityHooks<R>>,
    ) -> Self {
        Self {
            table,
            games,
            fields,
            hooks,
        }
    }

    pub fn fields(&self) -> &'static [FieldDescriptor] {
        self.fields
    }

    pub fn games(&self) -> &GamesService {
        &self.games
    }

    pub fn entity_name(&self, record: &R) -> String {
        self.hooks.entity_name(record)
    }

    pub fn get(&self, id: RecordId) -> Result<R, CatalogError> {
        let record = self.table.get(id)?;
        Ok(self.hooks.after_read(record))
    }

    pub fn get_all(&self) -> Result<Vec<R>, CatalogError> {
        let Some(game_id) = self.games.selected_id() else {
            debug!(kind = R::KIND, "scoped_get_all_without_selection");
            return Ok(Vec::new());
        };
        let records = self.table.where_eq(GAME_ID_FIELD, game_id)?;
        Ok(records
            .into_iter()
            .map(|record| self.hooks.after_read(record))
            .collect())
    }

    pub fn search(&self, params: &SearchParameters) -> Result<SearchResult<R>, CatalogError> {
        if let Some(order) = &params.sort {
            if find_field(self.fields, &order.field).is_none() {
                return Err(CatalogError::validation(
                    R::KIND,
                    format!("unknown sort field '{}'", order.field),
                ));
            }
        }
        let Some(game_id) = self.games.selected_id() else {
            return Ok(SearchResult::empty());
        };
        let result = self
            .table
            .search_where(GAME_ID_FIELD, game_id, params, self.fields)?;
        Ok(result.map(|record| self.hooks.after_read(record)))
    }

    pub fn create(&self, mut record: R) -> Result<R, CatalogError> {
        let game_id = self.current_game_id()?;
        record.set_game_id(game_id);
        self.validate(&record)?;

        let record = self.hooks.before_write(record)?;
        let created = self.table.insert(record)?;
        if let Some(id) = created.id() {
            info!(
                kind = R::KIND,
                id = %id,
                game_id = %game_id,
                "catalog_record_created"
            );
        }
        Ok(self.hooks.after_read(created))
    }

    pub fn update(&self, id: RecordId, mut record: R) -> Result<R, CatalogError> {
        let existing = self.table.get(id)?;
        let game_id = self.current_game_id()?;
        if existing.game_id() != Some(game_id) {
            return Err(CatalogError::validation(
                R::KIND,
                format!("{} {id} does not belong to game {game_id}", R::KIND),
            ));
        }
        record.set_game_id(game_id);
        self.validate(&record)?;

        let record = self.hooks.before_write(record)?;
        let updated = self.table.update(id, record)?;
        info!(
            kind = R::KIND,
            id = %id,
            game_id = %game_id,
            "catalog_record_updated"
        );
        Ok(self.hooks.after_read(updated))
    }

    /// Deleting an id that is already gone is `NotFound`, not a no-op.
    pub fn delete(&self, id: RecordId) -> Result<(), CatalogError> {
        self.table.delete(id)?;
        info!(kind = R::KIND, id = %id, "catalog_record_deleted");
        Ok(())
    }

    fn current_game_id(&self) -> Result<RecordId, CatalogError> {
        let game_id = self
            .games
            .selected_id()
            .ok_or_else(|| CatalogError::validation(R::KIND, "no game is selected"))?;
        if !self.games.exists(game_id) {
            return Err(CatalogError::validation(
                R::KIND,
                format!("selected game {game_id} does not exist"),
            ));
        }
        Ok(game_id)
    }

    fn validate(&self, record: &R) -> Result<(), CatalogError> {
        match missing_required_field(self.fields, record) {
            Some(header) => Err(CatalogError::validation(
                R::KIND,
                format!("{header} is required"),
            )),
            None => Ok(()),
        }
    }
}
