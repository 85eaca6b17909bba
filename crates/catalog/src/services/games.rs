use std::sync::mpsc::Receiver;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CatalogError;
use crate::schema::{
    missing_required_field, FieldDescriptor, FieldType, FieldValue, Record, GAME_ID_FIELD,
};
use crate::selection::{Publisher, SubscriptionId};
use crate::store::{
    CatalogDb, RecordId, SearchParameters, SearchResult, Table, GAMES_TABLE, GAME_CHILD_TABLES,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Game {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Record for Game {
    const KIND: &'static str = "game";

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn field_value(&self, field: &str) -> Option<FieldValue> {
        match field {
            "id" => self.id.map(FieldValue::from),
            "name" => Some(FieldValue::from(self.name.as_str())),
            "description" => Some(FieldValue::from(self.description.as_str())),
            _ => None,
        }
    }
}

pub const GAME_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("id", "ID", FieldType::Number).hidden(),
    FieldDescriptor::new("name", "Name", FieldType::String).required(),
    FieldDescriptor::new("description", "Description", FieldType::String),
];

/// Game CRUD plus the process-wide "selected game". Clones share the same
/// selection.
#[derive(Debug, Clone)]
pub struct GamesService {
    db: CatalogDb,
    table: Table<Game>,
    selected: Publisher<Option<Game>>,
}

impl GamesService {
    pub fn new(db: &CatalogDb) -> Self {
        Self {
            db: db.clone(),
            table: db.table(GAMES_TABLE),
            selected: Publisher::new(None),
        }
    }

    pub fn fields(&self) -> &'static [FieldDescriptor] {
        GAME_FIELDS
    }

    pub fn entity_name(&self, game: &Game) -> String {
        game.name.clone()
    }

    pub fn get(&self, id: RecordId) -> Result<Game, CatalogError> {
        Ok(self.table.get(id)?)
    }

    pub fn get_all(&self) -> Result<Vec<Game>, CatalogError> {
        Ok(self.table.get_all()?)
    }

    pub fn exists(&self, id: RecordId) -> bool {
        self.table.contains(id)
    }

    pub fn search(&self, params: &SearchParameters) -> Result<SearchResult<Game>, CatalogError> {
        Ok(self.table.search(params, GAME_FIELDS)?)
    }

    pub fn create(&self, game: Game) -> Result<Game, CatalogError> {
        validate(&game)?;
        let created = self.table.insert(game)?;
        if let Some(id) = created.id {
            info!(kind = Game::KIND, id = %id, name = %created.name, "catalog_record_created");
        }
        Ok(created)
    }

    pub fn update(&self, id: RecordId, game: Game) -> Result<Game, CatalogError> {
        validate(&game)?;
        let updated = self.table.update(id, game)?;
        info!(kind = Game::KIND, id = %id, "catalog_record_updated");
        if self.selected_id() == Some(id) {
            self.selected.publish(Some(updated.clone()));
        }
        Ok(updated)
    }

    /// Deletes the game with every asset, print template and card it owns,
    /// and clears the selection if it pointed at this game.
    pub fn delete(&self, id: RecordId) -> Result<(), CatalogError> {
        let removed_children =
            self.db
                .delete_cascade(GAMES_TABLE, id, GAME_CHILD_TABLES, GAME_ID_FIELD)?;
        info!(
            kind = Game::KIND,
            id = %id,
            removed_children,
            "catalog_record_deleted"
        );
        if self.selected_id() == Some(id) {
            self.clear_selection();
        }
        Ok(())
    }

    pub fn select(&self, game: Game) {
        info!(
            game_id = game.id.map(|id| id.0),
            name = %game.name,
            "game_selected"
        );
        self.selected.publish(Some(game));
    }

    pub fn select_by_id(&self, id: RecordId) -> Result<Game, CatalogError> {
        let game = self.get(id)?;
        self.select(game.clone());
        Ok(game)
    }

    pub fn clear_selection(&self) {
        info!("game_selection_cleared");
        self.selected.publish(None);
    }

    pub fn selected(&self) -> Option<Game> {
        self.selected.current()
    }

    pub fn selected_id(&self) -> Option<RecordId> {
        self.selected().and_then(|game| game.id)
    }

    pub fn get_selected(&self) -> Receiver<Option<Game>> {
        self.selected.stream()
    }

    pub fn subscribe_selected(
        &self,
        callback: impl FnMut(&Option<Game>) + Send + 'static,
    ) -> SubscriptionId {
        self.selected.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.selected.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.selected.subscriber_count()
    }
}

fn validate(game: &Game) -> Result<(), CatalogError> {
    match missing_required_field(GAME_FIELDS, game) {
        Some(header) => Err(CatalogError::validation(
            Game::KIND,
            format!("{header} is required"),
        )),
        None => Ok(()),
    }
}
