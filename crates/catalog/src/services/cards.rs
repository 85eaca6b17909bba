use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CatalogError;
use crate::schema::{ChildRecord, FieldDescriptor, FieldType, FieldValue, Record};
use crate::store::{CatalogDb, RecordId, SearchParameters, SearchResult, CARDS_TABLE};

use super::games::GamesService;
use super::scoped::{DisplayName, ScopedStore};

fn default_count() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<RecordId>,
    pub name: String,
    /// Copies wanted when printing.
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub description: String,
}

impl Card {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            game_id: None,
            name: name.into(),
            count: default_count(),
            description: String::new(),
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Record for Card {
    const KIND: &'static str = "card";

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn field_value(&self, field: &str) -> Option<FieldValue> {
        match field {
            "id" => self.id.map(FieldValue::from),
            "gameId" => self.game_id.map(FieldValue::from),
            "name" => Some(FieldValue::from(self.name.as_str())),
            "count" => Some(FieldValue::Number(f64::from(self.count))),
            "description" => Some(FieldValue::from(self.description.as_str())),
            _ => None,
        }
    }
}

impl ChildRecord for Card {
    fn game_id(&self) -> Option<RecordId> {
        self.game_id
    }

    fn set_game_id(&mut self, game_id: RecordId) {
        self.game_id = Some(game_id);
    }
}

pub const CARD_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("id", "ID", FieldType::Number).hidden(),
    FieldDescriptor::new("gameId", "Game ID", FieldType::Number).hidden(),
    FieldDescriptor::new("name", "Name", FieldType::String).required(),
    FieldDescriptor::new("count", "Count", FieldType::Number),
    FieldDescriptor::new("description", "Description", FieldType::String),
];

#[derive(Debug, Clone)]
pub struct CardsService {
    store: ScopedStore<Card>,
}

impl CardsService {
    pub fn new(db: &CatalogDb, games: &GamesService) -> Self {
        Self {
            store: ScopedStore::new(
                db.table(CARDS_TABLE),
                games.clone(),
                CARD_FIELDS,
                Arc::new(DisplayName::new(|card: &Card| card.name.clone())),
            ),
        }
    }

    pub fn fields(&self) -> &'static [FieldDescriptor] {
        self.store.fields()
    }

    pub fn entity_name(&self, card: &Card) -> String {
        self.store.entity_name(card)
    }

    pub fn get(&self, id: RecordId) -> Result<Card, CatalogError> {
        self.store.get(id)
    }

    pub fn get_all(&self) -> Result<Vec<Card>, CatalogError> {
        self.store.get_all()
    }

    pub fn search(&self, params: &SearchParameters) -> Result<SearchResult<Card>, CatalogError> {
        self.store.search(params)
    }

    pub fn create(&self, card: Card) -> Result<Card, CatalogError> {
        self.store.create(card)
    }

    pub fn update(&self, id: RecordId, card: Card) -> Result<Card, CatalogError> {
        self.store.update(id, card)
    }

    pub fn delete(&self, id: RecordId) -> Result<(), CatalogError> {
        self.store.delete(id)
    }

    pub fn export_selection(&self) -> Result<Vec<Card>, CatalogError> {
        self.get_all()
    }

    /// Print sheet order: each card repeated `count` times, cards kept in the
    /// given order. Cards with a count of zero are left out.
    pub fn expand_for_print(&self, cards: &[Card]) -> Vec<Card> {
        let sheet = cards
            .iter()
            .flat_map(|card| std::iter::repeat(card).take(card.count as usize))
            .cloned()
            .collect::<Vec<_>>();
        debug!(
            card_count = cards.len(),
            copy_count = sheet.len(),
            "cards_expanded_for_print"
        );
        sheet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_count_defaults_to_one() {
        let card: Card = serde_json::from_str(r#"{"id":3,"gameId":1,"name":"Scout"}"#)
            .expect("decode");
        assert_eq!(card.count, 1);
        assert_eq!(card.id, Some(RecordId(3)));
    }

    #[test]
    fn expand_repeats_by_count_in_order() {
        let games = GamesService::new(&CatalogDb::in_memory());
        let cards = CardsService::new(&CatalogDb::in_memory(), &games);
        let sheet = cards.expand_for_print(&[
            Card::new("A").with_count(2),
            Card::new("B").with_count(0),
            Card::new("C"),
        ]);

        let names = sheet.iter().map(|card| card.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["A", "A", "C"]);
    }
}
