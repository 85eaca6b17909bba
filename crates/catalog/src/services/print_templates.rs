use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::schema::{ChildRecord, FieldDescriptor, FieldType, FieldValue, Record};
use crate::store::{CatalogDb, RecordId, SearchParameters, SearchResult, PRINT_TEMPLATES_TABLE};

use super::games::GamesService;
use super::scoped::{DisplayName, ScopedStore};

/// HTML and CSS used to lay out a game's cards for printing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<RecordId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub css: String,
}

impl PrintTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_markup(mut self, html: impl Into<String>, css: impl Into<String>) -> Self {
        self.html = html.into();
        self.css = css.into();
        self
    }
}

impl Record for PrintTemplate {
    const KIND: &'static str = "print_template";

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
            "description" => Some(FieldValue::from(self.description.as_str())),
            "html" => Some(FieldValue::from(self.html.as_str())),
            "css" => Some(FieldValue::from(self.css.as_str())),
            _ => None,
        }
    }
}

impl ChildRecord for PrintTemplate {
    fn game_id(&self) -> Option<RecordId> {
        self.game_id
    }

    fn set_game_id(&mut self, game_id: RecordId) {
        self.game_id = Some(game_id);
    }
}

pub const PRINT_TEMPLATE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("id", "ID", FieldType::Number).hidden(),
    FieldDescriptor::new("gameId", "Game ID", FieldType::Number),
    FieldDescriptor::new("name", "Name", FieldType::String).required(),
    FieldDescriptor::new("description", "Description", FieldType::String),
    FieldDescriptor::new("html", "HTML", FieldType::String),
    FieldDescriptor::new("css", "CSS", FieldType::String),
];

#[derive(Debug, Clone)]
pub struct PrintTemplatesService {
    store: ScopedStore<PrintTemplate>,
}

impl PrintTemplatesService {
    pub fn new(db: &CatalogDb, games: &GamesService) -> Self {
        Self {
            store: ScopedStore::new(
                db.table(PRINT_TEMPLATES_TABLE),
                games.clone(),
                PRINT_TEMPLATE_FIELDS,
                Arc::new(DisplayName::new(|template: &PrintTemplate| {
                    template.name.clone()
                })),
            ),
        }
    }

    pub fn fields(&self) -> &'static [FieldDescriptor] {
        self.store.fields()
    }

    pub fn entity_name(&self, template: &PrintTemplate) -> String {
        self.store.entity_name(template)
    }

    pub fn get(&self, id: RecordId) -> Result<PrintTemplate, CatalogError> {
        self.store.get(id)
    }

    pub fn get_all(&self) -> Result<Vec<PrintTemplate>, CatalogError> {
        self.store.get_all()
    }

    pub fn search(
        &self,
        params: &SearchParameters,
    ) -> Result<SearchResult<PrintTemplate>, CatalogError> {
        self.store.search(params)
    }

    pub fn create(&self, template: PrintTemplate) -> Result<PrintTemplate, CatalogError> {
        self.store.create(template)
    }

    pub fn update(
        &self,
        id: RecordId,
        template: PrintTemplate,
    ) -> Result<PrintTemplate, CatalogError> {
        self.store.update(id, template)
    }

    pub fn delete(&self, id: RecordId) -> Result<(), CatalogError> {
        self.store.delete(id)
    }
}
