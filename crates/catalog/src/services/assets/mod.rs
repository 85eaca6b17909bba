mod codec;
mod urls;

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Weak};

use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use tracing::warn;

use crate::error::CatalogError;
use crate::schema::{ChildRecord, FieldDescriptor, FieldType, FieldValue, Record};
use crate::selection::SubscriptionId;
use crate::store::{CatalogDb, RecordId, SearchParameters, SearchResult, ASSETS_TABLE};

use super::games::GamesService;
use super::scoped::{EntityHooks, ScopedStore};

pub use codec::{to_at_rest, to_live, AssetPayload, BinarySource, MemoryFile, PathSource};
pub use urls::{normalize_asset_name, AssetUrlCache, AssetUrls, HandleRegistry, ResourceHandle};

#[derive(Debug, Clone, Deserialize)]
#[serde(from = "AssetRow")]
pub struct Asset {
    pub id: Option<RecordId>,
    pub game_id: Option<RecordId>,
    pub name: String,
    pub file: Option<AssetPayload>,
}

impl Asset {
    pub fn new(name: impl Into<String>, file: AssetPayload) -> Self {
        Self {
            id: None,
            game_id: None,
            name: name.into(),
            file: Some(file),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetRowRef<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    game_id: Option<RecordId>,
    name: &'a str,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "codec::serialize_buffer"
    )]
    buffer: Option<&'a [u8]>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetRow {
    #[serde(default)]
    id: Option<RecordId>,
    #[serde(default)]
    game_id: Option<RecordId>,
    #[serde(default)]
    name: String,
    #[serde(default, deserialize_with = "codec::deserialize_buffer")]
    buffer: Option<Vec<u8>>,
    #[serde(default, rename = "type")]
    mime_type: Option<String>,
}

impl From<AssetRow> for Asset {
    fn from(row: AssetRow) -> Self {
        // A buffer without a type survives as-is so `to_live` can skip it.
        let file = row.buffer.map(|buffer| AssetPayload::AtRest {
            buffer,
            mime_type: row.mime_type.unwrap_or_default(),
        });
        Self {
            id: row.id,
            game_id: row.game_id,
            name: row.name,
            file,
        }
    }
}

impl Serialize for Asset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (buffer, mime_type) = match &self.file {
            Some(AssetPayload::AtRest { buffer, mime_type }) => {
                (Some(buffer.as_slice()), Some(mime_type.as_str()))
            }
            Some(AssetPayload::Live(_)) => {
                return Err(S::Error::custom(format!(
                    "asset '{}' still holds a live payload",
                    self.name
                )))
            }
            None => (None, None),
        };
        AssetRowRef {
            id: self.id,
            game_id: self.game_id,
            name: &self.name,
            buffer,
            mime_type,
        }
        .serialize(serializer)
    }
}

impl Record for Asset {
    const KIND: &'static str = "asset";

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
            "file" => self.file.as_ref().map(|file| FieldValue::File {
                name: match file {
                    AssetPayload::Live(source) => source.name().to_string(),
                    AssetPayload::AtRest { .. } => self.name.clone(),
                },
                mime_type: file.mime_type().to_string(),
            }),
            _ => None,
        }
    }
}

impl ChildRecord for Asset {
    fn game_id(&self) -> Option<RecordId> {
        self.game_id
    }

    fn set_game_id(&mut self, game_id: RecordId) {
        self.game_id = Some(game_id);
    }
}

pub const ASSET_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("id", "ID", FieldType::Number).hidden(),
    FieldDescriptor::new("gameId", "Game ID", FieldType::Number).hidden(),
    FieldDescriptor::new("name", "Name", FieldType::String).required(),
    FieldDescriptor::new("file", "File", FieldType::File).required(),
];

struct AssetHooks;

impl EntityHooks<Asset> for AssetHooks {
    fn before_write(&self, asset: Asset) -> Result<Asset, CatalogError> {
        to_at_rest(asset)
    }

    fn after_read(&self, asset: Asset) -> Asset {
        to_live(asset)
    }

    fn entity_name(&self, asset: &Asset) -> String {
        asset.name.clone()
    }
}

/// Asset CRUD for the selected game, plus the live name-to-handle map used
/// to display asset payloads. Clones share one map and one selection
/// subscription, which is dropped with the last clone.
#[derive(Debug, Clone)]
pub struct AssetsService {
    inner: Arc<AssetsInner>,
}

#[derive(Debug)]
struct AssetsInner {
    store: ScopedStore<Asset>,
    urls: AssetUrlCache,
    selection_subscription: SubscriptionId,
}

impl AssetsInner {
    fn refresh_urls(&self) {
        match self.store.get_all() {
            Ok(assets) => self.urls.rebuild(&assets),
            Err(error) => warn!(%error, "asset_urls_refresh_failed"),
        }
    }
}

impl Drop for AssetsInner {
    fn drop(&mut self) {
        self.store.games().unsubscribe(self.selection_subscription);
    }
}

impl AssetsService {
    pub fn new(db: &CatalogDb, games: &GamesService) -> Self {
        let store = ScopedStore::new(
            db.table(ASSETS_TABLE),
            games.clone(),
            ASSET_FIELDS,
            Arc::new(AssetHooks),
        );
        // The publisher only ever holds a weak handle to the service.
        let inner = Arc::new_cyclic(|weak: &Weak<AssetsInner>| {
            let weak = weak.clone();
            let selection_subscription = games.subscribe_selected(move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.refresh_urls();
                }
            });
            AssetsInner {
                store,
                urls: AssetUrlCache::default(),
                selection_subscription,
            }
        });
        inner.refresh_urls();
        Self { inner }
    }

    pub fn fields(&self) -> &'static [FieldDescriptor] {
        self.inner.store.fields()
    }

    pub fn entity_name(&self, asset: &Asset) -> String {
        self.inner.store.entity_name(asset)
    }

    pub fn get(&self, id: RecordId) -> Result<Asset, CatalogError> {
        self.inner.store.get(id)
    }

    pub fn get_all(&self) -> Result<Vec<Asset>, CatalogError> {
        self.inner.store.get_all()
    }

    pub fn search(&self, params: &SearchParameters) -> Result<SearchResult<Asset>, CatalogError> {
        self.inner.store.search(params)
    }

    pub fn create(&self, asset: Asset) -> Result<Asset, CatalogError> {
        let created = self.inner.store.create(asset)?;
        self.inner.refresh_urls();
        Ok(created)
    }

    pub fn update(&self, id: RecordId, asset: Asset) -> Result<Asset, CatalogError> {
        let updated = self.inner.store.update(id, asset)?;
        self.inner.refresh_urls();
        Ok(updated)
    }

    pub fn delete(&self, id: RecordId) -> Result<(), CatalogError> {
        self.inner.store.delete(id)?;
        self.inner.refresh_urls();
        Ok(())
    }

    pub fn get_by_name(&self, name: &str) -> Result<Option<Asset>, CatalogError> {
        let wanted = normalize_asset_name(name);
        Ok(self
            .get_all()?
            .into_iter()
            .find(|asset| !asset.name.is_empty() && normalize_asset_name(&asset.name) == wanted))
    }

    pub fn asset_urls(&self) -> Arc<AssetUrls> {
        self.inner.urls.current()
    }

    pub fn asset_url_stream(&self) -> Receiver<Arc<AssetUrls>> {
        self.inner.urls.stream()
    }

    pub fn subscribe_asset_urls(
        &self,
        callback: impl FnMut(&Arc<AssetUrls>) + Send + 'static,
    ) -> SubscriptionId {
        self.inner.urls.subscribe(callback)
    }

    pub fn unsubscribe_asset_urls(&self, id: SubscriptionId) -> bool {
        self.inner.urls.unsubscribe(id)
    }

    pub fn resolve_handle(&self, handle: &ResourceHandle) -> Option<MemoryFile> {
        self.inner.urls.resolve(handle)
    }

    pub fn live_handle_count(&self) -> usize {
        self.inner.urls.live_handle_count()
    }

    /// Stops following selection changes for this service and every clone
    /// of it. The current map stays published.
    pub fn detach(&self) -> bool {
        self.inner
            .store
            .games()
            .unsubscribe(self.inner.selection_subscription)
    }
}
