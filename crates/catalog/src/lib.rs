use std::env;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

pub mod error;
pub mod schema;
pub mod selection;
pub mod services;
pub mod store;

pub use error::{CatalogError, ErrorKind};
pub use schema::{
    find_field, visible_fields, ChildRecord, FieldDescriptor, FieldType, FieldValue, Record,
};
pub use selection::{Publisher, SubscriptionId};
pub use services::assets::{
    normalize_asset_name, to_at_rest, to_live, Asset, AssetPayload, AssetUrls, AssetsService,
    BinarySource, MemoryFile, PathSource, ResourceHandle,
};
pub use services::cards::{Card, CardsService};
pub use services::games::{Game, GamesService};
pub use services::print_templates::{PrintTemplate, PrintTemplatesService};
pub use store::{
    CatalogDb, RecordId, SearchParameters, SearchResult, SnapshotError, SortDirection,
    SortOrder, StoreError,
};

pub const CATALOG_DB_ENV_VAR: &str = "CATALOG_DB_PATH";
pub const DEFAULT_DB_FILE: &str = "catalog.db";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("{var} is set but empty; unset it or point it at a catalog file")]
    EmptyEnvPath { var: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMode {
    InMemory,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub storage: StorageMode,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self::file(DEFAULT_DB_FILE)
    }
}

impl CatalogConfig {
    pub fn in_memory() -> Self {
        Self {
            storage: StorageMode::InMemory,
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageMode::File(path.into()),
        }
    }

    /// Reads `CATALOG_DB_PATH`, falling back to `catalog.db` in the working
    /// directory when it is unset.
    pub fn from_env() -> Result<Self, StartupError> {
        config_from_env_value(env::var(CATALOG_DB_ENV_VAR))
    }
}

fn config_from_env_value(
    value: Result<String, env::VarError>,
) -> Result<CatalogConfig, StartupError> {
    match value {
        Ok(raw) if raw.trim().is_empty() => Err(StartupError::EmptyEnvPath {
            var: CATALOG_DB_ENV_VAR,
        }),
        Ok(raw) => Ok(CatalogConfig::file(raw)),
        Err(env::VarError::NotPresent) => Ok(CatalogConfig::default()),
        Err(source) => Err(StartupError::EnvVar {
            var: CATALOG_DB_ENV_VAR,
            source,
        }),
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    pub db: CatalogDb,
    pub games: GamesService,
    pub assets: AssetsService,
    pub print_templates: PrintTemplatesService,
    pub cards: CardsService,
}

impl Catalog {
    pub fn open(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let db = match &config.storage {
            StorageMode::InMemory => CatalogDb::in_memory(),
            StorageMode::File(path) => CatalogDb::open(path.clone())?,
        };
        info!(storage = ?config.storage, "catalog_opened");
        Ok(Self::with_db(db))
    }

    pub fn with_db(db: CatalogDb) -> Self {
        let games = GamesService::new(&db);
        Self {
            assets: AssetsService::new(&db, &games),
            print_templates: PrintTemplatesService::new(&db, &games),
            cards: CardsService::new(&db, &games),
            games,
            db,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn unset_env_falls_back_to_default_file() {
        let config = config_from_env_value(Err(env::VarError::NotPresent)).expect("config");
        assert_eq!(config.storage, StorageMode::File(PathBuf::from(DEFAULT_DB_FILE)));
    }

    #[test]
    fn env_path_is_used_as_is() {
        let config = config_from_env_value(Ok("/tmp/cards.db".to_string())).expect("config");
        assert_eq!(config, CatalogConfig::file("/tmp/cards.db"));
    }

    #[test]
    fn empty_env_path_is_rejected() {
        let error = config_from_env_value(Ok("  ".to_string())).expect_err("empty");
        assert!(matches!(error, StartupError::EmptyEnvPath { var } if var == CATALOG_DB_ENV_VAR));
    }

    #[test]
    fn non_unicode_env_value_is_reported() {
        let error = config_from_env_value(Err(env::VarError::NotUnicode(OsString::from("x"))))
            .expect_err("not unicode");
        assert!(matches!(error, StartupError::EnvVar { .. }));
    }

    #[test]
    fn services_share_one_selection() {
        let catalog = Catalog::open(&CatalogConfig::in_memory()).expect("open");
        let game = catalog.games.create(Game::new("Shared")).expect("game");
        catalog.games.select(game.clone());

        let card = catalog.cards.create(Card::new("Knight")).expect("card");
        assert_eq!(card.game_id, game.id);
        assert_eq!(catalog.cards.get_all().expect("cards").len(), 1);
    }

    #[test]
    fn file_storage_opens_existing_snapshot() {
        let temp = TempDir::new().expect("temp");
        let config = CatalogConfig::file(temp.path().join("catalog.db"));
        {
            let catalog = Catalog::open(&config).expect("open");
            catalog.games.create(Game::new("Kept")).expect("game");
        }

        let reopened = Catalog::open(&config).expect("reopen");
        let names = reopened
            .games
            .get_all()
            .expect("games")
            .into_iter()
            .map(|game| game.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Kept"]);
    }
}
