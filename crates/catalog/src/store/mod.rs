mod atomic_io;
mod database;
mod search;
mod snapshot;
mod table;
mod types;

pub use database::CatalogDb;
pub use search::{SearchParameters, SearchResult, SortDirection, SortOrder};
pub use snapshot::SnapshotError;
pub use table::Table;
pub use types::{RecordId, StoreError};

pub const GAMES_TABLE: &str = "games";
pub const ASSETS_TABLE: &str = "assets";
pub const PRINT_TEMPLATES_TABLE: &str = "printTemplates";
pub const CARDS_TABLE: &str = "cards";

pub const GAME_CHILD_TABLES: &[&str] = &[ASSETS_TABLE, PRINT_TEMPLATES_TABLE, CARDS_TABLE];
