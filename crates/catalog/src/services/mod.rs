pub mod assets;
pub mod cards;
pub mod games;
pub mod print_templates;
pub mod scoped;


pub use assets::{Asset, AssetPayload, AssetsService};
pub use cards::{Card, CardsService};
pub use games::{Game, GamesService};
pub use print_templates::{PrintTemplate, PrintTemplatesService};
pub use scoped::{DisplayName, EntityHooks, ScopedStore};
