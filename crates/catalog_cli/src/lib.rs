use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use catalog::{
    Asset, AssetPayload, Catalog, CatalogError, Game, PathSource, RecordId, SearchParameters,
};
use tracing::info;

pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Games,
    AddGame {
        name: String,
        description: String,
    },
    DeleteGame {
        id: RecordId,
    },
    Assets {
        game: RecordId,
        query: Option<String>,
    },
    ImportAsset {
        game: RecordId,
        path: PathBuf,
        name: Option<String>,
        mime_type: Option<String>,
    },
    ExportAsset {
        game: RecordId,
        name: String,
        out: PathBuf,
    },
    DeleteAsset {
        game: RecordId,
        id: RecordId,
    },
    Templates {
        game: RecordId,
    },
    Cards {
        game: RecordId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub db: Option<PathBuf>,
    pub command: Command,
}

pub fn parse_args(args: &[String]) -> Result<Invocation, String> {
    let mut db = None;
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--db" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --db".to_string())?;
                db = Some(PathBuf::from(value));
                index += 2;
            }
            _ => break,
        }
    }

    let command = args
        .get(index)
        .ok_or_else(|| "missing subcommand".to_string())?
        .as_str();
    let mut rest = CommandArgs::new(command, &args[(index + 1)..]);

    let command = match command {
        "games" => Command::Games,
        "add-game" => Command::AddGame {
            description: rest.take_flag("--description")?.unwrap_or_default(),
            name: rest.take_positional("NAME")?,
        },
        "delete-game" => Command::DeleteGame {
            id: parse_id("ID", &rest.take_positional("ID")?)?,
        },
        "assets" => Command::Assets {
            game: rest.take_game()?,
            query: rest.take_flag("--query")?,
        },
        "import-asset" => Command::ImportAsset {
            game: rest.take_game()?,
            name: rest.take_flag("--name")?,
            mime_type: rest.take_flag("--type")?,
            path: PathBuf::from(rest.take_positional("PATH")?),
        },
        "export-asset" => Command::ExportAsset {
            game: rest.take_game()?,
            name: rest.take_positional("NAME")?,
            out: PathBuf::from(rest.take_positional("OUT")?),
        },
        "delete-asset" => Command::DeleteAsset {
            game: rest.take_game()?,
            id: parse_id("ASSET_ID", &rest.take_positional("ASSET_ID")?)?,
        },
        "templates" => Command::Templates {
            game: rest.take_game()?,
        },
        "cards" => Command::Cards {
            game: rest.take_game()?,
        },
        other => return Err(format!("unknown subcommand '{other}'")),
    };
    rest.finish()?;

    Ok(Invocation { db, command })
}

/// Remaining arguments of one subcommand. Flags are pulled out by name,
/// positionals in order; anything left over is an error.
struct CommandArgs<'a> {
    command: &'a str,
    args: Vec<&'a str>,
}

impl<'a> CommandArgs<'a> {
    fn new(command: &'a str, args: &'a [String]) -> Self {
        Self {
            command,
            args: args.iter().map(String::as_str).collect(),
        }
    }

    fn take_flag(&mut self, flag: &str) -> Result<Option<String>, String> {
        let Some(position) = self.args.iter().position(|arg| *arg == flag) else {
            return Ok(None);
        };
        if position + 1 >= self.args.len() {
            return Err(format!("missing value for {flag}"));
        }
        let value = self.args.remove(position + 1).to_string();
        self.args.remove(position);
        Ok(Some(value))
    }

    fn take_game(&mut self) -> Result<RecordId, String> {
        let raw = self
            .take_flag("--game")?
            .ok_or_else(|| format!("{} requires --game <id>", self.command))?;
        parse_id("--game", &raw)
    }

    fn take_positional(&mut self, label: &str) -> Result<String, String> {
        match self.args.iter().position(|arg| !arg.starts_with("--")) {
            Some(position) => Ok(self.args.remove(position).to_string()),
            None => Err(format!("{} requires {label}", self.command)),
        }
    }

    fn finish(self) -> Result<(), String> {
        match self.args.first() {
            Some(arg) => Err(format!("unexpected {} argument '{arg}'", self.command)),
            None => Ok(()),
        }
    }
}

fn parse_id(label: &str, raw: &str) -> Result<RecordId, String> {
    raw.parse::<u64>()
        .map(RecordId)
        .map_err(|_| format!("invalid {label} value '{raw}' (expected u64)"))
}

pub fn mime_type_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "json" => "application/json",
        "pdf" => "application/pdf",
        _ => FALLBACK_MIME_TYPE,
    }
}

pub fn run<W: Write>(catalog: &Catalog, command: Command, stdout: &mut W) -> Result<(), String> {
    match command {
        Command::Games => {
            for game in catalog.games.get_all().map_err(describe)? {
                emit(stdout, &game_line(&game))?;
            }
            Ok(())
        }
        Command::AddGame { name, description } => {
            let game = catalog
                .games
                .create(Game::new(name).with_description(description))
                .map_err(describe)?;
            emit(stdout, &game_line(&game))
        }
        Command::DeleteGame { id } => {
            catalog.games.delete(id).map_err(describe)?;
            emit(stdout, &format!("deleted game {id}"))
        }
        Command::Assets { game, query } => {
            select_game(catalog, game)?;
            let params = match query {
                Some(query) => SearchParameters::default().with_query(query),
                None => SearchParameters::default(),
            };
            let result = catalog.assets.search(&params).map_err(describe)?;
            for asset in &result.records {
                emit(stdout, &asset_line(asset))?;
            }
            Ok(())
        }
        Command::ImportAsset {
            game,
            path,
            name,
            mime_type,
        } => {
            select_game(catalog, game)?;
            let name = name.unwrap_or_else(|| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let mime_type = mime_type.unwrap_or_else(|| mime_type_for_path(&path).to_string());
            let source = PathSource::new(&path, mime_type);
            let asset = catalog
                .assets
                .create(Asset::new(name, AssetPayload::live(source)))
                .map_err(describe)?;
            info!(path = %path.display(), asset = %asset.name, "asset_imported");
            emit(stdout, &asset_line(&asset))
        }
        Command::ExportAsset { game, name, out } => {
            select_game(catalog, game)?;
            let asset = catalog
                .assets
                .get_by_name(&name)
                .map_err(describe)?
                .ok_or_else(|| format!("no asset named '{name}' in game {game}"))?;
            let bytes = match &asset.file {
                Some(file) => file
                    .read_bytes()
                    .map_err(|error| format!("failed to read asset '{}': {error}", asset.name))?,
                None => return Err(format!("asset '{}' has no payload", asset.name)),
            };
            fs::write(&out, &bytes)
                .map_err(|error| format!("failed to write '{}': {error}", out.display()))?;
            emit(
                stdout,
                &format!("wrote {} bytes to {}", bytes.len(), out.display()),
            )
        }
        Command::DeleteAsset { game, id } => {
            select_game(catalog, game)?;
            let asset = catalog.assets.get(id).map_err(describe)?;
            if asset.game_id != Some(game) {
                return Err(format!("asset {id} does not belong to game {game}"));
            }
            catalog.assets.delete(id).map_err(describe)?;
            emit(stdout, &format!("deleted asset {id}"))
        }
        Command::Templates { game } => {
            select_game(catalog, game)?;
            for template in catalog.print_templates.get_all().map_err(describe)? {
                emit(
                    stdout,
                    &format!(
                        "{}\t{}\t{}",
                        display_id(template.id),
                        template.name,
                        template.description
                    ),
                )?;
            }
            Ok(())
        }
        Command::Cards { game } => {
            select_game(catalog, game)?;
            for card in catalog.cards.get_all().map_err(describe)? {
                emit(
                    stdout,
                    &format!("{}\t{}\tx{}", display_id(card.id), card.name, card.count),
                )?;
            }
            Ok(())
        }
    }
}

fn select_game(catalog: &Catalog, id: RecordId) -> Result<(), String> {
    catalog.games.select_by_id(id).map(|_| ()).map_err(describe)
}

fn game_line(game: &Game) -> String {
    format!("{}\t{}\t{}", display_id(game.id), game.name, game.description)
}

fn asset_line(asset: &Asset) -> String {
    let (mime_type, size) = match &asset.file {
        Some(file) => (
            file.mime_type().to_string(),
            file.read_bytes().map(|bytes| bytes.len()).unwrap_or_default(),
        ),
        None => ("-".to_string(), 0),
    };
    format!(
        "{}\t{}\t{}\t{} bytes",
        display_id(asset.id),
        asset.name,
        mime_type,
        size
    )
}

fn display_id(id: Option<RecordId>) -> String {
    id.map_or_else(|| "-".to_string(), |id| id.to_string())
}

fn describe(error: CatalogError) -> String {
    error.to_string()
}

fn emit<W: Write>(stdout: &mut W, line: &str) -> Result<(), String> {
    writeln!(stdout, "{line}").map_err(|error| format!("failed to write output: {error}"))
}
