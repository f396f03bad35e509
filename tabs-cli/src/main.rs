use std::{env, fs::File, path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use env_logger::{Builder, Env};
use itertools::Itertools;
use tabs_core::{
    config::Config,
    data::{Playlist, PlaylistId},
    error::Error,
    presenter::{ListPresenter, RowDisplay},
    resolver::DetailResolver,
    store::{DetailStore, DiskStore, StoreHandle},
    tab_id::TabId,
    util::unix_now,
    webapi::WebApi,
};

const ENV_LOG: &str = "TABS_LOG";
const ENV_LOG_STYLE: &str = "TABS_LOG_STYLE";

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(60);

const USAGE: &str = "usage:
  tabs-cli <tab id or url>...
  tabs-cli --popular
  tabs-cli --favorites
  tabs-cli --add-favorite <tab id or url>
  tabs-cli --remove-favorite <tab id or url>
  tabs-cli --playlists
  tabs-cli --playlist-id <id>
  tabs-cli --playlist <playlist.json>";

#[derive(Debug, PartialEq)]
enum Command {
    Tabs(Vec<TabId>),
    Popular,
    Favorites,
    AddFavorite(TabId),
    RemoveFavorite(TabId),
    Playlists,
    StoredPlaylist(PlaylistId),
    PlaylistFile(PathBuf),
}

fn main() -> ExitCode {
    // Setup logging from the env variables, with defaults.
    Builder::from_env(
        Env::new()
            .filter_or(ENV_LOG, "info")
            .write_style(ENV_LOG_STYLE),
    )
    .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("{err}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match run(command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_tab(arg: &str) -> Result<TabId, Error> {
    arg.parse::<TabId>()
        .ok()
        .or_else(|| TabId::from_uri(arg))
        .ok_or_else(|| Error::ConfigError(format!("not a tab id: {arg}")))
}

fn parse_args(args: &[String]) -> Result<Command, Error> {
    match args {
        [] => Err(Error::ConfigError("nothing to resolve".into())),
        [flag] if flag == "--popular" => Ok(Command::Popular),
        [flag] if flag == "--favorites" => Ok(Command::Favorites),
        [flag] if flag == "--playlists" => Ok(Command::Playlists),
        [flag, tab] if flag == "--add-favorite" => parse_tab(tab).map(Command::AddFavorite),
        [flag, tab] if flag == "--remove-favorite" => parse_tab(tab).map(Command::RemoveFavorite),
        [flag, id] if flag == "--playlist-id" => id
            .parse()
            .map(Command::StoredPlaylist)
            .map_err(|_| Error::ConfigError(format!("not a playlist id: {id}"))),
        [flag, path] if flag == "--playlist" => Ok(Command::PlaylistFile(path.into())),
        [flag, ..] if flag.starts_with("--") => {
            Err(Error::ConfigError(format!("unexpected arguments for {flag}")))
        }
        ids => ids
            .iter()
            .map(|arg| parse_tab(arg))
            .collect::<Result<Vec<_>, _>>()
            .map(Command::Tabs),
    }
}

/// Returns whether every row resolved.
fn run(command: Command) -> Result<bool, Error> {
    let mut config = Config::load()?;
    if config.device_id.is_empty() {
        config.device_id = config.device_id();
        if let Err(err) = config.save() {
            log::warn!("failed to save config: {err}");
        }
    }

    let store_dir = config
        .store_dir()
        .ok_or_else(|| Error::ConfigError("no cache directory".into()))?;
    let store: StoreHandle = DiskStore::new(store_dir)?;
    let fetcher = Arc::new(WebApi::new(
        config.api_url()?,
        config.device_id(),
        Config::proxy().as_deref(),
        config.max_retries,
        store.clone(),
    ));
    let resolver = DetailResolver::new(fetcher, store.clone(), config.resolver());
    let mut presenter = ListPresenter::new(resolver);

    if let Some(output) = prepare(command, &store, &mut presenter)? {
        println!("{output}");
        return Ok(true);
    }

    presenter.wait_idle(RESOLVE_TIMEOUT);
    let rows = presenter.displays();
    println!("{}", rows.iter().join("\n"));

    Ok(rows
        .iter()
        .all(|row| matches!(row, RowDisplay::Loaded(_))))
}

/// Binds the rows of a list command.  Commands that only touch the store
/// return their output instead and bind nothing.
fn prepare(
    command: Command,
    store: &StoreHandle,
    presenter: &mut ListPresenter,
) -> Result<Option<String>, Error> {
    match command {
        Command::Tabs(ids) => {
            presenter.load_tab_ids(&ids);
        }
        Command::Popular => {
            let (send, recv) = crossbeam_channel::bounded(1);
            presenter
                .resolver()
                .spawn_top_tabs(move |result| {
                    let _ = send.send(result);
                })
                .detach();
            let refreshed = recv
                .recv_timeout(RESOLVE_TIMEOUT)
                .map_err(|_| Error::FetchFailed("timed out fetching top tabs".into()))?;
            if let Err(err) = refreshed {
                log::warn!("showing stored popular tabs: {err}");
            }
            let popular = store
                .get_playlist(Playlist::TOP_TABS_ID)
                .ok_or_else(|| Error::FetchFailed("no popular tabs available".into()))?;
            presenter.load_playlist(&popular);
        }
        Command::Favorites => {
            presenter.load_playlist(&store.favorites());
        }
        Command::AddFavorite(tab_id) => {
            let output = if store.add_favorite(tab_id, unix_now())? {
                format!("added tab {tab_id} to favorites")
            } else {
                format!("tab {tab_id} already is a favorite")
            };
            return Ok(Some(output));
        }
        Command::RemoveFavorite(tab_id) => {
            let output = if store.remove_favorite(tab_id, unix_now())? {
                format!("removed tab {tab_id} from favorites")
            } else {
                format!("tab {tab_id} is not a favorite")
            };
            return Ok(Some(output));
        }
        Command::Playlists => {
            let listing = store
                .playlists()
                .iter()
                .map(|playlist| {
                    format!(
                        "{}: {} ({} tabs)",
                        playlist.id,
                        playlist.title,
                        playlist.entries.len()
                    )
                })
                .join("\n");
            return Ok(Some(listing));
        }
        Command::StoredPlaylist(id) => {
            let playlist = store
                .get_playlist(id)
                .ok_or_else(|| Error::ConfigError(format!("no stored playlist {id}")))?;
            presenter.load_playlist(&playlist);
        }
        Command::PlaylistFile(path) => {
            let playlist: Playlist = serde_json::from_reader(File::open(&path)?)?;
            log::info!(
                "playlist {:?} with {} entries",
                playlist.title,
                playlist.entries.len()
            );
            presenter.load_playlist(&playlist);
        }
    }
    Ok(None)
}
