use std::{error, fmt, io};

use crate::tab_id::TabId;

#[derive(Debug)]
pub enum Error {
    FetchFailed(String),
    NotFoundAfterFetch(TabId),
    StoreError(String),
    ConfigError(String),
    InvalidEntry { entry_tab: TabId, tab: TabId },
    Cancelled,
    JsonError(Box<dyn error::Error + Send + Sync>),
    IoError(io::Error),
}

impl Error {
    /// Failures coming from the remote side, as opposed to local state.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::FetchFailed(_))
    }
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchFailed(err) => write!(f, "Failed to fetch tab: {err}"),
            Self::NotFoundAfterFetch(id) => {
                write!(f, "Tab {id} missing from store after successful fetch")
            }
            Self::StoreError(err) => write!(f, "Store error: {err}"),
            Self::ConfigError(err) => write!(f, "Invalid configuration: {err}"),
            Self::InvalidEntry { entry_tab, tab } => write!(
                f,
                "Playlist entry for tab {entry_tab} cannot annotate tab {tab}"
            ),
            Self::Cancelled => write!(f, "Resolution cancelled"),
            Self::JsonError(err) => err.fmt(f),
            Self::IoError(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::JsonError(Box::new(err))
    }
}
