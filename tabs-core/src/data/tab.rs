use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    data::{playlist::PlaylistEntry, utils::default_str},
    error::Error,
    tab_id::TabId,
};

/// A tab as kept by the store: song metadata and the chord/lyric body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tab {
    pub id: TabId,
    pub song_name: Arc<str>,
    pub artist_name: Arc<str>,
    #[serde(rename = "type")]
    pub tab_type: Arc<str>,
    pub part: Arc<str>,
    pub version: Arc<str>,
    pub votes: u32,
    pub rating: f64,
    /// Unix seconds.
    pub date: i64,
    pub status: Arc<str>,
    pub tab_access_type: Arc<str>,
    pub tonality_name: Arc<str>,
    pub version_description: Arc<str>,
    pub capo: u8,
    pub tuning: Arc<str>,
    pub difficulty: Arc<str>,
    pub contributor_user_name: Arc<str>,
    pub content: Arc<str>,
}

impl Default for Tab {
    fn default() -> Self {
        Self {
            id: TabId(0),
            song_name: default_str(),
            artist_name: default_str(),
            tab_type: default_str(),
            part: default_str(),
            version: default_str(),
            votes: 0,
            rating: 0.0,
            date: 0,
            status: default_str(),
            tab_access_type: default_str(),
            tonality_name: default_str(),
            version_description: default_str(),
            capo: 0,
            tuning: default_str(),
            difficulty: default_str(),
            contributor_user_name: default_str(),
            content: default_str(),
        }
    }
}

impl Tab {
    pub fn version_label(&self) -> String {
        format!("ver. {}", self.version)
    }

    /// Whether the tab was fetched with its body, not just listing metadata.
    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }
}

/// A resolved tab, optionally seen through the playlist entry that listed it.
///
/// Bare and playlist views of one tab share the same `Arc<Tab>` handed out by
/// the store.
#[derive(Clone, Debug)]
pub struct TabDetail {
    pub tab: Arc<Tab>,
    pub entry: Option<PlaylistEntry>,
}

impl TabDetail {
    pub fn bare(tab: Arc<Tab>) -> Self {
        Self { tab, entry: None }
    }

    pub fn in_playlist(tab: Arc<Tab>, entry: PlaylistEntry) -> Result<Self, Error> {
        if entry.tab_id != tab.id {
            return Err(Error::InvalidEntry {
                entry_tab: entry.tab_id,
                tab: tab.id,
            });
        }
        Ok(Self {
            tab,
            entry: Some(entry),
        })
    }

    pub fn id(&self) -> TabId {
        self.tab.id
    }

    pub fn is_bare(&self) -> bool {
        self.entry.is_none()
    }
}
