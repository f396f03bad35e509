use serde::{Deserialize, Serialize};

use crate::{
    data::playlist::{EntryId, PlaylistEntry, PlaylistId},
    tab_id::TabId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct PlaylistContext {
    pub entry_id: EntryId,
    pub playlist_id: PlaylistId,
}

impl From<&PlaylistEntry> for PlaylistContext {
    fn from(entry: &PlaylistEntry) -> Self {
        Self {
            entry_id: entry.entry_id,
            playlist_id: entry.playlist_id,
        }
    }
}

/// Where selecting a resolved row leads.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Nav {
    TabDetail {
        tab_id: TabId,
        playlist: Option<PlaylistContext>,
    },
}
