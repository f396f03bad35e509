use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{data::utils::default_str, tab_id::TabId};

pub type PlaylistId = i64;
pub type EntryId = u64;

/// Membership of a tab in a playlist.  Entries form a doubly linked list
/// through `prev_entry_id`/`next_entry_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub entry_id: EntryId,
    pub playlist_id: PlaylistId,
    pub tab_id: TabId,
    #[serde(default)]
    pub prev_entry_id: Option<EntryId>,
    #[serde(default)]
    pub next_entry_id: Option<EntryId>,
    /// Unix seconds.
    #[serde(default)]
    pub date_added: i64,
    #[serde(default)]
    pub transpose: i8,
}

impl PlaylistEntry {
    pub fn new(entry_id: EntryId, playlist_id: PlaylistId, tab_id: TabId) -> Self {
        Self {
            entry_id,
            playlist_id,
            tab_id,
            prev_entry_id: None,
            next_entry_id: None,
            date_added: 0,
            transpose: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: PlaylistId,
    #[serde(default)]
    pub user_created: bool,
    #[serde(default = "default_str")]
    pub title: Arc<str>,
    #[serde(default)]
    pub date_created: i64,
    #[serde(default)]
    pub date_modified: i64,
    #[serde(default = "default_str")]
    pub description: Arc<str>,
    #[serde(default)]
    pub entries: Vec<PlaylistEntry>,
}

impl Playlist {
    pub const FAVORITES_ID: PlaylistId = -1;
    pub const TOP_TABS_ID: PlaylistId = -2;

    pub fn new(id: PlaylistId, title: &str) -> Self {
        Self {
            id,
            user_created: id >= 0,
            title: title.into(),
            date_created: 0,
            date_modified: 0,
            description: default_str(),
            entries: Vec::new(),
        }
    }

    pub fn favorites() -> Self {
        Self::new(Self::FAVORITES_ID, "Favorites")
    }

    pub fn top_tabs(tab_ids: &[TabId], now: i64) -> Self {
        let mut playlist = Self::new(Self::TOP_TABS_ID, "Popular");
        playlist.date_created = now;
        for &tab_id in tab_ids {
            playlist.push(tab_id, now);
        }
        playlist
    }

    /// Append `tab_id`, keeping the entry links consistent.  Entry ids are
    /// local to the playlist.
    pub fn push(&mut self, tab_id: TabId, date_added: i64) -> &PlaylistEntry {
        let entry_id = self
            .entries
            .iter()
            .map(|e| e.entry_id)
            .max()
            .map_or(1, |m| m + 1);
        let tail = self.entries.iter_mut().find(|e| e.next_entry_id.is_none());
        let prev = tail.map(|last| {
            last.next_entry_id = Some(entry_id);
            last.entry_id
        });
        self.entries.push(PlaylistEntry {
            prev_entry_id: prev,
            date_added,
            ..PlaylistEntry::new(entry_id, self.id, tab_id)
        });
        self.date_modified = date_added;
        &self.entries[self.entries.len() - 1]
    }

    pub fn contains(&self, tab_id: TabId) -> bool {
        self.entries.iter().any(|e| e.tab_id == tab_id)
    }

    /// Unlinks the first entry for `tab_id`.  Returns whether one was found.
    pub fn remove(&mut self, tab_id: TabId, date_modified: i64) -> bool {
        let Some(index) = self.entries.iter().position(|e| e.tab_id == tab_id) else {
            return false;
        };
        let removed = self.entries.remove(index);
        for entry in &mut self.entries {
            if Some(entry.entry_id) == removed.prev_entry_id {
                entry.next_entry_id = removed.next_entry_id;
            }
            if Some(entry.entry_id) == removed.next_entry_id {
                entry.prev_entry_id = removed.prev_entry_id;
            }
        }
        self.date_modified = date_modified;
        true
    }

    /// Entries in link order, starting from the entry without a predecessor.
    /// Falls back to storage order when the links are broken.
    pub fn ordered_entries(&self) -> Vec<&PlaylistEntry> {
        let first = self.entries.iter().find(|e| e.prev_entry_id.is_none());
        let mut ordered = Vec::with_capacity(self.entries.len());
        let mut next = first;
        while let Some(entry) = next {
            if ordered.len() > self.entries.len() {
                break;
            }
            ordered.push(entry);
            next = entry
                .next_entry_id
                .and_then(|id| self.entries.iter().find(|e| e.entry_id == id));
        }
        if ordered.len() == self.entries.len() {
            ordered
        } else {
            log::warn!("playlist {} has broken entry links", self.id);
            self.entries.iter().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_links_entries() {
        let mut playlist = Playlist::new(3, "Campfire");
        playlist.push(TabId(10), 100);
        playlist.push(TabId(11), 200);
        playlist.push(TabId(12), 300);

        let ids: Vec<_> = playlist.ordered_entries().iter().map(|e| e.tab_id).collect();
        assert_eq!(ids, vec![TabId(10), TabId(11), TabId(12)]);
        assert_eq!(playlist.entries[0].next_entry_id, Some(2));
        assert_eq!(playlist.entries[2].prev_entry_id, Some(2));
        assert_eq!(playlist.date_modified, 300);
    }

    #[test]
    fn ordered_entries_follows_links() {
        let mut playlist = Playlist::new(1, "Reordered");
        let mut a = PlaylistEntry::new(1, 1, TabId(1));
        let mut b = PlaylistEntry::new(2, 1, TabId(2));
        b.next_entry_id = Some(1);
        a.prev_entry_id = Some(2);
        playlist.entries = vec![a, b];

        let ids: Vec<_> = playlist.ordered_entries().iter().map(|e| e.tab_id).collect();
        assert_eq!(ids, vec![TabId(2), TabId(1)]);
    }

    #[test]
    fn broken_links_keep_storage_order() {
        let mut playlist = Playlist::new(1, "Broken");
        let mut a = PlaylistEntry::new(1, 1, TabId(1));
        a.next_entry_id = Some(99);
        let mut b = PlaylistEntry::new(2, 1, TabId(2));
        b.prev_entry_id = Some(1);
        playlist.entries = vec![a, b];

        let ids: Vec<_> = playlist.ordered_entries().iter().map(|e| e.tab_id).collect();
        assert_eq!(ids, vec![TabId(1), TabId(2)]);
    }

    #[test]
    fn remove_relinks_neighbours() {
        let mut playlist = Playlist::favorites();
        for id in [1, 2, 3] {
            playlist.push(TabId(id), 10);
        }
        assert!(playlist.remove(TabId(2), 20));
        assert!(!playlist.remove(TabId(2), 30));
        assert!(!playlist.contains(TabId(2)));
        assert_eq!(playlist.date_modified, 20);

        let ids: Vec<_> = playlist.ordered_entries().iter().map(|e| e.tab_id).collect();
        assert_eq!(ids, vec![TabId(1), TabId(3)]);

        // Removing the head promotes its successor, and new entries still go
        // to the end.
        assert!(playlist.remove(TabId(1), 40));
        playlist.push(TabId(4), 50);
        let ids: Vec<_> = playlist.ordered_entries().iter().map(|e| e.tab_id).collect();
        assert_eq!(ids, vec![TabId(3), TabId(4)]);
        assert_eq!(playlist.entries[1].entry_id, 4);
    }

    #[test]
    fn top_tabs_playlist_is_reserved() {
        let playlist = Playlist::top_tabs(&[TabId(5), TabId(6)], 42);
        assert_eq!(playlist.id, Playlist::TOP_TABS_ID);
        assert!(!playlist.user_created);
        assert_eq!(playlist.entries.len(), 2);
        assert!(playlist
            .entries
            .iter()
            .all(|e| e.playlist_id == Playlist::TOP_TABS_ID));

        let favorites = Playlist::favorites();
        assert_eq!(favorites.id, Playlist::FAVORITES_ID);
        assert!(!favorites.user_created);
    }
}
