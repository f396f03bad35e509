use std::{
    collections::HashMap,
    fs::{self, File},
    io::Write,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
};

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;

use crate::{
    data::{Playlist, PlaylistId, Tab},
    error::Error,
    tab_id::TabId,
    util::mkdir_if_not_exists,
};

/// Local persistent storage for tabs and playlists.  Implementations must be
/// safe to share between the presenter and the resolver workers.  Writes for
/// the same key are last-writer-wins.
pub trait DetailStore: Send + Sync {
    fn get_tab(&self, id: TabId) -> Option<Arc<Tab>>;

    fn put_tab(&self, tab: Tab) -> Result<(), Error>;

    fn get_playlist(&self, id: PlaylistId) -> Option<Playlist>;

    fn put_playlist(&self, playlist: &Playlist) -> Result<(), Error>;

    /// Every stored playlist, ordered by id, reserved ones first.
    fn playlists(&self) -> Vec<Playlist>;

    /// The reserved favorites playlist, empty until a tab is added.
    fn favorites(&self) -> Playlist {
        self.get_playlist(Playlist::FAVORITES_ID)
            .unwrap_or_else(Playlist::favorites)
    }

    /// Returns `false` if the tab already was a favorite.  Not atomic with
    /// respect to other writers of the favorites playlist.
    fn add_favorite(&self, tab_id: TabId, now: i64) -> Result<bool, Error> {
        let mut favorites = self.favorites();
        if favorites.contains(tab_id) {
            return Ok(false);
        }
        favorites.push(tab_id, now);
        self.put_playlist(&favorites)?;
        Ok(true)
    }

    /// Returns `false` if the tab was not a favorite.
    fn remove_favorite(&self, tab_id: TabId, now: i64) -> Result<bool, Error> {
        let mut favorites = self.favorites();
        if !favorites.remove(tab_id, now) {
            return Ok(false);
        }
        self.put_playlist(&favorites)?;
        Ok(true)
    }
}

pub type StoreHandle = Arc<dyn DetailStore>;

#[derive(Default)]
pub struct MemoryStore {
    tabs: RwLock<HashMap<TabId, Arc<Tab>>>,
    playlists: RwLock<HashMap<PlaylistId, Playlist>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.tabs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DetailStore for MemoryStore {
    fn get_tab(&self, id: TabId) -> Option<Arc<Tab>> {
        self.tabs.read().get(&id).cloned()
    }

    fn put_tab(&self, tab: Tab) -> Result<(), Error> {
        self.tabs.write().insert(tab.id, Arc::new(tab));
        Ok(())
    }

    fn get_playlist(&self, id: PlaylistId) -> Option<Playlist> {
        self.playlists.read().get(&id).cloned()
    }

    fn put_playlist(&self, playlist: &Playlist) -> Result<(), Error> {
        self.playlists.write().insert(playlist.id, playlist.clone());
        Ok(())
    }

    fn playlists(&self) -> Vec<Playlist> {
        let mut playlists: Vec<Playlist> = self.playlists.read().values().cloned().collect();
        playlists.sort_by_key(|playlist| playlist.id);
        playlists
    }
}

/// JSON files under `base`, one per record, fronted by an in-memory LRU of
/// recently used tabs.
pub struct DiskStore {
    base: PathBuf,
    tabs: Mutex<LruCache<TabId, Arc<Tab>>>,
}

impl DiskStore {
    const TAB_BUCKET: &'static str = "tab";
    const PLAYLIST_BUCKET: &'static str = "playlist";

    pub fn new(base: PathBuf) -> Result<Arc<Self>, Error> {
        const TAB_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(256) {
            Some(size) => size,
            None => NonZeroUsize::MIN,
        };

        // Create the store structure.
        mkdir_if_not_exists(&base)?;
        mkdir_if_not_exists(&base.join(Self::TAB_BUCKET))?;
        mkdir_if_not_exists(&base.join(Self::PLAYLIST_BUCKET))?;

        log::info!("opened tab store at {:?}", base);
        Ok(Arc::new(Self {
            base,
            tabs: Mutex::new(LruCache::new(TAB_CACHE_SIZE)),
        }))
    }

    fn tab_path(&self, id: TabId) -> PathBuf {
        self.base.join(Self::TAB_BUCKET).join(id.to_file_name())
    }

    fn playlist_path(&self, id: PlaylistId) -> PathBuf {
        self.base
            .join(Self::PLAYLIST_BUCKET)
            .join(format!("{id}.json"))
    }

    fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
        let file = File::open(path).ok()?;
        match serde_json::from_reader(file) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("ignoring unreadable store file {:?}: {}", path, err);
                None
            }
        }
    }

    /// Serializes into a temporary file next to `path`, so that the final
    /// rename replaces the old record in one step.
    fn stage_json<T: Serialize>(path: &Path, value: &T) -> Result<NamedTempFile, Error> {
        let dir = path
            .parent()
            .ok_or_else(|| Error::StoreError(format!("no parent directory for {path:?}")))?;
        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut file, value)?;
        file.flush()?;
        Ok(file)
    }

    fn commit(staged: NamedTempFile, path: &Path) -> Result<(), Error> {
        staged.persist(path).map_err(|err| {
            Error::StoreError(format!("failed to persist {path:?}: {}", err.error))
        })?;
        Ok(())
    }
}

impl DetailStore for DiskStore {
    fn get_tab(&self, id: TabId) -> Option<Arc<Tab>> {
        if let Some(tab) = self.tabs.lock().get(&id) {
            return Some(tab.clone());
        }
        let tab: Tab = Self::read_json(&self.tab_path(id))?;
        if tab.id != id {
            log::warn!("store file for tab {} holds tab {}", id, tab.id);
            return None;
        }
        let tab = Arc::new(tab);
        // A writer may have committed a newer record while the file was read,
        // in which case it is already cached.
        let mut tabs = self.tabs.lock();
        if let Some(newer) = tabs.get(&id) {
            return Some(newer.clone());
        }
        tabs.put(id, tab.clone());
        Some(tab)
    }

    fn put_tab(&self, tab: Tab) -> Result<(), Error> {
        log::debug!("saving tab to store: {}", tab.id);
        let path = self.tab_path(tab.id);
        let staged = Self::stage_json(&path, &tab)?;
        // Rename and cache update happen under the lock so both agree on the
        // last writer.
        let mut tabs = self.tabs.lock();
        Self::commit(staged, &path)?;
        tabs.put(tab.id, Arc::new(tab));
        Ok(())
    }

    fn get_playlist(&self, id: PlaylistId) -> Option<Playlist> {
        Self::read_json(&self.playlist_path(id))
    }

    fn put_playlist(&self, playlist: &Playlist) -> Result<(), Error> {
        log::debug!("saving playlist to store: {}", playlist.id);
        let path = self.playlist_path(playlist.id);
        let staged = Self::stage_json(&path, playlist)?;
        Self::commit(staged, &path)
    }

    fn playlists(&self) -> Vec<Playlist> {
        let bucket = self.base.join(Self::PLAYLIST_BUCKET);
        let entries = match fs::read_dir(&bucket) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("failed to list playlists in {:?}: {}", bucket, err);
                return Vec::new();
            }
        };
        let mut playlists: Vec<Playlist> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension()? != "json" {
                    return None;
                }
                let id: PlaylistId = path.file_stem()?.to_str()?.parse().ok()?;
                let playlist: Playlist = Self::read_json(&path)?;
                if playlist.id != id {
                    log::warn!("store file for playlist {} holds playlist {}", id, playlist.id);
                    return None;
                }
                Some(playlist)
            })
            .collect();
        playlists.sort_by_key(|playlist| playlist.id);
        playlists
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn tab(id: u64, version: &str) -> Tab {
        Tab {
            id: TabId(id),
            song_name: "Hallelujah".into(),
            version: version.into(),
            content: "[C]Now I've [Am]heard".into(),
            ..Tab::default()
        }
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get_tab(TabId(1)).is_none());
        store.put_tab(tab(1, "1")).unwrap();
        store.put_tab(tab(1, "2")).unwrap();
        assert_eq!(&*store.get_tab(TabId(1)).unwrap().version, "2");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = DiskStore::new(dir.path().to_path_buf()).unwrap();
            store.put_tab(tab(42, "v2")).unwrap();
            let mut playlist = Playlist::new(3, "Campfire");
            playlist.push(TabId(42), 10);
            store.put_playlist(&playlist).unwrap();
        }
        let store = DiskStore::new(dir.path().to_path_buf()).unwrap();
        let read = store.get_tab(TabId(42)).unwrap();
        assert_eq!(&*read.version, "v2");
        assert_eq!(*read, tab(42, "v2"));
        assert_eq!(store.get_playlist(3).unwrap().entries.len(), 1);
        assert!(store.get_playlist(4).is_none());
    }

    #[test]
    fn disk_store_ignores_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path().to_path_buf()).unwrap();
        fs::write(store.tab_path(TabId(9)), b"{not json").unwrap();
        assert!(store.get_tab(TabId(9)).is_none());

        // A file holding a different tab is not served under this id.
        fs::write(
            store.tab_path(TabId(10)),
            serde_json::to_vec(&tab(11, "1")).unwrap(),
        )
        .unwrap();
        assert!(store.get_tab(TabId(10)).is_none());
    }

    #[test]
    fn concurrent_writes_leave_one_well_formed_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path().to_path_buf()).unwrap();

        let writers: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                thread::spawn(move || {
                    for round in 0..20 {
                        store.put_tab(tab(7, &format!("{n}.{round}"))).unwrap();
                        assert!(store.get_tab(TabId(7)).is_some());
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let cached = store.get_tab(TabId(7)).unwrap();
        let on_disk: Tab =
            serde_json::from_reader(File::open(store.tab_path(TabId(7))).unwrap()).unwrap();
        assert_eq!(*cached, on_disk);

        // Only the final record remains, no stray temp files.
        let files = fs::read_dir(dir.path().join(DiskStore::TAB_BUCKET))
            .unwrap()
            .count();
        assert_eq!(files, 1);
    }

    #[test]
    fn cold_reads_from_many_threads() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = DiskStore::new(dir.path().to_path_buf()).unwrap();
            for id in 0..32 {
                store.put_tab(tab(id, &id.to_string())).unwrap();
            }
        }
        // Fresh instance, every first read misses the cache.
        let store = DiskStore::new(dir.path().to_path_buf()).unwrap();
        let readers: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for id in 0..32 {
                        let read = store.get_tab(TabId(id)).unwrap();
                        assert_eq!(*read, tab(id, &id.to_string()));
                    }
                })
            })
            .collect();
        for reader in readers {
            reader.join().unwrap();
        }
        assert!(Arc::ptr_eq(
            &store.get_tab(TabId(5)).unwrap(),
            &store.get_tab(TabId(5)).unwrap()
        ));
    }

    #[test]
    fn cold_read_racing_a_write_returns_the_newest() {
        let dir = tempfile::tempdir().unwrap();
        DiskStore::new(dir.path().to_path_buf())
            .unwrap()
            .put_tab(tab(8, "old"))
            .unwrap();

        let store = DiskStore::new(dir.path().to_path_buf()).unwrap();
        let writer = {
            let store = store.clone();
            thread::spawn(move || store.put_tab(tab(8, "new")).unwrap())
        };
        let read = store.get_tab(TabId(8)).unwrap();
        assert!(&*read.version == "old" || &*read.version == "new");
        writer.join().unwrap();
        assert_eq!(&*store.get_tab(TabId(8)).unwrap().version, "new");
    }

    fn stored_ids(store: &dyn DetailStore) -> Vec<PlaylistId> {
        store.playlists().iter().map(|playlist| playlist.id).collect()
    }

    #[test]
    fn lists_stored_playlists() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskStore::new(dir.path().to_path_buf()).unwrap();
        let memory = MemoryStore::new();

        for store in [disk.clone() as StoreHandle, memory as StoreHandle] {
            assert!(store.playlists().is_empty());
            let mut campfire = Playlist::new(3, "Campfire");
            campfire.push(TabId(1), 10);
            store.put_playlist(&campfire).unwrap();
            store.put_playlist(&Playlist::top_tabs(&[TabId(2)], 10)).unwrap();
            store.add_favorite(TabId(1), 10).unwrap();

            assert_eq!(
                stored_ids(&*store),
                vec![Playlist::TOP_TABS_ID, Playlist::FAVORITES_ID, 3]
            );
            assert_eq!(store.playlists()[2], campfire);
        }

        // Stray and unreadable files in the bucket are skipped.
        let bucket = dir.path().join(DiskStore::PLAYLIST_BUCKET);
        fs::write(bucket.join("notes.txt"), b"hello").unwrap();
        fs::write(bucket.join("9.json"), b"{broken").unwrap();
        fs::write(
            bucket.join("10.json"),
            serde_json::to_vec(&Playlist::new(11, "Misfiled")).unwrap(),
        )
        .unwrap();
        assert_eq!(stored_ids(&*disk), vec![Playlist::TOP_TABS_ID, Playlist::FAVORITES_ID, 3]);
    }

    #[test]
    fn favorites_live_in_the_reserved_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store.favorites().entries.is_empty());
        assert!(store.get_playlist(Playlist::FAVORITES_ID).is_none());

        assert!(store.add_favorite(TabId(5), 100).unwrap());
        assert!(store.add_favorite(TabId(6), 200).unwrap());
        assert!(!store.add_favorite(TabId(5), 300).unwrap());
        assert!(!store.remove_favorite(TabId(7), 300).unwrap());

        let favorites = store.get_playlist(Playlist::FAVORITES_ID).unwrap();
        let ids: Vec<_> = favorites.ordered_entries().iter().map(|e| e.tab_id).collect();
        assert_eq!(ids, vec![TabId(5), TabId(6)]);
        assert_eq!(favorites.entries[0].date_added, 100);
        assert_eq!(favorites.title.as_ref(), "Favorites");

        assert!(store.remove_favorite(TabId(5), 400).unwrap());
        let favorites = store.favorites();
        assert!(!favorites.contains(TabId(5)));
        assert_eq!(favorites.date_modified, 400);
        assert_eq!(favorites.ordered_entries()[0].prev_entry_id, None);
    }
}
