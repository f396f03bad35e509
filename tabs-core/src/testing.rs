//! Fakes shared by unit tests.

use std::collections::{HashMap, HashSet};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::{
    data::{Playlist, Tab},
    error::Error,
    store::StoreHandle,
    tab_id::TabId,
    webapi::RemoteFetcher,
};

pub fn tab(id: u64, version: &str, rating: f64) -> Tab {
    Tab {
        id: TabId(id),
        song_name: format!("Song {id}").into(),
        artist_name: "Artist".into(),
        version: version.into(),
        rating,
        capo: 2,
        tuning: "E A D G B E".into(),
        difficulty: "novice".into(),
        content: "[Am]la la".into(),
        ..Tab::default()
    }
}

/// In-process catalog.  Tabs it knows are written to the store on fetch.
pub struct FakeFetcher {
    store: StoreHandle,
    catalog: Mutex<HashMap<TabId, Tab>>,
    failing: Mutex<HashSet<TabId>>,
    silent: Mutex<HashSet<TabId>>,
    gates: Mutex<HashMap<TabId, Receiver<()>>>,
    calls: Mutex<Vec<TabId>>,
}

impl FakeFetcher {
    pub fn new(store: StoreHandle) -> Self {
        Self {
            store,
            catalog: Mutex::default(),
            failing: Mutex::default(),
            silent: Mutex::default(),
            gates: Mutex::default(),
            calls: Mutex::default(),
        }
    }

    pub fn publish(&self, tab: Tab) {
        self.catalog.lock().insert(tab.id, tab);
    }

    /// Fetches of `id` fail as if offline.
    pub fn fail(&self, id: u64) {
        self.failing.lock().insert(TabId(id));
    }

    /// Fetches of `id` succeed without writing anything.
    pub fn succeed_silently(&self, id: u64) {
        self.silent.lock().insert(TabId(id));
    }

    /// Fetches of `id` block until the returned sender is used or dropped.
    pub fn gate(&self, id: u64) -> Sender<()> {
        let (send, recv) = bounded(0);
        self.gates.lock().insert(TabId(id), recv);
        send
    }

    pub fn calls(&self) -> Vec<TabId> {
        self.calls.lock().clone()
    }
}

impl RemoteFetcher for FakeFetcher {
    fn fetch_tab_detail(&self, id: TabId) -> Result<(), Error> {
        self.calls.lock().push(id);
        let gate = self.gates.lock().get(&id).cloned();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        if self.failing.lock().contains(&id) {
            return Err(Error::FetchFailed("simulated network error".into()));
        }
        if self.silent.lock().contains(&id) {
            return Ok(());
        }
        let tab = self.catalog.lock().get(&id).cloned();
        match tab {
            Some(tab) => self.store.put_tab(tab),
            None => Err(Error::FetchFailed(format!("tab {id} not in catalog"))),
        }
    }

    fn fetch_top_tabs(&self) -> Result<Vec<TabId>, Error> {
        let tabs: Vec<Tab> = self.catalog.lock().values().cloned().collect();
        let mut ids: Vec<TabId> = tabs.iter().map(|tab| tab.id).collect();
        ids.sort();
        for tab in tabs {
            self.store.put_tab(tab)?;
        }
        self.store.put_playlist(&Playlist::top_tabs(&ids, 0))?;
        Ok(ids)
    }
}
