use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use threadpool::ThreadPool;

use crate::{
    data::{PlaylistEntry, Tab, TabDetail},
    error::Error,
    store::StoreHandle,
    tab_id::TabId,
    webapi::FetcherHandle,
};

#[derive(Clone, Debug)]
pub struct ResolverConfig {
    pub workers: usize,
    /// Serve the stored record when the fetch stage fails.  Off unless
    /// explicitly enabled.
    pub fallback_to_cached: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            fallback_to_cached: false,
        }
    }
}

/// Cooperative cancellation of one spawned resolution.  Dropping the handle
/// cancels the task, use `detach` to let it run unobserved.
#[derive(Debug)]
pub struct TaskHandle {
    cancelled: Option<Arc<AtomicBool>>,
}

impl TaskHandle {
    fn new() -> (Self, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (
            Self {
                cancelled: Some(flag.clone()),
            },
            flag,
        )
    }

    pub fn cancel(&self) {
        if let Some(flag) = &self.cancelled {
            flag.store(true, Ordering::Release);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    pub fn detach(mut self) {
        self.cancelled.take();
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Turns a tab id into a displayable record: refresh from the catalog first,
/// then read back from the store.
#[derive(Clone)]
pub struct DetailResolver {
    fetcher: FetcherHandle,
    store: StoreHandle,
    pool: ThreadPool,
    config: ResolverConfig,
}

impl DetailResolver {
    pub fn new(fetcher: FetcherHandle, store: StoreHandle, config: ResolverConfig) -> Self {
        let workers = config.workers.max(1);
        Self {
            fetcher,
            store,
            pool: ThreadPool::with_name("tab_resolver".into(), workers),
            config,
        }
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn resolve(&self, id: TabId) -> Result<TabDetail, Error> {
        let never = AtomicBool::new(false);
        self.fetch_then_read(id, &never).map(TabDetail::bare)
    }

    pub fn resolve_in_playlist(&self, entry: PlaylistEntry) -> Result<TabDetail, Error> {
        let never = AtomicBool::new(false);
        let tab = self.fetch_then_read(entry.tab_id, &never)?;
        TabDetail::in_playlist(tab, entry)
    }

    /// Runs the resolution on the worker pool.  `on_done` is called on a
    /// worker thread, unless the task was cancelled before the read stage
    /// finished, in which case it is not called at all.
    pub fn spawn<F>(&self, id: TabId, entry: Option<PlaylistEntry>, on_done: F) -> TaskHandle
    where
        F: FnOnce(Result<TabDetail, Error>) + Send + 'static,
    {
        let (handle, cancelled) = TaskHandle::new();
        let this = self.clone();
        self.pool.execute(move || {
            if cancelled.load(Ordering::Acquire) {
                log::debug!("resolution of tab {id} cancelled before start");
                return;
            }
            let result = this
                .fetch_then_read(id, &cancelled)
                .and_then(|tab| match entry {
                    Some(entry) => TabDetail::in_playlist(tab, entry),
                    None => Ok(TabDetail::bare(tab)),
                });
            match result {
                Err(Error::Cancelled) => {
                    log::debug!("resolution of tab {id} cancelled");
                }
                _ if cancelled.load(Ordering::Acquire) => {
                    log::debug!("resolution of tab {id} cancelled, dropping result");
                }
                result => on_done(result),
            }
        });
        handle
    }

    /// Refreshes the popular tabs on the worker pool.
    pub fn spawn_top_tabs<F>(&self, on_done: F) -> TaskHandle
    where
        F: FnOnce(Result<Vec<TabId>, Error>) + Send + 'static,
    {
        let (handle, cancelled) = TaskHandle::new();
        let fetcher = self.fetcher.clone();
        self.pool.execute(move || {
            let result = fetcher.fetch_top_tabs();
            if let Err(err) = &result {
                log::error!("failed to fetch top tabs: {err}");
            }
            if !cancelled.load(Ordering::Acquire) {
                on_done(result);
            }
        });
        handle
    }

    /// Blocks until every spawned task has finished.
    pub fn join(&self) {
        self.pool.join();
    }

    fn fetch_then_read(&self, id: TabId, cancelled: &AtomicBool) -> Result<Arc<Tab>, Error> {
        log::debug!(
            "resolving tab {id} on {:?}",
            thread::current().name().unwrap_or("<unnamed>")
        );
        if let Err(err) = self.fetcher.fetch_tab_detail(id) {
            log::error!("could not fetch tab {id}, check internet connection? {err}");
            if self.config.fallback_to_cached {
                if let Some(tab) = self.store.get_tab(id) {
                    log::warn!("serving stored tab {id} after failed fetch");
                    return Ok(tab);
                }
            }
            return Err(err);
        }
        if cancelled.load(Ordering::Acquire) {
            return Err(Error::Cancelled);
        }
        self.store.get_tab(id).ok_or_else(|| {
            log::error!("tab {id} missing from store after successful fetch");
            Error::NotFoundAfterFetch(id)
        })
    }
}
