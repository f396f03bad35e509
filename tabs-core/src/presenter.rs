use std::{
    fmt,
    time::{Duration, Instant},
};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::{
    data::{utils::format_date, Nav, Playlist, PlaylistContext, PlaylistEntry, TabDetail},
    error::Error,
    promise::{Promise, PromiseState},
    resolver::{DetailResolver, TaskHandle},
    tab_id::TabId,
    util::Sequence,
};

pub type RowId = usize;

/// One pending resolution of a row.  The generation makes two binds of the
/// same row to the same tab distinguishable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolutionRequest {
    pub row: RowId,
    pub tab_id: TabId,
    pub entry: Option<PlaylistEntry>,
    pub generation: u64,
}

/// Display state of one row.  Superseding is a property of a request, not of
/// the row: a rebound row is `Resolving` again right away, and the result of
/// its old request comes back as `RowUpdate::Superseded`, if at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowState {
    Unbound,
    Resolving,
    Resolved,
    Failed,
}

impl From<PromiseState> for RowState {
    fn from(state: PromiseState) -> Self {
        match state {
            PromiseState::Empty => Self::Unbound,
            PromiseState::Deferred => Self::Resolving,
            PromiseState::Resolved => Self::Resolved,
            PromiseState::Rejected => Self::Failed,
        }
    }
}

/// Outcome of one completed resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowUpdate {
    Resolved(RowId),
    Failed(RowId),
    /// The row moved on before the result arrived; nothing changed.
    Superseded(ResolutionRequest),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RowContent {
    pub tab_id: TabId,
    pub song_name: String,
    pub artist_name: String,
    pub version: String,
    pub rating: f64,
    pub capo: u8,
    pub tuning: String,
    pub difficulty: String,
    pub date_added: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RowDisplay {
    Unbound,
    Loading { tab_id: TabId },
    Loaded(RowContent),
    Unavailable { tab_id: TabId, reason: String },
}

impl fmt::Display for RowDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbound => Ok(()),
            Self::Loading { tab_id } => write!(f, "[{tab_id}] loading..."),
            Self::Loaded(row) => {
                write!(
                    f,
                    "[{}] {} - {} ({}, rating {:.1}",
                    row.tab_id, row.song_name, row.artist_name, row.version, row.rating
                )?;
                if row.capo > 0 {
                    write!(f, ", capo {}", row.capo)?;
                }
                if let Some(added) = &row.date_added {
                    write!(f, ", added {added}")?;
                }
                write!(f, ")")
            }
            Self::Unavailable { tab_id, reason } => {
                write!(f, "[{tab_id}] could not load: {reason}")
            }
        }
    }
}

type Completion = (ResolutionRequest, Result<TabDetail, Error>);

#[derive(Default)]
struct Row {
    tab_id: Option<TabId>,
    detail: Promise<TabDetail, ResolutionRequest, Error>,
    task: Option<TaskHandle>,
}

/// Binds list rows to tab resolutions.  Lives on a single thread; results
/// come back from the resolver workers over a channel and are applied by
/// `poll`/`wait`.
pub struct ListPresenter {
    resolver: DetailResolver,
    rows: Vec<Row>,
    generation: Sequence<u64>,
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
    superseded: usize,
}

impl ListPresenter {
    pub fn new(resolver: DetailResolver) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            resolver,
            rows: Vec::new(),
            generation: Sequence::new(0),
            sender,
            receiver,
            superseded: 0,
        }
    }

    pub fn resolver(&self) -> &DetailResolver {
        &self.resolver
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of results dropped because their row had moved on.
    pub fn superseded_count(&self) -> usize {
        self.superseded
    }

    pub fn bind(&mut self, row: RowId, tab_id: TabId) -> ResolutionRequest {
        self.bind_request(row, tab_id, None)
    }

    pub fn bind_entry(&mut self, row: RowId, entry: PlaylistEntry) -> ResolutionRequest {
        self.bind_request(row, entry.tab_id, Some(entry))
    }

    fn bind_request(
        &mut self,
        row: RowId,
        tab_id: TabId,
        entry: Option<PlaylistEntry>,
    ) -> ResolutionRequest {
        let request = ResolutionRequest {
            row,
            tab_id,
            entry: entry.clone(),
            generation: self.generation.advance(),
        };
        let task = self.resolver.spawn(tab_id, entry, {
            let sender = self.sender.clone();
            let request = request.clone();
            move |result| {
                // The presenter owns the receiver, a send can only fail once it
                // is gone.
                let _ = sender.send((request, result));
            }
        });

        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Row::default);
        }
        let slot = &mut self.rows[row];
        if let Some(old) = slot.detail.deferred() {
            log::debug!("row {row}: tab {} superseded by tab {tab_id}", old.tab_id);
        }
        slot.tab_id = Some(tab_id);
        slot.detail.defer(request.clone());
        // Replacing the handle cancels the previous resolution.
        slot.task = Some(task);
        request
    }

    pub fn unbind(&mut self, row: RowId) {
        if let Some(slot) = self.rows.get_mut(row) {
            slot.tab_id = None;
            slot.detail.clear();
            slot.task.take();
        }
    }

    /// Binds rows to the playlist entries in list order and unbinds any rows
    /// past its end.
    pub fn load_playlist(&mut self, playlist: &Playlist) -> usize {
        let entries: Vec<PlaylistEntry> =
            playlist.ordered_entries().into_iter().cloned().collect();
        let count = entries.len();
        for (row, entry) in entries.into_iter().enumerate() {
            self.bind_entry(row, entry);
        }
        self.truncate(count);
        count
    }

    pub fn load_tab_ids(&mut self, tab_ids: &[TabId]) -> usize {
        for (row, &tab_id) in tab_ids.iter().enumerate() {
            self.bind(row, tab_id);
        }
        self.truncate(tab_ids.len());
        tab_ids.len()
    }

    fn truncate(&mut self, len: usize) {
        for row in len..self.rows.len() {
            self.unbind(row);
        }
        self.rows.truncate(len);
    }

    /// Applies every completion that has already arrived.
    pub fn poll(&mut self) -> Vec<RowUpdate> {
        let completions: Vec<Completion> = self.receiver.try_iter().collect();
        completions
            .into_iter()
            .map(|completion| self.apply(completion))
            .collect()
    }

    /// Waits for the next completion and applies it.
    pub fn wait(&mut self, timeout: Duration) -> Option<RowUpdate> {
        let completion = self.receiver.recv_timeout(timeout).ok()?;
        Some(self.apply(completion))
    }

    /// Applies completions until no row is resolving or `timeout` elapses.
    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<RowUpdate> {
        let deadline = Instant::now() + timeout;
        let mut updates = Vec::new();
        while self.is_resolving() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.wait(remaining) {
                Some(update) => updates.push(update),
                None => {
                    log::warn!("gave up waiting for {} rows", self.resolving_count());
                    break;
                }
            }
        }
        updates.extend(self.poll());
        updates
    }

    fn apply(&mut self, (request, result): Completion) -> RowUpdate {
        let row = request.row;
        let slot = match self.rows.get_mut(row) {
            Some(slot) if slot.detail.is_deferred(&request) => slot,
            _ => {
                log::debug!(
                    "row {row}: dropping stale result for tab {}",
                    request.tab_id
                );
                self.superseded += 1;
                return RowUpdate::Superseded(request);
            }
        };
        if let Err(err) = &result {
            log::warn!("row {row}: could not load tab {}: {err}", request.tab_id);
        }
        let failed = result.is_err();
        slot.detail.update((request, result));
        if let Some(task) = slot.task.take() {
            task.detach();
        }
        if failed {
            RowUpdate::Failed(row)
        } else {
            RowUpdate::Resolved(row)
        }
    }

    pub fn is_resolving(&self) -> bool {
        self.resolving_count() > 0
    }

    fn resolving_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.detail.state() == PromiseState::Deferred)
            .count()
    }

    pub fn state(&self, row: RowId) -> RowState {
        self.rows
            .get(row)
            .map_or(RowState::Unbound, |slot| slot.detail.state().into())
    }

    pub fn detail(&self, row: RowId) -> Option<&TabDetail> {
        self.rows.get(row)?.detail.resolved()
    }

    pub fn display(&self, row: RowId) -> RowDisplay {
        let Some(slot) = self.rows.get(row) else {
            return RowDisplay::Unbound;
        };
        match &slot.detail {
            Promise::Empty => RowDisplay::Unbound,
            Promise::Deferred(request) => RowDisplay::Loading {
                tab_id: request.tab_id,
            },
            Promise::Resolved(detail) => RowDisplay::Loaded(RowContent {
                tab_id: detail.id(),
                song_name: detail.tab.song_name.to_string(),
                artist_name: detail.tab.artist_name.to_string(),
                version: detail.tab.version_label(),
                rating: detail.tab.rating,
                capo: detail.tab.capo,
                tuning: detail.tab.tuning.to_string(),
                difficulty: detail.tab.difficulty.to_string(),
                date_added: detail
                    .entry
                    .as_ref()
                    .and_then(|entry| format_date(entry.date_added)),
            }),
            Promise::Rejected(err) => RowDisplay::Unavailable {
                tab_id: slot.tab_id.unwrap_or(TabId(0)),
                reason: err.to_string(),
            },
        }
    }

    pub fn displays(&self) -> Vec<RowDisplay> {
        (0..self.rows.len()).map(|row| self.display(row)).collect()
    }

    /// Navigation target for a click on `row`, only once it has resolved.
    pub fn navigate(&self, row: RowId) -> Option<Nav> {
        let detail = self.detail(row)?;
        log::debug!("navigating from row {row} to tab {}", detail.id());
        Some(Nav::TabDetail {
            tab_id: detail.id(),
            playlist: detail.entry.as_ref().map(PlaylistContext::from),
        })
    }
}
