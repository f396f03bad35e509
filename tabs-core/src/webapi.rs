use std::{sync::Arc, thread, time::Duration};

use serde::{de::DeserializeOwned, Deserialize};
use ureq::{
    http::{Response, StatusCode},
    Agent, Body,
};
use url::Url;

use crate::{
    data::{
        utils::{deserialize_lenient_i64, deserialize_null_arc_str, deserialize_num_or_str},
        Playlist, Tab,
    },
    error::Error,
    store::StoreHandle,
    tab_id::TabId,
    util::{default_ureq_agent_builder, unix_now},
};

/// Retrieves tabs from the remote catalog and writes them through to the
/// local store.  Callers only observe success or failure; the fetched data
/// is read back from the store.
pub trait RemoteFetcher: Send + Sync {
    fn fetch_tab_detail(&self, id: TabId) -> Result<(), Error>;

    /// Refreshes the popular tabs listing and stores it as the reserved top
    /// tabs playlist.
    fn fetch_top_tabs(&self) -> Result<Vec<TabId>, Error>;
}

pub type FetcherHandle = Arc<dyn RemoteFetcher>;

const USER_AGENT: &str = concat!("tabs/", env!("CARGO_PKG_VERSION"));

// Upper bound for a server-provided `Retry-After`.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

pub struct WebApi {
    agent: Agent,
    base_url: Url,
    device_id: String,
    max_retries: u32,
    store: StoreHandle,
}

impl WebApi {
    pub fn new(
        base_url: Url,
        device_id: String,
        proxy_url: Option<&str>,
        max_retries: u32,
        store: StoreHandle,
    ) -> Self {
        Self {
            agent: default_ureq_agent_builder(proxy_url).build().into(),
            base_url,
            device_id,
            max_retries,
            store,
        }
    }

    fn endpoint(&self, path: &[&str], query: &[(&str, &str)]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::ConfigError(format!("invalid API base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(path);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn request(&self, url: &Url) -> Result<Response<Body>, Error> {
        self.agent
            .get(url.as_str())
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .header("X-Client-Id", &self.device_id)
            .call()
            .map_err(|err| Error::FetchFailed(format!("{url}: {err}")))
    }

    /// Repeats `f` while the server answers 429, at most `max_retries` times.
    /// Any other non-success status is a fetch failure.
    fn with_retry(
        &self,
        url: &Url,
        f: impl Fn() -> Result<Response<Body>, Error>,
    ) -> Result<Response<Body>, Error> {
        let mut attempt = 0;
        loop {
            let response = f()?;
            match response.status() {
                StatusCode::TOO_MANY_REQUESTS if attempt < self.max_retries => {
                    let retry_after_secs = response
                        .headers()
                        .get("Retry-After")
                        .and_then(|secs| secs.to_str().ok());
                    let secs = retry_after_secs.unwrap_or("2").parse::<u64>().unwrap_or(2);
                    let delay = Duration::from_secs(secs).min(MAX_RETRY_AFTER);
                    log::info!("rate limited, retrying {url} in {delay:?}");
                    thread::sleep(delay);
                    attempt += 1;
                }
                status if status.is_success() => {
                    break Ok(response);
                }
                status => {
                    break Err(Error::FetchFailed(format!("{url}: HTTP {status}")));
                }
            }
        }
    }

    /// Send a request and return the deserialized JSON body.
    fn load<T: DeserializeOwned>(&self, url: &Url) -> Result<T, Error> {
        let mut response = self.with_retry(url, || self.request(url))?;
        response
            .body_mut()
            .read_json()
            .map_err(|err| Error::FetchFailed(format!("{url}: malformed payload: {err}")))
    }

    /// A listing payload carries no body; keep the one we already have.
    fn merge_listing(&self, mut tab: Tab) -> Tab {
        if !tab.has_content() {
            if let Some(stored) = self.store.get_tab(tab.id) {
                tab.content = stored.content.clone();
            }
        }
        tab
    }
}

impl RemoteFetcher for WebApi {
    fn fetch_tab_detail(&self, id: TabId) -> Result<(), Error> {
        let tab_id = id.to_string();
        let url = self.endpoint(&["tab", "info"], &[("tab_id", &tab_id)])?;
        let payload: TabPayload = self.load(&url)?;
        if payload.id != id {
            return Err(Error::FetchFailed(format!(
                "{url}: catalog returned tab {} instead",
                payload.id
            )));
        }
        log::debug!("fetched tab {id}");
        self.store.put_tab(payload.into_tab())
    }

    fn fetch_top_tabs(&self) -> Result<Vec<TabId>, Error> {
        let url = self.endpoint(
            &["tab", "explore"],
            &[("order", "hitstotal_desc"), ("page", "1")],
        )?;
        let payloads: Vec<TabPayload> = self.load(&url)?;

        let mut ids = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let tab = self.merge_listing(payload.into_tab());
            ids.push(tab.id);
            self.store.put_tab(tab)?;
        }
        self.store
            .put_playlist(&Playlist::top_tabs(&ids, unix_now()))?;
        log::info!("fetched {} top tabs", ids.len());
        Ok(ids)
    }
}

#[derive(Deserialize)]
struct TabPayload {
    id: TabId,
    #[serde(default, deserialize_with = "deserialize_null_arc_str")]
    song_name: Arc<str>,
    #[serde(default, deserialize_with = "deserialize_null_arc_str")]
    artist_name: Arc<str>,
    #[serde(default, rename = "type", deserialize_with = "deserialize_null_arc_str")]
    tab_type: Arc<str>,
    #[serde(default, deserialize_with = "deserialize_null_arc_str")]
    part: Arc<str>,
    #[serde(default, deserialize_with = "deserialize_num_or_str")]
    version: Arc<str>,
    #[serde(default)]
    votes: Option<u32>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_lenient_i64")]
    date: i64,
    #[serde(default, deserialize_with = "deserialize_null_arc_str")]
    status: Arc<str>,
    #[serde(default, deserialize_with = "deserialize_null_arc_str")]
    tab_access_type: Arc<str>,
    #[serde(default, deserialize_with = "deserialize_null_arc_str")]
    tonality_name: Arc<str>,
    #[serde(default, deserialize_with = "deserialize_null_arc_str")]
    version_description: Arc<str>,
    #[serde(default)]
    capo: Option<u8>,
    #[serde(default)]
    tuning: Option<TuningPayload>,
    #[serde(default, deserialize_with = "deserialize_null_arc_str")]
    difficulty: Arc<str>,
    #[serde(default)]
    contributor: Option<ContributorPayload>,
    #[serde(default, deserialize_with = "deserialize_null_arc_str")]
    content: Arc<str>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TuningPayload {
    Plain(String),
    Named { value: String },
}

#[derive(Deserialize)]
struct ContributorPayload {
    username: String,
}

impl TabPayload {
    fn into_tab(self) -> Tab {
        let tuning = match self.tuning {
            Some(TuningPayload::Plain(value)) | Some(TuningPayload::Named { value }) => {
                value.into()
            }
            None => "".into(),
        };
        Tab {
            id: self.id,
            song_name: self.song_name,
            artist_name: self.artist_name,
            tab_type: self.tab_type,
            part: self.part,
            version: self.version,
            votes: self.votes.unwrap_or(0),
            rating: self.rating.unwrap_or(0.0),
            date: self.date,
            status: self.status,
            tab_access_type: self.tab_access_type,
            tonality_name: self.tonality_name,
            version_description: self.version_description,
            capo: self.capo.unwrap_or(0),
            tuning,
            difficulty: self.difficulty,
            contributor_user_name: self
                .contributor
                .map(|c| c.username.into())
                .unwrap_or_else(|| "".into()),
            content: self.content,
        }
    }
}
