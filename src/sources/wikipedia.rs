//! Wikipedia page lookup shared by the Wikimedia adapters.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};
use serde::Deserialize;

use super::matching::{self, NameMatchTier};
use crate::cancellation::CancelToken;
use crate::error::SourceError;
use crate::http_client::{HttpRequest, RateLimitedClient, Upstream};
use crate::model::ArtistQuery;

pub const WIKIPEDIA_ACTION_API_URL: &str = "https://en.wikipedia.org/w/api.php";
pub const WIKIPEDIA_REST_BASE_URL: &str = "https://en.wikipedia.org/api/rest_v1";
const WIKIMEDIA_SEARCH_URL: &str = "https://api.wikimedia.org/core/v1/wikipedia/en/search/page";
const WIKIPEDIA_PAGE_BASE_URL: &str = "https://en.wikipedia.org/wiki";
const MAX_SEARCH_RESULTS: usize = 3;
/// Enough for every adapter of every in-flight resolution to share a lookup.
pub const DEFAULT_CACHED_PAGES: usize = 64;

/// A located article and its linked-data identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiPage {
    pub title: String,
    pub url: String,
    pub wikibase_item: Option<String>,
}

impl WikiPage {
    /// Title with spaces as underscores, percent-encoded for path segments.
    pub fn path_title(&self) -> String {
        urlencoding::encode(&self.title.replace(' ', "_")).into_owned()
    }
}

#[derive(Debug, Deserialize)]
struct PagePropsResponse {
    #[serde(default)]
    query: Option<PagePropsQuery>,
}

#[derive(Debug, Deserialize)]
struct PagePropsQuery {
    #[serde(default)]
    pages: Vec<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(default)]
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    fullurl: Option<String>,
    #[serde(default)]
    pageprops: HashMap<String, serde_json::Value>,
}

/// Picks a non-disambiguation title that matches the name, else the first result.
pub fn choose_title(artist: &str, titles: &[String]) -> Option<String> {
    let candidates = titles
        .iter()
        .filter(|title| !matching::looks_disambiguation(title));
    let best = candidates
        .map(|title| (matching::name_match_tier(artist, title), title))
        .filter(|(tier, _)| *tier >= NameMatchTier::NearExact)
        .max_by(|left, right| left.0.cmp(&right.0).then_with(|| right.1.len().cmp(&left.1.len())));
    best.map(|(_, title)| title.clone())
        .or_else(|| titles.first().cloned())
}

/// Recent lookups, oldest evicted first once `capacity` is reached.
struct PageCache {
    capacity: usize,
    entries: HashMap<String, Option<WikiPage>>,
    order: VecDeque<String>,
}

impl PageCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &str) -> Option<&Option<WikiPage>> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: String, page: Option<WikiPage>) {
        if self.entries.insert(key.clone(), page).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
    }
}

/// Memoizing title search plus page-properties lookup.
///
/// Successful lookups and "no page" answers are remembered per artist name,
/// up to a fixed number of recent names; transient failures are not, so a
/// later adapter may try again.
pub struct WikipediaPageDirectory {
    client: Arc<RateLimitedClient>,
    pages: Mutex<PageCache>,
}

impl WikipediaPageDirectory {
    pub fn new(client: Arc<RateLimitedClient>) -> Self {
        Self::with_capacity(client, DEFAULT_CACHED_PAGES)
    }

    pub fn with_capacity(client: Arc<RateLimitedClient>, capacity: usize) -> Self {
        Self {
            client,
            pages: Mutex::new(PageCache::new(capacity)),
        }
    }

    fn cache_key(query: &ArtistQuery) -> String {
        matching::normalize_text(&query.name)
    }

    pub fn lookup(&self, query: &ArtistQuery, cancel: &CancelToken) -> Result<WikiPage, SourceError> {
        let key = Self::cache_key(query);
        if let Some(cached) = self
            .pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return cached.clone().ok_or(SourceError::NotFound);
        }

        let resolved = match self.locate(query, cancel) {
            Ok(page) => Some(page),
            Err(SourceError::NotFound) => None,
            Err(error) => return Err(error),
        };
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, resolved.clone());
        resolved.ok_or(SourceError::NotFound)
    }

    fn locate(&self, query: &ArtistQuery, cancel: &CancelToken) -> Result<WikiPage, SourceError> {
        let url = format!(
            "{}?q={}&limit={}",
            WIKIMEDIA_SEARCH_URL,
            urlencoding::encode(&query.name),
            MAX_SEARCH_RESULTS
        );
        let response = self
            .client
            .call(Upstream::Wikipedia, &HttpRequest::get(url), cancel)?
            .ensure_success()?;
        let titles = matching::extract_title_strings(&response.json()?);
        let title = choose_title(&query.name, &titles).ok_or(SourceError::NotFound)?;
        debug!("Wikipedia: '{}' resolved to page '{}'", query.name, title);
        self.page_info(&title, cancel)
    }

    fn page_info(&self, title: &str, cancel: &CancelToken) -> Result<WikiPage, SourceError> {
        let url = format!(
            "{}?action=query&prop=pageprops|info&inprop=url&redirects=1&format=json&formatversion=2&titles={}",
            WIKIPEDIA_ACTION_API_URL,
            urlencoding::encode(title)
        );
        let response = self
            .client
            .call(Upstream::Wikipedia, &HttpRequest::get(url), cancel)?
            .ensure_success()?;
        let parsed: PagePropsResponse = serde_json::from_str(&response.body)?;
        let info = parsed
            .query
            .and_then(|query| query.pages.into_iter().next())
            .ok_or_else(|| SourceError::Parse("page properties response missing pages".to_string()))?;
        if info.missing {
            return Err(SourceError::NotFound);
        }
        if info.pageprops.contains_key("disambiguation") {
            info!("Wikipedia: '{}' is a disambiguation page, skipping", title);
            return Err(SourceError::NotFound);
        }

        let title = if info.title.trim().is_empty() {
            title.to_string()
        } else {
            info.title.trim().to_string()
        };
        let url = info.fullurl.unwrap_or_else(|| {
            format!(
                "{}/{}",
                WIKIPEDIA_PAGE_BASE_URL,
                urlencoding::encode(&title.replace(' ', "_"))
            )
        });
        let wikibase_item = info
            .pageprops
            .get("wikibase_item")
            .and_then(|value| value.as_str())
            .map(str::to_string);
        Ok(WikiPage {
            title,
            url,
            wikibase_item,
        })
    }
}
