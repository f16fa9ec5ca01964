//! Catalog adapter for the Spotify Web API (client-credentials flow).

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::matching::{self, NameMatchTier};
use super::SourceAdapter;
use crate::cancellation::CancelToken;
use crate::error::SourceError;
use crate::http_client::{HttpRequest, HttpResponse, RateLimitedClient, TokenProvider, Upstream};
use crate::model::{ArtistQuery, FieldName, FieldValue, SourceFact, SourceId};

const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SPOTIFY_SEARCH_URL: &str = "https://api.spotify.com/v1/search";
const SPOTIFY_ARTIST_URL: &str = "https://api.spotify.com/v1/artists";
const SEARCH_LIMIT: usize = 10;
const MAX_RELATED_ARTISTS: usize = 10;
const MAX_TOP_TRACKS: usize = 10;
const TOP_TRACKS_MARKET: &str = "US";
const DISCOGRAPHY_PAGE_SIZE: usize = 50;
const MAX_DISCOGRAPHY_PAGES: usize = 20;
const SPOTIFY_API_PREFIX: &str = "https://api.spotify.com/";
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3_600;
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;

/// Bearer token plus the instant after which it must be renewed.
#[derive(Debug, Clone)]
struct AuthToken {
    value: String,
    expires_at: Instant,
}

impl AuthToken {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Client-credentials token holder.
///
/// A refresh replaces the stored token only after the new one has been
/// received and parsed; a failed refresh leaves the old token in place.
pub struct SpotifyAuth {
    client: Arc<RateLimitedClient>,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AuthToken>>,
}

impl SpotifyAuth {
    pub fn new(client: Arc<RateLimitedClient>, client_id: String, client_secret: String) -> Self {
        Self {
            client,
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    fn request_token(&self, cancel: &CancelToken) -> Result<AuthToken, SourceError> {
        let request = HttpRequest::post_form(
            SPOTIFY_TOKEN_URL,
            vec![
                ("grant_type".to_string(), "client_credentials".to_string()),
                ("client_id".to_string(), self.client_id.clone()),
                ("client_secret".to_string(), self.client_secret.clone()),
            ],
        );
        let response = self.client.call(Upstream::Spotify, &request, cancel)?;
        if matches!(response.status, 400 | 401 | 403) {
            return Err(SourceError::Auth(format!(
                "token endpoint rejected client credentials (HTTP {})",
                response.status
            )));
        }
        let response = response.ensure_success()?;
        let parsed: TokenResponse = serde_json::from_str(&response.body)?;
        if parsed.access_token.trim().is_empty() {
            return Err(SourceError::Auth("token endpoint returned an empty token".to_string()));
        }
        let lifetime = parsed
            .expires_in
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
            .saturating_sub(TOKEN_EXPIRY_MARGIN_SECS);
        info!("Spotify: acquired access token");
        Ok(AuthToken {
            value: parsed.access_token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        })
    }
}

impl TokenProvider for SpotifyAuth {
    fn current_token(&self, cancel: &CancelToken) -> Result<String, SourceError> {
        let mut slot = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = slot.as_ref().filter(|token| token.is_fresh()) {
            return Ok(token.value.clone());
        }
        let fresh = self.request_token(cancel)?;
        let value = fresh.value.clone();
        *slot = Some(fresh);
        Ok(value)
    }

    fn refresh_token(&self, cancel: &CancelToken) -> Result<String, SourceError> {
        let mut slot = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = self.request_token(cancel)?;
        let value = fresh.value.clone();
        *slot = Some(fresh);
        Ok(value)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    artists: Option<ArtistPage>,
}

#[derive(Debug, Deserialize)]
struct ArtistPage {
    #[serde(default)]
    items: Vec<CatalogArtist>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogArtist {
    id: String,
    name: String,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    popularity: u64,
    #[serde(default)]
    followers: Option<Followers>,
    #[serde(default)]
    images: Vec<Image>,
    #[serde(default)]
    external_urls: Option<ExternalUrls>,
}

#[derive(Debug, Clone, Deserialize)]
struct Followers {
    total: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct Image {
    url: String,
    #[serde(default)]
    width: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelatedArtistsResponse {
    #[serde(default)]
    artists: Vec<NamedItem>,
}

#[derive(Debug, Deserialize)]
struct TopTracksResponse {
    #[serde(default)]
    tracks: Vec<NamedItem>,
}

#[derive(Debug, Deserialize)]
struct NamedItem {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumPage {
    #[serde(default)]
    items: Vec<AlbumItem>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlbumItem {
    name: String,
    #[serde(default)]
    album_type: String,
}

/// Release titles split by release type, each in catalog order without repeats.
#[derive(Debug, Default, PartialEq)]
struct Discography {
    albums: Vec<String>,
    singles: Vec<String>,
}

impl Discography {
    fn absorb(&mut self, items: Vec<AlbumItem>) {
        for item in items {
            let name = item.name.trim().to_string();
            if name.is_empty() {
                continue;
            }
            let bucket = match item.album_type.to_ascii_lowercase().as_str() {
                "album" => &mut self.albums,
                "single" => &mut self.singles,
                _ => continue,
            };
            if !bucket.iter().any(|known| known.eq_ignore_ascii_case(&name)) {
                bucket.push(name);
            }
        }
    }
}

/// Picks the candidate with the best name tier, then genre overlap, then popularity.
fn choose_candidate(query: &ArtistQuery, candidates: &[CatalogArtist]) -> Option<CatalogArtist> {
    candidates
        .iter()
        .map(|candidate| {
            (
                matching::name_match_tier(&query.name, &candidate.name),
                matching::genre_overlap(&query.genre_hints, &candidate.genres),
                candidate.popularity,
                candidate,
            )
        })
        .filter(|(tier, ..)| *tier > NameMatchTier::None)
        .max_by(|left, right| {
            left.0
                .cmp(&right.0)
                .then_with(|| left.1.cmp(&right.1))
                .then_with(|| left.2.cmp(&right.2))
        })
        .map(|(.., candidate)| candidate.clone())
}

fn catalog_fact(field: FieldName, value: FieldValue, artist_id: &str) -> SourceFact {
    SourceFact::new(field, value, SourceId::Spotify).with_evidence(format!("spotify:artist:{artist_id}"))
}

fn artist_facts(artist: &CatalogArtist) -> Vec<SourceFact> {
    let id = artist.id.as_str();
    let mut facts = vec![
        catalog_fact(FieldName::SpotifyId, FieldValue::Text(artist.id.clone()), id),
        catalog_fact(FieldName::Popularity, FieldValue::Count(artist.popularity), id),
    ];
    let url = artist
        .external_urls
        .as_ref()
        .and_then(|urls| urls.spotify.clone())
        .unwrap_or_else(|| format!("https://open.spotify.com/artist/{id}"));
    facts.push(catalog_fact(FieldName::SpotifyUrl, FieldValue::Text(url), id));
    if !artist.genres.is_empty() {
        facts.push(catalog_fact(
            FieldName::Genres,
            FieldValue::List(artist.genres.clone()),
            id,
        ));
    }
    if let Some(total) = artist.followers.as_ref().and_then(|followers| followers.total) {
        facts.push(catalog_fact(FieldName::Followers, FieldValue::Count(total), id));
    }
    if let Some(image) = artist
        .images
        .iter()
        .max_by_key(|image| image.width.unwrap_or_default())
    {
        facts.push(catalog_fact(
            FieldName::ImageUrl,
            FieldValue::Text(image.url.clone()),
            id,
        ));
    }
    facts
}

pub struct SpotifyAdapter {
    client: Arc<RateLimitedClient>,
    auth: SpotifyAuth,
}

impl SpotifyAdapter {
    pub fn new(client: Arc<RateLimitedClient>, client_id: String, client_secret: String) -> Self {
        let auth = SpotifyAuth::new(client.clone(), client_id, client_secret);
        Self { client, auth }
    }

    fn get_authorized(&self, url: &str, cancel: &CancelToken) -> Result<HttpResponse, SourceError> {
        self.client
            .call_authorized(Upstream::Spotify, &self.auth, cancel, |token| {
                HttpRequest::get(url).bearer(token)
            })
    }

    /// GET for secondary lookups: `None` when the lookup failed in a way that
    /// should only drop the field. Rejected credentials and cancellation
    /// still propagate.
    fn get_secondary(&self, url: &str, label: &str, cancel: &CancelToken) -> Result<Option<HttpResponse>, SourceError> {
        match self.get_authorized(url, cancel) {
            Ok(response) if response.is_success() => Ok(Some(response)),
            Ok(response) => {
                warn!("Spotify: {} lookup failed with HTTP {}", label, response.status);
                Ok(None)
            }
            Err(error @ (SourceError::Auth(_) | SourceError::Cancelled)) => Err(error),
            Err(error) => {
                warn!("Spotify: {} lookup failed: {}", label, error);
                Ok(None)
            }
        }
    }

    /// Secondary lookups degrade to an absent field on any HTTP or parse
    /// failure; only rejected credentials and cancellation propagate.
    fn optional_names<T: DeserializeOwned>(
        &self,
        url: &str,
        label: &str,
        cancel: &CancelToken,
        names: impl FnOnce(T) -> Vec<NamedItem>,
        limit: usize,
    ) -> Result<Vec<String>, SourceError> {
        let Some(response) = self.get_secondary(url, label, cancel)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<T>(&response.body) {
            Ok(payload) => Ok(names(payload)
                .into_iter()
                .map(|item| item.name.trim().to_string())
                .filter(|name| !name.is_empty())
                .take(limit)
                .collect()),
            Err(error) => {
                warn!("Spotify: {} payload unreadable: {}", label, error);
                Ok(Vec::new())
            }
        }
    }
}

impl SpotifyAdapter {
    /// Pages through the artist's albums and singles.
    ///
    /// A failed or unreadable page ends the walk with what was collected so
    /// far; cancellation is checked before every page.
    fn discography(&self, artist_url: &str, cancel: &CancelToken) -> Result<Discography, SourceError> {
        let mut discography = Discography::default();
        let mut next = Some(format!(
            "{artist_url}/albums?include_groups=album,single&limit={DISCOGRAPHY_PAGE_SIZE}&market={TOP_TRACKS_MARKET}"
        ));
        let mut pages = 0;
        while let Some(url) = next.take() {
            if cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }
            if pages == MAX_DISCOGRAPHY_PAGES {
                warn!("Spotify: discography truncated after {} pages", pages);
                break;
            }
            pages += 1;
            let Some(response) = self.get_secondary(&url, "discography", cancel)? else {
                break;
            };
            let page: AlbumPage = match serde_json::from_str(&response.body) {
                Ok(page) => page,
                Err(error) => {
                    warn!("Spotify: discography page {} unreadable: {}", pages, error);
                    break;
                }
            };
            discography.absorb(page.items);
            next = page.next.filter(|url| url.starts_with(SPOTIFY_API_PREFIX));
        }
        debug!(
            "Spotify: discography has {} albums and {} singles over {} page(s)",
            discography.albums.len(),
            discography.singles.len(),
            pages
        );
        Ok(discography)
    }
}

impl SourceAdapter for SpotifyAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::Spotify
    }

    fn fetch(&self, query: &ArtistQuery, cancel: &CancelToken) -> Result<Vec<SourceFact>, SourceError> {
        let url = format!(
            "{}?q={}&type=artist&limit={}",
            SPOTIFY_SEARCH_URL,
            urlencoding::encode(&query.name),
            SEARCH_LIMIT
        );
        let response = self.get_authorized(&url, cancel)?.ensure_success()?;
        let search: SearchResponse = serde_json::from_str(&response.body)?;
        let candidates = search.artists.map(|page| page.items).unwrap_or_default();
        let artist = choose_candidate(query, &candidates).ok_or(SourceError::NotFound)?;
        debug!(
            "Spotify: '{}' matched {} ({}) out of {} candidates",
            query.name,
            artist.name,
            artist.id,
            candidates.len()
        );

        let mut facts = artist_facts(&artist);
        let artist_url = format!("{}/{}", SPOTIFY_ARTIST_URL, urlencoding::encode(&artist.id));

        let related = self.optional_names(
            &format!("{artist_url}/related-artists"),
            "related artists",
            cancel,
            |payload: RelatedArtistsResponse| payload.artists,
            MAX_RELATED_ARTISTS,
        )?;
        if !related.is_empty() {
            facts.push(catalog_fact(FieldName::RelatedArtists, FieldValue::List(related), &artist.id));
        }

        let top_tracks = self.optional_names(
            &format!("{artist_url}/top-tracks?market={TOP_TRACKS_MARKET}"),
            "top tracks",
            cancel,
            |payload: TopTracksResponse| payload.tracks,
            MAX_TOP_TRACKS,
        )?;
        if !top_tracks.is_empty() {
            facts.push(catalog_fact(FieldName::TopTracks, FieldValue::List(top_tracks), &artist.id));
        }

        let discography = self.discography(&artist_url, cancel)?;
        if !discography.albums.is_empty() {
            facts.push(catalog_fact(FieldName::Albums, FieldValue::List(discography.albums), &artist.id));
        }
        if !discography.singles.is_empty() {
            facts.push(catalog_fact(FieldName::Singles, FieldValue::List(discography.singles), &artist.id));
        }
        Ok(facts)
    }
}
