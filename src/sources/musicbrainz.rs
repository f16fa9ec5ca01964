//! Fallback narrative adapter backed by the MusicBrainz web service.

use std::sync::Arc;

use log::debug;
use serde::Deserialize;

use super::matching::{self, NameMatchTier};
use super::SourceAdapter;
use crate::cancellation::CancelToken;
use crate::error::SourceError;
use crate::extractor::dates::parse_plain_date;
use crate::extractor::markup::dedup_case_insensitive;
use crate::http_client::{HttpRequest, RateLimitedClient, Upstream};
use crate::model::{ArtistQuery, FieldName, FieldValue, SourceFact, SourceId};

const MUSICBRAINZ_API_BASE: &str = "https://musicbrainz.org/ws/2";
const MUSICBRAINZ_ARTIST_URL: &str = "https://musicbrainz.org/artist";
const SEARCH_LIMIT: usize = 5;
const MAX_ALIASES: usize = 10;
const FALLBACK_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    artists: Vec<ArtistHit>,
}

#[derive(Debug, Clone, Deserialize)]
struct ArtistHit {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    score: u32,
}

#[derive(Debug, Default, Deserialize)]
struct ArtistDetails {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    annotation: Option<String>,
    #[serde(default)]
    aliases: Vec<Named>,
    #[serde(default, rename = "life-span")]
    life_span: Option<LifeSpan>,
    #[serde(default, rename = "begin-area")]
    begin_area: Option<Named>,
}

#[derive(Debug, Deserialize)]
struct Named {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct LifeSpan {
    #[serde(default)]
    begin: Option<String>,
    #[serde(default)]
    end: Option<String>,
}

/// Best hit by name tier, then search score; hits that do not match at all lose
/// to the service's own ranking.
fn choose_hit(artist: &str, hits: &[ArtistHit]) -> Option<ArtistHit> {
    hits.iter()
        .enumerate()
        .max_by(|(left_index, left), (right_index, right)| {
            let left_tier = matching::name_match_tier(artist, &left.name);
            let right_tier = matching::name_match_tier(artist, &right.name);
            left_tier
                .cmp(&right_tier)
                .then_with(|| left.score.cmp(&right.score))
                .then_with(|| right_index.cmp(left_index))
        })
        .filter(|(_, hit)| matching::name_match_tier(artist, &hit.name) > NameMatchTier::None)
        .map(|(_, hit)| hit.clone())
        .or_else(|| hits.first().cloned())
}

fn details_facts(mbid: &str, details: ArtistDetails) -> Vec<SourceFact> {
    let evidence = format!("{MUSICBRAINZ_ARTIST_URL}/{mbid}");
    let fact = |field: FieldName, value: FieldValue| {
        SourceFact::new(field, value, SourceId::MusicBrainz)
            .with_confidence(FALLBACK_CONFIDENCE)
            .with_evidence(evidence.clone())
    };

    let mut facts = vec![SourceFact::new(
        FieldName::MusicBrainzUrl,
        FieldValue::Text(evidence.clone()),
        SourceId::MusicBrainz,
    )];

    if let Some(annotation) = details
        .annotation
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
    {
        facts.push(fact(
            FieldName::BiographyText,
            FieldValue::Text(annotation.to_string()),
        ));
    }

    let mut aliases = dedup_case_insensitive(
        details
            .aliases
            .iter()
            .map(|alias| alias.name.trim().to_string())
            .filter(|name| !name.is_empty()),
    );
    aliases.truncate(MAX_ALIASES);
    if !aliases.is_empty() {
        facts.push(fact(FieldName::AlsoKnownAs, FieldValue::List(aliases)));
    }

    if details.kind.as_deref() == Some("Person") {
        if let Some(life_span) = &details.life_span {
            for (field, raw) in [
                (FieldName::BirthDate, life_span.begin.as_deref()),
                (FieldName::DeathDate, life_span.end.as_deref()),
            ] {
                if let Some(date) = raw.and_then(parse_plain_date) {
                    facts.push(fact(field, FieldValue::Date(date)));
                }
            }
        }
        if let Some(area) = details
            .begin_area
            .as_ref()
            .map(|area| area.name.trim())
            .filter(|name| !name.is_empty())
        {
            facts.push(fact(FieldName::Birthplace, FieldValue::Text(area.to_string())));
        }
    }
    facts
}

pub struct MusicBrainzAdapter {
    client: Arc<RateLimitedClient>,
}

impl MusicBrainzAdapter {
    pub fn new(client: Arc<RateLimitedClient>) -> Self {
        Self { client }
    }

    fn search(&self, query: &ArtistQuery, cancel: &CancelToken) -> Result<Vec<ArtistHit>, SourceError> {
        let lucene = format!("name:\"{}\"", query.name.replace('"', ""));
        let url = format!(
            "{}/artist/?query={}&fmt=json&limit={}",
            MUSICBRAINZ_API_BASE,
            urlencoding::encode(&lucene),
            SEARCH_LIMIT
        );
        let response = self
            .client
            .call(Upstream::MusicBrainz, &HttpRequest::get(url), cancel)?
            .ensure_success()?;
        let parsed: SearchResponse = serde_json::from_str(&response.body)?;
        Ok(parsed.artists)
    }

    fn details(&self, mbid: &str, cancel: &CancelToken) -> Result<ArtistDetails, SourceError> {
        let url = format!(
            "{}/artist/{}?inc=aliases+annotation+tags+genres&fmt=json",
            MUSICBRAINZ_API_BASE,
            urlencoding::encode(mbid)
        );
        let response = self
            .client
            .call(Upstream::MusicBrainz, &HttpRequest::get(url), cancel)?
            .ensure_success()?;
        Ok(serde_json::from_str(&response.body)?)
    }
}

impl SourceAdapter for MusicBrainzAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::MusicBrainz
    }

    fn fetch(&self, query: &ArtistQuery, cancel: &CancelToken) -> Result<Vec<SourceFact>, SourceError> {
        let hits = self.search(query, cancel)?;
        let hit = choose_hit(&query.name, &hits).ok_or(SourceError::NotFound)?;
        debug!("MusicBrainz: '{}' matched {} ({})", query.name, hit.name, hit.id);
        let details = self.details(&hit.id, cancel)?;
        Ok(details_facts(&hit.id, details))
    }
}
