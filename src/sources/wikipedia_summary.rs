//! Narrative summary adapter backed by the Wikipedia REST summary endpoint.

use std::sync::Arc;

use log::debug;
use serde::Deserialize;

use super::wikipedia::{WikiPage, WikipediaPageDirectory, WIKIPEDIA_ACTION_API_URL, WIKIPEDIA_REST_BASE_URL};
use super::SourceAdapter;
use crate::cancellation::CancelToken;
use crate::error::SourceError;
use crate::http_client::{HttpRequest, RateLimitedClient, Upstream};
use crate::model::{ArtistQuery, FieldName, FieldValue, SourceFact, SourceId};

const SUMMARY_CONFIDENCE: f32 = 0.6;
const SHORT_EXTRACT_CHARS: usize = 200;
const FULL_EXTRACT_CHARS: usize = 2_500;

#[derive(Debug, Default, Deserialize)]
struct PageSummary {
    #[serde(default)]
    extract: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: Option<PageUrl>,
}

#[derive(Debug, Deserialize)]
struct PageUrl {
    page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    query: Option<ExtractQuery>,
}

#[derive(Debug, Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: Vec<ExtractPage>,
}

#[derive(Debug, Deserialize)]
struct ExtractPage {
    #[serde(default)]
    extract: String,
}

pub struct WikipediaSummaryAdapter {
    client: Arc<RateLimitedClient>,
    directory: Arc<WikipediaPageDirectory>,
}

impl WikipediaSummaryAdapter {
    pub fn new(client: Arc<RateLimitedClient>, directory: Arc<WikipediaPageDirectory>) -> Self {
        Self { client, directory }
    }

    fn fetch_summary(&self, page: &WikiPage, cancel: &CancelToken) -> Result<PageSummary, SourceError> {
        let url = format!("{}/page/summary/{}", WIKIPEDIA_REST_BASE_URL, page.path_title());
        let response = self
            .client
            .call(Upstream::Wikipedia, &HttpRequest::get(url), cancel)?
            .ensure_success()?;
        Ok(serde_json::from_str(&response.body)?)
    }

    fn fetch_full_extract(&self, page: &WikiPage, cancel: &CancelToken) -> Result<String, SourceError> {
        let url = format!(
            "{}?action=query&prop=extracts&exintro=1&explaintext=1&exsectionformat=plain&exchars={}&format=json&formatversion=2&titles={}",
            WIKIPEDIA_ACTION_API_URL,
            FULL_EXTRACT_CHARS,
            urlencoding::encode(&page.title)
        );
        let response = self
            .client
            .call(Upstream::Wikipedia, &HttpRequest::get(url), cancel)?
            .ensure_success()?;
        let parsed: ExtractResponse = serde_json::from_str(&response.body)?;
        Ok(parsed
            .query
            .and_then(|query| query.pages.into_iter().next())
            .map(|page| page.extract.trim().to_string())
            .unwrap_or_default())
    }
}

fn summary_facts(page: &WikiPage, summary: PageSummary, biography: String) -> Vec<SourceFact> {
    let mut facts = Vec::new();
    if !biography.is_empty() {
        facts.push(
            SourceFact::new(
                FieldName::BiographyText,
                FieldValue::Text(biography),
                SourceId::WikipediaSummary,
            )
            .with_confidence(SUMMARY_CONFIDENCE)
            .with_evidence(format!("summary of {}", page.title)),
        );
    }
    let description = summary.description.trim();
    if !description.is_empty() {
        facts.push(
            SourceFact::new(
                FieldName::Description,
                FieldValue::Text(description.to_string()),
                SourceId::WikipediaSummary,
            )
            .with_confidence(SUMMARY_CONFIDENCE),
        );
    }
    let url = summary
        .content_urls
        .and_then(|urls| urls.desktop)
        .and_then(|desktop| desktop.page)
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| page.url.clone());
    facts.push(SourceFact::new(
        FieldName::WikipediaUrl,
        FieldValue::Text(url),
        SourceId::WikipediaSummary,
    ));
    facts
}

impl SourceAdapter for WikipediaSummaryAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::WikipediaSummary
    }

    fn fetch(&self, query: &ArtistQuery, cancel: &CancelToken) -> Result<Vec<SourceFact>, SourceError> {
        let page = self.directory.lookup(query, cancel)?;
        let summary = self.fetch_summary(&page, cancel)?;
        let mut biography = summary.extract.trim().to_string();
        if biography.chars().count() < SHORT_EXTRACT_CHARS {
            debug!(
                "WikipediaSummary: extract for '{}' is short ({} chars), fetching intro",
                page.title,
                biography.chars().count()
            );
            let fuller = self.fetch_full_extract(&page, cancel)?;
            if fuller.chars().count() > biography.chars().count() {
                biography = fuller;
            }
        }
        Ok(summary_facts(&page, summary, biography))
    }
}
