//! Infobox adapter with an ordered list of retrieval tiers.
//!
//! Tier one reads the rendered lead section (infobox table plus paragraphs).
//! Any failure there (an error status, an exhausted retry budget, an
//! unreadable or empty payload) falls through to tier two, the raw article
//! wikitext, which the extractor parses. Both tiers emit the same fact shape.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Deserialize;

use super::wikipedia::{WikiPage, WikipediaPageDirectory, WIKIPEDIA_ACTION_API_URL, WIKIPEDIA_REST_BASE_URL};
use super::SourceAdapter;
use crate::cancellation::CancelToken;
use crate::error::SourceError;
use crate::extractor::{self, html};
use crate::http_client::{HttpRequest, HttpResponse, RateLimitedClient, Upstream};
use crate::model::{ArtistQuery, FieldName, FieldValue, SourceFact, SourceId};

const LEAD_CONFIDENCE: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    MobileSections,
    ActionWikitext,
}

impl Tier {
    pub const ORDER: [Tier; 2] = [Tier::MobileSections, Tier::ActionWikitext];

    fn label(self) -> &'static str {
        match self {
            Self::MobileSections => "mobile-sections",
            Self::ActionWikitext => "action-wikitext",
        }
    }
}

#[derive(Debug, Deserialize)]
struct MobileSections {
    #[serde(default)]
    lead: MobileLead,
}

#[derive(Debug, Default, Deserialize)]
struct MobileLead {
    #[serde(default)]
    sections: Vec<MobileSection>,
}

#[derive(Debug, Deserialize)]
struct MobileSection {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct RevisionsResponse {
    query: Option<RevisionsQuery>,
}

#[derive(Debug, Deserialize)]
struct RevisionsQuery {
    #[serde(default)]
    pages: Vec<RevisionPage>,
}

#[derive(Debug, Deserialize)]
struct RevisionPage {
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    revisions: Vec<Revision>,
}

#[derive(Debug, Deserialize)]
struct Revision {
    slots: RevisionSlots,
}

#[derive(Debug, Deserialize)]
struct RevisionSlots {
    main: RevisionSlot,
}

#[derive(Debug, Deserialize)]
struct RevisionSlot {
    #[serde(default)]
    content: String,
}

fn with_lead(mut facts: Vec<SourceFact>, lead: String, tier: Tier) -> Vec<SourceFact> {
    if !lead.is_empty() {
        facts.insert(
            0,
            SourceFact::new(
                FieldName::BiographyText,
                FieldValue::Text(lead),
                SourceId::WikipediaStructured,
            )
            .with_confidence(LEAD_CONFIDENCE)
            .with_evidence(format!("lead section via {}", tier.label())),
        );
    }
    facts
}

/// Parses a `mobile-sections` payload into facts.
pub fn parse_mobile_sections(body: &str) -> Result<Vec<SourceFact>, SourceError> {
    let payload: MobileSections = serde_json::from_str(body)?;
    let section = payload
        .lead
        .sections
        .into_iter()
        .next()
        .map(|section| section.text)
        .unwrap_or_default();
    Ok(with_lead(
        html::extract_infobox(&section),
        html::lead_text(&section),
        Tier::MobileSections,
    ))
}

/// Parses an action-API `revisions` payload into facts.
pub fn parse_revisions(body: &str) -> Result<Vec<SourceFact>, SourceError> {
    let payload: RevisionsResponse = serde_json::from_str(body)?;
    let page = payload
        .query
        .and_then(|query| query.pages.into_iter().next())
        .ok_or_else(|| SourceError::Parse("revisions response missing pages".to_string()))?;
    if page.missing {
        return Err(SourceError::NotFound);
    }
    let wikitext = page
        .revisions
        .into_iter()
        .next()
        .map(|revision| revision.slots.main.content)
        .unwrap_or_default();
    Ok(with_lead(
        extractor::extract(&wikitext),
        extractor::lead_text(&wikitext),
        Tier::ActionWikitext,
    ))
}

pub struct WikipediaStructuredAdapter {
    client: Arc<RateLimitedClient>,
    directory: Arc<WikipediaPageDirectory>,
}

impl WikipediaStructuredAdapter {
    pub fn new(client: Arc<RateLimitedClient>, directory: Arc<WikipediaPageDirectory>) -> Self {
        Self { client, directory }
    }

    fn tier_request(tier: Tier, page: &WikiPage) -> HttpRequest {
        match tier {
            Tier::MobileSections => HttpRequest::get(format!(
                "{}/page/mobile-sections/{}",
                WIKIPEDIA_REST_BASE_URL,
                page.path_title()
            )),
            Tier::ActionWikitext => HttpRequest::get(format!(
                "{}?action=query&prop=revisions&rvprop=content&rvslots=main&format=json&formatversion=2&titles={}",
                WIKIPEDIA_ACTION_API_URL,
                urlencoding::encode(&page.title)
            )),
        }
    }

    fn parse_tier(tier: Tier, response: HttpResponse) -> Result<Vec<SourceFact>, SourceError> {
        let response = response.ensure_success()?;
        match tier {
            Tier::MobileSections => parse_mobile_sections(&response.body),
            Tier::ActionWikitext => parse_revisions(&response.body),
        }
    }

    fn run_tier(&self, tier: Tier, page: &WikiPage, cancel: &CancelToken) -> Result<Vec<SourceFact>, SourceError> {
        let response = self
            .client
            .call(Upstream::Wikipedia, &Self::tier_request(tier, page), cancel)?;
        Self::parse_tier(tier, response)
    }
}

impl SourceAdapter for WikipediaStructuredAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::WikipediaStructured
    }

    /// Tries each tier in order; the last tier's error surfaces when none answers.
    fn fetch(&self, query: &ArtistQuery, cancel: &CancelToken) -> Result<Vec<SourceFact>, SourceError> {
        let page = self.directory.lookup(query, cancel)?;
        let mut last_error = SourceError::NotFound;
        for (index, tier) in Tier::ORDER.into_iter().enumerate() {
            let is_last = index + 1 == Tier::ORDER.len();
            let mut facts = match self.run_tier(tier, &page, cancel) {
                Ok(facts) if facts.is_empty() && !is_last => {
                    info!(
                        "WikipediaStructured: {} had nothing for '{}', trying next tier",
                        tier.label(),
                        page.title
                    );
                    continue;
                }
                Ok(facts) => facts,
                Err(SourceError::Cancelled) => return Err(SourceError::Cancelled),
                Err(error) => {
                    if is_last {
                        warn!(
                            "WikipediaStructured: {} failed for '{}': {}",
                            tier.label(),
                            page.title,
                            error
                        );
                    } else {
                        info!(
                            "WikipediaStructured: {} failed for '{}' ({}), trying next tier",
                            tier.label(),
                            page.title,
                            error
                        );
                    }
                    last_error = error;
                    continue;
                }
            };
            debug!(
                "WikipediaStructured: {} facts for '{}' via {}",
                facts.len(),
                page.title,
                tier.label()
            );
            facts.push(SourceFact::new(
                FieldName::WikipediaUrl,
                FieldValue::Text(page.url.clone()),
                SourceId::WikipediaStructured,
            ));
            return Ok(facts);
        }
        Err(last_error)
    }
}
