//! Optional research supplement backed by the Perplexity chat completions API.
//!
//! The model is asked for a JSON research object: a narrative biography, a
//! relationship graph (mentors, collaborators, influenced) and the names of the
//! sources it consulted. Answers whose narrative is missing, a refusal, too
//! short or not about music are rejected. Everything returned here is
//! supplementary; a missing or rejected answer never blocks a baseline record.

use std::sync::Arc;

use log::{debug, warn};
use serde::Deserialize;
use serde_json::{json, Value};

use super::SourceAdapter;
use crate::cancellation::CancelToken;
use crate::error::SourceError;
use crate::extractor::markup::dedup_case_insensitive;
use crate::http_client::{HttpRequest, RateLimitedClient, Upstream};
use crate::model::{
    ArtistQuery, FieldName, FieldValue, Relationship, RelationshipGraph, SourceFact, SourceId,
};

const PERPLEXITY_CHAT_URL: &str = "https://api.perplexity.ai/chat/completions";
const RESEARCH_TEMPERATURE: f64 = 0.3;
const RESEARCH_MAX_TOKENS: u32 = 4_096;
const BIOGRAPHY_CONFIDENCE: f32 = 0.7;
const DEFAULT_CONNECTION_CONFIDENCE: f32 = 0.95;
const MIN_NARRATIVE_CHARS: usize = 200;

/// Phrases the model uses when it could not identify a real artist.
const REFUSAL_PHRASES: [&str; 9] = [
    "no credible information",
    "cannot find information",
    "appears to be misidentified",
    "not a real artist",
    "not a musician",
    "not a band",
    "is a recipe",
    "is a list",
    "is a genre",
];

const MUSICAL_TERMS: [&str; 8] = [
    "music", "musician", "band", "artist", "song", "album", "record", "perform",
];

const SYSTEM_PROMPT: &str = "You are an expert music researcher with access to web search. \
Provide accurate, well-researched information about musical artists. \
Always respond with valid JSON only.";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResearchPayload {
    #[serde(default)]
    biography: String,
    #[serde(default)]
    connections: ResearchConnections,
    #[serde(default)]
    sources: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResearchConnections {
    #[serde(default)]
    mentors: Vec<ResearchConnection>,
    #[serde(default)]
    collaborators: Vec<ResearchConnection>,
    #[serde(default)]
    influenced: Vec<ResearchConnection>,
}

#[derive(Debug, Deserialize)]
struct ResearchConnection {
    #[serde(default)]
    name: String,
    #[serde(default)]
    context: String,
    #[serde(default)]
    specific_works: Option<Value>,
    #[serde(default)]
    time_period: Option<Value>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Model output is loosely typed: strings, lists of strings, or numbers.
fn loose_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(text) => text.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| loose_text(Some(item)))
            .collect::<Vec<_>>()
            .join(", "),
        Value::Number(number) => number.to_string(),
        _ => String::new(),
    };
    (!text.is_empty()).then_some(text)
}

/// Removes a surrounding Markdown code fence, with or without a language tag.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn relationships(entries: Vec<ResearchConnection>) -> Vec<Relationship> {
    entries
        .into_iter()
        .filter(|entry| !entry.name.trim().is_empty())
        .map(|entry| Relationship {
            name: entry.name.trim().to_string(),
            context: entry.context.trim().to_string(),
            specific_work: loose_text(entry.specific_works.as_ref()),
            time_period: loose_text(entry.time_period.as_ref()),
            confidence: entry
                .confidence
                .filter(|value| value.is_finite())
                .unwrap_or(DEFAULT_CONNECTION_CONFIDENCE)
                .clamp(0.0, 1.0),
            source: SourceId::AiResearch,
        })
        .collect()
}

/// Rejects narratives that are refusals, too short, or not about music.
pub fn validate_narrative(biography: &str) -> Result<(), SourceError> {
    let lowered = biography.to_lowercase();
    if let Some(phrase) = REFUSAL_PHRASES.iter().find(|phrase| lowered.contains(*phrase)) {
        return Err(SourceError::Parse(format!(
            "research narrative reports no credible artist ('{phrase}')"
        )));
    }
    let chars = biography.chars().count();
    if chars < MIN_NARRATIVE_CHARS {
        return Err(SourceError::Parse(format!(
            "research narrative too short ({chars} chars)"
        )));
    }
    if !MUSICAL_TERMS.iter().any(|term| lowered.contains(term)) {
        return Err(SourceError::Parse(
            "research narrative lacks musical context".to_string(),
        ));
    }
    Ok(())
}

/// Parses the assistant message content into research facts.
///
/// A payload without a credible biography is rejected as a whole, so its
/// relationship graph is dropped too.
pub fn parse_research(content: &str) -> Result<Vec<SourceFact>, SourceError> {
    let payload: ResearchPayload = serde_json::from_str(strip_code_fence(content))?;
    let biography = payload.biography.trim();
    if biography.is_empty() {
        return Err(SourceError::Parse("research response has no biography".to_string()));
    }
    validate_narrative(biography)?;

    let mut facts = vec![SourceFact::new(
        FieldName::BiographyText,
        FieldValue::Text(biography.to_string()),
        SourceId::AiResearch,
    )
    .with_confidence(BIOGRAPHY_CONFIDENCE)
    .with_evidence("web research narrative")];

    let graph = RelationshipGraph {
        mentors: relationships(payload.connections.mentors),
        collaborators: relationships(payload.connections.collaborators),
        influenced: relationships(payload.connections.influenced),
    };
    if !graph.is_empty() {
        facts.push(SourceFact::new(
            FieldName::Relationships,
            FieldValue::Relationships(graph),
            SourceId::AiResearch,
        ));
    }

    let citations = dedup_case_insensitive(
        payload
            .sources
            .into_iter()
            .map(|source| source.trim().to_string())
            .filter(|source| !source.is_empty()),
    );
    if !citations.is_empty() {
        facts.push(SourceFact::new(
            FieldName::Citations,
            FieldValue::List(citations),
            SourceId::AiResearch,
        ));
    }
    Ok(facts)
}

fn research_prompt(query: &ArtistQuery) -> String {
    let genres = if query.genre_hints.is_empty() {
        "Unknown".to_string()
    } else {
        query.genre_hints.join(", ")
    };
    format!(
        r#"Research the musical artist "{name}" and provide biographical information.

Known genres: {genres}

Provide:
1. A biography of 2-3 paragraphs: early life, career milestones, style and legacy.
2. Musical connections: mentors and influences, key collaborators, and artists they influenced. For each give the name, the nature of the relationship, specific works and the time period.
3. The names of the sources you used.

Respond with JSON only:
{{
  "biography": "...",
  "connections": {{
    "mentors": [{{"name": "", "context": "", "specific_works": "", "time_period": ""}}],
    "collaborators": [{{"name": "", "context": "", "specific_works": "", "time_period": ""}}],
    "influenced": [{{"name": "", "context": "", "specific_works": "", "time_period": ""}}]
  }},
  "sources": ["..."]
}}

Only include connections documented in credible sources."#,
        name = query.name,
        genres = genres
    )
}

pub struct AiResearchAdapter {
    client: Arc<RateLimitedClient>,
    api_key: String,
    model: String,
}

impl AiResearchAdapter {
    pub fn new(client: Arc<RateLimitedClient>, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }

    fn request_body(&self, query: &ArtistQuery) -> Value {
        json!({
            "model": self.model,
            "temperature": RESEARCH_TEMPERATURE,
            "max_tokens": RESEARCH_MAX_TOKENS,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": research_prompt(query)},
            ],
        })
    }
}

impl SourceAdapter for AiResearchAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::AiResearch
    }

    fn fetch(&self, query: &ArtistQuery, cancel: &CancelToken) -> Result<Vec<SourceFact>, SourceError> {
        let request =
            HttpRequest::post_json(PERPLEXITY_CHAT_URL, &self.request_body(query)).bearer(&self.api_key);
        let response = self
            .client
            .call(Upstream::Perplexity, &request, cancel)?
            .ensure_success()?;
        let chat: ChatResponse = serde_json::from_str(&response.body)?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(SourceError::NotFound)?;

        let facts = parse_research(&content).map_err(|error| {
            warn!("AiResearch: rejected research for '{}': {}", query.name, error);
            error
        })?;
        debug!("AiResearch: {} facts for '{}'", facts.len(), query.name);
        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{parse_research, strip_code_fence, validate_narrative, AiResearchAdapter};
    use crate::cancellation::CancelToken;
    use crate::config::NetworkConfig;
    use crate::error::SourceError;
    use crate::http_client::testing::FakeTransport;
    use crate::http_client::{RateLimitedClient, RequestBody};
    use crate::model::{ArtistQuery, FieldName, FieldValue, SourceId};
    use crate::sources::SourceAdapter;

    const RESEARCH: &str = r#"```json
{
  "biography": "John Coltrane was an American jazz saxophonist and composer. He worked in the bebop and hard bop idioms early in his career, recorded Giant Steps in 1959, and led the classic quartet whose album A Love Supreme remains one of the most celebrated records in jazz.",
  "connections": {
    "mentors": [{"name": "Miles Davis", "context": "Hired him for the first great quintet", "time_period": "1955-1960"}],
    "collaborators": [
      {"name": "McCoy Tyner", "context": "Pianist in the classic quartet", "specific_works": ["A Love Supreme", "Crescent"], "confidence": 1.7},
      {"name": "", "context": "nameless"}
    ],
    "influenced": []
  },
  "fun_facts": ["Practised constantly"],
  "sources": ["Wikipedia", "AllMusic", "wikipedia"]
}
```"#;

    #[test]
    fn test_strip_code_fence_handles_tagged_and_bare_fences() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }

    #[test]
    fn test_parse_research_builds_graph_with_defaults_and_clamps() {
        let facts = parse_research(RESEARCH).expect("fenced research should parse");

        let biography = facts
            .iter()
            .find(|fact| fact.field == FieldName::BiographyText)
            .expect("biography fact");
        assert!((biography.confidence - 0.7).abs() < f32::EPSILON);

        let graph = facts
            .iter()
            .find_map(|fact| match &fact.value {
                FieldValue::Relationships(graph) => Some(graph.clone()),
                _ => None,
            })
            .expect("relationship graph");
        assert_eq!(graph.mentors.len(), 1);
        assert!((graph.mentors[0].confidence - 0.95).abs() < f32::EPSILON);
        assert_eq!(graph.mentors[0].time_period.as_deref(), Some("1955-1960"));
        assert_eq!(graph.collaborators.len(), 1);
        assert!((graph.collaborators[0].confidence - 1.0).abs() < f32::EPSILON);
        assert_eq!(
            graph.collaborators[0].specific_work.as_deref(),
            Some("A Love Supreme, Crescent")
        );
        assert!(graph.influenced.is_empty());
        assert!(graph
            .collaborators
            .iter()
            .all(|entry| entry.source == SourceId::AiResearch));

        let citations = facts
            .iter()
            .find(|fact| fact.field == FieldName::Citations)
            .and_then(|fact| fact.value.as_list().map(<[String]>::to_vec));
        assert_eq!(
            citations,
            Some(vec!["Wikipedia".to_string(), "AllMusic".to_string()])
        );
    }

    #[test]
    fn test_parse_research_rejects_prose() {
        assert!(matches!(
            parse_research("I could not find this artist."),
            Err(SourceError::Parse(_))
        ));
    }

    fn narrative(text: &str) -> String {
        serde_json::json!({
            "biography": text,
            "connections": {"collaborators": [{"name": "McCoy Tyner", "context": "Pianist"}]},
        })
        .to_string()
    }

    #[test]
    fn test_parse_research_rejects_refusal_narratives() {
        let refusal = format!(
            "There is no credible information about this name as a musician. {}",
            "Searches return unrelated people with similar names and no recordings. ".repeat(4)
        );
        assert!(matches!(
            parse_research(&narrative(&refusal)),
            Err(SourceError::Parse(message)) if message.contains("no credible information")
        ));
    }

    #[test]
    fn test_parse_research_rejects_short_narratives() {
        assert!(matches!(
            parse_research(&narrative("A jazz saxophonist.")),
            Err(SourceError::Parse(message)) if message.contains("too short")
        ));
    }

    #[test]
    fn test_parse_research_requires_biography() {
        let without_biography = r#"{"connections":{"mentors":[{"name":"Miles Davis","context":"Bandleader"}]},"sources":["AllMusic"]}"#;
        assert!(matches!(
            parse_research(without_biography),
            Err(SourceError::Parse(message)) if message.contains("no biography")
        ));
    }

    #[test]
    fn test_validate_narrative_needs_musical_context() {
        let unrelated = "Coltrane is a small unincorporated community in the county. ".repeat(5);
        assert!(matches!(
            validate_narrative(&unrelated),
            Err(SourceError::Parse(message)) if message.contains("musical context")
        ));
        let credible = "John Coltrane was an American jazz saxophonist who led one of the most influential bands of the 1960s. ".repeat(3);
        assert_eq!(validate_narrative(&credible), Ok(()));
    }

    #[test]
    fn test_fetch_posts_chat_request_with_bearer_key() {
        let transport = Arc::new(FakeTransport::new());
        let content = serde_json::to_string(RESEARCH).expect("string encodes");
        transport.reply(
            "chat/completions",
            200,
            &format!(r#"{{"choices":[{{"message":{{"role":"assistant","content":{content}}}}}]}}"#),
        );
        let network = NetworkConfig {
            ai_interval_ms: 0,
            ..NetworkConfig::default()
        };
        let adapter = AiResearchAdapter::new(
            Arc::new(RateLimitedClient::new(transport.clone(), &network)),
            "pplx-key".to_string(),
            "sonar-pro".to_string(),
        );

        let facts = adapter
            .fetch(
                &ArtistQuery::new("John Coltrane").with_genre_hints(vec!["jazz".to_string()]),
                &CancelToken::new(),
            )
            .expect("research should succeed");
        assert_eq!(facts.len(), 3);

        let calls = transport.calls.lock().unwrap();
        let (_, request) = calls.first().expect("one request");
        assert!(request
            .headers
            .contains(&("Authorization".to_string(), "Bearer pplx-key".to_string())));
        match &request.body {
            Some(RequestBody::Json(body)) => {
                assert!(body.contains("\"model\":\"sonar-pro\""));
                assert!(body.contains("Known genres: jazz"));
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }
}
