//! Linked-data adapter reading Wikidata entity claims.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;

use super::wikipedia::WikipediaPageDirectory;
use super::SourceAdapter;
use crate::cancellation::CancelToken;
use crate::error::SourceError;
use crate::extractor::markup::dedup_case_insensitive;
use crate::http_client::{HttpRequest, RateLimitedClient, Upstream};
use crate::model::{
    ArtistQuery, FieldName, FieldValue, PartialDate, RangeBasis, SourceFact, SourceId, YearsActive,
};

const WIKIDATA_ENTITY_URL: &str = "https://www.wikidata.org/wiki/Special:EntityData";
const WIKIDATA_ACTION_API_URL: &str = "https://www.wikidata.org/w/api.php";
const MAX_LIST_VALUES: usize = 5;
const MAX_LABEL_IDS_PER_REQUEST: usize = 50;
const CLAIM_CONFIDENCE: f32 = 0.85;
const ASSEMBLED_YEARS_CONFIDENCE: f32 = 0.8;
const START_ONLY_YEARS_CONFIDENCE: f32 = 0.4;
const BIRTH_OFFSET_YEARS_CONFIDENCE: f32 = 0.25;
const CAREER_START_AGE: i32 = 20;

const P_BIRTH_DATE: &str = "P569";
const P_DEATH_DATE: &str = "P570";
const P_BIRTHPLACE: &str = "P19";
const P_INSTRUMENTS: &str = "P1303";
const P_BIRTH_NAME: &str = "P1477";
const P_PSEUDONYM: &str = "P742";
const P_NICKNAME: &str = "P1449";
const P_OCCUPATION: &str = "P106";
const P_RECORD_LABEL: &str = "P264";
const P_SPOUSE: &str = "P26";
const P_HAS_PART: &str = "P527";
const P_PART_OF: &str = "P361";
const P_WORK_PERIOD_START: &str = "P2031";
const P_WORK_PERIOD_END: &str = "P2032";

/// Resolves entity ids (`Q…`) to English labels.
///
/// An implementation may return fewer labels than requested; unresolved
/// entities are dropped from the affected field.
pub trait LabelLookup: Send + Sync {
    fn labels(&self, ids: &[String], cancel: &CancelToken) -> Result<HashMap<String, String>, SourceError>;
}

/// Lookup that resolves nothing, leaving label-bearing fields unknown.
pub struct NoLabelLookup;

impl LabelLookup for NoLabelLookup {
    fn labels(&self, _ids: &[String], _cancel: &CancelToken) -> Result<HashMap<String, String>, SourceError> {
        Ok(HashMap::new())
    }
}

/// Batched `wbgetentities` label lookup.
pub struct WikidataLabelLookup {
    client: Arc<RateLimitedClient>,
}

impl WikidataLabelLookup {
    pub fn new(client: Arc<RateLimitedClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct LabelsResponse {
    #[serde(default)]
    entities: HashMap<String, LabelledEntity>,
}

#[derive(Debug, Deserialize)]
struct LabelledEntity {
    #[serde(default)]
    labels: HashMap<String, LanguageValue>,
}

#[derive(Debug, Deserialize)]
struct LanguageValue {
    value: String,
}

impl LabelLookup for WikidataLabelLookup {
    fn labels(&self, ids: &[String], cancel: &CancelToken) -> Result<HashMap<String, String>, SourceError> {
        let mut resolved = HashMap::new();
        for chunk in ids.chunks(MAX_LABEL_IDS_PER_REQUEST) {
            let url = format!(
                "{}?action=wbgetentities&props=labels&languages=en&format=json&ids={}",
                WIKIDATA_ACTION_API_URL,
                urlencoding::encode(&chunk.join("|"))
            );
            let response = self
                .client
                .call(Upstream::Wikidata, &HttpRequest::get(url), cancel)?
                .ensure_success()?;
            let parsed: LabelsResponse = serde_json::from_str(&response.body)?;
            for (id, entity) in parsed.entities {
                if let Some(label) = entity.labels.get("en") {
                    resolved.insert(id, label.value.clone());
                }
            }
        }
        Ok(resolved)
    }
}

#[derive(Debug, Deserialize)]
struct EntityDocument {
    #[serde(default)]
    entities: HashMap<String, Entity>,
}

#[derive(Debug, Default, Deserialize)]
struct Entity {
    #[serde(default)]
    claims: HashMap<String, Vec<Claim>>,
}

#[derive(Debug, Deserialize)]
struct Claim {
    mainsnak: Snak,
    #[serde(default)]
    rank: String,
}

#[derive(Debug, Deserialize)]
struct Snak {
    #[serde(default)]
    datavalue: Option<DataValue>,
}

#[derive(Debug, Deserialize)]
struct DataValue {
    #[serde(rename = "type")]
    kind: String,
    value: Value,
}

/// Typed view of one claim value.
#[derive(Debug, Clone, PartialEq)]
enum ClaimValue {
    Time(PartialDate),
    Item(String),
    Text(String),
}

fn parse_time(value: &Value) -> Option<PartialDate> {
    let raw = value["time"].as_str()?;
    let precision = value["precision"].as_u64().unwrap_or(11);
    let (negative, unsigned) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };
    let date_part = unsigned.split('T').next()?;
    let mut fields = date_part.split('-');
    let year: i32 = fields.next()?.parse().ok()?;
    let year = if negative { -year } else { year };
    let month: u8 = fields.next().and_then(|part| part.parse().ok()).unwrap_or(0);
    let day: u8 = fields.next().and_then(|part| part.parse().ok()).unwrap_or(0);
    match precision {
        11.. => PartialDate::full(year, month, day)
            .or_else(|| PartialDate::year_month(year, month))
            .or(Some(PartialDate::year(year))),
        10 => PartialDate::year_month(year, month).or(Some(PartialDate::year(year))),
        _ => Some(PartialDate::year(year)),
    }
}

fn claim_value(data: &DataValue) -> Option<ClaimValue> {
    match data.kind.as_str() {
        "time" => parse_time(&data.value).map(ClaimValue::Time),
        "wikibase-entityid" => data.value["id"]
            .as_str()
            .map(|id| ClaimValue::Item(id.to_string())),
        "monolingualtext" => data.value["text"]
            .as_str()
            .map(|text| ClaimValue::Text(text.trim().to_string())),
        "string" => data
            .value
            .as_str()
            .map(|text| ClaimValue::Text(text.trim().to_string())),
        _ => None,
    }
}

/// Non-deprecated claim values per property, in document order.
#[derive(Debug, Default)]
struct ClaimSet {
    values: HashMap<String, Vec<ClaimValue>>,
}

impl ClaimSet {
    fn from_entity(entity: Entity) -> Self {
        let values = entity
            .claims
            .into_iter()
            .map(|(property, claims)| {
                let parsed = claims
                    .iter()
                    .filter(|claim| claim.rank != "deprecated")
                    .filter_map(|claim| claim.mainsnak.datavalue.as_ref().and_then(claim_value))
                    .collect();
                (property, parsed)
            })
            .collect();
        Self { values }
    }

    fn get(&self, property: &str) -> &[ClaimValue] {
        self.values.get(property).map(Vec::as_slice).unwrap_or(&[])
    }

    fn first_date(&self, property: &str) -> Option<PartialDate> {
        self.get(property).iter().find_map(|value| match value {
            ClaimValue::Time(date) => Some(*date),
            _ => None,
        })
    }

    fn items(&self, properties: &[&str]) -> Vec<String> {
        properties
            .iter()
            .flat_map(|property| self.get(property).iter().take(MAX_LIST_VALUES))
            .filter_map(|value| match value {
                ClaimValue::Item(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    fn texts(&self, properties: &[&str]) -> Vec<String> {
        properties
            .iter()
            .flat_map(|property| self.get(property).iter())
            .filter_map(|value| match value {
                ClaimValue::Text(text) if !text.is_empty() => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Entity ids whose labels the fact mapping needs.
    fn label_ids(&self) -> Vec<String> {
        let mut ids = self.items(&[P_BIRTHPLACE]);
        ids.truncate(1);
        for properties in LABELLED_LISTS.iter().map(|(_, properties)| *properties) {
            ids.extend(self.items(properties));
        }
        let mut unique = Vec::new();
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        unique
    }
}

const LABELLED_LISTS: [(FieldName, &[&str]); 5] = [
    (FieldName::Instruments, &[P_INSTRUMENTS]),
    (FieldName::Occupations, &[P_OCCUPATION]),
    (FieldName::RecordLabels, &[P_RECORD_LABEL]),
    (FieldName::Spouses, &[P_SPOUSE]),
    (FieldName::AssociatedActs, &[P_HAS_PART, P_PART_OF]),
];

fn claim_fact(field: FieldName, value: FieldValue, property: &str, entity_id: &str) -> SourceFact {
    SourceFact::new(field, value, SourceId::Wikidata)
        .with_confidence(CLAIM_CONFIDENCE)
        .with_evidence(format!("{entity_id}#{property}"))
}

/// Years active from work-period claims, else estimated from birth and death.
fn years_active_fact(claims: &ClaimSet, entity_id: &str) -> Option<SourceFact> {
    let start = claims.first_date(P_WORK_PERIOD_START).map(|date| date.year);
    let end = claims.first_date(P_WORK_PERIOD_END).map(|date| date.year);
    let death = claims.first_date(P_DEATH_DATE).map(|date| date.year);
    let birth = claims.first_date(P_BIRTH_DATE).map(|date| date.year);

    let (years, confidence, evidence) = match (start, end, birth, death) {
        (Some(start), Some(end), _, _) => (
            YearsActive::single(start, Some(end), RangeBasis::Assembled),
            ASSEMBLED_YEARS_CONFIDENCE,
            format!("{P_WORK_PERIOD_START}/{P_WORK_PERIOD_END}"),
        ),
        (Some(start), None, _, death) => (
            YearsActive::single(start, death, RangeBasis::Estimated),
            START_ONLY_YEARS_CONFIDENCE,
            format!("{P_WORK_PERIOD_START} with death year or open end"),
        ),
        (None, _, Some(birth), Some(death)) => (
            YearsActive::single(birth + CAREER_START_AGE, Some(death), RangeBasis::Estimated),
            BIRTH_OFFSET_YEARS_CONFIDENCE,
            format!("{P_BIRTH_DATE}+{CAREER_START_AGE} to {P_DEATH_DATE}"),
        ),
        _ => return None,
    };
    Some(
        SourceFact::new(FieldName::YearsActive, FieldValue::Years(years), SourceId::Wikidata)
            .with_confidence(confidence)
            .with_evidence(format!("{entity_id}#{evidence}")),
    )
}

fn claim_facts(entity_id: &str, claims: &ClaimSet, labels: &HashMap<String, String>) -> Vec<SourceFact> {
    let mut facts = vec![SourceFact::new(
        FieldName::WikidataId,
        FieldValue::Text(entity_id.to_string()),
        SourceId::Wikidata,
    )];

    for (field, property) in [(FieldName::BirthDate, P_BIRTH_DATE), (FieldName::DeathDate, P_DEATH_DATE)] {
        if let Some(date) = claims.first_date(property) {
            facts.push(claim_fact(field, FieldValue::Date(date), property, entity_id));
        }
    }

    if let Some(place) = claims
        .items(&[P_BIRTHPLACE])
        .first()
        .and_then(|id| labels.get(id))
    {
        facts.push(claim_fact(
            FieldName::Birthplace,
            FieldValue::Text(place.clone()),
            P_BIRTHPLACE,
            entity_id,
        ));
    }

    if let Some(birth_name) = claims.texts(&[P_BIRTH_NAME]).into_iter().next() {
        facts.push(claim_fact(
            FieldName::BirthName,
            FieldValue::Text(birth_name),
            P_BIRTH_NAME,
            entity_id,
        ));
    }

    let mut aliases = dedup_case_insensitive(claims.texts(&[P_PSEUDONYM, P_NICKNAME]));
    aliases.truncate(MAX_LIST_VALUES);
    if !aliases.is_empty() {
        facts.push(claim_fact(
            FieldName::AlsoKnownAs,
            FieldValue::List(aliases),
            P_PSEUDONYM,
            entity_id,
        ));
    }

    for (field, properties) in LABELLED_LISTS {
        let mut values = dedup_case_insensitive(
            claims
                .items(properties)
                .iter()
                .filter_map(|id| labels.get(id).cloned()),
        );
        values.truncate(MAX_LIST_VALUES);
        if !values.is_empty() {
            facts.push(claim_fact(
                field,
                FieldValue::List(values),
                properties.first().copied().unwrap_or_default(),
                entity_id,
            ));
        }
    }

    if let Some(fact) = years_active_fact(claims, entity_id) {
        facts.push(fact);
    }
    facts
}

pub struct WikidataAdapter {
    client: Arc<RateLimitedClient>,
    directory: Arc<WikipediaPageDirectory>,
    labels: Arc<dyn LabelLookup>,
}

impl WikidataAdapter {
    pub fn new(
        client: Arc<RateLimitedClient>,
        directory: Arc<WikipediaPageDirectory>,
        labels: Arc<dyn LabelLookup>,
    ) -> Self {
        Self {
            client,
            directory,
            labels,
        }
    }

    fn fetch_claims(&self, entity_id: &str, cancel: &CancelToken) -> Result<ClaimSet, SourceError> {
        let url = format!("{}/{}.json", WIKIDATA_ENTITY_URL, urlencoding::encode(entity_id));
        let response = self
            .client
            .call(Upstream::Wikidata, &HttpRequest::get(url), cancel)?
            .ensure_success()?;
        let mut document: EntityDocument = serde_json::from_str(&response.body)?;
        // Redirected ids come back keyed by their target id.
        let entity = match document.entities.remove(entity_id) {
            Some(entity) => entity,
            None => document
                .entities
                .into_values()
                .next()
                .ok_or(SourceError::NotFound)?,
        };
        Ok(ClaimSet::from_entity(entity))
    }
}

impl SourceAdapter for WikidataAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::Wikidata
    }

    fn fetch(&self, query: &ArtistQuery, cancel: &CancelToken) -> Result<Vec<SourceFact>, SourceError> {
        let page = self.directory.lookup(query, cancel)?;
        let entity_id = page.wikibase_item.ok_or(SourceError::NotFound)?;
        let claims = self.fetch_claims(&entity_id, cancel)?;

        let ids = claims.label_ids();
        let labels = if ids.is_empty() {
            HashMap::new()
        } else {
            match self.labels.labels(&ids, cancel) {
                Ok(labels) => labels,
                Err(SourceError::Cancelled) => return Err(SourceError::Cancelled),
                Err(error) => {
                    warn!("Wikidata: label lookup failed for {}: {}", entity_id, error);
                    HashMap::new()
                }
            }
        };
        debug!(
            "Wikidata: {} resolved {} of {} labels",
            entity_id,
            labels.len(),
            ids.len()
        );
        Ok(claim_facts(&entity_id, &claims, &labels))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use serde_json::json;

    use super::{
        claim_facts, parse_time, ClaimSet, EntityDocument, NoLabelLookup, WikidataAdapter,
        WikidataLabelLookup,
    };
    use crate::cancellation::CancelToken;
    use crate::config::NetworkConfig;
    use crate::http_client::testing::FakeTransport;
    use crate::http_client::RateLimitedClient;
    use crate::model::{ArtistQuery, FieldName, FieldValue, PartialDate, RangeBasis};
    use crate::sources::wikipedia::fixtures::{PAGEPROPS_COLTRANE, SEARCH_COLTRANE};
    use crate::sources::wikipedia::WikipediaPageDirectory;
    use crate::sources::SourceAdapter;

    fn entity_json() -> String {
        json!({
            "entities": {
                "Q7346": {
                    "claims": {
                        "P569": [{"rank": "normal", "mainsnak": {"datavalue": {"type": "time", "value": {"time": "+1926-09-23T00:00:00Z", "precision": 11}}}}],
                        "P570": [{"rank": "normal", "mainsnak": {"datavalue": {"type": "time", "value": {"time": "+1967-07-00T00:00:00Z", "precision": 10}}}}],
                        "P19": [{"rank": "normal", "mainsnak": {"datavalue": {"type": "wikibase-entityid", "value": {"entity-type": "item", "id": "Q1"}}}}],
                        "P1303": [
                            {"rank": "normal", "mainsnak": {"datavalue": {"type": "wikibase-entityid", "value": {"id": "Q2"}}}},
                            {"rank": "deprecated", "mainsnak": {"datavalue": {"type": "wikibase-entityid", "value": {"id": "Q3"}}}},
                            {"rank": "normal", "mainsnak": {"datavalue": {"type": "wikibase-entityid", "value": {"id": "Q4"}}}}
                        ],
                        "P1449": [{"rank": "normal", "mainsnak": {"datavalue": {"type": "monolingualtext", "value": {"text": "Trane", "language": "en"}}}}],
                        "P2031": [{"rank": "normal", "mainsnak": {"datavalue": {"type": "time", "value": {"time": "+1945-00-00T00:00:00Z", "precision": 9}}}}]
                    }
                }
            }
        })
        .to_string()
    }

    fn claims() -> ClaimSet {
        let document: EntityDocument = serde_json::from_str(&entity_json()).expect("entity json");
        let entity = document.entities.into_values().next().expect("entity");
        ClaimSet::from_entity(entity)
    }

    #[test]
    fn test_parse_time_honours_precision() {
        assert_eq!(
            parse_time(&json!({"time": "+1926-09-23T00:00:00Z", "precision": 11})),
            PartialDate::full(1926, 9, 23)
        );
        assert_eq!(
            parse_time(&json!({"time": "+1967-07-00T00:00:00Z", "precision": 10})),
            PartialDate::year_month(1967, 7)
        );
        assert_eq!(
            parse_time(&json!({"time": "+1945-00-00T00:00:00Z", "precision": 9})),
            Some(PartialDate::year(1945))
        );
    }

    #[test]
    fn test_claim_facts_with_labels() {
        let claims = claims();
        let labels: HashMap<String, String> = [
            ("Q1", "Hamlet"),
            ("Q2", "tenor saxophone"),
            ("Q4", "soprano saxophone"),
        ]
        .into_iter()
        .map(|(id, label)| (id.to_string(), label.to_string()))
        .collect();

        let facts = claim_facts("Q7346", &claims, &labels);
        let value = |field: FieldName| {
            facts
                .iter()
                .find(|fact| fact.field == field)
                .map(|fact| fact.value.clone())
        };

        assert_eq!(value(FieldName::WikidataId), Some(FieldValue::Text("Q7346".to_string())));
        assert_eq!(value(FieldName::Birthplace), Some(FieldValue::Text("Hamlet".to_string())));
        assert_eq!(
            value(FieldName::Instruments),
            Some(FieldValue::List(vec![
                "tenor saxophone".to_string(),
                "soprano saxophone".to_string()
            ]))
        );
        assert_eq!(
            value(FieldName::AlsoKnownAs),
            Some(FieldValue::List(vec!["Trane".to_string()]))
        );
        let death = value(FieldName::DeathDate).expect("death date");
        assert_eq!(death.as_date().map(|date| date.iso()), Some("1967-07".to_string()));

        let years = facts
            .iter()
            .find(|fact| fact.field == FieldName::YearsActive)
            .expect("years fact");
        let active = years.value.as_years().expect("years value");
        assert_eq!(active.basis, RangeBasis::Estimated);
        assert_eq!(active.to_string(), "1945\u{2013}1967");
        assert!((years.confidence - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn test_claim_facts_without_labels_leave_label_fields_unknown() {
        let facts = claim_facts("Q7346", &claims(), &HashMap::new());
        assert!(facts.iter().all(|fact| fact.field != FieldName::Birthplace));
        assert!(facts.iter().all(|fact| fact.field != FieldName::Instruments));
        assert!(facts.iter().any(|fact| fact.field == FieldName::BirthDate));
    }

    #[test]
    fn test_label_ids_skip_deprecated_claims() {
        let ids = claims().label_ids();
        assert_eq!(ids, vec!["Q1".to_string(), "Q2".to_string(), "Q4".to_string()]);
    }

    fn network() -> NetworkConfig {
        NetworkConfig {
            wikipedia_interval_ms: 0,
            wikidata_interval_ms: 0,
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn test_fetch_resolves_entity_and_batches_labels() {
        let transport = Arc::new(FakeTransport::new());
        transport
            .reply("search/page", 200, SEARCH_COLTRANE)
            .reply("prop=pageprops", 200, PAGEPROPS_COLTRANE)
            .reply("Special:EntityData/Q7346.json", 200, &entity_json())
            .reply(
                "wbgetentities",
                200,
                r#"{"entities":{"Q1":{"labels":{"en":{"language":"en","value":"Hamlet"}}},"Q2":{"labels":{}}}}"#,
            );
        let client = Arc::new(RateLimitedClient::new(transport.clone(), &network()));
        let directory = Arc::new(WikipediaPageDirectory::new(client.clone()));
        let adapter = WikidataAdapter::new(
            client.clone(),
            directory,
            Arc::new(WikidataLabelLookup::new(client)),
        );

        let facts = adapter
            .fetch(&ArtistQuery::new("John Coltrane"), &CancelToken::new())
            .expect("wikidata should resolve");

        assert!(facts
            .iter()
            .any(|fact| fact.field == FieldName::Birthplace
                && fact.value == FieldValue::Text("Hamlet".to_string())));
        assert!(facts.iter().all(|fact| fact.field != FieldName::Instruments));
        assert_eq!(transport.call_count("wbgetentities"), 1);
    }

    #[test]
    fn test_fetch_without_label_lookup_still_returns_dates() {
        let transport = Arc::new(FakeTransport::new());
        transport
            .reply("search/page", 200, SEARCH_COLTRANE)
            .reply("prop=pageprops", 200, PAGEPROPS_COLTRANE)
            .reply("Special:EntityData/Q7346.json", 200, &entity_json());
        let client = Arc::new(RateLimitedClient::new(transport.clone(), &network()));
        let directory = Arc::new(WikipediaPageDirectory::new(client.clone()));
        let adapter = WikidataAdapter::new(client, directory, Arc::new(NoLabelLookup));

        let facts = adapter
            .fetch(&ArtistQuery::new("John Coltrane"), &CancelToken::new())
            .expect("wikidata should resolve");
        assert!(facts.iter().any(|fact| fact.field == FieldName::BirthDate));
        assert_eq!(transport.call_count("wbgetentities"), 0);
    }
}
