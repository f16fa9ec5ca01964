//! Domain model for one artist resolution: queries, attributed facts, and the
//! canonical record handed to record builders.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Immutable input to one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistQuery {
    pub name: String,
    /// Known genres used to pick between same-name catalog candidates.
    pub genre_hints: Vec<String>,
}

impl ArtistQuery {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            genre_hints: Vec::new(),
        }
    }

    pub fn with_genre_hints(mut self, hints: Vec<String>) -> Self {
        self.genre_hints = hints;
        self
    }
}

/// Upstream that produced a fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    Spotify,
    WikipediaStructured,
    WikipediaSummary,
    Wikidata,
    MusicBrainz,
    AiResearch,
}

impl SourceId {
    pub fn source_name(self) -> &'static str {
        match self {
            Self::Spotify => "Spotify",
            Self::WikipediaStructured => "Wikipedia (infobox)",
            Self::WikipediaSummary => "Wikipedia (summary)",
            Self::Wikidata => "Wikidata",
            Self::MusicBrainz => "MusicBrainz",
            Self::AiResearch => "Perplexity",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_name())
    }
}

/// Canonical field a fact can contribute to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    BiographyText,
    Description,
    BirthDate,
    DeathDate,
    Birthplace,
    Origin,
    BirthName,
    AlsoKnownAs,
    Occupations,
    Instruments,
    YearsActive,
    RecordLabels,
    Spouses,
    AssociatedActs,
    Genres,
    Popularity,
    Followers,
    RelatedArtists,
    TopTracks,
    Albums,
    Singles,
    SpotifyId,
    SpotifyUrl,
    ImageUrl,
    WikipediaUrl,
    WikidataId,
    MusicBrainzUrl,
    Relationships,
    Citations,
}

/// Field groups that share one source precedence list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCategory {
    Biography,
    Biographical,
    Catalog,
    Reference,
    Supplement,
}

impl FieldName {
    /// Every field that appears in a canonical record, in display order.
    pub const CANONICAL: [FieldName; 27] = [
        FieldName::BiographyText,
        FieldName::Description,
        FieldName::BirthDate,
        FieldName::DeathDate,
        FieldName::Birthplace,
        FieldName::Origin,
        FieldName::BirthName,
        FieldName::AlsoKnownAs,
        FieldName::Occupations,
        FieldName::Instruments,
        FieldName::YearsActive,
        FieldName::RecordLabels,
        FieldName::Spouses,
        FieldName::AssociatedActs,
        FieldName::Genres,
        FieldName::Popularity,
        FieldName::Followers,
        FieldName::RelatedArtists,
        FieldName::TopTracks,
        FieldName::Albums,
        FieldName::Singles,
        FieldName::SpotifyId,
        FieldName::SpotifyUrl,
        FieldName::ImageUrl,
        FieldName::WikipediaUrl,
        FieldName::WikidataId,
        FieldName::MusicBrainzUrl,
    ];

    pub fn category(self) -> FieldCategory {
        match self {
            Self::BiographyText => FieldCategory::Biography,
            Self::BirthDate
            | Self::DeathDate
            | Self::Birthplace
            | Self::Origin
            | Self::BirthName
            | Self::AlsoKnownAs
            | Self::Occupations
            | Self::Instruments
            | Self::YearsActive
            | Self::RecordLabels
            | Self::Spouses
            | Self::AssociatedActs => FieldCategory::Biographical,
            Self::Genres
            | Self::Popularity
            | Self::Followers
            | Self::RelatedArtists
            | Self::TopTracks
            | Self::Albums
            | Self::Singles
            | Self::SpotifyId
            | Self::SpotifyUrl
            | Self::ImageUrl => FieldCategory::Catalog,
            Self::Description | Self::WikipediaUrl | Self::WikidataId | Self::MusicBrainzUrl => {
                FieldCategory::Reference
            }
            Self::Relationships | Self::Citations => FieldCategory::Supplement,
        }
    }
}

/// Calendar date that may be known only to year or month granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartialDate {
    pub year: i32,
    pub month: Option<u8>,
    pub day: Option<u8>,
}

impl PartialDate {
    pub fn year(year: i32) -> Self {
        Self {
            year,
            month: None,
            day: None,
        }
    }

    pub fn year_month(year: i32, month: u8) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self {
            year,
            month: Some(month),
            day: None,
        })
    }

    pub fn full(year: i32, month: u8, day: u8) -> Option<Self> {
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return None;
        }
        Some(Self {
            year,
            month: Some(month),
            day: Some(day),
        })
    }

    pub fn is_partial(&self) -> bool {
        self.day.is_none()
    }

    /// ISO-8601 rendering at the known granularity (`YYYY`, `YYYY-MM`, `YYYY-MM-DD`).
    pub fn iso(&self) -> String {
        match (self.month, self.day) {
            (Some(month), Some(day)) => format!("{:04}-{:02}-{:02}", self.year, month, day),
            (Some(month), None) => format!("{:04}-{:02}", self.year, month),
            _ => format!("{:04}", self.year),
        }
    }
}

impl fmt::Display for PartialDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.iso())
    }
}

/// One active period; `end == None` means ongoing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearSpan {
    pub start: i32,
    pub end: Option<i32>,
}

/// How a years-active value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeBasis {
    /// A hand-written range token such as `1955–1967`.
    Curated,
    /// Separate start and end values joined together.
    Assembled,
    /// Derived from incomplete data (start year only, birth year offset).
    Estimated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearsActive {
    pub spans: Vec<YearSpan>,
    pub basis: RangeBasis,
}

impl YearsActive {
    pub fn single(start: i32, end: Option<i32>, basis: RangeBasis) -> Self {
        Self {
            spans: vec![YearSpan { start, end }],
            basis,
        }
    }

    pub fn is_estimated(&self) -> bool {
        self.basis == RangeBasis::Estimated
    }
}

impl fmt::Display for YearsActive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .spans
            .iter()
            .map(|span| match span.end {
                Some(end) if end == span.start => span.start.to_string(),
                Some(end) => format!("{}\u{2013}{}", span.start, end),
                None => format!("{}\u{2013}present", span.start),
            })
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&rendered)
    }
}

/// One edge of the research relationship graph, with its own provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    pub name: String,
    pub context: String,
    pub specific_work: Option<String>,
    pub time_period: Option<String>,
    pub confidence: f32,
    pub source: SourceId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelationshipGraph {
    pub mentors: Vec<Relationship>,
    pub collaborators: Vec<Relationship>,
    pub influenced: Vec<Relationship>,
}

impl RelationshipGraph {
    pub fn len(&self) -> usize {
        self.mentors.len() + self.collaborators.len() + self.influenced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Typed value carried by a fact.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    Date(PartialDate),
    Years(YearsActive),
    Count(u64),
    Relationships(RelationshipGraph),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Years(years) => years.spans.is_empty(),
            Self::Relationships(graph) => graph.is_empty(),
            Self::Date(_) | Self::Count(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&PartialDate> {
        match self {
            Self::Date(date) => Some(date),
            _ => None,
        }
    }

    pub fn as_years(&self) -> Option<&YearsActive> {
        match self {
            Self::Years(years) => Some(years),
            _ => None,
        }
    }
}

/// One attributed value for one canonical field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFact {
    pub field: FieldName,
    pub value: FieldValue,
    pub source: SourceId,
    pub confidence: f32,
    /// Raw fragment the value came from, for auditing.
    pub evidence: String,
}

impl SourceFact {
    pub fn new(field: FieldName, value: FieldValue, source: SourceId) -> Self {
        Self {
            field,
            value,
            source,
            confidence: 1.0,
            evidence: String::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        let evidence = evidence.into();
        self.evidence = if evidence.chars().count() > MAX_EVIDENCE_CHARS {
            evidence.chars().take(MAX_EVIDENCE_CHARS).collect()
        } else {
            evidence
        };
        self
    }
}

const MAX_EVIDENCE_CHARS: usize = 240;

/// Winning value for one canonical field plus its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedField {
    pub value: FieldValue,
    pub source: SourceId,
    pub confidence: f32,
    pub evidence: String,
}

impl From<&SourceFact> for ResolvedField {
    fn from(fact: &SourceFact) -> Self {
        Self {
            value: fact.value.clone(),
            source: fact.source,
            confidence: fact.confidence,
            evidence: fact.evidence.clone(),
        }
    }
}

/// Lookup result that keeps "unknown" distinct from an empty value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldState<'a> {
    Known(&'a ResolvedField),
    Unknown,
}

impl<'a> FieldState<'a> {
    pub fn known(self) -> Option<&'a ResolvedField> {
        match self {
            Self::Known(field) => Some(field),
            Self::Unknown => None,
        }
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Resolved,
    /// Catalog identity could not be established because credentials failed.
    Unresolved,
}

/// Research graph attached next to, never inside, the resolved fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipBlock {
    pub source: SourceId,
    pub graph: RelationshipGraph,
    pub citations: Vec<String>,
}

/// Merged, single-valued-per-field output of one resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub artist: String,
    pub status: ResolutionStatus,
    pub fields: BTreeMap<FieldName, ResolvedField>,
    pub unknown_fields: Vec<FieldName>,
    pub relationships: Option<RelationshipBlock>,
    /// Every fact considered, in query order.
    pub facts: Vec<SourceFact>,
}

impl CanonicalRecord {
    pub fn new(
        artist: impl Into<String>,
        status: ResolutionStatus,
        fields: BTreeMap<FieldName, ResolvedField>,
        facts: Vec<SourceFact>,
    ) -> Self {
        let unknown_fields = FieldName::CANONICAL
            .iter()
            .copied()
            .filter(|field| !fields.contains_key(field))
            .collect();
        Self {
            artist: artist.into(),
            status,
            fields,
            unknown_fields,
            relationships: None,
            facts,
        }
    }

    pub fn unresolved(artist: impl Into<String>, facts: Vec<SourceFact>) -> Self {
        Self::new(artist, ResolutionStatus::Unresolved, BTreeMap::new(), facts)
    }

    pub fn field(&self, name: FieldName) -> FieldState<'_> {
        self.fields
            .get(&name)
            .map(FieldState::Known)
            .unwrap_or(FieldState::Unknown)
    }

    pub fn value(&self, name: FieldName) -> Option<&FieldValue> {
        self.field(name).known().map(|field| &field.value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{
        CanonicalRecord, FieldName, FieldValue, PartialDate, RangeBasis, ResolutionStatus,
        SourceFact, SourceId, YearSpan, YearsActive,
    };

    #[test]
    fn test_partial_date_iso_keeps_granularity() {
        assert_eq!(PartialDate::year(1926).iso(), "1926");
        assert_eq!(
            PartialDate::year_month(1926, 9).map(|date| date.iso()),
            Some("1926-09".to_string())
        );
        assert_eq!(
            PartialDate::full(1926, 9, 23).map(|date| date.iso()),
            Some("1926-09-23".to_string())
        );
        assert!(PartialDate::year(1926).is_partial());
        assert!(PartialDate::full(1926, 13, 1).is_none());
    }

    #[test]
    fn test_years_active_display_uses_en_dash_and_present() {
        let curated = YearsActive::single(1955, Some(1967), RangeBasis::Curated);
        assert_eq!(curated.to_string(), "1955\u{2013}1967");

        let open = YearsActive {
            spans: vec![
                YearSpan {
                    start: 1945,
                    end: Some(1950),
                },
                YearSpan {
                    start: 1960,
                    end: None,
                },
            ],
            basis: RangeBasis::Assembled,
        };
        assert_eq!(open.to_string(), "1945\u{2013}1950, 1960\u{2013}present");
    }

    #[test]
    fn test_record_lists_every_missing_field_as_unknown() {
        let record = CanonicalRecord::new(
            "Sample Artist",
            ResolutionStatus::Resolved,
            BTreeMap::new(),
            Vec::new(),
        );
        assert_eq!(record.unknown_fields.len(), FieldName::CANONICAL.len());
        assert!(record.field(FieldName::Genres).is_unknown());
    }

    #[test]
    fn test_fact_confidence_is_clamped_and_evidence_trimmed() {
        let fact = SourceFact::new(
            FieldName::BiographyText,
            FieldValue::Text("text".to_string()),
            SourceId::WikipediaSummary,
        )
        .with_confidence(1.7)
        .with_evidence("x".repeat(1000));
        assert!((fact.confidence - 1.0).abs() < f32::EPSILON);
        assert_eq!(fact.evidence.chars().count(), 240);
    }
}
