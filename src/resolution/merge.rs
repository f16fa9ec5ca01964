//! Field-by-field reconciliation of attributed facts.
//!
//! Merging is a pure function of the fact list: each canonical field takes the
//! first non-empty value from the highest-priority source of its category.
//! `years_active` alone may be overridden by a lower-priority source (see
//! [`YEARS_ACTIVE_OVERRIDE_MARGIN`]).

use std::collections::BTreeMap;

use crate::model::{
    FieldCategory, FieldName, FieldValue, RelationshipBlock, RelationshipGraph, ResolvedField,
    SourceFact, SourceId,
};

/// Confidence lead a non-estimated `years_active` value needs to displace an
/// estimated one from a higher-priority source.
pub const YEARS_ACTIVE_OVERRIDE_MARGIN: f32 = 0.2;
const CONFIDENCE_EPSILON: f32 = 1e-4;

const BIOGRAPHY_PRIORITY: &[SourceId] = &[
    SourceId::WikipediaStructured,
    SourceId::WikipediaSummary,
    SourceId::AiResearch,
    SourceId::MusicBrainz,
];
const BIOGRAPHICAL_PRIORITY: &[SourceId] = &[
    SourceId::WikipediaStructured,
    SourceId::Wikidata,
    SourceId::MusicBrainz,
];
const CATALOG_PRIORITY: &[SourceId] = &[SourceId::Spotify];
const REFERENCE_PRIORITY: &[SourceId] = &[
    SourceId::WikipediaStructured,
    SourceId::WikipediaSummary,
    SourceId::Wikidata,
    SourceId::MusicBrainz,
];

/// Sources allowed to fill a category, highest priority first.
pub fn priority(category: FieldCategory) -> &'static [SourceId] {
    match category {
        FieldCategory::Biography => BIOGRAPHY_PRIORITY,
        FieldCategory::Biographical => BIOGRAPHICAL_PRIORITY,
        FieldCategory::Catalog => CATALOG_PRIORITY,
        FieldCategory::Reference => REFERENCE_PRIORITY,
        FieldCategory::Supplement => &[],
    }
}

/// Non-empty candidates for `field` in priority order. Within one source the
/// fact order is kept.
fn candidates(field: FieldName, facts: &[SourceFact]) -> Vec<&SourceFact> {
    priority(field.category())
        .iter()
        .flat_map(|source| {
            facts.iter().filter(move |fact| {
                fact.field == field && fact.source == *source && !fact.value.is_empty()
            })
        })
        .collect()
}

fn is_estimated(fact: &SourceFact) -> bool {
    fact.value.as_years().is_some_and(|years| years.is_estimated())
}

fn overrides_years_active(current: &SourceFact, challenger: &SourceFact) -> bool {
    is_estimated(current)
        && !is_estimated(challenger)
        && challenger.confidence + CONFIDENCE_EPSILON
            >= current.confidence + YEARS_ACTIVE_OVERRIDE_MARGIN
}

fn choose(field: FieldName, facts: &[SourceFact]) -> Option<&SourceFact> {
    let mut ordered = candidates(field, facts).into_iter();
    let first = ordered.next()?;
    if field != FieldName::YearsActive {
        return Some(first);
    }
    Some(ordered.fold(first, |current, challenger| {
        if overrides_years_active(current, challenger) {
            challenger
        } else {
            current
        }
    }))
}

/// Picks exactly one winning value per canonical field that has a contributor.
pub fn merge_facts(facts: &[SourceFact]) -> BTreeMap<FieldName, ResolvedField> {
    FieldName::CANONICAL
        .iter()
        .filter_map(|field| choose(*field, facts).map(|fact| (*field, ResolvedField::from(fact))))
        .collect()
}

/// Collects research relationships and citations into the supplementary block.
pub fn relationship_block(facts: &[SourceFact]) -> Option<RelationshipBlock> {
    let graph = facts.iter().find_map(|fact| match (&fact.field, &fact.value) {
        (FieldName::Relationships, FieldValue::Relationships(graph)) if !graph.is_empty() => {
            Some((fact.source, graph.clone()))
        }
        _ => None,
    });
    let citations = facts
        .iter()
        .filter(|fact| fact.field == FieldName::Citations)
        .find_map(|fact| fact.value.as_list().map(<[String]>::to_vec))
        .unwrap_or_default();

    match graph {
        Some((source, graph)) => Some(RelationshipBlock {
            source,
            graph,
            citations,
        }),
        None if !citations.is_empty() => Some(RelationshipBlock {
            source: SourceId::AiResearch,
            graph: RelationshipGraph::default(),
            citations,
        }),
        None => None,
    }
}

/// Length in characters of the best biography gathered so far.
pub fn best_biography_chars(facts: &[SourceFact]) -> usize {
    facts
        .iter()
        .filter(|fact| fact.field == FieldName::BiographyText)
        .filter_map(|fact| fact.value.as_text())
        .map(|text| text.trim().chars().count())
        .max()
        .unwrap_or(0)
}
