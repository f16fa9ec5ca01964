//! Structured-text extraction from infobox markup.
//!
//! Everything here is pure: the same markup always yields the same facts, and
//! malformed fragments are skipped rather than reported.

pub mod dates;
pub mod html;
pub mod markup;

use std::collections::BTreeMap;

use crate::model::{FieldName, FieldValue, SourceFact, SourceId, YearsActive};

pub use markup::lead_text;

const INFOBOX_CONFIDENCE: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamKind {
    Date(FieldName),
    Text(FieldName),
    List(FieldName),
    YearsActive,
    YearsActiveStart,
    YearsActiveEnd,
}

fn classify_param(key: &str) -> Option<ParamKind> {
    let kind = match key {
        "birth_date" | "born" => ParamKind::Date(FieldName::BirthDate),
        "death_date" | "died" => ParamKind::Date(FieldName::DeathDate),
        "birth_place" | "place_of_birth" => ParamKind::Text(FieldName::Birthplace),
        "origin" => ParamKind::Text(FieldName::Origin),
        "birth_name" => ParamKind::Text(FieldName::BirthName),
        "years_active" | "yearsactive" => ParamKind::YearsActive,
        "years_active_start" | "active_start" | "yearsactive_start" => ParamKind::YearsActiveStart,
        "years_active_end" | "active_end" | "yearsactive_end" => ParamKind::YearsActiveEnd,
        "instrument" | "instruments" => ParamKind::List(FieldName::Instruments),
        "genre" | "genres" => ParamKind::List(FieldName::Genres),
        "label" | "labels" | "record_label" | "record_labels" => {
            ParamKind::List(FieldName::RecordLabels)
        }
        "occupation" | "occupations" => ParamKind::List(FieldName::Occupations),
        "associated_acts" | "current_member_of" | "past_member_of" => {
            ParamKind::List(FieldName::AssociatedActs)
        }
        "alias" | "aliases" | "also_known_as" | "other_names" => {
            ParamKind::List(FieldName::AlsoKnownAs)
        }
        "spouse" | "spouses" | "partner" | "partners" => ParamKind::List(FieldName::Spouses),
        _ => return None,
    };
    Some(kind)
}

/// Extracts facts from the first `{{Infobox ...}}` template in `raw_markup`.
///
/// Facts are attributed to [`SourceId::WikipediaStructured`].
pub fn extract(raw_markup: &str) -> Vec<SourceFact> {
    let without_comments = markup::strip_comments(raw_markup);
    let Some(infobox) = markup::templates(&without_comments)
        .into_iter()
        .find(|template| template.name.starts_with("infobox"))
    else {
        return Vec::new();
    };
    let params: Vec<(String, String)> = infobox
        .named()
        .into_iter()
        .map(|(key, value)| (key, value.to_string()))
        .collect();
    facts_from_params(&params)
}

fn infobox_fact(field: FieldName, value: FieldValue, key: &str, raw: &str) -> SourceFact {
    SourceFact::new(field, value, SourceId::WikipediaStructured)
        .with_confidence(INFOBOX_CONFIDENCE)
        .with_evidence(format!("{key} = {}", raw.trim()))
}

/// Maps normalized `key = value` pairs onto facts, one per field.
pub(crate) fn facts_from_params(params: &[(String, String)]) -> Vec<SourceFact> {
    let mut scalars: BTreeMap<FieldName, SourceFact> = BTreeMap::new();
    let mut lists: BTreeMap<FieldName, (Vec<String>, String)> = BTreeMap::new();
    let mut curated_years: Option<SourceFact> = None;
    let mut years_start: Option<&str> = None;
    let mut years_end: Option<&str> = None;

    for (key, raw) in params {
        let Some(kind) = classify_param(key) else {
            continue;
        };
        match kind {
            ParamKind::Date(field) => {
                if scalars.contains_key(&field) {
                    continue;
                }
                if let Some(date) = dates::parse_date(raw) {
                    scalars.insert(field, infobox_fact(field, FieldValue::Date(date), key, raw));
                }
            }
            ParamKind::Text(field) => {
                if scalars.contains_key(&field) {
                    continue;
                }
                let text = markup::clean_text(raw);
                if !text.is_empty() {
                    scalars.insert(field, infobox_fact(field, FieldValue::Text(text), key, raw));
                }
            }
            ParamKind::List(field) => {
                let items = markup::split_list(raw);
                if items.is_empty() {
                    continue;
                }
                let entry = lists
                    .entry(field)
                    .or_insert_with(|| (Vec::new(), format!("{key} = {}", raw.trim())));
                entry.0.extend(items);
            }
            ParamKind::YearsActive => {
                if curated_years.is_none() {
                    curated_years = dates::parse_years_active(raw).map(|years| {
                        infobox_fact(FieldName::YearsActive, FieldValue::Years(years), key, raw)
                    });
                }
            }
            ParamKind::YearsActiveStart => years_start = years_start.or(Some(raw.as_str())),
            ParamKind::YearsActiveEnd => years_end = years_end.or(Some(raw.as_str())),
        }
    }

    let years_fact = curated_years.or_else(|| {
        let start = years_start?;
        let years: YearsActive = dates::assemble_years_active(start, years_end)?;
        Some(infobox_fact(
            FieldName::YearsActive,
            FieldValue::Years(years),
            "years_active_start",
            start,
        ))
    });
    if let Some(fact) = years_fact {
        scalars.insert(FieldName::YearsActive, fact);
    }

    for (field, (items, evidence)) in lists {
        let items = markup::dedup_case_insensitive(items);
        scalars.insert(
            field,
            SourceFact::new(field, FieldValue::List(items), SourceId::WikipediaStructured)
                .with_confidence(INFOBOX_CONFIDENCE)
                .with_evidence(evidence),
        );
    }

    scalars.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::extract;
    use crate::model::{FieldName, FieldValue, RangeBasis, SourceId};

    fn find(facts: &[crate::model::SourceFact], field: FieldName) -> Option<FieldValue> {
        facts
            .iter()
            .find(|fact| fact.field == field)
            .map(|fact| fact.value.clone())
    }

    #[test]
    fn test_extract_inline_infobox_years_and_instruments() {
        let facts = extract(
            "{{Infobox|years_active=1955\u{2013}1967|instruments=[[Tenor saxophone]], [[Soprano saxophone]]}}",
        );

        let years = find(&facts, FieldName::YearsActive).expect("years_active fact");
        let years = years.as_years().expect("years value");
        assert_eq!(years.to_string(), "1955\u{2013}1967");
        assert_eq!(years.basis, RangeBasis::Curated);
        assert_eq!(
            find(&facts, FieldName::Instruments),
            Some(FieldValue::List(vec![
                "Tenor saxophone".to_string(),
                "Soprano saxophone".to_string()
            ]))
        );
        assert!(facts
            .iter()
            .all(|fact| fact.source == SourceId::WikipediaStructured));
    }

    #[test]
    fn test_extract_full_musical_artist_infobox() {
        let wikitext = r#"Intro {{Use mdy dates}}
{{Infobox musical artist
| name        = John Coltrane
| birth_name  = John William Coltrane
| birth_date  = {{Birth date|1926|9|23}}
| birth_place = [[Hamlet, North Carolina]], U.S.
| death_date  = {{Death date and age|1967|7|17|1926|9|23}}
| genre       = {{hlist|[[Jazz]]|[[hard bop]]|[[modal jazz]]}}
| occupation  = Musician, bandleader, composer
| instrument  = Tenor saxophone<br />soprano saxophone
| years_active = 1945&ndash;1967
| label       = [[Prestige Records|Prestige]], [[Atlantic Records|Atlantic]]
| associated_acts = [[Miles Davis]]; [[Thelonious Monk]]
| website     = {{URL|johncoltrane.com}}
}}
'''John William Coltrane''' was a saxophonist."#;
        let facts = extract(wikitext);

        assert_eq!(
            find(&facts, FieldName::BirthDate).and_then(|v| v.as_date().map(|d| d.iso())),
            Some("1926-09-23".to_string())
        );
        assert_eq!(
            find(&facts, FieldName::DeathDate).and_then(|v| v.as_date().map(|d| d.iso())),
            Some("1967-07-17".to_string())
        );
        assert_eq!(
            find(&facts, FieldName::Birthplace),
            Some(FieldValue::Text("Hamlet, North Carolina, U.S.".to_string()))
        );
        assert_eq!(
            find(&facts, FieldName::BirthName),
            Some(FieldValue::Text("John William Coltrane".to_string()))
        );
        assert_eq!(
            find(&facts, FieldName::Genres)
                .and_then(|v| v.as_list().map(|items| items.to_vec())),
            Some(vec![
                "Jazz".to_string(),
                "hard bop".to_string(),
                "modal jazz".to_string()
            ])
        );
        assert_eq!(
            find(&facts, FieldName::Occupations).and_then(|v| v.as_list().map(<[String]>::len)),
            Some(3)
        );
        assert_eq!(
            find(&facts, FieldName::Instruments).and_then(|v| v.as_list().map(<[String]>::len)),
            Some(2)
        );
        assert_eq!(
            find(&facts, FieldName::AssociatedActs)
                .and_then(|v| v.as_list().map(|items| items.to_vec())),
            Some(vec!["Miles Davis".to_string(), "Thelonious Monk".to_string()])
        );
        assert_eq!(
            find(&facts, FieldName::YearsActive).map(|v| match v {
                FieldValue::Years(years) => years.to_string(),
                _ => String::new(),
            }),
            Some("1945\u{2013}1967".to_string())
        );
    }

    #[test]
    fn test_extract_assembles_separate_years_active_parameters() {
        let facts = extract("{{Infobox band|years_active_start=1990|years_active_end=present}}");
        let years = find(&facts, FieldName::YearsActive).expect("years fact");
        let years = years.as_years().expect("years value");
        assert_eq!(years.basis, RangeBasis::Assembled);
        assert_eq!(years.to_string(), "1990\u{2013}present");
    }

    #[test]
    fn test_extract_keeps_partial_birth_date() {
        let facts = extract("{{Infobox person|birth_date=March 1950}}");
        let date = find(&facts, FieldName::BirthDate).expect("birth date");
        let date = date.as_date().expect("date value");
        assert_eq!(date.iso(), "1950-03");
        assert!(date.is_partial());
    }

    #[test]
    fn test_extract_is_pure_and_tolerates_malformed_markup() {
        let inputs = [
            "",
            "no templates at all",
            "{{Infobox musical artist | birth_date = {{birth date|19",
            "{{Infobox | years_active = ]] [[ | instruments = ,,, }}",
            "{{Infobox | = orphan | birth_date = not a date }}",
        ];
        for input in inputs {
            let first = extract(input);
            let second = extract(input);
            assert_eq!(first, second);
        }
        assert!(extract("{{Infobox | instruments = ,,, }}").is_empty());
    }
}
