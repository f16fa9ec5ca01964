//! Name matching used to pick one candidate out of a search result list.

use std::collections::HashSet;

use serde_json::Value;

/// How closely a candidate title matches the requested artist name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NameMatchTier {
    None,
    Fuzzy,
    NearExact,
    Exact,
}

pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase ASCII words; separators become single spaces, other symbols vanish.
pub fn normalize_text(value: &str) -> String {
    let mut normalized = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_alphanumeric() {
            normalized.extend(ch.to_lowercase());
        } else if ch.is_whitespace() || ch == '-' || ch == '_' || ch == '/' {
            normalized.push(' ');
        }
    }
    collapse_whitespace(&normalized)
}

pub fn compact_text(value: &str) -> String {
    value
        .chars()
        .filter(|ch| ch.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn word_overlap_ratio(left: &str, right: &str) -> f32 {
    let left_tokens: HashSet<&str> = left.split_whitespace().collect();
    let right_tokens: HashSet<&str> = right.split_whitespace().collect();
    if left_tokens.is_empty() || right_tokens.is_empty() {
        return 0.0;
    }
    let overlap = left_tokens.intersection(&right_tokens).count() as f32;
    overlap / (left_tokens.len().max(right_tokens.len()) as f32)
}

/// Title text before a parenthetical qualifier such as `(musician)`.
fn normalized_title_head(title: &str) -> String {
    let head = title.split('(').next().unwrap_or(title).trim();
    normalize_text(head)
}

pub fn name_match_tier(target: &str, title: &str) -> NameMatchTier {
    let normalized_target = normalize_text(target);
    let normalized_title = normalize_text(title);
    if normalized_target.is_empty() || normalized_title.is_empty() {
        return NameMatchTier::None;
    }

    let title_head = normalized_title_head(title);
    let compact_target = compact_text(&normalized_target);
    let compact_title = compact_text(&normalized_title);
    let compact_title_head = compact_text(&title_head);

    if normalized_title == normalized_target
        || title_head == normalized_target
        || (!compact_target.is_empty()
            && (compact_title == compact_target || compact_title_head == compact_target))
    {
        return NameMatchTier::Exact;
    }

    if normalized_title.starts_with(&normalized_target)
        || title_head.starts_with(&normalized_target)
        || (!compact_target.is_empty()
            && (compact_title.starts_with(&compact_target)
                || compact_title_head.starts_with(&compact_target)))
    {
        return NameMatchTier::NearExact;
    }

    if word_overlap_ratio(&normalized_target, &normalized_title) >= 0.6 {
        NameMatchTier::Fuzzy
    } else {
        NameMatchTier::None
    }
}

pub fn looks_disambiguation(title: &str) -> bool {
    normalize_text(title).contains("disambiguation")
}

/// Number of `hints` that appear among `genres`, compared after normalization.
pub fn genre_overlap(hints: &[String], genres: &[String]) -> usize {
    let normalized: HashSet<String> = genres.iter().map(|genre| normalize_text(genre)).collect();
    hints
        .iter()
        .map(|hint| normalize_text(hint))
        .filter(|hint| {
            normalized
                .iter()
                .any(|genre| genre == hint || genre.contains(hint.as_str()))
        })
        .count()
}

/// Titles from REST `pages`/`results` arrays or an action-API search block.
pub fn extract_title_strings(value: &Value) -> Vec<String> {
    let mut titles = Vec::new();
    let mut push = |item: &Value| {
        if let Some(title) = item["title"].as_str() {
            let trimmed = title.trim();
            if !trimmed.is_empty() {
                titles.push(trimmed.to_string());
            }
        }
    };

    if let Some(results) = value["query"]["search"].as_array() {
        results.iter().for_each(&mut push);
    }
    for key in ["pages", "results"] {
        if let Some(results) = value[key].as_array() {
            results.iter().for_each(&mut push);
        }
    }
    titles
}
