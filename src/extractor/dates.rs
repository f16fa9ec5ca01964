//! Date and active-period parsing for infobox values.

use super::markup::{self, Template};
use crate::model::{PartialDate, RangeBasis, YearSpan, YearsActive};

const DATE_TEMPLATES: [&str; 14] = [
    "birth date",
    "birth date and age",
    "birth-date",
    "birth-date and age",
    "birth year",
    "birth year and age",
    "death date",
    "death date and age",
    "death-date",
    "death-date and age",
    "death year",
    "death year and age",
    "dob",
    "start date",
];

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const OPEN_END_WORDS: [&str; 4] = ["present", "now", "current", "today"];

/// Parses an infobox date value, keeping the granularity the source gives.
pub fn parse_date(raw: &str) -> Option<PartialDate> {
    let without_notes = markup::strip_refs(&markup::strip_comments(raw));
    markup::templates(&without_notes)
        .iter()
        .find_map(template_date)
        .or_else(|| parse_plain_date(&markup::clean_text(&without_notes)))
}

fn template_date(template: &Template<'_>) -> Option<PartialDate> {
    if !DATE_TEMPLATES.contains(&template.name.as_str()) {
        return None;
    }
    let positional = template.positional();
    let numbers: Vec<i32> = positional
        .iter()
        .map_while(|arg| arg.trim().parse::<i32>().ok())
        .collect();
    match numbers.as_slice() {
        [] => positional
            .first()
            .and_then(|text| parse_plain_date(&markup::clean_text(text))),
        [year] => Some(PartialDate::year(*year)),
        [year, month] => Some(month_date(*year, *month)),
        [year, month, day, ..] => Some(
            u8::try_from(*month)
                .ok()
                .zip(u8::try_from(*day).ok())
                .and_then(|(month, day)| PartialDate::full(*year, month, day))
                .unwrap_or_else(|| month_date(*year, *month)),
        ),
    }
}

fn month_date(year: i32, month: i32) -> PartialDate {
    u8::try_from(month)
        .ok()
        .and_then(|month| PartialDate::year_month(year, month))
        .unwrap_or_else(|| PartialDate::year(year))
}

/// `Month D, YYYY`, `D Month YYYY`, `Month YYYY`, `YYYY-MM-DD` or `YYYY`.
pub fn parse_plain_date(text: &str) -> Option<PartialDate> {
    let tokens: Vec<&str> = text
        .split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '-'))
        .filter(|token| !token.is_empty())
        .collect();
    if let Some(date) = tokens.iter().find_map(|token| parse_iso(token)) {
        return Some(date);
    }

    let year = tokens.iter().find_map(|token| year_prefix(token))?;
    let Some(month_index) = tokens.iter().position(|token| month_number(token).is_some()) else {
        return Some(PartialDate::year(year));
    };
    let month = month_number(tokens[month_index])?;
    let day = [month_index + 1, month_index.wrapping_sub(1)]
        .iter()
        .filter_map(|index| tokens.get(*index))
        .find_map(|token| day_number(token));
    match day {
        Some(day) => PartialDate::full(year, month, day),
        None => PartialDate::year_month(year, month),
    }
}

fn parse_iso(token: &str) -> Option<PartialDate> {
    let mut parts = token.split('-');
    let year = parts.next().filter(|part| part.len() == 4)?.parse().ok()?;
    let month = parts
        .next()
        .filter(|part| (1..=2).contains(&part.len()))?
        .parse()
        .ok()?;
    match parts.next() {
        Some(day) if (1..=2).contains(&day.len()) => {
            PartialDate::full(year, month, day.parse().ok()?)
        }
        Some(_) => None,
        None => PartialDate::year_month(year, month),
    }
}

/// Leading four-digit year of a token such as `1926` or `1955-1967`.
fn year_prefix(token: &str) -> Option<i32> {
    let digits: String = token.chars().take_while(char::is_ascii_digit).collect();
    (digits.len() == 4).then(|| digits.parse().ok()).flatten()
}

fn month_number(token: &str) -> Option<u8> {
    if token.len() < 3 || !token.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return None;
    }
    let lowered = token.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|month| month.starts_with(&lowered))
        .and_then(|index| u8::try_from(index + 1).ok())
}

fn day_number(token: &str) -> Option<u8> {
    if token.is_empty() || token.len() > 2 || !token.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    token.parse().ok().filter(|day| (1..=31).contains(day))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PeriodToken {
    Year(i32),
    ShortYear(i32),
    Dash,
    Open,
    Break,
}

fn period_tokens(text: &str) -> Vec<PeriodToken> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut index = 0;
    while index < chars.len() {
        let ch = chars[index];
        if ch.is_ascii_digit() {
            let start = index;
            while index < chars.len() && chars[index].is_ascii_digit() {
                index += 1;
            }
            let digits: String = chars[start..index].iter().collect();
            let value = digits.parse::<i32>().unwrap_or_default();
            match digits.len() {
                4 => tokens.push(PeriodToken::Year(value)),
                2 if tokens.last() == Some(&PeriodToken::Dash) => {
                    tokens.push(PeriodToken::ShortYear(value))
                }
                _ => tokens.push(PeriodToken::Break),
            }
            continue;
        }
        if ch.is_alphabetic() {
            let start = index;
            while index < chars.len() && chars[index].is_alphabetic() {
                index += 1;
            }
            let word: String = chars[start..index].iter().collect::<String>().to_lowercase();
            if OPEN_END_WORDS.contains(&word.as_str()) {
                tokens.push(PeriodToken::Open);
            } else if word == "to" || word == "until" {
                tokens.push(PeriodToken::Dash);
            }
            continue;
        }
        match ch {
            '-' | '\u{2013}' | '\u{2014}' | '\u{2212}' => tokens.push(PeriodToken::Dash),
            ',' | ';' | '\n' | '(' | ')' | '\u{2022}' | '*' => tokens.push(PeriodToken::Break),
            _ => {}
        }
        index += 1;
    }
    tokens
}

/// Spans found in `text`, and whether any of them came from a range token.
fn period_spans(text: &str) -> (Vec<YearSpan>, bool) {
    let tokens = period_tokens(text);
    let mut spans = Vec::new();
    let mut ranged = false;
    let mut index = 0;
    while index < tokens.len() {
        let PeriodToken::Year(start) = tokens[index] else {
            index += 1;
            continue;
        };
        if tokens.get(index + 1) != Some(&PeriodToken::Dash) {
            spans.push(YearSpan {
                start,
                end: Some(start),
            });
            index += 1;
            continue;
        }
        ranged = true;
        match tokens.get(index + 2) {
            Some(PeriodToken::Year(end)) => {
                spans.push(YearSpan {
                    start,
                    end: Some(*end),
                });
                index += 3;
            }
            Some(PeriodToken::ShortYear(short)) => {
                let mut end = start - start.rem_euclid(100) + short;
                if end < start {
                    end += 100;
                }
                spans.push(YearSpan {
                    start,
                    end: Some(end),
                });
                index += 3;
            }
            Some(PeriodToken::Open) => {
                spans.push(YearSpan { start, end: None });
                index += 3;
            }
            _ => {
                spans.push(YearSpan { start, end: None });
                index += 2;
            }
        }
    }
    (spans, ranged)
}

/// Parses a `years_active` value.
///
/// Range tokens make the value curated and are kept in order. Without any
/// range token, standalone years are assembled into one first-to-last span.
pub fn parse_years_active(raw: &str) -> Option<YearsActive> {
    let (spans, ranged) = period_spans(&markup::strip_markup(raw));
    if ranged {
        return Some(YearsActive {
            spans,
            basis: RangeBasis::Curated,
        });
    }
    let first = spans.first()?.start;
    let last = spans.last().map(|span| span.start).unwrap_or(first);
    Some(YearsActive::single(
        first,
        Some(last.max(first)),
        RangeBasis::Assembled,
    ))
}

/// Joins separate start and end parameters into one assembled span.
pub fn assemble_years_active(start_raw: &str, end_raw: Option<&str>) -> Option<YearsActive> {
    let start = first_year(start_raw)?;
    let end = end_raw.and_then(first_year);
    Some(YearsActive::single(start, end, RangeBasis::Assembled))
}

fn first_year(raw: &str) -> Option<i32> {
    period_tokens(&markup::strip_markup(raw))
        .into_iter()
        .find_map(|token| match token {
            PeriodToken::Year(year) => Some(year),
            _ => None,
        })
}
