//! Wikitext cleanup shared by the infobox, date and lead-section parsers.

use std::collections::HashSet;

const LIST_TEMPLATES: [&str; 8] = [
    "hlist",
    "flatlist",
    "flat list",
    "plainlist",
    "plain list",
    "ubl",
    "unbulleted list",
    "br separated entries",
];
const WRAPPER_TEMPLATES: [&str; 5] = ["nowrap", "nobr", "small", "lang", "nobold"];
const BLOCK_TAGS: [&str; 6] = ["br", "li", "p", "div", "tr", "dd"];
const LIST_SEPARATORS: [char; 7] = [',', ';', '\n', '\u{2022}', '*', '\u{00b7}', '\r'];

/// One top-level `{{name|arg|...}}` occurrence.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Template<'a> {
    pub name: String,
    pub args: Vec<&'a str>,
}

impl<'a> Template<'a> {
    fn parse(inner: &'a str) -> Self {
        let parts = split_top_level(inner, b'|');
        match parts.split_first() {
            Some((name, args)) => Self {
                name: normalize_template_name(name),
                args: args.to_vec(),
            },
            None => Self {
                name: String::new(),
                args: Vec::new(),
            },
        }
    }

    /// Arguments without a top-level `key=` prefix.
    pub fn positional(&self) -> Vec<&'a str> {
        self.args
            .iter()
            .copied()
            .filter(|arg| named_arg(arg).is_none())
            .collect()
    }

    /// `key=value` arguments with normalized keys.
    pub fn named(&self) -> Vec<(String, &'a str)> {
        self.args.iter().copied().filter_map(named_arg).collect()
    }
}

fn named_arg(arg: &str) -> Option<(String, &str)> {
    let parts = split_top_level(arg, b'=');
    if parts.len() < 2 {
        return None;
    }
    let key = parts[0].trim();
    let simple_key = !key.is_empty()
        && key
            .chars()
            .all(|ch| ch.is_alphanumeric() || matches!(ch, '_' | ' ' | '-' | '(' | ')'));
    if !simple_key {
        return None;
    }
    Some((normalize_key(key), arg[parts[0].len() + 1..].trim()))
}

pub(crate) fn normalize_template_name(raw: &str) -> String {
    collapse_whitespace(&raw.replace('_', " ")).to_ascii_lowercase()
}

/// Lowercases an infobox parameter or row label into `snake_case` form.
pub(crate) fn normalize_key(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase().replace("(s)", "s");
    collapse_whitespace(&lowered.replace(['-', '_'], " ")).replace(' ', "_")
}

pub(crate) fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits on an ASCII separator outside `{{...}}` and `[[...]]` groups.
pub(crate) fn split_top_level(text: &str, separator: u8) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut template_depth = 0usize;
    let mut link_depth = 0usize;
    let mut start = 0;
    let mut index = 0;
    while index < bytes.len() {
        let pair = &bytes[index..bytes.len().min(index + 2)];
        match pair {
            b"{{" => {
                template_depth += 1;
                index += 2;
                continue;
            }
            b"}}" if template_depth > 0 => {
                template_depth -= 1;
                index += 2;
                continue;
            }
            b"[[" => {
                link_depth += 1;
                index += 2;
                continue;
            }
            b"]]" if link_depth > 0 => {
                link_depth -= 1;
                index += 2;
                continue;
            }
            _ => {}
        }
        if bytes[index] == separator && template_depth == 0 && link_depth == 0 {
            parts.push(&text[start..index]);
            start = index + 1;
        }
        index += 1;
    }
    parts.push(&text[start..]);
    parts
}

/// End offset (exclusive) of the group opening at `open`.
fn group_end(text: &str, open: usize, opener: &[u8], closer: &[u8]) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut index = open;
    while index + 1 < bytes.len() {
        let pair = &bytes[index..index + 2];
        if pair == opener {
            depth += 1;
            index += 2;
        } else if pair == closer {
            depth = depth.saturating_sub(1);
            index += 2;
            if depth == 0 {
                return Some(index);
            }
        } else {
            index += 1;
        }
    }
    None
}

/// Top-level templates in document order. Unclosed templates are skipped.
pub(crate) fn templates(text: &str) -> Vec<Template<'_>> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(relative) = text[cursor..].find("{{") {
        let open = cursor + relative;
        match group_end(text, open, b"{{", b"}}") {
            Some(end) => {
                found.push(Template::parse(&text[open + 2..end - 2]));
                cursor = end;
            }
            None => cursor = open + 2,
        }
    }
    found
}

/// Replaces each top-level template with `render(template)`.
fn map_templates(text: &str, render: &dyn Fn(&Template<'_>) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(relative) = text[cursor..].find("{{") {
        let open = cursor + relative;
        out.push_str(&text[cursor..open]);
        match group_end(text, open, b"{{", b"}}") {
            Some(end) => {
                out.push_str(&render(&Template::parse(&text[open + 2..end - 2])));
                cursor = end;
            }
            None => cursor = open + 2,
        }
    }
    out.push_str(&text[cursor..]);
    out
}

fn render_inline_template(template: &Template<'_>) -> String {
    let name = template.name.as_str();
    if LIST_TEMPLATES.contains(&name) {
        return template
            .positional()
            .iter()
            .map(|item| map_templates(item, &render_inline_template))
            .collect::<Vec<_>>()
            .join("\n");
    }
    if WRAPPER_TEMPLATES.contains(&name) {
        return template
            .positional()
            .last()
            .map(|item| map_templates(item, &render_inline_template))
            .unwrap_or_default();
    }
    String::new()
}

pub(crate) fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find("<!--") {
        out.push_str(&rest[..open]);
        match rest[open..].find("-->") {
            Some(close) => rest = &rest[open + close + 3..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Removes `<ref>...</ref>` bodies and self-closing `<ref/>` tags.
pub(crate) fn strip_refs(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut search_from = 0;
    while let Some(relative) = lower[search_from..].find("<ref") {
        let open = search_from + relative;
        let next = lower.as_bytes().get(open + 4).copied();
        if !matches!(next, Some(b'>') | Some(b' ') | Some(b'/') | Some(b'\t') | Some(b'\n')) {
            search_from = open + 4;
            continue;
        }
        let Some(tag_close) = lower[open..].find('>').map(|offset| open + offset) else {
            break;
        };
        out.push_str(&text[cursor..open]);
        if lower.as_bytes()[tag_close - 1] == b'/' {
            cursor = tag_close + 1;
        } else {
            cursor = match lower[tag_close..].find("</ref>") {
                Some(offset) => tag_close + offset + "</ref>".len(),
                None => tag_close + 1,
            };
        }
        search_from = cursor;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Rewrites `[[target|label]]` to its label and drops file and category links.
pub(crate) fn replace_links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(relative) = text[cursor..].find('[') {
        let open = cursor + relative;
        out.push_str(&text[cursor..open]);
        if text[open..].starts_with("[[") {
            match group_end(text, open, b"[[", b"]]") {
                Some(end) => {
                    out.push_str(&render_internal_link(&text[open + 2..end - 2]));
                    cursor = end;
                }
                None => cursor = open + 2,
            }
            continue;
        }
        let external = text[open + 1..].starts_with("http") || text[open + 1..].starts_with("//");
        match text[open..].find(']') {
            Some(close) if external => {
                let inner = &text[open + 1..open + close];
                if let Some((_, label)) = inner.split_once(' ') {
                    out.push_str(label.trim());
                }
                cursor = open + close + 1;
            }
            _ => {
                out.push('[');
                cursor = open + 1;
            }
        }
    }
    out.push_str(&text[cursor..]);
    out
}

fn render_internal_link(inner: &str) -> String {
    let lowered = inner.trim_start().to_ascii_lowercase();
    if ["file:", "image:", "category:"]
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
    {
        return String::new();
    }
    let parts = split_top_level(inner, b'|');
    let label = parts.last().copied().unwrap_or(inner);
    let label = if label.trim().is_empty() { parts[0] } else { label };
    replace_links(label.trim())
}

/// Drops HTML tags, turning block-level boundaries into newlines.
pub(crate) fn strip_html_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(relative) = text[cursor..].find('<') {
        let open = cursor + relative;
        out.push_str(&text[cursor..open]);
        let after = &text[open + 1..];
        let looks_like_tag = after
            .chars()
            .next()
            .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '/' || ch == '!');
        match after.find('>') {
            Some(close) if looks_like_tag => {
                let name: String = after[..close]
                    .trim_start_matches('/')
                    .chars()
                    .take_while(|ch| ch.is_ascii_alphanumeric())
                    .collect::<String>()
                    .to_ascii_lowercase();
                if BLOCK_TAGS.contains(&name.as_str()) {
                    out.push('\n');
                }
                cursor = open + 1 + close + 1;
            }
            _ => {
                out.push('<');
                cursor = open + 1;
            }
        }
    }
    out.push_str(&text[cursor..]);
    out
}

pub(crate) fn decode_entities(text: &str) -> String {
    decode_numeric_entities(text)
        .replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&ndash;", "\u{2013}")
        .replace("&mdash;", "\u{2014}")
        .replace("&minus;", "\u{2212}")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .replace('\u{a0}', " ")
}

/// Decodes `&#NNNN;` and `&#xHHHH;` references; invalid ones stay verbatim.
fn decode_numeric_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(relative) = text[cursor..].find("&#") {
        let open = cursor + relative;
        out.push_str(&text[cursor..open]);
        let decoded = text[open + 2..].find(';').and_then(|close| {
            let body = &text[open + 2..open + 2 + close];
            let code = match body.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => body.parse::<u32>().ok(),
            };
            code.and_then(char::from_u32)
                .map(|ch| (ch, open + 2 + close + 1))
        });
        match decoded {
            Some((ch, next)) => {
                out.push(if ch == '\u{a0}' { ' ' } else { ch });
                cursor = next;
            }
            None => {
                out.push_str("&#");
                cursor = open + 2;
            }
        }
    }
    out.push_str(&text[cursor..]);
    out
}

/// Full cleanup that keeps line structure, so list items stay separable.
pub(crate) fn strip_markup(raw: &str) -> String {
    let without_notes = strip_refs(&strip_comments(raw));
    let expanded = map_templates(&without_notes, &render_inline_template);
    let linked = replace_links(&expanded);
    let plain = decode_entities(&strip_html_tags(&linked));
    plain
        .replace("'''", "")
        .replace("''", "")
        .replace("{{", "")
        .replace("}}", "")
}

/// Single-line plain text for scalar fields.
pub fn clean_text(raw: &str) -> String {
    collapse_whitespace(&strip_markup(raw))
        .trim_matches(|ch: char| ch == ',' || ch == ';' || ch.is_whitespace())
        .to_string()
}

/// Splits a list-valued parameter into cleaned, case-insensitively unique items.
pub fn split_list(raw: &str) -> Vec<String> {
    let plain = strip_markup(raw);
    let items = plain
        .split(LIST_SEPARATORS)
        .map(|item| {
            collapse_whitespace(item)
                .trim_matches(|ch: char| ch == '.' || ch == ':' || ch.is_whitespace())
                .to_string()
        })
        .filter(|item| !item.is_empty());
    dedup_case_insensitive(items)
}

pub(crate) fn dedup_case_insensitive(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.to_lowercase()))
        .collect()
}

/// Plain-text rendering of the section before the first heading.
pub fn lead_text(wikitext: &str) -> String {
    let lead = if wikitext.starts_with("==") {
        ""
    } else {
        wikitext
            .find("\n==")
            .map(|heading| &wikitext[..heading])
            .unwrap_or(wikitext)
    };
    let without_notes = strip_refs(&strip_comments(lead));
    let expanded = map_templates(&without_notes, &render_inline_template);
    let linked = replace_links(&expanded);
    let plain = decode_entities(&strip_html_tags(&linked))
        .replace("'''", "")
        .replace("''", "");

    let mut paragraphs = Vec::new();
    let mut current = Vec::new();
    for line in plain.lines() {
        let trimmed = line.trim();
        let is_markup_line = trimmed.starts_with('|')
            || trimmed.starts_with("{|")
            || trimmed.starts_with('!')
            || trimmed.starts_with("__");
        if trimmed.is_empty() || is_markup_line {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
            continue;
        }
        current.push(trimmed);
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }

    paragraphs
        .iter()
        .map(|paragraph| tidy_parentheses(&collapse_whitespace(paragraph)))
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Removes punctuation left behind by dropped pronunciation templates.
fn tidy_parentheses(text: &str) -> String {
    let mut tidied = text.to_string();
    for (from, to) in [("( ; ", "("), ("(; ", "("), ("(, ", "("), (" ()", ""), ("()", "")] {
        tidied = tidied.replace(from, to);
    }
    tidied
}

#[cfg(test)]
mod tests {
    use super::{clean_text, lead_text, normalize_key, split_list, split_top_level, templates};

    #[test]
    fn test_split_top_level_ignores_pipes_inside_links_and_templates() {
        let parts = split_top_level("a=[[B|C]]|d={{x|y}}|e", b'|');
        assert_eq!(parts, vec!["a=[[B|C]]", "d={{x|y}}", "e"]);
    }

    #[test]
    fn test_clean_text_strips_links_refs_and_comments() {
        let raw = "[[Hamlet, North Carolina|Hamlet]], U.S.<ref name=\"a\">cite</ref><!-- note -->";
        assert_eq!(clean_text(raw), "Hamlet, U.S.");
    }

    #[test]
    fn test_split_list_handles_hlist_and_deduplicates() {
        let raw = "{{hlist|[[Jazz]]|[[hard bop]]|jazz}}";
        assert_eq!(split_list(raw), vec!["Jazz", "hard bop"]);
    }

    #[test]
    fn test_split_list_handles_flatlist_bullets_and_breaks() {
        let raw = "{{flatlist|\n* [[Impulse! Records|Impulse!]]\n* [[Atlantic Records|Atlantic]]}}<br />Prestige \u{2022} Blue Note";
        assert_eq!(
            split_list(raw),
            vec!["Impulse!", "Atlantic", "Prestige", "Blue Note"]
        );
    }

    #[test]
    fn test_templates_report_named_and_positional_arguments() {
        let found = templates("x {{Birth date and age|df=yes|1926|9|23}} y");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "birth date and age");
        assert_eq!(found[0].positional(), vec!["1926", "9", "23"]);
        assert_eq!(found[0].named()[0].0, "df");
    }

    #[test]
    fn test_normalize_key_folds_spacing_and_plural_marker() {
        assert_eq!(normalize_key(" Years active "), "years_active");
        assert_eq!(normalize_key("occupation(s)"), "occupations");
        assert_eq!(normalize_key("birth-place"), "birth_place");
    }

    #[test]
    fn test_lead_text_skips_infobox_and_stops_at_first_heading() {
        let wikitext = "{{Infobox musical artist\n| name = X\n}}\n'''John Coltrane''' ({{IPAc-en|k|oʊ}}; September 23, 1926) was an American [[jazz]] [[saxophone|saxophonist]].<ref>r</ref>\n\nHe led groups.\n== Biography ==\nLater text.";
        assert_eq!(
            lead_text(wikitext),
            "John Coltrane (September 23, 1926) was an American jazz saxophonist.\n\nHe led groups."
        );
    }
}
