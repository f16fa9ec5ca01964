//! Infobox and lead extraction for the rendered-HTML page payload.

use super::markup;
use crate::model::SourceFact;

/// Facts from the first `infobox` table of a rendered page section.
pub fn extract_infobox(html: &str) -> Vec<SourceFact> {
    let Some(table) = infobox_table(html) else {
        return Vec::new();
    };
    let params: Vec<(String, String)> = table_rows(table)
        .into_iter()
        .flat_map(|(label, value)| params_for_row(&label, &value))
        .collect();
    super::facts_from_params(&params)
}

/// Plain paragraphs of the lead section, tables and footnote markers removed.
pub fn lead_text(html: &str) -> String {
    let mut body = html.to_string();
    for tag in ["table", "sup", "style", "figure"] {
        body = remove_elements(&body, tag);
    }
    let lower = body.to_ascii_lowercase();
    let mut paragraphs = Vec::new();
    let mut cursor = 0;
    while let Some(relative) = find_open_tag(&lower[cursor..], "<p") {
        let open = cursor + relative;
        let Some(content_start) = lower[open..].find('>').map(|offset| open + offset + 1) else {
            break;
        };
        let content_end = lower[content_start..]
            .find("</p>")
            .map(|offset| content_start + offset)
            .unwrap_or(body.len());
        let text = markup::collapse_whitespace(&cell_text(&body[content_start..content_end]));
        if !text.is_empty() {
            paragraphs.push(text);
        }
        cursor = content_end;
    }
    paragraphs.join("\n\n")
}

fn params_for_row(label: &str, value: &str) -> Vec<(String, String)> {
    let key = match markup::normalize_key(label).as_str() {
        "born" => {
            let mut params = vec![("birth_date".to_string(), value.to_string())];
            if let Some(place) = place_after_date(value) {
                params.push(("birth_place".to_string(), place));
            }
            return params;
        }
        "died" => "death_date".to_string(),
        "labels" => "label".to_string(),
        "formerly_of" | "member_of" => "associated_acts".to_string(),
        other => other.to_string(),
    };
    vec![(key, value.to_string())]
}

/// The line following the date line of a "Born" cell.
fn place_after_date(value: &str) -> Option<String> {
    let lines: Vec<&str> = value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let date_line = lines
        .iter()
        .position(|line| super::dates::parse_plain_date(line).is_some())?;
    lines.get(date_line + 1).map(|line| line.to_string())
}

fn find_open_tag(lower: &str, open: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(relative) = lower[from..].find(open) {
        let at = from + relative;
        let next = lower.as_bytes().get(at + open.len()).copied();
        if matches!(next, Some(b'>' | b' ' | b'\t' | b'\n' | b'/')) {
            return Some(at);
        }
        from = at + open.len();
    }
    None
}

/// End offset of the element opening at `start`, honoring nesting.
fn element_end(lower: &str, start: usize, tag: &str) -> Option<usize> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut depth = 0usize;
    let mut cursor = start;
    loop {
        let next_open = find_open_tag(&lower[cursor..], &open).map(|offset| cursor + offset);
        let next_close = lower[cursor..].find(&close).map(|offset| cursor + offset)?;
        match next_open {
            Some(opened) if opened < next_close => {
                depth += 1;
                cursor = opened + open.len();
            }
            _ => {
                depth = depth.saturating_sub(1);
                cursor = next_close + close.len();
                if depth == 0 {
                    return Some(cursor);
                }
            }
        }
    }
}

fn remove_elements(html: &str, tag: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{tag}");
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;
    while let Some(relative) = find_open_tag(&lower[cursor..], &open) {
        let start = cursor + relative;
        out.push_str(&html[cursor..start]);
        match element_end(&lower, start, tag) {
            Some(end) => cursor = end,
            None => return out,
        }
    }
    out.push_str(&html[cursor..]);
    out
}

fn infobox_table(html: &str) -> Option<&str> {
    let lower = html.to_ascii_lowercase();
    let mut cursor = 0;
    while let Some(relative) = find_open_tag(&lower[cursor..], "<table") {
        let start = cursor + relative;
        let tag_end = lower[start..].find('>').map(|offset| start + offset)?;
        if lower[start..tag_end].contains("infobox") {
            let end = element_end(&lower, start, "table").unwrap_or(html.len());
            return Some(&html[start..end]);
        }
        cursor = tag_end;
    }
    None
}

fn element_inner<'a>(fragment: &'a str, lower: &str, tag: &str) -> Option<&'a str> {
    let start = find_open_tag(lower, &format!("<{tag}"))?;
    let content_start = lower[start..].find('>').map(|offset| start + offset + 1)?;
    let content_end = lower[content_start..]
        .find(&format!("</{tag}>"))
        .map(|offset| content_start + offset)
        .unwrap_or(fragment.len());
    Some(&fragment[content_start..content_end])
}

/// `(label, text)` pairs for rows carrying both a header and a data cell.
fn table_rows(table: &str) -> Vec<(String, String)> {
    let lower = table.to_ascii_lowercase();
    let mut starts = Vec::new();
    let mut cursor = 0;
    while let Some(relative) = find_open_tag(&lower[cursor..], "<tr") {
        starts.push(cursor + relative);
        cursor += relative + 3;
    }
    starts
        .iter()
        .enumerate()
        .filter_map(|(index, start)| {
            let end = starts.get(index + 1).copied().unwrap_or(table.len());
            let row = &table[*start..end];
            let row_lower = &lower[*start..end];
            let label = markup::collapse_whitespace(&cell_text(element_inner(row, row_lower, "th")?));
            let value = cell_text(element_inner(row, row_lower, "td")?);
            (!label.is_empty() && !value.trim().is_empty()).then_some((label, value))
        })
        .collect()
}

/// Tag-free text keeping one line per block element.
fn cell_text(fragment: &str) -> String {
    let without_hidden = remove_elements(fragment, "style");
    markup::decode_entities(&markup::strip_html_tags(&without_hidden))
        .lines()
        .map(markup::collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::{extract_infobox, lead_text};
    use crate::model::{FieldName, FieldValue};

    const SECTION: &str = r#"<table class="infobox vcard plainlist"><tbody>
<tr><th colspan="2">John Coltrane</th></tr>
<tr><th scope="row">Born</th><td>John William Coltrane<br><span style="display:none">(<span class="bday">1926-09-23</span>)</span>September 23, 1926<br>Hamlet, North Carolina, U.S.</td></tr>
<tr><th scope="row">Died</th><td>July 17, 1967<span>(aged 40)</span></td></tr>
<tr><th scope="row">Instruments</th><td><div class="hlist"><ul><li>Tenor saxophone</li><li>soprano saxophone</li></ul></div></td></tr>
<tr><th scope="row">Years active</th><td>1945&#8211;1967</td></tr>
<tr><th scope="row">Labels</th><td>Prestige, Atlantic, Impulse!</td></tr>
</tbody></table>
<p><b>John William Coltrane</b> was an American jazz saxophonist.<sup class="reference">[1]</sup></p>
<p>He worked with Miles Davis.</p>"#;

    #[test]
    fn test_extract_infobox_maps_rows_to_fields() {
        let facts = extract_infobox(SECTION);
        let value = |field: FieldName| {
            facts
                .iter()
                .find(|fact| fact.field == field)
                .map(|fact| fact.value.clone())
        };

        assert_eq!(
            value(FieldName::BirthDate).and_then(|v| v.as_date().map(|d| d.iso())),
            Some("1926-09-23".to_string())
        );
        assert_eq!(
            value(FieldName::Birthplace),
            Some(FieldValue::Text("Hamlet, North Carolina, U.S.".to_string()))
        );
        assert_eq!(
            value(FieldName::DeathDate).and_then(|v| v.as_date().map(|d| d.iso())),
            Some("1967-07-17".to_string())
        );
        assert_eq!(
            value(FieldName::Instruments),
            Some(FieldValue::List(vec![
                "Tenor saxophone".to_string(),
                "soprano saxophone".to_string()
            ]))
        );
        assert_eq!(
            value(FieldName::RecordLabels).and_then(|v| v.as_list().map(<[String]>::len)),
            Some(3)
        );
    }

    #[test]
    fn test_lead_text_drops_tables_and_reference_markers() {
        assert_eq!(
            lead_text(SECTION),
            "John William Coltrane was an American jazz saxophonist.\n\nHe worked with Miles Davis."
        );
    }

    #[test]
    fn test_extract_infobox_without_table_is_empty() {
        assert!(extract_infobox("<p>No infobox here.</p>").is_empty());
    }
}
