//! Render a source message with formatting entities into archive HTML
//!
//! Entity offsets and lengths count UTF-16 code units. All text is escaped;
//! the only markup produced is `<b>`, `<i>`, `<a>` and `<br>`.

use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Bold,
    Italic,
    /// Link with its own target (`url`)
    TextUrl,
    /// The covered text is itself a URL
    Url,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
    #[serde(default)]
    pub url: Option<String>,
}

#[cfg(test)]
impl MessageEntity {
    pub fn new(kind: EntityKind, offset: usize, length: usize) -> Self {
        Self {
            kind,
            offset,
            length,
            url: None,
        }
    }

    pub fn link(offset: usize, length: usize, url: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::TextUrl,
            offset,
            length,
            url: Some(url.into()),
        }
    }
}

/// An entity resolved against the message, `start..end` in UTF-16 units
#[derive(Clone, Copy)]
struct Span<'a> {
    start: usize,
    end: usize,
    entity: &'a MessageEntity,
}

pub fn render_message(text: &str, entities: &[MessageEntity]) -> String {
    let units: Vec<u16> = text.encode_utf16().collect();

    let mut spans: Vec<Span<'_>> = entities
        .iter()
        .filter(|e| e.length > 0)
        .filter_map(|entity| {
            let end = entity.offset.checked_add(entity.length)?;
            (end <= units.len()).then_some(Span {
                start: entity.offset,
                end,
                entity,
            })
        })
        .collect();
    // Enclosing spans sort ahead of the spans they contain
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut out = String::with_capacity(text.len());
    render_range(&units, 0, units.len(), &spans, &mut out);
    out
}

/// Render `units[start..end]`. `spans` lie inside that range, sorted by start.
fn render_range(units: &[u16], start: usize, end: usize, spans: &[Span<'_>], out: &mut String) {
    let mut cursor = start;
    let mut i = 0;

    while i < spans.len() {
        let span = spans[i];
        out.push_str(&escape(&units[cursor..span.start]));

        // Spans starting inside this one nest in it; those crossing its end are dropped
        let mut children = Vec::new();
        let mut next = i + 1;
        while next < spans.len() && spans[next].start < span.end {
            if spans[next].end <= span.end {
                children.push(spans[next]);
            }
            next += 1;
        }

        let mut inner = String::new();
        render_range(units, span.start, span.end, &children, &mut inner);
        wrap(span.entity, &units[span.start..span.end], &inner, out);

        cursor = span.end;
        i = next;
    }

    out.push_str(&escape(&units[cursor..end]));
}

fn wrap(entity: &MessageEntity, covered: &[u16], inner: &str, out: &mut String) {
    match entity.kind {
        EntityKind::Bold => out.push_str(&format!("<b>{}</b>", inner)),
        EntityKind::Italic => out.push_str(&format!("<i>{}</i>", inner)),
        EntityKind::TextUrl => match entity.url.as_deref().and_then(safe_href) {
            Some(href) => out.push_str(&anchor(href, inner)),
            None => out.push_str(inner),
        },
        EntityKind::Url => {
            let raw = String::from_utf16_lossy(covered);
            let href = if raw.starts_with("http://") || raw.starts_with("https://") {
                raw
            } else {
                format!("http://{}", raw)
            };
            out.push_str(&anchor(&href, inner));
        }
        EntityKind::Other => out.push_str(inner),
    }
}

fn escape(units: &[u16]) -> String {
    encode_text(&String::from_utf16_lossy(units)).replace('\n', "<br>")
}

fn anchor(href: &str, inner: &str) -> String {
    format!(
        "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a>",
        encode_double_quoted_attribute(href),
        inner
    )
}

fn safe_href(url: &str) -> Option<&str> {
    let url = url.trim();
    let lower = url.to_ascii_lowercase();
    ["http://", "https://", "mailto:", "tg://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
        .then_some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_escaped_and_line_breaks_become_br() {
        assert_eq!(
            render_message("a < b & c\nnext", &[]),
            "a &lt; b &amp; c<br>next"
        );
    }

    #[test]
    fn bold_and_italic_wrap_their_span() {
        let entities = [
            MessageEntity::new(EntityKind::Italic, 6, 5),
            MessageEntity::new(EntityKind::Bold, 0, 5),
        ];
        assert_eq!(render_message("Hello world!", &entities), "<b>Hello</b> <i>world</i>!");
    }

    #[test]
    fn bare_urls_get_a_scheme() {
        let entities = [MessageEntity::new(EntityKind::Url, 4, 11)];
        assert_eq!(
            render_message("see example.org", &entities),
            "see <a href=\"http://example.org\" target=\"_blank\" rel=\"noopener noreferrer\">example.org</a>"
        );
    }

    #[test]
    fn text_links_with_unsafe_schemes_render_as_text() {
        let entities = [MessageEntity::link(0, 5, "javascript:alert(1)")];
        assert_eq!(render_message("click", &entities), "click");

        let entities = [MessageEntity::link(0, 5, "https://example.org/?a=1&b=\"2\"")];
        assert_eq!(
            render_message("click", &entities),
            "<a href=\"https://example.org/?a=1&amp;b=&quot;2&quot;\" target=\"_blank\" rel=\"noopener noreferrer\">click</a>"
        );
    }

    #[test]
    fn offsets_count_utf16_units() {
        // The emoji takes two UTF-16 units
        let entities = [MessageEntity::new(EntityKind::Bold, 3, 3)];
        assert_eq!(render_message("😀 Ура", &entities), "😀 <b>Ура</b>");
    }

    #[test]
    fn nested_entities_are_all_applied() {
        let entities = [
            MessageEntity::new(EntityKind::Italic, 2, 2),
            MessageEntity::new(EntityKind::Bold, 0, 4),
        ];
        assert_eq!(render_message("abcd", &entities), "<b>ab<i>cd</i></b>");

        let entities = [
            MessageEntity::link(0, 5, "https://example.org"),
            MessageEntity::new(EntityKind::Bold, 0, 5),
        ];
        assert_eq!(
            render_message("click", &entities),
            "<a href=\"https://example.org\" target=\"_blank\" rel=\"noopener noreferrer\"><b>click</b></a>"
        );
    }

    #[test]
    fn crossing_and_out_of_range_entities_are_ignored() {
        let entities = [
            MessageEntity::new(EntityKind::Bold, 0, 3),
            MessageEntity::new(EntityKind::Italic, 2, 2),
            MessageEntity::new(EntityKind::Bold, 3, 50),
        ];
        assert_eq!(render_message("abcd", &entities), "<b>abc</b>d");
    }

    #[test]
    fn huge_offsets_do_not_overflow() {
        let entity: MessageEntity = serde_json::from_str(
            r#"{ "type": "bold", "offset": 18446744073709551615, "length": 1 }"#,
        )
        .unwrap();
        assert_eq!(render_message("abcd", &[entity]), "abcd");

        let entities = [MessageEntity::new(EntityKind::Italic, 1, usize::MAX)];
        assert_eq!(render_message("abcd", &entities), "abcd");
    }

    #[test]
    fn unknown_entity_types_deserialize_as_other() {
        let entity: MessageEntity =
            serde_json::from_str(r#"{ "type": "spoiler", "offset": 0, "length": 1 }"#).unwrap();
        assert_eq!(entity.kind, EntityKind::Other);
    }
}
