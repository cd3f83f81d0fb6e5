//! HTML to readable text, used by `web_fetch` when no proxy answers.

use std::sync::LazyLock;

use regex_lite::{Captures, Regex};

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in HTML pattern is valid")
}

static TITLE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?is)<title[^>]*>(.*?)</title>"));
static COMMENT: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)<!--.*?-->"));
static HIDDEN_ELEMENTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ["script", "style", "noscript", "svg", "head", "template"]
        .iter()
        .map(|tag| compile(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")))
        .collect()
});
static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)<br\s*/?>|</(p|div|li|tr|h[1-6]|section|article|header|footer|blockquote|pre|table|ul|ol)\s*>",
    )
});
static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)<li\b[^>]*>"));
static TAG: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)<[^>]*>"));
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| compile(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);"));

/// Contents of the first `<title>` element.
pub fn extract_title(html: &str) -> Option<String> {
    let raw = TITLE.captures(html)?.get(1)?.as_str();
    let title = collapse_inline(&decode_entities(raw));
    (!title.is_empty()).then_some(title)
}

/// Visible text of an HTML document.
pub fn to_text(html: &str) -> String {
    let mut text = COMMENT.replace_all(html, "").into_owned();
    for element in HIDDEN_ELEMENTS.iter() {
        text = element.replace_all(&text, "").into_owned();
    }
    text = BLOCK_BREAK.replace_all(&text, "\n").into_owned();
    text = LIST_ITEM.replace_all(&text, "\n- ").into_owned();
    text = TAG.replace_all(&text, "").into_owned();
    collapse_whitespace(&decode_entities(&text))
}

/// Cut `text` to `max_chars` characters, appending a truncation marker.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!(
        "{}\n\n[Content truncated to {max_chars} characters]",
        cut.trim_end()
    )
}

pub fn decode_entities(text: &str) -> String {
    ENTITY.replace_all(text, |caps: &Captures| {
        let entity = &caps[1];
        let decoded = if let Some(hex) = entity
            .strip_prefix("#x")
            .or_else(|| entity.strip_prefix("#X"))
        {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = entity.strip_prefix('#') {
            dec.parse::<u32>().ok().and_then(char::from_u32)
        } else {
            named_entity(entity)
        };
        decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
    })
    .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "hellip" => '\u{2026}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "rsquo" => '\u{2019}',
        "lsquo" => '\u{2018}',
        "rdquo" => '\u{201d}',
        "ldquo" => '\u{201c}',
        _ => return None,
    })
}

fn collapse_inline(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One space between words, at most one blank line between blocks.
fn collapse_whitespace(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut blank = false;
    for line in text.lines() {
        let line = collapse_inline(line);
        if line.is_empty() {
            blank = !out.is_empty();
            continue;
        }
        if blank {
            out.push(String::new());
            blank = false;
        }
        out.push(line);
    }
    out.join("\n")
}
