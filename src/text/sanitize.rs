use std::sync::LazyLock;

use regex::Regex;
use unicode_general_category::{get_general_category, GeneralCategory};
use unicode_normalization::UnicodeNormalization;

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```|~~~.*?~~~").unwrap());
static HTML_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

static HORIZONTAL_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*_]\s*){3,}$").unwrap());
static TABLE_DIVIDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\|?\s*:?-{2,}:?\s*(?:\|\s*:?-{2,}:?\s*)*\|?$").unwrap());
static LINK_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[[^\]]+\]:\s*\S+").unwrap());

static BLOCKQUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:>\s*)+").unwrap());
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#{1,6}(?:\s+|$)").unwrap());
static NUMBERED_LIST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+[.)]\s+").unwrap());
static BULLET_LIST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-*+]\s+").unwrap());

static IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap());
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\](?:\([^)]*\)|\[[^\]]*\])").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());
static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*|__([^_]+)__").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static UNDERLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_([^_]+)_").unwrap());
static STRIKETHROUGH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~([^~]+)~~").unwrap());
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[A-Za-z][^>]*>").unwrap());

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Strip markdown/HTML markup and unspeakable characters from narration text.
///
/// The result keeps paragraph breaks as a single blank line and collapses all
/// other whitespace. Empty output means there is nothing to synthesize.
/// Sanitizing already-sanitized text returns it unchanged.
pub fn sanitize_markdown_for_tts(markdown: &str) -> String {
    // Stripping one layer of markup can expose another (`` `# x` `` becomes
    // `# x`), so iterate until nothing changes. A pass only removes markup,
    // so this reaches a fixed point.
    let mut current = sanitize_pass(markdown);
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn sanitize_pass(markdown: &str) -> String {
    let without_blocks = CODE_BLOCK.replace_all(markdown, "");
    let without_comments = HTML_COMMENT.replace_all(&without_blocks, "");
    let composed: String = without_comments
        .nfc()
        .filter(|&ch| is_speakable(ch))
        .collect();

    let mut lines = Vec::new();
    for line in composed.lines() {
        let stripped = line.trim();
        if stripped.is_empty()
            || HORIZONTAL_RULE.is_match(stripped)
            || LINK_REFERENCE.is_match(stripped)
        {
            lines.push(String::new());
            continue;
        }
        if stripped.contains('|') && TABLE_DIVIDER.is_match(stripped) {
            continue;
        }
        let body = strip_line_prefixes(stripped);
        lines.push(strip_inline_markup(body));
    }

    let mut collapsed: Vec<String> = Vec::with_capacity(lines.len());
    let mut previous_blank = true;
    for line in lines {
        let line = WHITESPACE_RUN.replace_all(line.trim(), " ").into_owned();
        if line.is_empty() {
            if !previous_blank {
                collapsed.push(line);
            }
            previous_blank = true;
        } else {
            collapsed.push(line);
            previous_blank = false;
        }
    }

    collapsed
        .join("\n")
        .trim()
        .chars()
        .filter(|&ch| is_speakable(ch))
        .collect::<String>()
}

fn strip_line_prefixes(line: &str) -> &str {
    let mut rest = line;
    loop {
        let before = rest.len();
        for pattern in [&*BLOCKQUOTE, &*HEADING, &*NUMBERED_LIST, &*BULLET_LIST] {
            if let Some(m) = pattern.find(rest) {
                rest = rest[m.end()..].trim_start();
            }
        }
        if rest.len() == before {
            return rest;
        }
    }
}

fn strip_inline_markup(line: &str) -> String {
    let text = IMAGE.replace_all(line, "$1");
    let text = LINK.replace_all(&text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = BOLD.replace_all(&text, "$1$2");
    let text = ITALIC.replace_all(&text, "$1");
    let text = UNDERLINE.replace_all(&text, "$1");
    let text = STRIKETHROUGH.replace_all(&text, "$1");
    let text = HTML_TAG.replace_all(&text, "");
    text.replace('|', " ")
}

/// Whether a speech engine can be expected to voice `ch`.
///
/// Whitespace survives so line and paragraph breaks reach the segmenter.
fn is_speakable(ch: char) -> bool {
    if ch.is_whitespace() {
        return true;
    }
    if ch == '\u{FFFD}' || u32::from(ch) > 0xFFFF {
        return false;
    }
    !matches!(
        get_general_category(ch),
        GeneralCategory::Control
            | GeneralCategory::Format
            | GeneralCategory::Unassigned
            | GeneralCategory::PrivateUse
            | GeneralCategory::Surrogate
    )
}

/// Split markdown into sanitized paragraphs, dropping heading-only blocks.
pub fn split_markdown_paragraphs(markdown: &str) -> Vec<String> {
    static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

    BLANK_LINES
        .split(markdown.trim())
        .filter_map(|block| {
            let content: Vec<&str> = block
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .collect();
            if content.is_empty() {
                return None;
            }
            let paragraph = sanitize_markdown_for_tts(&content.join("\n"));
            let paragraph = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
            (!paragraph.is_empty()).then_some(paragraph)
        })
        .collect()
}
