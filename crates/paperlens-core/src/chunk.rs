//! Topic sectioning and paragraph-boundary splitting.
//!
//! Extracted document text arrives as one long string. [`sectionize`]
//! cuts it into topic-labelled [`Section`]s at heading lines, then keeps
//! each section body under a `max_tokens` budget by splitting on paragraph
//! boundaries (`\n\n`). [`chunks_from_sections`] assigns the ordinals the
//! retrieval index uses as chunk ids.
//!
//! # Heading detection
//!
//! A heading is a short line (at most [`MAX_HEADING_CHARS`] characters, no
//! trailing period) that is either:
//!
//! - numbered: `1 Introduction`, `2.3 Results`, `IV. Methods`, or
//! - a common paper heading such as `Abstract` or `References`
//!   (case-insensitive, optional trailing colon).
//!
//! Text before the first heading is filed under [`PREAMBLE_TOPIC`].
//!
//! # Example
//!
//! ```rust
//! use paperlens_core::chunk::sectionize;
//!
//! let sections = sectionize("Abstract\nWe study widgets.\n\n1 Introduction\nWidgets matter.", 700);
//! assert_eq!(sections.len(), 2);
//! assert_eq!(sections[0].topic, "Abstract");
//! assert_eq!(sections[1].topic, "1 Introduction");
//! ```

use crate::models::{Chunk, Section};

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Longest line still considered a heading candidate.
pub const MAX_HEADING_CHARS: usize = 80;

/// Most words a numbered heading may carry after its number.
const MAX_HEADING_WORDS: usize = 10;

/// Topic for text that precedes the first detected heading.
pub const PREAMBLE_TOPIC: &str = "Preamble";

const KNOWN_HEADINGS: &[&str] = &[
    "abstract",
    "introduction",
    "background",
    "related work",
    "method",
    "methods",
    "methodology",
    "approach",
    "experiments",
    "experimental setup",
    "evaluation",
    "results",
    "discussion",
    "conclusion",
    "conclusions",
    "future work",
    "limitations",
    "acknowledgements",
    "acknowledgments",
    "references",
    "bibliography",
    "appendix",
];

/// Split extracted text into topic-labelled sections.
///
/// Sections with empty bodies are dropped, so a heading immediately followed
/// by another heading yields nothing. Oversized bodies are split into
/// `"{topic} (part N)"` sections, the first keeping the bare topic.
pub fn sectionize(text: &str, max_tokens: usize) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut topic = PREAMBLE_TOPIC.to_string();
    let mut body = String::new();

    for line in text.lines() {
        if let Some(heading) = heading_label(line) {
            flush_section(&mut sections, &topic, &body, max_tokens);
            topic = heading;
            body.clear();
            continue;
        }
        body.push_str(line);
        body.push('\n');
    }
    flush_section(&mut sections, &topic, &body, max_tokens);

    sections
}

fn flush_section(sections: &mut Vec<Section>, topic: &str, body: &str, max_tokens: usize) {
    let parts = split_paragraphs(body, max_tokens);
    for (i, part) in parts.into_iter().enumerate() {
        let label = if i == 0 {
            topic.to_string()
        } else {
            format!("{} (part {})", topic, i + 1)
        };
        sections.push(Section::new(label, part));
    }
}

/// Assign contiguous ordinals `0..N` to sections, in order.
pub fn chunks_from_sections(sections: Vec<Section>) -> Vec<Chunk> {
    sections
        .into_iter()
        .enumerate()
        .map(|(id, s)| Chunk {
            id,
            topic: s.topic,
            text: s.text,
        })
        .collect()
}

/// Returns the heading text if `line` looks like a section heading.
pub fn heading_label(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_HEADING_CHARS || trimmed.ends_with('.')
    {
        return None;
    }

    let bare = trimmed.trim_end_matches(':').trim_end();
    if KNOWN_HEADINGS.contains(&bare.to_lowercase().as_str()) {
        return Some(bare.to_string());
    }

    let (number, rest) = bare.split_once(char::is_whitespace)?;
    let rest = rest.trim_start();
    let starts_upper = rest.chars().next().is_some_and(|c| c.is_uppercase());
    if starts_upper
        && rest.split_whitespace().count() <= MAX_HEADING_WORDS
        && (is_section_number(number) || is_roman_numeral(number))
    {
        return Some(bare.to_string());
    }

    None
}

/// `1`, `2.3`, `4.1.2`, `5.` — digits separated by single dots.
fn is_section_number(token: &str) -> bool {
    let token = token.strip_suffix('.').unwrap_or(token);
    !token.is_empty()
        && token
            .split('.')
            .all(|part| !part.is_empty() && part.len() <= 3 && part.chars().all(|c| c.is_ascii_digit()))
}

/// `I.` through `XX.` style numbering; the trailing dot is required so a
/// sentence starting with the pronoun "I" is not mistaken for a heading.
fn is_roman_numeral(token: &str) -> bool {
    match token.strip_suffix('.') {
        Some(numeral) => {
            !numeral.is_empty()
                && numeral.len() <= 5
                && numeral.chars().all(|c| matches!(c, 'I' | 'V' | 'X'))
        }
        None => false,
    }
}

/// Split text on paragraph boundaries so no piece exceeds `max_tokens`.
///
/// Paragraphs are accumulated until adding the next one would overflow the
/// budget. A single paragraph larger than the budget is hard-split at the
/// nearest newline or space. Returns no pieces for blank input.
pub fn split_paragraphs(text: &str, max_tokens: usize) -> Vec<String> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let mut pieces = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            pieces.push(std::mem::take(&mut current_buf));
        }

        if trimmed.len() > max_chars {
            hard_split(trimmed, max_chars, &mut pieces);
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        pieces.push(current_buf);
    }

    pieces
}

fn hard_split(paragraph: &str, max_chars: usize, pieces: &mut Vec<String>) {
    let mut remaining = paragraph;
    while !remaining.is_empty() {
        let mut split_at = remaining.len().min(max_chars);
        while !remaining.is_char_boundary(split_at) {
            split_at -= 1;
        }
        let actual_split = if split_at < remaining.len() {
            remaining[..split_at]
                .rfind('\n')
                .or_else(|| remaining[..split_at].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(split_at)
        } else {
            split_at
        };
        let piece = remaining[..actual_split].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        remaining = &remaining[actual_split..];
    }
}
