//! Post-processing: deterministic cleanup of VLM output and block text.
//!
//! Even well-prompted VLMs wrap their answer in ` ```json ` fences, emit
//! `\r\n` line endings or sprinkle zero-width spaces through the text. These
//! rules fix such quirks without touching content, so the prompt can stay
//! focused on *what to extract*.
//!
//! ## Rule Order
//!
//! Fences are stripped before line endings are normalised so that the fence
//! regex sees the raw reply; invisible characters go last so that trimming
//! has already removed trailing whitespace they might hide behind.

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean the raw reply of the vision model before it is parsed.
///
/// Rules (applied in order):
/// 1. Strip outer ` ``` ` fences (`json`, `markdown` or bare)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
pub fn clean_model_output(input: &str) -> String {
    let s = strip_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    remove_invisible_chars(&s).trim().to_string()
}

/// Clean one block of text taken from a text layer or a model reply.
///
/// Line endings and invisible characters are handled as in
/// [`clean_model_output`]; runs of blank lines collapse to one.
pub fn clean_block_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = trim_trailing_whitespace(&s);
    let s = remove_invisible_chars(&s);
    collapse_blank_lines(&s).trim().to_string()
}

// ── Rule 1: Strip outer fences ───────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[a-zA-Z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").expect("valid regex")
});

fn strip_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Strip invisible Unicode ──────────────────────────────────────────

const INVISIBLE: [char; 6] = [
    '\u{200B}', // zero-width space
    '\u{200C}', // zero-width non-joiner
    '\u{200D}', // zero-width joiner
    '\u{2060}', // word joiner
    '\u{FEFF}', // BOM
    '\u{00AD}', // soft hyphen
];

fn remove_invisible_chars(input: &str) -> String {
    input.chars().filter(|c| !INVISIBLE.contains(c)).collect()
}

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").into_owned()
}
