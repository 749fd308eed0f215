//! Post-processing: deterministic cleanup of raw engine text.
//!
//! Both engines return text with layout debris: stray control characters from
//! broken font maps, U+FFFD for unmapped glyphs, zero-width joiners, runs of
//! spaces used for column alignment, and blank lines used for vertical
//! spacing. The rules below normalise that without touching the words
//! themselves.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so every later rule can assume `\n`.
//! Invisible and control characters go before whitespace collapsing so a
//! removed character never leaves a double space behind, and lines are
//! trimmed before blank-line collapsing so whitespace-only lines count as
//! blank.

use once_cell::sync::Lazy;
use regex::Regex;

/// Switches for the optional cleaning rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanOptions {
    /// Collapse runs of horizontal whitespace to one space. Default: true.
    pub collapse_whitespace: bool,
    /// Keep paragraph breaks (one blank line) instead of joining all lines
    /// into one. Default: true.
    pub preserve_paragraphs: bool,
    /// Expand typographic ligatures (`ﬁ` → `fi`). Default: true.
    pub expand_ligatures: bool,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            collapse_whitespace: true,
            preserve_paragraphs: true,
            expand_ligatures: true,
        }
    }
}

/// Clean the raw text of one page.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Strip control characters and U+FFFD replacement characters
/// 4. Expand ligatures (optional)
/// 5. Replace non-breaking and other exotic spaces with a plain space
/// 6. Collapse horizontal whitespace (optional)
/// 7. Trim every line
/// 8. Collapse blank-line runs to one blank line, or join all lines when
///    paragraphs are not preserved
/// 9. Trim the result
pub fn clean_text(raw: &str, options: &CleanOptions) -> String {
    let s = normalise_line_endings(raw);
    let s = remove_invisible_chars(&s);
    let s = remove_control_chars(&s);
    let s = if options.expand_ligatures {
        expand_ligatures(&s)
    } else {
        s
    };
    let s = normalise_spaces(&s);
    let s = if options.collapse_whitespace {
        collapse_horizontal_whitespace(&s)
    } else {
        s
    };
    let s = trim_lines(&s);
    let s = if options.preserve_paragraphs {
        collapse_blank_lines(&s)
    } else {
        join_lines(&s)
    };
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Remove control characters ───────────────────────────────────────

/// Drops C0/C1 controls (keeping `\n` and `\t`) and U+FFFD.
fn remove_control_chars(input: &str) -> String {
    input
        .chars()
        .filter(|&c| c == '\n' || c == '\t' || (!c.is_control() && c != '\u{FFFD}'))
        .collect()
}

// ── Rule 4: Expand ligatures ────────────────────────────────────────────────

const LIGATURES: &[(char, &str)] = &[
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
    ('\u{FB05}', "st"),
    ('\u{FB06}', "st"),
];

fn expand_ligatures(input: &str) -> String {
    if !input.chars().any(|c| ('\u{FB00}'..='\u{FB06}').contains(&c)) {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        match LIGATURES.iter().find(|(lig, _)| *lig == c) {
            Some((_, expanded)) => out.push_str(expanded),
            None => out.push(c),
        }
    }
    out
}

// ── Rule 5: Normalise exotic spaces ─────────────────────────────────────────

static RE_EXOTIC_SPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{00A0}\u{2000}-\u{200A}\u{202F}\u{205F}\u{3000}]").unwrap());

fn normalise_spaces(input: &str) -> String {
    RE_EXOTIC_SPACE.replace_all(input, " ").into_owned()
}

// ── Rule 6: Collapse horizontal whitespace ──────────────────────────────────

static RE_HSPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}|\t").unwrap());

fn collapse_horizontal_whitespace(input: &str) -> String {
    RE_HSPACE.replace_all(input, " ").into_owned()
}

// ── Rule 7: Trim every line ─────────────────────────────────────────────────

fn trim_lines(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 8: Blank lines ─────────────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").into_owned()
}

fn join_lines(input: &str) -> String {
    input
        .lines()
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ────────────────────────────────────────────────────────────────────
