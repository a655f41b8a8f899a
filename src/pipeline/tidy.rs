//! Deterministic clean-up of the Markdown returned by the model.
//!
//! The report is rendered and sealed as-is afterwards, so only changes that
//! never alter wording are applied here:
//!
//! 1. Strip an outer ```` ```markdown ```` fence wrapping the whole answer
//! 2. Normalise line endings (CRLF / CR → LF)
//! 3. Trim trailing whitespace per line, except Markdown hard breaks
//! 4. Collapse runs of 3+ blank lines down to 2
//! 5. Strip a leading BOM and zero-width spaces
//! 6. End with exactly one newline

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every rule, in order.
pub fn tidy_report(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_outer_fence(&s);
    let s = trim_line_ends(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)[ \t]*\n(.*)\n```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) if !caps[1].contains("\n```") => caps[1].to_string(),
        _ => input.to_string(),
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_line_ends(input: &str) -> String {
    input
        .lines()
        .map(|line| {
            let trimmed = line.trim_end();
            // Two trailing spaces are a hard line break in Markdown.
            if line.ends_with("  ") && !trimmed.is_empty() {
                format!("{trimmed}  ")
            } else {
                trimmed.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n\n").into_owned()
}

fn remove_invisible_chars(input: &str) -> String {
    // Joiners stay: emoji sequences depend on them.
    input
        .strip_prefix('\u{FEFF}')
        .unwrap_or(input)
        .replace('\u{200B}', "")
}

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{trimmed}\n")
    }
}
