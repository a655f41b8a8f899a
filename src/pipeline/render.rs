//! Report rendering: Markdown → HTML for display and export.
//!
//! The Markdown converter is an injected capability ([`MarkdownRenderer`]).
//! When none is supplied, [`render_report`] degrades to escaping the text and
//! turning newlines into `<br />`; that path cannot fail.
//!
//! Raw HTML inside the model's answer is escaped rather than passed through,
//! so the output is safe to embed directly.

use pulldown_cmark::{html, Event, Options, Parser};
use serde::{Deserialize, Serialize};

/// Lowest accepted brightness setting.
pub const MIN_BRIGHTNESS: u8 = 40;
/// Highest accepted brightness setting.
pub const MAX_BRIGHTNESS: u8 = 100;
/// Lightness (in percent) per brightness step: 100 → 82 %, 40 → 32.8 %.
pub const LIGHTNESS_FACTOR: f64 = 0.82;

/// User-chosen text brightness in `[40, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8")]
pub struct Brightness(u8);

impl From<u8> for Brightness {
    fn from(value: u8) -> Self {
        Brightness::new(value)
    }
}

impl Default for Brightness {
    fn default() -> Self {
        Brightness(MAX_BRIGHTNESS)
    }
}

impl Brightness {
    /// Clamp into the accepted range.
    pub fn new(value: u8) -> Self {
        Brightness(value.clamp(MIN_BRIGHTNESS, MAX_BRIGHTNESS))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// HSL lightness in percent, `brightness × 0.82`.
    pub fn lightness(self) -> f64 {
        // Integer hundredths keep the mapping exact (e.g. 40 → 32.8).
        f64::from(u32::from(self.0) * 82) / 100.0
    }

    /// CSS colour string, `hsl(0, 0%, L%)`.
    pub fn css_color(self) -> String {
        format!("hsl(0, 0%, {}%)", self.lightness())
    }

    /// The same grey as an 8-bit channel value (saturation is zero, so r = g = b).
    pub fn gray_level(self) -> u8 {
        let hundredths = u32::from(self.0) * 82;
        ((hundredths * 255 + 5_000) / 10_000) as u8
    }
}

/// Markdown → HTML capability.
pub trait MarkdownRenderer {
    fn render(&self, markdown: &str) -> String;
}

/// GitHub-flavoured renderer backed by pulldown-cmark.
///
/// Single newlines become `<br />` (the report reads like a letter, not
/// like reflowed prose) and raw HTML is escaped.
#[derive(Debug, Clone, Copy, Default)]
pub struct CmarkRenderer;

impl MarkdownRenderer for CmarkRenderer {
    fn render(&self, markdown: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_FOOTNOTES);

        let events = Parser::new_ext(markdown, options).map(|event| match event {
            Event::SoftBreak => Event::HardBreak,
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            other => other,
        });

        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut out, events);
        out
    }
}

/// Render a report, falling back to plain line breaks without a renderer.
pub fn render_report(renderer: Option<&dyn MarkdownRenderer>, markdown: &str) -> String {
    match renderer {
        Some(r) => r.render(markdown),
        None => plain_html(markdown),
    }
}

/// Escape text and turn each newline into `<br />`; no Markdown interpretation.
pub fn plain_html(text: &str) -> String {
    escape_html(text).replace('\n', "<br />")
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing into a String never fails.
    let _ = pulldown_cmark_escape::escape_html(&mut out, text);
    out
}

/// Detached copy of the rendered report with the brightness colour applied.
pub fn styled_html(body_html: &str, brightness: Brightness) -> String {
    format!(
        "<div class=\"result-content\" style=\"color: {}; line-height: 1.6;\">\n{}</div>\n",
        brightness.css_color(),
        body_html
    )
}

/// A self-contained HTML page for the report.
pub fn standalone_html(
    title: &str,
    body_html: &str,
    brightness: Brightness,
    logo_data_url: Option<&str>,
) -> String {
    let logo = logo_data_url
        .map(|src| format!("<img class=\"company-logo\" src=\"{src}\" alt=\"Company Logo\" />\n"))
        .unwrap_or_default();
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\" />\n\
<title>{title}</title>\n\
<style>body {{ background: #121212; font-family: sans-serif; max-width: 860px; margin: 2rem auto; padding: 0 1rem; }}\n\
h1 {{ color: #e0e0e0; }} .company-logo {{ max-height: 64px; }}\n\
table {{ border-collapse: collapse; }} td, th {{ border: 1px solid #333; padding: 4px 8px; }}</style>\n\
</head>\n<body>\n{logo}<h1>{title}</h1>\n{content}</body>\n</html>\n",
        title = escape_html(title),
        logo = logo,
        content = styled_html(body_html, brightness),
    )
}
