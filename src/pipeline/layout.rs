//! Pagination of a report onto A4 pages.
//!
//! The layout is computed in pure Rust so it is deterministic and testable:
//! the PDF backend only draws the positioned [`TextRun`]s it is given. The
//! same pulldown-cmark event stream that drives the HTML renderer is reduced
//! here to a list of blocks (headings, paragraphs, list items, code lines,
//! table rows, rules), which are word-wrapped using average glyph widths of
//! the standard PDF fonts and flowed onto as many pages as needed.
//!
//! All coordinates are PDF points measured from the **top-left** corner of
//! the page; the backend flips them.
//!
//! | Element | Position |
//! |---------|----------|
//! | Title (18 pt bold) | 14 mm, 22 mm |
//! | Content column | x = 15 mm, first page from 35 mm, width 180 mm |
//! | Seal lines (8 pt) | x = 14 mm, last line at page height − 10 mm |

use crate::pipeline::render::Brightness;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

/// Points per millimetre.
pub const PT_PER_MM: f32 = 72.0 / 25.4;

const BODY_SIZE: f32 = 10.0;
const CODE_SIZE: f32 = 9.0;
const TABLE_SIZE: f32 = 9.5;
const TITLE_SIZE: f32 = 18.0;
const SEAL_SIZE: f32 = 8.0;
const LINE_SPACING: f32 = 1.4;
const LIST_INDENT: f32 = 12.0;
const SEAL_GRAY: u8 = 100;

fn mm(v: f32) -> f32 {
    v * PT_PER_MM
}

/// Page size and margins, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub content_x: f32,
    pub content_width: f32,
    /// Top of the content column on the first page (below the title).
    pub first_top: f32,
    /// Top of the content column on following pages.
    pub top: f32,
    /// Space kept free at the bottom of every page (the seal lives there).
    pub bottom: f32,
}

impl PageGeometry {
    pub fn a4() -> Self {
        Self {
            width: mm(210.0),
            height: mm(297.0),
            content_x: mm(15.0),
            content_width: mm(180.0),
            first_top: mm(35.0),
            top: mm(15.0),
            bottom: mm(20.0),
        }
    }
}

/// Standard PDF font used for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFace {
    Regular,
    Bold,
    Mono,
}

impl FontFace {
    /// Average glyph advance as a fraction of the font size.
    fn average_advance(self) -> f32 {
        match self {
            FontFace::Regular => 0.5,
            FontFace::Bold => 0.55,
            FontFace::Mono => 0.6,
        }
    }
}

/// A single line of text at a fixed position.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f32,
    /// Baseline, measured from the top of the page.
    pub baseline: f32,
    pub size: f32,
    pub face: FontFace,
    /// Grey level of the fill colour (0 = black).
    pub gray: u8,
    pub text: String,
}

/// Decoded logo and where it goes on the first page.
#[derive(Debug, Clone, PartialEq)]
pub struct LogoImage {
    pub png: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
}

/// Logo position on the first page (top-left origin, points).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogoPlacement {
    pub x: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaidOutPage {
    pub runs: Vec<TextRun>,
}

/// The unsealed document, ready to be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLayout {
    pub geometry: PageGeometry,
    pub pages: Vec<LaidOutPage>,
    pub logo: Option<(LogoImage, LogoPlacement)>,
}

/// How the report text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentMode {
    Markdown,
    /// Literal text, one paragraph line per source line.
    Plain,
}

impl ReportLayout {
    /// Lay out the title and report onto A4 pages.
    pub fn build(
        title: &str,
        report: &str,
        mode: ContentMode,
        brightness: Brightness,
        logo: Option<LogoImage>,
    ) -> Self {
        let geometry = PageGeometry::a4();
        let blocks = match mode {
            ContentMode::Markdown => markdown_blocks(report),
            ContentMode::Plain => plain_blocks(report),
        };

        let mut flow = Flow::new(geometry);
        flow.current().runs.push(TextRun {
            x: mm(14.0),
            baseline: mm(22.0),
            size: TITLE_SIZE,
            face: FontFace::Bold,
            gray: 0,
            text: title.to_string(),
        });

        let gray = brightness.gray_level();
        for block in &blocks {
            flow.place(block, gray);
        }

        let logo = logo.map(|image| {
            let placement = logo_placement(&geometry, &image);
            (image, placement)
        });

        ReportLayout {
            geometry,
            pages: flow.pages,
            logo,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// All text of the layout, one run per line, in drawing order.
    pub fn plain_text(&self) -> String {
        self.pages
            .iter()
            .flat_map(|p| p.runs.iter())
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs for the seal stamp: `lines` stacked upwards from page height − 10 mm.
pub fn seal_runs(geometry: &PageGeometry, lines: &[String]) -> Vec<TextRun> {
    let step = SEAL_SIZE * 1.15;
    let last = geometry.height - mm(10.0);
    let count = lines.len();
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| TextRun {
            x: mm(14.0),
            baseline: last - step * (count - 1 - i) as f32,
            size: SEAL_SIZE,
            face: FontFace::Regular,
            gray: SEAL_GRAY,
            text: line.clone(),
        })
        .collect()
}

fn logo_placement(geometry: &PageGeometry, image: &LogoImage) -> LogoPlacement {
    let max_w = mm(30.0);
    let max_h = mm(15.0);
    let ratio = image.height_px.max(1) as f32 / image.width_px.max(1) as f32;
    let (width, height) = if max_w * ratio <= max_h {
        (max_w, max_w * ratio)
    } else {
        (max_h / ratio, max_h)
    };
    LogoPlacement {
        x: geometry.width - mm(15.0) - width,
        top: mm(10.0),
        width,
        height,
    }
}

// ── Blocks ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum BlockKind {
    Heading(u8),
    Paragraph,
    ListItem { depth: usize, marker: String },
    Code,
    TableRow,
    Rule,
}

#[derive(Debug, Clone, PartialEq)]
struct Block {
    kind: BlockKind,
    text: String,
}

impl BlockKind {
    fn style(&self) -> (FontFace, f32, f32) {
        // (face, size, space before)
        match self {
            BlockKind::Heading(1) => (FontFace::Bold, 16.0, 10.0),
            BlockKind::Heading(2) => (FontFace::Bold, 14.0, 9.0),
            BlockKind::Heading(3) => (FontFace::Bold, 12.0, 8.0),
            BlockKind::Heading(_) => (FontFace::Bold, 11.0, 6.0),
            BlockKind::Paragraph => (FontFace::Regular, BODY_SIZE, 5.0),
            BlockKind::ListItem { .. } => (FontFace::Regular, BODY_SIZE, 2.0),
            BlockKind::Code => (FontFace::Mono, CODE_SIZE, 0.0),
            BlockKind::TableRow => (FontFace::Regular, TABLE_SIZE, 1.0),
            BlockKind::Rule => (FontFace::Regular, BODY_SIZE, 5.0),
        }
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[derive(Default)]
struct BlockCollector {
    blocks: Vec<Block>,
    current: Option<Block>,
    /// Next ordinal per open list; `None` for bullet lists.
    lists: Vec<Option<u64>>,
}

impl BlockCollector {
    fn flush(&mut self) {
        if let Some(block) = self.current.take() {
            if !block.text.trim().is_empty() || block.kind == BlockKind::Rule {
                self.blocks.push(block);
            }
        }
    }

    fn start(&mut self, kind: BlockKind) {
        self.flush();
        self.current = Some(Block {
            kind,
            text: String::new(),
        });
    }

    fn push_text(&mut self, text: &str) {
        match self.current.as_mut() {
            Some(block) => block.text.push_str(text),
            None => {
                self.current = Some(Block {
                    kind: BlockKind::Paragraph,
                    text: text.to_string(),
                })
            }
        }
    }

    fn start_item(&mut self) {
        let depth = self.lists.len().saturating_sub(1);
        let marker = match self.lists.last_mut() {
            Some(Some(n)) => {
                let m = format!("{n}.");
                *n += 1;
                m
            }
            _ => "•".to_string(),
        };
        self.start(BlockKind::ListItem { depth, marker });
    }

    fn start_paragraph(&mut self) {
        // Loose list items wrap their text in a paragraph; keep it in the item.
        let in_fresh_item = matches!(
            &self.current,
            Some(Block { kind: BlockKind::ListItem { .. }, text }) if text.is_empty()
        );
        if !in_fresh_item {
            self.start(BlockKind::Paragraph);
        }
    }
}

fn markdown_blocks(markdown: &str) -> Vec<Block> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);

    let mut c = BlockCollector::default();
    let mut in_code = false;

    for event in Parser::new_ext(markdown, options) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                c.start(BlockKind::Heading(heading_level(level)))
            }
            Event::Start(Tag::Paragraph) => c.start_paragraph(),
            Event::Start(Tag::List(first)) => {
                c.flush();
                c.lists.push(first);
            }
            Event::End(TagEnd::List(_)) => {
                c.flush();
                c.lists.pop();
            }
            Event::Start(Tag::Item) => c.start_item(),
            Event::Start(Tag::CodeBlock(kind)) => {
                c.flush();
                in_code = true;
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        c.blocks.push(Block {
                            kind: BlockKind::Code,
                            text: format!("[{lang}]"),
                        });
                    }
                }
            }
            Event::End(TagEnd::CodeBlock) => in_code = false,
            Event::Start(Tag::TableHead) | Event::Start(Tag::TableRow) => {
                c.start(BlockKind::TableRow)
            }
            Event::Start(Tag::TableCell) => {
                if let Some(block) = c.current.as_mut() {
                    if !block.text.is_empty() {
                        block.text.push_str(" | ");
                    }
                }
            }
            Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Item)
            | Event::End(TagEnd::TableHead)
            | Event::End(TagEnd::TableRow) => c.flush(),
            Event::Text(text) if in_code => {
                for line in text.lines() {
                    c.blocks.push(Block {
                        kind: BlockKind::Code,
                        text: if line.is_empty() { " ".into() } else { line.to_string() },
                    });
                }
            }
            Event::Text(text) | Event::Code(text) | Event::Html(text) | Event::InlineHtml(text) => {
                c.push_text(&text)
            }
            Event::SoftBreak | Event::HardBreak => c.push_text("\n"),
            Event::TaskListMarker(done) => c.push_text(if done { "[x] " } else { "[ ] " }),
            Event::FootnoteReference(label) => c.push_text(&format!("[{label}]")),
            Event::Rule => {
                c.flush();
                c.blocks.push(Block {
                    kind: BlockKind::Rule,
                    text: "-".repeat(60),
                });
            }
            _ => {}
        }
    }
    c.flush();
    c.blocks
}

fn plain_blocks(text: &str) -> Vec<Block> {
    text.lines()
        .map(|line| Block {
            kind: BlockKind::Paragraph,
            text: if line.trim().is_empty() { " ".into() } else { line.to_string() },
        })
        .collect()
}

// ── Wrapping and flow ────────────────────────────────────────────────────

/// Greedy word wrap on an estimated character budget; `\n` forces a break.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    for hard_line in text.split('\n') {
        let mut line = String::new();
        let mut len = 0usize;
        for word in hard_line.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if len > 0 {
                    lines.push(std::mem::take(&mut line));
                    len = 0;
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            if word.is_empty() {
                continue;
            }
            let needed = if len == 0 { word.len() } else { len + 1 + word.len() };
            if needed > max_chars {
                lines.push(std::mem::take(&mut line));
                len = 0;
            }
            if len > 0 {
                line.push(' ');
                len += 1;
            }
            line.extend(word.iter());
            len += word.len();
        }
        lines.push(line);
    }
    lines
}

struct Flow {
    geometry: PageGeometry,
    pages: Vec<LaidOutPage>,
    /// Top of the next line, from the top of the current page.
    cursor: f32,
}

impl Flow {
    fn new(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            pages: vec![LaidOutPage::default()],
            cursor: geometry.first_top,
        }
    }

    fn current(&mut self) -> &mut LaidOutPage {
        if self.pages.is_empty() {
            self.pages.push(LaidOutPage::default());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn limit(&self) -> f32 {
        self.geometry.height - self.geometry.bottom
    }

    fn place(&mut self, block: &Block, gray: u8) {
        let (face, size, space_before) = block.kind.style();
        let line_height = size * LINE_SPACING;

        let (x, prefix_width, first_prefix) = match &block.kind {
            BlockKind::ListItem { depth, marker } => {
                let indent = LIST_INDENT * (*depth as f32 + 1.0);
                (self.geometry.content_x + indent, LIST_INDENT, Some(marker.clone()))
            }
            _ => (self.geometry.content_x, 0.0, None),
        };
        let width = self.geometry.content_width - (x - self.geometry.content_x);
        let max_chars = (width / (size * face.average_advance())).floor() as usize;

        if self.cursor > self.geometry.top {
            self.cursor += space_before;
        }

        for (i, line) in wrap(&block.text, max_chars).into_iter().enumerate() {
            if self.cursor + line_height > self.limit() {
                self.pages.push(LaidOutPage::default());
                self.cursor = self.geometry.top;
            }
            let baseline = self.cursor + size;
            if i == 0 {
                if let Some(marker) = &first_prefix {
                    self.current().runs.push(TextRun {
                        x: x - prefix_width,
                        baseline,
                        size,
                        face,
                        gray,
                        text: marker.clone(),
                    });
                }
            }
            if !line.is_empty() {
                self.current().runs.push(TextRun {
                    x,
                    baseline,
                    size,
                    face,
                    gray,
                    text: line,
                });
            }
            self.cursor += line_height;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(md: &str) -> ReportLayout {
        ReportLayout::build(
            "Verum Omnis - Forensic Report",
            md,
            ContentMode::Markdown,
            Brightness::default(),
            None,
        )
    }

    #[test]
    fn title_sits_on_first_page_in_black() {
        let layout = build("Hello");
        let title = &layout.pages[0].runs[0];
        assert_eq!(title.text, "Verum Omnis - Forensic Report");
        assert_eq!(title.face, FontFace::Bold);
        assert_eq!(title.gray, 0);
        assert!((title.x - mm(14.0)).abs() < 0.01);
    }

    #[test]
    fn content_uses_brightness_gray() {
        let layout = ReportLayout::build("T", "body", ContentMode::Markdown, Brightness::new(40), None);
        let body = &layout.pages[0].runs[1];
        assert_eq!(body.text, "body");
        assert_eq!(body.gray, Brightness::new(40).gray_level());
        assert!(body.baseline > mm(35.0));
    }

    #[test]
    fn blocks_cover_common_markdown() {
        let blocks = markdown_blocks(
            "# Summary\n\nPara one\nstill para\n\n- a\n- b\n\n1. first\n2. second\n\n```\nlet x = 1;\n```\n\n| h1 | h2 |\n|----|----|\n| c1 | c2 |\n\n---\n",
        );
        let kinds: Vec<_> = blocks.iter().map(|b| b.kind.clone()).collect();
        assert_eq!(kinds[0], BlockKind::Heading(1));
        assert_eq!(blocks[1].text, "Para one\nstill para");
        assert_eq!(
            kinds[2],
            BlockKind::ListItem {
                depth: 0,
                marker: "•".into()
            }
        );
        assert_eq!(
            kinds[5],
            BlockKind::ListItem {
                depth: 0,
                marker: "2.".into()
            }
        );
        assert_eq!(blocks[6].text, "let x = 1;");
        assert_eq!(blocks[7].text, "h1 | h2");
        assert_eq!(blocks[8].text, "c1 | c2");
        assert_eq!(kinds[9], BlockKind::Rule);
    }

    #[test]
    fn nested_list_items_are_indented() {
        let blocks = markdown_blocks("- outer\n  - inner\n");
        assert_eq!(
            blocks[1].kind,
            BlockKind::ListItem {
                depth: 1,
                marker: "•".into()
            }
        );
    }

    #[test]
    fn wrap_respects_budget_and_hard_breaks() {
        let lines = wrap("aaa bbb ccc\nddd", 7);
        assert_eq!(lines, vec!["aaa bbb", "ccc", "ddd"]);
        let lines = wrap("abcdefghij", 4);
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn long_reports_flow_onto_more_pages() {
        let md = (0..400)
            .map(|i| format!("Paragraph number {i} of the timeline."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let layout = build(&md);
        assert!(layout.page_count() > 3);
        let limit = layout.geometry.height - layout.geometry.bottom;
        for page in &layout.pages {
            for run in &page.runs {
                assert!(run.baseline <= limit, "run below bottom margin: {run:?}");
            }
        }
        assert!(layout.plain_text().contains("Paragraph number 399"));
    }

    #[test]
    fn plain_mode_keeps_markup_literal() {
        let layout = ReportLayout::build("T", "**bold**\n# not a heading", ContentMode::Plain, Brightness::default(), None);
        let texts: Vec<_> = layout.pages[0].runs.iter().map(|r| r.text.clone()).collect();
        assert_eq!(texts, vec!["T", "**bold**", "# not a heading"]);
    }

    #[test]
    fn seal_lines_end_ten_mm_above_bottom() {
        let g = PageGeometry::a4();
        let runs = seal_runs(&g, &["one".into(), "two".into()]);
        assert_eq!(runs.len(), 2);
        assert!((runs[1].baseline - (g.height - mm(10.0))).abs() < 0.01);
        assert!(runs[0].baseline < runs[1].baseline);
        assert!(runs.iter().all(|r| r.size == 8.0 && r.gray == 100));
    }

    #[test]
    fn logo_keeps_aspect_ratio() {
        let g = PageGeometry::a4();
        let p = logo_placement(
            &g,
            &LogoImage {
                png: vec![],
                width_px: 200,
                height_px: 100,
            },
        );
        assert!((p.width / p.height - 2.0).abs() < 0.01);
        assert!(p.x + p.width <= g.width);
    }
}
