use crate::chunking::normalize_whitespace;
use scraper::{ElementRef, Html, Node};

const SKIPPED_TAGS: [&str; 3] = ["script", "style", "noscript"];

const BLOCK_TAGS: [&str; 34] = [
    "address", "article", "aside", "blockquote", "body", "br", "caption", "dd", "details", "div",
    "dl", "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5",
    "h6", "head", "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "ul",
];

/// Converts an HTML document into plain text.
///
/// Scripts, styles and `noscript` blocks are dropped, tables become one
/// `cell | cell` line per row, and every block element starts a new line.
/// Blank lines are removed, so runs of newlines collapse to one.
pub fn html_to_text(markup: &str) -> String {
    let document = Html::parse_document(markup);
    let mut writer = LineWriter::default();
    walk(document.root_element(), &mut writer);

    let text = writer.finish();
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Default)]
struct LineWriter {
    lines: Vec<String>,
    current: String,
}

impl LineWriter {
    fn push_text(&mut self, text: &str) {
        self.current.push_str(text);
    }

    fn break_line(&mut self) {
        let line = self.current.trim();
        if !line.is_empty() {
            self.lines.push(line.to_string());
        }
        self.current.clear();
    }

    fn push_block(&mut self, block: &str) {
        self.break_line();
        self.current.push_str(block);
        self.break_line();
    }

    fn finish(mut self) -> String {
        self.break_line();
        self.lines.join("\n")
    }
}

fn walk(element: ElementRef<'_>, writer: &mut LineWriter) {
    let name = element.value().name();
    if SKIPPED_TAGS.contains(&name) {
        return;
    }
    if name == "table" {
        writer.push_block(&linearize_table(element));
        return;
    }

    let is_block = BLOCK_TAGS.contains(&name);
    if is_block {
        writer.break_line();
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => writer.push_text(text),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    walk(child_element, writer);
                }
            }
            _ => {}
        }
    }

    if is_block {
        writer.break_line();
    }
}

fn linearize_table(table: ElementRef<'_>) -> String {
    let mut rows = Vec::new();
    for row in descendant_elements(table, &["tr"]) {
        let cells = descendant_elements(row, &["th", "td"])
            .into_iter()
            .map(visible_text)
            .collect::<Vec<_>>();
        if !cells.is_empty() {
            rows.push(cells.join(" | "));
        }
    }

    let mut block = rows.join("\n");
    block.push('\n');
    block
}

fn descendant_elements<'a>(root: ElementRef<'a>, names: &[&str]) -> Vec<ElementRef<'a>> {
    root.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .filter(|element| names.contains(&element.value().name()))
        .collect()
}

fn visible_text(element: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    collect_visible(element, &mut parts);
    normalize_whitespace(&parts.join(" "))
}

fn collect_visible(element: ElementRef<'_>, parts: &mut Vec<String>) {
    if SKIPPED_TAGS.contains(&element.value().name()) {
        return;
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => parts.push(text.trim().to_string()),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_visible(child_element, parts);
                }
            }
            _ => {}
        }
    }
}
