use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use scraper::Html;

use super::{ConvertedDocument, html, DocElement, DocumentProperties, ElementLabel, InputFormat};

pub(super) fn convert(input: &str) -> ConvertedDocument {
    let options = Options::ENABLE_TABLES | Options::ENABLE_FOOTNOTES | Options::ENABLE_STRIKETHROUGH;
    let mut collector = ElementCollector::default();
    for event in Parser::new_ext(input, options) {
        collector.push_event(event);
    }
    let elements = collector.finish();

    let properties = DocumentProperties {
        title: elements
            .iter()
            .find(|e| e.label == ElementLabel::Title)
            .map(|e| e.text.clone()),
        ..DocumentProperties::default()
    };
    ConvertedDocument::from_elements(InputFormat::Markdown, properties, elements)
}

#[derive(Default)]
struct ElementCollector {
    elements: Vec<DocElement>,
    current: Option<(ElementLabel, String)>,
    item_depth: usize,
    footnote_depth: usize,
    in_code_block: bool,
    image_alt: Option<String>,
    table: Option<Vec<Vec<String>>>,
    row: Vec<String>,
    cell: String,
    html_block: Option<String>,
}

impl ElementCollector {
    fn push_event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                let label = if level == HeadingLevel::H1 {
                    ElementLabel::Title
                } else {
                    ElementLabel::SectionHeader
                };
                self.begin(label);
            }
            Event::Start(Tag::Paragraph) => {
                if self.item_depth > 0 {
                    self.push_str(" ");
                } else if self.footnote_depth > 0 {
                    self.begin(ElementLabel::Footnote);
                } else {
                    self.begin(ElementLabel::Paragraph);
                }
            }
            Event::Start(Tag::Item) => {
                self.flush();
                self.item_depth += 1;
                self.begin(ElementLabel::ListItem);
            }
            Event::Start(Tag::CodeBlock(_)) => {
                self.in_code_block = true;
                self.begin(ElementLabel::Code);
            }
            Event::Start(Tag::FootnoteDefinition(_)) => self.footnote_depth += 1,
            Event::Start(Tag::Image { .. }) => self.image_alt = Some(String::new()),
            Event::Start(Tag::Table(_)) => self.table = Some(Vec::new()),
            Event::Start(Tag::TableHead | Tag::TableRow) => self.row.clear(),
            Event::Start(Tag::TableCell) => self.cell.clear(),
            Event::Start(Tag::HtmlBlock) => {
                self.flush();
                self.html_block = Some(String::new());
            }

            Event::End(TagEnd::Heading(_)) => self.flush(),
            Event::End(TagEnd::Paragraph) => {
                if self.item_depth == 0 {
                    self.flush();
                }
            }
            Event::End(TagEnd::Item) => {
                self.flush();
                self.item_depth = self.item_depth.saturating_sub(1);
                self.reopen_item();
            }
            Event::End(TagEnd::CodeBlock) => {
                self.in_code_block = false;
                self.flush();
                self.reopen_item();
            }
            Event::End(TagEnd::FootnoteDefinition) => {
                self.footnote_depth = self.footnote_depth.saturating_sub(1);
            }
            Event::End(TagEnd::Image) => {
                if let Some(alt) = self.image_alt.take() {
                    let alt = alt.trim();
                    if !alt.is_empty() {
                        self.elements.push(DocElement::new(ElementLabel::Image, alt));
                    }
                }
            }
            Event::End(TagEnd::TableCell) => {
                let cell = self.cell.trim().to_owned();
                self.row.push(cell);
            }
            Event::End(TagEnd::TableHead | TagEnd::TableRow) => {
                let row = std::mem::take(&mut self.row);
                if let Some(rows) = self.table.as_mut() {
                    rows.push(row);
                }
            }
            Event::End(TagEnd::HtmlBlock) => {
                if let Some(markup) = self.html_block.take() {
                    self.raw_html(&markup);
                }
                self.reopen_item();
            }
            Event::End(TagEnd::Table) => {
                if let Some(rows) = self.table.take() {
                    let text = rows
                        .iter()
                        .filter(|row| row.iter().any(|c| !c.is_empty()))
                        .map(|row| row.join(" | "))
                        .collect::<Vec<_>>()
                        .join("\n");
                    if !text.is_empty() {
                        self.elements.push(DocElement::new(ElementLabel::Table, text));
                    }
                }
            }

            Event::Text(text) | Event::Code(text) => self.push_str(&text),
            Event::InlineMath(text) | Event::DisplayMath(text) => self.push_str(&text),
            Event::SoftBreak => {
                let sep = if self.in_code_block { "\n" } else { " " };
                self.push_str(sep);
            }
            Event::HardBreak => self.push_str("\n"),
            Event::Html(markup) => match self.html_block.as_mut() {
                Some(buf) => buf.push_str(&markup),
                None => self.raw_html(&markup),
            },
            // Inline tags carry no text of their own; their content arrives as `Text`.
            Event::InlineHtml(_) => {}
            _ => {}
        }
    }

    fn begin(&mut self, label: ElementLabel) {
        self.flush();
        self.current = Some((label, String::new()));
    }

    /// Continue a list item whose nested list, code block or HTML block just
    /// closed, so the item's remaining paragraphs are not lost.
    fn reopen_item(&mut self) {
        if self.item_depth > 0 && self.current.is_none() {
            self.current = Some((ElementLabel::ListItem, String::new()));
        }
    }

    /// Raw HTML goes through the HTML walker; tags are dropped, text is kept.
    fn raw_html(&mut self, markup: &str) {
        let fragment = Html::parse_fragment(markup);
        let mut elements = Vec::new();
        match html::walk_document(&fragment, None, &mut elements) {
            Ok(()) => self.elements.extend(elements),
            Err(e) => {
                tracing::debug!("html block walk failed, keeping its text: {e}");
                let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
                let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if !text.is_empty() {
                    self.elements.push(DocElement::new(ElementLabel::Paragraph, text));
                }
            }
        }
    }

    fn push_str(&mut self, text: &str) {
        if let Some(alt) = self.image_alt.as_mut() {
            alt.push_str(text);
        } else if self.table.is_some() {
            self.cell.push_str(text);
        } else if let Some((_, buf)) = self.current.as_mut() {
            buf.push_str(text);
        }
    }

    fn flush(&mut self) {
        if let Some((label, text)) = self.current.take() {
            let text = if label == ElementLabel::Code {
                text.trim_end_matches('\n').to_owned()
            } else {
                text.trim().to_owned()
            };
            if !text.is_empty() {
                self.elements.push(DocElement::new(label, text));
            }
        }
    }

    fn finish(mut self) -> Vec<DocElement> {
        self.flush();
        self.elements
    }
}
