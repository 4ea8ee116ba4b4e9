use scraper::{ElementRef, Html, Node};

use crate::error::{ScrapeError, ScrapeResult};
use crate::fetch::PageFetcher;
use crate::formats::{Inline, Style, TextFragment};
use crate::layout::{SiteLayout, parse_selector};

const NBSP: char = '\u{a0}';

pub fn normalize_chapter(
    fetcher: &dyn PageFetcher,
    chapter_url: &str,
    layout: &SiteLayout,
) -> ScrapeResult<Vec<TextFragment>> {
    let doc = fetcher.fetch_document(chapter_url)?;
    normalize_document(&doc, chapter_url, layout)
}

pub fn normalize_document(
    doc: &Html,
    chapter_url: &str,
    layout: &SiteLayout,
) -> ScrapeResult<Vec<TextFragment>> {
    let container = find_content_container(doc, layout)?.ok_or_else(|| {
        ScrapeError::ContainerNotFound {
            url: chapter_url.to_owned(),
        }
    })?;
    Ok(normalize_children(container))
}

fn find_content_container<'a>(
    doc: &'a Html,
    layout: &SiteLayout,
) -> ScrapeResult<Option<ElementRef<'a>>> {
    for selector in [&layout.content_primary, &layout.content_fallback] {
        let selector = parse_selector(selector)?;
        if let Some(container) = doc.select(&selector).next() {
            return Ok(Some(container));
        }
    }
    Ok(None)
}

/// Reduces the children of `element` to non-empty fragments in document
/// order. Wrapper elements are flattened, so flat and nested paragraph
/// layouts produce the same output.
pub fn normalize_children(element: ElementRef<'_>) -> Vec<TextFragment> {
    let mut fragments = Vec::new();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => fragments.extend(text_fragment(text)),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    fragments.extend(normalize_element(child));
                }
            }
            _ => {}
        }
    }
    fragments
}

fn normalize_element(element: ElementRef<'_>) -> Vec<TextFragment> {
    let tag = element.value().name();
    if is_noise(tag) {
        return Vec::new();
    }
    if is_paragraph_like(tag) || is_underlined_span(element) {
        return paragraph_fragment(element).into_iter().collect();
    }
    normalize_children(element)
}

fn text_fragment(text: &str) -> Option<TextFragment> {
    let mut builder = FragmentBuilder::default();
    builder.push_text(text);
    builder.finish()
}

fn paragraph_fragment(element: ElementRef<'_>) -> Option<TextFragment> {
    let mut builder = FragmentBuilder::default();
    serialize_element(&mut builder, element);
    builder.finish()
}

fn serialize_children(builder: &mut FragmentBuilder, element: ElementRef<'_>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => builder.push_text(text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    serialize_element(builder, child);
                }
            }
            _ => {}
        }
    }
}

fn serialize_element(builder: &mut FragmentBuilder, element: ElementRef<'_>) {
    let tag = element.value().name();
    if is_noise(tag) {
        return;
    }
    if tag == "br" {
        builder.push_text(" ");
        return;
    }

    match inline_style(element) {
        Some(style) => {
            builder.open(style);
            serialize_children(builder, element);
            builder.close(style);
        }
        None => serialize_children(builder, element),
    }
}

fn is_noise(tag: &str) -> bool {
    matches!(tag, "script" | "style" | "noscript")
}

fn is_paragraph_like(tag: &str) -> bool {
    matches!(tag, "p" | "em" | "i" | "strong" | "b" | "u")
}

/// A styled `span` is an inline run like `u`; styled block wrappers are
/// still walked so their paragraphs stay separate.
fn is_underlined_span(element: ElementRef<'_>) -> bool {
    element.value().name() == "span" && inline_style(element) == Some(Style::Underline)
}

fn inline_style(element: ElementRef<'_>) -> Option<Style> {
    match element.value().name() {
        "em" | "i" => Some(Style::Emphasis),
        "strong" | "b" => Some(Style::Strong),
        "u" => Some(Style::Underline),
        _ if element
            .value()
            .attr("style")
            .is_some_and(declares_underline) =>
        {
            Some(Style::Underline)
        }
        _ => None,
    }
}

fn declares_underline(style: &str) -> bool {
    style.split(';').any(|declaration| {
        let Some((property, value)) = declaration.split_once(':') else {
            return false;
        };
        let property = property.trim().to_ascii_lowercase();
        (property == "text-decoration" || property == "text-decoration-line")
            && value
                .split_whitespace()
                .any(|token| token.eq_ignore_ascii_case("underline"))
    })
}

#[derive(Debug, Default)]
struct FragmentBuilder {
    content: Vec<Inline>,
}

impl FragmentBuilder {
    fn push_text(&mut self, text: &str) {
        let cleaned = collapse_whitespace(text);
        if cleaned.is_empty() {
            return;
        }
        if let Some(Inline::Text(last)) = self.content.last_mut() {
            if last.ends_with(' ') && cleaned.starts_with(' ') {
                last.push_str(&cleaned[1..]);
            } else {
                last.push_str(&cleaned);
            }
        } else {
            self.content.push(Inline::Text(cleaned));
        }
    }

    fn open(&mut self, style: Style) {
        self.content.push(Inline::Open(style));
    }

    fn close(&mut self, style: Style) {
        if self.content.last() == Some(&Inline::Open(style)) {
            self.content.pop();
        } else {
            self.content.push(Inline::Close(style));
        }
    }

    fn finish(mut self) -> Option<TextFragment> {
        trim_edges(&mut self.content);
        let fragment = TextFragment {
            content: compact(self.content),
        };
        (!fragment.is_empty()).then_some(fragment)
    }
}

/// Drops non-breaking spaces and folds whitespace runs into one space.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch == NBSP {
            continue;
        }
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }
    if pending_space {
        out.push(' ');
    }
    out
}

fn trim_edges(content: &mut [Inline]) {
    for inline in content.iter_mut() {
        if let Inline::Text(text) = inline {
            *text = text.trim_start().to_owned();
            if !text.is_empty() {
                break;
            }
        }
    }
    for inline in content.iter_mut().rev() {
        if let Inline::Text(text) = inline {
            *text = text.trim_end().to_owned();
            if !text.is_empty() {
                break;
            }
        }
    }
}

/// Removes empty text runs and marker pairs that enclose nothing.
fn compact(content: Vec<Inline>) -> Vec<Inline> {
    let mut out: Vec<Inline> = Vec::with_capacity(content.len());
    for inline in content {
        match inline {
            Inline::Text(text) if text.is_empty() => {}
            Inline::Close(style) if out.last() == Some(&Inline::Open(style)) => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StaticFetcher;

    const URL: &str = "https://site/s/1/1/T";

    fn normalize_html(body: &str) -> Vec<TextFragment> {
        let html = format!("<html><body>{body}</body></html>");
        let doc = Html::parse_document(&html);
        normalize_document(&doc, URL, &SiteLayout::default()).expect("normalize")
    }

    fn plain(fragments: &[TextFragment]) -> Vec<String> {
        fragments.iter().map(TextFragment::plain_text).collect()
    }

    #[test]
    fn flat_and_nested_paragraphs_normalize_identically() {
        let flat = normalize_html(
            r#"<div id="storytext"><p>One.</p><p>Two <em>two</em>.</p><p>Three.</p></div>"#,
        );
        let nested = normalize_html(
            r#"<div id="storytext"><div class="wrap"><p>One.</p><div><p>Two <em>two</em>.</p></div></div><p>Three.</p></div>"#,
        );
        assert_eq!(flat, nested);
        assert_eq!(plain(&flat), vec!["One.", "Two two.", "Three."]);
    }

    #[test]
    fn empty_paragraph_shell_is_dropped() {
        let fragments = normalize_html(
            "<div id=\"storytext\"><p>First</p><p>\u{a0}</p><p> <br/> </p><p>Second</p></div>",
        );
        assert_eq!(plain(&fragments), vec!["First", "Second"]);
    }

    #[test]
    fn normalizing_twice_is_idempotent() {
        let html = r#"<html><body><div id="storytext"><p>A <strong>b</strong></p>tail</div></body></html>"#;
        let doc = Html::parse_document(html);
        let layout = SiteLayout::default();
        let first = normalize_document(&doc, URL, &layout).expect("first");
        let second = normalize_document(&doc, URL, &layout).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn inline_styles_become_markers() {
        let fragments = normalize_html(
            r#"<div id="storytext"><p>He <i>said</i> <span style="Text-Decoration : UNDERLINE;">no</span>, <b>twice</b>.</p></div>"#,
        );
        assert_eq!(fragments.len(), 1);
        assert_eq!(
            fragments[0].content,
            vec![
                Inline::Text("He ".to_owned()),
                Inline::Open(Style::Emphasis),
                Inline::Text("said".to_owned()),
                Inline::Close(Style::Emphasis),
                Inline::Text(" ".to_owned()),
                Inline::Open(Style::Underline),
                Inline::Text("no".to_owned()),
                Inline::Close(Style::Underline),
                Inline::Text(", ".to_owned()),
                Inline::Open(Style::Strong),
                Inline::Text("twice".to_owned()),
                Inline::Close(Style::Strong),
                Inline::Text(".".to_owned()),
            ]
        );
    }

    #[test]
    fn top_level_emphasis_run_is_one_fragment() {
        let fragments = normalize_html(r#"<div id="storytext"><em>Meanwhile...</em></div>"#);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].to_html(), "<em>Meanwhile...</em>");
    }

    #[test]
    fn top_level_underlined_span_keeps_its_marker() {
        let fragments = normalize_html(
            r#"<div id="storytext"><span style="text-decoration: underline">Signed, M.</span><div style="text-decoration: underline"><p>One</p><p>Two</p></div></div>"#,
        );
        assert_eq!(
            fragments.iter().map(TextFragment::to_html).collect::<Vec<_>>(),
            vec!["<u>Signed, M.</u>", "One", "Two"]
        );
    }

    #[test]
    fn bare_text_nodes_are_trimmed_and_kept() {
        let fragments =
            normalize_html("<div id=\"storytext\">\n\u{a0} Loose text \n<p>Para</p>\n \n</div>");
        assert_eq!(plain(&fragments), vec!["Loose text", "Para"]);
    }

    #[test]
    fn line_breaks_and_noise_are_stripped() {
        let fragments = normalize_html(
            r#"<div id="storytext"><script>var x = 1;</script><p>line one<br>line two</p><style>p{}</style></div>"#,
        );
        assert_eq!(plain(&fragments), vec!["line one line two"]);
    }

    #[test]
    fn empty_styled_runs_are_elided() {
        let fragments =
            normalize_html(r#"<div id="storytext"><p><em> </em>Text<strong></strong></p></div>"#);
        assert_eq!(fragments[0].content, vec![Inline::Text("Text".to_owned())]);
    }

    #[test]
    fn fallback_container_is_used() {
        let fragments = normalize_html(r#"<div id="storytextp"><p>Fallback</p></div>"#);
        assert_eq!(plain(&fragments), vec!["Fallback"]);
    }

    #[test]
    fn missing_container_is_an_error() {
        let fetcher = StaticFetcher::default().with_page(URL, "<html><body><p>x</p></body></html>");
        let err = normalize_chapter(&fetcher, URL, &SiteLayout::default()).unwrap_err();
        assert!(matches!(err, ScrapeError::ContainerNotFound { ref url } if url == URL));
    }

    #[test]
    fn underline_detection_reads_declarations() {
        assert!(declares_underline("color: red; text-decoration: underline"));
        assert!(declares_underline("text-decoration-line:underline overline"));
        assert!(!declares_underline("border-bottom: underline"));
        assert!(!declares_underline("text-decoration: none"));
    }
}
