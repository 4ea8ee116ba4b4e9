use scraper::{ElementRef, Html, Node};
use url::Url;

use crate::chapters::count_chapters_in_document;
use crate::error::{ScrapeError, ScrapeResult};
use crate::fetch::PageFetcher;
use crate::formats::{ProfileRecord, Status};
use crate::layout::{GenreVocabulary, SiteLayout, parse_selector};

const STATS_DELIMITER: &str = " - ";
const END_OF_LINE: &str = "<end of stats line>";

/// Fields read from the stats line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsLine {
    pub rating: String,
    pub language: String,
    pub genre: Option<String>,
    pub characters: Option<String>,
    pub chapter_count_label: String,
    pub word_count: String,
    pub status: Status,
    pub published: Option<String>,
    pub updated: Option<String>,
}

pub fn extract_profile(
    fetcher: &dyn PageFetcher,
    seed_url: &str,
    layout: &SiteLayout,
) -> ScrapeResult<ProfileRecord> {
    let doc = fetcher.fetch_document(seed_url)?;
    extract_profile_from_document(&doc, seed_url, layout)
}

pub fn extract_profile_from_document(
    doc: &Html,
    page_url: &str,
    layout: &SiteLayout,
) -> ScrapeResult<ProfileRecord> {
    let profile_selector = parse_selector(&layout.profile)?;
    let profile = doc.select(&profile_selector).next().ok_or_else(|| {
        ScrapeError::ProfileContainerNotFound {
            url: page_url.to_owned(),
        }
    })?;

    let title = first_text(profile, &layout.profile_title)?.unwrap_or_default();
    let (author, author_url) = author_link(profile, &layout.profile_author, page_url)?;
    let summary = first_text(profile, &layout.profile_summary)?.unwrap_or_default();
    if title.is_empty() || author.is_empty() {
        tracing::warn!(url = %page_url, "profile is missing title or author");
    }

    let stats_selector = parse_selector(&layout.profile_stats)?;
    let stats = profile
        .select(&stats_selector)
        .next()
        .ok_or_else(|| ScrapeError::StatsLineNotFound {
            selector: layout.profile_stats.clone(),
            url: page_url.to_owned(),
        })?;
    let stats_text = squash_whitespace(&stats.text().collect::<String>());

    let multi_chapter = count_chapters_in_document(doc, layout)? > 1;
    let mut line = parse_stats_line(&stats_text, multi_chapter, &layout.genres)?;
    let (published, updated) = stats_dates(stats);
    if published.is_some() || updated.is_some() {
        line.published = published;
        line.updated = updated;
    }

    Ok(ProfileRecord {
        title,
        author,
        author_url,
        summary,
        fandom: fandom(doc, layout)?,
        rating: line.rating,
        language: line.language,
        genre: line.genre,
        characters: line.characters,
        chapter_count_label: line.chapter_count_label,
        word_count: line.word_count,
        published_date: line.published,
        updated_date: line.updated,
        status: line.status,
    })
}

fn first_text(scope: ElementRef<'_>, selector: &str) -> ScrapeResult<Option<String>> {
    let selector = parse_selector(selector)?;
    Ok(scope
        .select(&selector)
        .map(|el| squash_whitespace(&el.text().collect::<String>()))
        .find(|text| !text.is_empty()))
}

fn author_link(
    scope: ElementRef<'_>,
    selector: &str,
    page_url: &str,
) -> ScrapeResult<(String, String)> {
    let selector = parse_selector(selector)?;
    let Some(link) = scope.select(&selector).next() else {
        return Ok((String::new(), String::new()));
    };
    let name = squash_whitespace(&link.text().collect::<String>());
    let href = link.value().attr("href").unwrap_or_default().trim();
    let url = Url::parse(page_url)
        .and_then(|base| base.join(href))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| href.to_owned());
    Ok((name, url))
}

fn fandom(doc: &Html, layout: &SiteLayout) -> ScrapeResult<Option<String>> {
    let selector = parse_selector(&layout.breadcrumb_links)?;
    Ok(doc
        .select(&selector)
        .map(|el| squash_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty())
        .last())
}

/// Reads `Published:` / `Updated:` dates from the timestamp spans of the
/// stats element, using the label text right before each span.
fn stats_dates(stats: ElementRef<'_>) -> (Option<String>, Option<String>) {
    let mut published = None;
    let mut updated = None;
    let mut label = String::new();

    for child in stats.children() {
        match child.value() {
            Node::Text(text) => label = text.trim_end().to_owned(),
            Node::Element(element) => {
                let Some(span) = ElementRef::wrap(child) else {
                    continue;
                };
                let Some(stamp) = element.attr("data-xutime") else {
                    label.clear();
                    continue;
                };
                let date = format_timestamp(stamp)
                    .unwrap_or_else(|| squash_whitespace(&span.text().collect::<String>()));
                if label.ends_with("Updated:") {
                    updated = Some(date);
                } else if label.ends_with("Published:") {
                    published = Some(date);
                }
                label.clear();
            }
            _ => {}
        }
    }

    (published, updated)
}

fn format_timestamp(stamp: &str) -> Option<String> {
    let secs = stamp.trim().parse::<i64>().ok()?;
    let time = chrono::DateTime::from_timestamp(secs, 0)?;
    Some(time.format("%Y-%m-%d").to_string())
}

fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses the delimiter-joined stats line. Empty fields are omitted by the
/// site rather than left blank, so each optional slot is probed before it
/// is consumed.
pub fn parse_stats_line(
    line: &str,
    multi_chapter: bool,
    genres: &GenreVocabulary,
) -> ScrapeResult<StatsLine> {
    let segments = line
        .split(STATS_DELIMITER)
        .map(str::trim_start)
        .collect::<Vec<_>>();
    let mut cursor = StatsCursor {
        line,
        segments: &segments,
        pos: 0,
    };

    let rating = cursor.take()?;
    let rating = rating.strip_prefix("Rated:").unwrap_or(rating).trim();
    let rating = rating.strip_prefix("Fiction").unwrap_or(rating).trim();
    if rating.is_empty() {
        return Err(cursor.unexpected(segments[0]));
    }
    let language = cursor.take()?.trim().to_owned();

    let genre = match cursor.peek() {
        Some(segment) if genres.matches_segment(segment) => {
            cursor.advance();
            Some(segment.trim().to_owned())
        }
        _ => None,
    };

    let characters = match cursor.peek() {
        Some(segment)
            if labeled(segment, "Chapters:").is_none() && labeled(segment, "Words:").is_none() =>
        {
            cursor.advance();
            Some(segment.trim().to_owned())
        }
        Some(_) => None,
        None => return Err(cursor.unexpected(END_OF_LINE)),
    };

    let chapter_count_label = match cursor.peek().and_then(|s| labeled(s, "Chapters:")) {
        Some(count) => {
            cursor.advance();
            count.to_owned()
        }
        None if multi_chapter => {
            return Err(cursor.unexpected(cursor.peek().unwrap_or(END_OF_LINE)));
        }
        None => "1".to_owned(),
    };

    let word_count = match cursor.peek().and_then(|s| labeled(s, "Words:")) {
        Some(words) if is_count(words) => {
            cursor.advance();
            words.to_owned()
        }
        _ => return Err(cursor.unexpected(cursor.peek().unwrap_or(END_OF_LINE))),
    };

    let status = if segments.iter().any(|s| s.trim_end() == "Status: Complete") {
        Status::Complete
    } else {
        Status::InProgress
    };

    let rest = &segments[cursor.pos..];
    let published = rest
        .iter()
        .find_map(|s| labeled(s, "Published:"))
        .map(str::to_owned);
    let updated = rest
        .iter()
        .find_map(|s| labeled(s, "Updated:"))
        .map(str::to_owned);

    Ok(StatsLine {
        rating: rating.to_owned(),
        language,
        genre,
        characters,
        chapter_count_label,
        word_count,
        status,
        published,
        updated,
    })
}

struct StatsCursor<'a> {
    line: &'a str,
    segments: &'a [&'a str],
    pos: usize,
}

impl<'a> StatsCursor<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.segments
            .get(self.pos)
            .copied()
            .filter(|segment| !segment.trim().is_empty())
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn take(&mut self) -> ScrapeResult<&'a str> {
        let segment = self.peek().ok_or_else(|| self.unexpected(END_OF_LINE))?;
        self.advance();
        Ok(segment)
    }

    fn unexpected(&self, segment: &str) -> ScrapeError {
        ScrapeError::UnexpectedStatsShape {
            segment: segment.to_owned(),
            line: self.line.to_owned(),
        }
    }
}

/// Value after `label` when the segment is that labeled field.
fn labeled<'a>(segment: &'a str, label: &str) -> Option<&'a str> {
    segment
        .trim()
        .strip_prefix(label)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn is_count(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_digit()) && value.chars().all(|c| c.is_ascii_digit() || c == ',')
}
