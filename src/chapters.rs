use std::collections::BTreeMap;

use scraper::Html;
use url::Url;

use crate::error::{ScrapeError, ScrapeResult};
use crate::fetch::PageFetcher;
use crate::formats::{ChapterRef, WorkHandle};
use crate::layout::{SiteLayout, parse_selector};

/// Path pieces of a work url: `{base_id_path}/{chapter_index}/{title_slug}`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct WorkPath {
    url: Url,
    base_segments: Vec<String>,
    title_slug: String,
}

impl WorkPath {
    fn parse(seed_url: &str) -> ScrapeResult<Self> {
        Self::from_url(seed_url, parse_seed_url(seed_url)?)
    }

    fn from_url(seed_url: &str, url: Url) -> ScrapeResult<Self> {
        let segments = url
            .path_segments()
            .map(|segments| segments.map(str::to_owned).collect::<Vec<_>>())
            .unwrap_or_default();
        if segments.len() < 3 {
            return Err(ScrapeError::malformed_url(
                seed_url,
                "expected {work-path}/{chapter-index}/{title-slug}",
            ));
        }

        let (base_segments, tail) = segments.split_at(segments.len() - 2);
        let chapter_segment = &tail[0];
        let title_slug = &tail[1];
        let work_id = base_segments.last().map(String::as_str).unwrap_or_default();

        if work_id.is_empty() {
            return Err(ScrapeError::malformed_url(seed_url, "missing work id"));
        }
        if chapter_segment.is_empty() || !chapter_segment.chars().all(|c| c.is_ascii_digit()) {
            return Err(ScrapeError::malformed_url(
                seed_url,
                format!("chapter index segment is not a number: {chapter_segment:?}"),
            ));
        }
        if title_slug.is_empty() {
            return Err(ScrapeError::malformed_url(seed_url, "missing title slug"));
        }

        Ok(Self {
            url,
            base_segments: base_segments.to_vec(),
            title_slug: title_slug.clone(),
        })
    }

    fn work_id(&self) -> &str {
        self.base_segments
            .last()
            .map(String::as_str)
            .unwrap_or_default()
    }

    fn chapter_url(&self, index: u32) -> String {
        let mut url = self.url.clone();
        url.set_query(None);
        url.set_fragment(None);
        let path = format!(
            "/{}/{index}/{}",
            self.base_segments.join("/"),
            self.title_slug
        );
        url.set_path(&path);
        url.to_string()
    }
}

/// An absolute http(s) url with a host; single-chapter seeds are used as given.
fn parse_seed_url(seed_url: &str) -> ScrapeResult<Url> {
    let url = Url::parse(seed_url).map_err(|err| ScrapeError::malformed_url(seed_url, err))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ScrapeError::malformed_url(seed_url, "scheme must be http/https"));
    }
    if url.host_str().is_none() {
        return Err(ScrapeError::malformed_url(seed_url, "missing host"));
    }
    Ok(url)
}

/// Validates the seed url. The `{work-path}/{chapter-index}/{title-slug}`
/// shape is only required once the work is known to span several chapters.
pub fn work_handle(seed_url: &str, chapter_count: u32) -> ScrapeResult<WorkHandle> {
    let url = parse_seed_url(seed_url)?;
    if url.host_str().is_some_and(|host| host.starts_with("m.")) {
        tracing::warn!(url = %seed_url, "mobile site url; page anchors may be missing");
    }
    let chapter_count = chapter_count.max(1);

    if chapter_count > 1 {
        let path = WorkPath::from_url(seed_url, url)?;
        return Ok(WorkHandle {
            canonical_id: path.work_id().to_owned(),
            title_slug: path.title_slug,
            chapter_count,
        });
    }

    let segments = url
        .path_segments()
        .map(|segments| {
            segments
                .filter(|segment| !segment.is_empty())
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let title_slug = segments
        .last()
        .cloned()
        .or_else(|| url.host_str().map(str::to_owned))
        .unwrap_or_default();
    let canonical_id = segments
        .iter()
        .find(|segment| segment.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(&title_slug)
        .clone();
    Ok(WorkHandle {
        canonical_id,
        title_slug,
        chapter_count,
    })
}

/// File stem for the output artifact.
pub fn output_stem(title_slug: &str) -> String {
    title_slug.replace('-', " ")
}

pub fn derive_chapter_url(seed_url: &str, index: u32) -> ScrapeResult<String> {
    Ok(WorkPath::parse(seed_url)?.chapter_url(index))
}

pub fn count_chapters(
    fetcher: &dyn PageFetcher,
    seed_url: &str,
    layout: &SiteLayout,
) -> ScrapeResult<u32> {
    let doc = fetcher.fetch_document(seed_url)?;
    count_chapters_in_document(&doc, layout)
}

/// Largest integer option value of the chapter selector, or 1 without one.
pub fn count_chapters_in_document(doc: &Html, layout: &SiteLayout) -> ScrapeResult<u32> {
    let selector = parse_selector(&layout.chapter_options)?;
    let count = doc
        .select(&selector)
        .filter_map(|option| option.value().attr("value"))
        .filter_map(|value| value.trim().parse::<u32>().ok())
        .max()
        .unwrap_or(1)
        .max(1);
    tracing::debug!(count, "counted chapters");
    Ok(count)
}

/// Chapter names from the title selector, ordered by chapter index.
pub fn chapter_titles_in_document(doc: &Html, layout: &SiteLayout) -> ScrapeResult<Vec<String>> {
    Ok(titles_by_index(doc, layout)?.into_values().collect())
}

fn titles_by_index(doc: &Html, layout: &SiteLayout) -> ScrapeResult<BTreeMap<u32, String>> {
    let selector = parse_selector(&layout.chapter_title_options)?;
    let mut titles: BTreeMap<u32, String> = BTreeMap::new();
    for option in doc.select(&selector) {
        let Some(index) = option
            .value()
            .attr("value")
            .and_then(|value| value.trim().parse::<u32>().ok())
        else {
            continue;
        };
        let text = option.text().collect::<String>();
        titles
            .entry(index)
            .or_insert_with(|| strip_chapter_number(&text, index));
    }
    Ok(titles)
}

fn strip_chapter_number(text: &str, index: u32) -> String {
    let text = text.trim();
    text.strip_prefix(&format!("{index}."))
        .map(str::trim_start)
        .filter(|rest| !rest.is_empty())
        .unwrap_or(text)
        .to_owned()
}

pub fn build_chapter_list(
    fetcher: &dyn PageFetcher,
    seed_url: &str,
    layout: &SiteLayout,
) -> ScrapeResult<Vec<ChapterRef>> {
    parse_seed_url(seed_url)?;
    let doc = fetcher.fetch_document(seed_url)?;
    chapter_list_from_document(seed_url, &doc, layout)
}

/// Titles are attached by option value, so a partial title selector never
/// moves a name onto another chapter.
pub fn chapter_list_from_document(
    seed_url: &str,
    doc: &Html,
    layout: &SiteLayout,
) -> ScrapeResult<Vec<ChapterRef>> {
    let count = count_chapters_in_document(doc, layout)?;
    let mut titles = titles_by_index(doc, layout)?;
    if count > 1 && titles.is_empty() {
        tracing::warn!(count, "chapter selector present but no chapter titles found");
    }
    if !titles.is_empty() && titles.len() != count as usize {
        tracing::warn!(
            count,
            titles = titles.len(),
            "chapter title count does not match chapter count"
        );
    }

    if count == 1 {
        return Ok(vec![ChapterRef {
            index: 1,
            url: seed_url.to_owned(),
            title: titles.remove(&1),
        }]);
    }

    let path = WorkPath::parse(seed_url)?;
    Ok((1..=count)
        .map(|index| ChapterRef {
            index,
            url: path.chapter_url(index),
            title: titles.remove(&index),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StaticFetcher;

    const SEED: &str = "https://site/s/123/1/My-Title";

    fn selector_page(values: &[u32]) -> String {
        let options = values
            .iter()
            .map(|v| format!(r#"<option value="{v}">{v}. Part {v}</option>"#))
            .collect::<String>();
        format!(
            r#"<html><body>
<select id="chap_select">{options}</select>
<div id="storytext"><p>x</p></div>
<select id="chap_select">{options}</select>
</body></html>"#
        )
    }

    #[test]
    fn derive_chapter_url_substitutes_index() -> anyhow::Result<()> {
        assert_eq!(derive_chapter_url(SEED, 7)?, "https://site/s/123/7/My-Title");
        assert_eq!(
            derive_chapter_url("https://www.fanfiction.net/s/8559914/12/Fledgling?x=1#top", 3)?,
            "https://www.fanfiction.net/s/8559914/3/Fledgling"
        );
        Ok(())
    }

    #[test]
    fn derive_chapter_url_rejects_short_paths() {
        for url in [
            "https://site/s/123",
            "https://site/123/1/",
            "https://site/s/123/one/Title",
            "not a url",
            "ftp://site/s/123/1/Title",
        ] {
            let err = derive_chapter_url(url, 2).expect_err(url);
            assert!(matches!(err, ScrapeError::MalformedUrl { .. }), "{url}: {err}");
        }
    }

    #[test]
    fn count_takes_maximum_not_last_option() -> anyhow::Result<()> {
        let doc = Html::parse_document(&selector_page(&[2, 5, 1, 4, 3]));
        assert_eq!(count_chapters_in_document(&doc, &SiteLayout::default())?, 5);
        Ok(())
    }

    #[test]
    fn page_without_selector_has_one_chapter() -> anyhow::Result<()> {
        let fetcher =
            StaticFetcher::default().with_page(SEED, "<html><body><p>hi</p></body></html>");
        assert_eq!(count_chapters(&fetcher, SEED, &SiteLayout::default())?, 1);

        let list = build_chapter_list(&fetcher, SEED, &SiteLayout::default())?;
        assert_eq!(
            list,
            vec![ChapterRef {
                index: 1,
                url: SEED.to_owned(),
                title: None,
            }]
        );
        Ok(())
    }

    #[test]
    fn single_chapter_keeps_nonstandard_seed_unchanged() -> anyhow::Result<()> {
        let seed = "https://site/s/123/1/Odd-Slug?ref=home";
        let fetcher = StaticFetcher::default().with_page(seed, &selector_page(&[1]));
        let list = build_chapter_list(&fetcher, seed, &SiteLayout::default())?;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].url, seed);
        assert_eq!(list[0].title.as_deref(), Some("Part 1"));
        Ok(())
    }

    #[test]
    fn chapter_list_is_contiguous_and_titled() -> anyhow::Result<()> {
        let fetcher = StaticFetcher::default().with_page(SEED, &selector_page(&[1, 2, 3]));
        let list = build_chapter_list(&fetcher, SEED, &SiteLayout::default())?;

        let indices = list.iter().map(|c| c.index).collect::<Vec<_>>();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(list[2].url, "https://site/s/123/3/My-Title");
        assert_eq!(list[1].title.as_deref(), Some("Part 2"));
        assert_eq!(fetcher.requested.borrow().len(), 1);
        Ok(())
    }

    #[test]
    fn missing_title_selector_yields_untitled_chapters() -> anyhow::Result<()> {
        let html = r#"<html><body><select name="chapter">
<option value="1">One</option><option value="2">Two</option>
</select></body></html>"#;
        let doc = Html::parse_document(html);
        let layout = SiteLayout::default();
        assert!(chapter_titles_in_document(&doc, &layout)?.is_empty());

        let list = chapter_list_from_document(SEED, &doc, &layout)?;
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|c| c.title.is_none()));
        Ok(())
    }

    #[test]
    fn single_chapter_seed_with_trailing_slash_is_accepted() -> anyhow::Result<()> {
        for seed in ["https://site/s/123/1/Odd-Slug/", "https://site/s/123/1/"] {
            let fetcher = StaticFetcher::default().with_page(seed, "<p>x</p>");
            let list = build_chapter_list(&fetcher, seed, &SiteLayout::default())?;
            assert_eq!(list.len(), 1);
            assert_eq!(list[0].url, seed);
            assert_eq!(*fetcher.requested.borrow(), vec![seed.to_owned()]);
        }

        let handle = work_handle("https://site/s/123/1/Odd-Slug/", 1)?;
        assert_eq!(handle.canonical_id, "123");
        assert_eq!(output_stem(&handle.title_slug), "Odd Slug");
        Ok(())
    }

    #[test]
    fn multi_chapter_work_still_needs_full_path() {
        let seed = "https://site/s/123/1/";
        let fetcher = StaticFetcher::default().with_page(seed, &selector_page(&[1, 2]));
        let err = build_chapter_list(&fetcher, seed, &SiteLayout::default()).unwrap_err();
        assert!(matches!(err, ScrapeError::MalformedUrl { .. }), "{err}");
        assert!(matches!(
            work_handle(seed, 2),
            Err(ScrapeError::MalformedUrl { .. })
        ));
    }

    #[test]
    fn partial_title_selector_keeps_titles_on_their_chapters() -> anyhow::Result<()> {
        let html = r#"<html><body>
<select name="nav"><option value="1">1</option><option value="2">2</option><option value="3">3</option></select>
<select id="chap_select"><option value="2">2. Second</option><option value="3">3. Third</option></select>
</body></html>"#;
        let doc = Html::parse_document(html);
        let list = chapter_list_from_document(SEED, &doc, &SiteLayout::default())?;
        let titles = list
            .iter()
            .map(|c| c.title.as_deref())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec![None, Some("Second"), Some("Third")]);
        Ok(())
    }

    #[test]
    fn fetch_failure_is_reported() {
        let fetcher = StaticFetcher::default();
        let err = count_chapters(&fetcher, SEED, &SiteLayout::default()).unwrap_err();
        assert!(matches!(err, ScrapeError::Fetch { .. }));
    }

    #[test]
    fn work_handle_and_output_stem() -> anyhow::Result<()> {
        let handle = work_handle(SEED, 4)?;
        assert_eq!(handle.canonical_id, "123");
        assert_eq!(handle.title_slug, "My-Title");
        assert_eq!(handle.chapter_count, 4);
        assert_eq!(output_stem(&handle.title_slug), "My Title");
        Ok(())
    }
}
