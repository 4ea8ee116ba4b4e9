use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;

use crate::assemble::{Document, assemble};
use crate::chapters::{chapter_list_from_document, output_stem, work_handle};
use crate::cli::{BuildArgs, ChaptersArgs, FetchArgs, ProfileArgs};
use crate::export::{ExportOptions, FontSet, OutputFormat, preflight, write_document};
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::formats::{ChapterRef, ProfileRecord, TextFragment, WorkHandle};
use crate::layout::{GenreVocabulary, SiteLayout};
use crate::normalize::normalize_document;
use crate::profile::extract_profile_from_document;

/// Everything scraped for one work, in chapter order.
#[derive(Debug, Clone)]
pub struct ScrapedWork {
    pub handle: WorkHandle,
    pub profile: ProfileRecord,
    pub chapters: Vec<ChapterRef>,
    pub fragments: Vec<Vec<TextFragment>>,
}

impl ScrapedWork {
    pub fn assemble(&self) -> anyhow::Result<Document> {
        assemble(&self.profile, &self.chapters, &[], &self.fragments)
    }
}

pub fn run(args: BuildArgs) -> anyhow::Result<PathBuf> {
    let layout = load_layout(args.genres.as_deref())?;
    let handle = work_handle(&args.url, 1).context("validate --url")?;

    let fonts = match args.format {
        OutputFormat::Pdf => Some(
            FontSet::locate(Path::new(&args.fonts), &args.font_family)
                .context("locate pdf fonts")?,
        ),
        OutputFormat::Txt | OutputFormat::Html => None,
    };
    let options = ExportOptions {
        out_dir: PathBuf::from(&args.out),
        format: args.format,
        force: args.force,
        pandoc: args.pandoc.clone(),
        fonts,
    };
    let stem = output_stem(&handle.title_slug);
    preflight(&options, &stem)?;

    let fetcher = http_fetcher(&args.fetch)?;
    let delay = Duration::from_millis(args.delay_ms);
    let work = scrape_work(&fetcher, &args.url, &layout, delay)?;

    tracing::info!(chapters = work.chapters.len(), "build: assemble");
    let document = work.assemble().context("assemble document")?;

    tracing::info!(out = %options.out_dir.display(), "build: export");
    write_document(&document, &stem, &options).context("export")
}

/// Fetches the seed page once, then every chapter in order. The first
/// failure aborts the whole scrape.
pub fn scrape_work(
    fetcher: &dyn PageFetcher,
    seed_url: &str,
    layout: &SiteLayout,
    delay: Duration,
) -> anyhow::Result<ScrapedWork> {
    work_handle(seed_url, 1).context("validate seed url")?;

    tracing::info!(url = %seed_url, "build: fetch seed page");
    let seed = fetcher
        .fetch_document(seed_url)
        .with_context(|| format!("fetch seed page: {seed_url}"))?;

    let chapters = chapter_list_from_document(seed_url, &seed, layout)
        .with_context(|| format!("locate chapters: {seed_url}"))?;
    let handle = work_handle(seed_url, chapters.len() as u32).context("validate seed url")?;

    tracing::info!(chapters = chapters.len(), "build: extract profile");
    let profile = extract_profile_from_document(&seed, seed_url, layout)
        .with_context(|| format!("extract profile: {seed_url}"))?;

    let mut fragments = Vec::with_capacity(chapters.len());
    for chapter in &chapters {
        if chapter.url == seed_url {
            tracing::info!(index = chapter.index, url = %chapter.url, "build: normalize chapter");
            let chapter_fragments = normalize_document(&seed, &chapter.url, layout)
                .with_context(|| format!("normalize chapter {}: {}", chapter.index, chapter.url))?;
            fragments.push(chapter_fragments);
            continue;
        }

        if !delay.is_zero() && chapter.index > 1 {
            std::thread::sleep(delay);
        }
        tracing::info!(index = chapter.index, url = %chapter.url, "build: normalize chapter");
        let doc = fetcher
            .fetch_document(&chapter.url)
            .with_context(|| format!("fetch chapter {}: {}", chapter.index, chapter.url))?;
        let chapter_fragments = normalize_document(&doc, &chapter.url, layout)
            .with_context(|| format!("normalize chapter {}: {}", chapter.index, chapter.url))?;
        tracing::debug!(index = chapter.index, fragments = chapter_fragments.len(), "normalized");
        fragments.push(chapter_fragments);
    }

    Ok(ScrapedWork {
        handle,
        profile,
        chapters,
        fragments,
    })
}

pub fn chapters(args: ChaptersArgs) -> anyhow::Result<Vec<ChapterRef>> {
    work_handle(&args.url, 1).context("validate --url")?;
    let fetcher = http_fetcher(&args.fetch)?;
    let layout = SiteLayout::default();
    let seed = fetcher
        .fetch_document(&args.url)
        .with_context(|| format!("fetch seed page: {}", args.url))?;
    chapter_list_from_document(&args.url, &seed, &layout)
        .with_context(|| format!("locate chapters: {}", args.url))
}

pub fn profile(args: ProfileArgs) -> anyhow::Result<ProfileRecord> {
    let layout = load_layout(args.genres.as_deref())?;
    work_handle(&args.url, 1).context("validate --url")?;
    let fetcher = http_fetcher(&args.fetch)?;
    crate::profile::extract_profile(&fetcher, &args.url, &layout)
        .with_context(|| format!("extract profile: {}", args.url))
}

fn load_layout(genres: Option<&str>) -> anyhow::Result<SiteLayout> {
    let layout = SiteLayout::default();
    match genres {
        Some(path) => {
            let genres = GenreVocabulary::from_yaml_file(Path::new(path))?;
            tracing::debug!(genres = genres.names().len(), "loaded genre list");
            Ok(layout.with_genres(genres))
        }
        None => Ok(layout),
    }
}

fn http_fetcher(args: &FetchArgs) -> anyhow::Result<HttpFetcher> {
    HttpFetcher::new(Duration::from_secs(args.timeout_secs)).context("build http client")
}
