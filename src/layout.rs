use std::path::Path;

use anyhow::Context as _;
use scraper::Selector;

use crate::error::{ScrapeError, ScrapeResult};

const DEFAULT_GENRES: &[&str] = &[
    "Adventure",
    "Angst",
    "Crime",
    "Drama",
    "Family",
    "Fantasy",
    "Friendship",
    "General",
    "Horror",
    "Humor",
    "Hurt/Comfort",
    "Mystery",
    "Parody",
    "Poetry",
    "Romance",
    "Sci-Fi",
    "Spiritual",
    "Supernatural",
    "Suspense",
    "Tragedy",
    "Western",
];

/// CSS selectors for the structural anchors of a work page.
#[derive(Debug, Clone)]
pub struct SiteLayout {
    pub chapter_options: String,
    pub chapter_title_options: String,
    pub content_primary: String,
    pub content_fallback: String,
    pub profile: String,
    pub profile_title: String,
    pub profile_author: String,
    pub profile_summary: String,
    pub profile_stats: String,
    pub breadcrumb_links: String,
    pub genres: GenreVocabulary,
}

impl Default for SiteLayout {
    fn default() -> Self {
        Self {
            chapter_options: "select option".to_owned(),
            chapter_title_options: "select#chap_select option".to_owned(),
            content_primary: "#storytext".to_owned(),
            content_fallback: "#storytextp".to_owned(),
            profile: "#profile_top".to_owned(),
            profile_title: "b".to_owned(),
            profile_author: "a".to_owned(),
            profile_summary: "div.xcontrast_txt".to_owned(),
            profile_stats: "span.xgray".to_owned(),
            breadcrumb_links: "#pre_story_links a".to_owned(),
            genres: GenreVocabulary::default(),
        }
    }
}

impl SiteLayout {
    pub fn with_genres(mut self, genres: GenreVocabulary) -> Self {
        self.genres = genres;
        self
    }
}

pub fn parse_selector(selector: &str) -> ScrapeResult<Selector> {
    Selector::parse(selector).map_err(|err| ScrapeError::Selector {
        selector: selector.to_owned(),
        reason: err.to_string(),
    })
}

/// Allow-list of genre names recognized in the stats line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenreVocabulary {
    names: Vec<String>,
}

impl Default for GenreVocabulary {
    fn default() -> Self {
        Self::new(DEFAULT_GENRES.iter().map(|name| (*name).to_owned()))
    }
}

impl GenreVocabulary {
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        let mut names = names
            .into_iter()
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>();
        // Longest first so `Hurt/Comfort` wins over a shorter `Hurt` entry.
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        names.dedup();
        Self { names }
    }

    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read genre list: {}", path.display()))?;
        let names: Vec<String> = serde_yaml::from_str(&yaml)
            .with_context(|| format!("parse genre list: {}", path.display()))?;
        if names.is_empty() {
            anyhow::bail!("genre list is empty: {}", path.display());
        }
        Ok(Self::new(names))
    }

    /// True when the segment is a genre or a `/`-joined list that starts
    /// with one.
    pub fn matches_segment(&self, segment: &str) -> bool {
        let segment = segment.trim();
        self.names.iter().any(|name| {
            segment
                .strip_prefix(name.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_genres_match_on_first_name() {
        let genres = GenreVocabulary::default();
        assert!(genres.matches_segment("Romance"));
        assert!(genres.matches_segment("Romance/Drama"));
        assert!(genres.matches_segment("Hurt/Comfort/Angst"));
        assert!(!genres.matches_segment("Romanceish"));
        assert!(!genres.matches_segment("Harry P., Hermione G."));
        assert!(!genres.matches_segment("Words: 900"));
    }

    #[test]
    fn genre_list_loads_from_yaml() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("genres.yaml");
        std::fs::write(&path, "- Cozy\n- Slice of Life\n")?;

        let genres = GenreVocabulary::from_yaml_file(&path)?;
        assert!(genres.matches_segment("Slice of Life/Cozy"));
        assert!(!genres.matches_segment("Romance"));
        assert_eq!(genres.names().len(), 2);
        Ok(())
    }

    #[test]
    fn default_selectors_compile() -> anyhow::Result<()> {
        let layout = SiteLayout::default();
        for selector in [
            &layout.chapter_options,
            &layout.chapter_title_options,
            &layout.content_primary,
            &layout.content_fallback,
            &layout.profile,
            &layout.profile_title,
            &layout.profile_author,
            &layout.profile_summary,
            &layout.profile_stats,
            &layout.breadcrumb_links,
        ] {
            parse_selector(selector)?;
        }
        Ok(())
    }
}
