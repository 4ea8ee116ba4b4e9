use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkHandle {
    pub canonical_id: String,
    pub title_slug: String,
    pub chapter_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRef {
    pub index: u32,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    Emphasis,
    Strong,
    Underline,
}

impl Style {
    pub fn html_tag(self) -> &'static str {
        match self {
            Style::Emphasis => "em",
            Style::Strong => "strong",
            Style::Underline => "u",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inline {
    Text(String),
    Open(Style),
    Close(Style),
}

/// One reconstructed block of prose: text runs interleaved with balanced
/// style markers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFragment {
    pub content: Vec<Inline>,
}

impl TextFragment {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Inline::Text(text.into())],
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.content.iter().any(|inline| match inline {
            Inline::Text(text) => text.chars().any(|ch| !ch.is_whitespace()),
            Inline::Open(_) | Inline::Close(_) => false,
        })
    }

    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for inline in &self.content {
            if let Inline::Text(text) = inline {
                out.push_str(text);
            }
        }
        out
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for inline in &self.content {
            match inline {
                Inline::Text(text) => {
                    out.push_str(&html_escape::encode_text(text));
                }
                Inline::Open(style) => {
                    out.push('<');
                    out.push_str(style.html_tag());
                    out.push('>');
                }
                Inline::Close(style) => {
                    out.push_str("</");
                    out.push_str(style.html_tag());
                    out.push('>');
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Complete,
    InProgress,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::Complete => "Complete",
            Status::InProgress => "In Progress",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub title: String,
    pub author: String,
    pub author_url: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fandom: Option<String>,
    pub rating: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub characters: Option<String>,
    pub chapter_count_label: String,
    pub word_count: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<String>,
    pub status: Status,
}
