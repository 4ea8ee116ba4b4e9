use crate::formats::{ChapterRef, ProfileRecord, TextFragment};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Title(String),
    MetaLine { label: &'static str, value: String },
    Summary(String),
    ChapterHeading(String),
    Paragraph(TextFragment),
    SectionBreak,
}

/// Ordered blocks of the final artifact, independent of output format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub title: String,
    pub blocks: Vec<Block>,
}

pub fn assemble(
    profile: &ProfileRecord,
    chapters: &[ChapterRef],
    titles: &[String],
    fragments: &[Vec<TextFragment>],
) -> anyhow::Result<Document> {
    if chapters.len() != fragments.len() {
        anyhow::bail!(
            "chapter count ({}) does not match normalized chapter count ({})",
            chapters.len(),
            fragments.len()
        );
    }

    let mut blocks = metadata_blocks(profile);

    for (pos, (chapter, chapter_fragments)) in chapters.iter().zip(fragments).enumerate() {
        blocks.push(Block::SectionBreak);

        let heading = chapter
            .title
            .clone()
            .or_else(|| titles.get(pos).cloned())
            .or_else(|| (chapters.len() > 1).then(|| format!("Chapter {}", chapter.index)));
        if let Some(heading) = heading {
            blocks.push(Block::ChapterHeading(heading));
        }

        blocks.extend(
            chapter_fragments
                .iter()
                .filter(|fragment| !fragment.is_empty())
                .cloned()
                .map(Block::Paragraph),
        );
    }

    Ok(Document {
        title: profile.title.clone(),
        blocks,
    })
}

fn metadata_blocks(profile: &ProfileRecord) -> Vec<Block> {
    let mut blocks = vec![Block::Title(profile.title.clone())];

    let lines: [(&'static str, Option<&String>); 11] = [
        ("Author", Some(&profile.author)),
        ("Author page", Some(&profile.author_url)),
        ("Fandom", profile.fandom.as_ref()),
        ("Rated", Some(&profile.rating)),
        ("Language", Some(&profile.language)),
        ("Genre", profile.genre.as_ref()),
        ("Characters", profile.characters.as_ref()),
        ("Chapters", Some(&profile.chapter_count_label)),
        ("Words", Some(&profile.word_count)),
        ("Published", profile.published_date.as_ref()),
        ("Updated", profile.updated_date.as_ref()),
    ];
    for (label, value) in lines {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            blocks.push(Block::MetaLine {
                label,
                value: value.clone(),
            });
        }
    }
    blocks.push(Block::MetaLine {
        label: "Status",
        value: profile.status.label().to_owned(),
    });

    if !profile.summary.trim().is_empty() {
        blocks.push(Block::Summary(profile.summary.clone()));
    }
    blocks
}
