//! Read-only views over the catalog: paged story listing and full story
//! detail with paragraphs and sentences in creation order.

use serde::Serialize;

use crate::domain::model::{ParagraphId, Story, StoryId};
use crate::store::{StoreError, StoryCatalog};

pub const DEFAULT_PAGE_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoryBrief {
    pub id: StoryId,
    pub title: String,
    pub finished: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Story> for StoryBrief {
    fn from(story: Story) -> Self {
        Self {
            id: story.id,
            title: story.title,
            finished: story.finished,
            created_at: story.created_at,
            updated_at: story.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoryPage {
    pub limit: u32,
    pub offset: u32,
    pub count: u64,
    pub results: Vec<StoryBrief>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParagraphView {
    pub id: ParagraphId,
    pub finished: bool,
    pub sentences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoryDetail {
    #[serde(flatten)]
    pub story: StoryBrief,
    pub title_complete: bool,
    pub paragraphs: Vec<ParagraphView>,
}

impl StoryDetail {
    pub fn word_count(&self) -> usize {
        self.paragraphs
            .iter()
            .flat_map(|paragraph| paragraph.sentences.iter())
            .map(|sentence| sentence.split_whitespace().count())
            .sum()
    }
}

pub fn list_stories(
    catalog: &impl StoryCatalog,
    limit: u32,
    offset: u32,
) -> Result<StoryPage, StoreError> {
    let count = catalog.count_stories()?;
    let results = catalog
        .list_stories(limit, offset)?
        .into_iter()
        .map(StoryBrief::from)
        .collect();
    Ok(StoryPage {
        limit,
        offset,
        count,
        results,
    })
}

pub fn story_detail(
    catalog: &impl StoryCatalog,
    id: StoryId,
) -> Result<Option<StoryDetail>, StoreError> {
    let Some(story) = catalog.find_story(id)? else {
        return Ok(None);
    };
    let title_complete = story.title_complete;
    let paragraphs = catalog
        .story_paragraphs(story.id)?
        .into_iter()
        .map(|paragraph| {
            let sentences = catalog
                .paragraph_sentences(paragraph.id)?
                .into_iter()
                .map(|sentence| sentence.content)
                .collect();
            Ok(ParagraphView {
                id: paragraph.id,
                finished: paragraph.finished,
                sentences,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    Ok(Some(StoryDetail {
        story: StoryBrief::from(story),
        title_complete,
        paragraphs,
    }))
}

pub fn open_story(catalog: &impl StoryCatalog) -> Result<Option<StoryBrief>, StoreError> {
    Ok(catalog.open_story()?.map(StoryBrief::from))
}
