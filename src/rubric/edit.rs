//! In-session rubric editing.
//!
//! Nodes created during an editing session get random session ids
//! (`section-<uuid>`, `part-<uuid>`, `item-<uuid>`). They are never re-derived
//! while the session is live; once saved they are ordinary persisted ids and
//! survive normalization unchanged. Nothing is removed implicitly.

use uuid::Uuid;

use super::{normalize, Rubric, RubricItem, RubricPart, RubricSection};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EditError {
    #[error("unknown section: {0}")]
    UnknownSection(String),
    #[error("unknown part: {0}")]
    UnknownPart(String),
    #[error("unknown item: {0}")]
    UnknownItem(String),
}

/// Partial update for an item; `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct ItemUpdate {
    pub title: Option<String>,
    pub points: Option<u64>,
    pub feedback: Option<String>,
}

pub struct RubricEditor {
    rubric: Rubric,
}

fn session_id(kind: &str) -> String {
    format!("{kind}-{}", Uuid::new_v4().simple())
}

impl RubricEditor {
    /// Start editing from any stored rubric shape.
    pub fn open(raw: Option<&serde_json::Value>) -> Self {
        Self {
            rubric: normalize(raw),
        }
    }

    pub fn from_rubric(rubric: Rubric) -> Self {
        Self { rubric }
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    /// End the session, returning the canonical form to persist.
    pub fn finish(self) -> Rubric {
        let value = serde_json::to_value(&self.rubric).unwrap_or_default();
        normalize(Some(&value))
    }

    // -------------------------------------------------------------------------
    // Sections
    // -------------------------------------------------------------------------

    pub fn add_section(&mut self) -> String {
        let id = session_id("section");
        let title = format!("Section {}", self.rubric.sections.len() + 1);
        self.rubric.sections.push(RubricSection {
            id: id.clone(),
            title,
            rubric_items: Vec::new(),
            parts: Vec::new(),
        });
        id
    }

    pub fn remove_section(&mut self, section_id: &str) -> Result<RubricSection, EditError> {
        let idx = self
            .rubric
            .sections
            .iter()
            .position(|s| s.id == section_id)
            .ok_or_else(|| EditError::UnknownSection(section_id.to_string()))?;
        Ok(self.rubric.sections.remove(idx))
    }

    pub fn rename_section(&mut self, section_id: &str, title: &str) -> Result<(), EditError> {
        self.section_mut(section_id)?.title = title.to_string();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Parts
    // -------------------------------------------------------------------------

    pub fn add_part(&mut self, section_id: &str) -> Result<String, EditError> {
        let section = self.section_mut(section_id)?;
        let id = session_id("part");
        section.parts.push(RubricPart {
            id: id.clone(),
            title: "New Part".to_string(),
            rubric_items: Vec::new(),
        });
        Ok(id)
    }

    pub fn remove_part(&mut self, section_id: &str, part_id: &str) -> Result<RubricPart, EditError> {
        let section = self.section_mut(section_id)?;
        let idx = section
            .parts
            .iter()
            .position(|p| p.id == part_id)
            .ok_or_else(|| EditError::UnknownPart(part_id.to_string()))?;
        Ok(section.parts.remove(idx))
    }

    pub fn rename_part(
        &mut self,
        section_id: &str,
        part_id: &str,
        title: &str,
    ) -> Result<(), EditError> {
        self.part_mut(section_id, part_id)?.title = title.to_string();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Items
    // -------------------------------------------------------------------------

    /// Add a blank item to a section, or to one of its parts.
    pub fn add_item(&mut self, section_id: &str, part_id: Option<&str>) -> Result<String, EditError> {
        let id = session_id("item");
        let item = RubricItem::new(id.clone(), "New rubric item", 0);
        self.items_mut(section_id, part_id)?.push(item);
        Ok(id)
    }

    pub fn remove_item(
        &mut self,
        section_id: &str,
        part_id: Option<&str>,
        item_id: &str,
    ) -> Result<RubricItem, EditError> {
        let items = self.items_mut(section_id, part_id)?;
        let idx = items
            .iter()
            .position(|it| it.id == item_id)
            .ok_or_else(|| EditError::UnknownItem(item_id.to_string()))?;
        Ok(items.remove(idx))
    }

    pub fn update_item(
        &mut self,
        section_id: &str,
        part_id: Option<&str>,
        item_id: &str,
        update: ItemUpdate,
    ) -> Result<(), EditError> {
        let item = self
            .items_mut(section_id, part_id)?
            .iter_mut()
            .find(|it| it.id == item_id)
            .ok_or_else(|| EditError::UnknownItem(item_id.to_string()))?;
        if let Some(title) = update.title {
            item.title = title;
        }
        if let Some(points) = update.points {
            item.points = points;
        }
        if let Some(feedback) = update.feedback {
            item.feedback = feedback;
        }
        Ok(())
    }

    fn section_mut(&mut self, section_id: &str) -> Result<&mut RubricSection, EditError> {
        self.rubric
            .sections
            .iter_mut()
            .find(|s| s.id == section_id)
            .ok_or_else(|| EditError::UnknownSection(section_id.to_string()))
    }

    fn part_mut(&mut self, section_id: &str, part_id: &str) -> Result<&mut RubricPart, EditError> {
        self.section_mut(section_id)?
            .parts
            .iter_mut()
            .find(|p| p.id == part_id)
            .ok_or_else(|| EditError::UnknownPart(part_id.to_string()))
    }

    fn items_mut(
        &mut self,
        section_id: &str,
        part_id: Option<&str>,
    ) -> Result<&mut Vec<RubricItem>, EditError> {
        match part_id {
            Some(part_id) => Ok(&mut self.part_mut(section_id, part_id)?.rubric_items),
            None => Ok(&mut self.section_mut(section_id)?.rubric_items),
        }
    }
}
