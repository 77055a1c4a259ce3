//! Immutable component palette offered for drag-and-drop insertion.

use crate::model::{ComponentKind, NewComponent, ProgressionRule};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentTemplate {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub kind: ComponentKind,
    pub content_type: &'static str,
}

impl ComponentTemplate {
    /// Draft for a new component built from this template at `sequence_order`.
    pub fn instantiate(&self, unit_id: Uuid, sequence_order: u32) -> NewComponent {
        NewComponent {
            unit_id,
            name: self.title.to_owned(),
            kind: self.kind,
            content_type: Some(self.content_type.to_owned()),
            sequence_order,
            description: self.description.to_owned(),
            required: true,
            progression_rule: ProgressionRule::Free,
            duration_minutes: Some(30),
            learning_objectives: Vec::new(),
            content_url: None,
            content_text: None,
            weight: 1.0,
        }
    }
}

const TEMPLATES: &[ComponentTemplate] = &[
    ComponentTemplate {
        id: "video",
        title: "Video lesson",
        description: "Recorded lecture or explainer",
        kind: ComponentKind::Media,
        content_type: "video",
    },
    ComponentTemplate {
        id: "audio",
        title: "Podcast",
        description: "Audio content",
        kind: ComponentKind::Media,
        content_type: "audio",
    },
    ComponentTemplate {
        id: "text",
        title: "Rich text",
        description: "Article or reading",
        kind: ComponentKind::Text,
        content_type: "rich_text",
    },
    ComponentTemplate {
        id: "assignment",
        title: "Assignment",
        description: "Activity with a submission",
        kind: ComponentKind::Activity,
        content_type: "link",
    },
    ComponentTemplate {
        id: "forum",
        title: "Forum",
        description: "Group discussion",
        kind: ComponentKind::Activity,
        content_type: "link",
    },
    ComponentTemplate {
        id: "exam",
        title: "Assessment",
        description: "Exam or quiz",
        kind: ComponentKind::Assessment,
        content_type: "link",
    },
    ComponentTemplate {
        id: "pdf",
        title: "PDF document",
        description: "Downloadable PDF file",
        kind: ComponentKind::Attachment,
        content_type: "pdf",
    },
    ComponentTemplate {
        id: "link",
        title: "External link",
        description: "External resource",
        kind: ComponentKind::Attachment,
        content_type: "link",
    },
];

#[derive(Debug, Clone, Copy)]
pub struct TemplatePalette {
    templates: &'static [ComponentTemplate],
}

impl Default for TemplatePalette {
    fn default() -> Self {
        Self {
            templates: TEMPLATES,
        }
    }
}

impl TemplatePalette {
    pub fn all(&self) -> &'static [ComponentTemplate] {
        self.templates
    }

    pub fn find(&self, id: &str) -> Option<&'static ComponentTemplate> {
        self.templates.iter().find(|template| template.id == id)
    }

    pub fn category(&self, kind: ComponentKind) -> impl Iterator<Item = &'static ComponentTemplate> {
        let templates = self.templates;
        templates.iter().filter(move |template| template.kind == kind)
    }

    /// Case-insensitive match on title or description.
    pub fn search(&self, term: &str) -> impl Iterator<Item = &'static ComponentTemplate> {
        let templates = self.templates;
        let needle = term.trim().to_lowercase();
        templates.iter().filter(move |template| {
            needle.is_empty()
                || template.title.to_lowercase().contains(&needle)
                || template.description.to_lowercase().contains(&needle)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Draft;

    #[test]
    fn categories_partition_the_palette() {
        let palette = TemplatePalette::default();
        let media: Vec<_> = palette.category(ComponentKind::Media).map(|t| t.id).collect();
        assert_eq!(media, ["video", "audio"]);
        assert_eq!(palette.category(ComponentKind::Assessment).count(), 1);
    }

    #[test]
    fn search_matches_title_and_description() {
        let palette = TemplatePalette::default();
        let hits: Vec<_> = palette.search("DISCUSSION").map(|t| t.id).collect();
        assert_eq!(hits, ["forum"]);
        assert_eq!(palette.search("").count(), palette.all().len());
    }

    #[test]
    fn instantiated_drafts_are_valid() {
        let palette = TemplatePalette::default();
        let draft = palette.find("pdf").unwrap().instantiate(Uuid::new_v4(), 2);
        assert!(draft.validate().is_ok());
        assert_eq!(draft.sequence_order, 2);
        assert_eq!(draft.content_type.as_deref(), Some("pdf"));
    }
}
