use std::collections::HashMap;

/// What a grade item stands for: the course aggregate, a category aggregate,
/// or a manually created item inside a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Course,
    Category,
    Manual,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Course => "course",
            ItemType::Category => "category",
            ItemType::Manual => "manual",
        }
    }

    pub fn parse(raw: &str) -> Option<ItemType> {
        match raw {
            "course" => Some(ItemType::Course),
            "category" => Some(ItemType::Category),
            "manual" => Some(ItemType::Manual),
            _ => None,
        }
    }
}

/// A node in a course's grading hierarchy. Exactly one node per course has
/// `parent_id = None` (the course root).
#[derive(Debug, Clone)]
pub struct CategoryNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub course_id: i64,
    pub full_name: String,
    /// Slash-joined id chain from the root down to this node, e.g. "/1/5/9".
    pub path: String,
    pub depth: i64,
    pub sort_order: i64,
    pub hidden: bool,
    pub item_type: ItemType,
    pub time_created: i64,
    pub time_modified: i64,
}

/// A gradable unit. Category-type items point at the category they represent
/// through `item_instance`; manual items point at their owning category
/// through `category_id`.
#[derive(Debug, Clone)]
pub struct GradeItem {
    pub id: i64,
    pub course_id: i64,
    pub category_id: Option<i64>,
    pub item_instance: Option<i64>,
    pub item_type: ItemType,
    pub item_name: String,
    /// Optional formula. May embed references to other grade items as
    /// `##gi<id>##` tokens.
    pub calculation: Option<String>,
    pub scale_id: Option<i64>,
    pub sort_order: i64,
}

/// An ordered list of textual grade labels usable instead of numeric scores.
#[derive(Debug, Clone)]
pub struct Scale {
    pub id: i64,
    pub course_id: i64,
    pub name: String,
    pub labels: Vec<String>,
}

impl Scale {
    /// Comma-joined label list, the format of the `scales.labels` column.
    pub fn labels_to_sql(&self) -> String {
        self.labels.join(",")
    }

    pub fn labels_from_sql(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// A boundary-to-letter mapping, scoped to a course context.
#[derive(Debug, Clone)]
pub struct GradeLetter {
    pub id: i64,
    pub context_id: i64,
    pub lower_boundary: f64,
    pub letter: String,
}

/// Source-id to destination-id mappings accumulated during one clone run.
/// Owned by that run and threaded through explicitly; entries are only ever
/// added, never removed.
#[derive(Debug, Default)]
pub struct IdentifierMap {
    pub categories: HashMap<i64, i64>,
    pub items: HashMap<i64, i64>,
    pub scales: HashMap<i64, i64>,
    pub letters: HashMap<i64, i64>,
}
