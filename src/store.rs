use crate::model::{CategoryNode, GradeItem, GradeLetter, ItemType, Scale};
use anyhow::{bail, Result};
use rusqlite::{Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};

/// Persistence boundary for the gradebook. The clone run only ever talks to
/// this trait, so tests and alternative backends can stand in for the real
/// store.
pub trait GradeStore {
    fn fetch_all_categories(&self, course_id: i64) -> Result<Vec<CategoryNode>>;
    fn fetch_course_root(&self, course_id: i64) -> Result<Option<CategoryNode>>;
    fn fetch_children(&self, category_id: i64) -> Result<Vec<CategoryNode>>;
    /// The course- or category-type item representing a category, if any.
    fn fetch_category_item(&self, category_id: i64) -> Result<Option<GradeItem>>;
    /// Manual items directly owned by a category.
    fn fetch_manual_items(&self, category_id: i64) -> Result<Vec<GradeItem>>;
    fn fetch_course_items(&self, course_id: i64) -> Result<Vec<GradeItem>>;
    fn insert_category(&mut self, node: &CategoryNode) -> Result<i64>;
    /// Inserts the item at the end of the course's sort sequence, ignoring
    /// the passed `sort_order`. Callers that need parity with a source item
    /// re-apply the original order with `update_item` afterwards.
    fn insert_item(&mut self, item: &GradeItem) -> Result<i64>;
    fn update_category(&mut self, node: &CategoryNode) -> Result<()>;
    fn update_item(&mut self, item: &GradeItem) -> Result<()>;
    /// Removes every category and grade item of a course.
    fn delete_all_categories(&mut self, course_id: i64) -> Result<()>;
    fn delete_scales(&mut self, course_id: i64) -> Result<()>;
    fn delete_letters(&mut self, course_id: i64) -> Result<()>;
    /// Copies the source course's scales into the destination, returning
    /// the old-id to new-id map. Existing destination rows are left alone;
    /// callers wanting a clean slate delete first.
    fn copy_scales(&mut self, src_course: i64, dst_course: i64) -> Result<HashMap<i64, i64>>;
    /// Same as `copy_scales`, for letter grades. Rows are copied in
    /// descending boundary order.
    fn copy_letters(&mut self, src_course: i64, dst_course: i64) -> Result<HashMap<i64, i64>>;
    /// Recomputes `path` and `depth` from the stored parent chain. The node
    /// must already carry its final `id` and `parent_id`.
    fn build_path(&self, node: &mut CategoryNode) -> Result<()>;
    /// Marks the item so the next grading pass recalculates it. Callers
    /// treat failures as advisory.
    fn trigger_regrade(&mut self, item_id: i64) -> Result<()>;
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        SqliteStore { conn }
    }
}

const CATEGORY_COLUMNS: &str = "id, parent_id, course_id, full_name, path, depth, sort_order, \
     hidden, item_type, time_created, time_modified";

const ITEM_COLUMNS: &str =
    "id, course_id, category_id, item_instance, item_type, item_name, calculation, scale_id, \
     sort_order";

fn item_type_from_sql(raw: &str) -> rusqlite::Result<ItemType> {
    ItemType::parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown item type {:?}", raw).into(),
        )
    })
}

fn category_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CategoryNode> {
    let item_type: String = row.get(8)?;
    Ok(CategoryNode {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        course_id: row.get(2)?,
        full_name: row.get(3)?,
        path: row.get(4)?,
        depth: row.get(5)?,
        sort_order: row.get(6)?,
        hidden: row.get::<_, i64>(7)? != 0,
        item_type: item_type_from_sql(&item_type)?,
        time_created: row.get(9)?,
        time_modified: row.get(10)?,
    })
}

fn scale_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Scale> {
    let labels: String = row.get(3)?;
    Ok(Scale {
        id: row.get(0)?,
        course_id: row.get(1)?,
        name: row.get(2)?,
        labels: Scale::labels_from_sql(&labels),
    })
}

fn letter_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GradeLetter> {
    Ok(GradeLetter {
        id: row.get(0)?,
        context_id: row.get(1)?,
        lower_boundary: row.get(2)?,
        letter: row.get(3)?,
    })
}

fn item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GradeItem> {
    let item_type: String = row.get(4)?;
    Ok(GradeItem {
        id: row.get(0)?,
        course_id: row.get(1)?,
        category_id: row.get(2)?,
        item_instance: row.get(3)?,
        item_type: item_type_from_sql(&item_type)?,
        item_name: row.get(5)?,
        calculation: row.get(6)?,
        scale_id: row.get(7)?,
        sort_order: row.get(8)?,
    })
}

impl GradeStore for SqliteStore<'_> {
    fn fetch_all_categories(&self, course_id: i64) -> Result<Vec<CategoryNode>> {
        let sql = format!(
            "SELECT {} FROM grade_categories WHERE course_id = ? ORDER BY sort_order, id",
            CATEGORY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([course_id], category_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn fetch_course_root(&self, course_id: i64) -> Result<Option<CategoryNode>> {
        let sql = format!(
            "SELECT {} FROM grade_categories WHERE course_id = ? AND parent_id IS NULL",
            CATEGORY_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, [course_id], category_from_row)
            .optional()?;
        Ok(row)
    }

    fn fetch_children(&self, category_id: i64) -> Result<Vec<CategoryNode>> {
        let sql = format!(
            "SELECT {} FROM grade_categories WHERE parent_id = ? ORDER BY sort_order, id",
            CATEGORY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([category_id], category_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn fetch_category_item(&self, category_id: i64) -> Result<Option<GradeItem>> {
        let sql = format!(
            "SELECT {} FROM grade_items
             WHERE item_instance = ? AND item_type IN ('course', 'category')",
            ITEM_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, [category_id], item_from_row)
            .optional()?;
        Ok(row)
    }

    fn fetch_manual_items(&self, category_id: i64) -> Result<Vec<GradeItem>> {
        let sql = format!(
            "SELECT {} FROM grade_items
             WHERE category_id = ? AND item_type = 'manual'
             ORDER BY sort_order, id",
            ITEM_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([category_id], item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn fetch_course_items(&self, course_id: i64) -> Result<Vec<GradeItem>> {
        let sql = format!(
            "SELECT {} FROM grade_items WHERE course_id = ? ORDER BY sort_order, id",
            ITEM_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([course_id], item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_category(&mut self, node: &CategoryNode) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO grade_categories(
                course_id, parent_id, full_name, path, depth, sort_order,
                hidden, item_type, time_created, time_modified
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                node.course_id,
                node.parent_id,
                &node.full_name,
                &node.path,
                node.depth,
                node.sort_order,
                node.hidden as i64,
                node.item_type.as_str(),
                node.time_created,
                node.time_modified,
            ),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_item(&mut self, item: &GradeItem) -> Result<i64> {
        let next_sort: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(sort_order), 0) + 1 FROM grade_items WHERE course_id = ?",
            [item.course_id],
            |r| r.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO grade_items(
                course_id, category_id, item_instance, item_type, item_name,
                calculation, scale_id, sort_order
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                item.course_id,
                item.category_id,
                item.item_instance,
                item.item_type.as_str(),
                &item.item_name,
                &item.calculation,
                item.scale_id,
                next_sort,
            ),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_category(&mut self, node: &CategoryNode) -> Result<()> {
        self.conn.execute(
            "UPDATE grade_categories SET
                course_id = ?, parent_id = ?, full_name = ?, path = ?, depth = ?,
                sort_order = ?, hidden = ?, item_type = ?, time_modified = ?
             WHERE id = ?",
            (
                node.course_id,
                node.parent_id,
                &node.full_name,
                &node.path,
                node.depth,
                node.sort_order,
                node.hidden as i64,
                node.item_type.as_str(),
                node.time_modified,
                node.id,
            ),
        )?;
        Ok(())
    }

    fn update_item(&mut self, item: &GradeItem) -> Result<()> {
        self.conn.execute(
            "UPDATE grade_items SET
                course_id = ?, category_id = ?, item_instance = ?, item_type = ?,
                item_name = ?, calculation = ?, scale_id = ?, sort_order = ?
             WHERE id = ?",
            (
                item.course_id,
                item.category_id,
                item.item_instance,
                item.item_type.as_str(),
                &item.item_name,
                &item.calculation,
                item.scale_id,
                item.sort_order,
                item.id,
            ),
        )?;
        Ok(())
    }

    fn delete_all_categories(&mut self, course_id: i64) -> Result<()> {
        // Items first; they hold FKs into grade_categories.
        self.conn
            .execute("DELETE FROM grade_items WHERE course_id = ?", [course_id])?;
        self.conn.execute(
            "DELETE FROM grade_categories WHERE course_id = ?",
            [course_id],
        )?;
        Ok(())
    }

    fn delete_scales(&mut self, course_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM scales WHERE course_id = ?", [course_id])?;
        Ok(())
    }

    fn delete_letters(&mut self, course_id: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM grade_letters WHERE context_id = ?",
            [course_id],
        )?;
        Ok(())
    }

    fn copy_scales(&mut self, src_course: i64, dst_course: i64) -> Result<HashMap<i64, i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, course_id, name, labels FROM scales WHERE course_id = ? ORDER BY id",
        )?;
        let scales = stmt
            .query_map([src_course], scale_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut map = HashMap::new();
        for scale in scales {
            self.conn.execute(
                "INSERT INTO scales(course_id, name, labels) VALUES(?, ?, ?)",
                (dst_course, &scale.name, scale.labels_to_sql()),
            )?;
            map.insert(scale.id, self.conn.last_insert_rowid());
        }
        Ok(map)
    }

    fn copy_letters(&mut self, src_course: i64, dst_course: i64) -> Result<HashMap<i64, i64>> {
        // Descending boundary keeps insertion order stable and readable when
        // inspecting the copied rows; it has no semantic effect.
        let mut stmt = self.conn.prepare(
            "SELECT id, context_id, lower_boundary, letter FROM grade_letters
             WHERE context_id = ? ORDER BY lower_boundary DESC",
        )?;
        let letters = stmt
            .query_map([src_course], letter_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut map = HashMap::new();
        for letter in letters {
            self.conn.execute(
                "INSERT INTO grade_letters(context_id, lower_boundary, letter) VALUES(?, ?, ?)",
                (dst_course, letter.lower_boundary, &letter.letter),
            )?;
            map.insert(letter.id, self.conn.last_insert_rowid());
        }
        Ok(map)
    }

    fn build_path(&self, node: &mut CategoryNode) -> Result<()> {
        let mut components = vec![node.id];
        let mut seen: HashSet<i64> = components.iter().copied().collect();
        let mut parent = node.parent_id;
        while let Some(pid) = parent {
            if !seen.insert(pid) {
                bail!("cycle in parent chain at category {}", pid);
            }
            components.push(pid);
            parent = self.conn.query_row(
                "SELECT parent_id FROM grade_categories WHERE id = ?",
                [pid],
                |r| r.get::<_, Option<i64>>(0),
            )?;
        }
        components.reverse();
        node.depth = components.len() as i64;
        node.path = components.iter().map(|id| format!("/{}", id)).collect();
        Ok(())
    }

    fn trigger_regrade(&mut self, item_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE grade_items SET needs_update = 1 WHERE id = ?",
            [item_id],
        )?;
        Ok(())
    }
}
