
use gradeclone::clone::{clone_tree, DestinationPolicy};
use gradeclone::store::SqliteStore;
use test_support::{category_count, item_count, open_workspace, seed_category, seed_item};

#[test]
fn manual_items_follow_their_category() {
    let conn = open_workspace("gradeclone-manual");

    seed_category(&conn, 1, 1, None, "Course root", "/1", 1, 1);
    seed_category(&conn, 2, 1, Some(1), "Homework", "/1/2", 2, 2);
    seed_item(&conn, 11, 1, None, Some(1), "course", "Course total", None, None, 1);
    seed_item(&conn, 12, 1, None, Some(2), "category", "Homework total", None, None, 2);
    seed_item(&conn, 50, 1, Some(2), None, "manual", "Essay", None, None, 3);

    let mut store = SqliteStore::new(&conn);
    let map = clone_tree(&mut store, 1, 2, DestinationPolicy::Replace).expect("clone");

    // Two categories, three items: course item, category item, manual item.
    assert_eq!(category_count(&conn, 2), 2);
    assert_eq!(item_count(&conn, 2), 3);

    let new_child = map.categories[&2];
    let new_manual = map.items[&50];
    let (category_id, item_instance, item_type, sort_order): (Option<i64>, Option<i64>, String, i64) =
        conn.query_row(
            "SELECT category_id, item_instance, item_type, sort_order
             FROM grade_items WHERE id = ?",
            [new_manual],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .expect("cloned manual item");
    assert_eq!(category_id, Some(new_child));
    assert_eq!(item_instance, None);
    assert_eq!(item_type, "manual");
    assert_eq!(sort_order, 3);

    // The category items hang off the new categories, not the old ones.
    let course_instance: Option<i64> = conn
        .query_row(
            "SELECT item_instance FROM grade_items WHERE id = ?",
            [map.items[&11]],
            |r| r.get(0),
        )
        .expect("course item");
    assert_eq!(course_instance, Some(map.categories[&1]));
    let child_instance: Option<i64> = conn
        .query_row(
            "SELECT item_instance FROM grade_items WHERE id = ?",
            [map.items[&12]],
            |r| r.get(0),
        )
        .expect("category item");
    assert_eq!(child_instance, Some(new_child));

    // Every newly cloned category item is flagged for regrading.
    let flagged: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM grade_items
             WHERE course_id = 2 AND item_type IN ('course', 'category') AND needs_update = 1",
            [],
            |r| r.get(0),
        )
        .expect("needs_update count");
    assert_eq!(flagged, 2);
}
