
use gradeclone::clone::{clone_tree, DestinationPolicy};
use gradeclone::store::SqliteStore;
use test_support::{category_count, open_workspace, seed_category, seed_item, seed_scale};

#[test]
fn previous_root_is_kept_as_a_hidden_child() {
    let conn = open_workspace("gradeclone-attach");

    seed_category(&conn, 1, 1, None, "Course root", "/1", 1, 1);
    seed_category(&conn, 2, 1, Some(1), "Unit A", "/1/2", 2, 2);
    seed_item(&conn, 11, 1, None, Some(1), "course", "Course total", None, None, 1);
    seed_item(&conn, 12, 1, None, Some(2), "category", "Unit A total", None, None, 2);

    seed_category(&conn, 20, 2, None, "Old dest root", "/20", 1, 1);
    seed_item(&conn, 21, 2, None, Some(20), "course", "Old course total", None, None, 1);

    let mut store = SqliteStore::new(&conn);
    let map = clone_tree(&mut store, 1, 2, DestinationPolicy::AttachOldRoot).expect("clone");

    // Two cloned categories plus the preserved old root.
    assert_eq!(category_count(&conn, 2), 3);

    let new_root = map.categories[&1];
    let (parent_id, full_name, hidden, item_type, path, depth): (
        Option<i64>,
        String,
        i64,
        String,
        String,
        i64,
    ) = conn
        .query_row(
            "SELECT parent_id, full_name, hidden, item_type, path, depth
             FROM grade_categories WHERE id = 20",
            [],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                ))
            },
        )
        .expect("old root row");
    assert_eq!(parent_id, Some(new_root));
    assert_eq!(full_name, "Old course root");
    assert_eq!(hidden, 1);
    assert_eq!(item_type, "category");
    assert_eq!(path, format!("/{}/20", new_root));
    assert_eq!(depth, 2);

    // The old root's grade item is demoted from course to category type.
    let old_item_type: String = conn
        .query_row("SELECT item_type FROM grade_items WHERE id = 21", [], |r| {
            r.get(0)
        })
        .expect("old item type");
    assert_eq!(old_item_type, "category");

    // The fresh root is the course's only parentless category.
    let roots: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM grade_categories WHERE course_id = 2 AND parent_id IS NULL",
            [],
            |r| r.get(0),
        )
        .expect("root count");
    assert_eq!(roots, 1);
}

#[test]
fn preserved_items_keep_live_scale_rows() {
    let conn = open_workspace("gradeclone-attach-scales");

    seed_scale(&conn, 7, 1, "Competence", "Not yet,Almost,Competent");
    seed_category(&conn, 1, 1, None, "Course root", "/1", 1, 1);
    seed_item(&conn, 11, 1, None, Some(1), "course", "Course total", None, None, 1);
    seed_item(&conn, 12, 1, Some(1), None, "manual", "Lab", None, Some(7), 2);

    seed_scale(&conn, 40, 2, "Legacy", "Fail,Pass");
    seed_category(&conn, 20, 2, None, "Old dest root", "/20", 1, 1);
    seed_item(&conn, 21, 2, None, Some(20), "course", "Old course total", None, None, 1);
    seed_item(&conn, 22, 2, Some(20), None, "manual", "Old lab", None, Some(40), 2);

    let mut store = SqliteStore::new(&conn);
    let map = clone_tree(&mut store, 1, 2, DestinationPolicy::AttachOldRoot).expect("clone");

    // The preserved item still points at a scale row that exists.
    let kept_scale: Option<i64> = conn
        .query_row("SELECT scale_id FROM grade_items WHERE id = 22", [], |r| {
            r.get(0)
        })
        .expect("preserved item scale");
    assert_eq!(kept_scale, Some(40));
    let legacy_rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM scales WHERE id = 40", [], |r| {
            r.get(0)
        })
        .expect("legacy scale row");
    assert_eq!(legacy_rows, 1);

    // The source's scale arrived as a fresh copy alongside it.
    let new_scale = map.scales[&7];
    assert_ne!(new_scale, 40);
    let cloned_scale_id: Option<i64> = conn
        .query_row(
            "SELECT scale_id FROM grade_items WHERE id = ?",
            [map.items[&12]],
            |r| r.get(0),
        )
        .expect("cloned item scale");
    assert_eq!(cloned_scale_id, Some(new_scale));
    let dest_scales: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM scales WHERE course_id = 2",
            [],
            |r| r.get(0),
        )
        .expect("dest scale count");
    assert_eq!(dest_scales, 2);
}
