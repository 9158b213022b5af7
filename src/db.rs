use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("gradebook.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // AUTOINCREMENT keeps ids freed by a reset from being handed out again;
    // cloned rows must always get ids no earlier row ever had.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_categories(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_id INTEGER NOT NULL,
            parent_id INTEGER,
            full_name TEXT NOT NULL,
            path TEXT NOT NULL DEFAULT '',
            depth INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL DEFAULT 0,
            hidden INTEGER NOT NULL DEFAULT 0,
            item_type TEXT NOT NULL,
            time_created INTEGER NOT NULL,
            time_modified INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_categories_course ON grade_categories(course_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_categories_parent ON grade_categories(parent_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_items(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_id INTEGER NOT NULL,
            category_id INTEGER,
            item_instance INTEGER,
            item_type TEXT NOT NULL,
            item_name TEXT NOT NULL DEFAULT '',
            calculation TEXT,
            scale_id INTEGER,
            sort_order INTEGER NOT NULL DEFAULT 0,
            needs_update INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(category_id) REFERENCES grade_categories(id),
            FOREIGN KEY(item_instance) REFERENCES grade_categories(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_items_course ON grade_items(course_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_items_category ON grade_items(category_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_items_instance ON grade_items(item_instance)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scales(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            labels TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scales_course ON scales(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_letters(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            context_id INTEGER NOT NULL,
            lower_boundary REAL NOT NULL,
            letter TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_letters_context ON grade_letters(context_id)",
        [],
    )?;

    Ok(conn)
}
