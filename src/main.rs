use anyhow::Result;
use clap::Parser;
use gradeclone::clone::{clone_tree, DestinationPolicy};
use gradeclone::db;
use gradeclone::store::SqliteStore;
use std::path::Path;

/// Clone a course's grading structure (categories, grade items, scales and
/// letter grades) onto another course, replacing the destination's gradebook.
#[derive(Parser)]
#[command(name = "gradeclone")]
struct Cli {
    /// Course to copy the grading structure from.
    origin_course_id: i64,
    /// Course receiving the clone. Its current gradebook is replaced.
    destination_course_id: i64,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.origin_course_id <= 0 || cli.destination_course_id <= 0 {
        anyhow::bail!("course ids must be positive integers");
    }

    let conn = db::open_db(Path::new("."))?;
    let mut store = SqliteStore::new(&conn);
    clone_tree(
        &mut store,
        cli.origin_course_id,
        cli.destination_course_id,
        DestinationPolicy::Replace,
    )?;
    Ok(())
}
