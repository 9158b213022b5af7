use crate::model::{CategoryNode, IdentifierMap, ItemType};
use crate::store::GradeStore;
use chrono::Utc;
use log::{info, warn};
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloneError {
    #[error("no root category found for course {0}")]
    MissingRoot(i64),
    #[error("cloned category has no course attached")]
    MissingCourse,
    #[error("no destination mapping for source parent category {0}")]
    MissingParentMapping(i64),
    #[error("item {item_id} references scale {scale_id}, which has no destination mapping")]
    MissingScaleMapping { scale_id: i64, item_id: i64 },
    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

/// What happens to the destination course's existing gradebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationPolicy {
    /// Delete every destination category and item before cloning.
    Replace,
    /// Keep the previous destination root and re-attach it under the fresh
    /// root as a hidden "Old course root" category. Existing destination
    /// scales and letters survive too, so the preserved items keep valid
    /// references; the source's copies are added alongside them.
    AttachOldRoot,
}

/// Clones the grading structure of `origin` onto `destination`: scales and
/// letter grades first, then a breadth-first walk of the category tree that
/// creates a remapped copy of every node and its items, then a fixup pass
/// that rewrites formula references and scale ids.
///
/// Writes are issued as they happen; a failure mid-run leaves the
/// destination partially cloned with no rollback.
pub fn clone_tree(
    store: &mut dyn GradeStore,
    origin: i64,
    destination: i64,
    policy: DestinationPolicy,
) -> Result<IdentifierMap, CloneError> {
    if origin <= 0 || destination <= 0 {
        return Err(CloneError::MissingCourse);
    }

    // Validate the source before touching the destination, so a missing root
    // never costs the destination its existing gradebook.
    let categories = store.fetch_all_categories(origin)?;
    let root = categories
        .iter()
        .find(|c| c.parent_id.is_none())
        .cloned()
        .ok_or(CloneError::MissingRoot(origin))?;

    let old_root = store.fetch_course_root(destination)?;

    if policy == DestinationPolicy::Replace {
        store.delete_all_categories(destination)?;
        store.delete_scales(destination)?;
        store.delete_letters(destination)?;
    }

    let mut map = IdentifierMap::default();
    map.scales = store.copy_scales(origin, destination)?;
    map.letters = store.copy_letters(origin, destination)?;

    // Breadth-first over the source tree. Parents are dequeued before their
    // children, so the parent remapping a node needs is always recorded by
    // the time the node is cloned. The visited set keeps the walk finite
    // even if corrupt data sneaks a duplicate parent link or cycle in.
    let mut queue: VecDeque<CategoryNode> = VecDeque::new();
    let mut visited: HashSet<i64> = HashSet::new();
    visited.insert(root.id);
    queue.push_back(root);

    let mut new_root_id = None;
    while let Some(current) = queue.pop_front() {
        info!("copying {}...", current.full_name);
        let new_id = clone_node(store, &current, destination, &mut map)?;
        if current.parent_id.is_none() {
            new_root_id = Some(new_id);
        }
        for child in store.fetch_children(current.id)? {
            if visited.insert(child.id) {
                queue.push_back(child);
            }
        }
    }

    if policy == DestinationPolicy::AttachOldRoot {
        if let (Some(old), Some(root_id)) = (old_root, new_root_id) {
            attach_old_root(store, old, root_id)?;
        }
    }

    fix_references(store, destination, &map)?;

    Ok(map)
}

/// Creates the destination copy of one source category and its grade items,
/// recording every new id in the map. Returns the new category id.
fn clone_node(
    store: &mut dyn GradeStore,
    source: &CategoryNode,
    destination_course: i64,
    map: &mut IdentifierMap,
) -> Result<i64, CloneError> {
    let mut node = source.clone();
    node.course_id = destination_course;
    node.path = String::new();
    node.depth = 0;
    let now = Utc::now().timestamp();
    node.time_created = now;
    node.time_modified = now;

    match source.parent_id {
        None => {
            node.parent_id = None;
            node.item_type = ItemType::Course;
        }
        Some(src_parent) => {
            let mapped = map
                .categories
                .get(&src_parent)
                .copied()
                .ok_or(CloneError::MissingParentMapping(src_parent))?;
            node.parent_id = Some(mapped);
            node.item_type = ItemType::Category;
        }
    }

    if node.course_id <= 0 {
        return Err(CloneError::MissingCourse);
    }

    // Path needs the new id, so insert first, then recompute and update.
    node.id = store.insert_category(&node)?;
    store.build_path(&mut node)?;
    store.update_category(&node)?;
    map.categories.insert(source.id, node.id);

    if let Some(src_item) = store.fetch_category_item(source.id)? {
        let mut item = src_item.clone();
        item.course_id = destination_course;
        item.item_instance = Some(node.id);
        item.category_id = None;
        item.item_type = node.item_type;
        item.id = store.insert_item(&item)?;
        map.items.insert(src_item.id, item.id);

        // insert_item appends at the end of the course's sort sequence;
        // re-apply the source order so both trees sort identically.
        item.sort_order = src_item.sort_order;
        store.update_item(&item)?;

        if let Err(e) = store.trigger_regrade(item.id) {
            warn!("regrade request for item {} failed: {}", item.id, e);
        }
    }

    for src_manual in store.fetch_manual_items(source.id)? {
        let mut item = src_manual.clone();
        item.course_id = destination_course;
        item.category_id = Some(node.id);
        item.item_instance = None;
        item.id = store.insert_item(&item)?;
        map.items.insert(src_manual.id, item.id);

        item.sort_order = src_manual.sort_order;
        store.update_item(&item)?;
    }

    Ok(node.id)
}

/// Demotes the previous destination root to a hidden child of the fresh
/// root, keeping its subtree reachable for manual review.
fn attach_old_root(
    store: &mut dyn GradeStore,
    mut old_root: CategoryNode,
    new_root_id: i64,
) -> Result<(), CloneError> {
    if let Some(mut item) = store.fetch_category_item(old_root.id)? {
        item.item_type = ItemType::Category;
        store.update_item(&item)?;
    }

    old_root.parent_id = Some(new_root_id);
    old_root.item_type = ItemType::Category;
    old_root.full_name = "Old course root".to_string();
    old_root.hidden = true;
    old_root.time_modified = Utc::now().timestamp();
    store.build_path(&mut old_root)?;
    store.update_category(&old_root)?;
    Ok(())
}

/// Post-traversal pass over the items created by this run: rewrites formula
/// tokens and scale ids through the map, persisting each changed item once.
fn fix_references(
    store: &mut dyn GradeStore,
    course_id: i64,
    map: &IdentifierMap,
) -> Result<(), CloneError> {
    let new_ids: HashSet<i64> = map.items.values().copied().collect();

    for mut item in store.fetch_course_items(course_id)? {
        // Items that predate this run (old-root subtree) keep their own
        // references; their targets still exist untouched.
        if !new_ids.contains(&item.id) {
            continue;
        }

        let mut dirty = false;

        if let Some(calculation) = item.calculation.as_deref() {
            let rewritten = rewrite_formula(calculation, &map.items);
            if rewritten != calculation {
                item.calculation = Some(rewritten);
                dirty = true;
            }
        }

        if let Some(old_scale) = item.scale_id {
            match map.scales.get(&old_scale) {
                Some(&new_scale) => {
                    if new_scale != old_scale {
                        item.scale_id = Some(new_scale);
                        dirty = true;
                    }
                }
                // A scale the copier never saw would leave the destination
                // grading against the wrong scale. Fail instead.
                None => {
                    return Err(CloneError::MissingScaleMapping {
                        scale_id: old_scale,
                        item_id: item.id,
                    })
                }
            }
        }

        if dirty {
            store.update_item(&item)?;
        }
    }

    Ok(())
}

fn formula_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"##gi(\d+)##").expect("valid token pattern"))
}

/// Rewrites every `##gi<id>##` token through the item map. Tokens without a
/// mapping are left untouched; they point outside the cloned tree and are
/// preserved for manual review.
pub fn rewrite_formula(calculation: &str, items: &HashMap<i64, i64>) -> String {
    formula_token_re()
        .replace_all(calculation, |caps: &Captures| {
            let mapped = caps[1]
                .parse::<i64>()
                .ok()
                .and_then(|id| items.get(&id).copied());
            match mapped {
                Some(new_id) => format!("##gi{}##", new_id),
                None => {
                    warn!("leaving unresolved grade item reference {}", &caps[0]);
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}
