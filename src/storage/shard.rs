//! Shard path derivation for task directories.
//!
//! A task directory lives at
//! `<cm_outputs_root>/<cm_name>/<s1>/<s2>/.../<sN>/<task_id>` where each `sK`
//! is the K-th group of `width` hex digits taken from the start of the task
//! id (hyphens skipped). Tasks with unrelated ids land in different subtrees,
//! so no directory ever lists more than `16^width` shard siblings.

use std::path::PathBuf;

use crate::naming::{NamingError, TaskLayer};

/// Splits the leading hex digits of `task_id` into `depth` groups of `width`.
///
/// Groups are lower-cased so that the same id always maps to the same path
/// regardless of how the engine cased it.
///
/// # Errors
///
/// [`NamingError::InvalidTaskId`] when the id carries fewer than
/// `depth * width` hex digits, [`NamingError::InvalidSharding`] when either
/// parameter is zero or their product overflows.
///
/// # Examples
///
/// ```
/// use cm_orchestrator::storage::shard::shard_groups;
///
/// let groups = shard_groups("01234567-0000-0000-0000-000000000000", 4, 2).unwrap();
/// assert_eq!(groups, vec!["01", "23", "45", "67"]);
/// ```
pub fn shard_groups(task_id: &str, depth: usize, width: usize) -> Result<Vec<String>, NamingError> {
    let needed = depth
        .checked_mul(width)
        .filter(|_| depth > 0 && width > 0)
        .ok_or(NamingError::InvalidSharding { depth, width })?;

    let digits: Vec<char> = task_id
        .chars()
        .filter(|c| *c != '-')
        .take(needed)
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if digits.len() < needed || !digits.iter().all(char::is_ascii_hexdigit) {
        return Err(NamingError::InvalidTaskId(task_id.to_string()));
    }

    Ok(digits
        .chunks(width)
        .map(|group| group.iter().collect())
        .collect())
}

/// Relative directory of a task below the CM outputs root.
pub fn task_relative_dir(
    task: &TaskLayer,
    depth: usize,
    width: usize,
) -> Result<PathBuf, NamingError> {
    let mut path = PathBuf::from(task.cm_name());
    for group in shard_groups(task.task_id(), depth, width)? {
        path.push(group);
    }
    path.push(task.task_id());
    Ok(path)
}
