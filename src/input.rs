use crate::Error;
use std::{collections::HashSet, fs, path::Path};

/// The deduplicated contents of a users file, with the counts needed for the
/// run transcript.
#[derive(Debug)]
pub struct UserList {
    /// Unique ids in first-occurrence order.
    pub ids: Vec<String>,
    /// Non-blank lines read from the file, duplicates included.
    pub total_read: usize,
    /// How many duplicate lines were discarded.
    pub duplicates: usize,
}

/// Read user ids from a newline-delimited file. Lines are trimmed, blank
/// lines are skipped, and duplicates are dropped while preserving the order
/// the ids first appeared in.
pub fn load_user_ids(path: impl AsRef<Path>) -> Result<UserList, Error> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::MissingInput(path.to_owned()));
    }
    let contents = fs::read_to_string(path)?;
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let mut total_read = 0;
    for line in contents.lines() {
        let id = line.trim();
        if id.is_empty() {
            continue;
        }
        total_read += 1;
        if seen.insert(id.to_owned()) {
            ids.push(id.to_owned());
        }
    }
    if ids.is_empty() {
        return Err(Error::EmptyInput(path.to_owned()));
    }
    Ok(UserList {
        duplicates: total_read - ids.len(),
        total_read,
        ids,
    })
}
