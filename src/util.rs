use std::collections::{HashMap, HashSet};
use std::hash::BuildHasherDefault;

use fnv::FnvHasher;

pub type FnvHashMap<K, T> = HashMap<K, T, BuildHasherDefault<FnvHasher>>;
pub type FnvHashSet<K> = HashSet<K, BuildHasherDefault<FnvHasher>>;

/// Joins a relative path onto a location. rclone remotes such as `drive:`
/// are joined without a separator.
pub fn join_location(location: &str, path: &str) -> String {
    if path.is_empty() {
        location.to_owned()
    } else if location.is_empty() {
        path.to_owned()
    } else if location.ends_with(':') || location.ends_with('/') {
        format!("{}{}", location, path)
    } else {
        format!("{}/{}", location, path)
    }
}

/// The directory part of a slash separated relative path, `""` at the top level.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}
