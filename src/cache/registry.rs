//! Tag index.
//!
//! Holds non-owning back-references from invalidation tags to the cache keys
//! that declared them, plus the reverse mapping so an evicted key can be
//! pruned. Entry existence is always decided by the store, never here.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::keys::{CacheKey, Tag};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::registry";

/// Tracks tag → cache keys and cache key → tags mappings.
pub struct TagIndex {
    tag_to_keys: RwLock<HashMap<Tag, HashSet<CacheKey>>>,
    key_to_tags: RwLock<HashMap<CacheKey, HashSet<Tag>>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self {
            tag_to_keys: RwLock::new(HashMap::new()),
            key_to_tags: RwLock::new(HashMap::new()),
        }
    }

    /// Record that `key` depends on `tag`. Existing registrations are kept.
    pub fn register_dependency(&self, tag: Tag, key: CacheKey) {
        let mut t2k = rw_write(&self.tag_to_keys, SOURCE, "register_dependency");
        let mut k2t = rw_write(&self.key_to_tags, SOURCE, "register_dependency");

        t2k.entry(tag.clone()).or_default().insert(key.clone());
        k2t.entry(key).or_default().insert(tag);
    }

    /// Replace the full tag set of `key`.
    ///
    /// Used when a resolution produces a new provided set; tags the key no
    /// longer provides stop reaching it.
    pub fn register(&self, key: CacheKey, tags: HashSet<Tag>) {
        let mut t2k = rw_write(&self.tag_to_keys, SOURCE, "register");
        let mut k2t = rw_write(&self.key_to_tags, SOURCE, "register");

        if let Some(previous) = k2t.remove(&key) {
            for tag in previous.difference(&tags) {
                detach(&mut t2k, tag, &key);
            }
        }
        for tag in &tags {
            t2k.entry(tag.clone()).or_default().insert(key.clone());
        }
        k2t.insert(key, tags);
    }

    /// Keys reached by invalidating `tag`.
    ///
    /// A scoped tag reaches keys registered under exactly that tag. A coarse
    /// tag reaches keys registered under any tag of the same kind.
    pub fn keys_for_tag(&self, tag: &Tag) -> HashSet<CacheKey> {
        let t2k = rw_read(&self.tag_to_keys, SOURCE, "keys_for_tag");
        if !tag.is_coarse() {
            return t2k.get(tag).cloned().unwrap_or_default();
        }

        t2k.iter()
            .filter(|(registered, _)| tag.covers(registered))
            .flat_map(|(_, keys)| keys.iter().cloned())
            .collect()
    }

    /// Union of [`keys_for_tag`](Self::keys_for_tag) over `tags`.
    pub fn keys_for_tags<'a>(&self, tags: impl IntoIterator<Item = &'a Tag>) -> HashSet<CacheKey> {
        let mut keys = HashSet::new();
        for tag in tags {
            keys.extend(self.keys_for_tag(tag));
        }
        keys
    }

    pub fn tags_for_key(&self, key: &CacheKey) -> HashSet<Tag> {
        rw_read(&self.key_to_tags, SOURCE, "tags_for_key")
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove every registration of `key`. Called on eviction.
    pub fn prune(&self, key: &CacheKey) {
        let mut t2k = rw_write(&self.tag_to_keys, SOURCE, "prune");
        let mut k2t = rw_write(&self.key_to_tags, SOURCE, "prune");

        if let Some(tags) = k2t.remove(key) {
            for tag in &tags {
                detach(&mut t2k, tag, key);
            }
        }
    }

    pub fn clear(&self) {
        rw_write(&self.tag_to_keys, SOURCE, "clear").clear();
        rw_write(&self.key_to_tags, SOURCE, "clear").clear();
    }

    /// Number of distinct tags with at least one registered key.
    pub fn tag_count(&self) -> usize {
        rw_read(&self.tag_to_keys, SOURCE, "tag_count").len()
    }

    /// Number of keys with at least one registered tag.
    pub fn key_count(&self) -> usize {
        rw_read(&self.key_to_tags, SOURCE, "key_count").len()
    }
}

impl Default for TagIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn detach(t2k: &mut HashMap<Tag, HashSet<CacheKey>>, tag: &Tag, key: &CacheKey) {
    if let Some(keys) = t2k.get_mut(tag) {
        keys.remove(key);
        if keys.is_empty() {
            t2k.remove(tag);
        }
    }
}
