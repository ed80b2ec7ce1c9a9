use std::collections::HashMap;

/// Map with case-insensitive string keys. Keys are stored lowercased for
/// lookup; the original spelling of the first insertion is preserved and can
/// be recovered via [`CaseInsensitiveMap::original_key`].
#[derive(Debug, Clone)]
pub struct CaseInsensitiveMap<V> {
    entries: HashMap<String, (String, V)>,
}

impl<V> Default for CaseInsensitiveMap<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V> CaseInsensitiveMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing (and returning) any value stored under a
    /// case-insensitive match of `key`. The original case of the replaced
    /// key is dropped in favour of the new spelling.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        self.entries
            .insert(key.to_lowercase(), (key, value))
            .map(|(_, v)| v)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(&key.to_lowercase()).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries.get_mut(&key.to_lowercase()).map(|(_, v)| v)
    }

    /// The spelling under which a matching key was first inserted.
    pub fn original_key(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_lowercase())
            .map(|(k, _)| k.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_lowercase())
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(&key.to_lowercase()).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(original_key, value)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut map = CaseInsensitiveMap::new();
        assert!(map.insert("Customer", 0).is_none());
        assert_eq!(map.get("customer"), Some(&0));
        assert_eq!(map.get("CUSTOMER"), Some(&0));
        assert_eq!(map.original_key("cUsToMeR"), Some("Customer"));
        assert!(map.get("customers").is_none());
    }

    #[test]
    fn test_replace_keeps_last_spelling() {
        let mut map = CaseInsensitiveMap::new();
        map.insert("a", 1);
        assert_eq!(map.insert("A", 2), Some(1));
        assert_eq!(map.len(), 1);
        assert_eq!(map.original_key("a"), Some("A"));
        assert_eq!(map.get("a"), Some(&2));
    }
}
