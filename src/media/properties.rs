//! Versioned stream properties
//!
//! Keys are dotted paths. A bare key is stream-global; `<track>.<name>`
//! scopes a value to one track (`1.audioLang`). Every effective change bumps
//! [`Properties::version`] so writers can diff lazily.

use std::collections::BTreeMap;

/// Ordered string dictionary with a change counter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, String>,
    version: u32,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic change counter (wraps)
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Parse a value as a number, ignoring malformed entries
    pub fn get_number<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    /// Set a value. Returns false when the value was already there.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        let value = value.into();
        if self.values.get(&key) == Some(&value) {
            return false;
        }
        self.values.insert(key, value);
        self.bump();
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let old = self.values.remove(key);
        if old.is_some() {
            self.bump();
        }
        old
    }

    /// Remove everything. Returns the removed keys.
    pub fn clear(&mut self) -> Vec<String> {
        if self.values.is_empty() {
            return Vec::new();
        }
        let keys = std::mem::take(&mut self.values).into_keys().collect();
        self.bump();
        keys
    }

    /// Replace all values at once (one version bump)
    pub fn set_all<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values: BTreeMap<String, String> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if values != self.values {
            self.values = values;
            self.bump();
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn bump(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

/// Split a track-scoped key into `(track, name)`.
///
/// `"1.audioLang"` gives `Some((1, "audioLang"))`; a bare key or a prefix
/// that is not a track number gives `None`.
pub fn split_track(key: &str) -> Option<(u8, &str)> {
    let (prefix, name) = key.split_once('.')?;
    let track = prefix.parse().ok()?;
    Some((track, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_bumps_only_on_change() {
        let mut props = Properties::new();
        assert_eq!(props.version(), 0);

        assert!(props.set("title", "live"));
        assert_eq!(props.version(), 1);

        assert!(!props.set("title", "live"));
        assert_eq!(props.version(), 1);

        props.remove("missing");
        assert_eq!(props.version(), 1);

        props.remove("title");
        assert_eq!(props.version(), 2);
    }

    #[test]
    fn test_clear_returns_keys() {
        let mut props = Properties::new();
        props.set("a", "1");
        props.set("1.audioLang", "fr");
        let keys = props.clear();
        assert_eq!(keys, vec!["1.audioLang".to_string(), "a".to_string()]);
        assert!(props.is_empty());
        assert!(props.clear().is_empty());
    }

    #[test]
    fn test_set_all_single_bump() {
        let mut props = Properties::new();
        props.set_all([("a", "1"), ("b", "2")]);
        assert_eq!(props.version(), 1);
        props.set_all([("a", "1"), ("b", "2")]);
        assert_eq!(props.version(), 1);
        assert_eq!(props.get("b"), Some("2"));
    }

    #[test]
    fn test_get_number() {
        let mut props = Properties::new();
        props.set("segments", "5");
        props.set("duration", "abc");
        assert_eq!(props.get_number::<u32>("segments"), Some(5));
        assert_eq!(props.get_number::<u32>("duration"), None);
    }

    #[test]
    fn test_split_track() {
        assert_eq!(split_track("1.audioLang"), Some((1, "audioLang")));
        assert_eq!(split_track("12.textLang"), Some((12, "textLang")));
        assert_eq!(split_track("audioLang"), None);
        assert_eq!(split_track("x.audioLang"), None);
    }
}
