//! Channels this process spawned and is therefore allowed to delete.

use std::collections::BTreeSet;

use parking_lot::Mutex;

#[derive(Default)]
pub struct GeneratedChannelRegistry {
    channels: Mutex<BTreeSet<String>>,
}

impl GeneratedChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the channel was already tracked.
    pub fn insert(&self, channel_id: &str) -> bool {
        self.channels.lock().insert(channel_id.to_string())
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.channels.lock().contains(channel_id)
    }

    pub fn remove(&self, channel_id: &str) -> bool {
        self.channels.lock().remove(channel_id)
    }

    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.channels.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_contains_remove() {
        let reg = GeneratedChannelRegistry::new();
        assert!(reg.is_empty());
        assert!(reg.insert("c1"));
        assert!(!reg.insert("c1"));
        assert!(reg.contains("c1"));
        assert_eq!(reg.len(), 1);
        assert!(reg.remove("c1"));
        assert!(!reg.remove("c1"));
        assert!(!reg.contains("c1"));
    }
}
