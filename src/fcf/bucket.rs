use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketEntry<S> {
    pub touched: bool,
    pub fingerprint: u64,
    pub state: S,
}

/// Ordered list of entries, oldest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket<S> {
    entries: Vec<BucketEntry<S>>,
}

impl<S> Default for Bucket<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<S> Bucket<S> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BucketEntry<S>] {
        &self.entries
    }

    pub(crate) fn push(&mut self, fingerprint: u64, state: S) {
        self.entries.push(BucketEntry {
            touched: true,
            fingerprint,
            state,
        });
    }

    pub(crate) fn matching_mut(
        &mut self,
        fingerprint: u64,
    ) -> impl Iterator<Item = &mut BucketEntry<S>> {
        self.entries
            .iter_mut()
            .filter(move |entry| entry.fingerprint == fingerprint)
    }

    /// Removes entries accepted by `pred`, returning how many went.
    pub(crate) fn remove_where<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&BucketEntry<S>) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|entry| !pred(entry));
        before - self.entries.len()
    }

    pub(crate) fn evict_oldest(&mut self) -> Option<BucketEntry<S>> {
        if self.entries.is_empty() {
            return None;
        }
        let victim = self
            .entries
            .iter()
            .position(|entry| !entry.touched)
            .unwrap_or(0);
        Some(self.entries.remove(victim))
    }

    /// Keeps touched entries (clearing their flag) and drops the rest.
    /// Returns the number of evicted entries.
    pub(crate) fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain_mut(|entry| {
            let keep = entry.touched;
            entry.touched = false;
            keep
        });
        before - self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
