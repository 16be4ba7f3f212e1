use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Outcome of a state lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lookup<S> {
    /// The flow is not in the filter, or the evidence contradicts membership.
    Absent,
    /// Exactly one state is consistent with the filter contents.
    State(S),
    /// Several states are consistent; the true one cannot be recovered.
    DontKnow,
}

impl<S> Lookup<S> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Lookup::Absent)
    }

    pub fn is_dont_know(&self) -> bool {
        matches!(self, Lookup::DontKnow)
    }

    pub fn state(&self) -> Option<&S> {
        match self {
            Lookup::State(state) => Some(state),
            _ => None,
        }
    }

    pub fn into_state(self) -> Option<S> {
        match self {
            Lookup::State(state) => Some(state),
            _ => None,
        }
    }
}

/// The four per-packet operations every stateful filter exposes.
///
/// `lookup_entry` takes `&mut self`: reading a flow refreshes its aging bit,
/// and every call advances the filter's aging clock.
pub trait StatefulFilter<K: ?Sized, S> {
    /// Records `flow` in `state`. Fails only on capacity overflow.
    fn insert_entry(&mut self, flow: &K, state: S) -> Result<()>;

    /// Moves `flow` to `new_state`. Returns `false` when no previous entry for
    /// the flow was found.
    fn modify_entry(&mut self, flow: &K, new_state: S) -> Result<bool>;

    fn lookup_entry(&mut self, flow: &K) -> Lookup<S>;

    /// Removes `flow`, returning how many entries (or cell groups) were
    /// removed. Zero means there was nothing to delete.
    fn delete_entry(&mut self, flow: &K) -> usize;
}

/// Size and occupancy figures reported by every filter.
pub trait FilterStats {
    /// Memory used by the table payload, in bits.
    fn memory_bits(&self) -> usize;

    /// Number of occupied slots (non-zero cells or stored entries).
    fn occupied(&self) -> usize;

    /// Total number of slots available.
    fn slots(&self) -> usize;

    fn utilization(&self) -> f64 {
        if self.slots() == 0 {
            0.0
        } else {
            self.occupied() as f64 / self.slots() as f64
        }
    }

    /// Operations left before the next full aging sweep.
    fn operations_until_sweep(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_accessors() {
        let found: Lookup<u8> = Lookup::State(3);
        assert_eq!(found.state(), Some(&3));
        assert!(!found.is_absent());
        assert!(!found.is_dont_know());
        assert_eq!(found.into_state(), Some(3));

        let absent: Lookup<u8> = Lookup::Absent;
        assert!(absent.is_absent());
        assert_eq!(absent.state(), None);

        let idk: Lookup<u8> = Lookup::DontKnow;
        assert!(idk.is_dont_know());
        assert_eq!(idk.into_state(), None);
    }
}
