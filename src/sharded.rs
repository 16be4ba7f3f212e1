//! Key-hash sharding over independent filter instances.
//!
//! Each shard is a complete filter behind its own `Mutex`, so concurrent
//! callers only contend when their flows land on the same shard. Shards keep
//! their own aging clocks; nothing synchronizes sweeps across shards.
use crate::error::{FilterError, Result};
use crate::filter::{Lookup, StatefulFilter};
use crate::hash::HashFamily;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

/// Default seed of the routing hash. Keep it away from the shard filters'
/// seeds, otherwise a shard only ever sees flows whose first lookup digest
/// falls into one residue class.
pub const ROUTER_SEED: u32 = 0x9E37_79B9;

pub struct ShardedFilter<F> {
    router: HashFamily,
    shards: Vec<Mutex<F>>,
}

impl<F> ShardedFilter<F> {
    pub fn new(shards: Vec<F>) -> Result<Self> {
        Self::with_router_seed(shards, ROUTER_SEED)
    }

    pub fn with_router_seed(shards: Vec<F>, seed: u32) -> Result<Self> {
        if shards.is_empty() {
            return Err(FilterError::InvalidConfig(
                "Sharded filter needs at least one shard".into(),
            ));
        }
        Ok(Self {
            router: HashFamily::new(1, seed),
            shards: shards.into_iter().map(Mutex::new).collect(),
        })
    }

    /// Builds `count` shards with `make(shard_index)`.
    pub fn from_fn<M>(count: usize, mut make: M) -> Result<Self>
    where
        M: FnMut(usize) -> Result<F>,
    {
        let shards = (0..count).map(&mut make).collect::<Result<Vec<_>>>()?;
        Self::new(shards)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_for<K: Hash + ?Sized>(&self, flow: &K) -> usize {
        self.router.indices(flow, self.shards.len())[0]
    }

    /// Runs `op` on the shard owning `flow`.
    pub fn with_shard<K, R, O>(&self, flow: &K, op: O) -> Result<R>
    where
        K: Hash + ?Sized,
        O: FnOnce(&mut F) -> R,
    {
        let mut guard = self.lock(self.shard_for(flow))?;
        Ok(op(&mut guard))
    }

    /// Runs `op` on every shard in turn, collecting the results.
    pub fn map_shards<R, O>(&self, mut op: O) -> Result<Vec<R>>
    where
        O: FnMut(&F) -> R,
    {
        (0..self.shards.len())
            .map(|idx| self.lock(idx).map(|guard| op(&guard)))
            .collect()
    }

    pub fn insert_entry<K, S>(&self, flow: &K, state: S) -> Result<()>
    where
        K: Hash + ?Sized,
        F: StatefulFilter<K, S>,
    {
        self.with_shard(flow, |filter| filter.insert_entry(flow, state))?
    }

    pub fn modify_entry<K, S>(&self, flow: &K, new_state: S) -> Result<bool>
    where
        K: Hash + ?Sized,
        F: StatefulFilter<K, S>,
    {
        self.with_shard(flow, |filter| filter.modify_entry(flow, new_state))?
    }

    pub fn lookup_entry<K, S>(&self, flow: &K) -> Result<Lookup<S>>
    where
        K: Hash + ?Sized,
        F: StatefulFilter<K, S>,
    {
        self.with_shard(flow, |filter| filter.lookup_entry(flow))
    }

    pub fn delete_entry<K, S>(&self, flow: &K) -> Result<usize>
    where
        K: Hash + ?Sized,
        F: StatefulFilter<K, S>,
    {
        self.with_shard(flow, |filter| filter.delete_entry(flow))
    }

    fn lock(&self, idx: usize) -> Result<MutexGuard<'_, F>> {
        self.shards[idx]
            .lock()
            .map_err(|_| {
                FilterError::LockError(format!("Shard {idx} is poisoned"))
            })
    }
}

impl<F> std::fmt::Debug for ShardedFilter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ShardedFilter {{ shards: {}, router_seed: {} }}",
            self.shards.len(),
            self.router.seed()
        )
    }
}
