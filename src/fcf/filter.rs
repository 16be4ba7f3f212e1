use super::{Bucket, BucketEntry, FcfConfig, OverflowPolicy};
use crate::aging::AgingClock;
use crate::error::{FilterError, Result};
use crate::filter::{FilterStats, Lookup, StatefulFilter};
use crate::hash::HashFamily;
use std::hash::Hash;
use std::ops::Range;
use tracing::{debug, trace, warn};

/// Bits accounted per stored state in [`FilterStats::memory_bits`].
const STATE_BITS: usize = 8;

/// Where an insert landed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement<S> {
    pub subtable: usize,
    pub bucket: usize,
    /// Entry dropped to make room under [`OverflowPolicy::EvictOldest`].
    pub evicted: Option<BucketEntry<S>>,
}

/// Fingerprint-compressed filter.
///
/// The table is split into `num_hashes` subtables of `table_size /
/// num_hashes` buckets. A flow has one candidate bucket per subtable and a
/// single fingerprint; inserts go to the least loaded candidate and lookups
/// scan all candidates for the fingerprint. More than one match is reported
/// as `DontKnow`, since the filter cannot tell which entry belongs to the
/// flow.
pub struct FingerprintCompressedFilter<S> {
    config: FcfConfig,
    hasher: HashFamily,
    subtable_size: usize,
    /// Subtables laid out back to back: bucket `b` of subtable `t` lives at
    /// `t * subtable_size + b`.
    buckets: Vec<Bucket<S>>,
    clock: AgingClock,
    entries: usize,
}

impl<S> FingerprintCompressedFilter<S>
where
    S: Clone + PartialEq,
{
    pub fn new(config: FcfConfig) -> Result<Self> {
        config.validate()?;

        let hasher = HashFamily::new(config.num_hashes, config.seed);
        let subtable_size = config.subtable_size();
        let buckets = vec![Bucket::default(); config.table_size];
        let clock = AgingClock::new(config.deletion_window, config.sweep_mode);

        debug!(
            table_size = config.table_size,
            subtables = config.num_hashes,
            cells_per_bucket = config.cells_per_bucket,
            fingerprint_bits = config.fingerprint_bits,
            "created fingerprint compressed filter"
        );

        Ok(Self {
            config,
            hasher,
            subtable_size,
            buckets,
            clock,
            entries: 0,
        })
    }

    pub fn config(&self) -> &FcfConfig {
        &self.config
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn fingerprint<K: Hash + ?Sized>(&self, flow: &K) -> u64 {
        self.hasher.fingerprint(flow, self.config.fingerprint_bits)
    }

    /// `(subtable, bucket)` candidates of `flow`, one per subtable.
    pub fn candidate_buckets<K: Hash + ?Sized>(
        &self,
        flow: &K,
    ) -> Vec<(usize, usize)> {
        self.hasher
            .indices(flow, self.subtable_size)
            .into_iter()
            .enumerate()
            .collect()
    }

    pub fn bucket(&self, subtable: usize, bucket: usize) -> &Bucket<S> {
        &self.buckets[subtable * self.subtable_size + bucket]
    }

    /// Entry count of every bucket, in table order.
    pub fn bucket_loads(&self) -> Vec<usize> {
        self.buckets.iter().map(Bucket::len).collect()
    }

    /// Stores `(fingerprint, state)` in the least loaded candidate bucket,
    /// the lowest subtable winning ties.
    ///
    /// A rejected insert does not count as an operation: the table and the
    /// aging clock are left exactly as they were.
    pub fn insert_entry<K: Hash + ?Sized>(
        &mut self,
        flow: &K,
        state: S,
    ) -> Result<Placement<S>> {
        let placement = self.place(flow, state)?;
        self.tick();
        Ok(placement)
    }

    /// Overwrites the state of every entry matching the flow's fingerprint.
    /// Returns the number of entries updated.
    pub fn modify_entry<K: Hash + ?Sized>(
        &mut self,
        flow: &K,
        new_state: S,
    ) -> usize {
        let updated = self.overwrite(flow, None, new_state);
        self.tick();
        updated
    }

    /// Like [`modify_entry`](Self::modify_entry), restricted to entries
    /// currently holding `old_state`.
    pub fn modify_entry_from<K: Hash + ?Sized>(
        &mut self,
        flow: &K,
        old_state: &S,
        new_state: S,
    ) -> usize {
        let updated = self.overwrite(flow, Some(old_state), new_state);
        self.tick();
        updated
    }

    /// Deletes every entry of the flow and inserts it again in `new_state`.
    pub fn replace_entry<K: Hash + ?Sized>(
        &mut self,
        flow: &K,
        new_state: S,
    ) -> Result<Placement<S>> {
        self.delete_entry(flow);
        self.insert_entry(flow, new_state)
    }

    pub fn lookup_entry<K: Hash + ?Sized>(&mut self, flow: &K) -> Lookup<S> {
        let fingerprint = self.fingerprint(flow);
        let mut found: Option<S> = None;
        let mut matches = 0usize;

        for slot in self.candidate_slots(flow) {
            for entry in self.buckets[slot].matching_mut(fingerprint) {
                entry.touched = true;
                if found.is_none() {
                    found = Some(entry.state.clone());
                }
                matches += 1;
            }
        }
        self.tick();

        match (found, matches) {
            (Some(state), 1) => Lookup::State(state),
            (Some(_), _) => Lookup::DontKnow,
            (None, _) => Lookup::Absent,
        }
    }

    pub fn contains_state<K: Hash + ?Sized>(
        &mut self,
        flow: &K,
        state: &S,
    ) -> bool {
        matches!(
            self.lookup_entry(flow),
            Lookup::State(found) if &found == state
        )
    }

    /// Removes every entry matching the flow's fingerprint.
    pub fn delete_entry<K: Hash + ?Sized>(&mut self, flow: &K) -> usize {
        let removed = self.remove(flow, None);
        self.tick();
        removed
    }

    /// Removes the flow's entries that currently hold `state`.
    pub fn delete_entry_in_state<K: Hash + ?Sized>(
        &mut self,
        flow: &K,
        state: &S,
    ) -> usize {
        let removed = self.remove(flow, Some(state));
        self.tick();
        removed
    }

    /// Runs a full aging pass immediately and re-arms the clock.
    pub fn sweep(&mut self) {
        self.sweep_buckets(0..self.buckets.len());
        self.clock.reset();
    }

    pub fn clear(&mut self) {
        self.buckets.iter_mut().for_each(Bucket::clear);
        self.entries = 0;
        self.clock.reset();
    }

    fn candidate_slots<K: Hash + ?Sized>(&self, flow: &K) -> Vec<usize> {
        self.candidate_buckets(flow)
            .into_iter()
            .map(|(subtable, bucket)| subtable * self.subtable_size + bucket)
            .collect()
    }

    fn place<K: Hash + ?Sized>(
        &mut self,
        flow: &K,
        state: S,
    ) -> Result<Placement<S>> {
        let fingerprint = self.fingerprint(flow);
        let slot = self
            .candidate_slots(flow)
            .into_iter()
            .min_by_key(|&slot| self.buckets[slot].len())
            .expect("at least one subtable");
        let subtable = slot / self.subtable_size;
        let bucket = slot % self.subtable_size;
        let capacity = self.config.cells_per_bucket;

        let mut evicted = None;
        if self.buckets[slot].len() >= capacity {
            warn!(
                subtable,
                bucket,
                capacity,
                utilization = self.utilization(),
                policy = ?self.config.overflow_policy,
                "bucket overflow"
            );
            match self.config.overflow_policy {
                OverflowPolicy::Reject => {
                    return Err(FilterError::BucketOverflow {
                        subtable,
                        bucket,
                        capacity,
                    });
                }
                OverflowPolicy::EvictOldest => {
                    evicted = self.buckets[slot].evict_oldest();
                    if evicted.is_some() {
                        self.entries -= 1;
                    }
                }
            }
        }

        self.buckets[slot].push(fingerprint, state);
        self.entries += 1;

        Ok(Placement {
            subtable,
            bucket,
            evicted,
        })
    }

    fn overwrite<K: Hash + ?Sized>(
        &mut self,
        flow: &K,
        old_state: Option<&S>,
        new_state: S,
    ) -> usize {
        let fingerprint = self.fingerprint(flow);
        let mut updated = 0;
        for slot in self.candidate_slots(flow) {
            for entry in self.buckets[slot].matching_mut(fingerprint) {
                if old_state.is_some_and(|old| &entry.state != old) {
                    continue;
                }
                entry.state = new_state.clone();
                entry.touched = true;
                updated += 1;
            }
        }
        updated
    }

    fn remove<K: Hash + ?Sized>(
        &mut self,
        flow: &K,
        state: Option<&S>,
    ) -> usize {
        let fingerprint = self.fingerprint(flow);
        let mut removed = 0;
        for slot in self.candidate_slots(flow) {
            removed += self.buckets[slot].remove_where(|entry| {
                entry.fingerprint == fingerprint
                    && state.is_none_or(|state| &entry.state == state)
            });
        }
        self.entries -= removed;
        removed
    }

    fn tick(&mut self) {
        if let Some(range) = self.clock.tick(self.buckets.len()) {
            self.sweep_buckets(range);
        }
    }

    fn sweep_buckets(&mut self, range: Range<usize>) {
        let full = range.len() == self.buckets.len();
        let (start, end) = (range.start, range.end);
        let evicted: usize =
            self.buckets[range].iter_mut().map(Bucket::sweep).sum();
        self.entries -= evicted;
        if full {
            debug!(evicted, remaining = self.entries, "fcf aging sweep");
        } else {
            trace!(start, end, evicted, "fcf sweep slice");
        }
    }
}

impl<K, S> StatefulFilter<K, S> for FingerprintCompressedFilter<S>
where
    K: Hash + ?Sized,
    S: Clone + PartialEq,
{
    fn insert_entry(&mut self, flow: &K, state: S) -> Result<()> {
        FingerprintCompressedFilter::insert_entry(self, flow, state).map(|_| ())
    }

    fn modify_entry(&mut self, flow: &K, new_state: S) -> Result<bool> {
        Ok(FingerprintCompressedFilter::modify_entry(self, flow, new_state) > 0)
    }

    fn lookup_entry(&mut self, flow: &K) -> Lookup<S> {
        FingerprintCompressedFilter::lookup_entry(self, flow)
    }

    fn delete_entry(&mut self, flow: &K) -> usize {
        FingerprintCompressedFilter::delete_entry(self, flow)
    }
}

impl<S> FilterStats for FingerprintCompressedFilter<S> {
    /// Nominal compressed size: every slot holds a fingerprint and an
    /// 8-bit state.
    fn memory_bits(&self) -> usize {
        self.config.table_size
            * self.config.cells_per_bucket
            * (self.config.fingerprint_bits as usize + STATE_BITS)
    }

    fn occupied(&self) -> usize {
        self.entries
    }

    fn slots(&self) -> usize {
        self.config.table_size * self.config.cells_per_bucket
    }

    fn operations_until_sweep(&self) -> usize {
        self.clock.remaining()
    }
}

impl<S> std::fmt::Debug for FingerprintCompressedFilter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FingerprintCompressedFilter {{ table_size: {}, subtables: {}, cells_per_bucket: {}, fingerprint_bits: {}, entries: {} }}",
            self.config.table_size,
            self.config.num_hashes,
            self.config.cells_per_bucket,
            self.config.fingerprint_bits,
            self.entries
        )
    }
}
