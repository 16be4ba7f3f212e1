use super::{CounterMode, DirectFilterConfig};
use crate::aging::AgingClock;
use crate::error::Result;
use crate::filter::{FilterStats, Lookup, StatefulFilter};
use crate::hash::HashFamily;
use bitvec::{bitvec, order::Lsb0, vec::BitVec};
use fnv::FnvHashSet;
use std::hash::Hash;
use std::ops::Range;
use tracing::{debug, trace};

const BITS_PER_CELL: usize = 3;
const COUNTER_MAX: u8 = 3;

/// Counter-based state filter addressed by `(flow, state)` pairs.
///
/// Every cell is three bits wide: a timer bit followed by a 2-bit counter.
/// No state is stored in the table; a flow's state is recovered by probing
/// the cells of `(flow, s)` for every state `s` the filter has ever seen.
/// Lookups therefore cost `O(known_states * num_hashes)`.
pub struct DirectStateFilter<S> {
    config: DirectFilterConfig,
    hasher: HashFamily,
    bits: BitVec<usize, Lsb0>,
    clock: AgingClock,
    states: Vec<S>,
    state_index: FnvHashSet<S>,
}

impl<S> DirectStateFilter<S>
where
    S: Hash + Eq + Clone,
{
    pub fn new(config: DirectFilterConfig) -> Result<Self> {
        config.validate()?;

        let hasher = HashFamily::new(config.num_hashes, config.seed);
        let bits = bitvec![0; config.num_cells * BITS_PER_CELL];
        let clock = AgingClock::new(config.phase_duration, config.sweep_mode);

        debug!(
            num_cells = config.num_cells,
            num_hashes = config.num_hashes,
            phase_duration = config.phase_duration,
            "created direct state filter"
        );

        Ok(Self {
            config,
            hasher,
            bits,
            clock,
            states: Vec::new(),
            state_index: FnvHashSet::default(),
        })
    }

    pub fn config(&self) -> &DirectFilterConfig {
        &self.config
    }

    /// States registered by inserts and modifies, in first-seen order.
    pub fn known_states(&self) -> &[S] {
        &self.states
    }

    pub fn insert_entry<K: Hash + ?Sized>(&mut self, flow: &K, state: S) {
        self.insert_cells(flow, state);
        self.tick();
    }

    /// Looks the flow up, then decrements the cells of its current state.
    /// Absent or ambiguous flows are left alone and reported as `false`.
    /// The lookup counts as an operation of its own, so a delete advances
    /// the clock twice.
    pub fn delete_entry<K: Hash + ?Sized>(&mut self, flow: &K) -> bool {
        let deleted = match self.lookup_entry(flow) {
            Lookup::State(old_state) => {
                self.delete_cells(flow, &old_state);
                true
            }
            _ => false,
        };
        self.tick();
        deleted
    }

    /// Delete followed by insert; `new_state` is inserted even when the flow
    /// had no readable previous state. Returns whether a previous state was
    /// removed.
    pub fn modify_entry<K: Hash + ?Sized>(
        &mut self,
        flow: &K,
        new_state: S,
    ) -> bool {
        let deleted = self.delete_entry(flow);
        self.insert_entry(flow, new_state);
        deleted
    }

    pub fn lookup_entry<K: Hash + ?Sized>(&mut self, flow: &K) -> Lookup<S> {
        let result = self.probe(flow);
        self.tick();
        result
    }

    /// Whether every cell of `(flow, state)` holds a non-zero counter.
    pub fn contains_state<K: Hash + ?Sized>(
        &mut self,
        flow: &K,
        state: &S,
    ) -> bool {
        let present = self.probe_state(flow, state);
        self.tick();
        present
    }

    /// Runs a full aging pass immediately and re-arms the clock.
    pub fn sweep(&mut self) {
        self.sweep_cells(0..self.config.num_cells);
        self.clock.reset();
    }

    pub fn clear(&mut self) {
        self.bits.fill(false);
        self.states.clear();
        self.state_index.clear();
        self.clock.reset();
    }

    fn register_state(&mut self, state: &S) {
        if self.state_index.insert(state.clone()) {
            self.states.push(state.clone());
        }
    }

    fn cell_indices<K: Hash + ?Sized>(
        &self,
        flow: &K,
        state: &S,
    ) -> Vec<usize> {
        self.hasher.indices(&(flow, state), self.config.num_cells)
    }

    fn insert_cells<K: Hash + ?Sized>(&mut self, flow: &K, state: S) {
        self.register_state(&state);
        for idx in self.cell_indices(flow, &state) {
            self.set_timer(idx, true);
            let counter = self.counter(idx);
            let next = match self.config.counter_mode {
                CounterMode::Wrapping => (counter + 1) % (COUNTER_MAX + 1),
                CounterMode::Saturating => (counter + 1).min(COUNTER_MAX),
            };
            self.set_counter(idx, next);
        }
    }

    fn delete_cells<K: Hash + ?Sized>(&mut self, flow: &K, state: &S) {
        // Deletes leave the timer bit alone.
        for idx in self.cell_indices(flow, state) {
            let counter = self.counter(idx);
            self.set_counter(idx, counter.saturating_sub(1));
        }
    }

    /// Lookup without advancing the clock. Every cell it reads is touched.
    fn probe<K: Hash + ?Sized>(&mut self, flow: &K) -> Lookup<S> {
        let mut matched: Option<usize> = None;
        let mut ambiguous = false;

        for (pos, state) in self.states.iter().enumerate() {
            let indices =
                self.hasher.indices(&(flow, state), self.config.num_cells);
            if Self::probe_cells(&mut self.bits, &indices) {
                if matched.is_some() {
                    ambiguous = true;
                } else {
                    matched = Some(pos);
                }
            }
        }

        match (matched, ambiguous) {
            (None, _) => Lookup::Absent,
            (Some(_), true) => Lookup::DontKnow,
            (Some(pos), false) => Lookup::State(self.states[pos].clone()),
        }
    }

    fn probe_state<K: Hash + ?Sized>(&mut self, flow: &K, state: &S) -> bool {
        let indices = self.cell_indices(flow, state);
        Self::probe_cells(&mut self.bits, &indices)
    }

    /// Sets the timer of every cell in `indices` and reports whether all of
    /// them hold a non-zero counter.
    fn probe_cells(bits: &mut BitVec<usize, Lsb0>, indices: &[usize]) -> bool {
        let mut present = true;
        for &idx in indices {
            let base = idx * BITS_PER_CELL;
            bits.set(base, true);
            if !bits[base + 1] && !bits[base + 2] {
                present = false;
            }
        }
        present
    }

    fn tick(&mut self) {
        if let Some(range) = self.clock.tick(self.config.num_cells) {
            self.sweep_cells(range);
        }
    }

    fn sweep_cells(&mut self, range: Range<usize>) {
        let full = range.len() == self.config.num_cells;
        let (start, end) = (range.start, range.end);
        let mut evicted = 0usize;
        for idx in range {
            if self.timer(idx) {
                self.set_timer(idx, false);
            } else if self.counter(idx) != 0 {
                self.set_counter(idx, 0);
                evicted += 1;
            }
        }
        if full {
            debug!(evicted, "direct filter aging sweep");
        } else {
            trace!(start, end, evicted, "direct filter sweep slice");
        }
    }

    fn timer(&self, idx: usize) -> bool {
        self.bits[idx * BITS_PER_CELL]
    }

    fn set_timer(&mut self, idx: usize, value: bool) {
        self.bits.set(idx * BITS_PER_CELL, value);
    }

    fn counter(&self, idx: usize) -> u8 {
        let base = idx * BITS_PER_CELL;
        ((self.bits[base + 1] as u8) << 1) | self.bits[base + 2] as u8
    }

    fn set_counter(&mut self, idx: usize, value: u8) {
        debug_assert!(value <= COUNTER_MAX);
        let base = idx * BITS_PER_CELL;
        self.bits.set(base + 1, (value >> 1) & 1 == 1);
        self.bits.set(base + 2, value & 1 == 1);
    }
}

impl<K, S> StatefulFilter<K, S> for DirectStateFilter<S>
where
    K: Hash + ?Sized,
    S: Hash + Eq + Clone,
{
    fn insert_entry(&mut self, flow: &K, state: S) -> Result<()> {
        DirectStateFilter::insert_entry(self, flow, state);
        Ok(())
    }

    fn modify_entry(&mut self, flow: &K, new_state: S) -> Result<bool> {
        Ok(DirectStateFilter::modify_entry(self, flow, new_state))
    }

    fn lookup_entry(&mut self, flow: &K) -> Lookup<S> {
        DirectStateFilter::lookup_entry(self, flow)
    }

    fn delete_entry(&mut self, flow: &K) -> usize {
        usize::from(DirectStateFilter::delete_entry(self, flow))
    }
}

impl<S> FilterStats for DirectStateFilter<S> {
    fn memory_bits(&self) -> usize {
        self.bits.len()
    }

    fn occupied(&self) -> usize {
        (0..self.config.num_cells)
            .filter(|&idx| {
                let base = idx * BITS_PER_CELL;
                self.bits[base + 1] || self.bits[base + 2]
            })
            .count()
    }

    fn slots(&self) -> usize {
        self.config.num_cells
    }

    fn operations_until_sweep(&self) -> usize {
        self.clock.remaining()
    }
}

impl<S> std::fmt::Debug for DirectStateFilter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DirectStateFilter {{ num_cells: {}, num_hashes: {}, phase_duration: {}, known_states: {}, counter_mode: {:?} }}",
            self.config.num_cells,
            self.config.num_hashes,
            self.config.phase_duration,
            self.states.len(),
            self.config.counter_mode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aging::SweepMode;
    use crate::direct::DirectFilterConfigBuilder;

    fn create_filter(
        num_cells: usize,
        phase_duration: usize,
    ) -> DirectStateFilter<String> {
        let config = DirectFilterConfigBuilder::default()
            .num_cells(num_cells)
            .num_hashes(4)
            .phase_duration(phase_duration)
            .build()
            .expect("Unable to build DirectFilterConfig");
        DirectStateFilter::new(config)
            .expect("Failed to create DirectStateFilter")
    }

    #[test]
    fn test_workflow() {
        let mut dbf = create_filter(1000, 1000);

        dbf.insert_entry(&1u32, "State 1".to_string());
        dbf.insert_entry(&2u32, "State 2".to_string());
        assert_eq!(
            dbf.lookup_entry(&1u32),
            Lookup::State("State 1".to_string())
        );
        assert_eq!(
            dbf.lookup_entry(&2u32),
            Lookup::State("State 2".to_string())
        );

        dbf.modify_entry(&1u32, "Modified State 1".to_string());
        assert_eq!(
            dbf.lookup_entry(&1u32),
            Lookup::State("Modified State 1".to_string())
        );

        assert!(dbf.delete_entry(&2u32));
        assert_eq!(dbf.lookup_entry(&2u32), Lookup::Absent);

        dbf.insert_entry(&3u32, "State 3".to_string());
        for _ in 0..2004 {
            assert_eq!(
                dbf.lookup_entry(&3u32),
                Lookup::State("State 3".to_string())
            );
        }
        // Flow 1 was never referenced across two sweeps.
        assert_eq!(dbf.lookup_entry(&1u32), Lookup::Absent);
    }

    #[test]
    fn test_counter_wraps_after_four_inserts() {
        let mut dbf = create_filter(1000, 1000);
        for _ in 0..4 {
            dbf.insert_entry(&7u32, "A".to_string());
        }
        assert_eq!(dbf.lookup_entry(&7u32), Lookup::Absent);
        assert_eq!(dbf.occupied(), 0);
    }

    #[test]
    fn test_counter_saturates_when_configured() {
        let config = DirectFilterConfigBuilder::default()
            .counter_mode(CounterMode::Saturating)
            .build()
            .unwrap();
        let mut dbf: DirectStateFilter<String> =
            DirectStateFilter::new(config).unwrap();
        for _ in 0..4 {
            dbf.insert_entry(&7u32, "A".to_string());
        }
        assert_eq!(dbf.lookup_entry(&7u32), Lookup::State("A".to_string()));
        for idx in dbf.cell_indices(&7u32, &"A".to_string()) {
            assert_eq!(dbf.counter(idx), COUNTER_MAX);
        }
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let mut dbf = create_filter(1000, 1000);
        dbf.insert_entry(&1u32, "A".to_string());
        assert!(!dbf.delete_entry(&99u32));
        assert_eq!(dbf.lookup_entry(&1u32), Lookup::State("A".to_string()));
    }

    #[test]
    fn test_delete_decrements_once() {
        let mut dbf = create_filter(1000, 1000);
        dbf.insert_entry(&1u32, "A".to_string());
        dbf.insert_entry(&1u32, "A".to_string());
        assert!(dbf.delete_entry(&1u32));
        assert_eq!(dbf.lookup_entry(&1u32), Lookup::State("A".to_string()));
        assert!(dbf.delete_entry(&1u32));
        assert_eq!(dbf.lookup_entry(&1u32), Lookup::Absent);
    }

    #[test]
    fn test_delete_and_modify_advance_clock() {
        let mut dbf = create_filter(1000, 1000);
        dbf.insert_entry(&1u32, "A".to_string());
        assert_eq!(dbf.operations_until_sweep(), 999);
        // Lookup plus the delete itself.
        assert!(dbf.delete_entry(&1u32));
        assert_eq!(dbf.operations_until_sweep(), 997);
        assert!(!dbf.delete_entry(&1u32));
        assert_eq!(dbf.operations_until_sweep(), 995);
        // Delete (two) plus insert.
        dbf.modify_entry(&1u32, "B".to_string());
        assert_eq!(dbf.operations_until_sweep(), 992);
    }

    #[test]
    fn test_two_states_yield_dont_know() {
        let mut dbf = create_filter(1000, 1000);
        dbf.insert_entry(&5u32, "A".to_string());
        dbf.insert_entry(&5u32, "B".to_string());
        assert_eq!(dbf.lookup_entry(&5u32), Lookup::DontKnow);
        // Ambiguous flows cannot be deleted.
        assert!(!dbf.delete_entry(&5u32));
    }

    #[test]
    fn test_known_states_registered_once() {
        let mut dbf = create_filter(1000, 1000);
        dbf.insert_entry(&1u32, "A".to_string());
        dbf.insert_entry(&2u32, "A".to_string());
        dbf.modify_entry(&1u32, "B".to_string());
        assert_eq!(dbf.known_states(), &["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_sweep_twice_clears_untouched() {
        let mut dbf = create_filter(1000, 1000);
        dbf.insert_entry(&1u32, "A".to_string());
        dbf.sweep();
        assert!(dbf.occupied() > 0);
        dbf.sweep();
        assert_eq!(dbf.occupied(), 0);
    }

    #[test]
    fn test_incremental_sweep_expires_untouched() {
        let config = DirectFilterConfigBuilder::default()
            .num_cells(10_000)
            .phase_duration(10)
            .sweep_mode(SweepMode::Incremental)
            .build()
            .unwrap();
        let mut dbf: DirectStateFilter<u8> =
            DirectStateFilter::new(config).unwrap();
        dbf.insert_entry(&1u32, 1);
        for i in 0..20u32 {
            dbf.insert_entry(&(1000 + i), 2);
            dbf.delete_entry(&(1000 + i));
        }
        assert_eq!(dbf.lookup_entry(&1u32), Lookup::Absent);
    }

    #[test]
    fn test_clear() {
        let mut dbf = create_filter(1000, 1000);
        dbf.insert_entry(&1u32, "A".to_string());
        dbf.clear();
        assert!(dbf.known_states().is_empty());
        assert_eq!(dbf.occupied(), 0);
        assert_eq!(dbf.lookup_entry(&1u32), Lookup::Absent);
    }

    #[test]
    fn test_memory_bits() {
        let dbf = create_filter(1000, 1000);
        assert_eq!(dbf.memory_bits(), 3000);
        assert_eq!(dbf.slots(), 1000);
    }

    #[test]
    fn test_invalid_config() {
        let config = DirectFilterConfigBuilder::default()
            .num_cells(0)
            .build()
            .unwrap();
        assert!(DirectStateFilter::<u8>::new(config).is_err());
    }
}
