use super::{Cell, CellState, StatefulFilterConfig};
use crate::aging::AgingClock;
use crate::error::Result;
use crate::filter::{FilterStats, Lookup, StatefulFilter};
use crate::hash::HashFamily;
use std::hash::Hash;
use std::ops::Range;
use tracing::{debug, trace};

/// Stateful Bloom filter: each flow hashes (independently of its state) to
/// `num_hashes` reference-counted cells that carry the state itself.
///
/// Insertion rules per cell:
///   * empty cell: take the value, count 1
///   * same value or `DontKnow`: increment the count
///   * different value: increment the count, switch to `DontKnow`
///
/// A modify overwrites cells owned by one flow and marks shared disagreeing
/// cells `DontKnow`; a delete releases one reference per cell.
pub struct StatefulCellFilter<S> {
    config: StatefulFilterConfig,
    hasher: HashFamily,
    cells: Vec<Cell<S>>,
    clock: AgingClock,
}

impl<S> StatefulCellFilter<S>
where
    S: Clone + PartialEq,
{
    pub fn new(config: StatefulFilterConfig) -> Result<Self> {
        config.validate()?;

        let hasher = HashFamily::new(config.num_hashes, config.seed);
        let cells = vec![Cell::default(); config.num_buckets];
        let clock = AgingClock::new(config.deletion_window, config.sweep_mode);

        debug!(
            num_buckets = config.num_buckets,
            num_hashes = config.num_hashes,
            deletion_window = config.deletion_window,
            "created stateful cell filter"
        );

        Ok(Self {
            config,
            hasher,
            cells,
            clock,
        })
    }

    pub fn config(&self) -> &StatefulFilterConfig {
        &self.config
    }

    pub fn cells(&self) -> &[Cell<S>] {
        &self.cells
    }

    /// Distinct cell indices of `flow`. Duplicates are folded so that a
    /// flow holds exactly one reference on each of its cells.
    pub fn cell_indices<K: Hash + ?Sized>(&self, flow: &K) -> Vec<usize> {
        let mut indices = self.hasher.indices(flow, self.config.num_buckets);
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    pub fn insert_entry<K: Hash + ?Sized>(&mut self, flow: &K, state: S) {
        for idx in self.cell_indices(flow) {
            self.cells[idx].add(state.clone());
        }
        self.tick();
    }

    /// Applies `new_state` to the flow's cells. Flows with an empty cell are
    /// not in the filter and are left untouched.
    pub fn modify_entry<K: Hash + ?Sized>(
        &mut self,
        flow: &K,
        new_state: S,
    ) -> bool {
        let indices = self.cell_indices(flow);
        let present = self.all_occupied(&indices);
        if present {
            for idx in indices {
                self.cells[idx].set(new_state.clone());
            }
        }
        self.tick();
        present
    }

    /// Releases the flow's reference on each of its cells. A flow with an
    /// empty cell cannot hold references, so the delete is skipped.
    pub fn delete_entry<K: Hash + ?Sized>(&mut self, flow: &K) -> bool {
        let indices = self.cell_indices(flow);
        let present = self.all_occupied(&indices);
        if present {
            for idx in indices {
                self.cells[idx].decrement();
            }
        }
        self.tick();
        present
    }

    pub fn lookup_entry<K: Hash + ?Sized>(&mut self, flow: &K) -> Lookup<S> {
        let indices = self.cell_indices(flow);
        let result = self.resolve(&indices);
        for &idx in &indices {
            self.cells[idx].touch();
        }
        self.tick();
        result
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

    /// Runs a full aging pass immediately and re-arms the clock.
    pub fn sweep(&mut self) {
        self.sweep_cells(0..self.cells.len());
        self.clock.reset();
    }

    pub fn clear(&mut self) {
        self.cells.fill(Cell::default());
        self.clock.reset();
    }

    fn all_occupied(&self, indices: &[usize]) -> bool {
        indices.iter().all(|&idx| !self.cells[idx].is_empty())
    }

    /// Folds the flow's cells into a lookup result.
    ///
    /// Any empty cell means absence. Two different concrete values also mean
    /// absence: a member flow would have written its value to every cell.
    /// A concrete value wins over `DontKnow` cells; only a flow whose cells
    /// are all `DontKnow` resolves to `DontKnow`.
    fn resolve(&self, indices: &[usize]) -> Lookup<S> {
        let mut best: Option<&S> = None;

        for &idx in indices {
            match self.cells[idx].state() {
                CellState::Empty => return Lookup::Absent,
                CellState::DontKnow => {}
                CellState::Known(state) => match best {
                    None => best = Some(state),
                    Some(current) if current != state => return Lookup::Absent,
                    Some(_) => {}
                },
            }
        }

        match best {
            Some(state) => Lookup::State(state.clone()),
            None if indices.is_empty() => Lookup::Absent,
            None => Lookup::DontKnow,
        }
    }

    fn tick(&mut self) {
        if let Some(range) = self.clock.tick(self.cells.len()) {
            self.sweep_cells(range);
        }
    }

    fn sweep_cells(&mut self, range: Range<usize>) {
        let full = range.len() == self.cells.len();
        let (start, end) = (range.start, range.end);
        let evicted = self.cells[range]
            .iter_mut()
            .map(|cell| cell.sweep())
            .filter(|&evicted| evicted)
            .count();
        if full {
            debug!(evicted, "stateful filter aging sweep");
        } else {
            trace!(start, end, evicted, "stateful filter sweep slice");
        }
    }
}

impl<K, S> StatefulFilter<K, S> for StatefulCellFilter<S>
where
    K: Hash + ?Sized,
    S: Clone + PartialEq,
{
    fn insert_entry(&mut self, flow: &K, state: S) -> Result<()> {
        StatefulCellFilter::insert_entry(self, flow, state);
        Ok(())
    }

    fn modify_entry(&mut self, flow: &K, new_state: S) -> Result<bool> {
        Ok(StatefulCellFilter::modify_entry(self, flow, new_state))
    }

    fn lookup_entry(&mut self, flow: &K) -> Lookup<S> {
        StatefulCellFilter::lookup_entry(self, flow)
    }

    fn delete_entry(&mut self, flow: &K) -> usize {
        usize::from(StatefulCellFilter::delete_entry(self, flow))
    }
}

impl<S: PartialEq> FilterStats for StatefulCellFilter<S> {
    fn memory_bits(&self) -> usize {
        self.cells.len() * std::mem::size_of::<Cell<S>>() * 8
    }

    fn occupied(&self) -> usize {
        self.cells.iter().filter(|cell| !cell.is_empty()).count()
    }

    fn slots(&self) -> usize {
        self.cells.len()
    }

    fn operations_until_sweep(&self) -> usize {
        self.clock.remaining()
    }
}

impl<S> std::fmt::Debug for StatefulCellFilter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "StatefulCellFilter {{ num_buckets: {}, num_hashes: {}, deletion_window: {} }}",
            self.config.num_buckets,
            self.config.num_hashes,
            self.config.deletion_window
        )
    }
}
