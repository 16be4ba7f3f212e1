use serde::{Deserialize, Serialize};

/// Value held by a stateful cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellState<S> {
    Empty,
    Known(S),
    /// Flows with different states share this cell. Sticky until the
    /// reference count drops back to zero.
    DontKnow,
}

impl<S> Default for CellState<S> {
    fn default() -> Self {
        CellState::Empty
    }
}

/// Reference-counted cell of a [`StatefulCellFilter`].
///
/// Invariant: `ref_count == 0` exactly when the state is `Empty`.
///
/// [`StatefulCellFilter`]: super::StatefulCellFilter
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell<S> {
    state: CellState<S>,
    ref_count: u32,
    touched: bool,
}

impl<S> Default for Cell<S> {
    fn default() -> Self {
        Self {
            state: CellState::Empty,
            ref_count: 0,
            touched: false,
        }
    }
}

impl<S: PartialEq> Cell<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &CellState<S> {
        &self.state
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub fn is_empty(&self) -> bool {
        self.ref_count == 0
    }

    pub fn is_touched(&self) -> bool {
        self.touched
    }

    /// Registers one more flow on this cell holding `state`.
    pub fn add(&mut self, state: S) {
        self.ref_count = self
            .ref_count
            .checked_add(1)
            .expect("cell reference count overflow");
        self.set(state);
    }

    /// Moves the cell to `state` without changing the reference count.
    ///
    /// A cell owned by a single flow takes the new state; a shared cell that
    /// disagrees becomes `DontKnow`. `DontKnow` is never left this way, and
    /// an empty cell stays empty.
    pub fn set(&mut self, state: S) {
        if self.ref_count == 0 {
            return;
        }
        self.touched = true;
        let current = std::mem::replace(&mut self.state, CellState::Empty);
        self.state = match current {
            CellState::DontKnow => CellState::DontKnow,
            CellState::Known(current) if current == state => {
                CellState::Known(current)
            }
            _ if self.ref_count == 1 => CellState::Known(state),
            _ => CellState::DontKnow,
        };
    }

    /// Releases one flow. The last release empties the cell, which is the
    /// only way out of `DontKnow`.
    pub fn decrement(&mut self) {
        assert!(self.ref_count > 0, "cell reference count underflow");
        self.ref_count -= 1;
        if self.ref_count == 0 {
            self.reset();
        }
    }

    pub fn touch(&mut self) {
        if !self.is_empty() {
            self.touched = true;
        }
    }

    /// Aging step: clears an untouched cell and un-touches a touched one.
    /// Returns `true` when the cell was evicted.
    pub fn sweep(&mut self) -> bool {
        if self.touched {
            self.touched = false;
            false
        } else if !self.is_empty() {
            self.reset();
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.state = CellState::Empty;
        self.ref_count = 0;
        self.touched = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_add_to_empty_adopts_state() {
        let mut cell = Cell::new();
        cell.add('A');
        assert_eq!(cell.state(), &CellState::Known('A'));
        assert_eq!(cell.ref_count(), 1);
        assert!(cell.is_touched());
    }

    #[test]
    fn test_add_same_state_keeps_it() {
        let mut cell = Cell::new();
        cell.add('A');
        cell.add('A');
        assert_eq!(cell.state(), &CellState::Known('A'));
        assert_eq!(cell.ref_count(), 2);
    }

    #[test]
    fn test_dont_know_is_sticky_until_empty() {
        let mut cell = Cell::new();
        cell.add('A');
        cell.add('B');
        assert_eq!(cell.state(), &CellState::DontKnow);
        assert_eq!(cell.ref_count(), 2);

        cell.decrement();
        assert_eq!(cell.state(), &CellState::DontKnow);
        assert_eq!(cell.ref_count(), 1);

        cell.set('A');
        assert_eq!(cell.state(), &CellState::DontKnow);

        cell.decrement();
        assert_eq!(cell.state(), &CellState::Empty);
        assert_eq!(cell.ref_count(), 0);
    }

    #[test]
    fn test_set_single_owner_overwrites() {
        let mut cell = Cell::new();
        cell.add(1u8);
        cell.set(2);
        assert_eq!(cell.state(), &CellState::Known(2));
        assert_eq!(cell.ref_count(), 1);
    }

    #[test]
    fn test_set_shared_disagreeing_goes_dont_know() {
        let mut cell = Cell::new();
        cell.add(1u8);
        cell.add(1);
        cell.set(2);
        assert_eq!(cell.state(), &CellState::DontKnow);
        assert_eq!(cell.ref_count(), 2);
    }

    #[test]
    fn test_set_on_empty_is_noop() {
        let mut cell: Cell<u8> = Cell::new();
        cell.set(2);
        assert_eq!(cell.state(), &CellState::Empty);
        assert!(!cell.is_touched());
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn test_decrement_empty_panics() {
        let mut cell: Cell<u8> = Cell::new();
        cell.decrement();
    }

    #[test]
    fn test_sweep_lifecycle() {
        let mut cell = Cell::new();
        cell.add(1u8);
        assert!(!cell.sweep());
        assert_eq!(cell.ref_count(), 1);
        assert!(cell.sweep());
        assert!(cell.is_empty());
        assert_eq!(cell.state(), &CellState::Empty);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8),
        Set(u8),
        Decrement,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..4).prop_map(Op::Add),
            (0u8..4).prop_map(Op::Set),
            Just(Op::Decrement),
        ]
    }

    proptest! {
        #[test]
        fn prop_refcount_matches_emptiness(
            ops in prop::collection::vec(op_strategy(), 0..64)
        ) {
            let mut cell = Cell::new();
            let mut live = 0u32;
            for op in ops {
                let was_dont_know = cell.state() == &CellState::DontKnow;
                match op {
                    Op::Add(s) => {
                        cell.add(s);
                        live += 1;
                    }
                    Op::Set(s) => cell.set(s),
                    Op::Decrement => {
                        if live == 0 {
                            continue;
                        }
                        cell.decrement();
                        live -= 1;
                    }
                }
                prop_assert_eq!(cell.ref_count(), live);
                prop_assert_eq!(
                    cell.is_empty(),
                    cell.state() == &CellState::Empty
                );
                if was_dont_know && live > 0 {
                    prop_assert_eq!(cell.state(), &CellState::DontKnow);
                }
            }
        }
    }
}
