//! Dimensions-list-state plumbing for visualization widgets.
//!
//! A [`ListState`] records which dimensions of a dataset a plot currently
//! shows and which it hides, as index lists into the original dimension
//! order. Plots expose the state through [`DimensionPlot`];
//! [`apply_dimensions_list_state`] is the single entry point that stores a
//! new state and drives the recomputation the plot needs afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Included and excluded dimension indices, both referring to the dimension
/// order the plot was built with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListState {
    pub included: Vec<usize>,
    pub excluded: Vec<usize>,
}

impl ListState {
    pub fn new(included: Vec<usize>, excluded: Vec<usize>) -> Self {
        Self { included, excluded }
    }

    /// A state including all of `len` elements, excluding none.
    pub fn all_included(len: usize) -> Self {
        Self { included: (0..len).collect(), excluded: Vec::new() }
    }

    pub fn is_included(&self, index: usize) -> bool {
        self.included.contains(&index)
    }
}

impl fmt::Display for ListState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListState({:?},{:?})", self.included, self.excluded)
    }
}

/// The seam between the list-state plumbing and a visualization widget.
///
/// `set_dimensions_list_state` is storage only; the recompute hooks are
/// driven separately so a plot constructor can install its initial state
/// without triggering a layout pass.
pub trait DimensionPlot {
    fn dimensions_list_state(&self) -> &ListState;
    fn set_dimensions_list_state(&mut self, state: ListState);

    /// Recompute which dimensions are active from the stored state.
    fn reset_active_dimensions(&mut self);

    /// Recompute the plot layout from the active dimensions.
    fn update_layout(&mut self);
}

/// Store a new dimensions list state on the plot, then recompute its active
/// dimensions and its layout, in that order. Both recomputations run
/// unconditionally, even when the new state equals the old one.
pub fn apply_dimensions_list_state(plot: &mut impl DimensionPlot, state: ListState) {
    plot.set_dimensions_list_state(state);
    plot.reset_active_dimensions();
    plot.update_layout();
}
