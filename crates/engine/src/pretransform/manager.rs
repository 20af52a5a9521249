//! The writer-owned pre-transform collaborator.

use super::edge::{Edge, EdgeSet};

/// The neighbour payloads handed to a pre-transform, keyed by edge.
///
/// Only neighbours that actually resolved are present; an edge that was
/// required but proven absent (world border, region already complete) is
/// simply missing. Access is mutable so a transform can move data *into* a
/// neighbour, not just read from it.
pub struct Neighbours<C> {
    slots: [Option<C>; 4],
}

impl<C> Neighbours<C> {
    pub fn empty() -> Self {
        Self {
            slots: [None, None, None, None],
        }
    }

    pub fn get(&self, edge: Edge) -> Option<&C> {
        self.slots[edge.index()].as_ref()
    }

    pub fn get_mut(&mut self, edge: Edge) -> Option<&mut C> {
        self.slots[edge.index()].as_mut()
    }

    pub fn contains(&self, edge: Edge) -> bool {
        self.slots[edge.index()].is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Edge, &C)> {
        Edge::ALL
            .into_iter()
            .filter_map(|edge| self.slots[edge.index()].as_ref().map(|c| (edge, c)))
    }

    /// Place a payload on an edge. The resolver fills slots this way before
    /// a transform; useful for exercising a manager in isolation too.
    pub fn set(&mut self, edge: Edge, payload: C) {
        self.slots[edge.index()] = Some(payload);
    }

    pub fn take(&mut self, edge: Edge) -> Option<C> {
        self.slots[edge.index()].take()
    }
}

impl<C> Default for Neighbours<C> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Decides what a column needs from its neighbours and performs the actual
/// transformation. Owned by the writer side of the pipeline; the resolver
/// only ever talks to it through this trait.
pub trait PreTransformManager<C>: Send + Sync {
    /// Inspect a freshly read column and return the neighbour edges its
    /// transforms will need access to. Called once per column, before the
    /// column enters the resolver.
    fn solve(&self, column: &mut C) -> EdgeSet;

    /// Run the column's transforms. Called exactly once per column, when
    /// its dependency cluster is proven closed (or at final drain), with
    /// every required neighbour that actually existed.
    fn transform(&self, column: &mut C, neighbours: &mut Neighbours<C>);

    /// Cross-chunk solving is disabled for this conversion: the column goes
    /// straight through with no requirements and [`Self::transform`] will
    /// later run with no neighbour data. Lets implementations count or log
    /// what they skipped.
    fn solving_skipped(&self, _column: &mut C) {}
}

/// The explicit "no pre-transform capability" implementation.
pub struct NoopPreTransform;

impl<C> PreTransformManager<C> for NoopPreTransform {
    fn solve(&self, _column: &mut C) -> EdgeSet {
        EdgeSet::new()
    }

    fn transform(&self, _column: &mut C, _neighbours: &mut Neighbours<C>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbours_set_take_round_trip() {
        let mut neighbours: Neighbours<u32> = Neighbours::empty();
        assert!(neighbours.is_empty());

        neighbours.set(Edge::PositiveX, 7);
        neighbours.set(Edge::NegativeZ, 9);
        assert!(neighbours.contains(Edge::PositiveX));
        assert!(!neighbours.contains(Edge::NegativeX));
        assert_eq!(neighbours.get(Edge::PositiveX), Some(&7));
        assert_eq!(neighbours.iter().count(), 2);

        assert_eq!(neighbours.take(Edge::NegativeZ), Some(9));
        assert_eq!(neighbours.take(Edge::NegativeZ), None);
        if let Some(v) = neighbours.get_mut(Edge::PositiveX) {
            *v = 8;
        }
        assert_eq!(neighbours.get(Edge::PositiveX), Some(&8));
    }

    #[test]
    fn noop_manager_requires_and_changes_nothing() {
        let noop = NoopPreTransform;
        let mut column = 1u32;
        assert!(noop.solve(&mut column).is_empty());
        let mut neighbours = Neighbours::empty();
        noop.transform(&mut column, &mut neighbours);
        noop.solving_skipped(&mut column);
        assert_eq!(column, 1);
    }
}
