use slotmap::new_key_type;

use super::edge::{Edge, EdgeSet};
use crate::position::ChunkPos;

new_key_type! {
    /// Arena handle for a buffered column record.
    ///
    /// Neighbour links hold keys, never owning references, so mutual
    /// dependencies between records form no cycles.
    pub(crate) struct RecordKey;
}

/// Resolution state of a single declared neighbour requirement.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Requirement {
    /// Declared, but the neighbour has not been seen. Once the matching edge
    /// leaves `pending_check` this means the neighbour is confirmed absent.
    Unresolved,
    /// The neighbour arrived; both records reference each other.
    Linked(RecordKey),
}

/// Per-column bookkeeping while the column waits inside the resolver.
///
/// Created when a column is submitted, owned by the record arena until the
/// column is emitted, then dropped.
pub(crate) struct ColumnRecord<C> {
    pub position: ChunkPos,
    /// The column payload. Present from submission until emission; taken
    /// out temporarily while a cluster transform borrows it.
    pub payload: Option<C>,
    /// One slot per edge. `None` means the edge is irrelevant to this
    /// column's transforms.
    required: [Option<Requirement>; 4],
    /// Edges whose neighbour's existence is still unknown. Distinct from
    /// `required`: a column with no requirements of its own must still wait
    /// here, because a neighbour may turn out to require *it*.
    pub pending_check: EdgeSet,
    submitted: bool,
}

impl<C> ColumnRecord<C> {
    pub fn new(position: ChunkPos, payload: C, required: EdgeSet) -> Self {
        let mut slots = [None, None, None, None];
        for edge in required.iter() {
            slots[edge.index()] = Some(Requirement::Unresolved);
        }
        Self {
            position,
            payload: Some(payload),
            required: slots,
            pending_check: EdgeSet::all(),
            submitted: false,
        }
    }

    /// Whether this edge carries a requirement (declared or forced by a
    /// neighbour's reciprocal link).
    pub fn requires(&self, edge: Edge) -> bool {
        self.required[edge.index()].is_some()
    }

    /// Record that the neighbour along `edge` is buffered at `key`.
    ///
    /// Also used to force the reciprocal link onto a neighbour that never
    /// declared the edge itself: the back link keeps the pair in one
    /// cluster, so neither side is emitted while the other may still read
    /// its payload.
    pub fn link(&mut self, edge: Edge, key: RecordKey) {
        self.required[edge.index()] = Some(Requirement::Linked(key));
    }

    /// Drop a requirement that is provably unsatisfiable (the position it
    /// points at can no longer arrive).
    pub fn clear_unresolved(&mut self, edge: Edge) {
        if let Some(Requirement::Unresolved) = self.required[edge.index()] {
            self.required[edge.index()] = None;
        }
    }

    pub fn no_requirements(&self) -> bool {
        self.required.iter().all(Option::is_none)
    }

    /// Keys of every neighbour that actually linked.
    pub fn linked(&self) -> impl Iterator<Item = RecordKey> + '_ {
        self.required.iter().filter_map(|slot| match slot {
            Some(Requirement::Linked(key)) => Some(*key),
            _ => None,
        })
    }

    /// Linked neighbours together with the edge they sit on.
    pub fn linked_edges(&self) -> impl Iterator<Item = (Edge, RecordKey)> + '_ {
        Edge::ALL.into_iter().filter_map(|edge| {
            match self.required[edge.index()] {
                Some(Requirement::Linked(key)) => Some((edge, key)),
                _ => None,
            }
        })
    }

    /// Take the payload for emission. A record may be emitted exactly once;
    /// anything else is a bug in the resolver.
    pub fn take_for_emit(&mut self) -> C {
        assert!(!self.submitted, "column ({}, {}) emitted twice", self.position.x, self.position.z);
        self.submitted = true;
        match self.payload.take() {
            Some(payload) => payload,
            None => panic!(
                "column ({}, {}) payload missing at emission",
                self.position.x, self.position.z
            ),
        }
    }
}
