//! The four cardinal directions a column may depend on a neighbour for.

use crate::position::ChunkPos;

/// A neighbouring column edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    PositiveX,
    NegativeX,
    PositiveZ,
    NegativeZ,
}

impl Edge {
    /// All four edges.
    pub const ALL: [Edge; 4] = [
        Edge::PositiveX,
        Edge::NegativeX,
        Edge::PositiveZ,
        Edge::NegativeZ,
    ];

    /// The `(dx, dz)` chunk offset for this edge direction.
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Edge::PositiveX => (1, 0),
            Edge::NegativeX => (-1, 0),
            Edge::PositiveZ => (0, 1),
            Edge::NegativeZ => (0, -1),
        }
    }

    /// The edge pointing back at us.
    pub const fn opposite(self) -> Edge {
        match self {
            Edge::PositiveX => Edge::NegativeX,
            Edge::NegativeX => Edge::PositiveX,
            Edge::PositiveZ => Edge::NegativeZ,
            Edge::NegativeZ => Edge::PositiveZ,
        }
    }

    /// The position of the neighbour in this edge's direction.
    pub const fn relative(self, pos: ChunkPos) -> ChunkPos {
        let (dx, dz) = self.offset();
        ChunkPos::new(pos.x + dx, pos.z + dz)
    }

    /// The edge matching a chunk offset, or `None` when the offset is not a
    /// single cardinal step.
    pub fn from_offset(dx: i32, dz: i32) -> Option<Edge> {
        Edge::ALL.into_iter().find(|e| e.offset() == (dx, dz))
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Edge::PositiveX => 0,
            Edge::NegativeX => 1,
            Edge::PositiveZ => 2,
            Edge::NegativeZ => 3,
        }
    }
}

/// A small set of [`Edge`]s backed by a bitmask.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgeSet(u8);

impl EdgeSet {
    /// The empty set.
    pub const fn new() -> Self {
        Self(0)
    }

    /// The set of all four edges.
    pub const fn all() -> Self {
        Self(0b1111)
    }

    /// Add an edge. Returns true if it was not already present.
    pub fn insert(&mut self, edge: Edge) -> bool {
        let bit = 1 << edge.index();
        let added = self.0 & bit == 0;
        self.0 |= bit;
        added
    }

    /// Remove an edge. Returns true if it was present.
    pub fn remove(&mut self, edge: Edge) -> bool {
        let bit = 1 << edge.index();
        let present = self.0 & bit != 0;
        self.0 &= !bit;
        present
    }

    pub const fn contains(&self, edge: Edge) -> bool {
        self.0 & (1 << edge.index()) != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Edge> + '_ {
        Edge::ALL.into_iter().filter(|e| self.contains(*e))
    }
}

impl FromIterator<Edge> for EdgeSet {
    fn from_iter<I: IntoIterator<Item = Edge>>(iter: I) -> Self {
        let mut set = EdgeSet::new();
        for edge in iter {
            set.insert(edge);
        }
        set
    }
}

impl std::fmt::Debug for EdgeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
