//! Entity relocation: moving entities whose saved position has drifted out
//! of the chunk that stores them.
//!
//! Vanilla tolerates a stale owner chunk, but converted worlds should not
//! carry it over. An entity one chunk over is moved into that neighbour's
//! entity list; this is the cross-chunk fix that needs the neighbour column
//! in hand, so it runs as the pipeline's pre-transform.

use std::sync::atomic::{AtomicU64, Ordering};

use chunkport_engine::pretransform::edge::{Edge, EdgeSet};
use chunkport_engine::pretransform::manager::{Neighbours, PreTransformManager};

use crate::anvil::{AnvilColumn, EntitiesNbt};

#[derive(Default)]
pub struct EntityRelocation {
    relocated: AtomicU64,
    stranded: AtomicU64,
    skipped_columns: AtomicU64,
}

impl EntityRelocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entities moved into a neighbouring chunk's list.
    pub fn relocated(&self) -> u64 {
        self.relocated.load(Ordering::Relaxed)
    }

    /// Out-of-chunk entities left where they were: the target chunk does
    /// not exist, is more than one chunk away, or sits diagonally.
    pub fn stranded(&self) -> u64 {
        self.stranded.load(Ordering::Relaxed)
    }

    pub fn skipped_columns(&self) -> u64 {
        self.skipped_columns.load(Ordering::Relaxed)
    }
}

impl PreTransformManager<AnvilColumn> for EntityRelocation {
    fn solve(&self, column: &mut AnvilColumn) -> EdgeSet {
        let Some(entities) = column.entities.as_ref() else {
            return EdgeSet::new();
        };
        let origin = column.position;
        entities
            .entities
            .iter()
            .filter_map(|entity| {
                let target = entity.chunk()?;
                Edge::from_offset(target.x - origin.x, target.z - origin.z)
            })
            .collect()
    }

    fn transform(&self, column: &mut AnvilColumn, neighbours: &mut Neighbours<AnvilColumn>) {
        let origin = column.position;
        let Some(entities) = column.entities.as_mut() else {
            return;
        };
        let data_version = entities.data_version;

        let mut kept = Vec::with_capacity(entities.entities.len());
        for entity in entities.entities.drain(..) {
            let target = entity.chunk();
            if target.is_none() || target == Some(origin) {
                kept.push(entity);
                continue;
            }
            let target = target.unwrap();

            let neighbour = Edge::from_offset(target.x - origin.x, target.z - origin.z)
                .and_then(|edge| neighbours.get_mut(edge));
            match neighbour {
                Some(neighbour) => {
                    let position = neighbour.position;
                    let dest = neighbour
                        .entities
                        .get_or_insert_with(|| EntitiesNbt::empty(position, data_version));
                    tracing::trace!(
                        "moving {} from chunk ({}, {}) to ({}, {})",
                        entity.id,
                        origin.x,
                        origin.z,
                        target.x,
                        target.z
                    );
                    dest.entities.push(entity);
                    self.relocated.fetch_add(1, Ordering::Relaxed);
                }
                None => {
                    // Target chunk absent or unreachable; the entity stays
                    // in its stored chunk, same as before conversion.
                    kept.push(entity);
                    self.stranded.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        entities.entities = kept;
    }

    fn solving_skipped(&self, _column: &mut AnvilColumn) {
        self.skipped_columns.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::anvil::{ChunkNbt, EntityNbt};
    use chunkport_engine::position::ChunkPos;

    fn column(x: i32, z: i32, entity_positions: &[[f64; 3]]) -> AnvilColumn {
        let chunk = ChunkNbt {
            data_version: 3953,
            x_pos: x,
            z_pos: z,
            y_pos: -4,
            sections: Vec::new(),
            status: "minecraft:full".into(),
            extra: HashMap::new(),
        };
        let entities = (!entity_positions.is_empty()).then(|| EntitiesNbt {
            data_version: 3953,
            position: fastnbt::IntArray::new(vec![x, z]),
            entities: entity_positions
                .iter()
                .map(|pos| EntityNbt {
                    id: "minecraft:cow".into(),
                    pos: pos.to_vec(),
                    extra: HashMap::new(),
                })
                .collect(),
        });
        AnvilColumn::new(chunk, entities)
    }

    #[test]
    fn solve_reports_edges_of_wandered_entities() {
        let relocation = EntityRelocation::new();
        // In chunk (0, 0): one entity at home, one in (1, 0), one in (0, -1).
        let mut column = column(0, 0, &[[8.0, 64.0, 8.0], [17.0, 64.0, 3.0], [5.0, 64.0, -1.0]]);
        let edges = relocation.solve(&mut column);
        assert!(edges.contains(Edge::PositiveX));
        assert!(edges.contains(Edge::NegativeZ));
        assert_eq!(edges.len(), 2);
    }

    #[test]
    fn solve_ignores_diagonal_and_distant_targets() {
        let relocation = EntityRelocation::new();
        let mut column = column(0, 0, &[[-1.0, 64.0, -1.0], [40.0, 64.0, 8.0]]);
        assert!(relocation.solve(&mut column).is_empty());
    }

    #[test]
    fn transform_moves_entity_into_neighbour() {
        let relocation = EntityRelocation::new();
        let mut source = column(0, 0, &[[8.0, 64.0, 8.0], [17.0, 64.0, 3.0]]);
        let mut neighbours = Neighbours::default();
        // The neighbour has no entity file of its own yet.
        let target = column(1, 0, &[]);
        assert!(target.entities.is_none());
        neighbours.set(Edge::PositiveX, target);

        relocation.transform(&mut source, &mut neighbours);

        assert_eq!(source.entities.as_ref().unwrap().entities.len(), 1);
        let moved = neighbours.get(Edge::PositiveX).unwrap();
        let dest = moved.entities.as_ref().unwrap();
        assert_eq!(dest.entities.len(), 1);
        assert_eq!(dest.entities[0].pos, vec![17.0, 64.0, 3.0]);
        assert_eq!(dest.chunk_position(), Some(ChunkPos::new(1, 0)));
        assert_eq!(relocation.relocated(), 1);
        assert_eq!(relocation.stranded(), 0);
    }

    #[test]
    fn transform_strands_entity_without_neighbour() {
        let relocation = EntityRelocation::new();
        let mut source = column(0, 0, &[[17.0, 64.0, 3.0]]);
        let mut neighbours = Neighbours::default();

        relocation.transform(&mut source, &mut neighbours);

        // Nowhere to go: it stays put.
        assert_eq!(source.entities.as_ref().unwrap().entities.len(), 1);
        assert_eq!(relocation.relocated(), 0);
        assert_eq!(relocation.stranded(), 1);
    }
}
