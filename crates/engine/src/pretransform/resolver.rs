//! The online dependency resolver.
//!
//! Columns are pushed in one at a time, possibly from several reader
//! threads. Each submission either emits immediately (nothing depends on it
//! and it depends on nothing) or parks the column in its region bucket until
//! the cluster of mutually dependent columns around it is provably closed.
//! Region-completion signals and the final drain force out whatever could
//! never resolve -- a column at the edge of the world legitimately has no
//! neighbour on one side.
//!
//! All engine state sits behind one mutex, held for the full duration of a
//! logical operation: a half-applied `submit` is never observable from
//! `complete_region` or `flush_all`, and the sink sees a consistent stream.

use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Mutex;

use slotmap::SlotMap;

use super::edge::{Edge, EdgeSet};
use super::manager::{Neighbours, PreTransformManager};
use super::record::{ColumnRecord, RecordKey};
use super::sink::ColumnSink;
use crate::position::{ChunkPos, Positioned, REGION_SIZE, RegionPos};

/// Cross-chunk pre-transform dependency resolver.
///
/// Generic over the column payload `C`, the writer's pre-transform manager
/// `M` and the downstream sink `S`. `submit` may be called concurrently;
/// `complete_region` and `flush_all` serialize against everything else.
pub struct Resolver<C, M, S> {
    manager: M,
    sink: S,
    state: Mutex<State<C>>,
}

struct State<C> {
    /// Every buffered record, keyed by arena handle. Neighbour links are
    /// handles into this arena.
    records: SlotMap<RecordKey, ColumnRecord<C>>,
    /// Region buckets: the not-yet-solvable columns of each region.
    pending: HashMap<RegionPos, HashMap<ChunkPos, RecordKey>>,
    /// Regions that may still produce columns. A region only leaves via
    /// `complete_region`.
    incomplete_regions: HashSet<RegionPos>,
    /// Every position ever submitted. Guards against duplicates and lets
    /// the boundary ring skip chunks that really existed.
    processed: HashSet<ChunkPos>,
    /// Records whose uncertainty is gone (empty pending set) and that
    /// should be tried for cluster resolution.
    pending_solve: Vec<RecordKey>,
    // Traversal scratch, reused across calls and cleared on every exit.
    solving_stack: Vec<RecordKey>,
    checking: HashSet<RecordKey>,
    solved: HashSet<RecordKey>,
}

impl<C, M, S> Resolver<C, M, S>
where
    C: Positioned,
    M: PreTransformManager<C>,
    S: ColumnSink<C>,
{
    /// Create a resolver. `regions` is every region the upstream reader
    /// will produce columns for; a position outside these regions is known
    /// absent from the start.
    pub fn new(manager: M, sink: S, regions: impl IntoIterator<Item = RegionPos>) -> Self {
        Self {
            manager,
            sink,
            state: Mutex::new(State {
                records: SlotMap::with_key(),
                pending: HashMap::new(),
                incomplete_regions: regions.into_iter().collect(),
                processed: HashSet::new(),
                pending_solve: Vec::new(),
                solving_stack: Vec::new(),
                checking: HashSet::new(),
                solved: HashSet::new(),
            }),
        }
    }

    /// The writer-owned pre-transform manager.
    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// The downstream sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Ingest one column together with the edges its transforms require.
    ///
    /// Panics if this position was already submitted -- that is a bug in
    /// the upstream pipeline, not a recoverable condition.
    pub fn submit(&self, column: C, required: EdgeSet) {
        let position = column.position();
        let mut state = self.lock();
        state.submit(position, column, required, &self.manager, &self.sink);
    }

    /// Upstream guarantees no further columns for `region`. Resolves every
    /// edge that was waiting on a position in this region as "neighbour
    /// absent" and drains whatever that unblocks.
    ///
    /// Panics when a region is completed twice.
    pub fn complete_region(&self, region: RegionPos) {
        let mut state = self.lock();
        state.complete_region(region, &self.manager, &self.sink);
    }

    /// The input stream is exhausted: transform and emit everything still
    /// buffered (missing neighbours stay missing), then signal stream
    /// completion.
    pub fn flush_all(&self) {
        let mut state = self.lock();
        state.flush_all(&self.manager, &self.sink);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State<C>> {
        // A poisoning panic already aborted the conversion; nothing to save.
        self.state.lock().expect("resolver state poisoned")
    }
}

impl<C> State<C> {
    fn submit<M, S>(
        &mut self,
        position: ChunkPos,
        column: C,
        required: EdgeSet,
        manager: &M,
        sink: &S,
    ) where
        M: PreTransformManager<C>,
        S: ColumnSink<C>,
    {
        assert!(
            self.processed.insert(position),
            "duplicate column submitted at ({}, {})",
            position.x,
            position.z
        );

        let key = self
            .records
            .insert(ColumnRecord::new(position, column, required));

        // Resolve each edge against what we currently know about the
        // neighbour there; this may also wake neighbours that were waiting
        // to learn about *us*.
        for edge in Edge::ALL {
            if self.solve_edge(position, edge, Some(key), manager, sink) {
                self.records[key].pending_check.remove(edge);
            }
        }

        let record = &self.records[key];
        if record.no_requirements() && record.pending_check.is_empty() {
            // Nothing depends on this column and it depends on nothing:
            // straight through, never buffered.
            tracing::trace!("column ({}, {}) resolved on submit", position.x, position.z);
            self.emit_isolated(key, manager, sink);
        } else {
            let ready_for_solve = record.pending_check.is_empty();
            self.pending
                .entry(position.region())
                .or_default()
                .insert(position, key);
            if ready_for_solve {
                // All uncertainty resolved; only real dependencies remain,
                // so the surrounding cluster may now be closed.
                self.pending_solve.push(key);
            }
        }

        self.process_pending_solve(manager, sink);
    }

    /// Resolve one edge of `position` against the engine's knowledge of the
    /// neighbour in that direction. `source` is the record being submitted,
    /// or `None` when a region boundary is marking the position absent.
    ///
    /// Returns true when the edge's status is now known and it should leave
    /// the submitting record's pending set.
    fn solve_edge<M, S>(
        &mut self,
        position: ChunkPos,
        edge: Edge,
        source: Option<RecordKey>,
        manager: &M,
        sink: &S,
    ) -> bool
    where
        M: PreTransformManager<C>,
        S: ColumnSink<C>,
    {
        let opposite = edge.opposite();
        let target = edge.relative(position);
        let target_region = target.region();
        let target_key = self
            .pending
            .get(&target_region)
            .and_then(|bucket| bucket.get(&target))
            .copied();

        let Some(target_key) = target_key else {
            // Nothing buffered there. The edge stays pending unless the
            // region can no longer produce the neighbour.
            return !self.incomplete_regions.contains(&target_region);
        };

        // Link both ways when we declared this edge. The reciprocal link is
        // forced onto the neighbour even if it never asked for us: it keeps
        // the pair in one cluster so neither is emitted while the other may
        // still read its payload.
        if let Some(source_key) = source {
            if self.records[source_key].requires(edge) {
                self.records[target_key].link(opposite, source_key);
                self.records[source_key].link(edge, target_key);
            }
        }

        // If the neighbour was waiting to learn whether we exist, tell it.
        if self.records[target_key].pending_check.remove(opposite) {
            if let Some(source_key) = source {
                if self.records[target_key].requires(opposite) {
                    self.records[target_key].link(opposite, source_key);
                    self.records[source_key].link(edge, target_key);
                }
            }

            let target_record = &self.records[target_key];
            if target_record.no_requirements() && target_record.pending_check.is_empty() {
                // It was only waiting to find out nobody needed it.
                tracing::trace!(
                    "column ({}, {}) released by neighbour at ({}, {})",
                    target.x,
                    target.z,
                    position.x,
                    position.z
                );
                self.emit_isolated(target_key, manager, sink);
                self.release(target, sink);
            } else if self.records[target_key].pending_check.is_empty() {
                self.pending_solve.push(target_key);
            }
        }

        true
    }

    /// Try to close the dependency clusters around every worklist entry,
    /// then transform and emit all members found.
    fn process_pending_solve<M, S>(&mut self, manager: &M, sink: &S)
    where
        M: PreTransformManager<C>,
        S: ColumnSink<C>,
    {
        if self.pending_solve.is_empty() {
            return;
        }

        let mut pending = mem::take(&mut self.pending_solve);
        for &key in &pending {
            self.try_solve(key);
        }
        pending.clear();
        self.pending_solve = pending;

        if self.solved.is_empty() {
            return;
        }

        let cluster: Vec<RecordKey> = self.solved.drain().collect();
        self.transform_cluster(&cluster, manager, sink);
        for key in cluster {
            let record = match self.records.remove(key) {
                Some(record) => record,
                None => panic!("solved record vanished from arena"),
            };
            self.release(record.position, sink);
        }
    }

    /// Reachability walk over the linked-requirement graph from `input`.
    ///
    /// Collects every reachable record into the solved set -- unless any
    /// visited record still has unknown edges, in which case the walk is
    /// abandoned without touching engine state. Unresolved requirements on
    /// a record with an empty pending set are confirmed-absent neighbours
    /// and simply not followed.
    fn try_solve(&mut self, input: RecordKey) {
        let mut stack = mem::take(&mut self.solving_stack);
        let mut checking = mem::take(&mut self.checking);

        stack.push(input);
        while let Some(current) = stack.pop() {
            let record = &self.records[current];
            if !record.pending_check.is_empty() {
                // The cluster is not provably closed yet.
                checking.clear();
                break;
            }
            if checking.insert(current) {
                for key in record.linked() {
                    if !checking.contains(&key) {
                        stack.push(key);
                    }
                }
            }
        }

        self.solved.extend(checking.drain());
        stack.clear();
        self.solving_stack = stack;
        self.checking = checking;
    }

    /// Pre-transform every member of a solved cluster, then emit them all.
    ///
    /// Two phases on purpose: a member's transform may read (or write) any
    /// other member's payload, so no member may leave the engine before
    /// every transform has run.
    fn transform_cluster<M, S>(&mut self, cluster: &[RecordKey], manager: &M, sink: &S)
    where
        M: PreTransformManager<C>,
        S: ColumnSink<C>,
    {
        for &key in cluster {
            let links: Vec<(Edge, RecordKey)> = self.records[key].linked_edges().collect();

            let mut payload = match self.records[key].payload.take() {
                Some(payload) => payload,
                None => panic!("cluster member lost its payload before transform"),
            };
            let mut neighbours = Neighbours::empty();
            for &(edge, neighbour_key) in &links {
                if let Some(neighbour) = self.records[neighbour_key].payload.take() {
                    neighbours.set(edge, neighbour);
                }
            }

            manager.transform(&mut payload, &mut neighbours);

            for &(edge, neighbour_key) in &links {
                if let Some(neighbour) = neighbours.take(edge) {
                    self.records[neighbour_key].payload = Some(neighbour);
                }
            }
            self.records[key].payload = Some(payload);
        }

        for &key in cluster {
            let payload = self.records[key].take_for_emit();
            sink.column_resolved(payload);
        }
    }

    /// Transform and emit a record that resolved with no linked neighbours.
    /// Removes it from the arena; bucket cleanup is the caller's concern.
    fn emit_isolated<M, S>(&mut self, key: RecordKey, manager: &M, sink: &S)
    where
        M: PreTransformManager<C>,
        S: ColumnSink<C>,
    {
        let mut record = match self.records.remove(key) {
            Some(record) => record,
            None => panic!("emitted record missing from arena"),
        };
        let mut payload = record.take_for_emit();
        let mut neighbours = Neighbours::empty();
        manager.transform(&mut payload, &mut neighbours);
        sink.column_resolved(payload);
    }

    /// Drop an emitted column's bucket entry; fires the deferred completion
    /// signal when that drains a region already marked complete.
    fn release<S>(&mut self, position: ChunkPos, sink: &S)
    where
        S: ColumnSink<C>,
    {
        let region = position.region();
        if let Some(bucket) = self.pending.get_mut(&region) {
            bucket.remove(&position);
            if bucket.is_empty() && !self.incomplete_regions.contains(&region) {
                self.pending.remove(&region);
                tracing::debug!("region ({}, {}) drained", region.x, region.z);
                sink.region_complete(region);
            }
        }
    }

    fn complete_region<M, S>(&mut self, region: RegionPos, manager: &M, sink: &S)
    where
        M: PreTransformManager<C>,
        S: ColumnSink<C>,
    {
        assert!(
            self.incomplete_regions.remove(&region),
            "region ({}, {}) completed twice",
            region.x,
            region.z
        );

        if !self.pending.contains_key(&region) {
            // Nothing was ever waiting here.
            sink.region_complete(region);
            return;
        }

        // Inside pass: an edge pointing at a position inside this region
        // can no longer be satisfied by a new arrival. Check it off; a
        // requirement on it is confirmed absent.
        let entries: Vec<(ChunkPos, RecordKey)> = self.pending[&region]
            .iter()
            .map(|(pos, key)| (*pos, *key))
            .collect();
        tracing::debug!(
            "region ({}, {}) complete with {} columns buffered",
            region.x,
            region.z,
            entries.len()
        );
        for (position, key) in entries {
            let record = &mut self.records[key];
            for edge in Edge::ALL {
                if region.contains(edge.relative(position)) {
                    record.pending_check.remove(edge);
                    record.clear_unresolved(edge);
                }
            }
            if record.pending_check.is_empty() {
                self.pending_solve.push(key);
            }
        }
        self.process_pending_solve(manager, sink);

        // Boundary ring: buffered columns in *neighbouring* regions may
        // have been waiting on border positions here that never arrived.
        // Corners first (two outward edges each), then the four sides.
        let last = REGION_SIZE - 1;
        self.mark_absent(region.chunk(0, 0), &[Edge::NegativeX, Edge::NegativeZ], manager, sink);
        self.mark_absent(region.chunk(last, 0), &[Edge::PositiveX, Edge::NegativeZ], manager, sink);
        self.mark_absent(region.chunk(0, last), &[Edge::NegativeX, Edge::PositiveZ], manager, sink);
        self.mark_absent(region.chunk(last, last), &[Edge::PositiveX, Edge::PositiveZ], manager, sink);
        for x in 1..last {
            self.mark_absent(region.chunk(x, 0), &[Edge::NegativeZ], manager, sink);
            self.mark_absent(region.chunk(x, last), &[Edge::PositiveZ], manager, sink);
        }
        for z in 1..last {
            self.mark_absent(region.chunk(0, z), &[Edge::NegativeX], manager, sink);
            self.mark_absent(region.chunk(last, z), &[Edge::PositiveX], manager, sink);
        }

        // Anything still buffered is entangled with another incomplete
        // region; the completion signal defers until that drains.
        if self.pending.get(&region).is_some_and(HashMap::is_empty) {
            self.pending.remove(&region);
            sink.region_complete(region);
        }
    }

    /// A border position of a completed region never arrived: resolve the
    /// given outward edges as "neighbour absent" for whoever was waiting.
    fn mark_absent<M, S>(&mut self, position: ChunkPos, edges: &[Edge], manager: &M, sink: &S)
    where
        M: PreTransformManager<C>,
        S: ColumnSink<C>,
    {
        if self.processed.contains(&position) {
            // The chunk really existed; its own submission already told the
            // neighbours everything they needed.
            return;
        }
        for &edge in edges {
            self.solve_edge(position, edge, None, manager, sink);
        }
        self.process_pending_solve(manager, sink);
    }

    fn flush_all<M, S>(&mut self, manager: &M, sink: &S)
    where
        M: PreTransformManager<C>,
        S: ColumnSink<C>,
    {
        let remaining: Vec<RecordKey> = self
            .pending
            .values()
            .flat_map(|bucket| bucket.values().copied())
            .collect();

        if !remaining.is_empty() {
            // Clusters may span regions, so every transform runs before any
            // record is torn down.
            tracing::debug!("final drain: {} columns never fully resolved", remaining.len());
            self.transform_cluster(&remaining, manager, sink);
            for &key in &remaining {
                self.records.remove(key);
            }
        }

        // Regions marked complete while columns were still buffered never
        // got their signal; the drain just emptied them.
        let regions: Vec<RegionPos> = self.pending.keys().copied().collect();
        self.pending.clear();
        for region in regions {
            if !self.incomplete_regions.contains(&region) {
                sink.region_complete(region);
            }
        }

        sink.stream_complete();
    }
}
