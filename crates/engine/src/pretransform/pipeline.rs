//! Writer-facing entry point around the resolver.

use std::sync::Arc;

use super::manager::PreTransformManager;
use super::resolver::Resolver;
use super::sink::ColumnSink;
use crate::position::{Positioned, RegionPos};

/// Front door of the pre-transform stage.
///
/// Wraps a shared [`Resolver`] and runs the manager's requirement analysis
/// on each incoming column before handing it over. Cheap to clone into
/// worker threads.
pub struct PreTransformPipeline<C, M, S> {
    resolver: Arc<Resolver<C, M, S>>,
    enabled: bool,
}

impl<C, M, S> Clone for PreTransformPipeline<C, M, S> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
            enabled: self.enabled,
        }
    }
}

impl<C, M, S> PreTransformPipeline<C, M, S>
where
    C: Positioned,
    M: PreTransformManager<C>,
    S: ColumnSink<C>,
{
    /// Build a pipeline for one conversion run. `regions` lists every region
    /// the reader will produce columns for.
    pub fn new(manager: M, sink: S, regions: impl IntoIterator<Item = RegionPos>) -> Self {
        Self {
            resolver: Arc::new(Resolver::new(manager, sink, regions)),
            enabled: true,
        }
    }

    /// Disable cross-chunk solving: every column passes straight through
    /// with no neighbour requirements.
    pub fn without_solving(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn resolver(&self) -> &Resolver<C, M, S> {
        &self.resolver
    }

    /// Ingest one freshly read column.
    pub fn convert_column(&self, mut column: C) {
        let required = if self.enabled {
            self.resolver.manager().solve(&mut column)
        } else {
            self.resolver.manager().solving_skipped(&mut column);
            super::edge::EdgeSet::new()
        };
        self.resolver.submit(column, required);
    }

    /// The reader finished `region`; no more columns will arrive for it.
    pub fn flush_region(&self, region: RegionPos) {
        self.resolver.complete_region(region);
    }

    /// The reader is done entirely. Drains everything still buffered and
    /// fires the stream-complete signal.
    pub fn flush_columns(&self) {
        self.resolver.flush_all();
    }
}
