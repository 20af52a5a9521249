//! Downstream contract for resolved columns.

use crate::position::RegionPos;

/// Consumer of fully resolved columns and completion signals.
///
/// Every callback runs synchronously inside the resolver's critical
/// section: implementations must not call back into the resolver, and
/// should expect calls from whichever thread happened to complete the
/// cluster.
pub trait ColumnSink<C>: Send + Sync {
    /// A column is done. Called exactly once per submitted position, never
    /// before the column's cluster has finished pre-transforming.
    fn column_resolved(&self, column: C);

    /// Every column ever submitted for `region` has been resolved and the
    /// region was marked complete. Fires exactly once per completed region.
    fn region_complete(&self, region: RegionPos);

    /// The whole input stream has drained. Fires exactly once.
    fn stream_complete(&self);
}
