//! Cross-chunk pre-transform dependency resolution.
//!
//! A conversion pipeline streams columns one at a time, in no predictable
//! order, from an input that may be far larger than memory. Most columns
//! convert independently, but a pre-transform may need to *read* (or move
//! data into) a neighbouring column -- relocating an entity that sits across
//! a chunk boundary, for example. This module lets those columns wait for
//! each other without stalling the rest of the stream:
//!
//! * [`resolver::Resolver`] ingests columns, links mutual neighbours as they
//!   become known, and emits each column exactly once -- immediately when
//!   nothing can depend on it, or together with its whole dependency cluster
//!   once that cluster is provably closed.
//! * [`manager::PreTransformManager`] is the writer-owned collaborator that
//!   declares which edges a column needs and performs the actual transform.
//! * [`sink::ColumnSink`] receives resolved columns and region/stream
//!   completion signals downstream.
//! * [`pipeline::PreTransformPipeline`] wires the manager in front of the
//!   resolver.
//!
//! Memory stays bounded because completed work is flushed eagerly: a region
//! bucket only holds columns that are still entangled with an unknown
//! neighbour, and upstream's region-completion signals retire entire areas.

pub mod edge;
pub mod manager;
pub mod pipeline;
mod record;
pub mod resolver;
pub mod sink;
