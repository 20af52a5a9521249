//! Format-neutral core of the chunkport world converter.
//!
//! A world conversion streams columns (16x16 chunks of save data) through a
//! pipeline that normally treats each column independently. Some
//! transformations, however, need data from *neighbouring* columns -- and
//! columns arrive in whatever order the reader produces them. The
//! [`pretransform`] module solves that online dependency problem; this crate
//! knows nothing about storage formats and treats column payloads as opaque.

pub mod position;
pub mod pretransform;
