//! World conversion for Minecraft Anvil saves.
//!
//! Reads a world's region and entity files, applies a block rename mapping,
//! relocates entities that have wandered out of their stored chunk, and
//! writes a fresh copy of the world. Chunks whose fixes need data from a
//! neighbouring chunk go through the cross-chunk resolver in
//! `chunkport-engine` so the neighbour is guaranteed present (or proven
//! absent) before the chunk is written.

pub mod anvil;
pub mod convert;
pub mod mapping;
pub mod relocate;
