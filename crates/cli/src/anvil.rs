//! Minecraft Anvil chunk data: NBT structs, palette bit-packing and the
//! block rename pass.
//!
//! Only the tags the converter touches are modelled; everything else rides
//! along in flattened [`fastnbt::Value`] maps so unknown data survives a
//! round trip through the converter unchanged.

use std::collections::HashMap;

use fastnbt::{IntArray, LongArray};
use serde::{Deserialize, Serialize};

use chunkport_engine::position::{ChunkPos, Positioned, RegionPos};

use crate::mapping::BlockMapping;

// ── Chunk NBT structs (serde) ────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug)]
pub struct ChunkNbt {
    #[serde(rename = "DataVersion")]
    pub data_version: i32,
    #[serde(rename = "xPos")]
    pub x_pos: i32,
    #[serde(rename = "zPos")]
    pub z_pos: i32,
    #[serde(rename = "yPos")]
    pub y_pos: i32,
    pub sections: Vec<SectionNbt>,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(flatten)]
    pub extra: HashMap<String, fastnbt::Value>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SectionNbt {
    #[serde(rename = "Y")]
    pub y: i8,
    /// Lighting-only sections above and below the build range have no
    /// block states.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_states: Option<BlockStatesNbt>,
    #[serde(flatten)]
    pub extra: HashMap<String, fastnbt::Value>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct BlockStatesNbt {
    pub palette: Vec<PaletteEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<LongArray>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PaletteEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Properties")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, String>>,
}

impl PaletteEntry {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.into(),
            properties: None,
        }
    }
}

// ── Entity file NBT ──────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug)]
pub struct EntitiesNbt {
    #[serde(rename = "DataVersion")]
    pub data_version: i32,
    /// `[chunk_x, chunk_z]` of the owning chunk.
    #[serde(rename = "Position")]
    pub position: IntArray,
    #[serde(rename = "Entities")]
    pub entities: Vec<EntityNbt>,
}

impl EntitiesNbt {
    pub fn empty(position: ChunkPos, data_version: i32) -> Self {
        Self {
            data_version,
            position: IntArray::new(vec![position.x, position.z]),
            entities: Vec::new(),
        }
    }

    pub fn chunk_position(&self) -> Option<ChunkPos> {
        let x = *self.position.first()?;
        let z = *self.position.get(1)?;
        Some(ChunkPos::new(x, z))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EntityNbt {
    pub id: String,
    #[serde(rename = "Pos")]
    pub pos: Vec<f64>,
    #[serde(flatten)]
    pub extra: HashMap<String, fastnbt::Value>,
}

impl EntityNbt {
    /// The chunk this entity's world position actually falls in, or `None`
    /// when the position tag is malformed.
    pub fn chunk(&self) -> Option<ChunkPos> {
        let x = *self.pos.first()?;
        let z = *self.pos.get(2)?;
        Some(ChunkPos::new(
            (x.floor() as i32).div_euclid(16),
            (z.floor() as i32).div_euclid(16),
        ))
    }
}

// ── The unit of conversion ───────────────────────────────────────────────────

/// One chunk column moving through the converter: its terrain NBT plus the
/// matching slice of the entity file, if any.
pub struct AnvilColumn {
    pub position: ChunkPos,
    pub chunk: ChunkNbt,
    pub entities: Option<EntitiesNbt>,
}

impl AnvilColumn {
    pub fn new(chunk: ChunkNbt, entities: Option<EntitiesNbt>) -> Self {
        Self {
            position: ChunkPos::new(chunk.x_pos, chunk.z_pos),
            chunk,
            entities,
        }
    }
}

impl Positioned for AnvilColumn {
    fn position(&self) -> ChunkPos {
        self.position
    }
}

// ── Region file names ────────────────────────────────────────────────────────

/// Parse `r.X.Z.mca` into a region position.
pub fn parse_region_name(name: &str) -> Option<RegionPos> {
    let parts: Vec<&str> = name.strip_suffix(".mca")?.split('.').collect();
    if parts.len() != 3 || parts[0] != "r" {
        return None;
    }
    Some(RegionPos::new(parts[1].parse().ok()?, parts[2].parse().ok()?))
}

pub fn region_file_name(region: RegionPos) -> String {
    format!("r.{}.{}.mca", region.x, region.z)
}

// ── Bit-packing helpers ──────────────────────────────────────────────────────

/// Pack 4096 palette indices using MC's bit-packing format.
///
/// `bits_per_entry` = max(4, ceil(log2(palette_len))). Entries are packed
/// sequentially into i64s with no entry spanning two longs. A single-block
/// section needs no data array at all.
pub fn pack_indices(indices: &[u16; 4096], palette_len: usize) -> Option<Vec<i64>> {
    if palette_len <= 1 {
        return None;
    }

    let bits = bits_per_entry(palette_len);
    let entries_per_long = 64 / bits;
    let num_longs = 4096_usize.div_ceil(entries_per_long);
    let mask = (1u64 << bits) - 1;

    let mut longs = vec![0i64; num_longs];
    for (i, &idx) in indices.iter().enumerate() {
        let long_idx = i / entries_per_long;
        let bit_offset = (i % entries_per_long) * bits;
        longs[long_idx] |= ((idx as u64 & mask) << bit_offset) as i64;
    }
    Some(longs)
}

/// Unpack palette indices back into 4096 entries.
pub fn unpack_indices(data: &[i64], palette_len: usize) -> [u16; 4096] {
    let bits = bits_per_entry(palette_len);
    let entries_per_long = 64 / bits;
    let mask = (1u64 << bits) - 1;

    let mut indices = [0u16; 4096];
    for (i, idx) in indices.iter_mut().enumerate() {
        let long_idx = i / entries_per_long;
        let bit_offset = (i % entries_per_long) * bits;
        if long_idx < data.len() {
            *idx = ((data[long_idx] as u64 >> bit_offset) & mask) as u16;
        }
    }
    indices
}

/// Bits per palette entry (MC minimum is 4).
fn bits_per_entry(palette_len: usize) -> usize {
    let raw = if palette_len <= 1 {
        0
    } else {
        (usize::BITS - (palette_len - 1).leading_zeros()) as usize
    };
    raw.max(4)
}

// ── Block renaming ───────────────────────────────────────────────────────────

/// Apply a block mapping to every section palette of a chunk. Returns the
/// number of palette entries renamed.
///
/// Renaming can make two palette entries collide (both old names map to the
/// same new block), so the palette is deduplicated and the data array
/// re-packed against the smaller palette.
pub fn remap_chunk(chunk: &mut ChunkNbt, mapping: &BlockMapping) -> usize {
    if mapping.is_identity() {
        return 0;
    }

    let mut renamed = 0;
    for section in &mut chunk.sections {
        let Some(states) = section.block_states.as_mut() else {
            continue;
        };

        let mut touched = false;
        for entry in &mut states.palette {
            if let Some(new_name) = mapping.rename(&entry.name) {
                entry.name = new_name.to_string();
                renamed += 1;
                touched = true;
            }
        }
        if !touched {
            continue;
        }

        // Deduplicate colliding entries and re-index the data array.
        let old_len = states.palette.len();
        let mut new_palette: Vec<PaletteEntry> = Vec::with_capacity(old_len);
        let mut translate: Vec<u16> = Vec::with_capacity(old_len);
        for entry in states.palette.drain(..) {
            match new_palette.iter().position(|e| *e == entry) {
                Some(i) => translate.push(i as u16),
                None => {
                    translate.push(new_palette.len() as u16);
                    new_palette.push(entry);
                }
            }
        }

        if new_palette.len() != old_len {
            if let Some(data) = states.data.as_ref() {
                let mut indices = unpack_indices(data, old_len);
                for idx in &mut indices {
                    *idx = translate.get(*idx as usize).copied().unwrap_or(0);
                }
                states.data = pack_indices(&indices, new_palette.len()).map(LongArray::new);
            }
        }
        states.palette = new_palette;
    }
    renamed
}
