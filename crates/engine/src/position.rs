//! Chunk and region co-ordinates.

/// Columns per region along each horizontal axis.
pub const REGION_SIZE: i32 = 32;

/// Co-ordinates of a column (a 16x16 vertical slice of world data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The region this column belongs to. Exact floor division, so negative
    /// co-ordinates round toward negative infinity and match how the region
    /// files on disk are laid out.
    pub const fn region(&self) -> RegionPos {
        RegionPos {
            x: self.x.div_euclid(REGION_SIZE),
            z: self.z.div_euclid(REGION_SIZE),
        }
    }
}

/// Co-ordinates of a 32x32 group of columns.
///
/// Regions exist to bound memory: upstream signals "no more columns will
/// ever arrive for this region", which lets buffered work drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The absolute position of a column inside this region.
    /// `local_x` and `local_z` are in `0..REGION_SIZE`.
    pub const fn chunk(&self, local_x: i32, local_z: i32) -> ChunkPos {
        ChunkPos {
            x: self.x * REGION_SIZE + local_x,
            z: self.z * REGION_SIZE + local_z,
        }
    }

    /// Whether a column position falls inside this region.
    pub const fn contains(&self, chunk: ChunkPos) -> bool {
        chunk.region().x == self.x && chunk.region().z == self.z
    }
}

/// Anything that knows which column position it belongs to.
///
/// The resolver's only demand on a payload type.
pub trait Positioned {
    fn position(&self) -> ChunkPos;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_derivation_floors() {
        assert_eq!(ChunkPos::new(0, 0).region(), RegionPos::new(0, 0));
        assert_eq!(ChunkPos::new(31, 31).region(), RegionPos::new(0, 0));
        assert_eq!(ChunkPos::new(32, 0).region(), RegionPos::new(1, 0));
        assert_eq!(ChunkPos::new(-1, -1).region(), RegionPos::new(-1, -1));
        assert_eq!(ChunkPos::new(-32, -33).region(), RegionPos::new(-1, -2));
    }

    #[test]
    fn region_chunk_round_trips() {
        let region = RegionPos::new(-2, 3);
        let corner = region.chunk(0, 0);
        assert_eq!(corner, ChunkPos::new(-64, 96));
        assert_eq!(corner.region(), region);
        assert_eq!(region.chunk(31, 31).region(), region);
    }

    #[test]
    fn region_contains() {
        let region = RegionPos::new(0, 0);
        assert!(region.contains(ChunkPos::new(0, 0)));
        assert!(region.contains(ChunkPos::new(31, 31)));
        assert!(!region.contains(ChunkPos::new(32, 0)));
        assert!(!region.contains(ChunkPos::new(0, -1)));
    }
}
