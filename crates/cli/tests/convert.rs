//! Whole-conversion test: build a small world on disk, convert it, read
//! the output back with the same Anvil tooling.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Seek};
use std::path::Path;

use chunkport_cli::anvil::{
    AnvilColumn, BlockStatesNbt, ChunkNbt, EntitiesNbt, EntityNbt, PaletteEntry, SectionNbt,
};
use chunkport_cli::convert::{ConvertOptions, convert_world};
use chunkport_cli::mapping::BlockMapping;
use chunkport_engine::position::ChunkPos;

fn test_chunk(x: i32, z: i32) -> ChunkNbt {
    let mut extra = HashMap::new();
    extra.insert("InhabitedTime".to_string(), fastnbt::Value::Long(42));
    ChunkNbt {
        data_version: 3465,
        x_pos: x,
        z_pos: z,
        y_pos: -4,
        sections: vec![SectionNbt {
            y: 0,
            block_states: Some(BlockStatesNbt {
                palette: vec![PaletteEntry::named("minecraft:grass_path")],
                data: None,
            }),
            extra: HashMap::new(),
        }],
        status: "minecraft:full".into(),
        extra,
    }
}

fn cow_at(x: f64, z: f64) -> EntityNbt {
    EntityNbt {
        id: "minecraft:cow".into(),
        pos: vec![x, 64.0, z],
        extra: HashMap::new(),
    }
}

fn write_region_file(path: &Path, chunks: &[(usize, usize, Vec<u8>)]) {
    let mut region = fastanvil::Region::new(Cursor::new(Vec::new())).unwrap();
    for (x, z, bytes) in chunks {
        region.write_chunk(*x, *z, bytes).unwrap();
    }
    let mut cursor = region.into_inner().unwrap();
    let len = cursor.stream_position().unwrap();
    let data = cursor.into_inner();
    fs::write(path, &data[..len as usize]).unwrap();
}

/// Two chunks in region (0, 0); the entity file stores a cow under chunk
/// (0, 0) whose position is actually in chunk (1, 0).
fn build_input_world(dir: &Path) {
    fs::create_dir_all(dir.join("region")).unwrap();
    fs::create_dir_all(dir.join("entities")).unwrap();

    write_region_file(
        &dir.join("region/r.0.0.mca"),
        &[
            (0, 0, fastnbt::to_bytes(&test_chunk(0, 0)).unwrap()),
            (1, 0, fastnbt::to_bytes(&test_chunk(1, 0)).unwrap()),
        ],
    );

    let entities = EntitiesNbt {
        data_version: 3465,
        position: fastnbt::IntArray::new(vec![0, 0]),
        entities: vec![cow_at(17.5, 3.5)],
    };
    write_region_file(
        &dir.join("entities/r.0.0.mca"),
        &[(0, 0, fastnbt::to_bytes(&entities).unwrap())],
    );
}

fn read_back<T: serde::de::DeserializeOwned>(path: &Path, x: usize, z: usize) -> Option<T> {
    let bytes = fs::read(path).ok()?;
    let mut region = fastanvil::Region::from_stream(Cursor::new(bytes)).unwrap();
    let nbt = region.read_chunk(x, z).unwrap()?;
    Some(fastnbt::from_bytes(&nbt).unwrap())
}

#[test]
fn converts_a_world_end_to_end() {
    let tmp = std::env::temp_dir().join("chunkport_test_convert");
    let _ = fs::remove_dir_all(&tmp);
    let input = tmp.join("in");
    let output = tmp.join("out");
    build_input_world(&input);

    let options = ConvertOptions {
        input: input.clone(),
        output: output.clone(),
        mapping: BlockMapping::from_json(
            r#"{ "minecraft:grass_path": "minecraft:dirt_path" }"#,
        )
        .unwrap(),
        data_version: Some(3953),
        pre_transform: true,
    };
    let stats = convert_world(&options).unwrap();

    assert_eq!(stats.regions, 1);
    assert_eq!(stats.chunks, 2);
    assert_eq!(stats.renamed_blocks, 2);
    assert_eq!(stats.relocated_entities, 1);
    assert_eq!(stats.stranded_entities, 0);
    assert_eq!(stats.write_errors, 0);

    let region_path = output.join("region/r.0.0.mca");
    for x in 0..2usize {
        let chunk: ChunkNbt = read_back(&region_path, x, 0).unwrap();
        assert_eq!(chunk.x_pos, x as i32);
        assert_eq!(chunk.data_version, 3953);
        let states = chunk.sections[0].block_states.as_ref().unwrap();
        assert_eq!(states.palette[0].name, "minecraft:dirt_path");
        // Unmodelled tags survive the round trip.
        assert_eq!(
            chunk.extra.get("InhabitedTime"),
            Some(&fastnbt::Value::Long(42))
        );
    }

    // The cow ended up in chunk (1, 0)'s entity list; chunk (0, 0)'s list
    // emptied out and was pruned.
    let entities_path = output.join("entities/r.0.0.mca");
    let moved: EntitiesNbt = read_back(&entities_path, 1, 0).unwrap();
    assert_eq!(moved.chunk_position(), Some(ChunkPos::new(1, 0)));
    assert_eq!(moved.entities.len(), 1);
    assert_eq!(moved.entities[0].id, "minecraft:cow");
    assert_eq!(moved.entities[0].pos, vec![17.5, 64.0, 3.5]);
    assert!(read_back::<EntitiesNbt>(&entities_path, 0, 0).is_none());

    let _ = fs::remove_dir_all(&tmp);
}

#[test]
fn disabled_pre_transform_leaves_entities_in_place() {
    let tmp = std::env::temp_dir().join("chunkport_test_no_pretransform");
    let _ = fs::remove_dir_all(&tmp);
    let input = tmp.join("in");
    let output = tmp.join("out");
    build_input_world(&input);

    let options = ConvertOptions {
        input,
        output: output.clone(),
        mapping: BlockMapping::identity(),
        data_version: None,
        pre_transform: false,
    };
    let stats = convert_world(&options).unwrap();

    assert_eq!(stats.chunks, 2);
    assert_eq!(stats.renamed_blocks, 0);
    assert_eq!(stats.relocated_entities, 0);
    // The transform still ran, but with no neighbour available.
    assert_eq!(stats.stranded_entities, 1);

    let entities_path = output.join("entities/r.0.0.mca");
    let stayed: EntitiesNbt = read_back(&entities_path, 0, 0).unwrap();
    assert_eq!(stayed.entities.len(), 1);
    assert!(read_back::<EntitiesNbt>(&entities_path, 1, 0).is_none());

    // DataVersion untouched without an override.
    let chunk: ChunkNbt = read_back(&output.join("region/r.0.0.mca"), 0, 0).unwrap();
    assert_eq!(chunk.data_version, 3465);

    let _ = fs::remove_dir_all(&tmp);
}

#[test]
fn refuses_missing_region_directory() {
    let tmp = std::env::temp_dir().join("chunkport_test_missing_input");
    let _ = fs::remove_dir_all(&tmp);
    fs::create_dir_all(&tmp).unwrap();

    let options = ConvertOptions {
        input: tmp.join("nowhere"),
        output: tmp.join("out"),
        mapping: BlockMapping::identity(),
        data_version: None,
        pre_transform: true,
    };
    assert!(convert_world(&options).is_err());

    let _ = fs::remove_dir_all(&tmp);
}

// AnvilColumn is the public seam between reading and writing; make sure its
// position always mirrors the NBT it wraps.
#[test]
fn column_position_comes_from_the_chunk_nbt() {
    let column = AnvilColumn::new(test_chunk(-3, 7), None);
    assert_eq!(column.position, ChunkPos::new(-3, 7));
}
