//! The conversion driver: read regions in parallel, push every chunk
//! through the pre-transform pipeline, write resolved chunks back out
//! region by region.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Seek};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Context, Result, ensure};
use dashmap::DashMap;
use rayon::prelude::*;

use chunkport_engine::position::{ChunkPos, RegionPos};
use chunkport_engine::pretransform::pipeline::PreTransformPipeline;
use chunkport_engine::pretransform::sink::ColumnSink;

use crate::anvil::{self, AnvilColumn, ChunkNbt, EntitiesNbt};
use crate::mapping::BlockMapping;
use crate::relocate::EntityRelocation;

pub struct ConvertOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub mapping: BlockMapping,
    /// Override the DataVersion tag of every written chunk.
    pub data_version: Option<i32>,
    /// Cross-chunk solving; off means entities stay in their stored chunk.
    pub pre_transform: bool,
}

#[derive(Debug)]
pub struct ConvertStats {
    pub regions: usize,
    pub chunks: usize,
    pub renamed_blocks: usize,
    pub relocated_entities: u64,
    pub stranded_entities: u64,
    pub write_errors: usize,
}

type Pipeline = PreTransformPipeline<AnvilColumn, EntityRelocation, AnvilWriter>;

/// Convert the world at `options.input` into `options.output`.
pub fn convert_world(options: &ConvertOptions) -> Result<ConvertStats> {
    let start = Instant::now();
    ensure!(
        options.input != options.output,
        "output directory must differ from the input world"
    );
    let region_dir = options.input.join("region");
    ensure!(
        region_dir.is_dir(),
        "no region directory at {}",
        region_dir.display()
    );

    let mut regions: Vec<(RegionPos, PathBuf)> = Vec::new();
    for entry in fs::read_dir(&region_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match anvil::parse_region_name(name) {
            Some(region) => regions.push((region, path)),
            None if name.ends_with(".mca") => {
                tracing::warn!("skipping unexpected file in region dir: {}", name);
            }
            None => {}
        }
    }
    ensure!(
        !regions.is_empty(),
        "no region files found in {}",
        region_dir.display()
    );
    tracing::info!(
        "converting {} regions from {}",
        regions.len(),
        options.input.display()
    );

    let writer = AnvilWriter::new(&options.output)?;
    let pipeline = PreTransformPipeline::new(
        EntityRelocation::new(),
        writer,
        regions.iter().map(|(region, _)| *region),
    );
    let pipeline = if options.pre_transform {
        pipeline
    } else {
        pipeline.without_solving()
    };

    let renamed = AtomicUsize::new(0);
    regions.par_iter().try_for_each(|(region, path)| {
        convert_region(*region, path, options, &pipeline, &renamed).with_context(|| {
            format!("converting region {}", anvil::region_file_name(*region))
        })
    })?;
    pipeline.flush_columns();

    let manager = pipeline.resolver().manager();
    let sink = pipeline.resolver().sink();
    let stats = ConvertStats {
        regions: regions.len(),
        chunks: sink.chunks_written(),
        renamed_blocks: renamed.into_inner(),
        relocated_entities: manager.relocated(),
        stranded_entities: manager.stranded(),
        write_errors: sink.write_errors(),
    };
    tracing::info!(
        "conversion finished in {:.2?}: {} chunks, {} palette entries renamed, {} entities relocated",
        start.elapsed(),
        stats.chunks,
        stats.renamed_blocks,
        stats.relocated_entities,
    );
    Ok(stats)
}

/// Read one input region (terrain plus its entity file) and feed every
/// chunk to the pipeline, then declare the region finished.
fn convert_region(
    region: RegionPos,
    path: &Path,
    options: &ConvertOptions,
    pipeline: &Pipeline,
    renamed: &AtomicUsize,
) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut file = fastanvil::Region::from_stream(Cursor::new(bytes))
        .with_context(|| format!("parsing {}", path.display()))?;

    let entities_path = options
        .input
        .join("entities")
        .join(anvil::region_file_name(region));
    let mut entities = read_entities_file(&entities_path)?;

    let mut count = 0usize;
    for z in 0..32usize {
        for x in 0..32usize {
            let Some(nbt) = file
                .read_chunk(x, z)
                .with_context(|| format!("reading chunk slot ({}, {})", x, z))?
            else {
                continue;
            };
            let mut chunk: ChunkNbt = fastnbt::from_bytes(&nbt)
                .with_context(|| format!("deserializing chunk slot ({}, {})", x, z))?;
            let position = ChunkPos::new(chunk.x_pos, chunk.z_pos);
            if position.region() != region {
                tracing::warn!(
                    "chunk ({}, {}) stored in the wrong region file, dropped",
                    position.x,
                    position.z
                );
                continue;
            }

            if let Some(version) = options.data_version {
                chunk.data_version = version;
            }
            renamed.fetch_add(
                anvil::remap_chunk(&mut chunk, &options.mapping),
                Ordering::Relaxed,
            );

            let mut entity_data = entities.remove(&position);
            if let (Some(list), Some(version)) = (entity_data.as_mut(), options.data_version) {
                list.data_version = version;
            }

            pipeline.convert_column(AnvilColumn::new(chunk, entity_data));
            count += 1;
        }
    }

    if !entities.is_empty() {
        tracing::warn!(
            "{} entity chunks in {} have no terrain chunk, dropped",
            entities.len(),
            entities_path.display()
        );
    }
    tracing::debug!("read {} chunks from {}", count, path.display());

    pipeline.flush_region(region);
    Ok(())
}

/// Load a region's entity file, keyed by the owning chunk position. Absent
/// file means no entities.
fn read_entities_file(path: &Path) -> Result<HashMap<ChunkPos, EntitiesNbt>> {
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut file = fastanvil::Region::from_stream(Cursor::new(bytes))
        .with_context(|| format!("parsing {}", path.display()))?;

    let mut by_chunk = HashMap::new();
    for z in 0..32usize {
        for x in 0..32usize {
            let Some(nbt) = file
                .read_chunk(x, z)
                .with_context(|| format!("reading entity slot ({}, {})", x, z))?
            else {
                continue;
            };
            let list: EntitiesNbt = fastnbt::from_bytes(&nbt)
                .with_context(|| format!("deserializing entity slot ({}, {})", x, z))?;
            match list.chunk_position() {
                Some(position) => {
                    by_chunk.insert(position, list);
                }
                None => tracing::warn!(
                    "entity chunk at slot ({}, {}) in {} has no position tag, dropped",
                    x,
                    z,
                    path.display()
                ),
            }
        }
    }
    Ok(by_chunk)
}

// ── Output ───────────────────────────────────────────────────────────────────

/// Sink that buffers resolved columns per region and writes each region's
/// terrain and entity files once the region's completion signal fires.
pub struct AnvilWriter {
    region_dir: PathBuf,
    entities_dir: PathBuf,
    buffered: DashMap<RegionPos, Vec<AnvilColumn>>,
    chunks_written: AtomicUsize,
    regions_written: AtomicUsize,
    write_errors: AtomicUsize,
}

impl AnvilWriter {
    pub fn new(output: &Path) -> Result<Self> {
        let region_dir = output.join("region");
        let entities_dir = output.join("entities");
        fs::create_dir_all(&region_dir)
            .with_context(|| format!("creating {}", region_dir.display()))?;
        fs::create_dir_all(&entities_dir)
            .with_context(|| format!("creating {}", entities_dir.display()))?;
        Ok(Self {
            region_dir,
            entities_dir,
            buffered: DashMap::new(),
            chunks_written: AtomicUsize::new(0),
            regions_written: AtomicUsize::new(0),
            write_errors: AtomicUsize::new(0),
        })
    }

    pub fn chunks_written(&self) -> usize {
        self.chunks_written.load(Ordering::Relaxed)
    }

    pub fn regions_written(&self) -> usize {
        self.regions_written.load(Ordering::Relaxed)
    }

    /// Chunks lost to serialization or I/O failures.
    pub fn write_errors(&self) -> usize {
        self.write_errors.load(Ordering::Relaxed)
    }

    fn write_region(&self, region: RegionPos, columns: Vec<AnvilColumn>) {
        if columns.is_empty() {
            return;
        }
        let count = columns.len();
        match self.encode_region(region, columns) {
            Ok(()) => {
                self.regions_written.fetch_add(1, Ordering::Relaxed);
                self.chunks_written.fetch_add(count, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!(
                    "failed to write region {}: {:#}",
                    anvil::region_file_name(region),
                    e
                );
                self.write_errors.fetch_add(count, Ordering::Relaxed);
            }
        }
    }

    fn encode_region(&self, region: RegionPos, mut columns: Vec<AnvilColumn>) -> Result<()> {
        columns.sort_by_key(|c| (c.position.z, c.position.x));

        let mut terrain = fastanvil::Region::new(Cursor::new(Vec::new()))?;
        let mut entities: Option<fastanvil::Region<Cursor<Vec<u8>>>> = None;

        for column in &columns {
            let x = column.position.x.rem_euclid(32) as usize;
            let z = column.position.z.rem_euclid(32) as usize;
            let bytes = fastnbt::to_bytes(&column.chunk).with_context(|| {
                format!(
                    "serializing chunk ({}, {})",
                    column.position.x, column.position.z
                )
            })?;
            terrain.write_chunk(x, z, &bytes)?;

            // Empty entity lists are pruned rather than carried over.
            if let Some(list) = &column.entities
                && !list.entities.is_empty()
            {
                let file = match entities.as_mut() {
                    Some(file) => file,
                    None => entities.insert(fastanvil::Region::new(Cursor::new(Vec::new()))?),
                };
                file.write_chunk(x, z, &fastnbt::to_bytes(list)?)?;
            }
        }

        flush_region(terrain, &self.region_dir.join(anvil::region_file_name(region)))?;
        if let Some(file) = entities {
            flush_region(file, &self.entities_dir.join(anvil::region_file_name(region)))?;
        }
        Ok(())
    }
}

/// Recover the in-memory buffer from a region writer and put it on disk.
fn flush_region(region: fastanvil::Region<Cursor<Vec<u8>>>, path: &Path) -> Result<()> {
    let mut cursor = region.into_inner()?;
    let len = cursor.stream_position()?;
    let data = cursor.into_inner();
    fs::write(path, &data[..len as usize]).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

impl ColumnSink<AnvilColumn> for AnvilWriter {
    fn column_resolved(&self, column: AnvilColumn) {
        self.buffered
            .entry(column.position.region())
            .or_default()
            .push(column);
    }

    fn region_complete(&self, region: RegionPos) {
        if let Some((_, columns)) = self.buffered.remove(&region) {
            self.write_region(region, columns);
        }
    }

    fn stream_complete(&self) {
        // Regions that never completed (reader errors, aborted input) still
        // have buffered columns; write what we have.
        let leftovers: Vec<RegionPos> = self.buffered.iter().map(|e| *e.key()).collect();
        for region in leftovers {
            if let Some((_, columns)) = self.buffered.remove(&region) {
                tracing::debug!(
                    "writing {} columns of incomplete region {}",
                    columns.len(),
                    anvil::region_file_name(region)
                );
                self.write_region(region, columns);
            }
        }
        tracing::info!(
            "output complete: {} chunks across {} regions",
            self.chunks_written(),
            self.regions_written(),
        );
    }
}
