//! The terrain store: owns the on-disk file and the decoded-chunk cache,
//! and drives the background streaming worker.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::biome::{BiomeRegistry, BiomeSettings};
use crate::chunk::{TerrainChunk, CHUNK_RECORD_SIZE};
use crate::coord::Coord2;
use crate::cache::ChunkCache;
use crate::error::{Result, TerrainError};
use crate::events::{ChunkLoadCause, ChunkLoadedCallback, ChunkLoadedNotifier};
use crate::streaming::{HandleRegistry, StreamingHandle};

/// Default LRU capacity when a caller doesn't specify one.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Default radius (in world units) for a freshly created streaming handler.
pub const DEFAULT_STREAMING_RADIUS: u8 = 8;

const HEADER_LEN: u64 = 8;
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(500);

struct Inner<S> {
    width: u32,
    height: u32,
    file: Mutex<File>,
    cache: ChunkCache<TerrainChunk>,
    registry: BiomeRegistry<S>,
    handles: HandleRegistry,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_started: AtomicBool,
    stop: AtomicBool,
    closed: AtomicBool,
    notifier: ChunkLoadedNotifier,
    last_streaming_error: Mutex<Option<String>>,
}

/// An on-disk, streamable store of fixed-size terrain chunks.
///
/// Cheap to clone: a clone shares the same file handle, cache, and
/// background worker as the original, so client threads can call
/// `get`/`set`/`sample` concurrently from independent clones. Call
/// [`TerrainStore::dispose`] exactly once when done; see that method's
/// documentation for the shutdown contract.
pub struct TerrainStore<S: BiomeSettings + Send + Sync + 'static> {
    inner: Arc<Inner<S>>,
}

impl<S: BiomeSettings + Send + Sync + 'static> Clone for TerrainStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: BiomeSettings + Send + Sync + 'static> TerrainStore<S> {
    /// Creates a new terrain file at `path`. Fails with
    /// [`TerrainError::AlreadyExists`] if a file is already there.
    pub fn create(
        width: u32,
        height: u32,
        path: impl AsRef<Path>,
        registry: BiomeRegistry<S>,
        cache_capacity: Option<NonZeroUsize>,
        subscriber: Option<ChunkLoadedCallback>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => TerrainError::AlreadyExists,
                _ => TerrainError::Io(e),
            })?;

        file.write_all(&width.to_le_bytes())?;
        file.write_all(&height.to_le_bytes())?;
        file.flush()?;

        info!(width, height, path = %path.display(), "created terrain file");

        Ok(Self::new_handle(width, height, file, registry, cache_capacity, subscriber))
    }

    /// Opens an existing terrain file at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        registry: BiomeRegistry<S>,
        cache_capacity: Option<NonZeroUsize>,
        subscriber: Option<ChunkLoadedCallback>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => TerrainError::Missing,
                _ => TerrainError::Io(e),
            })?;

        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut header)?;
        let width = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let height = u32::from_le_bytes(header[4..8].try_into().unwrap());

        info!(width, height, path = %path.display(), "opened terrain file");

        Ok(Self::new_handle(width, height, file, registry, cache_capacity, subscriber))
    }

    fn new_handle(
        width: u32,
        height: u32,
        file: File,
        registry: BiomeRegistry<S>,
        cache_capacity: Option<NonZeroUsize>,
        subscriber: Option<ChunkLoadedCallback>,
    ) -> Self {
        let capacity = cache_capacity
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap());
        let inner = Arc::new(Inner {
            width,
            height,
            file: Mutex::new(file),
            cache: ChunkCache::new(capacity),
            registry,
            handles: HandleRegistry::new(),
            worker: Mutex::new(None),
            worker_started: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            notifier: ChunkLoadedNotifier::new(subscriber),
            last_streaming_error: Mutex::new(None),
        });
        Self { inner }
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    /// The most recent error encountered by the background streaming
    /// worker, if any. The worker logs and continues past I/O errors
    /// instead of propagating them directly; this is where a caller that
    /// cares can observe one.
    pub fn last_streaming_error(&self) -> Option<String> {
        self.inner.last_streaming_error.lock().clone()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(TerrainError::Io(std::io::Error::new(
                ErrorKind::Other,
                "terrain store is closed",
            )));
        }
        Ok(())
    }

    fn check_bounds(&self, x: u32, z: u32) -> Result<()> {
        if x >= self.inner.width {
            return Err(TerrainError::OutOfRange {
                field: "x",
                value: x as i64,
                expected: "0..width",
            });
        }
        if z >= self.inner.height {
            return Err(TerrainError::OutOfRange {
                field: "z",
                value: z as i64,
                expected: "0..height",
            });
        }
        Ok(())
    }

    /// The on-disk byte offset of chunk `(x, z)`. `chunk_index = x + z *
    /// width` — see DESIGN.md for why this deliberately does not match the
    /// divide-by-8 formula this system's prior art used.
    fn offset(&self, x: u32, z: u32) -> u64 {
        let chunk_index = u64::from(x) + u64::from(z) * u64::from(self.inner.width);
        HEADER_LEN + chunk_index * CHUNK_RECORD_SIZE as u64
    }

    fn read_chunk_at(&self, file: &mut File, coord: Coord2) -> Result<TerrainChunk> {
        let mut buf = [0u8; CHUNK_RECORD_SIZE];
        file.seek(SeekFrom::Start(self.offset(coord.x, coord.z)))?;
        file.read_exact(&mut buf)?;
        TerrainChunk::decode(&buf, &self.inner.registry)
    }

    fn write_chunk_at(&self, file: &mut File, coord: Coord2, chunk: &TerrainChunk) -> Result<()> {
        let mut buf = [0u8; CHUNK_RECORD_SIZE];
        chunk.encode(&mut buf)?;
        file.seek(SeekFrom::Start(self.offset(coord.x, coord.z)))?;
        file.write_all(&buf)?;
        Ok(())
    }

    fn write_back(&self, coord: Coord2, chunk: &TerrainChunk) -> Result<()> {
        let mut file = self.inner.file.lock();
        debug!(x = coord.x, z = coord.z, "writing back evicted chunk");
        self.write_chunk_at(&mut file, coord, chunk)
    }

    /// Reads chunk `(x, z)`, going through the cache first.
    pub fn get(&self, x: u32, z: u32) -> Result<TerrainChunk> {
        self.ensure_open()?;
        self.check_bounds(x, z)?;
        let coord = Coord2::new(x, z);

        if let Some(chunk) = self.inner.cache.get(coord) {
            return Ok(chunk);
        }

        let chunk = {
            let mut file = self.inner.file.lock();
            self.read_chunk_at(&mut file, coord)?
        };
        if let Some((evicted_coord, evicted_chunk)) = self.inner.cache.put(coord, chunk.clone()) {
            self.write_back(evicted_coord, &evicted_chunk)?;
        }
        self.inner.notifier.publish(coord, ChunkLoadCause::Demand);
        Ok(chunk)
    }

    /// Writes chunk `(x, z)` into the cache. The on-disk record is *not*
    /// updated immediately — only when this entry is itself evicted or the
    /// store is disposed.
    pub fn set(&self, x: u32, z: u32, chunk: TerrainChunk) -> Result<()> {
        self.ensure_open()?;
        self.check_bounds(x, z)?;
        let coord = Coord2::new(x, z);
        if let Some((evicted_coord, evicted_chunk)) = self.inner.cache.put(coord, chunk) {
            self.write_back(evicted_coord, &evicted_chunk)?;
        }
        Ok(())
    }

    /// Bilinear(-ish) sample of biome settings around chunk `center`: the
    /// center biome's settings aggregated with up to three neighbors
    /// ((+x,0), (0,+z), (+x,+z)) — (-x,+z) is included too, but only when it
    /// doesn't underflow the unsigned coordinate — then divided by the
    /// number of samples taken.
    pub fn sample_chunk(&self, center: Coord2) -> Result<S> {
        self.ensure_open()?;
        self.check_bounds(center.x, center.z)?;

        let center_chunk = self.get(center.x, center.z)?;
        let mut acc = self.inner.registry.get(center_chunk.biome_id).settings.clone();
        let mut count = 1u32;

        let neighbor_coords = [
            (center.x.checked_add(1), Some(center.z)),
            (Some(center.x), center.z.checked_add(1)),
            (center.x.checked_add(1), center.z.checked_add(1)),
            (center.x.checked_sub(1), center.z.checked_add(1)),
        ];

        for (nx, nz) in neighbor_coords {
            let (Some(nx), Some(nz)) = (nx, nz) else {
                continue;
            };
            if nx >= self.inner.width || nz >= self.inner.height {
                continue;
            }
            let neighbor = self.get(nx, nz)?;
            let neighbor_settings = self.inner.registry.get(neighbor.biome_id).settings.clone();
            acc.aggregate_add(&neighbor_settings);
            count += 1;
        }

        acc.divide_by(count);
        Ok(acc)
    }

    /// Same as [`TerrainStore::sample_chunk`] but resolves the chunk from a
    /// world-space position first.
    pub fn sample(&self, world_pos: (f32, f32)) -> Result<S> {
        self.sample_chunk(Coord2::world_to_chunk(world_pos))
    }

    /// Registers a new streaming handle and lazily starts the background
    /// worker thread on first use.
    pub fn create_streaming_handler(&self, radius: u8) -> StreamingHandle {
        let handle = StreamingHandle::new((0.0, 0.0), radius);
        self.inner.handles.register(&handle);
        self.ensure_worker_started();
        handle
    }

    fn ensure_worker_started(&self) {
        if self.inner.worker_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let join_handle = thread::Builder::new()
            .name("tinyterrain-streaming".into())
            .spawn(move || Self::worker_loop(weak))
            .expect("failed to spawn streaming worker thread");
        *self.inner.worker.lock() = Some(join_handle);
    }

    fn worker_loop(weak: std::sync::Weak<Inner<S>>) {
        loop {
            let Some(inner) = weak.upgrade() else {
                break;
            };
            let stop_requested = inner.stop.load(Ordering::SeqCst);
            if inner.handles.is_empty() && stop_requested {
                break;
            }

            inner.handles.service_dirty(|snapshot| {
                if let Err(err) = Self::region_load(&inner, snapshot.position, snapshot.radius) {
                    error!(%err, "streaming region load failed");
                    *inner.last_streaming_error.lock() = Some(err.to_string());
                }
            });

            drop(inner);
            thread::sleep(WORKER_POLL_INTERVAL);
        }
    }

    /// Prefetches the rectangular region of chunks around `position` within
    /// `radius` world units, writing back any evictees and notifying once
    /// per visited chunk after the file lock is released.
    fn region_load(inner: &Arc<Inner<S>>, position: (f32, f32), radius: u8) -> Result<()> {
        let radius = f32::from(radius);
        let top_left = Coord2::world_to_chunk((position.0 - radius, position.1 - radius));
        let bottom_right = Coord2::world_to_chunk((position.0 + radius, position.1 + radius));

        let max_x = inner.width.saturating_sub(1);
        let max_z = inner.height.saturating_sub(1);
        let top_left = Coord2::new(top_left.x.min(max_x), top_left.z.min(max_z));
        let bottom_right = Coord2::new(bottom_right.x.min(max_x), bottom_right.z.min(max_z));

        let span = bottom_right - top_left; // absolute difference, per Coord2::sub
        let region_width = span.x + 1;
        let region_height = span.z + 1;
        let area = u64::from(region_width) * u64::from(region_height);

        let mut visited = Vec::with_capacity(area as usize);
        let mut evictees = Vec::new();

        {
            let mut file = inner.file.lock();
            for i in 0..area {
                let x = top_left.x + (i % u64::from(region_width)) as u32;
                let z = top_left.z + (i / u64::from(region_width)) as u32;
                let coord = Coord2::new(x, z);

                if inner.cache.get(coord).is_some() {
                    visited.push(coord);
                    continue;
                }

                let mut buf = [0u8; CHUNK_RECORD_SIZE];
                file.seek(SeekFrom::Start(
                    HEADER_LEN + (u64::from(x) + u64::from(z) * u64::from(inner.width)) * CHUNK_RECORD_SIZE as u64,
                ))?;
                file.read_exact(&mut buf)?;
                let chunk = TerrainChunk::decode(&buf, &inner.registry)?;

                if let Some(evicted) = inner.cache.put(coord, chunk) {
                    evictees.push(evicted);
                }
                visited.push(coord);
            }

            for (evicted_coord, evicted_chunk) in &evictees {
                let mut buf = [0u8; CHUNK_RECORD_SIZE];
                evicted_chunk.encode(&mut buf)?;
                file.seek(SeekFrom::Start(
                    HEADER_LEN
                        + (u64::from(evicted_coord.x) + u64::from(evicted_coord.z) * u64::from(inner.width))
                            * CHUNK_RECORD_SIZE as u64,
                ))?;
                file.write_all(&buf)?;
            }
        }

        for coord in visited {
            inner.notifier.publish(coord, ChunkLoadCause::Prefetch);
        }

        Ok(())
    }

    /// Signals the streaming worker to stop, joins it, flushes every
    /// cached chunk (most-recently-used first) to disk, and marks the
    /// store closed. Idempotent: calling this more than once is a no-op
    /// after the first call.
    ///
    /// If any streaming handle created by this store is still alive when
    /// `dispose` is called, the worker keeps servicing it until it is
    /// dropped — `dispose` blocks until then. Drop all streaming handles
    /// before disposing if you don't want that.
    pub fn dispose(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.inner.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.inner.worker.lock().take() {
            let _ = handle.join();
        }

        let mut file = self.inner.file.lock();
        for (coord, chunk) in self.inner.cache.drain_mru_order() {
            let mut buf = [0u8; CHUNK_RECORD_SIZE];
            chunk.encode(&mut buf)?;
            file.seek(SeekFrom::Start(self.offset(coord.x, coord.z)))?;
            file.write_all(&buf)?;
        }
        file.flush()?;

        info!("terrain store disposed");
        Ok(())
    }
}

impl<S: BiomeSettings + Send + Sync + 'static> Drop for TerrainStore<S> {
    fn drop(&mut self) {
        // Only the last handle sharing this `Inner` triggers the flush.
        if Arc::strong_count(&self.inner) > 1 {
            return;
        }
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut file = self.inner.file.lock();
        for (coord, chunk) in self.inner.cache.drain_mru_order() {
            let mut buf = [0u8; CHUNK_RECORD_SIZE];
            if chunk.encode(&mut buf).is_err() {
                continue;
            }
            let offset = HEADER_LEN
                + (u64::from(coord.x) + u64::from(coord.z) * u64::from(self.inner.width))
                    * CHUNK_RECORD_SIZE as u64;
            if file.seek(SeekFrom::Start(offset)).is_err() {
                continue;
            }
            if let Err(err) = file.write_all(&buf) {
                warn!(%err, "implicit flush on drop failed for a chunk");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biome::Biome;
    use crate::palette::MaterialPalette;
    use crate::vertex::TerrainVertex;
    use crate::chunk::VERTICES_PER_CHUNK;

    #[derive(Debug, Clone, PartialEq)]
    struct Scalar(f64);

    impl BiomeSettings for Scalar {
        fn aggregate_add(&mut self, other: &Self) {
            self.0 += other.0;
        }
        fn divide_by(&mut self, n: u32) {
            self.0 /= n as f64;
        }
    }

    fn temp_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("tinyterrain_test_{tag}_{}", rand::random::<u64>()))
    }

    fn registry_with(values: [f64; 8]) -> BiomeRegistry<Scalar> {
        let palette = MaterialPalette::from_slice(&[0, 1, 2, 3]).unwrap();
        BiomeRegistry::new(std::array::from_fn(|i| Biome::new(palette, Scalar(values[i]))))
    }

    fn flat_chunk(base_height: u8, biome_id: u8, palette: MaterialPalette) -> TerrainChunk {
        let mut vertices = [TerrainVertex::new(i16::from(base_height) * 4, palette.get(0)); VERTICES_PER_CHUNK];
        vertices[0] = TerrainVertex::new(i16::from(base_height) * 4, palette.get(0));
        TerrainChunk::new(base_height, biome_id, palette, vertices).unwrap()
    }

    #[test]
    fn file_layout_offsets_are_deterministic_and_distinct() {
        // S3: 2x2 terrain, cache_cap=1. Write A to (0,0), then B to (1,0) ->
        // A is evicted and written back. offset(0,0)=8, offset(1,0)=73.
        let path = temp_path("s3");
        let palette = MaterialPalette::from_slice(&[0, 1, 2, 3]).unwrap();
        let registry = registry_with([0.0; 8]);
        let store = TerrainStore::create(
            2,
            2,
            &path,
            registry,
            Some(NonZeroUsize::new(1).unwrap()),
            None,
        )
        .unwrap();

        let chunk_a = flat_chunk(1, 0, palette);
        let chunk_b = flat_chunk(2, 0, palette);
        store.set(0, 0, chunk_a.clone()).unwrap();
        store.set(1, 0, chunk_b.clone()).unwrap(); // evicts A
        store.dispose().unwrap();

        let mut file = File::open(&path).unwrap();
        let mut buf = [0u8; CHUNK_RECORD_SIZE];
        file.seek(SeekFrom::Start(8)).unwrap();
        file.read_exact(&mut buf).unwrap();
        let decoded_a = TerrainChunk::decode(&buf, &registry_with([0.0; 8])).unwrap();
        assert_eq!(decoded_a.base_height(), chunk_a.base_height());

        file.seek(SeekFrom::Start(73)).unwrap();
        file.read_exact(&mut buf).unwrap();
        let decoded_b = TerrainChunk::decode(&buf, &registry_with([0.0; 8])).unwrap();
        assert_eq!(decoded_b.base_height(), chunk_b.base_height());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn dispose_flushes_every_cached_entry() {
        // S4: one chunk written, dispose without eviction, reopen and read.
        let path = temp_path("s4");
        let registry = registry_with([0.0; 8]);
        let store = TerrainStore::create(2, 2, &path, registry, None, None).unwrap();
        let palette = MaterialPalette::from_slice(&[0, 1, 2, 3]).unwrap();
        let chunk = flat_chunk(5, 1, palette);
        store.set(0, 0, chunk.clone()).unwrap();
        store.dispose().unwrap();

        let registry2 = registry_with([0.0; 8]);
        let reopened = TerrainStore::open(&path, registry2, None, None).unwrap();
        let reread = reopened.get(0, 0).unwrap();
        assert_eq!(reread.base_height(), chunk.base_height());
        reopened.dispose().unwrap();
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn bilinear_sample_at_corner() {
        // S6: 2x2 terrain, scalar settings {10,20,30,40} at (0,0) (1,0)
        // (0,1) (1,1). Sample at (0,0) == (10+20+30+40)/4 == 25.
        let path = temp_path("s6");
        let registry = registry_with([10.0, 20.0, 30.0, 40.0, 0.0, 0.0, 0.0, 0.0]);
        let store = TerrainStore::create(2, 2, &path, registry, None, None).unwrap();
        let palette = MaterialPalette::from_slice(&[0, 1, 2, 3]).unwrap();
        store.set(0, 0, flat_chunk(0, 0, palette)).unwrap();
        store.set(1, 0, flat_chunk(0, 1, palette)).unwrap();
        store.set(0, 1, flat_chunk(0, 2, palette)).unwrap();
        store.set(1, 1, flat_chunk(0, 3, palette)).unwrap();

        let sample = store.sample_chunk(Coord2::new(0, 0)).unwrap();
        assert_eq!(sample.0, 25.0);

        store.dispose().unwrap();
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn out_of_range_index_errors() {
        let path = temp_path("bounds");
        let registry = registry_with([0.0; 8]);
        let store = TerrainStore::create(2, 2, &path, registry, None, None).unwrap();
        assert!(store.get(2, 0).is_err());
        assert!(store.get(0, 2).is_err());
        store.dispose().unwrap();
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn create_fails_if_file_already_exists() {
        let path = temp_path("exists");
        let registry = registry_with([0.0; 8]);
        let store = TerrainStore::create(1, 1, &path, registry, None, None).unwrap();
        store.dispose().unwrap();

        let registry2 = registry_with([0.0; 8]);
        let result = TerrainStore::create(1, 1, &path, registry2, None, None);
        assert!(matches!(result, Err(TerrainError::AlreadyExists)));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn open_fails_if_file_missing() {
        let path = temp_path("missing");
        let registry = registry_with([0.0; 8]);
        let result = TerrainStore::open(&path, registry, None, None);
        assert!(matches!(result, Err(TerrainError::Missing)));
    }
}
