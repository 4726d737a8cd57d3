//! Bit-packed, streamable storage for 2D voxel terrain.
//!
//! A terrain file is a fixed grid of fixed-size chunks, each an 8x8 grid of
//! vertices. [`TerrainStore`] owns the on-disk file and a write-back LRU of
//! decoded chunks; [`TerrainChunk`]/[`TerrainVertex`] are the codec; biome
//! settings sampling and background region prefetch sit on top.

pub mod biome;
pub mod cache;
pub mod chunk;
pub mod coord;
pub mod error;
pub mod events;
pub mod palette;
pub mod store;
pub mod streaming;
pub mod vertex;

pub use biome::{Biome, BiomeRegistry, BiomeSettings, BIOME_SLOTS};
pub use chunk::{TerrainChunk, CHUNK_RECORD_SIZE, CHUNK_SIDE, VERTICES_PER_CHUNK};
pub use coord::{Coord2, CHUNK_WORLD_SIZE};
pub use error::{Result, TerrainError};
pub use events::{ChunkLoadCause, ChunkLoadedCallback, ChunkLoadedEvent};
pub use palette::{MaterialId, MaterialPalette};
pub use store::{TerrainStore, DEFAULT_CACHE_CAPACITY, DEFAULT_STREAMING_RADIUS};
pub use streaming::StreamingHandle;
pub use vertex::TerrainVertex;
