mod config;

use std::num::NonZeroUsize;
use std::time::Duration;

use config::TerrainConfig;
use tinyterrain::{
    Biome, BiomeRegistry, BiomeSettings, Coord2, MaterialPalette, TerrainChunk, TerrainStore,
    TerrainVertex, BIOME_SLOTS, VERTICES_PER_CHUNK,
};
use tracing::info;

/// Per-biome climate payload. Exists only to demonstrate the `BiomeSettings`
/// capability this crate's bilinear sampling needs: commutative accumulation
/// and pointwise division by a sample count.
#[derive(Debug, Clone, Copy)]
struct Climate {
    moisture: f32,
    temperature: f32,
}

impl BiomeSettings for Climate {
    fn aggregate_add(&mut self, other: &Self) {
        self.moisture += other.moisture;
        self.temperature += other.temperature;
    }

    fn divide_by(&mut self, n: u32) {
        self.moisture /= n as f32;
        self.temperature /= n as f32;
    }
}

fn demo_registry() -> BiomeRegistry<Climate> {
    let plains = MaterialPalette::from_slice(&[0, 1, 2, 3]).expect("4 material ids");
    let desert = MaterialPalette::from_slice(&[4, 5, 6, 7]).expect("4 material ids");

    BiomeRegistry::new(std::array::from_fn(|i| {
        if i % 2 == 0 {
            Biome::new(plains, Climate { moisture: 0.6, temperature: 0.4 })
        } else {
            Biome::new(desert, Climate { moisture: 0.1, temperature: 0.9 })
        }
    }))
}

fn flat_chunk(base_height: u8, biome_id: u8, palette: MaterialPalette) -> TerrainChunk {
    let height = i16::from(base_height) * 4;
    let vertices = [TerrainVertex::new(height, palette.get(0)); VERTICES_PER_CHUNK];
    TerrainChunk::new(base_height, biome_id, palette, vertices).expect("valid chunk metadata")
}

fn main() {
    let config = match TerrainConfig::load("tinyterrain-demo.toml") {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load tinyterrain-demo.toml: {e}");
            std::process::exit(1);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    info!(
        width = config.store.width,
        height = config.store.height,
        path = %config.store.path,
        "tinyterrain demo starting"
    );

    let registry = demo_registry();
    let cache_capacity = NonZeroUsize::new(config.store.cache_capacity);

    std::fs::remove_file(&config.store.path).ok();
    let store = TerrainStore::create(
        config.store.width,
        config.store.height,
        &config.store.path,
        registry,
        cache_capacity,
        None,
    )
    .expect("failed to create terrain file");

    let plains = MaterialPalette::from_slice(&[0, 1, 2, 3]).unwrap();
    let desert = MaterialPalette::from_slice(&[4, 5, 6, 7]).unwrap();
    for z in 0..config.store.height {
        for x in 0..config.store.width {
            let biome_id = ((x + z) % BIOME_SLOTS as u32) as u8;
            let palette = if biome_id % 2 == 0 { plains } else { desert };
            let chunk = flat_chunk(4, biome_id, palette);
            store.set(x, z, chunk).expect("in-bounds write");
        }
    }

    let handle = store.create_streaming_handler(config.store.default_radius);
    handle.set_position((2.0, 2.0));
    info!(dirty = handle.is_dirty(), "streaming handle registered");

    std::thread::sleep(Duration::from_millis(750));
    info!(dirty = handle.is_dirty(), "after first worker pass");

    let sample = store.sample_chunk(Coord2::new(0, 0)).expect("in-bounds sample");
    info!(
        moisture = sample.moisture,
        temperature = sample.temperature,
        "bilinear climate sample at chunk (0,0)"
    );

    drop(handle);
    store.dispose().expect("clean shutdown");
    info!("tinyterrain demo finished");
}
