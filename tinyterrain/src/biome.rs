//! Biome registry: maps a chunk's biome ID to a palette and an aggregable
//! "settings" payload.
//!
//! `settings` is deliberately opaque to this crate — terrain generation owns
//! its concrete shape. The registry only needs two capabilities out of it,
//! captured as a small trait rather than a concrete base type.

use crate::palette::MaterialPalette;

/// Number of biome slots a registry must cover (`biomeId` is 3 bits, 0..=7).
pub const BIOME_SLOTS: usize = 8;

/// The capability a biome's settings payload must provide to support
/// bilinear sampling (§4.6): commutative/associative accumulation, and
/// pointwise division by a sample count.
pub trait BiomeSettings: Clone {
    /// Accumulate `other` into `self`. Must be commutative and associative
    /// so that sampling order over neighboring chunks doesn't matter.
    fn aggregate_add(&mut self, other: &Self);

    /// Divide every accumulated field by `n` (`n >= 1`).
    fn divide_by(&mut self, n: u32);
}

/// A registered biome: the palette chunks of this biome encode against, plus
/// its settings payload.
#[derive(Debug, Clone)]
pub struct Biome<S> {
    pub palette: MaterialPalette,
    pub settings: S,
}

impl<S> Biome<S> {
    pub fn new(palette: MaterialPalette, settings: S) -> Self {
        Self { palette, settings }
    }
}

/// A read-only table of exactly [`BIOME_SLOTS`] biomes, indexed by
/// `biomeId ∈ [0, 7]`. Built once at construction and never mutated for the
/// lifetime of a terrain.
#[derive(Debug, Clone)]
pub struct BiomeRegistry<S> {
    biomes: [Biome<S>; BIOME_SLOTS],
}

impl<S> BiomeRegistry<S> {
    /// Build a registry from exactly [`BIOME_SLOTS`] biomes.
    pub fn new(biomes: [Biome<S>; BIOME_SLOTS]) -> Self {
        Self { biomes }
    }

    /// Look up the biome at `biome_id`. `biome_id` must be `< BIOME_SLOTS`;
    /// callers that decode it from a 3-bit field already guarantee this.
    pub fn get(&self, biome_id: u8) -> &Biome<S> {
        &self.biomes[biome_id as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn registry_with(values: [f64; 8]) -> BiomeRegistry<Scalar> {
        let biomes = std::array::from_fn(|i| {
            Biome::new(MaterialPalette::EMPTY, Scalar(values[i]))
        });
        BiomeRegistry::new(biomes)
    }

    #[test]
    fn get_returns_the_registered_biome() {
        let registry = registry_with([10.0, 20.0, 30.0, 40.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(registry.get(0).settings.0, 10.0);
        assert_eq!(registry.get(3).settings.0, 40.0);
    }

    #[test]
    fn aggregate_add_and_divide_by() {
        let mut acc = Scalar(10.0);
        acc.aggregate_add(&Scalar(20.0));
        acc.aggregate_add(&Scalar(30.0));
        acc.aggregate_add(&Scalar(40.0));
        acc.divide_by(4);
        assert_eq!(acc.0, 25.0);
    }
}
