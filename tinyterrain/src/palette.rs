//! Material palettes: four 4-bit material IDs packed into a 16-bit map.

use crate::error::{Result, TerrainError};

/// A material identifier, valid in `0..=15`.
pub type MaterialId = u8;

/// Four material IDs packed into a 16-bit value, one nibble each.
///
/// Nibble `i` occupies bits `[4*i, 4*i + 4)`. Palettes compare equal iff their
/// packed representations match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialPalette(u16);

const SLOT_COUNT: usize = 4;

impl MaterialPalette {
    /// An all-zero palette (every slot holds material `0`).
    pub const EMPTY: Self = Self(0);

    /// Build a palette from exactly four material IDs, each in `0..=15`.
    pub fn from_slice(ids: &[MaterialId]) -> Result<Self> {
        if ids.len() != SLOT_COUNT {
            return Err(TerrainError::Malformed("palette requires exactly 4 material IDs"));
        }
        let mut packed = 0u16;
        for (i, &id) in ids.iter().enumerate() {
            if id > 0x0F {
                return Err(TerrainError::Malformed("material ID must fit in 4 bits"));
            }
            packed |= (id as u16) << (4 * i);
        }
        Ok(Self(packed))
    }

    /// Raw 16-bit packed representation.
    pub fn raw(self) -> u16 {
        self.0
    }

    /// Reconstruct a palette from its packed representation.
    pub fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Material ID stored at slot `i`. Out-of-range `i` is not validated; the
    /// published behavior is to read whatever nibble falls out of the shift.
    pub fn get(&self, i: usize) -> MaterialId {
        ((self.0 >> (4 * i)) & 0x0F) as MaterialId
    }

    /// Overwrite slot `i` with `id`. Fails if `i` is not a valid slot index or
    /// `id` does not fit in 4 bits.
    pub fn set(&mut self, i: usize, id: MaterialId) -> Result<()> {
        if i >= SLOT_COUNT {
            return Err(TerrainError::OutOfRange {
                field: "palette index",
                value: i as i64,
                expected: "0..=3",
            });
        }
        if id > 0x0F {
            return Err(TerrainError::OutOfRange {
                field: "material id",
                value: id as i64,
                expected: "0..=15",
            });
        }
        let shift = 4 * i;
        self.0 = (self.0 & !(0x0F << shift)) | ((id as u16) << shift);
        Ok(())
    }

    /// Index of the first slot holding `id`, or `-1` if absent.
    pub fn index_of(&self, id: MaterialId) -> i32 {
        for i in 0..SLOT_COUNT {
            if self.get(i) == id {
                return i as i32;
            }
        }
        -1
    }
}

impl Default for MaterialPalette {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_slice_and_get() {
        let p = MaterialPalette::from_slice(&[1, 2, 3, 4]).unwrap();
        assert_eq!(p.get(0), 1);
        assert_eq!(p.get(1), 2);
        assert_eq!(p.get(2), 3);
        assert_eq!(p.get(3), 4);
    }

    #[test]
    fn index_of_hit_and_miss() {
        let p = MaterialPalette::from_slice(&[1, 2, 3, 4]).unwrap();
        assert_eq!(p.index_of(3), 2);
        assert_eq!(p.index_of(9), -1);
    }

    #[test]
    fn from_slice_wrong_length() {
        assert!(MaterialPalette::from_slice(&[1, 2, 3]).is_err());
        assert!(MaterialPalette::from_slice(&[1, 2, 3, 4, 5]).is_err());
    }

    #[test]
    fn from_slice_rejects_oversized_material() {
        assert!(MaterialPalette::from_slice(&[0, 0, 0, 16]).is_err());
    }

    #[test]
    fn set_is_idempotent_on_other_slots() {
        let mut p = MaterialPalette::from_slice(&[1, 2, 3, 4]).unwrap();
        p.set(1, 9).unwrap();
        assert_eq!(p.get(0), 1);
        assert_eq!(p.get(1), 9);
        assert_eq!(p.get(2), 3);
        assert_eq!(p.get(3), 4);
    }

    #[test]
    fn set_rejects_out_of_range_slot_or_material() {
        let mut p = MaterialPalette::EMPTY;
        assert!(p.set(4, 0).is_err());
        assert!(p.set(0, 16).is_err());
    }

    #[test]
    fn equality_is_by_packed_representation() {
        let a = MaterialPalette::from_slice(&[1, 2, 3, 4]).unwrap();
        let b = MaterialPalette::from_raw(a.raw());
        assert_eq!(a, b);
    }
}
