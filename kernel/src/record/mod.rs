// Record Identity & Bitmaps
//
// Records are addressed by a dense numeric ID. Membership sets over the
// whole ID space are fixed-size bit vectors so that catalog lookups and
// per-player intersections stay O(1) / word-parallel.

use bit_vec::BitVec;

/// Dense record identifier in `[0, MAX_RECORDS)`.
///
/// `0` doubles as the empty-slot marker and is never a catalog record.
pub type RecordId = u16;

/// Size of the record ID space.
pub const MAX_RECORDS: usize = 4096;

/// Fixed-size set of record IDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBitmap {
    bits: BitVec,
}

impl Default for RecordBitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordBitmap {
    /// Create an empty bitmap covering the full ID space.
    pub fn new() -> Self {
        Self {
            bits: BitVec::from_elem(MAX_RECORDS, false),
        }
    }

    /// Whether `id` is in the set. Out-of-range IDs are never members.
    pub fn test(&self, id: RecordId) -> bool {
        self.bits.get(usize::from(id)).unwrap_or(false)
    }

    /// Add `id`. Out-of-range IDs are ignored.
    pub fn set(&mut self, id: RecordId) {
        if usize::from(id) < MAX_RECORDS {
            self.bits.set(usize::from(id), true);
        }
    }

    /// Remove `id`.
    pub fn reset(&mut self, id: RecordId) {
        if usize::from(id) < MAX_RECORDS {
            self.bits.set(usize::from(id), false);
        }
    }

    /// Remove every member.
    pub fn clear(&mut self) {
        self.bits = BitVec::from_elem(MAX_RECORDS, false);
    }

    /// Members present in both sets.
    pub fn intersection(&self, other: &RecordBitmap) -> RecordBitmap {
        let mut bits = self.bits.clone();
        bits.and(&other.bits);
        RecordBitmap { bits }
    }

    /// Remove every member of `other` from this set.
    pub fn subtract(&mut self, other: &RecordBitmap) {
        self.bits.difference(&other.bits);
    }

    pub fn none(&self) -> bool {
        self.bits.none()
    }

    pub fn any(&self) -> bool {
        self.bits.any()
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|bit| *bit).count()
    }

    /// Iterate over member IDs in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, bit)| *bit)
            .map(|(idx, _)| idx as RecordId)
    }

    /// Encode as bytes, record `id` at byte `id / 8`, bit `id % 8`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; MAX_RECORDS / 8];
        for id in self.ids() {
            let id = usize::from(id);
            bytes[id / 8] |= 1 << (id % 8);
        }
        bytes
    }

    /// Decode the layout produced by [`RecordBitmap::to_bytes`].
    ///
    /// Short input leaves the remaining IDs clear; excess bytes are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut bitmap = Self::new();
        for (page, byte) in bytes.iter().take(MAX_RECORDS / 8).enumerate() {
            for bit in 0..8 {
                if byte & (1 << bit) != 0 {
                    bitmap.bits.set(page * 8 + bit, true);
                }
            }
        }
        bitmap
    }
}

impl FromIterator<RecordId> for RecordBitmap {
    fn from_iter<I: IntoIterator<Item = RecordId>>(iter: I) -> Self {
        let mut bitmap = RecordBitmap::new();
        for id in iter {
            bitmap.set(id);
        }
        bitmap
    }
}
