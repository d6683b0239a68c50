use serde::{Deserialize, Serialize};

use layoutplan_api::DiskSize;

/// Contiguous byte range of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Region {
    pub start: DiskSize,
    pub length: DiskSize,
}

impl Region {
    pub fn new(start: DiskSize, length: DiskSize) -> Self {
        Self { start, length }
    }

    pub fn from_bounds(start: DiskSize, end: DiskSize) -> Self {
        Self {
            start,
            length: end - start,
        }
    }

    /// First byte after the region.
    pub fn end(&self) -> DiskSize {
        self.start + self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length.is_zero()
    }

    pub fn contains(&self, other: &Region) -> bool {
        other.start >= self.start && other.end() <= self.end()
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.start < other.end() && other.start < self.end()
    }

    /// The part of the region that can hold aligned devices: start rounded
    /// up and end rounded down to the grain. `None` when nothing is left.
    pub fn aligned(&self, grain: DiskSize) -> Option<Region> {
        let start = self.start.ceil(grain);
        let end = self.end().floor(grain);
        (end > start).then(|| Region::from_bounds(start, end))
    }

    /// Aligned start, unaligned end. This is how the last device of a region
    /// is placed so that no byte at the end is lost.
    pub fn aligned_start(&self, grain: DiskSize) -> Option<Region> {
        let start = self.start.ceil(grain);
        (self.end() > start).then(|| Region::from_bounds(start, self.end()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let region = Region::new(DiskSize::mib(1), DiskSize::gib(1));
        assert_eq!(region.end(), DiskSize::mib(1025));
        assert!(region.contains(&Region::new(DiskSize::mib(2), DiskSize::mib(10))));
        assert!(!region.contains(&Region::new(DiskSize::mib(1020), DiskSize::mib(10))));
        assert!(region.overlaps(&Region::new(DiskSize::mib(1020), DiskSize::mib(10))));
        assert!(!region.overlaps(&Region::new(DiskSize::mib(1025), DiskSize::mib(10))));
    }

    #[test]
    fn test_aligned() {
        let region = Region::new(DiskSize::b(17408), DiskSize::mib(10));
        let aligned = region.aligned(DiskSize::mib(1)).unwrap();
        assert_eq!(aligned.start, DiskSize::mib(1));
        assert_eq!(aligned.end(), DiskSize::mib(10));

        let loose = region.aligned_start(DiskSize::mib(1)).unwrap();
        assert_eq!(loose.start, DiskSize::mib(1));
        assert_eq!(loose.end(), region.end());

        let tiny = Region::new(DiskSize::kib(1), DiskSize::kib(100));
        assert_eq!(tiny.aligned(DiskSize::mib(1)), None);
    }
}
