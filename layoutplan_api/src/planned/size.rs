use serde::{Deserialize, Serialize};

use crate::primitives::disk_size::DiskSize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SizeRangeError {
    #[error("Minimum size {min} is bigger than maximum size {max}")]
    MinAboveMax { min: DiskSize, max: DiskSize },

    #[error("Percentage {0}% is out of range")]
    PercentOutOfRange(u32),
}

/// Size constraints of a planned device.
///
/// A size is either a `[min, max]` range, possibly with a weight used to
/// distribute extra space, or a percentage of the hosting space that is only
/// turned into a range once the space is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSize {
    min: DiskSize,
    max: DiskSize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    percent: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    weight: Option<u32>,
}

impl Default for PlannedSize {
    fn default() -> Self {
        Self {
            min: DiskSize::b(1),
            max: DiskSize::UNLIMITED,
            percent: None,
            weight: None,
        }
    }
}

impl PlannedSize {
    pub fn new(min: DiskSize, max: DiskSize) -> Result<Self, SizeRangeError> {
        if min > max {
            return Err(SizeRangeError::MinAboveMax { min, max });
        }
        Ok(Self {
            min,
            max,
            ..Default::default()
        })
    }

    /// Exactly `size`, no more, no less.
    pub fn fixed(size: DiskSize) -> Self {
        Self {
            min: size,
            max: size,
            ..Default::default()
        }
    }

    /// As big as possible, sharing extra space with weight 1.
    pub fn max() -> Self {
        Self {
            weight: Some(1),
            ..Default::default()
        }
    }

    pub fn from_percent(percent: u32) -> Result<Self, SizeRangeError> {
        if percent > 100 {
            return Err(SizeRangeError::PercentOutOfRange(percent));
        }
        Ok(Self {
            percent: Some(percent),
            ..Default::default()
        })
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn min(&self) -> DiskSize {
        self.min
    }

    pub fn max_size(&self) -> DiskSize {
        self.max
    }

    pub fn percent(&self) -> Option<u32> {
        self.percent
    }

    pub fn weight(&self) -> Option<u32> {
        self.weight
    }

    /// Weight used when distributing extra space. Devices without weight
    /// never grow beyond their minimum unless nothing else can.
    pub fn effective_weight(&self) -> u32 {
        self.weight.unwrap_or(0)
    }

    pub fn set_min(&mut self, min: DiskSize) -> Result<(), SizeRangeError> {
        if min > self.max {
            return Err(SizeRangeError::MinAboveMax { min, max: self.max });
        }
        self.min = min;
        Ok(())
    }

    pub fn set_max(&mut self, max: DiskSize) -> Result<(), SizeRangeError> {
        if self.min > max {
            return Err(SizeRangeError::MinAboveMax { min: self.min, max });
        }
        self.max = max;
        Ok(())
    }

    pub fn set_weight(&mut self, weight: Option<u32>) {
        self.weight = weight;
    }

    /// Turns a percentage into a fixed range relative to `container`.
    /// Non-percentage sizes are returned as they are.
    pub fn resolve(&self, container: DiskSize) -> PlannedSize {
        match self.percent {
            Some(percent) => {
                let size = container.percent(percent);
                PlannedSize {
                    min: size,
                    max: size,
                    percent: None,
                    weight: self.weight,
                }
            }
            None => *self,
        }
    }

    /// Minimum used before the hosting space is known. Percentages have no
    /// meaningful minimum yet, so the smallest device is assumed.
    pub fn unresolved_min(&self) -> DiskSize {
        match self.percent {
            Some(_) => DiskSize::b(1),
            None => self.min,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.percent.is_none() && self.min == self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let size = PlannedSize::new(DiskSize::gib(1), DiskSize::gib(2)).unwrap();
        assert_eq!(size.min(), DiskSize::gib(1));
        assert_eq!(size.max_size(), DiskSize::gib(2));
        assert_eq!(size.weight(), None);

        assert_eq!(
            PlannedSize::new(DiskSize::gib(3), DiskSize::gib(2)).unwrap_err(),
            SizeRangeError::MinAboveMax {
                min: DiskSize::gib(3),
                max: DiskSize::gib(2)
            }
        );
        assert_eq!(
            PlannedSize::from_percent(101).unwrap_err(),
            SizeRangeError::PercentOutOfRange(101)
        );
    }

    #[test]
    fn test_setters_keep_range() {
        let mut size = PlannedSize::fixed(DiskSize::gib(5));
        assert!(size.set_min(DiskSize::gib(6)).is_err());
        assert!(size.set_max(DiskSize::gib(4)).is_err());
        assert_eq!(size, PlannedSize::fixed(DiskSize::gib(5)));

        size.set_max(DiskSize::UNLIMITED).unwrap();
        size.set_min(DiskSize::mib(1)).unwrap();
        assert_eq!(size.min(), DiskSize::mib(1));
        assert!(!size.is_fixed());
    }

    #[test]
    fn test_resolve() {
        let size = PlannedSize::from_percent(50).unwrap();
        assert_eq!(size.unresolved_min(), DiskSize::b(1));
        let resolved = size.resolve(DiskSize::gib(250));
        assert_eq!(resolved.min(), DiskSize::gib(125));
        assert_eq!(resolved.max_size(), DiskSize::gib(125));
        assert_eq!(resolved.percent(), None);

        let max = PlannedSize::max();
        assert_eq!(max.resolve(DiskSize::gib(10)), max);
        assert_eq!(max.min(), DiskSize::b(1));
        assert_eq!(max.max_size(), DiskSize::UNLIMITED);
        assert_eq!(max.weight(), Some(1));
    }
}
