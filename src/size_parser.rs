//! Turns the textual sizes of profile sections into [`PlannedSize`]s.
//!
//! Accepted values:
//!
//! - nothing or an empty string: the given bounds, without weight;
//! - a number, optionally with a unit (`10`, `5GB`, `1.5 GiB`): exactly that
//!   size;
//! - a percentage (`50%`): resolved later against the hosting device;
//! - `max`: as big as possible;
//! - `auto`: taken from the volume specifications by mount point.

use log::trace;

use layoutplan_api::{
    constants::{SWAP_AUTO_MAX_SIZE, SWAP_AUTO_MIN_SIZE, SWAP_MOUNT_POINT},
    planned::{PlannedSize, SizeRangeError},
    volumes::VolumeSpecs,
    DiskSize,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SizeParseError {
    #[error("'{0}' is not a valid size")]
    Invalid(String),

    #[error("No automatic size is known for mount point '{0}'")]
    NoAutoSize(String),

    #[error(transparent)]
    Range(#[from] SizeRangeError),
}

pub struct SizeParser<'a> {
    volumes: &'a VolumeSpecs,
}

impl<'a> SizeParser<'a> {
    pub fn new(volumes: &'a VolumeSpecs) -> Self {
        Self { volumes }
    }

    /// Parses `token` for a device mounted at `mount_point`. `min` and `max`
    /// are the bounds of a device without explicit size.
    pub fn parse(
        &self,
        token: Option<&str>,
        mount_point: Option<&str>,
        min: DiskSize,
        max: DiskSize,
    ) -> Result<PlannedSize, SizeParseError> {
        let token = token.map(str::trim).unwrap_or_default();
        trace!("Parsing size '{token}' for {mount_point:?}");

        if token.is_empty() {
            return Ok(PlannedSize::new(min, max)?);
        }
        if token.eq_ignore_ascii_case("max") {
            return Ok(PlannedSize::new(min, max)?.with_weight(1));
        }
        if token.eq_ignore_ascii_case("auto") {
            return self.auto_size(mount_point.unwrap_or_default());
        }
        if let Some(percent) = token.strip_suffix('%') {
            let percent = percent
                .trim()
                .parse::<u32>()
                .map_err(|_| SizeParseError::Invalid(token.to_owned()))?;
            return Ok(PlannedSize::from_percent(percent)?);
        }

        match DiskSize::parse(token) {
            Ok(size) if !size.is_zero() && !size.is_unlimited() => Ok(PlannedSize::fixed(size)),
            _ => Err(SizeParseError::Invalid(token.to_owned())),
        }
    }

    fn auto_size(&self, mount_point: &str) -> Result<PlannedSize, SizeParseError> {
        if let Some(volume) = self.volumes.for_mount_point(mount_point) {
            let size = PlannedSize::new(volume.min_size, volume.max_size)?;
            return Ok(match volume.weight {
                Some(weight) => size.with_weight(weight),
                None => size,
            });
        }
        if mount_point == SWAP_MOUNT_POINT {
            return Ok(PlannedSize::new(SWAP_AUTO_MIN_SIZE, SWAP_AUTO_MAX_SIZE)?);
        }
        Err(SizeParseError::NoAutoSize(mount_point.to_owned()))
    }
}
