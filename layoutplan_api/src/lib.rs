pub mod constants;
pub mod error;
pub mod issues;
pub mod planned;
pub mod primitives;
pub mod profile;
pub mod settings;
pub mod volumes;

pub use primitives::{
    disk_size::DiskSize,
    ids::{PlannedId, PlannedIdGenerator, Sid},
};

/// Returns true when the value equals its type's default. Used to keep
/// serialized output short.
pub(crate) fn is_default<T: Default + PartialEq>(t: &T) -> bool {
    t == &T::default()
}
