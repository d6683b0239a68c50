//! sysdefs (System Definitions) is a dependency-light crate meant exclusively
//! to contain definitions for simple, basic, or axiomatic storage concepts:
//! partition tables and their limits, partition ids, filesystem types and
//! RAID/cache levels.
//!
//! As the name implies, the crate mainly provides definitions, and should
//! contain minimal or no behavior at all.
//!

pub mod filesystems;
pub mod levels;
pub mod mount_by;
pub mod partition_ids;
pub mod partition_tables;
