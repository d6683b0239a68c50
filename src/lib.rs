//! Storage layout planning for unattended installations: turns a
//! partitioning profile and the current devices into a target device graph.

use std::{fs, path::Path};

use anyhow::{Context, Error};
use serde::de::DeserializeOwned;

pub mod cli;
pub mod creators;
pub mod devices_creator;
pub mod distribution;
pub mod drives_map;
pub mod planners;
pub mod proposal;
pub mod size_parser;
pub mod space_maker;
pub mod transaction;

pub use proposal::{AutoinstProposal, Proposal, ProposalReport};

pub const LAYOUTPLAN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Reads and parses a YAML input file.
pub fn load_yaml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, Error> {
    let path = path.as_ref();
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read '{}'", path.display()))?;
    serde_yaml::from_str(&contents).with_context(|| format!("Failed to parse '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use layoutplan_api::profile::PartitioningProfile;

    use super::*;

    #[test]
    fn test_load_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "partitioning: [{{ device: /dev/sda }}]").unwrap();
        let profile: PartitioningProfile = load_yaml(file.path()).unwrap();
        assert_eq!(profile.partitioning.len(), 1);

        writeln!(file, "  - ]").unwrap();
        let err = load_yaml::<PartitioningProfile>(file.path()).unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse"));
        assert!(load_yaml::<PartitioningProfile>("/nonexistent/profile.yaml").is_err());
    }
}
