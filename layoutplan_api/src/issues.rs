use std::fmt::Display;

use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, IntoStaticStr};

use crate::primitives::{
    disk_size::DiskSize,
    ids::{PlannedId, Sid},
};

/// How bad an issue is. `Error` issues make the whole proposal fail once
/// planning finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, StrumDisplay)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Severity {
    Warn,
    Error,
}

/// What the planner did with an invalid value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NewValue {
    /// The whole section was ignored.
    Skip,

    /// The value was replaced by a sane one.
    Replaced(String),
}

impl Display for NewValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NewValue::Skip => f.write_str("the section will be skipped"),
            NewValue::Replaced(v) => write!(f, "'{v}' will be used instead"),
        }
    }
}

/// A planned device that ended up smaller than its planned minimum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceShrinkage {
    pub planned: PlannedId,

    /// Device that was created or reused for `planned`.
    pub real: Sid,

    /// Planned minimum minus realized size.
    pub diff: DiskSize,
}

/// Non-fatal problem found while planning. The offending section is
/// coerced or dropped and planning goes on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, IntoStaticStr)]
#[serde(tag = "kind", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Issue {
    #[error("Invalid value '{value}' for attribute '{attr}' in {section}: {new_value}")]
    InvalidValue {
        section: String,
        attr: String,
        value: String,
        new_value: NewValue,
    },

    #[error("Missing value for attribute '{attr}' in {section}")]
    MissingValue { section: String, attr: String },

    #[error("Device to reuse for {section} was not found")]
    MissingReusableDevice { section: String },

    #[error("Not enough information to locate the device to reuse for {section}")]
    MissingReuseInfo { section: String },

    #[error("Device to reuse for {section} has no filesystem and no format was requested")]
    MissingReusableFilesystem { section: String },

    #[error("No disk found for {section}")]
    NoDisk { section: String },

    #[error("Device for {section} cannot be partitioned")]
    NoPartitionable { section: String },

    #[error("Only the first partition section of {section} is used, the rest are ignored")]
    SurplusPartitions { section: String },

    #[error("Thin pool '{pool}' referenced by {section} was not found")]
    ThinPoolNotFound { section: String, pool: String },

    #[error("RAID '{name}' does not have enough member devices")]
    MissingRaidMembers { name: String },

    #[error("Drive type '{drive_type}' of {section} is not supported")]
    UnsupportedDriveType { section: String, drive_type: String },

    #[error("Some planned devices had to be shrunk to fit: {}", format_shrinkages(.shrinkages))]
    ShrinkedPlannedDevices { shrinkages: Vec<DeviceShrinkage> },
}

fn format_shrinkages(shrinkages: &[DeviceShrinkage]) -> String {
    shrinkages
        .iter()
        .map(|s| format!("{} by {}", s.planned, s.diff))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Issue {
    pub fn severity(&self) -> Severity {
        match self {
            Issue::MissingValue { .. }
            | Issue::MissingReusableDevice { .. }
            | Issue::MissingReuseInfo { .. }
            | Issue::MissingReusableFilesystem { .. }
            | Issue::ThinPoolNotFound { .. }
            | Issue::MissingRaidMembers { .. } => Severity::Error,
            Issue::InvalidValue { .. }
            | Issue::NoDisk { .. }
            | Issue::NoPartitionable { .. }
            | Issue::SurplusPartitions { .. }
            | Issue::UnsupportedDriveType { .. }
            | Issue::ShrinkedPlannedDevices { .. } => Severity::Warn,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Error
    }

    /// Shortcut for an invalid size that makes the section be skipped.
    pub fn invalid_size(section: impl Into<String>, value: impl Into<String>) -> Self {
        Issue::InvalidValue {
            section: section.into(),
            attr: "size".into(),
            value: value.into(),
            new_value: NewValue::Skip,
        }
    }
}

/// Ordered collection of the issues found during a proposal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuesList {
    issues: Vec<Issue>,
}

impl IssuesList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: Issue) {
        log::warn!("[{}] {}", issue.severity(), issue);
        self.issues.push(issue);
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = Issue>) {
        for issue in issues {
            self.push(issue);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Whether any issue is severe enough to abort the proposal.
    pub fn has_fatal(&self) -> bool {
        self.issues.iter().any(Issue::is_fatal)
    }

    pub fn fatal_count(&self) -> usize {
        self.issues.iter().filter(|i| i.is_fatal()).count()
    }
}

impl Serialize for IssuesList {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::{SerializeMap, SerializeSeq};

        struct WithSeverity<'a>(&'a Issue);
        impl Serialize for WithSeverity<'_> {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("severity", &self.0.severity())?;
                map.serialize_entry("message", &self.0.to_string())?;
                map.serialize_entry("details", self.0)?;
                map.end()
            }
        }

        let mut seq = serializer.serialize_seq(Some(self.issues.len()))?;
        for issue in &self.issues {
            seq.serialize_element(&WithSeverity(issue))?;
        }
        seq.end()
    }
}

impl<'a> IntoIterator for &'a IssuesList {
    type Item = &'a Issue;
    type IntoIter = std::slice::Iter<'a, Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.issues.iter()
    }
}
