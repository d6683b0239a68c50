use std::fmt::{Debug, Write};
use std::{borrow::Cow, panic::Location};

use serde::{ser::SerializeStruct, Deserialize, Serialize};
use strum_macros::IntoStaticStr;

use crate::primitives::disk_size::DiskSize;

/// User provided input was invalid in a way that cannot be reported as an
/// issue, so planning cannot even start.
#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidInputError {
    #[error("Failed to load file from '{path}'")]
    LoadFile { path: String },
    #[error("Failed to parse partitioning profile")]
    ParseProfile,
    #[error("Failed to parse device graph description")]
    ParseDevicegraph,
    #[error("Failed to parse space settings")]
    ParseSettings,
    #[error("Failed to parse volume specifications")]
    ParseVolumes,
    #[error("Device '{name}' does not exist")]
    UnknownDevice { name: String },
    #[error("Device '{name}' cannot be resized: {reason}")]
    InvalidResize { name: String, reason: String },
    #[error("Partitioning profile has {count} fatal issue(s)")]
    FatalIssues { count: usize },
}

/// Planning or creating the devices failed. The whole proposal is aborted
/// and no partial device graph is returned.
#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisioningError {
    #[error("Not enough disk space for the planned devices, {missing} missing")]
    NoDiskSpace { missing: DiskSize },
    #[error("Failed to make space on the candidate disks")]
    MakeSpace,
    #[error("Failed to delete device '{name}'")]
    DeleteDevice { name: String },
    #[error("Failed to resize device '{name}'")]
    ResizeDevice { name: String },
    #[error("Failed to create partition table on '{disk}'")]
    CreatePartitionTable { disk: String },
    #[error("Failed to create partitions")]
    CreatePartitions,
    #[error("Failed to reuse device '{name}'")]
    ReuseDevice { name: String },
    #[error("Failed to create LVM volume group '{name}'")]
    CreateLvm { name: String },
    #[error("Failed to create software RAID '{name}'")]
    CreateMd { name: String },
    #[error("Failed to create bcache device '{name}'")]
    CreateBcache { name: String },
    #[error("Failed to create Btrfs filesystem '{name}'")]
    CreateBtrfs { name: String },
    #[error("Failed to create NFS mount '{name}'")]
    CreateNfs { name: String },
    #[error("Failed to create tmpfs mount '{name}'")]
    CreateTmpfs { name: String },
}

#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum InternalError {
    #[error("Internal error: {0}")]
    Internal(&'static str),
    #[error("Device with {sid} is missing from the device graph")]
    MissingDevice { sid: crate::primitives::ids::Sid },
    #[error("Planned device {planned_id} was not created")]
    MissingPlannedDevice {
        planned_id: crate::primitives::ids::PlannedId,
    },
}

/// Each variant of `ErrorKind` corresponds to a different category of error.
/// The categories are intended to be user-meaningful.
#[derive(Debug, Eq, thiserror::Error, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// The planner was provided invalid input.
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),

    /// The planned devices cannot be realized on the available disks.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// A bug was encountered.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

#[derive(Debug)]
struct PlannerErrorInner {
    kind: ErrorKind,
    location: &'static Location<'static>,
    source: Option<anyhow::Error>,
    context: Vec<(Cow<'static, str>, &'static Location<'static>)>,
}

/// Fatal error aborting the whole planning pipeline.
pub struct PlannerError(Box<PlannerErrorInner>);
impl PlannerError {
    #[track_caller]
    pub fn new(kind: impl Into<ErrorKind>) -> Self {
        PlannerError(Box::new(PlannerErrorInner {
            kind: kind.into(),
            location: Location::caller(),
            source: None,
            context: Vec::new(),
        }))
    }

    pub fn unstructured(self, context: impl Into<Cow<'static, str>>) -> anyhow::Error {
        match self.0.source {
            Some(source) => source.context(self.0.kind).context(context.into()),
            None => anyhow::Error::from(self.0.kind).context(context.into()),
        }
    }

    /// Returns a reference to the inner ErrorKind.
    pub fn kind(&self) -> &ErrorKind {
        &self.0.kind
    }

    /// Whether the error means the planned devices do not fit.
    pub fn is_no_disk_space(&self) -> bool {
        matches!(
            self.0.kind,
            ErrorKind::Provisioning(ProvisioningError::NoDiskSpace { .. })
        )
    }
}

pub trait ReportError<T, K> {
    /// Convert this error into a structured PlannerError.
    fn structured(self, kind: K) -> Result<T, PlannerError>;
}

impl<T, K> ReportError<T, K> for Option<T>
where
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, PlannerError> {
        match self {
            Some(t) => Ok(t),
            None => Err(PlannerError(Box::new(PlannerErrorInner {
                kind: kind.into(),
                location: Location::caller(),
                source: None,
                context: Vec::new(),
            }))),
        }
    }
}

impl<T, E, K> ReportError<T, K> for Result<T, E>
where
    E: Into<anyhow::Error>,
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, PlannerError> {
        match self {
            Ok(o) => Ok(o),
            Err(e) => Err(PlannerError(Box::new(PlannerErrorInner {
                kind: kind.into(),
                location: Location::caller(),
                source: Some(e.into()),
                context: Vec::new(),
            }))),
        }
    }
}

pub trait PlannerResultExt<T> {
    /// Attach a context message to the error.
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, PlannerError>;

    /// Convert the error into an unstructured error.
    fn unstructured(self, context: impl Into<Cow<'static, str>>) -> Result<T, anyhow::Error>;
}

impl<T> PlannerResultExt<T> for Result<T, PlannerError> {
    #[track_caller]
    fn message(mut self, context: impl Into<Cow<'static, str>>) -> Result<T, PlannerError> {
        if let Err(ref mut e) = self {
            e.0.context.push((context.into(), Location::caller()));
        }
        self
    }

    fn unstructured(self, context: impl Into<Cow<'static, str>>) -> Result<T, anyhow::Error> {
        self.map_err(|e| e.unstructured(context))
    }
}

impl Serialize for PlannerError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("planner-error", 5)?;
        state.serialize_field("message", &self.0.kind.to_string())?;
        match self.0.kind {
            ErrorKind::InvalidInput(ref e) => state.serialize_field("error", e)?,
            ErrorKind::Provisioning(ref e) => state.serialize_field("error", e)?,
            ErrorKind::Internal(ref e) => state.serialize_field("error", e)?,
        }
        state.serialize_field("category", <&str>::from(&self.0.kind))?;
        state.serialize_field(
            "location",
            &format!("{}:{}", self.0.location.file(), self.0.location.line()),
        )?;
        match self.0.source {
            Some(ref e) => state.serialize_field("cause", &Some(format!("{:?}", e)))?,
            None => state.serialize_field("cause", &None::<String>)?,
        }
        state.end()
    }
}

impl Debug for PlannerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {}:{}",
            self.0.kind,
            self.0.location.file(),
            self.0.location.line()
        )?;

        if !self.0.context.is_empty() {
            writeln!(f, "\n\nContext:")?;
            for (i, (context, location)) in self.0.context.iter().enumerate() {
                for (j, line) in context.split('\n').enumerate() {
                    if j == 0 {
                        write!(f, "{: >5}: ", i)?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                writeln!(f, " at {}:{}", location.file(), location.line())?;
            }
        }

        if let Some(ref source) = self.0.source {
            writeln!(f, "\n\nCaused by:")?;
            let mut index = 0;
            let mut source: Option<&dyn std::error::Error> = Some(source.as_ref());
            while let Some(e) = source {
                for (i, line) in e.to_string().split('\n').enumerate() {
                    if i == 0 {
                        write!(f, "{: >5}: ", index)?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                f.write_char('\n')?;
                source = e.source();
                index += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;
    use serde_yaml::Value;

    use super::*;

    #[test]
    fn test_error_serialize() {
        let e = PlannerError(Box::new(PlannerErrorInner {
            kind: ErrorKind::InvalidInput(InvalidInputError::ParseProfile),
            location: Location::caller(),
            source: Some(
                std::fs::read("/non-existant-file")
                    .context("failed to read file")
                    .unwrap_err(),
            ),
            context: Vec::new(),
        }));
        match serde_yaml::to_value(e).unwrap() {
            Value::Mapping(m) => {
                assert_eq!(m.len(), 5);
                assert_eq!(m["error"], Value::String("parse-profile".into()));
                assert_eq!(m["category"], Value::String("invalid-input".into()));
                assert!(matches!(m["cause"], Value::String(_)));
                assert_eq!(
                    m["message"],
                    Value::String("Failed to parse partitioning profile".into())
                );
                match m["location"] {
                    Value::String(ref s) => assert!(s.contains("error.rs:")),
                    _ => panic!("location isn't string"),
                }
            }
            _ => panic!("value isn't mapping"),
        }
    }

    #[test]
    fn test_error_debug() {
        let error = Err::<(), _>(anyhow::anyhow!("z"))
            .context("x\ny")
            .structured(InternalError::Internal("w"))
            .unwrap_err();
        assert_eq!(
            format!("{:?}", error),
            format!(
                "Internal error: w at {}:{}\n\nCaused by:\n    0: x\n       y\n    1: z\n",
                error.0.location.file(),
                error.0.location.line(),
            ),
        );
    }

    #[test]
    fn test_no_disk_space() {
        let error = PlannerError::new(ProvisioningError::NoDiskSpace {
            missing: DiskSize::gib(2),
        });
        assert!(error.is_no_disk_space());
        assert_eq!(
            error.kind().to_string(),
            "Not enough disk space for the planned devices, 2 GiB missing"
        );

        let error = Err::<(), _>(PlannerError::new(ProvisioningError::MakeSpace))
            .message("while proposing")
            .unwrap_err();
        assert!(!error.is_no_disk_space());
        assert!(format!("{error:?}").contains("while proposing"));
    }
}
