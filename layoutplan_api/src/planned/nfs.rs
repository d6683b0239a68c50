use serde::{Deserialize, Serialize};

use crate::{is_default, primitives::ids::PlannedId};

/// NFS share to mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedNfs {
    pub planned_id: PlannedId,
    pub server: String,
    pub path: String,
    pub mount_point: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fstab_options: Vec<String>,

    /// Reuse an already known mount of the same share.
    #[serde(default, skip_serializing_if = "is_default")]
    pub reuse: bool,
}

impl PlannedNfs {
    /// Share name in the `server:/path` form.
    pub fn share(&self) -> String {
        format!("{}:{}", self.server, self.path)
    }
}

/// Tmpfs to mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedTmpfs {
    pub planned_id: PlannedId,
    pub mount_point: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fstab_options: Vec<String>,
}
