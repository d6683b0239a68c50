use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::{is_default, primitives::disk_size::DiskSize};

/// Global strategy used to make space for the planned devices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SpaceStrategy {
    /// Only the listed actions are considered: resizes first, biggest gain
    /// first, then optional deletions.
    #[default]
    BiggerResize,

    /// Actions are derived from the delete modes and `resize_windows`, then
    /// executed like `BiggerResize`.
    Auto,
}

/// What may be deleted from a class of partitions under the `Auto`
/// strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeleteMode {
    /// Never deleted.
    None,

    /// Deleted only when needed to make space.
    #[default]
    OnDemand,

    /// Always deleted.
    All,
}

/// Action on an existing device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum SpaceAction {
    /// Delete the device. Mandatory deletions are always executed, the rest
    /// only when space is needed.
    Delete {
        device: String,
        #[serde(default, skip_serializing_if = "is_default")]
        mandatory: bool,
    },

    /// Shrink the device when space is needed, never below `min_size`.
    Resize {
        device: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_size: Option<DiskSize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_size: Option<DiskSize>,
    },
}

impl SpaceAction {
    pub fn device(&self) -> &str {
        match self {
            SpaceAction::Delete { device, .. } | SpaceAction::Resize { device, .. } => device,
        }
    }

    pub fn is_mandatory_delete(&self) -> bool {
        matches!(self, SpaceAction::Delete { mandatory: true, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpaceSettings {
    #[serde(default)]
    pub strategy: SpaceStrategy,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<SpaceAction>,

    #[serde(default)]
    pub linux_delete_mode: DeleteMode,

    #[serde(default)]
    pub windows_delete_mode: DeleteMode,

    #[serde(default)]
    pub other_delete_mode: DeleteMode,

    #[serde(default = "default_true")]
    pub resize_windows: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SpaceSettings {
    fn default() -> Self {
        Self {
            strategy: SpaceStrategy::default(),
            actions: Vec::new(),
            linux_delete_mode: DeleteMode::default(),
            windows_delete_mode: DeleteMode::default(),
            other_delete_mode: DeleteMode::default(),
            resize_windows: true,
        }
    }
}

impl SpaceSettings {
    /// Action configured for the device, if any. Later entries win.
    pub fn action_for(&self, device: &str) -> Option<&SpaceAction> {
        self.actions.iter().rev().find(|a| a.device() == device)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn test_parse() {
        let settings: SpaceSettings = serde_yaml::from_str(indoc! {r#"
            strategy: bigger_resize
            actions:
              - delete:
                  device: /dev/sda1
                  mandatory: true
              - resize:
                  device: /dev/sda2
                  min_size: 10 GiB
              - delete:
                  device: /dev/sda3
        "#})
        .unwrap();

        assert_eq!(settings.strategy, SpaceStrategy::BiggerResize);
        assert!(settings.resize_windows);
        assert_eq!(settings.linux_delete_mode, DeleteMode::OnDemand);
        assert!(settings.actions[0].is_mandatory_delete());
        assert!(!settings.actions[2].is_mandatory_delete());
        assert_eq!(
            settings.action_for("/dev/sda2"),
            Some(&SpaceAction::Resize {
                device: "/dev/sda2".into(),
                min_size: Some(DiskSize::gib(10)),
                max_size: None,
            })
        );
        assert_eq!(settings.action_for("/dev/sdb1"), None);
    }

    #[test]
    fn test_auto() {
        let settings: SpaceSettings = serde_yaml::from_str(indoc! {r#"
            strategy: auto
            windows_delete_mode: none
            linux_delete_mode: all
            resize_windows: false
        "#})
        .unwrap();
        assert_eq!(settings.strategy, SpaceStrategy::Auto);
        assert_eq!(settings.windows_delete_mode, DeleteMode::None);
        assert_eq!(settings.linux_delete_mode, DeleteMode::All);
        assert_eq!(settings.other_delete_mode, DeleteMode::OnDemand);
        assert!(!settings.resize_windows);
    }
}
