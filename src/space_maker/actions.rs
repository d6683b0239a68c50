//! Space actions resolved against the device graph.

use std::cmp::Reverse;

use log::{debug, trace};

use devicegraph::{DeviceGraph, DeviceKind};
use layoutplan_api::{
    error::{InvalidInputError, PlannerError},
    settings::{DeleteMode, SpaceAction, SpaceSettings, SpaceStrategy},
    DiskSize, Sid,
};
use sysdefs::partition_tables::PartitionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Action {
    /// Deleting a whole disk wipes it.
    Delete { sid: Sid, mandatory: bool },

    Resize { sid: Sid, min_size: Option<DiskSize> },
}

impl Action {
    pub fn sid(&self) -> Sid {
        match self {
            Action::Delete { sid, .. } | Action::Resize { sid, .. } => *sid,
        }
    }
}

/// Actions for the devices of the target disks: the configured ones plus,
/// under the `Auto` strategy, the ones derived from the delete modes.
pub(super) fn resolve(
    graph: &DeviceGraph,
    disks: &[String],
    settings: &SpaceSettings,
) -> Result<Vec<Action>, PlannerError> {
    let mut actions = Vec::new();
    for action in &settings.actions {
        let device = graph.find_by_name(action.device()).ok_or_else(|| {
            PlannerError::new(InvalidInputError::UnknownDevice {
                name: action.device().to_owned(),
            })
        })?;
        match action {
            SpaceAction::Delete { mandatory, .. } => actions.push(Action::Delete {
                sid: device.sid,
                mandatory: *mandatory,
            }),
            SpaceAction::Resize { min_size, .. } => {
                if device.as_partition().is_none() {
                    return Err(PlannerError::new(InvalidInputError::InvalidResize {
                        name: device.name.clone(),
                        reason: "only partitions can be resized".into(),
                    }));
                }
                actions.push(Action::Resize {
                    sid: device.sid,
                    min_size: *min_size,
                });
            }
        }
    }

    if settings.strategy == SpaceStrategy::Auto {
        for disk in disks.iter().filter_map(|name| graph.find_by_name(name)) {
            for partition in graph.partitions(disk.sid) {
                if actions.iter().any(|a| a.sid() == partition.sid) {
                    continue;
                }
                actions.extend(auto_actions(graph, partition.sid, settings));
            }
        }
    }
    debug!("Resolved {} space actions", actions.len());
    Ok(actions)
}

fn auto_actions(graph: &DeviceGraph, sid: Sid, settings: &SpaceSettings) -> Vec<Action> {
    let Some(partition) = graph.device(sid).and_then(|d| d.as_partition()) else {
        return Vec::new();
    };
    if partition.partition_type == PartitionType::Extended {
        return Vec::new();
    }
    let windows = partition.id.is_windows_system()
        || graph
            .filesystem_of(sid)
            .and_then(|fs| fs.as_filesystem())
            .is_some_and(|fs| fs.fs_type.is_windows());

    let mut actions = Vec::new();
    if windows && settings.resize_windows {
        actions.push(Action::Resize { sid, min_size: None });
    }
    let mode = if windows {
        settings.windows_delete_mode
    } else if partition.id.is_linux_system() {
        settings.linux_delete_mode
    } else {
        settings.other_delete_mode
    };
    match mode {
        DeleteMode::None => {}
        DeleteMode::OnDemand => actions.push(Action::Delete { sid, mandatory: false }),
        DeleteMode::All => actions.push(Action::Delete { sid, mandatory: true }),
    }
    trace!("Derived actions for {sid}: {actions:?}");
    actions
}

/// Bytes a resize can free at most.
pub(super) fn resize_gain(graph: &DeviceGraph, sid: Sid, min_size: Option<DiskSize>) -> DiskSize {
    let info = graph.resize_info(sid);
    let Some(size) = graph.size(sid) else {
        return DiskSize::ZERO;
    };
    if !info.resize_ok {
        return DiskSize::ZERO;
    }
    size - info.min_size.max(min_size.unwrap_or(DiskSize::ZERO))
}

/// Optional actions in execution order: resizes by decreasing gain, then
/// deletions from the end of the disks.
pub(super) fn optional_in_order(graph: &DeviceGraph, actions: &[Action]) -> Vec<Action> {
    let mut resizes: Vec<Action> = actions
        .iter()
        .filter(|a| matches!(a, Action::Resize { .. }))
        .copied()
        .collect();
    resizes.sort_by_key(|a| match a {
        Action::Resize { sid, min_size } => Reverse(resize_gain(graph, *sid, *min_size)),
        Action::Delete { .. } => Reverse(DiskSize::ZERO),
    });

    let mut deletes: Vec<Action> = actions
        .iter()
        .filter(|a| matches!(a, Action::Delete { mandatory: false, .. }))
        .copied()
        .collect();
    deletes.sort_by_key(|a| {
        let start = graph.device(a.sid()).and_then(|d| match &d.kind {
            DeviceKind::Partition(p) => Some(p.region.start),
            _ => None,
        });
        // Devices that are not partitions go last.
        (start.is_none(), Reverse(start))
    });

    resizes.extend(deletes);
    resizes
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use devicegraph::fixtures;
    use layoutplan_api::error::ErrorKind;

    use super::*;

    fn graph() -> DeviceGraph {
        fixtures::from_yaml(indoc! {r#"
            disks:
              - name: /dev/sda
                size: 200 GiB
                partition_table: msdos
                partitions:
                  - size: 60 GiB
                    id: ntfs
                    filesystem: ntfs
                    resize: { min_size: 20 GiB }
                  - size: 40 GiB
                    id: windows
                    filesystem: vfat
                    resize: { min_size: 30 GiB }
                  - { size: 20 GiB, id: linux, filesystem: ext4 }
                  - { size: 10 GiB, id: prep }
        "#})
        .unwrap()
    }

    fn sid(graph: &DeviceGraph, name: &str) -> Sid {
        graph.find_by_name(name).unwrap().sid
    }

    #[test]
    fn test_auto_actions() {
        let graph = graph();
        let settings: SpaceSettings = serde_yaml::from_str(indoc! {r#"
            strategy: auto
            linux_delete_mode: all
            windows_delete_mode: none
            other_delete_mode: on_demand
        "#})
        .unwrap();
        let actions = resolve(&graph, &["/dev/sda".into()], &settings).unwrap();
        assert_eq!(
            actions,
            vec![
                Action::Resize { sid: sid(&graph, "/dev/sda1"), min_size: None },
                Action::Resize { sid: sid(&graph, "/dev/sda2"), min_size: None },
                Action::Delete { sid: sid(&graph, "/dev/sda3"), mandatory: true },
                Action::Delete { sid: sid(&graph, "/dev/sda4"), mandatory: false },
            ]
        );

        // Resizes with the biggest gain first, then deletions.
        assert_eq!(
            optional_in_order(&graph, &actions),
            vec![
                Action::Resize { sid: sid(&graph, "/dev/sda1"), min_size: None },
                Action::Resize { sid: sid(&graph, "/dev/sda2"), min_size: None },
                Action::Delete { sid: sid(&graph, "/dev/sda4"), mandatory: false },
            ]
        );
    }

    #[test]
    fn test_configured_actions() {
        let graph = graph();
        let settings: SpaceSettings = serde_yaml::from_str(indoc! {r#"
            actions:
              - resize: { device: /dev/sda1, min_size: 55 GiB }
              - resize: { device: /dev/sda2 }
              - delete: { device: /dev/sda3 }
              - delete: { device: /dev/sda4 }
        "#})
        .unwrap();
        let actions = resolve(&graph, &["/dev/sda".into()], &settings).unwrap();
        assert_eq!(resize_gain(&graph, sid(&graph, "/dev/sda1"), Some(DiskSize::gib(55))), DiskSize::gib(5));
        assert_eq!(
            optional_in_order(&graph, &actions)
                .iter()
                .map(|a| graph.device(a.sid()).unwrap().name.as_str())
                .collect::<Vec<_>>(),
            vec!["/dev/sda2", "/dev/sda1", "/dev/sda4", "/dev/sda3"]
        );

        let settings: SpaceSettings = serde_yaml::from_str("actions: [{ delete: { device: /dev/sdz1 } }]").unwrap();
        let err = resolve(&graph, &["/dev/sda".into()], &settings).unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::from(InvalidInputError::UnknownDevice { name: "/dev/sdz1".into() })
        );
    }
}
