use log::debug;

use layoutplan_api::{
    constants::DEFAULT_EXTENT_SIZE,
    issues::{Issue, IssuesList, NewValue},
    planned::{
        LvType, MakeSpacePolicy, PlannedDevice, PlannedLv, PlannedSize, PlannedVg, ReuseTarget,
        SizeStrategy,
    },
    profile::PartitionSection,
    DiskSize,
};

use crate::drives_map::{partition_section_name, DriveEntry};

use super::{common, short_device_name, DevicesPlanner};

pub(super) fn plan(
    planner: &mut DevicesPlanner,
    entry: &DriveEntry,
    issues: &mut IssuesList,
) -> Vec<PlannedDevice> {
    let Some(vg_name) = short_device_name(entry) else {
        issues.push(Issue::MissingValue {
            section: entry.name(),
            attr: "device".into(),
        });
        return Vec::new();
    };

    let mut vg = PlannedVg::new(planner.ids.next_id(), vg_name.clone());
    vg.extent_size = extent_size(entry, issues);
    vg.make_space_policy = if entry.section.keep_unknown_lv {
        MakeSpacePolicy::Keep
    } else {
        MakeSpacePolicy::Remove
    };

    for (i, section) in entry.section.partitions.iter().enumerate() {
        let section_name = partition_section_name(entry.index, i);
        if let Some(lv) = plan_lv(planner, &vg_name, section, &section_name, issues) {
            vg.lvs.push(lv);
        }
    }
    drop_thins_without_pool(entry, &mut vg, issues);

    let existing = planner.graph.find_vg(&vg_name);
    if let Some(existing) = existing {
        if entry.section.keep_unknown_lv || vg.lvs.iter().any(PlannedLv::is_reused) {
            vg.reuse = Some(ReuseTarget::Name(existing.name.clone()));
        }
    }
    vg.size_strategy = if vg.lvs_max_size().is_unlimited() {
        SizeStrategy::UseAvailable
    } else {
        SizeStrategy::UseNeeded
    };

    debug!(
        "Planned volume group '{}' with {} logical volume(s), {}",
        vg.volume_group_name,
        vg.lvs.len(),
        vg.size_strategy
    );
    vec![PlannedDevice::LvmVg(vg)]
}

fn extent_size(entry: &DriveEntry, issues: &mut IssuesList) -> DiskSize {
    let Some(pesize) = entry.section.pesize.as_deref() else {
        return DEFAULT_EXTENT_SIZE;
    };
    match DiskSize::parse(pesize) {
        Ok(size) if !size.is_zero() && !size.is_unlimited() => size,
        _ => {
            issues.push(Issue::InvalidValue {
                section: entry.name(),
                attr: "pesize".into(),
                value: pesize.to_owned(),
                new_value: NewValue::Replaced(DEFAULT_EXTENT_SIZE.to_string()),
            });
            DEFAULT_EXTENT_SIZE
        }
    }
}

fn plan_lv(
    planner: &mut DevicesPlanner,
    vg_name: &str,
    section: &PartitionSection,
    section_name: &str,
    issues: &mut IssuesList,
) -> Option<PlannedLv> {
    let Some(lv_name) = section.lv_name.clone().filter(|n| !n.is_empty()) else {
        issues.push(Issue::MissingValue {
            section: section_name.to_owned(),
            attr: "lv_name".into(),
        });
        return None;
    };

    let mut lv = PlannedLv::new(planner.ids.next_id(), lv_name.clone());
    lv.lv_type = match (&section.used_pool, section.pool) {
        (Some(pool), _) => LvType::Thin { pool: pool.clone() },
        (None, true) => LvType::ThinPool,
        (None, false) => LvType::Normal,
    };
    lv.stripes = section.stripes.filter(|s| *s > 1);
    lv.stripe_size = section.stripesize.as_deref().and_then(|value| {
        DiskSize::parse(value)
            .map_err(|_| {
                issues.push(Issue::InvalidValue {
                    section: section_name.to_owned(),
                    attr: "stripesize".into(),
                    value: value.to_owned(),
                    new_value: NewValue::Skip,
                })
            })
            .ok()
    });
    lv.encryption = common::encryption(section);

    if section.creates() {
        lv.format = common::formatting(section, section_name, None, issues);
        lv.size = common::size(&planner.sizes, section, section_name, issues)?;
        return Some(lv);
    }

    let graph = planner.graph;
    let candidates = graph
        .find_vg(vg_name)
        .map(|vg| graph.vg_lvs(vg.sid))
        .unwrap_or_default();
    let by_name = |d: &devicegraph::Device| d.as_lv().is_some_and(|l| l.lv_name == lv_name);
    let reused = common::find_reusable(
        graph,
        &candidates,
        section,
        section_name,
        Some(&by_name as &dyn Fn(&devicegraph::Device) -> bool),
        issues,
    )?;

    let filesystem = common::existing_filesystem(graph, reused);
    lv.format = common::formatting(section, section_name, filesystem, issues);
    lv.reuse = Some(ReuseTarget::Name(reused.name.clone()));
    lv.resize = section.resize;
    lv.size = if section.resize {
        common::size(&planner.sizes, section, section_name, issues)?
    } else {
        PlannedSize::fixed(graph.size(reused.sid)?)
    };
    Some(lv)
}

/// Thin volumes must be allocated from a pool planned in the same drive.
fn drop_thins_without_pool(entry: &DriveEntry, vg: &mut PlannedVg, issues: &mut IssuesList) {
    let pools: Vec<String> = vg
        .lvs
        .iter()
        .filter(|lv| lv.is_thin_pool())
        .map(|lv| lv.logical_volume_name.clone())
        .collect();

    vg.lvs.retain(|lv| match &lv.lv_type {
        LvType::Thin { pool } if !pools.contains(pool) => {
            let position = entry
                .section
                .partitions
                .iter()
                .position(|s| s.lv_name.as_deref() == Some(lv.logical_volume_name.as_str()))
                .unwrap_or_default();
            issues.push(Issue::ThinPoolNotFound {
                section: partition_section_name(entry.index, position),
                pool: pool.clone(),
            });
            false
        }
        _ => true,
    });
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use devicegraph::{fixtures, DeviceGraph};
    use sysdefs::filesystems::FilesystemType;

    use super::super::tests::{kinds, plan_profile};
    use super::*;

    fn graph() -> DeviceGraph {
        fixtures::from_yaml(indoc! {r#"
            disks:
              - name: /dev/sda
                size: 100 GiB
                partition_table: gpt
                partitions:
                  - { size: 60 GiB, id: lvm }
            volume_groups:
              - name: system
                pvs: [/dev/sda1]
                lvs:
                  - { name: root, size: 20 GiB, filesystem: btrfs }
                  - { name: home, size: 30 GiB, filesystem: xfs, label: home }
        "#})
        .unwrap()
    }

    #[test]
    fn test_plan_new_vg() {
        let graph = graph();
        let (plan, issues) = plan_profile(
            &graph,
            indoc! {r#"
                partitioning:
                  - device: /dev/vg0
                    type: CT_LVM
                    pesize: 8M
                    partitions:
                      - { lv_name: root, mount: /, size: 20G }
                      - { lv_name: pool, pool: true, size: 10G }
                      - { lv_name: thin1, used_pool: pool, size: 50G, mount: /srv }
                      - { lv_name: thin2, used_pool: missing, size: 1G }
                      - { mount: /nowhere }
                      - { lv_name: data, size: max, stripes: 2, stripesize: 64K }
            "#},
        );
        assert_eq!(kinds(&issues), vec!["missing-value", "thin-pool-not-found"]);

        let vg = plan.find_vg("vg0").unwrap();
        assert!(!vg.is_reused());
        assert_eq!(vg.extent_size, DiskSize::mib(8));
        assert_eq!(vg.make_space_policy, MakeSpacePolicy::Remove);
        assert_eq!(vg.size_strategy, SizeStrategy::UseAvailable);
        let names: Vec<_> = vg.lvs.iter().map(|lv| lv.logical_volume_name.as_str()).collect();
        assert_eq!(names, vec!["root", "pool", "thin1", "data"]);
        assert!(vg.find_lv("pool").unwrap().is_thin_pool());
        assert_eq!(
            vg.find_lv("thin1").unwrap().lv_type,
            LvType::Thin { pool: "pool".into() }
        );
        let data = vg.find_lv("data").unwrap();
        assert_eq!(data.stripes, Some(2));
        assert_eq!(data.stripe_size, Some(DiskSize::kib(64)));
    }

    #[test]
    fn test_plan_reused_vg() {
        let graph = graph();
        let (plan, issues) = plan_profile(
            &graph,
            indoc! {r#"
                partitioning:
                  - device: /dev/system
                    type: CT_LVM
                    keep_unknown_lv: false
                    partitions:
                      - { lv_name: root, create: false, format: true, mount: / }
                      - { lv_name: swap, mount: swap, size: 2G }
                      - { lv_name: gone, create: false, mount: /gone }
            "#},
        );
        assert_eq!(kinds(&issues), vec!["missing-reusable-device"]);

        let vg = plan.find_vg("system").unwrap();
        assert_eq!(vg.reuse, Some(ReuseTarget::Name("/dev/system".into())));
        assert_eq!(vg.size_strategy, SizeStrategy::UseNeeded);
        let root = vg.find_lv("root").unwrap();
        assert_eq!(root.reuse, Some(ReuseTarget::Name("/dev/system/root".into())));
        assert!(root.format.reformat);
        assert_eq!(root.format.filesystem_type, Some(FilesystemType::Btrfs));
        assert_eq!(plan.all_reuse_names(), vec!["/dev/system", "/dev/system/root"]);
    }

    #[test]
    fn test_missing_vg_name() {
        let (plan, issues) = plan_profile(
            &graph(),
            "partitioning: [{ type: CT_LVM, partitions: [{ lv_name: root }] }]",
        );
        assert!(plan.is_empty());
        assert_eq!(kinds(&issues), vec!["missing-value"]);
    }
}
