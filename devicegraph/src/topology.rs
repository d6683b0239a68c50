//! Devices built on top of block devices: filesystems, encryption, LVM,
//! software RAID, bcache, and the block-less NFS and tmpfs mounts.

use log::debug;
use sysdefs::{
    filesystems::FilesystemType,
    levels::{CacheMode, MdLevel, MdParity},
};

use layoutplan_api::{constants::PV_METADATA_SIZE, DiskSize, Sid};

use crate::{
    device::{
        Bcache, Device, DeviceKind, Encryption, Filesystem, Holder, LvKind, LvmLv, LvmVg, Md,
        MountPoint, Nfs, ResizeInfo, Tmpfs,
    },
    error::DeviceGraphError,
    graph::DeviceGraph,
};

impl DeviceGraph {
    fn blk_name(&self, blk: Sid) -> Result<String, DeviceGraphError> {
        let device = self.try_device(blk)?;
        if !device.is_blk() {
            return Err(DeviceGraphError::WrongKind {
                sid: blk,
                expected: "block device",
            });
        }
        Ok(device.name.clone())
    }

    /// Creates a filesystem directly on `blk`, which must be unused.
    pub fn create_filesystem(
        &mut self,
        blk: Sid,
        fs_type: FilesystemType,
    ) -> Result<Sid, DeviceGraphError> {
        let name = self.blk_name(blk)?;
        if self.is_used(blk) {
            return Err(DeviceGraphError::InUse(name));
        }
        debug!("Creating {fs_type} filesystem on '{name}'");
        let fs = self.add_device(
            format!("{fs_type} on {name}"),
            DeviceKind::Filesystem(Filesystem::new(fs_type)),
        );
        self.add_holder(fs, blk, Holder::User)?;
        Ok(fs)
    }

    /// Creates a single filesystem spanning several block devices.
    pub fn create_multidevice_filesystem(
        &mut self,
        members: &[Sid],
        filesystem: Filesystem,
    ) -> Result<Sid, DeviceGraphError> {
        let mut names = Vec::new();
        for member in members {
            let name = self.blk_name(*member)?;
            if self.is_used(*member) {
                return Err(DeviceGraphError::InUse(name));
            }
            names.push(name);
        }
        debug!("Creating {} filesystem on {}", filesystem.fs_type, names.join(", "));
        let fs = self.add_device(
            format!("{} on {}", filesystem.fs_type, names.join(",")),
            DeviceKind::Filesystem(filesystem),
        );
        for member in members {
            self.add_holder(fs, *member, Holder::User)?;
        }
        Ok(fs)
    }

    pub fn filesystem_mut(&mut self, fs: Sid) -> Result<&mut Filesystem, DeviceGraphError> {
        self.device_mut(fs)
            .ok_or(DeviceGraphError::NotFound(fs))?
            .as_filesystem_mut()
            .ok_or(DeviceGraphError::WrongKind {
                sid: fs,
                expected: "filesystem",
            })
    }

    /// Block devices a filesystem lives on.
    pub fn filesystem_devices(&self, fs: Sid) -> Vec<Sid> {
        self.used_devices(fs).into_iter().map(|(d, _)| d.sid).collect()
    }

    pub fn create_encryption(
        &mut self,
        blk: Sid,
        password: Option<String>,
    ) -> Result<Sid, DeviceGraphError> {
        let name = self.blk_name(blk)?;
        if self.is_used(blk) {
            return Err(DeviceGraphError::InUse(name));
        }
        let short = name.rsplit('/').next().unwrap_or(&name).to_owned();
        let enc = self.add_device(
            format!("/dev/mapper/cr_{short}"),
            DeviceKind::Encryption(Encryption { password }),
        );
        self.add_holder(enc, blk, Holder::User)?;
        Ok(enc)
    }

    pub fn create_vg(&mut self, vg_name: &str, extent_size: DiskSize) -> Sid {
        debug!("Creating volume group '{vg_name}'");
        self.add_device(
            format!("/dev/{vg_name}"),
            DeviceKind::LvmVg(LvmVg {
                vg_name: vg_name.to_owned(),
                extent_size,
            }),
        )
    }

    /// Turns `blk` into a physical volume of `vg`.
    pub fn add_pv(&mut self, vg: Sid, blk: Sid) -> Result<Sid, DeviceGraphError> {
        let name = self.blk_name(blk)?;
        if self.is_used(blk) {
            return Err(DeviceGraphError::InUse(name));
        }
        self.vg(vg)?;
        let pv = self.add_device(format!("pv {name}"), DeviceKind::LvmPv);
        self.add_holder(pv, blk, Holder::User)?;
        self.add_holder(vg, pv, Holder::Subdevice)?;
        Ok(pv)
    }

    fn vg(&self, vg: Sid) -> Result<&LvmVg, DeviceGraphError> {
        self.try_device(vg)?.as_vg().ok_or(DeviceGraphError::WrongKind {
            sid: vg,
            expected: "volume group",
        })
    }

    pub fn find_vg(&self, vg_name: &str) -> Option<&Device> {
        self.devices()
            .find(|d| d.as_vg().is_some_and(|vg| vg.vg_name == vg_name))
    }

    pub fn vgs(&self) -> Vec<&Device> {
        self.devices().filter(|d| d.as_vg().is_some()).collect()
    }

    /// Block devices used as physical volumes of `vg`.
    pub fn vg_pv_devices(&self, vg: Sid) -> Vec<Sid> {
        self.used_devices(vg)
            .into_iter()
            .filter(|(d, _)| matches!(d.kind, DeviceKind::LvmPv))
            .flat_map(|(pv, _)| self.used_devices(pv.sid).into_iter().map(|(d, _)| d.sid))
            .collect()
    }

    /// Usable size of a volume group: every physical volume minus its
    /// metadata, rounded down to extents.
    pub fn vg_size(&self, vg: Sid) -> DiskSize {
        let Ok(extent) = self.vg(vg).map(|v| v.extent_size) else {
            return DiskSize::ZERO;
        };
        self.vg_pv_devices(vg)
            .into_iter()
            .filter_map(|blk| self.size(blk))
            .map(|size| (size - PV_METADATA_SIZE).floor(extent))
            .sum()
    }

    /// Logical volumes of a volume group, thin volumes included.
    pub fn vg_lvs(&self, vg: Sid) -> Vec<&Device> {
        let mut result = Vec::new();
        for (lv, _) in self.users(vg) {
            if lv.as_lv().is_none() {
                continue;
            }
            result.push(lv);
            for (thin, holder) in self.users(lv.sid) {
                if holder == Holder::Subdevice && thin.as_lv().is_some() {
                    result.push(thin);
                }
            }
        }
        result
    }

    /// Unallocated size of a volume group. Thin volumes take space from
    /// their pool, not from the volume group.
    pub fn vg_free(&self, vg: Sid) -> DiskSize {
        let used: DiskSize = self
            .vg_lvs(vg)
            .iter()
            .filter_map(|d| d.as_lv())
            .filter(|lv| lv.lv_kind != LvKind::Thin)
            .map(|lv| lv.size)
            .sum();
        self.vg_size(vg) - used
    }

    /// Creates a normal logical volume or a thin pool. The size is rounded
    /// down to extents.
    pub fn create_lv(
        &mut self,
        vg: Sid,
        lv_name: &str,
        size: DiskSize,
        lv_kind: LvKind,
    ) -> Result<Sid, DeviceGraphError> {
        let (vg_name, extent) = {
            let v = self.vg(vg)?;
            (v.vg_name.clone(), v.extent_size)
        };
        let size = size.floor(extent);
        if size.is_zero() || size > self.vg_free(vg) {
            return Err(DeviceGraphError::VgFull { vg: vg_name, size });
        }
        debug!("Creating logical volume '{lv_name}' of {size} in '{vg_name}'");
        let lv = self.add_device(
            format!("/dev/{vg_name}/{lv_name}"),
            DeviceKind::LvmLv(LvmLv {
                lv_name: lv_name.to_owned(),
                size,
                lv_kind,
                stripes: 1,
                stripe_size: None,
                resize_info: ResizeInfo::not_resizable(),
            }),
        );
        self.add_holder(lv, vg, Holder::Subdevice)?;
        Ok(lv)
    }

    /// Creates a thin volume inside a thin pool. Thin volumes may be bigger
    /// than their pool.
    pub fn create_thin_lv(
        &mut self,
        pool: Sid,
        lv_name: &str,
        size: DiskSize,
    ) -> Result<Sid, DeviceGraphError> {
        let pool_device = self.try_device(pool)?;
        if pool_device.as_lv().map(|lv| lv.lv_kind) != Some(LvKind::ThinPool) {
            return Err(DeviceGraphError::WrongKind {
                sid: pool,
                expected: "thin pool",
            });
        }
        let vg = self
            .used_devices(pool)
            .into_iter()
            .find_map(|(d, _)| d.as_vg().map(|vg| (vg.vg_name.clone(), vg.extent_size)));
        let (vg_name, extent) = vg.ok_or(DeviceGraphError::NotFound(pool))?;
        let lv = self.add_device(
            format!("/dev/{vg_name}/{lv_name}"),
            DeviceKind::LvmLv(LvmLv {
                lv_name: lv_name.to_owned(),
                size: size.floor(extent),
                lv_kind: LvKind::Thin,
                stripes: 1,
                stripe_size: None,
                resize_info: ResizeInfo::not_resizable(),
            }),
        );
        self.add_holder(lv, pool, Holder::Subdevice)?;
        Ok(lv)
    }

    pub fn set_lv_stripes(
        &mut self,
        lv: Sid,
        stripes: u32,
        stripe_size: Option<DiskSize>,
    ) -> Result<(), DeviceGraphError> {
        match self.device_mut(lv).map(|d| &mut d.kind) {
            Some(DeviceKind::LvmLv(lv)) => {
                lv.stripes = stripes;
                lv.stripe_size = stripe_size;
                Ok(())
            }
            _ => Err(DeviceGraphError::WrongKind {
                sid: lv,
                expected: "logical volume",
            }),
        }
    }

    pub fn resize_lv(&mut self, lv: Sid, size: DiskSize) -> Result<(), DeviceGraphError> {
        let vg = self
            .used_devices(lv)
            .into_iter()
            .find(|(d, _)| d.as_vg().is_some())
            .map(|(d, _)| d.sid);
        let current = self.size(lv).ok_or(DeviceGraphError::NotFound(lv))?;
        let name = self.try_device(lv)?.name.clone();
        if let Some(vg) = vg {
            if size > current && size - current > self.vg_free(vg) {
                return Err(DeviceGraphError::InvalidResize { name, size });
            }
        }
        match self.device_mut(lv).map(|d| &mut d.kind) {
            Some(DeviceKind::LvmLv(lv)) => {
                lv.size = size;
                Ok(())
            }
            _ => Err(DeviceGraphError::WrongKind {
                sid: lv,
                expected: "logical volume",
            }),
        }
    }

    /// Creates a software RAID over `members`, in order. The size depends on
    /// the level and the smallest member.
    pub fn create_md(
        &mut self,
        name: &str,
        level: MdLevel,
        members: &[Sid],
        chunk_size: Option<DiskSize>,
        parity: Option<MdParity>,
    ) -> Result<Sid, DeviceGraphError> {
        let mut smallest = DiskSize::UNLIMITED;
        for member in members {
            let member_name = self.blk_name(*member)?;
            if self.is_used(*member) {
                return Err(DeviceGraphError::InUse(member_name));
            }
            smallest = smallest.min(self.size(*member).unwrap_or(DiskSize::ZERO));
        }
        if members.is_empty() {
            smallest = DiskSize::ZERO;
        }
        let size = DiskSize::b(level.array_size(smallest.bytes(), members.len()));
        debug!("Creating {level} '{name}' of {size} over {} devices", members.len());
        let md = self.add_device(
            name,
            DeviceKind::Md(Md {
                level,
                chunk_size,
                parity,
                size,
            }),
        );
        for member in members {
            self.add_holder(md, *member, Holder::User)?;
        }
        Ok(md)
    }

    pub fn find_md(&self, name: &str) -> Option<&Device> {
        self.devices()
            .find(|d| d.as_md().is_some() && md_name_matches(&d.name, name))
    }

    pub fn md_members(&self, md: Sid) -> Vec<Sid> {
        self.used_devices(md).into_iter().map(|(d, _)| d.sid).collect()
    }

    pub fn create_bcache(
        &mut self,
        name: &str,
        backing: Sid,
        caching: Option<Sid>,
        cache_mode: CacheMode,
    ) -> Result<Sid, DeviceGraphError> {
        let backing_name = self.blk_name(backing)?;
        if self.is_used(backing) {
            return Err(DeviceGraphError::InUse(backing_name));
        }
        let size = self.size(backing).unwrap_or(DiskSize::ZERO);
        debug!("Creating bcache '{name}' backed by '{backing_name}'");
        let bcache = self.add_device(name, DeviceKind::Bcache(Bcache { cache_mode, size }));
        self.add_holder(bcache, backing, Holder::BcacheBacking)?;
        if let Some(caching) = caching {
            self.blk_name(caching)?;
            self.add_holder(bcache, caching, Holder::BcacheCaching)?;
        }
        Ok(bcache)
    }

    pub fn find_bcache(&self, name: &str) -> Option<&Device> {
        self.devices()
            .find(|d| d.as_bcache().is_some() && d.name == name)
    }

    pub fn create_nfs(&mut self, server: &str, path: &str) -> Sid {
        self.add_device(
            format!("{server}:{path}"),
            DeviceKind::Nfs(Nfs {
                server: server.to_owned(),
                path: path.to_owned(),
                mount_point: None,
            }),
        )
    }

    pub fn find_nfs(&self, server: &str, path: &str) -> Option<&Device> {
        self.devices().find(|d| match &d.kind {
            DeviceKind::Nfs(nfs) => nfs.server == server && nfs.path == path,
            _ => false,
        })
    }

    pub fn create_tmpfs(&mut self, mount_point: MountPoint) -> Sid {
        self.add_device(
            format!("tmpfs on {}", mount_point.path),
            DeviceKind::Tmpfs(Tmpfs { mount_point }),
        )
    }

    /// Sets or replaces the mount point of a filesystem or NFS device.
    pub fn set_mount_point(&mut self, sid: Sid, mount_point: MountPoint) -> Result<(), DeviceGraphError> {
        match self.device_mut(sid).map(|d| &mut d.kind) {
            Some(DeviceKind::Filesystem(fs)) => fs.mount_point = Some(mount_point),
            Some(DeviceKind::Nfs(nfs)) => nfs.mount_point = Some(mount_point),
            Some(DeviceKind::Tmpfs(tmpfs)) => tmpfs.mount_point = mount_point,
            Some(_) => {
                return Err(DeviceGraphError::WrongKind {
                    sid,
                    expected: "mountable device",
                })
            }
            None => return Err(DeviceGraphError::NotFound(sid)),
        }
        Ok(())
    }

    /// Devices with a mount point, ordered by sid.
    pub fn mounted_devices(&self) -> Vec<&Device> {
        self.devices().filter(|d| d.mount_point().is_some()).collect()
    }

    /// Volume group, RAID, bcache or multi-device filesystem that uses the
    /// block device as one of its members.
    pub fn using_structure(&self, blk: Sid) -> Option<&Device> {
        let content = self.plain_device(blk);
        for (user, holder) in self.users(content) {
            match &user.kind {
                DeviceKind::LvmPv => {
                    return self
                        .users(user.sid)
                        .into_iter()
                        .map(|(d, _)| d)
                        .find(|d| d.as_vg().is_some())
                }
                DeviceKind::Md(_) => return Some(user),
                DeviceKind::Bcache(_)
                    if matches!(holder, Holder::BcacheBacking | Holder::BcacheCaching) =>
                {
                    return Some(user)
                }
                DeviceKind::Filesystem(_) if self.filesystem_devices(user.sid).len() > 1 => {
                    return Some(user)
                }
                _ => {}
            }
        }
        None
    }

    /// Block devices a structure returned by
    /// [`DeviceGraph::using_structure`] is built upon.
    pub fn structure_members(&self, structure: Sid) -> Vec<Sid> {
        let Some(device) = self.device(structure) else {
            return Vec::new();
        };
        let members = match &device.kind {
            DeviceKind::LvmVg(_) => self.vg_pv_devices(structure),
            _ => self.used_devices(structure).into_iter().map(|(d, _)| d.sid).collect(),
        };
        // Look through encryption layers.
        members
            .into_iter()
            .map(|sid| match self.device(sid).map(|d| &d.kind) {
                Some(DeviceKind::Encryption(_)) => self
                    .used_devices(sid)
                    .into_iter()
                    .next()
                    .map(|(d, _)| d.sid)
                    .unwrap_or(sid),
                _ => sid,
            })
            .collect()
    }
}

/// RAID names are accepted with or without the `/dev/` or `/dev/md/`
/// prefixes.
fn md_name_matches(device_name: &str, wanted: &str) -> bool {
    let short = |n: &str| {
        n.trim_start_matches("/dev/md/")
            .trim_start_matches("/dev/")
            .to_owned()
    };
    device_name == wanted || short(device_name) == short(wanted)
}
