use crate::primitives::disk_size::DiskSize;

/// Mount point used by swap devices in profiles.
pub const SWAP_MOUNT_POINT: &str = "swap";

/// Mount point of the EFI system partition.
pub const ESP_MOUNT_POINT: &str = "/boot/efi";

/// Lower bound for swap sized with "auto" when no volume specification exists.
pub const SWAP_AUTO_MIN_SIZE: DiskSize = DiskSize::mib(512);

/// Upper bound for swap sized with "auto" when no volume specification exists.
pub const SWAP_AUTO_MAX_SIZE: DiskSize = DiskSize::gib(2);

/// Default LVM physical extent size.
pub const DEFAULT_EXTENT_SIZE: DiskSize = DiskSize::mib(4);

/// Space taken by LVM metadata at the start of every physical volume.
pub const PV_METADATA_SIZE: DiskSize = DiskSize::mib(1);

/// Space taken by the LUKS header of an encrypted device.
pub const ENCRYPTION_OVERHEAD: DiskSize = DiskSize::mib(16);

/// No device is ever created smaller than this.
pub const MIN_DEVICE_SIZE: DiskSize = DiskSize::mib(1);

/// Partition table created when the profile does not request one.
pub const PREFERRED_PTABLE_TYPE: sysdefs::partition_tables::PartitionTableType =
    sysdefs::partition_tables::PartitionTableType::Gpt;
