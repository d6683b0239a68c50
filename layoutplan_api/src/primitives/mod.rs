pub mod disk_size;
pub mod ids;
