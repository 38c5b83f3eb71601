//! Block and character devices. The only block device is the ATA PIO disk the filesystem mounts;
//! the only character device is the VGA/serial console ([`crate::print`]).

pub mod ata;
