//! Userspace-facing file plumbing: the per-task descriptor table and ASCII path resolution.
//! The filesystem itself ([`crate::fs`]) knows nothing of tasks or descriptors.

pub mod fd;
pub mod path;
