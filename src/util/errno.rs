//! Kernel-internal error codes.
//!
//! Every fallible kernel operation returns [`EResult`]. At the syscall boundary the error is
//! normalized to a negative `isize` (see [`crate::syscall::to_raw_result`]); nothing below that
//! boundary ever sees an `errno` global or out-of-band error channel.

use core::fmt;

/// A kernel error code, one per POSIX `errno` this kernel is able to produce.
#[derive(Clone, Copy, Eq, PartialEq)]
#[repr(i32)]
pub enum Errno {
	/// Operation not permitted.
	EPERM = 1,
	/// No such file or directory.
	ENOENT = 2,
	/// No such process.
	ESRCH = 3,
	/// I/O error.
	EIO = 5,
	/// Bad file descriptor.
	EBADF = 9,
	/// No child processes.
	ECHILD = 10,
	/// Try again.
	EAGAIN = 11,
	/// Out of memory.
	ENOMEM = 12,
	/// Permission denied.
	EACCES = 13,
	/// File exists.
	EEXIST = 17,
	/// Not a directory.
	ENOTDIR = 20,
	/// Is a directory.
	EISDIR = 21,
	/// Invalid argument.
	EINVAL = 22,
	/// Too many open files in system.
	ENFILE = 23,
	/// Too many open files.
	EMFILE = 24,
	/// Invalid seek.
	ESPIPE = 29,
	/// No space left on device.
	ENOSPC = 28,
	/// Directory not empty.
	ENOTEMPTY = 39,
	/// File name too long.
	ENAMETOOLONG = 36,
	/// Value too large.
	EOVERFLOW = 75,
	/// Structure needs cleaning (filesystem integrity violation).
	EUCLEAN = 117,
	/// Function not implemented.
	ENOSYS = 38,
	/// No such device.
	ENODEV = 19,
	/// Exec format error.
	ENOEXEC = 8,
	/// Bad address.
	EFAULT = 14,
	/// Result too large for the supplied buffer.
	ERANGE = 34,
}

impl Errno {
	/// Returns the raw numeric value, as exposed to userspace.
	pub const fn get(self) -> i32 {
		self as i32
	}
}

impl fmt::Debug for Errno {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.name(), self.get())
	}
}

impl Errno {
	/// Returns the symbolic name, for logging.
	pub const fn name(self) -> &'static str {
		match self {
			Self::EPERM => "EPERM",
			Self::ENOENT => "ENOENT",
			Self::ESRCH => "ESRCH",
			Self::EIO => "EIO",
			Self::EBADF => "EBADF",
			Self::ECHILD => "ECHILD",
			Self::EAGAIN => "EAGAIN",
			Self::ENOMEM => "ENOMEM",
			Self::EACCES => "EACCES",
			Self::EEXIST => "EEXIST",
			Self::ENOTDIR => "ENOTDIR",
			Self::EISDIR => "EISDIR",
			Self::EINVAL => "EINVAL",
			Self::ENFILE => "ENFILE",
			Self::EMFILE => "EMFILE",
			Self::ESPIPE => "ESPIPE",
			Self::ENOSPC => "ENOSPC",
			Self::ENOTEMPTY => "ENOTEMPTY",
			Self::ENAMETOOLONG => "ENAMETOOLONG",
			Self::EOVERFLOW => "EOVERFLOW",
			Self::EUCLEAN => "EUCLEAN",
			Self::ENOSYS => "ENOSYS",
			Self::ENODEV => "ENODEV",
			Self::ENOEXEC => "ENOEXEC",
			Self::EFAULT => "EFAULT",
			Self::ERANGE => "ERANGE",
		}
	}
}

/// The result type returned by every fallible kernel operation.
pub type EResult<T> = Result<T, Errno>;

/// Builds an `Err(Errno::X)`, mirroring the teacher's `errno!` macro.
macro_rules! errno {
	($variant:ident) => {
		$crate::util::errno::Errno::$variant
	};
}
pub(crate) use errno;
