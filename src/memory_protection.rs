//! In-place protection of secret bytes while they sit idle in memory.
//!
//! On Windows, buffers are encrypted with `CryptProtectMemory` using the "same process" scope,
//! so the bytes are unreadable to other processes (and to anything scraping a memory dump) until
//! they are unprotected again by this process.
//!
//! Other platforms have no equivalent facility.  There, [`IS_SUPPORTED`] is `false` and both
//! operations validate their argument and then leave the buffer untouched.  Callers that need
//! to know whether idle secrets are actually shielded should check [`IS_SUPPORTED`], rather
//! than assuming.
//!
//! A buffer must never be protected or unprotected from two places at once; callers are
//! expected to serialize each protect / unprotect pair per buffer (as
//! [`Secret`](super::Secret) does).

use super::Error;

/// The buffer length granularity required by the platform facility, in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Whether this platform actually encrypts protected buffers.
pub const IS_SUPPORTED: bool = platform::IS_SUPPORTED;

/// Encrypt `buffer` in place, so its contents are unreadable until [`unprotect_in_place`] is
/// called on it.
///
/// # Errors
///
/// * [`Error::InvalidArgument`] if the buffer length is not a multiple of [`BLOCK_SIZE`].
/// * [`Error::Platform`] if the operating system refuses, carrying its error code.
#[tracing::instrument(level = "trace", skip(buffer), fields(len = buffer.len()))]
pub fn protect_in_place(buffer: &mut [u8]) -> Result<(), Error> {
	let len = checked_len(buffer)?;

	if len == 0 {
		return Ok(());
	}

	platform::protect(buffer, len)
}

/// Reverse a previous [`protect_in_place`], restoring the buffer's original contents.
///
/// # Errors
///
/// As for [`protect_in_place`].
#[tracing::instrument(level = "trace", skip(buffer), fields(len = buffer.len()))]
pub fn unprotect_in_place(buffer: &mut [u8]) -> Result<(), Error> {
	let len = checked_len(buffer)?;

	if len == 0 {
		return Ok(());
	}

	platform::unprotect(buffer, len)
}

fn checked_len(buffer: &[u8]) -> Result<u32, Error> {
	if buffer.len() % BLOCK_SIZE != 0 {
		return Err(Error::invalid_argument(format!(
			"buffer length {} is not a multiple of {BLOCK_SIZE}",
			buffer.len()
		)));
	}

	u32::try_from(buffer.len()).map_err(|_| {
		Error::invalid_argument(format!("buffer length {} is too large", buffer.len()))
	})
}

#[cfg(windows)]
mod platform {
	use std::ffi::c_void;
	use windows_sys::Win32::Security::Cryptography::{CryptProtectMemory, CryptUnprotectMemory};

	use super::Error;

	// from dpapi.h
	const CRYPTPROTECTMEMORY_SAME_PROCESS: u32 = 0x00;

	pub(super) const IS_SUPPORTED: bool = true;

	pub(super) fn protect(buffer: &mut [u8], len: u32) -> Result<(), Error> {
		// SAFETY: the pointer and length describe exactly the memory of a live, exclusively
		// borrowed slice, and the call only rewrites bytes within that range.
		let ok = unsafe {
			CryptProtectMemory(
				buffer.as_mut_ptr().cast::<c_void>(),
				len,
				CRYPTPROTECTMEMORY_SAME_PROCESS,
			)
		};

		check(ok, "CryptProtectMemory")
	}

	pub(super) fn unprotect(buffer: &mut [u8], len: u32) -> Result<(), Error> {
		// SAFETY: as for protect().
		let ok = unsafe {
			CryptUnprotectMemory(
				buffer.as_mut_ptr().cast::<c_void>(),
				len,
				CRYPTPROTECTMEMORY_SAME_PROCESS,
			)
		};

		check(ok, "CryptUnprotectMemory")
	}

	fn check(ok: i32, operation: &str) -> Result<(), Error> {
		if ok == 0 {
			let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(-1);
			tracing::debug!(operation, code, "Memory protection call failed");
			Err(Error::platform(operation, code))
		} else {
			Ok(())
		}
	}
}

// No same-process memory encryption exists here, so buffers stay as they are.
#[cfg(not(windows))]
mod platform {
	use super::Error;

	pub(super) const IS_SUPPORTED: bool = false;

	pub(super) fn protect(_buffer: &mut [u8], _len: u32) -> Result<(), Error> {
		Ok(())
	}

	pub(super) fn unprotect(_buffer: &mut [u8], _len: u32) -> Result<(), Error> {
		Ok(())
	}
}
