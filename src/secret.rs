use parking_lot::Mutex;
use secrecy::{ExposeSecret as _, ExposeSecretMut as _, SecretBox, zeroize::Zeroize as _};

use super::{Error, memory_protection};

/// Length of a [`Secret`], in bytes.  Always a multiple of
/// [`memory_protection::BLOCK_SIZE`].
pub const SECRET_LEN: usize = 512 / 8;

/// Root key-derivation material for an
/// [`AuthenticatedEncryptor`](super::AuthenticatedEncryptor).
///
/// The bytes are kept protected (see [`memory_protection`]) whenever nobody is using them, and
/// are zeroed when the [`Secret`] is dropped.  The only way to get at them is
/// [`Secret::with_exposed`], which unprotects them for the duration of a closure and protects
/// them again afterwards, no matter how the closure exits.
pub struct Secret {
	// The lock serializes unprotect / protect pairs; the buffer must never be
	// worked on by two threads at once.
	bytes: Mutex<SecretBox<[u8; SECRET_LEN]>>,
}

impl std::fmt::Debug for Secret {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Secret")
			.field("len", &SECRET_LEN)
			.finish_non_exhaustive()
	}
}

impl Secret {
	/// Generate a new [`Secret`] from the thread-local CSPRNG.
	///
	/// # Errors
	///
	/// Returns [`Error::Platform`] if the new secret cannot be protected.
	#[tracing::instrument(level = "debug")]
	pub fn random() -> Result<Self, Error> {
		use rand::{RngCore as _, rng};

		let mut bytes = SecretBox::new(Box::new([0u8; SECRET_LEN]));
		rng().fill_bytes(bytes.expose_secret_mut());

		Self::protected(bytes)
	}

	/// Build a [`Secret`] from existing key material.  The caller's copy is zeroed.
	///
	/// # Errors
	///
	/// Returns [`Error::Platform`] if the secret cannot be protected.
	#[tracing::instrument(level = "debug", skip(material))]
	pub fn from_bytes(material: &mut [u8; SECRET_LEN]) -> Result<Self, Error> {
		let bytes = SecretBox::new(Box::new(*material));
		material.zeroize();

		Self::protected(bytes)
	}

	fn protected(mut bytes: SecretBox<[u8; SECRET_LEN]>) -> Result<Self, Error> {
		memory_protection::protect_in_place(&mut bytes.expose_secret_mut()[..])?;

		Ok(Self {
			bytes: Mutex::new(bytes),
		})
	}

	/// Length of the secret in bytes; always [`SECRET_LEN`].
	#[allow(clippy::len_without_is_empty)] // a secret is never empty
	pub fn len(&self) -> usize {
		SECRET_LEN
	}

	/// Run `f` with the plaintext secret bytes.
	///
	/// Concurrent callers are serialized.  Don't hang on to anything derived from the bytes for
	/// longer than you need to.
	///
	/// # Errors
	///
	/// Returns [`Error::Platform`] if the bytes could not be unprotected beforehand, or
	/// re-protected afterwards.
	#[tracing::instrument(level = "trace", skip(self, f))]
	pub fn with_exposed<R>(&self, f: impl FnOnce(&[u8; SECRET_LEN]) -> R) -> Result<R, Error> {
		let mut guard = self.bytes.lock();

		memory_protection::unprotect_in_place(&mut guard.expose_secret_mut()[..])?;

		let exposed = Exposed {
			bytes: &mut *guard,
			armed: true,
		};

		let result = f(exposed.bytes.expose_secret());

		exposed.reprotect()?;

		Ok(result)
	}
}

// Puts the protection back when dropped, so a panicking closure doesn't leave
// the secret lying around in the clear.
struct Exposed<'a> {
	bytes: &'a mut SecretBox<[u8; SECRET_LEN]>,
	armed: bool,
}

impl Exposed<'_> {
	fn reprotect(mut self) -> Result<(), Error> {
		self.armed = false;
		memory_protection::protect_in_place(&mut self.bytes.expose_secret_mut()[..])
	}
}

impl Drop for Exposed<'_> {
	fn drop(&mut self) {
		if self.armed {
			if let Err(e) =
				memory_protection::protect_in_place(&mut self.bytes.expose_secret_mut()[..])
			{
				tracing::error!(error = %e, "Failed to re-protect secret");
			}
		}
	}
}
