//! Authenticated encryption of opaque payloads, with a key that exists only for the lifetime of
//! the process.
//!
//! If you need to hand data to someone else (a browser, a queue, a temp file) and get it back
//! later *from the same process*, confident that it hasn't been read or fiddled with in the
//! meantime, an [`EphemeralDataProtectionProvider`] is the tool for the job.  It generates a
//! random key when it's created, keeps that key protected in memory whenever it isn't being
//! used, and forgets it forever when dropped.
//!
//! Payloads are protected by a [`DataProtector`], which is created for a particular *purpose*.
//! Purposes keep different uses of the same key apart: a payload protected for `"cookies"` can't
//! be unprotected by a protector for `"password-reset"`, even though they came from the same
//! provider.  Protectors can also create further protectors, which extends the chain of purposes
//! (`"db"` → `"users"` → `"email"`, say).
//!
//! ```rust
//! use ephemeral_protect::{DataProtectionProvider as _, EphemeralDataProtectionProvider, Error};
//! # fn main() -> Result<(), Error> {
//!
//! let provider = EphemeralDataProtectionProvider::new()?;
//! let protector = provider.create_protector("db")?.create_protector("users")?;
//!
//! let protected = protector.protect(b"someone@example.com")?;
//! assert_eq!(b"someone@example.com".to_vec(), protector.unprotect(&protected)?);
//! # Ok(())
//! # }
//! ```
//!
//! # Under the hood
//!
//! Keys are organised into a [`KeyRing`], supplied by a [`KeyRingProvider`].  The ephemeral
//! provider's ring holds precisely one key, named [`KeyId::SENTINEL`], which is never rotated or
//! revoked.  Each key is represented by an [`AuthenticatedEncryptor`], built by an
//! [`AuthenticatedEncryptorFactory`] from a [`Secret`] for the [`CipherSuite`] chosen (once) by
//! a [`CapabilityProbe`].
//!
//! The secret bytes are kept encrypted in place between uses with [`memory_protection`], on
//! platforms that support it.
mod capability;
mod encryptor;
mod ephemeral;
mod error;
mod kdf;
mod key_id;
mod key_ring;
pub mod memory_protection;
mod protector;
mod secret;

pub use capability::{CapabilityProbe, CpuFeatureProbe, FixedCapability};
pub use encryptor::{
	AeadEncryptorFactory, AuthenticatedEncryptor, AuthenticatedEncryptorFactory, CipherSuite,
};
pub use ephemeral::{EphemeralDataProtectionProvider, EphemeralDataProtectionProviderBuilder};
pub use error::{Error, ErrorKind};
pub use key_id::KeyId;
pub use key_ring::{EphemeralKeyRing, EphemeralKeyRingProvider, KeyRing, KeyRingProvider};
pub use protector::{DataProtectionProvider, DataProtector, KeyRingDataProtectionProvider};
pub use secret::{SECRET_LEN, Secret};
