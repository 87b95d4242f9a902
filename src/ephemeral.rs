use std::sync::Arc;

use super::{
	AeadEncryptorFactory, AuthenticatedEncryptorFactory, CapabilityProbe, CipherSuite,
	CpuFeatureProbe, DataProtectionProvider, DataProtector, Error, KeyRingDataProtectionProvider,
	KeyRingProvider, Secret,
	key_ring::{EphemeralKeyRing, EphemeralKeyRingProvider},
};

/// A [`DataProtectionProvider`] whose key lives and dies with it.
///
/// When built, the provider generates a single random 512-bit [`Secret`], and uses it for every
/// payload protected by any [`DataProtector`] it creates.  The secret is never written anywhere,
/// never rotated, and never shared with anything else, which means:
///
/// * Payloads protected by a given [`EphemeralDataProtectionProvider`] can only be unprotected by
///   protectors from that same provider (and with the same purposes, naturally).
/// * Once the provider is dropped, everything it ever protected is permanently undecipherable.
///
/// That makes it ideal for tests, and for data which doesn't need to survive a restart (such as
/// short-lived anti-forgery tokens in a single-process server).
///
/// The cipher suite is chosen once, at construction: AES-256-GCM if the CPU can do it natively,
/// and ChaCha20-Poly1305 otherwise.
///
/// # Example
///
/// ```rust
/// use ephemeral_protect::{DataProtectionProvider as _, EphemeralDataProtectionProvider, Error};
/// # fn main() -> Result<(), Error> {
///
/// let provider = EphemeralDataProtectionProvider::new()?;
///
/// let cookies = provider.create_protector("cookies")?;
/// let protected = cookies.protect(b"session=1234")?;
///
/// assert_eq!(b"session=1234".to_vec(), cookies.unprotect(&protected)?);
///
/// // A protector for some other purpose won't touch it
/// let csrf = provider.create_protector("csrf")?;
/// assert!(matches!(csrf.unprotect(&protected), Err(Error::Decryption)));
///
/// // Nor will a protector for the same purpose, from a different provider
/// let other = EphemeralDataProtectionProvider::new()?.create_protector("cookies")?;
/// assert!(matches!(other.unprotect(&protected), Err(Error::Decryption)));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct EphemeralDataProtectionProvider {
	cipher_suite: CipherSuite,
	inner: KeyRingDataProtectionProvider,
}

impl EphemeralDataProtectionProvider {
	/// Create a new [`EphemeralDataProtectionProvider`] with the default settings.
	///
	/// # Errors
	///
	/// Returns [`Error::Platform`] if the new secret cannot be protected in memory.
	pub fn new() -> Result<Self, Error> {
		Self::builder().build()
	}

	/// Start building an [`EphemeralDataProtectionProvider`] with non-default collaborators.
	pub fn builder() -> EphemeralDataProtectionProviderBuilder {
		EphemeralDataProtectionProviderBuilder::default()
	}

	/// The cipher suite picked when this provider was built.
	pub fn cipher_suite(&self) -> CipherSuite {
		self.cipher_suite
	}

	pub fn key_ring_provider(&self) -> Arc<dyn KeyRingProvider> {
		self.inner.key_ring_provider()
	}
}

impl DataProtectionProvider for EphemeralDataProtectionProvider {
	#[tracing::instrument(level = "debug", skip(self))]
	fn create_protector(&self, purpose: &str) -> Result<DataProtector, Error> {
		self.inner.create_protector(purpose)
	}
}

/// Configures and builds an [`EphemeralDataProtectionProvider`].
///
/// ```rust
/// use ephemeral_protect::{CipherSuite, EphemeralDataProtectionProvider, FixedCapability};
///
/// // Pretend the CPU has no AES instructions
/// let provider = EphemeralDataProtectionProvider::builder()
///     .capability_probe(FixedCapability(false))
///     .build()
///     .unwrap();
///
/// assert_eq!(CipherSuite::ChaCha20Poly1305, provider.cipher_suite());
/// ```
#[derive(Debug)]
pub struct EphemeralDataProtectionProviderBuilder {
	probe: Box<dyn CapabilityProbe>,
	factory: Box<dyn AuthenticatedEncryptorFactory>,
	allow_fallback: bool,
}

impl Default for EphemeralDataProtectionProviderBuilder {
	fn default() -> Self {
		Self {
			probe: Box::new(CpuFeatureProbe),
			factory: Box::new(AeadEncryptorFactory),
			allow_fallback: true,
		}
	}
}

impl EphemeralDataProtectionProviderBuilder {
	/// Decide between the native and portable cipher suites with `probe`, rather than asking
	/// the CPU.
	pub fn capability_probe(mut self, probe: impl CapabilityProbe + 'static) -> Self {
		self.probe = Box::new(probe);
		self
	}

	/// Build the provider's encryptor with `factory`.
	pub fn encryptor_factory(
		mut self,
		factory: impl AuthenticatedEncryptorFactory + 'static,
	) -> Self {
		self.factory = Box::new(factory);
		self
	}

	/// Whether to fall back to the portable cipher suite when there's no native AES-GCM
	/// support.  Defaults to `true`.
	pub fn allow_fallback(mut self, allow: bool) -> Self {
		self.allow_fallback = allow;
		self
	}

	/// Build the provider.
	///
	/// # Errors
	///
	/// * [`Error::Configuration`] if no cipher suite is available, either because fallback was
	///   disallowed on hardware without native AES-GCM, or because the encryptor factory
	///   refused.  No provider is produced.
	/// * [`Error::Platform`] if the new secret cannot be protected in memory.
	#[tracing::instrument(level = "debug", name = "EphemeralDataProtectionProvider::build")]
	pub fn build(self) -> Result<EphemeralDataProtectionProvider, Error> {
		let cipher_suite = if self.probe.has_native_aes_gcm() {
			CipherSuite::Aes256Gcm
		} else if self.allow_fallback {
			CipherSuite::ChaCha20Poly1305
		} else {
			return Err(Error::configuration(
				"no supported cipher suite: native AES-GCM unavailable and fallback disallowed",
			));
		};
		tracing::debug!(%cipher_suite, "Selected cipher suite");

		let kdk = Secret::random()?;
		let encryptor = self.factory.create_encryptor(cipher_suite, kdk)?;

		let key_ring_provider = EphemeralKeyRingProvider::new(EphemeralKeyRing::new(encryptor));

		Ok(EphemeralDataProtectionProvider {
			cipher_suite,
			inner: KeyRingDataProtectionProvider::new(Arc::new(key_ring_provider)),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{AuthenticatedEncryptor, FixedCapability, KeyId};
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[test]
	fn round_trip() {
		crate::test_support::init();

		let provider = EphemeralDataProtectionProvider::new().unwrap();
		let protector = provider.create_protector("test").unwrap();

		let protected = protector.protect(b"hello, world!").unwrap();

		assert_eq!(
			b"hello, world!".to_vec(),
			protector.unprotect(&protected).unwrap()
		);
	}

	#[test]
	fn native_suite_when_supported() {
		crate::test_support::init();

		let provider = EphemeralDataProtectionProvider::builder()
			.capability_probe(FixedCapability(true))
			.build()
			.unwrap();

		assert_eq!(CipherSuite::Aes256Gcm, provider.cipher_suite());
	}

	#[test]
	fn fallback_suite_round_trips() {
		crate::test_support::init();

		let provider = EphemeralDataProtectionProvider::builder()
			.capability_probe(FixedCapability(false))
			.build()
			.unwrap();

		assert_eq!(CipherSuite::ChaCha20Poly1305, provider.cipher_suite());

		let protector = provider.create_protector("fallback").unwrap();
		let protected = protector.protect(b"still works").unwrap();
		assert_eq!(
			b"still works".to_vec(),
			protector.unprotect(&protected).unwrap()
		);
	}

	#[test]
	fn no_fallback_no_provider() {
		crate::test_support::init();

		let result = EphemeralDataProtectionProvider::builder()
			.capability_probe(FixedCapability(false))
			.allow_fallback(false)
			.build();

		assert!(matches!(result, Err(Error::Configuration(_))));
	}

	#[derive(Debug)]
	struct RefusingFactory;

	impl AuthenticatedEncryptorFactory for RefusingFactory {
		fn create_encryptor(
			&self,
			suite: CipherSuite,
			_kdk: Secret,
		) -> Result<Arc<dyn AuthenticatedEncryptor>, Error> {
			Err(Error::configuration(format!("{suite} not supported here")))
		}
	}

	#[test]
	fn factory_failure_is_fatal() {
		crate::test_support::init();

		let result = EphemeralDataProtectionProvider::builder()
			.encryptor_factory(RefusingFactory)
			.build();

		assert!(matches!(result, Err(Error::Configuration(_))));
	}

	#[derive(Debug, Default)]
	struct CountingProbe(Arc<AtomicUsize>);

	impl CapabilityProbe for CountingProbe {
		fn has_native_aes_gcm(&self) -> bool {
			self.0.fetch_add(1, Ordering::SeqCst);
			false
		}
	}

	#[test]
	fn probe_is_asked_once() {
		crate::test_support::init();

		let count = Arc::new(AtomicUsize::new(0));
		let provider = EphemeralDataProtectionProvider::builder()
			.capability_probe(CountingProbe(count.clone()))
			.build()
			.unwrap();

		let protector = provider.create_protector("count").unwrap();
		for _ in 0..3 {
			let protected = protector.protect(b"x").unwrap();
			protector.unprotect(&protected).unwrap();
		}

		assert_eq!(1, count.load(Ordering::SeqCst));
	}

	#[test]
	fn key_ring_is_single_generation() {
		crate::test_support::init();

		let provider = EphemeralDataProtectionProvider::new().unwrap();
		let key_ring = provider.key_ring_provider().current_key_ring();

		assert_eq!(KeyId::SENTINEL, key_ring.default_key_id());

		let (encryptor, revoked) = key_ring.encryptor_by_key_id(&KeyId::SENTINEL);
		assert!(!revoked);
		assert!(Arc::ptr_eq(
			&encryptor.unwrap(),
			&key_ring.default_encryptor()
		));

		let (encryptor, revoked) = key_ring.encryptor_by_key_id(&KeyId::from_bytes([9u8; 16]));
		assert!(encryptor.is_none());
		assert!(!revoked);

		assert!(Arc::ptr_eq(
			&key_ring,
			&provider.key_ring_provider().current_key_ring()
		));
	}

	#[test]
	fn providers_are_isolated() {
		crate::test_support::init();

		let a = EphemeralDataProtectionProvider::new().unwrap();
		let b = EphemeralDataProtectionProvider::new().unwrap();

		let protected = a
			.create_protector("shared")
			.unwrap()
			.protect(b"mine")
			.unwrap();

		let result = b.create_protector("shared").unwrap().unprotect(&protected);
		assert!(matches!(result, Err(Error::Decryption)));
	}

	#[test]
	fn clones_share_the_key() {
		crate::test_support::init();

		let provider = EphemeralDataProtectionProvider::new().unwrap();
		let clone = provider.clone();

		let protected = provider
			.create_protector("shared")
			.unwrap()
			.protect(b"ours")
			.unwrap();

		assert_eq!(
			b"ours".to_vec(),
			clone
				.create_protector("shared")
				.unwrap()
				.unprotect(&protected)
				.unwrap()
		);
	}

	#[test]
	fn concurrent_use() {
		crate::test_support::init();

		let provider = EphemeralDataProtectionProvider::new().unwrap();
		let protector = provider.create_protector("threads").unwrap();

		std::thread::scope(|s| {
			for t in 0..8u8 {
				let protector = &protector;
				s.spawn(move || {
					for i in 0..50u8 {
						let plaintext = [t, i];
						let protected = protector.protect(plaintext).unwrap();
						assert_eq!(plaintext.to_vec(), protector.unprotect(&protected).unwrap());
					}
				});
			}
		});
	}
}
