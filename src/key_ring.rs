use std::{fmt::Debug, sync::Arc};

use super::{AuthenticatedEncryptor, KeyId};

/// An immutable set of keys, one of which is the default used for new encryptions.
///
/// Key rings are read-only once built, so they can be shared between any number of threads
/// without locking.
pub trait KeyRing: Debug + Send + Sync {
	/// The identifier of the key used for all new encryptions.
	fn default_key_id(&self) -> KeyId;

	/// The encryptor for the key named by [`KeyRing::default_key_id`].
	fn default_encryptor(&self) -> Arc<dyn AuthenticatedEncryptor>;

	/// Look up the encryptor for `key_id`.
	///
	/// The returned flag says whether the key has been revoked.  It is reported separately from
	/// the encryptor so that "never heard of it" and "know it, but don't trust it any more" can
	/// be told apart.  An unknown key is always `(None, false)`.
	fn encryptor_by_key_id(&self, key_id: &KeyId)
	-> (Option<Arc<dyn AuthenticatedEncryptor>>, bool);
}

/// Supplies whichever [`KeyRing`] is current.
pub trait KeyRingProvider: Debug + Send + Sync {
	fn current_key_ring(&self) -> Arc<dyn KeyRing>;
}

/// A single-generation [`KeyRing`], holding exactly one key under [`KeyId::SENTINEL`].
///
/// Nothing is ever added, rotated, or revoked.
#[derive(Debug)]
pub struct EphemeralKeyRing {
	encryptor: Arc<dyn AuthenticatedEncryptor>,
}

impl EphemeralKeyRing {
	pub(crate) fn new(encryptor: Arc<dyn AuthenticatedEncryptor>) -> Self {
		Self { encryptor }
	}
}

impl KeyRing for EphemeralKeyRing {
	fn default_key_id(&self) -> KeyId {
		KeyId::SENTINEL
	}

	fn default_encryptor(&self) -> Arc<dyn AuthenticatedEncryptor> {
		self.encryptor.clone()
	}

	#[tracing::instrument(level = "trace", skip(self))]
	fn encryptor_by_key_id(
		&self,
		key_id: &KeyId,
	) -> (Option<Arc<dyn AuthenticatedEncryptor>>, bool) {
		if *key_id == KeyId::SENTINEL {
			(Some(self.encryptor.clone()), false)
		} else {
			tracing::debug!(%key_id, "Key not in ephemeral key ring");
			(None, false)
		}
	}
}

/// The [`KeyRingProvider`] for an [`EphemeralKeyRing`], which always hands out the very same ring.
#[derive(Clone, Debug)]
pub struct EphemeralKeyRingProvider {
	key_ring: Arc<EphemeralKeyRing>,
}

impl EphemeralKeyRingProvider {
	pub(crate) fn new(key_ring: EphemeralKeyRing) -> Self {
		Self {
			key_ring: Arc::new(key_ring),
		}
	}
}

impl KeyRingProvider for EphemeralKeyRingProvider {
	fn current_key_ring(&self) -> Arc<dyn KeyRing> {
		self.key_ring.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		AeadEncryptorFactory, AuthenticatedEncryptorFactory as _, CipherSuite, Secret,
	};

	fn ring() -> EphemeralKeyRing {
		EphemeralKeyRing::new(
			AeadEncryptorFactory
				.create_encryptor(CipherSuite::ChaCha20Poly1305, Secret::random().unwrap())
				.unwrap(),
		)
	}

	#[test]
	fn default_key_is_the_sentinel() {
		crate::test_support::init();

		let ring = ring();

		assert_eq!(KeyId::SENTINEL, ring.default_key_id());
	}

	#[test]
	fn sentinel_lookup_finds_the_default() {
		crate::test_support::init();

		let ring = ring();
		let (encryptor, revoked) = ring.encryptor_by_key_id(&KeyId::SENTINEL);

		assert!(!revoked);
		assert!(Arc::ptr_eq(
			&encryptor.unwrap(),
			&ring.default_encryptor()
		));
	}

	#[test]
	fn other_lookups_find_nothing() {
		crate::test_support::init();

		let ring = ring();

		for kid in [
			KeyId::from_bytes([1u8; 16]),
			KeyId::from_bytes([0xffu8; 16]),
			"00000000-0000-0000-0000-000000000001".parse().unwrap(),
		] {
			let (encryptor, revoked) = ring.encryptor_by_key_id(&kid);

			assert!(encryptor.is_none());
			assert!(!revoked);
		}
	}

	#[test]
	fn provider_always_returns_the_same_ring() {
		crate::test_support::init();

		let provider = EphemeralKeyRingProvider::new(ring());

		let a = provider.current_key_ring();
		let b = provider.clone().current_key_ring();

		assert!(Arc::ptr_eq(&a, &b));
		assert!(Arc::ptr_eq(&a.default_encryptor(), &b.default_encryptor()));
	}
}
