use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
	ChaCha20Poly1305,
	aead::{Aead, AeadCore, KeyInit, Nonce, Payload},
};
use secrecy::ExposeSecret as _;
use std::{fmt::Debug, marker::PhantomData, sync::Arc};

use super::{Error, Secret, kdf};

const KEY_MODIFIER_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Something that can encrypt data such that any tampering is detected on decryption.
///
/// Implementations are stateless as far as callers are concerned, and must be safe to call from
/// many threads at once.
pub trait AuthenticatedEncryptor: Debug + Send + Sync {
	/// Encrypt `plaintext`, binding the result to `additional_data`.
	///
	/// # Errors
	///
	/// Will return [`Error::Encryption`] in the (extremely unlikely) event something goes
	/// horribly wrong.
	fn encrypt(&self, plaintext: &[u8], additional_data: &[u8]) -> Result<Vec<u8>, Error>;

	/// Decrypt a ciphertext produced by [`AuthenticatedEncryptor::encrypt`] with the same
	/// `additional_data`.
	///
	/// # Errors
	///
	/// * [`Error::Decryption`] if the ciphertext was produced by a different key, with
	///   different additional data, or has been modified.
	/// * [`Error::InvalidCiphertext`] if the input is too short to have been a ciphertext at all.
	fn decrypt(&self, ciphertext: &[u8], additional_data: &[u8]) -> Result<Vec<u8>, Error>;
}

/// The algorithms an [`AuthenticatedEncryptor`] can be built around.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CipherSuite {
	/// AES-256 in Galois/Counter Mode; the fast choice when the CPU has AES instructions.
	Aes256Gcm,
	/// ChaCha20 with a Poly1305 authenticator; fast and constant-time anywhere.
	ChaCha20Poly1305,
}

impl CipherSuite {
	/// Human-readable name of the suite.
	pub fn name(&self) -> &'static str {
		match self {
			CipherSuite::Aes256Gcm => "AES-256-GCM",
			CipherSuite::ChaCha20Poly1305 => "ChaCha20-Poly1305",
		}
	}

	// Mixed into every derived key, so the two suites never share a subkey
	fn label(&self) -> &'static [u8] {
		match self {
			CipherSuite::Aes256Gcm => b"aes256gcm::",
			CipherSuite::ChaCha20Poly1305 => b"chacha20poly1305::",
		}
	}
}

impl std::fmt::Display for CipherSuite {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

/// Builds an [`AuthenticatedEncryptor`] for a [`CipherSuite`] out of a [`Secret`].
pub trait AuthenticatedEncryptorFactory: Debug + Send + Sync {
	/// # Errors
	///
	/// Returns [`Error::Configuration`] if this factory cannot build the requested suite.
	fn create_encryptor(
		&self,
		suite: CipherSuite,
		kdk: Secret,
	) -> Result<Arc<dyn AuthenticatedEncryptor>, Error>;
}

/// The stock [`AuthenticatedEncryptorFactory`], which supports every [`CipherSuite`].
#[derive(Clone, Copy, Debug, Default)]
pub struct AeadEncryptorFactory;

impl AuthenticatedEncryptorFactory for AeadEncryptorFactory {
	#[tracing::instrument(level = "debug", skip(kdk))]
	fn create_encryptor(
		&self,
		suite: CipherSuite,
		kdk: Secret,
	) -> Result<Arc<dyn AuthenticatedEncryptor>, Error> {
		Ok(match suite {
			CipherSuite::Aes256Gcm => Arc::new(AeadEncryptor::<Aes256Gcm>::new(suite, kdk)),
			CipherSuite::ChaCha20Poly1305 => {
				Arc::new(AeadEncryptor::<ChaCha20Poly1305>::new(suite, kdk))
			}
		})
	}
}

// Every encryption derives a fresh key from the KDK and a random key modifier, so the
// KDK itself is never used as a cipher key, and nonce reuse across messages is a
// non-issue.
//
// Output layout: key_modifier || nonce || ciphertext || tag
struct AeadEncryptor<C> {
	suite: CipherSuite,
	kdk: Secret,
	cipher: PhantomData<fn() -> C>,
}

impl<C> Debug for AeadEncryptor<C> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AeadEncryptor")
			.field("suite", &self.suite)
			.finish_non_exhaustive()
	}
}

impl<C> AeadEncryptor<C>
where
	C: Aead + AeadCore<NonceSize = typenum::U12> + KeyInit,
{
	fn new(suite: CipherSuite, kdk: Secret) -> Self {
		Self {
			suite,
			kdk,
			cipher: PhantomData,
		}
	}

	fn cipher(&self, key_modifier: &[u8], additional_data: &[u8]) -> Result<C, Error> {
		let mut context = self.suite.label().to_vec();
		context.extend_from_slice(additional_data);

		let key = kdf::derive_subkey(&self.kdk, key_modifier, &context)?;

		C::new_from_slice(key.expose_secret())
			.map_err(|_| Error::insanity(format!("{} rejected a 256-bit key", self.suite)))
	}
}

impl<C> AuthenticatedEncryptor for AeadEncryptor<C>
where
	C: Aead + AeadCore<NonceSize = typenum::U12> + KeyInit,
{
	#[tracing::instrument(level = "trace", skip_all, fields(suite = %self.suite))]
	fn encrypt(&self, plaintext: &[u8], additional_data: &[u8]) -> Result<Vec<u8>, Error> {
		use rand::{RngCore as _, rng};

		let mut key_modifier = [0u8; KEY_MODIFIER_LEN];
		let mut nonce = [0u8; NONCE_LEN];
		let mut rng = rng();
		rng.fill_bytes(&mut key_modifier);
		rng.fill_bytes(&mut nonce);

		let cipher = self.cipher(&key_modifier, additional_data)?;
		let sealed = cipher
			.encrypt(
				Nonce::<C>::from_slice(&nonce),
				Payload {
					msg: plaintext,
					aad: additional_data,
				},
			)
			.map_err(|_| Error::Encryption)?;

		let mut output = Vec::with_capacity(KEY_MODIFIER_LEN + NONCE_LEN + sealed.len());
		output.extend_from_slice(&key_modifier);
		output.extend_from_slice(&nonce);
		output.extend_from_slice(&sealed);

		Ok(output)
	}

	#[tracing::instrument(level = "trace", skip_all, fields(suite = %self.suite))]
	fn decrypt(&self, ciphertext: &[u8], additional_data: &[u8]) -> Result<Vec<u8>, Error> {
		if ciphertext.len() < KEY_MODIFIER_LEN + NONCE_LEN + TAG_LEN {
			return Err(Error::invalid_ciphertext("too short"));
		}

		let (key_modifier, rest) = ciphertext.split_at(KEY_MODIFIER_LEN);
		let (nonce, sealed) = rest.split_at(NONCE_LEN);

		let cipher = self.cipher(key_modifier, additional_data)?;
		cipher
			.decrypt(
				Nonce::<C>::from_slice(nonce),
				Payload {
					msg: sealed,
					aad: additional_data,
				},
			)
			.map_err(|_| Error::Decryption)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::secret::SECRET_LEN;

	fn encryptor(suite: CipherSuite, b: u8) -> Arc<dyn AuthenticatedEncryptor> {
		AeadEncryptorFactory
			.create_encryptor(suite, Secret::from_bytes(&mut [b; SECRET_LEN]).unwrap())
			.unwrap()
	}

	const SUITES: [CipherSuite; 2] = [CipherSuite::Aes256Gcm, CipherSuite::ChaCha20Poly1305];

	#[test]
	fn round_trip() {
		crate::test_support::init();

		for suite in SUITES {
			let enc = encryptor(suite, 1);
			let ciphertext = enc.encrypt(b"hello, world!", b"aad").unwrap();

			assert_eq!(
				KEY_MODIFIER_LEN + NONCE_LEN + 13 + TAG_LEN,
				ciphertext.len()
			);
			assert_eq!(
				b"hello, world!".to_vec(),
				enc.decrypt(&ciphertext, b"aad").unwrap()
			);
		}
	}

	#[test]
	fn empty_plaintext() {
		crate::test_support::init();

		for suite in SUITES {
			let enc = encryptor(suite, 1);
			let ciphertext = enc.encrypt(b"", b"").unwrap();

			assert_eq!(Vec::<u8>::new(), enc.decrypt(&ciphertext, b"").unwrap());
		}
	}

	#[test]
	fn encryption_is_randomised() {
		crate::test_support::init();

		let enc = encryptor(CipherSuite::ChaCha20Poly1305, 1);

		assert_ne!(
			enc.encrypt(b"same", b"aad").unwrap(),
			enc.encrypt(b"same", b"aad").unwrap()
		);
	}

	#[test]
	fn additional_data_matters() {
		crate::test_support::init();

		for suite in SUITES {
			let enc = encryptor(suite, 1);
			let ciphertext = enc.encrypt(b"hello, world!", b"aad").unwrap();

			let result = enc.decrypt(&ciphertext, b"dda");
			assert!(matches!(result, Err(Error::Decryption)));
		}
	}

	#[test]
	fn different_secrets_do_not_interoperate() {
		crate::test_support::init();

		for suite in SUITES {
			let ciphertext = encryptor(suite, 1).encrypt(b"hello", b"aad").unwrap();

			let result = encryptor(suite, 2).decrypt(&ciphertext, b"aad");
			assert!(matches!(result, Err(Error::Decryption)));
		}
	}

	#[test]
	fn suites_do_not_interoperate() {
		crate::test_support::init();

		let ciphertext = encryptor(CipherSuite::Aes256Gcm, 1)
			.encrypt(b"hello", b"aad")
			.unwrap();

		let result = encryptor(CipherSuite::ChaCha20Poly1305, 1).decrypt(&ciphertext, b"aad");
		assert!(matches!(result, Err(Error::Decryption)));
	}

	#[test]
	fn every_bit_counts() {
		crate::test_support::init();

		for suite in SUITES {
			let enc = encryptor(suite, 1);
			let ciphertext = enc.encrypt(b"tamper with me", b"aad").unwrap();

			for i in 0..ciphertext.len() * 8 {
				let mut tampered = ciphertext.clone();
				tampered[i / 8] ^= 1 << (i % 8);

				let result = enc.decrypt(&tampered, b"aad");
				assert!(matches!(result, Err(Error::Decryption)), "bit {i}");
			}
		}
	}

	#[test]
	fn truncated() {
		crate::test_support::init();

		let enc = encryptor(CipherSuite::Aes256Gcm, 1);
		let ciphertext = enc.encrypt(b"", b"").unwrap();

		let result = enc.decrypt(&ciphertext[1..], b"");
		assert!(matches!(result, Err(Error::InvalidCiphertext(_))));
	}

	#[test]
	fn suite_names() {
		assert_eq!("AES-256-GCM", CipherSuite::Aes256Gcm.to_string());
		assert_eq!("ChaCha20-Poly1305", CipherSuite::ChaCha20Poly1305.name());
	}
}
