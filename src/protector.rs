use ciborium_ll::{Decoder, Encoder, Header};
use std::sync::Arc;

use super::{Error, KeyId, KeyRingProvider};

/// Something that hands out [`DataProtector`]s for a given purpose.
///
/// Purposes isolate unrelated uses of the same keys from each other: a payload protected for one
/// purpose can only be unprotected by a protector created for exactly the same purpose (or chain
/// of purposes).
pub trait DataProtectionProvider {
	/// Create a [`DataProtector`] for `purpose`.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidArgument`] if `purpose` is empty.
	fn create_protector(&self, purpose: &str) -> Result<DataProtector, Error>;
}

/// A [`DataProtectionProvider`] whose keys come from any [`KeyRingProvider`].
#[derive(Clone, Debug)]
pub struct KeyRingDataProtectionProvider {
	key_ring_provider: Arc<dyn KeyRingProvider>,
}

impl KeyRingDataProtectionProvider {
	pub fn new(key_ring_provider: Arc<dyn KeyRingProvider>) -> Self {
		Self { key_ring_provider }
	}

	pub fn key_ring_provider(&self) -> Arc<dyn KeyRingProvider> {
		self.key_ring_provider.clone()
	}
}

impl DataProtectionProvider for KeyRingDataProtectionProvider {
	#[tracing::instrument(level = "debug", skip(self))]
	fn create_protector(&self, purpose: &str) -> Result<DataProtector, Error> {
		DataProtector::new(self.key_ring_provider.clone(), Vec::new()).create_protector(purpose)
	}
}

/// Protects and unprotects payloads for one particular chain of purposes.
///
/// A [`DataProtector`] is also a [`DataProtectionProvider`]: creating a protector from a
/// protector appends another purpose to the chain, producing a protector whose payloads are
/// isolated from those of its parent.
#[derive(Clone, Debug)]
pub struct DataProtector {
	key_ring_provider: Arc<dyn KeyRingProvider>,
	purposes: Vec<String>,
}

impl DataProtector {
	fn new(key_ring_provider: Arc<dyn KeyRingProvider>, purposes: Vec<String>) -> Self {
		Self {
			key_ring_provider,
			purposes,
		}
	}

	/// The chain of purposes this protector was created for, outermost first.
	pub fn purposes(&self) -> &[String] {
		&self.purposes
	}

	/// Encrypt and authenticate `plaintext` with the current default key.
	///
	/// # Errors
	///
	/// Will return [`Error::Encryption`] or [`Error::Encoding`] in the (extremely
	/// unlikely) event something goes horribly wrong.
	#[tracing::instrument(level = "debug", skip(self, plaintext), fields(purposes = ?self.purposes))]
	pub fn protect(&self, plaintext: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
		let key_ring = self.key_ring_provider.current_key_ring();
		let key_id = key_ring.default_key_id();

		let aad = self.additional_data(&key_id)?;
		let payload = key_ring
			.default_encryptor()
			.encrypt(plaintext.as_ref(), &aad)?;
		tracing::debug!(%key_id, "Protected payload");

		Envelope::new(key_id, payload).to_bytes()
	}

	/// Verify and decrypt a payload previously produced by [`DataProtector::protect`] on a
	/// protector with the same purposes.
	///
	/// # Errors
	///
	/// * [`Error::Decryption`] if the key that protected the payload is unknown or revoked, or
	///   the payload was protected for different purposes, or has been tampered with.
	/// * [`Error::InvalidCiphertext`] or [`Error::Decoding`] if the payload is malformed.
	#[tracing::instrument(level = "debug", skip(self, protected), fields(purposes = ?self.purposes))]
	pub fn unprotect(&self, protected: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
		let envelope = Envelope::try_from(protected.as_ref())?;
		let key_ring = self.key_ring_provider.current_key_ring();

		let (encryptor, revoked) = key_ring.encryptor_by_key_id(&envelope.key_id);

		let Some(encryptor) = encryptor else {
			tracing::debug!(key_id=%envelope.key_id, "Key not found");
			return Err(Error::Decryption);
		};

		if revoked {
			tracing::debug!(key_id=%envelope.key_id, "Key has been revoked");
			return Err(Error::Decryption);
		}

		let aad = self.additional_data(&envelope.key_id)?;
		encryptor.decrypt(&envelope.payload, &aad)
	}

	// magic || key_id || [purpose, ...]
	fn additional_data(&self, key_id: &KeyId) -> Result<Vec<u8>, Error> {
		let mut v = ENVELOPE_MAGIC.to_vec();
		v.extend_from_slice(key_id.as_bytes());

		let mut enc = Encoder::from(&mut v);
		enc.push(Header::Array(Some(self.purposes.len())))
			.map_err(|e| Error::encoding("purposes", e))?;
		for purpose in &self.purposes {
			enc.text(purpose, None)
				.map_err(|e| Error::encoding("purpose", e))?;
		}

		Ok(v)
	}
}

impl DataProtectionProvider for DataProtector {
	#[tracing::instrument(level = "debug", skip(self))]
	fn create_protector(&self, purpose: &str) -> Result<DataProtector, Error> {
		if purpose.is_empty() {
			return Err(Error::invalid_argument("purpose must not be empty"));
		}

		let mut purposes = self.purposes.clone();
		purposes.push(purpose.to_string());

		Ok(DataProtector::new(self.key_ring_provider.clone(), purposes))
	}
}

const ENVELOPE_MAGIC: [u8; 4] = [0x09, 0xf0, 0xc9, 0xf0];

// What protect() hands back: magic, then a CBOR array of [key_id, payload]
#[derive(Clone, Debug)]
struct Envelope {
	key_id: KeyId,
	payload: Vec<u8>,
}

impl Envelope {
	fn new(key_id: KeyId, payload: Vec<u8>) -> Self {
		Self { key_id, payload }
	}

	fn to_bytes(&self) -> Result<Vec<u8>, Error> {
		let mut v: Vec<u8> = Vec::new();

		v.extend_from_slice(&ENVELOPE_MAGIC);

		let mut enc = Encoder::from(&mut v);
		enc.push(Header::Array(Some(2)))
			.map_err(|e| Error::encoding("envelope", e))?;
		self.key_id.encode(&mut enc)?;
		enc.bytes(&self.payload, None)
			.map_err(|e| Error::encoding("payload", e))?;

		Ok(v)
	}
}

impl TryFrom<&[u8]> for Envelope {
	type Error = Error;

	fn try_from(b: &[u8]) -> Result<Self, Self::Error> {
		if b.len() < ENVELOPE_MAGIC.len() + 1 + 17 {
			return Err(Error::invalid_ciphertext("too short"));
		}

		if b[0..4] != ENVELOPE_MAGIC {
			tracing::debug!(magic=?ENVELOPE_MAGIC, actual=?b[0..4]);
			return Err(Error::invalid_ciphertext("incorrect magic"));
		}

		let body = &b[4..];
		let mut dec = Decoder::from(body);

		let Header::Array(Some(2)) = dec.pull().map_err(|e| Error::decoding("array", e))? else {
			return Err(Error::invalid_ciphertext("expected array"));
		};

		let key_id = KeyId::decode(&mut dec)?;

		let len = match dec
			.pull()
			.map_err(|e| Error::decoding("payload header", e))?
		{
			Header::Bytes(Some(len)) => len,
			Header::Bytes(None) => {
				return Err(Error::invalid_ciphertext("indefinite-length payload"));
			}
			_ => return Err(Error::invalid_ciphertext("expected payload")),
		};

		if len == 0 {
			return Err(Error::invalid_ciphertext("empty payload"));
		}
		// Don't take the header's word for how much to allocate
		if len > body.len() - dec.offset() {
			return Err(Error::invalid_ciphertext("truncated payload"));
		}

		let mut payload = vec![0u8; len];
		let mut segments = dec.bytes(Some(len));
		let Some(mut segment) = segments
			.pull()
			.map_err(|e| Error::decoding("payload", e))?
		else {
			return Err(Error::invalid_ciphertext("bad payload"));
		};

		let read = segment
			.pull(&mut payload[..])
			.map_err(|e| Error::decoding("payload", e))?
			.map_or(0, <[u8]>::len);

		if read != len {
			return Err(Error::invalid_ciphertext("short payload"));
		}

		if dec.offset() != body.len() {
			return Err(Error::invalid_ciphertext("trailing data"));
		}

		Ok(Self { key_id, payload })
	}
}
