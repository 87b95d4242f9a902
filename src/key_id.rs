use ciborium_ll::Header;

use super::Error;

type Kid = [u8; 16];

/// A 128-bit identifier naming one key within a [`KeyRing`](super::KeyRing).
///
/// The canonical text form is hyphenated lowercase hex, in 8-4-4-4-12 groups, which
/// [`Display`](std::fmt::Display) produces and [`FromStr`](std::str::FromStr) accepts.
#[allow(clippy::derived_hash_with_manual_eq)] // k1 == k2 => hash(k1) == hash(k2) will hold
#[derive(Clone, Copy, Debug, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct KeyId(Kid);

impl KeyId {
	/// The all-zero identifier, which an ephemeral key ring uses for its one and only key.
	pub const SENTINEL: KeyId = KeyId([0u8; 16]);

	pub const fn from_bytes(bytes: [u8; 16]) -> Self {
		Self(bytes)
	}

	pub fn as_bytes(&self) -> &Kid {
		&self.0
	}

	pub(crate) fn encode(&self, enc: &mut ciborium_ll::Encoder<&mut Vec<u8>>) -> Result<(), Error> {
		enc.bytes(&self.0, None)
			.map_err(|e| Error::encoding("key_id", e))?;
		Ok(())
	}

	// Only a definite-length byte string of exactly the right size will do; anything else
	// would let the same key ID be spelled more than one way.
	pub(crate) fn decode(dec: &mut ciborium_ll::Decoder<&[u8]>) -> Result<Self, Error> {
		let mut kid: Kid = Default::default();

		match dec
			.pull()
			.map_err(|e| Error::decoding("key_id header", e))?
		{
			Header::Bytes(Some(len)) if len == kid.len() => (),
			Header::Bytes(Some(_)) => {
				return Err(Error::invalid_ciphertext("incorrect key_id length"));
			}
			Header::Bytes(None) => {
				return Err(Error::invalid_ciphertext("indefinite-length key_id"));
			}
			_ => return Err(Error::invalid_ciphertext("expected key_id")),
		}

		let mut segments = dec.bytes(Some(kid.len()));
		let Some(mut segment) = segments
			.pull()
			.map_err(|e| Error::decoding("key_id", e))?
		else {
			return Err(Error::invalid_ciphertext("short key_id"));
		};

		let read = segment
			.pull(&mut kid[..])
			.map_err(|e| Error::decoding("key_id", e))?
			.map_or(0, <[u8]>::len);

		if read != kid.len() {
			return Err(Error::invalid_ciphertext("short key_id"));
		}

		Ok(Self(kid))
	}
}

impl PartialEq for KeyId {
	fn eq(&self, other: &Self) -> bool {
		constant_time_eq::constant_time_eq_n(&self.0, &other.0)
	}
}

impl Eq for KeyId {}

impl std::fmt::Display for KeyId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		for (i, b) in self.0.iter().enumerate() {
			if matches!(i, 4 | 6 | 8 | 10) {
				f.write_str("-")?;
			}
			f.write_fmt(format_args!("{b:02x}"))?;
		}

		Ok(())
	}
}

impl std::str::FromStr for KeyId {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Error> {
		const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];

		let groups: Vec<&str> = s.split('-').collect();

		if groups.len() != GROUPS.len()
			|| groups.iter().zip(GROUPS).any(|(g, len)| g.len() != len)
		{
			return Err(Error::invalid_argument(format!(
				"key ID {s:?} is not in 8-4-4-4-12 form"
			)));
		}

		let hex = groups.concat();

		if !hex.bytes().all(|c| c.is_ascii_hexdigit()) {
			return Err(Error::invalid_argument(format!("key ID {s:?} is not hex")));
		}

		let mut kid: Kid = Default::default();

		for (i, b) in kid.iter_mut().enumerate() {
			*b = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
				.map_err(|e| Error::invalid_argument(format!("key ID {s:?}: {e}")))?;
		}

		Ok(Self(kid))
	}
}
