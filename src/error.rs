#[derive(Debug, thiserror::Error, thiserror_ext::Construct)]
#[non_exhaustive]
pub enum Error {
	#[error("invalid configuration: {0}")]
	Configuration(String),

	#[error("failed to decrypt ciphertext")]
	Decryption,

	#[error("failed to encrypt plaintext")]
	Encryption,

	#[error("ciphertext decoding failure on {element}: {cause:?}")]
	Decoding {
		element: String,
		cause: ciborium_ll::Error<std::io::Error>,
	},

	#[error("ciphertext encoding failure on {element}: {cause}")]
	Encoding {
		element: String,
		cause: std::io::Error,
	},

	#[error("CAN'T HAPPEN: {0}")]
	Insanity(String),

	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	#[error("invalid ciphertext: {0}")]
	InvalidCiphertext(String),

	#[error("{operation} failed with platform error {code}")]
	Platform { operation: String, code: i32 },
}

/// Broad classification of an [`Error`], for callers that only care about what went wrong in
/// general terms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
	/// No usable cipher suite could be configured; no provider was built.
	Configuration,
	/// A ciphertext was tampered with, malformed, foreign, or encryption itself failed.
	Cryptographic,
	/// The operating system's memory protection facility reported a failure.
	Platform,
	/// The caller passed something unusable, such as a misaligned buffer or an empty purpose.
	InvalidArgument,
}

impl Error {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::Configuration(_) => ErrorKind::Configuration,
			Error::Platform { .. } => ErrorKind::Platform,
			Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
			Error::Decryption
			| Error::Encryption
			| Error::Decoding { .. }
			| Error::Encoding { .. }
			| Error::Insanity(_)
			| Error::InvalidCiphertext(_) => ErrorKind::Cryptographic,
		}
	}

	/// Shorthand for `self.kind() == ErrorKind::Cryptographic`.
	pub fn is_cryptographic(&self) -> bool {
		self.kind() == ErrorKind::Cryptographic
	}
}
