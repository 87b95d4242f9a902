use hkdf::Hkdf;
use secrecy::{ExposeSecretMut as _, SecretBox};
use sha2::Sha256;

use super::{Error, Secret};

/// Derive a one-off 256-bit key from `kdk`, salted with a per-message `key_modifier` and bound
/// to `context`.
pub(crate) fn derive_subkey(
	kdk: &Secret,
	key_modifier: &[u8],
	context: &[u8],
) -> Result<SecretBox<[u8; 32]>, Error> {
	let mut output = SecretBox::new(Box::new([0u8; 32]));

	kdk.with_exposed(|ikm| {
		let hk = Hkdf::<Sha256>::new(Some(key_modifier), ikm);

		hk.expand(context, output.expose_secret_mut())
			.map_err(|_| Error::insanity("HKDF refused to produce 32 bytes"))
	})??;

	Ok(output)
}
