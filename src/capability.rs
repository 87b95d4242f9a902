use std::fmt::Debug;

/// Answers the one question that decides which cipher suite an
/// [`EphemeralDataProtectionProvider`](super::EphemeralDataProtectionProvider) uses.
///
/// The probe is consulted exactly once, when the provider is built.
pub trait CapabilityProbe: Debug + Send + Sync {
	/// Whether the hardware can run AES-GCM natively (and therefore both quickly and in constant
	/// time).
	fn has_native_aes_gcm(&self) -> bool;
}

/// Asks the CPU.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuFeatureProbe;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
cpufeatures::new!(aes_gcm_intrinsics, "aes", "pclmulqdq");

#[cfg(target_arch = "aarch64")]
cpufeatures::new!(aes_gcm_intrinsics, "aes");

impl CapabilityProbe for CpuFeatureProbe {
	#[tracing::instrument(level = "debug")]
	fn has_native_aes_gcm(&self) -> bool {
		#[cfg(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64"))]
		{
			aes_gcm_intrinsics::get()
		}

		#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
		false
	}
}

/// A probe that gives whatever answer you tell it to, for when the CPU's opinion isn't wanted.
#[derive(Clone, Copy, Debug)]
pub struct FixedCapability(pub bool);

impl CapabilityProbe for FixedCapability {
	fn has_native_aes_gcm(&self) -> bool {
		self.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fixed_says_what_it_is_told() {
		assert!(FixedCapability(true).has_native_aes_gcm());
		assert!(!FixedCapability(false).has_native_aes_gcm());
	}

	#[test]
	fn cpu_answer_is_stable() {
		crate::test_support::init();

		let probe = CpuFeatureProbe;
		assert_eq!(probe.has_native_aes_gcm(), probe.has_native_aes_gcm());
	}
}
