//! The indexer's own ed25519 identity, used to attest the metadata it
//! publishes.

use crate::AccountError;
use ed25519_dalek::{Signer, SigningKey};
use std::fmt;

/// Length in bytes of an ed25519 seed.
pub const SEED_LENGTH: usize = 32;

pub struct IndexerIdentity {
	signing_key: SigningKey,
}

impl IndexerIdentity {
	/// Builds the identity from a hex-encoded 32-byte seed, with or without
	/// a `0x` prefix.
	pub fn from_hex_seed(seed: &str) -> Result<Self, AccountError> {
		let hex_part = seed.strip_prefix("0x").unwrap_or(seed);
		let bytes =
			hex::decode(hex_part).map_err(|e| AccountError::InvalidSigningKey(e.to_string()))?;
		let seed = <[u8; SEED_LENGTH]>::try_from(bytes.as_slice()).map_err(|_| {
			AccountError::InvalidSigningKey(format!(
				"expected {} bytes, got {}",
				SEED_LENGTH,
				bytes.len()
			))
		})?;

		Ok(Self {
			signing_key: SigningKey::from_bytes(&seed),
		})
	}

	/// Public key as unprefixed lower-case hex.
	pub fn public_key_hex(&self) -> String {
		hex::encode(self.signing_key.verifying_key().as_bytes())
	}

	/// Signs `message` and returns the 64-byte signature as unprefixed hex.
	pub fn sign_hex(&self, message: &[u8]) -> String {
		hex::encode(self.signing_key.sign(message).to_bytes())
	}
}

impl fmt::Debug for IndexerIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("IndexerIdentity")
			.field("public_key", &self.public_key_hex())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ed25519_dalek::{Signature, Verifier, VerifyingKey};

	// RFC 8032 section 7.1, test 1.
	const SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
	const PUBLIC_KEY: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";
	const EMPTY_MESSAGE_SIGNATURE: &str = "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e065224901555fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b";

	#[test]
	fn test_known_vector() {
		let identity = IndexerIdentity::from_hex_seed(SEED).unwrap();
		assert_eq!(identity.public_key_hex(), PUBLIC_KEY);
		assert_eq!(identity.sign_hex(b""), EMPTY_MESSAGE_SIGNATURE);

		let prefixed = IndexerIdentity::from_hex_seed(&format!("0x{}", SEED)).unwrap();
		assert_eq!(prefixed.public_key_hex(), PUBLIC_KEY);
	}

	#[test]
	fn test_signature_verifies_with_public_key() {
		let identity = IndexerIdentity::from_hex_seed(&"07".repeat(SEED_LENGTH)).unwrap();
		let message = br#"{"chains":[],"fee_bps":30,"name":"mesh","url":""}"#;

		let public_key: [u8; 32] = hex::decode(identity.public_key_hex())
			.unwrap()
			.try_into()
			.unwrap();
		let signature: [u8; 64] = hex::decode(identity.sign_hex(message))
			.unwrap()
			.try_into()
			.unwrap();

		let key = VerifyingKey::from_bytes(&public_key).unwrap();
		assert!(key.verify(message, &Signature::from_bytes(&signature)).is_ok());
		assert!(key
			.verify(b"tampered", &Signature::from_bytes(&signature))
			.is_err());
	}

	#[test]
	fn test_invalid_seeds_rejected() {
		let too_long = "00".repeat(SEED_LENGTH + 1);
		for seed in ["", "zz", "abcd", too_long.as_str()] {
			assert!(matches!(
				IndexerIdentity::from_hex_seed(seed),
				Err(AccountError::InvalidSigningKey(_))
			));
		}
	}

	#[test]
	fn test_debug_hides_seed() {
		let identity = IndexerIdentity::from_hex_seed(SEED).unwrap();
		let debug = format!("{:?}", identity);
		assert!(debug.contains(PUBLIC_KEY));
		assert!(!debug.contains(SEED));
	}
}
