//! Wallet signature recovery for task and accept submissions.
//!
//! Employers and workers sign with the standard personal-message scheme:
//! the client hashes its message with keccak256 and signs the EIP-191
//! prefixed digest of that hash. Recovery reverses the process and yields
//! the signing account as a lower-case `0x` address.

use alloy_primitives::{eip191_hash_message, keccak256, Address, PrimitiveSignature, B256, U256};
use thiserror::Error;

pub mod identity;

pub use identity::IndexerIdentity;

/// Length in bytes of an `r || s || v` signature.
pub const SIGNATURE_LENGTH: usize = 65;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
	#[error("invalid signature: {0}")]
	InvalidSignature(String),
	#[error("signer mismatch: recovered={recovered} expected={expected}")]
	SignerMismatch { recovered: String, expected: String },
	#[error("invalid signing key: {0}")]
	InvalidSigningKey(String),
}

/// Returns the `0x`-prefixed lower-case hex keccak256 of `data`.
pub fn keccak256_hex(data: impl AsRef<[u8]>) -> String {
	format!("0x{}", hex::encode(keccak256(data)))
}

/// Content hash binding a task id to its on-chain identifier.
pub fn content_hash(task_id: &str) -> String {
	keccak256_hex(task_id.as_bytes())
}

/// Formats an address as `0x` followed by 40 lower-case hex digits.
pub fn format_address(address: &Address) -> String {
	format!("0x{}", hex::encode(address.as_slice()))
}

/// Recovers the signer of `signature` over the personal-message digest of
/// `message_hash`.
///
/// The recovery byte may be 0/1 or 27/28.
pub fn recover_personal_sign(
	message_hash: &B256,
	signature: &str,
) -> Result<String, AccountError> {
	let raw = decode_signature(signature)?;

	let y_parity = match raw[64] {
		0 | 27 => false,
		1 | 28 => true,
		v => {
			return Err(AccountError::InvalidSignature(format!(
				"unsupported recovery byte {}",
				v
			)))
		}
	};

	let sig = PrimitiveSignature::new(
		U256::from_be_slice(&raw[..32]),
		U256::from_be_slice(&raw[32..64]),
		y_parity,
	);

	let digest = eip191_hash_message(message_hash);
	let address = sig
		.recover_address_from_prehash(&digest)
		.map_err(|e| AccountError::InvalidSignature(e.to_string()))?;

	Ok(format_address(&address))
}

/// Verifies that `signature` over keccak256(`message`) was produced by
/// `expected`, compared case-insensitively. Returns the recovered address.
pub fn verify_personal_sign(
	message: &[u8],
	signature: &str,
	expected: &str,
) -> Result<String, AccountError> {
	let recovered = recover_personal_sign(&keccak256(message), signature)?;
	if !recovered.eq_ignore_ascii_case(expected) {
		return Err(AccountError::SignerMismatch {
			recovered,
			expected: expected.to_string(),
		});
	}
	Ok(recovered)
}

fn decode_signature(signature: &str) -> Result<[u8; SIGNATURE_LENGTH], AccountError> {
	let hex_part = signature
		.strip_prefix("0x")
		.or_else(|| signature.strip_prefix("0X"))
		.unwrap_or(signature);

	let bytes = hex::decode(hex_part).map_err(|e| AccountError::InvalidSignature(e.to_string()))?;

	<[u8; SIGNATURE_LENGTH]>::try_from(bytes.as_slice()).map_err(|_| {
		AccountError::InvalidSignature(format!(
			"expected {} bytes, got {}",
			SIGNATURE_LENGTH,
			bytes.len()
		))
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_signer::SignerSync;
	use alloy_signer_local::PrivateKeySigner;

	/// Signs like a browser wallet: personal_sign over keccak256(message).
	fn personal_sign(signer: &PrivateKeySigner, message: &[u8], v_offset: u8) -> String {
		let sig = signer
			.sign_message_sync(keccak256(message).as_slice())
			.unwrap();
		let mut raw = Vec::with_capacity(SIGNATURE_LENGTH);
		raw.extend_from_slice(&sig.r().to_be_bytes::<32>());
		raw.extend_from_slice(&sig.s().to_be_bytes::<32>());
		raw.push(sig.v() as u8 + v_offset);
		format!("0x{}", hex::encode(raw))
	}

	fn address_of(signer: &PrivateKeySigner) -> String {
		format_address(&signer.address())
	}

	#[test]
	fn test_keccak256_hex_known_vector() {
		assert_eq!(
			keccak256_hex(b""),
			"0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
		);
		assert_eq!(content_hash("task-001"), keccak256_hex(b"task-001"));
	}

	#[test]
	fn test_employer_signature_verifies() {
		let signer = PrivateKeySigner::random();
		let sig = personal_sign(&signer, b"task-employer-001", 27);

		let recovered =
			verify_personal_sign(b"task-employer-001", &sig, &address_of(&signer)).unwrap();
		assert_eq!(recovered, address_of(&signer));
	}

	#[test]
	fn test_worker_signature_over_concatenation() {
		let signer = PrivateKeySigner::random();
		let message = format!("{}{}", "task-001", "accept-001");
		let sig = personal_sign(&signer, message.as_bytes(), 27);

		assert!(verify_personal_sign(message.as_bytes(), &sig, &address_of(&signer)).is_ok());
	}

	#[test]
	fn test_zero_one_recovery_byte_accepted() {
		let signer = PrivateKeySigner::random();
		let sig = personal_sign(&signer, b"task-003", 0);

		let expected = address_of(&signer).to_uppercase().replace("0X", "0x");
		assert!(verify_personal_sign(b"task-003", &sig, &expected).is_ok());
	}

	#[test]
	fn test_wrong_signer_is_mismatch() {
		let signer = PrivateKeySigner::random();
		let other = PrivateKeySigner::random();
		let sig = personal_sign(&signer, b"task-002", 27);

		let err = verify_personal_sign(b"task-002", &sig, &address_of(&other)).unwrap_err();
		assert_eq!(
			err,
			AccountError::SignerMismatch {
				recovered: address_of(&signer),
				expected: address_of(&other),
			}
		);
	}

	#[test]
	fn test_tampered_message_does_not_verify() {
		let signer = PrivateKeySigner::random();
		let sig = personal_sign(&signer, b"task-004", 27);

		assert!(verify_personal_sign(b"task-005", &sig, &address_of(&signer)).is_err());
	}

	#[test]
	fn test_altered_signature_bytes_rejected() {
		let signer = PrivateKeySigner::random();
		let sig = personal_sign(&signer, b"task-008", 27);
		let raw = hex::decode(sig.trim_start_matches("0x")).unwrap();

		// r, s, and the recovery byte toggled between 27 and 28
		for (index, mask) in [(0usize, 0x01u8), (31, 0x80), (40, 0x01), (63, 0x01), (64, 0x07)] {
			let mut altered = raw.clone();
			altered[index] ^= mask;
			let altered = format!("0x{}", hex::encode(&altered));

			let result = verify_personal_sign(b"task-008", &altered, &address_of(&signer));
			assert!(
				matches!(
					result,
					Err(AccountError::SignerMismatch { .. }) | Err(AccountError::InvalidSignature(_))
				),
				"byte {} altered: {:?}",
				index,
				result
			);
		}

		let mut bad_v = raw.clone();
		bad_v[64] = 29;
		assert!(matches!(
			verify_personal_sign(b"task-008", &format!("0x{}", hex::encode(&bad_v)), &address_of(&signer)),
			Err(AccountError::InvalidSignature(_))
		));
	}

	#[test]
	fn test_malformed_signatures_are_invalid() {
		let hash = keccak256(b"task-006");
		let short = format!("0x{}", "ab".repeat(64));
		let long = format!("0x{}", "ab".repeat(66));

		for sig in ["0x1234", "not-hex", short.as_str(), long.as_str()] {
			assert!(matches!(
				recover_personal_sign(&hash, sig),
				Err(AccountError::InvalidSignature(_))
			));
		}

		let bad_v = format!("0x{}{}", "11".repeat(64), "1d");
		assert!(matches!(
			recover_personal_sign(&hash, &bad_v),
			Err(AccountError::InvalidSignature(_))
		));
	}

	#[test]
	fn test_uppercase_prefix_accepted() {
		let signer = PrivateKeySigner::random();
		let sig = personal_sign(&signer, b"task-007", 27).replacen("0x", "0X", 1);

		assert!(verify_personal_sign(b"task-007", &sig, &address_of(&signer)).is_ok());
	}
}
