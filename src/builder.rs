//! Construction of unsigned native-asset transfers.
//!
//! Pure functions: given sender, recipient, amount, and fresh chain
//! reference data, they produce an [`UnsignedTransfer`] for the external
//! signer. No network access and no side effects happen here.

use crate::errors::{PaymentError, Result};
use crate::types::{BlockhashInfo, UnsignedTransfer, LAMPORTS_PER_SOL};

/// Byte length of a decoded account key.
const ACCOUNT_KEY_LEN: usize = 32;

/// Validates a base58 account address.
///
/// The decoded key must be exactly 32 bytes.
///
/// # Examples
///
/// ```
/// use payrail::builder::validate_address;
///
/// assert!(validate_address("11111111111111111111111111111111").is_ok());
/// assert!(validate_address("not-an-address").is_err());
/// ```
pub fn validate_address(address: &str) -> Result<()> {
    let decoded = bs58::decode(address)
        .into_vec()
        .map_err(|e| PaymentError::InvalidRecipient(format!("{}: {}", address, e)))?;

    if decoded.len() != ACCOUNT_KEY_LEN {
        return Err(PaymentError::InvalidRecipient(format!(
            "{}: decoded to {} bytes, expected {}",
            address,
            decoded.len(),
            ACCOUNT_KEY_LEN
        )));
    }

    Ok(())
}

/// Converts a native amount to lamports, flooring to the smallest unit.
pub fn native_to_lamports(native_amount: f64) -> u64 {
    (native_amount * LAMPORTS_PER_SOL as f64).floor() as u64
}

/// Builds an unsigned transfer anchored to the given chain reference data.
///
/// Deterministic for fixed inputs. The transfer becomes invalid once the
/// chain passes `reference.last_valid_block_height`; it must then be rebuilt
/// with fresh data, never resubmitted.
///
/// # Errors
///
/// * [`PaymentError::InvalidRecipient`] when the recipient fails address validation
/// * [`PaymentError::ConfigError`] when the sender fails address validation
/// * [`PaymentError::InvalidAmount`] when the amount floors to zero lamports
pub fn build_transfer(
    sender: &str,
    recipient: &str,
    native_amount: f64,
    reference: &BlockhashInfo,
) -> Result<UnsignedTransfer> {
    validate_address(recipient)?;

    validate_address(sender).map_err(|_| {
        PaymentError::ConfigError(format!("sender account {} is not a valid address", sender))
    })?;

    let lamports = native_to_lamports(native_amount);
    if lamports == 0 {
        return Err(PaymentError::InvalidAmount(format!(
            "{} native units floors to zero lamports",
            native_amount
        )));
    }

    Ok(UnsignedTransfer {
        sender: sender.to_string(),
        recipient: recipient.to_string(),
        lamports,
        recent_blockhash: reference.blockhash.clone(),
        last_valid_block_height: reference.last_valid_block_height,
        fee_payer: sender.to_string(),
    })
}
