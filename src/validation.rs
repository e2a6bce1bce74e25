use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid address format: {0}")]
    InvalidAddress(String),
}

/// Human-readable parts of the segwit networks we serve.
const BECH32_PREFIXES: &[&str] = &["bc", "tb", "bcrt", "ltc", "tltc"];
const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Legacy address: version byte, 20-byte hash, 4-byte checksum.
const BASE58_ADDRESS_LEN: usize = 25;

pub fn validate_address(address: &str) -> Result<(), ValidationError> {
    if address.trim().is_empty() {
        return Err(ValidationError::MissingParameter("address".to_string()));
    }

    if is_bech32_shaped(address) || is_base58_shaped(address) {
        Ok(())
    } else {
        Err(ValidationError::InvalidAddress(address.to_string()))
    }
}

fn is_base58_shaped(address: &str) -> bool {
    match bs58::decode(address).into_vec() {
        Ok(bytes) => bytes.len() == BASE58_ADDRESS_LEN,
        Err(_) => false,
    }
}

fn is_bech32_shaped(address: &str) -> bool {
    // Mixed case is invalid bech32
    let lower = address.to_ascii_lowercase();
    if address != lower && address != address.to_ascii_uppercase() {
        return false;
    }
    if lower.len() > 90 {
        return false;
    }

    let Some((hrp, data)) = lower.rsplit_once('1') else {
        return false;
    };

    BECH32_PREFIXES.contains(&hrp)
        && data.len() >= 8
        && data.chars().all(|c| BECH32_CHARSET.contains(c))
}
