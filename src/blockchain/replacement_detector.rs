use crate::error::ValidationError;
use crate::models::{Block, ChainTransaction, MonitorIntent};

/// How a transaction in a scanned block relates to the tracked intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Competitor {
    /// Different sender or nonce, or the intent is not resolved yet
    Unrelated,
    /// The hash currently being tracked
    Tracked,
    /// Same sender, nonce and calldata with a strictly higher fee
    SpeedUp,
    /// Same sender, nonce and calldata but the fee does not exceed the tracked one
    NotHigherFee,
    /// Same sender and nonce with different calldata (cancel or replace).
    /// Never adopted.
    CalldataChanged,
}

/// Classify `tx` against the intent being tracked
pub fn classify(intent: &MonitorIntent, tx: &ChainTransaction) -> Competitor {
    let (Some(nonce), Some(fee), Some(data)) = (intent.nonce, intent.fee_price, intent.data.as_deref())
    else {
        return Competitor::Unrelated;
    };

    if !same_hex(&tx.from, &intent.sender) || tx.nonce != nonce {
        return Competitor::Unrelated;
    }

    if same_hex(&tx.hash, &intent.hash) {
        return Competitor::Tracked;
    }

    if !same_hex(&tx.input, data) {
        return Competitor::CalldataChanged;
    }

    if tx.fee > fee {
        Competitor::SpeedUp
    } else {
        Competitor::NotHigherFee
    }
}

/// Whether `tx` should replace the tracked transaction
pub fn is_replacement_candidate(intent: &MonitorIntent, tx: &ChainTransaction) -> bool {
    classify(intent, tx) == Competitor::SpeedUp
}

/// First replacement candidate in block order, if any
pub fn find_replacement<'a>(intent: &MonitorIntent, block: &'a Block) -> Option<&'a ChainTransaction> {
    block
        .transactions
        .iter()
        .find(|tx| is_replacement_candidate(intent, tx))
}

/// Same-nonce transactions with changed calldata, reported but never adopted
pub fn calldata_changed_competitors<'a>(
    intent: &'a MonitorIntent,
    block: &'a Block,
) -> impl Iterator<Item = &'a ChainTransaction> + 'a {
    block
        .transactions
        .iter()
        .filter(move |tx| classify(intent, tx) == Competitor::CalldataChanged)
}

/// Normalize a hex string to lowercase with a `0x` prefix
pub fn normalize_hex(value: &str) -> String {
    format!("0x{}", hex_digits(value).to_lowercase())
}

/// Case- and prefix-insensitive hex comparison
pub fn same_hex(a: &str, b: &str) -> bool {
    normalize_hex(a) == normalize_hex(b)
}

fn hex_digits(value: &str) -> &str {
    let trimmed = value.trim();
    trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
}

/// Validate that an address is a 20-byte hex string
pub fn validate_address(address: &str) -> Result<(), ValidationError> {
    let digits = hex_digits(address);

    if digits.len() != 40 {
        return Err(ValidationError::InvalidAddress(format!(
            "Address must be 40 hex characters long, got {}",
            digits.len()
        )));
    }

    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidAddress(
            "Address contains non-hexadecimal characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate that a transaction hash is a 32-byte hex string
pub fn validate_transaction_hash(hash: &str) -> Result<(), ValidationError> {
    let digits = hex_digits(hash);

    if digits.len() != 64 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidTransactionHash(hash.to_string()));
    }

    Ok(())
}

/// Validate calldata: whole bytes of hex, `0x` alone for plain transfers
pub fn validate_calldata(data: &str) -> Result<(), ValidationError> {
    let digits = hex_digits(data);

    if digits.len() % 2 != 0 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidCalldata(data.to_string()));
    }

    Ok(())
}
