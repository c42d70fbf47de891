//! Content-addressed identity for transactions.
//!
//! Two fetches of the same physical transaction must hash identically even
//! when the provider resubmits it with a different second, a new reference
//! number, or a date stamped onto the description.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::models::{parse_timestamp, round_amount, NormalizedTransaction};
use crate::normalize::{clean_description, strip_reference_suffixes};

static LEADING_DATE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:\d{4}-\d{2}-\d{2}(?:[T ]\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+-]\d{2}:?\d{2})?)?|\d{1,2}[-/.]\d{1,2}[-/.]\d{2,4}|\d{1,2}:\d{2}(?::\d{2})?(?:\s*[AP]M)?)[\s,;/\-]*",
    )
    .expect("invalid leading date/time pattern")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("invalid whitespace pattern"));

/// A normalized transaction paired with its dedup hash.
#[derive(Debug, Clone, PartialEq)]
pub struct HashedTransaction {
    pub hash: String,
    pub transaction: NormalizedTransaction,
}

/// Description reduced to the part that identifies the counterparty.
pub fn description_fingerprint(raw_description: &str) -> String {
    let mut text = raw_description.trim().to_string();
    loop {
        let stripped = LEADING_DATE_TIME.replace(&text, "");
        if stripped.len() == text.len() {
            break;
        }
        text = stripped.into_owned();
    }

    let cleaned = clean_description(&text).to_lowercase();
    let cleaned = strip_reference_suffixes(&cleaned);
    WHITESPACE.replace_all(cleaned.trim(), " ").into_owned()
}

/// Posted time truncated to the minute, in UTC. Unparseable input is used
/// verbatim so it still hashes deterministically.
fn posted_minute(posted_at: &str) -> String {
    parse_timestamp(posted_at)
        .map(|ts| ts.format("%Y-%m-%dT%H:%M").to_string())
        .unwrap_or_else(|| posted_at.trim().to_string())
}

fn amount_key(amount: f64) -> String {
    round_amount(amount)
        .map(|value| value.to_string())
        .unwrap_or_else(|| amount.to_string())
}

/// The string fed to SHA-256: `account|minute|amount|fingerprint`.
pub fn hash_input(tx: &NormalizedTransaction) -> String {
    format!(
        "{}|{}|{}|{}",
        tx.account_ref.trim().to_lowercase(),
        posted_minute(&tx.posted_at),
        amount_key(tx.amount),
        description_fingerprint(&tx.raw_description),
    )
}

/// Hex-encoded SHA-256 of [`hash_input`].
pub fn dedup_hash(tx: &NormalizedTransaction) -> String {
    let mut hasher = Sha256::new();
    hasher.update(hash_input(tx).as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash every transaction and drop repeats, keeping the first occurrence.
pub fn dedupe_batch(batch: Vec<NormalizedTransaction>) -> Vec<HashedTransaction> {
    let mut seen = HashSet::with_capacity(batch.len());
    batch
        .into_iter()
        .filter_map(|transaction| {
            let hash = dedup_hash(&transaction);
            seen.insert(hash.clone())
                .then_some(HashedTransaction { hash, transaction })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, RawTransaction, TransactionType};
    use crate::normalize::normalize;

    fn tx(description: &str, posted_at: &str, amount: f64) -> NormalizedTransaction {
        normalize(&RawTransaction {
            description: description.to_string(),
            amount,
            currency: "INR".to_string(),
            txn_type: TransactionType::Debit,
            posted_at: posted_at.to_string(),
            value_date: None,
            balance: None,
            account_ref: "XXXX1189".to_string(),
            metadata: Metadata::new(),
        })
    }

    #[test]
    fn fingerprint_drops_leading_dates_and_reference_suffixes() {
        assert_eq!(
            description_fingerprint("05/01/2024 10:42 UPI/Swiggy@ybl/ORDER 5521"),
            "swiggy@ybl"
        );
        assert_eq!(
            description_fingerprint("2024-01-05T10:42:11Z  Uber India REF NO 1 RIDE 22"),
            "uber india"
        );
        assert_eq!(description_fingerprint("Blue Tokai Cafe"), "blue tokai cafe");
    }

    #[test]
    fn sub_minute_jitter_and_reference_numbers_do_not_change_hash() {
        let first = tx("UPI/swiggy@ybl/ORDER 1111", "2024-01-05T10:42:03Z", 349.0);
        let resent = tx("UPI/swiggy@ybl/ORDER 2222", "2024-01-05T16:12:58+05:30", 349.0);
        assert_eq!(dedup_hash(&first), dedup_hash(&resent));
    }

    #[test]
    fn reference_numbers_before_trailing_punctuation_do_not_change_hash() {
        let first = tx("UBER RIDE 1234.", "2024-01-05T10:00:00Z", 212.0);
        let resent = tx("UBER RIDE 5678.", "2024-01-05T10:00:20Z", 212.0);
        assert_eq!(description_fingerprint("UBER RIDE 1234."), "uber");
        assert_eq!(dedup_hash(&first), dedup_hash(&resent));
    }

    #[test]
    fn amount_rounds_to_cents() {
        let base = tx("Blue Tokai Cafe", "2024-01-05T10:42:00Z", 240.5);
        let float_noise = tx("Blue Tokai Cafe", "2024-01-05T10:42:00Z", 240.500_000_01);
        let next_cent = tx("Blue Tokai Cafe", "2024-01-05T10:42:00Z", 240.51);
        assert_eq!(dedup_hash(&base), dedup_hash(&float_noise));
        assert_ne!(dedup_hash(&base), dedup_hash(&next_cent));
        assert!(hash_input(&base).contains("|240.50|"));
    }

    #[test]
    fn different_minute_or_account_changes_hash() {
        let base = tx("Blue Tokai Cafe", "2024-01-05T10:42:00Z", 240.5);
        let later = tx("Blue Tokai Cafe", "2024-01-05T10:43:00Z", 240.5);
        let mut other_account = base.clone();
        other_account.account_ref = "XXXX2200".to_string();
        assert_ne!(dedup_hash(&base), dedup_hash(&later));
        assert_ne!(dedup_hash(&base), dedup_hash(&other_account));
    }

    #[test]
    fn date_only_timestamps_hash_at_midnight() {
        let dated = tx("Rent", "2024-01-05", 15_000.0);
        assert!(hash_input(&dated).starts_with("xxxx1189|2024-01-05T00:00|15000.00|"));
    }

    #[test]
    fn batch_dedup_keeps_first_and_is_idempotent() {
        let batch = vec![
            tx("UPI/swiggy@ybl/ORDER 1", "2024-01-05T10:42:03Z", 349.0),
            tx("Blue Tokai Cafe", "2024-01-05T11:00:00Z", 240.5),
            tx("UPI/swiggy@ybl/ORDER 2", "2024-01-05T10:42:40Z", 349.0),
        ];
        let once = dedupe_batch(batch);
        assert_eq!(once.len(), 2);
        assert_eq!(once[0].transaction.raw_description, "UPI/swiggy@ybl/ORDER 1");

        let twice = dedupe_batch(once.iter().map(|h| h.transaction.clone()).collect());
        assert_eq!(twice, once);
    }
}
