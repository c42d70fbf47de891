//! Raw provider records to canonical transactions.
//!
//! Everything here is pure: the same [`RawTransaction`] always produces the
//! same [`NormalizedTransaction`]. User category overrides are a separate pass
//! (see [`overrides`]) applied when transactions are read back.

pub mod overrides;
mod rules;

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{NormalizedTransaction, RawTransaction};

use rules::{CATEGORY_KEYWORDS, CUES, MERCHANT_KEYWORDS, UNCATEGORIZED, UNKNOWN_MERCHANT};

pub use overrides::{apply_overrides, find_override, Categorizable};

static RAIL_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:UPI|NEFT|IMPS)\s*/\s*").expect("invalid rail prefix"));

static REFERENCE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)[\s/:\-]*\b(?:REFERENCE|REF|ORDER|PAYMENT|RIDE|TXN)\s*(?:NO\.?|ID|#)?\s*[:#\-]?\s*\d+[\s.\-]*$",
    )
    .expect("invalid reference suffix")
});

static DISALLOWED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9@.\- ]").expect("invalid charset"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("invalid whitespace"));

static PAYMENT_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z0-9.\-_]+)@([A-Za-z]+)").expect("invalid payment address")
});

static MASKED_ACCOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}\*{4}\d{4}").expect("invalid masked account"));

/// Map a provider record onto the canonical shape.
pub fn normalize(raw: &RawTransaction) -> NormalizedTransaction {
    let inference = infer_merchant(&raw.description);
    let category = match inference.merchant.as_str() {
        UNKNOWN_MERCHANT => infer_category(&raw.description),
        merchant => merchant.to_string(),
    };

    NormalizedTransaction {
        description: clean_description(&raw.description),
        raw_description: raw.description.clone(),
        merchant: inference.merchant,
        category,
        subcategory: inference.subcategory,
        account_ref: resolve_account_ref(&raw.account_ref, &raw.description),
        amount: raw.amount,
        currency: raw.currency.clone(),
        txn_type: raw.txn_type,
        posted_at: raw.posted_at.clone(),
        value_date: raw.value_date.clone(),
        balance: raw.balance,
        metadata: raw.metadata.clone(),
    }
}

/// Uppercase, strip payment-rail prefixes and trailing reference numbers,
/// drop punctuation outside `[A-Za-z0-9@.- ]` and collapse whitespace.
///
/// ```
/// use bankfeed::normalize::clean_description;
///
/// assert_eq!(clean_description("upi/swiggy@ybl/Order 99812"), "SWIGGY@YBL");
/// assert_eq!(clean_description("  NEFT/ACME  PAYROLL* "), "ACME PAYROLL");
/// ```
pub fn clean_description(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    let mut text = RAIL_PREFIX.replace(&upper, "").into_owned();
    text = strip_reference_suffixes(&text);
    let text = text.replace('/', " ");
    let text = DISALLOWED_CHARS.replace_all(&text, "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Remove trailing "REF 123" / "ORDER NO 456" style suffixes until none remain.
pub(crate) fn strip_reference_suffixes(text: &str) -> String {
    let mut current = text.trim_end().to_string();
    loop {
        let stripped = REFERENCE_SUFFIX.replace(&current, "");
        if stripped.len() == current.len() {
            return current;
        }
        current = stripped.trim_end().to_string();
    }
}

struct MerchantInference {
    merchant: String,
    subcategory: Option<String>,
}

fn infer_merchant(raw_description: &str) -> MerchantInference {
    let lower = raw_description.to_lowercase();

    if let Some((keyword, label)) = MERCHANT_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
    {
        return MerchantInference {
            merchant: (*label).to_string(),
            subcategory: Some(title_case(keyword)),
        };
    }

    if let Some(captures) = PAYMENT_ADDRESS.captures(raw_description) {
        let local_part = captures.get(1).map_or("", |m| m.as_str());
        let merchant = title_case(local_part);
        if !merchant.is_empty() {
            return MerchantInference {
                merchant,
                subcategory: None,
            };
        }
    }

    if let Some((_, label, subcategory)) = CUES
        .iter()
        .find(|(cues, _, _)| cues.iter().any(|cue| contains_word(&lower, cue)))
    {
        return MerchantInference {
            merchant: (*label).to_string(),
            subcategory: Some((*subcategory).to_string()),
        };
    }

    MerchantInference {
        merchant: UNKNOWN_MERCHANT.to_string(),
        subcategory: None,
    }
}

fn infer_category(raw_description: &str) -> String {
    let lower = raw_description.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| lower.contains(keyword)))
        .map_or(UNCATEGORIZED, |(category, _)| *category)
        .to_string()
}

/// `needle` occurs in `haystack` with no letter or digit directly on
/// either side.
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Provider reference if present, else a payment address or masked account
/// number found in the description, else empty.
pub fn resolve_account_ref(provider_ref: &str, raw_description: &str) -> String {
    let provider_ref = provider_ref.trim();
    if !provider_ref.is_empty() {
        return provider_ref.to_string();
    }
    if let Some(address) = PAYMENT_ADDRESS.find(raw_description) {
        return address.as_str().to_lowercase();
    }
    MASKED_ACCOUNT
        .find(raw_description)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// "ramesh.k_22" -> "Ramesh K 22"
fn title_case(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, TransactionType};

    fn raw(description: &str, account_ref: &str) -> RawTransaction {
        RawTransaction {
            description: description.to_string(),
            amount: 349.0,
            currency: "INR".to_string(),
            txn_type: TransactionType::Debit,
            posted_at: "2024-01-03T12:41:09+05:30".to_string(),
            value_date: None,
            balance: Some(10_250.75),
            account_ref: account_ref.to_string(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn cleaning_strips_rails_suffixes_and_punctuation() {
        assert_eq!(
            clean_description("UPI/ZOMATO@HDFC/Payment ID: 4471"),
            "ZOMATO@HDFC"
        );
        assert_eq!(
            clean_description("IMPS/Rent to landlord REF NO 1 REF 2"),
            "RENT TO LANDLORD"
        );
        assert_eq!(clean_description("Uber   ride #9  "), "UBER");
        assert_eq!(clean_description("Uber trip 9"), "UBER TRIP 9");
        assert_eq!(clean_description("UBER RIDE 1234."), "UBER");
        assert_eq!(clean_description("Zomato order 88 - "), "ZOMATO");
        assert_eq!(
            clean_description("POS 4021****1189 D-MART, (PUNE)"),
            "POS 40211189 D-MART PUNE"
        );
    }

    #[test]
    fn keyword_merchant_sets_category_and_subcategory() {
        let normalized = normalize(&raw("UPI/swiggy@ybl/ORDER 1234", ""));
        assert_eq!(normalized.merchant, "Food Delivery");
        assert_eq!(normalized.category, "Food Delivery");
        assert_eq!(normalized.subcategory.as_deref(), Some("Swiggy"));
        assert_eq!(normalized.account_ref, "swiggy@ybl");
        assert_eq!(normalized.description, "SWIGGY@YBL");
        assert_eq!(normalized.raw_description, "UPI/swiggy@ybl/ORDER 1234");
    }

    #[test]
    fn payment_address_local_part_names_the_merchant() {
        let normalized = normalize(&raw("UPI/ramesh.k@okaxis/groceries", ""));
        assert_eq!(normalized.merchant, "Ramesh K");
        assert_eq!(normalized.category, "Ramesh K");
        assert_eq!(normalized.subcategory, None);
    }

    #[test]
    fn cues_then_category_rules_then_uncategorized() {
        let atm = normalize(&raw("ATM CASH WDL 4021****1189", ""));
        assert_eq!(atm.merchant, "Cash Withdrawal");
        assert_eq!(atm.subcategory.as_deref(), Some("ATM"));
        assert_eq!(atm.account_ref, "4021****1189");

        let salary = normalize(&raw("NEFT/ACME CORP SALARY JAN", "XX1189"));
        assert_eq!(salary.category, "Income");
        assert_eq!(salary.account_ref, "XX1189");

        let cafe = normalize(&raw("Blue Tokai Cafe", ""));
        assert_eq!(cafe.merchant, "Unknown");
        assert_eq!(cafe.category, "Food & Dining");

        let neft = normalize(&raw("NEFT/SOMEONE", ""));
        assert_eq!(neft.category, "Bank Transfer");

        let mystery = normalize(&raw("XYZ", ""));
        assert_eq!(mystery.merchant, "Unknown");
        assert_eq!(mystery.category, "Uncategorized");
        assert_eq!(mystery.account_ref, "");
    }

    #[test]
    fn cues_only_match_whole_words() {
        let clinic = normalize(&raw("TREATMENT CLINIC", ""));
        assert_eq!(clinic.merchant, "Unknown");
        assert_eq!(clinic.category, "Healthcare");

        let atm = normalize(&raw("NEFT/ATM-CASH 22", ""));
        assert_eq!(atm.merchant, "Cash Withdrawal");

        assert!(contains_word("int.pd q1", "int.pd"));
        assert!(!contains_word("treatment", "atm"));
        assert!(!contains_word("salaryman", "salary"));
    }

    #[test]
    fn raw_fields_carry_through_and_output_is_deterministic() {
        let input = raw("UPI/netflix@icici/REF 77", "acct-1");
        let a = normalize(&input);
        let b = normalize(&input);
        assert_eq!(a, b);
        assert_eq!(a.amount, input.amount);
        assert_eq!(a.balance, input.balance);
        assert_eq!(a.posted_at, input.posted_at);
        assert_eq!(a.account_ref, "acct-1");
    }
}
