use anyhow::Result;

use crate::config::ResolvedConfig;
use crate::dedup::{dedup_hash, hash_input};
use crate::models::{Metadata, RawTransaction, TransactionType};
use crate::normalize::normalize;
use crate::webhook::WebhookVerifier;

use super::NormalizeOutput;

/// A single record as typed on the command line.
#[derive(Debug, Clone)]
pub struct NormalizeArgs {
    pub description: String,
    pub amount: f64,
    pub currency: String,
    pub txn_type: TransactionType,
    pub posted_at: String,
    pub account_ref: String,
}

pub fn normalize_output(args: NormalizeArgs) -> NormalizeOutput {
    let raw = RawTransaction {
        description: args.description,
        amount: args.amount,
        currency: args.currency,
        txn_type: args.txn_type,
        posted_at: args.posted_at,
        value_date: None,
        balance: None,
        account_ref: args.account_ref,
        metadata: Metadata::new(),
    };
    let normalized = normalize(&raw);
    NormalizeOutput {
        hash_input: hash_input(&normalized),
        dedup_hash: dedup_hash(&normalized),
        normalized,
    }
}

/// Signature the provider would send for `body`, using the configured secret.
pub fn sign_body(config: &ResolvedConfig, body: &str) -> Result<serde_json::Value> {
    let verifier = WebhookVerifier::new(config.config.webhook.secret()?);
    let signature = verifier.sign(body.as_bytes())?;
    Ok(serde_json::json!({
        "signature": signature,
        "header": format!("sha256={signature}")
    }))
}
