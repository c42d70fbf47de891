use chrono::{Datelike, FixedOffset, NaiveDate, TimeZone};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::models::{Metadata, RawTransaction, TransactionType};

/// Synthetic statements are issued in IST, like most Indian AA feeds.
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

struct Template {
    /// `{ref}` is replaced with a per-delivery reference number.
    description: &'static str,
    min: f64,
    max: f64,
    txn_type: TransactionType,
    channel: &'static str,
}

const DAILY_TEMPLATES: &[Template] = &[
    Template {
        description: "UPI/swiggy@ybl/ORDER {ref}",
        min: 150.0,
        max: 900.0,
        txn_type: TransactionType::Debit,
        channel: "UPI",
    },
    Template {
        description: "UPI/zomato@hdfcbank/ORDER {ref}",
        min: 180.0,
        max: 1200.0,
        txn_type: TransactionType::Debit,
        channel: "UPI",
    },
    Template {
        description: "UPI/uber@axisbank/RIDE {ref}",
        min: 90.0,
        max: 650.0,
        txn_type: TransactionType::Debit,
        channel: "UPI",
    },
    Template {
        description: "UPI/bigbasket@icici/PAYMENT {ref}",
        min: 300.0,
        max: 3200.0,
        txn_type: TransactionType::Debit,
        channel: "UPI",
    },
    Template {
        description: "POS AMAZON PAY INDIA REF {ref}",
        min: 200.0,
        max: 5000.0,
        txn_type: TransactionType::Debit,
        channel: "CARD",
    },
    Template {
        description: "NEFT/APOLLO PHARMACY REF {ref}",
        min: 120.0,
        max: 2400.0,
        txn_type: TransactionType::Debit,
        channel: "NEFT",
    },
    Template {
        description: "BESCOM ELECTRICITY BILL PAYMENT {ref}",
        min: 600.0,
        max: 2800.0,
        txn_type: TransactionType::Debit,
        channel: "BILLPAY",
    },
    Template {
        description: "UPI/ramesh.k@okaxis/REF {ref}",
        min: 100.0,
        max: 4000.0,
        txn_type: TransactionType::Debit,
        channel: "UPI",
    },
    Template {
        description: "ATM CASH WDL REF {ref}",
        min: 500.0,
        max: 10_000.0,
        txn_type: TransactionType::Debit,
        channel: "ATM",
    },
    Template {
        description: "Blue Tokai Cafe ORDER {ref}",
        min: 220.0,
        max: 780.0,
        txn_type: TransactionType::Debit,
        channel: "CARD",
    },
];

const SALARY: Template = Template {
    description: "NEFT/ACME TECHNOLOGIES SALARY REF {ref}",
    min: 85_000.0,
    max: 85_000.0,
    txn_type: TransactionType::Credit,
    channel: "NEFT",
};

/// One physical transaction: everything except what a provider changes on
/// each delivery (seconds, reference numbers).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlannedTransaction {
    pub date: NaiveDate,
    pub hour: u32,
    pub minute: u32,
    pub description: &'static str,
    pub amount: f64,
    pub balance: f64,
    pub txn_type: TransactionType,
    pub channel: &'static str,
}

/// Seeded, date-bounded statement generator.
///
/// The planned transactions for a day are a pure function of
/// `(seed, customer, day)`, so overlapping ranges reproduce the same
/// physical transactions.
#[derive(Debug, Clone)]
pub struct TransactionGenerator {
    seed: u64,
}

impl TransactionGenerator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn rng_for(&self, parts: &[&str]) -> StdRng {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        for part in parts {
            hasher.update(b"|");
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        StdRng::seed_from_u64(u64::from_le_bytes(bytes))
    }

    /// Masked account number for a customer, e.g. `4021****1189`.
    pub fn account_ref(&self, customer_id: &str) -> String {
        let mut rng = self.rng_for(&["account", customer_id]);
        format!(
            "{:04}****{:04}",
            rng.gen_range(1000..10_000),
            rng.gen_range(0..10_000)
        )
    }

    pub(crate) fn plan_day(&self, customer_id: &str, date: NaiveDate) -> Vec<PlannedTransaction> {
        let day_key = date.to_string();
        let mut rng = self.rng_for(&["day", customer_id, &day_key]);

        let mut templates: Vec<&Template> = Vec::new();
        if date.day() == 1 {
            templates.push(&SALARY);
        }
        let count = rng.gen_range(1..=4);
        for _ in 0..count {
            templates.push(&DAILY_TEMPLATES[rng.gen_range(0..DAILY_TEMPLATES.len())]);
        }

        let mut minutes: Vec<u32> = (0..templates.len())
            .map(|_| rng.gen_range(7 * 60..23 * 60))
            .collect();
        minutes.sort_unstable();

        let mut balance = round_cents(rng.gen_range(20_000.0..150_000.0));
        templates
            .into_iter()
            .zip(minutes)
            .map(|(template, minute_of_day)| {
                let amount = if template.channel == "ATM" {
                    (rng.gen_range(template.min..template.max) / 100.0).round() * 100.0
                } else if template.min == template.max {
                    template.min
                } else {
                    round_cents(rng.gen_range(template.min..template.max))
                };
                balance = match template.txn_type {
                    TransactionType::Debit => round_cents(balance - amount),
                    TransactionType::Credit => round_cents(balance + amount),
                };
                PlannedTransaction {
                    date,
                    hour: minute_of_day / 60,
                    minute: minute_of_day % 60,
                    description: template.description,
                    amount,
                    balance,
                    txn_type: template.txn_type,
                    channel: template.channel,
                }
            })
            .collect()
    }

    /// Render the transactions for `days` as one provider delivery. `salt`
    /// drives the per-delivery seconds and reference numbers.
    pub fn deliver(
        &self,
        customer_id: &str,
        days: impl IntoIterator<Item = NaiveDate>,
        salt: u64,
    ) -> Vec<RawTransaction> {
        let account_ref = self.account_ref(customer_id);
        let mut delivery_rng = StdRng::seed_from_u64(salt);
        let Some(ist) = FixedOffset::east_opt(IST_OFFSET_SECS) else {
            return Vec::new();
        };

        days.into_iter()
            .flat_map(|date| self.plan_day(customer_id, date))
            .filter_map(|planned| {
                let second = delivery_rng.gen_range(0..60);
                let reference: u64 = delivery_rng.gen_range(100_000_000..1_000_000_000);
                let posted = planned
                    .date
                    .and_hms_opt(planned.hour, planned.minute, second)
                    .and_then(|naive| ist.from_local_datetime(&naive).single())?;

                let mut metadata = Metadata::new();
                metadata.insert("channel".to_string(), planned.channel.into());
                metadata.insert("reference".to_string(), reference.to_string().into());

                Some(RawTransaction {
                    description: planned.description.replace("{ref}", &reference.to_string()),
                    amount: planned.amount,
                    currency: "INR".to_string(),
                    txn_type: planned.txn_type,
                    posted_at: posted.to_rfc3339(),
                    value_date: Some(planned.date.to_string()),
                    balance: Some(planned.balance),
                    account_ref: account_ref.clone(),
                    metadata,
                })
            })
            .collect()
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
