mod category_override;
mod consent;
mod id;
mod id_generator;
mod session;
mod transaction;

pub use category_override::{CategoryOverride, OverrideMatcher};
pub use consent::{Consent, ConsentRequest, ConsentStatus, DateRange, FetchFrequency};
pub use id::Id;
pub use id_generator::{IdGenerator, SequentialIdGenerator, UuidIdGenerator};
pub use session::{DataSession, SessionStatus};
pub use transaction::{
    parse_timestamp, round_amount, Metadata, NormalizedTransaction, Provenance, RawTransaction,
    Transaction, TransactionSource, TransactionType,
};
