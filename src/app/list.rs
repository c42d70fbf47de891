use anyhow::Result;
use chrono::NaiveDate;

use crate::ingest::IngestionService;
use crate::storage::TransactionQuery;

use super::{user_id, ConsentOutput, TransactionOutput};

pub async fn list_transactions(
    service: &IngestionService,
    user: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    limit: Option<usize>,
) -> Result<Vec<TransactionOutput>> {
    let user = user_id(user);
    let query = TransactionQuery {
        from,
        to,
        offset: 0,
        limit,
    };
    let transactions = service.list_transactions(&user, &query).await?;
    Ok(transactions.iter().map(TransactionOutput::from).collect())
}

pub async fn list_consents(service: &IngestionService, user: &str) -> Result<Vec<ConsentOutput>> {
    let consents = service.list_consents(&user_id(user)).await?;
    Ok(consents.iter().map(ConsentOutput::from).collect())
}
