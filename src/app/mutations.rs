use anyhow::Result;

use crate::ingest::{IngestError, IngestionService};
use crate::models::Id;

use super::{user_id, OverrideOutput};

pub async fn add_override(
    service: &IngestionService,
    user: &str,
    pattern: &str,
    category: &str,
    subcategory: Option<&str>,
) -> Result<OverrideOutput> {
    let rule = service
        .add_category_override(&user_id(user), pattern, category, subcategory)
        .await?;
    Ok(OverrideOutput::from(&rule))
}

pub async fn list_overrides(service: &IngestionService, user: &str) -> Result<Vec<OverrideOutput>> {
    let rules = service
        .list_category_overrides(&user_id(user))
        .await?;
    Ok(rules.iter().map(OverrideOutput::from).collect())
}

pub async fn remove_override(
    service: &IngestionService,
    user: &str,
    id: &str,
) -> Result<serde_json::Value> {
    let user = user_id(user);
    match service
        .remove_category_override(&user, &Id::from_string(id))
        .await
    {
        Ok(()) => Ok(serde_json::json!({
            "success": true,
            "id": id
        })),
        Err(IngestError::NotFound { .. }) => Ok(serde_json::json!({
            "success": false,
            "error": "Category override not found",
            "id": id
        })),
        Err(err) => Err(err.into()),
    }
}
