use anyhow::Result;
use bankfeed::models::{
    CategoryOverride, Consent, ConsentStatus, DataSession, DateRange, FetchFrequency, Id,
    Metadata, OverrideMatcher, SessionStatus, Transaction, TransactionSource, TransactionType,
};
use bankfeed::storage::{DuplicateTransaction, JsonFileStorage, Storage, TransactionQuery};
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use tempfile::TempDir;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn consent(id: &str, user: &str, handle: &str) -> Consent {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    Consent {
        id: Id::from_string(id),
        user_id: Id::from_string(user),
        handle: handle.to_string(),
        fi_type: "DEPOSIT".to_string(),
        purpose: "Spending insights".to_string(),
        date_range: DateRange::new(day(1), day(31)).unwrap(),
        frequency: FetchFrequency::default(),
        status: ConsentStatus::Pending,
        redirect_url: format!("https://aa.example.com/consent/{handle}"),
        expires_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn transaction(user: &str, id: &str, hash: &str, d: u32) -> Transaction {
    Transaction {
        id: Id::from_string(id),
        user_id: Id::from_string(user),
        consent_id: Some(Id::from_string("c-1")),
        source: TransactionSource::Aggregator,
        dedup_hash: hash.to_string(),
        description: "ZOMATO@HDFCBANK".to_string(),
        raw_description: "UPI/zomato@hdfcbank/ORDER 7781".to_string(),
        merchant: "Food Delivery".to_string(),
        category: "Food Delivery".to_string(),
        subcategory: Some("Zomato".to_string()),
        account_ref: "zomato@hdfcbank".to_string(),
        amount: Decimal::new(41250, 2),
        currency: "INR".to_string(),
        txn_type: TransactionType::Debit,
        posted_at: Utc.with_ymd_and_hms(2024, 1, d, 14, 30, 0).unwrap(),
        value_date: Some(day(d)),
        balance: None,
        metadata: Metadata::new(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn consents_survive_reopening_and_resolve_by_handle() -> Result<()> {
    let dir = TempDir::new()?;
    let storage = JsonFileStorage::new(dir.path());
    storage.create_consent(&consent("c-1", "asha", "cns-a")).await?;
    storage.create_consent(&consent("c-2", "ravi", "cns-b")).await?;
    assert!(storage
        .create_consent(&consent("c-1", "asha", "cns-a"))
        .await
        .is_err());

    let updated_at = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    assert!(
        storage
            .update_consent_status(&Id::from_string("c-1"), ConsentStatus::Revoked, updated_at)
            .await?
    );
    assert!(
        !storage
            .update_consent_status(&Id::from_string("c-9"), ConsentStatus::Revoked, updated_at)
            .await?
    );

    let reopened = JsonFileStorage::new(dir.path());
    let found = reopened.get_consent_by_handle("cns-a").await?.unwrap();
    assert_eq!(found.status, ConsentStatus::Revoked);
    assert_eq!(found.updated_at, updated_at);
    assert_eq!(reopened.list_consents(&Id::from_string("ravi")).await?.len(), 1);
    assert!(reopened.get_consent_by_handle("cns-z").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn duplicate_hashes_are_rejected_across_instances() -> Result<()> {
    let dir = TempDir::new()?;
    JsonFileStorage::new(dir.path())
        .create_transaction(&transaction("asha", "t-1", "h-1", 3))
        .await?;

    let storage = JsonFileStorage::new(dir.path());
    let err = storage
        .create_transaction(&transaction("asha", "t-2", "h-1", 3))
        .await
        .unwrap_err();
    let duplicate = err.downcast_ref::<DuplicateTransaction>().unwrap();
    assert_eq!(duplicate.hash, "h-1");

    storage
        .create_transaction(&transaction("ravi", "t-3", "h-1", 3))
        .await?;
    Ok(())
}

#[tokio::test]
async fn hash_index_follows_writes_from_other_instances() -> Result<()> {
    let dir = TempDir::new()?;
    let first = JsonFileStorage::new(dir.path());
    let second = JsonFileStorage::new(dir.path());
    let asha = Id::from_string("asha");

    first
        .create_transaction(&transaction("asha", "t-1", "h-1", 3))
        .await?;
    second
        .create_transaction(&transaction("asha", "t-2", "h-2", 4))
        .await?;

    let err = first
        .create_transaction(&transaction("asha", "t-3", "h-2", 4))
        .await
        .unwrap_err();
    assert!(err.downcast_ref::<DuplicateTransaction>().is_some());

    assert_eq!(second.delete_user_transactions(&asha).await?, 2);
    first
        .create_transaction(&transaction("asha", "t-4", "h-1", 3))
        .await?;
    assert_eq!(first.recent_hashes(&asha, 10).await?, ["h-1"]);
    Ok(())
}

#[tokio::test]
async fn listing_filters_orders_and_pages() -> Result<()> {
    let dir = TempDir::new()?;
    let storage = JsonFileStorage::new(dir.path());
    let user = Id::from_string("asha");
    for (id, hash, d) in [("t-3", "h-3", 9), ("t-1", "h-1", 2), ("t-2", "h-2", 5)] {
        storage
            .create_transaction(&transaction("asha", id, hash, d))
            .await?;
    }

    let all = storage
        .list_transactions(&user, &TransactionQuery::default())
        .await?;
    let ids: Vec<&str> = all.iter().map(|tx| tx.id.as_str()).collect();
    assert_eq!(ids, ["t-1", "t-2", "t-3"]);

    let window = TransactionQuery {
        from: Some(day(3)),
        to: Some(day(9)),
        offset: 1,
        limit: Some(5),
    };
    let paged = storage.list_transactions(&user, &window).await?;
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].id.as_str(), "t-3");

    // Newest persisted first, regardless of posting date.
    assert_eq!(storage.recent_hashes(&user, 2).await?, ["h-2", "h-1"]);
    Ok(())
}

#[tokio::test]
async fn category_edits_and_deletes_rewrite_the_log() -> Result<()> {
    let dir = TempDir::new()?;
    let storage = JsonFileStorage::new(dir.path());
    let user = Id::from_string("asha");
    storage
        .create_transaction(&transaction("asha", "t-1", "h-1", 2))
        .await?;
    storage
        .create_transaction(&transaction("asha", "t-2", "h-2", 3))
        .await?;

    assert!(
        storage
            .update_transaction_category(&user, &Id::from_string("t-2"), "Dining Out", None)
            .await?
    );
    let edited = storage
        .get_transaction(&user, &Id::from_string("t-2"))
        .await?
        .unwrap();
    assert_eq!(edited.category, "Dining Out");
    assert_eq!(edited.subcategory, None);
    assert_eq!(edited.amount, Decimal::new(41250, 2));

    assert!(storage.delete_transaction(&user, &Id::from_string("t-1")).await?);
    assert!(storage.get_transaction_by_hash(&user, "h-1").await?.is_none());
    assert_eq!(storage.delete_user_transactions(&user).await?, 1);
    assert_eq!(storage.delete_user_transactions(&user).await?, 0);
    Ok(())
}

#[tokio::test]
async fn sessions_with_unsafe_ids_are_stored_safely() -> Result<()> {
    let dir = TempDir::new()?;
    let storage = JsonFileStorage::new(dir.path());
    let session = DataSession {
        session_id: "../../sessions/abc".to_string(),
        user_id: Id::from_string("asha"),
        consent_id: Id::from_string("c-1"),
        range: DateRange::new(day(1), day(7)).unwrap(),
        status: SessionStatus::Pending,
        created_at: Utc::now(),
        ingested_at: None,
    };
    storage.save_session(&session).await?;

    assert_eq!(storage.get_session("../../sessions/abc").await?, Some(session));
    assert!(storage.get_session("abc").await?.is_none());
    assert!(!dir.path().join("abc.json").exists());
    Ok(())
}

#[tokio::test]
async fn path_traversal_user_ids_are_rejected() {
    let dir = TempDir::new().unwrap();
    let storage = JsonFileStorage::new(dir.path());
    let err = storage
        .create_transaction(&transaction("../escape", "t-1", "h-1", 2))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not safe to use as a path segment"));
    assert!(storage
        .get_consent(&Id::from_string("../c-1"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn overrides_keep_user_order() -> Result<()> {
    let dir = TempDir::new()?;
    let storage = JsonFileStorage::new(dir.path());
    let user = Id::from_string("asha");
    for (id, pattern, category) in [("o-1", "landlord", "Housing"), ("o-2", "/^AMZN/", "Shopping")]
    {
        storage
            .create_override(&CategoryOverride {
                id: Id::from_string(id),
                user_id: user.clone(),
                matcher: OverrideMatcher::parse(pattern)?,
                category: category.to_string(),
                subcategory: None,
                created_at: Utc::now(),
            })
            .await?;
    }

    let mut first = storage
        .get_override(&user, &Id::from_string("o-1"))
        .await?
        .unwrap();
    first.category = "Rent".to_string();
    assert!(storage.update_override(&first).await?);

    let rules = JsonFileStorage::new(dir.path()).list_overrides(&user).await?;
    let categories: Vec<&str> = rules.iter().map(|r| r.category.as_str()).collect();
    assert_eq!(categories, ["Rent", "Shopping"]);
    assert!(matches!(rules[1].matcher, OverrideMatcher::Regex(_)));

    assert!(storage.delete_override(&user, &Id::from_string("o-1")).await?);
    assert!(!storage.delete_override(&user, &Id::from_string("o-1")).await?);
    assert_eq!(storage.list_overrides(&user).await?.len(), 1);
    Ok(())
}
