mod support;

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bankfeed::ingest::{FetchOutcome, IngestReport};
use bankfeed::models::{Id, TransactionSource};
use bankfeed::storage::{JsonFileStorage, TransactionQuery};
use support::{date, TestEnv};
use tempfile::TempDir;

fn ingested(outcome: FetchOutcome) -> IngestReport {
    match outcome {
        FetchOutcome::Ingested(report) => report,
        FetchOutcome::Pending { session_id, .. } => panic!("session {session_id} still pending"),
    }
}

async fn overlapping_fetches_store_each_transaction_once(env: TestEnv) -> Result<()> {
    let user = Id::from_string("asha");
    let consent = env.active_consent(&user).await;

    let first = ingested(
        env.service
            .fetch_transactions(&user, &consent.id, date(1, 1), date(1, 7))
            .await?,
    );
    assert!(!first.new.is_empty());

    let second = ingested(
        env.service
            .fetch_transactions(&user, &consent.id, date(1, 1), date(1, 10))
            .await?,
    );
    assert_eq!(second.duplicates, first.new.len());
    assert_eq!(second.failed, 0);
    for tx in &second.new {
        let day = tx.value_date.expect("synthetic records carry a value date");
        assert!(day >= date(1, 8) && day <= date(1, 10), "{day} re-ingested");
        assert_eq!(tx.source, TransactionSource::Aggregator);
        assert_eq!(tx.consent_id.as_ref(), Some(&consent.id));
    }

    let stored = env
        .service
        .list_transactions(&user, &TransactionQuery::default())
        .await?;
    assert_eq!(stored.len(), first.new.len() + second.new.len());
    let hashes: HashSet<&str> = stored.iter().map(|tx| tx.dedup_hash.as_str()).collect();
    assert_eq!(hashes.len(), stored.len());
    Ok(())
}

#[tokio::test]
async fn overlap_in_memory() -> Result<()> {
    overlapping_fetches_store_each_transaction_once(TestEnv::new(Duration::ZERO)).await
}

#[tokio::test]
async fn overlap_in_json_files() -> Result<()> {
    let dir = TempDir::new()?;
    let storage = Arc::new(JsonFileStorage::new(dir.path()));
    overlapping_fetches_store_each_transaction_once(TestEnv::with_storage(storage, Duration::ZERO))
        .await
}

#[tokio::test]
async fn repository_rejects_repeats_older_than_the_lookback() -> Result<()> {
    overlapping_fetches_store_each_transaction_once(
        TestEnv::new(Duration::ZERO).with_dedup_lookback(1),
    )
    .await
}

#[tokio::test]
async fn malformed_record_is_skipped_and_the_rest_persist() -> Result<()> {
    let (env, provider) = TestEnv::flaky(Duration::ZERO);
    let user = Id::from_string("asha");
    let consent = env.active_consent(&user).await;

    provider.corrupt_first_record.store(true, Ordering::SeqCst);
    let report = ingested(
        env.service
            .fetch_transactions(&user, &consent.id, date(1, 1), date(1, 3))
            .await?,
    );
    assert!(report.fetched > 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.duplicates, 0);
    assert_eq!(report.new.len(), report.unique - 1);

    let stored = env
        .service
        .list_transactions(&user, &TransactionQuery::default())
        .await?;
    assert_eq!(stored.len(), report.new.len());
    Ok(())
}

#[tokio::test]
async fn concurrent_fetches_do_not_double_insert() -> Result<()> {
    let env = TestEnv::new(Duration::ZERO);
    let user = Id::from_string("asha");
    let consent = env.active_consent(&user).await;

    let (a, b) = tokio::join!(
        env.service
            .fetch_transactions(&user, &consent.id, date(1, 1), date(1, 5)),
        env.service
            .fetch_transactions(&user, &consent.id, date(1, 1), date(1, 5)),
    );
    let (a, b) = (ingested(a?), ingested(b?));
    assert_eq!(a.new.len() + b.new.len(), a.unique);
    assert_eq!(a.duplicates + b.duplicates, a.unique);

    let stored = env
        .service
        .list_transactions(&user, &TransactionQuery::default())
        .await?;
    assert_eq!(stored.len(), a.unique);
    Ok(())
}

#[tokio::test]
async fn users_do_not_share_dedup_state() -> Result<()> {
    let env = TestEnv::new(Duration::ZERO);
    let asha = Id::from_string("asha");
    let ravi = Id::from_string("ravi");
    let asha_consent = env.active_consent(&asha).await;
    let ravi_consent = env.active_consent(&ravi).await;

    let first = ingested(
        env.service
            .fetch_transactions(&asha, &asha_consent.id, date(1, 1), date(1, 3))
            .await?,
    );
    let second = ingested(
        env.service
            .fetch_transactions(&ravi, &ravi_consent.id, date(1, 1), date(1, 3))
            .await?,
    );
    assert!(!first.new.is_empty());
    assert_eq!(second.duplicates, 0);
    Ok(())
}

#[tokio::test]
async fn deleting_account_data_allows_reingestion() -> Result<()> {
    let env = TestEnv::new(Duration::ZERO);
    let user = Id::from_string("asha");
    let consent = env.active_consent(&user).await;

    let first = ingested(
        env.service
            .fetch_transactions(&user, &consent.id, date(1, 1), date(1, 3))
            .await?,
    );
    let removed = env.service.delete_account_data(&user).await?;
    assert_eq!(removed, first.new.len());
    assert_eq!(env.service.list_consents(&user).await?.len(), 1);

    let again = ingested(
        env.service
            .fetch_transactions(&user, &consent.id, date(1, 1), date(1, 3))
            .await?,
    );
    assert_eq!(again.new.len(), first.new.len());
    Ok(())
}
