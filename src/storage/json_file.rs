use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::{DuplicateTransaction, Storage, TransactionQuery};
use crate::models::{CategoryOverride, Consent, ConsentStatus, DataSession, Id, Transaction};

/// JSON file-based storage implementation.
///
/// Directory structure:
/// ```text
/// data/
///   consents/
///     {id}.json
///   sessions/
///     {uuid-v5 of provider session id}.json
///   users/
///     {user_id}/
///       transactions.jsonl
///       overrides.json
/// ```
///
/// Writes go through a single lock so the (user, hash) uniqueness check and
/// the append happen together. The lock also guards a per-user index of
/// known hashes, rebuilt whenever the log changed outside this instance.
pub struct JsonFileStorage {
    base_path: PathBuf,
    write_lock: Mutex<HashMap<Id, HashIndex>>,
}

/// Length and mtime of a file, `None` if it does not exist.
type FileStamp = Option<(u64, SystemTime)>;

#[derive(Default)]
struct HashIndex {
    stamp: FileStamp,
    hashes: HashSet<String>,
}

async fn file_stamp(path: &Path) -> Result<FileStamp> {
    match fs::metadata(path).await {
        Ok(meta) => {
            let modified = meta
                .modified()
                .with_context(|| format!("Failed to read mtime of {}", path.display()))?;
            Ok(Some((meta.len(), modified)))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    }
}

impl JsonFileStorage {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            write_lock: Mutex::new(HashMap::new()),
        }
    }

    fn consents_dir(&self) -> PathBuf {
        self.base_path.join("consents")
    }

    fn consent_file(&self, id: &Id) -> Result<PathBuf> {
        ensure_path_safe(id)?;
        Ok(self.consents_dir().join(format!("{id}.json")))
    }

    fn session_file(&self, session_id: &str) -> PathBuf {
        self.base_path
            .join("sessions")
            .join(format!("{}.json", Id::from_external(session_id)))
    }

    fn user_dir(&self, user_id: &Id) -> Result<PathBuf> {
        ensure_path_safe(user_id)?;
        Ok(self.base_path.join("users").join(user_id.as_str()))
    }

    fn transactions_file(&self, user_id: &Id) -> Result<PathBuf> {
        Ok(self.user_dir(user_id)?.join("transactions.jsonl"))
    }

    fn overrides_file(&self, user_id: &Id) -> Result<PathBuf> {
        Ok(self.user_dir(user_id)?.join("overrides.json"))
    }

    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        Ok(())
    }

    async fn read_json<T: for<'de> serde::Deserialize<'de>>(
        &self,
        path: &Path,
    ) -> Result<Option<T>> {
        match fs::read_to_string(path).await {
            Ok(content) => {
                let value = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse JSON from {}", path.display()))?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    /// Write via a temp file and rename so readers never see half a file.
    async fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        self.ensure_dir(path).await?;
        let content = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    async fn read_jsonl<T: for<'de> serde::Deserialize<'de>>(&self, path: &Path) -> Result<Vec<T>> {
        let file = match fs::File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to open {}", path.display()))
            }
        };

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut items = Vec::new();

        while let Some(line) = lines.next_line().await.context("Failed to read line")? {
            if line.trim().is_empty() {
                continue;
            }
            let item: T = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse JSONL line in {}", path.display()))?;
            items.push(item);
        }

        Ok(items)
    }

    async fn append_jsonl<T: serde::Serialize>(&self, path: &Path, item: &T) -> Result<()> {
        self.ensure_dir(path).await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open {} for append", path.display()))?;

        let mut line = serde_json::to_string(item).context("Failed to serialize item")?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Rewrite a JSONL file in full. Used for the rare in-place mutations.
    async fn rewrite_jsonl<T: serde::Serialize>(&self, path: &Path, items: &[T]) -> Result<()> {
        self.ensure_dir(path).await?;
        let mut content = String::new();
        for item in items {
            content.push_str(&serde_json::to_string(item).context("Failed to serialize item")?);
            content.push('\n');
        }
        let tmp = path.with_extension("jsonl.tmp");
        fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    async fn list_consent_files(&self) -> Result<Vec<Consent>> {
        let dir = self.consents_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", dir.display()))
            }
        };

        let mut consents = Vec::new();
        while let Some(entry) = entries.next_entry().await.context("Failed to read entry")? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(consent) = self.read_json::<Consent>(&path).await? {
                consents.push(consent);
            }
        }
        consents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(consents)
    }

    async fn user_transactions(&self, user_id: &Id) -> Result<Vec<Transaction>> {
        self.read_jsonl(&self.transactions_file(user_id)?).await
    }

    async fn user_overrides(&self, user_id: &Id) -> Result<Vec<CategoryOverride>> {
        Ok(self
            .read_json(&self.overrides_file(user_id)?)
            .await?
            .unwrap_or_default())
    }
}

fn ensure_path_safe(id: &Id) -> Result<()> {
    if !Id::is_path_safe(id.as_str()) {
        anyhow::bail!("Id is not safe to use as a path segment: {id:?}");
    }
    Ok(())
}

#[async_trait::async_trait]
impl Storage for JsonFileStorage {
    async fn create_consent(&self, consent: &Consent) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.consent_file(&consent.id)?;
        if fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to check {}", path.display()))?
        {
            anyhow::bail!("Consent {} already exists", consent.id);
        }
        self.write_json(&path, consent).await
    }

    async fn get_consent(&self, id: &Id) -> Result<Option<Consent>> {
        if !Id::is_path_safe(id.as_str()) {
            return Ok(None);
        }
        self.read_json(&self.consent_file(id)?).await
    }

    async fn get_consent_by_handle(&self, handle: &str) -> Result<Option<Consent>> {
        Ok(self
            .list_consent_files()
            .await?
            .into_iter()
            .find(|c| c.handle == handle))
    }

    async fn list_consents(&self, user_id: &Id) -> Result<Vec<Consent>> {
        Ok(self
            .list_consent_files()
            .await?
            .into_iter()
            .filter(|c| &c.user_id == user_id)
            .collect())
    }

    async fn update_consent(&self, consent: &Consent) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.consent_file(&consent.id)?;
        if self.read_json::<Consent>(&path).await?.is_none() {
            anyhow::bail!("Consent not found: {}", consent.id);
        }
        self.write_json(&path, consent).await
    }

    async fn update_consent_status(
        &self,
        id: &Id,
        status: ConsentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let path = self.consent_file(id)?;
        let Some(mut consent) = self.read_json::<Consent>(&path).await? else {
            return Ok(false);
        };
        consent.status = status;
        consent.updated_at = updated_at;
        self.write_json(&path, &consent).await?;
        Ok(true)
    }

    async fn save_session(&self, session: &DataSession) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(&self.session_file(&session.session_id), session)
            .await
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<DataSession>> {
        let session: Option<DataSession> = self.read_json(&self.session_file(session_id)).await?;
        // The file name is a hash of the id; guard against collisions.
        Ok(session.filter(|s| s.session_id == session_id))
    }

    async fn create_transaction(&self, tx: &Transaction) -> Result<()> {
        let mut indexes = self.write_lock.lock().await;
        let path = self.transactions_file(&tx.user_id)?;
        let stamp = file_stamp(&path).await?;
        if !indexes
            .get(&tx.user_id)
            .is_some_and(|index| index.stamp == stamp)
        {
            let hashes = self
                .read_jsonl::<Transaction>(&path)
                .await?
                .into_iter()
                .map(|t| t.dedup_hash)
                .collect();
            indexes.insert(tx.user_id.clone(), HashIndex { stamp, hashes });
        }
        let index = indexes.entry(tx.user_id.clone()).or_default();

        if index.hashes.contains(&tx.dedup_hash) {
            return Err(DuplicateTransaction {
                user_id: tx.user_id.clone(),
                hash: tx.dedup_hash.clone(),
            }
            .into());
        }
        self.append_jsonl(&path, tx).await?;
        index.hashes.insert(tx.dedup_hash.clone());
        index.stamp = file_stamp(&path).await?;
        Ok(())
    }

    async fn get_transaction(&self, user_id: &Id, id: &Id) -> Result<Option<Transaction>> {
        Ok(self
            .user_transactions(user_id)
            .await?
            .into_iter()
            .find(|t| &t.id == id))
    }

    async fn get_transaction_by_hash(
        &self,
        user_id: &Id,
        hash: &str,
    ) -> Result<Option<Transaction>> {
        Ok(self
            .user_transactions(user_id)
            .await?
            .into_iter()
            .find(|t| t.dedup_hash == hash))
    }

    async fn list_transactions(
        &self,
        user_id: &Id,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>> {
        Ok(query.apply(self.user_transactions(user_id).await?))
    }

    async fn recent_hashes(&self, user_id: &Id, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .user_transactions(user_id)
            .await?
            .into_iter()
            .rev()
            .take(limit)
            .map(|t| t.dedup_hash)
            .collect())
    }

    async fn update_transaction_category(
        &self,
        user_id: &Id,
        id: &Id,
        category: &str,
        subcategory: Option<&str>,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut txns = self.user_transactions(user_id).await?;
        let Some(tx) = txns.iter_mut().find(|t| &t.id == id) else {
            return Ok(false);
        };
        tx.category = category.to_string();
        tx.subcategory = subcategory.map(str::to_string);
        self.rewrite_jsonl(&self.transactions_file(user_id)?, &txns)
            .await?;
        Ok(true)
    }

    async fn delete_transaction(&self, user_id: &Id, id: &Id) -> Result<bool> {
        let mut indexes = self.write_lock.lock().await;
        indexes.remove(user_id);
        let mut txns = self.user_transactions(user_id).await?;
        let before = txns.len();
        txns.retain(|t| &t.id != id);
        if txns.len() == before {
            return Ok(false);
        }
        self.rewrite_jsonl(&self.transactions_file(user_id)?, &txns)
            .await?;
        Ok(true)
    }

    async fn delete_user_transactions(&self, user_id: &Id) -> Result<usize> {
        let mut indexes = self.write_lock.lock().await;
        indexes.remove(user_id);
        let count = self.user_transactions(user_id).await?.len();
        let path = self.transactions_file(user_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(count),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }

    async fn create_override(&self, rule: &CategoryOverride) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut rules = self.user_overrides(&rule.user_id).await?;
        rules.push(rule.clone());
        self.write_json(&self.overrides_file(&rule.user_id)?, &rules)
            .await
    }

    async fn get_override(&self, user_id: &Id, id: &Id) -> Result<Option<CategoryOverride>> {
        Ok(self
            .user_overrides(user_id)
            .await?
            .into_iter()
            .find(|r| &r.id == id))
    }

    async fn list_overrides(&self, user_id: &Id) -> Result<Vec<CategoryOverride>> {
        self.user_overrides(user_id).await
    }

    async fn update_override(&self, rule: &CategoryOverride) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut rules = self.user_overrides(&rule.user_id).await?;
        let Some(existing) = rules.iter_mut().find(|r| r.id == rule.id) else {
            return Ok(false);
        };
        *existing = rule.clone();
        self.write_json(&self.overrides_file(&rule.user_id)?, &rules)
            .await?;
        Ok(true)
    }

    async fn delete_override(&self, user_id: &Id, id: &Id) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut rules = self.user_overrides(user_id).await?;
        let before = rules.len();
        rules.retain(|r| &r.id != id);
        if rules.len() == before {
            return Ok(false);
        }
        self.write_json(&self.overrides_file(user_id)?, &rules)
            .await?;
        Ok(true)
    }
}
