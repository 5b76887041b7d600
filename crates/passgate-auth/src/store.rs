//! Credential record storage
//!
//! The workflow only talks to storage through [`CredentialStore`] and the
//! transaction handle it hands out. A transaction is committed explicitly;
//! dropping it uncommitted rolls back and releases it.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use passgate_common::error::{Error, Result};
use passgate_common::types::{CredentialRecord, NewCredential};

/// Source of transactions over credential records
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Open a transaction. Reads and writes of one workflow step go through it.
    async fn begin(&self) -> Result<Box<dyn CredentialTx>>;
}

/// Transaction-scoped data access over credential records
#[async_trait]
pub trait CredentialTx: Send {
    async fn find_by_email(&mut self, email: &str) -> Result<Option<CredentialRecord>>;

    async fn find_by_id(&mut self, id: &Uuid) -> Result<Option<CredentialRecord>>;

    /// Insert a record. The email uniqueness constraint is enforced here and
    /// reported as `DuplicateKey`.
    async fn insert(&mut self, credential: NewCredential) -> Result<CredentialRecord>;

    /// Replace an existing record, matched by id
    async fn update(&mut self, record: &CredentialRecord) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

#[derive(Debug, Default)]
struct Tables {
    records: HashMap<Uuid, CredentialRecord>,
    email_index: HashMap<String, Uuid>,
}

/// In-memory credential store
///
/// Transactions are serialised: a transaction holds the store lock from
/// `begin` until it is committed or dropped. Writes go to a per-transaction
/// overlay that is applied to the shared tables on commit, so a transaction
/// costs only what it touches. Callers keep transactions short and never hash
/// while holding one.
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed records
    pub async fn len(&self) -> usize {
        self.tables.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Committed record for `email`, outside of any transaction
    pub async fn get(&self, email: &str) -> Option<CredentialRecord> {
        let tables = self.tables.lock().await;
        tables
            .email_index
            .get(email)
            .and_then(|id| tables.records.get(id))
            .cloned()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn begin(&self) -> Result<Box<dyn CredentialTx>> {
        let tables = Arc::clone(&self.tables).lock_owned().await;
        Ok(Box::new(MemoryTx {
            tables,
            writes: HashMap::new(),
        }))
    }
}

struct MemoryTx {
    tables: OwnedMutexGuard<Tables>,
    /// Records inserted or updated by this transaction, keyed by id
    writes: HashMap<Uuid, CredentialRecord>,
}

impl MemoryTx {
    fn lookup_id(&self, id: &Uuid) -> Option<&CredentialRecord> {
        self.writes.get(id).or_else(|| self.tables.records.get(id))
    }

    fn lookup_email(&self, email: &str) -> Option<&CredentialRecord> {
        if let Some(record) = self.writes.values().find(|r| r.email == email) {
            return Some(record);
        }
        // A committed row whose email this transaction changed no longer matches
        self.tables
            .email_index
            .get(email)
            .and_then(|id| self.lookup_id(id))
            .filter(|record| record.email == email)
    }
}

#[async_trait]
impl CredentialTx for MemoryTx {
    async fn find_by_email(&mut self, email: &str) -> Result<Option<CredentialRecord>> {
        Ok(self.lookup_email(email).cloned())
    }

    async fn find_by_id(&mut self, id: &Uuid) -> Result<Option<CredentialRecord>> {
        Ok(self.lookup_id(id).cloned())
    }

    async fn insert(&mut self, credential: NewCredential) -> Result<CredentialRecord> {
        if self.lookup_email(&credential.email).is_some() {
            return Err(Error::DuplicateKey("credentials.email".to_string()));
        }

        let record = credential.into_record(Utc::now());
        self.writes.insert(record.id, record.clone());

        Ok(record)
    }

    async fn update(&mut self, record: &CredentialRecord) -> Result<()> {
        if self.lookup_id(&record.id).is_none() {
            return Err(Error::DatabaseError(format!(
                "No credential record {}",
                record.id
            )));
        }
        if let Some(owner) = self.lookup_email(&record.email) {
            if owner.id != record.id {
                return Err(Error::DuplicateKey("credentials.email".to_string()));
            }
        }

        let mut updated = record.clone();
        updated.updated_at = Utc::now();
        self.writes.insert(record.id, updated);

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx { mut tables, writes } = *self;

        // Drop index entries of renamed rows before adding any new entry
        for (id, record) in &writes {
            if let Some(previous) = tables.records.get(id) {
                if previous.email != record.email {
                    let old_email = previous.email.clone();
                    tables.email_index.remove(&old_email);
                }
            }
        }
        for (id, record) in writes {
            tables.email_index.insert(record.email.clone(), id);
            tables.records.insert(id, record);
        }

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
