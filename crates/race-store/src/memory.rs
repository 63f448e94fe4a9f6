use race_core::{AdapterFactory, Mutation, Record, StorageAdapter, StoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Barrier, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryMode {
    Atomic,
    /// Upserts read the document, wait for the competing writer, then write
    /// the whole document back. One of every two racing writes is lost.
    LostUpdate,
}

impl MemoryMode {
    pub fn from_host(host: &str) -> Option<Self> {
        match host {
            "" | "atomic" => Some(MemoryMode::Atomic),
            "lossy" => Some(MemoryMode::LostUpdate),
            _ => None,
        }
    }
}

struct Inner {
    mode: MemoryMode,
    docs: Mutex<HashMap<String, Record>>,
    // Per-key rendezvous: both racing writers read before either writes.
    writers: Mutex<HashMap<String, Arc<Barrier>>>,
    upserts: AtomicU64,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new(mode: MemoryMode) -> Self {
        Self {
            inner: Arc::new(Inner {
                mode,
                docs: Mutex::new(HashMap::new()),
                writers: Mutex::new(HashMap::new()),
                upserts: AtomicU64::new(0),
            }),
        }
    }

    pub fn adapter(&self, client_id: &str) -> MemoryAdapter {
        MemoryAdapter {
            client_id: client_id.to_string(),
            store: self.clone(),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.docs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn upsert_count(&self) -> u64 {
        self.inner.upserts.load(Ordering::Relaxed)
    }
}

impl AdapterFactory for MemoryStore {
    type Adapter = MemoryAdapter;

    async fn connect(&self, client_id: &str) -> Result<MemoryAdapter, StoreError> {
        tracing::debug!(client_id, mode = ?self.inner.mode, "memory adapter opened");
        Ok(self.adapter(client_id))
    }
}

pub struct MemoryAdapter {
    client_id: String,
    store: MemoryStore,
}

impl MemoryAdapter {
    async fn upsert_atomic(&self, key: &str, mutation: &Mutation) -> Result<(), StoreError> {
        let mut docs = self.store.inner.docs.lock().await;
        let mut doc = docs.get(key).cloned().unwrap_or_default();
        doc.apply(mutation)?;
        docs.insert(key.to_string(), doc);
        Ok(())
    }

    async fn upsert_lost_update(&self, key: &str, mutation: &Mutation) -> Result<(), StoreError> {
        let snapshot = self.store.inner.docs.lock().await.get(key).cloned();
        let gate = self
            .store
            .inner
            .writers
            .lock()
            .await
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Barrier::new(2)))
            .clone();
        gate.wait().await;
        {
            let mut writers = self.store.inner.writers.lock().await;
            if writers.get(key).is_some_and(|g| Arc::ptr_eq(g, &gate)) {
                writers.remove(key);
            }
        }
        let mut doc = snapshot.unwrap_or_default();
        doc.apply(mutation)?;
        self.store
            .inner
            .docs
            .lock()
            .await
            .insert(key.to_string(), doc);
        Ok(())
    }
}

impl StorageAdapter for MemoryAdapter {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn upsert(&self, key: &str, mutation: &Mutation) -> Result<(), StoreError> {
        self.store.inner.upserts.fetch_add(1, Ordering::Relaxed);
        match self.store.inner.mode {
            MemoryMode::Atomic => self.upsert_atomic(key, mutation).await,
            MemoryMode::LostUpdate => self.upsert_lost_update(key, mutation).await,
        }
    }

    async fn fetch(&self, key: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.store.inner.docs.lock().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.store.inner.docs.lock().await.remove(key);
        // A writer abandoned mid-race leaves a half-filled gate behind.
        self.store.inner.writers.lock().await.remove(key);
        Ok(())
    }

    async fn close(self) -> Result<(), StoreError> {
        tracing::debug!(client_id = %self.client_id, "memory adapter closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use race_core::{classify, FieldNames, Outcome};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn delete_of_absent_key_is_ok_and_leaves_nothing() {
        let store = MemoryStore::new(MemoryMode::Atomic);
        let a = store.adapter("Test1");
        a.delete("100000000").await.expect("delete absent");
        a.delete("100000000").await.expect("delete again");
        assert!(a.fetch("100000000").await.expect("fetch").is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn atomic_mode_keeps_both_racing_writes() {
        let fields = FieldNames::default();
        let store = MemoryStore::new(MemoryMode::Atomic);
        let a = store.connect("Test1").await.expect("a");
        let b = store.connect("Test2").await.expect("b");
        let flag = Mutation::flag(&fields, false);
        let member = Mutation::add_member(&fields, "123456789");
        let (ra, rb) = tokio::join!(a.upsert("k", &flag), b.upsert("k", &member));
        ra.expect("a upsert");
        rb.expect("b upsert");
        let doc = a.fetch("k").await.expect("fetch");
        assert_eq!(
            doc.as_ref().map(Record::to_value),
            Some(json!({"isProxy": false, "profileIds": ["123456789"]}))
        );
        assert_eq!(
            classify(doc.as_ref(), &fields, false, "123456789"),
            Outcome::FullSuccess
        );
    }

    #[tokio::test]
    async fn lossy_mode_drops_one_of_two_racing_writes() {
        let fields = FieldNames::default();
        let store = MemoryStore::new(MemoryMode::LostUpdate);
        let a = store.adapter("Test1");
        let b = store.adapter("Test2");
        for round in 0..10 {
            let key = format!("key-{}", round);
            let flag = Mutation::flag(&fields, false);
            let member = Mutation::add_member(&fields, "123456789");
            let (ra, rb) = tokio::join!(a.upsert(&key, &flag), b.upsert(&key, &member));
            ra.expect("a upsert");
            rb.expect("b upsert");
            let doc = a.fetch(&key).await.expect("fetch");
            let outcome = classify(doc.as_ref(), &fields, false, "123456789");
            assert!(
                matches!(outcome, Outcome::MissingFlag | Outcome::MissingSetMember),
                "round {} produced {:?}",
                round,
                outcome
            );
        }
        assert_eq!(store.upsert_count(), 20);
    }

    #[tokio::test]
    async fn abandoned_writer_does_not_desync_later_races() {
        let fields = FieldNames::default();
        let store = MemoryStore::new(MemoryMode::LostUpdate);
        let a = store.adapter("Test1");
        let b = store.adapter("Test2");

        let stranded = tokio::time::timeout(
            Duration::from_millis(20),
            a.upsert("k0", &Mutation::flag(&fields, false)),
        )
        .await;
        assert!(stranded.is_err(), "lone writer should wait for its partner");

        let flag = Mutation::flag(&fields, false);
        let member = Mutation::add_member(&fields, "123456789");
        let (ra, rb) = tokio::time::timeout(Duration::from_secs(2), async {
            tokio::join!(a.upsert("k1", &flag), b.upsert("k1", &member))
        })
        .await
        .expect("race on a fresh key completes");
        ra.expect("a upsert");
        rb.expect("b upsert");
        let doc = a.fetch("k1").await.expect("fetch");
        let outcome = classify(doc.as_ref(), &fields, false, "123456789");
        assert!(matches!(
            outcome,
            Outcome::MissingFlag | Outcome::MissingSetMember
        ));
    }

    #[tokio::test]
    async fn delete_discards_half_filled_gate() {
        let fields = FieldNames::default();
        let store = MemoryStore::new(MemoryMode::LostUpdate);
        let a = store.adapter("Test1");
        let b = store.adapter("Test2");
        let _ = tokio::time::timeout(
            Duration::from_millis(20),
            b.upsert("k", &Mutation::add_member(&fields, "1")),
        )
        .await;
        a.delete("k").await.expect("delete");

        let flag = Mutation::flag(&fields, true);
        let member = Mutation::add_member(&fields, "2");
        let (ra, rb) = tokio::time::timeout(Duration::from_secs(2), async {
            tokio::join!(a.upsert("k", &flag), b.upsert("k", &member))
        })
        .await
        .expect("same key reused after delete");
        ra.expect("a upsert");
        rb.expect("b upsert");
    }

    #[tokio::test]
    async fn failed_apply_leaves_document_untouched() {
        let store = MemoryStore::new(MemoryMode::Atomic);
        let a = store.adapter("Test1");
        a.upsert("k", &Mutation::new().set("tags", json!(1)))
            .await
            .expect("seed");
        let err = a
            .upsert("k", &Mutation::new().add_to_set("tags", json!("x")))
            .await
            .expect_err("non-array");
        assert!(matches!(err, StoreError::NotAnArray { .. }));
        let doc = a.fetch("k").await.expect("fetch").expect("present");
        assert_eq!(doc.to_value(), json!({"tags": 1}));
    }

    #[test]
    fn mode_from_descriptor_host() {
        assert_eq!(MemoryMode::from_host(""), Some(MemoryMode::Atomic));
        assert_eq!(MemoryMode::from_host("atomic"), Some(MemoryMode::Atomic));
        assert_eq!(MemoryMode::from_host("lossy"), Some(MemoryMode::LostUpdate));
        assert_eq!(MemoryMode::from_host("other"), None);
    }
}
