use crate::error::StoreError;
use crate::record::{Mutation, Record};
use std::future::Future;

/// One client session against a keyed document store.
///
/// Two adapters obtained from the same [`AdapterFactory`] must be independent
/// sessions: the harness races them against each other and the anomaly it
/// measures only appears across separate clients.
pub trait StorageAdapter: Send + Sync {
    fn client_id(&self) -> &str;

    fn upsert(
        &self,
        key: &str,
        mutation: &Mutation,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn fetch(&self, key: &str) -> impl Future<Output = Result<Option<Record>, StoreError>> + Send;

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn close(self) -> impl Future<Output = Result<(), StoreError>> + Send
    where
        Self: Sized;
}

pub trait AdapterFactory: Send + Sync {
    type Adapter: StorageAdapter;

    fn connect(
        &self,
        client_id: &str,
    ) -> impl Future<Output = Result<Self::Adapter, StoreError>> + Send;
}
