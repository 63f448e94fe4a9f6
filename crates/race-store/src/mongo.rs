use mongodb::bson::{doc, to_bson, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use race_core::{
    AdapterFactory, ConnectionDescriptor, Mutation, OpKind, Record, StorageAdapter, StoreError,
};
use serde_json::Value;
use std::fmt::Display;

pub const DEFAULT_DATABASE: &str = "testdb";
pub const DEFAULT_COLLECTION: &str = "users";

/// Opens one MongoDB client per adapter so each racing writer has its own
/// connection pool and `appName`.
#[derive(Debug, Clone)]
pub struct MongoFactory {
    descriptor: ConnectionDescriptor,
    database: String,
    collection: String,
}

impl MongoFactory {
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self {
            descriptor,
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }

    pub fn database(mut self, name: &str) -> Self {
        self.database = name.to_string();
        self
    }

    pub fn collection(mut self, name: &str) -> Self {
        self.collection = name.to_string();
        self
    }

    // Driver errors may quote the connection string back.
    fn scrub(&self, err: impl Display) -> String {
        err.to_string()
            .replace(self.descriptor.expose(), &self.descriptor.redacted())
    }
}

impl AdapterFactory for MongoFactory {
    type Adapter = MongoAdapter;

    async fn connect(&self, client_id: &str) -> Result<MongoAdapter, StoreError> {
        let mut options = ClientOptions::parse(self.descriptor.expose())
            .await
            .map_err(|e| StoreError::Connection(self.scrub(e)))?;
        options.app_name = Some(client_id.to_string());
        let client =
            Client::with_options(options).map_err(|e| StoreError::Connection(self.scrub(e)))?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::Connection(self.scrub(e)))?;
        tracing::info!(
            client_id,
            database = %self.database,
            collection = %self.collection,
            "mongodb client connected"
        );
        let collection = client
            .database(&self.database)
            .collection::<Document>(&self.collection);
        Ok(MongoAdapter {
            client_id: client_id.to_string(),
            client,
            collection,
        })
    }
}

pub struct MongoAdapter {
    client_id: String,
    client: Client,
    collection: Collection<Document>,
}

pub fn update_document(key: &str, mutation: &Mutation) -> Result<Document, StoreError> {
    if mutation.is_empty() {
        return Err(StoreError::operation(OpKind::Upsert, key, "empty mutation"));
    }
    let bson = |v: &Value| to_bson(v).map_err(|e| StoreError::operation(OpKind::Upsert, key, e));
    let mut update = Document::new();
    if !mutation.unset.is_empty() {
        let mut fields = Document::new();
        for field in &mutation.unset {
            fields.insert(field.as_str(), "");
        }
        update.insert("$unset", fields);
    }
    if !mutation.set.is_empty() {
        let mut fields = Document::new();
        for (field, value) in &mutation.set {
            fields.insert(field.as_str(), bson(value)?);
        }
        update.insert("$set", fields);
    }
    if !mutation.add_to_set.is_empty() {
        let mut fields = Document::new();
        for (field, member) in &mutation.add_to_set {
            fields.insert(field.as_str(), bson(member)?);
        }
        update.insert("$addToSet", fields);
    }
    Ok(update)
}

pub fn document_to_record(document: Document) -> Option<Record> {
    Record::from_value(Bson::Document(document).into_relaxed_extjson())
}

impl StorageAdapter for MongoAdapter {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn upsert(&self, key: &str, mutation: &Mutation) -> Result<(), StoreError> {
        let update = update_document(key, mutation)?;
        let result = self
            .collection
            .update_one(doc! { "_id": key }, update)
            .upsert(true)
            .await
            .map_err(|e| StoreError::operation(OpKind::Upsert, key, e))?;
        tracing::debug!(
            client_id = %self.client_id,
            key,
            matched = result.matched_count,
            upserted = result.upserted_id.is_some(),
            "upsert"
        );
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<Record>, StoreError> {
        let found = self
            .collection
            .find_one(doc! { "_id": key })
            .await
            .map_err(|e| StoreError::operation(OpKind::Fetch, key, e))?;
        Ok(found.and_then(document_to_record))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.collection
            .delete_one(doc! { "_id": key })
            .await
            .map_err(|e| StoreError::operation(OpKind::Delete, key, e))?;
        Ok(())
    }

    async fn close(self) -> Result<(), StoreError> {
        self.client.shutdown().await;
        tracing::debug!(client_id = %self.client_id, "mongodb client closed");
        Ok(())
    }
}
