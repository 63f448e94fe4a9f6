pub mod memory;
pub mod mongo;

pub use memory::{MemoryAdapter, MemoryMode, MemoryStore};
pub use mongo::{MongoAdapter, MongoFactory};
