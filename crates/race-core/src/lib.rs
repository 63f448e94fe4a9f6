pub mod adapter;
pub mod classify;
pub mod descriptor;
pub mod error;
pub mod generator;
pub mod record;

pub use adapter::{AdapterFactory, StorageAdapter};
pub use classify::{classify, Outcome};
pub use descriptor::{ConnectionDescriptor, Scheme};
pub use error::{HarnessError, OpKind, StoreError};
pub use generator::{FlagChoice, MutationGenerator, TrialInput, MEMBER_RANGE};
pub use record::{FieldNames, Mutation, Record};
