//! Brand records: domain types, the remote registry client, and the sync
//! coordinator that routes operations between backend and local store.

pub mod client;
pub mod coordinator;
pub mod types;
