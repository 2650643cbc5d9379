pub mod database;
pub mod indexer;
pub mod ingestion;
pub mod rpc;
