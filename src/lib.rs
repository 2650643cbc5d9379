pub mod api;
pub mod db;
pub mod deposits;
pub mod escrow;
pub mod rpc;
pub mod types;
