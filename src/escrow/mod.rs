mod store;
mod types;

#[cfg(test)]
pub(crate) use store::memory::MemoryEscrowStore;
pub use store::{EscrowStore, PgEscrowStore};
pub use types::{
    EscrowError, EscrowKind, EscrowRecord, Milestone, MultiReleaseEscrow, Roles,
    SingleReleaseEscrow, Trustline,
};
