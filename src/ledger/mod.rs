// Credit ledger storage: models, storage seams and the Postgres repository
pub mod models;
pub mod repository;
pub mod store;

#[cfg(test)]
pub mod memory;

pub use repository::LedgerRepository;
