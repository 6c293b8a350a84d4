pub mod memory_store;
pub mod postgres_store;

pub use memory_store::InMemoryResultStore;
pub use postgres_store::PostgresResultStore;
