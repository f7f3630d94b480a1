pub mod migrations;
pub mod storage;

pub use storage::PgStorage;
