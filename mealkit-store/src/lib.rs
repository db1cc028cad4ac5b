pub mod account_repo;
pub mod app_config;
pub mod database;
mod error;
pub mod delivery_repo;
pub mod inventory_repo;
pub mod line_item_repo;
pub mod memory;
pub mod order_repo;
pub mod unit_of_work;

pub use app_config::{Config, StorageBackend};
pub use database::DbClient;
pub use memory::MemoryStore;
