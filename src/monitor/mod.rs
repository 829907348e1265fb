//! Monitor module - on-chain account watchers.

pub mod account_creation;

pub use account_creation::{AccountCreationMonitor, AccountFetcher};
