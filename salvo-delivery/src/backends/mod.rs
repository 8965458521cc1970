//! Collaborator implementations that ship with the crate

mod memory;

pub use memory::{DeliveryRecord, MemoryMailStore};
