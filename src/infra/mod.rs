pub mod crypto;
pub mod memory;
pub mod notify_hub;
pub mod postgres;
