pub mod actor;
pub mod audit;
pub mod cart;
pub mod catalog;
pub mod error;
pub mod gateway;
pub mod id;
pub mod money;
pub mod notify;
pub mod order;
pub mod payment;
pub mod refund;
pub mod store;
pub mod wallet;
