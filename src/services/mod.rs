pub mod gateway_service;
pub mod keys;
pub mod memory_store;
pub mod s3_store;
pub mod spool;
pub mod store;
pub mod transfer;
