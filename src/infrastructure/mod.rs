pub mod config;
pub mod credential_store;
pub mod error;
pub mod firestore_client;
pub mod identity_client;
pub mod list_repository;
pub mod storage;
pub mod task_document;
