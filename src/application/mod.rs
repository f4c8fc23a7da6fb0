pub mod auth;
pub mod bootstrap;
pub mod controller;
pub mod remote_sync;
