pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod server;

pub use application::controller::{LiveController, TaskController};
pub use domain::models::{Task, TaskList, ViewId};
pub use infrastructure::error::InfraError;
