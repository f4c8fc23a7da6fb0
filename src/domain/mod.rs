pub mod models;
pub mod reducer;
pub mod session;
pub mod view;
