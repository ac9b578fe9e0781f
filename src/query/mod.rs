pub mod cache;
pub mod handler;

pub use handler::{router, AppState};
