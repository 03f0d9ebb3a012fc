pub mod client;
pub mod models;
pub mod response;
pub mod streaming;

pub use client::{build_endpoint, ApiClient, ChatBackend};
pub use models::RequestBody;
