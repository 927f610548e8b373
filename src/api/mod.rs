//! Dashboard backend access
//!
//! - `types`: wire DTOs and their conversions into domain types
//! - `client`: reqwest client and [`ApiError`]
//! - `store`: async traits the rest of the crate depends on
//! - `session`: explicit bearer-token session

pub mod client;
pub mod session;
pub mod store;
pub mod types;

pub use client::{ApiClient, ApiError};
pub use session::AuthSession;
pub use store::{AnalysisBackend, AnnotationStore, ImageSource};
