pub mod gallery;
pub mod types;
pub mod upload;

// Re-export all types
pub use types::*;

// Re-export all handlers
pub use gallery::{batch_progress, gallery_events, list_photos};
pub use upload::upload_photos;
