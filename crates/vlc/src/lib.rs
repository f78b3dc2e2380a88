pub mod dto;
pub mod normalize;
pub mod source;

pub use dto::StatusSnapshot;
pub use normalize::normalize;
pub use source::{SourceError, StatusSource};
