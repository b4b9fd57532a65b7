pub mod types;
pub mod classification;

pub use types::PilotError;
pub use classification::ErrorClassification;
