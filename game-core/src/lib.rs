pub mod ids;
pub mod scoring;
pub mod word_validation;

// Re-export main components
pub use ids::*;
pub use scoring::*;
pub use word_validation::*;
