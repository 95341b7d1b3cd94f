pub mod error;
pub mod photos;
