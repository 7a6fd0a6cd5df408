pub mod matrix;
pub mod prediction;

pub use matrix::Matrix;
pub use prediction::{Match, Neighbor, Prediction, UNKNOWN_LABEL, VectorId};
