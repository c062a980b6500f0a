pub mod posting;
pub mod vector;

pub use posting::DocWeight;
pub use vector::{Quantizer, SparseVector, QUANTIZE_SCALE};
