pub mod s3;
pub mod stager;

pub use stager::{MediaStager, StageError};
