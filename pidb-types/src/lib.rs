pub mod error;
pub mod file_header;
pub mod integration;
pub mod stokes;

pub use error::*;
pub use file_header::*;
pub use integration::*;
pub use stokes::*;
