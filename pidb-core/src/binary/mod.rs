//! Чтение и запись полей фиксированной ширины (всегда little-endian).

pub mod read;
pub mod write;

pub use read::*;
pub use write::*;
