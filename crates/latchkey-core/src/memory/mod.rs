mod reader;

pub use reader::{ImageReader, ReadMemory};
