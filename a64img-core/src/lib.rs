pub mod header;
pub mod image;

pub use header::arm64::*;
pub use header::flags::*;
pub use header::Header;
pub use image::*;
