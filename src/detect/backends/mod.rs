pub mod color_blob;

pub use color_blob::{ColorBlobBackend, ColorBlobSettings};
