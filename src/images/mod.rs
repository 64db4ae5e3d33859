pub mod heic;
pub mod normalizer;
pub mod tree;

pub use heic::{HeicDecoder, MagickDecoder};
pub use normalizer::{ImageNormalizer, NormalizeError, NormalizeReport, NormalizeSettings};
pub use tree::ProductFolder;
