use std::path::{Path, PathBuf};
use std::process::Command;

use image::{DynamicImage, ImageFormat};

use super::normalizer::NormalizeError;
use crate::util::env::env_opt;

/// Decodes HEIC/HEIF sources, which the `image` crate cannot read natively.
pub trait HeicDecoder {
    fn decode(&self, path: &Path) -> Result<DynamicImage, NormalizeError>;
}

/// Shells out to ImageMagick and reads the PNG it writes to stdout.
#[derive(Debug, Clone)]
pub struct MagickDecoder {
    program: PathBuf,
}

impl MagickDecoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for MagickDecoder {
    /// `MAGICK_BIN` when set, otherwise `magick` from PATH.
    fn default() -> Self {
        Self::new(env_opt("MAGICK_BIN").unwrap_or_else(|| "magick".to_string()))
    }
}

impl HeicDecoder for MagickDecoder {
    fn decode(&self, path: &Path) -> Result<DynamicImage, NormalizeError> {
        let output = Command::new(&self.program)
            .arg(path)
            .arg("png:-")
            .output()
            .map_err(|e| NormalizeError::Conversion {
                path: path.to_path_buf(),
                reason: format!("failed to run {}: {e}", self.program.display()),
            })?;

        if !output.status.success() {
            return Err(NormalizeError::Conversion {
                path: path.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        image::load_from_memory_with_format(&output.stdout, ImageFormat::Png).map_err(|source| {
            NormalizeError::Decode {
                path: path.to_path_buf(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_a_conversion_error() {
        let decoder = MagickDecoder::new("/nonexistent/magick-binary");
        let err = decoder.decode(Path::new("photo.heic")).unwrap_err();
        assert!(matches!(err, NormalizeError::Conversion { .. }));
    }
}
