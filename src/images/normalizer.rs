//! Web normalization for product photos: HEIC → PNG conversion, bounded resize
//! and JPEG recompression.
//!
//! Per-asset failures never abort a batch. They come back as [`NormalizeError`]
//! from the single-file operations and are tallied in [`NormalizeReport`] by the
//! directory walkers.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader, Rgb, RgbImage};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::heic::HeicDecoder;
use crate::config::{StorageConfig, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_DIMENSION};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("source image missing: {0}")]
    SourceMissing(PathBuf),

    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("HEIC conversion failed for {path}: {reason}")]
    Conversion { path: PathBuf, reason: String },

    #[error("optimization failed for {path}: {reason}")]
    Optimization { path: PathBuf, reason: String },

    #[error("{path} would overwrite existing {target}")]
    TargetExists { path: PathBuf, target: PathBuf },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl NormalizeError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Fails when `target` is a different file that already exists, so two assets
/// sharing a stem never clobber each other.
fn ensure_free(path: &Path, target: &Path) -> Result<(), NormalizeError> {
    if target != path && target.exists() {
        return Err(NormalizeError::TargetExists {
            path: path.to_path_buf(),
            target: target.to_path_buf(),
        });
    }
    Ok(())
}

/// Source format, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Heic,
    Png,
    Jpeg,
    Other,
}

impl ImageKind {
    pub fn of(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("heic") | Some("heif") => ImageKind::Heic,
            Some("png") => ImageKind::Png,
            Some("jpg") | Some("jpeg") => ImageKind::Jpeg,
            _ => ImageKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NormalizeSettings {
    /// Longest allowed side in pixels.
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl From<&StorageConfig> for NormalizeSettings {
    fn from(cfg: &StorageConfig) -> Self {
        Self {
            max_dimension: cfg.max_dimension,
            jpeg_quality: cfg.jpeg_quality,
        }
    }
}

/// Tallies for one or more normalization passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub converted_heic: u32,
    pub optimized: u32,
    pub resized: u32,
    pub failed: u32,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

impl NormalizeReport {
    pub fn absorb(&mut self, other: NormalizeReport) {
        self.converted_heic += other.converted_heic;
        self.optimized += other.optimized;
        self.resized += other.resized;
        self.failed += other.failed;
        self.bytes_before += other.bytes_before;
        self.bytes_after += other.bytes_after;
    }

    /// Bytes saved by recompression (negative when output grew).
    pub fn saved_bytes(&self) -> i64 {
        self.bytes_before as i64 - self.bytes_after as i64
    }

    pub fn saved_percent(&self) -> Option<f64> {
        if self.bytes_before == 0 {
            return None;
        }
        Some(self.saved_bytes() as f64 * 100.0 / self.bytes_before as f64)
    }

    fn record(&mut self, outcome: &Optimized) {
        if let Optimized::Reencoded {
            resized,
            bytes_before,
            bytes_after,
            ..
        } = outcome
        {
            self.optimized += 1;
            if *resized {
                self.resized += 1;
            }
            self.bytes_before += bytes_before;
            self.bytes_after += bytes_after;
        }
    }
}

/// Result of [`ImageNormalizer::optimize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Optimized {
    Reencoded {
        path: PathBuf,
        resized: bool,
        bytes_before: u64,
        bytes_after: u64,
    },
    /// Format we do not recompress; left untouched.
    Unchanged(PathBuf),
}

impl Optimized {
    pub fn path(&self) -> &Path {
        match self {
            Optimized::Reencoded { path, .. } => path,
            Optimized::Unchanged(path) => path,
        }
    }
}

/// Target size that fits `width`×`height` inside `max`×`max`, preserving the
/// aspect ratio. `None` when the image already fits.
pub fn fit_within(width: u32, height: u32, max: u32) -> Option<(u32, u32)> {
    if width <= max && height <= max {
        return None;
    }
    let scale = |short: u32, long: u32| -> u32 {
        ((max as f64 * short as f64 / long as f64).round() as u32).max(1)
    };
    if width > height {
        Some((max, scale(height, width)))
    } else {
        Some((scale(width, height), max))
    }
}

/// Composite onto an opaque white background. Images without an alpha channel
/// are converted directly.
pub fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let alpha = px[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    out
}

pub struct ImageNormalizer<D> {
    settings: NormalizeSettings,
    decoder: D,
}

impl<D: HeicDecoder> ImageNormalizer<D> {
    pub fn new(settings: NormalizeSettings, decoder: D) -> Self {
        Self { settings, decoder }
    }

    pub fn settings(&self) -> NormalizeSettings {
        self.settings
    }

    /// Decode a HEIC file, flatten it onto white and save it as a lossless PNG
    /// next to the source. The source is deleted on success, so calling this
    /// twice for the same file fails with [`NormalizeError::SourceMissing`].
    /// An existing PNG of the same stem is left alone and the HEIC is kept.
    pub fn convert(&self, path: &Path) -> Result<PathBuf, NormalizeError> {
        if !path.is_file() {
            return Err(NormalizeError::SourceMissing(path.to_path_buf()));
        }
        let png_path = path.with_extension("png");
        ensure_free(path, &png_path)?;
        let decoded = self.decoder.decode(path)?;
        let rgb = flatten_onto_white(&decoded);

        write_atomically(&png_path, |w| {
            PngEncoder::new_with_quality(w, CompressionType::Best, PngFilter::Adaptive).write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )
        })
        .map_err(|reason| NormalizeError::Conversion {
            path: path.to_path_buf(),
            reason,
        })?;

        fs::remove_file(path).map_err(|e| NormalizeError::io(path, e))?;
        debug!(target = "normalize", from = %path.display(), to = %png_path.display(), "converted HEIC");
        Ok(png_path)
    }

    /// Bound the image to the maximum dimension and recompress it as JPEG.
    ///
    /// PNG sources become `.jpg` (the PNG is removed) unless a JPEG of the same
    /// stem already exists; JPEG sources are rewritten in place. The decoder is
    /// picked from the file content, not the extension. Anything else is
    /// returned unchanged.
    pub fn optimize(&self, path: &Path) -> Result<Optimized, NormalizeError> {
        if !path.is_file() {
            return Err(NormalizeError::SourceMissing(path.to_path_buf()));
        }
        let kind = ImageKind::of(path);
        if !matches!(kind, ImageKind::Png | ImageKind::Jpeg) {
            return Ok(Optimized::Unchanged(path.to_path_buf()));
        }

        let out_path = match kind {
            ImageKind::Png => path.with_extension("jpg"),
            _ => path.to_path_buf(),
        };
        ensure_free(path, &out_path)?;

        let bytes_before = file_len(path)?;
        let img = ImageReader::open(path)
            .and_then(|r| r.with_guessed_format())
            .map_err(|e| NormalizeError::io(path, e))?
            .decode()
            .map_err(|source| NormalizeError::Decode {
                path: path.to_path_buf(),
                source,
            })?;

        let (img, resized) = match fit_within(img.width(), img.height(), self.settings.max_dimension)
        {
            Some((w, h)) => (img.resize_exact(w, h, FilterType::Lanczos3), true),
            None => (img, false),
        };
        let rgb = flatten_onto_white(&img);

        let quality = self.settings.jpeg_quality;
        write_atomically(&out_path, |w| {
            JpegEncoder::new_with_quality(w, quality).encode(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )
        })
        .map_err(|reason| NormalizeError::Optimization {
            path: path.to_path_buf(),
            reason,
        })?;

        if out_path != path {
            fs::remove_file(path).map_err(|e| NormalizeError::io(path, e))?;
        }
        let bytes_after = file_len(&out_path)?;
        Ok(Optimized::Reencoded {
            path: out_path,
            resized,
            bytes_before,
            bytes_after,
        })
    }

    /// Normalize every image below `dir`: HEIC files are converted first, then
    /// every PNG/JPEG (including fresh conversions) is optimized.
    /// Returns the tallies and the final paths of successfully processed files.
    pub fn process_directory(&self, dir: &Path) -> (NormalizeReport, Vec<PathBuf>) {
        let mut report = NormalizeReport::default();
        let mut heic = Vec::new();
        let mut raster = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(target = "normalize", error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match ImageKind::of(entry.path()) {
                ImageKind::Heic => heic.push(entry.into_path()),
                ImageKind::Png | ImageKind::Jpeg => raster.push(entry.into_path()),
                ImageKind::Other => {}
            }
        }

        for src in heic {
            match self.convert(&src) {
                Ok(png) => {
                    report.converted_heic += 1;
                    raster.push(png);
                }
                Err(err) => {
                    warn!(target = "normalize", error = %err, "conversion failed");
                    report.failed += 1;
                }
            }
        }

        let mut processed = Vec::with_capacity(raster.len());
        for src in raster {
            match self.optimize(&src) {
                Ok(outcome) => {
                    report.record(&outcome);
                    processed.push(outcome.path().to_path_buf());
                }
                Err(err) => {
                    warn!(target = "normalize", error = %err, "optimization failed");
                    report.failed += 1;
                }
            }
        }
        (report, processed)
    }

    /// Process each category directory directly under `root` in name order.
    /// Only an unreadable `root` is an error.
    pub fn normalize_tree(&self, root: &Path) -> std::io::Result<NormalizeReport> {
        let mut categories: Vec<PathBuf> = fs::read_dir(root)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.path())
            .collect();
        categories.sort();

        let mut total = NormalizeReport::default();
        for category in categories {
            let (report, files) = self.process_directory(&category);
            info!(
                target = "normalize",
                category = %category.display(),
                files = files.len(),
                converted = report.converted_heic,
                resized = report.resized,
                failed = report.failed,
                "category processed"
            );
            total.absorb(report);
        }
        Ok(total)
    }
}

fn file_len(path: &Path) -> Result<u64, NormalizeError> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| NormalizeError::io(path, e))
}

/// Encode into a sibling temp file and rename over `dest`, so a failed encode
/// never leaves a truncated image behind.
fn write_atomically<F>(dest: &Path, encode: F) -> Result<(), String>
where
    F: FnOnce(&mut BufWriter<File>) -> image::ImageResult<()>,
{
    let mut tmp_name = dest.as_os_str().to_owned();
    tmp_name.push(".partial");
    let tmp = PathBuf::from(tmp_name);

    let result = (|| -> Result<(), String> {
        let file = File::create(&tmp).map_err(|e| e.to_string())?;
        let mut writer = BufWriter::new(file);
        encode(&mut writer).map_err(|e| e.to_string())?;
        writer.flush().map_err(|e| e.to_string())?;
        drop(writer);
        fs::rename(&tmp, dest).map_err(|e| e.to_string())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use tempfile::TempDir;

    /// Stands in for ImageMagick: returns a fixed image for any path.
    struct FixedDecoder {
        width: u32,
        height: u32,
    }

    impl HeicDecoder for FixedDecoder {
        fn decode(&self, _path: &Path) -> Result<DynamicImage, NormalizeError> {
            let img = RgbaImage::from_pixel(self.width, self.height, Rgba([10, 20, 30, 0]));
            Ok(DynamicImage::ImageRgba8(img))
        }
    }

    fn normalizer(max: u32, heic: (u32, u32)) -> ImageNormalizer<FixedDecoder> {
        ImageNormalizer::new(
            NormalizeSettings {
                max_dimension: max,
                jpeg_quality: 85,
            },
            FixedDecoder {
                width: heic.0,
                height: heic.1,
            },
        )
    }

    fn write_rgb(path: &Path, w: u32, h: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(w, h, Rgb([200, 100, 50]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn fit_within_preserves_aspect_ratio() {
        assert_eq!(fit_within(800, 600, 1200), None);
        assert_eq!(fit_within(1200, 1200, 1200), None);
        assert_eq!(fit_within(3000, 2000, 1200), Some((1200, 800)));
        assert_eq!(fit_within(2000, 3000, 1200), Some((800, 1200)));
        assert_eq!(fit_within(4000, 4000, 1200), Some((1200, 1200)));
        assert_eq!(fit_within(5000, 1, 1200), Some((1200, 1)));

        for (w, h) in [(1201, 7), (4032, 3024), (1999, 1333), (1300, 1299)] {
            let expected = (1200.0 * h as f64 / w as f64).round() as u32;
            assert_eq!(fit_within(w, h, 1200), Some((1200, expected.max(1))));
            assert_eq!(fit_within(h, w, 1200), Some((expected.max(1), 1200)));
        }
    }

    #[test]
    fn flatten_composites_transparency_over_white() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(img));
        assert_eq!(flat.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(flat.get_pixel(1, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn convert_replaces_heic_with_png_and_is_not_repeatable() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("IMG_1.HEIC");
        fs::write(&src, b"heic bytes").unwrap();

        let n = normalizer(1200, (4, 3));
        let png = n.convert(&src).unwrap();
        assert_eq!(png, tmp.path().join("IMG_1.png"));
        assert!(!src.exists());

        let decoded = image::open(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
        assert!(!decoded.color().has_alpha());
        assert_eq!(decoded.to_rgb8().get_pixel(0, 0), &Rgb([255, 255, 255]));

        assert!(matches!(
            n.convert(&src),
            Err(NormalizeError::SourceMissing(_))
        ));
    }

    #[test]
    fn optimize_turns_large_png_into_bounded_jpeg() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("wide.png");
        write_rgb(&src, 300, 120);

        let outcome = normalizer(100, (1, 1)).optimize(&src).unwrap();
        let out = tmp.path().join("wide.jpg");
        match &outcome {
            Optimized::Reencoded { path, resized, .. } => {
                assert_eq!(path, &out);
                assert!(*resized);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!src.exists());
        let img = image::open(&out).unwrap();
        assert_eq!((img.width(), img.height()), (100, 40));
    }

    #[test]
    fn optimize_keeps_small_jpeg_in_place() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("small.jpg");
        write_rgb(&src, 50, 80);

        let outcome = normalizer(100, (1, 1)).optimize(&src).unwrap();
        match outcome {
            Optimized::Reencoded { path, resized, .. } => {
                assert_eq!(path, src);
                assert!(!resized);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let img = image::open(&src).unwrap();
        assert_eq!((img.width(), img.height()), (50, 80));
    }

    #[test]
    fn optimize_passes_other_formats_through() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("anim.gif");
        fs::write(&src, b"GIF89a").unwrap();
        let outcome = normalizer(100, (1, 1)).optimize(&src).unwrap();
        assert_eq!(outcome, Optimized::Unchanged(src.clone()));
        assert_eq!(fs::read(&src).unwrap(), b"GIF89a");
    }

    #[test]
    fn png_and_jpeg_sharing_a_stem_are_both_kept() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("boys/item");
        fs::create_dir_all(&dir).unwrap();
        RgbImage::from_pixel(8, 8, Rgb([255, 0, 0]))
            .save(dir.join("photo.jpg"))
            .unwrap();
        RgbImage::from_pixel(8, 8, Rgb([0, 0, 255]))
            .save(dir.join("photo.png"))
            .unwrap();

        let report = normalizer(100, (1, 1)).normalize_tree(tmp.path()).unwrap();
        assert_eq!(report.optimized, 1);
        assert_eq!(report.failed, 1);
        assert!(dir.join("photo.png").is_file());

        let kept = image::open(dir.join("photo.jpg")).unwrap().to_rgb8();
        let px = kept.get_pixel(4, 4);
        assert!(px[0] > 200 && px[2] < 60, "jpeg was overwritten: {px:?}");
    }

    #[test]
    fn convert_refuses_to_overwrite_existing_png() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("IMG_2.heic");
        fs::write(&src, b"heic bytes").unwrap();
        write_rgb(&tmp.path().join("IMG_2.png"), 3, 3);

        let err = normalizer(100, (4, 3)).convert(&src).unwrap_err();
        assert!(matches!(err, NormalizeError::TargetExists { .. }));
        assert!(src.is_file());
        let png = image::open(tmp.path().join("IMG_2.png")).unwrap();
        assert_eq!((png.width(), png.height()), (3, 3));
    }

    #[test]
    fn mislabeled_png_is_decoded_by_content() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("actually_png.jpg");
        RgbImage::from_pixel(40, 20, Rgb([0, 128, 0]))
            .save_with_format(&src, ImageFormat::Png)
            .unwrap();

        let outcome = normalizer(100, (1, 1)).optimize(&src).unwrap();
        assert!(matches!(outcome, Optimized::Reencoded { resized: false, .. }));
        let format = ImageReader::open(&src)
            .unwrap()
            .with_guessed_format()
            .unwrap()
            .format();
        assert_eq!(format, Some(ImageFormat::Jpeg));
    }

    #[test]
    fn corrupt_image_is_counted_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let cat = tmp.path().join("boys/item");
        fs::create_dir_all(&cat).unwrap();
        fs::write(cat.join("broken.jpg"), b"not a jpeg").unwrap();
        write_rgb(&cat.join("fine.jpg"), 20, 20);

        let report = normalizer(100, (1, 1)).normalize_tree(tmp.path()).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.optimized, 1);
    }

    #[test]
    fn second_pass_over_normalized_tree_does_no_conversion_or_resize() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write_rgb(&root.join("boys/cantex/big.png"), 240, 120);
        write_rgb(&root.join("boys/cantex/small.jpg"), 30, 20);
        fs::create_dir_all(root.join("girls/vest")).unwrap();
        fs::write(root.join("girls/vest/photo.heic"), b"heic").unwrap();

        let n = normalizer(100, (150, 300));
        let first = n.normalize_tree(root).unwrap();
        assert_eq!(first.converted_heic, 1);
        assert_eq!(first.optimized, 3);
        assert_eq!(first.resized, 2);
        assert_eq!(first.failed, 0);
        assert!(root.join("girls/vest/photo.jpg").is_file());
        assert!(!root.join("girls/vest/photo.png").exists());
        let photo = image::open(root.join("girls/vest/photo.jpg")).unwrap();
        assert_eq!((photo.width(), photo.height()), (50, 100));

        let second = n.normalize_tree(root).unwrap();
        assert_eq!(second.converted_heic, 0);
        assert_eq!(second.resized, 0);
        assert_eq!(second.failed, 0);
    }

    #[test]
    fn report_merges_and_computes_savings() {
        let mut total = NormalizeReport {
            bytes_before: 1000,
            bytes_after: 400,
            optimized: 1,
            ..Default::default()
        };
        total.absorb(NormalizeReport {
            bytes_before: 1000,
            bytes_after: 600,
            optimized: 1,
            failed: 2,
            ..Default::default()
        });
        assert_eq!(total.optimized, 2);
        assert_eq!(total.failed, 2);
        assert_eq!(total.saved_bytes(), 1000);
        assert_eq!(total.saved_percent(), Some(50.0));
        assert_eq!(NormalizeReport::default().saved_percent(), None);
    }
}
