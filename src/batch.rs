//! Batch conversion of image files, as run by `pixgraph convert`.
//!
//! Each input is read, optionally cropped then resized, and saved in the
//! requested format next to the input or under an output directory:
//!
//! ```text
//! photos/a.jpg  --format png --out-dir out  →  out/a.png
//! ```
//!
//! ## Parallel Processing
//!
//! Inputs are independent, so [`convert_all`] spreads them over the rayon
//! pool. Every conversion chain stays on one worker; results come back in
//! input order.

use crate::dispatch::Image;
use crate::registry::Registry;
use crate::state::{Quality, Rect, SaveFormat, Size, StateError, StateType};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// What to do with every input file.
#[derive(Debug, Clone)]
pub struct ConvertJob {
    pub format: SaveFormat,
    pub crop: Option<Rect>,
    pub resize: Option<Size>,
    /// JPEG quality; ignored for other formats.
    pub quality: Quality,
    /// Output directory. `None` writes next to each input.
    pub out_dir: Option<PathBuf>,
}

impl ConvertJob {
    pub fn new(format: SaveFormat) -> Self {
        Self {
            format,
            crop: None,
            resize: None,
            quality: Quality::default(),
            out_dir: None,
        }
    }

    /// Where `input` is written: same stem, new extension.
    pub fn output_path(&self, input: &Path) -> Result<PathBuf, StateError> {
        let stem = input.file_stem().ok_or_else(|| StateError::InvalidArgument {
            operation: "convert",
            message: format!("{} has no file name", input.display()),
        })?;
        let dir = match &self.out_dir {
            Some(dir) => dir.as_path(),
            None => input.parent().unwrap_or(Path::new("")),
        };
        Ok(dir.join(stem).with_extension(self.format.extension()))
    }
}

/// A successfully converted input file.
#[derive(Debug, Clone, PartialEq)]
pub struct Converted {
    pub output: PathBuf,
    pub size: Size,
    /// State the image was saved from.
    pub saved_from: StateType,
}

/// Convert one file according to `job`.
pub fn convert_file(
    registry: &Registry,
    input: &Path,
    job: &ConvertJob,
) -> Result<Converted, StateError> {
    let output = job.output_path(input)?;
    let mut image = Image::open_path(registry, input)?;
    if let Some(rect) = job.crop {
        image = image.crop(rect)?;
    }
    if let Some(size) = job.resize {
        image = image.resize(size)?;
    }
    let size = image.get_size()?;

    if let Some(dir) = output.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut sink = BufWriter::new(File::create(&output)?);
    image.save_with_quality(job.format, &mut sink, job.quality)?;
    sink.flush()?;

    let saved_from = image.state_type().ok_or(StateError::Consumed)?;
    log::info!("{} -> {} via {saved_from}", input.display(), output.display());
    Ok(Converted {
        output,
        size,
        saved_from,
    })
}

/// Convert every input in parallel, returning results in input order.
pub fn convert_all(
    registry: &Registry,
    inputs: &[PathBuf],
    job: &ConvertJob,
) -> Vec<Result<Converted, StateError>> {
    inputs
        .par_iter()
        .map(|input| convert_file(registry, input, job))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_helpers::{encode, gif_bytes, gradient_rgb, solid_rgb};
    use image::ImageFormat;

    fn builtin() -> Registry {
        Registry::from_config(&Config::default())
    }

    #[test]
    fn output_path_swaps_extension() {
        let mut job = ConvertJob::new(SaveFormat::Jpeg);
        assert_eq!(
            job.output_path(Path::new("photos/a.png")).unwrap(),
            PathBuf::from("photos/a.jpg")
        );
        job.out_dir = Some(PathBuf::from("out"));
        assert_eq!(
            job.output_path(Path::new("photos/a.png")).unwrap(),
            PathBuf::from("out/a.jpg")
        );
        assert!(job.output_path(Path::new("..")).is_err());
    }

    #[test]
    fn converts_with_crop_and_resize() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in.jpg");
        std::fs::write(&input, encode(&gradient_rgb(64, 48), ImageFormat::Jpeg)).unwrap();

        let job = ConvertJob {
            crop: Some(Rect::new(0, 0, 32, 32)),
            resize: Some(Size::new(16, 8)),
            out_dir: Some(tmp.path().join("out")),
            ..ConvertJob::new(SaveFormat::Png)
        };
        let done = convert_file(&builtin(), &input, &job).unwrap();

        assert_eq!(done.output, tmp.path().join("out/in.png"));
        assert_eq!(done.size, Size::new(16, 8));
        assert_eq!(done.saved_from, StateType::RASTER);
        let written = image::open(&done.output).unwrap();
        assert_eq!((written.width(), written.height()), (16, 8));
    }

    #[test]
    fn batch_keeps_input_order_and_reports_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let good = tmp.path().join("good.bmp");
        std::fs::write(&good, encode(&solid_rgb(3, 3, [5, 5, 5]), ImageFormat::Bmp)).unwrap();
        let anim = tmp.path().join("anim.gif");
        std::fs::write(&anim, gif_bytes(4, 4, &[[0, 0, 0, 255], [255, 255, 255, 255]])).unwrap();
        let bad = tmp.path().join("bad.png");
        std::fs::write(&bad, b"definitely not a png").unwrap();

        let job = ConvertJob {
            out_dir: Some(tmp.path().join("out")),
            ..ConvertJob::new(SaveFormat::Gif)
        };
        let results = convert_all(&builtin(), &[good, bad, anim], &job);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().size, Size::new(3, 3));
        assert!(matches!(results[1], Err(StateError::Decode { .. })));
        assert_eq!(results[2].as_ref().unwrap().saved_from, StateType::FRAMES);
    }
}
