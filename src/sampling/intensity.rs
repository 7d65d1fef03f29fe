use std::path::Path;

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

use crate::foundation::core::Canvas;
use crate::foundation::error::{MorphError, MorphResult};

/// Single-channel 8-bit picture: 0 is black ink, 255 is blank paper.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntensityField {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl IntensityField {
    /// Wrap row-major luma samples.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> MorphResult<Self> {
        let expected = u64::from(width) * u64::from(height);
        if width == 0 || height == 0 || data.len() as u64 != expected {
            return Err(MorphError::validation(format!(
                "intensity field {width}x{height} needs {expected} samples, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Field width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Field height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Field dimensions.
    pub fn size(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    /// Row-major samples.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Sample at column `x`, row `y`.
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    fn from_gray(gray: GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        Self {
            width,
            height,
            data: gray.into_raw(),
        }
    }

    /// Push samples away from (or towards) mid-grey.
    ///
    /// `level` 0 is the identity; positive levels increase contrast. Valid range is `(-255, 259)`.
    pub fn apply_contrast(&mut self, level: f64) {
        if level == 0.0 {
            return;
        }
        let factor = (259.0 * (level + 255.0)) / (255.0 * (259.0 - level));
        let mut lut = [0u8; 256];
        for (c, slot) in lut.iter_mut().enumerate() {
            let v = 128.0 + factor * (c as f64 - 128.0);
            *slot = v.round().clamp(0.0, 255.0) as u8;
        }
        for px in &mut self.data {
            *px = lut[*px as usize];
        }
    }
}

/// How a picture is turned into an [`IntensityField`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IntensityOpts {
    /// Resize to this size after conversion to grey. `None` keeps the native size.
    pub size: Option<Canvas>,
    /// Contrast level passed to [`IntensityField::apply_contrast`].
    pub contrast_level: f64,
}

/// Decode the picture at `path` into an intensity field.
///
/// Transparent regions are composited over white so they never attract points.
pub fn load_intensity(path: &Path, opts: IntensityOpts) -> MorphResult<IntensityField> {
    let img = image::open(path)
        .map_err(|e| MorphError::invalid_image(path.display().to_string(), e.to_string()))?;
    Ok(intensity_from_image(&img, opts))
}

/// Convert an already decoded picture into an intensity field.
pub fn intensity_from_image(img: &DynamicImage, opts: IntensityOpts) -> IntensityField {
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let flat = RgbImage::from_fn(w, h, |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        Rgb([over_white(r, a), over_white(g, a), over_white(b, a)])
    });
    let mut gray = DynamicImage::ImageRgb8(flat).to_luma8();

    if let Some(size) = opts.size
        && (size.width, size.height) != gray.dimensions()
    {
        gray = image::imageops::resize(
            &gray,
            size.width,
            size.height,
            image::imageops::FilterType::CatmullRom,
        );
    }

    let mut field = IntensityField::from_gray(gray);
    field.apply_contrast(opts.contrast_level);
    field
}

/// Build a field from a closure, mostly useful for synthetic inputs.
pub fn intensity_from_fn(
    width: u32,
    height: u32,
    f: impl Fn(u32, u32) -> u8,
) -> MorphResult<IntensityField> {
    Canvas::new(width, height)?;
    Ok(IntensityField::from_gray(GrayImage::from_fn(
        width,
        height,
        |x, y| Luma([f(x, y)]),
    )))
}

fn over_white(c: u8, a: u8) -> u8 {
    let c = u32::from(c);
    let a = u32::from(a);
    ((c * a + 255 * (255 - a) + 127) / 255) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/sampling/intensity.rs"]
mod tests;
