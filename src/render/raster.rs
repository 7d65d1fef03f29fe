use std::path::Path;

use anyhow::Context as _;
use vello_cpu::kurbo::Shape as _;

use crate::foundation::core::Canvas;
use crate::foundation::error::{MorphError, MorphResult};
use crate::sampling::cloud::PointCloud;

/// A rendered frame as RGBA8 pixels.
///
/// Frames produced by [`ScatterRasterizer`] are fully opaque, so premultiplied and straight
/// alpha coincide; the flag stays explicit at API boundaries.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRGBA {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether the `data` is premultiplied alpha.
    pub premultiplied: bool,
}

impl FrameRGBA {
    /// Write the frame as a PNG file.
    pub fn write_png(&self, path: &Path) -> MorphResult<()> {
        image::save_buffer_with_format(
            path,
            &self.data,
            self.width,
            self.height,
            image::ExtendedColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .with_context(|| format!("write frame '{}'", path.display()))?;
        Ok(())
    }

    /// Decode a PNG frame written by [`FrameRGBA::write_png`].
    pub fn read_png(path: &Path) -> MorphResult<Self> {
        let img = image::open(path)
            .with_context(|| format!("read frame '{}'", path.display()))?
            .to_rgba8();
        Ok(Self {
            width: img.width(),
            height: img.height(),
            data: img.into_raw(),
            premultiplied: false,
        })
    }
}

/// Colors and point size of a scatter frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScatterStyle {
    /// Disc radius in canvas pixels.
    pub radius: f64,
    /// Straight-alpha RGBA8 ink.
    pub ink_rgba: [u8; 4],
    /// Straight-alpha RGBA8 paper; alpha is forced opaque.
    pub paper_rgba: [u8; 4],
}

/// CPU rasterizer drawing a point cloud as filled discs.
///
/// Point coordinates live in density-field pixels and are scaled onto the canvas independently
/// along both axes.
pub struct ScatterRasterizer {
    canvas: Canvas,
    field: Canvas,
    style: ScatterStyle,
    ctx: Option<vello_cpu::RenderContext>,
}

impl std::fmt::Debug for ScatterRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScatterRasterizer")
            .field("canvas", &self.canvas)
            .field("field", &self.field)
            .field("style", &self.style)
            .finish()
    }
}

impl ScatterRasterizer {
    /// Rasterizer drawing clouds sampled on `field` onto `canvas`.
    pub fn new(canvas: Canvas, field: Canvas, style: ScatterStyle) -> MorphResult<Self> {
        Canvas::new(canvas.width, canvas.height)?;
        Canvas::new(field.width, field.height)?;
        canvas_u16(canvas)?;
        if !(style.radius.is_finite() && style.radius > 0.0) {
            return Err(MorphError::validation(format!(
                "point radius must be finite and > 0, got {}",
                style.radius
            )));
        }
        Ok(Self {
            canvas,
            field,
            style,
            ctx: None,
        })
    }

    /// Output frame size.
    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Render `cloud` into a new frame.
    pub fn render(&mut self, cloud: &PointCloud) -> MorphResult<FrameRGBA> {
        let (w, h) = canvas_u16(self.canvas)?;
        let mut ctx = match self.ctx.take() {
            Some(ctx) if ctx.width() == w && ctx.height() == h => ctx,
            _ => vello_cpu::RenderContext::new(w, h),
        };
        ctx.reset();

        let [pr, pg, pb, _] = self.style.paper_rgba;
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(pr, pg, pb, 255));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(self.canvas.width),
            f64::from(self.canvas.height),
        ));

        let sx = f64::from(self.canvas.width) / f64::from(self.field.width);
        let sy = f64::from(self.canvas.height) / f64::from(self.field.height);
        let mut path = vello_cpu::kurbo::BezPath::new();
        for p in cloud.points() {
            let disc = vello_cpu::kurbo::Circle::new((p.x * sx, p.y * sy), self.style.radius);
            for el in disc.path_elements(0.1) {
                path.push(el);
            }
        }
        if !path.elements().is_empty() {
            let [r, g, b, a] = self.style.ink_rgba;
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, a));
            ctx.fill_path(&path);
        }

        let mut pixmap = vello_cpu::Pixmap::new(w, h);
        ctx.flush();
        ctx.render_to_pixmap(&mut pixmap);
        self.ctx = Some(ctx);

        Ok(FrameRGBA {
            width: self.canvas.width,
            height: self.canvas.height,
            data: pixmap.data_as_u8_slice().to_vec(),
            premultiplied: true,
        })
    }
}

fn canvas_u16(canvas: Canvas) -> MorphResult<(u16, u16)> {
    let w = u16::try_from(canvas.width)
        .map_err(|_| MorphError::validation(format!("canvas width exceeds u16: {}", canvas.width)))?;
    let h = u16::try_from(canvas.height).map_err(|_| {
        MorphError::validation(format!("canvas height exceeds u16: {}", canvas.height))
    })?;
    Ok((w, h))
}

#[cfg(test)]
#[path = "../../tests/unit/render/raster.rs"]
mod tests;
