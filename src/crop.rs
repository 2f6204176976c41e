//! Interactive crop tool: a fixed-ratio selection dragged over a displayed image,
//! rasterized at the image's native resolution.

use std::{fmt, io::Cursor, str::FromStr};

use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::Attachment;

#[derive(Debug, Error)]
pub enum CropError {
    #[error("image error: {0}")] Image(#[from] image::ImageError),
    #[error("crop selection is empty")] EmptySelection,
    #[error("unknown aspect ratio: {0}")] UnknownAspect(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")] Square,
    #[serde(rename = "4:3")] Landscape4x3,
    #[serde(rename = "3:4")] Portrait3x4,
    #[serde(rename = "4:5")] Portrait4x5,
    #[serde(rename = "5:4")] Landscape5x4,
    #[serde(rename = "16:9")] Wide16x9,
    #[serde(rename = "9:16")] Tall9x16,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 7] = [
        AspectRatio::Square,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait3x4,
        AspectRatio::Portrait4x5,
        AspectRatio::Landscape5x4,
        AspectRatio::Wide16x9,
        AspectRatio::Tall9x16,
    ];

    fn parts(self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1, 1),
            AspectRatio::Landscape4x3 => (4, 3),
            AspectRatio::Portrait3x4 => (3, 4),
            AspectRatio::Portrait4x5 => (4, 5),
            AspectRatio::Landscape5x4 => (5, 4),
            AspectRatio::Wide16x9 => (16, 9),
            AspectRatio::Tall9x16 => (9, 16),
        }
    }

    /// Width divided by height.
    pub fn value(self) -> f64 {
        let (w, h) = self.parts();
        f64::from(w) / f64::from(h)
    }

    pub fn label(self) -> String {
        let (w, h) = self.parts();
        format!("{w}:{h}")
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for AspectRatio {
    type Err = CropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        AspectRatio::ALL
            .into_iter()
            .find(|ratio| ratio.label() == s)
            .ok_or_else(|| CropError::UnknownAspect(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Selection in displayed-image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy)]
struct DragStart {
    pointer_x: f64,
    pointer_y: f64,
    rect_x: f64,
    rect_y: f64,
}

#[derive(Debug, Clone)]
pub struct CropTool {
    aspect: AspectRatio,
    display: Size,
    rect: CropRect,
    drag: Option<DragStart>,
}

impl CropTool {
    pub fn new(display: Size, aspect: AspectRatio) -> Self {
        let mut tool = Self { aspect, display, rect: CropRect::default(), drag: None };
        tool.reset_rect();
        tool
    }

    pub fn aspect(&self) -> AspectRatio { self.aspect }
    pub fn rect(&self) -> CropRect { self.rect }
    pub fn is_dragging(&self) -> bool { self.drag.is_some() }

    pub fn set_aspect(&mut self, aspect: AspectRatio) {
        self.aspect = aspect;
        self.reset_rect();
    }

    /// The displayed image was resized; the selection starts over.
    pub fn set_display_size(&mut self, display: Size) {
        self.display = display;
        self.drag = None;
        self.reset_rect();
    }

    /// Largest rectangle of the current ratio, centered in the display.
    fn reset_rect(&mut self) {
        if self.display.is_empty() {
            self.rect = CropRect::default();
            return;
        }
        let Size { width, height } = self.display;
        let aspect = self.aspect.value();
        let (w, h) = if width / height > aspect { (height * aspect, height) } else { (width, width / aspect) };
        self.rect = CropRect { x: (width - w) / 2.0, y: (height - h) / 2.0, width: w, height: h };
    }

    pub fn begin_drag(&mut self, pointer_x: f64, pointer_y: f64) {
        self.drag = Some(DragStart { pointer_x, pointer_y, rect_x: self.rect.x, rect_y: self.rect.y });
    }

    /// Moves the selection with the pointer, never past the display edges.
    pub fn drag_to(&mut self, pointer_x: f64, pointer_y: f64) {
        let Some(start) = self.drag else { return };
        let max_x = (self.display.width - self.rect.width).max(0.0);
        let max_y = (self.display.height - self.rect.height).max(0.0);
        self.rect.x = (start.rect_x + pointer_x - start.pointer_x).clamp(0.0, max_x);
        self.rect.y = (start.rect_y + pointer_y - start.pointer_y).clamp(0.0, max_y);
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    /// The selection in native pixels, for an image of `natural` size shown at the display size.
    pub fn source_rect(&self, natural: (u32, u32)) -> Result<(u32, u32, u32, u32), CropError> {
        if self.display.is_empty() {
            return Err(CropError::EmptySelection);
        }
        let scale_x = f64::from(natural.0) / self.display.width;
        let scale_y = f64::from(natural.1) / self.display.height;
        let x = ((self.rect.x * scale_x).round() as u32).min(natural.0);
        let y = ((self.rect.y * scale_y).round() as u32).min(natural.1);
        let width = ((self.rect.width * scale_x).round() as u32).min(natural.0 - x);
        let height = ((self.rect.height * scale_y).round() as u32).min(natural.1 - y);
        if width == 0 || height == 0 {
            return Err(CropError::EmptySelection);
        }
        Ok((x, y, width, height))
    }

    pub fn rasterize(&self, image: &DynamicImage) -> Result<DynamicImage, CropError> {
        let (x, y, width, height) = self.source_rect(image.dimensions())?;
        debug!("Cropping {}x{} at ({}, {})", width, height, x, y);
        Ok(image.crop_imm(x, y, width, height))
    }

    /// Crops `source` into a new PNG named `{base_name}-cropped.png`.
    pub fn crop_attachment(&self, source: &Attachment, base_name: &str) -> Result<Attachment, CropError> {
        let image = image::load_from_memory(&source.data)?;
        let cropped = self.rasterize(&image)?;
        let mut png = Vec::new();
        cropped.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(Attachment::new(format!("{base_name}-cropped.png"), "image/png", png))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use pretty_assertions::assert_eq;

    const EPS: f64 = 1e-9;

    fn contained(rect: CropRect, display: Size) -> bool {
        rect.x >= -EPS
            && rect.y >= -EPS
            && rect.x + rect.width <= display.width + EPS
            && rect.y + rect.height <= display.height + EPS
    }

    #[test]
    fn every_ratio_fits_centered() {
        for display in [Size::new(640.0, 480.0), Size::new(300.0, 900.0), Size::new(512.0, 512.0), Size::new(1.5, 977.0)] {
            let mut tool = CropTool::new(display, AspectRatio::Square);
            for aspect in AspectRatio::ALL {
                tool.set_aspect(aspect);
                let rect = tool.rect();
                assert!(contained(rect, display), "{aspect} in {display:?}: {rect:?}");
                assert!((rect.width / rect.height - aspect.value()).abs() < 1e-6);
                assert!((rect.x * 2.0 + rect.width - display.width).abs() < EPS);
                assert!((rect.y * 2.0 + rect.height - display.height).abs() < EPS);
                // largest: touches one pair of edges
                assert!((rect.width - display.width).abs() < EPS || (rect.height - display.height).abs() < EPS);
            }
        }
    }

    #[test]
    fn drag_is_clamped_to_the_display() {
        let display = Size::new(400.0, 200.0);
        let mut tool = CropTool::new(display, AspectRatio::Square);
        assert_eq!(tool.rect(), CropRect { x: 100.0, y: 0.0, width: 200.0, height: 200.0 });

        tool.drag_to(50.0, 50.0);
        assert_eq!(tool.rect().x, 100.0, "no drag in progress");

        tool.begin_drag(10.0, 10.0);
        assert!(tool.is_dragging());
        tool.drag_to(60.0, 30.0);
        assert_eq!((tool.rect().x, tool.rect().y), (150.0, 0.0));
        tool.drag_to(1000.0, -500.0);
        assert_eq!((tool.rect().x, tool.rect().y), (200.0, 0.0));
        tool.drag_to(-1000.0, 0.0);
        assert_eq!(tool.rect().x, 0.0);
        tool.end_drag();
        assert!(!tool.is_dragging());
        assert!(contained(tool.rect(), display));
    }

    #[test]
    fn parses_labels() {
        assert_eq!("16:9".parse::<AspectRatio>().unwrap(), AspectRatio::Wide16x9);
        assert_eq!(serde_json::to_string(&AspectRatio::Portrait4x5).unwrap(), "\"4:5\"");
        assert!(matches!("2:1".parse::<AspectRatio>(), Err(CropError::UnknownAspect(_))));
    }

    #[test]
    fn rasterizes_at_native_resolution() {
        let mut canvas = RgbaImage::from_pixel(200, 100, Rgba([0, 0, 255, 255]));
        canvas.put_pixel(50, 0, Rgba([255, 0, 0, 255]));
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(canvas).write_to(&mut Cursor::new(&mut png), ImageFormat::Png).unwrap();
        let source = Attachment::new("shot.png", "image/png", png);

        // shown at half size
        let tool = CropTool::new(Size::new(100.0, 50.0), AspectRatio::Square);
        assert_eq!(tool.source_rect((200, 100)).unwrap(), (50, 0, 100, 100));

        let cropped = tool.crop_attachment(&source, "shot").unwrap();
        assert_eq!(cropped.name, "shot-cropped.png");
        assert_eq!(cropped.media_type, "image/png");
        let decoded = image::load_from_memory(&cropped.data).unwrap();
        assert_eq!(decoded.dimensions(), (100, 100));
        assert_eq!(decoded.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn empty_display_has_no_selection() {
        let tool = CropTool::new(Size::new(0.0, 300.0), AspectRatio::Tall9x16);
        assert_eq!(tool.rect(), CropRect::default());
        assert!(matches!(tool.source_rect((10, 10)), Err(CropError::EmptySelection)));
    }
}
