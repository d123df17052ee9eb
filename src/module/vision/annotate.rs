//! Burn detections into images.

use std::fs;
use std::path::Path;
use std::sync::Once;

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, ImageResult, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use super::detector::{Detection, DetectionResult};
use crate::module::define::annotate as style;
use crate::module::util::common;

/// Label font. Works without a font file: the label band is still drawn, the text is not.
pub struct LabelFont {
    font: Option<FontVec>,
    scale: PxScale,
    warn_once: Once,
}

impl LabelFont {
    /// Load a TrueType font, falling back to the font-less mode on any error.
    pub fn load(path: &str, size: f32) -> Self {
        let font = match fs::read(path) {
            Ok(bytes) => match FontVec::try_from_vec(bytes) {
                Ok(font) => Some(font),
                Err(e) => {
                    log::warn!("Invalid label font {}: {}", path, e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Can't read label font {}: {}", path, e);
                None
            }
        };
        Self {
            font,
            scale: PxScale::from(size),
            warn_once: Once::new(),
        }
    }

    /// A font that never renders text.
    pub fn none() -> Self {
        Self {
            font: None,
            scale: PxScale::from(style::FONT_SIZE),
            warn_once: Once::new(),
        }
    }

    pub fn has_glyphs(&self) -> bool {
        self.font.is_some()
    }

    /// Rendered width of `text` in pixels.
    pub fn measure(&self, text: &str) -> u32 {
        match &self.font {
            Some(font) => text_size(self.scale, font, text).0,
            // Roughly half an em per character for a proportional sans font.
            None => (text.chars().count() as f32 * self.scale.x * 0.5).ceil() as u32,
        }
    }

    fn draw(&self, canvas: &mut RgbaImage, x: i32, y: i32, text: &str) {
        match &self.font {
            Some(font) => draw_text_mut(
                canvas,
                Rgba(style::TEXT_COLOR),
                x,
                y,
                self.scale,
                font,
                text,
            ),
            None => self
                .warn_once
                .call_once(|| log::warn!("No label font loaded, labels drawn without text")),
        }
    }
}

/// Box geometry in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxRect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl BoxRect {
    /// Geometry of `det` on a canvas of `size`.
    ///
    /// Edges lying further than `margin` outside the canvas are pulled in to `margin`.
    /// With a margin wider than anything drawn around the box this paints the same
    /// pixels and keeps the integer coordinates bounded.
    pub fn fit(det: &Detection, size: (u32, u32), margin: u32) -> Self {
        let (left, top) = det.top_left();
        let m = f64::from(margin);
        let clamp = |v: f64, extent: u32| v.clamp(-m, f64::from(extent) + m);

        let left = left.round();
        let top = top.round();
        let right = left + det.width.round().max(0.0);
        let bottom = top + det.height.round().max(0.0);

        let (l, r) = (clamp(left, size.0), clamp(right, size.0));
        let (t, b) = (clamp(top, size.1), clamp(bottom, size.1));
        Self {
            left: l as i32,
            top: t as i32,
            width: (r - l) as u32,
            height: (b - t) as u32,
        }
    }

    /// Label band sitting directly above the box.
    pub fn label_band(&self, text_width: u32) -> Self {
        Self {
            left: self.left,
            top: self.top.saturating_sub(style::LABEL_HEIGHT as i32),
            width: text_width.saturating_add(style::LABEL_PADDING),
            height: style::LABEL_HEIGHT,
        }
    }

    fn rect(&self) -> Option<Rect> {
        // imageproc rejects empty rectangles
        (self.width > 0 && self.height > 0)
            .then(|| Rect::at(self.left, self.top).of_size(self.width, self.height))
    }
}

/// Draw detections in the order given. Parts outside the canvas are not painted.
pub fn draw_detections(canvas: &mut RgbaImage, detections: &[Detection], font: &LabelFont) {
    let color = Rgba(style::BOX_COLOR);
    for det in detections {
        let label = det.label();
        let text_width = font.measure(&label);
        let margin = text_width
            .saturating_add(style::LABEL_PADDING + style::LABEL_HEIGHT + style::STROKE_WIDTH);
        let bbox = BoxRect::fit(det, canvas.dimensions(), margin);
        for inset in 0..style::STROKE_WIDTH {
            let stroke = BoxRect {
                left: bbox.left.saturating_add(inset as i32),
                top: bbox.top.saturating_add(inset as i32),
                width: bbox.width.saturating_sub(2 * inset),
                height: bbox.height.saturating_sub(2 * inset),
            };
            if let Some(rect) = stroke.rect() {
                draw_hollow_rect_mut(canvas, rect, color);
            }
        }

        let band = bbox.label_band(text_width);
        if let Some(rect) = band.rect() {
            draw_filled_rect_mut(canvas, rect, color);
        }
        // Text sits 5px in from the left edge, vertically centered in the band.
        let text_top = band
            .top
            .saturating_add((style::LABEL_HEIGHT as i32 - font.scale.y as i32) / 2);
        font.draw(canvas, band.left.saturating_add(5), text_top, &label);
    }
}

/// An image with detections burned in.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedImage {
    pub image: RgbaImage,
}

impl AnnotatedImage {
    pub fn to_png(&self) -> ImageResult<Vec<u8>> {
        common::encode_png(&self.image)
    }

    pub fn data_url(&self) -> ImageResult<String> {
        Ok(common::data_url("image/png", &self.to_png()?))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        self.image.save(path)
    }
}

/// Copy `source` and draw `result` onto the copy.
pub fn annotate(source: &DynamicImage, result: &DetectionResult, font: &LabelFont) -> AnnotatedImage {
    let mut image = source.to_rgba8();
    draw_detections(&mut image, &result.detections, font);
    AnnotatedImage { image }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::testing::{result_of, weed};

    const BACKGROUND: Rgba<u8> = Rgba([120, 80, 40, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

    fn source() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(200, 160, BACKGROUND))
    }

    #[test]
    fn empty_result_leaves_pixels_untouched() {
        let src = source();
        let out = annotate(&src, &result_of(vec![]), &LabelFont::none());
        assert_eq!(out.image, src.to_rgba8());

        let png = out.to_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded, src.to_rgba8());
    }

    #[test]
    fn box_geometry_test() {
        let bbox = BoxRect::fit(&weed(), (200, 160), 100);
        assert_eq!(
            bbox,
            BoxRect {
                left: 75,
                top: 85,
                width: 50,
                height: 30
            }
        );
        assert_eq!(weed().label(), "weed 87.3%");
        let band = bbox.label_band(60);
        assert_eq!((band.left, band.top, band.width, band.height), (75, 65, 70, 20));
    }

    #[test]
    fn box_is_stroked_at_detection_bounds() {
        let out = annotate(&source(), &result_of(vec![weed()]), &LabelFont::none());
        let img = &out.image;
        assert_eq!(img.dimensions(), (200, 160));

        // Corners of the 50x30 box at (75, 85).
        assert_eq!(img.get_pixel(75, 85), &GREEN);
        assert_eq!(img.get_pixel(124, 85), &GREEN);
        assert_eq!(img.get_pixel(75, 114), &GREEN);
        assert_eq!(img.get_pixel(124, 114), &GREEN);
        // Two pixel stroke.
        assert_eq!(img.get_pixel(76, 100), &GREEN);
        assert_eq!(img.get_pixel(77, 100), &BACKGROUND);
        // Inside and outside stay untouched.
        assert_eq!(img.get_pixel(100, 100), &BACKGROUND);
        assert_eq!(img.get_pixel(74, 100), &BACKGROUND);
        assert_eq!(img.get_pixel(125, 100), &BACKGROUND);
        // Label band directly above.
        assert_eq!(img.get_pixel(76, 66), &GREEN);
        assert_eq!(img.get_pixel(76, 84), &GREEN);
        assert_eq!(img.get_pixel(76, 64), &BACKGROUND);
    }

    #[test]
    fn boxes_near_edges_are_drawn_partially() {
        let mut det = weed();
        det.x = 10.0;
        det.y = 5.0;
        let out = annotate(&source(), &result_of(vec![det]), &LabelFont::none());
        // Top edge is at -10, so the label band is entirely off-canvas; the bottom edge is drawn.
        assert_eq!(out.image.get_pixel(0, 19), &GREEN);
        assert_eq!(out.image.get_pixel(5, 0), &BACKGROUND);
    }

    #[test]
    fn same_input_same_pixels() {
        let dets = vec![weed(), {
            let mut d = weed();
            d.x = 60.0;
            d.class_label = "crop".to_owned();
            d
        }];
        let a = annotate(&source(), &result_of(dets.clone()), &LabelFont::none());
        let b = annotate(&source(), &result_of(dets), &LabelFont::none());
        assert_eq!(a, b);
        assert!(a.data_url().unwrap().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn zero_sized_boxes_are_skipped() {
        let mut det = weed();
        det.width = 0.0;
        det.height = 0.0;
        // Must not panic; the label band still has a size.
        let out = annotate(&source(), &result_of(vec![det]), &LabelFont::none());
        assert_eq!(out.image.get_pixel(101, 81), &GREEN);
    }

    #[test]
    fn missing_font_falls_back_to_estimate() {
        let font = LabelFont::load("/nonexistent/font.ttf", 14.0);
        assert!(!font.has_glyphs());
        assert_eq!(font.measure("weed 87.3%"), 70);
    }

    #[test]
    fn far_away_boxes_paint_nothing() {
        let src = source();
        let mut far = vec![];
        for (x, y) in [(1e12, 80.0), (100.0, -1e12), (-1e12, 1e12), (1e12, -1e12)] {
            let mut d = weed();
            d.x = x;
            d.y = y;
            far.push(d);
        }
        let out = annotate(&src, &result_of(far), &LabelFont::none());
        assert_eq!(out.image, src.to_rgba8());
    }

    #[test]
    fn huge_box_is_clipped_to_canvas() {
        let mut d = weed();
        d.width = 1e12;
        d.height = 1e12;
        let out = annotate(&source(), &result_of(vec![d]), &LabelFont::none());
        // Every edge and the label band lie outside the canvas.
        assert_eq!(out.image, source().to_rgba8());

        // A box reaching in from the left keeps its visible edges only.
        let mut d = weed();
        d.x = -1e12;
        d.width = 2e12 + 100.0;
        let bbox = BoxRect::fit(&d, (200, 160), 102);
        assert_eq!((bbox.left, bbox.top, bbox.height), (-102, 85, 30));
        let out = annotate(&source(), &result_of(vec![d]), &LabelFont::none());
        assert_eq!(out.image.get_pixel(0, 85), &GREEN);
        assert_eq!(out.image.get_pixel(0, 100), &BACKGROUND);
        assert_eq!(out.image.get_pixel(10, 70), &BACKGROUND);
    }

    #[test]
    fn label_text_is_drawn_inside_band() {
        const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
        let font = LabelFont::load(
            concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/DejaVuSans.ttf"),
            style::FONT_SIZE,
        );
        assert!(font.has_glyphs());
        let label = weed().label();
        let text_width = font.measure(&label);
        assert!(text_width > 0 && 75 + text_width + 10 < 200);

        let src = DynamicImage::ImageRgba8(RgbaImage::from_pixel(200, 160, WHITE));
        let out = annotate(&src, &result_of(vec![weed()]), &font);
        let img = &out.image;

        // Band is the measured width plus padding, in the row above the text.
        assert_eq!(img.get_pixel(75 + text_width + 9, 66), &GREEN);
        assert_eq!(img.get_pixel(75 + text_width + 10, 66), &WHITE);

        let dark = |p: &Rgba<u8>| p[0] < 128 && p[1] < 128;
        let inside = (80..75 + text_width + 10)
            .flat_map(|x| (65..85).map(move |y| (x, y)))
            .filter(|&(x, y)| dark(img.get_pixel(x, y)))
            .count();
        assert!(inside > 0);
        let outside = img
            .enumerate_pixels()
            .filter(|(_, y, _)| *y < 65 || *y >= 85)
            .filter(|(_, _, p)| dark(*p))
            .count();
        assert_eq!(outside, 0);
    }
}
