//! Pixel canvas used to render screenshots of scripted pages.

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;

use super::types::{BrowserError, BrowserResult};

/// Glyph cell size in pixels
pub const GLYPH: u32 = 8;

/// An RGB canvas with just enough drawing to sketch a page
#[derive(Debug, Clone)]
pub struct Framebuffer {
    image: RgbImage,
}

impl Framebuffer {
    /// Canvas of `width` x `height` filled with `background`
    pub fn with_color(width: u32, height: u32, background: [u8; 3]) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, Rgb(background)),
        }
    }

    /// Decode PNG bytes
    pub fn from_png_bytes(data: &[u8]) -> BrowserResult<Self> {
        let decoded = image::load_from_memory_with_format(data, ImageFormat::Png)
            .map_err(|e| BrowserError::Screenshot(format!("decoding PNG: {}", e)))?;
        Ok(Self {
            image: decoded.to_rgb8(),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Color at (x, y); `None` outside the canvas
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        (x < self.width() && y < self.height()).then(|| self.image.get_pixel(x, y).0)
    }

    fn put(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if x < self.width() && y < self.height() {
            self.image.put_pixel(x, y, Rgb(color));
        }
    }

    /// Filled rectangle, clipped to the canvas
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
        let right = x.saturating_add(w).min(self.width());
        let bottom = y.saturating_add(h).min(self.height());
        for py in y..bottom {
            for px in x..right {
                self.put(px, py, color);
            }
        }
    }

    /// Full-width bar of `height` pixels at `y` with a caption
    pub fn banner(&mut self, y: u32, height: u32, caption: &str, fg: [u8; 3], bg: [u8; 3]) {
        self.fill_rect(0, y, self.width(), height, bg);
        let text_y = y + height.saturating_sub(GLYPH) / 2;
        self.text(GLYPH, text_y, caption, fg, bg);
    }

    /// One line of text; characters past the right edge are dropped
    pub fn text(&mut self, x: u32, y: u32, line: &str, fg: [u8; 3], bg: [u8; 3]) {
        let columns = self.width().saturating_sub(x) / GLYPH;
        for (column, ch) in line.chars().take(columns as usize).enumerate() {
            self.glyph(x + column as u32 * GLYPH, y, ch, fg, bg);
        }
    }

    fn glyph(&mut self, x: u32, y: u32, ch: char, fg: [u8; 3], bg: [u8; 3]) {
        // Characters outside the basic set render as '?'
        let rows = BASIC_FONTS
            .get(ch)
            .or_else(|| BASIC_FONTS.get('?'))
            .unwrap_or_default();
        for (dy, bits) in rows.iter().enumerate() {
            for dx in 0..GLYPH {
                // bit 0 is the leftmost pixel
                let color = if bits & (1 << dx) != 0 { fg } else { bg };
                self.put(x + dx, y + dy as u32, color);
            }
        }
    }

    /// Encode as PNG
    pub fn to_png(&self) -> BrowserResult<Vec<u8>> {
        let mut bytes = Cursor::new(Vec::new());
        self.image
            .write_to(&mut bytes, ImageFormat::Png)
            .map_err(|e| BrowserError::Screenshot(format!("encoding PNG: {}", e)))?;
        Ok(bytes.into_inner())
    }

    /// Encode as PNG and write to `path`
    pub fn save_png(&self, path: &Path) -> BrowserResult<()> {
        std::fs::write(path, self.to_png()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: [u8; 3] = [255, 255, 255];
    const BLACK: [u8; 3] = [0, 0, 0];

    #[test]
    fn test_fill_rect_is_clipped() {
        let mut fb = Framebuffer::with_color(20, 20, BLACK);
        fb.fill_rect(5, 5, 100, 10, [255, 0, 0]);

        assert_eq!(fb.pixel(4, 4), Some(BLACK));
        assert_eq!(fb.pixel(5, 5), Some([255, 0, 0]));
        assert_eq!(fb.pixel(19, 14), Some([255, 0, 0]));
        assert_eq!(fb.pixel(19, 15), Some(BLACK));
        assert_eq!(fb.pixel(20, 0), None);
    }

    #[test]
    fn test_text_draws_glyph_pixels() {
        let mut fb = Framebuffer::with_color(64, 16, BLACK);
        fb.text(0, 0, "Modal", WHITE, BLACK);

        let lit = (0..GLYPH)
            .flat_map(|y| (0..GLYPH).map(move |x| (x, y)))
            .filter(|&(x, y)| fb.pixel(x, y) == Some(WHITE))
            .count();
        assert!(lit > 0);
    }

    #[test]
    fn test_text_stops_at_right_edge() {
        let mut fb = Framebuffer::with_color(20, 8, BLACK);
        fb.text(0, 0, "MMMMMMMM", WHITE, BLACK);
        // only two full cells fit; the trailing 4 columns stay untouched
        assert!((16..20).all(|x| (0..8).all(|y| fb.pixel(x, y) == Some(BLACK))));
    }

    #[test]
    fn test_banner_spans_width() {
        let mut fb = Framebuffer::with_color(40, 40, BLACK);
        fb.banner(0, 24, "", WHITE, [30, 60, 90]);
        assert_eq!(fb.pixel(0, 0), Some([30, 60, 90]));
        assert_eq!(fb.pixel(39, 23), Some([30, 60, 90]));
        assert_eq!(fb.pixel(0, 24), Some(BLACK));
    }

    #[test]
    fn test_png_keeps_pixels() {
        let mut fb = Framebuffer::with_color(32, 32, [100, 150, 200]);
        fb.fill_rect(8, 8, 16, 16, [255, 0, 0]);

        let png = fb.to_png().unwrap();
        assert_eq!(&png[0..4], &[0x89, 0x50, 0x4E, 0x47]);

        let decoded = Framebuffer::from_png_bytes(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 32));
        assert_eq!(decoded.pixel(0, 0), Some([100, 150, 200]));
        assert_eq!(decoded.pixel(10, 10), Some([255, 0, 0]));
    }
}
