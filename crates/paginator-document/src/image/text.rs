// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text overlay renderer: draws one line of text into a transparent layer the
// size of the page canvas.
//
// Glyphs are rasterised from the font bytes the caller supplies (never a
// system font), so output is identical on every machine. The text is first
// drawn as a coverage mask with `imageproc`, then tinted: every pixel of the
// layer carries the style colour with alpha = coverage. That keeps glyph
// edges un-darkened when the layer is later alpha-blended onto the page.

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use paginator_core::config::{FontWeight, TextStyle};
use tracing::{debug, instrument};

/// Extra horizontal strokes per 32px of em size used to embolden regular fonts.
const BOLD_STROKES_PER_32PX: f32 = 1.0;

/// A font ready to draw overlay text.
#[derive(Clone)]
pub struct TextOverlay {
    font: FontArc,
}

impl TextOverlay {
    /// Parse TrueType/OpenType font bytes.
    pub fn from_font_bytes(data: Vec<u8>) -> Result<Self, String> {
        let font = FontArc::try_from_vec(data).map_err(|err| format!("invalid font: {err}"))?;
        Ok(Self { font })
    }

    /// Render `text` into a transparent `width` x `height` layer.
    ///
    /// `style.x` is the left edge of the first glyph and `style.y` the
    /// baseline. Single line, no wrapping; anything past the canvas edge is
    /// dropped.
    #[instrument(skip(self, style), fields(x = style.x, y = style.y))]
    pub fn render(&self, text: &str, style: &TextStyle, width: u32, height: u32) -> RgbaImage {
        let coverage = self.coverage_mask(text, style, width, height);
        let [r, g, b, a] = style.color.0;

        RgbaImage::from_fn(width, height, |x, y| {
            let Luma([cov]) = *coverage.get_pixel(x, y);
            let alpha = (u16::from(cov) * u16::from(a) + 127) / 255;
            Rgba([r, g, b, alpha as u8])
        })
    }

    /// Width and height of `text`'s ink box at `style.font_size`.
    pub fn measure(&self, text: &str, style: &TextStyle) -> (u32, u32) {
        text_size(self.scale(style.font_size), &self.font, text)
    }

    /// Draw the glyph coverage for `text` into a greyscale mask.
    fn coverage_mask(&self, text: &str, style: &TextStyle, width: u32, height: u32) -> GrayImage {
        let scale = self.scale(style.font_size);
        let ascent = self.font.as_scaled(scale).ascent();
        // imageproc positions glyphs from the line's top edge.
        let top = style.y - ascent.round() as i32;

        let strokes = match style.weight {
            FontWeight::Normal => 0,
            FontWeight::Bold => {
                ((style.font_size / 32.0) * BOLD_STROKES_PER_32PX).round().max(1.0) as i32
            }
        };

        debug!(scale = scale.y, ascent, top, strokes, "Drawing text");

        let mut mask = GrayImage::new(width, height);
        for dx in 0..=strokes {
            draw_text_mut(&mut mask, Luma([255u8]), style.x + dx, top, scale, &self.font, text);
        }
        mask
    }

    /// Pixel scale giving an em box of `font_size` pixels.
    ///
    /// ab_glyph scales by line height (ascent - descent), so convert from
    /// the em size used by every other typesetting system.
    fn scale(&self, font_size: f32) -> PxScale {
        match self.font.units_per_em() {
            Some(units_per_em) if units_per_em > 0.0 => {
                PxScale::from(font_size * self.font.height_unscaled() / units_per_em)
            }
            _ => PxScale::from(font_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paginator_core::config::Color;

    const FONT: &[u8] = include_bytes!("../../../../assets/fonts/DejaVuSans.ttf");

    fn overlay() -> TextOverlay {
        TextOverlay::from_font_bytes(FONT.to_vec()).expect("bundled font parses")
    }

    fn style(weight: FontWeight) -> TextStyle {
        TextStyle {
            x: 20,
            y: 60,
            font_size: 32.0,
            weight,
            color: Color::rgb(0xF5, 0xC8, 0x42),
        }
    }

    fn inked(layer: &RgbaImage) -> Vec<(u32, u32)> {
        layer
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[3] > 0)
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    #[test]
    fn layer_matches_canvas_dimensions() {
        let layer = overlay().render("Pág. 03", &style(FontWeight::Normal), 300, 100);
        assert_eq!(layer.dimensions(), (300, 100));
    }

    #[test]
    fn text_sits_on_the_baseline_right_of_x() {
        let s = style(FontWeight::Normal);
        let layer = overlay().render("Hxg", &s, 300, 100);
        let ink = inked(&layer);
        assert!(!ink.is_empty(), "something was drawn");

        let min_x = ink.iter().map(|(x, _)| *x).min().expect("ink");
        assert!(min_x >= s.x as u32, "left-anchored at x");
        assert!(min_x <= s.x as u32 + 6, "starts close to x");

        // Capital H sits on the baseline; only the descender of g goes below.
        let rows_above: usize = ink.iter().filter(|(_, y)| *y < s.y as u32).count();
        let rows_below: usize = ink.iter().filter(|(_, y)| *y > s.y as u32 + 1).count();
        assert!(rows_above > rows_below);
        let top = ink.iter().map(|(_, y)| *y).min().expect("ink");
        assert!(top >= (s.y - 32) as u32, "cap height stays within one em");
    }

    #[test]
    fn background_is_fully_transparent_and_ink_uses_style_colour() {
        let layer = overlay().render("Pág. 09", &style(FontWeight::Normal), 300, 100);
        assert_eq!(layer.get_pixel(0, 0).0, [0xF5, 0xC8, 0x42, 0]);
        assert!(
            layer
                .pixels()
                .filter(|p| p.0[3] > 0)
                .all(|p| p.0[..3] == [0xF5, 0xC8, 0x42])
        );
        assert!(layer.pixels().any(|p| p.0[3] == 255));
    }

    #[test]
    fn bold_covers_more_pixels_than_normal() {
        let normal = inked(&overlay().render("SAMPLE", &style(FontWeight::Normal), 300, 100));
        let bold = inked(&overlay().render("SAMPLE", &style(FontWeight::Bold), 300, 100));
        assert!(bold.len() > normal.len());
    }

    #[test]
    fn text_past_the_edge_is_clipped_not_panicking() {
        let mut s = style(FontWeight::Normal);
        s.x = 280;
        let layer = overlay().render("overflowing text", &s, 300, 100);
        assert_eq!(layer.dimensions(), (300, 100));
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = overlay().render("Pág. 42", &style(FontWeight::Bold), 200, 80);
        let b = overlay().render("Pág. 42", &style(FontWeight::Bold), 200, 80);
        assert_eq!(a, b);
    }

    #[test]
    fn longer_text_measures_wider() {
        let o = overlay();
        let s = style(FontWeight::Normal);
        assert!(o.measure("Pág. 100", &s).0 > o.measure("Pág. 1", &s).0);
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        assert!(TextOverlay::from_font_bytes(b"not a font".to_vec()).is_err());
    }
}
