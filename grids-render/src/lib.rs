use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use anyhow::Context;
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use once_cell::sync::Lazy;
use tracing::warn;

use grids_core::{Cell, CellContent, Grid, GridLayout, RenderError, SourceClass, ThumbnailRenderer};

pub const CELL_EDGE: u32 = 200;

const BORDER: u32 = 2;
const PAD: u32 = 10;
const LABEL_SCALE: u32 = 2;
const BODY_SCALE: u32 = 1;
const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;

const BACKGROUND: Rgba<u8> = Rgba([24, 24, 28, 255]);
const FRAME: Rgba<u8> = Rgba([208, 208, 214, 255]);
const LABEL: Rgba<u8> = Rgba([235, 235, 235, 255]);
const BODY: Rgba<u8> = Rgba([168, 168, 178, 255]);

/// Raster thumbnails for grids: a live flattening of the open grid's cells,
/// or a synthetic mosaic standing in for a nested grid that is not open.
pub struct MosaicRenderer {
    cell_edge: u32,
}

impl MosaicRenderer {
    pub fn new() -> Self {
        Self {
            cell_edge: CELL_EDGE,
        }
    }

    pub fn with_cell_edge(cell_edge: u32) -> Self {
        Self {
            cell_edge: cell_edge.max(32),
        }
    }

    fn blank_canvas(&self, layout: GridLayout) -> RgbaImage {
        RgbaImage::from_pixel(
            layout.cols as u32 * self.cell_edge,
            layout.rows as u32 * self.cell_edge,
            BACKGROUND,
        )
    }

    // Tiles fill left-to-right and wrap exactly at the declared column count.
    fn tile_origin(&self, layout: GridLayout, index: usize) -> (u32, u32) {
        let col = (index % layout.cols) as u32;
        let row = (index / layout.cols) as u32;
        (col * self.cell_edge, row * self.cell_edge)
    }

    fn draw_tile_frame(&self, canvas: &mut RgbaImage, x: u32, y: u32) {
        draw_rect_border(
            canvas,
            x + BORDER,
            y + BORDER,
            self.cell_edge - 2 * BORDER,
            self.cell_edge - 2 * BORDER,
            BORDER,
            FRAME,
        );
    }

    fn draw_label(&self, canvas: &mut RgbaImage, label: &str, x: u32, y: u32) {
        let max_w = self.cell_edge.saturating_sub(2 * PAD);
        draw_glyph_line(canvas, label, x + PAD, y + PAD, LABEL_SCALE, LABEL, max_w);
    }

    fn content_box(&self, x: u32, y: u32) -> (u32, u32, u32, u32) {
        let top = PAD + GLYPH_H * LABEL_SCALE + PAD;
        (
            x + PAD,
            y + top,
            self.cell_edge.saturating_sub(2 * PAD),
            self.cell_edge.saturating_sub(top + PAD),
        )
    }

    fn draw_cell(&self, canvas: &mut RgbaImage, cell: &Cell, x: u32, y: u32) {
        self.draw_tile_frame(canvas, x, y);
        self.draw_label(canvas, &cell.content.label(), x, y);

        match &cell.content {
            CellContent::GridLink { thumbnail, .. } => {
                self.draw_image_tile(canvas, thumbnail, x, y);
            }
            CellContent::File(path) => match SourceClass::of(path) {
                SourceClass::Image => self.draw_image_tile(canvas, path, x, y),
                _ => self.draw_text_tile(canvas, path, x, y),
            },
            CellContent::InlineBytes { handle, data } => {
                if data.is_empty() {
                    return;
                }
                match image::load_from_memory(data) {
                    Ok(decoded) => self.overlay_scaled(canvas, decoded.to_rgba8(), x, y),
                    Err(err) => {
                        warn!(handle = %handle, %err, "undecodable inline bytes; label tile kept");
                    }
                }
            }
        }
    }

    // A cell whose content cannot be read still saves; it degrades to its
    // label tile with a warning.
    fn draw_image_tile(&self, canvas: &mut RgbaImage, path: &Path, x: u32, y: u32) {
        match image::open(path) {
            Ok(decoded) => self.overlay_scaled(canvas, decoded.to_rgba8(), x, y),
            Err(err) => {
                warn!(path = %path.display(), %err, "undecodable image source; label tile kept");
            }
        }
    }

    fn draw_text_tile(&self, canvas: &mut RgbaImage, path: &Path, x: u32, y: u32) {
        let Ok(bytes) = fs::read(path) else {
            warn!(path = %path.display(), "unreadable text source; label tile kept");
            return;
        };
        let text = String::from_utf8_lossy(&bytes);
        let (bx, by, bw, bh) = self.content_box(x, y);
        let line_h = GLYPH_H * BODY_SCALE + 2;
        let max_lines = (bh / line_h) as usize;
        for (row, line) in text.lines().take(max_lines).enumerate() {
            draw_glyph_line(
                canvas,
                line,
                bx,
                by + row as u32 * line_h,
                BODY_SCALE,
                BODY,
                bw,
            );
        }
    }

    fn overlay_scaled(&self, canvas: &mut RgbaImage, source: RgbaImage, x: u32, y: u32) {
        let (bx, by, bw, bh) = self.content_box(x, y);
        if bw == 0 || bh == 0 || source.width() == 0 || source.height() == 0 {
            return;
        }
        let scaled = image::DynamicImage::ImageRgba8(source)
            .resize(bw, bh, FilterType::Triangle)
            .to_rgba8();
        let ox = bx + (bw - scaled.width()) / 2;
        let oy = by + (bh - scaled.height()) / 2;
        imageops::overlay(canvas, &scaled, i64::from(ox), i64::from(oy));
    }
}

impl Default for MosaicRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ThumbnailRenderer for MosaicRenderer {
    fn render_live(&self, grid: &Grid) -> Result<Vec<u8>, RenderError> {
        if grid.is_empty() {
            return Err(RenderError::EmptyGrid);
        }
        let layout = grid.layout();
        let mut canvas = self.blank_canvas(layout);
        for cell in grid.cells() {
            let (x, y) = self.tile_origin(layout, cell.position);
            self.draw_cell(&mut canvas, cell, x, y);
        }
        encode_png(&canvas).map_err(RenderError::Other)
    }

    fn render_placeholder(&self, labels: &[String]) -> Result<Vec<u8>, RenderError> {
        if labels.is_empty() {
            return Err(RenderError::EmptyGrid);
        }
        let layout = GridLayout::for_count(labels.len());
        let mut canvas = self.blank_canvas(layout);
        for (index, label) in labels.iter().enumerate() {
            let (x, y) = self.tile_origin(layout, index);
            self.draw_tile_frame(&mut canvas, x, y);
            self.draw_label(&mut canvas, label, x, y);
        }
        encode_png(&canvas).map_err(RenderError::Other)
    }
}

fn encode_png(canvas: &RgbaImage) -> anyhow::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    canvas
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("failed to encode thumbnail as PNG")?;
    Ok(bytes)
}

fn draw_rect_border(canvas: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, t: u32, color: Rgba<u8>) {
    if w == 0 || h == 0 {
        return;
    }
    for dy in 0..h {
        for dx in 0..w {
            let on_edge = dx < t || dy < t || dx >= w - t || dy >= h - t;
            if !on_edge {
                continue;
            }
            let (px, py) = (x + dx, y + dy);
            if px < canvas.width() && py < canvas.height() {
                canvas.put_pixel(px, py, color);
            }
        }
    }
}

fn draw_glyph_line(
    canvas: &mut RgbaImage,
    text: &str,
    x: u32,
    y: u32,
    scale: u32,
    color: Rgba<u8>,
    max_w: u32,
) {
    let advance = (GLYPH_W + 1) * scale;
    let mut pen = 0u32;
    for ch in text.chars() {
        if pen + GLYPH_W * scale > max_w {
            break;
        }
        draw_glyph(canvas, ch, x + pen, y, scale, color);
        pen += advance;
    }
}

fn draw_glyph(canvas: &mut RgbaImage, ch: char, x: u32, y: u32, scale: u32, color: Rgba<u8>) {
    let ch = ch.to_ascii_uppercase();
    if ch == ' ' {
        return;
    }
    let rows = GLYPHS.get(&ch).unwrap_or(&GLYPH_FALLBACK);
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_W {
            if (bits >> (GLYPH_W - 1 - col)) & 1 == 0 {
                continue;
            }
            for sy in 0..scale {
                for sx in 0..scale {
                    let px = x + col * scale + sx;
                    let py = y + row as u32 * scale + sy;
                    if px < canvas.width() && py < canvas.height() {
                        canvas.put_pixel(px, py, color);
                    }
                }
            }
        }
    }
}

const GLYPH_FALLBACK: [u8; 7] = [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F];

// 5x7 face covering the characters that show up in file names; anything
// else renders as the fallback box.
static GLYPHS: Lazy<HashMap<char, [u8; 7]>> = Lazy::new(|| {
    HashMap::from([
        ('A', [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11]),
        ('B', [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E]),
        ('C', [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E]),
        ('D', [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E]),
        ('E', [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F]),
        ('F', [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10]),
        ('G', [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F]),
        ('H', [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11]),
        ('I', [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E]),
        ('J', [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C]),
        ('K', [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11]),
        ('L', [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F]),
        ('M', [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11]),
        ('N', [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11]),
        ('O', [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E]),
        ('P', [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10]),
        ('Q', [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D]),
        ('R', [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11]),
        ('S', [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E]),
        ('T', [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04]),
        ('U', [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E]),
        ('V', [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04]),
        ('W', [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A]),
        ('X', [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11]),
        ('Y', [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04]),
        ('Z', [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F]),
        ('0', [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E]),
        ('1', [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E]),
        ('2', [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F]),
        ('3', [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E]),
        ('4', [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02]),
        ('5', [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E]),
        ('6', [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E]),
        ('7', [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08]),
        ('8', [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E]),
        ('9', [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C]),
        ('.', [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C]),
        ('-', [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00]),
        ('_', [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F]),
        ('/', [0x01, 0x01, 0x02, 0x04, 0x08, 0x10, 0x10]),
        (':', [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00]),
    ])
});

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    fn dimensions(bytes: &[u8]) -> (u32, u32) {
        let decoded = image::load_from_memory(bytes).unwrap();
        (decoded.width(), decoded.height())
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn placeholder_dimensions_follow_layout() {
        let renderer = MosaicRenderer::new();
        let bytes = renderer
            .render_placeholder(&labels(&["a.txt", "b.png", "c.txt"]))
            .unwrap();
        assert_eq!(dimensions(&bytes), (2 * CELL_EDGE, 2 * CELL_EDGE));
    }

    #[test]
    fn placeholder_two_cells_gets_extra_column() {
        let renderer = MosaicRenderer::new();
        let bytes = renderer
            .render_placeholder(&labels(&["a.txt", "b.txt"]))
            .unwrap();
        assert_eq!(dimensions(&bytes), (2 * CELL_EDGE, CELL_EDGE));
    }

    #[test]
    fn placeholder_rejects_empty_grid() {
        let renderer = MosaicRenderer::new();
        let err = renderer.render_placeholder(&[]).unwrap_err();
        assert!(matches!(err, RenderError::EmptyGrid));
    }

    #[test]
    fn placeholder_is_deterministic() {
        let renderer = MosaicRenderer::new();
        let names = labels(&["one.txt", "two.jpg", "three.grid"]);
        let first = renderer.render_placeholder(&names).unwrap();
        let second = renderer.render_placeholder(&names).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn tiles_stay_inside_declared_columns() {
        let renderer = MosaicRenderer::new();
        let layout = GridLayout::for_count(5);
        assert_eq!(layout.cols, 3);
        for index in 0..5 {
            let (x, y) = renderer.tile_origin(layout, index);
            assert!(x + CELL_EDGE <= layout.cols as u32 * CELL_EDGE);
            assert!(y + CELL_EDGE <= layout.rows as u32 * CELL_EDGE);
        }
        // Fourth tile wraps to the second row rather than overflowing.
        assert_eq!(renderer.tile_origin(layout, 3), (0, CELL_EDGE));
    }

    #[test]
    fn live_render_composites_text_and_image_cells() {
        let dir = tempdir().unwrap();
        let text_path = dir.path().join("notes.txt");
        fs::write(&text_path, "hello\ngrid").unwrap();
        let image_path = dir.path().join("dot.png");
        RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]))
            .save(&image_path)
            .unwrap();

        let mut grid = Grid::new();
        grid.push(CellContent::File(text_path));
        grid.push(CellContent::File(image_path));

        let renderer = MosaicRenderer::new();
        let bytes = renderer.render_live(&grid).unwrap();
        assert_eq!(dimensions(&bytes), (2 * CELL_EDGE, CELL_EDGE));
    }

    #[test]
    fn live_render_rejects_empty_grid() {
        let renderer = MosaicRenderer::new();
        let err = renderer.render_live(&Grid::new()).unwrap_err();
        assert!(matches!(err, RenderError::EmptyGrid));
    }

    #[test]
    fn undecodable_image_degrades_to_label_tile() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("broken.png");
        fs::write(&bad, b"not actually a png").unwrap();

        let mut grid = Grid::new();
        grid.push(CellContent::File(bad));

        let renderer = MosaicRenderer::new();
        let bytes = renderer.render_live(&grid).unwrap();
        assert_eq!(dimensions(&bytes), (CELL_EDGE, CELL_EDGE));
    }
}
