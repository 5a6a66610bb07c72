use crate::engine::{LineResult, Point};
use crate::error::OcrError;
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;

/// Outline colour for detected lines
pub const STROKE_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Outline thickness in pixels
pub const STROKE_WIDTH: u32 = 3;

/// Decode raw image bytes of any supported format
pub fn decode_image(data: &[u8]) -> Result<DynamicImage, OcrError> {
    image::load_from_memory(data)
        .map_err(|e| OcrError::MalformedInput(format!("Failed to decode image: {}", e)))
}

/// Draw each line's bounding polygon onto `image` in place, in line order.
///
/// Polygons with fewer than 3 vertices are skipped with a warning.
/// Returns the number of outlines drawn.
pub fn render(image: &mut RgbaImage, lines: &[LineResult]) -> usize {
    let mut drawn = 0;

    for (index, line) in lines.iter().enumerate() {
        if line.bounding_polygon.len() < 3 {
            tracing::warn!(
                "Skipping line {} ({:?}): polygon has {} point(s)",
                index,
                line.text,
                line.bounding_polygon.len()
            );
            continue;
        }

        draw_closed_outline(image, &line.bounding_polygon);
        drawn += 1;
    }

    drawn
}

/// Stroke every edge, last vertex back to the first, as a square brush
fn draw_closed_outline(image: &mut RgbaImage, points: &[Point]) {
    let half = (STROKE_WIDTH / 2) as i32;
    let edges = points.iter().zip(points.iter().cycle().skip(1));

    for (start, end) in edges {
        for dx in -half..=half {
            for dy in -half..=half {
                let (ox, oy) = (dx as f32, dy as f32);
                draw_line_segment_mut(
                    image,
                    (start.x + ox, start.y + oy),
                    (end.x + ox, end.y + oy),
                    STROKE_COLOR,
                );
            }
        }
    }
}
