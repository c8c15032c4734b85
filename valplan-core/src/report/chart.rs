use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgb, RgbImage};

use super::{ReportResult, Summary};

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
pub const BAR_COLORS: [Rgb<u8>; 3] = [Rgb([0, 128, 0]), Rgb([255, 0, 0]), Rgb([128, 128, 128])];

const MARGIN_LEFT: u32 = 60;
const MARGIN_RIGHT: u32 = 40;
const MARGIN_TOP: u32 = 40;
const MARGIN_BOTTOM: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Pixel rectangles of the passed/failed/skipped bars, in that order.
pub fn bar_layout(values: [usize; 3], width: u32, height: u32) -> [BarRect; 3] {
    let plot_width = width.saturating_sub(MARGIN_LEFT + MARGIN_RIGHT).max(3);
    let plot_height = height.saturating_sub(MARGIN_TOP + MARGIN_BOTTOM).max(1);
    let baseline = MARGIN_TOP + plot_height;
    let slot = plot_width / 3;
    let bar_width = (slot * 3 / 5).max(1);
    let max = values.iter().copied().max().unwrap_or(0).max(1) as f64;

    let mut rects = [BarRect {
        x: 0,
        y: baseline,
        width: bar_width,
        height: 0,
    }; 3];
    for (idx, value) in values.iter().enumerate() {
        let bar_height = ((*value as f64 / max) * plot_height as f64).round() as u32;
        rects[idx] = BarRect {
            x: MARGIN_LEFT + slot * idx as u32 + (slot - bar_width) / 2,
            y: baseline - bar_height,
            width: bar_width,
            height: bar_height,
        };
    }
    rects
}

/// Draws the validation summary bar chart and encodes it as PNG.
pub fn render_chart(summary: &Summary, width: u32, height: u32) -> ReportResult<Vec<u8>> {
    let width = width.max(MARGIN_LEFT + MARGIN_RIGHT + 3);
    let height = height.max(MARGIN_TOP + MARGIN_BOTTOM + 1);
    let mut image: RgbImage = ImageBuffer::from_pixel(width, height, BACKGROUND);

    let values = [summary.passed, summary.failed, summary.skipped];
    let plot_height = height - MARGIN_TOP - MARGIN_BOTTOM;
    let baseline = MARGIN_TOP + plot_height;
    let right = width - MARGIN_RIGHT;

    let max = values.iter().copied().max().unwrap_or(0);
    if max > 0 {
        let steps = max.min(5) as u32;
        for step in 1..=steps {
            let y = baseline - plot_height * step / steps;
            fill(&mut image, MARGIN_LEFT, y, right - MARGIN_LEFT, 1, GRID);
        }
    }

    for (rect, color) in bar_layout(values, width, height).iter().zip(BAR_COLORS) {
        fill(&mut image, rect.x, rect.y, rect.width, rect.height, color);
    }

    fill(&mut image, MARGIN_LEFT, baseline, right - MARGIN_LEFT, 2, AXIS);
    fill(&mut image, MARGIN_LEFT - 2, MARGIN_TOP, 2, plot_height + 2, AXIS);

    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)?;
    Ok(bytes)
}

fn fill(image: &mut RgbImage, x: u32, y: u32, width: u32, height: u32, color: Rgb<u8>) {
    let x_end = (x + width).min(image.width());
    let y_end = (y + height).min(image.height());
    for px in x..x_end {
        for py in y..y_end {
            image.put_pixel(px, py, color);
        }
    }
}
