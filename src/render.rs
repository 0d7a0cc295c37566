use crate::types::YearCount;
use anyhow::{anyhow, Context, Result};
use image::{ImageBuffer, Rgba, RgbaImage};
use std::fs;
use std::path::Path;
use tracing::info;

const WIDTH: u32 = 680;
const HEIGHT: u32 = 320;
const MARGIN: u32 = 56;
const BAR_COLOR: &str = "#636efa";
const AXIS_COLOR: &str = "#9ca3af";

pub const X_LABEL: &str = "Año";
pub const Y_LABEL: &str = "Registros de presencia";
pub const TITLE: &str = "Historial de registros por año";

/// Writes the year chart, picking SVG or PNG from the file extension.
pub fn write_year_chart(path: &Path, years: &[YearCount]) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Chart output file has no extension"))?;

    match extension.as_str() {
        "svg" => fs::write(path, year_chart_svg(years))
            .with_context(|| format!("Failed to write chart: {:?}", path))?,
        "png" => year_chart_png(years)
            .save(path)
            .with_context(|| format!("Failed to write chart: {:?}", path))?,
        _ => return Err(anyhow!("Unsupported chart format: {}", extension)),
    }

    info!("Wrote year chart to {:?}", path);
    Ok(())
}

/// Bar geometry shared by both renderers: (x, y, width, height) per bar.
fn bar_layout(years: &[YearCount]) -> Vec<(f64, f64, f64, f64)> {
    if years.is_empty() {
        return Vec::new();
    }

    let chart_width = (WIDTH - 2 * MARGIN) as f64;
    let chart_height = (HEIGHT - 2 * MARGIN) as f64;
    let max_count = years.iter().map(|y| y.count).max().unwrap_or(0).max(1) as f64;
    let slot = chart_width / years.len() as f64;

    years
        .iter()
        .enumerate()
        .map(|(i, y)| {
            let height = y.count as f64 / max_count * chart_height;
            let x = MARGIN as f64 + i as f64 * slot + slot * 0.1;
            let top = MARGIN as f64 + chart_height - height;
            (x, top, slot * 0.8, height)
        })
        .collect()
}

pub fn year_chart_svg(years: &[YearCount]) -> String {
    let bottom = HEIGHT - MARGIN;
    let mut bars = String::new();
    let mut labels = String::new();

    for (year, (x, y, w, h)) in years.iter().zip(bar_layout(years)) {
        let center = x + w / 2.0;
        bars.push_str(&format!(
            r##"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}"><title>{}: {}</title></rect>"##,
            x, y, w, h, BAR_COLOR, year.year, year.count
        ));
        labels.push_str(&format!(
            r##"<text x="{:.1}" y="{}" text-anchor="middle" font-size="11" fill="#6b7280">{}</text>"##,
            center,
            bottom + 16,
            year.year
        ));
        labels.push_str(&format!(
            r##"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="10" fill="#374151">{}</text>"##,
            center,
            y - 4.0,
            year.count
        ));
    }

    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">
  <text x="{cx}" y="24" text-anchor="middle" font-size="14" font-weight="600" fill="#374151">{title}</text>
  <line x1="{m}" y1="{b}" x2="{r}" y2="{b}" stroke="{axis}" stroke-width="1"/>
  <line x1="{m}" y1="{m}" x2="{m}" y2="{b}" stroke="{axis}" stroke-width="1"/>
  {bars}
  {labels}
  <text x="{cx}" y="{xl}" text-anchor="middle" font-size="12" fill="#6b7280">{x_label}</text>
  <text x="16" y="{cy}" text-anchor="middle" font-size="12" fill="#6b7280" transform="rotate(-90, 16, {cy})">{y_label}</text>
</svg>"##,
        w = WIDTH,
        h = HEIGHT,
        cx = WIDTH / 2,
        cy = HEIGHT / 2,
        m = MARGIN,
        b = bottom,
        r = WIDTH - MARGIN,
        xl = HEIGHT - 12,
        axis = AXIS_COLOR,
        title = TITLE,
        x_label = X_LABEL,
        y_label = Y_LABEL,
        bars = bars,
        labels = labels,
    )
}

/// Raster version of the chart: bars and axes only, no text.
pub fn year_chart_png(years: &[YearCount]) -> RgbaImage {
    let mut img: RgbaImage = ImageBuffer::from_pixel(WIDTH, HEIGHT, Rgba([255, 255, 255, 255]));
    let bar = hex_to_rgba(BAR_COLOR);
    let axis = hex_to_rgba(AXIS_COLOR);

    for (x, y, w, h) in bar_layout(years) {
        let x0 = x.round() as u32;
        let x1 = (x + w).round() as u32;
        let y0 = y.round() as u32;
        let y1 = (y + h).round() as u32;
        for px in x0..x1.min(WIDTH) {
            for py in y0..y1.min(HEIGHT) {
                img.put_pixel(px, py, bar);
            }
        }
    }

    for px in MARGIN..=(WIDTH - MARGIN) {
        img.put_pixel(px, HEIGHT - MARGIN, axis);
    }
    for py in MARGIN..=(HEIGHT - MARGIN) {
        img.put_pixel(MARGIN, py, axis);
    }

    img
}

fn hex_to_rgba(hex: &str) -> Rgba<u8> {
    let hex = hex.trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .unwrap_or(0)
    };
    Rgba([channel(0..2), channel(2..4), channel(4..6), 255])
}
