use embedded_graphics::{pixelcolor::Rgb888, prelude::*};
use image::RgbaImage;
use md_card::Rgb;
use md_card_render::{GradientCommand, GradientDirection};

use crate::canvas::BlendTarget;

/// Color at position `t` along evenly spaced `stops`.
pub fn sample_gradient(stops: &[Rgb], t: f32) -> Rgb {
    match stops {
        [] => Rgb::WHITE,
        [only] => *only,
        _ => {
            let t = t.clamp(0.0, 1.0);
            let segments = (stops.len() - 1) as f32;
            let scaled = t * segments;
            let idx = (scaled.floor() as usize).min(stops.len() - 2);
            stops[idx].lerp(stops[idx + 1], scaled - idx as f32)
        }
    }
}

/// Fill the whole target with the command's gradient.
pub fn paint_gradient<D>(target: &mut D, cmd: &GradientCommand) -> Result<(), D::Error>
where
    D: BlendTarget,
{
    let (width, height) = (cmd.width, cmd.height);
    let stops = cmd.stops.as_slice();
    let direction = cmd.direction;
    // Linear directions only vary along one axis; reuse a row or column.
    match direction {
        GradientDirection::Vertical => {
            let rows: Vec<Rgb> = (0..height)
                .map(|y| sample_gradient(stops, direction.position(0, y, width, height)))
                .collect();
            target.draw_iter((0..height).flat_map(|y| {
                let c = rows[y as usize];
                (0..width).map(move |x| pixel(x, y, c))
            }))
        }
        GradientDirection::Horizontal => {
            let cols: Vec<Rgb> = (0..width)
                .map(|x| sample_gradient(stops, direction.position(x, 0, width, height)))
                .collect();
            target.draw_iter(
                (0..height).flat_map(|y| (0..width).map(move |x| (x, y)))
                    .map(|(x, y)| pixel(x, y, cols[x as usize])),
            )
        }
        _ => target.draw_iter((0..height).flat_map(|y| {
            (0..width).map(move |x| {
                pixel(
                    x,
                    y,
                    sample_gradient(stops, direction.position(x, y, width, height)),
                )
            })
        })),
    }
}

fn pixel(x: u32, y: u32, c: Rgb) -> Pixel<Rgb888> {
    Pixel(Point::new(x as i32, y as i32), Rgb888::new(c.r, c.g, c.b))
}

/// Coverage of a corner pixel centered at `(px, py)` for a circle of
/// `radius` centered at `(cx, cy)`. One pixel of anti-aliasing.
fn corner_coverage(px: f32, py: f32, cx: f32, cy: f32, radius: f32) -> f32 {
    let dist = ((px - cx).powi(2) + (py - cy).powi(2)).sqrt();
    (radius + 0.5 - dist).clamp(0.0, 1.0)
}

/// Visit every pixel in the four corner squares of a `width` x `height`
/// area with its coverage below 1.
fn for_each_corner_pixel(
    width: u32,
    height: u32,
    radius: u32,
    mut visit: impl FnMut(u32, u32, f32),
) {
    let r = radius.min(width / 2).min(height / 2);
    if r == 0 {
        return;
    }
    let rf = r as f32;
    for dy in 0..r {
        for dx in 0..r {
            let coverage = corner_coverage(dx as f32 + 0.5, dy as f32 + 0.5, rf, rf, rf);
            if coverage >= 1.0 {
                continue;
            }
            let right = width - 1 - dx;
            let bottom = height - 1 - dy;
            visit(dx, dy, coverage);
            visit(right, dy, coverage);
            visit(dx, bottom, coverage);
            visit(right, bottom, coverage);
        }
    }
}

/// Clip the target's corners to `radius`, leaving them transparent.
pub fn clip_corners<D>(target: &mut D, radius: u32) -> Result<(), D::Error>
where
    D: BlendTarget,
{
    let size = target.bounding_box().size;
    let mut result = Ok(());
    for_each_corner_pixel(size.width, size.height, radius, |x, y, coverage| {
        if result.is_ok() {
            result = target.scale_alpha(Point::new(x as i32, y as i32), coverage);
        }
    });
    result
}

/// Round the corners of a standalone image, such as the title image.
pub fn round_image_corners(image: &mut RgbaImage, radius: u32) {
    let (width, height) = image.dimensions();
    for_each_corner_pixel(width, height, radius, |x, y, coverage| {
        let px = image.get_pixel_mut(x, y);
        px.0[3] = (px.0[3] as f32 * coverage).round() as u8;
    });
}
