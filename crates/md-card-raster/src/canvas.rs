use core::convert::Infallible;

use embedded_graphics::{pixelcolor::Rgb888, prelude::*, primitives::Rectangle};
use image::{Rgba, RgbaImage};

/// Draw target that can composite translucent pixels.
pub trait BlendTarget: DrawTarget<Color = Rgb888> {
    /// Source-over blend `color` at `alpha` onto the pixel at `point`.
    fn blend_pixel(&mut self, point: Point, color: Rgb888, alpha: u8) -> Result<(), Self::Error>;

    /// Multiply the pixel's alpha by `coverage` in `[0, 1]`.
    fn scale_alpha(&mut self, point: Point, coverage: f32) -> Result<(), Self::Error>;
}

/// RGBA pixel buffer the card is painted on. Starts fully transparent.
#[derive(Clone, Debug, PartialEq)]
pub struct Canvas {
    image: RgbaImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width.max(1), height.max(1), Rgba([0, 0, 0, 0])),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Pixel at `(x, y)`, `None` outside the canvas.
    pub fn pixel(&self, x: i32, y: i32) -> Option<[u8; 4]> {
        if x < 0 || y < 0 {
            return None;
        }
        self.image.get_pixel_checked(x as u32, y as u32).map(|px| px.0)
    }

    fn pixel_mut(&mut self, point: Point) -> Option<&mut Rgba<u8>> {
        if point.x < 0 || point.y < 0 {
            return None;
        }
        self.image.get_pixel_mut_checked(point.x as u32, point.y as u32)
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

impl DrawTarget for Canvas {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if let Some(px) = self.pixel_mut(point) {
                *px = Rgba([color.r(), color.g(), color.b(), 255]);
            }
        }
        Ok(())
    }
}

impl BlendTarget for Canvas {
    fn blend_pixel(&mut self, point: Point, color: Rgb888, alpha: u8) -> Result<(), Self::Error> {
        if let Some(px) = self.pixel_mut(point) {
            *px = blend_over(*px, color, alpha);
        }
        Ok(())
    }

    fn scale_alpha(&mut self, point: Point, coverage: f32) -> Result<(), Self::Error> {
        if let Some(px) = self.pixel_mut(point) {
            let a = px.0[3] as f32 * coverage.clamp(0.0, 1.0);
            px.0[3] = a.round() as u8;
        }
        Ok(())
    }
}

/// Straight-alpha source-over composite.
pub fn blend_over(dst: Rgba<u8>, color: Rgb888, alpha: u8) -> Rgba<u8> {
    if alpha == 255 {
        return Rgba([color.r(), color.g(), color.b(), 255]);
    }
    if alpha == 0 {
        return dst;
    }
    let sa = alpha as f32 / 255.0;
    let da = dst.0[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mix = |s: u8, d: u8| -> u8 {
        ((s as f32 * sa + d as f32 * da * (1.0 - sa)) / out_a)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    Rgba([
        mix(color.r(), dst.0[0]),
        mix(color.g(), dst.0[1]),
        mix(color.b(), dst.0[2]),
        (out_a * 255.0).round() as u8,
    ])
}

/// Adapter that blends everything drawn through it at a fixed alpha, so
/// embedded-graphics primitives can paint translucent shapes.
pub struct AlphaTarget<'a, D> {
    inner: &'a mut D,
    alpha: u8,
}

impl<'a, D> AlphaTarget<'a, D>
where
    D: BlendTarget,
{
    pub fn new(inner: &'a mut D, alpha: u8) -> Self {
        Self { inner, alpha }
    }
}

impl<D> Dimensions for AlphaTarget<'_, D>
where
    D: BlendTarget,
{
    fn bounding_box(&self) -> Rectangle {
        self.inner.bounding_box()
    }
}

impl<D> DrawTarget for AlphaTarget<'_, D>
where
    D: BlendTarget,
{
    type Color = Rgb888;
    type Error = D::Error;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        if self.alpha == 255 {
            return self.inner.draw_iter(pixels);
        }
        for Pixel(point, color) in pixels {
            self.inner.blend_pixel(point, color, self.alpha)?;
        }
        Ok(())
    }
}

/// Adapter that scales glyph pixels by an integer factor around a baseline
/// origin and shears them for synthetic italics.
pub struct GlyphTarget<'a, D> {
    inner: &'a mut D,
    origin: Point,
    scale: i32,
    shear: f32,
}

impl<'a, D> GlyphTarget<'a, D>
where
    D: DrawTarget<Color = Rgb888>,
{
    pub fn new(inner: &'a mut D, origin: Point, scale: i32, shear: f32) -> Self {
        Self {
            inner,
            origin,
            scale: scale.max(1),
            shear,
        }
    }
}

impl<D> Dimensions for GlyphTarget<'_, D>
where
    D: DrawTarget<Color = Rgb888>,
{
    fn bounding_box(&self) -> Rectangle {
        self.inner.bounding_box()
    }
}

impl<D> DrawTarget for GlyphTarget<'_, D>
where
    D: DrawTarget<Color = Rgb888>,
{
    type Color = Rgb888;
    type Error = D::Error;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (origin, scale, shear) = (self.origin, self.scale, self.shear);
        self.inner
            .draw_iter(pixels.into_iter().flat_map(move |Pixel(point, color)| {
                let base_x = origin.x + (point.x - origin.x) * scale;
                let base_y = origin.y + (point.y - origin.y) * scale;
                (0..scale * scale).map(move |i| {
                    let y = base_y + i / scale;
                    let slant = (shear * (origin.y - y) as f32).round() as i32;
                    Pixel(Point::new(base_x + i % scale + slant, y), color)
                })
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::primitives::PrimitiveStyle;

    #[test]
    fn new_canvas_is_transparent() {
        let canvas = Canvas::new(4, 3);
        assert_eq!(canvas.size(), Size::new(4, 3));
        assert_eq!(canvas.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(canvas.pixel(4, 0), None);
        assert_eq!(canvas.pixel(-1, 0), None);
    }

    #[test]
    fn opaque_draw_overwrites_and_ignores_out_of_bounds() {
        let mut canvas = Canvas::new(4, 4);
        let _ = Rectangle::new(Point::new(-2, -2), Size::new(4, 4))
            .into_styled(PrimitiveStyle::with_fill(Rgb888::new(10, 20, 30)))
            .draw(&mut canvas);
        assert_eq!(canvas.pixel(1, 1), Some([10, 20, 30, 255]));
        assert_eq!(canvas.pixel(2, 2), Some([0, 0, 0, 0]));
    }

    #[test]
    fn half_alpha_over_opaque_mixes() {
        let mut canvas = Canvas::new(1, 1);
        let _ = canvas.draw_iter([Pixel(Point::zero(), Rgb888::new(0, 0, 0))]);
        let mut translucent = AlphaTarget::new(&mut canvas, 128);
        let _ = translucent.draw_iter([Pixel(Point::zero(), Rgb888::new(255, 255, 255))]);
        assert_eq!(canvas.pixel(0, 0), Some([128, 128, 128, 255]));
    }

    #[test]
    fn blend_onto_transparent_keeps_color() {
        let px = blend_over(Rgba([0, 0, 0, 0]), Rgb888::new(200, 100, 50), 64);
        assert_eq!(px.0, [200, 100, 50, 64]);
    }

    #[test]
    fn glyph_target_scales_pixels() {
        let mut canvas = Canvas::new(8, 8);
        let origin = Point::new(2, 4);
        let mut glyph = GlyphTarget::new(&mut canvas, origin, 2, 0.0);
        let _ = glyph.draw_iter([Pixel(Point::new(3, 3), Rgb888::new(255, 0, 0))]);
        for (x, y) in [(4, 2), (5, 2), (4, 3), (5, 3)] {
            assert_eq!(canvas.pixel(x, y), Some([255, 0, 0, 255]), "({x}, {y})");
        }
        assert_eq!(canvas.pixel(3, 2), Some([0, 0, 0, 0]));
    }

    #[test]
    fn scale_alpha_fades_pixel() {
        let mut canvas = Canvas::new(1, 1);
        let _ = canvas.draw_iter([Pixel(Point::zero(), Rgb888::new(1, 2, 3))]);
        let _ = canvas.scale_alpha(Point::zero(), 0.5);
        assert_eq!(canvas.pixel(0, 0), Some([1, 2, 3, 128]));
    }
}
