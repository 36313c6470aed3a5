use image::{imageops, Rgb, RgbImage};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use speedtrack::BoundingBox;

/// Copy the region of `bbox` out of `image`. Returns `None` if the box lies entirely outside the image.
pub fn crop(image: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
  let (x, y, width, height) = bbox.to_region(image.width(), image.height())?;
  Some(imageops::crop_imm(image, x, y, width, height).to_image())
}

/// Draw the outline of `bbox` onto `image`, `thickness` pixels wide and growing inwards.
/// Boxes outside the image are ignored.
pub fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32) {
  if let Some((x, y, width, height)) = bbox.to_region(image.width(), image.height()) {
    (0..thickness)
      .take_while(|inset| width > inset * 2 && height > inset * 2)
      .for_each(|inset| {
        imageproc::drawing::draw_hollow_rect_mut(
          image,
          Rect::at((x + inset) as i32, (y + inset) as i32)
            .of_size(width - inset * 2, height - inset * 2),
          color,
        );
      });
  }
}

/// Write `text` just above `bbox`, or inside its top edge when there is no room above it.
pub fn draw_label(
  image: &mut RgbImage,
  bbox: &BoundingBox,
  text: &str,
  color: Rgb<u8>,
  font: &Font,
  size: f32,
) {
  if let Some((x, y, _, _)) = bbox.to_region(image.width(), image.height()) {
    imageproc::drawing::draw_text_mut(
      image,
      color,
      x as i32,
      (y as i32 - size as i32).max(0),
      Scale { x: size, y: size },
      font,
      text,
    );
  }
}
