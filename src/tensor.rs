use ndarray::{Array, Ix4};
use std::io::Cursor;

/// Decodes uploaded bytes into a batched NHWC tensor.
///
/// The image keeps its native spatial dimensions: the model accepts variable
/// height and width, so no resize is applied. Pixel values stay in their raw
/// 0-255 range, cast to f32.
pub fn image_to_batch(image_data: &[u8]) -> Result<Array<f32, Ix4>, image::ImageError> {
    let image_reader = image::ImageReader::new(Cursor::new(image_data))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?;

    let img = image_reader.decode()?.to_rgb8();
    let (width, height) = img.dimensions();

    let mut batch = Array::zeros((1, height as usize, width as usize, 3));
    for (x, y, pixel) in img.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        batch[[0, y as usize, x as usize, 0]] = r as f32;
        batch[[0, y as usize, x as usize, 1]] = g as f32;
        batch[[0, y as usize, x as usize, 2]] = b as f32;
    }

    Ok(batch)
}
