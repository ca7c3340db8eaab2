//! CPU rasterization of a pipeline snapshot, for thumbnails and the CLI.

use image::{GrayImage, ImageBuffer, Rgba, RgbaImage};
use ndarray::ArrayView2;
use rayon::prelude::*;

use crate::{
    label_style::LabelStyleTable,
    pipeline::PipelineDescriptor,
    segmentation::LabelId,
    volume::Image,
    window_level::WindowLevel,
};

#[inline]
fn windowed_to_u8(value: f32, window_level: &WindowLevel) -> u8 {
    (window_level.normalize(value as f64) * 255.0).round() as u8
}

/// Frame `frame` of `image` mapped through `window_level` to 8-bit gray.
pub fn render_slice(image: &Image, frame: usize, window_level: &WindowLevel) -> Option<GrayImage> {
    let slice = image.frame(frame)?;
    let (height, width) = slice.dim();
    let pixel_data: Vec<u8> = slice
        .into_par_iter()
        .map(|&v| windowed_to_u8(v, window_level))
        .collect();
    ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
}

/// Whether a labelled pixel lies within `thickness` pixels (Chebyshev) of a
/// pixel carrying a different label. Pixels outside the frame don't count.
fn is_outline(labels: &ArrayView2<'_, LabelId>, y: usize, x: usize, thickness: usize) -> bool {
    let (height, width) = labels.dim();
    let label = labels[[y, x]];
    let window = |center: usize, len: usize| {
        center.saturating_sub(thickness)..center.saturating_add(thickness).saturating_add(1).min(len)
    };
    window(y, height).any(|ny| window(x, width).any(|nx| labels[[ny, nx]] != label))
}

#[inline]
fn blend(base: u8, color: u8, alpha: f32) -> u8 {
    (base as f32 * (1.0 - alpha) + color as f32 * alpha).round() as u8
}

/// Composite a label frame over a grayscale frame of the same size.
///
/// Labels are blended at their style opacity; outline pixels of labels with
/// an outline are drawn opaque. Returns `None` if the sizes differ.
pub fn render_overlay(
    base: &GrayImage,
    labels: ArrayView2<'_, LabelId>,
    styles: &LabelStyleTable,
) -> Option<RgbaImage> {
    let (height, width) = labels.dim();
    if base.dimensions() != (width as u32, height as u32) {
        return None;
    }

    let labels = &labels;
    let pixel_data: Vec<u8> = (0..height)
        .into_par_iter()
        .flat_map_iter(move |y| {
            (0..width).flat_map(move |x| {
                let gray = base.get_pixel(x as u32, y as u32)[0];
                match styles.get(labels[[y, x]]) {
                    None => [gray, gray, gray, u8::MAX],
                    Some(style) => {
                        let alpha = if style.outline
                            && is_outline(labels, y, x, style.outline_thickness as usize)
                        {
                            1.0
                        } else {
                            style.opacity
                        };
                        let [r, g, b] = style.color;
                        [
                            blend(gray, r, alpha),
                            blend(gray, g, alpha),
                            blend(gray, b, alpha),
                            u8::MAX,
                        ]
                    }
                }
            })
        })
        .collect();

    ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
}

/// Render the active slice of a descriptor, with its labels when the active
/// image is the segmentation background.
///
/// Only the first frame of a multi-frame image is drawn; navigation moves
/// between images, not frames.
pub fn render_descriptor(descriptor: &PipelineDescriptor) -> Option<RgbaImage> {
    let image = descriptor.active_image()?;
    let gray = render_slice(image, 0, &descriptor.window_level())?;
    match descriptor.active_segmentation() {
        Some(segmentation) => {
            let labels = segmentation.labels.frame(0)?;
            render_overlay(&gray, labels, &segmentation.styles)
        }
        None => Some(ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
            let v = gray.get_pixel(x, y)[0];
            Rgba([v, v, v, u8::MAX])
        })),
    }
}
