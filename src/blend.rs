use std::borrow::Cow;

use image::{imageops, imageops::FilterType, GrayImage, Rgb, RgbImage, Rgba, RgbaImage};

use crate::types::Mask;

/// Combine an image with its foreground mask into RGBA, the mask becoming the alpha channel.
/// A mask of a different size is stretched onto the image first.
pub fn apply_mask(image: &RgbImage, mask: &Mask) -> RgbaImage {
    let alpha = fit_alpha(mask.as_image(), image.dimensions());
    let mut out = RgbaImage::new(image.width(), image.height());

    for ((dst, Rgb([red, green, blue])), coverage) in
        out.pixels_mut().zip(image.pixels()).zip(alpha.pixels())
    {
        *dst = Rgba([*red, *green, *blue, coverage[0]]);
    }
    out
}

fn fit_alpha(alpha: &GrayImage, (width, height): (u32, u32)) -> Cow<'_, GrayImage> {
    if alpha.dimensions() == (width, height) {
        Cow::Borrowed(alpha)
    } else {
        Cow::Owned(imageops::resize(alpha, width, height, FilterType::Nearest))
    }
}
