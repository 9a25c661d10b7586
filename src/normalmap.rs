use image::RgbaImage;

use crate::imageops::{clamp01, normalize_normal};


/// Tangent-space RGB -> `_nohq` storage channels.
///
/// The engine reconstructs the displayed normal as `R=255-A, G=G, B=B`, so
/// the stored channels are `R=0, G=Y, B=Z, A=255-X`.  Z additionally takes
/// the value reconstructed from X/Y when that is larger, which compensates
/// denormalized source maps.
pub(crate) fn swizzle_normal_map(image: &RgbaImage) -> RgbaImage {
	let mut out = image.clone();

	for pixel in out.pixels_mut() {
		let [r, g, b, _] = pixel.0;

		let nx = (f64::from(r) / 255.0) * 2.0 - 1.0;
		let ny = (f64::from(g) / 255.0) * 2.0 - 1.0;

		let mut z = b;
		let d = 1.0 - nx * nx - ny * ny;
		if d > 0.0 {
			#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
			let z_rec = (clamp01(d.sqrt() * 0.5 + 0.5) * 255.0) as u8;
			if z_rec > z {
				z = z_rec;
			};
		};

		pixel.0 = [0, g, z, 255 - r];
	};

	out
}


/// `_nohq` storage channels -> tangent-space RGB (inverse of
/// [`swizzle_normal_map`]), renormalized and remapped to 0..255.
pub(crate) fn unswizzle_normal_map(image: &RgbaImage) -> RgbaImage {
	let mut out = image.clone();

	for pixel in out.pixels_mut() {
		let [_, g, b, a] = pixel.0;

		let (nr, ng, nb) = normalize_normal(255 - a, g, b);
		pixel.0 = [nr, ng, nb, 255];
	};

	out
}


/// Decode the ADSHQ special-case swizzle (tag `02 09 03 09`): the stored
/// alpha carries the ambient term, spread into G/B/A with R zeroed.
pub(crate) fn apply_adshq_swizzle(image: &RgbaImage) -> RgbaImage {
	let mut out = image.clone();

	for pixel in out.pixels_mut() {
		let a = pixel.0[3];
		pixel.0 = [0, a, a, a];
	};

	out
}


#[cfg(test)]
mod tests {
	use super::*;

	fn tangent_normal_image(size: u32) -> RgbaImage {
		RgbaImage::from_fn(size, size, |x, y| {
			let nx = (f64::from(x) / f64::from(size - 1)) * 1.2 - 0.6;
			let ny = (f64::from(y) / f64::from(size - 1)) * 1.2 - 0.6;
			let nz = (1.0 - nx * nx - ny * ny).sqrt();

			#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
			image::Rgba([
				((nx * 0.5 + 0.5) * 255.0) as u8,
				((ny * 0.5 + 0.5) * 255.0) as u8,
				((nz * 0.5 + 0.5) * 255.0) as u8,
				255,
			])
		})
	}


	#[test]
	fn swizzle_flat_normal() {
		let img = RgbaImage::from_pixel(1, 1, image::Rgba([128, 128, 255, 255]));
		let swizzled = swizzle_normal_map(&img);
		assert_eq!(swizzled.get_pixel(0, 0).0, [0, 128, 255, 127]);
	}


	#[test]
	fn swizzle_reconstructs_z() {
		// Source B far too low; storage takes the reconstructed Z instead.
		let img = RgbaImage::from_pixel(1, 1, image::Rgba([128, 128, 0, 255]));
		let swizzled = swizzle_normal_map(&img);
		assert!(swizzled.get_pixel(0, 0).0[2] >= 254);
	}


	#[test]
	fn nohq_swizzle_roundtrip() {
		let img = tangent_normal_image(8);
		let restored = unswizzle_normal_map(&swizzle_normal_map(&img));

		for (orig, back) in img.pixels().zip(restored.pixels()) {
			for c in 0..3 {
				let diff = i32::from(orig.0[c]) - i32::from(back.0[c]);
				assert!(diff.abs() <= 2, "channel {c}: {} vs {}", orig.0[c], back.0[c]);
			};
			assert_eq!(back.0[3], 255);
		};
	}


	#[test]
	fn adshq_spreads_alpha() {
		let img = RgbaImage::from_pixel(1, 1, image::Rgba([9, 8, 7, 200]));
		let out = apply_adshq_swizzle(&img);
		assert_eq!(out.get_pixel(0, 0).0, [0, 200, 200, 200]);
	}
}
