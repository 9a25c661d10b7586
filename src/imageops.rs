use image::RgbaImage;

use crate::Bgra8888Pixel;
use crate::texconfig::TextureMipmapFilter;


pub(crate) fn get_avgc_maxc(image: &RgbaImage) -> (Bgra8888Pixel, Bgra8888Pixel) {
	if image.width() == 0 || image.height() == 0 {
		return (Default::default(), Default::default());
	};

	let mut pix_count = 0u64;
	let mut avgc: [u64; 4] = [0; 4];
	let mut maxc: [u8; 4] = [0; 4];

	for pixel in image.pixels() {
		for (i, c) in pixel.0.iter().enumerate() {
			avgc[i] += u64::from(*c);
			maxc[i] = std::cmp::max(maxc[i], *c);
		};

		pix_count += 1;
	};

	#[allow(clippy::cast_possible_truncation)]
	let avgc = avgc.map(|c: u64| (c / pix_count) as u8);

	(image::Rgba::<u8>(avgc).into(), image::Rgba::<u8>(maxc).into())
}


/// Alpha channel statistics driving GALF emission and auto format selection
#[derive(Debug, Clone, Copy)]
pub(crate) struct AlphaStats {
	/// Any pixel with alpha below 255.
	pub(crate) has_alpha: bool,
	/// No pixel with alpha below 0xF0.
	pub(crate) all_high: bool,
	/// Every alpha is exactly 0 or 255.
	pub(crate) is_binary: bool,
}


pub(crate) fn scan_alpha(image: &RgbaImage) -> AlphaStats {
	let mut stats = AlphaStats { has_alpha: false, all_high: true, is_binary: true };

	for pixel in image.pixels() {
		let a = pixel.0[3];

		if a < 255 {
			stats.has_alpha = true;
		};
		if a < 0xF0 {
			stats.all_high = false;
		};
		if a != 0 && a != 255 {
			stats.is_binary = false;
		};
	};

	if !stats.has_alpha {
		stats.is_binary = true;
	};

	stats
}


/// Minimum and maximum of the alpha channel and of the combined RGB channels.
pub(crate) fn alpha_and_rgb_range(image: &RgbaImage) -> (u8, u8, u8, u8) {
	let (mut min_a, mut max_a) = (255u8, 0u8);
	let (mut min_rgb, mut max_rgb) = (255u8, 0u8);

	for pixel in image.pixels() {
		let [r, g, b, a] = pixel.0;

		min_a = min_a.min(a);
		max_a = max_a.max(a);
		min_rgb = min_rgb.min(r).min(g).min(b);
		max_rgb = max_rgb.max(r).max(g).max(b);
	};

	(min_a, max_a, min_rgb, max_rgb)
}


pub(crate) fn hint_mipmap_count((w, h): (u32, u32), min_dimension: u32) -> usize {
	let smaller = f64::from(std::cmp::min(w, h));
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	let hint = (smaller.log2() - f64::from(min_dimension).log2()).ceil() as usize;
	std::cmp::max(hint, 1usize)
}


#[test]
fn test_hint_mipmap_count() {
	assert_eq!(hint_mipmap_count((800, 1000), 6), 8);
	assert_eq!(hint_mipmap_count((1080, 2160), 30), 6);
}


/// Build the mip chain starting at (and including) `image`.
///
/// Each level halves both dimensions (never below 1).  Generation stops at
/// the first level whose dimensions are both `<= min_dimension`, or once
/// `max_count` levels exist (0 = unbounded).  When `use_srgb` is set the
/// halving averages in linear light instead of storage space.
pub(crate) fn construct_mipmap_series(image: &RgbaImage, min_dimension: u32, max_count: usize, use_srgb: bool) -> Vec<RgbaImage> {
	let mut result = Vec::with_capacity(hint_mipmap_count(image.dimensions(), std::cmp::max(min_dimension, 1)));
	let mut current = image.clone();

	loop {
		let (width, height) = current.dimensions();
		result.push(current.clone());

		if max_count > 0 && result.len() >= max_count {
			break;
		};

		if width <= min_dimension && height <= min_dimension {
			break;
		};

		let next_w = std::cmp::max(width / 2, 1);
		let next_h = std::cmp::max(height / 2, 1);

		current = if use_srgb {
			halve_srgb(&current, next_w, next_h)
		}
		else {
			image::imageops::resize(&current, next_w, next_h, image::imageops::FilterType::Triangle)
		};
	};

	result
}


/// Downscale by box-averaging 2x2 blocks in linear light; alpha averages
/// arithmetically.
fn halve_srgb(image: &RgbaImage, next_w: u32, next_h: u32) -> RgbaImage {
	let (width, height) = image.dimensions();
	let mut out = RgbaImage::new(next_w, next_h);

	for (x, y, pixel) in out.enumerate_pixels_mut() {
		let x0 = std::cmp::min(x * 2, width - 1);
		let x1 = std::cmp::min(x * 2 + 1, width - 1);
		let y0 = std::cmp::min(y * 2, height - 1);
		let y1 = std::cmp::min(y * 2 + 1, height - 1);

		let samples = [
			image.get_pixel(x0, y0).0,
			image.get_pixel(x1, y0).0,
			image.get_pixel(x0, y1).0,
			image.get_pixel(x1, y1).0,
		];

		let mut rgb = [0.0f64; 3];
		let mut alpha = 0.0f64;

		for s in &samples {
			for (acc, c) in rgb.iter_mut().zip(s.iter()) {
				*acc += srgb_to_linear(*c);
			};
			alpha += f64::from(s[3]);
		};

		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		let a = (alpha / 4.0).round() as u8;
		pixel.0 = [
			linear_to_srgb(rgb[0] / 4.0),
			linear_to_srgb(rgb[1] / 4.0),
			linear_to_srgb(rgb[2] / 4.0),
			a,
		];
	};

	out
}


fn srgb_to_linear(c: u8) -> f64 {
	let c = f64::from(c) / 255.0;

	if c <= 0.04045 {
		c / 12.92
	}
	else {
		((c + 0.055) / 1.055).powf(2.4)
	}
}


#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn linear_to_srgb(l: f64) -> u8 {
	let c = if l <= 0.003_130_8 {
		l * 12.92
	}
	else {
		1.055 * l.powf(1.0 / 2.4) - 0.055
	};

	(c.clamp(0.0, 1.0) * 255.0).round() as u8
}


/// Apply `filter` to one generated mip level.  Level 0 is never filtered.
pub(crate) fn apply_mipmap_filter(image: &mut RgbaImage, level: u32, filter: TextureMipmapFilter) {
	use TextureMipmapFilter::*;

	match filter {
		Default => (),
		FadeOut => fade_out_rgb(image, level),
		FadeOutAlpha => fade_out_alpha(image, level),
		AlphaNoise => apply_alpha_noise(image, level, 8),
		AddAlphaNoise => apply_alpha_noise(image, level, 16),
		NormalizeNormalMap => normalize_normal_map(image, false, false, level),
		NormalizeNormalMapAlpha => normalize_normal_map(image, true, false, level),
		// Observed tool behavior: the noise variant is identical to the alpha
		// variant, no separate noise pass.
		NormalizeNormalMapNoise => normalize_normal_map(image, true, false, level),
		NormalizeNormalMapFade => normalize_normal_map(image, true, true, level),
	};
}


/// Blend R, G and B toward mid-gray by the level fade factor.
fn fade_out_rgb(image: &mut RgbaImage, level: u32) {
	let f = 0.5f64.powi(level.try_into().unwrap_or(i32::MAX));

	for pixel in image.pixels_mut() {
		pixel.0[0] = blend_to_value(pixel.0[0], 128, f);
		pixel.0[1] = blend_to_value(pixel.0[1], 128, f);
		pixel.0[2] = blend_to_value(pixel.0[2], 128, f);
	};
}


/// Scale alpha by the level fade factor.
fn fade_out_alpha(image: &mut RgbaImage, level: u32) {
	let f = 0.5f64.powi(level.try_into().unwrap_or(i32::MAX));

	for pixel in image.pixels_mut() {
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		let a = (f64::from(pixel.0[3]) * f).round() as u8;
		pixel.0[3] = a;
	};
}


fn apply_alpha_noise(image: &mut RgbaImage, level: u32, strength: i32) {
	for (x, y, pixel) in image.enumerate_pixels_mut() {
		let noise = alpha_noise(x, y, level, strength);
		pixel.0[3] = clamp_u8(i32::from(pixel.0[3]) + noise);
	};
}


/// Renormalize (R,G,B) as a tangent-space unit normal.  Alpha is preserved
/// when `keep_alpha`, otherwise forced opaque.  `fade` additionally blends
/// the normal toward straight-up (128,128,255) by the level fade factor.
fn normalize_normal_map(image: &mut RgbaImage, keep_alpha: bool, fade: bool, level: u32) {
	let f = 0.5f64.powi(level.try_into().unwrap_or(i32::MAX));

	for pixel in image.pixels_mut() {
		let [r, g, b, a] = pixel.0;

		let (mut nr, mut ng, mut nb) = normalize_normal(r, g, b);
		if fade {
			nr = blend_to_value(nr, 128, f);
			ng = blend_to_value(ng, 128, f);
			nb = blend_to_value(nb, 255, f);
		};

		pixel.0 = [nr, ng, nb, if keep_alpha { a } else { 255 }];
	};
}


#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn normalize_normal(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
	let mut nx = (f64::from(r) / 255.0) * 2.0 - 1.0;
	let mut ny = (f64::from(g) / 255.0) * 2.0 - 1.0;
	let mut nz = (f64::from(b) / 255.0) * 2.0 - 1.0;

	let len = (nx * nx + ny * ny + nz * nz).sqrt();
	if len > 0.0 {
		nx /= len;
		ny /= len;
		nz /= len;
	}
	else {
		(nx, ny, nz) = (0.0, 0.0, 1.0);
	};

	(
		(clamp01(nx * 0.5 + 0.5) * 255.0) as u8,
		(clamp01(ny * 0.5 + 0.5) * 255.0) as u8,
		(clamp01(nz * 0.5 + 0.5) * 255.0) as u8,
	)
}


#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn blend_to_value(v: u8, target: u8, factor: f64) -> u8 {
	(f64::from(target) * (1.0 - factor) + f64::from(v) * factor).round() as u8
}


/// Deterministic per-pixel noise in [-16, 15], scaled by `strength / 16`.
fn alpha_noise(x: u32, y: u32, level: u32, strength: i32) -> i32 {
	let mut n = x.wrapping_mul(1_103_515_245)
		.wrapping_add(y.wrapping_mul(12_345))
		.wrapping_add(level.wrapping_mul(1_013_904_223));
	n ^= n >> 13;
	n = n.wrapping_mul(0x85EB_CA6B);

	#[allow(clippy::cast_possible_wrap)]
	let v = (n & 0x1F) as i32 - 16;

	if strength <= 0 {
		return v;
	};

	v * strength / 16
}


#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_u8(v: i32) -> u8 {
	v.clamp(0, 255) as u8
}


pub(crate) fn clamp01(f: f64) -> f64 {
	f.clamp(0.0, 1.0)
}


#[cfg(test)]
mod tests {
	use super::*;

	fn gradient(size: u32) -> RgbaImage {
		RgbaImage::from_fn(size, size, |x, y| {
			#[allow(clippy::cast_possible_truncation)]
			image::Rgba([(x * 8) as u8, (y * 8) as u8, 128, 255])
		})
	}


	#[test]
	fn avgc_maxc_solid() {
		let img = RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]));
		let (avgc, maxc) = get_avgc_maxc(&img);
		assert_eq!((avgc.r, avgc.g, avgc.b, avgc.a), (10, 20, 30, 255));
		assert_eq!((maxc.r, maxc.g, maxc.b, maxc.a), (10, 20, 30, 255));
	}


	#[test]
	fn avgc_truncates() {
		let mut img = RgbaImage::from_pixel(2, 1, image::Rgba([0, 0, 0, 255]));
		img.put_pixel(1, 0, image::Rgba([255, 0, 0, 255]));
		let (avgc, maxc) = get_avgc_maxc(&img);
		assert_eq!(avgc.r, 127);
		assert_eq!(maxc.r, 255);
	}


	#[test]
	fn alpha_stats() {
		let opaque = RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255]));
		let stats = scan_alpha(&opaque);
		assert!(!stats.has_alpha && stats.all_high && stats.is_binary);

		let mut soft = opaque.clone();
		soft.put_pixel(0, 0, image::Rgba([1, 2, 3, 100]));
		let stats = scan_alpha(&soft);
		assert!(stats.has_alpha && !stats.all_high && !stats.is_binary);

		let mut binary = opaque;
		binary.put_pixel(0, 0, image::Rgba([1, 2, 3, 0]));
		let stats = scan_alpha(&binary);
		assert!(stats.has_alpha && !stats.all_high && stats.is_binary);
	}


	#[test]
	fn mip_chain_dxt_default() {
		let mips = construct_mipmap_series(&gradient(64), 4, 0, false);
		let dims = mips.iter().map(RgbaImage::dimensions).collect::<Vec<_>>();
		assert_eq!(dims, vec![(64, 64), (32, 32), (16, 16), (8, 8), (4, 4)]);
	}


	#[test]
	fn mip_chain_max_count() {
		let mips = construct_mipmap_series(&gradient(64), 1, 2, false);
		assert_eq!(mips.len(), 2);
	}


	#[test]
	fn mip_chain_to_one() {
		let mips = construct_mipmap_series(&gradient(8), 1, 0, false);
		let dims = mips.iter().map(RgbaImage::dimensions).collect::<Vec<_>>();
		assert_eq!(dims, vec![(8, 8), (4, 4), (2, 2), (1, 1)]);
	}


	#[test]
	fn srgb_halving_dims() {
		let mips = construct_mipmap_series(&gradient(16), 4, 0, true);
		let dims = mips.iter().map(RgbaImage::dimensions).collect::<Vec<_>>();
		assert_eq!(dims, vec![(16, 16), (8, 8), (4, 4)]);
	}


	#[test]
	fn noise_is_deterministic() {
		for (x, y, level) in [(0, 0, 1), (5, 9, 2), (31, 7, 3)] {
			let a = alpha_noise(x, y, level, 8);
			let b = alpha_noise(x, y, level, 8);
			assert_eq!(a, b);
			assert!((-16..=15).contains(&a));
		};

		assert_ne!(
			(0..32).map(|x| alpha_noise(x, 0, 1, 16)).collect::<Vec<_>>(),
			vec![0; 32],
		);
	}


	#[test]
	fn fade_out_blends_toward_mid() {
		let mut img = RgbaImage::from_pixel(1, 1, image::Rgba([255, 0, 128, 200]));
		apply_mipmap_filter(&mut img, 1, TextureMipmapFilter::FadeOut);
		// f = 0.5: channels move halfway toward 128, alpha untouched.
		assert_eq!(img.get_pixel(0, 0).0, [192, 64, 128, 200]);
	}


	#[test]
	fn fade_out_alpha_scales() {
		let mut img = RgbaImage::from_pixel(1, 1, image::Rgba([10, 20, 30, 200]));
		apply_mipmap_filter(&mut img, 2, TextureMipmapFilter::FadeOutAlpha);
		assert_eq!(img.get_pixel(0, 0).0[3], 50);
	}


	#[test]
	fn normalize_sets_unit_normal() {
		let mut img = RgbaImage::from_pixel(1, 1, image::Rgba([200, 90, 250, 77]));
		apply_mipmap_filter(&mut img, 1, TextureMipmapFilter::NormalizeNormalMap);

		let [r, g, b, a] = img.get_pixel(0, 0).0;
		let nx = (f64::from(r) / 255.0) * 2.0 - 1.0;
		let ny = (f64::from(g) / 255.0) * 2.0 - 1.0;
		let nz = (f64::from(b) / 255.0) * 2.0 - 1.0;
		let len = (nx * nx + ny * ny + nz * nz).sqrt();
		assert!((len - 1.0).abs() < 0.02, "normalized length {len}");
		assert_eq!(a, 255);

		let mut img = RgbaImage::from_pixel(1, 1, image::Rgba([200, 90, 250, 77]));
		apply_mipmap_filter(&mut img, 1, TextureMipmapFilter::NormalizeNormalMapAlpha);
		assert_eq!(img.get_pixel(0, 0).0[3], 77);
	}
}
