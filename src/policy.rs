use image::RgbaImage;

use crate::{ArgbSwizzle, ChannelSwizzleData, ChannelSwizzleFill, ChannelSwizzleId, PaaResult, PaaType, Transparency};
use crate::PaaError::*;
use crate::encode::{EncodeOptions, RgbWeights};
use crate::imageops;
use crate::texconfig::{TexConvertConfig, TexFormat, TextureErrorMetrics, TextureHint, TextureMipmapFilter};


/// Resolve a filename against `cfg` and derive the effective encoder options,
/// possibly transforming the input image (alpha promotion, auto-reduce).
///
/// Without a matching hint the result is the automatic DXT1/DXT5 selection
/// with LZO enabled unless the config disables it.
pub(crate) fn resolve_encode_options(
	img: &RgbaImage,
	name: &str,
	cfg: &TexConvertConfig,
	override_opts: Option<&EncodeOptions>,
) -> PaaResult<(RgbaImage, EncodeOptions)> {
	let hint = match cfg.resolve(name) {
		Some(hint) => hint.clone(),

		None => {
			let mut opts = EncodeOptions {
				use_lzo: !cfg.disable_lzo,
				// Auto selection always lands on a DXT format.
				force_cxam_full: true,
				..EncodeOptions::default()
			};

			if cfg.apply_default_error_metrics {
				opts.bcn.rgb_weights = Some(RgbWeights { r: 5, g: 9, b: 2 });
			};

			if let Some(overrides) = override_opts {
				merge_encode_overrides(&mut opts, overrides);
			};

			return Ok((img.clone(), opts));
		},
	};

	if is_texview_unsupported(&hint) {
		return Err(UnsupportedFormat(hint.class_name));
	};

	if hint.enable_dxt == Some(false)
		&& !matches!(hint.format, TexFormat::Argb4444 | TexFormat::Argb1555 | TexFormat::Ai88 | TexFormat::P8)
	{
		return Err(UnsupportedFormat(hint.class_name));
	};

	let mut image = img.clone();
	let mut skip_swizzle = false;

	// Detail-style swizzles copy the alpha channel into RGB.  A fully opaque
	// source would then flatten to constant white, so the detail content is
	// promoted from RGB into alpha first; if RGB carries no detail either,
	// the payload swizzle is pointless and only the tag is kept.
	if uses_alpha_for_rgb(&hint.swizzle) {
		let (min_a, max_a, min_rgb, max_rgb) = imageops::alpha_and_rgb_range(&image);

		if min_a == 255 && max_a == 255 {
			if min_rgb == max_rgb {
				skip_swizzle = true;
			}
			else {
				promote_alpha_from_rgb(&mut image);
			};
		};
	};

	image = auto_reduce_if_needed(image, &hint, cfg);

	let stats = imageops::scan_alpha(&image);
	let paatype = select_paatype(stats, &hint)?;

	let mut opts = EncodeOptions {
		paatype: Some(paatype),
		..EncodeOptions::default()
	};

	if paatype.is_dxtn() {
		opts.use_lzo = !cfg.disable_lzo;
		opts.force_cxam_full = true;
	};

	if paatype.is_argb() {
		opts.force_cxam_full = true;
	};

	if paatype == PaaType::Argb4444 {
		opts.force_lzss = true;
	};

	if !hint.swizzle.is_noop() {
		if hint.virtual_swz.unwrap_or(true) {
			opts.swizzle_tag = Some(hint.swizzle);
		};

		if skip_swizzle {
			opts.skip_swizzle = true;
		}
		else {
			opts.swizzle = Some(hint.swizzle);
		};
	};

	if !stats.all_high {
		opts.galf = Some(if stats.is_binary {
			Transparency::AlphaNotInterpolated
		}
		else {
			Transparency::AlphaInterpolated
		});
	};

	if is_detail_hint(&hint) {
		opts.galf = Some(Transparency::AlphaNotInterpolated);
	};

	opts.bcn.rgb_weights = Some(match hint.error_metrics {
		TextureErrorMetrics::Distance => RgbWeights { r: 5, g: 5, b: 0 },
		TextureErrorMetrics::NormalMap => RgbWeights { r: 5, g: 5, b: 5 },
		TextureErrorMetrics::Default => {
			if cfg.apply_default_error_metrics {
				RgbWeights { r: 5, g: 9, b: 2 }
			}
			else {
				RgbWeights { r: 5, g: 5, b: 5 }
			}
		},
	});

	if hint.mipmap_filter != TextureMipmapFilter::Default {
		opts.mipmap_filter = hint.mipmap_filter;
	};

	if cfg.use_srgb_from_dyn_range && hint.dyn_range == Some(true) {
		opts.use_srgb = true;
	};

	if let Some(overrides) = override_opts {
		merge_encode_overrides(&mut opts, overrides);
	};

	Ok((image, opts))
}


/// Formats that crash the engine's texture viewer despite matching
/// TexConvert.cfg; rejected outright.
fn is_texview_unsupported(hint: &TextureHint) -> bool {
	matches!(hint.class_name.as_str(), "TexRGBA8888" | "ColorMapRaw" | "layer_color_draft")
}


fn is_detail_hint(hint: &TextureHint) -> bool {
	matches!(hint.class_name.as_str(), "detail" | "detail_short")
}


fn select_paatype(stats: imageops::AlphaStats, hint: &TextureHint) -> PaaResult<PaaType> {
	match hint.format {
		TexFormat::Default => {
			if stats.all_high || !stats.has_alpha || stats.is_binary {
				Ok(PaaType::Dxt1)
			}
			else {
				Ok(PaaType::Dxt5)
			}
		},

		TexFormat::Dxt1 => Ok(PaaType::Dxt1),
		TexFormat::Dxt5 => Ok(PaaType::Dxt5),
		TexFormat::Argb4444 => Ok(PaaType::Argb4444),
		TexFormat::Argb1555 => Ok(PaaType::Argb1555),
		TexFormat::Ai88 => Ok(PaaType::Ai88),

		format @ (TexFormat::P8 | TexFormat::Dxt2 | TexFormat::Dxt3 | TexFormat::Dxt4) => {
			Err(UnsupportedFormat(format!("{:?}", format)))
		},
	}
}


/// True when the swizzle routes the input alpha into all three RGB outputs
/// and pins the output alpha to constant one.
fn uses_alpha_for_rgb(swizzle: &ArgbSwizzle) -> bool {
	let from_alpha = ChannelSwizzleData::Source { neg_flag: false, source: ChannelSwizzleId::Alpha };

	swizzle.r.data == from_alpha
		&& swizzle.g.data == from_alpha
		&& swizzle.b.data == from_alpha
		&& swizzle.a.data == ChannelSwizzleData::Fill { value: ChannelSwizzleFill::FillFF }
}


/// Replace alpha with the RGB average so a detail swizzle picks up the
/// content.
fn promote_alpha_from_rgb(image: &mut RgbaImage) {
	for pixel in image.pixels_mut() {
		let [r, g, b, _] = pixel.0;
		#[allow(clippy::cast_possible_truncation)]
		let lum = ((u16::from(r) + u16::from(g) + u16::from(b)) / 3) as u8;
		pixel.0[3] = lum;
	};
}


/// Pick the largest mip level that fits within the hint's size limit.
fn auto_reduce_if_needed(image: RgbaImage, hint: &TextureHint, cfg: &TexConvertConfig) -> RgbaImage {
	if cfg.disable_auto_reduce || hint.auto_reduce != Some(true) || hint.limit_size == 0 {
		return image;
	};

	let (w, h) = image.dimensions();
	if w == 0 || h == 0 || std::cmp::max(w, h) <= hint.limit_size {
		return image;
	};

	let use_srgb = cfg.use_srgb_from_dyn_range && hint.dyn_range == Some(true);
	let mips = imageops::construct_mipmap_series(&image, 1, 0, use_srgb);

	for mip in mips {
		let (mw, mh) = mip.dimensions();
		if mw <= hint.limit_size && mh <= hint.limit_size {
			return mip;
		};
	};

	image
}


/// Caller-supplied overrides replace specific fields only: BCn options
/// deep-merge, `skip_swizzle` also clears the payload swizzle,
/// `force_cxam_full` is always taken from the override, `force_lzss` only
/// ORs in.
pub(crate) fn merge_encode_overrides(dst: &mut EncodeOptions, overrides: &EncodeOptions) {
	if let Some(quality) = overrides.bcn.quality {
		dst.bcn.quality = Some(quality);
	};

	if let Some(weights) = overrides.bcn.rgb_weights {
		dst.bcn.rgb_weights = Some(weights);
	};

	if overrides.skip_swizzle {
		dst.skip_swizzle = true;
		dst.swizzle = None;
	};

	dst.force_cxam_full = overrides.force_cxam_full;

	if overrides.force_lzss {
		dst.force_lzss = true;
	};
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::encode::BcnQuality;

	fn gray(alpha: u8) -> RgbaImage {
		RgbaImage::from_fn(8, 8, |x, y| {
			#[allow(clippy::cast_possible_truncation)]
			image::Rgba([(x * 30) as u8, (y * 30) as u8, 128, alpha])
		})
	}


	#[test]
	fn nohq_hint_options() {
		let cfg = TexConvertConfig::builtin();
		let (_, opts) = resolve_encode_options(&gray(255), "my_normal_nohq.paa", &cfg, None).unwrap();

		assert_eq!(opts.paatype, Some(PaaType::Dxt5));
		assert_eq!(opts.swizzle_tag.map(|s| s.tag_bytes()), Some([0x05, 0x04, 0x02, 0x03]));
		assert!(opts.swizzle.is_some());
		assert_eq!(opts.bcn.rgb_weights, Some(RgbWeights { r: 5, g: 5, b: 5 }));
		assert_eq!(opts.mipmap_filter, TextureMipmapFilter::NormalizeNormalMapAlpha);
		assert!(opts.use_lzo);
		assert!(opts.force_cxam_full);
	}


	#[test]
	fn texview_unsupported_classes() {
		let cfg = TexConvertConfig::builtin();

		for name in ["test_raw.paa", "test_draftlco.paa", "test_8888.paa"] {
			let result = resolve_encode_options(&gray(255), name, &cfg, None);
			assert!(matches!(result, Err(UnsupportedFormat(_))), "{name}");
		};
	}


	#[test]
	fn detail_promotes_rgb_into_alpha() {
		let cfg = TexConvertConfig::builtin();
		let (image, opts) = resolve_encode_options(&gray(255), "moss_detail.paa", &cfg, None).unwrap();

		assert_eq!(opts.galf, Some(Transparency::AlphaNotInterpolated));
		assert!(opts.swizzle.is_some());
		assert!(!opts.skip_swizzle);

		// Alpha now carries the RGB average.
		let p = image.get_pixel(2, 1).0;
		assert_eq!(p[3], ((u16::from(p[0]) + u16::from(p[1]) + u16::from(p[2])) / 3) as u8);
	}


	#[test]
	fn detail_with_flat_rgb_skips_payload_swizzle() {
		let cfg = TexConvertConfig::builtin();
		let flat = RgbaImage::from_pixel(8, 8, image::Rgba([128, 128, 128, 255]));
		let (_, opts) = resolve_encode_options(&flat, "moss_detail.paa", &cfg, None).unwrap();

		assert!(opts.skip_swizzle);
		assert!(opts.swizzle.is_none());
		assert!(opts.swizzle_tag.is_some());
	}


	#[test]
	fn default_format_follows_alpha() {
		let cfg = TexConvertConfig::builtin();

		let (_, opts) = resolve_encode_options(&gray(255), "rock_normalmap.paa", &cfg, None).unwrap();
		assert_eq!(opts.paatype, Some(PaaType::Dxt1));

		let (_, opts) = resolve_encode_options(&gray(100), "rock_normalmap.paa", &cfg, None).unwrap();
		assert_eq!(opts.paatype, Some(PaaType::Dxt5));
	}


	#[test]
	fn argb4444_forces_lzss() {
		let cfg = TexConvertConfig::builtin();
		let (_, opts) = resolve_encode_options(&gray(255), "ui_4444.paa", &cfg, None).unwrap();

		assert_eq!(opts.paatype, Some(PaaType::Argb4444));
		assert!(opts.force_lzss);
		assert!(opts.force_cxam_full);
		assert!(!opts.use_lzo);
	}


	#[test]
	fn grayscale_hint_is_plain() {
		let cfg = TexConvertConfig::builtin();
		let (_, opts) = resolve_encode_options(&gray(200), "fog_gs.paa", &cfg, None).unwrap();

		assert_eq!(opts.paatype, Some(PaaType::Ai88));
		assert!(!opts.force_cxam_full);
		assert!(!opts.force_lzss);
	}


	#[test]
	fn no_hint_defaults() {
		let cfg = TexConvertConfig::builtin();
		let (_, opts) = resolve_encode_options(&gray(255), "free_form.png", &cfg, None).unwrap();

		assert_eq!(opts.paatype, None);
		assert!(opts.use_lzo);
		assert!(opts.force_cxam_full);
	}


	#[test]
	fn auto_reduce_picks_fitting_mip() {
		let mut cfg = TexConvertConfig::builtin();
		cfg.hints.insert(0, TextureHint {
			class_name: "limited".into(),
			pattern: "*_lim.*".into(),
			format: TexFormat::Dxt1,
			auto_reduce: Some(true),
			limit_size: 8,
			..TextureHint::default()
		});

		let big = RgbaImage::from_pixel(32, 32, image::Rgba([10, 20, 30, 255]));
		let (image, _) = resolve_encode_options(&big, "ground_lim.paa", &cfg, None).unwrap();
		assert_eq!(image.dimensions(), (8, 8));

		cfg.disable_auto_reduce = true;
		let (image, _) = resolve_encode_options(&big, "ground_lim.paa", &cfg, None).unwrap();
		assert_eq!(image.dimensions(), (32, 32));
	}


	#[test]
	fn override_merge_semantics() {
		let cfg = TexConvertConfig::builtin();

		let overrides = EncodeOptions {
			skip_swizzle: true,
			force_lzss: true,
			force_cxam_full: false,
			bcn: crate::encode::BcnEncodeOptions {
				quality: Some(BcnQuality::RangeFit),
				rgb_weights: Some(RgbWeights { r: 1, g: 2, b: 3 }),
			},
			..EncodeOptions::default()
		};

		let (_, opts) = resolve_encode_options(&gray(255), "my_normal_nohq.paa", &cfg, Some(&overrides)).unwrap();

		assert!(opts.skip_swizzle);
		assert!(opts.swizzle.is_none());
		assert!(opts.swizzle_tag.is_some());
		assert!(!opts.force_cxam_full);
		assert!(opts.force_lzss);
		assert_eq!(opts.bcn.quality, Some(BcnQuality::RangeFit));
		assert_eq!(opts.bcn.rgb_weights, Some(RgbWeights { r: 1, g: 2, b: 3 }));
	}
}
