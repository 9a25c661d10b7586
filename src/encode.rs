use std::io::Write;

use image::RgbaImage;

use crate::{ArgbSwizzle, Bgra8888Pixel, PaaImage, PaaMipmap, PaaResult, PaaType, Tagg, Transparency};
use crate::PaaError::*;
use crate::imageops;
use crate::macros;
use crate::normalmap;
use crate::policy;
use crate::texconfig::{TexConvertConfig, TextureMipmapFilter};


/// Block-compression effort forwarded to the BCn encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BcnQuality {
	RangeFit,
	ClusterFit,
	IterativeClusterFit,
}


impl BcnQuality {
	fn to_algorithm(self) -> texpresso::Algorithm {
		match self {
			BcnQuality::RangeFit => texpresso::Algorithm::RangeFit,
			BcnQuality::ClusterFit => texpresso::Algorithm::ClusterFit,
			BcnQuality::IterativeClusterFit => texpresso::Algorithm::IterativeClusterFit,
		}
	}
}


/// Relative RGB error weights for DXT compression (TexView convention, e.g.
/// `(5,9,2)`); normalized before being handed to the BCn encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct RgbWeights {
	pub r: u8,
	pub g: u8,
	pub b: u8,
}


/// Options forwarded to the external BCn block encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BcnEncodeOptions {
	/// Compression effort; `None` uses the encoder default (cluster fit).
	pub quality: Option<BcnQuality>,
	/// RGB error weights; `None` uses the encoder's perceptual default.
	pub rgb_weights: Option<RgbWeights>,
}


impl BcnEncodeOptions {
	pub(crate) fn to_params(&self) -> texpresso::Params {
		let algorithm = self.quality.unwrap_or(BcnQuality::ClusterFit).to_algorithm();
		let mut params = texpresso::Params { algorithm, ..texpresso::Params::default() };

		if let Some(w) = self.rgb_weights {
			let sum = f32::from(w.r) + f32::from(w.g) + f32::from(w.b);
			if sum > 0.0 {
				params.weights = [f32::from(w.r) / sum, f32::from(w.g) / sum, f32::from(w.b) / sum];
			};
		};

		params
	}
}


/// Steps applied to an RGBA image when converting to PAA
///
/// The default value mirrors plain [`encode`]: automatic DXT1/DXT5 selection,
/// full mip chain, no compression of mip payloads beyond the block format
/// itself, no tags beyond CGVA/CXAM/SFFO.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
	/// Output pixel format; `None` selects DXT5 when the image has any
	/// non-opaque alpha and DXT1 otherwise.
	pub paatype: Option<PaaType>,
	/// BCn encoder options.
	pub bcn: BcnEncodeOptions,
	/// Channel swizzle applied to the pixel payload of every mip.
	pub swizzle: Option<ArgbSwizzle>,
	/// Generate the mip chain below the base image.
	pub generate_mipmaps: bool,
	/// Filter applied to generated mip levels.
	pub mipmap_filter: TextureMipmapFilter,
	/// Limit on the number of mip levels, including the base (0 = no limit).
	pub max_mip_count: usize,
	/// Stop mip generation once both dimensions are `<=` this value
	/// (0 = format default: 4 for DXT, 1 otherwise).
	pub min_mip_size: u32,
	/// Apply the tangent-space normal-map storage swizzle and default to
	/// DXT5 (for `_nohq` maps).
	pub normal_map_swizzle: bool,
	/// Write the canonical `_nohq` SWIZTAGG (`05 04 02 03`).
	pub write_nohq_swizzle_tag: bool,
	/// Write this SWIZTAGG payload (takes precedence over
	/// [`write_nohq_swizzle_tag`][Self::write_nohq_swizzle_tag]).
	pub swizzle_tag: Option<ArgbSwizzle>,
	/// Do not apply [`swizzle`][Self::swizzle] to the pixel payload (used
	/// when the input is already swizzled); the tag is still written.
	pub skip_swizzle: bool,
	/// Write a GALF tag with this alpha character.
	pub galf: Option<Transparency>,
	/// Write CXAM as `FF FF FF FF` regardless of the actual maxima (always
	/// the case for DXT outputs).
	pub force_cxam_full: bool,
	/// Per-mip LZO compression for DXT payloads (width MSB).
	pub use_lzo: bool,
	/// LZSS-compress non-DXT payloads even when that grows them.
	pub force_lzss: bool,
	/// sRGB-aware downscaling during mip generation.
	pub use_srgb: bool,
}


impl Default for EncodeOptions {
	fn default() -> Self {
		Self {
			paatype: None,
			bcn: BcnEncodeOptions::default(),
			swizzle: None,
			generate_mipmaps: true,
			mipmap_filter: TextureMipmapFilter::Default,
			max_mip_count: 0,
			min_mip_size: 0,
			normal_map_swizzle: false,
			write_nohq_swizzle_tag: false,
			swizzle_tag: None,
			skip_swizzle: false,
			galf: None,
			force_cxam_full: false,
			use_lzo: false,
			force_lzss: false,
			use_srgb: false,
		}
	}
}


/// Wrapper around [`EncodeOptions`] that encodes an [`image::RgbaImage`] into
/// a [`PaaImage`]
#[allow(missing_debug_implementations)]
#[derive(Clone)]
pub struct PaaEncoder {
	image: RgbaImage,
	options: EncodeOptions,
}


impl PaaEncoder {
	/// Creates a new encoder from an [`image::RgbaImage`] and
	/// [`EncodeOptions`].
	pub fn with_image_and_options(image: RgbaImage, options: EncodeOptions) -> Self {
		Self { image, options }
	}


	/// Build the [`PaaImage`]: tags in canonical order (CGVA, CXAM, GALF,
	/// ZIWS) and the filtered, swizzled, per-level-compressed mip chain.
	///
	/// # Errors
	/// - [`InvalidDimensions`]: a dimension is 0 or exceeds 65535.
	/// - [`UnsupportedFormat`]: DXT2/3/4 requested as encode target.
	pub fn encode(&self) -> PaaResult<PaaImage> {
		use PaaType::*;

		let image = &self.image;
		let opts = &self.options;

		let (width, height) = image.dimensions();
		if width == 0 || height == 0 || width > 0xFFFF || height > 0xFFFF {
			return Err(InvalidDimensions);
		};

		// CGVA/CXAM and the alpha statistics come from the input before any
		// swizzle touches the payload.
		let (avgc, mut maxc) = imageops::get_avgc_maxc(image);
		let stats = imageops::scan_alpha(image);

		let paatype = match opts.paatype {
			Some(paatype) => paatype,
			None if opts.normal_map_swizzle => Dxt5,
			None if stats.has_alpha => Dxt5,
			None => Dxt1,
		};

		if matches!(paatype, Dxt2 | Dxt3 | Dxt4) {
			return Err(UnsupportedFormat(format!("{:?}", paatype)));
		};

		if paatype.is_dxtn() || opts.force_cxam_full || opts.normal_map_swizzle {
			maxc = Bgra8888Pixel { b: 255, g: 255, r: 255, a: 255 };
		};

		macros::log!(trace, "PaaEncoder::encode: type={:?}, avgc={}, maxc={}", paatype, avgc, maxc);

		let min_mip_size = match opts.min_mip_size {
			0 if paatype.is_dxtn() => 4,
			0 => 1,
			size => size,
		};

		let mip_images = if opts.generate_mipmaps {
			let mut mips = imageops::construct_mipmap_series(image, min_mip_size, opts.max_mip_count, opts.use_srgb);

			for (level, mip) in mips.iter_mut().enumerate().skip(1) {
				#[allow(clippy::cast_possible_truncation)]
				imageops::apply_mipmap_filter(mip, level as u32, opts.mipmap_filter);
			};

			mips
		}
		else {
			vec![image.clone()]
		};

		let compression = PaaMipmap::suggest_compression(paatype, opts.use_lzo, opts.force_lzss);

		let mut mipmaps: Vec<PaaMipmap> = Vec::with_capacity(mip_images.len());

		for mip_image in &mip_images {
			let payload_image = if opts.normal_map_swizzle {
				normalmap::swizzle_normal_map(mip_image)
			}
			else if let (Some(swizzle), false) = (&opts.swizzle, opts.skip_swizzle) {
				let mut swizzled = mip_image.clone();
				swizzle.apply_to_image(&mut swizzled);
				swizzled
			}
			else {
				mip_image.clone()
			};

			mipmaps.push(PaaMipmap::encode(paatype, &payload_image, &opts.bcn, compression)?);
		};

		mipmaps.truncate(PaaImage::MAX_MIPMAPS);

		let mut taggs = vec![
			Tagg::Avgc { rgba: avgc },
			Tagg::Maxc { rgba: maxc },
		];

		if let Some(transparency) = opts.galf {
			taggs.push(Tagg::Flag { transparency });
		};

		let swizzle_tag = opts.swizzle_tag.or({
			if opts.write_nohq_swizzle_tag { Some(ArgbSwizzle::nohq()) } else { None }
		});

		if let Some(swizzle) = swizzle_tag {
			taggs.push(Tagg::Swiz { swizzle });
		};

		Ok(PaaImage { paatype, taggs, mipmaps })
	}
}


/// Encode with default settings: DXT5 when the image has any non-opaque
/// alpha, otherwise DXT1; full mip chain down to 4x4; no LZO; no swizzle tag.
///
/// For filename-based settings, use [`encode_with_texconfig`].
///
/// # Errors
/// See [`encode_with_options`].
pub fn encode<W: Write>(img: &RgbaImage, output: &mut W) -> PaaResult<()> {
	encode_with_options(img, output, &EncodeOptions::default())
}


/// Encode `img` into `output` as configured by `opts`.
///
/// # Errors
/// - [`InvalidDimensions`]: a dimension is 0 or exceeds 65535.
/// - [`UnsupportedFormat`]: DXT2/3/4 requested as encode target.
/// - [`UnexpectedIoError`]: writing to `output` failed.
pub fn encode_with_options<W: Write>(img: &RgbaImage, output: &mut W, opts: &EncodeOptions) -> PaaResult<()> {
	let paa = PaaEncoder::with_image_and_options(img.clone(), opts.clone()).encode()?;
	paa.write_to(output)
}


/// Resolve filename-based settings from a TexConvert config and encode the
/// image using those settings.  Without a matching hint this falls back to
/// automatic format selection (with LZO unless the config disables it).
///
/// # Errors
/// See [`encode_with_texconfig_options`].
pub fn encode_with_texconfig<W: Write>(img: &RgbaImage, output: &mut W, name: &str, cfg: &TexConvertConfig) -> PaaResult<()> {
	encode_with_texconfig_options(img, output, name, cfg, None)
}


/// As [`encode_with_texconfig`], with caller overrides applied on top of the
/// hint-derived options.
///
/// # Errors
/// - [`UnsupportedFormat`]: the hint names an engine-viewer-incompatible
///   class or a format the encoder rejects.
/// - Otherwise see [`encode_with_options`].
pub fn encode_with_texconfig_options<W: Write>(
	img: &RgbaImage,
	output: &mut W,
	name: &str,
	cfg: &TexConvertConfig,
	override_opts: Option<&EncodeOptions>,
) -> PaaResult<()> {
	let (image, opts) = policy::resolve_encode_options(img, name, cfg, override_opts)?;
	encode_with_options(&image, output, &opts)
}


#[cfg(test)]
mod tests {
	use super::*;
	use byteorder::{ByteOrder, LittleEndian};

	fn offsets_of(paa: &PaaImage) -> Vec<u32> {
		paa.taggs.iter()
			.find_map(|t| match t {
				Tagg::Offs { offsets } => Some(offsets.clone()),
				_ => None,
			})
			.unwrap_or_default()
	}


	#[test]
	fn white_4x4_defaults_to_dxt1() {
		let img = RgbaImage::from_pixel(4, 4, image::Rgba([255, 255, 255, 255]));

		let mut buf = Vec::new();
		encode(&img, &mut buf).unwrap();

		assert_eq!(&buf[0..2], &[0x01, 0xFF]);

		let paa = PaaImage::from_bytes(&buf).unwrap();
		assert_eq!(paa.paatype, PaaType::Dxt1);
		assert_eq!(paa.mipmaps.len(), 1);
		assert_eq!((paa.mipmaps[0].width, paa.mipmaps[0].height), (4, 4));
	}


	#[test]
	fn alpha_selects_dxt5() {
		let img = RgbaImage::from_pixel(4, 4, image::Rgba([255, 255, 255, 100]));

		let mut buf = Vec::new();
		encode(&img, &mut buf).unwrap();
		assert_eq!(&buf[0..2], &[0x05, 0xFF]);
	}


	#[test]
	fn nohq_tags_bgra_and_cxam() {
		let img = RgbaImage::from_fn(8, 8, |x, y| {
			#[allow(clippy::cast_possible_truncation)]
			image::Rgba([10 + x as u8, 20 + y as u8, 200, 255])
		});

		let opts = EncodeOptions {
			paatype: Some(PaaType::Dxt5),
			normal_map_swizzle: true,
			swizzle_tag: Some(ArgbSwizzle::from_tag_bytes([0x05, 0x04, 0x02, 0x03]).unwrap()),
			generate_mipmaps: false,
			..EncodeOptions::default()
		};

		let mut buf = Vec::new();
		encode_with_options(&img, &mut buf, &opts).unwrap();

		let paa = PaaImage::from_bytes(&buf).unwrap();

		let avgc = paa.taggs.iter().find_map(|t| match t {
			Tagg::Avgc { rgba } => Some(*rgba),
			_ => None,
		}).unwrap();
		assert_eq!((avgc.b, avgc.g, avgc.r, avgc.a), (200, 23, 13, 255));

		let maxc = paa.taggs.iter().find_map(|t| match t {
			Tagg::Maxc { rgba } => Some(*rgba),
			_ => None,
		}).unwrap();
		assert_eq!((maxc.b, maxc.g, maxc.r, maxc.a), (255, 255, 255, 255));

		let ziws = paa.taggs.iter().find_map(|t| match t {
			Tagg::Swiz { swizzle } => Some(swizzle.tag_bytes()),
			_ => None,
		}).unwrap();
		assert_eq!(ziws, [0x05, 0x04, 0x02, 0x03]);
	}


	#[test]
	fn default_mip_chain_of_64() {
		let img = RgbaImage::from_pixel(64, 64, image::Rgba([128, 128, 128, 255]));

		let mut buf = Vec::new();
		encode_with_options(&img, &mut buf, &EncodeOptions::default()).unwrap();

		let paa = PaaImage::from_bytes(&buf).unwrap();
		assert_eq!(paa.mipmaps.len(), 5);

		let dims = paa.mipmaps.iter().map(|m| m.width).collect::<Vec<_>>();
		assert_eq!(dims, vec![64, 32, 16, 8, 4]);

		let offsets = offsets_of(&paa);
		assert_eq!(offsets.len(), 5);
		assert!(offsets.windows(2).all(|w| w[0] < w[1]));
		assert!(offsets.iter().all(|o| (*o as usize) < buf.len()));
	}


	#[test]
	fn lzo_flag_on_first_mip() {
		let img = RgbaImage::from_pixel(16, 16, image::Rgba([255, 255, 255, 255]));

		let opts = EncodeOptions {
			use_lzo: true,
			generate_mipmaps: false,
			..EncodeOptions::default()
		};

		let mut buf = Vec::new();
		encode_with_options(&img, &mut buf, &opts).unwrap();

		let paa = PaaImage::from_bytes(&buf).unwrap();
		let offset = offsets_of(&paa)[0] as usize;

		let raw_width = LittleEndian::read_u16(&buf[offset..offset + 2]);
		assert_eq!(raw_width & 0x8000, 0x8000);
		assert_eq!(raw_width & 0x7FFF, 16);

		assert_eq!((paa.mipmaps[0].width, paa.mipmaps[0].height), (16, 16));
	}


	#[test]
	fn forced_lzss_checksum_trails_payload() {
		let img = RgbaImage::from_fn(8, 8, |x, y| {
			#[allow(clippy::cast_possible_truncation)]
			image::Rgba([(x * 16) as u8, (y * 16) as u8, 77, 255])
		});

		let opts = EncodeOptions {
			paatype: Some(PaaType::Argb4444),
			force_lzss: true,
			generate_mipmaps: false,
			..EncodeOptions::default()
		};

		let mut buf = Vec::new();
		encode_with_options(&img, &mut buf, &opts).unwrap();

		let paa = PaaImage::from_bytes(&buf).unwrap();
		let offset = offsets_of(&paa)[0] as usize;

		#[allow(clippy::cast_possible_truncation)]
		let stored = LittleEndian::read_u24(&buf[offset + 4..offset + 7]) as usize;
		let payload = &buf[offset + 7..offset + 7 + stored];

		let raw = PaaMipmap::encode(PaaType::Argb4444, &img, &BcnEncodeOptions::default(), crate::PaaMipmapCompression::Uncompressed)
			.unwrap()
			.data;
		assert_eq!(raw.len(), 128);

		let mut sum = 0i32;
		for b in &raw {
			sum = sum.wrapping_add(i32::from(*b as i8));
		};

		#[allow(clippy::cast_sign_loss)]
		let expected = sum as u32;
		assert_eq!(LittleEndian::read_u32(&payload[payload.len() - 4..]), expected);
	}


	#[test]
	fn sentinel_and_trailing_padding() {
		let img = RgbaImage::from_pixel(8, 8, image::Rgba([1, 2, 3, 255]));

		let mut buf = Vec::new();
		encode(&img, &mut buf).unwrap();

		let paa = PaaImage::from_bytes(&buf).unwrap();
		let first = offsets_of(&paa)[0] as usize;

		assert_eq!(&buf[first - 2..first], &[0, 0]);
		assert_eq!(&buf[buf.len() - 6..], &[0u8; 6]);
	}


	#[test]
	fn dxt3_encode_target_is_rejected() {
		let img = RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 255]));

		let opts = EncodeOptions {
			paatype: Some(PaaType::Dxt3),
			..EncodeOptions::default()
		};

		let mut buf = Vec::new();
		assert!(matches!(
			encode_with_options(&img, &mut buf, &opts),
			Err(UnsupportedFormat(_)),
		));
	}


	#[test]
	fn zero_sized_image_is_rejected() {
		let img = RgbaImage::new(0, 0);
		let mut buf = Vec::new();
		assert!(matches!(encode(&img, &mut buf), Err(InvalidDimensions)));
	}


	#[test]
	fn oversized_image_is_rejected() {
		let img = RgbaImage::new(65536, 1);
		let mut buf = Vec::new();
		assert!(matches!(encode(&img, &mut buf), Err(InvalidDimensions)));
	}


	#[test]
	fn mip_count_is_capped_at_offset_table() {
		// 65535x1 would halve 16+ times; ARGB8888 keeps min size 1.
		let img = RgbaImage::from_pixel(65535, 1, image::Rgba([9, 9, 9, 255]));

		let opts = EncodeOptions {
			paatype: Some(PaaType::Argb8888),
			..EncodeOptions::default()
		};

		let mut buf = Vec::new();
		encode_with_options(&img, &mut buf, &opts).unwrap();

		let paa = PaaImage::from_bytes(&buf).unwrap();
		assert_eq!(paa.mipmaps.len(), PaaImage::MAX_MIPMAPS);
		assert_eq!(offsets_of(&paa).len(), PaaImage::MAX_MIPMAPS);
	}
}
