use std::path::Path;
use std::sync::RwLock;

use enum_utils::FromStr;

use crate::{ArgbSwizzle, PaaResult};
use crate::cfgfile;


/// Target pixel format requested by a `TexConvert.cfg` hint
///
/// This mirrors the `format` property names of the config file; it is wider
/// than [`PaaType`][crate::PaaType] because the config can also request
/// `Default` (auto selection) and legacy formats the encoder rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromStr)]
#[enumeration(case_insensitive)]
#[allow(missing_docs)]
pub enum TexFormat {
	Default,
	P8,
	Argb4444,
	Argb1555,
	Ai88,
	Dxt1,
	Dxt2,
	Dxt3,
	Dxt4,
	Dxt5,
}


impl Default for TexFormat {
	fn default() -> Self {
		TexFormat::Default
	}
}


/// Mipmap filter requested by a `TexConvert.cfg` hint, applied to every
/// generated level below the base image
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromStr)]
#[enumeration(case_insensitive)]
#[allow(missing_docs)]
pub enum TextureMipmapFilter {
	Default,
	FadeOut,
	FadeOutAlpha,
	AlphaNoise,
	AddAlphaNoise,
	NormalizeNormalMap,
	NormalizeNormalMapAlpha,
	NormalizeNormalMapNoise,
	NormalizeNormalMapFade,
}


impl Default for TextureMipmapFilter {
	fn default() -> Self {
		TextureMipmapFilter::Default
	}
}


/// Error weighting for DXT compression, resolved to RGB weights by the
/// encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromStr)]
#[enumeration(case_insensitive)]
#[allow(missing_docs)]
pub enum TextureErrorMetrics {
	Default,
	Distance,
	NormalMap,
}


impl Default for TextureErrorMetrics {
	fn default() -> Self {
		TextureErrorMetrics::Default
	}
}


/// A single `TextureHints` class entry from `TexConvert.cfg`, resolved and
/// flattened
///
/// The three-state booleans are material: `None` means "unset / inherit the
/// encoder default", which differs from an explicit `Some(false)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextureHint {
	/// Config class name, used for diagnostics and a few class-specific
	/// encoder rules.
	pub class_name: String,
	/// Base class name, if any.
	pub extends: Option<String>,
	/// Filename wildcard (e.g. `*_nohq.*`); `*` matches any run, `?` one
	/// character, case-insensitive.
	pub pattern: String,
	/// Requested encoder format.
	pub format: TexFormat,
	/// Channel remap applied before encoding.
	pub swizzle: ArgbSwizzle,
	/// Mipmap filter.
	pub mipmap_filter: TextureMipmapFilter,
	/// Error weighting for DXT compression.
	pub error_metrics: TextureErrorMetrics,
	/// Maximum dimension for auto-reduce (0 = no limit).
	pub limit_size: u32,
	/// Whether DXT output is allowed.
	pub enable_dxt: Option<bool>,
	/// Dynamic range flag; drives sRGB-aware mip generation when the config
	/// enables [`TexConvertConfig::use_srgb_from_dyn_range`].
	pub dyn_range: Option<bool>,
	/// Downscale via the mip chain to fit [`limit_size`][Self::limit_size].
	pub auto_reduce: Option<bool>,
	/// Whether a non-identity swizzle is written as a ZIWS tag.
	pub virtual_swz: Option<bool>,
	/// Dithering flag (carried for config fidelity; the codec never dithers).
	pub dithering: Option<bool>,
}


/// Typed representation of `TexConvert.cfg`
///
/// Hints keep their config order; filename resolution picks the first match.
/// The boolean toggles are extensions over the original config surface.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TexConvertConfig {
	/// Config file version (`convertVersion`).
	pub convert_version: u32,
	/// Flattened hint list in config order.
	pub hints: Vec<TextureHint>,
	/// Force the default error weights (5,9,2) when a hint leaves
	/// `errorMetrics` unset.
	pub apply_default_error_metrics: bool,
	/// Apply `dynRange` to mipmap generation (sRGB downscale).
	pub use_srgb_from_dyn_range: bool,
	/// Disable auto-reduce even when hints request it.
	pub disable_auto_reduce: bool,
	/// Disable LZO compression for DXT payloads.
	pub disable_lzo: bool,
}


impl TexConvertConfig {
	/// Parse the original `TexConvert.cfg` class syntax.
	///
	/// # Errors
	/// - [`TexconvertParse`][crate::PaaError::TexconvertParse]: malformed input.
	/// - [`TexconvertInvalidInherit`][crate::PaaError::TexconvertInvalidInherit]:
	///   a hint class inherits a class that does not precede it.
	pub fn parse(input: &str) -> PaaResult<Self> {
		cfgfile::try_parse_texconvert(input)
	}


	/// Return the first hint whose pattern matches the base filename of
	/// `name`, case-insensitively.
	///
	/// # Example
	/// ```
	/// # use paa::{TexConvertConfig, TexFormat};
	/// let cfg = TexConvertConfig::builtin();
	/// let hint = cfg.resolve("data/rock_nohq.paa").unwrap();
	/// assert_eq!(hint.class_name, "normalmap_hq");
	/// assert_eq!(hint.format, TexFormat::Dxt5);
	/// ```
	pub fn resolve(&self, name: &str) -> Option<&TextureHint> {
		let base = Path::new(name)
			.file_name()
			.map_or_else(|| name.to_lowercase(), |n| n.to_string_lossy().to_lowercase());

		self.hints.iter().find(|hint| {
			!hint.pattern.is_empty() && wildcard_match(&hint.pattern.to_lowercase(), &base)
		})
	}


	/// The library default config mirroring the engine's `TexConvert.cfg`.
	pub fn builtin() -> Self {
		fn swz(a: &str, r: &str, g: &str, b: &str) -> ArgbSwizzle {
			ArgbSwizzle::parse_argb(a, r, g, b).expect("builtin swizzle")
		}

		fn hint(class_name: &str, pattern: &str, format: TexFormat) -> TextureHint {
			TextureHint {
				class_name: class_name.into(),
				pattern: pattern.into(),
				format,
				..TextureHint::default()
			}
		}

		use TexFormat::*;
		use TextureErrorMetrics::{Distance, NormalMap};
		use TextureMipmapFilter::{
			AddAlphaNoise, AlphaNoise, FadeOut, NormalizeNormalMap,
			NormalizeNormalMapAlpha, NormalizeNormalMapFade, NormalizeNormalMapNoise,
		};

		let hints = vec![
			TextureHint {
				dyn_range: Some(true),
				// TexView crashes on ARGB1555 output for this class; the
				// encoder rejects it.
				..hint("TexRGBA8888", "*_8888.*", Argb1555)
			},
			TextureHint {
				dyn_range: Some(true),
				..hint("ColorMap", "*_co.*", Dxt1)
			},
			TextureHint {
				dyn_range: Some(false),
				..hint("ColorMapRaw", "*_raw.*", Argb1555)
			},
			TextureHint {
				dyn_range: Some(true),
				..hint("ColorAlphaMap", "*_ca.*", Dxt5)
			},
			TextureHint {
				dyn_range: Some(true),
				mipmap_filter: AlphaNoise,
				..hint("ColorAlphaTest", "*_cat.*", Dxt5)
			},
			TextureHint {
				swizzle: swz("1-G", "R", "1-A", "B"),
				dyn_range: Some(false),
				..hint("sky", "*_sky.*", Dxt5)
			},
			TextureHint {
				enable_dxt: Some(true),
				swizzle: swz("1", "A", "A", "A"),
				dyn_range: Some(false),
				mipmap_filter: FadeOut,
				..hint("detail", "*_detail.*", Dxt1)
			},
			TextureHint {
				enable_dxt: Some(true),
				dyn_range: Some(false),
				mipmap_filter: FadeOut,
				..hint("color_detail", "*_cdt.*", Dxt1)
			},
			TextureHint {
				enable_dxt: Some(true),
				auto_reduce: Some(true),
				dyn_range: Some(false),
				..hint("layer_color", "*_lco.*", Dxt1)
			},
			TextureHint {
				enable_dxt: Some(true),
				auto_reduce: Some(true),
				dyn_range: Some(false),
				..hint("multiply_color", "*_mco.*", Dxt1)
			},
			TextureHint {
				enable_dxt: Some(false),
				dyn_range: Some(false),
				..hint("layer_color_draft", "*_draftlco.*", Argb1555)
			},
			TextureHint {
				enable_dxt: Some(true),
				dyn_range: Some(false),
				..hint("layer_color_alpha", "*_lca.*", Dxt5)
			},
			TextureHint {
				enable_dxt: Some(true),
				auto_reduce: Some(true),
				dyn_range: Some(false),
				..hint("mask", "*_mask.*", Dxt1)
			},
			TextureHint {
				enable_dxt: Some(true),
				auto_reduce: Some(true),
				dyn_range: Some(false),
				..hint("prt", "*_pr.*", Dxt5)
			},
			TextureHint {
				enable_dxt: Some(true),
				swizzle: swz("1", "1", "G", "B"),
				dyn_range: Some(false),
				error_metrics: Distance,
				..hint("ambient_diffuse_shadow", "*_ads.*", Dxt1)
			},
			TextureHint {
				swizzle: swz("G", "0", "B", "0"),
				dyn_range: Some(false),
				error_metrics: Distance,
				..hint("ambient_diffuse_shadow_hq", "*_adshq.*", Dxt5)
			},
			TextureHint {
				enable_dxt: Some(true),
				swizzle: swz("1", "R", "G", "B"),
				dyn_range: Some(false),
				error_metrics: Distance,
				..hint("detail_specular_diffuseinverse_map", "*_dtsmdi.*", Dxt1)
			},
			TextureHint {
				enable_dxt: Some(true),
				dyn_range: Some(false),
				..hint("macro", "*_mc.*", Dxt5)
			},
			TextureHint {
				enable_dxt: Some(true),
				swizzle: swz("1", "1", "G", "1"),
				dyn_range: Some(false),
				..hint("ambient_shadow", "*_as.*", Dxt1)
			},
			TextureHint {
				enable_dxt: Some(true),
				swizzle: swz("1", "R", "G", "B"),
				dyn_range: Some(false),
				..hint("specular_map", "*_sm.*", Dxt1)
			},
			TextureHint {
				enable_dxt: Some(true),
				swizzle: swz("1", "1", "G", "B"),
				dyn_range: Some(false),
				..hint("specular_diffuseinverse_map", "*_smdi.*", Dxt1)
			},
			TextureHint {
				enable_dxt: Some(true),
				swizzle: swz("1", "A", "A", "A"),
				dyn_range: Some(false),
				mipmap_filter: FadeOut,
				..hint("detail_short", "*_dt.*", Dxt1)
			},
			TextureHint {
				enable_dxt: Some(true),
				mipmap_filter: NormalizeNormalMapAlpha,
				dyn_range: Some(false),
				error_metrics: NormalMap,
				..hint("normalmap", "*_normalmap.*", Default)
			},
			TextureHint {
				enable_dxt: Some(true),
				mipmap_filter: NormalizeNormalMapAlpha,
				dyn_range: Some(false),
				error_metrics: NormalMap,
				swizzle: swz("1", "R", "G", "B"),
				..hint("normalmap_short", "*_no.*", Dxt1)
			},
			TextureHint {
				enable_dxt: Some(false),
				mipmap_filter: NormalizeNormalMapAlpha,
				dyn_range: Some(false),
				error_metrics: NormalMap,
				..hint("normalmap_uncompressed", "*_noex.*", Argb4444)
			},
			TextureHint {
				mipmap_filter: NormalizeNormalMapNoise,
				dyn_range: Some(false),
				error_metrics: NormalMap,
				..hint("NormalMapNoise", "*_non.*", Dxt5)
			},
			TextureHint {
				swizzle: swz("1-R", "1-A", "G", "B"),
				dyn_range: Some(false),
				error_metrics: NormalMap,
				mipmap_filter: NormalizeNormalMapAlpha,
				..hint("normalmap_hq", "*_nohq.*", Dxt5)
			},
			TextureHint {
				swizzle: swz("1-R", "1", "G", "1"),
				dyn_range: Some(false),
				error_metrics: NormalMap,
				mipmap_filter: NormalizeNormalMapAlpha,
				..hint("normalmap_vhq", "*_novhq.*", Dxt5)
			},
			TextureHint {
				swizzle: swz("1-R", "1-A", "G", "B"),
				dyn_range: Some(false),
				error_metrics: NormalMap,
				mipmap_filter: NormalizeNormalMapFade,
				..hint("normalmap_hq_fade", "*_nofhq.*", Dxt5)
			},
			TextureHint {
				enable_dxt: Some(true),
				mipmap_filter: NormalizeNormalMapFade,
				dyn_range: Some(false),
				error_metrics: NormalMap,
				..hint("normalmapFade", "*_nof.*", Default)
			},
			TextureHint {
				enable_dxt: Some(false),
				mipmap_filter: NormalizeNormalMapFade,
				dyn_range: Some(false),
				error_metrics: NormalMap,
				..hint("normalmapFade_uncompressed", "*_nofex.*", Argb4444)
			},
			TextureHint {
				enable_dxt: Some(true),
				mipmap_filter: NormalizeNormalMap,
				dyn_range: Some(false),
				error_metrics: NormalMap,
				..hint("normalmap_spec", "*_ns.*", Default)
			},
			TextureHint {
				enable_dxt: Some(true),
				mipmap_filter: NormalizeNormalMap,
				dyn_range: Some(false),
				swizzle: swz("1-R", "A", "G", "B"),
				error_metrics: NormalMap,
				..hint("normalmap_parallax", "*_nopx.*", Dxt5)
			},
			TextureHint {
				enable_dxt: Some(false),
				mipmap_filter: NormalizeNormalMap,
				dyn_range: Some(false),
				error_metrics: NormalMap,
				..hint("normalmap_spec_uncompressed", "*_nsex.*", Argb4444)
			},
			TextureHint {
				swizzle: swz("1-R", "1-A", "G", "B"),
				dyn_range: Some(false),
				error_metrics: NormalMap,
				mipmap_filter: NormalizeNormalMapAlpha,
				..hint("normalmap_spec_hq", "*_nshq.*", Dxt5)
			},
			hint("grayscalealpha", "*_gs.*", Ai88),
			TextureHint {
				mipmap_filter: AddAlphaNoise,
				dyn_range: Some(true),
				error_metrics: Distance,
				..hint("AddAlphaNoise", "*_can.*", Dxt5)
			},
			TextureHint {
				dyn_range: Some(false),
				..hint("TexRGBA4444", "*_4444.*", Argb4444)
			},
			TextureHint {
				dyn_range: Some(false),
				..hint("TexRGBA1555", "*_1555.*", Argb1555)
			},
			TextureHint {
				dyn_range: Some(false),
				..hint("TexAI88", "*_88.*", Ai88)
			},
			TextureHint {
				dyn_range: Some(false),
				..hint("TexDXT1", "*_dxt1.*", Dxt1)
			},
			TextureHint {
				dyn_range: Some(false),
				..hint("TexDXT5", "*_dxt5.*", Dxt5)
			},
		];

		TexConvertConfig {
			convert_version: 6,
			hints,
			use_srgb_from_dyn_range: true,
			..TexConvertConfig::default()
		}
	}
}


/// Match `pattern` (with `*` matching any run and `?` a single character)
/// against `s`.  Both inputs are expected pre-lowercased by the caller.
pub(crate) fn wildcard_match(pattern: &str, s: &str) -> bool {
	let p: Vec<char> = pattern.chars().collect();
	let str_: Vec<char> = s.chars().collect();

	let (mut pi, mut si) = (0usize, 0usize);
	let mut star_idx: Option<usize> = None;
	let mut matched = 0usize;

	while si < str_.len() {
		if pi < p.len() && (p[pi] == '?' || p[pi] == str_[si]) {
			pi += 1;
			si += 1;
			continue;
		};

		if pi < p.len() && p[pi] == '*' {
			star_idx = Some(pi);
			matched = si;
			pi += 1;
			continue;
		};

		if let Some(star) = star_idx {
			pi = star + 1;
			matched += 1;
			si = matched;
			continue;
		};

		return false;
	};

	while pi < p.len() && p[pi] == '*' {
		pi += 1;
	};

	pi == p.len()
}


static DEFAULT_TEXCONVERT: RwLock<Option<TexConvertConfig>> = RwLock::new(None);


/// Return a copy of the process-wide default [`TexConvertConfig`], lazily
/// initialized from [`TexConvertConfig::builtin`].
///
/// The returned value is a clone and can be modified safely.
pub fn default_texconvert_config() -> TexConvertConfig {
	{
		let guard = DEFAULT_TEXCONVERT.read().expect("default TexConvert config lock poisoned");
		if let Some(cfg) = &*guard {
			return cfg.clone();
		};
	};

	let mut guard = DEFAULT_TEXCONVERT.write().expect("default TexConvert config lock poisoned");
	guard.get_or_insert_with(TexConvertConfig::builtin).clone()
}


/// Replace the process-wide default [`TexConvertConfig`].
///
/// Intended for callers that load a custom config once per process; the value
/// is stored as a snapshot (copy-in, copy-out).
pub fn set_default_texconvert_config(cfg: TexConvertConfig) {
	let mut guard = DEFAULT_TEXCONVERT.write().expect("default TexConvert config lock poisoned");
	*guard = Some(cfg);
}


#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn wildcard_basics() {
		assert!(wildcard_match("*_co.*", "rock_co.paa"));
		assert!(wildcard_match("*_co.*", "_co."));
		assert!(!wildcard_match("*_co.*", "rock_co"));
		assert!(!wildcard_match("*_no.*", "rock_nohq.paa"));
		assert!(wildcard_match("te?t", "test"));
		assert!(!wildcard_match("te?t", "teest"));
		assert!(wildcard_match("*", ""));
		assert!(wildcard_match("**a*", "banana"));
	}


	#[test]
	fn enum_parsing() {
		assert_eq!("DXT5".parse::<TexFormat>(), Ok(TexFormat::Dxt5));
		assert_eq!("argb4444".parse::<TexFormat>(), Ok(TexFormat::Argb4444));
		assert_eq!("AI88".parse::<TexFormat>(), Ok(TexFormat::Ai88));
		assert!("argb9999".parse::<TexFormat>().is_err());

		assert_eq!("NormalizeNormalMapAlpha".parse::<TextureMipmapFilter>(), Ok(TextureMipmapFilter::NormalizeNormalMapAlpha));
		assert_eq!("fadeout".parse::<TextureMipmapFilter>(), Ok(TextureMipmapFilter::FadeOut));

		assert_eq!("Distance".parse::<TextureErrorMetrics>(), Ok(TextureErrorMetrics::Distance));
		assert_eq!("normalmap".parse::<TextureErrorMetrics>(), Ok(TextureErrorMetrics::NormalMap));
	}


	#[test]
	fn builtin_resolution() {
		let cfg = TexConvertConfig::builtin();

		let hint = cfg.resolve("my_normal_nohq.paa").unwrap();
		assert_eq!(hint.class_name, "normalmap_hq");
		assert_eq!(hint.format, TexFormat::Dxt5);
		assert_eq!(hint.swizzle.tag_bytes(), [0x05, 0x04, 0x02, 0x03]);
		assert_eq!(hint.error_metrics, TextureErrorMetrics::NormalMap);

		let hint = cfg.resolve("/textures/GRASS_CO.PAA").unwrap();
		assert_eq!(hint.class_name, "ColorMap");

		let hint = cfg.resolve("thing_smdi.paa").unwrap();
		assert_eq!(hint.class_name, "specular_diffuseinverse_map");

		let hint = cfg.resolve("plain_no.paa").unwrap();
		assert_eq!(hint.class_name, "normalmap_short");

		assert!(cfg.resolve("unmatched.png").is_none());
	}


	#[test]
	fn builtin_adshq_tag() {
		let cfg = TexConvertConfig::builtin();
		let hint = cfg.resolve("roof_adshq.paa").unwrap();
		assert_eq!(hint.swizzle.tag_bytes(), [0x02, 0x09, 0x03, 0x09]);
	}


	#[test]
	fn default_config_snapshot() {
		let cfg = default_texconvert_config();
		assert_eq!(cfg.convert_version, 6);
		assert!(!cfg.hints.is_empty());

		let mut custom = cfg.clone();
		custom.disable_lzo = true;
		set_default_texconvert_config(custom);
		assert!(default_texconvert_config().disable_lzo);

		// Mutating the returned clone must not affect the stored default.
		let mut copy = default_texconvert_config();
		copy.hints.clear();
		assert!(!default_texconvert_config().hints.is_empty());

		set_default_texconvert_config(TexConvertConfig::builtin());
	}
}
