#![warn(missing_docs, unreachable_pub, clippy::all)]
#![warn(clippy::missing_errors_doc)]
#![allow(clippy::wildcard_imports, clippy::enum_glob_use)]
#![allow(clippy::must_use_candidate)]


#![doc = include_str!("../README.md")]


mod macros;
mod pixel;
mod imageops;
mod normalmap;
mod mipmap;
mod texconfig;
mod cfgfile;
mod policy;
mod decode;
mod encode;

pub use mipmap::*;
pub use texconfig::*;
pub use decode::*;
pub use encode::*;


use std::io::{Read, Seek, SeekFrom, Cursor, Write};
use std::iter::Extend;

#[cfg(feature = "arbitrary")] use arbitrary::{Arbitrary, Unstructured, Result as ArbitraryResult};
use bstr::BString;
use byteorder::{LittleEndian, ByteOrder, ReadBytesExt};
#[cfg(test)] use byteorder::BigEndian;
use deku::prelude::*;
use derive_more::{Display, Error};
use enum_utils::FromStr;
use image::RgbaImage;
use static_assertions::const_assert;
#[cfg(test)] use static_assertions::assert_impl_all;

use PaaError::*;

/// [`std::result::Result`] parameterized with [`PaaError`]
pub type PaaResult<T> = Result<T, PaaError>;


/// `paa`'s [`std::error::Error`]
#[derive(Debug, Display, Error, Clone)]
#[non_exhaustive]
pub enum PaaError {
	/// A function that reads from [`std::io::Read`] encountered early EOF.
	#[display(fmt = "Unexpected end of input file")]
	UnexpectedEof,

	/// Unexpected I/O error that is not UnexpectedEof.
	#[display(fmt = "Unexpected I/O error: {}", _0)]
	UnexpectedIoError(#[error(ignore)] std::io::ErrorKind),

	/// The PAA did not contain any mipmaps.
	#[display(fmt = "No mipmaps found")]
	NoMipmaps,

	/// The 2-byte file magic does not name a known pixel format.
	#[display(fmt = "Invalid PAA magic: {:02x?}", _0)]
	InvalidMagic(#[error(ignore)] [u8; 2]),

	/// The tag section did not contain the mandatory SFFO offset table.
	#[display(fmt = "Missing SFFO tag")]
	MissingSffo,

	/// A mipmap payload was shorter than its dimensions require.
	#[display(fmt = "Not enough mipmap payload data")]
	InsufficientData,

	/// The pixel format cannot be decoded.
	#[display(fmt = "Unsupported pixel format for decode")]
	UnsupportedPixelFormat,

	/// The requested encode target (format or texture class) is unsupported.
	#[display(fmt = "Unsupported format for conversion: {}", _0)]
	UnsupportedFormat(#[error(ignore)] String),

	/// LZO compression of a DXT mipmap failed.
	#[display(fmt = "LZO compression failed: {}", _0)]
	LzoCompress(#[error(ignore)] String),

	/// LZO decompression of a DXT mipmap failed (wraps the lower-level
	/// look-behind underrun / input overrun).
	#[display(fmt = "LZO decompression failed: {}", _0)]
	LzoDecompress(#[error(ignore)] String),

	/// LZSS decompression failed, or uncompressed data is not of the expected
	/// length.
	#[display(fmt = "LZSS decompression failed")]
	LzssDecompress,

	/// DXT block decode failed (payload shorter than the block grid).
	#[display(fmt = "DXT decode failed")]
	DxtDecode,

	/// Image dimensions exceed the PAA uint16 range (0-65535), or overflow the
	/// LZO-flagged width field.
	#[display(fmt = "Dimensions exceed the PAA uint16 range")]
	InvalidDimensions,

	/// Serialized mipmap payload overflows the 3-byte length field.
	#[display(fmt = "Mipmap payload too large for the 3-byte length field")]
	MipmapTooLarge,

	/// Uncompressed mipmap data is not of the same size as computed by
	/// [`PaaType::predict_size`].  Enum members are width, height and
	/// [`predict_size`][PaaType::predict_size] result.
	#[error(ignore)]
	#[display(fmt = "Mipmap data is not the same size as computed from dimensions (predict_size({}x{}) = {})", _0, _1, _2)]
	UnexpectedMipmapDataSize(u16, u16, usize),

	/// A checked arithmetic operation triggered an unexpected under/overflow.
	#[display(fmt = "A checked arithmetic operation triggered an unexpected under/overflow")]
	ArithmeticOverflow,

	/// Attempted to read a SWIZTAGG with unknown swizzle values.
	#[display(fmt = "Unknown SWIZTAGG values: {:02x?}", _0)]
	UnknownSwizzleValues(#[error(ignore)] [u8; 4]),

	/// Attempted to parse an unexpected swizzle expression.
	#[display(fmt = "Invalid swizzle expression: {}", _0)]
	InvalidSwizzleString(#[error(ignore)] String),

	/// Attempted to parse a channel selector that is not "A", "R", "G", or "B".
	#[display(fmt = "Invalid channel selector: {}", _0)]
	InvalidChannelSwizzleIdString(#[error(ignore)] String),

	/// Generic parse error in TexConvert.cfg.
	#[display(fmt = "TexConvert parse error: {}", _0)]
	TexconvertParse(#[error(ignore)] String),

	/// A TexConvert.cfg hint inherits a class that does not precede it.
	#[display(fmt = "TexConvert hint inherits an unknown parent: {}", _0)]
	TexconvertInvalidInherit(#[error(ignore)] String),
}


impl From<std::io::Error> for PaaError {
	fn from(error: std::io::Error) -> Self {
		match error.kind() {
			std::io::ErrorKind::UnexpectedEof => UnexpectedEof,
			kind => UnexpectedIoError(kind),
		}
	}
}


/// Bitmap encoding used by all [mipmaps][`PaaImage::mipmaps`] of a given PAA
#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[cfg_attr(feature = "arbitrary", derive(Arbitrary))]
#[deku(type = "u16", endian = "little")]
pub enum PaaType {
	/// DXT1 (BC1) texture, 8 bytes per 4x4 block.
	#[deku(id = "0xFF_01")]
	Dxt1,

	/// DXT2; recognized on read and decoded as DXT3.
	#[deku(id = "0xFF_02")]
	Dxt2,

	/// DXT3 (BC2) texture, 16 bytes per 4x4 block.
	#[deku(id = "0xFF_03")]
	Dxt3,

	/// DXT4; recognized on read and decoded as DXT5.
	#[deku(id = "0xFF_04")]
	Dxt4,

	/// DXT5 (BC3) texture, 16 bytes per 4x4 block.
	#[deku(id = "0xFF_05")]
	Dxt5,

	/// ARGB 4:4:4:4 in a little-endian 2-byte integer.
	#[deku(id = "0x44_44")]
	Argb4444,

	/// ARGB 1:5:5:5 in a little-endian 2-byte integer.
	#[deku(id = "0x15_55")]
	Argb1555,

	/// ARGB 8:8:8:8, stored as B,G,R,A bytes.
	#[deku(id = "0x88_88")]
	Argb8888,

	/// 8 bits grayscale (luminance), 8 bits alpha.
	#[deku(id = "0x80_80")]
	Ai88,
}


impl Default for PaaType {
	/// Returns [`Dxt5`][`PaaType::Dxt5`].
	fn default() -> Self {
		PaaType::Dxt5
	}
}


impl PaaType {
	/// Calculate the size in bytes of uncompressed mipmap data from its width
	/// and height in pixels.  DXT sizes are rounded up to whole 4x4 blocks.
	pub const fn predict_size(&self, width: u16, height: u16) -> usize {
		use PaaType::*;

		const_assert!(std::mem::size_of::<usize>() >= 4);

		let w = width as usize;
		let h = height as usize;
		let blocks = ((w + 3) / 4) * ((h + 3) / 4);

		match self {
			Dxt1 => blocks * 8,
			Dxt2 | Dxt3 | Dxt4 | Dxt5 => blocks * 16,
			Argb4444 | Argb1555 | Ai88 => w * h * 2,
			Argb8888 => w * h * 4,
		}
	}


	/// Return true if the [`PaaType`] is DXTn.
	///
	/// # Example
	/// ```
	/// # use paa::PaaType;
	/// assert!(PaaType::Dxt5.is_dxtn());
	/// assert!(!PaaType::Argb1555.is_dxtn());
	/// ```
	pub const fn is_dxtn(&self) -> bool {
		use PaaType::*;
		matches!(self, Dxt1 | Dxt2 | Dxt3 | Dxt4 | Dxt5)
	}


	/// Return true if the [`PaaType`] is ARGBxxxx.
	pub const fn is_argb(&self) -> bool {
		use PaaType::*;
		matches!(self, Argb1555 | Argb4444 | Argb8888)
	}
}


#[test]
fn paatype_magic_bytes() {
	assert_eq!(PaaType::Dxt1.to_bytes().unwrap(), vec![0x01, 0xFF]);
	assert_eq!(PaaType::Dxt5.to_bytes().unwrap(), vec![0x05, 0xFF]);
	assert_eq!(PaaType::Argb1555.to_bytes().unwrap(), vec![0x55, 0x15]);
	assert_eq!(PaaType::Argb4444.to_bytes().unwrap(), vec![0x44, 0x44]);
	assert_eq!(PaaType::Argb8888.to_bytes().unwrap(), vec![0x88, 0x88]);
	assert_eq!(PaaType::Ai88.to_bytes().unwrap(), vec![0x80, 0x80]);

	let (_, t) = PaaType::from_bytes((&[0x01u8, 0xFF], 0)).unwrap();
	assert_eq!(t, PaaType::Dxt1);
	assert!(PaaType::from_bytes((&[0x47u8, 0x47], 0)).is_err());
}


#[test]
fn paatype_predict_size() {
	assert_eq!(PaaType::Dxt1.predict_size(4, 4), 8);
	assert_eq!(PaaType::Dxt1.predict_size(6, 6), 32);
	assert_eq!(PaaType::Dxt5.predict_size(16, 16), 256);
	assert_eq!(PaaType::Argb8888.predict_size(8, 8), 256);
	assert_eq!(PaaType::Argb4444.predict_size(8, 8), 128);
	assert_eq!(PaaType::Ai88.predict_size(3, 3), 18);
}


/// Raw TAGG entry as stored in the file: 4-byte name and opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTagg {
	/// Tag name as stored (e.g. "SFFO", "CGVA").
	pub name: BString,
	/// Opaque tag payload.
	pub payload: Vec<u8>,
}


/// Metadata frame present in PAA headers
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum Tagg {
	/// Average color value.
	#[display(fmt = "Avgc {{ {} }}", rgba)]
	Avgc {
		/// Pixel-averaged color, truncated to 8 bits per channel.
		rgba: Bgra8888Pixel,
	},

	/// Maximum color value.
	#[display(fmt = "Maxc {{ {} }}", rgba)]
	Maxc {
		/// Per-channel maximum color.
		rgba: Bgra8888Pixel,
	},

	/// PAA flags (alpha channel character).
	#[display(fmt = "Flag {{ {} }}", transparency)]
	Flag {
		/// Texture transparency type.
		transparency: Transparency,
	},

	/// Texture swizzle (subpixel mapping) applied by the engine at load time.
	#[display(fmt = "Swiz {{ {} }}", swizzle)]
	Swiz {
		/// Specific mapping that was used to encode the PAA.
		swizzle: ArgbSwizzle,
	},

	/// Mipmap offsets.
	#[display(fmt = "{:X?}", self)]
	Offs {
		/// Offsets into the file for each respective mipmap.
		offsets: Vec<u32>,
	},

	/// Tag with an unrecognized name or malformed payload, kept opaque.
	#[display(fmt = "{:?}", self)]
	Unknown {
		/// Tag name as stored.
		name: BString,
		/// Raw payload.
		payload: Vec<u8>,
	},
}


impl Tagg {
	/// Serialize a Tagg into PAA-ready data.
	pub fn to_bytes(&self) -> Vec<u8> {
		#[allow(clippy::cast_possible_truncation)]
		const U32_SIZE: u32 = std::mem::size_of::<u32>() as u32;

		let mut bytes: Vec<u8> = Vec::with_capacity(256);
		bytes.extend("GGAT".as_bytes());

		match self {
			Self::Avgc { rgba } | Self::Maxc { rgba } => {
				bytes.extend(self.as_taggname().as_bytes());
				bytes.extend_with_uint::<LittleEndian, _, 4>(U32_SIZE);
				bytes.extend(rgba.to_bytes().unwrap());
			},

			Self::Flag { transparency } => {
				bytes.extend(self.as_taggname().as_bytes());
				bytes.extend_with_uint::<LittleEndian, _, 4>(U32_SIZE);
				bytes.extend(transparency.to_bytes().unwrap());
				bytes.extend([0x00u8, 0, 0]);
			},

			Self::Swiz { swizzle } => {
				bytes.extend(self.as_taggname().as_bytes());
				bytes.extend_with_uint::<LittleEndian, _, 4>(U32_SIZE);
				bytes.extend(swizzle.to_bytes().unwrap());
			},

			Self::Offs { offsets } => {
				bytes.extend(self.as_taggname().as_bytes());
				#[allow(clippy::cast_possible_truncation)]
				let len = (16 * std::mem::size_of::<u32>()) as u32;
				bytes.extend_with_uint::<LittleEndian, _, 4>(len);

				let mut buf = [0u8; 16 * 4];
				let mut offsets = offsets.clone();
				if offsets.len() != 16 {
					offsets.resize(16, 0);
				};

				LittleEndian::write_u32_into(&offsets[..], &mut buf);
				bytes.extend(&buf);
			},

			Self::Unknown { name, payload } => {
				bytes.extend(&name[..]);
				#[allow(clippy::cast_possible_truncation)]
				let len = payload.len() as u32;
				bytes.extend_with_uint::<LittleEndian, _, 4>(len);
				bytes.extend(&payload[..]);
			},
		};

		bytes
	}


	/// Construct a [`Tagg`] from its stored name (e.g. "SFFO") and payload.
	/// Unrecognized names and malformed payloads yield [`Tagg::Unknown`]; tag
	/// payloads are opaque on read.
	pub fn from_name_and_payload(name: &BString, payload: &[u8]) -> Self {
		use bstr::ByteSlice;

		let unknown = || Self::Unknown { name: name.clone(), payload: payload.to_vec() };

		match name.to_str().unwrap_or("") {
			taggname @ ("CGVA" | "CXAM") => {
				if payload.len() != 4 {
					return unknown();
				};
				let (_, rgba) = Bgra8888Pixel::from_bytes((payload, 0)).unwrap();
				if taggname == "CGVA" {
					Self::Avgc { rgba }
				}
				else {
					Self::Maxc { rgba }
				}
			},

			"GALF" => {
				if payload.len() != 4 {
					return unknown();
				};
				match Transparency::from_bytes((&payload[0..1], 0)) {
					Ok((_, transparency)) => Self::Flag { transparency },
					Err(_) => unknown(),
				}
			},

			"ZIWS" => {
				if payload.len() != 4 {
					return unknown();
				};
				match ArgbSwizzle::from_bytes((payload, 0)) {
					Ok((_, swizzle)) => Self::Swiz { swizzle },
					Err(_) => unknown(),
				}
			},

			"SFFO" => {
				if payload.len() % std::mem::size_of::<u32>() != 0 {
					return unknown();
				};

				let offset_count = payload.len() / std::mem::size_of::<u32>();
				let mut offsets = vec![0u32; offset_count];
				LittleEndian::read_u32_into(payload, &mut offsets[..]);
				offsets.retain(|o| *o != 0);

				Self::Offs { offsets }
			},

			_ => unknown(),
		}
	}


	/// Return the 4-byte signature (as ASCII), e.g. "SFFO" for the offsets
	/// Tagg.
	pub fn as_taggname(&self) -> &'static str {
		match self {
			Self::Avgc { .. } => "CGVA",
			Self::Maxc { .. } => "CXAM",
			Self::Flag { .. } => "GALF",
			Self::Swiz { .. } => "ZIWS",
			Self::Offs { .. } => "SFFO",
			Self::Unknown { .. } => "",
		}
	}


	/// Check if `name` is a recognized 4-character Tagg name as represented in
	/// the file (e.g. "SFFO").
	pub fn is_valid_taggname(name: &str) -> bool {
		matches!(name, "CGVA" | "CXAM" | "GALF" | "ZIWS" | "SFFO")
	}
}


/// Read the ordered raw tag list from `input`, stopping at the first 4-byte
/// group that is not "GGAT" (the engine's 2-byte end-of-tags sentinel lands
/// inside that group; subsequent reads are offset-driven).
pub(crate) fn read_raw_taggs<R: Read>(input: &mut R) -> PaaResult<Vec<RawTagg>> {
	let mut result: Vec<RawTagg> = Vec::with_capacity(8);

	loop {
		let mut sig = [0u8; 4];
		input.read_exact(&mut sig)?;

		if &sig != b"GGAT" {
			break;
		};

		let mut name = [0u8; 4];
		input.read_exact(&mut name)?;

		let payload_length = input.read_u32::<LittleEndian>()?;
		let payload = input.read_exact_buffered(payload_length as usize)?;

		result.push(RawTagg { name: BString::from(&name[..]), payload });
	};

	Ok(result)
}


/// Extract the non-zero mip offsets from an SFFO payload.
pub(crate) fn sffo_offsets(payload: &[u8]) -> Vec<u32> {
	payload
		.chunks_exact(4)
		.map(LittleEndian::read_u32)
		.filter(|o| *o != 0)
		.collect()
}


/// A single PAA texture file represented as a struct
#[derive(Default, Debug, Clone)]
pub struct PaaImage {
	/// Format of all mipmaps in the image.
	pub paatype: PaaType,
	/// PAA header metadata, in file order.
	pub taggs: Vec<Tagg>,
	/// PAA mipmaps, largest first.
	pub mipmaps: Vec<PaaMipmap>,
}


impl PaaImage {
	/// Maximum number of mipmaps in a [`PaaImage`], as limited by the 64-byte
	/// [`Tagg::Offs`] payload.
	pub const MAX_MIPMAPS: usize = 16;


	/// Read a [`PaaImage`][Self] from an [`std::io::Read`].
	///
	/// The SFFO tag is authoritative: each non-zero offset is seeked to and
	/// one mipmap block is read there.  Dummy (0,0) blocks are skipped.
	///
	/// # Errors
	/// - [`InvalidMagic`]: the input does not start with a known 2-byte magic.
	/// - [`MissingSffo`]: the tag section has no SFFO offset table.
	/// - [`UnexpectedEof`], [`UnexpectedIoError`]: read or seek failure.
	/// - Mipmap payload errors, see [`PaaMipmap::read_from`].
	pub fn read_from<R: Read + Seek>(input: &mut R) -> PaaResult<Self> {
		let mut magic = [0u8; 2];
		input.read_exact(&mut magic)?;
		let (_, paatype) = PaaType::from_bytes((&magic, 0))
			.map_err(|_| InvalidMagic(magic))?;

		let raw_taggs = read_raw_taggs(input)?;

		let offsets = raw_taggs.iter()
			.find(|t| t.name == "SFFO")
			.map(|t| sffo_offsets(&t.payload))
			.ok_or(MissingSffo)?;

		let taggs = raw_taggs.iter()
			.map(|t| Tagg::from_name_and_payload(&t.name, &t.payload))
			.collect::<Vec<Tagg>>();

		let mut mipmaps: Vec<PaaMipmap> = Vec::with_capacity(offsets.len());

		for offset in offsets {
			input.seek(SeekFrom::Start(offset.into()))?;

			if let Some(mip) = PaaMipmap::read_from(input, paatype)? {
				mipmaps.push(mip);
			};
		};

		Ok(PaaImage { paatype, taggs, mipmaps })
	}


	/// Wrap `input` with a [`Cursor`][std::io::Cursor] and
	/// [`read_from`][`Self::read_from`] from it.
	///
	/// # Errors
	/// See [`read_from`][`Self::read_from`].
	pub fn from_bytes(input: &[u8]) -> PaaResult<Self> {
		let mut cursor = Cursor::new(input);
		Self::read_from(&mut cursor)
	}


	/// Convert self to PAA data as `Vec<u8>`.
	///
	/// Ignores any input [`Tagg::Offs`] and regenerates the SFFO offset table
	/// from the actual serialized mipmap blocks; offsets are laid out before
	/// any mip payload is emitted.  At most
	/// [`MAX_MIPMAPS`][Self::MAX_MIPMAPS] levels are written; excess levels
	/// are dropped.
	///
	/// # Errors
	/// - [`ArithmeticOverflow`]: tag and mipmap sizes overflow a [`u32`].
	/// - Mipmap serialization errors, see [`PaaMipmap::to_bytes`].
	pub fn to_bytes(&self) -> PaaResult<Vec<u8>> {
		let mut buf: Vec<u8> = Vec::with_capacity(1 << 20);

		buf.extend(self.paatype.to_bytes().unwrap());

		for t in &self.taggs {
			if let Tagg::Offs { .. } = t {
				continue;
			};

			buf.extend(t.to_bytes());
		};

		#[allow(clippy::cast_possible_truncation)]
		let offs_length = Tagg::Offs { offsets: vec![] }.to_bytes().len() as u32;

		let mipmap_blocks = self.mipmaps
			.iter()
			.take(Self::MAX_MIPMAPS)
			.map(PaaMipmap::to_bytes)
			.collect::<PaaResult<Vec<Vec<u8>>>>()?;

		// Header, fixed tags and the end-of-tags sentinel precede the first
		// mipmap block.
		let mipmaps_offset: u32 = u32::try_from(buf.len())
			.ok()
			.and_then(|len| len.checked_add(offs_length))
			.and_then(|len| len.checked_add(2))
			.ok_or(ArithmeticOverflow)?;

		let mut offsets: Vec<u32> = Vec::with_capacity(mipmap_blocks.len());
		let mut position = mipmaps_offset;

		for block in &mipmap_blocks {
			offsets.push(position);
			let block_len = u32::try_from(block.len()).map_err(|_| ArithmeticOverflow)?;
			position = position.checked_add(block_len).ok_or(ArithmeticOverflow)?;
		};

		buf.extend(Tagg::Offs { offsets }.to_bytes());
		buf.extend([0u8, 0]);

		for block in mipmap_blocks {
			buf.extend(block);
		};

		buf.extend([0u8; 6]);

		Ok(buf)
	}


	/// Serialize self into `output`.
	///
	/// # Errors
	/// See [`to_bytes`][Self::to_bytes]; write failures map to
	/// [`UnexpectedIoError`].
	pub fn write_to<W: Write>(&self, output: &mut W) -> PaaResult<()> {
		let bytes = self.to_bytes()?;
		output.write_all(&bytes)?;
		Ok(())
	}
}


/// The color data used in AVGCTAGG and MAXCTAGG; its byte layout is B:G:R:A
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[cfg_attr(feature = "arbitrary", derive(Arbitrary))]
pub struct Bgra8888Pixel {
	#[allow(missing_docs)]
	pub b: u8,
	#[allow(missing_docs)]
	pub g: u8,
	#[allow(missing_docs)]
	pub r: u8,
	#[allow(missing_docs)]
	pub a: u8,
}


impl std::fmt::Display for Bgra8888Pixel {
	#[allow(clippy::cast_lossless)]
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "<r={:.3}> <g={:.3}> <b={:.3}> <a={:.3}>",
			self.r as f32 / 255.0, self.g as f32 / 255.0, self.b as f32 / 255.0, self.a as f32 / 255.0)
	}
}


impl From<image::Rgba<u8>> for Bgra8888Pixel {
	fn from(rgba: image::Rgba<u8>) -> Self {
		let b = rgba.0[2];
		let g = rgba.0[1];
		let r = rgba.0[0];
		let a = rgba.0[3];
		Self { b, g, r, a }
	}
}


/// Alpha channel character stored in the GALF tag
///
/// The engine uses this to pick the alpha interpolation mode when the texture
/// is rendered; encoders write 1 for textures with non-opaque alpha and 2 for
/// detail/alpha-noise maps.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[cfg_attr(feature = "arbitrary", derive(Arbitrary))]
#[deku(type = "u8")]
pub enum Transparency {
	/// Transparency disabled
	#[display(fmt = "<no transparency>")]
	#[deku(id = "0x00")]
	None,

	/// Transparency enabled, alpha channel interpolation enabled
	#[display(fmt = "<transparent, interpolated alpha>")]
	#[deku(id = "0x01")]
	AlphaInterpolated,

	/// Transparency enabled, alpha channel interpolation disabled
	/// (detail/alpha-noise maps)
	#[display(fmt = "<transparent, non-interpolated alpha>")]
	#[deku(id = "0x02")]
	AlphaNotInterpolated,
}


impl Default for Transparency {
	fn default() -> Self {
		Transparency::AlphaInterpolated
	}
}


/// PAA texture ARGB swizzle data (see [`ChannelSwizzle`])
///
/// The four channels serialize to the 4-byte SWIZTAGG payload in A,R,G,B
/// order; the bit layout of each [`ChannelSwizzle`] coincides with the
/// engine's selector codes (0x00-0x03 select a source channel, 0x04-0x07 its
/// negation, 0x08 constant one, 0x09 constant zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
pub struct ArgbSwizzle {
	#[allow(missing_docs)]
	#[deku(ctx = "ChannelSwizzleId::Alpha")]
	pub a: ChannelSwizzle,
	#[allow(missing_docs)]
	#[deku(ctx = "ChannelSwizzleId::Red")]
	pub r: ChannelSwizzle,
	#[allow(missing_docs)]
	#[deku(ctx = "ChannelSwizzleId::Green")]
	pub g: ChannelSwizzle,
	#[allow(missing_docs)]
	#[deku(ctx = "ChannelSwizzleId::Blue")]
	pub b: ChannelSwizzle,
}


impl Default for ArgbSwizzle {
	fn default() -> Self {
		Self::new()
	}
}


impl std::fmt::Display for ArgbSwizzle {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			s if s.is_noop() => write!(f, "(no-op)"),
			_ => write!(f, "{}, {}, {}, {}", self.a, self.r, self.g, self.b),
		}
	}
}


impl ArgbSwizzle {
	/// Create a new ArgbSwizzle with no-op values (mapping alpha to alpha, etc).
	///
	/// # Example
	/// ```
	/// # use paa::*;
	/// let pix_i = [0x11u8, 0x22, 0x33, 0x44];
	/// let pix_o = ArgbSwizzle::new().to_rgba8_map()(&pix_i);
	/// assert_eq!(pix_i, pix_o);
	/// ```
	pub const fn new() -> Self {
		ArgbSwizzle {
			a: ChannelSwizzle::with_target(ChannelSwizzleId::Alpha),
			r: ChannelSwizzle::with_target(ChannelSwizzleId::Red),
			g: ChannelSwizzle::with_target(ChannelSwizzleId::Green),
			b: ChannelSwizzle::with_target(ChannelSwizzleId::Blue),
		}
	}


	/// The canonical `_nohq` normal-map swizzle; its SWIZTAGG payload is
	/// `0x05 0x04 0x02 0x03`.
	pub const fn nohq() -> Self {
		use ChannelSwizzleData::Source;
		use ChannelSwizzleId::*;

		ArgbSwizzle {
			a: ChannelSwizzle { target: Alpha, data: Source { neg_flag: true, source: Red } },
			r: ChannelSwizzle { target: Red, data: Source { neg_flag: true, source: Alpha } },
			g: ChannelSwizzle { target: Green, data: Source { neg_flag: false, source: Green } },
			b: ChannelSwizzle { target: Blue, data: Source { neg_flag: false, source: Blue } },
		}
	}


	/// Parse ARGB swizzle values from respective A, R, G and B strings (in the
	/// same format as specified in `TexConvert.cfg`).
	///
	/// # Errors
	/// - [`InvalidSwizzleString`]: some of the input strings were invalid.
	///
	/// # Example
	/// ```
	/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
	/// # use paa::{ArgbSwizzle, ChannelSwizzleId::*, ChannelSwizzleData::*, ChannelSwizzleFill::*};
	/// let swiz = ArgbSwizzle::parse_argb("A", "R", "1", "1-B")?;
	/// assert!(matches!(swiz.g.data, Fill { value: FillFF }));
	/// # Ok(()) }
	/// ```
	pub fn parse_argb(a: &str, r: &str, g: &str, b: &str) -> PaaResult<Self> {
		let a = ChannelSwizzle::parse_data_with_target(a, ChannelSwizzleId::Alpha)?;
		let r = ChannelSwizzle::parse_data_with_target(r, ChannelSwizzleId::Red)?;
		let g = ChannelSwizzle::parse_data_with_target(g, ChannelSwizzleId::Green)?;
		let b = ChannelSwizzle::parse_data_with_target(b, ChannelSwizzleId::Blue)?;
		let result = ArgbSwizzle { a, r, g, b };

		Ok(result)
	}


	/// Serialize self into the 4-byte SWIZTAGG payload (A,R,G,B order).
	pub fn tag_bytes(&self) -> [u8; 4] {
		self.to_bytes()
			.unwrap()
			.try_into()
			.expect("SWIZTAGG payload is always 4 bytes")
	}


	/// Parse a 4-byte SWIZTAGG payload.
	///
	/// # Errors
	/// - [`UnknownSwizzleValues`]: a byte is outside of the selector table.
	pub fn from_tag_bytes(tag: [u8; 4]) -> PaaResult<Self> {
		let (_, swizzle) = Self::from_bytes((&tag, 0))
			.map_err(|_| UnknownSwizzleValues(tag))?;
		Ok(swizzle)
	}


	/// Return an [`FnMut`] that acts on an RGBA8888 pixel, processing it
	/// according to the value of `self`.  See also
	/// [`ChannelSwizzle::to_subpixel_map()`].
	pub fn to_rgba8_map(&self) -> Box<dyn FnMut(&[u8; 4]) -> [u8; 4]> {
		let mut a_flt = self.a.to_subpixel_map();
		let mut r_flt = self.r.to_subpixel_map();
		let mut g_flt = self.g.to_subpixel_map();
		let mut b_flt = self.b.to_subpixel_map();

		let lambda = move |src: &[u8; 4]| -> [u8; 4] {
			let mut dst = *src;
			a_flt(src, &mut dst);
			r_flt(src, &mut dst);
			g_flt(src, &mut dst);
			b_flt(src, &mut dst);
			dst
		};

		Box::new(lambda)
	}


	/// Apply the swizzle algorithm to every pixel in `image`.
	pub fn apply_to_image(&self, image: &mut RgbaImage) {
		use image::Pixel;

		let mut map = self.to_rgba8_map();

		for pixel in image.pixels_mut() {
			let src = pixel.channels();
			let dst = map(src.try_into().unwrap());
			pixel.channels_mut().copy_from_slice(&dst);
		};
	}


	/// Returns `true` if `self` maps every channel to itself, i.e., if the
	/// swizzle does not change any channel.
	pub fn is_noop(&self) -> bool {
		self.a.is_noop() && self.r.is_noop() && self.g.is_noop() && self.b.is_noop()
	}
}


#[test]
fn nohq_tag_bytes() {
	assert_eq!(ArgbSwizzle::nohq().tag_bytes(), [0x05, 0x04, 0x02, 0x03]);
	let parsed = ArgbSwizzle::from_tag_bytes([0x05, 0x04, 0x02, 0x03]).unwrap();
	assert_eq!(parsed, ArgbSwizzle::nohq());
	assert!(ArgbSwizzle::from_tag_bytes([0x0A, 0x00, 0x00, 0x00]).is_err());
}


#[test]
fn swizzle_tag_roundtrip() {
	// class sky: A=1-G, R=R, G=1-A, B=B
	let swiz = ArgbSwizzle::parse_argb("1-G", "R", "1-A", "B").unwrap();
	let tag = swiz.tag_bytes();
	assert_eq!(tag, [0x06, 0x01, 0x04, 0x03]);
	assert_eq!(ArgbSwizzle::from_tag_bytes(tag).unwrap(), swiz);

	// class adshq: A=G, R=0, G=B, B=0
	let swiz = ArgbSwizzle::parse_argb("G", "0", "B", "0").unwrap();
	assert_eq!(swiz.tag_bytes(), [0x02, 0x09, 0x03, 0x09]);
}


/// Swizzle information for a single ARGB channel
///
/// Some PAA textures apply "swizzle" to their channels during conversion to
/// PAA.  The specific swizzle algorithm is described by the `TexConvert.cfg`
/// file (see also: [`TextureHint`]) and depends on the texture class as
/// determined by its file name suffix.  Here's an example of a swizzle
/// definition from that file:
///
/// ```text
/// class normalmap_vhq {
///   name = "*_novhq.*";
///   <..>
///   channelSwizzleA = "1-R";
///   channelSwizzleR = "1";
///   channelSwizzleG = "G";
///   channelSwizzleB = "1";
///   <..>
/// };
/// ```
///
/// In this case, the swizzle values mean that, e.g., the PAA alpha channel is
/// computed from the original image's negated red channel value, the PAA red
/// channel is filled with all ones, etc.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(ctx = "tgt: ChannelSwizzleId")]
#[display(fmt = "<{}={}>", target, data)]
pub struct ChannelSwizzle {
	/// PAA channel being written into.
	#[deku(skip, default = "tgt")]
	pub target: ChannelSwizzleId,
	/// Data that's being written.
	#[deku(pad_bits_before = "4")]
	pub data: ChannelSwizzleData,
}


impl ChannelSwizzle {
	/// Create a no-op [`ChannelSwizzle`] that targets a specific channel.
	pub const fn with_target(target: ChannelSwizzleId) -> Self {
		ChannelSwizzle {
			target,
			data: ChannelSwizzleData::Source {
				neg_flag: false,
				source: target,
			},
		}
	}


	/// Parse a channel swizzle operation from a `&str`, and construct a
	/// [`ChannelSwizzle`] from the operation and the target channel.
	///
	/// # Errors
	/// - [`InvalidSwizzleString`]: if failed to parse `data`.
	///
	/// # Example
	/// ```
	/// # use paa::{ChannelSwizzle, ChannelSwizzleId, ChannelSwizzleData};
	/// let swiz_alpha = ChannelSwizzle::parse_data_with_target("1-G", ChannelSwizzleId::Alpha).unwrap();
	/// assert_eq!(swiz_alpha.target, ChannelSwizzleId::Alpha);
	/// assert_eq!(swiz_alpha.data, ChannelSwizzleData::Source { neg_flag: true, source: ChannelSwizzleId::Green });
	/// ```
	pub fn parse_data_with_target(data: &str, target: ChannelSwizzleId) -> PaaResult<Self> {
		let data = data.parse::<ChannelSwizzleData>()?;
		let result = ChannelSwizzle { target, data };
		Ok(result)
	}


	/// Return a function object that acts on two RGBA8888 pixels (source and
	/// destination, respectively; each represented as `[u8; 4]`), applying
	/// swizzle to a single channel.
	pub fn to_subpixel_map(&self) -> Box<dyn FnMut(&[u8; 4], &mut [u8; 4])> {
		use ChannelSwizzleData::*;

		let target_idx = self.target as usize;

		match self.data {
			Source { neg_flag: false, source } => {
				let source_idx = source as usize;
				Box::new(move |src: &[u8; 4], dst: &mut [u8; 4]| { dst[target_idx] = src[source_idx] })
			},

			Source { neg_flag: true, source } => {
				let source_idx = source as usize;
				Box::new(move |src: &[u8; 4], dst: &mut [u8; 4]| { dst[target_idx] = 0xFF - src[source_idx] })
			},

			Fill { value } => {
				let fill_byte: u8 = value as u8;
				Box::new(move |_: &[u8; 4], dst: &mut [u8; 4]| { dst[target_idx] = fill_byte })
			},
		}
	}


	/// Returns `true` if `self` maps [`Self::target`] to itself.
	pub fn is_noop(&self) -> bool {
		matches!(self, ChannelSwizzle { target, data: ChannelSwizzleData::Source { neg_flag: false, source } } if target == source)
	}
}


#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, FromStr, DekuRead, DekuWrite)]
#[cfg_attr(feature = "arbitrary", derive(Arbitrary))]
#[enumeration(case_insensitive)]
#[deku(type = "u8", bits = "2")]
#[repr(usize)]
#[allow(missing_docs)]
pub enum ChannelSwizzleId {
	#[display(fmt = "a")]
	#[enumeration(rename = "A")]
	#[deku(id = "0b00")]
	Alpha = 0x03,
	#[display(fmt = "r")]
	#[enumeration(rename = "R")]
	#[deku(id = "0b01")]
	Red = 0x00,
	#[display(fmt = "g")]
	#[enumeration(rename = "G")]
	#[deku(id = "0b10")]
	Green = 0x01,
	#[display(fmt = "b")]
	#[enumeration(rename = "B")]
	#[deku(id = "0b11")]
	Blue = 0x02,
}


/// Swizzle algorithm for a single channel without its target (see also
/// [`ChannelSwizzle`])
#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(type = "u8", bits = "1")]
pub enum ChannelSwizzleData {
	/// Copy data from another channel.
	#[deku(id = "0b0")]
	Source {
		/// Negate `source` if true.
		#[deku(bits = "1")]
		neg_flag: bool,
		/// Input texture channel to source from.
		source: ChannelSwizzleId,
	},

	/// Fill the channel with a constant (either all zeroes or all ones).
	#[deku(id = "0b1")]
	Fill {
		#[deku(pad_bits_before = "1")]
		#[allow(missing_docs)]
		value: ChannelSwizzleFill,
	},
}


impl std::str::FromStr for ChannelSwizzleData {
	type Err = PaaError;

	fn from_str(s: &str) -> PaaResult<Self> {
		let mut st = s.trim().to_uppercase();
		st.retain(|c| !c.is_whitespace());

		match st.as_str() {
			s @ ("A" | "R" | "G" | "B") => {
				let result = ChannelSwizzleData::Source {
					neg_flag: false,
					source: s.parse::<ChannelSwizzleId>()
						.map_err(|_| InvalidChannelSwizzleIdString(String::from(s)))?,
				};
				Ok(result)
			},

			s @ ("1-A" | "1-R" | "1-G" | "1-B") => {
				let id = s.chars().nth(2).unwrap().to_string();
				let result = ChannelSwizzleData::Source {
					neg_flag: true,
					source: id.parse::<ChannelSwizzleId>()
						.map_err(|_| InvalidChannelSwizzleIdString(String::from(s)))?,
				};
				Ok(result)
			},

			s @ ("0" | "1") => {
				let value = match s {
					"0" => ChannelSwizzleFill::Fill00,
					"1" => ChannelSwizzleFill::FillFF,
					_ => unreachable!(),
				};

				Ok(ChannelSwizzleData::Fill { value })
			},

			_ => Err(InvalidSwizzleString(String::from(s))),
		}
	}
}


impl std::fmt::Display for ChannelSwizzleData {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		use ChannelSwizzleData::*;

		match self {
			Source { neg_flag, source } => {
				let neg_str = if *neg_flag { "1-" } else { "" };
				write!(f, "{}{}", neg_str, source)
			},

			Fill { value } => {
				write!(f, "{}", value)
			},
		}
	}
}


/// The value (ones or zeroes) to fill a channel with while swizzling
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[cfg_attr(feature = "arbitrary", derive(Arbitrary))]
#[deku(type = "u8", bits = "2")]
#[repr(u8)]
pub enum ChannelSwizzleFill {
	/// Fill the channel with `0xFF`s (all ones).
	#[display(fmt = "1")]
	#[deku(id = "0b00")]
	FillFF = 0xFF,
	/// Fill the channel with `0x00`s (all zeroes).
	#[display(fmt = "0")]
	#[deku(id = "0b01")]
	Fill00 = 0x00,
}


#[test]
fn parse_swizzle() {
	for c in ["a", "R", "G", "b"] {
		let src_pos = format!("             {}", c);
		let src_neg = format!("  1 -  {} ", c);
		assert_eq!(src_pos.parse::<ChannelSwizzleData>().unwrap(), ChannelSwizzleData::Source { neg_flag: false, source: c.parse::<ChannelSwizzleId>().unwrap() });
		assert_eq!(src_neg.parse::<ChannelSwizzleData>().unwrap(), ChannelSwizzleData::Source { neg_flag: true, source: c.parse::<ChannelSwizzleId>().unwrap() });
	};
	assert_eq!(" 0 ".parse::<ChannelSwizzleData>().unwrap(), ChannelSwizzleData::Fill { value: ChannelSwizzleFill::Fill00 });
	assert_eq!("1   ".parse::<ChannelSwizzleData>().unwrap(), ChannelSwizzleData::Fill { value: ChannelSwizzleFill::FillFF });
}


#[cfg(feature = "arbitrary")]
impl<'a> Arbitrary<'a> for ArgbSwizzle {
	fn arbitrary(input: &mut Unstructured) -> ArbitraryResult<Self> {
		let a = ChannelSwizzle { target: ChannelSwizzleId::Alpha, data: input.arbitrary()? };
		let r = ChannelSwizzle { target: ChannelSwizzleId::Red, data: input.arbitrary()? };
		let g = ChannelSwizzle { target: ChannelSwizzleId::Green, data: input.arbitrary()? };
		let b = ChannelSwizzle { target: ChannelSwizzleId::Blue, data: input.arbitrary()? };
		Ok(ArgbSwizzle { a, r, g, b })
	}
}


#[cfg(feature = "arbitrary")]
impl<'a> Arbitrary<'a> for ChannelSwizzleData {
	fn arbitrary(input: &mut Unstructured) -> ArbitraryResult<Self> {
		let variant: usize = input.int_in_range(1..=2)?;

		let result = match variant {
			1 => {
				let neg_flag: bool = input.arbitrary()?;
				let source: ChannelSwizzleId = input.arbitrary()?;
				ChannelSwizzleData::Source { neg_flag, source }
			},

			2 => {
				let value: ChannelSwizzleFill = input.arbitrary()?;
				ChannelSwizzleData::Fill { value }
			},

			_ => unreachable!(),
		};

		Ok(result)
	}
}


#[cfg(feature = "arbitrary")]
impl<'a> Arbitrary<'a> for Tagg {
	fn arbitrary(input: &mut Unstructured) -> ArbitraryResult<Self> {
		use Tagg::*;

		let variant: usize = input.int_in_range(1..=5)?;

		let result = match variant {
			1 => Avgc { rgba: input.arbitrary()? },

			2 => Maxc { rgba: input.arbitrary()? },

			3 => Flag { transparency: input.arbitrary()? },

			4 => Swiz { swizzle: input.arbitrary()? },

			5 => {
				let offs_len: usize = input.int_in_range(0..=16)?;
				let mut offsets: Vec<u32> = vec![0u32; offs_len];

				for o in &mut offsets {
					*o = input.arbitrary()?;
				};

				offsets.retain(|o| *o != 0);

				Offs { offsets }
			},

			_ => unreachable!(),
		};

		Ok(result)
	}
}


/// Additive checksum appended to LZSS-compressed mipmap payloads: the wrapping
/// sum of the raw payload bytes interpreted as signed bytes.
pub(crate) fn get_additive_i32_cksum(data: &[u8]) -> i32 {
	data.iter().fold(0i32, |acc, b| acc.wrapping_add(i32::from(*b as i8)))
}


#[test]
fn additive_cksum() {
	assert_eq!(get_additive_i32_cksum(&[]), 0);
	assert_eq!(get_additive_i32_cksum(&[1, 2, 3]), 6);
	assert_eq!(get_additive_i32_cksum(&[0xFF]), -1);
	assert_eq!(get_additive_i32_cksum(&[0x80, 0x80]), -256);
}


pub(crate) trait ExtendExt: Extend<u8> {
	/// Convenience function which extends an [`std::iter::Extend<u8>`] with a
	/// [`byteorder::ByteOrder`]-encoded integer.
	fn extend_with_uint<B: ByteOrder, T: Into<u64>, const N: usize>(&mut self, v: T) {
		let mut buf = vec![0u8; N];
		B::write_uint(&mut buf[..], v.into(), N);
		self.extend(buf.into_iter());
	}
}


impl<T> ExtendExt for T where T: Extend<u8> {}


#[test]
fn test_extend_with_uint() {
	let mut dest: Vec<u8> = vec![];

	dest.extend_with_uint::<LittleEndian, _, 2>(1234u16);
	assert_eq!(dest, vec![0xD2, 0x04]);

	dest.extend_with_uint::<LittleEndian, _, 3>(1234u32);
	assert_eq!(dest, vec![0xD2, 0x04, 0xD2, 0x04, 0x00]);

	dest.extend_with_uint::<BigEndian, _, 4>(5678u32);
	assert_eq!(dest, vec![0xD2, 0x04, 0xD2, 0x04, 0x00, 0x00, 0x00, 0x16, 0x2E]);
}


pub(crate) trait ReadExt: Read {
	const SINGLE_READ_SIZE: usize = 64;

	fn read_exact_buffered(&mut self, len: usize) -> PaaResult<Vec<u8>> {
		let mut data: Vec<u8> = Vec::with_capacity(std::cmp::min(len, 1 << 20));
		let mut total = 0usize;

		loop {
			if total == len {
				break;
			};

			let bufsize = std::cmp::min(Self::SINGLE_READ_SIZE, len - total);
			let mut buf = vec![0u8; bufsize];
			self.read_exact(&mut buf)?;
			data.extend(&buf[..]);
			total += bufsize;
		};

		Ok(data)
	}
}


impl<T> ReadExt for T where T: Read {}


#[test]
fn test_read_exact_buffered() {
	let mut input = Cursor::new(vec![0x41u8, 0x42, 0x43, 0x44, 0x45, 0x46]);
	assert_eq!(input.read_exact_buffered(1).unwrap(), vec![0x41u8]);
	assert_eq!(input.read_exact_buffered(2).unwrap(), vec![0x42u8, 0x43]);
	assert_eq!(input.read_exact_buffered(3).unwrap(), vec![0x44u8, 0x45, 0x46]);
}


#[test]
fn tagg_head_layout() {
	let offsdata = Tagg::Offs { offsets: vec![] }.to_bytes();
	assert_eq!(offsdata.len(), 76);
	assert_eq!(&offsdata[0..4], b"GGAT");
	assert_eq!(&offsdata[4..8], b"SFFO");
	assert_eq!(LittleEndian::read_u32(&offsdata[8..12]), 64);
	assert!(offsdata[12..].iter().all(|b| *b == 0));
}


#[test]
fn tagg_roundtrip() {
	let tagg = Tagg::Avgc { rgba: Bgra8888Pixel { b: 1, g: 2, r: 3, a: 4 } };
	let bytes = tagg.to_bytes();
	assert_eq!(&bytes[0..4], b"GGAT");
	assert_eq!(&bytes[4..8], b"CGVA");
	assert_eq!(LittleEndian::read_u32(&bytes[8..12]), 4);
	assert_eq!(&bytes[12..], &[1u8, 2, 3, 4][..]);

	let parsed = Tagg::from_name_and_payload(&BString::from("CGVA"), &bytes[12..]);
	assert_eq!(parsed, tagg);

	let unknown = Tagg::from_name_and_payload(&BString::from("CORP"), b"procedural");
	assert!(matches!(unknown, Tagg::Unknown { .. }));
}


#[test]
fn sffo_parse_skips_zero_entries() {
	let mut payload = vec![0u8; 64];
	LittleEndian::write_u32(&mut payload[0..4], 128);
	LittleEndian::write_u32(&mut payload[8..12], 256);

	assert_eq!(sffo_offsets(&payload), vec![128, 256]);

	let tagg = Tagg::from_name_and_payload(&BString::from("SFFO"), &payload);
	assert_eq!(tagg, Tagg::Offs { offsets: vec![128, 256] });
}


#[test]
fn assert_traits() {
	use std::fmt::{Debug, Display};
	use std::error::Error;
	use std::panic::{UnwindSafe, RefUnwindSafe};

	assert_impl_all!(PaaError: Debug, Display, Error, Send, Sync, UnwindSafe, RefUnwindSafe);
	assert_impl_all!(PaaImage: Debug, Clone, Send, Sync);
}
