use std::io::{Cursor, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use image::RgbaImage;

use crate::{PaaImage, PaaResult, PaaType, RawTagg, Tagg};
use crate::PaaError::*;
use crate::normalmap;
use crate::{read_raw_taggs, sffo_offsets};


/// Wrapper around [`PaaImage`] that decodes mipmaps into
/// [`image::RgbaImage`]
///
/// Mip payloads are decoded as stored; the virtual swizzle tag is applied by
/// the [`decode`] façade only.
#[allow(missing_debug_implementations)]
#[derive(Clone)]
pub struct PaaDecoder {
	paa: PaaImage,
}


impl PaaDecoder {
	/// Create an instance of `Self` from a [`PaaImage`].
	pub fn with_paa(paa: PaaImage) -> Self {
		Self { paa }
	}


	/// Decode mipmap at [`PaaImage::mipmaps`]`[index]`.
	///
	/// # Errors
	/// - [`NoMipmaps`]: `index` is outside of [`PaaImage::mipmaps`].
	/// - [`InsufficientData`], [`DxtDecode`]: payload decode failure.
	pub fn decode_nth(&self, index: usize) -> PaaResult<RgbaImage> {
		let mipmap = self.paa.mipmaps.get(index).ok_or(NoMipmaps)?;
		mipmap.decode()
	}


	/// Decode the first (largest) mipmap, see
	/// [`decode_nth`][PaaDecoder::decode_nth].
	///
	/// # Errors
	/// See [`decode_nth`][PaaDecoder::decode_nth].
	pub fn decode_first(&self) -> PaaResult<RgbaImage> {
		self.decode_nth(0)
	}
}


/// Dimensions and pixel format of the first mip level, as returned by
/// [`decode_config`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaaImageConfig {
	/// Width of the first mip level.
	pub width: u16,
	/// Height of the first mip level.
	pub height: u16,
	/// Pixel format of the file.
	pub paatype: PaaType,
}


/// Per-mip header information from the metadata-only read path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipHeader {
	/// Absolute file offset of the mip block (the width field).
	pub offset: u32,
	/// Width in pixels, LZO flag already masked for DXT formats.
	pub width: u16,
	/// Height in pixels.
	pub height: u16,
}


/// Lightweight PAA information without mip payload decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaaMetadata {
	/// Pixel format of the file.
	pub paatype: PaaType,
	/// Raw tag entries in file order, payloads untouched.
	pub taggs: Vec<RawTagg>,
	/// Offset and dimensions of every mip block referenced from SFFO.
	pub mipmaps: Vec<MipHeader>,
}


impl PaaMetadata {
	/// Return the raw payload of the first tag named `name`.
	pub fn tagg(&self, name: &str) -> Option<&[u8]> {
		self.taggs.iter()
			.find(|t| t.name == name)
			.map(|t| &t.payload[..])
	}
}


/// Non-seekable readers are buffered in full; SFFO-driven access needs
/// seeking.
fn buffer_input<R: Read>(mut input: R) -> PaaResult<Cursor<Vec<u8>>> {
	let mut data = Vec::new();
	input.read_to_end(&mut data)?;
	Ok(Cursor::new(data))
}


/// Decode the first mip level of a PAA stream into straight RGBA.
///
/// When the file carries a recognized ZIWS tag on a DXT5 payload, the
/// engine-side channel interpretation is applied: the `_nohq` tag inverts the
/// normal-map storage swizzle, the ADSHQ tag spreads the stored alpha, any
/// other tag is applied as the generic per-channel selector.
///
/// # Errors
/// - [`InvalidMagic`], [`MissingSffo`]: malformed container.
/// - [`NoMipmaps`]: the offset table references no mip blocks.
/// - [`InsufficientData`], [`DxtDecode`], [`LzoDecompress`],
///   [`LzssDecompress`]: payload failures.
pub fn decode<R: Read>(input: R) -> PaaResult<RgbaImage> {
	let mut cursor = buffer_input(input)?;
	let paa = PaaImage::read_from(&mut cursor)?;

	if paa.mipmaps.is_empty() {
		return Err(NoMipmaps);
	};

	let image = paa.mipmaps[0].decode()?;
	Ok(apply_swizzle_tag(&paa, image))
}


/// Read only the dimensions and format of the first mip level.
///
/// # Errors
/// See [`decode_metadata`]; additionally [`NoMipmaps`] when the offset table
/// is empty.
pub fn decode_config<R: Read>(input: R) -> PaaResult<PaaImageConfig> {
	let meta = decode_metadata(input)?;
	let first = meta.mipmaps.first().ok_or(NoMipmaps)?;

	Ok(PaaImageConfig {
		width: first.width,
		height: first.height,
		paatype: meta.paatype,
	})
}


/// Read PAA metadata without decoding or decompressing mip payloads: the raw
/// tag list plus per-mip offset and dimensions.
///
/// # Errors
/// - [`InvalidMagic`]: unknown 2-byte magic.
/// - [`MissingSffo`]: no SFFO tag in the tag section.
/// - [`UnexpectedEof`], [`UnexpectedIoError`]: truncated input.
pub fn decode_metadata<R: Read>(input: R) -> PaaResult<PaaMetadata> {
	let mut cursor = buffer_input(input)?;

	let mut magic = [0u8; 2];
	cursor.read_exact(&mut magic)?;
	let (_, paatype) = {
		use deku::DekuContainerRead;
		PaaType::from_bytes((&magic, 0)).map_err(|_| InvalidMagic(magic))?
	};

	let taggs = read_raw_taggs(&mut cursor)?;

	let offsets = taggs.iter()
		.find(|t| t.name == "SFFO")
		.map(|t| sffo_offsets(&t.payload))
		.ok_or(MissingSffo)?;

	let mut mipmaps: Vec<MipHeader> = Vec::with_capacity(offsets.len());

	for offset in offsets {
		cursor.seek(SeekFrom::Start(offset.into()))?;

		let raw_width = cursor.read_u16::<LittleEndian>()?;
		let height = cursor.read_u16::<LittleEndian>()?;

		if raw_width == 0 && height == 0 {
			continue;
		};

		let width = if paatype.is_dxtn() && (raw_width & 0x8000) != 0 {
			raw_width & 0x7FFF
		}
		else {
			raw_width
		};

		mipmaps.push(MipHeader { offset, width, height });
	};

	Ok(PaaMetadata { paatype, taggs, mipmaps })
}


/// Apply the ZIWS channel interpretation to a decoded first mip.  Only DXT5
/// payloads carry a meaningful virtual swizzle.
pub(crate) fn apply_swizzle_tag(paa: &PaaImage, image: RgbaImage) -> RgbaImage {
	if paa.paatype != PaaType::Dxt5 {
		return image;
	};

	let swizzle = paa.taggs.iter().find_map(|t| match t {
		Tagg::Swiz { swizzle } => Some(*swizzle),
		_ => None,
	});

	let swizzle = match swizzle {
		Some(s) => s,
		None => return image,
	};

	match swizzle.tag_bytes() {
		[0x05, 0x04, 0x02, 0x03] => normalmap::unswizzle_normal_map(&image),
		[0x02, 0x09, 0x03, 0x09] => normalmap::apply_adshq_swizzle(&image),
		_ if swizzle.is_noop() => image,
		_ => {
			let mut out = image;
			swizzle.apply_to_image(&mut out);
			out
		},
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::{encode, encode_with_options, ArgbSwizzle, EncodeOptions};

	/// Reader that hides the underlying slice's `Seek` impl.
	struct OnlyRead<'a>(&'a [u8]);

	impl Read for OnlyRead<'_> {
		fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
			self.0.read(buf)
		}
	}


	fn gradient(size: u32) -> RgbaImage {
		RgbaImage::from_fn(size, size, |x, y| {
			#[allow(clippy::cast_possible_truncation)]
			image::Rgba([(x * 32) as u8, (y * 32) as u8, 128, 255])
		})
	}


	#[test]
	fn round_trip_dimensions() {
		let mut buf = Vec::new();
		encode(&gradient(8), &mut buf).unwrap();

		let decoded = decode(&buf[..]).unwrap();
		assert_eq!(decoded.dimensions(), (8, 8));
	}


	#[test]
	fn decode_config_of_white_square() {
		let img = RgbaImage::from_pixel(4, 4, image::Rgba([255, 255, 255, 255]));
		let mut buf = Vec::new();
		encode(&img, &mut buf).unwrap();

		let cfg = decode_config(&buf[..]).unwrap();
		assert_eq!(cfg, PaaImageConfig { width: 4, height: 4, paatype: PaaType::Dxt1 });
	}


	#[test]
	fn non_seekable_reader_decodes() {
		let mut buf = Vec::new();
		encode(&gradient(4), &mut buf).unwrap();

		let decoded = decode(OnlyRead(&buf)).unwrap();
		assert_eq!(decoded.dimensions(), (4, 4));
	}


	#[test]
	fn invalid_magic_is_rejected() {
		assert!(matches!(decode(&[0u8, 0][..]), Err(InvalidMagic([0, 0]))));
	}


	#[test]
	fn missing_sffo_is_rejected() {
		let mut data = vec![0x01u8, 0xFF];
		data.extend(crate::Tagg::Avgc { rgba: crate::Bgra8888Pixel::default() }.to_bytes());
		data.extend([0u8, 0, 0, 0]);

		assert!(matches!(decode(&data[..]), Err(MissingSffo)));
		assert!(matches!(decode_metadata(&data[..]), Err(MissingSffo)));
	}


	#[test]
	fn argb4444_quantized_roundtrip() {
		let img = RgbaImage::from_pixel(4, 4, image::Rgba([0x12, 0x34, 0x56, 0x78]));

		let opts = EncodeOptions {
			paatype: Some(PaaType::Argb4444),
			generate_mipmaps: false,
			..EncodeOptions::default()
		};

		let mut buf = Vec::new();
		encode_with_options(&img, &mut buf, &opts).unwrap();

		let decoded = decode(&buf[..]).unwrap();
		for pixel in decoded.pixels() {
			assert_eq!(pixel.0, [0x10, 0x30, 0x50, 0x70]);
		};
	}


	#[test]
	fn nohq_file_decodes_back_to_tangent_normals() {
		let img = RgbaImage::from_pixel(8, 8, image::Rgba([128, 128, 255, 255]));

		let opts = EncodeOptions {
			paatype: Some(PaaType::Dxt5),
			normal_map_swizzle: true,
			write_nohq_swizzle_tag: true,
			generate_mipmaps: false,
			..EncodeOptions::default()
		};

		let mut buf = Vec::new();
		encode_with_options(&img, &mut buf, &opts).unwrap();

		let meta = decode_metadata(&buf[..]).unwrap();
		assert_eq!(meta.tagg("ZIWS"), Some(&[0x05u8, 0x04, 0x02, 0x03][..]));

		let decoded = decode(&buf[..]).unwrap();
		for pixel in decoded.pixels() {
			let [r, g, b, a] = pixel.0;
			assert!((i32::from(r) - 128).abs() <= 6, "X: {r}");
			assert!((i32::from(g) - 128).abs() <= 6, "Y: {g}");
			assert!(b >= 246, "Z: {b}");
			assert_eq!(a, 255);
		};
	}


	#[test]
	fn generic_swizzle_tag_applies_on_decode() {
		let paa = PaaImage {
			paatype: PaaType::Dxt5,
			taggs: vec![Tagg::Swiz { swizzle: ArgbSwizzle::parse_argb("1", "G", "R", "0").unwrap() }],
			mipmaps: vec![],
		};

		let image = RgbaImage::from_pixel(1, 1, image::Rgba([10, 20, 30, 40]));
		let out = apply_swizzle_tag(&paa, image);
		assert_eq!(out.get_pixel(0, 0).0, [20, 10, 0, 255]);
	}


	#[test]
	fn swizzle_tag_is_ignored_for_non_dxt5() {
		let paa = PaaImage {
			paatype: PaaType::Dxt1,
			taggs: vec![Tagg::Swiz { swizzle: ArgbSwizzle::nohq() }],
			mipmaps: vec![],
		};

		let image = RgbaImage::from_pixel(1, 1, image::Rgba([10, 20, 30, 40]));
		let out = apply_swizzle_tag(&paa, image);
		assert_eq!(out.get_pixel(0, 0).0, [10, 20, 30, 40]);
	}


	#[test]
	fn metadata_matches_full_decode() {
		let mut buf = Vec::new();
		encode(&gradient(32), &mut buf).unwrap();

		let meta = decode_metadata(&buf[..]).unwrap();
		let full = PaaImage::from_bytes(&buf).unwrap();

		assert_eq!(meta.paatype, full.paatype);
		assert_eq!(meta.mipmaps.len(), full.mipmaps.len());

		for (header, mip) in meta.mipmaps.iter().zip(full.mipmaps.iter()) {
			assert_eq!(header.width, mip.width);
			assert_eq!(header.height, mip.height);
		};

		assert!(meta.tagg("SFFO").is_some());
		assert!(meta.tagg("CGVA").is_some());
		assert!(meta.tagg("ZIWS").is_none());
	}


	#[test]
	fn decoder_selects_mip_levels() {
		let mut buf = Vec::new();
		encode(&gradient(16), &mut buf).unwrap();

		let decoder = PaaDecoder::with_paa(PaaImage::from_bytes(&buf).unwrap());
		assert_eq!(decoder.decode_first().unwrap().dimensions(), (16, 16));
		assert_eq!(decoder.decode_nth(1).unwrap().dimensions(), (8, 8));
		assert!(decoder.decode_nth(10).is_err());
	}
}
