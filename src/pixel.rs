use crate::PaaResult;
use crate::PaaError::*;

use deku::{prelude::*, DekuContainerRead, DekuContainerWrite};
use tap::prelude::*;


/// Packed ARGB pixel with sub-byte channel widths, stored as a little-endian
/// integer in the file.
///
/// Decoding expands narrow channels by left-shifting (the engine does not
/// replicate bits); a 1-bit alpha expands to 0 or 255.  Encoding truncates
/// the high bits without dithering.
#[allow(clippy::cast_possible_truncation)]
pub(crate) trait ArgbPixel: for<'a> DekuContainerRead<'a> + DekuContainerWrite + Sized {
	const ALPHA_WIDTH: u8;
	const COLOR_WIDTH: u8;

	fn a(&self) -> u8;
	fn r(&self) -> u8;
	fn g(&self) -> u8;
	fn b(&self) -> u8;
	fn from_rgba(rgba: [u8; 4]) -> Self;


	const PIXEL_WIDTH: usize = Self::ALPHA_WIDTH as usize + (Self::COLOR_WIDTH as usize) * 3;
	const PIXEL_WIDTH_BYTES: usize = (Self::PIXEL_WIDTH + 7) / 8;


	fn expand_u8(value: u8, width: u8) -> u8 {
		match width {
			w if w >= 8 => value,
			1 => if value != 0 { 0xFF } else { 0x00 },
			w => value << (8 - w),
		}
	}


	fn truncate_u8(value: u8, width: u8) -> u8 {
		match width {
			w if w >= 8 => value,
			w => value >> (8 - w),
		}
	}


	fn from_data(data: &[u8]) -> PaaResult<Self> {
		let mut data = data.get(0..Self::PIXEL_WIDTH_BYTES)
			.ok_or(InsufficientData)?
			.to_owned();

		data.reverse();

		let (_, result) = <Self as DekuContainerRead>::from_bytes((&data, 0))
			.map_err(|_| InsufficientData)?;
		Ok(result)
	}


	fn to_data(&self) -> Vec<u8> {
		<Self as DekuContainerWrite>::to_bytes(self)
			.expect("packed pixel always serializes")
			.tap_mut(|d| d.reverse())
	}


	fn into_rgba8(self) -> [u8; 4] {
		let r = Self::expand_u8(self.r(), Self::COLOR_WIDTH);
		let g = Self::expand_u8(self.g(), Self::COLOR_WIDTH);
		let b = Self::expand_u8(self.b(), Self::COLOR_WIDTH);
		let a = Self::expand_u8(self.a(), Self::ALPHA_WIDTH);
		[r, g, b, a]
	}


	fn from_rgba8(rgba8: [u8; 4]) -> Self {
		let r = Self::truncate_u8(rgba8[0], Self::COLOR_WIDTH);
		let g = Self::truncate_u8(rgba8[1], Self::COLOR_WIDTH);
		let b = Self::truncate_u8(rgba8[2], Self::COLOR_WIDTH);
		let a = Self::truncate_u8(rgba8[3], Self::ALPHA_WIDTH);
		Self::from_rgba([r, g, b, a])
	}


	fn convert_from_rgba8_slice(data: &[u8]) -> PaaResult<Vec<u8>> {
		if data.len() % 4 != 0 {
			return Err(InsufficientData);
		};

		let mut result = Vec::with_capacity(data.len() / 4 * Self::PIXEL_WIDTH_BYTES);

		for pixdata in data.chunks(4) {
			let pix = Self::from_rgba8(pixdata.try_into().unwrap());
			result.extend(pix.to_data());
		};

		Ok(result)
	}


	fn convert_to_rgba8_slice(data: &[u8]) -> PaaResult<Vec<u8>> {
		if data.len() % Self::PIXEL_WIDTH_BYTES != 0 {
			return Err(InsufficientData);
		};

		let mut result = Vec::with_capacity(data.len() / Self::PIXEL_WIDTH_BYTES * 4);

		for pixdata in data.chunks(Self::PIXEL_WIDTH_BYTES) {
			result.extend(Self::from_data(pixdata)?.into_rgba8());
		};

		Ok(result)
	}
}


/// ARGB 1:5:5:5, `(A<<15)|(R<<10)|(G<<5)|B` as a little-endian u16
#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
pub(crate) struct Argb1555Pixel {
	#[deku(bits = "1")]
	a: u8,
	#[deku(bits = "5")]
	r: u8,
	#[deku(bits = "5")]
	g: u8,
	#[deku(bits = "5")]
	b: u8,
}


impl ArgbPixel for Argb1555Pixel {
	const ALPHA_WIDTH: u8 = 1;
	const COLOR_WIDTH: u8 = 5;

	fn a(&self) -> u8 { self.a }
	fn r(&self) -> u8 { self.r }
	fn g(&self) -> u8 { self.g }
	fn b(&self) -> u8 { self.b }


	fn from_rgba(rgba: [u8; 4]) -> Self {
		let r = rgba[0];
		let g = rgba[1];
		let b = rgba[2];
		let a = rgba[3];
		Self { a, r, g, b }
	}
}


/// ARGB 4:4:4:4, `(A<<12)|(B<<8)|(G<<4)|R` as a little-endian u16
///
/// Note the B-G-R order of the low 12 bits; this is how the engine stores
/// 4444 and differs from the 1555 layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
pub(crate) struct Argb4444Pixel {
	#[deku(bits = "4")]
	a: u8,
	#[deku(bits = "4")]
	b: u8,
	#[deku(bits = "4")]
	g: u8,
	#[deku(bits = "4")]
	r: u8,
}


impl ArgbPixel for Argb4444Pixel {
	const ALPHA_WIDTH: u8 = 4;
	const COLOR_WIDTH: u8 = 4;

	fn a(&self) -> u8 { self.a }
	fn r(&self) -> u8 { self.r }
	fn g(&self) -> u8 { self.g }
	fn b(&self) -> u8 { self.b }


	fn from_rgba(rgba: [u8; 4]) -> Self {
		let r = rgba[0];
		let g = rgba[1];
		let b = rgba[2];
		let a = rgba[3];
		Self { a, b, g, r }
	}
}


/// Encode straight RGBA into AI88 (GRAYA): BT.601 luminance byte followed by
/// the alpha byte.
pub(crate) fn ai88_from_rgba8_slice(data: &[u8]) -> PaaResult<Vec<u8>> {
	if data.len() % 4 != 0 {
		return Err(InsufficientData);
	};

	let mut result = Vec::with_capacity(data.len() / 2);

	for pixel in data.chunks(4) {
		let lum = 0.299 * f64::from(pixel[0]) + 0.587 * f64::from(pixel[1]) + 0.114 * f64::from(pixel[2]);
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		result.push(lum.round() as u8);
		result.push(pixel[3]);
	};

	Ok(result)
}


/// Decode AI88 (GRAYA) into straight RGBA.
///
/// # Errors
/// - [`InsufficientData`]: payload shorter than `width * height * 2`.
pub(crate) fn ai88_to_rgba8_slice(data: &[u8], width: u16, height: u16) -> PaaResult<Vec<u8>> {
	let pixels = usize::from(width) * usize::from(height);

	if data.len() < pixels * 2 {
		return Err(InsufficientData);
	};

	let mut result = Vec::with_capacity(pixels * 4);

	for pixel in data[..pixels * 2].chunks(2) {
		let lum = pixel[0];
		result.extend([lum, lum, lum, pixel[1]]);
	};

	Ok(result)
}


/// Encode straight RGBA into the on-disk ARGB8888 byte order (B,G,R,A).
pub(crate) fn argb8888_from_rgba8_slice(data: &[u8]) -> PaaResult<Vec<u8>> {
	if data.len() % 4 != 0 {
		return Err(InsufficientData);
	};

	let mut result = Vec::with_capacity(data.len());

	for pixel in data.chunks(4) {
		result.extend([pixel[2], pixel[1], pixel[0], pixel[3]]);
	};

	Ok(result)
}


/// Decode on-disk ARGB8888 (stored B,G,R,A) into straight RGBA.
///
/// # Errors
/// - [`InsufficientData`]: payload shorter than `width * height * 4`.  Unlike
///   the narrower formats, short ARGB8888 payloads are rejected explicitly.
pub(crate) fn argb8888_to_rgba8_slice(data: &[u8], width: u16, height: u16) -> PaaResult<Vec<u8>> {
	let pixels = usize::from(width) * usize::from(height);

	if data.len() < pixels * 4 {
		return Err(InsufficientData);
	};

	let mut result = Vec::with_capacity(pixels * 4);

	for pixel in data[..pixels * 4].chunks(4) {
		result.extend([pixel[2], pixel[1], pixel[0], pixel[3]]);
	};

	Ok(result)
}


#[test]
fn argb1555_pixel_bytes() {
	let rgba = vec![0x6B, 0x00, 0x94, 0xFF];
	let packed = vec![0x12, 0xB4];
	assert_eq!(Argb1555Pixel::convert_from_rgba8_slice(&rgba).unwrap(), packed);

	// Left-shift expansion: 5-bit channels come back with the low 3 bits zero.
	let expanded = vec![0x68, 0x00, 0x90, 0xFF];
	assert_eq!(Argb1555Pixel::convert_to_rgba8_slice(&packed).unwrap(), expanded);
}


#[test]
fn argb1555_alpha_threshold() {
	let opaque = Argb1555Pixel::convert_from_rgba8_slice(&[0, 0, 0, 128]).unwrap();
	let clear = Argb1555Pixel::convert_from_rgba8_slice(&[0, 0, 0, 127]).unwrap();
	assert_eq!(opaque, vec![0x00, 0x80]);
	assert_eq!(clear, vec![0x00, 0x00]);

	assert_eq!(Argb1555Pixel::convert_to_rgba8_slice(&[0x00, 0x80]).unwrap()[3], 0xFF);
	assert_eq!(Argb1555Pixel::convert_to_rgba8_slice(&[0x00, 0x00]).unwrap()[3], 0x00);
}


#[test]
fn argb4444_pixel_bytes() {
	let rgba = vec![0x12, 0x34, 0x56, 0x78];
	let packed = vec![0x31, 0x75];
	assert_eq!(Argb4444Pixel::convert_from_rgba8_slice(&rgba).unwrap(), packed);

	let expanded = vec![0x10, 0x30, 0x50, 0x70];
	assert_eq!(Argb4444Pixel::convert_to_rgba8_slice(&packed).unwrap(), expanded);
}


#[test]
fn ai88_pixel_bytes() {
	let rgba = vec![255, 0, 0, 200];
	let packed = ai88_from_rgba8_slice(&rgba).unwrap();
	assert_eq!(packed, vec![76, 200]);

	assert_eq!(ai88_to_rgba8_slice(&packed, 1, 1).unwrap(), vec![76, 76, 76, 200]);
	assert!(matches!(ai88_to_rgba8_slice(&packed, 2, 1), Err(InsufficientData)));
}


#[test]
fn argb8888_pixel_bytes() {
	let rgba = vec![1, 2, 3, 4];
	let packed = argb8888_from_rgba8_slice(&rgba).unwrap();
	assert_eq!(packed, vec![3, 2, 1, 4]);

	assert_eq!(argb8888_to_rgba8_slice(&packed, 1, 1).unwrap(), rgba);
	assert!(matches!(argb8888_to_rgba8_slice(&packed, 1, 2), Err(InsufficientData)));
}
