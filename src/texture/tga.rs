//! TGA image decode and encode.
//!
//! Supported datatype codes on load: 2 (uncompressed 24-bit RGB),
//! 10 (RLE 24/32-bit, alpha dropped), 11 (RLE 8-bit grayscale expanded to
//! RGB). Pixels are BGR on disk and swapped to RGB in memory. The writer
//! always emits uncompressed 24-bit BGR with a top-left origin.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{MipLevel, Texture};
use crate::math::Vec3;
use crate::resources::ResourceError;

const DATATYPE_UNCOMPRESSED_RGB: u8 = 2;
const DATATYPE_RLE_RGB: u8 = 10;
const DATATYPE_RLE_GRAY: u8 = 11;
/// imagedescriptor bit: rows stored top-to-bottom
const DESCRIPTOR_TOP_LEFT: u8 = 0x20;

/// 18-byte TGA header
struct TgaHeader {
    id_length: u8,
    colormap_type: u8,
    datatype_code: u8,
    colormap_length: u16,
    colormap_depth: u8,
    width: u16,
    height: u16,
    bits_per_pixel: u8,
    image_descriptor: u8,
}

impl TgaHeader {
    fn read<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let id_length = r.read_u8()?;
        let colormap_type = r.read_u8()?;
        let datatype_code = r.read_u8()?;
        let _colormap_origin = r.read_u16::<LittleEndian>()?;
        let colormap_length = r.read_u16::<LittleEndian>()?;
        let colormap_depth = r.read_u8()?;
        let _x_origin = r.read_u16::<LittleEndian>()?;
        let _y_origin = r.read_u16::<LittleEndian>()?;
        let width = r.read_u16::<LittleEndian>()?;
        let height = r.read_u16::<LittleEndian>()?;
        let bits_per_pixel = r.read_u8()?;
        let image_descriptor = r.read_u8()?;
        Ok(Self {
            id_length,
            colormap_type,
            datatype_code,
            colormap_length,
            colormap_depth,
            width,
            height,
            bits_per_pixel,
            image_descriptor,
        })
    }
}

/// Load a TGA file as a full mip chain (base level decoded, remaining
/// levels generated by box filter).
pub fn load(path: &Path) -> Result<Texture, ResourceError> {
    let file = File::open(path).map_err(|source| ResourceError::NotFound {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    let base = decode(&mut reader).map_err(|detail| ResourceError::Decode {
        path: path.to_path_buf(),
        detail,
    })?;
    Ok(Texture::with_generated_mips(base))
}

/// Decode the base image from a TGA stream
fn decode<R: Read>(reader: &mut R) -> Result<MipLevel, String> {
    let header = TgaHeader::read(reader).map_err(|e| format!("truncated header: {e}"))?;

    let width = header.width as usize;
    let height = header.height as usize;
    if width == 0 || height == 0 {
        return Err("zero-sized image".into());
    }

    // Skip image ID and color map regions
    let colormap_bytes = if header.colormap_type != 0 {
        header.colormap_length as usize * (header.colormap_depth as usize).div_ceil(8)
    } else {
        0
    };
    skip(reader, header.id_length as usize + colormap_bytes)
        .map_err(|e| format!("truncated id/colormap: {e}"))?;

    let mut rgb = vec![0u8; width * height * 3];
    match (header.datatype_code, header.bits_per_pixel) {
        (DATATYPE_UNCOMPRESSED_RGB, 24) => decode_uncompressed(reader, &mut rgb)?,
        (DATATYPE_RLE_RGB, 24) => decode_rle(reader, &mut rgb, 3)?,
        (DATATYPE_RLE_RGB, 32) => decode_rle(reader, &mut rgb, 4)?,
        (DATATYPE_RLE_GRAY, 8) => decode_rle_gray(reader, &mut rgb)?,
        (dt, bpp) => {
            return Err(format!("unsupported datatype {dt} at {bpp} bpp"));
        }
    }

    // Bottom-left origin files are flipped so memory is always top-left
    if header.image_descriptor & DESCRIPTOR_TOP_LEFT == 0 {
        let row_bytes = width * 3;
        for y in 0..height / 2 {
            let (top, bottom) = rgb.split_at_mut((height - 1 - y) * row_bytes);
            top[y * row_bytes..y * row_bytes + row_bytes]
                .swap_with_slice(&mut bottom[..row_bytes]);
        }
    }

    let pixels = rgb
        .chunks_exact(3)
        .map(|px| Vec3::new(px[0] as f32 / 255.0, px[1] as f32 / 255.0, px[2] as f32 / 255.0))
        .collect();
    Ok(MipLevel::new(width, height, pixels))
}

fn skip<R: Read>(reader: &mut R, n: usize) -> std::io::Result<()> {
    std::io::copy(&mut reader.take(n as u64), &mut std::io::sink())?;
    Ok(())
}

fn decode_uncompressed<R: Read>(reader: &mut R, rgb: &mut [u8]) -> Result<(), String> {
    let mut bgr = vec![0u8; rgb.len()];
    reader
        .read_exact(&mut bgr)
        .map_err(|e| format!("truncated pixel data: {e}"))?;
    for (dst, src) in rgb.chunks_exact_mut(3).zip(bgr.chunks_exact(3)) {
        dst[0] = src[2];
        dst[1] = src[1];
        dst[2] = src[0];
    }
    Ok(())
}

/// RLE-compressed color data; `src_bytes` is 3 (BGR) or 4 (BGRA, alpha
/// dropped).
fn decode_rle<R: Read>(reader: &mut R, rgb: &mut [u8], src_bytes: usize) -> Result<(), String> {
    let pixel_count = rgb.len() / 3;
    let mut written = 0usize;
    let mut px = [0u8; 4];

    while written < pixel_count {
        let packet = reader
            .read_u8()
            .map_err(|e| format!("truncated RLE stream: {e}"))?;
        let count = (packet as usize & 0x7f) + 1;
        if written + count > pixel_count {
            return Err("RLE packet overruns image".into());
        }

        if packet & 0x80 != 0 {
            // Run packet: one pixel repeated
            reader
                .read_exact(&mut px[..src_bytes])
                .map_err(|e| format!("truncated RLE run: {e}"))?;
            for _ in 0..count {
                let dst = &mut rgb[written * 3..written * 3 + 3];
                dst[0] = px[2];
                dst[1] = px[1];
                dst[2] = px[0];
                written += 1;
            }
        } else {
            // Raw packet: `count` literal pixels
            for _ in 0..count {
                reader
                    .read_exact(&mut px[..src_bytes])
                    .map_err(|e| format!("truncated RLE literal: {e}"))?;
                let dst = &mut rgb[written * 3..written * 3 + 3];
                dst[0] = px[2];
                dst[1] = px[1];
                dst[2] = px[0];
                written += 1;
            }
        }
    }
    Ok(())
}

/// RLE-compressed 8-bit grayscale, expanded to RGB
fn decode_rle_gray<R: Read>(reader: &mut R, rgb: &mut [u8]) -> Result<(), String> {
    let pixel_count = rgb.len() / 3;
    let mut written = 0usize;

    while written < pixel_count {
        let packet = reader
            .read_u8()
            .map_err(|e| format!("truncated RLE stream: {e}"))?;
        let count = (packet as usize & 0x7f) + 1;
        if written + count > pixel_count {
            return Err("RLE packet overruns image".into());
        }

        if packet & 0x80 != 0 {
            let v = reader
                .read_u8()
                .map_err(|e| format!("truncated RLE run: {e}"))?;
            for _ in 0..count {
                rgb[written * 3..written * 3 + 3].fill(v);
                written += 1;
            }
        } else {
            for _ in 0..count {
                let v = reader
                    .read_u8()
                    .map_err(|e| format!("truncated RLE literal: {e}"))?;
                rgb[written * 3..written * 3 + 3].fill(v);
                written += 1;
            }
        }
    }
    Ok(())
}

/// Write an uncompressed 24-bit BGR TGA with a top-left origin.
/// Color components are clamped to [0, 1] and rounded to 8 bits.
pub fn write_tga(path: &Path, width: usize, height: usize, pixels: &[Vec3]) -> std::io::Result<()> {
    debug_assert_eq!(pixels.len(), width * height);

    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    w.write_u8(0)?; // id length
    w.write_u8(0)?; // colormap type
    w.write_u8(DATATYPE_UNCOMPRESSED_RGB)?;
    w.write_u16::<LittleEndian>(0)?; // colormap origin
    w.write_u16::<LittleEndian>(0)?; // colormap length
    w.write_u8(0)?; // colormap depth
    w.write_u16::<LittleEndian>(0)?; // x origin
    w.write_u16::<LittleEndian>(0)?; // y origin
    w.write_u16::<LittleEndian>(width as u16)?;
    w.write_u16::<LittleEndian>(height as u16)?;
    w.write_u8(24)?;
    w.write_u8(DESCRIPTOR_TOP_LEFT)?;

    let mut row = Vec::with_capacity(width * 3);
    for y in 0..height {
        row.clear();
        for x in 0..width {
            let px = pixels[y * width + x].clamp01();
            row.push((px.z * 255.0 + 0.5) as u8);
            row.push((px.y * 255.0 + 0.5) as u8);
            row.push((px.x * 255.0 + 0.5) as u8);
        }
        w.write_all(&row)?;
    }
    w.flush()
}
