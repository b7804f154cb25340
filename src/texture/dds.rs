//! DDS container parsing and block-compressed texture decode.
//!
//! Supported FourCC codes: DXT1 (BC1, 8-byte blocks), DXT5 (BC3, 16-byte
//! blocks) and ATI2/BC5U (BC5, two single-channel blocks with the blue
//! channel reconstructed). Every mip level listed in the header is decoded;
//! a truncated file keeps the valid level prefix. The DX10 extended header
//! is not supported.

use std::fs;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use log::warn;

use super::{MipLevel, Texture};
use crate::math::Vec3;
use crate::resources::ResourceError;

const DDS_MAGIC: u32 = 0x2053_4444; // "DDS "
const HEADER_SIZE: usize = 124;

const DDSD_CAPS: u32 = 0x1;
const DDSD_HEIGHT: u32 = 0x2;
const DDSD_WIDTH: u32 = 0x4;
const DDSD_PIXELFORMAT: u32 = 0x1000;
const DDSD_MIPMAPCOUNT: u32 = 0x20000;

const DDPF_FOURCC: u32 = 0x4;

const DDSCAPS_MIPMAP: u32 = 0x40_0000;
const DDSCAPS_TEXTURE: u32 = 0x1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Codec {
    Dxt1,
    Dxt5,
    Bc5,
}

impl Codec {
    fn block_bytes(self) -> usize {
        match self {
            Codec::Dxt1 => 8,
            Codec::Dxt5 | Codec::Bc5 => 16,
        }
    }
}

struct DdsHeader {
    flags: u32,
    height: u32,
    width: u32,
    mip_map_count: u32,
    pf_flags: u32,
    four_cc: [u8; 4],
    caps: u32,
}

impl DdsHeader {
    fn parse(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < HEADER_SIZE {
            return Err("truncated header".into());
        }
        let size = LittleEndian::read_u32(&bytes[0..4]);
        if size as usize != HEADER_SIZE {
            return Err(format!("bad header size {size}"));
        }
        let mut four_cc = [0u8; 4];
        four_cc.copy_from_slice(&bytes[84..88]);
        Ok(Self {
            flags: LittleEndian::read_u32(&bytes[4..8]),
            height: LittleEndian::read_u32(&bytes[8..12]),
            width: LittleEndian::read_u32(&bytes[12..16]),
            mip_map_count: LittleEndian::read_u32(&bytes[28..32]),
            pf_flags: LittleEndian::read_u32(&bytes[80..84]),
            four_cc,
            caps: LittleEndian::read_u32(&bytes[108..112]),
        })
    }
}

pub fn load(path: &Path) -> Result<Texture, ResourceError> {
    let bytes = fs::read(path).map_err(|source| ResourceError::NotFound {
        path: path.to_path_buf(),
        source,
    })?;

    match decode(&bytes) {
        Ok(levels) => Ok(Texture::from_levels(levels)),
        Err(DecodeFailure::Unsupported(detail)) => Err(ResourceError::UnsupportedFormat {
            path: path.to_path_buf(),
            detail,
        }),
        Err(DecodeFailure::Malformed(detail)) => Err(ResourceError::Decode {
            path: path.to_path_buf(),
            detail,
        }),
    }
}

#[derive(Debug)]
enum DecodeFailure {
    Unsupported(String),
    Malformed(String),
}

fn decode(bytes: &[u8]) -> Result<Vec<MipLevel>, DecodeFailure> {
    if bytes.len() < 4 + HEADER_SIZE {
        return Err(DecodeFailure::Malformed("file shorter than header".into()));
    }
    if LittleEndian::read_u32(&bytes[0..4]) != DDS_MAGIC {
        return Err(DecodeFailure::Malformed("bad DDS magic".into()));
    }

    let header = DdsHeader::parse(&bytes[4..]).map_err(DecodeFailure::Malformed)?;

    let required = DDSD_CAPS | DDSD_HEIGHT | DDSD_WIDTH | DDSD_PIXELFORMAT;
    if header.flags & required != required {
        return Err(DecodeFailure::Malformed(format!(
            "missing required header flags: {:#x}",
            header.flags
        )));
    }
    if header.caps & DDSCAPS_TEXTURE == 0 {
        return Err(DecodeFailure::Malformed("missing TEXTURE cap".into()));
    }
    if header.pf_flags & DDPF_FOURCC == 0 {
        return Err(DecodeFailure::Unsupported(
            "uncompressed DDS not supported".into(),
        ));
    }

    let codec = match &header.four_cc {
        b"DXT1" => Codec::Dxt1,
        b"DXT5" => Codec::Dxt5,
        b"ATI2" | b"BC5U" => Codec::Bc5,
        other => {
            return Err(DecodeFailure::Unsupported(format!(
                "unsupported FourCC {:?}",
                String::from_utf8_lossy(other)
            )));
        }
    };

    // Mip count is honored only when both the flag and the cap agree
    let mip_count =
        if header.flags & DDSD_MIPMAPCOUNT != 0 && header.caps & DDSCAPS_MIPMAP != 0 {
            header.mip_map_count.max(1) as usize
        } else {
            1
        };

    let mut levels = Vec::with_capacity(mip_count);
    let mut offset = 4 + HEADER_SIZE;

    for k in 0..mip_count {
        let w = ((header.width as usize) >> k).max(1);
        let h = ((header.height as usize) >> k).max(1);
        let blocks_x = w.div_ceil(4);
        let blocks_y = h.div_ceil(4);
        let data_len = blocks_x * blocks_y * codec.block_bytes();

        if offset + data_len > bytes.len() {
            // Keep the valid prefix of the chain
            warn!(
                "DDS mip level {k} truncated ({} of {} bytes); keeping {} levels",
                bytes.len() - offset,
                data_len,
                levels.len()
            );
            break;
        }

        let data = &bytes[offset..offset + data_len];
        let level = match codec {
            Codec::Dxt1 => decode_dxt1(data, w, h),
            Codec::Dxt5 => decode_dxt5(data, w, h),
            Codec::Bc5 => decode_bc5(data, w, h),
        };
        levels.push(level);
        offset += data_len;

        if w == 1 && h == 1 {
            break;
        }
    }

    if levels.is_empty() {
        return Err(DecodeFailure::Malformed("no complete mip level".into()));
    }
    Ok(levels)
}

/// Expand the two RGB565 endpoints of a color block
#[inline]
fn color_endpoints(c0: u16, c1: u16) -> (Vec3, Vec3) {
    let expand = |c: u16| {
        Vec3::new(
            ((c >> 11) & 31) as f32 / 31.0,
            ((c >> 5) & 63) as f32 / 63.0,
            (c & 31) as f32 / 31.0,
        )
    };
    (expand(c0), expand(c1))
}

fn decode_dxt1(data: &[u8], width: usize, height: usize) -> MipLevel {
    let mut pixels = vec![Vec3::zero(); width * height];
    let blocks_x = width.div_ceil(4);

    for by in 0..height.div_ceil(4) {
        for bx in 0..blocks_x {
            let offset = (by * blocks_x + bx) * 8;
            let block = &data[offset..offset + 8];

            let c0 = LittleEndian::read_u16(&block[0..2]);
            let c1 = LittleEndian::read_u16(&block[2..4]);
            let lookup = LittleEndian::read_u32(&block[4..8]);

            let (e0, e1) = color_endpoints(c0, c1);
            // c0 > c1 selects the 4-color mode; otherwise 3 colors plus
            // transparent-black
            let palette = if c0 > c1 {
                [
                    e0,
                    e1,
                    (e0 * 2.0 + e1) / 3.0,
                    (e0 + e1 * 2.0) / 3.0,
                ]
            } else {
                [e0, e1, (e0 + e1) / 2.0, Vec3::zero()]
            };

            write_color_block(&mut pixels, width, height, bx, by, lookup, &palette);
        }
    }
    MipLevel::new(width, height, pixels)
}

fn decode_dxt5(data: &[u8], width: usize, height: usize) -> MipLevel {
    let mut pixels = vec![Vec3::zero(); width * height];
    let blocks_x = width.div_ceil(4);

    for by in 0..height.div_ceil(4) {
        for bx in 0..blocks_x {
            let offset = (by * blocks_x + bx) * 16;
            let block = &data[offset..offset + 16];

            // Bytes 0..8 are the alpha block; the color model is RGB so the
            // ramp is not applied, only skipped.
            let c0 = LittleEndian::read_u16(&block[8..10]);
            let c1 = LittleEndian::read_u16(&block[10..12]);
            let lookup = LittleEndian::read_u32(&block[12..16]);

            let (e0, e1) = color_endpoints(c0, c1);
            // DXT5 color blocks are always 4-color
            let palette = [
                e0,
                e1,
                (e0 * 2.0 + e1) / 3.0,
                (e0 + e1 * 2.0) / 3.0,
            ];

            write_color_block(&mut pixels, width, height, bx, by, lookup, &palette);
        }
    }
    MipLevel::new(width, height, pixels)
}

fn decode_bc5(data: &[u8], width: usize, height: usize) -> MipLevel {
    let mut pixels = vec![Vec3::zero(); width * height];
    let blocks_x = width.div_ceil(4);

    for by in 0..height.div_ceil(4) {
        for bx in 0..blocks_x {
            let offset = (by * blocks_x + bx) * 16;
            let block = &data[offset..offset + 16];

            let (r_ramp, r_indices) = decode_channel_block(&block[0..8]);
            let (g_ramp, g_indices) = decode_channel_block(&block[8..16]);

            for j in 0..4 {
                for i in 0..4 {
                    let px = bx * 4 + i;
                    let py = by * 4 + j;
                    if px >= width || py >= height {
                        continue;
                    }
                    let texel = j * 4 + i;
                    let r = r_ramp[((r_indices >> (3 * texel)) & 0x7) as usize];
                    let g = g_ramp[((g_indices >> (3 * texel)) & 0x7) as usize];
                    // Two stored channels; blue is the reconstructed remainder
                    let b = (1.0 - r * r - g * g).max(0.0).sqrt();
                    pixels[py * width + px] = Vec3::new(r, g, b);
                }
            }
        }
    }
    MipLevel::new(width, height, pixels)
}

/// Decode one DXT5-style single-channel block: an 8-point ramp plus 16
/// packed 3-bit indices.
fn decode_channel_block(block: &[u8]) -> ([f32; 8], u64) {
    let a0 = block[0];
    let a1 = block[1];

    let mut ramp = [0.0f32; 8];
    ramp[0] = a0 as f32 / 255.0;
    ramp[1] = a1 as f32 / 255.0;
    if a0 > a1 {
        for i in 0..6 {
            ramp[i + 2] =
                ((6 - i) as f32 * a0 as f32 + (i + 1) as f32 * a1 as f32) / 7.0 / 255.0;
        }
    } else {
        for i in 0..4 {
            ramp[i + 2] =
                ((4 - i) as f32 * a0 as f32 + (i + 1) as f32 * a1 as f32) / 5.0 / 255.0;
        }
        ramp[6] = 0.0;
        ramp[7] = 1.0;
    }

    let mut indices = 0u64;
    for (i, &b) in block[2..8].iter().enumerate() {
        indices |= (b as u64) << (i * 8);
    }
    (ramp, indices)
}

/// Scatter a 4x4 block's palette lookups into the output image,
/// clipping at the right/bottom edges.
fn write_color_block(
    pixels: &mut [Vec3],
    width: usize,
    height: usize,
    bx: usize,
    by: usize,
    lookup: u32,
    palette: &[Vec3; 4],
) {
    for j in 0..4 {
        for i in 0..4 {
            let px = bx * 4 + i;
            let py = by * 4 + j;
            if px >= width || py >= height {
                continue;
            }
            let index = (lookup >> (2 * (j * 4 + i))) & 0x3;
            pixels[py * width + px] = palette[index as usize];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header(
        width: u32,
        height: u32,
        four_cc: &[u8; 4],
        mip_count: u32,
        with_mips: bool,
    ) -> Vec<u8> {
        let mut bytes = vec![0u8; 4 + HEADER_SIZE];
        LittleEndian::write_u32(&mut bytes[0..4], DDS_MAGIC);
        let h = &mut bytes[4..];
        LittleEndian::write_u32(&mut h[0..4], HEADER_SIZE as u32);
        let mut flags = DDSD_CAPS | DDSD_HEIGHT | DDSD_WIDTH | DDSD_PIXELFORMAT;
        if with_mips {
            flags |= DDSD_MIPMAPCOUNT;
        }
        LittleEndian::write_u32(&mut h[4..8], flags);
        LittleEndian::write_u32(&mut h[8..12], height);
        LittleEndian::write_u32(&mut h[12..16], width);
        LittleEndian::write_u32(&mut h[28..32], mip_count);
        LittleEndian::write_u32(&mut h[76..80], 32); // pixelformat size
        LittleEndian::write_u32(&mut h[80..84], DDPF_FOURCC);
        h[84..88].copy_from_slice(four_cc);
        let mut caps = DDSCAPS_TEXTURE;
        if with_mips {
            caps |= DDSCAPS_MIPMAP;
        }
        LittleEndian::write_u32(&mut h[108..112], caps);
        bytes
    }

    /// DXT1 block where every texel points at palette entry 0
    fn solid_dxt1_block(c0: u16, c1: u16) -> [u8; 8] {
        let mut block = [0u8; 8];
        LittleEndian::write_u16(&mut block[0..2], c0);
        LittleEndian::write_u16(&mut block[2..4], c1);
        block
    }

    #[test]
    fn test_magic_rejected() {
        let mut bytes = make_header(4, 4, b"DXT1", 1, false);
        bytes[0] = b'X';
        bytes.extend_from_slice(&solid_dxt1_block(0xF800, 0));
        assert!(matches!(decode(&bytes), Err(DecodeFailure::Malformed(_))));
    }

    #[test]
    fn test_unknown_fourcc_rejected() {
        let mut bytes = make_header(4, 4, b"DX10", 1, false);
        bytes.extend_from_slice(&[0u8; 8]);
        assert!(matches!(
            decode(&bytes),
            Err(DecodeFailure::Unsupported(_))
        ));
    }

    #[test]
    fn test_dxt1_solid_red() {
        let mut bytes = make_header(4, 4, b"DXT1", 1, false);
        bytes.extend_from_slice(&solid_dxt1_block(0xF800, 0)); // pure red 565
        let levels = decode(&bytes).unwrap();
        assert_eq!(levels.len(), 1);
        assert_eq!((levels[0].width, levels[0].height), (4, 4));
        for px in &levels[0].pixels {
            assert!(px.approx_eq(&Vec3::new(1.0, 0.0, 0.0), 1e-6));
        }
    }

    #[test]
    fn test_dxt1_three_color_mode_black() {
        // c0 <= c1: index 3 decodes to transparent-black
        let mut bytes = make_header(4, 4, b"DXT1", 1, false);
        let mut block = solid_dxt1_block(0x0000, 0xFFFF);
        block[4..8].fill(0xFF); // all indices = 3
        bytes.extend_from_slice(&block);
        let levels = decode(&bytes).unwrap();
        for px in &levels[0].pixels {
            assert!(px.approx_eq(&Vec3::zero(), 1e-6));
        }
    }

    #[test]
    fn test_dxt1_four_color_interpolation() {
        // c0 > c1, all indices 2: 2/3 c0 + 1/3 c1
        let mut bytes = make_header(4, 4, b"DXT1", 1, false);
        let mut block = solid_dxt1_block(0xF800, 0x001F); // red, blue
        block[4..8].fill(0b1010_1010); // all indices = 2
        bytes.extend_from_slice(&block);
        let levels = decode(&bytes).unwrap();
        for px in &levels[0].pixels {
            assert!(px.approx_eq(&Vec3::new(2.0 / 3.0, 0.0, 1.0 / 3.0), 1e-5));
        }
    }

    #[test]
    fn test_dxt5_color_block() {
        let mut bytes = make_header(4, 4, b"DXT5", 1, false);
        let mut block = [0u8; 16];
        LittleEndian::write_u16(&mut block[8..10], 0x07E0); // green
        bytes.extend_from_slice(&block);
        let levels = decode(&bytes).unwrap();
        for px in &levels[0].pixels {
            assert!(px.approx_eq(&Vec3::new(0.0, 1.0, 0.0), 1e-6));
        }
    }

    #[test]
    fn test_bc5_reconstructs_blue() {
        let mut bytes = make_header(4, 4, b"ATI2", 1, false);
        let mut block = [0u8; 16];
        block[0] = 153; // r0 = 0.6
        block[1] = 153;
        block[8] = 0; // g0 = 0
        block[9] = 0;
        bytes.extend_from_slice(&block);
        let levels = decode(&bytes).unwrap();
        let r = 153.0 / 255.0;
        let expected_b = (1.0f32 - r * r).sqrt();
        for px in &levels[0].pixels {
            assert!((px.x - r).abs() < 1e-5);
            assert!(px.y.abs() < 1e-5);
            assert!((px.z - expected_b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_mip_chain_loaded() {
        // 8x8 DXT1 with 4 mips: 8x8 (4 blocks), 4x4 (1), 2x2 (1), 1x1 (1)
        let mut bytes = make_header(8, 8, b"DXT1", 4, true);
        for _ in 0..7 {
            bytes.extend_from_slice(&solid_dxt1_block(0xF800, 0));
        }
        let levels = decode(&bytes).unwrap();
        assert_eq!(levels.len(), 4);
        assert_eq!((levels[0].width, levels[0].height), (8, 8));
        assert_eq!((levels[3].width, levels[3].height), (1, 1));
    }

    #[test]
    fn test_mip_flag_without_cap_ignored() {
        // MIPMAPCOUNT flag set but MIPMAP cap missing: only level 0 decodes
        let mut bytes = make_header(8, 8, b"DXT1", 4, true);
        let caps_off = 4 + 108;
        LittleEndian::write_u32(&mut bytes[caps_off..caps_off + 4], DDSCAPS_TEXTURE);
        for _ in 0..7 {
            bytes.extend_from_slice(&solid_dxt1_block(0xF800, 0));
        }
        let levels = decode(&bytes).unwrap();
        assert_eq!(levels.len(), 1);
    }

    #[test]
    fn test_truncated_chain_keeps_prefix() {
        // Header promises 4 mips but data only covers the first two
        let mut bytes = make_header(8, 8, b"DXT1", 4, true);
        for _ in 0..5 {
            bytes.extend_from_slice(&solid_dxt1_block(0xF800, 0));
        }
        let levels = decode(&bytes).unwrap();
        assert_eq!(levels.len(), 2);
    }

    #[test]
    fn test_alpha_ramp_eight_point() {
        let block = [255u8, 0, 0, 0, 0, 0, 0, 0];
        let (ramp, _) = decode_channel_block(&block);
        // a0 > a1: evenly spaced 8-point ramp from a0 down to a1
        assert!((ramp[0] - 1.0).abs() < 1e-6);
        assert!(ramp[1].abs() < 1e-6);
        assert!((ramp[2] - 6.0 / 7.0).abs() < 1e-5);
        assert!((ramp[7] - 1.0 / 7.0).abs() < 1e-5);
    }

    #[test]
    fn test_alpha_ramp_six_point() {
        let block = [0u8, 255, 0, 0, 0, 0, 0, 0];
        let (ramp, _) = decode_channel_block(&block);
        // a0 <= a1: 6-point ramp with pinned 0 and 1 endpoints
        assert!(ramp[0].abs() < 1e-6);
        assert!((ramp[1] - 1.0).abs() < 1e-6);
        assert!(ramp[6].abs() < 1e-6);
        assert!((ramp[7] - 1.0).abs() < 1e-6);
    }
}
