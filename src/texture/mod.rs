//! Mipmapped 2D textures and the trilinear sampling contract.
//!
//! A texture is an ordered chain of mip levels, level 0 being the base.
//! Level k has dimensions (max(1, W0 >> k), max(1, H0 >> k)). TGA sources
//! load level 0 and generate the rest with a box filter; DDS sources carry
//! every level in the file.

mod dds;
mod tga;

pub use tga::write_tga;

use std::path::Path;

use crate::math::{lerp3, Vec2, Vec3};
use crate::resources::ResourceError;

/// One level of a mip chain
#[derive(Debug, Clone)]
pub struct MipLevel {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<Vec3>,
}

impl MipLevel {
    pub fn new(width: usize, height: usize, pixels: Vec<Vec3>) -> Self {
        debug_assert_eq!(pixels.len(), width * height);
        Self {
            width,
            height,
            pixels,
        }
    }

    #[inline]
    fn pixel_clamped(&self, x: i32, y: i32) -> Vec3 {
        let x = x.clamp(0, self.width as i32 - 1) as usize;
        let y = y.clamp(0, self.height as i32 - 1) as usize;
        self.pixels[y * self.width + x]
    }

    /// Box-filtered half-size copy; dimensions never drop below 1
    fn downsample(&self) -> MipLevel {
        let new_w = (self.width / 2).max(1);
        let new_h = (self.height / 2).max(1);
        let mut pixels = Vec::with_capacity(new_w * new_h);

        for dy in 0..new_h {
            for dx in 0..new_w {
                let sx = (dx * 2) as i32;
                let sy = (dy * 2) as i32;
                let sum = self.pixel_clamped(sx, sy)
                    + self.pixel_clamped(sx + 1, sy)
                    + self.pixel_clamped(sx, sy + 1)
                    + self.pixel_clamped(sx + 1, sy + 1);
                pixels.push(sum / 4.0);
            }
        }

        MipLevel::new(new_w, new_h, pixels)
    }
}

/// Mipmapped 2D texture in linear color
#[derive(Debug)]
pub struct Texture {
    levels: Vec<MipLevel>,
}

impl Texture {
    /// Wrap pre-decoded levels (DDS path)
    pub fn from_levels(levels: Vec<MipLevel>) -> Self {
        Self { levels }
    }

    /// Build the full chain from a base level by repeated box filtering
    /// until 1x1 (TGA path).
    pub fn with_generated_mips(base: MipLevel) -> Self {
        let mut levels = vec![base];
        loop {
            let last = &levels[levels.len() - 1];
            if last.width <= 1 && last.height <= 1 {
                break;
            }
            let next = last.downsample();
            levels.push(next);
        }
        Self { levels }
    }

    /// Load from disk, dispatching on the file extension
    pub fn load(path: &Path) -> Result<Self, ResourceError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "tga" => tga::load(path),
            "dds" => dds::load(path),
            _ => Err(ResourceError::UnsupportedFormat {
                path: path.to_path_buf(),
                detail: format!("unknown texture extension {ext:?}"),
            }),
        }
    }

    /// Procedural checkerboard with a full mip chain, for scenes and
    /// sampling diagnostics
    pub fn checkerboard(size: usize, tile_size: usize, c1: Vec3, c2: Vec3) -> Self {
        let tile = tile_size.max(1);
        let mut pixels = Vec::with_capacity(size * size);
        for y in 0..size {
            for x in 0..size {
                let on = ((x / tile) + (y / tile)) % 2 == 0;
                pixels.push(if on { c1 } else { c2 });
            }
        }
        Self::with_generated_mips(MipLevel::new(size, size, pixels))
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty() || self.levels[0].width == 0 || self.levels[0].height == 0
    }

    pub fn width(&self) -> usize {
        self.levels.first().map_or(0, |l| l.width)
    }

    pub fn height(&self) -> usize {
        self.levels.first().map_or(0, |l| l.height)
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &MipLevel {
        &self.levels[level.min(self.levels.len() - 1)]
    }

    /// Trilinear sample.
    ///
    /// `ddx`/`ddy` are the UV derivatives per screen pixel; the footprint
    /// they describe selects the mip pair. Coordinates wrap modulo 1.
    pub fn sample(&self, u: f32, v: f32, ddx: Vec2, ddy: Vec2) -> Vec3 {
        if self.is_empty() {
            return Vec3::new(1.0, 0.0, 1.0); // Error color
        }

        let u = u.rem_euclid(1.0);
        let v = v.rem_euclid(1.0);

        let w0 = self.levels[0].width as f32;
        let h0 = self.levels[0].height as f32;
        let rho_sq = (ddx.length_sq() * w0 * w0).max(ddy.length_sq() * h0 * h0);

        let lod = if rho_sq < 1e-9 {
            0.0
        } else {
            (0.5 * rho_sq.log2()).max(0.0)
        };

        let last = self.levels.len() - 1;
        let base = (lod.floor() as usize).min(last);

        let c0 = Self::sample_bilinear(&self.levels[base], u, v);
        if base >= last {
            return c0;
        }

        let c1 = Self::sample_bilinear(&self.levels[base + 1], u, v);
        lerp3(c0, c1, lod.fract())
    }

    /// Bilinear filter at one level. Texel centers sit at +0.5; neighbors
    /// are clamped, not wrapped, because (u, v) were already wrapped.
    fn sample_bilinear(level: &MipLevel, u: f32, v: f32) -> Vec3 {
        if level.pixels.is_empty() {
            return Vec3::new(1.0, 0.0, 1.0);
        }

        let tx = u * level.width as f32 - 0.5;
        let ty = v * level.height as f32 - 0.5;

        let x0 = tx.floor() as i32;
        let y0 = ty.floor() as i32;
        let fx = tx - x0 as f32;
        let fy = ty - y0 as f32;

        let c00 = level.pixel_clamped(x0, y0);
        let c10 = level.pixel_clamped(x0 + 1, y0);
        let c01 = level.pixel_clamped(x0, y0 + 1);
        let c11 = level.pixel_clamped(x0 + 1, y0 + 1);

        let top = c00 * (1.0 - fx) + c10 * fx;
        let bottom = c01 * (1.0 - fx) + c11 * fx;
        top * (1.0 - fy) + bottom * fy
    }
}
