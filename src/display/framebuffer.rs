//! Shared color + depth framebuffer for rasterizer workers.
//!
//! Depth is normalized to [0, 1] with 0 nearest and cleared to 1. The
//! depth test and color write happen as one critical section keyed on the
//! pixel: among all writes that pass the strict `<` test, the one with the
//! smallest depth is the one left visible at the end of the frame,
//! regardless of worker interleaving. The critical sections come from a
//! fixed pool of hashed mutexes rather than one lock per pixel.
//!
//! Frame protocol: `clear` runs before workers start, `set_pixel` runs
//! from workers during rasterization, and the flip/read/save operations
//! run after `wait_for_completion`. The buffer itself carries no frame
//! state machine.

use std::cell::UnsafeCell;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::math::Vec3;
use crate::pool::WorkerPool;
use crate::texture::write_tga;

/// Size of the hashed mutex pool guarding pixel writes
const LOCK_POOL_SIZE: usize = 2047;
/// Row-mixing factor for the lock hash
const LOCK_HASH_PRIME: usize = 13331;

pub struct Framebuffer {
    width: usize,
    height: usize,
    color: UnsafeCell<Vec<Vec3>>,
    depth: UnsafeCell<Vec<f32>>,
    locks: Vec<Mutex<()>>,
}

// Interior buffers are only touched through the lock pool (set_pixel) or
// in the single-threaded frame phases described in the module docs.
unsafe impl Sync for Framebuffer {}

/// Raw pointer that may cross into worker tasks. Only used for writes to
/// disjoint row stripes while the caller blocks on the pool barrier.
#[derive(Clone, Copy)]
struct SendPtr<T>(*mut T);
unsafe impl<T> Send for SendPtr<T> {}

impl Framebuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            color: UnsafeCell::new(vec![Vec3::zero(); width * height]),
            depth: UnsafeCell::new(vec![1.0; width * height]),
            locks: (0..LOCK_POOL_SIZE).map(|_| Mutex::new(())).collect(),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && (x as usize) < self.width && y >= 0 && (y as usize) < self.height
    }

    #[inline]
    fn lock_index(x: usize, y: usize) -> usize {
        (x * LOCK_HASH_PRIME + y) % LOCK_POOL_SIZE
    }

    /// Fill the color buffer and reset every depth to 1.0.
    /// Must not run while workers are rasterizing.
    pub fn clear(&self, bg: Vec3) {
        // Safety: single-threaded frame phase, no concurrent access
        unsafe {
            (*self.color.get()).fill(bg);
            (*self.depth.get()).fill(1.0);
        }
    }

    /// Depth-tested pixel write. Passes only when `depth` is strictly
    /// below the stored value; color and depth update together under the
    /// pixel's lock.
    pub fn set_pixel(&self, x: i32, y: i32, color: Vec3, depth: f32) {
        if !self.in_bounds(x, y) {
            return;
        }
        let idx = y as usize * self.width + x as usize;

        let _guard = self.locks[Self::lock_index(x as usize, y as usize)].lock();
        // Safety: this pixel's slots are only written under its lock
        unsafe {
            let depth_buf = &mut *self.depth.get();
            if depth >= depth_buf[idx] {
                return;
            }
            depth_buf[idx] = depth;
            (&mut (*self.color.get()))[idx] = color;
        }
    }

    /// Unlocked depth read for early fragment rejection. The value may be
    /// stale under contention; `set_pixel` re-tests under the lock.
    #[inline]
    pub fn depth_at(&self, x: i32, y: i32) -> f32 {
        if !self.in_bounds(x, y) {
            return 1.0;
        }
        unsafe { (&(*self.depth.get()))[y as usize * self.width + x as usize] }
    }

    /// Color read for presentation and tests (single-threaded phase)
    #[inline]
    pub fn color_at(&self, x: i32, y: i32) -> Vec3 {
        if !self.in_bounds(x, y) {
            return Vec3::zero();
        }
        unsafe { (&(*self.color.get()))[y as usize * self.width + x as usize] }
    }

    /// Swap color rows top-to-bottom, striped across the pool.
    /// Must not run while workers are rasterizing.
    pub fn flip_vertical(&self, pool: &WorkerPool) {
        let half = self.height / 2;
        if half == 0 {
            return;
        }

        let stripes = pool.num_threads().min(half).max(1);
        let rows_per_stripe = half.div_ceil(stripes);
        let width = self.width;
        let height = self.height;
        let color = SendPtr(unsafe { (*self.color.get()).as_mut_ptr() });

        for stripe in 0..stripes {
            let y_start = stripe * rows_per_stripe;
            let y_end = ((stripe + 1) * rows_per_stripe).min(half);
            if y_start >= y_end {
                break;
            }
            let color = color;
            let task = move || {
                let color = color;
                for y in y_start..y_end {
                    let top = y * width;
                    let bottom = (height - 1 - y) * width;
                    for x in 0..width {
                        // Safety: stripes cover disjoint row pairs and the
                        // caller blocks on the barrier below
                        unsafe {
                            std::ptr::swap(color.0.add(top + x), color.0.add(bottom + x));
                        }
                    }
                }
            };
            if pool.enqueue(task).is_err() {
                return;
            }
        }
        pool.wait_for_completion();
    }

    /// Convert the color buffer to packed RGB24 rows, striped across the
    /// pool. Values are clamped to [0, 1] at this final write.
    pub fn to_rgb24(&self, pool: &WorkerPool) -> Vec<u8> {
        let mut out = vec![0u8; self.width * self.height * 3];
        let stripes = pool.num_threads().min(self.height).max(1);
        let rows_per_stripe = self.height.div_ceil(stripes);
        let width = self.width;
        let height = self.height;
        let color = SendPtr(unsafe { (*self.color.get()).as_mut_ptr() });
        let dst = SendPtr(out.as_mut_ptr());

        for stripe in 0..stripes {
            let y_start = stripe * rows_per_stripe;
            let y_end = ((stripe + 1) * rows_per_stripe).min(height);
            if y_start >= y_end {
                break;
            }
            let (color, dst) = (color, dst);
            let task = move || {
                let (color, dst) = (color, dst);
                for y in y_start..y_end {
                    for x in 0..width {
                        // Safety: disjoint rows; caller blocks on the
                        // barrier before `out` moves
                        unsafe {
                            let px = (*color.0.add(y * width + x)).clamp01();
                            let o = dst.0.add((y * width + x) * 3);
                            *o = (px.x * 255.0 + 0.5) as u8;
                            *o.add(1) = (px.y * 255.0 + 0.5) as u8;
                            *o.add(2) = (px.z * 255.0 + 0.5) as u8;
                        }
                    }
                }
            };
            if pool.enqueue(task).is_err() {
                break;
            }
        }
        pool.wait_for_completion();
        out
    }

    /// Save the color buffer as an uncompressed 24-bit BGR TGA with a
    /// top-left origin.
    pub fn save_tga(&self, path: &Path) -> std::io::Result<()> {
        // Safety: single-threaded frame phase
        let pixels = unsafe { &*self.color.get() };
        write_tga(path, self.width, self.height, pixels)
    }
}

/// Convenience for glue code holding the buffer behind an `Arc`
pub type SharedFramebuffer = Arc<Framebuffer>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_clear_resets_color_and_depth() {
        let fb = Framebuffer::new(16, 16);
        fb.set_pixel(3, 3, Vec3::splat(1.0), 0.5);
        fb.clear(Vec3::new(0.5, 0.5, 0.5));
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(fb.color_at(x, y), Vec3::new(0.5, 0.5, 0.5));
                assert_eq!(fb.depth_at(x, y), 1.0);
            }
        }
    }

    #[test]
    fn test_depth_test_strict_less() {
        let fb = Framebuffer::new(4, 4);
        fb.clear(Vec3::zero());

        fb.set_pixel(1, 1, Vec3::new(1.0, 0.0, 0.0), 0.5);
        assert_eq!(fb.color_at(1, 1), Vec3::new(1.0, 0.0, 0.0));

        // Equal depth loses
        fb.set_pixel(1, 1, Vec3::new(0.0, 1.0, 0.0), 0.5);
        assert_eq!(fb.color_at(1, 1), Vec3::new(1.0, 0.0, 0.0));

        // Larger depth loses
        fb.set_pixel(1, 1, Vec3::new(0.0, 1.0, 0.0), 0.8);
        assert_eq!(fb.color_at(1, 1), Vec3::new(1.0, 0.0, 0.0));

        // Smaller depth wins
        fb.set_pixel(1, 1, Vec3::new(0.0, 0.0, 1.0), 0.2);
        assert_eq!(fb.color_at(1, 1), Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(fb.depth_at(1, 1), 0.2);
    }

    #[test]
    fn test_out_of_bounds_writes_ignored() {
        let fb = Framebuffer::new(4, 4);
        fb.set_pixel(-1, 0, Vec3::splat(1.0), 0.0);
        fb.set_pixel(0, -1, Vec3::splat(1.0), 0.0);
        fb.set_pixel(4, 0, Vec3::splat(1.0), 0.0);
        fb.set_pixel(0, 4, Vec3::splat(1.0), 0.0);
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(fb.color_at(x, y), Vec3::zero());
            }
        }
    }

    #[test]
    fn test_concurrent_smallest_depth_wins() {
        // Many threads contend on one pixel; the smallest depth must win
        let fb = Arc::new(Framebuffer::new(8, 8));
        fb.clear(Vec3::zero());

        let mut handles = Vec::new();
        for t in 0..8 {
            let fb = Arc::clone(&fb);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    let depth = ((t * 100 + i) % 97) as f32 / 100.0 + 0.01;
                    fb.set_pixel(4, 4, Vec3::new(depth, depth, depth), depth);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let final_depth = fb.depth_at(4, 4);
        assert_eq!(final_depth, 0.01);
        // Winning color matches the winning depth
        assert_eq!(fb.color_at(4, 4).x, final_depth);
    }

    #[test]
    fn test_flip_vertical() {
        let fb = Framebuffer::new(2, 4);
        fb.clear(Vec3::zero());
        for y in 0..4 {
            let shade = y as f32 / 4.0;
            fb.set_pixel(0, y, Vec3::splat(shade), 0.0);
            fb.set_pixel(1, y, Vec3::splat(shade), 0.0);
        }

        let pool = WorkerPool::new(3);
        fb.flip_vertical(&pool);

        for y in 0..4 {
            let expected = (3 - y) as f32 / 4.0;
            assert!((fb.color_at(0, y).x - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_to_rgb24_rounds_and_clamps() {
        let fb = Framebuffer::new(2, 1);
        fb.clear(Vec3::zero());
        fb.set_pixel(0, 0, Vec3::new(1.5, 0.5, -0.25), 0.0);

        let pool = WorkerPool::new(2);
        let rgb = fb.to_rgb24(&pool);
        assert_eq!(rgb.len(), 6);
        assert_eq!(rgb[0], 255);
        assert_eq!(rgb[1], 128);
        assert_eq!(rgb[2], 0);
    }

    #[test]
    fn test_save_tga_roundtrip_dimensions() {
        let fb = Framebuffer::new(4, 2);
        fb.clear(Vec3::new(1.0, 0.0, 0.0));
        let path = std::env::temp_dir().join("scanline_fb_save_test.tga");
        fb.save_tga(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).ok();
        // 18-byte header + 4*2*3 pixel bytes
        assert_eq!(bytes.len(), 18 + 24);
        assert_eq!(bytes[2], 2); // uncompressed RGB
        assert_eq!(bytes[16], 24); // bits per pixel
        assert_eq!(bytes[17], 0x20); // top-left origin
        // First pixel is BGR for red
        assert_eq!(&bytes[18..21], &[0, 0, 255]);
    }
}
