//! Geometric data augmentation
//!
//! Training images get a random affine perturbation on every draw:
//! rotation, horizontal/vertical shift and independent x/y zoom, all about
//! the image centre, followed by an optional horizontal flip. Pixels are
//! resampled bilinearly. Coordinates that fall outside the source are
//! handled according to [`FillMode`].
//!
//! Validation, test and inference images are never augmented.

use image::{Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// How pixels outside the source image are filled
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillMode {
    /// Replicate the nearest edge pixel
    Nearest,
    /// Fill with black
    Constant,
}

/// Random transform ranges
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Rotation drawn uniformly from ±rotation_degrees
    pub rotation_degrees: f32,
    /// Horizontal shift as a fraction of width (±)
    pub width_shift: f32,
    /// Vertical shift as a fraction of height (±)
    pub height_shift: f32,
    /// Flip left/right with probability 0.5
    pub horizontal_flip: bool,
    /// Zoom factors drawn from [1 - zoom_range, 1 + zoom_range]
    pub zoom_range: f32,
    pub fill: FillMode,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rotation_degrees: 10.0,
            width_shift: 0.1,
            height_shift: 0.1,
            horizontal_flip: true,
            zoom_range: 0.1,
            fill: FillMode::Nearest,
        }
    }
}

impl AugmentationConfig {
    /// Disable all augmentations
    pub fn none() -> Self {
        Self {
            rotation_degrees: 0.0,
            width_shift: 0.0,
            height_shift: 0.0,
            horizontal_flip: false,
            zoom_range: 0.0,
            fill: FillMode::Nearest,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.rotation_degrees == 0.0
            && self.width_shift == 0.0
            && self.height_shift == 0.0
            && !self.horizontal_flip
            && self.zoom_range == 0.0
    }
}

/// Parameters drawn for a single image
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineParams {
    pub angle_degrees: f32,
    /// Shift in pixels along x
    pub tx: f32,
    /// Shift in pixels along y
    pub ty: f32,
    pub zoom_x: f32,
    pub zoom_y: f32,
    pub flip: bool,
}

impl AffineParams {
    pub fn identity() -> Self {
        Self {
            angle_degrees: 0.0,
            tx: 0.0,
            ty: 0.0,
            zoom_x: 1.0,
            zoom_y: 1.0,
            flip: false,
        }
    }

    fn is_identity_affine(&self) -> bool {
        self.angle_degrees == 0.0
            && self.tx == 0.0
            && self.ty == 0.0
            && self.zoom_x == 1.0
            && self.zoom_y == 1.0
    }
}

/// Applies random geometric transforms to RGB images
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Draw transform parameters for an image of the given size
    pub fn sample_params(&self, width: u32, height: u32, rng: &mut ChaCha8Rng) -> AffineParams {
        let c = &self.config;
        let symmetric = |rng: &mut ChaCha8Rng, range: f32| {
            if range > 0.0 {
                rng.gen_range(-range..=range)
            } else {
                0.0
            }
        };

        let angle_degrees = symmetric(rng, c.rotation_degrees);
        let tx = symmetric(rng, c.width_shift) * width as f32;
        let ty = symmetric(rng, c.height_shift) * height as f32;
        let zoom_x = 1.0 + symmetric(rng, c.zoom_range);
        let zoom_y = 1.0 + symmetric(rng, c.zoom_range);
        let flip = c.horizontal_flip && rng.gen::<f32>() < 0.5;

        AffineParams {
            angle_degrees,
            tx,
            ty,
            zoom_x,
            zoom_y,
            flip,
        }
    }

    /// Apply a random perturbation
    pub fn augment(&self, img: &RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        if self.config.is_identity() {
            return img.clone();
        }
        let params = self.sample_params(img.width(), img.height(), rng);
        self.apply(img, &params)
    }

    /// Apply fixed transform parameters
    pub fn apply(&self, img: &RgbImage, params: &AffineParams) -> RgbImage {
        let mut out = if params.is_identity_affine() {
            img.clone()
        } else {
            self.warp(img, params)
        };

        if params.flip {
            image::imageops::flip_horizontal_in_place(&mut out);
        }
        out
    }

    /// Inverse-map every output pixel: src = R(Z * p + t) about the centre
    fn warp(&self, img: &RgbImage, params: &AffineParams) -> RgbImage {
        let (width, height) = img.dimensions();
        let cx = (width as f32 - 1.0) / 2.0;
        let cy = (height as f32 - 1.0) / 2.0;

        let theta = params.angle_degrees.to_radians();
        let (sin_t, cos_t) = theta.sin_cos();

        RgbImage::from_fn(width, height, |x, y| {
            let px = (x as f32 - cx) * params.zoom_x + params.tx;
            let py = (y as f32 - cy) * params.zoom_y + params.ty;

            let src_x = cos_t * px - sin_t * py + cx;
            let src_y = sin_t * px + cos_t * py + cy;

            bilinear_sample(img, src_x, src_y, self.config.fill)
        })
    }
}

/// Sample a pixel using bilinear interpolation
fn bilinear_sample(img: &RgbImage, x: f32, y: f32, fill: FillMode) -> Rgb<u8> {
    let (width, height) = img.dimensions();
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;

    let (x, y) = match fill {
        FillMode::Nearest => (x.clamp(0.0, max_x), y.clamp(0.0, max_y)),
        FillMode::Constant => {
            if x < 0.0 || y < 0.0 || x > max_x || y > max_y {
                return Rgb([0, 0, 0]);
            }
            (x, y)
        }
    };

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut result = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;

        result[c] = v.round().clamp(0.0, 255.0) as u8;
    }

    Rgb(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn create_test_image() -> RgbImage {
        RgbImage::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128]))
    }

    #[test]
    fn test_augment_preserves_dimensions() {
        let augmenter = Augmenter::new(AugmentationConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let img = create_test_image();

        for _ in 0..10 {
            let out = augmenter.augment(&img, &mut rng);
            assert_eq!(out.dimensions(), (64, 64));
        }
    }

    #[test]
    fn test_none_is_identity() {
        let augmenter = Augmenter::new(AugmentationConfig::none());
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let img = create_test_image();
        assert_eq!(augmenter.augment(&img, &mut rng), img);
    }

    #[test]
    fn test_params_stay_in_range() {
        let augmenter = Augmenter::new(AugmentationConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let mut flips = 0;
        for _ in 0..1000 {
            let p = augmenter.sample_params(224, 224, &mut rng);
            assert!(p.angle_degrees.abs() <= 10.0);
            assert!(p.tx.abs() <= 22.4 + 1e-3);
            assert!(p.ty.abs() <= 22.4 + 1e-3);
            assert!((0.9..=1.1).contains(&p.zoom_x));
            assert!((0.9..=1.1).contains(&p.zoom_y));
            if p.flip {
                flips += 1;
            }
        }
        assert!(flips > 400 && flips < 600, "flip rate off: {}", flips);
    }

    #[test]
    fn test_nearest_fill_keeps_uniform_image_uniform() {
        let augmenter = Augmenter::new(AugmentationConfig::default());
        let img = RgbImage::from_pixel(32, 32, Rgb([17, 130, 40]));
        let params = AffineParams {
            angle_degrees: 10.0,
            tx: 3.2,
            ty: -3.2,
            zoom_x: 0.9,
            zoom_y: 1.1,
            flip: true,
        };

        let out = augmenter.apply(&img, &params);
        assert!(out.pixels().all(|p| *p == Rgb([17, 130, 40])));
    }

    #[test]
    fn test_constant_fill_introduces_black_border() {
        let config = AugmentationConfig {
            fill: FillMode::Constant,
            ..AugmentationConfig::default()
        };
        let augmenter = Augmenter::new(config);
        let img = RgbImage::from_pixel(32, 32, Rgb([255, 255, 255]));
        let params = AffineParams {
            tx: 8.0,
            ..AffineParams::identity()
        };

        let out = augmenter.apply(&img, &params);
        assert_eq!(*out.get_pixel(31, 16), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(0, 16), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_shift_moves_content() {
        let augmenter = Augmenter::new(AugmentationConfig::default());
        let img = create_test_image();
        let params = AffineParams {
            tx: 2.0,
            ..AffineParams::identity()
        };

        // Output column x samples source column x + 2
        let out = augmenter.apply(&img, &params);
        assert_eq!(out.get_pixel(10, 5), img.get_pixel(12, 5));
    }

    #[test]
    fn test_flip_only() {
        let augmenter = Augmenter::new(AugmentationConfig::default());
        let img = create_test_image();
        let params = AffineParams {
            flip: true,
            ..AffineParams::identity()
        };

        let out = augmenter.apply(&img, &params);
        assert_eq!(out.get_pixel(0, 9), img.get_pixel(63, 9));
    }

    #[test]
    fn test_same_seed_same_output() {
        let augmenter = Augmenter::new(AugmentationConfig::default());
        let img = create_test_image();

        let a = augmenter.augment(&img, &mut ChaCha8Rng::seed_from_u64(3));
        let b = augmenter.augment(&img, &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(a, b);
    }
}
