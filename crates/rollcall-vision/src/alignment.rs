//! Face alignment via 4-DOF similarity transform.
//!
//! Maps five detected landmarks onto the InsightFace reference positions
//! and warps the face into a 112x112 RGB crop for ArcFace.

use image::{Rgb, RgbImage};

/// ArcFace reference landmarks for a 112x112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Similarity transform `dst = [a -b; b a] * src + [tx; ty]`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Closed-form least-squares fit from `src` to `dst` points.
    fn fit(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let n = src.len() as f32;
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (msx, msy) = mean(src);
        let (mdx, mdy) = mean(dst);

        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        let mut norm = 0.0f32;
        for ((sx, sy), (dx, dy)) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (sx - msx, sy - msy);
            let (dx, dy) = (dx - mdx, dy - mdy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            norm += sx * sx + sy * sy;
        }

        if norm < 1e-12 {
            // Degenerate landmarks: translate only.
            return Self { a: 1.0, b: 0.0, tx: mdx - msx, ty: mdy - msy };
        }

        let a = dot / norm;
        let b = cross / norm;
        Self {
            a,
            b,
            tx: mdx - (a * msx - b * msy),
            ty: mdy - (b * msx + a * msy),
        }
    }

    fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    fn invert(&self, (x, y): (f32, f32)) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let (dx, dy) = (x - self.tx, y - self.ty);
        Some((
            (self.a * dx + self.b * dy) / det,
            (-self.b * dx + self.a * dy) / det,
        ))
    }
}

/// Bilinear sample with black outside the image.
fn sample(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let x0 = x.floor();
    let y0 = y.floor();
    let (fx, fy) = (x - x0, y - y0);
    let (w, h) = (image.width() as i64, image.height() as i64);

    let texel = |xi: i64, yi: i64| -> [f32; 3] {
        if xi >= 0 && xi < w && yi >= 0 && yi < h {
            let p = image.get_pixel(xi as u32, yi as u32).0;
            [p[0] as f32, p[1] as f32, p[2] as f32]
        } else {
            [0.0; 3]
        }
    };

    let (x0, y0) = (x0 as i64, y0 as i64);
    let tl = texel(x0, y0);
    let tr = texel(x0 + 1, y0);
    let bl = texel(x0, y0 + 1);
    let br = texel(x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let v = tl[c] * (1.0 - fx) * (1.0 - fy)
            + tr[c] * fx * (1.0 - fy)
            + bl[c] * (1.0 - fx) * fy
            + br[c] * fx * fy;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Align a detected face to a canonical 112x112 RGB crop.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let transform = Similarity::fit(landmarks, &REFERENCE_LANDMARKS_112);
    RgbImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |ox, oy| {
        match transform.invert((ox as f32, oy as f32)) {
            Some((sx, sy)) => sample(image, sx, sy),
            None => Rgb([0, 0, 0]),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_fit() {
        let t = Similarity::fit(&REFERENCE_LANDMARKS_112, &REFERENCE_LANDMARKS_112);
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-3, "tx = {}", t.tx);
        assert!(t.ty.abs() < 1e-3, "ty = {}", t.ty);
    }

    #[test]
    fn test_scaled_fit() {
        // Face twice as large as the reference crop.
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x * 2.0 + 30.0, y * 2.0 + 10.0));
        let t = Similarity::fit(&src, &REFERENCE_LANDMARKS_112);
        assert!((t.a - 0.5).abs() < 1e-4, "a = {}", t.a);
        for (s, d) in src.iter().zip(REFERENCE_LANDMARKS_112.iter()) {
            let (x, y) = t.apply(*s);
            assert!((x - d.0).abs() < 1e-2 && (y - d.1).abs() < 1e-2);
        }
    }

    #[test]
    fn test_rotated_fit_roundtrip() {
        let (sin, cos) = 0.3f32.sin_cos();
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (cos * x - sin * y + 50.0, sin * x + cos * y));
        let t = Similarity::fit(&src, &REFERENCE_LANDMARKS_112);
        let mapped = t.apply(src[2]);
        let back = t.invert(mapped).unwrap();
        assert!((back.0 - src[2].0).abs() < 1e-3);
        assert!((back.1 - src[2].1).abs() < 1e-3);
    }

    #[test]
    fn test_align_output_size() {
        let image = RgbImage::from_pixel(640, 480, Rgb([128, 64, 32]));
        let aligned = align_face(&image, &REFERENCE_LANDMARKS_112);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
        assert_eq!(aligned.get_pixel(56, 56), &Rgb([128, 64, 32]));
    }

    #[test]
    fn test_landmark_lands_on_reference() {
        let mut image = RgbImage::new(200, 200);
        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];
        // bright 5x5 patch on the left eye
        for dy in 0..5 {
            for dx in 0..5 {
                image.put_pixel(78 + dx, 58 + dy, Rgb([255, 255, 255]));
            }
        }

        let aligned = align_face(&image, &src);
        let (rx, ry) = REFERENCE_LANDMARKS_112[0];
        let mut brightest = 0u8;
        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                let x = (rx.round() as i32 + dx) as u32;
                let y = (ry.round() as i32 + dy) as u32;
                brightest = brightest.max(aligned.get_pixel(x, y).0[0]);
            }
        }
        assert!(brightest > 100, "left eye patch not found near reference, max={brightest}");
    }
}
