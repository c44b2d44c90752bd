//! 人脸对齐
//!
//! 用五个关键点做最小二乘相似变换（缩放、旋转、平移），把人脸变换到 ArcFace 的 112x112 标准位置。

use image::{Rgb, RgbImage};

/// 112x112 输出下的 ArcFace 参考关键点
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

pub const ALIGNED_SIZE: u32 = 112;

/// 估计从 `src` 到 `dst` 的相似变换，返回 `[a, -b, tx, b, a, ty]`
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 6] {
    // 每对点贡献两行方程：
    //   sx * a - sy * b + tx = dx
    //   sy * a + sx * b + ty = dy
    let mut ata = [[0.0f32; 4]; 4];
    let mut atb = [0.0f32; 4];

    for ((sx, sy), (dx, dy)) in src.iter().zip(dst) {
        let r1 = [*sx, -sy, 1.0, 0.0];
        let r2 = [*sy, *sx, 0.0, 1.0];
        for j in 0..4 {
            for k in 0..4 {
                ata[j][k] += r1[j] * r1[k] + r2[j] * r2[k];
            }
            atb[j] += r1[j] * dx + r2[j] * dy;
        }
    }

    let [a, b, tx, ty] = solve_4x4(ata, atb);
    [a, -b, tx, b, a, ty]
}

/// 列主元高斯消元
#[allow(clippy::needless_range_loop)]
fn solve_4x4(ata: [[f32; 4]; 4], atb: [f32; 4]) -> [f32; 4] {
    let mut m = [[0.0f32; 5]; 4];
    for i in 0..4 {
        m[i][..4].copy_from_slice(&ata[i]);
        m[i][4] = atb[i];
    }

    for col in 0..4 {
        let max_row = (col..4)
            .max_by(|&x, &y| m[x][col].abs().total_cmp(&m[y][col].abs()))
            .unwrap_or(col);
        m.swap(col, max_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            // 关键点退化，退回恒等变换
            return [1.0, 0.0, 0.0, 0.0];
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        x[i] = m[i][4];
        for j in (i + 1)..4 {
            x[i] -= m[i][j] * x[j];
        }
        x[i] /= m[i][i];
    }
    x
}

/// 双线性插值的仿射变换，超出原图的部分填充黑色
fn warp_affine(image: &RgbImage, matrix: &[f32; 6], out_size: u32) -> RgbImage {
    let (a, tx, b, ty) = (matrix[0], matrix[2], matrix[3], matrix[5]);

    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return RgbImage::new(out_size, out_size);
    }
    let ia = a / det;
    let ib = b / det;
    let (width, height) = (image.width() as i64, image.height() as i64);

    let sample = |x: i64, y: i64| -> [f32; 3] {
        if x >= 0 && x < width && y >= 0 && y < height {
            let p = image.get_pixel(x as u32, y as u32);
            [p[0] as f32, p[1] as f32, p[2] as f32]
        } else {
            [0.0; 3]
        }
    };

    RgbImage::from_fn(out_size, out_size, |ox, oy| {
        // 逆变换回原图坐标
        let dx = ox as f32 - tx;
        let dy = oy as f32 - ty;
        let sx = ia * dx + ib * dy;
        let sy = -ib * dx + ia * dy;

        let x0 = sx.floor() as i64;
        let y0 = sy.floor() as i64;
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let (tl, tr) = (sample(x0, y0), sample(x0 + 1, y0));
        let (bl, br) = (sample(x0, y0 + 1), sample(x0 + 1, y0 + 1));
        Rgb(std::array::from_fn(|c| {
            let v = tl[c] * (1.0 - fx) * (1.0 - fy)
                + tr[c] * fx * (1.0 - fy)
                + bl[c] * (1.0 - fx) * fy
                + br[c] * fx * fy;
            v.round().clamp(0.0, 255.0) as u8
        }))
    })
}

/// 将人脸对齐到 112x112
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let matrix = estimate_similarity_transform(landmarks, &REFERENCE_LANDMARKS_112);
    warp_affine(image, &matrix, ALIGNED_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let m = estimate_similarity_transform(&REFERENCE_LANDMARKS_112, &REFERENCE_LANDMARKS_112);
        assert!((m[0] - 1.0).abs() < 1e-4, "a = {}", m[0]);
        assert!(m[1].abs() < 1e-4);
        assert!(m[2].abs() < 1e-3);
        assert!(m[3].abs() < 1e-4);
        assert!((m[4] - 1.0).abs() < 1e-4);
        assert!(m[5].abs() < 1e-3);
    }

    #[test]
    fn test_scaled_transform() {
        // 关键点放大两倍，缩放系数应为 0.5
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x * 2.0, y * 2.0));
        let m = estimate_similarity_transform(&src, &REFERENCE_LANDMARKS_112);
        assert!((m[0] - 0.5).abs() < 0.01, "a = {}", m[0]);
    }

    #[test]
    fn test_align_face_output() {
        let image = RgbImage::from_pixel(640, 480, Rgb([10, 20, 30]));
        let aligned = align_face(&image, &REFERENCE_LANDMARKS_112);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
        assert_eq!(aligned.get_pixel(56, 56), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_out_of_bounds_is_black() {
        let image = RgbImage::from_pixel(20, 20, Rgb([255, 255, 255]));
        // 平移到原图之外
        let aligned = warp_affine(&image, &[1.0, 0.0, 500.0, 0.0, 1.0, 500.0], 16);
        assert!(aligned.pixels().all(|p| p == &Rgb([0, 0, 0])));
    }
}
