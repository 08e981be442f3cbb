use ndarray::{Array2, Zip};

use super::{DenseFlow, FlowField};
use crate::config::{HS_ALPHA, HS_ITERATIONS};
use crate::frame::Frame;

/// Sobel x kernel scaled by 1/8 so a unit ramp has unit gradient.
const SOBEL_X: [[f32; 3]; 3] = [
    [-1.0 / 8.0, 0.0, 1.0 / 8.0],
    [-2.0 / 8.0, 0.0, 2.0 / 8.0],
    [-1.0 / 8.0, 0.0, 1.0 / 8.0],
];
const SOBEL_Y: [[f32; 3]; 3] = [
    [-1.0 / 8.0, -2.0 / 8.0, -1.0 / 8.0],
    [0.0, 0.0, 0.0],
    [1.0 / 8.0, 2.0 / 8.0, 1.0 / 8.0],
];
/// Neighbourhood average without the centre pixel.
const AVERAGE: [[f32; 3]; 3] = [
    [1.0 / 12.0, 1.0 / 6.0, 1.0 / 12.0],
    [1.0 / 6.0, 0.0, 1.0 / 6.0],
    [1.0 / 12.0, 1.0 / 6.0, 1.0 / 12.0],
];

/// Horn-Schunck global flow: brightness constancy plus a smoothness term
/// weighted by `alpha`, solved with Jacobi iterations.
#[derive(Debug, Clone)]
pub struct HornSchunck {
    pub alpha: f32,
    pub iterations: usize,
}

impl Default for HornSchunck {
    fn default() -> Self {
        Self {
            alpha: HS_ALPHA,
            iterations: HS_ITERATIONS,
        }
    }
}

/// Mirror index without repeating the edge pixel (`dcb|abcd|cba`).
#[inline]
fn reflect_101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let mut i = i;
    if i < 0 {
        i = -i;
    }
    if i >= n {
        i = 2 * (n - 1) - i;
    }
    i as usize
}

fn filter_3x3(src: &Array2<f32>, kernel: &[[f32; 3]; 3]) -> Array2<f32> {
    let (rows, cols) = src.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let mut acc = 0.0;
        for (kr, krow) in kernel.iter().enumerate() {
            let y = reflect_101(r as isize + kr as isize - 1, rows);
            for (kc, k) in krow.iter().enumerate() {
                if *k != 0.0 {
                    let x = reflect_101(c as isize + kc as isize - 1, cols);
                    acc += k * src[(y, x)];
                }
            }
        }
        acc
    })
}

impl DenseFlow for HornSchunck {
    fn compute(&mut self, prev: &Frame, cur: &Frame) -> Option<FlowField> {
        let i1 = prev.luma();
        let i2 = cur.luma();

        let ix = filter_3x3(i1, &SOBEL_X);
        let iy = filter_3x3(i1, &SOBEL_Y);
        let it = i2 - i1;

        let alpha2 = self.alpha * self.alpha;
        let denom = Zip::from(&ix)
            .and(&iy)
            .map_collect(|&gx, &gy| alpha2 + gx * gx + gy * gy);

        let mut u = Array2::<f32>::zeros(i1.dim());
        let mut v = Array2::<f32>::zeros(i1.dim());
        for _ in 0..self.iterations {
            let u_avg = filter_3x3(&u, &AVERAGE);
            let v_avg = filter_3x3(&v, &AVERAGE);
            let mut residual = Zip::from(&u_avg)
                .and(&v_avg)
                .and(&ix)
                .and(&iy)
                .and(&it)
                .map_collect(|&ua, &va, &gx, &gy, &gt| gx * ua + gy * va + gt);
            residual /= &denom;
            Zip::from(&mut u)
                .and(&u_avg)
                .and(&ix)
                .and(&residual)
                .for_each(|u, &ua, &gx, &res| *u = ua - gx * res);
            Zip::from(&mut v)
                .and(&v_avg)
                .and(&iy)
                .and(&residual)
                .for_each(|v, &va, &gy, &res| *v = va - gy * res);
        }
        Some(FlowField { u, v })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ramp(rows: usize, cols: usize, slope: f32, shift: f32) -> Frame {
        Frame::from_luma(Array2::from_shape_fn((rows, cols), |(_, c)| {
            20.0 + slope * (c as f32 - shift)
        }))
    }

    #[test]
    fn reflect_101_indices() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(0, 5), 0);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(-1, 1), 0);
    }

    #[test]
    fn unit_ramp_has_unit_gradient() {
        let frame = ramp(6, 6, 1.0, 0.0);
        let gx = filter_3x3(frame.luma(), &SOBEL_X);
        let gy = filter_3x3(frame.luma(), &SOBEL_Y);
        assert_abs_diff_eq!(gx[(3, 3)], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(gy[(3, 3)], 0.0, epsilon = 1e-6);
        // mirrored border flattens the edge column
        assert_abs_diff_eq!(gx[(3, 0)], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn identical_frames_have_no_flow() {
        let frame = Frame::from_luma(Array2::from_shape_fn((16, 20), |(r, c)| {
            ((r * 7 + c * 13) % 31) as f32 * 8.0
        }));
        let flow = HornSchunck::default().compute(&frame, &frame).unwrap();
        assert_eq!(flow.u.dim(), (16, 20));
        assert_abs_diff_eq!(flow.mean_magnitude(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn recovers_subpixel_shift_of_a_ramp() {
        let prev = ramp(32, 32, 4.0, 0.0);
        let cur = ramp(32, 32, 4.0, 0.5);
        let flow = HornSchunck::default().compute(&prev, &cur).unwrap();
        let (u, v) = flow.mean_vector();
        assert_abs_diff_eq!(u, 0.5, epsilon = 0.05);
        assert_abs_diff_eq!(v, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(flow.mean_magnitude(), 0.5, epsilon = 0.05);
    }
}
