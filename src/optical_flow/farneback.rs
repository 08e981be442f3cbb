use ndarray::Array2;
use opencv::{core::*, prelude::*};

use super::{DenseFlow, FlowField};
use crate::frame::Frame;

/// OpenCV polynomial-expansion flow.
#[derive(Debug, Clone)]
pub struct Farneback {
    pub pyr_scale: f64,
    pub levels: i32,
    pub winsize: i32,
    pub iterations: i32,
    pub poly_n: i32,
    pub poly_sigma: f64,
}

impl Default for Farneback {
    fn default() -> Self {
        Self {
            pyr_scale: 0.5,
            levels: 3,
            winsize: 15,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.2,
        }
    }
}

/// [Frame] 转换为 8 位 [Mat]
fn to_mat_u8(frame: &Frame) -> opencv::Result<Mat> {
    let luma = frame.luma();
    let mut mat = Mat::new_rows_cols_with_default(
        luma.nrows() as i32,
        luma.ncols() as i32,
        CV_8UC1,
        Scalar::all(0.0),
    )?;
    for ((r, c), value) in luma.indexed_iter() {
        *mat.at_2d_mut::<u8>(r as i32, c as i32)? = value.round().clamp(0.0, 255.0) as u8;
    }
    Ok(mat)
}

impl Farneback {
    fn try_compute(&self, prev: &Frame, cur: &Frame) -> opencv::Result<FlowField> {
        let prev = to_mat_u8(prev)?;
        let cur = to_mat_u8(cur)?;
        let mut flow = Mat::default();
        opencv::video::calc_optical_flow_farneback(
            &prev,
            &cur,
            &mut flow,
            self.pyr_scale,
            self.levels,
            self.winsize,
            self.iterations,
            self.poly_n,
            self.poly_sigma,
            0,
        )?;

        let rows = flow.rows() as usize;
        let cols = flow.cols() as usize;
        let mut u = Array2::<f32>::zeros((rows, cols));
        let mut v = Array2::<f32>::zeros((rows, cols));
        for r in 0..rows {
            for c in 0..cols {
                let d = flow.at_2d::<Vec2f>(r as i32, c as i32)?;
                u[(r, c)] = d[0];
                v[(r, c)] = d[1];
            }
        }
        Ok(FlowField { u, v })
    }
}

impl DenseFlow for Farneback {
    fn compute(&mut self, prev: &Frame, cur: &Frame) -> Option<FlowField> {
        self.try_compute(prev, cur)
            .map_err(|e| log::error!("farneback failed: {}", e))
            .ok()
    }
}
