pub mod linalg;

pub use linalg::{LinalgError, invert, leading_block, matrix_from_rows, quadratic_form};

use faer::Mat;

pub type DenseMatrix = Mat<f64>;

/// `count` evenly spaced values from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (count - 1) as f64;
            (0..count)
                .map(|index| {
                    if index == count - 1 {
                        stop
                    } else {
                        start + step * index as f64
                    }
                })
                .collect()
        }
    }
}
