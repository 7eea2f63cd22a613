use super::DenseMatrix;

const SINGULAR_PIVOT_EPSILON: f64 = 1.0e-300;
const ILL_CONDITIONED_RELATIVE_PIVOT_EPSILON: f64 = 1.0e-14;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinalgError {
    #[error("matrix inversion requires a square matrix, got {rows}x{cols}")]
    NonSquareMatrix { rows: usize, cols: usize },
    #[error("matrix inversion requires a non-empty matrix")]
    EmptyMatrix,
    #[error("matrix is singular at pivot index {pivot_index}")]
    SingularMatrix { pivot_index: usize },
    #[error("matrix is ill-conditioned at pivot index {pivot_index}")]
    IllConditionedMatrix { pivot_index: usize },
    #[error("vector length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("cannot take leading {requested}x{requested} block of a {rows}x{cols} matrix")]
    BlockOutOfRange {
        requested: usize,
        rows: usize,
        cols: usize,
    },
}

/// Builds a matrix from row-major rows; every row must have the same length.
pub fn matrix_from_rows(rows: &[Vec<f64>]) -> Result<DenseMatrix, LinalgError> {
    let nrows = rows.len();
    let ncols = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().find(|row| row.len() != ncols) {
        return Err(LinalgError::LengthMismatch {
            expected: ncols,
            actual: bad.len(),
        });
    }
    Ok(DenseMatrix::from_fn(nrows, ncols, |row, col| rows[row][col]))
}

/// Leading `size x size` block of `matrix`.
pub fn leading_block(matrix: &DenseMatrix, size: usize) -> Result<DenseMatrix, LinalgError> {
    if size > matrix.nrows() || size > matrix.ncols() {
        return Err(LinalgError::BlockOutOfRange {
            requested: size,
            rows: matrix.nrows(),
            cols: matrix.ncols(),
        });
    }
    Ok(DenseMatrix::from_fn(size, size, |row, col| matrix[(row, col)]))
}

/// Gauss-Jordan inversion with partial pivoting.
pub fn invert(matrix: &DenseMatrix) -> Result<DenseMatrix, LinalgError> {
    let dimension = validate_square_shape(matrix)?;
    let norm = matrix_infinity_norm(matrix);
    let mut work = matrix.clone();
    let mut inverse = DenseMatrix::from_fn(dimension, dimension, |row, col| {
        if row == col { 1.0 } else { 0.0 }
    });

    for pivot_col in 0..dimension {
        let pivot_row = (pivot_col..dimension)
            .max_by(|a, b| {
                work[(*a, pivot_col)]
                    .abs()
                    .total_cmp(&work[(*b, pivot_col)].abs())
            })
            .unwrap_or(pivot_col);
        let pivot = work[(pivot_row, pivot_col)];
        if pivot.abs() <= SINGULAR_PIVOT_EPSILON {
            return Err(LinalgError::SingularMatrix {
                pivot_index: pivot_col,
            });
        }
        if pivot.abs() <= ILL_CONDITIONED_RELATIVE_PIVOT_EPSILON * norm {
            return Err(LinalgError::IllConditionedMatrix {
                pivot_index: pivot_col,
            });
        }

        if pivot_row != pivot_col {
            swap_rows(&mut work, pivot_row, pivot_col);
            swap_rows(&mut inverse, pivot_row, pivot_col);
        }

        for col in 0..dimension {
            work[(pivot_col, col)] /= pivot;
            inverse[(pivot_col, col)] /= pivot;
        }

        for row in 0..dimension {
            if row == pivot_col {
                continue;
            }
            let factor = work[(row, pivot_col)];
            if factor == 0.0 {
                continue;
            }
            for col in 0..dimension {
                let work_delta = factor * work[(pivot_col, col)];
                let inverse_delta = factor * inverse[(pivot_col, col)];
                work[(row, col)] -= work_delta;
                inverse[(row, col)] -= inverse_delta;
            }
        }
    }

    Ok(inverse)
}

/// `vᵀ · M · v`.
pub fn quadratic_form(matrix: &DenseMatrix, vector: &[f64]) -> Result<f64, LinalgError> {
    let dimension = validate_square_shape(matrix)?;
    if vector.len() != dimension {
        return Err(LinalgError::LengthMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }

    let mut total = 0.0;
    for row in 0..dimension {
        let mut row_sum = 0.0;
        for col in 0..dimension {
            row_sum += matrix[(row, col)] * vector[col];
        }
        total += vector[row] * row_sum;
    }
    Ok(total)
}

fn swap_rows(matrix: &mut DenseMatrix, first: usize, second: usize) {
    for col in 0..matrix.ncols() {
        let value = matrix[(first, col)];
        matrix[(first, col)] = matrix[(second, col)];
        matrix[(second, col)] = value;
    }
}

fn validate_square_shape(matrix: &DenseMatrix) -> Result<usize, LinalgError> {
    let rows = matrix.nrows();
    let cols = matrix.ncols();
    if rows != cols {
        return Err(LinalgError::NonSquareMatrix { rows, cols });
    }
    if rows == 0 {
        return Err(LinalgError::EmptyMatrix);
    }
    Ok(rows)
}

fn matrix_infinity_norm(matrix: &DenseMatrix) -> f64 {
    (0..matrix.nrows())
        .map(|row| {
            (0..matrix.ncols())
                .map(|col| matrix[(row, col)].abs())
                .sum::<f64>()
        })
        .fold(0.0, f64::max)
}
