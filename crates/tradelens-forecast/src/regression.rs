use thiserror::Error;

/// Pivots smaller than this mark the normal equations as singular.
pub const PIVOT_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegressionError {
    #[error("normal equations are singular (pivot {pivot:e} in column {column})")]
    Singular { column: usize, pivot: f64 },

    #[error("{rows} predictor rows for {responses} responses")]
    ShapeMismatch { rows: usize, responses: usize },

    #[error("predictor rows have inconsistent widths")]
    RaggedRows,

    #[error("no observations")]
    Empty,
}

/// Ordinary least squares fit. `coefficients[0]` is the intercept.
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    pub coefficients: Vec<f64>,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
}

/// Fit `y ~ 1 + x` by solving `XᵗX·β = Xᵗy` with Gaussian elimination and
/// partial pivoting. `x` holds one row of predictors per observation.
pub fn ols(x: &[Vec<f64>], y: &[f64]) -> Result<OlsFit, RegressionError> {
    if x.len() != y.len() {
        return Err(RegressionError::ShapeMismatch {
            rows: x.len(),
            responses: y.len(),
        });
    }
    let Some(first) = x.first() else {
        return Err(RegressionError::Empty);
    };
    let predictors = first.len();
    if x.iter().any(|row| row.len() != predictors) {
        return Err(RegressionError::RaggedRows);
    }

    let design: Vec<Vec<f64>> = x
        .iter()
        .map(|row| std::iter::once(1.0).chain(row.iter().copied()).collect())
        .collect();
    let width = predictors + 1;

    // Augmented normal equations [XᵗX | Xᵗy].
    let mut system = vec![vec![0.0; width + 1]; width];
    for (row, response) in design.iter().zip(y) {
        for i in 0..width {
            for j in 0..width {
                system[i][j] += row[i] * row[j];
            }
            system[i][width] += row[i] * response;
        }
    }

    let coefficients = solve(system)?;
    let fitted: Vec<f64> = design
        .iter()
        .map(|row| row.iter().zip(&coefficients).map(|(a, b)| a * b).sum())
        .collect();
    let residuals = y.iter().zip(&fitted).map(|(a, f)| a - f).collect();

    Ok(OlsFit {
        coefficients,
        fitted,
        residuals,
    })
}

/// Solve an augmented `n × (n+1)` system in place.
fn solve(mut system: Vec<Vec<f64>>) -> Result<Vec<f64>, RegressionError> {
    let n = system.len();
    for column in 0..n {
        let pivot_row = (column..n)
            .max_by(|&a, &b| system[a][column].abs().total_cmp(&system[b][column].abs()))
            .unwrap_or(column);
        let pivot = system[pivot_row][column];
        if pivot.abs() < PIVOT_TOLERANCE {
            return Err(RegressionError::Singular { column, pivot });
        }
        system.swap(column, pivot_row);

        for row in column + 1..n {
            let factor = system[row][column] / system[column][column];
            if factor == 0.0 {
                continue;
            }
            for k in column..=n {
                system[row][k] -= factor * system[column][k];
            }
        }
    }

    let mut solution = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| system[row][k] * solution[k]).sum();
        solution[row] = (system[row][n] - tail) / system[row][row];
    }
    Ok(solution)
}
