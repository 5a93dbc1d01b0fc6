//! # Estimators
//!
//! Ready-made `ModelFitter`s for the two model families bootstrap standard errors
//! are most often wanted for: least-squares linear regression and logistic
//! regression. Both report coefficients for the feature columns only; a fitted
//! intercept is estimated but not returned, so the coefficient vector always lines
//! up with `Dataset::feature_names`.

use crate::dataset::Dataset;
use crate::fitter::{CoefficientVector, FitError, ModelFitter};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use ndarray_linalg::{SVD, Solve};
use serde::{Deserialize, Serialize};

/// Ordinary least squares, solved through the normal equations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearRegression {
    pub fit_intercept: bool,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self {
            fit_intercept: true,
        }
    }
}

/// Binary logistic regression with an optional ridge penalty, fitted by Newton's
/// method (iteratively reweighted least squares).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticRegression {
    pub fit_intercept: bool,
    /// Strength of the L2 penalty `λ/2 · ‖β‖²` on the feature coefficients. The
    /// intercept is never penalized.
    pub l2_penalty: f64,
    pub max_iterations: usize,
    /// Convergence threshold on the largest absolute coefficient update.
    pub tolerance: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            fit_intercept: true,
            l2_penalty: 1.0,
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

impl ModelFitter for LinearRegression {
    fn fit(&self, dataset: &Dataset) -> Result<CoefficientVector, FitError> {
        let y = single_response(dataset)?;
        check_design(dataset, self.fit_intercept, true)?;
        let (design, offset) = design_matrix(dataset.features(), self.fit_intercept);

        let xtx = design.t().dot(&design);
        check_conditioning(&xtx)?;
        let xty = design.t().dot(&y);
        let beta = xtx.solve(&xty)?;
        finite_or_degenerate(&beta)?;

        Ok(beta.slice(s![offset..]).to_owned())
    }
}

impl ModelFitter for LogisticRegression {
    fn fit(&self, dataset: &Dataset) -> Result<CoefficientVector, FitError> {
        const MIN_WEIGHT: f64 = 1e-10;

        let y = single_response(dataset)?;
        if let Some(bad) = y.iter().find(|&&v| v != 0.0 && v != 1.0) {
            return Err(FitError::Degenerate(format!(
                "logistic regression needs a 0/1 response, found {bad}"
            )));
        }
        let unpenalized = self.l2_penalty <= 0.0;
        check_design(dataset, self.fit_intercept, unpenalized)?;
        // An unpenalized coefficient (or intercept) would diverge on a single class.
        let single_class = y.iter().all(|&v| v == 0.0) || y.iter().all(|&v| v == 1.0);
        if single_class && (unpenalized || self.fit_intercept) {
            return Err(FitError::Degenerate(
                "only one response class is present".to_string(),
            ));
        }

        let (design, offset) = design_matrix(dataset.features(), self.fit_intercept);
        if unpenalized {
            // The IRLS weights are positive, so the Hessian is singular exactly when XᵀX is.
            check_conditioning(&design.t().dot(&design))?;
        }
        let p = design.ncols();
        let penalty = Array1::from_shape_fn(p, |j| {
            if j < offset { 0.0 } else { self.l2_penalty.max(0.0) }
        });

        let mut beta = Array1::<f64>::zeros(p);
        let mut last_change = f64::INFINITY;
        for iter in 1..=self.max_iterations {
            let eta = design.dot(&beta);
            let mu = eta.mapv(|e| 1.0 / (1.0 + (-e.clamp(-700.0, 700.0)).exp()));
            let weights = (&mu * &mu.mapv(|m| 1.0 - m)).mapv(|w| w.max(MIN_WEIGHT));

            let gradient = design.t().dot(&(&y - &mu)) - &penalty * &beta;
            let weighted = &design * &weights.view().insert_axis(Axis(1));
            let mut hessian = weighted.t().dot(&design);
            for j in 0..p {
                hessian[[j, j]] += penalty[j];
            }

            let step = hessian.solve(&gradient)?;
            beta += &step;
            finite_or_degenerate(&beta)?;

            last_change = step.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
            log::trace!("Logistic IRLS iteration {iter}: max |Δβ| = {last_change:.3e}");
            if last_change < self.tolerance {
                return Ok(beta.slice(s![offset..]).to_owned());
            }
        }

        Err(FitError::NonConvergence {
            max_iterations: self.max_iterations,
            last_change,
        })
    }
}

fn single_response(dataset: &Dataset) -> Result<Array1<f64>, FitError> {
    dataset
        .response_vector()
        .map(|y| y.to_owned())
        .ok_or_else(|| {
            FitError::Degenerate(format!(
                "expected one response column, found {}",
                dataset.response_names().len()
            ))
        })
}

/// Rejects samples the normal equations cannot be solved for. `strict` adds the
/// per-column check for constant features, which an unpenalized fit cannot
/// separate from the intercept.
fn check_design(dataset: &Dataset, fit_intercept: bool, strict: bool) -> Result<(), FitError> {
    let n = dataset.row_count();
    let params = dataset.feature_count() + usize::from(fit_intercept);
    if n == 0 {
        return Err(FitError::Degenerate("the sample has no rows".to_string()));
    }
    if strict && n < params {
        return Err(FitError::Degenerate(format!(
            "{n} rows cannot identify {params} parameters"
        )));
    }
    if !strict {
        return Ok(());
    }

    for (name, column) in dataset
        .feature_names()
        .iter()
        .zip(dataset.features().axis_iter(Axis(1)))
    {
        if fit_intercept && is_constant(column) {
            return Err(FitError::Degenerate(format!(
                "feature '{name}' has zero variance"
            )));
        }
        if !fit_intercept && column.iter().all(|&v| v == 0.0) {
            return Err(FitError::Degenerate(format!("feature '{name}' is all zero")));
        }
    }
    Ok(())
}

/// Largest condition number of `XᵀX` the normal equations are trusted with.
const MAX_CONDITION_NUMBER: f64 = 1e12;

/// Rejects a cross-product matrix whose columns are linearly dependent up to
/// rounding. LU on such a matrix usually ends on a tiny nonzero pivot rather
/// than failing, and returns huge but finite coefficients.
fn check_conditioning(crossprod: &Array2<f64>) -> Result<(), FitError> {
    let (_, singular_values, _) = crossprod.svd(false, false)?;
    let max_sv = singular_values.iter().fold(0.0_f64, |acc, &v| acc.max(v));
    let min_sv = singular_values
        .iter()
        .fold(f64::INFINITY, |acc, &v| acc.min(v));
    let condition = if min_sv > 0.0 {
        max_sv / min_sv
    } else {
        f64::INFINITY
    };
    if condition.is_finite() && condition <= MAX_CONDITION_NUMBER {
        Ok(())
    } else {
        Err(FitError::Degenerate(format!(
            "the design matrix is rank deficient (condition number of XᵀX {condition:.3e})"
        )))
    }
}

fn is_constant(column: ArrayView1<f64>) -> bool {
    match column.first() {
        Some(&first) => column.iter().all(|&v| v == first),
        None => true,
    }
}

/// Prepends a column of ones when an intercept is fit. Returns the design and the
/// index of the first feature coefficient.
fn design_matrix(features: ArrayView2<f64>, fit_intercept: bool) -> (Array2<f64>, usize) {
    if fit_intercept {
        let design = Array2::from_shape_fn((features.nrows(), features.ncols() + 1), |(i, j)| {
            if j == 0 { 1.0 } else { features[[i, j - 1]] }
        });
        (design, 1)
    } else {
        (features.to_owned(), 0)
    }
}

fn finite_or_degenerate(beta: &Array1<f64>) -> Result<(), FitError> {
    if beta.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(FitError::Degenerate(
            "the solver produced non-finite coefficients".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn dataset(features: Vec<(&str, Vec<f64>)>, y: Vec<f64>) -> Dataset {
        Dataset::from_columns(
            features
                .into_iter()
                .map(|(name, values)| (name.to_string(), values))
                .collect(),
            vec![("y".to_string(), y)],
        )
        .unwrap()
    }

    #[test]
    fn ols_recovers_exact_linear_relationship() {
        let x1 = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let x2 = vec![0.5, -1.0, 2.0, 0.0, 3.0, 1.0];
        let y: Vec<f64> = x1
            .iter()
            .zip(&x2)
            .map(|(a, b)| 4.0 + 2.0 * a - 3.0 * b)
            .collect();
        let ds = dataset(vec![("x1", x1), ("x2", x2)], y);

        let coefs = LinearRegression::default().fit(&ds).unwrap();
        assert_eq!(coefs.len(), 2);
        assert_abs_diff_eq!(coefs[0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(coefs[1], -3.0, epsilon = 1e-9);
    }

    #[test]
    fn ols_without_intercept_goes_through_origin() {
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let y = vec![2.5, 5.0, 7.5, 10.0];
        let ds = dataset(vec![("x", x)], y);
        let coefs = LinearRegression {
            fit_intercept: false,
        }
        .fit(&ds)
        .unwrap();
        assert_abs_diff_eq!(coefs[0], 2.5, epsilon = 1e-12);
    }

    #[test]
    fn ols_rejects_constant_feature() {
        let ds = dataset(
            vec![("x", vec![1.0, 2.0, 3.0]), ("c", vec![7.0, 7.0, 7.0])],
            vec![1.0, 2.0, 3.0],
        );
        match LinearRegression::default().fit(&ds) {
            Err(FitError::Degenerate(msg)) => assert!(msg.contains("'c'")),
            other => panic!("expected a degenerate-data error, got {other:?}"),
        }
    }

    #[test]
    fn ols_rejects_underdetermined_and_empty_samples() {
        let ds = dataset(vec![("a", vec![1.0, 2.0]), ("b", vec![3.0, 1.0])], vec![0.0, 1.0]);
        assert!(matches!(
            LinearRegression::default().fit(&ds),
            Err(FitError::Degenerate(_))
        ));

        let empty = dataset(vec![("a", vec![])], vec![]);
        assert!(matches!(
            LinearRegression::default().fit(&empty),
            Err(FitError::Degenerate(_))
        ));
    }

    #[test]
    fn ols_rejects_a_rescaled_copy_of_a_feature() {
        let x1: Vec<f64> = (0..20).map(|i| 1.0 + 0.37 * i as f64).collect();
        let x2: Vec<f64> = x1.iter().map(|v| 0.1 * v).collect();
        let x3: Vec<f64> = (0..20).map(|i| ((7 * i) % 5) as f64).collect();
        let y: Vec<f64> = (0..20).map(|i| 2.0 * x1[i] - x3[i] + 0.5).collect();
        let ds = dataset(vec![("x1", x1), ("x2", x2), ("x3", x3)], y);

        match LinearRegression::default().fit(&ds) {
            Err(FitError::Degenerate(msg)) => assert!(msg.contains("rank deficient")),
            other => panic!("expected a rank-deficiency error, got {other:?}"),
        }
    }

    #[test]
    fn ols_rejects_dummies_that_sum_to_the_intercept() {
        let level_a = vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0];
        let level_b = vec![0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let level_c = vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        let x = vec![0.3, 1.2, 2.5, 0.9, 1.7, 3.1, 0.4, 2.2];
        let y = vec![1.0, 2.0, 3.5, 1.4, 2.9, 4.0, 0.8, 3.3];
        let ds = dataset(
            vec![("x", x), ("a", level_a), ("b", level_b), ("c", level_c)],
            y,
        );

        assert!(matches!(
            LinearRegression::default().fit(&ds),
            Err(FitError::Degenerate(_))
        ));
        // Without the intercept the same columns are independent.
        assert!(
            LinearRegression {
                fit_intercept: false
            }
            .fit(&ds)
            .is_ok()
        );
    }

    #[test]
    fn unpenalized_logistic_rejects_collinear_features() {
        let x1: Vec<f64> = (0..12).map(|i| i as f64 - 5.5).collect();
        let x2: Vec<f64> = x1.iter().map(|v| -3.0 * v).collect();
        let y = vec![0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0];
        let ds = dataset(vec![("x1", x1), ("x2", x2)], y);

        let plain = LogisticRegression {
            l2_penalty: 0.0,
            ..LogisticRegression::default()
        };
        assert!(matches!(plain.fit(&ds), Err(FitError::Degenerate(_))));
        // The ridge term makes the Hessian invertible again.
        assert!(LogisticRegression::default().fit(&ds).is_ok());
    }

    #[test]
    fn logistic_solves_the_penalized_score_equations() {
        let mut rng = StdRng::seed_from_u64(42);
        let n = 200;
        let x1: Vec<f64> = (0..n).map(|_| rng.gen_range(-2.0..2.0)).collect();
        let x2: Vec<f64> = (0..n).map(|_| rng.gen_range(-2.0..2.0)).collect();
        let y: Vec<f64> = x1
            .iter()
            .zip(&x2)
            .map(|(a, b)| {
                let prob = 1.0 / (1.0 + (-(0.3 + 1.5 * a - 1.0 * b)).exp());
                if rng.gen_range(0.0..1.0) < prob { 1.0 } else { 0.0 }
            })
            .collect();
        let ds = dataset(vec![("x1", x1), ("x2", x2)], y);

        let model = LogisticRegression::default();
        let coefs = model.fit(&ds).unwrap();
        assert_eq!(coefs.len(), 2);
        assert!(coefs[0] > 0.5, "x1 effect should be clearly positive: {coefs}");
        assert!(coefs[1] < -0.3, "x2 effect should be clearly negative: {coefs}");

        // The ridge penalty can only shrink the feature coefficients.
        let plain = LogisticRegression {
            l2_penalty: 0.0,
            ..model
        };
        let unpenalized = plain.fit(&ds).unwrap();
        assert!(unpenalized.dot(&unpenalized) >= coefs.dot(&coefs));
    }

    #[test]
    fn logistic_rejects_non_binary_response() {
        let ds = dataset(vec![("x", vec![1.0, 2.0, 3.0])], vec![0.0, 2.0, 1.0]);
        assert!(matches!(
            LogisticRegression::default().fit(&ds),
            Err(FitError::Degenerate(_))
        ));
    }

    #[test]
    fn logistic_rejects_a_single_class_unless_fully_penalized() {
        let ds = dataset(vec![("x", vec![1.0, 2.0, 3.0])], vec![1.0, 1.0, 1.0]);
        let unpenalized = LogisticRegression {
            l2_penalty: 0.0,
            ..LogisticRegression::default()
        };
        assert!(matches!(unpenalized.fit(&ds), Err(FitError::Degenerate(_))));
        assert!(matches!(
            LogisticRegression::default().fit(&ds),
            Err(FitError::Degenerate(_))
        ));

        let ridge_only = LogisticRegression {
            fit_intercept: false,
            ..LogisticRegression::default()
        };
        let coefs = ridge_only.fit(&ds).unwrap();
        assert!(coefs[0] > 0.0);
    }

    #[test]
    fn logistic_reports_non_convergence() {
        let ds = dataset(
            vec![("x", vec![-2.0, -1.0, 0.5, 1.0, 2.0, -0.5])],
            vec![0.0, 0.0, 1.0, 1.0, 1.0, 1.0],
        );
        let model = LogisticRegression {
            max_iterations: 1,
            tolerance: 1e-14,
            ..LogisticRegression::default()
        };
        match model.fit(&ds) {
            Err(FitError::NonConvergence { max_iterations, .. }) => assert_eq!(max_iterations, 1),
            other => panic!("expected non-convergence, got {other:?}"),
        }
    }
}
