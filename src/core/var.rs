//! Vector-autoregressive processes with correlated innovations.
//!
//! A process is given as parent-neighbor coefficients: lagged entries become
//! the autoregressive matrices, lag-0 entries the (inverse) innovation
//! covariance.

use nalgebra::{Cholesky, DMatrix, DVector, Schur};
use ndarray::{s, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::collections::BTreeSet;

use crate::core::links;
use crate::domain::model::{ParentMap, Realization, VarCoeffs};
use crate::domain::simulation::NoiseMode;
use crate::utils::error::{Result, SimError};

const SYMMETRY_TOLERANCE: f64 = 1e-10;
/// QR sweeps allowed per companion row before the Schur decomposition gives up.
const SCHUR_SWEEPS_PER_ROW: usize = 30;

/// Lagged connectivity, `N x N x period`. `get(j, i, k)` is the effect of
/// `X^i_{t-1-k}` on `X^j_t`.
#[derive(Debug, Clone, PartialEq)]
pub struct LagMatrix {
    values: Array3<f64>,
}

impl LagMatrix {
    pub fn zeros(n_vars: usize, period: usize) -> Self {
        Self {
            values: Array3::zeros((n_vars, n_vars, period)),
        }
    }

    pub fn n_vars(&self) -> usize {
        self.values.dim().0
    }

    pub fn period(&self) -> usize {
        self.values.dim().2
    }

    pub fn get(&self, j: usize, i: usize, k: usize) -> f64 {
        self.values[[j, i, k]]
    }

    pub fn set(&mut self, j: usize, i: usize, k: usize, value: f64) {
        self.values[[j, i, k]] = value;
    }

    /// Stacks `[A_0 .. A_{p-1}]` over a shifted identity, so that the process
    /// is stationary iff every eigenvalue lies strictly inside the unit circle.
    pub fn companion(&self) -> DMatrix<f64> {
        let n = self.n_vars();
        let size = n * self.period();
        let mut companion = DMatrix::zeros(size, size);
        for k in 0..self.period() {
            let block = self.values.slice(s![.., .., k]);
            for ((j, i), &coeff) in block.indexed_iter() {
                companion[(j, k * n + i)] = coeff;
            }
        }
        for row in n..size {
            companion[(row, row - n)] = 1.0;
        }
        companion
    }
}

/// Rejects positive lags, node ids that are not
/// `0..N`, and parents that are not nodes themselves.
pub fn check_parent_neighbor(coeffs: &VarCoeffs) -> Result<()> {
    let nodes: BTreeSet<usize> = coeffs.keys().copied().collect();
    let mut parents = BTreeSet::new();

    for (&j, entries) in coeffs {
        for link in entries {
            if link.lag > 0 {
                return Err(SimError::invalid_model(format!(
                    "Lag between parent {} and node {} is {} > 0, must be <= 0!",
                    link.parent, j, link.lag
                )));
            }
            parents.insert(link.parent);
        }
    }

    if !nodes.iter().copied().eq(0..nodes.len()) {
        let found: Vec<String> = nodes.iter().map(|n| n.to_string()).collect();
        return Err(SimError::invalid_model(format!(
            "Node IDs must be contiguous and start from zero, found [{}]",
            found.join(",")
        )));
    }

    let missing: Vec<String> = parents
        .difference(&nodes)
        .map(|n| n.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(SimError::invalid_model(format!(
            "Parent IDs must also be node IDs, missing [{}]",
            missing.join(",")
        )));
    }

    Ok(())
}

/// `(parent, lag)` pairs with a non-zero coefficient.
pub fn true_parent_neighbors(coeffs: &VarCoeffs) -> ParentMap {
    links::parents(coeffs, false)
}

fn max_lag(coeffs: &VarCoeffs) -> usize {
    coeffs
        .values()
        .flatten()
        .map(|link| link.lag.unsigned_abs() as usize)
        .max()
        .unwrap_or(0)
}

/// Identity with the lag-0 coefficients written at `[j, i]`.
pub fn covariance_matrix(coeffs: &VarCoeffs) -> DMatrix<f64> {
    let n = coeffs.len();
    let mut cov = DMatrix::identity(n, n);
    for (&j, entries) in coeffs {
        for link in entries.iter().filter(|link| link.lag == 0) {
            cov[(j, link.parent)] = link.coeff;
        }
    }
    cov
}

/// Lagged coefficients as a `N x N x (max_lag + 1)` matrix, lag `-tau` stored
/// in slice `tau - 1`.
pub fn lag_connect_matrix(coeffs: &VarCoeffs) -> LagMatrix {
    let mut matrix = LagMatrix::zeros(coeffs.len(), max_lag(coeffs) + 1);
    for (&j, entries) in coeffs {
        for link in entries.iter().filter(|link| link.lag != 0) {
            let k = link.lag.unsigned_abs() as usize - 1;
            matrix.set(j, link.parent, k, link.coeff);
        }
    }
    matrix
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= SYMMETRY_TOLERANCE + SYMMETRY_TOLERANCE * b.abs()
}

/// Instantaneous links must carry the same strength in both directions.
pub fn check_symmetric(matrix: &DMatrix<f64>) -> Result<()> {
    if !matrix.is_square() {
        return Err(SimError::invalid_model("innovation matrix must be square"));
    }

    let mut problems = Vec::new();
    for node in 0..matrix.nrows() {
        for parent in (node + 1)..matrix.ncols() {
            let forward = matrix[(node, parent)];
            let backward = matrix[(parent, node)];
            if !close(forward, backward) || !close(backward, forward) {
                problems.push(format!(
                    "parent {} of node {} has coefficient {:.6}, parent {} of node {} has coefficient {:.6}",
                    parent, node, forward, node, parent, backward
                ));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(SimError::invalid_model(format!(
            "Relationships between nodes at tau=0 are not symmetric: {}",
            problems.join("; ")
        )))
    }
}

/// `A^m == 0` for some `m <= size`. The QR iteration stalls on such shift
/// matrices, and their spectrum is all zeros anyway.
fn is_nilpotent(matrix: &DMatrix<f64>) -> bool {
    let mut power = matrix.clone();
    let mut reached = 1;
    while reached < matrix.nrows() {
        if power.iter().all(|v| *v == 0.0) {
            return true;
        }
        power = &power * &power;
        reached *= 2;
    }
    power.iter().all(|v| *v == 0.0)
}

/// Fails with `NonStationary` when the companion matrix has an eigenvalue on
/// or outside the unit circle.
pub fn check_stability(graph: &LagMatrix) -> Result<()> {
    let companion = graph.companion();
    let size = companion.nrows();
    if size == 0 || is_nilpotent(&companion) {
        return Ok(());
    }

    let schur = Schur::try_new(companion, f64::EPSILON, SCHUR_SWEEPS_PER_ROW * size)
        .ok_or_else(|| SimError::LinearAlgebraError {
            message: format!(
                "eigenvalues of the {}x{} companion matrix did not converge",
                size, size
            ),
        })?;
    let max_modulus = schur
        .complex_eigenvalues()
        .iter()
        .map(|ev| ev.norm())
        .fold(0.0_f64, f64::max);

    tracing::debug!(
        "Companion matrix of size {} has spectral radius {:.4}",
        size,
        max_modulus
    );

    if max_modulus.is_nan() || max_modulus >= 1.0 {
        return Err(SimError::NonStationary { max_modulus });
    }
    Ok(())
}

fn standard_normal_matrix<R: Rng + ?Sized>(rng: &mut R, rows: usize, cols: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows, cols, |_, _| rng.sample(StandardNormal))
}

/// Draws `samples` rows from a zero-mean multivariate normal with covariance
/// `cov`. With `use_inverse` the off-diagonal is negated and the result
/// inverted first, so `cov` is read as a partial-correlation style precision.
pub fn generate_noise<R: Rng + ?Sized>(
    cov: &DMatrix<f64>,
    samples: usize,
    use_inverse: bool,
    rng: &mut R,
) -> Result<DMatrix<f64>> {
    let n = cov.nrows();
    let effective = if use_inverse {
        let mut precision = -cov.clone();
        for d in 0..n {
            precision[(d, d)] = -precision[(d, d)];
        }
        precision
            .try_inverse()
            .ok_or_else(|| SimError::LinearAlgebraError {
                message: "inverse innovation matrix is singular".to_string(),
            })?
    } else {
        cov.clone()
    };

    let chol = Cholesky::new(effective).ok_or_else(|| SimError::LinearAlgebraError {
        message: "innovation covariance is not positive-definite".to_string(),
    })?;
    let l = chol.l();

    let z = standard_normal_matrix(rng, samples, n);
    // 每一列 z_t 轉成 L z_t
    Ok(z * l.transpose())
}

/// Simulates `x_j(t) = sum_i sum_k A[j,i,k] x_i(t-1-k) + eps_j(t)` for `samples`
/// steps. The first `period` rows are the initial values (random unless given
/// as an `N x period` matrix).
pub fn var_network<R: Rng + ?Sized>(
    graph: &LagMatrix,
    add_noise: bool,
    inno_cov: Option<&DMatrix<f64>>,
    invert_inno: bool,
    samples: usize,
    initial_values: Option<&DMatrix<f64>>,
    rng: &mut R,
) -> Result<DMatrix<f64>> {
    let n = graph.n_vars();
    let period = graph.period();

    check_stability(graph)?;

    let mut data = standard_normal_matrix(rng, samples, n);

    if let Some(init) = initial_values {
        if init.shape() != (n, period) || samples < period {
            return Err(SimError::invalid_model(format!(
                "Initial values must be of shape ({}, {}) with at least {} samples, got {:?}",
                n,
                period,
                period,
                init.shape()
            )));
        }
        for t in 0..period {
            for j in 0..n {
                data[(t, j)] = init[(j, t)];
            }
        }
    }

    let noise = if add_noise {
        Some(match inno_cov {
            Some(cov) => generate_noise(cov, samples, invert_inno, rng)?,
            None => standard_normal_matrix(rng, samples, n),
        })
    } else {
        None
    };

    for t in period..samples {
        let mut next = DVector::zeros(n);
        for j in 0..n {
            let mut value = 0.0;
            for k in 0..period {
                for i in 0..n {
                    value += graph.get(j, i, k) * data[(t - 1 - k, i)];
                }
            }
            next[j] = value;
        }
        for j in 0..n {
            data[(t, j)] = next[j] + noise.as_ref().map_or(0.0, |eps| eps[(t, j)]);
        }
    }

    Ok(data)
}

/// Generates a VAR realization from parent-neighbor coefficients and returns
/// it together with the true parents of every variable.
pub fn var_process(
    coeffs: &VarCoeffs,
    samples: usize,
    mode: NoiseMode,
    initial_values: Option<&DMatrix<f64>>,
    seed: Option<u64>,
) -> Result<(Realization, ParentMap)> {
    check_parent_neighbor(coeffs)?;
    let longest = max_lag(coeffs);
    if longest >= samples {
        return Err(SimError::invalid_model(format!(
            "maximum lag {} must be smaller than the number of samples {}",
            longest, samples
        )));
    }

    let true_parents = true_parent_neighbors(coeffs);
    let connect = lag_connect_matrix(coeffs);
    let cov = covariance_matrix(coeffs);

    let (innos, add_noise, invert_inno) = match mode {
        NoiseMode::InnoCov => {
            tracing::debug!("Innovation Cov = {}", cov);
            (Some(cov), true, false)
        }
        NoiseMode::InvInnoCov => {
            tracing::debug!("Inverse Innovation Cov = {}", cov);
            (Some(cov), true, true)
        }
        NoiseMode::NoNoise => (Some(cov), false, false),
        NoiseMode::Uncorrelated => (None, true, false),
    };

    if let (Some(innos), true) = (innos.as_ref(), add_noise) {
        check_symmetric(innos)?;
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let data = var_network(
        &connect,
        add_noise,
        innos.as_ref(),
        invert_inno,
        samples,
        initial_values,
        &mut rng,
    )?;

    Ok((Realization::new(data), true_parents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::VarLink;
    use std::collections::BTreeMap;

    fn two_var() -> VarCoeffs {
        BTreeMap::from([
            (0, vec![VarLink::new(0, -1, 0.2), VarLink::new(1, -1, 0.5), VarLink::new(1, 0, 0.3)]),
            (1, vec![VarLink::new(1, -1, 0.3), VarLink::new(0, -2, 0.1), VarLink::new(0, 0, 0.3)]),
        ])
    }

    #[test]
    fn test_check_parent_neighbor() {
        assert!(check_parent_neighbor(&two_var()).is_ok());

        let positive = BTreeMap::from([(0, vec![VarLink::new(0, 1, 0.5)])]);
        assert!(check_parent_neighbor(&positive).is_err());

        let gap = BTreeMap::from([(0, vec![]), (2, vec![])]);
        let err = check_parent_neighbor(&gap).unwrap_err();
        assert!(err.to_string().contains("contiguous"));

        let unknown = BTreeMap::from([(0, vec![VarLink::new(3, -1, 0.5)])]);
        let err = check_parent_neighbor(&unknown).unwrap_err();
        assert!(err.to_string().contains("missing [3]"));
    }

    #[test]
    fn test_matrices_are_placed_by_lag() {
        let coeffs = two_var();

        let cov = covariance_matrix(&coeffs);
        assert_eq!(cov[(0, 0)], 1.0);
        assert_eq!(cov[(0, 1)], 0.3);
        assert_eq!(cov[(1, 0)], 0.3);

        let lagged = lag_connect_matrix(&coeffs);
        assert_eq!(lagged.period(), 3);
        assert_eq!(lagged.get(0, 0, 0), 0.2);
        assert_eq!(lagged.get(0, 1, 0), 0.5);
        assert_eq!(lagged.get(1, 0, 1), 0.1);
        assert_eq!(lagged.get(1, 1, 2), 0.0);

        let parents = true_parent_neighbors(&coeffs);
        assert_eq!(parents[&1], vec![(1, -1), (0, -2), (0, 0)]);
    }

    #[test]
    fn test_check_symmetric() {
        let mut m = DMatrix::identity(3, 3);
        m[(0, 2)] = 0.4;
        m[(2, 0)] = 0.4;
        assert!(check_symmetric(&m).is_ok());

        m[(2, 0)] = 0.1;
        let err = check_symmetric(&m).unwrap_err();
        assert!(err.to_string().contains("parent 2 of node 0"));
    }

    #[test]
    fn test_check_stability() {
        let mut stable = LagMatrix::zeros(1, 2);
        stable.set(0, 0, 0, 0.5);
        assert!(check_stability(&stable).is_ok());

        let mut explosive = LagMatrix::zeros(1, 2);
        explosive.set(0, 0, 0, 1.1);
        assert!(matches!(
            check_stability(&explosive),
            Err(SimError::NonStationary { .. })
        ));

        // x(t) = 0.5 x(t-1) + 0.6 x(t-2) has a root outside the unit circle
        let mut second_order = LagMatrix::zeros(1, 3);
        second_order.set(0, 0, 0, 0.5);
        second_order.set(0, 0, 1, 0.6);
        assert!(check_stability(&second_order).is_err());
    }

    #[test]
    fn test_check_stability_terminates_on_shift_companion() {
        // 全零係數的伴隨矩陣只剩平移單位矩陣
        assert!(check_stability(&LagMatrix::zeros(1, 3)).is_ok());
        assert!(check_stability(&LagMatrix::zeros(2, 4)).is_ok());

        // x1(t) = x0(t-1) 亦為冪零
        let mut feed_forward = LagMatrix::zeros(2, 2);
        feed_forward.set(1, 0, 0, 1.0);
        assert!(check_stability(&feed_forward).is_ok());
    }

    #[test]
    fn test_zero_coefficient_at_long_lag_simulates() {
        let coeffs = BTreeMap::from([(0, vec![VarLink::new(0, -2, 0.0)])]);
        let (realization, parents) =
            var_process(&coeffs, 50, NoiseMode::Uncorrelated, None, Some(1)).unwrap();
        assert_eq!(realization.samples(), 50);
        assert!(parents[&0].is_empty());
    }

    #[test]
    fn test_lag_longer_than_samples_rejected() {
        let coeffs = BTreeMap::from([(0, vec![VarLink::new(0, -2_000_000_000, 0.1)])]);
        let err = var_process(&coeffs, 100, NoiseMode::NoNoise, None, Some(1)).unwrap_err();
        assert!(err.to_string().contains("maximum lag"));
    }

    #[test]
    fn test_noise_has_requested_covariance() {
        let mut cov = DMatrix::identity(2, 2);
        cov[(0, 1)] = 0.8;
        cov[(1, 0)] = 0.8;
        let mut rng = StdRng::seed_from_u64(11);
        let noise = generate_noise(&cov, 20_000, false, &mut rng).unwrap();

        let n = noise.nrows() as f64;
        let cross: f64 = noise.column(0).dot(&noise.column(1)) / n;
        assert!((cross - 0.8).abs() < 0.05, "sample covariance {}", cross);
    }

    #[test]
    fn test_noise_rejects_indefinite_covariance() {
        let mut cov = DMatrix::identity(2, 2);
        cov[(0, 1)] = 2.0;
        cov[(1, 0)] = 2.0;
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            generate_noise(&cov, 10, false, &mut rng),
            Err(SimError::LinearAlgebraError { .. })
        ));
    }

    #[test]
    fn test_no_noise_is_deterministic_recursion() {
        let coeffs = BTreeMap::from([
            (0, vec![VarLink::new(0, -1, 0.5)]),
            (1, vec![VarLink::new(0, -1, 1.0)]),
        ]);
        let init = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 0.0]);

        let (realization, parents) =
            var_process(&coeffs, 5, NoiseMode::NoNoise, Some(&init), Some(3)).unwrap();
        let data = realization.data;

        assert_eq!(data.shape(), (5, 2));
        // 前兩列為初始值，第三列起依遞迴計算
        assert_eq!(data[(0, 0)], 2.0);
        assert_eq!(data[(2, 0)], 0.0);
        assert_eq!(data[(2, 1)], 0.0);
        assert_eq!(data[(3, 0)], 0.0);
        assert_eq!(parents[&1], vec![(0, -1)]);

        let init = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 0.0, 0.0]);
        let (realization, _) =
            var_process(&coeffs, 4, NoiseMode::NoNoise, Some(&init), None).unwrap();
        assert_eq!(realization.data[(2, 0)], 0.5);
        assert_eq!(realization.data[(2, 1)], 1.0);
        assert_eq!(realization.data[(3, 0)], 0.25);
    }

    #[test]
    fn test_initial_values_shape_is_checked() {
        let coeffs = BTreeMap::from([(0, vec![VarLink::new(0, -1, 0.5)])]);
        let init = DMatrix::zeros(1, 3);
        assert!(var_process(&coeffs, 10, NoiseMode::NoNoise, Some(&init), None).is_err());
    }

    #[test]
    fn test_seeded_runs_reproduce() {
        let a = var_process(&two_var(), 200, NoiseMode::InvInnoCov, None, Some(42)).unwrap();
        let b = var_process(&two_var(), 200, NoiseMode::InvInnoCov, None, Some(42)).unwrap();
        assert_eq!(a.0.data, b.0.data);
        assert!(!a.0.nonstationary);
    }

    #[test]
    fn test_asymmetric_contemporaneous_links_rejected() {
        let coeffs = BTreeMap::from([
            (0, vec![VarLink::new(1, 0, 0.3)]),
            (1, vec![VarLink::new(0, 0, 0.1)]),
        ]);
        assert!(var_process(&coeffs, 50, NoiseMode::InnoCov, None, Some(1)).is_err());
        // 不使用相關雜訊時不檢查對稱性
        assert!(var_process(&coeffs, 50, NoiseMode::Uncorrelated, None, Some(1)).is_ok());
    }
}
