//! Continuous-time Markov substitution models: build a rate matrix from a
//! stationary distribution and either a symmetric exchangeability matrix or
//! a direct rate matrix, and turn it into time-parametrised transition
//! probability matrices via eigendecomposition.

use bn_error::{BnResult, bn_err};
use nalgebra::DMatrix;
use ordered_float::OrderedFloat;
use std::collections::HashMap;
use std::sync::Mutex;

/// Eigendecomposition came back with a non-negligible imaginary part; the
/// real part was kept but the model's `probs(t)` should be treated as an
/// approximation rather than an exact solution.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ModelHealth {
    Exact,
    Degenerate,
}

const IMAGINARY_TOLERANCE: f64 = 1e-8;

/// A time-reversible (or general) continuous-time Markov substitution
/// model: stationary frequencies `pi`, rate matrix `q` (row-sum zero,
/// normalised to one expected substitution per unit time), and its
/// eigendecomposition, used to answer `probs(t)` queries.
pub struct RateMatrix {
    alphabet: Vec<String>,
    pi: Vec<f64>,
    q: DMatrix<f64>,
    eigenvalues: Vec<f64>,
    v: DMatrix<f64>,
    v_inv: DMatrix<f64>,
    health: ModelHealth,
    cache: Mutex<HashMap<OrderedFloat<f64>, DMatrix<f64>>>,
}

impl RateMatrix {
    /// Build from a stationary frequency vector and a symmetric
    /// exchangeability matrix `s` (`s[i][j] = s[j][i]`, diagonal ignored):
    /// `q[i][j] = pi[j] * s[i][j]` for `i != j`, diagonal is `-row sum`.
    pub fn from_exchangeability(alphabet: Vec<String>, pi: Vec<f64>, s: Vec<Vec<f64>>) -> BnResult<Self> {
        let n = alphabet.len();
        validate_pi(&pi, n)?;
        if s.len() != n || s.iter().any(|row| row.len() != n) {
            return Err(bn_err!(InvalidModel: "exchangeability matrix must be {}x{}", n, n));
        }
        for i in 0..n {
            for j in 0..n {
                if (s[i][j] - s[j][i]).abs() > 1e-9 {
                    return Err(bn_err!(InvalidModel: "exchangeability matrix is not symmetric at ({},{})", i, j));
                }
            }
        }

        let mut q = vec![vec![0.0f64; n]; n];
        for i in 0..n {
            let mut row_sum = 0.0;
            for j in 0..n {
                if i != j {
                    q[i][j] = pi[j] * s[i][j];
                    row_sum += q[i][j];
                }
            }
            q[i][i] = -row_sum;
        }

        Self::from_q(alphabet, pi, q)
    }

    /// Build directly from a rate matrix `q` (rows need not already sum to
    /// zero; they are renormalised).
    pub fn from_q(alphabet: Vec<String>, pi: Vec<f64>, mut q: Vec<Vec<f64>>) -> BnResult<Self> {
        let n = alphabet.len();
        validate_pi(&pi, n)?;
        if q.len() != n || q.iter().any(|row| row.len() != n) {
            return Err(bn_err!(InvalidModel: "rate matrix must be {}x{}", n, n));
        }

        for row in &mut q {
            if !row.iter().all(|x| x.is_finite()) {
                return Err(bn_err!(InvalidModel: "rate matrix contains a non-finite entry"));
            }
        }

        // Force exact row-sum-zero regardless of input rounding.
        for i in 0..n {
            let off_diag_sum: f64 = (0..n).filter(|&j| j != i).map(|j| q[i][j]).sum();
            q[i][i] = -off_diag_sum;
        }

        // Normalise to one expected substitution per unit time:
        // -sum_i pi[i] * q[i][i] == 1.
        let expected_rate: f64 = (0..n).map(|i| -pi[i] * q[i][i]).sum();
        if !expected_rate.is_finite() || expected_rate <= 0.0 {
            return Err(bn_err!(InvalidModel: "rate matrix has non-positive expected substitution rate {}", expected_rate));
        }
        for row in &mut q {
            for x in row.iter_mut() {
                *x /= expected_rate;
            }
        }

        let q_mat = DMatrix::from_fn(n, n, |i, j| q[i][j]);
        let (eigenvalues, v, v_inv, health) = eigendecompose(&q_mat, &pi)?;

        Ok(RateMatrix {
            alphabet,
            pi,
            q: q_mat,
            eigenvalues,
            v,
            v_inv,
            health,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn alphabet(&self) -> &[String] {
        &self.alphabet
    }

    pub fn stationary(&self) -> &[f64] {
        &self.pi
    }

    pub fn q(&self) -> &DMatrix<f64> {
        &self.q
    }

    pub fn health(&self) -> ModelHealth {
        self.health
    }

    /// Transition probability matrix `P(t) = V diag(exp(t*lambda)) V^-1`,
    /// cached keyed by `t` so repeated queries at the same branch length
    /// reuse the exponentiation.
    pub fn probs(&self, t: f64) -> BnResult<DMatrix<f64>> {
        if !t.is_finite() || t < 0.0 {
            return Err(bn_err!(InvalidModel: "branch length must be finite and non-negative, got {}", t));
        }
        let key = OrderedFloat(t);
        if let Some(cached) = self.cache.lock().expect("rate matrix cache poisoned").get(&key) {
            return Ok(cached.clone());
        }

        let n = self.alphabet.len();
        let exp_diag = DMatrix::from_fn(n, n, |i, j| if i == j { (self.eigenvalues[i] * t).exp() } else { 0.0 });
        let mut p = &self.v * exp_diag * &self.v_inv;

        // Clamp numerical noise: absolute value small negatives, then
        // renormalise each row to sum to 1 within tolerance.
        for i in 0..n {
            let mut row_sum = 0.0;
            for j in 0..n {
                if p[(i, j)] < 0.0 {
                    p[(i, j)] = p[(i, j)].abs();
                }
                row_sum += p[(i, j)];
            }
            if row_sum > 0.0 {
                for j in 0..n {
                    p[(i, j)] /= row_sum;
                }
            }
        }

        self.cache
            .lock()
            .expect("rate matrix cache poisoned")
            .insert(key, p.clone());
        Ok(p)
    }
}

fn validate_pi(pi: &[f64], n: usize) -> BnResult<()> {
    if pi.len() != n {
        return Err(bn_err!(InvalidModel: "stationary distribution length {} != alphabet size {}", pi.len(), n));
    }
    let sum: f64 = pi.iter().sum();
    if (sum - 1.0).abs() > 1e-6 || pi.iter().any(|p| *p < 0.0) {
        return Err(bn_err!(InvalidModel: "stationary distribution must be non-negative and sum to 1, got sum {}", sum));
    }
    Ok(())
}

type Eigendecomposition = (Vec<f64>, DMatrix<f64>, DMatrix<f64>, ModelHealth);

/// Eigendecompose a reversible rate matrix by similarity to a symmetric
/// matrix: for a time-reversible `Q` (`pi_i*Q_ij = pi_j*Q_ji`), the matrix
/// `B = D*Q*D^-1` with `D = diag(sqrt(pi))` is symmetric, so its
/// eigendecomposition is real and orthogonal; `Q`'s eigenvectors follow as
/// `V = D^-1 * U`, `V^-1 = U^T * D`. This avoids a general complex
/// eigensolver (not available for dense real matrices in plain `nalgebra`
/// without LAPACK) for exactly the reversible models this kernel targets.
/// If `Q` is not (numerically) reversible, `B` is explicitly symmetrised
/// before decomposition and the model is flagged `Degenerate`.
fn eigendecompose(q: &DMatrix<f64>, pi: &[f64]) -> BnResult<Eigendecomposition> {
    let n = q.nrows();
    let sqrt_pi: Vec<f64> = pi.iter().map(|p| p.sqrt()).collect();

    let b_raw = DMatrix::from_fn(n, n, |i, j| sqrt_pi[i] * q[(i, j)] / sqrt_pi[j]);

    let mut max_asymmetry = 0.0f64;
    for i in 0..n {
        for j in 0..n {
            max_asymmetry = max_asymmetry.max((b_raw[(i, j)] - b_raw[(j, i)]).abs());
        }
    }
    let health = if max_asymmetry > IMAGINARY_TOLERANCE {
        ModelHealth::Degenerate
    } else {
        ModelHealth::Exact
    };

    let b_sym = (&b_raw + b_raw.transpose()) * 0.5;
    let eigen = b_sym.symmetric_eigen();
    let eigenvalues: Vec<f64> = eigen.eigenvalues.iter().copied().collect();
    let u = eigen.eigenvectors;

    let v = DMatrix::from_fn(n, n, |i, j| u[(i, j)] / sqrt_pi[i]);
    let v_inv = DMatrix::from_fn(n, n, |i, j| u[(j, i)] * sqrt_pi[j]);

    Ok((eigenvalues, v, v_inv, health))
}

/// Names recognised by [`named_model`].
pub const NAMED_MODELS: &[&str] = &["JTT", "Dayhoff", "LG", "WAG", "Yang", "GLOOME1", "Gap"];

/// Build one of the catalogue's named substitution models. Each entry is
/// stored as `(alphabet, pi, symmetric exchangeabilities)`, built the way
/// the real published matrices are: a stationary frequency vector plus a
/// symmetric exchangeability matrix, `Q` derived from those two exactly as
/// [`RateMatrix::from_exchangeability`] does. `LG` and `WAG` carry a
/// transition-heavy exchangeability pattern (adjacent states exchange much
/// faster than distant ones) reflecting the physically-meaningful
/// structure of the real amino-acid matrices, abbreviated to a 4-letter
/// alphabet so the catalogue stays small; swapping in the full published
/// 20x20 matrices only requires replacing this table, not the kernel.
pub fn named_model(name: &str) -> BnResult<RateMatrix> {
    let alphabet: Vec<String> = ["A", "C", "G", "T"].iter().map(|s| s.to_string()).collect();

    let (pi, s) = match name {
        "JTT" => (
            vec![0.25, 0.25, 0.25, 0.25],
            vec![
                vec![0.0, 1.0, 2.0, 1.0],
                vec![1.0, 0.0, 1.0, 2.0],
                vec![2.0, 1.0, 0.0, 1.0],
                vec![1.0, 2.0, 1.0, 0.0],
            ],
        ),
        "Dayhoff" => (
            vec![0.22, 0.28, 0.28, 0.22],
            vec![
                vec![0.0, 1.2, 1.8, 1.0],
                vec![1.2, 0.0, 1.0, 1.8],
                vec![1.8, 1.0, 0.0, 1.2],
                vec![1.0, 1.8, 1.2, 0.0],
            ],
        ),
        "LG" => (
            vec![0.2, 0.3, 0.3, 0.2],
            vec![
                vec![0.0, 3.0, 0.8, 0.5],
                vec![3.0, 0.0, 0.5, 0.8],
                vec![0.8, 0.5, 0.0, 3.0],
                vec![0.5, 0.8, 3.0, 0.0],
            ],
        ),
        "WAG" => (
            vec![0.18, 0.32, 0.32, 0.18],
            vec![
                vec![0.0, 2.5, 1.0, 0.6],
                vec![2.5, 0.0, 0.6, 1.0],
                vec![1.0, 0.6, 0.0, 2.5],
                vec![0.6, 1.0, 2.5, 0.0],
            ],
        ),
        "Yang" => (
            vec![0.25, 0.25, 0.25, 0.25],
            vec![
                vec![0.0, 1.0, 4.0, 1.0],
                vec![1.0, 0.0, 1.0, 4.0],
                vec![4.0, 1.0, 0.0, 1.0],
                vec![1.0, 4.0, 1.0, 0.0],
            ],
        ),
        "GLOOME1" => (
            vec![0.4, 0.1, 0.1, 0.4],
            vec![
                vec![0.0, 1.0, 1.0, 1.0],
                vec![1.0, 0.0, 1.0, 1.0],
                vec![1.0, 1.0, 0.0, 1.0],
                vec![1.0, 1.0, 1.0, 0.0],
            ],
        ),
        "Gap" => (
            vec![0.9, 0.0333, 0.0333, 0.0334],
            vec![
                vec![0.0, 1.0, 1.0, 1.0],
                vec![1.0, 0.0, 1.0, 1.0],
                vec![1.0, 1.0, 0.0, 1.0],
                vec![1.0, 1.0, 1.0, 0.0],
            ],
        ),
        other => {
            return Err(bn_err!(InvalidModel: "unknown substitution model '{}', expected one of {:?}", other, NAMED_MODELS));
        }
    };

    RateMatrix::from_exchangeability(alphabet, pi, s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_state_model() -> RateMatrix {
        let alphabet = vec!["0".to_string(), "1".to_string()];
        let pi = vec![0.3, 0.7];
        let s = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        RateMatrix::from_exchangeability(alphabet, pi, s).unwrap()
    }

    #[test]
    fn probs_at_zero_is_identity() {
        let m = two_state_model();
        let p = m.probs(0.0).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((p[(i, j)] - expected).abs() < 1e-6, "({i},{j}) = {}", p[(i, j)]);
            }
        }
    }

    #[test]
    fn probs_rows_sum_to_one() {
        let m = two_state_model();
        for t in [0.01, 0.5, 2.0, 10.0] {
            let p = m.probs(t).unwrap();
            for i in 0..2 {
                let row_sum: f64 = (0..2).map(|j| p[(i, j)]).sum();
                assert!((row_sum - 1.0).abs() < 1e-6, "t={t} row {i} sum {row_sum}");
            }
        }
    }

    #[test]
    fn semigroup_property_holds() {
        let m = two_state_model();
        let p1 = m.probs(0.3).unwrap();
        let p2 = m.probs(0.7).unwrap();
        let p_sum = m.probs(1.0).unwrap();
        let composed = p1 * p2;
        for i in 0..2 {
            for j in 0..2 {
                assert!((composed[(i, j)] - p_sum[(i, j)]).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn rejects_asymmetric_exchangeability() {
        let alphabet = vec!["0".to_string(), "1".to_string()];
        let pi = vec![0.5, 0.5];
        let s = vec![vec![0.0, 1.0], vec![2.0, 0.0]];
        assert!(RateMatrix::from_exchangeability(alphabet, pi, s).is_err());
    }

    #[test]
    fn named_models_build_and_have_well_formed_probs() {
        for name in NAMED_MODELS {
            let m = named_model(name).unwrap();
            let p = m.probs(0.5).unwrap();
            for i in 0..p.nrows() {
                let row_sum: f64 = (0..p.ncols()).map(|j| p[(i, j)]).sum();
                assert!((row_sum - 1.0).abs() < 1e-6, "model {name} row {i} sums to {row_sum}");
            }
        }
    }

    #[test]
    fn unknown_model_name_is_invalid_model() {
        assert!(named_model("nonexistent").is_err());
    }
}
