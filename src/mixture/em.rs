use super::{MixtureOptions, PlaneRegression, PlaneSample, SampleSet};
use crate::error::{Result, TerrainError};
use crate::graph::Segmentation;
use crate::stats::{argmax, PlaneLeastSquares};
use log::{debug, warn};
use nalgebra::{DMatrix, Point2, Vector3};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Fitted mixture of planar regressions.
#[derive(Clone, Debug)]
pub struct PlaneMixture {
    pub components: Vec<PlaneRegression>,
    /// `samples × components`, rows sum to 1.
    pub responsibilities: DMatrix<f64>,
    pub log_likelihood: f64,
    pub iterations: usize,
    pub converged: bool,
    /// Log-likelihood after the initial E-step and after every iteration.
    pub history: Vec<f64>,
    min_variance: f64,
}

impl PlaneMixture {
    fn with_components(
        components: Vec<PlaneRegression>,
        samples: usize,
        min_variance: f64,
    ) -> Self {
        let n = components.len();
        Self {
            components,
            responsibilities: DMatrix::zeros(samples, n),
            log_likelihood: f64::NEG_INFINITY,
            iterations: 0,
            converged: false,
            history: Vec::new(),
            min_variance,
        }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn active_components(&self) -> usize {
        self.components.iter().filter(|c| c.is_active()).count()
    }

    pub fn weight_sum(&self) -> f64 {
        self.components.iter().map(|c| c.weight).sum()
    }

    pub fn min_variance(&self) -> f64 {
        self.min_variance
    }

    /// `ln w_j + ln N(height | ŷ_j(position), σ²_j)`, `-∞` for inactive
    /// components.
    pub fn log_score(&self, j: usize, position: Point2<f64>, height: f64) -> f64 {
        match self.components.get(j) {
            Some(c) if c.is_active() => {
                c.weight.ln()
                    + c.distribution_at(position.x, position.y, self.min_variance)
                        .ln_pdf(height)
            }
            _ => f64::NEG_INFINITY,
        }
    }

    /// Score of a whole cell summary: the mean over the cell's points of
    /// `ln w_j + ln N(z | ŷ_j, σ²_j)`, i.e. [`log_score`](Self::log_score) of
    /// the cell mean minus `v / 2σ²_j`.
    pub fn sample_log_score(&self, j: usize, sample: &PlaneSample) -> f64 {
        match self.components.get(j) {
            Some(c) if c.is_active() => {
                let (x, y) = (sample.position.x, sample.position.y);
                let dist = c.distribution_at(x, y, self.min_variance);
                c.weight.ln() + dist.ln_pdf(sample.height)
                    - 0.5 * sample.variance / dist.variance
            }
            _ => f64::NEG_INFINITY,
        }
    }

    /// Component with the highest posterior for a height observed at
    /// `position`.
    pub fn classify(&self, position: Point2<f64>, height: f64) -> usize {
        let scores: Vec<f64> = (0..self.components.len())
            .map(|j| self.log_score(j, position, height))
            .collect();
        argmax(&scores)
    }
}

/// EM estimator for [`PlaneMixture`].
#[derive(Clone, Debug, Default)]
pub struct PlaneMixtureEstimator {
    options: MixtureOptions,
}

impl PlaneMixtureEstimator {
    pub fn new(options: MixtureOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &MixtureOptions {
        &self.options
    }

    /// One component per segment, fitted on that segment's samples.
    pub fn initialize(
        &self,
        samples: &SampleSet,
        segmentation: &Segmentation,
    ) -> Result<PlaneMixture> {
        let n = samples.len();
        let k = segmentation.len();
        let mut membership = Vec::with_capacity(n);
        for s in samples.samples() {
            membership.push(segmentation.component_of(s.vertex)?);
        }

        let mut components = Vec::with_capacity(k);
        let mut counts = vec![0usize; k];
        for &c in &membership {
            counts[c] += 1;
        }
        let mut weights = vec![0.0; n];
        for j in 0..k {
            if counts[j] == 0 {
                components.push(PlaneRegression::inactive());
                continue;
            }
            for (i, s) in samples.samples().iter().enumerate() {
                weights[i] = if membership[i] == j { s.weight } else { 0.0 };
            }
            let fitted =
                weighted_plane(samples.samples(), &weights, self.options.singular_tolerance);
            components.push(match fitted {
                Some((coefficients, variance)) => {
                    PlaneRegression::new(coefficients, variance, counts[j] as f64)
                }
                None => PlaneRegression::inactive(),
            });
        }

        let mut mixture = PlaneMixture::with_components(components, n, self.options.min_variance);
        normalize_weights(&mut mixture.components)?;
        for (i, &c) in membership.iter().enumerate() {
            if mixture.components[c].is_active() {
                mixture.responsibilities[(i, c)] = 1.0;
            } else {
                fill_uniform(&mut mixture, i);
            }
        }
        debug!(
            "PlaneMixtureEstimator::initialize samples={} components={} active={}",
            n,
            k,
            mixture.active_components()
        );
        Ok(mixture)
    }

    /// Initialise from `segmentation` and run EM.
    pub fn fit(&self, samples: &SampleSet, segmentation: &Segmentation) -> Result<PlaneMixture> {
        let mut mixture = self.initialize(samples, segmentation)?;
        self.run_em(&mut mixture, samples)?;
        Ok(mixture)
    }

    /// M-step from externally supplied responsibilities, then EM.
    pub fn refit(
        &self,
        samples: &SampleSet,
        responsibilities: &DMatrix<f64>,
    ) -> Result<PlaneMixture> {
        if responsibilities.nrows() != samples.len() || responsibilities.ncols() == 0 {
            return Err(TerrainError::invalid(format!(
                "responsibilities are {}x{}, expected {} rows and at least one column",
                responsibilities.nrows(),
                responsibilities.ncols(),
                samples.len()
            )));
        }
        if responsibilities.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(TerrainError::invalid(
                "responsibilities must be finite and non-negative",
            ));
        }
        let components = vec![PlaneRegression::inactive(); responsibilities.ncols()];
        let mut mixture =
            PlaneMixture::with_components(components, samples.len(), self.options.min_variance);
        mixture.responsibilities = responsibilities.clone();
        self.m_step(&mut mixture, samples)?;
        self.run_em(&mut mixture, samples)?;
        Ok(mixture)
    }

    /// Alternate E and M steps until the log-likelihood gain drops below the
    /// tolerance or the iteration cap is hit.
    pub fn run_em(&self, mixture: &mut PlaneMixture, samples: &SampleSet) -> Result<()> {
        let mut ll = self.e_step(mixture, samples)?;
        mixture.history.clear();
        mixture.history.push(ll);
        mixture.iterations = 0;
        mixture.converged = false;
        for it in 1..=self.options.max_iterations {
            self.m_step(mixture, samples)?;
            let next = self.e_step(mixture, samples)?;
            mixture.history.push(next);
            mixture.iterations = it;
            let gain = next - ll;
            ll = next;
            if gain < -LIKELIHOOD_SLACK * ll.abs().max(1.0) {
                warn!(
                    "PlaneMixture EM: log-likelihood dropped by {:.3e} at iteration {it}",
                    -gain
                );
                break;
            }
            if gain < self.options.tolerance {
                mixture.converged = true;
                break;
            }
        }
        mixture.log_likelihood = ll;
        if !mixture.converged {
            warn!(
                "PlaneMixture EM stopped after {} iterations without converging (ll={:.6})",
                mixture.iterations, ll
            );
        }
        debug!(
            "PlaneMixture EM iterations={} ll={:.6} active={}",
            mixture.iterations,
            ll,
            mixture.active_components()
        );
        Ok(())
    }

    /// Recompute responsibilities; returns the point-level log-likelihood
    /// bound `Σ_i s_i · ln Σ_j exp(score_ij)`, which EM never decreases.
    pub fn e_step(&self, mixture: &mut PlaneMixture, samples: &SampleSet) -> Result<f64> {
        if mixture.active_components() == 0 {
            return Err(TerrainError::degenerate("mixture has no active components"));
        }
        let k = mixture.len();
        let mut terms = vec![0.0; k];
        let mut ll = 0.0;
        let mut fallback_rows = 0usize;
        for (i, s) in samples.samples().iter().enumerate() {
            for (j, t) in terms.iter_mut().enumerate() {
                *t = mixture.sample_log_score(j, s);
            }
            let m = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if !m.is_finite() {
                fill_uniform(mixture, i);
                fallback_rows += 1;
                continue;
            }
            let lse = m + terms.iter().map(|t| (t - m).exp()).sum::<f64>().ln();
            for (j, t) in terms.iter().enumerate() {
                mixture.responsibilities[(i, j)] = (t - lse).exp();
            }
            ll += s.weight * lse;
        }
        if fallback_rows > 0 {
            debug!("PlaneMixture E-step: {fallback_rows} rows fell back to uniform");
        }
        Ok(ll)
    }

    /// Refit every component from the current responsibilities. Regression
    /// weights are `r_ij · s_i`; the mixing weight is the component's share
    /// of the total sample weight.
    pub fn m_step(&self, mixture: &mut PlaneMixture, samples: &SampleSet) -> Result<()> {
        let k = mixture.responsibilities.ncols();
        let total = samples.total_weight();
        let resp = &mixture.responsibilities;
        let fit_column = |j: usize| -> PlaneRegression {
            let weights: Vec<f64> = samples
                .samples()
                .iter()
                .zip(resp.column(j).iter())
                .map(|(s, r)| r * s.weight)
                .collect();
            let mass: f64 = weights.iter().sum();
            if !(mass > 0.0) || !(total > 0.0) {
                return PlaneRegression::inactive();
            }
            match weighted_plane(samples.samples(), &weights, self.options.singular_tolerance) {
                Some((coefficients, variance)) => {
                    PlaneRegression::new(coefficients, variance, mass / total)
                }
                None => PlaneRegression::inactive(),
            }
        };
        #[cfg(feature = "parallel")]
        let fitted: Vec<PlaneRegression> = (0..k).into_par_iter().map(fit_column).collect();
        #[cfg(not(feature = "parallel"))]
        let fitted: Vec<PlaneRegression> = (0..k).map(fit_column).collect();

        mixture.components = fitted;
        normalize_weights(&mut mixture.components)
    }
}

/// Relative log-likelihood decrease tolerated as rounding noise.
const LIKELIHOOD_SLACK: f64 = 1e-9;

/// WLS plane plus the point-level residual variance
/// `Σ w ((z − ŷ)² + v) / Σ w`.
fn weighted_plane(
    samples: &[PlaneSample],
    weights: &[f64],
    singular_tolerance: f64,
) -> Option<(Vector3<f64>, f64)> {
    let mut lsq = PlaneLeastSquares::new();
    for (s, &w) in samples.iter().zip(weights) {
        lsq.add(s.position.x, s.position.y, s.height, w);
    }
    let coefficients = lsq.solve(singular_tolerance)?;
    let plane = PlaneRegression::new(coefficients, 0.0, 1.0);
    let mut sum = 0.0;
    let mut total = 0.0;
    for (s, &w) in samples.iter().zip(weights) {
        if !(w > 0.0) || !w.is_finite() {
            continue;
        }
        let r = s.height - plane.predict(s.position.x, s.position.y);
        sum += w * (r * r + s.variance);
        total += w;
    }
    (total > 0.0).then(|| (coefficients, sum / total))
}

fn normalize_weights(components: &mut [PlaneRegression]) -> Result<()> {
    let total: f64 = components
        .iter()
        .filter(|c| c.is_active())
        .map(|c| c.weight)
        .sum();
    if !(total > 0.0) || !total.is_finite() {
        return Err(TerrainError::degenerate("mixture has no active components"));
    }
    for c in components.iter_mut().filter(|c| c.is_active()) {
        c.weight /= total;
    }
    Ok(())
}

fn fill_uniform(mixture: &mut PlaneMixture, row: usize) {
    let active = mixture.active_components().max(1) as f64;
    for j in 0..mixture.len() {
        mixture.responsibilities[(row, j)] = if mixture.components[j].is_active() {
            1.0 / active
        } else {
            0.0
        };
    }
}
