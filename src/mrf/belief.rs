use super::{InferenceMode, InferenceOptions, PairwiseMrf, UpdateOrder};
use crate::error::{Result, TerrainError};
use crate::stats::argmax;
use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

/// Output of one belief-propagation run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceResult {
    pub mode: InferenceMode,
    /// Normalised beliefs per variable (max-marginals for max-product).
    pub marginals: Vec<Vec<f64>>,
    /// Argmax of each belief, lowest index on ties.
    pub labels: Vec<usize>,
    /// Bethe estimate of `ln Z` (sum-product) or log score of `labels`
    /// (max-product).
    pub log_partition: f64,
    pub iterations: usize,
    pub converged: bool,
    pub final_delta: f64,
}

impl InferenceResult {
    pub fn find_maximum(&self) -> &[usize] {
        &self.labels
    }
}

/// Loopy belief propagation over a [`PairwiseMrf`].
///
/// Messages live in one flat buffer: two directed messages per edge
/// (`a → b` then `b → a`), `domain` entries each, normalised to sum 1.
pub struct BeliefPropagation<'a> {
    mrf: &'a PairwiseMrf,
    options: InferenceOptions,
    messages: Vec<f64>,
}

impl<'a> BeliefPropagation<'a> {
    pub fn new(mrf: &'a PairwiseMrf, options: &InferenceOptions) -> Self {
        let d = mrf.domain();
        Self {
            mrf,
            options: options.clone(),
            messages: vec![1.0 / d as f64; 2 * mrf.edge_count() * d],
        }
    }

    /// Directed messages, `domain` entries per message.
    pub fn messages(&self) -> &[f64] {
        &self.messages
    }

    pub fn run<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<InferenceResult> {
        let trivial = self.mrf.domain() == 1 || self.mrf.edge_count() == 0;
        let mut order: Vec<usize> = (0..self.mrf.variable_count()).collect();
        let mut iterations = 0;
        let mut delta = 0.0;
        let mut converged = trivial;
        if !trivial {
            for it in 1..=self.options.max_iterations {
                delta = match self.options.order {
                    UpdateOrder::Sequential => self.sweep_in_place(&order)?,
                    UpdateOrder::Random => {
                        order.shuffle(rng);
                        self.sweep_in_place(&order)?
                    }
                    UpdateOrder::Parallel => self.sweep_parallel()?,
                };
                iterations = it;
                if delta < self.options.tolerance {
                    converged = true;
                    break;
                }
            }
        }
        if !converged {
            warn!(
                "belief propagation did not converge after {} iterations (delta={:.3e})",
                iterations, delta
            );
            if self.options.require_convergence {
                return Err(TerrainError::degenerate(format!(
                    "belief propagation did not converge after {iterations} iterations"
                )));
            }
        }

        let marginals = self.beliefs()?;
        let labels: Vec<usize> = marginals.iter().map(|b| argmax(b)).collect();
        let log_partition = match self.options.mode {
            InferenceMode::SumProduct => self.bethe_log_partition(&marginals)?,
            InferenceMode::MaxProduct => self.mrf.log_score(&labels),
        };
        debug!(
            "BeliefPropagation mode={:?} order={:?} vars={} iterations={} converged={} \
             delta={:.3e} log_z={:.6}",
            self.options.mode,
            self.options.order,
            self.mrf.variable_count(),
            iterations,
            converged,
            delta,
            log_partition
        );
        Ok(InferenceResult {
            mode: self.options.mode,
            marginals,
            labels,
            log_partition,
            iterations,
            converged,
            final_delta: delta,
        })
    }

    /// Gauss–Seidel sweep: each variable in `order` sends all its messages
    /// using the freshest incoming ones.
    fn sweep_in_place(&mut self, order: &[usize]) -> Result<f64> {
        let mrf = self.mrf;
        let d = mrf.domain();
        let mut cavity = vec![0.0; d];
        let mut fresh = vec![0.0; d];
        let mut delta = 0.0_f64;
        for &v in order {
            for &e in mrf.incident(v) {
                compute_message(
                    mrf,
                    self.options.mode,
                    &self.messages,
                    e,
                    v,
                    &mut cavity,
                    &mut fresh,
                )?;
                let off = outgoing(mrf, e, v);
                let change = blend(&mut self.messages[off..off + d], &fresh, self.options.damping);
                delta = delta.max(change);
            }
        }
        Ok(delta)
    }

    /// Flooding sweep: every message is computed from the previous buffer.
    fn sweep_parallel(&mut self) -> Result<f64> {
        let mrf = self.mrf;
        let d = mrf.domain();
        let previous = self.messages.clone();
        let mut cavity = vec![0.0; d];
        let mut fresh = vec![0.0; d];
        let mut delta = 0.0_f64;
        for e in 0..mrf.edge_count() {
            let (a, b) = mrf.edge(e);
            for from in [a, b] {
                compute_message(
                    mrf,
                    self.options.mode,
                    &previous,
                    e,
                    from,
                    &mut cavity,
                    &mut fresh,
                )?;
                let off = outgoing(mrf, e, from);
                let change = blend(&mut self.messages[off..off + d], &fresh, self.options.damping);
                delta = delta.max(change);
            }
        }
        Ok(delta)
    }

    fn beliefs(&self) -> Result<Vec<Vec<f64>>> {
        let d = self.mrf.domain();
        let mut beliefs = Vec::with_capacity(self.mrf.variable_count());
        for v in 0..self.mrf.variable_count() {
            let mut b = vec![0.0; d];
            fill_cavity(self.mrf, &self.messages, v, None, &mut b);
            let sum: f64 = b.iter().sum();
            if !(sum > 0.0) || !sum.is_finite() {
                return Err(TerrainError::degenerate(format!(
                    "belief of variable {v} vanished (sum={sum})"
                )));
            }
            b.iter_mut().for_each(|p| *p /= sum);
            beliefs.push(b);
        }
        Ok(beliefs)
    }

    /// `ln Z ≈ −F_Bethe`, including the unary normalisers.
    fn bethe_log_partition(&self, beliefs: &[Vec<f64>]) -> Result<f64> {
        let mrf = self.mrf;
        let d = mrf.domain();
        let mut log_z = 0.0;
        for (v, b) in beliefs.iter().enumerate() {
            let degree = mrf.incident(v).len() as f64;
            log_z += mrf.log_normalizer(v);
            for (p, u) in b.iter().zip(mrf.unary(v)) {
                log_z += p_ln_q(*p, *u) + (degree - 1.0) * p_ln_q(*p, *p);
            }
        }

        let mut ha = vec![0.0; d];
        let mut hb = vec![0.0; d];
        let mut pair = vec![0.0; d * d];
        for e in 0..mrf.edge_count() {
            let (a, b) = mrf.edge(e);
            let f = mrf.factor(e);
            fill_cavity(mrf, &self.messages, a, Some(e), &mut ha);
            fill_cavity(mrf, &self.messages, b, Some(e), &mut hb);
            let mut total = 0.0;
            for x in 0..d {
                for y in 0..d {
                    let p = f.value(x, y) * ha[x] * hb[y];
                    pair[x * d + y] = p;
                    total += p;
                }
            }
            if !(total > 0.0) || !total.is_finite() {
                return Err(TerrainError::degenerate(format!(
                    "pairwise belief on edge {e} vanished"
                )));
            }
            for x in 0..d {
                for y in 0..d {
                    let p = pair[x * d + y] / total;
                    log_z += p_ln_q(p, f.value(x, y)) - p_ln_q(p, p);
                }
            }
        }
        Ok(log_z)
    }
}

/// Buffer offset of the message leaving `from` along edge `e`.
fn outgoing(mrf: &PairwiseMrf, e: usize, from: usize) -> usize {
    let (a, _) = mrf.edge(e);
    let dir = if a == from { 0 } else { 1 };
    (2 * e + dir) * mrf.domain()
}

/// Buffer offset of the message arriving at `to` along edge `e`.
fn incoming(mrf: &PairwiseMrf, e: usize, to: usize) -> usize {
    let (_, b) = mrf.edge(e);
    let dir = if b == to { 0 } else { 1 };
    (2 * e + dir) * mrf.domain()
}

/// `φ_v · Π m_{k→v}` over every incident edge except `skip`.
fn fill_cavity(
    mrf: &PairwiseMrf,
    messages: &[f64],
    v: usize,
    skip: Option<usize>,
    out: &mut [f64],
) {
    let d = mrf.domain();
    out.copy_from_slice(mrf.unary(v));
    for &e in mrf.incident(v) {
        if Some(e) == skip {
            continue;
        }
        let off = incoming(mrf, e, v);
        for (h, m) in out.iter_mut().zip(&messages[off..off + d]) {
            *h *= m;
        }
    }
}

/// New normalised message from `from` along `e` into `out`.
fn compute_message(
    mrf: &PairwiseMrf,
    mode: InferenceMode,
    messages: &[f64],
    e: usize,
    from: usize,
    cavity: &mut [f64],
    out: &mut [f64],
) -> Result<()> {
    fill_cavity(mrf, messages, from, Some(e), cavity);
    let f = mrf.factor(e);
    match mode {
        InferenceMode::SumProduct => {
            let total: f64 = cavity.iter().sum();
            for (m, h) in out.iter_mut().zip(cavity.iter()) {
                *m = f.diff * total + (f.same - f.diff) * h;
            }
        }
        InferenceMode::MaxProduct => {
            let (best, second) = top_two(cavity);
            for (x, m) in out.iter_mut().enumerate() {
                let others = if x == best.0 { second } else { best.1 };
                *m = (f.same * cavity[x]).max(f.diff * others);
            }
        }
    }
    let sum: f64 = out.iter().sum();
    if !(sum > 0.0) || !sum.is_finite() {
        return Err(TerrainError::degenerate(format!(
            "message on edge {e} vanished or diverged (sum={sum})"
        )));
    }
    out.iter_mut().for_each(|m| *m /= sum);
    Ok(())
}

/// Damped write of `fresh` into `target`; returns the largest change.
fn blend(target: &mut [f64], fresh: &[f64], damping: f64) -> f64 {
    let mut delta = 0.0_f64;
    for (old, new) in target.iter_mut().zip(fresh) {
        let value = (1.0 - damping) * new + damping * *old;
        delta = delta.max((value - *old).abs());
        *old = value;
    }
    delta
}

/// `p · ln q` with `0 · ln 0 = 0`.
#[inline]
fn p_ln_q(p: f64, q: f64) -> f64 {
    if p > 0.0 {
        p * q.ln()
    } else {
        0.0
    }
}

/// Largest entry `(index, value)` and the runner-up value.
fn top_two(values: &[f64]) -> ((usize, f64), f64) {
    let mut best = (0usize, f64::NEG_INFINITY);
    let mut second = f64::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best.1 {
            second = best.1;
            best = (i, v);
        } else if v > second {
            second = v;
        }
    }
    (best, second.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mrf::PairwiseFactor;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn chain() -> PairwiseMrf {
        // 4 variables, 3 labels, a path 0-1-2-3.
        let unary = vec![
            0.7, 0.2, 0.1, //
            0.3, 0.3, 0.4, //
            0.1, 0.5, 0.4, //
            0.2, 0.2, 0.6,
        ];
        let edges = vec![(0, 1), (1, 2), (2, 3)];
        let factors = vec![
            PairwiseFactor { same: 0.8, diff: 0.2 },
            PairwiseFactor { same: 0.6, diff: 0.4 },
            PairwiseFactor { same: 0.9, diff: 0.1 },
        ];
        PairwiseMrf::from_tables(3, unary, edges, factors).unwrap()
    }

    fn loopy() -> PairwiseMrf {
        // 3×3 four-connected lattice, 2 labels.
        let mut edges = Vec::new();
        for r in 0..3 {
            for c in 0..3 {
                let v = r * 3 + c;
                if c + 1 < 3 {
                    edges.push((v, v + 1));
                }
                if r + 1 < 3 {
                    edges.push((v, v + 3));
                }
            }
        }
        let unary: Vec<f64> = (0..9)
            .flat_map(|v| if v % 4 == 0 { [0.3, 0.7] } else { [0.6, 0.4] })
            .collect();
        let factors = vec![PairwiseFactor { same: 0.7, diff: 0.3 }; edges.len()];
        PairwiseMrf::from_tables(2, unary, edges, factors).unwrap()
    }

    /// Enumerate every assignment: `(ln Z, marginals, best labels)`.
    fn brute_force(mrf: &PairwiseMrf) -> (f64, Vec<Vec<f64>>, Vec<usize>) {
        let n = mrf.variable_count();
        let d = mrf.domain();
        let mut labels = vec![0usize; n];
        let mut marg = vec![vec![0.0; d]; n];
        let mut z = 0.0;
        let mut best = (f64::NEG_INFINITY, labels.clone());
        loop {
            let s = mrf.log_score(&labels);
            let p = s.exp();
            z += p;
            for (v, &x) in labels.iter().enumerate() {
                marg[v][x] += p;
            }
            if s > best.0 {
                best = (s, labels.clone());
            }
            let mut i = 0;
            loop {
                if i == n {
                    for m in marg.iter_mut() {
                        m.iter_mut().for_each(|p| *p /= z);
                    }
                    return (z.ln(), marg, best.1);
                }
                labels[i] += 1;
                if labels[i] < d {
                    break;
                }
                labels[i] = 0;
                i += 1;
            }
        }
    }

    fn options(mode: InferenceMode, order: UpdateOrder) -> InferenceOptions {
        InferenceOptions {
            mode,
            order,
            max_iterations: 200,
            tolerance: 1e-12,
            ..Default::default()
        }
    }

    #[test]
    fn sum_product_is_exact_on_a_tree() {
        let mrf = chain();
        let (log_z, exact, _) = brute_force(&mrf);
        let mut rng = StdRng::seed_from_u64(7);
        for order in [UpdateOrder::Sequential, UpdateOrder::Random, UpdateOrder::Parallel] {
            let result = BeliefPropagation::new(&mrf, &options(InferenceMode::SumProduct, order))
                .run(&mut rng)
                .unwrap();
            assert!(result.converged, "{order:?}");
            for (b, e) in result.marginals.iter().zip(&exact) {
                for (p, q) in b.iter().zip(e) {
                    assert_relative_eq!(p, q, epsilon = 1e-8);
                }
            }
            assert_relative_eq!(result.log_partition, log_z, epsilon = 1e-8);
        }
    }

    #[test]
    fn max_product_decodes_map_on_a_tree() {
        let mrf = chain();
        let (_, _, best) = brute_force(&mrf);
        let mut rng = StdRng::seed_from_u64(11);
        let result = BeliefPropagation::new(
            &mrf,
            &options(InferenceMode::MaxProduct, UpdateOrder::Sequential),
        )
        .run(&mut rng)
        .unwrap();
        assert_eq!(result.find_maximum(), best.as_slice());
        assert_relative_eq!(result.log_partition, mrf.log_score(&best), epsilon = 1e-12);
    }

    #[test]
    fn loopy_marginals_are_normalised() {
        let mrf = loopy();
        let mut rng = StdRng::seed_from_u64(3);
        let opts = InferenceOptions {
            damping: 0.3,
            ..Default::default()
        };
        let result = BeliefPropagation::new(&mrf, &opts).run(&mut rng).unwrap();
        assert!(result.converged);
        assert_eq!(result.labels.len(), 9);
        for (b, &label) in result.marginals.iter().zip(&result.labels) {
            assert_relative_eq!(b.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
            assert!(label < 2);
        }
        let (log_z, _, _) = brute_force(&mrf);
        assert!((result.log_partition - log_z).abs() < 0.1);
    }

    #[test]
    fn damped_messages_stay_normalised() {
        let mrf = loopy();
        let mut rng = StdRng::seed_from_u64(8);
        let opts = InferenceOptions {
            damping: 0.5,
            order: UpdateOrder::Parallel,
            ..Default::default()
        };
        let mut bp = BeliefPropagation::new(&mrf, &opts);
        assert_eq!(bp.messages().len(), 2 * mrf.edge_count() * mrf.domain());
        bp.run(&mut rng).unwrap();
        for message in bp.messages().chunks(mrf.domain()) {
            assert_relative_eq!(message.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
            assert!(message.iter().all(|m| *m > 0.0));
        }
    }

    #[test]
    fn single_label_domain_is_trivial() {
        let factors = vec![PairwiseFactor { same: 0.5, diff: 0.5 }];
        let mrf = PairwiseMrf::from_tables(1, vec![2.0, 3.0], vec![(0, 1)], factors).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let result = BeliefPropagation::new(&mrf, &InferenceOptions::default())
            .run(&mut rng)
            .unwrap();
        assert_eq!(result.iterations, 0);
        assert!(result.converged);
        assert_eq!(result.labels, vec![0, 0]);
        assert_relative_eq!(
            result.log_partition,
            2.0_f64.ln() + 3.0_f64.ln() + 0.5_f64.ln(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn unconverged_run_fails_only_when_required() {
        let mrf = loopy();
        let mut rng = StdRng::seed_from_u64(5);
        let mut opts = InferenceOptions {
            max_iterations: 1,
            tolerance: 1e-15,
            ..Default::default()
        };
        let result = BeliefPropagation::new(&mrf, &opts).run(&mut rng).unwrap();
        assert!(!result.converged);
        assert_eq!(result.iterations, 1);

        opts.require_convergence = true;
        let err = BeliefPropagation::new(&mrf, &opts).run(&mut rng).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn top_two_handles_ties() {
        assert_eq!(top_two(&[0.4, 0.4, 0.2]), ((0, 0.4), 0.4));
        assert_eq!(top_two(&[0.1, 0.9]), ((1, 0.9), 0.1));
    }
}
