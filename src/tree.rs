// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The Dirichlet-tree distribution over ranked ballots.
//!
//! The tree owns its root node, its parameters, the multiset of observed
//! ballots and a default PRNG. Updating with observed ballots turns the prior
//! into a posterior; sampling methods then draw ballots, marginal
//! probabilities and complete posterior ballot sets from it.

use crate::ballot::{Ballot, BallotCount};
use crate::error::{Error, Result};
use crate::node::{self, Node};
use crate::params::TreeParams;
use log::warn;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;

/// Number of draws discarded when (re)seeding a PRNG, and when advancing the
/// tree's engine past seeds handed out to simulation streams.
pub(crate) const SEED_WARMUP: usize = 1000;

/// Hashes a seed string into a 64-bit PRNG seed (FNV-1a over its bytes, which
/// is stable across platforms).
pub(crate) fn hash_seed(seed: &str) -> u64 {
    let mut h = 0xcbf2_9ce4_8422_2325u64;
    for &byte in seed.as_bytes() {
        h ^= u64::from(byte);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}

/// Seeds a fresh, warmed-up PRNG from a 64-bit seed.
pub(crate) fn seeded_engine(seed: u64) -> ChaCha8Rng {
    let mut engine = ChaCha8Rng::seed_from_u64(seed);
    for _ in 0..SEED_WARMUP {
        engine.next_u32();
    }
    engine
}

/// A lazily-materialized Dirichlet-tree distribution over ranked ballots.
#[derive(Debug, Clone)]
pub struct DirichletTree {
    /// Shape and concentration parameters.
    params: TreeParams,
    /// Root node; descendants are materialized on first traversal.
    root: Node,
    /// Multiset of observed ballots, in observation order.
    observed: Vec<BallotCount>,
    /// Distinct lengths among the observed ballots.
    observed_depths: BTreeSet<usize>,
    /// Total number of observed ballots, counted with multiplicity.
    n_observed: usize,
    /// Default PRNG for sampling entry points.
    engine: ChaCha8Rng,
}

impl DirichletTree {
    /// Constructs a prior Dirichlet tree with the given parameters, seeding
    /// the internal PRNG from the seed string.
    pub fn new(params: TreeParams, seed: &str) -> Self {
        let n_candidates = params.n_candidates();
        DirichletTree {
            params,
            root: Node::new(n_candidates),
            observed: Vec::new(),
            observed_depths: BTreeSet::new(),
            n_observed: 0,
            engine: seeded_engine(hash_seed(seed)),
        }
    }

    /// Returns the tree parameters.
    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    /// Returns the observed ballots, in observation order.
    pub fn observed(&self) -> &[BallotCount] {
        &self.observed
    }

    /// Returns the total number of observed ballots, with multiplicity.
    pub fn n_observed(&self) -> usize {
        self.n_observed
    }

    #[cfg(test)]
    pub(crate) fn root(&self) -> &Node {
        &self.root
    }

    /// Re-seeds the internal PRNG from a seed string and warms it up.
    pub fn set_seed(&mut self, seed: &str) {
        self.engine = seeded_engine(hash_seed(seed));
    }

    /// Hands out seeds for independent simulation streams, then advances the
    /// internal engine so later internal draws do not overlap them.
    pub(crate) fn draw_stream_seeds(&mut self, count: usize) -> Vec<u64> {
        let seeds = (0..count).map(|_| u64::from(self.engine.next_u32())).collect();
        for _ in 0..SEED_WARMUP {
            self.engine.next_u32();
        }
        seeds
    }

    /// Destroys all materialized nodes and observations, restoring the prior.
    /// Parameters and the PRNG state persist.
    pub fn reset(&mut self) {
        self.root = Node::new(self.params.n_candidates());
        self.observed.clear();
        self.observed_depths.clear();
        self.n_observed = 0;
    }

    /// Sets the minimum ballot length. Warns if ballots shorter than the new
    /// minimum have already been observed, since sampling can no longer treat
    /// the tree as consistent with its depth bounds.
    pub fn set_min_depth(&mut self, min_depth: usize) -> Result<()> {
        self.params.set_min_depth(min_depth)?;
        if self.observed_depths.iter().any(|&d| d > 0 && d < min_depth) {
            warn!(
                "ballots with fewer than `min_depth` ({min_depth}) preferences have been \
                 observed; sampling may behave inconsistently and a reducible posterior no \
                 longer matches a flat Dirichlet. Consider a `min_depth` no larger than the \
                 shortest observed ballot"
            );
        }
        Ok(())
    }

    /// Sets the maximum ballot length.
    pub fn set_max_depth(&mut self, max_depth: usize) -> Result<()> {
        self.params.set_max_depth(max_depth)
    }

    /// Sets the prior concentration per terminal ballot category.
    pub fn set_a0(&mut self, a0: f64) -> Result<()> {
        self.params.set_a0(a0)
    }

    /// Toggles between Dirichlet-tree and reducible-to-Dirichlet priors.
    pub fn set_reducible(&mut self, reducible: bool) {
        self.params.set_reducible(reducible);
    }

    /// Observes `count` copies of a ballot, materializing its path and
    /// turning the distribution into the corresponding posterior.
    ///
    /// Empty ballots carry no information and leave the tree unchanged. In
    /// reducible mode, observing a ballot shorter than `min_depth` is
    /// reported as a warning: the posterior then no longer reduces to a flat
    /// Dirichlet, but the update proceeds.
    pub fn update(&mut self, ballot: Ballot, count: usize) -> Result<()> {
        ballot.validate(self.params.n_candidates())?;
        if count == 0 {
            return Err(Error::ZeroCount);
        }
        if ballot.len() > self.params.max_depth() {
            return Err(Error::BallotTooLong {
                len: ballot.len(),
                max_depth: self.params.max_depth(),
            });
        }
        if ballot.is_empty() {
            return Ok(());
        }
        if self.params.reducible() && ballot.len() < self.params.min_depth() {
            warn!(
                "updating a reducible Dirichlet tree with a ballot of {} preferences, fewer \
                 than `min_depth` ({}); the posterior no longer reduces to a flat Dirichlet \
                 and sampling in this regime is undefined",
                ballot.len(),
                self.params.min_depth()
            );
        }
        self.root.update(&self.params, ballot.preferences(), 0, count);
        self.observed_depths.insert(ballot.len());
        self.n_observed += count;
        self.observed.push(BallotCount::new(ballot, count));
        Ok(())
    }

    /// Draws `n` ballots from one realization of the posterior predictive,
    /// using the internal PRNG. The result is aggregated: multiplicities sum
    /// to `n`.
    pub fn sample(&mut self, n: usize) -> Vec<BallotCount> {
        sample_impl(&self.params, &self.root, n, &mut self.engine)
    }

    /// Draws `n` ballots from one realization of the posterior predictive,
    /// using an external PRNG. This takes `&self` and never materializes
    /// nodes, so independent workers can sample against a shared tree.
    pub fn sample_with<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<BallotCount> {
        sample_impl(&self.params, &self.root, n, rng)
    }

    /// Draws one realization of the posterior marginal probability of
    /// observing the given ballot. Repeated calls give independent draws;
    /// callers average them into a Monte Carlo estimate.
    pub fn marginal_probability(&mut self, ballot: &Ballot) -> Result<f64> {
        ballot.validate(self.params.n_candidates())?;
        Ok(node::marginal(
            Some(&self.root),
            &self.params,
            ballot.preferences(),
            0,
            &mut self.engine,
        ))
    }

    /// Same as [`Self::marginal_probability`], with an external PRNG.
    pub fn marginal_probability_with<R: Rng + ?Sized>(
        &self,
        ballot: &Ballot,
        rng: &mut R,
    ) -> Result<f64> {
        ballot.validate(self.params.n_candidates())?;
        Ok(node::marginal(
            Some(&self.root),
            &self.params,
            ballot.preferences(),
            0,
            rng,
        ))
    }

    /// Samples `n_sets` complete ballot sets of `n_ballots` ballots each from
    /// the posterior, using the internal PRNG. See
    /// [`Self::posterior_sets_with`].
    pub fn posterior_sets(
        &mut self,
        n_sets: usize,
        n_ballots: usize,
        replace: bool,
    ) -> Result<Vec<Vec<BallotCount>>> {
        let mut engine = self.engine.clone();
        let result = self.posterior_sets_with(n_sets, n_ballots, replace, &mut engine);
        self.engine = engine;
        result
    }

    /// Samples `n_sets` complete ballot sets from the posterior, each
    /// beginning with the observed ballots followed by
    /// `n_ballots - n_observed` posterior-predictive draws.
    ///
    /// With `replace`, the extra ballots of a set are drawn jointly from one
    /// posterior realization. Without it, each drawn ballot is treated as one
    /// more observation against a scratch copy of the tree for the remainder
    /// of that set; sets are independent of each other either way.
    pub fn posterior_sets_with<R: Rng + ?Sized>(
        &self,
        n_sets: usize,
        n_ballots: usize,
        replace: bool,
        rng: &mut R,
    ) -> Result<Vec<Vec<BallotCount>>> {
        if n_ballots < self.n_observed {
            return Err(Error::TooFewBallots {
                requested: n_ballots,
                observed: self.n_observed,
            });
        }
        let n_new = n_ballots - self.n_observed;
        let mut sets = Vec::with_capacity(n_sets);
        for _ in 0..n_sets {
            let mut set = self.observed.clone();
            if replace {
                set.extend(self.sample_with(n_new, rng));
            } else {
                let mut scratch = self.clone();
                for _ in 0..n_new {
                    for bc in scratch.sample_with(1, rng) {
                        scratch.absorb(&bc);
                        set.push(bc);
                    }
                }
            }
            sets.push(set);
        }
        Ok(sets)
    }

    /// Folds a sampled ballot back into the tree as an extra observation,
    /// without the bookkeeping or validation of [`Self::update`]. Sampled
    /// ballots are valid by construction; empty ones carry no information.
    fn absorb(&mut self, bc: &BallotCount) {
        if !bc.ballot.is_empty() {
            self.root.update(&self.params, bc.ballot.preferences(), 0, bc.count);
        }
        self.n_observed += bc.count;
    }
}

fn sample_impl<R: Rng + ?Sized>(
    params: &TreeParams,
    root: &Node,
    n: usize,
    rng: &mut R,
) -> Vec<BallotCount> {
    let mut remaining: Vec<usize> = (0..params.n_candidates()).collect();
    let mut prefix = params.default_path();
    let mut out = Vec::new();
    node::sample_into(
        Some(root),
        params,
        0,
        &mut remaining,
        &mut prefix,
        n,
        rng,
        &mut out,
    );
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::log_tester::ThreadLocalLogger;
    use log::Level;

    fn tree(n: usize, min_depth: usize, max_depth: usize, reducible: bool) -> DirichletTree {
        let params = TreeParams::new(n, min_depth, max_depth, 1.0, reducible).unwrap();
        DirichletTree::new(params, "a fixed test seed")
    }

    fn average_marginal(tree: &mut DirichletTree, ballot: &Ballot, n_draws: usize) -> f64 {
        let total: f64 = (0..n_draws)
            .map(|_| tree.marginal_probability(ballot).unwrap())
            .sum();
        total / n_draws as f64
    }

    #[test]
    fn test_prior_marginal_of_full_ranking() {
        // Three candidates, complete rankings only: each of the 6 orderings
        // has prior marginal 1/6, in both parameterizations.
        for reducible in [false, true] {
            let mut tree = tree(3, 3, 3, reducible);
            let avg = average_marginal(&mut tree, &Ballot::new(vec![0, 1, 2]), 10_000);
            assert!(
                (avg - 1.0 / 6.0).abs() < 0.02,
                "reducible {reducible}: average {avg}"
            );
        }
    }

    #[test]
    fn test_sample_returns_exactly_n_ballots() {
        let mut tree = tree(4, 0, 4, false);
        assert!(tree.sample(0).is_empty());
        let samples = tree.sample(25);
        assert_eq!(samples.iter().map(|bc| bc.count).sum::<usize>(), 25);
    }

    #[test]
    fn test_update_validates_ballots() {
        let mut tree = tree(3, 0, 2, false);
        assert!(matches!(
            tree.update(Ballot::new(vec![3]), 1).unwrap_err(),
            Error::CandidateOutOfRange { .. }
        ));
        assert!(matches!(
            tree.update(Ballot::new(vec![0, 0]), 1).unwrap_err(),
            Error::RepeatedCandidate { .. }
        ));
        assert!(matches!(
            tree.update(Ballot::new(vec![0, 1, 2]), 1).unwrap_err(),
            Error::BallotTooLong { .. }
        ));
        assert!(matches!(
            tree.update(Ballot::new(vec![0]), 0).unwrap_err(),
            Error::ZeroCount
        ));
        assert_eq!(tree.n_observed(), 0);
        assert!(tree.observed().is_empty());
    }

    #[test]
    fn test_update_ignores_empty_ballots() {
        let mut tree = tree(3, 0, 3, false);
        tree.update(Ballot::default(), 5).unwrap();
        assert_eq!(tree.n_observed(), 0);
        assert!(tree.observed().is_empty());
        assert_eq!(*tree.root(), Node::new(3));
    }

    #[test]
    fn test_repeated_update_matches_aggregated_count() {
        let mut once = tree(4, 0, 4, false);
        once.update(Ballot::new(vec![2, 1]), 2).unwrap();

        let mut twice = tree(4, 0, 4, false);
        twice.update(Ballot::new(vec![2, 1]), 1).unwrap();
        twice.update(Ballot::new(vec![2, 1]), 1).unwrap();

        assert_eq!(once.root(), twice.root());
        assert_eq!(once.n_observed(), twice.n_observed());
    }

    #[test]
    fn test_posterior_concentrates_on_observed_ballot() {
        let mut tree = tree(3, 0, 3, false);
        tree.update(Ballot::new(vec![0, 1, 2]), 5).unwrap();

        // Across many posterior realizations, the observed ballot must come
        // up more often than its prior share (1/4 * 1/3 * 1/2 = 1/24 here).
        let mut hits = 0;
        let mut total = 0;
        for _ in 0..200 {
            for bc in tree.sample(20) {
                total += bc.count;
                if bc.ballot.preferences() == [0, 1, 2] {
                    hits += bc.count;
                }
            }
        }
        assert_eq!(total, 4000);
        assert!(
            hits as f64 / total as f64 > 1.0 / 24.0,
            "only {hits} of {total} hits"
        );
    }

    #[test]
    fn test_reducible_posterior_matches_flat_dirichlet() {
        // With only full-length ballots observed, the reducible tree is a
        // flat Dirichlet over the 6 orderings: the posterior predictive of
        // the observed ballot is (a0 + 5) / (6 a0 + 5) = 6/11 for a0 = 1.
        let mut tree = tree(3, 3, 3, true);
        tree.update(Ballot::new(vec![0, 1, 2]), 5).unwrap();
        let avg = average_marginal(&mut tree, &Ballot::new(vec![0, 1, 2]), 20_000);
        assert!((avg - 6.0 / 11.0).abs() < 0.02, "average {avg}");
    }

    #[test]
    fn test_marginal_of_infeasible_ballot_is_zero() {
        let mut tree = tree(3, 2, 3, false);
        assert_eq!(
            tree.marginal_probability(&Ballot::new(vec![0])).unwrap(),
            0.0
        );
        assert!(matches!(
            tree.marginal_probability(&Ballot::new(vec![5])).unwrap_err(),
            Error::CandidateOutOfRange { .. }
        ));
    }

    #[test]
    fn test_posterior_sets_contain_observed_ballots() {
        for replace in [false, true] {
            let mut tree = tree(3, 0, 3, false);
            for prefs in [vec![0], vec![1, 2], vec![2, 0, 1]] {
                tree.update(Ballot::new(prefs), 1).unwrap();
            }

            // Exactly the observed ballots when no extra draws are needed.
            let sets = tree.posterior_sets(2, 3, replace).unwrap();
            assert_eq!(sets.len(), 2);
            for set in &sets {
                assert_eq!(set.as_slice(), tree.observed());
            }

            let sets = tree.posterior_sets(2, 10, replace).unwrap();
            for set in &sets {
                assert_eq!(set.iter().map(|bc| bc.count).sum::<usize>(), 10);
                assert_eq!(&set[..3], tree.observed());
            }
        }
    }

    #[test]
    fn test_posterior_sets_smaller_than_observed() {
        let mut tree = tree(3, 0, 3, false);
        tree.update(Ballot::new(vec![0, 1]), 4).unwrap();
        assert!(matches!(
            tree.posterior_sets(1, 3, true).unwrap_err(),
            Error::TooFewBallots {
                requested: 3,
                observed: 4
            }
        ));
    }

    #[test]
    fn test_reset_restores_prior() {
        let mut tree = tree(3, 0, 3, false);
        tree.update(Ballot::new(vec![0, 1, 2]), 7).unwrap();
        tree.reset();
        assert_eq!(tree.n_observed(), 0);
        assert!(tree.observed().is_empty());
        assert_eq!(*tree.root(), Node::new(3));
    }

    #[test]
    fn test_same_seed_same_samples() {
        let params = TreeParams::with_full_depth(4, 0.5, false).unwrap();
        let mut a = DirichletTree::new(params.clone(), "determinism");
        let mut b = DirichletTree::new(params, "determinism");
        a.update(Ballot::new(vec![1, 3]), 2).unwrap();
        b.update(Ballot::new(vec![1, 3]), 2).unwrap();
        assert_eq!(a.sample(100), b.sample(100));
    }

    #[test]
    fn test_reducible_update_below_min_depth_warns() {
        let logger = ThreadLocalLogger::start();
        let mut tree = tree(4, 2, 4, true);
        tree.update(Ballot::new(vec![0]), 1).unwrap();
        // The update proceeds despite the warning.
        assert_eq!(tree.n_observed(), 1);
        logger.check_has_warning("no longer reduces to a flat Dirichlet");
    }

    #[test]
    fn test_set_min_depth_against_observed_depths_warns() {
        let logger = ThreadLocalLogger::start();
        let mut tree = tree(4, 0, 4, false);
        tree.update(Ballot::new(vec![0]), 1).unwrap();
        tree.set_min_depth(2).unwrap();
        assert_eq!(tree.params().min_depth(), 2);
        logger.check_has_warning("have been observed");
    }

    #[test]
    fn test_set_seed_restores_stream() {
        let mut tree = tree(3, 0, 3, false);
        tree.set_seed("stream");
        let first = tree.sample(10);
        tree.set_seed("stream");
        assert_eq!(tree.sample(10), first);
    }

    #[test]
    fn test_hash_seed_is_stable() {
        assert_eq!(hash_seed(""), 0xcbf2_9ce4_8422_2325);
        assert_ne!(hash_seed("a"), hash_seed("b"));
    }

    #[test]
    fn test_logger_quiet_without_warnings() {
        let logger = ThreadLocalLogger::start();
        let mut tree = tree(3, 0, 3, false);
        tree.update(Ballot::new(vec![0, 1]), 1).unwrap();
        logger.check_levels_empty(Level::Warn);
    }
}
