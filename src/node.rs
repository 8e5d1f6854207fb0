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

//! Interior nodes of the Dirichlet tree.
//!
//! A node at depth `d` stands for a prefix of `d` preferences already chosen.
//! Its branches are the `n - d` remaining candidates, plus a distinguished
//! halt branch wherever ballots are allowed to stop. Nodes are materialized
//! lazily: an absent node carries no observations and behaves exactly like a
//! freshly-initialized one, so sampling walks the tree read-only and treats
//! missing children as all-zero virtual nodes.

use crate::ballot::{Ballot, BallotCount};
use crate::params::TreeParams;
use rand::Rng;
use rand_distr::{Beta, Binomial, Dirichlet, Distribution};

/// An interior node of the Dirichlet tree.
///
/// Branch `b` (for `b < r`, where `r` candidates remain) leads towards the
/// `b`-th smallest remaining candidate index; the trailing count slot is the
/// halt branch. Children are allocated on first traversal by an update; the
/// halt branch never has a child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Node {
    /// Observed traversal counts, one per remaining candidate plus a trailing
    /// halt slot.
    counts: Box<[usize]>,
    /// Materialized children, one slot per remaining candidate.
    children: Box<[Option<Box<Node>>]>,
}

impl Node {
    /// Creates an unobserved node with the given number of candidate
    /// branches.
    pub(crate) fn new(n_branches: usize) -> Self {
        Node {
            counts: vec![0; n_branches + 1].into_boxed_slice(),
            children: vec![None; n_branches].into_boxed_slice(),
        }
    }

    /// Records `count` observations of a ballot along its path, materializing
    /// children as needed. `depth` is this node's depth; the caller
    /// guarantees the ballot is valid and no longer than `max_depth`.
    pub(crate) fn update(
        &mut self,
        params: &TreeParams,
        prefs: &[usize],
        depth: usize,
        count: usize,
    ) {
        let r = self.children.len();
        if depth == prefs.len() {
            // The ballot stops here.
            self.counts[r] += count;
            return;
        }
        let b = branch_index(prefs, depth);
        self.counts[b] += count;
        if depth + 1 == params.max_depth() {
            // The child is a leaf; the path is fully recorded.
            return;
        }
        let child = self.children[b].get_or_insert_with(|| Box::new(Node::new(r - 1)));
        child.update(params, prefs, depth + 1, count);
    }

    #[cfg(test)]
    pub(crate) fn count(&self, branch: usize) -> usize {
        self.counts[branch]
    }

    #[cfg(test)]
    pub(crate) fn halt_count(&self) -> usize {
        self.counts[self.children.len()]
    }

    #[cfg(test)]
    pub(crate) fn child(&self, branch: usize) -> Option<&Node> {
        self.children[branch].as_deref()
    }
}

/// Returns the branch index of the next preference of a ballot at the given
/// depth: its candidate index, shifted down by the prefix candidates ranked
/// before it.
fn branch_index(prefs: &[usize], depth: usize) -> usize {
    let c = prefs[depth];
    c - prefs[..depth].iter().filter(|&&p| p < c).count()
}

/// Posterior branch concentrations at a node: `effective_a0 + c_b` per
/// remaining candidate, then `a0 + c_halt` for the halt branch if present.
/// An unmaterialized node contributes all-zero counts.
fn branch_alphas(
    node: Option<&Node>,
    params: &TreeParams,
    depth: usize,
    r: usize,
    halt: bool,
) -> Vec<f64> {
    let a_continue = params.effective_a0(depth);
    let mut alpha = Vec::with_capacity(r + usize::from(halt));
    for b in 0..r {
        let c = node.map_or(0, |node| node.counts[b]);
        alpha.push(a_continue + c as f64);
    }
    if halt {
        let c = node.map_or(0, |node| node.counts[r]);
        alpha.push(params.a0() + c as f64);
    }
    alpha
}

/// Draws one realization of branch `b`'s share of a Dirichlet with the given
/// concentrations, via its Beta marginal.
fn branch_share<R: Rng + ?Sized>(rng: &mut R, alpha: &[f64], b: usize) -> f64 {
    let total: f64 = alpha.iter().sum();
    let rest = total - alpha[b];
    Beta::new(alpha[b], rest).unwrap().sample(rng)
}

/// Splits `n` draws across categories with probabilities `theta` by
/// sequential Binomial decomposition: for each category in turn, draw
/// `Binomial(n_remaining, theta_b / mass_remaining)` with the ratio clamped
/// into `[0, 1]`, and give the final category whatever is left. This stays
/// exact for large `n` and many small probabilities, where one-shot
/// multinomial routines misbehave.
fn multinomial<R: Rng + ?Sized>(rng: &mut R, n: usize, theta: &[f64]) -> Vec<usize> {
    let mut counts = Vec::with_capacity(theta.len());
    let mut left = n as u64;
    let mut mass = 1.0;
    for (i, &t) in theta.iter().enumerate() {
        if i + 1 == theta.len() {
            counts.push(left as usize);
            return counts;
        }
        if left == 0 {
            counts.push(0);
            continue;
        }
        let p = if mass > 0.0 {
            (t / mass).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let m = Binomial::new(left, p).unwrap().sample(rng);
        counts.push(m as usize);
        left -= m;
        mass -= t;
    }
    counts
}

/// Draws `n` ballots from one realization of the subtree's posterior
/// predictive, appending them to `out` in aggregated form.
///
/// `remaining` holds the candidates not yet ranked (ascending), `prefix` the
/// preferences chosen so far; both are restored before returning. The walk
/// never materializes nodes, so it can run against a shared tree.
pub(crate) fn sample_into<R: Rng + ?Sized>(
    node: Option<&Node>,
    params: &TreeParams,
    depth: usize,
    remaining: &mut Vec<usize>,
    prefix: &mut Vec<usize>,
    n: usize,
    rng: &mut R,
    out: &mut Vec<BallotCount>,
) {
    if n == 0 {
        return;
    }
    let r = remaining.len();
    let halt = params.halts_at(depth);
    let n_branches = r + usize::from(halt);

    let shares: Vec<usize> = if n_branches == 1 {
        // Single admissible continuation: all mass flows through it without
        // spending a draw.
        vec![n]
    } else {
        let alpha = branch_alphas(node, params, depth, r, halt);
        let theta = Dirichlet::new(&alpha[..]).unwrap().sample(rng);
        multinomial(rng, n, &theta)
    };

    for (b, &share) in shares.iter().take(r).enumerate() {
        if share == 0 {
            continue;
        }
        let candidate = remaining[b];
        prefix.push(candidate);
        if depth + 1 == params.max_depth() {
            out.push(BallotCount::new(Ballot::new(prefix.clone()), share));
        } else {
            let child = node.and_then(|node| node.children[b].as_deref());
            remaining.remove(b);
            sample_into(child, params, depth + 1, remaining, prefix, share, rng, out);
            remaining.insert(b, candidate);
        }
        prefix.pop();
    }
    if halt && shares[r] > 0 {
        out.push(BallotCount::new(Ballot::new(prefix.clone()), shares[r]));
    }
}

/// Draws one realization of the posterior marginal probability of observing
/// the given ballot, as the product over its path of per-node branch shares.
///
/// Infeasible ballots (stopping where no halt branch exists, or running past
/// `max_depth`) have probability zero.
pub(crate) fn marginal<R: Rng + ?Sized>(
    node: Option<&Node>,
    params: &TreeParams,
    prefs: &[usize],
    depth: usize,
    rng: &mut R,
) -> f64 {
    let r = params.n_candidates() - depth;
    let halt = params.halts_at(depth);
    let n_branches = r + usize::from(halt);

    if depth == prefs.len() {
        if !halt {
            return 0.0;
        }
        let alpha = branch_alphas(node, params, depth, r, halt);
        return branch_share(rng, &alpha, r);
    }

    let b = branch_index(prefs, depth);
    let factor = if n_branches == 1 {
        1.0
    } else {
        let alpha = branch_alphas(node, params, depth, r, halt);
        branch_share(rng, &alpha, b)
    };
    if depth + 1 == params.max_depth() {
        // The child is a leaf: only a full-length ballot ends there.
        return if prefs.len() == depth + 1 { factor } else { 0.0 };
    }
    let child = node.and_then(|node| node.children[b].as_deref());
    factor * marginal(child, params, prefs, depth + 1, rng)
}
