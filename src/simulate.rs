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

//! Monte Carlo estimation of posterior win probabilities.
//!
//! Each simulated election draws a complete posterior ballot set from the
//! tree and scores it with the instant-runoff social choice function. The
//! elections are split into batches and dispatched on rayon's thread pool,
//! which is sized to the host's available parallelism; the remainder batch
//! runs on the calling thread.
//!
//! Child PRNG streams are materialized up front on the calling thread, one
//! seed slot per election, and workers never touch the tree's own engine.
//! The result is therefore bit-identical for identical inputs, regardless of
//! thread scheduling and of how elections are grouped into batches.

use crate::error::{Error, Result};
use crate::irv::social_choice_irv;
use crate::tree::{seeded_engine, DirichletTree};
use log::{debug, info};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Inputs of a posterior simulation run.
#[derive(Debug, Clone)]
pub struct PosteriorSpec {
    /// Number of elections to simulate.
    pub n_elections: usize,
    /// Number of ballots cast in each simulated election; at least the
    /// number of observed ballots.
    pub n_ballots: usize,
    /// Number of seats to fill, in `[1, n_candidates)`.
    pub n_winners: usize,
    /// Number of parallel batches to split the elections into.
    pub n_batches: usize,
    /// Whether posterior sets are drawn with replacement.
    pub replace: bool,
}

/// Estimates the posterior probability that each candidate wins, as the
/// fraction of simulated elections electing them. The returned vector has one
/// entry per candidate and sums to `n_winners`.
///
/// The `interrupt` flag is polled between elections; raising it cancels
/// outstanding work, discards partial counts and returns
/// [`Error::Interrupted`]. Invalid arguments are rejected before the tree is
/// touched.
pub fn sample_posterior(
    tree: &mut DirichletTree,
    spec: &PosteriorSpec,
    seed: &str,
    interrupt: Option<&AtomicBool>,
) -> Result<Vec<f64>> {
    let n_candidates = tree.params().n_candidates();
    if spec.n_elections == 0 {
        return Err(Error::NoElections);
    }
    if spec.n_batches == 0 {
        return Err(Error::NoBatches);
    }
    if spec.n_winners < 1 || spec.n_winners >= n_candidates {
        return Err(Error::WinnerCount {
            n_winners: spec.n_winners,
            n_candidates,
        });
    }
    if spec.n_ballots < tree.n_observed() {
        return Err(Error::TooFewBallots {
            requested: spec.n_ballots,
            observed: tree.n_observed(),
        });
    }

    tree.set_seed(seed);
    let seeds = tree.draw_stream_seeds(spec.n_elections);

    let (batch_size, remainder) = if spec.n_elections <= 1 {
        (0, spec.n_elections)
    } else {
        (
            spec.n_elections / spec.n_batches,
            spec.n_elections % spec.n_batches,
        )
    };
    info!(
        "Simulating {} elections of {} ballots: {} batches of {batch_size}, remainder \
         {remainder}",
        spec.n_elections, spec.n_ballots, spec.n_batches
    );

    let shared: &DirichletTree = tree;
    let run_election = |stream_seed: u64| -> Result<Vec<usize>> {
        if interrupt.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(Error::Interrupted);
        }
        let mut rng = seeded_engine(stream_seed);
        let mut sets = shared.posterior_sets_with(1, spec.n_ballots, spec.replace, &mut rng)?;
        let set = sets.pop().unwrap();
        social_choice_irv(&set, n_candidates, &mut rng)
    };

    let parallel_count = batch_size * spec.n_batches;
    let mut orders: Vec<Vec<usize>> = Vec::with_capacity(spec.n_elections);
    if parallel_count > 0 {
        let batches: Vec<Vec<Vec<usize>>> = seeds[..parallel_count]
            .par_chunks(batch_size)
            .map(|chunk| chunk.iter().map(|&s| run_election(s)).collect())
            .collect::<Result<_>>()?;
        for batch in batches {
            orders.extend(batch);
        }
    }
    // Remainder batch on the calling thread.
    for &s in &seeds[parallel_count..] {
        orders.push(run_election(s)?);
    }
    debug!("Collected {} elimination orders", orders.len());

    let mut wins = vec![0usize; n_candidates];
    for order in &orders {
        for &c in &order[n_candidates - spec.n_winners..] {
            wins[c] += 1;
        }
    }
    Ok(wins
        .into_iter()
        .map(|w| w as f64 / spec.n_elections as f64)
        .collect())
}
