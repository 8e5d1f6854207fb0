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

//! The instant-runoff social choice function.
//!
//! Candidates are repeatedly eliminated by lowest first-preference tally,
//! each ballot counting towards its highest-ranked standing candidate. Tied
//! minima are broken uniformly at random with the caller's PRNG, so the full
//! elimination order is a deterministic function of the ballots and the PRNG
//! stream.

use crate::ballot::BallotCount;
use crate::error::{Error, Result};
use log::{debug, trace};
use rand::seq::SliceRandom;
use rand::Rng;

/// An election result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionResult {
    /// Eliminated candidates, in elimination order.
    pub elimination_order: Vec<usize>,
    /// Winning candidates; the overall winner is last.
    pub winners: Vec<usize>,
}

/// Computes the full elimination order of an instant-runoff election: a
/// permutation of `[0, n_candidates)` listing candidates as they are
/// eliminated, with the winner last.
///
/// Ballots whose ranked candidates have all been eliminated are exhausted and
/// stop contributing; empty ballots never contribute. The ballot set must
/// contain at least one non-empty ballot.
pub fn social_choice_irv<R: Rng + ?Sized>(
    ballots: &[BallotCount],
    n_candidates: usize,
    rng: &mut R,
) -> Result<Vec<usize>> {
    for bc in ballots {
        bc.validate(n_candidates)?;
    }
    if ballots.iter().all(|bc| bc.ballot.is_empty()) {
        return Err(Error::EmptyElection);
    }

    let mut standing = vec![true; n_candidates];
    let mut n_standing = n_candidates;
    // Index of each ballot's highest-ranked preference not yet eliminated.
    let mut cursor = vec![0; ballots.len()];
    let mut order = Vec::with_capacity(n_candidates);

    while n_standing > 1 {
        let mut tally = vec![0; n_candidates];
        for (i, bc) in ballots.iter().enumerate() {
            let prefs = bc.ballot.preferences();
            while cursor[i] < prefs.len() && !standing[prefs[cursor[i]]] {
                cursor[i] += 1;
            }
            if let Some(&c) = prefs.get(cursor[i]) {
                tally[c] += bc.count;
            }
        }
        trace!("Standing tallies: {tally:?} (standing: {standing:?})");

        let min = (0..n_candidates)
            .filter(|&c| standing[c])
            .map(|c| tally[c])
            .min()
            .unwrap();
        let tied: Vec<usize> = (0..n_candidates)
            .filter(|&c| standing[c] && tally[c] == min)
            .collect();
        let eliminated = if tied.len() == 1 {
            tied[0]
        } else {
            *tied.choose(rng).unwrap()
        };
        debug!(
            "Eliminating candidate {eliminated} with {min} first preferences \
             ({} tied)",
            tied.len()
        );

        standing[eliminated] = false;
        n_standing -= 1;
        order.push(eliminated);
    }

    let winner = (0..n_candidates).find(|&c| standing[c]).unwrap();
    debug!("Final standing candidate: {winner}");
    order.push(winner);
    Ok(order)
}

/// Runs an instant-runoff election for `n_winners` seats, splitting the
/// elimination order into eliminated candidates and winners (the last
/// `n_winners` standing, overall winner last).
pub fn elect<R: Rng + ?Sized>(
    ballots: &[BallotCount],
    n_candidates: usize,
    n_winners: usize,
    rng: &mut R,
) -> Result<ElectionResult> {
    if n_winners < 1 || n_winners >= n_candidates {
        return Err(Error::WinnerCount {
            n_winners,
            n_candidates,
        });
    }
    let mut elimination_order = social_choice_irv(ballots, n_candidates, rng)?;
    let winners = elimination_order.split_off(n_candidates - n_winners);
    Ok(ElectionResult {
        elimination_order,
        winners,
    })
}
