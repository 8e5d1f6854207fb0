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

//! Name-based adapter around the Dirichlet tree.
//!
//! A [`Contest`] maintains the mapping between external candidate names and
//! the stable indices used by the tree and the social choice function, so
//! hosts can supply ballots as sequences of names and read results back as
//! name-indexed tables.

use crate::ballot::{Ballot, BallotCount};
use crate::error::{Error, Result};
use crate::irv::elect;
use crate::params::TreeParams;
use crate::simulate::{sample_posterior, PosteriorSpec};
use crate::tree::{hash_seed, seeded_engine, DirichletTree};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;

/// A named-candidate contest and its Dirichlet-tree posterior.
#[derive(Debug, Clone)]
pub struct Contest {
    /// Candidate names; a candidate's index is its position here.
    candidates: Vec<String>,
    /// Reverse mapping from candidate name to index.
    index: HashMap<String, usize>,
    /// The underlying distribution over index-based ballots.
    tree: DirichletTree,
}

impl Contest {
    /// Creates a contest over the given candidates with a prior Dirichlet
    /// tree. Candidate indices follow the order of the names.
    pub fn new(
        candidates: Vec<String>,
        min_depth: usize,
        max_depth: usize,
        a0: f64,
        reducible: bool,
        seed: &str,
    ) -> Result<Self> {
        let mut index = HashMap::new();
        for (i, name) in candidates.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(Error::RepeatedName { name: name.clone() });
            }
        }
        let params = TreeParams::new(candidates.len(), min_depth, max_depth, a0, reducible)?;
        Ok(Contest {
            candidates,
            index,
            tree: DirichletTree::new(params, seed),
        })
    }

    /// Creates a contest accepting ballots of any length.
    pub fn with_full_depth(
        candidates: Vec<String>,
        a0: f64,
        reducible: bool,
        seed: &str,
    ) -> Result<Self> {
        let n = candidates.len();
        Contest::new(candidates, 0, n, a0, reducible, seed)
    }

    /// Returns the candidate names, in index order.
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Returns the underlying Dirichlet tree.
    pub fn tree(&self) -> &DirichletTree {
        &self.tree
    }

    /// Returns the underlying Dirichlet tree for direct manipulation, e.g.
    /// altering parameters between operations.
    pub fn tree_mut(&mut self) -> &mut DirichletTree {
        &mut self.tree
    }

    /// Converts a name-based ballot into an index-based one.
    pub fn ballot_from_names<S: AsRef<str>>(&self, names: &[S]) -> Result<Ballot> {
        let mut prefs = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            match self.index.get(name) {
                Some(&i) => prefs.push(i),
                None => {
                    return Err(Error::UnknownCandidate {
                        name: name.to_owned(),
                    })
                }
            }
        }
        Ok(Ballot::new(prefs))
    }

    /// Converts an index-based ballot back to candidate names.
    pub fn names_from_ballot(&self, ballot: &Ballot) -> Vec<String> {
        ballot
            .preferences()
            .iter()
            .map(|&i| self.candidates[i].clone())
            .collect()
    }

    /// Observes one name-based ballot `count` times.
    pub fn update<S: AsRef<str>>(&mut self, names: &[S], count: usize) -> Result<()> {
        let ballot = self.ballot_from_names(names)?;
        self.tree.update(ballot, count)
    }

    /// Observes a batch of name-based ballots, one elector each. The whole
    /// batch is validated before any ballot is applied, so a bad ballot
    /// leaves the tree untouched.
    pub fn update_all<S: AsRef<str>>(&mut self, ballots: &[Vec<S>]) -> Result<()> {
        let n_candidates = self.candidates.len();
        let max_depth = self.tree.params().max_depth();
        let mut parsed = Vec::with_capacity(ballots.len());
        for names in ballots {
            let ballot = self.ballot_from_names(names)?;
            ballot.validate(n_candidates)?;
            if ballot.len() > max_depth {
                return Err(Error::BallotTooLong {
                    len: ballot.len(),
                    max_depth,
                });
            }
            parsed.push(ballot);
        }
        for ballot in parsed {
            self.tree.update(ballot, 1)?;
        }
        Ok(())
    }

    /// Draws `n` ballots from one realization of the posterior predictive,
    /// expanded to one name-based ballot per elector.
    pub fn sample_predictive(&mut self, n: usize, seed: &str) -> Vec<Vec<String>> {
        self.tree.set_seed(seed);
        let mut out = Vec::with_capacity(n);
        for bc in self.tree.sample(n) {
            let names = self.names_from_ballot(&bc.ballot);
            for _ in 0..bc.count {
                out.push(names.clone());
            }
        }
        out
    }

    /// Draws `n_samples` independent realizations of the posterior marginal
    /// probability of observing the given ballot; the caller averages them.
    pub fn sample_marginal<S: AsRef<str>>(
        &mut self,
        names: &[S],
        n_samples: usize,
        seed: &str,
    ) -> Result<Vec<f64>> {
        let ballot = self.ballot_from_names(names)?;
        self.tree.set_seed(seed);
        (0..n_samples)
            .map(|_| self.tree.marginal_probability(&ballot))
            .collect()
    }

    /// Estimates each candidate's posterior probability of winning, as a
    /// name-indexed table summing to `n_winners`.
    pub fn sample_posterior(
        &mut self,
        spec: &PosteriorSpec,
        seed: &str,
        interrupt: Option<&AtomicBool>,
    ) -> Result<Vec<(String, f64)>> {
        let probs = sample_posterior(&mut self.tree, spec, seed, interrupt)?;
        Ok(self
            .candidates
            .iter()
            .cloned()
            .zip(probs)
            .collect())
    }

    /// Clears all observations, restoring the prior.
    pub fn reset(&mut self) {
        self.tree.reset();
    }
}

/// An election result over named candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedElectionResult {
    /// Eliminated candidates, in elimination order.
    pub elimination_order: Vec<String>,
    /// Winning candidates; the overall winner is last.
    pub winners: Vec<String>,
}

/// Runs the instant-runoff social choice function over name-based ballots,
/// with the candidate set inferred from the ballots in first-appearance
/// order. Empty ballots are skipped; ties are broken by the seeded PRNG.
pub fn social_choice<S: AsRef<str>>(
    ballots: &[Vec<S>],
    n_winners: usize,
    seed: &str,
) -> Result<NamedElectionResult> {
    let mut names: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counted = Vec::new();
    for ballot in ballots {
        if ballot.is_empty() {
            continue;
        }
        let mut prefs = Vec::with_capacity(ballot.len());
        for name in ballot {
            let name = name.as_ref();
            let i = *index.entry(name.to_owned()).or_insert_with(|| {
                names.push(name.to_owned());
                names.len() - 1
            });
            prefs.push(i);
        }
        counted.push(BallotCount::new(Ballot::new(prefs), 1));
    }
    if counted.is_empty() {
        return Err(Error::EmptyElection);
    }
    if n_winners < 1 || n_winners >= names.len() {
        return Err(Error::WinnerCount {
            n_winners,
            n_candidates: names.len(),
        });
    }

    let mut rng = seeded_engine(hash_seed(seed));
    let result = elect(&counted, names.len(), n_winners, &mut rng)?;
    Ok(NamedElectionResult {
        elimination_order: result
            .elimination_order
            .into_iter()
            .map(|i| names[i].clone())
            .collect(),
        winners: result.winners.into_iter().map(|i| names[i].clone()).collect(),
    })
}
