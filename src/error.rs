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

//! Error types shared across the crate.

use thiserror::Error;

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by tree construction, updates, sampling and simulation.
#[derive(Error, Debug)]
pub enum Error {
    /// A ballot referenced a candidate index outside `[0, n_candidates)`.
    #[error("candidate index {index} is out of range for {n_candidates} candidates")]
    CandidateOutOfRange {
        /// The offending index.
        index: usize,
        /// Number of candidates in the contest.
        n_candidates: usize,
    },

    /// A ballot ranked the same candidate more than once.
    #[error("candidate {index} appears more than once in the ballot")]
    RepeatedCandidate {
        /// The repeated candidate index.
        index: usize,
    },

    /// A name-based ballot referenced a candidate missing from the roster.
    #[error("unknown candidate {name:?} encountered in ballot")]
    UnknownCandidate {
        /// The unknown candidate name.
        name: String,
    },

    /// A candidate name was listed twice in the roster.
    #[error("candidate {name:?} is listed more than once")]
    RepeatedName {
        /// The repeated candidate name.
        name: String,
    },

    /// Fewer than two candidates were supplied.
    #[error("a contest requires at least 2 candidates, got {0}")]
    TooFewCandidates(usize),

    /// `min_depth` and `max_depth` are not ordered.
    #[error("`min_depth` ({min_depth}) cannot exceed `max_depth` ({max_depth})")]
    DepthOrdering {
        /// Requested minimum ballot length.
        min_depth: usize,
        /// Requested maximum ballot length.
        max_depth: usize,
    },

    /// `max_depth` exceeds the number of candidates.
    #[error("`max_depth` ({max_depth}) cannot exceed the number of candidates ({n_candidates})")]
    DepthOutOfRange {
        /// Requested maximum ballot length.
        max_depth: usize,
        /// Number of candidates in the contest.
        n_candidates: usize,
    },

    /// A ballot ranks more candidates than `max_depth` allows.
    #[error("ballot ranks {len} candidates but `max_depth` is {max_depth}")]
    BallotTooLong {
        /// Length of the offending ballot.
        len: usize,
        /// Maximum ballot length accepted by the tree.
        max_depth: usize,
    },

    /// The concentration parameter is not a positive finite real.
    #[error("`a0` must be a positive finite concentration, got {0}")]
    InvalidConcentration(f64),

    /// A ballot was aggregated with a zero multiplicity.
    #[error("ballot multiplicity must be positive")]
    ZeroCount,

    /// `n_winners` is outside `[1, n_candidates)`.
    #[error("`n_winners` must lie in [1, {n_candidates}), got {n_winners}")]
    WinnerCount {
        /// Requested number of winners.
        n_winners: usize,
        /// Number of candidates in the contest.
        n_candidates: usize,
    },

    /// No non-empty ballots were supplied to the social choice function.
    #[error("no non-empty ballots were supplied")]
    EmptyElection,

    /// A posterior set smaller than the observed data was requested.
    #[error("`n_ballots` ({requested}) must be at least the number of observed ballots ({observed})")]
    TooFewBallots {
        /// Requested posterior-set size.
        requested: usize,
        /// Number of ballots already observed.
        observed: usize,
    },

    /// Zero elections were requested from the posterior driver.
    #[error("`n_elections` must be positive")]
    NoElections,

    /// Zero batches were requested from the posterior driver.
    #[error("`n_batches` must be positive")]
    NoBatches,

    /// The caller signalled an interrupt during posterior simulation.
    #[error("posterior simulation was interrupted")]
    Interrupted,

    /// The ballot file could not be parsed.
    #[error("malformed ballot file: {0}")]
    BallotFile(String),

    /// An I/O error occurred while reading a ballot file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
