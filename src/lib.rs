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

//! Bayesian ballot-polling audits of instant-runoff (IRV) elections.
//!
//! Given a partial sample of cast ballots, a lazily-materialized
//! Dirichlet-tree distribution ([`tree::DirichletTree`]) maintains a
//! posterior over the population of unseen ballots. Monte Carlo simulation
//! ([`simulate::sample_posterior`]) then estimates each candidate's
//! posterior probability of winning the full election under the
//! instant-runoff social choice function ([`irv`]).
//!
//! Hosts that deal in candidate names rather than indices go through the
//! [`contest`] adapter; ranked ballot files are read by [`parse`].

#![forbid(missing_docs, unsafe_code)]

pub mod ballot;
pub mod contest;
pub mod error;
pub mod irv;
mod node;
pub mod params;
pub mod parse;
pub mod simulate;
pub mod tree;
mod util;
