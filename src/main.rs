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

//! Command-line program for Bayesian ballot-polling audits of instant-runoff
//! elections.

#![forbid(missing_docs, unsafe_code)]

use clap::Parser;
use dirtree_rs::contest::{social_choice, Contest};
use dirtree_rs::error::Result;
use dirtree_rs::parse::{parse_poll, Poll};
use dirtree_rs::simulate::PosteriorSpec;
use std::fs::File;
use std::io::{stdin, BufReader};

/// Rust implementation of Dirichlet-tree audits for IRV elections.
#[derive(Parser, Debug, PartialEq)]
struct Cli {
    /// Command to run on the ballot file.
    #[arg(long, value_enum)]
    command: Command,

    /// Input ballot file. If no input is provided, fallback to reading from
    /// stdin.
    #[arg(long)]
    input: Option<String>,

    /// Seed string for all randomness.
    #[arg(long, default_value = "12345")]
    seed: String,

    /// Prior concentration per terminal ballot category.
    #[arg(long, default_value_t = 1.0)]
    a0: f64,

    /// Minimum number of preferences a ballot must specify.
    #[arg(long, default_value_t = 0)]
    min_depth: usize,

    /// Maximum number of preferences a ballot may specify. Defaults to the
    /// number of candidates.
    #[arg(long)]
    max_depth: Option<usize>,

    /// Use the prior that reduces to a single flat Dirichlet over ballots.
    #[arg(long)]
    reducible: bool,

    /// Number of elections to simulate for the posterior command.
    #[arg(long, default_value_t = 1000)]
    n_elections: usize,

    /// Total number of ballots cast in each simulated election. Defaults to
    /// the number of ballots in the input file.
    #[arg(long)]
    n_ballots: Option<usize>,

    /// Number of winners. Defaults to the ballot file header.
    #[arg(long)]
    n_winners: Option<usize>,

    /// Number of parallel batches for the posterior command.
    #[arg(long, default_value_t = 8)]
    n_batches: usize,

    /// Sample posterior ballot sets with replacement.
    #[arg(long, action = clap::ArgAction::Set, default_value = "true")]
    replace: bool,

    /// Number of draws for the predictive and marginal commands.
    #[arg(long, default_value_t = 100)]
    n_samples: usize,

    /// Nickname ranking for the marginal command, e.g. "apple banana".
    #[arg(long, value_delimiter = ' ')]
    ballot: Vec<String>,
}

/// Commands runnable on a ballot file.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Eq)]
enum Command {
    /// Run the IRV social choice function on the observed ballots.
    Irv,
    /// Estimate each candidate's posterior probability of winning.
    Posterior,
    /// Draw ballots from the posterior predictive distribution.
    Predictive,
    /// Estimate the posterior marginal probability of one specific ballot.
    Marginal,
}

impl Cli {
    /// Runs the selected command against the parsed ballot file.
    fn run(self, poll: &Poll) -> Result<()> {
        let n_winners = self.n_winners.unwrap_or(poll.n_winners);
        match self.command {
            Command::Irv => {
                let expanded: Vec<Vec<String>> = poll
                    .ballots
                    .iter()
                    .flat_map(|(order, count)| std::iter::repeat(order.clone()).take(*count))
                    .collect();
                let result = social_choice(&expanded, n_winners, &self.seed)?;
                println!("Eliminated (in order): {}", result.elimination_order.join(", "));
                println!("Winners: {}", result.winners.join(", "));
            }
            Command::Posterior => {
                let mut contest = self.contest(poll)?;
                let n_observed = contest.tree().n_observed();
                let spec = PosteriorSpec {
                    n_elections: self.n_elections,
                    n_ballots: self.n_ballots.unwrap_or(n_observed),
                    n_winners,
                    n_batches: self.n_batches,
                    replace: self.replace,
                };
                let table = contest.sample_posterior(&spec, &self.seed, None)?;
                for (nickname, probability) in table {
                    let name = display_name(poll, &nickname);
                    println!("{name}: {probability:.4}");
                }
            }
            Command::Predictive => {
                let mut contest = self.contest(poll)?;
                for names in contest.sample_predictive(self.n_samples, &self.seed) {
                    println!("{}", names.join(" > "));
                }
            }
            Command::Marginal => {
                let mut contest = self.contest(poll)?;
                let draws =
                    contest.sample_marginal(&self.ballot, self.n_samples, &self.seed)?;
                let mean: f64 = draws.iter().sum::<f64>() / draws.len().max(1) as f64;
                println!("{}: {mean:.6}", self.ballot.join(" > "));
            }
        }
        Ok(())
    }

    /// Builds a contest from the ballot file and observes all its ballots.
    fn contest(&self, poll: &Poll) -> Result<Contest> {
        let nicknames: Vec<String> = poll
            .candidates
            .iter()
            .map(|c| c.nickname.clone())
            .collect();
        let max_depth = self.max_depth.unwrap_or(nicknames.len());
        let mut contest = Contest::new(
            nicknames,
            self.min_depth,
            max_depth,
            self.a0,
            self.reducible,
            &self.seed,
        )?;
        for (order, count) in &poll.ballots {
            contest.update(order, *count)?;
        }
        Ok(contest)
    }
}

/// Maps a nickname back to the candidate's full name.
fn display_name(poll: &Poll, nickname: &str) -> String {
    poll.candidates
        .iter()
        .find(|c| c.nickname == nickname)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| nickname.to_owned())
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let poll = match &cli.input {
        Some(filename) => {
            let file = File::open(filename).expect("Couldn't open input file");
            parse_poll(BufReader::new(file))
        }
        None => parse_poll(stdin().lock()),
    };
    let poll = match poll {
        Ok(poll) => poll,
        Err(e) => {
            eprintln!("Failed to parse ballot file: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = cli.run(&poll) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
