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

//! Module to parse ranked ballot files.
//!
//! The format is line-based. A header gives the candidate and winner counts,
//! a `[nick ...]` option line gives the candidate nicknames used in ballot
//! lines, then each ballot line carries a multiplicity and a strict ranking
//! of nicknames, terminated by `0`. A lone `0` ends the ballot section, and
//! the file closes with the quoted full candidate names and the quoted
//! contest title.

use crate::error::{Error, Result};
use log::{info, trace, warn};
use regex::Regex;
use std::collections::HashSet;
use std::io::BufRead;

/// A candidate listed in a ballot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Nickname, used in ballot lines.
    pub nickname: String,
    /// Full name, used to report results.
    pub name: String,
}

/// A parsed ballot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poll {
    /// Title of the contest.
    pub title: String,
    /// Number of seats to fill.
    pub n_winners: usize,
    /// Candidates, in nickname-declaration order.
    pub candidates: Vec<Candidate>,
    /// Ballots as nickname rankings, each with a multiplicity.
    pub ballots: Vec<(Vec<String>, usize)>,
}

/// Parses a ranked ballot file.
pub fn parse_poll(input: impl BufRead) -> Result<Poll> {
    let re_header = Regex::new(r"^([0-9]+) ([0-9]+)$").unwrap();
    let re_nicknames = Regex::new(r"^\[nick((?: [a-z0-9_]+)+)\]$").unwrap();
    let re_ballot = Regex::new(r"^([0-9]+)((?: [a-z0-9_]+)+) 0$").unwrap();

    let mut lines = input.lines();
    let mut next_line = |what: &str| -> Result<String> {
        lines
            .next()
            .transpose()?
            .ok_or_else(|| Error::BallotFile(format!("unexpected end of file, expected {what}")))
    };

    let header = next_line("the header")?;
    let cap_header = re_header
        .captures(&header)
        .ok_or_else(|| Error::BallotFile(format!("bad header line: {header:?}")))?;
    let num_candidates: usize = cap_header[1].parse().unwrap();
    let n_winners: usize = cap_header[2].parse().unwrap();
    info!("{n_winners} winners / {num_candidates} candidates");

    let option = next_line("the nickname option")?;
    let cap_nicknames = re_nicknames
        .captures(&option)
        .ok_or_else(|| Error::BallotFile(format!("bad nickname line: {option:?}")))?;
    let nicknames: Vec<String> = cap_nicknames[1]
        .split_whitespace()
        .map(|x| x.to_owned())
        .collect();
    info!("Candidates (by nickname): {nicknames:?}");
    if nicknames.len() != num_candidates {
        return Err(Error::BallotFile(format!(
            "header announced {num_candidates} candidates but {} nicknames are listed",
            nicknames.len()
        )));
    }
    let known: HashSet<&str> = nicknames.iter().map(|x| x.as_str()).collect();
    if known.len() != nicknames.len() {
        return Err(Error::BallotFile("repeated candidate nickname".to_owned()));
    }

    let mut ballots = Vec::new();
    loop {
        let line = next_line("a ballot line")?;
        if line == "0" {
            break;
        }
        match re_ballot.captures(&line) {
            Some(cap_ballot) => {
                let count: usize = cap_ballot[1].parse().unwrap();
                let order: Vec<String> = cap_ballot[2]
                    .split_whitespace()
                    .map(|x| x.to_owned())
                    .collect();
                for nickname in &order {
                    if !known.contains(nickname.as_str()) {
                        return Err(Error::UnknownCandidate {
                            name: nickname.clone(),
                        });
                    }
                }
                trace!("Parsed ballot: count {count} for {order:?}");
                ballots.push((order, count));
            }
            None => {
                warn!("Ignored line: {line:?}");
            }
        }
    }
    info!(
        "Number of ballots: {}",
        ballots.iter().map(|(_, count)| count).sum::<usize>()
    );

    let candidates: Vec<Candidate> = nicknames
        .into_iter()
        .map(|nickname| {
            Ok(Candidate {
                name: remove_quotes(&next_line("a candidate name")?)?.to_owned(),
                nickname,
            })
        })
        .collect::<Result<_>>()?;

    let title = remove_quotes(&next_line("the title")?)?.to_owned();
    info!("Contest title: {title}");

    Ok(Poll {
        title,
        n_winners,
        candidates,
        ballots,
    })
}

/// Removes the leading and trailing double quotes around a string.
fn remove_quotes(x: &str) -> Result<&str> {
    if x.len() >= 2 && x.starts_with('"') && x.ends_with('"') {
        Ok(&x[1..x.len() - 1])
    } else {
        Err(Error::BallotFile(format!("expected a quoted string: {x:?}")))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const POLL: &str = r#"3 1
[nick apple banana cherry]
4 apple banana cherry 0
3 banana apple 0
3 cherry 0
0
"Apple"
"Banana"
"Cherry"
"Fruit contest"
"#;

    #[test]
    fn test_parse_poll() {
        let poll = parse_poll(POLL.as_bytes()).unwrap();
        assert_eq!(poll.title, "Fruit contest");
        assert_eq!(poll.n_winners, 1);
        assert_eq!(
            poll.candidates,
            vec![
                Candidate {
                    nickname: "apple".to_owned(),
                    name: "Apple".to_owned()
                },
                Candidate {
                    nickname: "banana".to_owned(),
                    name: "Banana".to_owned()
                },
                Candidate {
                    nickname: "cherry".to_owned(),
                    name: "Cherry".to_owned()
                },
            ]
        );
        assert_eq!(poll.ballots.len(), 3);
        assert_eq!(
            poll.ballots[1],
            (vec!["banana".to_owned(), "apple".to_owned()], 3)
        );
    }

    #[test]
    fn test_parse_bad_header() {
        let err = parse_poll("three 1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::BallotFile(msg) if msg.contains("bad header")));
    }

    #[test]
    fn test_parse_nickname_count_mismatch() {
        let err = parse_poll("3 1\n[nick apple banana]\n0\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::BallotFile(msg) if msg.contains("nicknames")));
    }

    #[test]
    fn test_parse_unknown_nickname_in_ballot() {
        let input = "2 1\n[nick apple banana]\n1 durian 0\n";
        let err = parse_poll(input.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::UnknownCandidate { name } if name == "durian"));
    }

    #[test]
    fn test_parse_truncated_file() {
        let input = "2 1\n[nick apple banana]\n1 apple 0\n0\n\"Apple\"\n";
        let err = parse_poll(input.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::BallotFile(msg) if msg.contains("end of file")));
    }

    #[test]
    fn test_parse_ignores_junk_lines() {
        let input = "2 1\n[nick apple banana]\nnot a ballot\n1 apple 0\n0\n\"Apple\"\n\"Banana\"\n\"T\"\n";
        let poll = parse_poll(input.as_bytes()).unwrap();
        assert_eq!(poll.ballots.len(), 1);
    }
}
