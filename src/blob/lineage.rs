//! Artifact ancestry, recorded in each upload's caption.
//!
//! The channel cannot compare-and-swap, so two writers that validated the same
//! version can both publish. Each artifact names the artifacts it supersedes
//! (nearest first); when two artifacts descend from the same base, the one
//! posted first wins and the later one is invalid. Readers and writers apply
//! the same rule, so a losing upload is never served even before its writer
//! withdraws it.
//!
//! Each caption also carries a random upload token, so a writer whose upload
//! call failed can still find out whether the message was posted.

use std::collections::HashSet;

use super::channel::ChannelMessage;
use crate::record::Version;

/// Ancestors kept per artifact.
pub(crate) const LINEAGE_DEPTH: usize = 16;

const MARKER: &str = "lineage:";
const TOKEN_MARKER: &str = "upload:";

/// A fresh token identifying one upload attempt.
pub(crate) fn upload_token() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// Caption for an upload: a human-readable summary, the upload token, then
/// the lineage line.
pub(crate) fn caption(summary: &str, token: &str, lineage: &[String]) -> String {
    if lineage.is_empty() {
        format!("{summary}\n{TOKEN_MARKER} {token}\n{MARKER}")
    } else {
        format!("{summary}\n{TOKEN_MARKER} {token}\n{MARKER} {}", lineage.join(" "))
    }
}

fn parse_token(caption: &str) -> Option<String> {
    caption
        .lines()
        .find_map(|line| line.trim().strip_prefix(TOKEN_MARKER))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// The lineage recorded in a caption; `None` for artifacts posted without one.
pub(crate) fn parse(caption: &str) -> Option<Vec<String>> {
    caption
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(MARKER))
        .map(|rest| rest.split_whitespace().map(str::to_string).collect())
}

/// A canonical artifact found in the scan window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Artifact {
    pub id: String,
    pub ordinal: u64,
    pub url: String,
    pub lineage: Option<Vec<String>>,
    pub token: Option<String>,
}

impl Artifact {
    fn base(&self) -> Option<&str> {
        self.lineage
            .as_ref()
            .and_then(|l| l.first())
            .map(String::as_str)
    }

    fn descends_from(&self, id: &str) -> bool {
        self.lineage
            .as_ref()
            .is_some_and(|l| l.iter().any(|a| a == id))
    }
}

/// Outcome of checking a fresh upload against a re-scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// The upload is the valid successor of its base (or already superseded by one).
    Committed,
    /// Another writer published from the same base first.
    Lost,
}

/// Every canonical artifact in the scan window, with validity resolved.
#[derive(Debug, Clone)]
pub(crate) struct Resolution {
    /// Sorted by ordinal, oldest first.
    artifacts: Vec<Artifact>,
    invalid: HashSet<String>,
}

impl Resolution {
    pub fn from_messages(messages: Vec<ChannelMessage>, filename: &str) -> Self {
        let mut artifacts: Vec<Artifact> = messages
            .into_iter()
            .filter_map(|m| {
                let url = m.attachment(filename)?.url.clone();
                Some(Artifact {
                    lineage: parse(&m.caption),
                    token: parse_token(&m.caption),
                    id: m.id,
                    ordinal: m.ordinal,
                    url,
                })
            })
            .collect();
        artifacts.sort_by_key(|a| a.ordinal);

        let mut invalid = HashSet::new();
        for (idx, artifact) in artifacts.iter().enumerate() {
            let Some(lineage) = &artifact.lineage else {
                continue;
            };
            let earlier_valid = artifacts[..idx]
                .iter()
                .filter(|other| !invalid.contains(&other.id));

            let forked = match lineage.first() {
                // built on an empty store while something was already published
                None => earlier_valid.count() > 0,
                Some(base) => earlier_valid.clone().any(|other| other.descends_from(base)),
            };
            let on_loser = artifact.base().is_some_and(|base| invalid.contains(base));

            if forked || on_loser {
                invalid.insert(artifact.id.clone());
            }
        }

        Self { artifacts, invalid }
    }

    /// The live artifact: the newest valid one.
    pub fn current(&self) -> Option<&Artifact> {
        self.artifacts
            .iter()
            .rev()
            .find(|a| !self.invalid.contains(&a.id))
    }

    pub fn current_version(&self) -> Version {
        self.current()
            .map(|a| Version::of(a.id.clone()))
            .unwrap_or_else(Version::none)
    }

    pub fn verdict(&self, id: &str) -> Verdict {
        match self.artifacts.iter().find(|a| a.id == id) {
            Some(_) if self.invalid.contains(id) => Verdict::Lost,
            Some(_) => Verdict::Committed,
            None if self.artifacts.iter().any(|a| a.descends_from(id)) => Verdict::Committed,
            None => Verdict::Lost,
        }
    }

    /// The artifact posted by the upload carrying `token`, if it is listed.
    pub fn uploaded(&self, token: &str) -> Option<&Artifact> {
        self.artifacts
            .iter()
            .find(|a| a.token.as_deref() == Some(token))
    }

    /// Artifacts posted before `ordinal`; all of them are superseded once an
    /// artifact at `ordinal` has committed.
    pub fn older_than(&self, ordinal: u64) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(move |a| a.ordinal < ordinal)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }
}
