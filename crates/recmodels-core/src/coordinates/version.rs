//! Versions and closest-version selection.

use crate::error::{ModelsError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// An OSGi/Maven style version: `major[.minor[.micro]][(.|-)qualifier]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub qualifier: String,
}

impl Version {
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = qualifier.into();
        self
    }

    pub fn value_of(s: &str) -> Result<Self> {
        s.parse()
    }

    /// `major.minor.micro` without qualifier.
    pub fn canonical(&self) -> Version {
        Version::new(self.major, self.minor, self.micro)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = ModelsError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ModelsError::InvalidVersion {
            input: s.to_string(),
        };
        let mut rest = s.trim();
        let mut numeric = [0u32; 3];
        let mut qualifier = String::new();

        for (i, slot) in numeric.iter_mut().enumerate() {
            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            if digits == 0 {
                return Err(invalid());
            }
            *slot = rest[..digits].parse().map_err(|_| invalid())?;
            rest = &rest[digits..];

            match rest.chars().next() {
                None => break,
                Some('.') if i < 2 => rest = &rest[1..],
                Some('.') | Some('-') => {
                    qualifier = rest[1..].to_string();
                    break;
                }
                Some(_) => return Err(invalid()),
            }
        }

        Ok(Version {
            major: numeric[0],
            minor: numeric[1],
            micro: numeric[2],
            qualifier,
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.micro)
            .cmp(&(other.major, other.minor, other.micro))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Distance of one version segment. Candidates at or above the reference
/// score `2 * delta`, candidates below it `2 * delta + 1`, so newer wins ties.
fn segment_distance(reference: u32, candidate: u32) -> u64 {
    let (reference, candidate) = (u64::from(reference), u64::from(candidate));
    if candidate >= reference {
        2 * (candidate - reference)
    } else {
        2 * (reference - candidate) + 1
    }
}

fn distance(reference: &Version, candidate: &Version) -> (u64, u64, u64) {
    (
        segment_distance(reference.major, candidate.major),
        segment_distance(reference.minor, candidate.minor),
        segment_distance(reference.micro, candidate.micro),
    )
}

/// Pick the candidate closest to `reference`.
///
/// Major distance dominates, then minor, then micro. Candidates tied on all
/// three levels are decided by the greatest version.
pub fn find_closest<'a, I>(reference: &Version, candidates: I) -> Option<Version>
where
    I: IntoIterator<Item = &'a Version>,
{
    candidates
        .into_iter()
        .min_by(|a, b| {
            distance(reference, a)
                .cmp(&distance(reference, b))
                .then_with(|| b.cmp(a))
        })
        .cloned()
}
