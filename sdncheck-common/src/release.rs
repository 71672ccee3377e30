//! Product release parsing and ordering.
//!
//! Releases come in two kinds. Numeric releases ("5.2", "4.0R2", "5.2.1")
//! carry a major/minor pair and an optional qualifier segment; platform
//! codenames ("newton") map to an implicit ordinal in the published train
//! order. Within a kind releases are totally ordered. Across kinds there is
//! no order: the comparison predicates fail with
//! [`VersionError::Incomparable`] instead of quietly answering false, and
//! `PartialOrd` answers `None`.
//!
//! One ordering rule is deliberately not semver: a bare release outranks a
//! qualified release with the same numeric part (`4.0 > 4.0.1`,
//! `5.2 > 5.2R1`). A bare release supersedes its interim hotfixes.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::errors::VersionError;

/// Platform trains, oldest first. `master` is the moving head and sorts
/// after every named train.
const TRAINS: [&str; 8] = [
    "kilo", "liberty", "mitaka", "newton", "ocata", "pike", "queens", "master",
];

/// First release that stamps external correlation IDs on SDN objects.
pub const EXTERNAL_ID_RELEASE: &str = "4.0R5";

/// Qualifier segment of a numeric release: an optional alphabetic tag and a
/// number, e.g. `R2` -> ("r", 2), the `.1` of `5.2.1` -> ("", 1).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Qualifier {
    tag: String,
    number: u32,
}

impl Qualifier {
    fn parse(text: &str) -> Option<Self> {
        let digits_at = text.find(|c: char| c.is_ascii_digit())?;
        let (tag, digits) = text.split_at(digits_at);
        if !tag.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        Some(Self {
            tag: tag.to_ascii_lowercase(),
            number: digits.parse().ok()?,
        })
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.tag, self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Numeric {
        major: u32,
        minor: u32,
        qualifier: Option<Qualifier>,
    },
    Codename {
        ordinal: usize,
    },
}

/// An immutable, comparable product or platform version.
#[derive(Debug, Clone)]
pub struct Release {
    raw: String,
    kind: Kind,
}

impl Release {
    /// Parse a release string: `"5.2"`, `"4.0R2"`, `"5.2.1"`, `"newton"`.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let trimmed = text.trim();
        let malformed = || VersionError::Malformed(text.to_string());
        if trimmed.is_empty() {
            return Err(malformed());
        }

        let lowered = trimmed.to_ascii_lowercase();
        if lowered.chars().all(|c| c.is_ascii_alphabetic()) {
            let ordinal = TRAINS
                .iter()
                .position(|train| *train == lowered)
                .ok_or_else(malformed)?;
            return Ok(Self {
                raw: trimmed.to_string(),
                kind: Kind::Codename { ordinal },
            });
        }

        let mut segments = lowered.split('.');
        let major: u32 = segments
            .next()
            .unwrap_or_default()
            .parse()
            .map_err(|_| malformed())?;

        let mut minor = 0;
        let mut qualifier = None;
        if let Some(segment) = segments.next() {
            // The minor segment may carry an attached qualifier ("0r2").
            let digit_end = segment
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(segment.len());
            if digit_end == 0 {
                return Err(malformed());
            }
            minor = segment[..digit_end].parse().map_err(|_| malformed())?;
            if digit_end < segment.len() {
                qualifier = Some(Qualifier::parse(&segment[digit_end..]).ok_or_else(malformed)?);
            }
        }
        if let Some(segment) = segments.next() {
            if qualifier.is_some() {
                return Err(malformed());
            }
            qualifier = Some(Qualifier::parse(segment).ok_or_else(malformed)?);
        }
        if segments.next().is_some() {
            return Err(malformed());
        }

        Ok(Self {
            raw: trimmed.to_string(),
            kind: Kind::Numeric {
                major,
                minor,
                qualifier,
            },
        })
    }

    /// The text this release was parsed from.
    pub fn text(&self) -> &str {
        &self.raw
    }

    pub fn is_codename(&self) -> bool {
        matches!(self.kind, Kind::Codename { .. })
    }

    fn try_cmp(&self, other: &Self) -> Result<Ordering, VersionError> {
        match (&self.kind, &other.kind) {
            (
                Kind::Numeric {
                    major,
                    minor,
                    qualifier,
                },
                Kind::Numeric {
                    major: other_major,
                    minor: other_minor,
                    qualifier: other_qualifier,
                },
            ) => {
                let numeric = (major, minor).cmp(&(other_major, other_minor));
                if numeric != Ordering::Equal {
                    return Ok(numeric);
                }
                // Bare outranks qualified within the same numeric family.
                Ok(match (qualifier, other_qualifier) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Greater,
                    (Some(_), None) => Ordering::Less,
                    (Some(left), Some(right)) => left.cmp(right),
                })
            }
            (Kind::Codename { ordinal }, Kind::Codename { ordinal: other }) => {
                Ok(ordinal.cmp(other))
            }
            _ => Err(VersionError::Incomparable {
                left: self.raw.clone(),
                right: other.raw.clone(),
            }),
        }
    }

    /// Strictly older than `other`.
    pub fn before(&self, other: &Self) -> Result<bool, VersionError> {
        Ok(self.try_cmp(other)? == Ordering::Less)
    }

    /// Older than or the same as `other`.
    pub fn up_to(&self, other: &Self) -> Result<bool, VersionError> {
        Ok(self.try_cmp(other)? != Ordering::Greater)
    }

    /// The same as or newer than `other`.
    pub fn at_least(&self, other: &Self) -> Result<bool, VersionError> {
        Ok(self.try_cmp(other)? != Ordering::Less)
    }

    /// Strictly newer than `other`.
    pub fn after(&self, other: &Self) -> Result<bool, VersionError> {
        Ok(self.try_cmp(other)? == Ordering::Greater)
    }

    /// The same release as `other`.
    pub fn at(&self, other: &Self) -> Result<bool, VersionError> {
        Ok(self.try_cmp(other)? == Ordering::Equal)
    }

    /// At least `other` AND a different numeric family: a strictly newer
    /// train, not just a hotfix of the same one. `5.2` is a newer train
    /// than `5.1`; `5.1` is not a newer train than `5.1.2`.
    pub fn newer_train_than(&self, other: &Self) -> Result<bool, VersionError> {
        Ok(self.at_least(other)? && !self.same_family(other))
    }

    fn same_family(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (
                Kind::Numeric { major, minor, .. },
                Kind::Numeric {
                    major: other_major,
                    minor: other_minor,
                    ..
                },
            ) => (major, minor) == (other_major, other_minor),
            (Kind::Codename { ordinal }, Kind::Codename { ordinal: other }) => ordinal == other,
            _ => false,
        }
    }
}

impl PartialEq for Release {
    fn eq(&self, other: &Self) -> bool {
        self.try_cmp(other) == Ok(Ordering::Equal)
    }
}

impl PartialOrd for Release {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.try_cmp(other).ok()
    }
}

impl FromStr for Release {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn release(text: &str) -> Release {
        Release::parse(text).unwrap()
    }

    #[test]
    fn numeric_releases_order_by_major_then_minor() {
        assert!(release("4.0") < release("5.2"));
        assert!(release("5.1") < release("5.2"));
        assert!(release("5.2") > release("4.9"));
        assert!(release("5.2") == release("5.2"));
        assert!(release("5") == release("5.0"));
    }

    #[test]
    fn bare_release_outranks_its_qualified_predecessor() {
        assert!(release("4.0") > release("4.0.1"));
        assert!(release("5.2") > release("5.2.1"));
        assert!(release("5.2") > release("5.2R1"));
        assert!(release("5.2.1") < release("5.2"));
    }

    #[test]
    fn qualifiers_order_among_themselves() {
        assert!(release("3.2R1") < release("3.2R2"));
        assert!(release("3.2R2") < release("3.2R10"));
        assert!(release("3.2r1") == release("3.2R1"));
        assert!(release("5.2.1") < release("5.2.2"));
    }

    #[test]
    fn codenames_order_by_train() {
        assert!(release("newton") < release("ocata"));
        assert!(release("kilo") < release("queens"));
        assert!(release("Newton") == release("newton"));
        for train in ["kilo", "liberty", "mitaka", "newton", "ocata", "pike", "queens"] {
            assert!(release(train) < release("master"), "{train} must sort before master");
        }
    }

    #[test]
    fn cross_kind_comparison_is_an_error() {
        let numeric = release("4.0");
        let codename = release("newton");
        assert!(matches!(
            numeric.before(&codename),
            Err(VersionError::Incomparable { .. })
        ));
        assert!(matches!(
            codename.at_least(&numeric),
            Err(VersionError::Incomparable { .. })
        ));
        assert_eq!(numeric.partial_cmp(&codename), None);
        assert!(numeric != codename);
    }

    #[test]
    fn newer_train_requires_leaving_the_family() {
        assert!(release("5.2").newer_train_than(&release("5.1")).unwrap());
        assert!(!release("5.1.2").newer_train_than(&release("5.1")).unwrap());
        assert!(!release("5.1").newer_train_than(&release("5.1.2")).unwrap());
        assert!(!release("5.1").newer_train_than(&release("5.1R3")).unwrap());
        assert!(release("6.0").newer_train_than(&release("5.2R4")).unwrap());
    }

    #[test]
    fn predicate_set_is_consistent() {
        let old = release("4.0");
        let new = release("5.2");
        assert!(old.before(&new).unwrap());
        assert!(old.up_to(&new).unwrap());
        assert!(!old.at_least(&new).unwrap());
        assert!(new.after(&old).unwrap());
        assert!(new.at(&release("5.2")).unwrap());
    }

    #[test]
    fn malformed_strings_are_rejected() {
        for text in ["", "  ", "bogus", "5..2", "5.", "x.y", "5.2.3.4", "4r2", "5.2rc", "5.2.r"] {
            assert!(
                matches!(Release::parse(text), Err(VersionError::Malformed(_))),
                "'{text}' must not parse"
            );
        }
    }

    #[test]
    fn external_id_release_constant_parses() {
        let gate = release(EXTERNAL_ID_RELEASE);
        assert!(release("5.2").at_least(&gate).unwrap());
        assert!(release("3.2R1").before(&gate).unwrap());
        // A bare 4.0 supersedes its qualified releases, the gate included.
        assert!(release("4.0").at_least(&gate).unwrap());
    }

    fn numeric_release_strategy() -> impl Strategy<Value = String> {
        (0u32..8, 0u32..8, proptest::option::of((any::<bool>(), 1u32..5))).prop_map(
            |(major, minor, qualifier)| match qualifier {
                None => format!("{major}.{minor}"),
                Some((true, number)) => format!("{major}.{minor}R{number}"),
                Some((false, number)) => format!("{major}.{minor}.{number}"),
            },
        )
    }

    proptest! {
        #[test]
        fn plain_pairs_order_lexicographically(a in 0u32..50, b in 0u32..50, c in 0u32..50, d in 0u32..50) {
            let left = release(&format!("{a}.{b}"));
            let right = release(&format!("{c}.{d}"));
            prop_assert_eq!(left.before(&right).unwrap(), (a, b) < (c, d));
            prop_assert_eq!(left.at(&right).unwrap(), (a, b) == (c, d));
        }

        #[test]
        fn ordering_is_total_and_transitive(
            a in numeric_release_strategy(),
            b in numeric_release_strategy(),
            c in numeric_release_strategy(),
        ) {
            let (a, b, c) = (release(&a), release(&b), release(&c));
            // Exactly one of <, ==, > holds.
            let relations = [
                a.before(&b).unwrap(),
                a.at(&b).unwrap(),
                a.after(&b).unwrap(),
            ];
            prop_assert_eq!(relations.iter().filter(|r| **r).count(), 1);
            // Transitivity of <=.
            if a.up_to(&b).unwrap() && b.up_to(&c).unwrap() {
                prop_assert!(a.up_to(&c).unwrap());
            }
        }
    }
}
