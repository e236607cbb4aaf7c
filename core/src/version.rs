use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version string: {0}")]
    InvalidVersion(String),
    #[error("Invalid version specifier: {0}")]
    InvalidSpecifier(String),
}

/// PEP 440 version pattern, including the alternate spellings pip accepts
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)^\s*v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?:[-_.]?(?P<pre_l>alpha|beta|preview|pre|rc|a|b|c)[-_.]?(?P<pre_n>[0-9]+)?)?
        (?:(?:-(?P<post_n1>[0-9]+))|(?:[-_.]?(?P<post_l>post|rev|r)[-_.]?(?P<post_n2>[0-9]+)?))?
        (?:[-_.]?(?P<dev_l>dev)[-_.]?(?P<dev_n>[0-9]+)?)?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        \s*$",
    )
    .unwrap_or_else(|e| panic!("version pattern is valid: {e}"))
});

/// Pre-release phase, ordered alpha < beta < release candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PreReleaseKind {
    Alpha,
    Beta,
    Rc,
}

impl PreReleaseKind {
    fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "a" | "alpha" => PreReleaseKind::Alpha,
            "b" | "beta" => PreReleaseKind::Beta,
            _ => PreReleaseKind::Rc,
        }
    }
}

impl fmt::Display for PreReleaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreReleaseKind::Alpha => write!(f, "a"),
            PreReleaseKind::Beta => write!(f, "b"),
            PreReleaseKind::Rc => write!(f, "rc"),
        }
    }
}

/// A parsed PEP 440 version
///
/// `major`, `minor` and `patch` are the first three release segments (missing
/// ones are zero); anything past the third lives in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub epoch: u64,
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub extra: Vec<u64>,
    /// Number of release segments as written (`2.0` has two)
    pub precision: usize,
    pub pre: Option<(PreReleaseKind, u64)>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
    /// Local version label (`+cpu`), ignored for ordering
    pub local: Option<String>,
    /// Original string representation
    pub original: String,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            epoch: 0,
            major,
            minor,
            patch,
            extra: Vec::new(),
            precision: 3,
            pre: None,
            post: None,
            dev: None,
            local: None,
            original: format!("{major}.{minor}.{patch}"),
        }
    }

    /// Build a final release from explicit segments, e.g. `[3, 12]`
    pub fn from_release(segments: &[u64]) -> Self {
        let segment = |i: usize| segments.get(i).copied().unwrap_or(0);
        Self {
            epoch: 0,
            major: segment(0),
            minor: segment(1),
            patch: segment(2),
            extra: segments.iter().skip(3).copied().collect(),
            precision: segments.len().max(1),
            pre: None,
            post: None,
            dev: None,
            local: None,
            original: segments
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join("."),
        }
    }

    /// All release segments, including implicit zeros up to three
    pub fn release(&self) -> Vec<u64> {
        let mut segments = vec![self.major, self.minor, self.patch];
        segments.extend(&self.extra);
        segments
    }

    /// Check if this is a pre-release (or development) version
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    /// Check if this version is in the same major series as another
    pub fn same_major(&self, other: &Version) -> bool {
        self.major == other.major
    }

    /// Check if this version is in the same minor series as another
    pub fn same_minor(&self, other: &Version) -> bool {
        self.major == other.major && self.minor == other.minor
    }

    /// The final release made of the first `precision` segments
    pub fn truncated(&self, precision: usize) -> Version {
        let release = self.release();
        let take = precision.clamp(1, release.len());
        Version::from_release(&release[..take])
    }

    fn pre_key(&self) -> PreKey {
        match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => PreKey::DevOnly,
            (Some((kind, n)), _, _) => PreKey::Pre(kind, n),
            _ => PreKey::Final,
        }
    }

    fn dev_key(&self) -> DevKey {
        match self.dev {
            Some(n) => DevKey::Dev(n),
            None => DevKey::None,
        }
    }
}

/// Sort key for the pre-release slot: `1.0.dev0 < 1.0a1 < 1.0`
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum PreKey {
    DevOnly,
    Pre(PreReleaseKind, u64),
    Final,
}

/// Sort key for the dev slot: a dev release sorts below its parent
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum DevKey {
    Dev(u64),
    None,
}

fn parse_number(s: &str, whole: &str) -> Result<u64, VersionError> {
    s.parse()
        .map_err(|_| VersionError::InvalidVersion(whole.to_string()))
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let caps = VERSION_RE
            .captures(s)
            .ok_or_else(|| VersionError::InvalidVersion(s.to_string()))?;

        let epoch = match caps.name("epoch") {
            Some(m) => parse_number(m.as_str(), s)?,
            None => 0,
        };

        let release = caps
            .name("release")
            .map(|m| m.as_str())
            .unwrap_or_default()
            .split('.')
            .map(|part| parse_number(part, s))
            .collect::<Result<Vec<u64>, _>>()?;

        let pre = match caps.name("pre_l") {
            Some(label) => {
                let n = match caps.name("pre_n") {
                    Some(m) => parse_number(m.as_str(), s)?,
                    None => 0,
                };
                Some((PreReleaseKind::from_label(label.as_str()), n))
            }
            None => None,
        };

        let post = if let Some(m) = caps.name("post_n1") {
            Some(parse_number(m.as_str(), s)?)
        } else if caps.name("post_l").is_some() {
            match caps.name("post_n2") {
                Some(m) => Some(parse_number(m.as_str(), s)?),
                None => Some(0),
            }
        } else {
            None
        };

        let dev = if caps.name("dev_l").is_some() {
            match caps.name("dev_n") {
                Some(m) => Some(parse_number(m.as_str(), s)?),
                None => Some(0),
            }
        } else {
            None
        };

        let segment = |i: usize| release.get(i).copied().unwrap_or(0);

        Ok(Version {
            epoch,
            major: segment(0),
            minor: segment(1),
            patch: segment(2),
            extra: release.iter().skip(3).copied().collect(),
            precision: release.len(),
            pre,
            post,
            dev,
            local: caps.name("local").map(|m| m.as_str().to_string()),
            original: s.trim_start_matches(['v', 'V']).to_string(),
        })
    }
}

fn cmp_release(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let left = a.get(i).copied().unwrap_or(0);
        let right = b.get(i).copied().unwrap_or(0);
        match left.cmp(&right) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }
    Ordering::Equal
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| cmp_release(&self.release(), &other.release()))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| self.dev_key().cmp(&other.dev_key()))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// Version specification (constraint)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    /// ==1.2.3
    Pinned(Version),
    /// >=1.2.3
    Minimum(Version),
    /// <=1.2.3
    Maximum(Version),
    /// >1.2.3
    GreaterThan(Version),
    /// <1.2.3
    LessThan(Version),
    /// >=1.2.3,<2.0.0
    Range { min: Version, max: Version },
    /// ^1.2.3 (Poetry caret)
    Caret(Version),
    /// ~1.2.3 (Poetry tilde)
    Tilde(Version),
    /// ~=1.2.3 (compatible release)
    Compatible(Version),
    /// ==1.2.*
    Wildcard { prefix: String, pattern: String },
    /// !=1.2.3
    NotEqual(Version),
    /// Any other comma-separated list, e.g. >=1.0,!=1.3.0
    Constraints(Vec<VersionSpec>),
    /// Constraint we can't evaluate, kept verbatim
    Complex(String),
    /// Any version (no constraint or *)
    Any,
}

impl VersionSpec {
    /// Parse a version specifier string
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let s = s.trim();

        if s.is_empty() || s == "*" {
            return Ok(VersionSpec::Any);
        }

        // Alternatives and arbitrary equality are kept verbatim
        if s.contains("||") || s.contains('|') || s.starts_with("===") {
            return Ok(VersionSpec::Complex(s.to_string()));
        }

        if s.contains(',') {
            let clauses = s
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(Self::parse_clause)
                .collect::<Result<Vec<_>, _>>();

            return Ok(match clauses {
                Ok(clauses) => match clauses.as_slice() {
                    [VersionSpec::Minimum(min), VersionSpec::LessThan(max)] => VersionSpec::Range {
                        min: min.clone(),
                        max: max.clone(),
                    },
                    [single] => single.clone(),
                    _ => VersionSpec::Constraints(clauses),
                },
                Err(_) => VersionSpec::Complex(s.to_string()),
            });
        }

        Self::parse_clause(s)
    }

    fn parse_clause(s: &str) -> Result<Self, VersionError> {
        let s = s.trim();
        let version = |rest: &str| Version::from_str(rest.trim());

        if s.contains('*') {
            if let Some(rest) = s.strip_prefix("==").or_else(|| s.strip_prefix('=')) {
                return Ok(Self::wildcard(rest.trim(), s));
            }
            if s.starts_with(|c: char| c.is_ascii_digit()) {
                return Ok(Self::wildcard(s, s));
            }
            return Err(VersionError::InvalidSpecifier(s.to_string()));
        }

        // Order matters: two-character operators first
        if let Some(rest) = s.strip_prefix("~=") {
            return Ok(VersionSpec::Compatible(version(rest)?));
        }
        if let Some(rest) = s.strip_prefix("==") {
            return Ok(VersionSpec::Pinned(version(rest)?));
        }
        if let Some(rest) = s.strip_prefix(">=") {
            return Ok(VersionSpec::Minimum(version(rest)?));
        }
        if let Some(rest) = s.strip_prefix("<=") {
            return Ok(VersionSpec::Maximum(version(rest)?));
        }
        if let Some(rest) = s.strip_prefix("!=") {
            return Ok(VersionSpec::NotEqual(version(rest)?));
        }
        if let Some(rest) = s.strip_prefix('^') {
            return Ok(VersionSpec::Caret(version(rest)?));
        }
        if let Some(rest) = s.strip_prefix('~') {
            return Ok(VersionSpec::Tilde(version(rest)?));
        }
        if let Some(rest) = s.strip_prefix('>') {
            return Ok(VersionSpec::GreaterThan(version(rest)?));
        }
        if let Some(rest) = s.strip_prefix('<') {
            return Ok(VersionSpec::LessThan(version(rest)?));
        }
        if let Some(rest) = s.strip_prefix('=') {
            return Ok(VersionSpec::Pinned(version(rest)?));
        }

        // Bare version (Poetry style) means an exact pin
        match Version::from_str(s) {
            Ok(v) => Ok(VersionSpec::Pinned(v)),
            Err(_) => Ok(VersionSpec::Complex(s.to_string())),
        }
    }

    fn wildcard(body: &str, pattern: &str) -> Self {
        let prefix = body
            .trim_end_matches('*')
            .trim_end_matches('.')
            .to_string();
        VersionSpec::Wildcard {
            prefix,
            pattern: pattern.to_string(),
        }
    }

    /// Check if a version satisfies this constraint
    pub fn satisfies(&self, version: &Version) -> bool {
        match self {
            VersionSpec::Any | VersionSpec::Complex(_) => true,
            VersionSpec::Pinned(v) => version == v,
            VersionSpec::Minimum(v) => version >= v,
            VersionSpec::Maximum(v) => version <= v,
            VersionSpec::GreaterThan(v) => version > v,
            VersionSpec::LessThan(v) => version < v,
            VersionSpec::NotEqual(v) => version != v,
            VersionSpec::Range { min, max } => version >= min && version < max,
            VersionSpec::Caret(v) => {
                // ^1.2.3 := <2.0.0, ^0.2.3 := <0.3.0, ^0.0.3 := <0.0.4
                if version < v {
                    return false;
                }
                if v.major != 0 || v.precision == 1 {
                    version.major == v.major
                } else if v.minor != 0 || v.precision == 2 {
                    version.same_minor(v)
                } else {
                    version.same_minor(v) && version.patch == v.patch
                }
            }
            VersionSpec::Tilde(v) => {
                version >= v
                    && if v.precision == 1 {
                        version.same_major(v)
                    } else {
                        version.same_minor(v)
                    }
            }
            VersionSpec::Compatible(v) => {
                // ~=X.Y pins X, ~=X.Y.Z pins X.Y
                let fixed = v.precision.saturating_sub(1).max(1);
                let (have, want) = (version.release(), v.release());
                version >= v
                    && (0..fixed).all(|i| {
                        have.get(i).copied().unwrap_or(0) == want.get(i).copied().unwrap_or(0)
                    })
            }
            VersionSpec::Wildcard { prefix, .. } => {
                let release = version.release();
                prefix.split('.').enumerate().all(|(i, segment)| {
                    segment.parse::<u64>().ok() == Some(release.get(i).copied().unwrap_or(0))
                })
            }
            VersionSpec::Constraints(clauses) => clauses.iter().all(|c| c.satisfies(version)),
        }
    }

    /// The lower bound the constraint is anchored on, if it has one
    pub fn base_version(&self) -> Option<&Version> {
        match self {
            VersionSpec::Pinned(v)
            | VersionSpec::Minimum(v)
            | VersionSpec::GreaterThan(v)
            | VersionSpec::Caret(v)
            | VersionSpec::Tilde(v)
            | VersionSpec::Compatible(v) => Some(v),
            VersionSpec::Range { min, .. } => Some(min),
            VersionSpec::Constraints(clauses) => clauses.iter().find_map(Self::base_version),
            VersionSpec::Maximum(_)
            | VersionSpec::LessThan(_)
            | VersionSpec::NotEqual(_)
            | VersionSpec::Wildcard { .. }
            | VersionSpec::Complex(_)
            | VersionSpec::Any => None,
        }
    }

    /// Whether the constraint caps the versions it accepts
    pub fn has_upper_bound(&self) -> bool {
        match self {
            VersionSpec::Minimum(_)
            | VersionSpec::GreaterThan(_)
            | VersionSpec::NotEqual(_)
            | VersionSpec::Complex(_)
            | VersionSpec::Any => false,
            VersionSpec::Constraints(clauses) => clauses.iter().any(Self::has_upper_bound),
            _ => true,
        }
    }

    /// Whether an updated version can be written back into this constraint
    pub fn is_rewritable(&self) -> bool {
        self.base_version().is_some() || matches!(self, VersionSpec::Wildcard { .. })
    }

    /// Create a new version spec with updated version but same constraint type
    pub fn with_version(&self, new_version: &Version) -> VersionSpec {
        match self {
            VersionSpec::Pinned(_) => VersionSpec::Pinned(new_version.clone()),
            VersionSpec::Minimum(_) => VersionSpec::Minimum(new_version.clone()),
            VersionSpec::GreaterThan(_) => VersionSpec::GreaterThan(new_version.clone()),
            VersionSpec::Caret(_) => VersionSpec::Caret(new_version.clone()),
            VersionSpec::Tilde(_) => VersionSpec::Tilde(new_version.clone()),
            VersionSpec::Compatible(v) => {
                // Keep the written precision so the range doesn't narrow
                VersionSpec::Compatible(new_version.truncated(v.precision.max(2)))
            }
            VersionSpec::Range { max, .. } => VersionSpec::Range {
                min: new_version.clone(),
                max: if new_version >= max {
                    Version::new(new_version.major + 1, 0, 0)
                } else {
                    max.clone()
                },
            },
            VersionSpec::Maximum(v) if new_version > v => VersionSpec::Maximum(new_version.clone()),
            VersionSpec::LessThan(v) if new_version >= v => {
                VersionSpec::LessThan(Version::new(new_version.major + 1, 0, 0))
            }
            VersionSpec::Wildcard { prefix, pattern } => {
                let segments = prefix.split('.').count();
                VersionSpec::Wildcard {
                    prefix: new_version.truncated(segments).to_string(),
                    pattern: pattern.clone(),
                }
            }
            VersionSpec::Constraints(clauses) => VersionSpec::Constraints(
                clauses.iter().map(|c| c.with_version(new_version)).collect(),
            ),
            VersionSpec::Maximum(_)
            | VersionSpec::LessThan(_)
            | VersionSpec::NotEqual(_)
            | VersionSpec::Complex(_)
            | VersionSpec::Any => self.clone(),
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpec::Any => write!(f, "*"),
            VersionSpec::Pinned(v) => write!(f, "=={v}"),
            VersionSpec::Minimum(v) => write!(f, ">={v}"),
            VersionSpec::Maximum(v) => write!(f, "<={v}"),
            VersionSpec::GreaterThan(v) => write!(f, ">{v}"),
            VersionSpec::LessThan(v) => write!(f, "<{v}"),
            VersionSpec::Range { min, max } => write!(f, ">={min},<{max}"),
            VersionSpec::Caret(v) => write!(f, "^{v}"),
            VersionSpec::Tilde(v) => write!(f, "~{v}"),
            VersionSpec::Compatible(v) => write!(f, "~={v}"),
            VersionSpec::Wildcard { prefix, .. } => write!(f, "=={prefix}.*"),
            VersionSpec::NotEqual(v) => write!(f, "!={v}"),
            VersionSpec::Constraints(clauses) => {
                let joined: Vec<String> = clauses.iter().map(ToString::to_string).collect();
                write!(f, "{}", joined.join(","))
            }
            VersionSpec::Complex(s) => write!(f, "{s}"),
        }
    }
}
