//! Debian-style package versions.
//!
//! Format: `[epoch:]upstream[-debian][.YYYYMMDD[buildN]]`, where the trailing
//! date/build part is the tag attached to automated rebuilds.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A parsed package version.
///
/// Equality follows the ordering, so `1.0` and `1.00` compare equal.
#[derive(Debug, Clone, Default)]
pub struct PkgVersion {
    pub epoch: u32,
    pub upstream: String,
    pub debian: String,
    /// Build date as `YYYYMMDD`
    pub build_date: Option<u32>,
    /// Only meaningful when `build_date` is set
    pub build: u32,
}

impl PkgVersion {
    /// Parse a version string.
    ///
    /// The epoch is everything before the first `:`, the debian revision
    /// everything after the last `-`. A debian revision of the form
    /// `rev.YYYYMMDD[buildN]` carries a build tag; anything after the first
    /// `.` that does not start with eight digits stays part of the revision.
    /// Versions without a debian revision carry the tag as their last
    /// upstream component, e.g. `2.0.20240101build1`.
    pub fn parse(input: &str) -> Result<Self> {
        let (epoch, rest) = match input.split_once(':') {
            Some(("", rest)) => (0, rest),
            Some((epoch, rest)) => {
                let epoch = epoch
                    .parse::<u32>()
                    .map_err(|_| Error::parse(input, format!("invalid epoch '{}'", epoch)))?;
                (epoch, rest)
            }
            None => (0, input),
        };

        let (upstream, raw_debian) = rest.rsplit_once('-').unwrap_or((rest, ""));
        if upstream.is_empty() {
            return Err(Error::parse(input, "empty upstream version"));
        }

        let mut version = PkgVersion {
            epoch,
            upstream: upstream.to_string(),
            ..Default::default()
        };

        if raw_debian.is_empty() {
            // Native versions carry the tag on the upstream part
            if let Some((base, (date, build))) = upstream
                .rsplit_once('.')
                .filter(|(base, _)| !base.is_empty())
                .and_then(|(base, tag)| parse_native_build_tag(tag).map(|t| (base, t)))
            {
                version.upstream = base.to_string();
                version.build_date = Some(date);
                version.build = build;
            }
            return Ok(version);
        }

        match raw_debian
            .split_once('.')
            .and_then(|(debian, tag)| parse_build_tag(tag).map(|t| (debian, t)))
        {
            Some((debian, (date, build))) => {
                version.debian = debian.to_string();
                version.build_date = Some(date);
                version.build = build;
            }
            None => version.debian = raw_debian.to_string(),
        }

        Ok(version)
    }

    /// Render the version, optionally leaving out the epoch.
    ///
    /// Package file names never carry the epoch, so artifact lookups use
    /// `render(false)`.
    pub fn render(&self, include_epoch: bool) -> String {
        let mut v = String::new();
        if include_epoch && self.epoch > 0 {
            v.push_str(&format!("{}:", self.epoch));
        }
        v.push_str(&self.source_part());

        if let Some(date) = self.build_date {
            v.push_str(&format!(".{:08}", date));
            if self.build > 0 {
                v.push_str(&format!("build{}", self.build));
            }
        }
        v
    }

    /// The version without its build tag, as found in the source changelog.
    pub fn source(&self) -> String {
        let mut v = String::new();
        if self.epoch > 0 {
            v.push_str(&format!("{}:", self.epoch));
        }
        v.push_str(&self.source_part());
        v
    }

    fn source_part(&self) -> String {
        if self.debian.is_empty() {
            self.upstream.clone()
        } else {
            format!("{}-{}", self.upstream, self.debian)
        }
    }

    /// Tag the version as an automated build made on `today`.
    pub fn add_build_tag(&mut self, today: u32) -> &mut Self {
        self.build_date = Some(today);
        self
    }

    /// Move to the next build slot for `today`.
    pub fn increment(&mut self, today: u32) -> &mut Self {
        if self.build_date == Some(today) {
            self.build += 1;
        } else {
            self.build_date = Some(today);
            self.build = 0;
        }
        self
    }
}

/// Parse a `YYYYMMDD[buildN]` tag. The eight-digit prefix is mandatory.
fn parse_build_tag(tag: &str) -> Option<(u32, u32)> {
    let date = tag
        .get(..8)
        .filter(|d| d.bytes().all(|b| b.is_ascii_digit()))?;

    let build = tag
        .rfind("build")
        .map(|i| &tag[i + "build".len()..])
        .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);

    Some((date.parse().ok()?, build))
}

/// Parse a tag that makes up the whole of the last upstream component:
/// exactly `YYYYMMDD` or `YYYYMMDDbuildN`.
fn parse_native_build_tag(tag: &str) -> Option<(u32, u32)> {
    let (date, build) = match tag.split_once("build") {
        Some((date, n)) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => {
            (date, n.parse().ok()?)
        }
        Some(_) => return None,
        None => (tag, 0),
    };
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((date.parse().ok()?, build))
}

/// Compare two version fragments (upstream or debian revision).
///
/// Fragments are split into alternating non-digit and digit runs. Digit runs
/// compare numerically. In non-digit runs `~` sorts before the end of the
/// run, the end of the run before anything else, non-letters before letters.
fn compare_fragment(a: &str, b: &str) -> Ordering {
    let mut a = a.as_bytes();
    let mut b = b.as_bytes();

    while !a.is_empty() || !b.is_empty() {
        loop {
            let ca = a.first().copied().filter(|c| !c.is_ascii_digit());
            let cb = b.first().copied().filter(|c| !c.is_ascii_digit());
            if ca.is_none() && cb.is_none() {
                break;
            }

            match weight(ca).cmp(&weight(cb)) {
                Ordering::Equal => {
                    // Weights are unique per byte, so both sides hold the same byte
                    a = &a[1..];
                    b = &b[1..];
                }
                ord => return ord,
            }
        }

        let (digits_a, rest_a) = split_digits(a);
        let (digits_b, rest_b) = split_digits(b);
        match compare_numeric(digits_a, digits_b) {
            Ordering::Equal => {
                a = rest_a;
                b = rest_b;
            }
            ord => return ord,
        }
    }

    Ordering::Equal
}

fn weight(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(b'~') => -1,
        Some(c) if c.is_ascii_alphabetic() => 256 + c as i32,
        Some(c) => 1 + c as i32,
    }
}

fn split_digits(s: &[u8]) -> (&[u8], &[u8]) {
    let end = s.iter().position(|c| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn compare_numeric(a: &[u8], b: &[u8]) -> Ordering {
    let trim = |s: &[u8]| -> usize { s.iter().position(|&c| c != b'0').unwrap_or(s.len()) };
    let a = &a[trim(a)..];
    let b = &b[trim(b)..];
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

impl Ord for PkgVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_fragment(&self.upstream, &other.upstream))
            .then_with(|| compare_fragment(&self.debian, &other.debian))
            .then_with(|| self.build_date.cmp(&other.build_date))
            .then_with(|| self.build.cmp(&other.build))
    }
}

impl PartialOrd for PkgVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PkgVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PkgVersion {}

impl fmt::Display for PkgVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(true))
    }
}

impl FromStr for PkgVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PkgVersion::parse(s)
    }
}

impl TryFrom<&str> for PkgVersion {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        PkgVersion::parse(s)
    }
}
