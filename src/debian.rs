//! Debian source package metadata: `debian/changelog`, `debian/control`
//! and package file names.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use regex::Regex;

use crate::error::{Error, Result};

/// Version of the topmost entry for `package` in a changelog.
pub fn changelog_version(changelog: &str, package: &str) -> Result<String> {
    let pattern = format!(r"(?m)^{} \(([^)]+)\) .+;", regex::escape(package));
    let re = Regex::new(&pattern).map_err(|e| Error::parse(pattern.clone(), e.to_string()))?;

    re.captures(changelog)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .ok_or_else(|| {
            Error::parse(
                "debian/changelog",
                format!("no version entry for '{}'", package),
            )
        })
}

/// Changelog entry recorded for an automated rebuild.
#[derive(Debug, Clone)]
pub struct RebuildEntry<'a> {
    pub package: &'a str,
    pub version: &'a str,
    pub distribution: &'a str,
    pub revision: &'a str,
    pub maintainer: &'a str,
    pub date: DateTime<FixedOffset>,
}

impl RebuildEntry<'_> {
    pub fn render(&self) -> String {
        let short_rev: String = self.revision.chars().take(7).collect();
        format!(
            "{} ({}) {}; urgency=low\n\n  * Package rebuilt, updated to revision {}.\n\n -- {}  {}\n\n",
            self.package,
            self.version,
            self.distribution,
            short_rev,
            self.maintainer,
            self.date.format("%a, %-d %b %Y %T %z")
        )
    }

    /// The changelog with this entry on top.
    pub fn prepend_to(&self, changelog: &str) -> String {
        let mut updated = self.render();
        updated.push_str(changelog);
        updated
    }
}

/// The fields of `debian/control` a build needs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControlFile {
    pub source: String,
    /// Binary packages, in declaration order
    pub packages: Vec<String>,
    /// Union of the `Architecture:` values of the binary packages
    pub architectures: Vec<String>,
}

impl ControlFile {
    pub fn parse(input: &str) -> Result<Self> {
        let paragraphs = parse_paragraphs(input)?;
        let mut paragraphs = paragraphs.into_iter();

        let source = paragraphs
            .next()
            .and_then(|mut p| p.remove("Source"))
            .ok_or_else(|| Error::parse("debian/control", "missing Source field"))?;

        let mut control = ControlFile {
            source,
            ..Default::default()
        };

        for mut paragraph in paragraphs {
            if let Some(name) = paragraph.remove("Package") {
                control.packages.push(name);
            }
            for arch in paragraph
                .get("Architecture")
                .map(|a| a.split_whitespace())
                .into_iter()
                .flatten()
            {
                if !control.architectures.iter().any(|a| a == arch) {
                    control.architectures.push(arch.to_string());
                }
            }
        }

        if control.packages.is_empty() {
            return Err(Error::parse("debian/control", "no binary packages"));
        }
        Ok(control)
    }
}

/// Parse deb822 text into one field map per paragraph.
///
/// Comment lines are dropped and runs of blank lines collapsed before the
/// text is handed to the parser.
pub fn parse_paragraphs(input: &str) -> Result<Vec<BTreeMap<String, String>>> {
    let mut cleaned = String::with_capacity(input.len());
    let mut previous_blank = true;
    for line in input.lines() {
        if line.starts_with('#') {
            continue;
        }
        let blank = line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        cleaned.push_str(if blank { "" } else { line });
        cleaned.push('\n');
        previous_blank = blank;
    }
    let cleaned = cleaned.trim_end().to_string() + "\n";

    let paragraphs =
        debcontrol::parse_str(&cleaned).map_err(|e| Error::parse("control data", e.to_string()))?;

    Ok(paragraphs
        .into_iter()
        .map(|p| {
            p.fields
                .into_iter()
                .map(|f| (f.name.to_string(), f.value.trim().to_string()))
                .collect()
        })
        .collect())
}

/// Binary package name of a `.deb` file: `name_version_arch.deb` -> `name`.
pub fn binary_name(file_name: &str) -> String {
    file_name
        .split('_')
        .next()
        .unwrap_or(file_name)
        .trim_end_matches(".deb")
        .to_string()
}

/// Whether `file_name` is a package built for `binary` at `version`.
///
/// `version` is rendered without its epoch, as in package file names.
pub fn is_package_file(file_name: &str, binary: &str, version: &str) -> bool {
    file_name.starts_with(&format!("{}_{}", binary, version)) && file_name.ends_with(".deb")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CHANGELOG: &str = "\
widget (1.2-3) unstable; urgency=low

  * Fixed things

 -- Someone <someone@example.com>  Mon, 1 Jan 2024 10:00:00 +0000

widget (1.2-2) unstable; urgency=low

  * Older
";

    const CONTROL: &str = "\
Source: widget
Section: admin
Priority: optional
Maintainer: Someone <someone@example.com>
Build-Depends: debhelper (>= 9),
 python
# generated, do not edit
Standards-Version: 3.9.4


Package: widget
Architecture: all
Depends: python
Description: Updater
 Updates things.

Package: widget-daemon
Architecture: armhf amd64
Description: Daemon
";

    #[test]
    fn test_changelog_version() {
        assert_eq!(changelog_version(CHANGELOG, "widget").unwrap(), "1.2-3");
    }

    #[test]
    fn test_changelog_version_other_package() {
        assert!(matches!(
            changelog_version(CHANGELOG, "wid"),
            Err(Error::Parse { .. })
        ));
        assert!(changelog_version("", "widget").is_err());
    }

    #[test]
    fn test_changelog_version_escapes_name() {
        let changelog = "libc++ (2.0) unstable; urgency=low\n";
        assert_eq!(changelog_version(changelog, "libc++").unwrap(), "2.0");
    }

    #[test]
    fn test_rebuild_entry() {
        let date = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 5, 9, 30, 0)
            .unwrap();
        let entry = RebuildEntry {
            package: "widget",
            version: "1.2-3.20240105",
            distribution: "unstable",
            revision: "0123456789abcdef",
            maintainer: "Builder <builder@example.com>",
            date,
        };

        let updated = entry.prepend_to(CHANGELOG);
        assert!(updated.starts_with(
            "widget (1.2-3.20240105) unstable; urgency=low\n\n  \
             * Package rebuilt, updated to revision 0123456.\n\n \
             -- Builder <builder@example.com>  Fri, 5 Jan 2024 09:30:00 +0000\n\n\
             widget (1.2-3)"
        ));
        assert_eq!(
            changelog_version(&updated, "widget").unwrap(),
            "1.2-3.20240105"
        );
    }

    #[test]
    fn test_control_file() {
        let control = ControlFile::parse(CONTROL).unwrap();
        assert_eq!(control.source, "widget");
        assert_eq!(
            control.packages,
            vec!["widget".to_string(), "widget-daemon".to_string()]
        );
        assert_eq!(
            control.architectures,
            vec!["all".to_string(), "armhf".to_string(), "amd64".to_string()]
        );
    }

    #[test]
    fn test_control_file_without_source() {
        let err = ControlFile::parse("Package: foo\nArchitecture: any\n").unwrap_err();
        assert!(err.to_string().contains("Source"));
    }

    #[test]
    fn test_binary_name() {
        assert_eq!(binary_name("widget_1.2-3_all.deb"), "widget");
        assert_eq!(binary_name("odd.deb"), "odd");
    }

    #[test]
    fn test_is_package_file() {
        assert!(is_package_file(
            "foo_1.0-1.20240101_armhf.deb",
            "foo",
            "1.0-1.20240101"
        ));
        assert!(!is_package_file(
            "foo-dev_1.0-1.20240101_armhf.deb",
            "foo",
            "1.0-1.20240101"
        ));
        assert!(!is_package_file("foo_1.0-1.20240101_armhf.dsc", "foo", "1.0-1.20240101"));
    }
}
