//! Pinned identities for the sample packages used as build fixtures.
//!
//! Each entry records the sdist checksums expected from a reproducible build,
//! keyed by interpreter line and by whether `SOURCE_DATE_EPOCH` was forced.
//! Packages that have not been pinned yet carry `None`, which callers treat
//! as "do not assert".

use serde::Serialize;

/// Fixed build timestamp used when a test asserts bit-for-bit reproducibility.
pub const SOURCE_DATE_EPOCH: &str = "12345";

/// Interpreter lines whose sdist output differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PythonBucket {
    Py38,
    Py39Plus,
}

impl PythonBucket {
    pub fn from_version(major: u32, minor: u32) -> Self {
        if (major, minor) < (3, 9) {
            Self::Py38
        } else {
            Self::Py39Plus
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildTimestamp {
    /// Whatever the build backend picks when `SOURCE_DATE_EPOCH` is unset.
    Default,
    /// `SOURCE_DATE_EPOCH` forced to [`SOURCE_DATE_EPOCH`].
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageInfo {
    pub name: &'static str,
    pub sdist_hash38: Option<&'static str>,
    pub sdist_hash39: Option<&'static str>,
    pub sdist_dated_hash39: Option<&'static str>,
    pub sdist_dated_hash38: Option<&'static str>,
}

impl PackageInfo {
    pub const fn unpinned(name: &'static str) -> Self {
        Self {
            name,
            sdist_hash38: None,
            sdist_hash39: None,
            sdist_dated_hash39: None,
            sdist_dated_hash38: None,
        }
    }

    /// Looks up a registry entry by fixture name.
    pub fn lookup(name: &str) -> Option<&'static PackageInfo> {
        REGISTRY.iter().find(|package| package.name == name)
    }

    pub fn sdist_hash(&self, bucket: PythonBucket) -> Option<&'static str> {
        match bucket {
            PythonBucket::Py38 => self.sdist_hash38,
            PythonBucket::Py39Plus => self.sdist_hash39,
        }
    }

    pub fn sdist_dated_hash(&self, bucket: PythonBucket) -> Option<&'static str> {
        match bucket {
            PythonBucket::Py38 => self.sdist_dated_hash38,
            PythonBucket::Py39Plus => self.sdist_dated_hash39,
        }
    }

    /// The one checksum that applies to a build under the given conditions.
    pub fn expected_sdist_hash(
        &self,
        bucket: PythonBucket,
        timestamp: BuildTimestamp,
    ) -> Option<&'static str> {
        match timestamp {
            BuildTimestamp::Default => self.sdist_hash(bucket),
            BuildTimestamp::Fixed => self.sdist_dated_hash(bucket),
        }
    }

    pub fn source_date_epoch(&self) -> &'static str {
        SOURCE_DATE_EPOCH
    }

    pub fn is_pinned(&self) -> bool {
        self.sdist_hash38.is_some()
            || self.sdist_hash39.is_some()
            || self.sdist_dated_hash39.is_some()
            || self.sdist_dated_hash38.is_some()
    }
}

static REGISTRY: [PackageInfo; 5] = [
    PackageInfo {
        name: "simple_pyproject_ext",
        sdist_hash38: Some("f1b86c7fbcc70ed82786fd3446caf880091096b7d6c0085eab8fe64466b95c4f"),
        sdist_hash39: Some("463bdfcfad8b71a0f2b48b7b5abea191c9073170326183c04b7f23da19d6b61b"),
        sdist_dated_hash39: Some(
            "aa1f2cd959998cb58316f72526ad7b2d3078bf47d00c5c9f8903d9b5980c0e35",
        ),
        sdist_dated_hash38: Some(
            "9e4713843829659b4862e73c8a9ae783178d620a78fed1f757efb82ea77ff82f",
        ),
    },
    PackageInfo::unpinned("simple_setuptools_ext"),
    PackageInfo::unpinned("filepath_pure"),
    PackageInfo::unpinned("dynamic_metadata"),
    PackageInfo::unpinned("simplest_c"),
];

pub fn known_packages() -> &'static [PackageInfo] {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_splits_at_three_nine() {
        assert_eq!(PythonBucket::from_version(3, 8), PythonBucket::Py38);
        assert_eq!(PythonBucket::from_version(3, 9), PythonBucket::Py39Plus);
        assert_eq!(PythonBucket::from_version(3, 13), PythonBucket::Py39Plus);
        assert_eq!(PythonBucket::from_version(2, 7), PythonBucket::Py38);
    }

    #[test]
    fn simple_pyproject_ext_selects_pinned_hashes() {
        let package = PackageInfo::lookup("simple_pyproject_ext").expect("registered");
        let default = package
            .expected_sdist_hash(PythonBucket::Py39Plus, BuildTimestamp::Default)
            .expect("default hash");
        let dated = package
            .expected_sdist_hash(PythonBucket::Py39Plus, BuildTimestamp::Fixed)
            .expect("dated hash");
        assert!(default.starts_with("463bdfcf"));
        assert!(dated.starts_with("aa1f2cd9"));
        assert!(package
            .expected_sdist_hash(PythonBucket::Py38, BuildTimestamp::Default)
            .is_some_and(|hash| hash.starts_with("f1b86c7f")));
        assert!(package
            .expected_sdist_hash(PythonBucket::Py38, BuildTimestamp::Fixed)
            .is_some_and(|hash| hash.starts_with("9e471384")));
        assert_eq!(package.source_date_epoch(), "12345");
    }

    #[test]
    fn unpinned_packages_have_no_expectation() {
        let package = PackageInfo::lookup("simple_setuptools_ext").expect("registered");
        assert!(!package.is_pinned());
        for bucket in [PythonBucket::Py38, PythonBucket::Py39Plus] {
            for timestamp in [BuildTimestamp::Default, BuildTimestamp::Fixed] {
                assert_eq!(package.expected_sdist_hash(bucket, timestamp), None);
            }
        }
    }

    #[test]
    fn lookup_unknown_package_is_none() {
        assert!(PackageInfo::lookup("not_a_fixture").is_none());
        assert_eq!(known_packages().len(), 5);
    }

    #[test]
    fn serializes_absent_hashes_as_null() {
        let package = PackageInfo::lookup("simplest_c").expect("registered");
        let value = serde_json::to_value(package).expect("serialize");
        assert_eq!(value["name"], "simplest_c");
        assert!(value["sdist_hash39"].is_null());
    }
}
