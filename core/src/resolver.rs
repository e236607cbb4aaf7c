use crate::types::{Dependency, DependencyCheck, PackageInfo, UpdateSeverity};
use crate::version::{Version, VersionSpec};

/// Compares a declared dependency against what the registry offers
///
/// This is a direct check per dependency: no transitive resolution and no
/// backtracking. The constraint only decides which release is "in range".
#[derive(Debug, Default, Clone, Copy)]
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve one dependency against its registry info
    pub fn resolve(
        &self,
        dependency: &Dependency,
        info: &PackageInfo,
        installed: Option<&Version>,
    ) -> DependencyCheck {
        let spec = &dependency.version_spec;
        let current = installed.or_else(|| spec.base_version());
        let in_range = Self::latest_in_range(spec, &info.versions, installed);

        let target = current.and_then(|current| {
            [in_range.as_ref(), Some(&info.latest)]
                .into_iter()
                .flatten()
                .find(|candidate| *candidate > current)
                .cloned()
        });

        let severity = match (current, &target) {
            (Some(current), Some(target)) => Some(UpdateSeverity::between(current, target)),
            _ => None,
        };

        let rewritable = spec.is_rewritable();
        let target_spec = target
            .as_ref()
            .filter(|_| rewritable)
            .map(|t| spec.with_version(t));
        let force_spec = current
            .filter(|current| rewritable && info.latest > **current)
            .map(|_| spec.with_version(&info.latest));

        DependencyCheck {
            dependency: dependency.clone(),
            installed: installed.cloned(),
            in_range,
            latest: info.latest.clone(),
            target,
            target_spec,
            severity,
            force_spec,
        }
    }

    /// Highest available version the constraint accepts
    ///
    /// Open-ended constraints (`>=`, `>`, pins and no constraint at all)
    /// stay within the anchor major, so crossing a major is only ever
    /// proposed as the "latest" fallback.
    fn latest_in_range(
        spec: &VersionSpec,
        versions: &[Version],
        installed: Option<&Version>,
    ) -> Option<Version> {
        let pinned = matches!(spec, VersionSpec::Pinned(_));
        let anchor = if pinned || !spec.has_upper_bound() {
            match (spec.base_version(), installed) {
                (Some(base), Some(installed)) => Some(base.major.max(installed.major)),
                (Some(base), None) => Some(base.major),
                (None, Some(installed)) => Some(installed.major),
                (None, None) => None,
            }
        } else {
            None
        };

        versions
            .iter()
            .filter(|v| pinned || spec.satisfies(v))
            .filter(|v| anchor.is_none_or(|major| v.major == major))
            .max()
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::str::FromStr;

    fn v(s: &str) -> Version {
        Version::from_str(s).unwrap()
    }

    fn dep(name: &str, spec: &str) -> Dependency {
        Dependency::new(
            name,
            spec,
            VersionSpec::parse(spec).unwrap(),
            PathBuf::from("requirements.txt"),
            1,
            format!("{name}{spec}"),
        )
    }

    fn info(name: &str, versions: &[&str]) -> PackageInfo {
        PackageInfo::from_versions(name, versions.iter().map(|s| v(s)).collect()).unwrap()
    }

    #[test]
    fn test_pinned_prefers_same_major() {
        let check = DependencyResolver::new().resolve(
            &dep("requests", "==2.28.0"),
            &info("requests", &["2.28.0", "2.31.0", "2.32.3", "3.0.0"]),
            None,
        );
        assert_eq!(check.in_range, Some(v("2.32.3")));
        assert_eq!(check.target, Some(v("2.32.3")));
        assert_eq!(check.severity, Some(UpdateSeverity::Minor));
        assert_eq!(check.target_spec.as_ref().unwrap().to_string(), "==2.32.3");
        assert_eq!(check.force_spec.as_ref().unwrap().to_string(), "==3.0.0");
        assert!(check.has_newer_available());
    }

    #[test]
    fn test_falls_back_to_latest_across_major() {
        let check = DependencyResolver::new().resolve(
            &dep("django", ">=3.2,<4"),
            &info("django", &["3.2", "4.2.1", "5.0.0"]),
            None,
        );
        assert_eq!(check.in_range, Some(v("3.2")));
        assert_eq!(check.target, Some(v("5.0.0")));
        assert_eq!(check.severity, Some(UpdateSeverity::Major));
        assert_eq!(check.target_spec.unwrap().to_string(), ">=5.0.0,<6.0.0");
    }

    #[test]
    fn test_up_to_date_has_no_target() {
        let check = DependencyResolver::new().resolve(
            &dep("flask", ">=2.3.3"),
            &info("flask", &["2.0.0", "2.3.3"]),
            None,
        );
        assert!(!check.has_update());
        assert!(check.severity.is_none());
        assert!(check.force_spec.is_none());
    }

    #[test]
    fn test_installed_version_is_current() {
        let check = DependencyResolver::new().resolve(
            &dep("numpy", ">=1.20"),
            &info("numpy", &["1.20.0", "1.26.4", "2.1.0"]),
            Some(&v("1.26.4")),
        );
        assert_eq!(check.current_version(), Some(&v("1.26.4")));
        assert_eq!(check.target, Some(v("2.1.0")));
        assert_eq!(check.severity, Some(UpdateSeverity::Major));
    }

    #[test]
    fn test_never_proposes_older_than_installed() {
        let check = DependencyResolver::new().resolve(
            &dep("attrs", "^22.0"),
            &info("attrs", &["22.1.0", "22.2.0"]),
            Some(&v("23.1.0")),
        );
        assert!(check.target.is_none());
    }

    #[test]
    fn test_any_without_installed_has_no_target() {
        let check = DependencyResolver::new().resolve(
            &dep("rich", ""),
            &info("rich", &["13.0.0", "13.7.1"]),
            None,
        );
        assert!(check.target.is_none());
        assert!(check.target_spec.is_none());
    }

    #[test]
    fn test_any_with_installed_stays_in_major() {
        let check = DependencyResolver::new().resolve(
            &dep("rich", "*"),
            &info("rich", &["12.6.0", "13.0.0"]),
            Some(&v("12.5.0")),
        );
        assert_eq!(check.in_range, Some(v("12.6.0")));
        assert_eq!(check.target, Some(v("12.6.0")));
        assert!(check.target_spec.is_none());
    }

    #[test]
    fn test_caret_range_patch() {
        let check = DependencyResolver::new().resolve(
            &dep("black", "^23.1.0"),
            &info("black", &["23.1.0", "23.1.2", "24.1.0"]),
            Some(&v("23.1.0")),
        );
        assert_eq!(check.in_range, Some(v("23.1.2")));
        assert_eq!(check.severity, Some(UpdateSeverity::Patch));
        assert_eq!(check.target_spec.unwrap().to_string(), "^23.1.2");
        assert_eq!(check.force_spec.unwrap().to_string(), "^24.1.0");
    }
}
