//! Bundle validator: structural and semantic-version checks over a produced
//! or loaded bundle. Version comparison uses `semver`.

use crate::bundle::{WorkflowBundle, WorkflowBundleMetadata};
use crate::shim;
use semver::Version;

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metadata: Option<WorkflowBundleMetadata>,
}

pub struct ValidatorOptions {
    pub expected_sdk_version: Option<Version>,
    pub expected_bundler_version: Option<Version>,
    pub strict: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self { expected_sdk_version: None, expected_bundler_version: None, strict: false }
    }
}

pub fn validate(bundle: &WorkflowBundle, options: &ValidatorOptions) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if !shim::validate_shimmed_output(&bundle.code) {
        errors.push(format!(
            "bundle is missing required identifiers `{}`/`{}`",
            shim::MODULE_CACHE_GLOBAL,
            shim::NAMESPACE_GLOBAL
        ));
    }

    let Some(metadata) = &bundle.metadata else {
        warnings.push("validation skipped: bundle has no metadata".to_string());
        return ValidationReport { valid: errors.is_empty(), errors, warnings, metadata: None };
    };

    check_version(
        "sdk",
        metadata.sdk_version.as_deref(),
        options.expected_sdk_version.as_ref(),
        options.strict,
        &mut errors,
        &mut warnings,
    );

    check_version(
        "bundler",
        Some(metadata.bundler_version.as_str()),
        options.expected_bundler_version.as_ref(),
        options.strict,
        &mut errors,
        &mut warnings,
    );

    ValidationReport { valid: errors.is_empty(), errors, warnings, metadata: Some(metadata.clone()) }
}

fn check_version(
    label: &str,
    found: Option<&str>,
    expected: Option<&Version>,
    strict: bool,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    let (Some(found), Some(expected)) = (found, expected) else { return };
    let Ok(found) = Version::parse(found) else {
        warnings.push(format!("{label} version `{found}` is not a valid semver string"));
        return;
    };

    if found.major != expected.major || found.minor != expected.minor {
        let message = format!(
            "{label} version mismatch: found {found} ({}.{}), expected {expected} ({}.{})",
            found.major, found.minor, expected.major, expected.minor
        );
        if strict {
            errors.push(message);
        } else {
            warnings.push(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::BackendKind;

    fn bundle_with(sdk_version: &str) -> WorkflowBundle {
        WorkflowBundle {
            code: format!("(function(){{global.{}={{}};global.{}={{}};}})();", shim::MODULE_CACHE_GLOBAL, shim::NAMESPACE_GLOBAL),
            source_map: None,
            metadata: Some(WorkflowBundleMetadata {
                timestamp_ms: 0,
                backend: BackendKind::E,
                entry_hash: "a".repeat(16),
                bundler_version: "0.1.0".into(),
                sdk_version: Some(sdk_version.into()),
                ignored_modules: vec![],
                warnings: vec![],
            }),
        }
    }

    #[test]
    fn bundle_without_metadata_is_valid_with_a_warning() {
        let bundle = WorkflowBundle {
            code: format!("{}{}", shim::MODULE_CACHE_GLOBAL, shim::NAMESPACE_GLOBAL),
            source_map: None,
            metadata: None,
        };
        let report = validate(&bundle, &ValidatorOptions::default());
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn sdk_mismatch_is_warning_unless_strict() {
        let bundle = bundle_with("1.9.0");
        let expected = Version::parse("1.10.0").unwrap();

        let lenient = validate(
            &bundle,
            &ValidatorOptions { expected_sdk_version: Some(expected.clone()), ..Default::default() },
        );
        assert!(lenient.valid);
        assert_eq!(lenient.warnings.len(), 1);

        let strict = validate(
            &bundle,
            &ValidatorOptions { expected_sdk_version: Some(expected), strict: true, ..Default::default() },
        );
        assert!(!strict.valid);
        assert_eq!(strict.errors.len(), 1);
    }

    #[test]
    fn structural_failure_is_always_an_error() {
        let bundle = WorkflowBundle { code: "broken".into(), source_map: None, metadata: None };
        let report = validate(&bundle, &ValidatorOptions::default());
        assert!(!report.valid);
    }
}
