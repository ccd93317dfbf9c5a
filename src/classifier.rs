//! Specifier classification. Normalizes a raw import string and decides how
//! resolution should proceed.

use crate::policy::{PolicyDecision, POLICY};
use std::collections::BTreeSet;

/// The classifier's verdict for a single specifier seen during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Relative or absolute; pass through to the backend's default resolver.
    PassThrough,
    /// Matched `ignoreModules`; substitute an empty-exports stub.
    Stub,
    /// On the deny list. Carries the policy's decision so the caller can
    /// render an alternative.
    Forbidden(PolicyDecision),
    /// A runtime-builtin stub from the policy.
    AllowedBuiltinStub,
    /// A bare specifier the classifier defers to backend/node resolution.
    Bare,
}

/// A hint the backend plugin attaches to a resolve callback: whether the
/// specifier was only ever referenced in a type-only import, which must
/// bypass the forbidden/allowed-builtin checks entirely (erased at compile
/// time, so it never exists in the bundled runtime graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseableHint(pub bool);

/// Normalizes and classifies a raw import string against the determinism
/// policy.
pub fn classify(specifier: &str, ignore_modules: &BTreeSet<String>, eraseable: EraseableHint) -> Classification {
    if is_relative_or_absolute(specifier) {
        return Classification::PassThrough;
    }

    let normalized = crate::policy::DeterminismPolicy::normalize(specifier);

    if ignore_modules.contains(&normalized) || ignore_modules.contains(specifier) {
        return Classification::Stub;
    }

    if eraseable.0 {
        return Classification::Bare;
    }

    match POLICY.classify(specifier) {
        PolicyDecision::Forbidden(alt) => Classification::Forbidden(PolicyDecision::Forbidden(alt)),
        PolicyDecision::AllowedStub => Classification::AllowedBuiltinStub,
        PolicyDecision::Allowed => Classification::Bare,
    }
}

fn is_relative_or_absolute(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
        || is_windows_absolute(specifier)
}

fn is_windows_absolute(specifier: &str) -> bool {
    let bytes = specifier.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && (bytes[2] == b'\\' || bytes[2] == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ignore(modules: &[&str]) -> BTreeSet<String> {
        modules.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn relative_and_absolute_pass_through() {
        assert_eq!(classify("./foo", &ignore(&[]), EraseableHint(false)), Classification::PassThrough);
        assert_eq!(classify("../foo", &ignore(&[]), EraseableHint(false)), Classification::PassThrough);
        assert_eq!(classify("/abs/foo", &ignore(&[]), EraseableHint(false)), Classification::PassThrough);
    }

    #[test]
    fn ignored_module_becomes_stub() {
        assert_eq!(classify("fs", &ignore(&["fs"]), EraseableHint(false)), Classification::Stub);
    }

    #[test]
    fn forbidden_module_is_rejected() {
        assert!(matches!(classify("node:fs", &ignore(&[]), EraseableHint(false)), Classification::Forbidden(_)));
    }

    #[test]
    fn eraseable_bypasses_forbidden_and_stub_checks() {
        assert_eq!(classify("fs", &ignore(&[]), EraseableHint(true)), Classification::Bare);
    }

    #[test]
    fn allowed_builtin_becomes_stub() {
        assert_eq!(classify("path", &ignore(&[]), EraseableHint(false)), Classification::AllowedBuiltinStub);
    }

    #[test]
    fn bare_package_defers() {
        assert_eq!(classify("lodash", &ignore(&[]), EraseableHint(false)), Classification::Bare);
    }
}
