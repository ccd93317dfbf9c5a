//! The determinism policy: the authoritative catalog of forbidden runtime
//! modules, allowed runtime-builtin stubs, and replay-safe alternatives.
//! Built once as a process-wide constant.

use crate::error::Alternative;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// The result of classifying a bare specifier against the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Not mentioned by the policy; resolution proceeds normally.
    Allowed,
    /// A runtime-builtin the Worker provides; bundle as an empty-exports stub.
    AllowedStub,
    /// On the deny list; carries a suggested alternative if the policy has one.
    Forbidden(Option<Alternative>),
}

/// The union of forbidden / allowed-builtin / alternatives maps.
pub struct DeterminismPolicy {
    forbidden: &'static [&'static str],
    allowed_builtin: &'static [&'static str],
    alternatives: HashMap<&'static str, Alternative>,
}

fn strip_node_prefix(specifier: &str) -> &str {
    specifier.strip_prefix("node:").unwrap_or(specifier)
}

impl DeterminismPolicy {
    /// Normalizes a specifier the way [`crate::classifier`] does before
    /// consulting the policy: strips the `node:` prefix and any query string.
    pub fn normalize(specifier: &str) -> String {
        let no_query = specifier.split(['?', '#']).next().unwrap_or(specifier);
        strip_node_prefix(no_query).to_lowercase()
    }

    /// Classifies an already-normalized bare specifier.
    ///
    /// Exact match is tried first, then a prefix match (e.g. `fs/promises`
    /// matches the `fs` entry).
    pub fn classify(&self, specifier: &str) -> PolicyDecision {
        let norm = Self::normalize(specifier);

        if self.forbidden.iter().any(|f| *f == norm) || self.matches_prefix(self.forbidden, &norm)
        {
            let alt = self
                .alternatives
                .get(norm.as_str())
                .cloned()
                .or_else(|| self.alternative_by_prefix(&norm));
            return PolicyDecision::Forbidden(alt);
        }

        if self.allowed_builtin.iter().any(|a| *a == norm)
            || self.matches_prefix(self.allowed_builtin, &norm)
        {
            return PolicyDecision::AllowedStub;
        }

        PolicyDecision::Allowed
    }

    fn matches_prefix(&self, table: &[&'static str], norm: &str) -> bool {
        table.iter().any(|entry| norm.starts_with(&format!("{entry}/")))
    }

    fn alternative_by_prefix(&self, norm: &str) -> Option<Alternative> {
        self.alternatives.iter().find(|(k, _)| norm.starts_with(*k)).map(|(_, v)| v.clone())
    }

    pub fn alternative_for(&self, specifier: &str) -> Option<&Alternative> {
        let norm = Self::normalize(specifier);
        self.alternatives.get(norm.as_str())
    }
}

/// The single process-wide policy instance.
pub static POLICY: Lazy<DeterminismPolicy> = Lazy::new(|| {
    let mut alternatives = HashMap::new();
    alternatives.insert(
        "fs",
        Alternative {
            replacement: "no replay-safe filesystem access exists".into(),
            import_from: String::new(),
            reason: "the isolate has no durable filesystem; workflow state must flow through activities".into(),
            example: None,
        },
    );
    alternatives.insert(
        "child_process",
        Alternative {
            replacement: "run the external process from an activity instead".into(),
            import_from: String::new(),
            reason: "subprocess output is not replayable".into(),
            example: None,
        },
    );
    alternatives.insert(
        "net",
        Alternative {
            replacement: "perform network I/O from an activity instead".into(),
            import_from: String::new(),
            reason: "network responses are not deterministic across replays".into(),
            example: None,
        },
    );
    alternatives.insert(
        "http",
        Alternative {
            replacement: "perform network I/O from an activity instead".into(),
            import_from: String::new(),
            reason: "network responses are not deterministic across replays".into(),
            example: None,
        },
    );
    alternatives.insert(
        "crypto",
        Alternative {
            replacement: "workflow.uuid4() / a seeded PRNG".into(),
            import_from: "@temporalio/workflow".into(),
            reason: "crypto.randomBytes is not seeded and breaks replay determinism".into(),
            example: Some("import { uuid4 } from '@temporalio/workflow';".into()),
        },
    );

    DeterminismPolicy {
        forbidden: &[
            "fs", "child_process", "net", "dgram", "tls", "http", "https", "http2",
            "dns", "cluster", "worker_threads", "crypto", "v8", "vm", "inspector",
        ],
        allowed_builtin: &[
            "assert", "buffer", "events", "path", "querystring", "string_decoder", "url",
            "util",
        ],
        alternatives,
    }
});
