//! Content-based hashing for run IDs.

use sha2::{Digest, Sha256};

/// Run id from the scenario definition, run settings, and solver version.
/// Identical inputs hash to the same id, enabling skip-if-cached runs.
pub fn compute_run_id<S: serde::Serialize, R: serde::Serialize>(
    scenario: &S,
    settings: &R,
    solver_version: &str,
) -> String {
    let mut hasher = Sha256::new();

    let scenario_json = serde_json::to_string(scenario).unwrap_or_default();
    hasher.update(scenario_json.as_bytes());

    let settings_json = serde_json::to_string(settings).unwrap_or_default();
    hasher.update(settings_json.as_bytes());

    hasher.update(solver_version.as_bytes());

    let result = hasher.finalize();
    format!("{:x}", result)
}
