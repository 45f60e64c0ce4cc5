//! Domain loading (`domain.toml`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::domain::Domain;

/// Load a domain from a TOML file.
///
/// If the file is missing, returns an empty domain: only the built-in
/// actions and responses are available.
pub fn load_domain(path: &Path) -> Result<Domain> {
    if !path.exists() {
        return Ok(Domain::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn load_missing_returns_empty_domain() {
        let temp = tempfile::tempdir().expect("tempdir");
        let domain = load_domain(&temp.path().join("domain.toml")).expect("load");
        assert_eq!(domain, Domain::default());
    }

    #[test]
    fn loads_actions_and_slots() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("domain.toml");
        fs::write(
            &path,
            "actions = [\"utter_confirm\"]\n\n[slots.amount]\ninitial_value = 10\n",
        )
        .expect("write");
        let domain = load_domain(&path).expect("load");
        assert_eq!(domain.actions, vec!["utter_confirm".to_string()]);
        assert_eq!(domain.slots["amount"].initial_value, json!(10));
    }

    #[test]
    fn malformed_domain_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("domain.toml");
        fs::write(&path, "actions = 3\n").expect("write");
        let err = load_domain(&path).expect_err("invalid domain");
        assert!(err.to_string().contains("parse"));
    }
}
