//! Derived forms of service, target and test names
//!
//! Names end up in directory names (`work/<case>`, `build/<target>`,
//! `services/<service>.log`) and in environment variables
//! (`FULLSTACK_<SERVICE>_HOST`, `FULLSTACK_ARTIFACT_<ID>`). Validation makes
//! sure no name escapes its directory and no two names share a derived form.

use crate::{ConfigError, ConfigResult};
use std::collections::HashMap;

/// Environment-variable form of a name (`app.wasm` -> `APP_WASM`)
pub fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// File-name form of a name (`web/ui bundle` -> `web_ui_bundle`)
pub fn file_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Reject names that are empty or that would not stay a single path component
pub(crate) fn check_name(field: &str, name: &str) -> ConfigResult<()> {
    if name.trim().is_empty() {
        return Err(ConfigError::invalid(field, "name cannot be empty"));
    }
    if name == "." || name == ".." {
        return Err(ConfigError::invalid(
            field,
            format!("'{}' is not a valid name", name),
        ));
    }
    if name.contains(|c: char| matches!(c, '/' | '\\' | '\0')) {
        return Err(ConfigError::invalid(
            field,
            format!("'{}' cannot contain path separators", name),
        ));
    }
    Ok(())
}

/// Reject distinct names that map to the same `key`
pub(crate) fn ensure_distinct<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
    key: impl Fn(&str) -> String,
) -> ConfigResult<()> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for name in names {
        let derived = key(name);
        match seen.get(derived.as_str()) {
            Some(first) if *first != name => {
                return Err(ConfigError::NameCollision {
                    kind,
                    first: first.to_string(),
                    second: name.to_string(),
                    key: derived,
                });
            }
            Some(_) => {}
            None => {
                seen.insert(derived, name);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_env_key() {
        assert_eq!(env_key("app.wasm"), "APP_WASM");
        assert_eq!(env_key("db-main"), "DB_MAIN");
    }

    #[test]
    fn test_file_key() {
        assert_eq!(file_key("app.wasm"), "app.wasm");
        assert_eq!(file_key("web/ui bundle"), "web_ui_bundle");
    }

    #[rstest]
    #[case("smoke", true)]
    #[case("api.login-v2", true)]
    #[case("...", true)]
    #[case("", false)]
    #[case("  ", false)]
    #[case(".", false)]
    #[case("..", false)]
    #[case("a/b", false)]
    #[case("..\\up", false)]
    fn test_check_name(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(check_name("test.id", name).is_ok(), valid);
    }

    #[test]
    fn test_colliding_names_rejected() {
        let err = ensure_distinct("service", ["db-main", "db_main"].into_iter(), env_key)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::NameCollision { kind: "service", ref key, .. } if key == "DB_MAIN"
        ));
    }

    #[test]
    fn test_repeated_name_is_not_a_collision() {
        assert!(ensure_distinct("test", ["a", "a", "b"].into_iter(), file_key).is_ok());
    }
}
