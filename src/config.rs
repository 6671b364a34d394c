//! Settings resolved from flags, the environment and `.env`.

use std::env;
use std::path::PathBuf;

/// Variable naming the server address outright.
pub const ADDRESS_VAR: &str = "WMII_ADDRESS";
/// Variable naming the namespace directory holding the server socket.
pub const NAMESPACE_VAR: &str = "NAMESPACE";
/// Variable naming a cassette file to record the session into.
pub const RECORD_VAR: &str = "IXP_RECORD";

/// Where to connect and what to do on the side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Server address, `<transport>!<locator>`.
    pub address: String,
    /// Cassette to record the session into.
    pub record: Option<PathBuf>,
}

impl Settings {
    /// Resolves settings from the process environment after loading `.env`
    /// from the working directory, if present. `address` wins over both.
    #[must_use]
    pub fn from_env(address: Option<&str>) -> Self {
        let _ = dotenvy::dotenv();
        Self::resolve(address, |key| env::var(key).ok())
    }

    /// Resolves settings with `lookup` standing in for the environment.
    /// Empty values count as unset.
    pub fn resolve(address: Option<&str>, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let address = match address {
            Some(address) => address.to_string(),
            None => var(ADDRESS_VAR).unwrap_or_else(|| {
                let namespace = var(NAMESPACE_VAR).unwrap_or_else(|| {
                    let user =
                        var("USER").or_else(|| var("LOGNAME")).unwrap_or_else(|| "none".into());
                    let display = var("DISPLAY").unwrap_or_else(|| ":0".into());
                    let display = display.strip_suffix(".0").unwrap_or(&display);
                    format!("/tmp/ns.{user}.{display}")
                });
                format!("unix!{namespace}/wmii")
            }),
        };

        Self { address, record: var(RECORD_VAR).map(PathBuf::from) }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn resolve(flag: Option<&str>, vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        Settings::resolve(flag, |key| vars.get(key).cloned())
    }

    #[test]
    fn flag_beats_environment() {
        let settings = resolve(Some("mem!a.yaml"), &[(ADDRESS_VAR, "unix!/tmp/other")]);
        assert_eq!(settings.address, "mem!a.yaml");
    }

    #[test]
    fn address_variable_beats_namespace() {
        let settings =
            resolve(None, &[(ADDRESS_VAR, "tcp!wm!564"), (NAMESPACE_VAR, "/tmp/ns.x")]);
        assert_eq!(settings.address, "tcp!wm!564");
    }

    #[test]
    fn namespace_variable_is_used_as_is() {
        let settings = resolve(None, &[(NAMESPACE_VAR, "/run/user/1000/ns")]);
        assert_eq!(settings.address, "unix!/run/user/1000/ns/wmii");
    }

    #[test]
    fn namespace_falls_back_to_user_and_display() {
        let settings = resolve(None, &[("USER", "bart"), ("DISPLAY", ":1.0")]);
        assert_eq!(settings.address, "unix!/tmp/ns.bart.:1/wmii");

        let settings = resolve(None, &[("LOGNAME", "lisa"), ("DISPLAY", "host:2.1")]);
        assert_eq!(settings.address, "unix!/tmp/ns.lisa.host:2.1/wmii");
    }

    #[test]
    fn empty_values_count_as_unset() {
        let settings = resolve(None, &[(ADDRESS_VAR, ""), ("USER", "bart"), (RECORD_VAR, "")]);
        assert_eq!(settings.address, "unix!/tmp/ns.bart.:0/wmii");
        assert_eq!(settings.record, None);
    }

    #[test]
    fn record_path_is_picked_up() {
        let settings = resolve(Some("mem!f.yaml"), &[(RECORD_VAR, "session.cassette.yaml")]);
        assert_eq!(settings.record, Some(PathBuf::from("session.cassette.yaml")));
    }
}
