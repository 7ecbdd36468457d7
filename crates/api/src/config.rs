use std::net::SocketAddr;
use std::time::Duration;

use twingraph_import::config::{env_secs_from, ImportConfig};

/// HTTP front end of an import instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Browser origins allowed to call the job API. Empty disables CORS.
    pub cors_origins: Vec<String>,
    pub request_timeout: Duration,
    /// How long background loops get to stop after the listener closes.
    pub shutdown_timeout: Duration,
    pub import: ImportConfig,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                 | Default        |
    /// |-------------------------|----------------|
    /// | `BIND_ADDR`             | `0.0.0.0:8080` |
    /// | `CORS_ORIGINS`          | (none)         |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`           |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`           |
    ///
    /// Engine settings come from [`ImportConfig::from_env`].
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok(), ImportConfig::from_env())
    }

    /// Build from any variable source. Panics on malformed values so a bad
    /// deployment fails at startup.
    pub fn from_lookup<F>(lookup: F, import: ImportConfig) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".into())
            .parse()
            .expect("BIND_ADDR must be a socket address such as 0.0.0.0:8080");

        let cors_origins = lookup("CORS_ORIGINS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            bind_addr,
            cors_origins,
            request_timeout: env_secs_from(&lookup, "REQUEST_TIMEOUT_SECS", Duration::from_secs(30)),
            shutdown_timeout: env_secs_from(&lookup, "SHUTDOWN_TIMEOUT_SECS", Duration::from_secs(30)),
            import,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned(), ImportConfig::default())
    }

    #[test]
    fn defaults_disable_cors() {
        let config = load(&[]);
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn origins_are_trimmed_and_blank_entries_dropped() {
        let config = load(&[
            ("CORS_ORIGINS", " https://ops.example.com, ,http://localhost:5173"),
            ("REQUEST_TIMEOUT_SECS", "5"),
        ]);
        assert_eq!(
            config.cors_origins,
            vec!["https://ops.example.com", "http://localhost:5173"]
        );
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    #[should_panic(expected = "BIND_ADDR")]
    fn malformed_bind_address_panics() {
        load(&[("BIND_ADDR", "localhost")]);
    }
}
