//! # Controller Configuration
//!
//! Controller-level configuration loaded from environment variables.
//!
//! All configuration has sensible defaults and can be overridden via environment variables.
//! Environment variables are usually populated from a ConfigMap using `envFrom` in the deployment.
//! Command-line flags parsed in `main` take precedence over both.

mod controller;
mod server;

pub use controller::ControllerConfig;
pub use server::ServerConfig;

/// Load configuration from environment variables with defaults
pub fn load_config() -> (ControllerConfig, ServerConfig) {
    (ControllerConfig::from_env(), ServerConfig::from_env())
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_or_default_falls_back_on_garbage() {
        std::env::set_var("PROVIDER_PLANETSCALE_TEST_GARBAGE", "not-a-number");
        let value: u64 = env_var_or_default("PROVIDER_PLANETSCALE_TEST_GARBAGE", 42);
        assert_eq!(value, 42);
        std::env::remove_var("PROVIDER_PLANETSCALE_TEST_GARBAGE");
    }

    #[test]
    fn test_env_var_or_default_parses_value() {
        std::env::set_var("PROVIDER_PLANETSCALE_TEST_PORT", " 9090 ");
        let value: u16 = env_var_or_default("PROVIDER_PLANETSCALE_TEST_PORT", 8080);
        assert_eq!(value, 9090);
        std::env::remove_var("PROVIDER_PLANETSCALE_TEST_PORT");
    }
}
