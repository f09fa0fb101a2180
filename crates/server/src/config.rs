//! Server configuration

/// Server configuration loaded from environment variables
pub struct Config {
    pub bind_address: String,
    /// Path the exposition endpoint is served on.
    pub metrics_path: String,
    /// Regexes matched against the raw request path; matching requests are not instrumented.
    pub excluded_paths: Vec<String>,
    /// Directory served under `/static`.
    pub static_dir: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            bind_address: std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            metrics_path: std::env::var("METRICS_PATH").unwrap_or_else(|_| "/metrics".into()),
            excluded_paths: std::env::var("METRICS_EXCLUDED_PATHS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            static_dir: std::env::var("STATIC_DIR").unwrap_or_else(|_| "static".into()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".into(),
            metrics_path: "/metrics".into(),
            excluded_paths: Vec::new(),
            static_dir: "static".into(),
        }
    }
}

/// Split a comma-separated list, dropping blanks
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("^/health$, ^/internal/ ,,"), vec!["^/health$", "^/internal/"]);
        assert!(parse_list("").is_empty());
    }
}
