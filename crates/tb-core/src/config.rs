use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::str::FromStr;

pub fn required_env(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("missing env: {name}"))
}

pub fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Reads a secret from `NAME`, or from the file named by `NAME_FILE`.
pub fn required_secret(name: &str) -> Result<String> {
    optional_secret(name)?.ok_or_else(|| anyhow!("missing env: {name} (or {name}_FILE)"))
}

pub fn optional_secret(name: &str) -> Result<Option<String>> {
    if let Some(value) = optional_env(name) {
        return Ok(Some(value));
    }
    let file_var = format!("{name}_FILE");
    match optional_env(&file_var) {
        Some(path) => {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {file_var} at {path}"))?;
            let value = contents.trim().to_string();
            if value.is_empty() {
                return Err(anyhow!("{file_var} points at an empty file"));
            }
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Private keys pasted into a single env line carry literal `\n` sequences.
pub fn unescape_newlines(value: &str) -> String {
    value.replace("\\n", "\n")
}

pub fn socket_addr_from_env(name: &str, default: &str) -> Result<SocketAddr> {
    let value = env::var(name).unwrap_or_else(|_| default.to_string());
    SocketAddr::from_str(&value).map_err(|err| anyhow!("invalid socket addr for {name}: {err}"))
}

pub fn u64_from_env(name: &str, default: u64) -> Result<u64> {
    match optional_env(name) {
        Some(value) => value
            .parse::<u64>()
            .map_err(|err| anyhow!("invalid number for {name}: {err}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvGuard {
        key: &'static str,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            env::remove_var(self.key);
        }
    }

    fn set_env(key: &'static str, value: &str) -> EnvGuard {
        env::set_var(key, value);
        EnvGuard { key }
    }

    #[test]
    fn required_env_reads_value() {
        let _guard = set_env("TB_TEST_REQUIRED_ENV_PRESENT", "value");
        let value = required_env("TB_TEST_REQUIRED_ENV_PRESENT").unwrap();
        assert_eq!(value, "value");
    }

    #[test]
    fn required_env_missing_returns_error() {
        env::remove_var("TB_TEST_REQUIRED_ENV_MISSING");
        assert!(required_env("TB_TEST_REQUIRED_ENV_MISSING").is_err());
    }

    #[test]
    fn required_secret_prefers_the_direct_value() {
        let _guard = set_env("TB_TEST_SECRET_DIRECT", "  direct  ");
        assert_eq!(required_secret("TB_TEST_SECRET_DIRECT").unwrap(), "direct");
    }

    #[test]
    fn required_secret_falls_back_to_file() {
        let path = env::temp_dir().join(format!("tb-secret-{}", uuid::Uuid::new_v4()));
        fs::write(&path, "from-file\n").unwrap();
        env::remove_var("TB_TEST_SECRET_FILE_ONLY");
        let _guard = set_env("TB_TEST_SECRET_FILE_ONLY_FILE", path.to_str().unwrap());

        assert_eq!(required_secret("TB_TEST_SECRET_FILE_ONLY").unwrap(), "from-file");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn required_secret_missing_returns_error() {
        env::remove_var("TB_TEST_SECRET_MISSING");
        env::remove_var("TB_TEST_SECRET_MISSING_FILE");
        assert!(required_secret("TB_TEST_SECRET_MISSING").is_err());
    }

    #[test]
    fn unescape_newlines_restores_pem_lines() {
        assert_eq!(
            unescape_newlines("-----BEGIN-----\\nabc\\n-----END-----"),
            "-----BEGIN-----\nabc\n-----END-----"
        );
    }

    #[test]
    fn socket_addr_from_env_uses_default() {
        env::remove_var("TB_TEST_SOCKET_DEFAULT");
        let addr = socket_addr_from_env("TB_TEST_SOCKET_DEFAULT", "127.0.0.1:1234").unwrap();
        assert_eq!(addr, "127.0.0.1:1234".parse().unwrap());
    }

    #[test]
    fn socket_addr_from_env_invalid_returns_error() {
        let _guard = set_env("TB_TEST_SOCKET_INVALID", "not-a-socket");
        assert!(socket_addr_from_env("TB_TEST_SOCKET_INVALID", "127.0.0.1:1234").is_err());
    }

    #[test]
    fn u64_from_env_parses_or_defaults() {
        env::remove_var("TB_TEST_U64_DEFAULT");
        assert_eq!(u64_from_env("TB_TEST_U64_DEFAULT", 86400).unwrap(), 86400);
        let _guard = set_env("TB_TEST_U64_SET", "60");
        assert_eq!(u64_from_env("TB_TEST_U64_SET", 86400).unwrap(), 60);
        let _bad = set_env("TB_TEST_U64_BAD", "soon");
        assert!(u64_from_env("TB_TEST_U64_BAD", 1).is_err());
    }
}
