use std::{path::PathBuf, time::Duration};

use crate::{
    cache::{get_library_dir, get_root_work_dir},
    error::ConfigError,
    types::UploadCredentials,
};

pub const DEFAULT_API_URL: &str = "https://api.mux.com";
pub const DEFAULT_SELF_TEST_INPUT: &str = "https://www.dropbox.com/s/jyp3h9lrwgx0kkv/video.mp4?dl=0";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 600;

#[derive(Clone, Copy, Debug)]
pub enum EnvKey {
    TokenId,
    TokenSecret,
    ApiUrl,
    WorkDir,
    LibraryDir,
    RequestTimeoutSecs,
    UploadTimeoutSecs,
    SelfTestInput,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::TokenId => "CLIPUP_TOKEN_ID",
            EnvKey::TokenSecret => "CLIPUP_TOKEN_SECRET",
            EnvKey::ApiUrl => "CLIPUP_API_URL",
            EnvKey::WorkDir => "CLIPUP_WORK_DIR",
            EnvKey::LibraryDir => "CLIPUP_LIBRARY_DIR",
            EnvKey::RequestTimeoutSecs => "CLIPUP_REQUEST_TIMEOUT_SECS",
            EnvKey::UploadTimeoutSecs => "CLIPUP_UPLOAD_TIMEOUT_SECS",
            EnvKey::SelfTestInput => "CLIPUP_SELF_TEST_INPUT",
        }
    }
}

/// Directories used by commands that never talk to the API
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalDirs {
    pub work_dir: PathBuf,
    pub library_dir: PathBuf,
}

impl LocalDirs {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key.as_str()).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(EnvKey) -> Option<String>,
    {
        Self {
            work_dir: non_blank(&lookup, EnvKey::WorkDir)
                .map(PathBuf::from)
                .unwrap_or_else(get_root_work_dir),
            library_dir: non_blank(&lookup, EnvKey::LibraryDir)
                .map(PathBuf::from)
                .unwrap_or_else(get_library_dir),
        }
    }
}

fn non_blank<F>(lookup: &F, key: EnvKey) -> Option<String>
where
    F: Fn(EnvKey) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

#[derive(Clone, Debug)]
pub struct Config {
    pub credentials: UploadCredentials,
    pub api_url: String,
    pub work_dir: PathBuf,
    pub library_dir: PathBuf,
    pub request_timeout: Duration,
    pub upload_timeout: Duration,
    pub self_test_input: String,
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key.as_str()).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(EnvKey) -> Option<String>,
    {
        let get = |key: EnvKey| non_blank(&lookup, key);
        let require = |key: EnvKey| get(key).ok_or(ConfigError::Missing { var: key.as_str() });

        let credentials =
            UploadCredentials::new(require(EnvKey::TokenId)?, require(EnvKey::TokenSecret)?);

        let secs = |key: EnvKey, default: u64| -> Result<Duration, ConfigError> {
            let Some(raw) = get(key) else {
                return Ok(Duration::from_secs(default));
            };
            let secs = raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                var: key.as_str(),
                reason: e.to_string(),
            })?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    var: key.as_str(),
                    reason: "must be greater than zero".to_string(),
                });
            }
            Ok(Duration::from_secs(secs))
        };

        let dirs = LocalDirs::from_lookup(&lookup);

        Ok(Self {
            credentials,
            api_url: get(EnvKey::ApiUrl)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            work_dir: dirs.work_dir,
            library_dir: dirs.library_dir,
            request_timeout: secs(EnvKey::RequestTimeoutSecs, DEFAULT_REQUEST_TIMEOUT_SECS)?,
            upload_timeout: secs(EnvKey::UploadTimeoutSecs, DEFAULT_UPLOAD_TIMEOUT_SECS)?,
            self_test_input: get(EnvKey::SelfTestInput)
                .unwrap_or_else(|| DEFAULT_SELF_TEST_INPUT.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(EnvKey, &str)]) -> impl Fn(EnvKey) -> Option<String> {
        let map: HashMap<&'static str, String> = pairs
            .iter()
            .map(|(k, v)| (k.as_str(), v.to_string()))
            .collect();
        move |key| map.get(key.as_str()).cloned()
    }

    #[test]
    fn defaults_apply_when_only_credentials_are_set() {
        let cfg = Config::from_lookup(lookup(&[
            (EnvKey::TokenId, "id"),
            (EnvKey::TokenSecret, "secret"),
        ]))
        .unwrap();

        assert_eq!(cfg.credentials.token_id, "id");
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.upload_timeout, Duration::from_secs(600));
        assert_eq!(cfg.self_test_input, DEFAULT_SELF_TEST_INPUT);
        assert!(cfg.work_dir.ends_with("clipup"));
    }

    #[test]
    fn local_dirs_need_no_credentials() {
        let dirs = LocalDirs::from_lookup(lookup(&[
            (EnvKey::LibraryDir, "/srv/clips"),
            (EnvKey::WorkDir, " "),
        ]));
        assert_eq!(dirs.library_dir, PathBuf::from("/srv/clips"));
        assert_eq!(dirs.work_dir, get_root_work_dir());

        let cfg = Config::from_lookup(lookup(&[
            (EnvKey::TokenId, "id"),
            (EnvKey::TokenSecret, "secret"),
            (EnvKey::LibraryDir, "/srv/clips"),
        ]))
        .unwrap();
        assert_eq!(cfg.library_dir, dirs.library_dir);
    }

    #[test]
    fn missing_secret_is_reported_by_name() {
        let err = Config::from_lookup(lookup(&[(EnvKey::TokenId, "id")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing {
                var: "CLIPUP_TOKEN_SECRET"
            }
        ));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let err = Config::from_lookup(lookup(&[
            (EnvKey::TokenId, "  "),
            (EnvKey::TokenSecret, "secret"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing { .. }));
    }

    #[test]
    fn overrides_and_invalid_timeouts() {
        let cfg = Config::from_lookup(lookup(&[
            (EnvKey::TokenId, "id"),
            (EnvKey::TokenSecret, "secret"),
            (EnvKey::ApiUrl, "http://localhost:9000/"),
            (EnvKey::WorkDir, "/var/tmp/clips"),
            (EnvKey::UploadTimeoutSecs, "45"),
        ]))
        .unwrap();
        assert_eq!(cfg.api_url, "http://localhost:9000");
        assert_eq!(cfg.work_dir, PathBuf::from("/var/tmp/clips"));
        assert_eq!(cfg.upload_timeout, Duration::from_secs(45));

        let err = Config::from_lookup(lookup(&[
            (EnvKey::TokenId, "id"),
            (EnvKey::TokenSecret, "secret"),
            (EnvKey::RequestTimeoutSecs, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "CLIPUP_REQUEST_TIMEOUT_SECS",
                ..
            }
        ));
    }
}
