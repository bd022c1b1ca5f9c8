//! FlowConfig — 스트리밍 계층 기본값
//!
//! JSON 파일 → `ROWFLOW_*` 환경 변수 순으로 덮어쓴 뒤 `validate()`로 검증합니다.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `ROWFLOW_BATCH_SIZE` | `batch_size` |
//! | `ROWFLOW_PAGE_SIZE` | `page_size` |
//! | `ROWFLOW_RETRY_MAX_ATTEMPTS` | `retry.max_attempts` |
//! | `ROWFLOW_RETRY_DELAY_MS` | `retry.delay_ms` |
//! | `ROWFLOW_PARALLELISM` | `parallelism` (`auto`, `per_unit` or a thread count) |

use crate::error::{FlowError, FlowResult};
use crate::orchestrator::ParallelizationPolicy;
use crate::resilience::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Retry section of [`FlowConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts(),
            delay_ms: policy.delay().as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub batch_size: usize,
    pub page_size: usize,
    pub retry: RetryConfig,
    pub parallelism: ParallelizationPolicy,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            page_size: 20,
            retry: RetryConfig::default(),
            parallelism: ParallelizationPolicy::Auto,
        }
    }
}

impl FlowConfig {
    /// 파일에서 로드 (누락된 필드는 기본값)
    pub fn load_from_file(path: impl AsRef<Path>) -> FlowResult<Self> {
        let json = fs::read_to_string(path)?;
        let config: FlowConfig = serde_json::from_str(&json)?;
        Ok(config)
    }

    /// 파일에 저장
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> FlowResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// 환경 변수 덮어쓰기
    pub fn apply_env(&mut self) -> FlowResult<()> {
        self.apply_overrides(|name| env::var(name).ok())
    }

    /// Applies overrides from `lookup`, keyed by `ROWFLOW_*` variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> FlowResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ROWFLOW_BATCH_SIZE") {
            self.batch_size = parse_var("ROWFLOW_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("ROWFLOW_PAGE_SIZE") {
            self.page_size = parse_var("ROWFLOW_PAGE_SIZE", &v)?;
        }
        if let Some(v) = lookup("ROWFLOW_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_var("ROWFLOW_RETRY_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("ROWFLOW_RETRY_DELAY_MS") {
            self.retry.delay_ms = parse_var("ROWFLOW_RETRY_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("ROWFLOW_PARALLELISM") {
            self.parallelism = match v.trim().to_lowercase().as_str() {
                "auto" => ParallelizationPolicy::Auto,
                "per_unit" => ParallelizationPolicy::PerUnit,
                n => ParallelizationPolicy::Fixed(parse_var("ROWFLOW_PARALLELISM", n)?),
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> FlowResult<()> {
        if self.batch_size == 0 {
            return Err(FlowError::Config("batch_size must be positive".to_string()));
        }
        if self.page_size == 0 {
            return Err(FlowError::Config("page_size must be positive".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(FlowError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.parallelism == ParallelizationPolicy::Fixed(0) {
            return Err(FlowError::Config(
                "parallelism thread count must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> FlowResult<RetryPolicy> {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.delay_ms),
        )
        .map_err(|e| FlowError::Config(e.to_string()))
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> FlowResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| FlowError::Config(format!("{name}: cannot parse '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = FlowConfig::default();
        config.validate().unwrap();
        assert_eq!(config.retry_policy().unwrap(), RetryPolicy::default());
    }

    #[test]
    fn test_file_roundtrip_and_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("rowflow.json");
        let config = FlowConfig {
            batch_size: 7,
            parallelism: ParallelizationPolicy::Fixed(3),
            ..FlowConfig::default()
        };
        config.save_to_file(&path).unwrap();
        assert_eq!(FlowConfig::load_from_file(&path).unwrap(), config);

        let partial = dir.path().join("partial.json");
        fs::write(&partial, r#"{"page_size": 5, "retry": {"delay_ms": 10}}"#).unwrap();
        let loaded = FlowConfig::load_from_file(&partial).unwrap();
        assert_eq!(loaded.page_size, 5);
        assert_eq!(loaded.retry.delay_ms, 10);
        assert_eq!(loaded.retry.max_attempts, 4);
        assert_eq!(loaded.batch_size, 100);
    }

    #[test]
    fn test_missing_file_and_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FlowConfig::load_from_file(dir.path().join("nope.json")),
            Err(FlowError::Io { .. })
        ));
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ batch_size: ").unwrap();
        assert!(matches!(
            FlowConfig::load_from_file(&bad),
            Err(FlowError::Serialization(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ROWFLOW_BATCH_SIZE", "250"),
            ("ROWFLOW_RETRY_DELAY_MS", "0"),
            ("ROWFLOW_PARALLELISM", "per_unit"),
        ]
        .into_iter()
        .collect();
        let mut config = FlowConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.retry.delay_ms, 0);
        assert_eq!(config.parallelism, ParallelizationPolicy::PerUnit);

        config
            .apply_overrides(|name| (name == "ROWFLOW_PARALLELISM").then(|| "6".to_string()))
            .unwrap();
        assert_eq!(config.parallelism, ParallelizationPolicy::Fixed(6));

        assert!(matches!(
            config.apply_overrides(|name| (name == "ROWFLOW_PAGE_SIZE").then(|| "many".to_string())),
            Err(FlowError::Config(_))
        ));
    }

    #[test]
    fn test_apply_env() {
        // 환경 변수 설정 (unsafe)
        unsafe {
            env::set_var("ROWFLOW_RETRY_MAX_ATTEMPTS", "9");
        }
        let mut config = FlowConfig::default();
        config.apply_env().unwrap();
        assert_eq!(config.retry.max_attempts, 9);
        unsafe {
            env::remove_var("ROWFLOW_RETRY_MAX_ATTEMPTS");
        }
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let config = FlowConfig {
            batch_size: 0,
            ..FlowConfig::default()
        };
        assert!(matches!(config.validate(), Err(FlowError::Config(_))));
        let config = FlowConfig {
            retry: RetryConfig {
                max_attempts: 0,
                delay_ms: 0,
            },
            ..FlowConfig::default()
        };
        assert!(matches!(config.validate(), Err(FlowError::Config(_))));
        assert!(matches!(config.retry_policy(), Err(FlowError::Config(_))));
    }
}
