use crate::{
    ConfigError, Dimensions, RequestKind, DEFAULT_CONCURRENCY, DEFAULT_ENVIRONMENT,
    DEFAULT_HEALTH_TIMEOUT, DEFAULT_LARGE_TIMEOUT, DEFAULT_MAX_FAILURE_RATE,
    DEFAULT_MAX_P95_RESPONSE_TIME, DEFAULT_MAX_P99_RESPONSE_TIME,
    DEFAULT_MIN_REQUESTS_PER_SECOND, DEFAULT_PREDICT_TIMEOUT, DEFAULT_TOTAL_REQUESTS,
    REQUESTS_PER_USER,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Complete benchmark configuration.
///
/// Loaded once at startup and handed explicitly to whatever needs it; nothing reads it from
/// global state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub environments: BTreeMap<String, Environment>,
    #[serde(default)]
    pub test_profiles: BTreeMap<String, Profile>,
    #[serde(default)]
    pub test_mix: TestMix,
    #[serde(default)]
    pub image_sizes: ImageSizes,
    /// Absent means threshold checking is disabled.
    #[serde(default)]
    pub thresholds: Option<ThresholdSet>,
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Directory of real JPEG images. Synthetic payloads are used when absent or empty.
    #[serde(default)]
    pub image_pool: Option<PathBuf>,
}

impl BenchConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, env) in &self.environments {
            parse_url(&env.url).map_err(|err| {
                ConfigError::Invalid(format!("environment \"{name}\": {err}"))
            })?;
        }

        for (name, profile) in &self.test_profiles {
            if profile.users == 0 {
                return Err(ConfigError::Invalid(format!(
                    "profile \"{name}\" must have at least one user"
                )));
            }
            if let Some((min, max)) = profile.wait_time {
                if min > max {
                    return Err(ConfigError::Invalid(format!(
                        "profile \"{name}\" has a wait_time minimum above its maximum"
                    )));
                }
            }
        }

        for (kind, ratio) in self.test_mix.weights() {
            if !(0. ..=1.).contains(&ratio) {
                return Err(ConfigError::Invalid(format!(
                    "test_mix ratio for {kind} must be within [0, 1], found {ratio}"
                )));
            }
        }

        for (label, dims) in [
            ("small", self.image_sizes.small),
            ("medium", self.image_sizes.medium),
            ("large", self.image_sizes.large),
        ] {
            if dims.width() == 0 || dims.height() == 0 {
                return Err(ConfigError::Invalid(format!(
                    "image size \"{label}\" must be non-zero, found {dims}"
                )));
            }
        }

        Ok(())
    }

    /// Resolve the target service. An explicit URL wins over a named environment, and the
    /// `local` environment is used when neither is given.
    pub fn target(&self, url: Option<&str>, env: Option<&str>) -> Result<Target, ConfigError> {
        if let Some(url) = url {
            return Ok(Target {
                url: parse_url(url)?,
                environment: None,
                description: None,
            });
        }

        let name = env.unwrap_or(DEFAULT_ENVIRONMENT);
        let environment =
            self.environments
                .get(name)
                .ok_or_else(|| ConfigError::UnknownEnvironment {
                    name: name.to_string(),
                    available: join_keys(&self.environments),
                })?;

        Ok(Target {
            url: parse_url(&environment.url)?,
            environment: Some(name.to_string()),
            description: Some(environment.description.clone()),
        })
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.test_profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                name: name.to_string(),
                available: join_keys(&self.test_profiles),
            })
    }

    /// Resolve concurrency and request count. Explicit values win; a profile contributes its
    /// user count and `users * REQUESTS_PER_USER` requests.
    pub fn load_shape(
        &self,
        profile: Option<&str>,
        concurrency: Option<usize>,
        total_requests: Option<usize>,
    ) -> Result<LoadShape, ConfigError> {
        let (concurrency, total_requests) = match profile {
            Some(name) => {
                let profile = self.profile(name)?;
                let total_requests = match total_requests {
                    Some(total) => total,
                    None => profile.users.checked_mul(REQUESTS_PER_USER).ok_or_else(|| {
                        ConfigError::Invalid(format!(
                            "profile \"{name}\": {} users is too many",
                            profile.users
                        ))
                    })?,
                };
                (concurrency.unwrap_or(profile.users), total_requests)
            }
            None => (
                concurrency.unwrap_or(DEFAULT_CONCURRENCY),
                total_requests.unwrap_or(DEFAULT_TOTAL_REQUESTS),
            ),
        };

        let concurrency = NonZeroUsize::new(concurrency)
            .ok_or_else(|| ConfigError::Invalid("concurrency must be at least 1".to_string()))?;

        Ok(LoadShape {
            concurrency,
            total_requests,
        })
    }
}

impl FromStr for BenchConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: BenchConfig = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Environment {
    pub url: String,
    #[serde(default)]
    pub description: String,
}

#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Profile {
    pub users: usize,
    #[serde(default)]
    pub description: String,
    /// Run length for the swarm driver, in seconds.
    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    pub duration: Option<Duration>,
    /// `[min, max]` pause between swarm requests, in seconds.
    #[serde_as(as = "Option<(DurationSecondsWithFrac<f64>, DurationSecondsWithFrac<f64>)>")]
    pub wait_time: Option<(Duration, Duration)>,
}

/// Proportion of the total traffic given to each request type.
///
/// Ratios need not sum to one. See the traffic planner for how shortfall and excess are handled.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestMix {
    #[serde(default = "default_health_ratio")]
    pub health_check: f64,
    #[serde(default = "default_predict_no_image_ratio")]
    pub predict_no_image: f64,
    #[serde(default = "default_predict_with_image_ratio")]
    pub predict_with_image: f64,
    #[serde(default = "default_predict_large_ratio")]
    pub predict_large_image: f64,
}

impl TestMix {
    pub fn weights(&self) -> [(RequestKind, f64); 4] {
        [
            (RequestKind::Health, self.health_check),
            (RequestKind::PredictNoImage, self.predict_no_image),
            (RequestKind::PredictWithImage, self.predict_with_image),
            (RequestKind::PredictLarge, self.predict_large_image),
        ]
    }
}

impl Default for TestMix {
    fn default() -> Self {
        Self {
            health_check: default_health_ratio(),
            predict_no_image: default_predict_no_image_ratio(),
            predict_with_image: default_predict_with_image_ratio(),
            predict_large_image: default_predict_large_ratio(),
        }
    }
}

fn default_health_ratio() -> f64 {
    0.1
}

fn default_predict_no_image_ratio() -> f64 {
    0.6
}

fn default_predict_with_image_ratio() -> f64 {
    0.2
}

fn default_predict_large_ratio() -> f64 {
    0.1
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageSizes {
    #[serde(default = "default_small")]
    pub small: Dimensions,
    #[serde(default = "default_medium")]
    pub medium: Dimensions,
    #[serde(default = "default_large")]
    pub large: Dimensions,
}

impl ImageSizes {
    /// Payload size uploaded by the given request type, if it uploads one.
    pub fn for_kind(&self, kind: RequestKind) -> Option<Dimensions> {
        match kind {
            RequestKind::Health => None,
            RequestKind::PredictNoImage | RequestKind::PredictWithImage => Some(self.small),
            RequestKind::PredictLarge => Some(self.large),
        }
    }
}

impl Default for ImageSizes {
    fn default() -> Self {
        Self {
            small: default_small(),
            medium: default_medium(),
            large: default_large(),
        }
    }
}

fn default_small() -> Dimensions {
    Dimensions(640, 480)
}

fn default_medium() -> Dimensions {
    Dimensions(1280, 720)
}

fn default_large() -> Dimensions {
    Dimensions(1920, 1080)
}

/// Pass/fail bounds. Each key falls back to its default individually.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    #[serde(default = "default_max_failure_rate")]
    pub max_failure_rate: f64,
    #[serde(default = "default_max_p95")]
    pub max_p95_response_time: f64,
    #[serde(default = "default_max_p99")]
    pub max_p99_response_time: f64,
    #[serde(default = "default_min_rps")]
    pub min_requests_per_second: f64,
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            max_failure_rate: default_max_failure_rate(),
            max_p95_response_time: default_max_p95(),
            max_p99_response_time: default_max_p99(),
            min_requests_per_second: default_min_rps(),
        }
    }
}

fn default_max_failure_rate() -> f64 {
    DEFAULT_MAX_FAILURE_RATE
}

fn default_max_p95() -> f64 {
    DEFAULT_MAX_P95_RESPONSE_TIME
}

fn default_max_p99() -> f64 {
    DEFAULT_MAX_P99_RESPONSE_TIME
}

fn default_min_rps() -> f64 {
    DEFAULT_MIN_REQUESTS_PER_SECOND
}

/// Per-request timeouts, in seconds.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "default_health_timeout")]
    pub health: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "default_predict_timeout")]
    pub predict: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "default_large_timeout")]
    pub large: Duration,
}

impl Timeouts {
    pub fn for_kind(&self, kind: RequestKind) -> Duration {
        match kind {
            RequestKind::Health => self.health,
            RequestKind::PredictNoImage | RequestKind::PredictWithImage => self.predict,
            RequestKind::PredictLarge => self.large,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            health: DEFAULT_HEALTH_TIMEOUT,
            predict: DEFAULT_PREDICT_TIMEOUT,
            large: DEFAULT_LARGE_TIMEOUT,
        }
    }
}

fn default_health_timeout() -> Duration {
    DEFAULT_HEALTH_TIMEOUT
}

fn default_predict_timeout() -> Duration {
    DEFAULT_PREDICT_TIMEOUT
}

fn default_large_timeout() -> Duration {
    DEFAULT_LARGE_TIMEOUT
}

/// A resolved target service.
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    /// Base URL without a trailing slash, ready for `{url}/health`.
    pub url: String,
    pub environment: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadShape {
    pub concurrency: NonZeroUsize,
    pub total_requests: usize,
}

fn parse_url(url: &str) -> Result<String, ConfigError> {
    Url::parse(url).map_err(|source| ConfigError::Url {
        url: url.to_string(),
        source,
    })?;
    Ok(url.trim_end_matches('/').to_string())
}

fn join_keys<V>(map: &BTreeMap<String, V>) -> String {
    if map.is_empty() {
        "none".to_string()
    } else {
        map.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}
