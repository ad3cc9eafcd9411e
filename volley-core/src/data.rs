use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Logical category of traffic. Each kind maps to exactly one request executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Health,
    PredictNoImage,
    PredictWithImage,
    PredictLarge,
}

impl RequestKind {
    /// Kind used to top up a plan when floor rounding leaves it short.
    pub const DEFAULT: RequestKind = RequestKind::PredictNoImage;

    pub const ALL: [RequestKind; 4] = [
        RequestKind::Health,
        RequestKind::PredictNoImage,
        RequestKind::PredictWithImage,
        RequestKind::PredictLarge,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RequestKind::Health => "health",
            RequestKind::PredictNoImage => "predict_no_image",
            RequestKind::PredictWithImage => "predict_with_image",
            RequestKind::PredictLarge => "predict_large",
        }
    }

    /// Endpoint identifier recorded in each Outcome: path plus rendered query parameters.
    ///
    /// The large-image variant shares its key with `predict_no_image`; both hit the same route
    /// with the same flags and existing reports group them together.
    pub fn endpoint(&self) -> &'static str {
        match self {
            RequestKind::Health => "/health",
            RequestKind::PredictNoImage | RequestKind::PredictLarge => {
                "/predict?return_image=false"
            }
            RequestKind::PredictWithImage => "/predict?return_image=true",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "health" | "health_check" => Ok(RequestKind::Health),
            "predict_no_image" => Ok(RequestKind::PredictNoImage),
            "predict_with_image" => Ok(RequestKind::PredictWithImage),
            "predict_large" | "predict_large_image" => Ok(RequestKind::PredictLarge),
            other => Err(format!("Unknown request type \"{other}\"")),
        }
    }
}

/// Pixel dimensions, written as `[width, height]` in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions(pub u32, pub u32);

impl Dimensions {
    pub fn width(&self) -> u32 {
        self.0
    }

    pub fn height(&self) -> u32 {
        self.1
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.0, self.1)
    }
}

/// Normalised result of a single request.
///
/// `status_code == 0` means no response was received at all (connection failure, timeout).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub endpoint: String,
    pub status_code: u16,
    /// Seconds from dispatch until the body was fully read or the request failed.
    pub response_time: f64,
    pub success: bool,
    pub error: Option<String>,
}

impl Outcome {
    pub fn success(endpoint: impl Into<String>, status_code: u16, elapsed: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            status_code,
            response_time: elapsed.as_secs_f64(),
            success: true,
            error: None,
        }
    }

    /// A response arrived but did not count as a success.
    pub fn rejected(
        endpoint: impl Into<String>,
        status_code: u16,
        elapsed: Duration,
        error: Option<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            status_code,
            response_time: elapsed.as_secs_f64(),
            success: false,
            error,
        }
    }

    /// No response was received.
    pub fn transport_failure(
        endpoint: impl Into<String>,
        elapsed: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            status_code: 0,
            response_time: elapsed.as_secs_f64(),
            success: false,
            error: Some(error.into()),
        }
    }

    /// Key used for the failure breakdown.
    pub fn failure_reason(&self) -> String {
        match &self.error {
            Some(error) => error.clone(),
            None => format!("HTTP {}", self.status_code),
        }
    }
}
