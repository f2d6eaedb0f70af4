use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
}

/// Why a classification attempt produced no prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    ServerError,
    Rejected,
    #[serde(rename = "network_error")]
    Network,
    MalformedResponse,
    Timeout,
    #[serde(rename = "encoding_error")]
    Encoding,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::ServerError => "server_error",
            FailureReason::Rejected => "rejected",
            FailureReason::Network => "network_error",
            FailureReason::MalformedResponse => "malformed_response",
            FailureReason::Timeout => "timeout",
            FailureReason::Encoding => "encoding_error",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredictionOutcome {
    Success(Prediction),
    Failure { reason: FailureReason },
}

impl PredictionOutcome {
    pub fn success(label: impl Into<String>, confidence: f32) -> Self {
        PredictionOutcome::Success(Prediction {
            label: label.into(),
            confidence,
        })
    }

    pub fn failure(reason: FailureReason) -> Self {
        PredictionOutcome::Failure { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_REASONS: [FailureReason; 6] = [
        FailureReason::ServerError,
        FailureReason::Rejected,
        FailureReason::Network,
        FailureReason::MalformedResponse,
        FailureReason::Timeout,
        FailureReason::Encoding,
    ];

    #[test]
    fn serialized_reason_matches_display() {
        for reason in ALL_REASONS {
            let value = serde_json::to_value(reason).unwrap();
            assert_eq!(value, serde_json::Value::from(reason.as_str()));
            assert_eq!(reason.to_string(), reason.as_str());
            let back: FailureReason = serde_json::from_value(value).unwrap();
            assert_eq!(back, reason);
        }
    }
}
