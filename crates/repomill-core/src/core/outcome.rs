use serde::Serialize;
use serde_json::Value;

/// Final status of a subcommand, serialized as the JSON envelope when
/// `--json` is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl ExecutionOutcome {
    #[must_use]
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        ExecutionOutcome {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    #[must_use]
    pub fn user_error(message: impl Into<String>) -> Self {
        ExecutionOutcome {
            status: CommandStatus::UserError,
            message: message.into(),
            details: Value::Null,
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        ExecutionOutcome {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_details_are_omitted() {
        let outcome = ExecutionOutcome::user_error("unrecognized tag");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "user_error");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn details_round_trip() {
        let outcome =
            ExecutionOutcome::success("done", serde_json::json!({ "succeeded": 3, "failed": 0 }));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["details"]["succeeded"], 3);
    }
}
