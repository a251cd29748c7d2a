use std::fmt;

use serde::{Deserialize, Serialize};

/// Structured error information extracted from MongoDB driver errors.
///
/// Used for fatal run errors and for the per-document diagnostics emitted
/// when an upsert is rejected by the store.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}

impl ErrorInfo {
    /// Numeric server error code, when the server returned one.
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Symbolic name for well-known codes.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Human readable message.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("unknown error")
    }

    /// Convert error info to compact JSON string (single line).
    pub fn to_json_compact(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Format MongoDB errors as compact JSON wrapped in an `error` field.
///
/// Used by the parent module's `Display` implementation for
/// `ShuttleError::MongoDb`.
pub fn format_mongodb_error(
    f: &mut fmt::Formatter<'_>,
    error: &mongodb::error::Error,
) -> fmt::Result {
    let info = extract_error_info(error);
    let wrapper = serde_json::json!({ "error": info });
    let json_output = serde_json::to_string(&wrapper).map_err(|_| fmt::Error)?;
    write!(f, "{json_output}")
}

/// Extract structured information from a MongoDB error using the driver API.
pub fn extract_error_info(error: &mongodb::error::Error) -> ErrorInfo {
    use mongodb::error::{ErrorKind, WriteFailure};

    let mut info = ErrorInfo::default();

    match error.kind.as_ref() {
        ErrorKind::Write(write_failure) => {
            info.error_type = Some("mongo.write_error".to_string());

            match write_failure {
                WriteFailure::WriteError(write_error) => {
                    info.code = Some(write_error.code);
                    info.message = Some(write_error.message.clone());
                }
                WriteFailure::WriteConcernError(wc_error) => {
                    info.code = Some(wc_error.code);
                    info.message = Some(wc_error.message.clone());
                }
                _ => {}
            }
        }
        ErrorKind::Command(command_error) => {
            info.error_type = Some("mongo.command_error".to_string());
            info.code = Some(command_error.code);
            info.message = Some(command_error.message.clone());
        }
        ErrorKind::Authentication { message, .. } => {
            info.error_type = Some("mongo.authentication_error".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::InvalidArgument { message, .. } => {
            info.error_type = Some("mongo.invalid_argument".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::ServerSelection { message, .. } => {
            info.error_type = Some("mongo.server_selection_error".to_string());
            info.message = Some(message.clone());
        }
        _ => {
            info.message = Some(error.to_string());
        }
    }

    info.name = info.code.and_then(get_error_name);

    if matches!(info.code, Some(11000 | 11001)) {
        info.message = Some("Duplicate key error".to_string());
    }

    info
}

/// Get a human-readable error name from a server error code.
///
/// Includes the codes Cosmos DB's MongoDB API uses for throttling and
/// oversized documents.
pub(crate) fn get_error_name(code: i32) -> Option<String> {
    let name = match code {
        11000 | 11001 => "DuplicateKey",
        2 => "BadValue",
        13 => "Unauthorized",
        16 => "RequestEntityTooLarge",
        18 => "AuthenticationFailed",
        26 => "NamespaceNotFound",
        50 => "MaxTimeMSExpired",
        61 => "ShardKeyNotFound",
        121 => "DocumentValidationFailure",
        16500 => "TooManyRequests",
        _ => return None,
    };

    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_for_known_codes() {
        assert_eq!(get_error_name(11000).as_deref(), Some("DuplicateKey"));
        assert_eq!(get_error_name(16500).as_deref(), Some("TooManyRequests"));
        assert_eq!(get_error_name(9999), None);
    }

    #[test]
    fn test_error_info_json_skips_empty_fields() {
        let info = ErrorInfo {
            code: Some(61),
            name: get_error_name(61),
            ..Default::default()
        };
        let json = info.to_json_compact().unwrap();
        assert_eq!(json, r#"{"code":61,"name":"ShardKeyNotFound"}"#);
        assert_eq!(info.message(), "unknown error");
    }
}
