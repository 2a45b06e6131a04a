//! Command and response envelopes.
//!
//! A [`CommandEnvelope`] is the inbound unit of work: an action tag plus
//! exactly one payload variant matching that tag. A [`ResponseEnvelope`]
//! is the uniform outbound shape every request resolves to, success or
//! failure.
//!
//! # Example
//!
//! ```json
//! {
//!   "action": "auth",
//!   "auth": { "email": "a@b.com", "password": "verysecret" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The closed set of actions the dispatcher understands.
///
/// Anything outside this set is a validation error, never routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Auth,
    Mail,
    Log,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Auth => "auth",
            Action::Mail => "mail",
            Action::Log => "log",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth" => Ok(Action::Auth),
            "mail" => Ok(Action::Mail),
            "log" => Ok(Action::Log),
            other => Err(ValidationError::UnknownAction(other.to_string())),
        }
    }
}

/// Why an envelope failed validation before reaching any adapter.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The action tag is outside the closed set
    #[error("invalid action")]
    UnknownAction(String),

    /// The payload variant matching the action is absent
    #[error("missing {0} payload")]
    MissingPayload(Action),

    /// More than one payload variant is populated
    #[error("conflicting payloads for action {0}")]
    ConflictingPayloads(Action),
}

/// Credentials for the auth action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPayload {
    pub email: String,
    pub password: String,
}

/// A log entry for the log action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPayload {
    pub name: String,
    pub data: String,
}

/// An outbound message for the mail action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailPayload {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub message: String,
}

/// The inbound command envelope.
///
/// `action` selects the payload variant; unused variants are omitted on
/// the wire, never serialized as null placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthPayload>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogPayload>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<MailPayload>,
}

impl CommandEnvelope {
    /// Build an auth command
    pub fn auth(payload: AuthPayload) -> Self {
        Self {
            action: Action::Auth.as_str().to_string(),
            auth: Some(payload),
            log: None,
            mail: None,
        }
    }

    /// Build a log command
    pub fn log(payload: LogPayload) -> Self {
        Self {
            action: Action::Log.as_str().to_string(),
            auth: None,
            log: Some(payload),
            mail: None,
        }
    }

    /// Build a mail command
    pub fn mail(payload: MailPayload) -> Self {
        Self {
            action: Action::Mail.as_str().to_string(),
            auth: None,
            log: None,
            mail: Some(payload),
        }
    }

    /// Validate the envelope: a recognized action and exactly one
    /// populated payload variant, the one the action selects.
    pub fn validate(&self) -> Result<Action, ValidationError> {
        let action = Action::from_str(&self.action)?;

        let populated =
            self.auth.is_some() as u8 + self.log.is_some() as u8 + self.mail.is_some() as u8;
        if populated > 1 {
            return Err(ValidationError::ConflictingPayloads(action));
        }

        let matching = match action {
            Action::Auth => self.auth.is_some(),
            Action::Log => self.log.is_some(),
            Action::Mail => self.mail.is_some(),
        };
        if !matching {
            return Err(ValidationError::MissingPayload(action));
        }

        Ok(action)
    }
}

/// The uniform outbound envelope.
///
/// `error == false` means `data` may be present; `error == true` means
/// `message` explains the cause and `data` is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub error: bool,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseEnvelope {
    /// A success envelope with an optional data payload
    pub fn ok(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            error: false,
            message: message.into(),
            data,
        }
    }

    /// A failure envelope; data is never carried on errors
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_round_trip() {
        for tag in ["auth", "mail", "log"] {
            assert_eq!(Action::from_str(tag).unwrap().as_str(), tag);
        }
        assert!(Action::from_str("shrug").is_err());
    }

    #[test]
    fn test_unknown_action_message() {
        let err = Action::from_str("purchase").unwrap_err();
        assert_eq!(err.to_string(), "invalid action");
    }

    #[test]
    fn test_envelope_deserialize() {
        let json_str = r#"{
            "action": "auth",
            "auth": {"email": "a@b.com", "password": "verysecret"}
        }"#;

        let envelope: CommandEnvelope = serde_json::from_str(json_str).unwrap();
        assert_eq!(envelope.action, "auth");
        assert_eq!(envelope.auth.as_ref().unwrap().email, "a@b.com");
        assert!(envelope.log.is_none());
        assert!(envelope.mail.is_none());
        assert_eq!(envelope.validate().unwrap(), Action::Auth);
    }

    #[test]
    fn test_envelope_serialize_omits_absent_variants() {
        let envelope = CommandEnvelope::log(LogPayload {
            name: "event".to_string(),
            data: "something happened".to_string(),
        });

        let json_str = serde_json::to_string(&envelope).unwrap();
        assert!(json_str.contains("\"log\""));
        assert!(!json_str.contains("auth"));
        assert!(!json_str.contains("mail"));
    }

    #[test]
    fn test_validate_missing_payload() {
        let envelope: CommandEnvelope = serde_json::from_str(r#"{"action": "mail"}"#).unwrap();
        let err = envelope.validate().unwrap_err();
        assert!(matches!(err, ValidationError::MissingPayload(Action::Mail)));
        assert_eq!(err.to_string(), "missing mail payload");
    }

    #[test]
    fn test_validate_conflicting_payloads() {
        let json_str = r#"{
            "action": "log",
            "log": {"name": "n", "data": "d"},
            "auth": {"email": "a@b.com", "password": "x"}
        }"#;

        let envelope: CommandEnvelope = serde_json::from_str(json_str).unwrap();
        assert!(matches!(
            envelope.validate().unwrap_err(),
            ValidationError::ConflictingPayloads(Action::Log)
        ));
    }

    #[test]
    fn test_response_envelope_shapes() {
        let ok = ResponseEnvelope::ok("done", Some(json!({"id": 7})));
        let json_str = serde_json::to_string(&ok).unwrap();
        assert!(json_str.contains("\"error\":false"));
        assert!(json_str.contains("\"id\":7"));

        let fail = ResponseEnvelope::fail("nope");
        let json_str = serde_json::to_string(&fail).unwrap();
        assert!(json_str.contains("\"error\":true"));
        // data omitted entirely on errors
        assert!(!json_str.contains("data"));
    }
}
