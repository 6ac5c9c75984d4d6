//! Messages sent from clients to a controller

use serde::{Deserialize, Serialize};

/// Message posted to a controller
///
/// Wire format is `{"type": "SKIP_WAITING"}`. Unrecognized types decode to
/// [`ControllerMessage::Unknown`] and are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControllerMessage {
    /// Become active now instead of waiting for clients to go away
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_skip_waiting() {
        let msg: ControllerMessage = serde_json::from_str(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        assert_eq!(msg, ControllerMessage::SkipWaiting);
        assert_eq!(
            serde_json::to_string(&ControllerMessage::SkipWaiting).unwrap(),
            r#"{"type":"SKIP_WAITING"}"#
        );
    }

    #[test]
    fn test_decode_unknown() {
        let msg: ControllerMessage = serde_json::from_str(r#"{"type":"PING"}"#).unwrap();
        assert_eq!(msg, ControllerMessage::Unknown);
    }
}
