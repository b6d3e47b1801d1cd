// SPDX-License-Identifier: Apache-2.0
//! Log redaction for API requests and responses.
//!
//! These helpers only build the values that get logged. The request that goes on the wire is
//! never touched.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Session id header.
pub const SID_HEADER: &str = "X-chkp-sid";

/// Session id field of login responses.
pub const SID: &str = "sid";

/// Logged in place of a sensitive payload.
pub const PAYLOAD_PLACEHOLDER: &str = "****";

/// Commands whose request payload carries credentials, keys or certificates.
pub const SENSITIVE_REQUEST_COMMANDS: &[&str] = &[
    "login",
    "add-administrator",
    "set-administrator",
    "add-opsec-application",
    "set-opsec-application",
    "add-vpn-community-meshed",
    "set-vpn-community-meshed",
    "add-vpn-community-star",
    "set-vpn-community-star",
    "add-simple-gateway",
    "set-simple-gateway",
    "add-data-center-server",
    "set-data-center-server",
    "delete-api-key",
    "add-server-certificate",
    "set-server-certificate",
    "add-user",
    "set-user",
    "add-mds",
    "set-mds",
    "add-checkpoint-host",
    "set-checkpoint-host",
];

/// Commands whose whole response is secret.
const SENSITIVE_REPLY_COMMANDS: &[&str] = &["add-api-key"];

const LOGIN_COMMANDS: &[&str] = &["login", "login-to-domain"];

pub fn is_sensitive_request(command: &str) -> bool {
    SENSITIVE_REQUEST_COMMANDS.contains(&command)
}

pub fn is_sensitive_reply(command: &str) -> bool {
    SENSITIVE_REPLY_COMMANDS.contains(&command)
}

/// True when `data` is a login-family response with a session id.
pub fn carries_sid(command: &str, data: &Value) -> bool {
    LOGIN_COMMANDS.contains(&command) && data.get(SID).is_some()
}

/// One-way hash of a session id, lower-case hex.
pub fn hash_sid(sid: &str) -> String {
    hex::encode(Sha256::digest(sid.as_bytes()))
}

/// Request headers as logged: the session id is replaced by its hash.
pub fn headers_for_log(headers: &[(String, String)]) -> Value {
    let map: Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            let logged = if name.eq_ignore_ascii_case(SID_HEADER) {
                hash_sid(value)
            } else {
                value.clone()
            };
            (name.clone(), Value::String(logged))
        })
        .collect();
    Value::Object(map)
}

/// Request payload as logged.
pub fn payload_for_log(command: &str, payload: &Value) -> Value {
    if is_sensitive_request(command) {
        Value::String(PAYLOAD_PLACEHOLDER.to_string())
    } else {
        payload.clone()
    }
}

/// Response body as logged, or `None` when the response must not be logged at all.
pub fn response_for_log(command: &str, data: &Value) -> Option<Value> {
    if is_sensitive_reply(command) {
        return None;
    }
    if !carries_sid(command, data) {
        return Some(data.clone());
    }
    let mut logged = data.clone();
    if let Some(sid) = logged.get_mut(SID) {
        let hashed = match sid.as_str() {
            Some(s) => hash_sid(s),
            None => hash_sid(&sid.to_string()),
        };
        *sid = Value::String(hashed);
    }
    Some(logged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sensitive_payload_is_masked() {
        let payload = json!({"user": "admin", "password": "secret123"});
        let logged = payload_for_log("login", &payload);
        assert_eq!(logged, json!("****"));
        assert!(!logged.to_string().contains("secret123"));
    }

    #[test]
    fn test_every_sensitive_command_is_masked() {
        let payload = json!({"password": "secret123", "secret": "k3y"});
        for command in SENSITIVE_REQUEST_COMMANDS {
            let logged = payload_for_log(command, &payload).to_string();
            assert!(!logged.contains("secret123"), "{command} leaked its payload");
            assert!(!logged.contains("k3y"), "{command} leaked its payload");
        }
    }

    #[test]
    fn test_ordinary_payload_is_kept() {
        let payload = json!({"name": "h1", "ip-address": "1.2.3.4"});
        assert_eq!(payload_for_log("add-host", &payload), payload);
    }

    #[test]
    fn test_sid_header_is_hashed() {
        let headers = vec![
            ("Accept".to_string(), "*/*".to_string()),
            (SID_HEADER.to_string(), "abc".to_string()),
        ];
        let logged = headers_for_log(&headers);
        assert_eq!(logged["Accept"], "*/*");
        assert_eq!(logged[SID_HEADER], hash_sid("abc"));
        assert!(!logged.to_string().contains("\"abc\""));
    }

    #[test]
    fn test_login_response_sid_is_hashed() {
        let data = json!({"sid": "abc", "uid": "u-1"});
        let logged = response_for_log("login", &data).unwrap();
        assert_eq!(logged["sid"], hash_sid("abc"));
        assert_eq!(logged["uid"], "u-1");

        let other = response_for_log("show-session", &data).unwrap();
        assert_eq!(other["sid"], "abc");
    }

    #[test]
    fn test_api_key_response_is_suppressed() {
        let data = json!({"api-key": "AAAA"});
        assert!(response_for_log("add-api-key", &data).is_none());
    }

    #[test]
    fn test_carries_sid() {
        assert!(carries_sid("login-to-domain", &json!({"sid": "x"})));
        assert!(!carries_sid("login", &json!({"message": "denied"})));
        assert!(!carries_sid("show-host", &json!({"sid": "x"})));
    }
}
