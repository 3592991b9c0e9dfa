// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response parsing for the instance-management API.
//!
//! The API has shipped several response shapes over its versions (flat v2
//! objects, v1 objects nested under `instance`, arrays, wrapped arrays). Each
//! field is read from a prioritized list of dotted paths; the first path that
//! yields a non-empty value wins.

use serde_json::Value;
use tracing::warn;
use zapflow_core::{phone_from_jid, ConnectionState, QrCode, RemoteInstance};

/// Paths for the remote instance id, highest priority first.
pub const ID_PATHS: &[&str] = &["id", "instanceId", "instance.instanceId", "instance.id"];

/// Paths for the instance name.
pub const NAME_PATHS: &[&str] = &["name", "instanceName", "instance.instanceName", "instance.name"];

/// Paths for the bound phone (a bare number or a WhatsApp JID).
pub const PHONE_PATHS: &[&str] = &[
    "ownerJid",
    "owner",
    "number",
    "instance.owner",
    "instance.ownerJid",
];

/// Paths for the connection state string.
pub const STATE_PATHS: &[&str] = &[
    "connectionStatus",
    "status",
    "instance.state",
    "instance.status",
    "state",
];

const QR_IMAGE_PATHS: &[&str] = &["base64", "qrcode.base64"];
const QR_CODE_PATHS: &[&str] = &["code", "qrcode.code"];
const PAIRING_CODE_PATHS: &[&str] = &["pairingCode", "qrcode.pairingCode"];

/// Keys under which list endpoints may wrap their array.
const LIST_WRAPPERS: &[&str] = &["instances", "data"];

const DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Follows a dotted path (`instance.state`) into a JSON value.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

/// Returns the first non-empty scalar found along `paths`, as a string.
pub fn first_string(value: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| match lookup(value, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// True for ids the API uses as "not created yet" sentinels: empty, or made
/// only of `0` and `-` (e.g. `00000000-0000-0000-0000-000000000000`).
pub fn is_placeholder_id(id: &str) -> bool {
    id.chars().all(|c| c == '0' || c == '-')
}

/// Parses one instance entry. Returns `None` (and logs) when none of the
/// known fields is present.
pub fn parse_instance(value: &Value) -> Option<RemoteInstance> {
    let id = first_string(value, ID_PATHS);
    let name = first_string(value, NAME_PATHS);
    let phone = first_string(value, PHONE_PATHS)
        .map(|raw| phone_from_jid(&raw))
        .filter(|digits| !digits.is_empty());
    let state = first_string(value, STATE_PATHS).map(|s| ConnectionState::parse(&s));

    if id.is_none() && name.is_none() && phone.is_none() && state.is_none() {
        warn!(
            keys = %object_keys(value),
            "instance entry has none of the known id/name/phone/state fields"
        );
        return None;
    }

    Some(RemoteInstance {
        id,
        name,
        state,
        phone,
    })
}

/// Parses a listing body: an array, an object wrapping an array under
/// `instances`/`data`, or a single instance object.
pub fn parse_instance_list(body: &Value) -> Vec<RemoteInstance> {
    let entries: Vec<&Value> = match body {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => {
            match LIST_WRAPPERS
                .iter()
                .find_map(|key| body.get(*key).and_then(Value::as_array))
            {
                Some(items) => items.iter().collect(),
                None => vec![body],
            }
        }
        other => {
            warn!(kind = json_kind(other), "instance listing is not an array or object");
            return Vec::new();
        }
    };

    entries.into_iter().filter_map(parse_instance).collect()
}

/// Reads the connection state from a `connectionState` response.
pub fn parse_connection_state(body: &Value) -> Option<ConnectionState> {
    let state = first_string(body, STATE_PATHS).map(|s| ConnectionState::parse(&s));
    if state.is_none() {
        warn!(keys = %object_keys(body), "connection state missing from response");
    }
    state
}

/// Extracts the QR payload from a `connect` response.
///
/// A `base64` image wins over the raw `code`; the data-URI prefix is added
/// when the API returns bare base64.
pub fn parse_qr_code(body: &Value) -> Option<QrCode> {
    let pairing_code = first_string(body, PAIRING_CODE_PATHS);

    if let Some(image) = first_string(body, QR_IMAGE_PATHS) {
        let data_uri = if image.starts_with("data:") {
            image
        } else {
            format!("{DATA_URI_PREFIX}{image}")
        };
        return Some(QrCode::Image {
            data_uri,
            pairing_code,
        });
    }

    if let Some(code) = first_string(body, QR_CODE_PATHS) {
        return Some(QrCode::Raw { code, pairing_code });
    }

    warn!(keys = %object_keys(body), "connect response carries no QR payload");
    None
}

fn object_keys(value: &Value) -> String {
    match value.as_object() {
        Some(map) => map.keys().cloned().collect::<Vec<_>>().join(","),
        None => json_kind(value).to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_v2_entry() {
        let entry = json!({
            "id": "3f2a9c1e-77aa-4c1b-9a55-0d5e1c2b3a4f",
            "name": "nina-clinicasp",
            "connectionStatus": "open",
            "ownerJid": "5511988887777@s.whatsapp.net",
            "profileName": "Nina"
        });
        let parsed = parse_instance(&entry).unwrap();
        assert_eq!(parsed.id.as_deref(), Some("3f2a9c1e-77aa-4c1b-9a55-0d5e1c2b3a4f"));
        assert_eq!(parsed.name.as_deref(), Some("nina-clinicasp"));
        assert_eq!(parsed.state, Some(ConnectionState::Open));
        assert_eq!(parsed.phone.as_deref(), Some("5511988887777"));
    }

    #[test]
    fn nested_v1_entry() {
        let entry = json!({
            "instance": {
                "instanceName": "nina-clinicasp",
                "instanceId": "abc-123",
                "owner": "5511988887777:12@s.whatsapp.net",
                "status": "close"
            }
        });
        let parsed = parse_instance(&entry).unwrap();
        assert_eq!(parsed.id.as_deref(), Some("abc-123"));
        assert_eq!(parsed.name.as_deref(), Some("nina-clinicasp"));
        assert_eq!(parsed.state, Some(ConnectionState::Close));
        assert_eq!(parsed.phone.as_deref(), Some("5511988887777"));
    }

    #[test]
    fn top_level_id_beats_nested_id() {
        let entry = json!({"id": "top", "instance": {"instanceId": "nested"}});
        assert_eq!(parse_instance(&entry).unwrap().id.as_deref(), Some("top"));
    }

    #[test]
    fn empty_strings_fall_through_to_next_path() {
        let entry = json!({"id": "", "instanceId": "second", "ownerJid": "", "number": "+55 11 9"});
        let parsed = parse_instance(&entry).unwrap();
        assert_eq!(parsed.id.as_deref(), Some("second"));
        assert_eq!(parsed.phone.as_deref(), Some("55119"));
    }

    #[test]
    fn unknown_shape_is_none() {
        assert!(parse_instance(&json!({"foo": 1, "bar": "x"})).is_none());
        assert!(parse_instance(&json!("just a string")).is_none());
    }

    #[test]
    fn list_accepts_array_wrapper_and_single_object() {
        let array = json!([{"id": "a", "name": "one"}, {"id": "b", "name": "two"}]);
        assert_eq!(parse_instance_list(&array).len(), 2);

        let wrapped = json!({"instances": [{"id": "a"}]});
        assert_eq!(parse_instance_list(&wrapped)[0].id.as_deref(), Some("a"));

        let data = json!({"data": [{"instanceId": "d"}]});
        assert_eq!(parse_instance_list(&data)[0].id.as_deref(), Some("d"));

        let single = json!({"id": "s", "name": "solo"});
        assert_eq!(parse_instance_list(&single)[0].id.as_deref(), Some("s"));

        assert!(parse_instance_list(&json!(42)).is_empty());
        assert!(parse_instance_list(&json!([])).is_empty());
    }

    #[test]
    fn placeholder_ids() {
        assert!(is_placeholder_id("00000000-0000-0000-0000-000000000000"));
        assert!(is_placeholder_id("0"));
        assert!(is_placeholder_id(""));
        assert!(!is_placeholder_id("11111111-1111-1111-1111-111111111111"));
        assert!(!is_placeholder_id("00000000-0000-0000-0000-00000000000a"));
    }

    #[test]
    fn connection_state_shapes() {
        let v2 = json!({"instance": {"instanceName": "x", "state": "open"}});
        assert_eq!(parse_connection_state(&v2), Some(ConnectionState::Open));

        let flat = json!({"state": "connecting"});
        assert_eq!(parse_connection_state(&flat), Some(ConnectionState::Connecting));

        assert_eq!(parse_connection_state(&json!({"message": "nope"})), None);
    }

    #[test]
    fn qr_image_gets_data_uri_prefix() {
        let body = json!({"base64": "iVBORw0KGgo=", "code": "2@abc", "pairingCode": "WZYEH1YY"});
        match parse_qr_code(&body).unwrap() {
            QrCode::Image { data_uri, pairing_code } => {
                assert_eq!(data_uri, "data:image/png;base64,iVBORw0KGgo=");
                assert_eq!(pairing_code.as_deref(), Some("WZYEH1YY"));
            }
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[test]
    fn qr_image_keeps_existing_prefix() {
        let body = json!({"qrcode": {"base64": "data:image/png;base64,AAAA"}});
        match parse_qr_code(&body).unwrap() {
            QrCode::Image { data_uri, .. } => assert_eq!(data_uri, "data:image/png;base64,AAAA"),
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[test]
    fn qr_raw_code_when_no_image() {
        let body = json!({"code": "2@raw-payload", "count": 1});
        assert_eq!(
            parse_qr_code(&body),
            Some(QrCode::Raw {
                code: "2@raw-payload".into(),
                pairing_code: None
            })
        );
        assert_eq!(parse_qr_code(&json!({"count": 0})), None);
    }
}
