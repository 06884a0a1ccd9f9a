//! Wire level tests for sliding sync extension merging and response decoding.

use std::collections::HashSet;

use matrixon_sliding_sync::{
    extensions::{self, Request, ToDeviceResponse, TypingResponse},
    included_room_ids_in_ops, OpKind, Response, ResponseOp,
};
use serde_json::json;
use test_log::test;

fn request(value: serde_json::Value) -> Request {
    serde_json::from_value(value).unwrap()
}

fn op(value: serde_json::Value) -> ResponseOp {
    serde_json::from_value(value).unwrap()
}

#[test]
fn test_to_device_enabled_stays_sticky_while_limit_updates() {
    let mut conn = request(json!({"to_device": {"enabled": true, "limit": 5}}));
    conn.apply_delta(request(json!({"to_device": {"limit": 10}})));

    let to_device = conn.to_device.as_ref().unwrap();
    assert_eq!(to_device.core.enabled, Some(true));
    assert_eq!(to_device.limit, Some(10));

    let names: Vec<&str> = conn.enabled_extensions().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["to_device"]);
}

#[test]
fn test_fully_specified_delta_wins_field_by_field() {
    let mut conn = request(json!({
        "to_device": {"enabled": true, "limit": 5, "since": "1"},
        "e2ee": {"enabled": true},
        "account_data": {"enabled": false},
        "typing": {"enabled": true},
        "receipts": {},
    }));
    conn.apply_delta(request(json!({
        "to_device": {"enabled": false, "since": "8"},
        "e2ee": {"enabled": false},
        "account_data": {"enabled": true},
        "typing": {},
        "receipts": {"enabled": true},
    })));

    assert_eq!(
        serde_json::to_value(&conn).unwrap(),
        json!({
            "to_device": {"enabled": false, "limit": 5, "since": "8"},
            "e2ee": {"enabled": false},
            "account_data": {"enabled": true},
            "typing": {"enabled": true},
            "receipts": {"enabled": true},
        })
    );
}

#[test]
fn test_sync_range_op_includes_rooms() {
    let op = op(json!({"op": "SYNC", "range": [0, 2], "rooms": [{"room_id": "!a"}, {"room_id": "!b"}]}));
    assert!(matches!(op, ResponseOp::Range(_)));
    assert_eq!(op.op(), &OpKind::Sync);
    assert_eq!(op.included_room_ids(), vec!["!a", "!b"]);
}

#[test]
fn test_delete_at_index_zero() {
    let op = op(json!({"op": "DELETE", "index": 0}));
    let ResponseOp::Single(single) = &op else {
        panic!("expected a single op, got {op:?}");
    };
    assert_eq!(single.index, Some(0));
    assert!(op.included_room_ids().is_empty());
}

#[test]
fn test_extensions_has_data() {
    let mut res = extensions::Response {
        typing: Some(TypingResponse::default()),
        ..Default::default()
    };
    assert!(!res.has_data(true));

    res.to_device = Some(ToDeviceResponse {
        next_batch: "0".to_owned(),
        events: Vec::new(),
    });
    assert!(res.has_data(true));
}

#[test]
fn test_pos_int_is_lenient() {
    let res: Response = serde_json::from_value(json!({"pos": "42"})).unwrap();
    assert_eq!(res.pos_int(), 42);

    let res: Response = serde_json::from_value(json!({"pos": "not-a-number"})).unwrap();
    assert_eq!(res.pos_int(), 0);
}

#[test]
fn test_response_round_trip() {
    let body = json!({
        "lists": [
            {
                "ops": [
                    {"op": "SYNC", "range": [0, 1], "rooms": [{"room_id": "!a"}, {"room_id": "!b"}]},
                    {"op": "INVALIDATE", "range": [10, 20]},
                ],
                "count": 42,
            },
            {
                "ops": [
                    {"op": "INSERT", "index": 0, "room": {"room_id": "!c"}},
                    {"op": "UPDATE", "index": 3, "room": {"room_id": "!a"}},
                    {"op": "DELETE", "index": 5},
                ],
                "count": 6,
            },
        ],
        "rooms": {"!a": {"room_id": "!a", "name": "Alpha"}},
        "extensions": {
            "to_device": {"next_batch": "12", "events": [{"type": "m.room_key"}]},
            "e2ee": {"device_one_time_keys_count": {"signed_curve25519": 50}},
        },
        "pos": "99",
        "session_id": "sess",
    });

    let res = Response::from_slice(body.to_string().as_bytes()).unwrap();
    assert_eq!(res.list_ops(), 5);
    assert_eq!(res.pos_int(), 99);

    let expected: HashSet<String> = ["!a", "!b", "!c"].into_iter().map(String::from).collect();
    assert_eq!(included_room_ids_in_ops(&res.lists), expected);

    let reencoded = res.to_vec().unwrap();
    let again = Response::from_slice(&reencoded).unwrap();
    assert_eq!(again, res);

    let value: serde_json::Value = serde_json::from_slice(&reencoded).unwrap();
    assert_eq!(value["lists"][1]["ops"][2], json!({"op": "DELETE", "index": 5}));
    assert_eq!(value["lists"][0]["ops"][1], json!({"op": "INVALIDATE", "range": [10, 20]}));
}

#[test]
fn test_bad_op_fails_whole_decode() {
    let body = json!({
        "lists": [{"ops": [{"op": "SYNC", "range": [0, 1]}, {"op": "INSERT", "room": "!a"}], "count": 1}],
        "pos": "1",
    });
    let err = Response::from_slice(body.to_string().as_bytes()).unwrap_err();
    assert!(err.as_json_error().is_some());
}

#[test]
fn test_server_nulls_decode() {
    let body = json!({"lists": [{"ops": null, "count": 3}], "rooms": null, "pos": "5"});
    let res = Response::from_slice(body.to_string().as_bytes()).unwrap();
    assert_eq!(res.list_ops(), 0);
    assert_eq!(res.lists[0].count, 3);
    assert!(res.rooms.is_empty());
    assert!(res.included_room_ids().is_empty());

    let op = op(json!({"op": "INVALIDATE", "range": [0, 1], "rooms": null}));
    assert!(matches!(op, ResponseOp::Range(_)));
    assert!(op.included_room_ids().is_empty());
}
