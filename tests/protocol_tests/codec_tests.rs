//! Codec Tests
//!
//! Tests for command and response wire framing.

use serengeti_core::protocol::{decode_command, decode_response, encode_command, encode_response, frame_len, Command, Response};
use serengeti_core::query::planner::SelectRequest;

fn select(db: &str, table: &str) -> SelectRequest {
    SelectRequest {
        db: db.to_string(),
        table: table.to_string(),
        columns: Vec::new(),
        predicate: None,
        join: None,
        order_by: None,
        limit: None,
        distinct: false,
        aggregate: None,
    }
}

// =============================================================================
// Command Encoding/Decoding Tests
// =============================================================================

#[test]
fn test_encode_decode_create_database() {
    let cmd = Command::CreateDatabase {
        db: "shop".to_string(),
    };
    let frame = encode_command(&cmd).unwrap();
    let decoded = decode_command(&frame).unwrap();

    match decoded {
        Command::CreateDatabase { db } => assert_eq!(db, "shop"),
        other => panic!("expected CreateDatabase, got {other:?}"),
    }
}

#[test]
fn test_encode_decode_insert() {
    let cmd = Command::Insert {
        db: "shop".to_string(),
        table: "orders".to_string(),
        columns: vec!["id".to_string(), "status".to_string()],
        values: vec!["1".to_string(), "pending".to_string()],
    };
    let frame = encode_command(&cmd).unwrap();
    let decoded = decode_command(&frame).unwrap();

    match decoded {
        Command::Insert { db, table, columns, values } => {
            assert_eq!(db, "shop");
            assert_eq!(table, "orders");
            assert_eq!(columns, vec!["id", "status"]);
            assert_eq!(values, vec!["1", "pending"]);
        }
        other => panic!("expected Insert, got {other:?}"),
    }
}

#[test]
fn test_encode_decode_select_request() {
    let cmd = Command::Select(select("shop", "orders"));
    let frame = encode_command(&cmd).unwrap();
    let decoded = decode_command(&frame).unwrap();

    match decoded {
        Command::Select(request) => {
            assert_eq!(request.db, "shop");
            assert_eq!(request.table, "orders");
            assert!(request.predicate.is_none());
        }
        other => panic!("expected Select, got {other:?}"),
    }
}

#[test]
fn test_encode_decode_delete_everything() {
    let cmd = Command::DeleteEverything;
    let frame = encode_command(&cmd).unwrap();
    let decoded = decode_command(&frame).unwrap();
    assert!(matches!(decoded, Command::DeleteEverything));
}

#[test]
fn test_encode_decode_empty_strings() {
    let cmd = Command::CreateTable {
        db: String::new(),
        table: String::new(),
    };
    let frame = encode_command(&cmd).unwrap();
    let decoded = decode_command(&frame).unwrap();

    match decoded {
        Command::CreateTable { db, table } => {
            assert!(db.is_empty());
            assert!(table.is_empty());
        }
        other => panic!("expected CreateTable, got {other:?}"),
    }
}

// =============================================================================
// Response Encoding/Decoding Tests
// =============================================================================

#[test]
fn test_encode_decode_response_ok() {
    let resp = Response::ok("select", 5).with_list(vec![serde_json::json!({"id": 1})]);
    let frame = encode_response(&resp).unwrap();
    let decoded = decode_response(&frame).unwrap();

    assert!(decoded.executed);
    assert!(decoded.error.is_none());
    assert_eq!(decoded.list.unwrap().len(), 1);
    assert_eq!(decoded.runtime_ms, 5);
}

#[test]
fn test_encode_decode_response_failed() {
    let resp = Response::failed("select", 2, "table not found");
    let frame = encode_response(&resp).unwrap();
    let decoded = decode_response(&frame).unwrap();

    assert!(!decoded.executed);
    assert_eq!(decoded.error.as_deref(), Some("table not found"));
    assert!(decoded.list.is_none());
}

#[test]
fn test_encode_decode_response_with_placement() {
    let primary = uuid::Uuid::new_v4();
    let secondary = uuid::Uuid::new_v4();
    let resp = Response::ok("insert", 1).with_placement(primary, secondary);
    let frame = encode_response(&resp).unwrap();
    let decoded = decode_response(&frame).unwrap();

    assert_eq!(decoded.primary, Some(primary));
    assert_eq!(decoded.secondary, Some(secondary));
}

// =============================================================================
// Error Handling Tests
// =============================================================================

#[test]
fn test_truncated_length_prefix() {
    let bytes = [0x01, 0x00, 0x00]; // only 3 bytes, need 4
    let result = decode_command(&bytes);
    assert!(result.is_err());
}

#[test]
fn test_truncated_payload() {
    // Header claims a 100-byte payload, but only 2 bytes follow.
    let mut bytes = vec![100u8, 0, 0, 0];
    bytes.extend_from_slice(&[0xAB, 0xCD]);
    let result = decode_command(&bytes);
    assert!(result.is_err());
}

#[test]
fn test_garbage_payload_fails_to_decode() {
    let mut bytes = vec![4u8, 0, 0, 0];
    bytes.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
    let result = decode_command(&bytes);
    assert!(result.is_err());
}

// =============================================================================
// Frame Length Helper
// =============================================================================

#[test]
fn test_frame_len_reads_little_endian_prefix() {
    let prefix = [0x2A, 0x00, 0x00, 0x00];
    assert_eq!(frame_len(&prefix), 42);
}

#[test]
fn test_round_trip_preserves_frame_length_prefix() {
    let cmd = Command::ShowDatabases;
    let frame = encode_command(&cmd).unwrap();
    let mut prefix = [0u8; 4];
    prefix.copy_from_slice(&frame[..4]);
    assert_eq!(frame_len(&prefix), frame.len() - 4);
}
