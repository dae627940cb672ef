// ABOUTME: Tests for the tool-call table and committed list.
// ABOUTME: Covers append vs replace, capacity limits, and commit ordering.

use super::tool_calls::*;
use crate::llm::ArgumentMode;

fn table() -> ToolCallTable {
    ToolCallTable::new(8, 1024, 64)
}

#[test]
fn test_append_mode_concatenates_fragments() {
    let mut table = table();
    assert!(table.begin(0, Some("call_1"), Some("get_weather")));
    table.extend_arguments(0, r#"{"loc"#, ArgumentMode::Append).unwrap();
    table.extend_arguments(0, r#"":"NYC"}"#, ArgumentMode::Append).unwrap();

    let call = table.commit(0).unwrap();
    assert_eq!(call.id, "call_1");
    assert_eq!(call.name, "get_weather");
    assert_eq!(call.arguments, r#"{"loc":"NYC"}"#);
}

#[test]
fn test_replace_mode_keeps_last_document() {
    let mut table = table();
    table.begin(0, Some("g1"), Some("get_weather"));
    table.extend_arguments(0, r#"{"loc":"NYC"}"#, ArgumentMode::Replace).unwrap();
    table
        .extend_arguments(0, r#"{"loc":"NYC","unit":"F"}"#, ArgumentMode::Replace)
        .unwrap();

    assert_eq!(table.commit(0).unwrap().arguments, r#"{"loc":"NYC","unit":"F"}"#);
}

#[test]
fn test_begin_is_idempotent() {
    let mut table = table();
    table.begin(1, Some("call_2"), None);
    table.begin(1, None, Some("search"));
    table.begin(1, None, None);

    let pending = table.get(1).unwrap();
    assert_eq!(pending.id(), "call_2");
    assert_eq!(pending.name(), "search");
    assert_eq!(table.open_count(), 1);
}

#[test]
fn test_out_of_range_indices_ignored() {
    let mut table = ToolCallTable::new(2, 1024, 64);
    assert!(!table.begin(2, Some("x"), Some("y")));
    assert!(!table.begin(-1, Some("x"), Some("y")));
    assert!(!table.extend_arguments(5, "{}", ArgumentMode::Append).unwrap());
    assert_eq!(table.open_count(), 0);
    assert!(table.commit(7).is_none());
}

#[test]
fn test_arguments_without_begin_open_slot() {
    let mut table = table();
    assert!(table.extend_arguments(3, "{}", ArgumentMode::Append).unwrap());
    let call = table.commit(3).unwrap();
    assert_eq!(call.arguments, "{}");
    assert!(call.id.is_empty());
}

#[test]
fn test_argument_cap_rejects_fragment() {
    let mut table = ToolCallTable::new(1, 8, 64);
    table.extend_arguments(0, "{\"a\":", ArgumentMode::Append).unwrap();
    assert!(table.extend_arguments(0, "\"long\"}", ArgumentMode::Append).is_err());
    assert_eq!(table.get(0).unwrap().arguments(), "{\"a\":");
}

#[test]
fn test_commit_all_in_index_order() {
    let mut table = table();
    table.begin(2, Some("c"), Some("third"));
    table.begin(0, Some("a"), Some("first"));
    table.begin(1, Some("b"), Some("second"));

    let calls = table.commit_all();
    let names: Vec<_> = calls.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["first", "second", "third"]);
    assert_eq!(table.open_count(), 0);
    assert!(table.commit_all().is_empty());
}

#[test]
fn test_identifiers_truncated_on_char_boundary() {
    let mut table = ToolCallTable::new(1, 64, 5);
    table.begin(0, Some("abcdéf"), Some("toolname"));
    let pending = table.get(0).unwrap();
    // 'é' occupies bytes 4..6, so the cut falls back to 4.
    assert_eq!(pending.id(), "abcd");
    assert_eq!(pending.name(), "tooln");
}

#[test]
fn test_list_respects_capacity() {
    let mut list = ToolCallList::new(1);
    let call = |id: &str| crate::llm::ToolCall {
        id: id.into(),
        name: "t".into(),
        arguments: "{}".into(),
    };
    assert!(list.push(call("a")));
    assert!(!list.push(call("b")));
    assert_eq!(list.len(), 1);
    assert_eq!(list.as_slice()[0].id, "a");
}
