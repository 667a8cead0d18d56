use super::*;
use crate::lexer::{TokenKind, tokenize};

fn kinds(source: &str) -> Vec<TokenKind> {
    tokenize(source).into_iter().map(|t| t.kind).collect()
}

fn field_summary(file: &ProtoFile) -> String {
    let mut out = String::new();
    for message in &file.messages {
        out.push_str(&message.path.join("."));
        out.push('\n');
        for field in &message.fields {
            let label = field.modifier.map(|m| format!("{m} ")).unwrap_or_default();
            out.push_str(&format!(
                "  {label}{} {} = {}\n",
                field.type_name, field.name, field.number
            ));
        }
    }
    out
}

#[test]
fn test_lexer_dotted_identifiers_and_comments() {
    let source = "// leading\nrepeated google.protobuf.Timestamp at = 3; /* trailing */";
    assert_eq!(
        kinds(source),
        vec![
            TokenKind::Ident("repeated".into()),
            TokenKind::Ident("google.protobuf.Timestamp".into()),
            TokenKind::Ident("at".into()),
            TokenKind::Eq,
            TokenKind::Number("3".into()),
            TokenKind::Semi,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_lexer_tracks_lines_and_columns() {
    let tokens = tokenize("message A {\n  int32 x = 1;\n}");
    let x = tokens
        .iter()
        .find(|t| t.kind.is_ident("x"))
        .map(|t| t.span)
        .unwrap();
    assert_eq!((x.line, x.column), (2, 9));

    let close = tokens.iter().rev().nth(1).unwrap();
    assert_eq!(close.kind, TokenKind::RBrace);
    assert_eq!(close.span.line, 3);
}

#[test]
fn test_lexer_negative_numbers_and_errors() {
    assert_eq!(
        kinds("-1 @"),
        vec![
            TokenKind::Number("-1".into()),
            TokenKind::Error("unexpected character `@`".into()),
            TokenKind::Eof,
        ]
    );
    assert_eq!(
        kinds("\"open"),
        vec![
            TokenKind::Error("unterminated string".into()),
            TokenKind::Eof
        ]
    );
}

#[test]
fn test_parse_basic_message() {
    let file = parse(
        r#"
syntax = "proto3";
package shop.v1;

message Widget {
  string name = 1;
  optional int32 age = 2;
  required bool active = 3;
  repeated string tags = 4;
}
"#,
    );

    assert!(file.skipped.is_empty(), "{:?}", file.skipped);
    insta::assert_snapshot!(field_summary(&file), @r"
    Widget
      string name = 1
      optional int32 age = 2
      required bool active = 3
      repeated string tags = 4
    ");

    let widget = file.message(&["Widget"]).unwrap();
    assert!(widget.fields[2].is_required());
    assert!(widget.fields[3].is_repeated());
    assert_eq!(widget.span.line, 5);
}

#[test]
fn test_parse_nested_messages_record_path() {
    let file = parse(
        "message Outer {\n  int64 a = 1;\n  message Inner {\n    string b = 1;\n  }\n  int64 c = 2;\n}\n",
    );

    let paths: Vec<_> = file.messages.iter().map(|m| m.path.join(".")).collect();
    assert_eq!(paths, vec!["Outer", "Outer.Inner"]);

    let outer = file.message(&["Outer"]).unwrap();
    let names: Vec<_> = outer.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["a", "c"]);

    let inner = file.message(&["Outer", "Inner"]).unwrap();
    assert_eq!(inner.name(), "Inner");
    assert_eq!(inner.fields.len(), 1);
}

#[test]
fn test_parse_oneof_members_are_optional() {
    let file = parse(
        r#"
message Payment {
  oneof method {
    string card = 1;
    required string iban = 2;
  }
  int64 amount = 3;
}
"#,
    );

    let payment = file.message(&["Payment"]).unwrap();
    let labels: Vec<_> = payment
        .fields
        .iter()
        .map(|f| (f.name.as_str(), f.modifier))
        .collect();
    assert_eq!(
        labels,
        vec![
            ("card", Some(Modifier::Optional)),
            ("iban", Some(Modifier::Optional)),
            ("amount", None),
        ]
    );
}

#[test]
fn test_parse_ignores_non_message_constructs() {
    let file = parse(
        r#"
import "google/protobuf/timestamp.proto";
option java_package = "com.example";

enum Status {
  UNKNOWN = 0;
  ACTIVE = 1;
}

service Shop {
  rpc Get (Widget) returns (Widget) {
    option (google.api.http) = { get: "/v1/widgets" };
  }
}

message Widget {
  option deprecated = true;
  reserved 2, 3;
  reserved "old";
  extensions 100 to 199;
  enum Kind { SMALL = 0; }
  // a comment line
  string name = 1 [deprecated = true];
}
"#,
    );

    assert!(file.skipped.is_empty(), "{:?}", file.skipped);
    assert_eq!(file.messages.len(), 1);
    assert_eq!(file.messages[0].fields.len(), 1);
    assert_eq!(file.messages[0].fields[0].name, "name");
}

#[test]
fn test_parse_skips_malformed_lines_with_line_numbers() {
    let file = parse(
        "message Widget {\n  string name = 1;\n  map<string, int32> counts = 2;\n  int32 broken = x;\n  garbage\n  int64 total = 5;\n}\n",
    );

    let widget = file.message(&["Widget"]).unwrap();
    let names: Vec<_> = widget.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["name", "total"]);

    let lines: Vec<_> = file.skipped.iter().map(|s| s.line).collect();
    assert_eq!(lines, vec![3, 4, 5]);
    assert_eq!(file.skipped[0].reason, "map fields are not supported");
    assert_eq!(file.skipped[1].text, "int32 broken = x;");
    insta::assert_snapshot!(file.skipped[2].to_string(), @"line 5: garbage (expected a field name after `garbage`)");
}

#[test]
fn test_parse_field_without_semicolon_ends_at_line_end() {
    let file = parse("message A {\n  int32 x = 1\n  int32 y = 2\n}");
    let a = file.message(&["A"]).unwrap();
    assert_eq!(a.fields.len(), 2);
    assert!(file.skipped.is_empty());
}

#[test]
fn test_parse_options_may_span_lines() {
    let file = parse("message A {\n  int32 x = 1 [\n    deprecated = true\n  ];\n}");
    assert!(file.skipped.is_empty(), "{:?}", file.skipped);
    assert_eq!(file.messages[0].fields[0].name, "x");
}

#[test]
fn test_parse_unterminated_message_ends_at_eof() {
    let file = parse("message A {\n  int32 x = 1;\n  string y = 2;");
    assert_eq!(file.messages[0].fields.len(), 2);
}

#[test]
fn test_parse_never_panics_on_junk() {
    for source in ["", "}", "{", "message", "message {", "message A", "oneof", "]]]["] {
        let _ = parse(source);
    }
    let file = parse("message A { oneof { int32 x = 1; } }");
    assert_eq!(file.skipped.len(), 1);
    assert_eq!(file.skipped[0].reason, "malformed oneof header");
}
