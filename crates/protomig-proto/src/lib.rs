//! Lenient parser for protobuf-style `message` declarations.
//!
//! Only the parts of a `.proto` file that describe data shapes are kept:
//! messages (including nested ones) and their fields. Everything else that is
//! valid protobuf (`syntax`, `package`, `enum`, `service`, options, ...) is
//! skipped silently, and anything that can't be understood is reported as a
//! [`SkippedLine`] rather than failing the whole file.
//!
//! ```
//! let file = protomig_proto::parse("message Widget { repeated string tags = 1; }");
//! assert_eq!(file.messages[0].name(), "Widget");
//! assert!(file.messages[0].fields[0].is_repeated());
//! ```

pub mod lexer;
mod parser;

pub use lexer::Span;
pub use parser::parse;

use std::fmt;

/// A parsed source file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtoFile {
    /// Messages in order of appearance; an outer message precedes the
    /// messages nested inside it.
    pub messages: Vec<Message>,
    /// Statements that were not understood.
    pub skipped: Vec<SkippedLine>,
}

impl ProtoFile {
    /// Look up a message by its full path.
    pub fn message(&self, path: &[&str]) -> Option<&Message> {
        self.messages
            .iter()
            .find(|m| m.path.iter().map(String::as_str).eq(path.iter().copied()))
    }
}

/// A `message` block.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Names from the outermost enclosing message down to this one.
    pub path: Vec<String>,
    /// Fields in declaration order (oneof members included).
    pub fields: Vec<Field>,
    /// Location of the `message` keyword.
    pub span: Span,
}

impl Message {
    /// The message's own (innermost) name.
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }
}

/// Field label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Repeated,
    Optional,
    Required,
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Modifier::Repeated => "repeated",
            Modifier::Optional => "optional",
            Modifier::Required => "required",
        })
    }
}

/// A field statement inside a message.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// `None` for proto3-style fields without a label.
    pub modifier: Option<Modifier>,
    /// Type as written, e.g. `int64` or `google.protobuf.Timestamp`.
    pub type_name: String,
    pub name: String,
    pub number: u32,
    pub span: Span,
}

impl Field {
    pub fn is_repeated(&self) -> bool {
        self.modifier == Some(Modifier::Repeated)
    }

    pub fn is_required(&self) -> bool {
        self.modifier == Some(Modifier::Required)
    }
}

/// A statement the parser could not interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line where the statement starts.
    pub line: usize,
    /// The statement's source text.
    pub text: String,
    /// Why it was skipped.
    pub reason: String,
}

impl fmt::Display for SkippedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} ({})", self.line, self.text, self.reason)
    }
}

#[cfg(test)]
mod tests;
