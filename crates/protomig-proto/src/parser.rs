use crate::lexer::{Lexer, Span, Token, TokenKind};
use crate::{Field, Message, Modifier, ProtoFile, SkippedLine};

/// Parse a declaration source. Never fails: statements that can't be
/// interpreted end up in [`ProtoFile::skipped`].
pub fn parse(source: &str) -> ProtoFile {
    let tokens = Lexer::new(source).tokenize();
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        file: ProtoFile::default(),
    };
    parser.parse_top_level();
    parser.file
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    file: ProtoFile,
}

impl<'a> Parser<'a> {
    fn parse_top_level(&mut self) {
        while !self.at_eof() {
            let kind = self.peek().kind.clone();
            match kind.ident() {
                Some("message") => self.parse_message(&[]),
                Some("enum" | "extend" | "service") => self.skip_block(),
                Some("syntax" | "edition" | "package" | "import" | "option") => {
                    self.skip_silently();
                }
                _ => match kind {
                    TokenKind::Semi => self.pos += 1,
                    TokenKind::RBrace => {
                        let token = self.bump();
                        self.skip(token.span, "unmatched `}`");
                    }
                    _ => {
                        let span = self.statement();
                        self.skip_statement(span, "unexpected statement outside a message");
                    }
                },
            }
        }
    }

    /// Parse `message Name { ... }` starting at the `message` keyword.
    fn parse_message(&mut self, outer: &[String]) {
        let keyword = self.bump();

        let name = match self.peek().kind.ident() {
            Some(name) if !is_reserved(name) => name.to_string(),
            _ => {
                let span = self.statement();
                self.skip_statement(keyword.span.to(span), "malformed message header");
                return;
            }
        };
        self.pos += 1;

        if self.peek().kind != TokenKind::LBrace {
            let span = self.statement();
            self.skip(keyword.span.to(span), "expected `{` after message name");
            return;
        }
        self.pos += 1;

        let mut path = outer.to_vec();
        path.push(name);

        let index = self.file.messages.len();
        self.file.messages.push(Message {
            path: path.clone(),
            fields: Vec::new(),
            span: keyword.span,
        });

        self.parse_body(&path, index, None);
    }

    /// Parse statements until the closing `}` (consumed) or end of input.
    ///
    /// `forced` overrides the label of every field, which is how oneof
    /// members become optional.
    fn parse_body(&mut self, path: &[String], index: usize, forced: Option<Modifier>) {
        loop {
            let kind = self.peek().kind.clone();
            match kind {
                TokenKind::Eof => return,
                TokenKind::RBrace => {
                    self.pos += 1;
                    return;
                }
                TokenKind::Semi => {
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }

            match kind.ident() {
                Some("message") if forced.is_none() => self.parse_message(path),
                Some("enum" | "extend" | "service") => self.skip_block(),
                Some("oneof") if forced.is_none() => self.parse_oneof(path, index),
                Some("option" | "reserved" | "extensions") => self.skip_silently(),
                _ => {
                    let start = self.pos;
                    let span = self.statement();
                    if self.peek().kind == TokenKind::LBrace {
                        self.skip_statement(span, "unsupported block");
                        continue;
                    }
                    match match_field(&self.tokens[start..self.pos]) {
                        Ok(mut field) => {
                            if forced.is_some() {
                                field.modifier = forced;
                            }
                            self.file.messages[index].fields.push(field);
                        }
                        Err(reason) => self.skip(span, &reason),
                    }
                }
            }
        }
    }

    fn parse_oneof(&mut self, path: &[String], index: usize) {
        let keyword = self.bump();
        let header_ok = self.peek().kind.ident().is_some()
            && self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&TokenKind::LBrace);

        if !header_ok {
            let span = self.statement();
            self.skip_statement(keyword.span.to(span), "malformed oneof header");
            return;
        }
        self.pos += 2;
        self.parse_body(path, index, Some(Modifier::Optional));
    }

    /// Skip a `keyword ... { ... }` block, nested braces included.
    fn skip_block(&mut self) {
        while !self.at_eof() {
            match self.bump().kind {
                TokenKind::LBrace => break,
                // A block header that never opens is just a statement.
                TokenKind::Semi => return,
                _ => {}
            }
        }

        let mut depth = 1usize;
        while depth > 0 && !self.at_eof() {
            match self.bump().kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth -= 1,
                _ => {}
            }
        }
    }

    /// Consume one statement and return its span.
    ///
    /// A statement ends at `;` (consumed), before `{` or `}`, or at the end of
    /// its line unless the line break falls inside `[...]` options.
    fn statement(&mut self) -> Span {
        let first = self.peek().span;
        let mut last = first;
        let mut consumed = false;
        let mut brackets = 0usize;

        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Eof | TokenKind::LBrace | TokenKind::RBrace => return first.to(last),
                TokenKind::Semi if brackets == 0 => {
                    let span = token.span;
                    self.pos += 1;
                    return first.to(span);
                }
                _ => {}
            }
            if consumed && brackets == 0 && token.span.line > last.line {
                return first.to(last);
            }

            match token.kind {
                TokenKind::LBracket => brackets += 1,
                TokenKind::RBracket => brackets = brackets.saturating_sub(1),
                _ => {}
            }
            last = token.span;
            consumed = true;
            self.pos += 1;
        }
    }

    /// Skip a valid statement we have no use for. Aggregate option values
    /// (`option (x) = { ... };`) bring a block along.
    fn skip_silently(&mut self) {
        self.statement();
        if self.peek().kind == TokenKind::LBrace {
            self.skip_block();
            if self.peek().kind == TokenKind::Semi {
                self.pos += 1;
            }
        }
    }

    /// Record an unparseable statement; if it opens a block, skip the block
    /// too so its contents aren't mistaken for fields.
    fn skip_statement(&mut self, span: Span, reason: &str) {
        if self.peek().kind == TokenKind::LBrace {
            let start = self.pos;
            self.skip_block();
            let end = self.tokens[self.pos.saturating_sub(1).max(start)].span;
            self.skip(span.to(end), reason);
        } else {
            self.skip(span, reason);
        }
    }

    fn skip(&mut self, span: Span, reason: &str) {
        let text = self
            .source
            .get(span.start..span.end)
            .unwrap_or_default()
            .trim()
            .to_string();
        self.file.skipped.push(SkippedLine {
            line: span.line,
            text,
            reason: reason.to_string(),
        });
    }

    fn peek(&self) -> &Token {
        // The token list always ends with Eof, and `pos` never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }
}

fn is_reserved(word: &str) -> bool {
    matches!(
        word,
        "message" | "enum" | "oneof" | "service" | "extend" | "option"
    )
}

/// Match `[label] type name = number [options] [;]`.
fn match_field(tokens: &[Token]) -> Result<Field, String> {
    if let Some(TokenKind::Error(msg)) = tokens
        .iter()
        .map(|t| &t.kind)
        .find(|k| matches!(k, TokenKind::Error(_)))
    {
        return Err(msg.clone());
    }

    let tokens = match tokens.split_last() {
        Some((last, rest)) if last.kind == TokenKind::Semi => rest,
        _ => tokens,
    };
    let (Some(first), Some(last)) = (tokens.first(), tokens.last()) else {
        return Err("empty statement".to_string());
    };
    let span = first.span.to(last.span);

    let mut rest = tokens.iter().map(|t| &t.kind).peekable();

    let modifier = match rest.peek().and_then(|k| k.ident()) {
        Some("repeated") => Some(Modifier::Repeated),
        Some("optional") => Some(Modifier::Optional),
        Some("required") => Some(Modifier::Required),
        _ => None,
    };
    if modifier.is_some() {
        rest.next();
    }

    let type_name = match rest.next() {
        Some(TokenKind::Ident(t)) => t.clone(),
        Some(other) => return Err(format!("expected a field type, found {other}")),
        None => return Err("expected a field type".to_string()),
    };
    if type_name == "map" && rest.peek() == Some(&&TokenKind::LAngle) {
        return Err("map fields are not supported".to_string());
    }
    if type_name == "group" {
        return Err("groups are not supported".to_string());
    }

    let name = match rest.next() {
        Some(TokenKind::Ident(n)) => n.clone(),
        Some(other) => return Err(format!("expected a field name, found {other}")),
        None => return Err(format!("expected a field name after `{type_name}`")),
    };

    match rest.next() {
        Some(TokenKind::Eq) => {}
        Some(other) => return Err(format!("expected `=` after `{name}`, found {other}")),
        None => return Err(format!("expected `=` after `{name}`")),
    }

    let number = match rest.next() {
        Some(TokenKind::Number(raw)) => raw
            .parse::<u32>()
            .map_err(|_| format!("invalid field number `{raw}`"))?,
        Some(other) => return Err(format!("field number must be an integer, found {other}")),
        None => return Err("missing field number".to_string()),
    };

    if rest.peek() == Some(&&TokenKind::LBracket) {
        rest.next();
        let mut depth = 1usize;
        while depth > 0 {
            match rest.next() {
                Some(TokenKind::LBracket) => depth += 1,
                Some(TokenKind::RBracket) => depth -= 1,
                Some(_) => {}
                None => return Err("unterminated field options".to_string()),
            }
        }
    }

    if let Some(extra) = rest.next() {
        return Err(format!("unexpected {extra} after field"));
    }

    Ok(Field {
        modifier,
        type_name,
        name,
        number,
        span,
    })
}
