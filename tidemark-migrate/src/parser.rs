//! SQL migration file parsing.
//!
//! A migration file carries both directions, separated by marker lines:
//!
//! ```text
//! -- migrate:up
//! CREATE TABLE users (id BIGINT PRIMARY KEY);
//!
//! -- migrate:down tx=false
//! DROP TABLE users;
//! ```
//!
//! [`parse`] splits a file into its two bodies and [`split_statements`] turns a
//! body into individual statements. Both run to completion before anything is
//! executed, so a malformed file never reaches the database.

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Marker lines recognised in SQL migration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Markers {
    /// Starts the up section.
    pub up: String,
    /// Starts the down section.
    pub down: String,
    /// Opens a block that is executed as one statement.
    pub statement_begin: String,
    /// Closes a statement block.
    pub statement_end: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            up: "-- migrate:up".to_string(),
            down: "-- migrate:down".to_string(),
            statement_begin: "-- tidemark:statement:begin".to_string(),
            statement_end: "-- tidemark:statement:end".to_string(),
        }
    }
}

/// The two bodies of a migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMigration {
    /// Up body.
    pub up: String,
    /// Down body, empty when the file has no down marker.
    pub down: String,
    /// Whether the up body runs in a transaction.
    pub tx_up: bool,
    /// Whether the down body runs in a transaction.
    pub tx_down: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Up,
    Down,
}

/// Split a migration file into its up and down bodies.
///
/// Content before the first marker is discarded. A `tx=true|false` directive
/// after a marker overrides `default_transactional` for that direction only.
pub fn parse(
    source: &str,
    markers: &Markers,
    default_transactional: bool,
) -> Result<ParsedMigration, ParseError> {
    let mut section = Section::Header;
    let mut seen_up = false;
    let mut up = Vec::new();
    let mut down = Vec::new();
    let mut tx_up = default_transactional;
    let mut tx_down = default_transactional;

    for (idx, line) in source.lines().enumerate() {
        let lineno = idx + 1;

        if let Some(rest) = marker_rest(line, &markers.up) {
            if let Some(tx) = directive(rest, lineno)? {
                tx_up = tx;
            }
            section = Section::Up;
            seen_up = true;
            continue;
        }

        if let Some(rest) = marker_rest(line, &markers.down) {
            if let Some(tx) = directive(rest, lineno)? {
                tx_down = tx;
            }
            section = Section::Down;
            continue;
        }

        match section {
            Section::Header => {}
            Section::Up => up.push(line),
            Section::Down => down.push(line),
        }
    }

    if !seen_up {
        return Err(ParseError::MissingUpMarker {
            marker: markers.up.clone(),
        });
    }

    Ok(ParsedMigration {
        up: join_body(&up),
        down: join_body(&down),
        tx_up,
        tx_down,
    })
}

/// If `line` is the given marker, return whatever follows it.
fn marker_rest<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let rest = line.trim_start().strip_prefix(marker)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest),
        Some(_) => None,
    }
}

/// Parse the directives after a direction marker.
fn directive(rest: &str, line: usize) -> Result<Option<bool>, ParseError> {
    let mut tx = None;
    for token in rest.split_whitespace() {
        tx = match token {
            "tx=true" => Some(true),
            "tx=false" => Some(false),
            other => {
                return Err(ParseError::MalformedMarker {
                    line,
                    message: format!("unknown directive '{}'", other),
                });
            }
        };
    }
    Ok(tx)
}

/// Join body lines, dropping blank lines at either end.
fn join_body(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

/// Split a body into individual statements.
///
/// Semicolons end a statement unless they sit inside a quoted literal, a
/// comment, or a statement block delimited by the begin/end markers. Comments
/// are kept in the statement text. Statements are trimmed, and statements
/// with nothing but whitespace and comments are dropped.
pub fn split_statements(body: &str, markers: &Markers) -> Result<Vec<String>, ParseError> {
    let mut splitter = Splitter::default();

    for (idx, line) in body.lines().enumerate() {
        let lineno = idx + 1;

        if !splitter.in_literal() && !splitter.in_block_comment {
            if marker_rest(line, &markers.statement_begin).is_some() {
                if splitter.block.is_some() {
                    return Err(ParseError::NestedStatementBlock { line: lineno });
                }
                splitter.flush();
                splitter.block = Some((lineno, String::new()));
                continue;
            }

            if marker_rest(line, &markers.statement_end).is_some() {
                match splitter.block.take() {
                    Some((_, text)) => {
                        let text = text.trim();
                        if !text.is_empty() {
                            splitter.statements.push(text.to_string());
                        }
                    }
                    None => return Err(ParseError::UnmatchedStatementEnd { line: lineno }),
                }
                continue;
            }
        }

        if let Some((_, text)) = &mut splitter.block {
            text.push_str(line);
            text.push('\n');
            continue;
        }

        splitter.scan_line(line, lineno);
    }

    if let Some((start, _)) = splitter.block {
        return Err(ParseError::UnterminatedStatementBlock { line: start });
    }
    if splitter.in_literal() {
        return Err(ParseError::UnterminatedLiteral {
            line: splitter.literal_line,
        });
    }
    if splitter.in_block_comment {
        return Err(ParseError::UnterminatedComment {
            line: splitter.comment_line,
        });
    }

    splitter.flush();
    Ok(splitter.statements)
}

#[derive(Default)]
struct Splitter {
    statements: Vec<String>,
    current: String,
    has_code: bool,
    in_single: bool,
    in_double: bool,
    in_block_comment: bool,
    escaped: bool,
    literal_line: usize,
    comment_line: usize,
    block: Option<(usize, String)>,
}

impl Splitter {
    fn in_literal(&self) -> bool {
        self.in_single || self.in_double
    }

    fn flush(&mut self) {
        let stmt = self.current.trim();
        if self.has_code && !stmt.is_empty() {
            self.statements.push(stmt.to_string());
        }
        self.current.clear();
        self.has_code = false;
    }

    fn scan_line(&mut self, line: &str, lineno: usize) {
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            if self.in_block_comment {
                self.current.push(c);
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    self.current.push('/');
                    self.in_block_comment = false;
                }
                continue;
            }

            if self.in_literal() {
                self.current.push(c);
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if self.in_single && c == '\'' {
                    self.in_single = false;
                } else if self.in_double && c == '"' {
                    self.in_double = false;
                }
                continue;
            }

            match c {
                '-' if chars.peek() == Some(&'-') => {
                    // line comment runs to the end of the line
                    self.current.push(c);
                    self.current.extend(chars.by_ref());
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    self.current.push_str("/*");
                    self.in_block_comment = true;
                    self.comment_line = lineno;
                }
                '\'' | '"' => {
                    if c == '\'' {
                        self.in_single = true;
                    } else {
                        self.in_double = true;
                    }
                    self.literal_line = lineno;
                    self.has_code = true;
                    self.current.push(c);
                }
                '\\' => {
                    self.has_code = true;
                    self.current.push(c);
                    if let Some(next) = chars.next() {
                        self.current.push(next);
                    }
                }
                ';' => self.flush(),
                c => {
                    if !c.is_whitespace() {
                        self.has_code = true;
                    }
                    self.current.push(c);
                }
            }
        }

        self.current.push('\n');
        self.escaped = false;
    }
}
