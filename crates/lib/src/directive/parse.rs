//! Parser for the helper stdout line protocol.
//!
//! Parsing is line-at-a-time, order-preserving, single-pass. A line either
//! matches a recognized directive prefix (and must then be well-formed, or
//! parsing fails for the whole run) or is passed through as plain log output.

use std::path::PathBuf;

use thiserror::Error;

use super::{BuildDirective, LinkKind};

/// A recognized directive prefix with malformed arguments.
///
/// `line` is 1-based; `column` is the 1-based byte offset of the offending
/// argument within the line.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed directive at line {line}, column {column}: {message} in `{text}`")]
pub struct ParseError {
  pub line: usize,
  pub column: usize,
  pub message: String,
  pub text: String,
}

impl ParseError {
  fn new(line_no: usize, column: usize, message: impl Into<String>, text: &str) -> Self {
    Self {
      line: line_no,
      column,
      message: message.into(),
      text: text.to_string(),
    }
  }
}

/// Everything a helper printed, split into directives and plain log lines.
///
/// Directive order is the order the lines appeared in; so is log-line order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOutput {
  pub directives: Vec<BuildDirective>,
  pub log_lines: Vec<String>,
}

/// Parse one stdout line.
///
/// Returns `Ok(None)` for lines that match no recognized prefix (plain log
/// output). `line_no` is 1-based and only used for error reporting.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<BuildDirective>, ParseError> {
  let Some((prefix, rest)) = line.split_once(':') else {
    return Ok(None);
  };

  // Column of the payload (after `prefix:`), for error positions.
  let payload_col = prefix.len() + 2;

  let directive = match prefix {
    "flag" => parse_flag(line_no, payload_col, rest, line)?,
    "link-lib" => parse_link_lib(line_no, payload_col, rest, line)?,
    "env" => {
      let (key, value) = split_key_value(line_no, payload_col, rest, line)?;
      BuildDirective::EnvVar { key, value }
    }
    "rerun-if-changed" => {
      if rest.is_empty() {
        return Err(ParseError::new(line_no, payload_col, "missing path", line));
      }
      BuildDirective::RerunIfChanged {
        path: PathBuf::from(rest),
      }
    }
    "rerun-if-env-changed" => {
      if rest.is_empty() {
        return Err(ParseError::new(line_no, payload_col, "missing variable name", line));
      }
      BuildDirective::RerunIfEnvChanged { key: rest.to_string() }
    }
    "warning" => BuildDirective::Warning { text: rest.to_string() },
    "metadata" => {
      let (key, value) = split_key_value(line_no, payload_col, rest, line)?;
      BuildDirective::Metadata { key, value }
    }
    _ => return Ok(None),
  };

  Ok(Some(directive))
}

/// Parse a full stdout capture into directives and log lines.
///
/// Single pass, no backtracking. The first malformed recognized directive
/// aborts parsing; directives emitted before it are discarded by the caller.
pub fn parse_output(input: &str) -> Result<ParsedOutput, ParseError> {
  let mut out = ParsedOutput::default();

  for (idx, line) in input.lines().enumerate() {
    match parse_line(idx + 1, line)? {
      Some(directive) => out.directives.push(directive),
      None => out.log_lines.push(line.to_string()),
    }
  }

  Ok(out)
}

fn parse_flag(line_no: usize, col: usize, rest: &str, line: &str) -> Result<BuildDirective, ParseError> {
  if rest.is_empty() {
    return Err(ParseError::new(line_no, col, "flag directive missing its value", line));
  }

  // `-L` and `-l` flags are recognized link instructions, as emitted by
  // tools like pkg-config; everything else is passed through opaquely.
  if let Some(path) = rest.strip_prefix("-L") {
    if path.is_empty() {
      return Err(ParseError::new(line_no, col + 2, "-L flag missing its path", line));
    }
    return Ok(BuildDirective::LinkSearchPath {
      path: PathBuf::from(path),
    });
  }

  if let Some(name) = rest.strip_prefix("-l") {
    if name.is_empty() {
      return Err(ParseError::new(line_no, col + 2, "-l flag missing its library", line));
    }
    return Ok(BuildDirective::LinkLibrary {
      name: name.to_string(),
      kind: None,
    });
  }

  Ok(BuildDirective::CompilerFlag { value: rest.to_string() })
}

fn parse_link_lib(line_no: usize, col: usize, rest: &str, line: &str) -> Result<BuildDirective, ParseError> {
  let Some((kind, name)) = rest.split_once('=') else {
    return Err(ParseError::new(line_no, col, "expected KIND=NAME", line));
  };

  let parsed_kind: LinkKind = kind.parse().map_err(|()| {
    ParseError::new(
      line_no,
      col,
      format!("unknown link kind `{}` (expected static, dylib or framework)", kind),
      line,
    )
  })?;

  if name.is_empty() {
    return Err(ParseError::new(line_no, col + kind.len() + 1, "missing library name", line));
  }

  Ok(BuildDirective::LinkLibrary {
    name: name.to_string(),
    kind: Some(parsed_kind),
  })
}

fn split_key_value(line_no: usize, col: usize, rest: &str, line: &str) -> Result<(String, String), ParseError> {
  let Some((key, value)) = rest.split_once('=') else {
    return Err(ParseError::new(line_no, col, "expected KEY=VALUE", line));
  };

  if key.is_empty() {
    return Err(ParseError::new(line_no, col, "empty key", line));
  }

  Ok((key.to_string(), value.to_string()))
}
