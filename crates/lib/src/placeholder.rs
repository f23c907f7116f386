//! Placeholder parsing and substitution for deferred value resolution.
//!
//! Definitions reference values that only exist once the template is
//! synthesized: the logical resources behind a hosting unit's handles, and
//! provider-side secret lookups. Those references are carried through the
//! manifest as placeholder strings and resolved during synthesis.
//!
//! # Placeholder formats
//!
//! - `$${hosting:<hash>:<output>}` - a hosting unit handle (`bucket` or
//!   `distribution`)
//! - `$${secret:<entry>:<field>}` - a secret store field, lowered to a
//!   provider dynamic reference
//!
//! Single `$` characters pass through unchanged, so shell variables like
//! `$DISTRIBUTION_ID` inside build commands need no escaping. Use `$$$`
//! before `{` to produce a literal `$${` sequence.

use thiserror::Error;

/// A parsed placeholder reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
  /// `$${hosting:<hash>:<output>}` - handle exposed by a hosting unit
  Hosting { hash: String, output: String },

  /// `$${secret:<entry>:<field>}` - field of a secret store entry
  Secret { entry: String, field: String },
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// A placeholder to be resolved
  Placeholder(Placeholder),
}

/// Errors that can occur during placeholder parsing or resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("unknown placeholder type: {0}")]
  UnknownType(String),

  #[error("malformed placeholder: {0}")]
  Malformed(String),

  #[error("unresolved hosting handle: {hash} output '{output}'")]
  UnresolvedHosting { hash: String, output: String },

  #[error("unresolved secret reference: {entry} field '{field}'")]
  UnresolvedSecret { entry: String, field: String },
}

/// Trait for resolving placeholder values during synthesis.
pub trait Resolver {
  /// Resolve a hosting handle to its synthesized value.
  fn resolve_hosting(&self, hash: &str, output: &str) -> Result<String, PlaceholderError>;

  /// Resolve a secret reference to its synthesized value.
  fn resolve_secret(&self, entry: &str, field: &str) -> Result<String, PlaceholderError>;
}

/// Parse a string containing placeholders into segments.
///
/// # Errors
///
/// Returns an error if a placeholder is malformed (unclosed, unknown type,
/// missing parts).
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    match chars.peek() {
      Some((_, '$')) => {
        chars.next(); // consume the second $

        match chars.peek() {
          Some((_, '$')) => {
            // "$$$" - escape sequence when followed by "{"
            chars.next();
            match chars.peek() {
              Some((_, '{')) => {
                literal.push_str("$${");
                chars.next();
              }
              _ => literal.push_str("$$$"),
            }
          }
          Some((_, '{')) => {
            // "$${" opens a placeholder
            chars.next();

            if !literal.is_empty() {
              segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }

            let mut content = String::new();
            let mut found_close = false;
            for (_, c) in chars.by_ref() {
              if c == '}' {
                found_close = true;
                break;
              }
              content.push(c);
            }

            if !found_close {
              return Err(PlaceholderError::Unclosed(pos));
            }

            segments.push(Segment::Placeholder(parse_content(&content)?));
          }
          _ => literal.push_str("$$"),
        }
      }
      _ => {
        // Lone $: shell variables pass through
        literal.push('$');
      }
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Parse the content between `$${` and `}`.
fn parse_content(content: &str) -> Result<Placeholder, PlaceholderError> {
  let (kind, rest) = content
    .split_once(':')
    .ok_or_else(|| PlaceholderError::Malformed(format!("missing colon in '{content}'")))?;

  let (first, second) = rest.split_once(':').ok_or_else(|| {
    PlaceholderError::Malformed(format!("{kind} placeholder needs two parts: '{content}'"))
  })?;

  if first.is_empty() || second.is_empty() {
    return Err(PlaceholderError::Malformed(format!(
      "{kind} placeholder has an empty part: '{content}'"
    )));
  }

  match kind {
    "hosting" => Ok(Placeholder::Hosting {
      hash: first.to_string(),
      output: second.to_string(),
    }),
    "secret" => Ok(Placeholder::Secret {
      entry: first.to_string(),
      field: second.to_string(),
    }),
    _ => Err(PlaceholderError::UnknownType(kind.to_string())),
  }
}

/// Parse a string that should be exactly one placeholder and nothing else.
///
/// Handle fields in definitions (the pipeline's hosting reference targets)
/// are whole placeholders, not embedded ones; this is the structured accessor
/// for them. Returns `None` for plain strings.
pub fn parse_single(input: &str) -> Result<Option<Placeholder>, PlaceholderError> {
  let segments = parse(input)?;
  match segments.as_slice() {
    [Segment::Placeholder(p)] => Ok(Some(p.clone())),
    _ => Ok(None),
  }
}

/// Substitute all placeholders in a string using the provided resolver.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let mut result = String::new();

  for segment in parse(input)? {
    match segment {
      Segment::Literal(s) => result.push_str(&s),
      Segment::Placeholder(p) => {
        let value = match &p {
          Placeholder::Hosting { hash, output } => resolver.resolve_hosting(hash, output)?,
          Placeholder::Secret { entry, field } => resolver.resolve_secret(entry, field)?,
        };
        result.push_str(&value);
      }
    }
  }

  Ok(result)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  struct TestResolver {
    hostings: HashMap<(String, String), String>,
    secrets: HashMap<(String, String), String>,
  }

  impl TestResolver {
    fn new() -> Self {
      Self {
        hostings: HashMap::new(),
        secrets: HashMap::new(),
      }
    }

    fn with_hosting(mut self, hash: &str, output: &str, value: &str) -> Self {
      self
        .hostings
        .insert((hash.to_string(), output.to_string()), value.to_string());
      self
    }

    fn with_secret(mut self, entry: &str, field: &str, value: &str) -> Self {
      self
        .secrets
        .insert((entry.to_string(), field.to_string()), value.to_string());
      self
    }
  }

  impl Resolver for TestResolver {
    fn resolve_hosting(&self, hash: &str, output: &str) -> Result<String, PlaceholderError> {
      self
        .hostings
        .get(&(hash.to_string(), output.to_string()))
        .cloned()
        .ok_or_else(|| PlaceholderError::UnresolvedHosting {
          hash: hash.to_string(),
          output: output.to_string(),
        })
    }

    fn resolve_secret(&self, entry: &str, field: &str) -> Result<String, PlaceholderError> {
      self
        .secrets
        .get(&(entry.to_string(), field.to_string()))
        .cloned()
        .ok_or_else(|| PlaceholderError::UnresolvedSecret {
          entry: entry.to_string(),
          field: field.to_string(),
        })
    }
  }

  #[test]
  fn parse_hosting_handle() {
    let segments = parse("$${hosting:a1b2c3:bucket}").unwrap();
    assert_eq!(
      segments,
      vec![Segment::Placeholder(Placeholder::Hosting {
        hash: "a1b2c3".to_string(),
        output: "bucket".to_string(),
      })]
    );
  }

  #[test]
  fn parse_secret_reference_in_text() {
    let segments = parse("token=$${secret:deploy/github:GITHUB_TOKEN}").unwrap();
    assert_eq!(
      segments,
      vec![
        Segment::Literal("token=".to_string()),
        Segment::Placeholder(Placeholder::Secret {
          entry: "deploy/github".to_string(),
          field: "GITHUB_TOKEN".to_string(),
        }),
      ]
    );
  }

  #[test]
  fn substitute_secret_to_dynamic_reference() {
    let resolver = TestResolver::new().with_secret(
      "deploy/github",
      "GITHUB_TOKEN",
      "{{resolve:secretsmanager:deploy/github:SecretString:GITHUB_TOKEN}}",
    );

    let result = substitute("$${secret:deploy/github:GITHUB_TOKEN}", &resolver).unwrap();
    assert_eq!(
      result,
      "{{resolve:secretsmanager:deploy/github:SecretString:GITHUB_TOKEN}}"
    );
  }

  #[test]
  fn shell_variables_pass_through() {
    let resolver = TestResolver::new();
    let cmd = r#"aws cloudfront create-invalidation --distribution-id $DISTRIBUTION_ID --paths "/*""#;
    assert_eq!(substitute(cmd, &resolver).unwrap(), cmd);
  }

  #[test]
  fn escape_produces_literal_placeholder() {
    let resolver = TestResolver::new();
    let result = substitute("echo $$${hosting:x:bucket}", &resolver).unwrap();
    assert_eq!(result, "echo $${hosting:x:bucket}");
  }

  #[test]
  fn double_dollar_without_brace_preserved() {
    let resolver = TestResolver::new();
    assert_eq!(substitute("echo $$PID", &resolver).unwrap(), "echo $$PID");
  }

  #[test]
  fn parse_single_whole_placeholder() {
    let p = parse_single("$${hosting:a1b2c3:distribution}").unwrap();
    assert_eq!(
      p,
      Some(Placeholder::Hosting {
        hash: "a1b2c3".to_string(),
        output: "distribution".to_string(),
      })
    );
  }

  #[test]
  fn parse_single_rejects_embedded_placeholder() {
    let p = parse_single("prefix-$${hosting:a1b2c3:bucket}").unwrap();
    assert_eq!(p, None);

    let p = parse_single("plain string").unwrap();
    assert_eq!(p, None);
  }

  #[test]
  fn error_unclosed() {
    let result = parse("$${hosting:abc:bucket");
    assert!(matches!(result, Err(PlaceholderError::Unclosed(0))));
  }

  #[test]
  fn error_unknown_type() {
    let result = parse("$${build:abc:out}");
    assert!(matches!(result, Err(PlaceholderError::UnknownType(ref s)) if s == "build"));
  }

  #[test]
  fn error_missing_parts() {
    assert!(matches!(parse("$${hosting}"), Err(PlaceholderError::Malformed(_))));
    assert!(matches!(parse("$${hosting:abc}"), Err(PlaceholderError::Malformed(_))));
    assert!(matches!(parse("$${secret::field}"), Err(PlaceholderError::Malformed(_))));
  }

  #[test]
  fn error_unresolved_hosting() {
    let resolver = TestResolver::new();
    let result = substitute("$${hosting:missing:bucket}", &resolver);
    assert!(
      matches!(result, Err(PlaceholderError::UnresolvedHosting { ref hash, ref output })
        if hash == "missing" && output == "bucket")
    );
  }

  #[test]
  fn adjacent_placeholders() {
    let resolver = TestResolver::new()
      .with_hosting("h1", "bucket", "web-bucket")
      .with_hosting("h1", "distribution", "web-dist");

    let result = substitute("$${hosting:h1:bucket}/$${hosting:h1:distribution}", &resolver).unwrap();
    assert_eq!(result, "web-bucket/web-dist");
  }
}
