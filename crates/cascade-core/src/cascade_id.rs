//! Pure string algebra for cascade ids.
//!
//! A cascade id is a lossless linearisation of a message's provenance: the
//! chain of step names and parameter bindings (and, for merges, parent ids)
//! that produced it. See spec §3/§4.1 for the grammar. Every operation here
//! is pure — no I/O, no clock, no randomness.

use crate::error::{CascadeError, Result};
use std::collections::BTreeMap;
use std::fmt;

/// The alphabet reserved by the cascade-id grammar. Step names and param
/// keys/values must not contain any of these.
const RESERVED: [char; 6] = ['/', ':', ',', '=', ';', '@'];

fn check_reserved(value: &str) -> Result<()> {
    if let Some(c) = value.chars().find(|c| RESERVED.contains(c)) {
        return Err(CascadeError::ReservedCharacter {
            value: value.to_string(),
            reserved: c,
        });
    }
    Ok(())
}

/// A canonically-encodable cascade-id parameter value.
///
/// Nested structures are not representable — §3's resolution of the
/// "parameter value encoding" open question rejects them rather than
/// stringifying ambiguously the way the Python original's bare `str(v)` did.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Float(f64),
}

impl ParamValue {
    fn canonical(&self, key: &str) -> Result<String> {
        let rendered = match self {
            ParamValue::Str(s) => s.clone(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Float(f) => {
                if !f.is_finite() {
                    return Err(CascadeError::InvalidParam {
                        key: key.to_string(),
                        reason: "float parameter must be finite".to_string(),
                    });
                }
                let mut s = f.to_string();
                if !s.contains('.') && !s.contains('e') {
                    s.push_str(".0");
                }
                s
            }
        };
        check_reserved(&rendered)?;
        Ok(rendered)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

/// One parsed path token: a step name with its (string-valued) param map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathToken {
    pub step_name: String,
    pub params: BTreeMap<String, String>,
}

impl fmt::Display for PathToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.step_name)?;
        if !self.params.is_empty() {
            write!(f, ":")?;
            let joined = self
                .params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",");
            write!(f, "{joined}")?;
        }
        Ok(())
    }
}

/// A cascade id split into its merge roots (possibly empty) and its path
/// (the `/`-separated token chain extending from those roots, or from
/// nothing for a root message).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedCascadeId {
    pub roots: Vec<String>,
    pub path: Vec<PathToken>,
}

/// Derive a child id from a parent id, a step name, and sorted param bindings.
///
/// `parent` may be empty, in which case the leading `/` is omitted and the
/// result is just `step[:params]`.
pub fn derive(parent: &str, step: &str, params: &[(&str, ParamValue)]) -> Result<String> {
    check_reserved(step)?;

    let mut sorted: BTreeMap<&str, &ParamValue> = BTreeMap::new();
    for (k, v) in params {
        check_reserved(k)?;
        sorted.insert(k, v);
    }

    let mut token = step.to_string();
    if !sorted.is_empty() {
        let rendered = sorted
            .into_iter()
            .map(|(k, v)| v.canonical(k).map(|rv| format!("{k}={rv}")))
            .collect::<Result<Vec<_>>>()?
            .join(",");
        token.push(':');
        token.push_str(&rendered);
    }

    Ok(if parent.is_empty() {
        token
    } else {
        format!("{parent}/{token}")
    })
}

/// Merge a set of parent ids under a step name.
///
/// Parents are de-duplicated and sorted lexicographically so that any
/// permutation of an identical parent set produces the same merged id
/// (spec property 3). A single parent is allowed and merges to
/// `parent@step`. Parent ids are treated as opaque strings — a parent that
/// is itself a merge id is not specially validated, per §3/§9's resolution
/// of the nested-merge open question.
pub fn merge(parents: &[&str], step: &str) -> Result<String> {
    if parents.is_empty() {
        return Err(CascadeError::EmptyMerge);
    }
    check_reserved(step)?;

    let mut dedup: Vec<&str> = parents.to_vec();
    dedup.sort_unstable();
    dedup.dedup();

    Ok(format!("{}@{}", dedup.join(";"), step))
}

/// Split a cascade id into its roots segment and path segment on the first
/// `@`. If `@` is absent, `roots` is empty.
pub fn split_roots(id: &str) -> (Vec<String>, String) {
    match id.split_once('@') {
        Some((roots_part, path)) => {
            let roots = if roots_part.is_empty() {
                Vec::new()
            } else {
                roots_part.split(';').map(str::to_string).collect()
            };
            (roots, path.to_string())
        }
        None => (Vec::new(), id.to_string()),
    }
}

/// Split a path into its `/`-separated tokens, discarding empty segments.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/// Parse one path token (`step_name[:k=v,k2=v2]`) into its name and params.
pub fn parse_token(token: &str) -> Result<PathToken> {
    match token.split_once(':') {
        Some((name, param_str)) => {
            if name.is_empty() {
                return Err(CascadeError::InvalidToken(token.to_string()));
            }
            let mut params = BTreeMap::new();
            for pair in param_str.split(',') {
                let (k, v) = pair
                    .split_once('=')
                    .ok_or_else(|| CascadeError::InvalidToken(token.to_string()))?;
                if k.is_empty() {
                    return Err(CascadeError::InvalidToken(token.to_string()));
                }
                params.insert(k.to_string(), v.to_string());
            }
            Ok(PathToken { step_name: name.to_string(), params })
        }
        None => {
            if token.is_empty() {
                return Err(CascadeError::InvalidToken(token.to_string()));
            }
            Ok(PathToken { step_name: token.to_string(), params: BTreeMap::new() })
        }
    }
}

/// Parse a full cascade id into roots and a token-level path.
pub fn parse(id: &str) -> Result<ParsedCascadeId> {
    let (roots, path_str) = split_roots(id);
    let path = split_path(&path_str)
        .iter()
        .map(|t| parse_token(t))
        .collect::<Result<Vec<_>>>()?;
    Ok(ParsedCascadeId { roots, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_no_parent_no_params() {
        let id = derive("", "src", &[]).unwrap();
        assert_eq!(id, "src");
    }

    #[test]
    fn derive_with_parent() {
        let id = derive("src:count=0", "up", &[]).unwrap();
        assert_eq!(id, "src:count=0/up");
    }

    #[test]
    fn derive_sorts_params() {
        let id = derive(
            "",
            "step",
            &[("model", ParamValue::from("m1")), ("index", ParamValue::from(2i64))],
        )
        .unwrap();
        assert_eq!(id, "step:index=2,model=m1");
    }

    #[test]
    fn derive_soundness_roundtrip() {
        let id = derive(
            "parent",
            "step",
            &[("b", ParamValue::from(1i64)), ("a", ParamValue::from("x"))],
        )
        .unwrap();
        let parsed = parse(&id).unwrap();
        assert_eq!(parsed.roots, Vec::<String>::new());
        let last = parsed.path.last().unwrap();
        assert_eq!(last.step_name, "step");
        assert_eq!(last.params.get("a").unwrap(), "x");
        assert_eq!(last.params.get("b").unwrap(), "1");
    }

    #[test]
    fn merge_single_parent_equals_parent_then_step() {
        let id = merge(&["p"], "j").unwrap();
        assert_eq!(id, "p@j");
    }

    #[test]
    fn merge_is_order_independent() {
        let a = merge(&["q", "p"], "j").unwrap();
        let b = merge(&["p", "q"], "j").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "p;q@j");
    }

    #[test]
    fn merge_dedups() {
        let id = merge(&["p", "p", "q"], "j").unwrap();
        assert_eq!(id, "p;q@j");
    }

    #[test]
    fn merge_empty_is_error() {
        assert!(matches!(merge(&[], "j"), Err(CascadeError::EmptyMerge)));
    }

    #[test]
    fn reserved_character_rejected() {
        let err = derive("", "bad/step", &[]).unwrap_err();
        assert!(matches!(err, CascadeError::ReservedCharacter { .. }));
    }

    #[test]
    fn split_roots_merge_id() {
        let (roots, path) = split_roots("p;q@j");
        assert_eq!(roots, vec!["p".to_string(), "q".to_string()]);
        assert_eq!(path, "j");
    }

    #[test]
    fn split_roots_no_at() {
        let (roots, path) = split_roots("src:count=0/up");
        assert!(roots.is_empty());
        assert_eq!(path, "src:count=0/up");
    }

    #[test]
    fn parse_token_with_params() {
        let tok = parse_token("step:index=0,model=M").unwrap();
        assert_eq!(tok.step_name, "step");
        assert_eq!(tok.params.get("index").unwrap(), "0");
        assert_eq!(tok.params.get("model").unwrap(), "M");
    }

    #[test]
    fn fan_out_param_ids_all_parse() {
        for i in 0..3 {
            let id = format!(".../step:index={i},model=M");
            let (_, path) = split_roots(&id);
            let tokens = split_path(&path);
            let last = parse_token(tokens.last().unwrap()).unwrap();
            assert_eq!(last.params.get("index").unwrap(), &i.to_string());
        }
    }

    proptest::proptest! {
        #[test]
        fn merge_is_permutation_invariant(mut parents in proptest::collection::vec("[a-z]{1,6}", 1..6)) {
            let refs_a: Vec<&str> = parents.iter().map(String::as_str).collect();
            let a = merge(&refs_a, "s").unwrap();
            parents.reverse();
            let refs_b: Vec<&str> = parents.iter().map(String::as_str).collect();
            let b = merge(&refs_b, "s").unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
