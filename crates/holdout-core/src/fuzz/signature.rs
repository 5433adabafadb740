//! Function signatures from the added lines of a patch.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Value family a parameter's type hint asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Int,
    Float,
    Str,
    Bool,
    List,
    Dict,
    Any,
}

impl ParamType {
    /// Classify a hint by its outer type (`Optional[...]` is unwrapped);
    /// unrecognized outer types fall back to a substring match.
    pub fn from_hint(hint: &str) -> Self {
        let hint = hint.trim();
        if hint.is_empty() {
            return ParamType::Any;
        }
        let lower = hint.to_ascii_lowercase();
        let (head, inner) = match lower.split_once('[') {
            Some((head, rest)) => (head.trim(), rest.trim_end_matches(']')),
            None => (lower.as_str(), ""),
        };
        let head = head.rsplit('.').next().unwrap_or(head);
        match head {
            "int" => ParamType::Int,
            "float" => ParamType::Float,
            "str" | "bytes" => ParamType::Str,
            "bool" => ParamType::Bool,
            "list" | "tuple" | "set" | "frozenset" | "sequence" | "iterable" => ParamType::List,
            "dict" | "mapping" => ParamType::Dict,
            "optional" => Self::from_hint(inner),
            _ => ["int", "float", "str", "bool", "list", "dict"]
                .iter()
                .zip([
                    ParamType::Int,
                    ParamType::Float,
                    ParamType::Str,
                    ParamType::Bool,
                    ParamType::List,
                    ParamType::Dict,
                ])
                .find(|(needle, _)| lower.contains(*needle))
                .map_or(ParamType::Any, |(_, ty)| ty),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
    pub param_type: ParamType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<Param>,
}

fn def_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?m)^\+[ \t]*(?:async[ \t]+)?def\s+(\w+)\s*\(([^)]*)\)").ok())
        .as_ref()
}

/// Split on top-level commas only, so `Dict[str, int]` stays one piece.
fn split_params(params: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in params.char_indices() {
        match c {
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                pieces.push(&params[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&params[start..]);
    pieces
}

fn parse_param(raw: &str) -> Option<Param> {
    let raw = raw.trim();
    let without_default = raw.split_once('=').map_or(raw, |(lhs, _)| lhs).trim();
    let (name, hint) = match without_default.split_once(':') {
        Some((name, hint)) => (name.trim(), Some(hint.trim().to_string())),
        None => (without_default, None),
    };
    let name = name.trim_start_matches('*');
    if name.is_empty() || name == "/" || name == "self" || name == "cls" {
        return None;
    }
    Some(Param {
        name: name.to_string(),
        param_type: hint.as_deref().map_or(ParamType::Any, ParamType::from_hint),
        type_hint: hint.filter(|h| !h.is_empty()),
    })
}

/// Signatures of functions defined on added (`+`) lines. `self` and `cls`
/// are dropped; star parameters keep their bare name.
pub fn extract_function_signatures(patch: &str) -> Vec<FunctionSignature> {
    let Some(re) = def_pattern() else {
        return Vec::new();
    };
    re.captures_iter(patch)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_string();
            let params = caps
                .get(2)
                .map(|m| split_params(m.as_str()).into_iter().filter_map(parse_param).collect())
                .unwrap_or_default();
            Some(FunctionSignature { name, params })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_classification() {
        assert_eq!(ParamType::from_hint("int"), ParamType::Int);
        assert_eq!(ParamType::from_hint("Optional[str]"), ParamType::Str);
        assert_eq!(ParamType::from_hint("Dict[str, int]"), ParamType::Dict);
        assert_eq!(ParamType::from_hint("typing.List[int]"), ParamType::List);
        assert_eq!(ParamType::from_hint("Path"), ParamType::Any);
        assert_eq!(ParamType::from_hint("MyIntAlias"), ParamType::Int);
    }

    #[test]
    fn test_extract_signatures() {
        let patch = "\
@@ -1,3 +1,8 @@
+class Parser:
+    def parse(self, text: str, strict: bool = False, *args, **kwargs):
+        pass
+
+def merge(a: Dict[str, int], b=None) -> dict:
+    return {**a, **(b or {})}
 def untouched(x):
";
        let sigs = extract_function_signatures(patch);
        assert_eq!(sigs.len(), 2);
        assert_eq!(sigs[0].name, "parse");
        let names: Vec<&str> = sigs[0].params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["text", "strict", "args", "kwargs"]);
        assert_eq!(sigs[0].params[0].param_type, ParamType::Str);
        assert_eq!(sigs[0].params[1].param_type, ParamType::Bool);
        assert_eq!(sigs[1].params[0].param_type, ParamType::Dict);
        assert_eq!(sigs[1].params[1].param_type, ParamType::Any);
        assert_eq!(sigs[1].params[1].type_hint, None);
    }
}
