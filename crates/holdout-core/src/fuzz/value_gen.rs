//! Edge-heavy random Python values.
//!
//! Each draw picks a canonical edge case ~30% of the time and a uniform random
//! value otherwise.

use super::signature::ParamType;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const EDGE_CASE_PROBABILITY: f64 = 0.3;
const STRING_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_- ";
const LARGE_REPEAT: usize = 10_000;

const INT_EDGES: &[i64] = &[0, -1, 1, -(1 << 31), (1 << 31) - 1, i64::MAX];
const FLOAT_EDGES: &[f64] = &[0.0, -0.0, 1.0, -1.0, f64::INFINITY, f64::NEG_INFINITY, f64::NAN];

/// A Python value as it would be passed to the function under test.
///
/// Dictionary keys are kept rendered (strings quoted) so `None` and `""`
/// keys stay distinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FuzzValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<FuzzValue>),
    Dict(BTreeMap<String, FuzzValue>),
}

impl FuzzValue {
    pub fn str(value: impl Into<String>) -> Self {
        FuzzValue::Str(value.into())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, FuzzValue::None)
    }

    /// Empty string, list or dict.
    pub fn is_empty_container(&self) -> bool {
        match self {
            FuzzValue::Str(s) => s.is_empty(),
            FuzzValue::List(items) => items.is_empty(),
            FuzzValue::Dict(map) => map.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for FuzzValue {
    /// Python literal syntax; long strings and lists are abbreviated.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuzzValue::None => f.write_str("None"),
            FuzzValue::Bool(true) => f.write_str("True"),
            FuzzValue::Bool(false) => f.write_str("False"),
            FuzzValue::Int(i) => write!(f, "{i}"),
            FuzzValue::Float(x) if x.is_nan() => f.write_str("float('nan')"),
            FuzzValue::Float(x) if x.is_infinite() => {
                write!(f, "float('{}inf')", if *x < 0.0 { "-" } else { "" })
            }
            FuzzValue::Float(x) => write!(f, "{x:?}"),
            FuzzValue::Str(s) if s.chars().count() > 40 => {
                let head: String = s.chars().take(8).collect();
                write!(f, "{head:?} * ({} chars)", s.chars().count())
            }
            FuzzValue::Str(s) => write!(f, "{s:?}"),
            FuzzValue::List(items) if items.len() > 10 => {
                write!(f, "[{}] * {}", items.first().map(ToString::to_string).unwrap_or_default(), items.len())
            }
            FuzzValue::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            FuzzValue::Dict(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

pub struct ValueGenerator {
    rng: StdRng,
}

impl ValueGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn generate(&mut self, ty: ParamType) -> FuzzValue {
        match ty {
            ParamType::Int => self.gen_int(),
            ParamType::Float => self.gen_float(),
            ParamType::Str => self.gen_str(),
            ParamType::Bool => FuzzValue::Bool(self.rng.gen_bool(0.5)),
            ParamType::List => self.gen_list(),
            ParamType::Dict => self.gen_dict(),
            ParamType::Any => self.gen_any(),
        }
    }

    fn edge(&mut self) -> bool {
        self.rng.gen_bool(EDGE_CASE_PROBABILITY)
    }

    fn gen_any(&mut self) -> FuzzValue {
        match self.rng.gen_range(0..7) {
            0 => self.gen_int(),
            1 => self.gen_float(),
            2 => self.gen_str(),
            3 => FuzzValue::Bool(self.rng.gen_bool(0.5)),
            4 => self.gen_list(),
            5 => self.gen_dict(),
            _ => FuzzValue::None,
        }
    }

    fn gen_int(&mut self) -> FuzzValue {
        if self.edge() {
            if let Some(v) = INT_EDGES.choose(&mut self.rng) {
                return FuzzValue::Int(*v);
            }
        }
        FuzzValue::Int(self.rng.gen_range(-1000..=1000))
    }

    fn gen_float(&mut self) -> FuzzValue {
        if self.edge() {
            if let Some(v) = FLOAT_EDGES.choose(&mut self.rng) {
                return FuzzValue::Float(*v);
            }
        }
        FuzzValue::Float(self.rng.gen_range(-1000.0..1000.0))
    }

    fn gen_str(&mut self) -> FuzzValue {
        if self.edge() {
            return match self.rng.gen_range(0..8) {
                0 => FuzzValue::str(""),
                1 => FuzzValue::str(" "),
                2 => FuzzValue::str("\n"),
                3 => FuzzValue::str("\t"),
                4 => FuzzValue::Str("a".repeat(LARGE_REPEAT)),
                5 => FuzzValue::str("\0"),
                6 => FuzzValue::str("\u{1F389}"),
                _ => FuzzValue::str("<script>"),
            };
        }
        let len = self.rng.gen_range(0..=100);
        let s = (0..len)
            .filter_map(|_| STRING_ALPHABET.choose(&mut self.rng).map(|b| *b as char))
            .collect::<String>();
        FuzzValue::Str(s)
    }

    fn gen_list(&mut self) -> FuzzValue {
        if self.edge() {
            return match self.rng.gen_range(0..3) {
                0 => FuzzValue::List(Vec::new()),
                1 => FuzzValue::List(vec![FuzzValue::None]),
                _ => FuzzValue::List(vec![FuzzValue::Int(1); LARGE_REPEAT]),
            };
        }
        let len = self.rng.gen_range(0..=10);
        FuzzValue::List((0..len).map(|_| self.gen_int()).collect())
    }

    fn gen_dict(&mut self) -> FuzzValue {
        if self.edge() {
            let mut map = BTreeMap::new();
            match self.rng.gen_range(0..3) {
                0 => {}
                1 => {
                    map.insert(format!("{:?}", ""), FuzzValue::str(""));
                }
                _ => {
                    map.insert("None".to_string(), FuzzValue::None);
                }
            }
            return FuzzValue::Dict(map);
        }
        let len = self.rng.gen_range(0..=5);
        let mut map = BTreeMap::new();
        for _ in 0..len {
            let key = match self.gen_str() {
                FuzzValue::Str(s) => s.chars().take(10).collect::<String>(),
                other => other.to_string(),
            };
            let value = self.gen_int();
            map.insert(format!("{key:?}"), value);
        }
        FuzzValue::Dict(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_values() {
        let types = [ParamType::Int, ParamType::Str, ParamType::Any, ParamType::Dict];
        let mut a = ValueGenerator::new(9);
        let mut b = ValueGenerator::new(9);
        for ty in types.iter().cycle().take(40) {
            let (x, y) = (a.generate(*ty), b.generate(*ty));
            // NaN never equals itself; compare the rendering instead.
            assert_eq!(x.to_string(), y.to_string());
        }
    }

    #[test]
    fn test_values_match_requested_type() {
        let mut gen = ValueGenerator::new(1);
        for _ in 0..50 {
            assert!(matches!(gen.generate(ParamType::Int), FuzzValue::Int(_)));
            assert!(matches!(gen.generate(ParamType::Float), FuzzValue::Float(_)));
            assert!(matches!(gen.generate(ParamType::Bool), FuzzValue::Bool(_)));
            assert!(matches!(gen.generate(ParamType::List), FuzzValue::List(_)));
            match gen.generate(ParamType::Int) {
                FuzzValue::Int(i) => assert!((-1000..=1000).contains(&i) || INT_EDGES.contains(&i)),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_python_rendering() {
        assert_eq!(FuzzValue::None.to_string(), "None");
        assert_eq!(FuzzValue::Float(f64::NEG_INFINITY).to_string(), "float('-inf')");
        assert_eq!(FuzzValue::List(vec![FuzzValue::Int(1), FuzzValue::Bool(true)]).to_string(), "[1, True]");
        assert_eq!(FuzzValue::List(vec![FuzzValue::Int(1); 20]).to_string(), "[1] * 20");
        assert!(FuzzValue::str("").is_empty_container());
        assert!(!FuzzValue::Int(0).is_empty_container());
    }
}
