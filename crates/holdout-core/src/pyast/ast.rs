//! Typed syntax tree for Python source units.
//!
//! The node set follows the shape of Python's own `ast` module closely enough
//! that every construct the parser accepts can be printed back out by
//! [`super::unparse`] and reparsed into an equal tree. Literal tokens keep
//! their source spelling so untouched constants round-trip byte-for-byte.

/// A parsed source file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    Return {
        value: Option<Expr>,
    },
    Delete {
        targets: Vec<Expr>,
    },
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AugAssign {
        target: Expr,
        op: Operator,
        value: Expr,
    },
    AnnAssign {
        target: Expr,
        annotation: Expr,
        value: Option<Expr>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
        is_async: bool,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    With {
        items: Vec<WithItem>,
        body: Vec<Stmt>,
        is_async: bool,
    },
    Raise {
        exc: Option<Expr>,
        cause: Option<Expr>,
    },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    Assert {
        test: Expr,
        msg: Option<Expr>,
    },
    Import {
        names: Vec<Alias>,
    },
    ImportFrom {
        module: Option<String>,
        names: Vec<Alias>,
        level: u32,
    },
    Global {
        names: Vec<String>,
    },
    Nonlocal {
        names: Vec<String>,
    },
    Expr {
        value: Expr,
    },
    Pass,
    Break,
    Continue,
}

impl Stmt {
    /// Short node name used in logs and transform errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Stmt::FunctionDef(_) => "FunctionDef",
            Stmt::ClassDef(_) => "ClassDef",
            Stmt::Return { .. } => "Return",
            Stmt::Delete { .. } => "Delete",
            Stmt::Assign { .. } => "Assign",
            Stmt::AugAssign { .. } => "AugAssign",
            Stmt::AnnAssign { .. } => "AnnAssign",
            Stmt::For { .. } => "For",
            Stmt::While { .. } => "While",
            Stmt::If { .. } => "If",
            Stmt::With { .. } => "With",
            Stmt::Raise { .. } => "Raise",
            Stmt::Try { .. } => "Try",
            Stmt::Assert { .. } => "Assert",
            Stmt::Import { .. } => "Import",
            Stmt::ImportFrom { .. } => "ImportFrom",
            Stmt::Global { .. } => "Global",
            Stmt::Nonlocal { .. } => "Nonlocal",
            Stmt::Expr { .. } => "Expr",
            Stmt::Pass => "Pass",
            Stmt::Break => "Break",
            Stmt::Continue => "Continue",
        }
    }

    /// True for a bare string expression statement (docstring position or not).
    pub fn is_docstring(&self) -> bool {
        matches!(
            self,
            Stmt::Expr {
                value: Expr::Constant(Constant::Str(_))
            }
        )
    }

    /// True for `from __future__ import ...`.
    pub fn is_future_import(&self) -> bool {
        matches!(self, Stmt::ImportFrom { module: Some(m), level: 0, .. } if m == "__future__")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Parameters,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
    pub returns: Option<Expr>,
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<Expr>,
    pub keywords: Vec<Keyword>,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
}

/// Parameter list of a `def` or `lambda`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameters {
    pub posonly: Vec<Param>,
    pub args: Vec<Param>,
    pub vararg: Option<Param>,
    pub kwonly: Vec<Param>,
    pub kwarg: Option<Param>,
}

impl Parameters {
    pub fn is_empty(&self) -> bool {
        self.posonly.is_empty()
            && self.args.is_empty()
            && self.vararg.is_none()
            && self.kwonly.is_empty()
            && self.kwarg.is_none()
    }

    /// Every parameter in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.posonly
            .iter()
            .chain(self.args.iter())
            .chain(self.vararg.iter())
            .chain(self.kwonly.iter())
            .chain(self.kwarg.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Param> {
        self.posonly
            .iter_mut()
            .chain(self.args.iter_mut())
            .chain(self.vararg.iter_mut())
            .chain(self.kwonly.iter_mut())
            .chain(self.kwarg.iter_mut())
    }

    /// Plain positional parameters only: no defaults, no `*`/`**`, no keyword-only.
    pub fn is_plain_positional(&self) -> bool {
        self.posonly.is_empty()
            && self.vararg.is_none()
            && self.kwonly.is_empty()
            && self.kwarg.is_none()
            && self.args.iter().all(|p| p.default.is_none())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<Expr>,
    pub default: Option<Expr>,
}

impl Param {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotation: None,
            default: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    /// `None` for `**mapping` unpacking.
    pub arg: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub name: String,
    pub asname: Option<String>,
}

impl Alias {
    /// The name this alias binds in the importing scope.
    pub fn bound_name(&self) -> &str {
        match &self.asname {
            Some(asname) => asname,
            None => self.name.split('.').next().unwrap_or(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithItem {
    pub context_expr: Expr,
    pub optional_vars: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    pub typ: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DictEntry {
    /// `None` for `**mapping` unpacking.
    pub key: Option<Expr>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    BoolOp {
        op: BoolOperator,
        values: Vec<Expr>,
    },
    NamedExpr {
        target: String,
        value: Box<Expr>,
    },
    BinOp {
        left: Box<Expr>,
        op: Operator,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    Lambda {
        params: Box<Parameters>,
        body: Box<Expr>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Dict {
        entries: Vec<DictEntry>,
    },
    Set {
        elts: Vec<Expr>,
    },
    ListComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    SetComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    GeneratorExp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    Await {
        value: Box<Expr>,
    },
    Yield {
        value: Option<Box<Expr>>,
    },
    YieldFrom {
        value: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOperator>,
        comparators: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    Constant(Constant),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        slice: Box<Expr>,
    },
    Starred {
        value: Box<Expr>,
    },
    Name {
        id: String,
    },
    List {
        elts: Vec<Expr>,
    },
    Tuple {
        elts: Vec<Expr>,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
}

impl Expr {
    pub fn name(id: impl Into<String>) -> Self {
        Expr::Name { id: id.into() }
    }

    pub fn bool_literal(value: bool) -> Self {
        Expr::Constant(Constant::Bool(value))
    }

    /// Build an integer literal, wrapping negatives in a unary minus so the
    /// printer never has to special-case a signed literal.
    pub fn int_literal(value: i64) -> Self {
        if value < 0 {
            Expr::UnaryOp {
                op: UnaryOperator::USub,
                operand: Box::new(Expr::Constant(Constant::Int(IntLiteral::from_unsigned(
                    value.unsigned_abs(),
                )))),
            }
        } else {
            Expr::Constant(Constant::Int(IntLiteral::from_unsigned(value as u64)))
        }
    }

    /// Build a float literal; negatives are wrapped in a unary minus.
    pub fn float_literal(value: f64) -> Self {
        if value.is_sign_negative() && value != 0.0 {
            Expr::UnaryOp {
                op: UnaryOperator::USub,
                operand: Box::new(Expr::Constant(Constant::Float(FloatLiteral::new(-value)))),
            }
        } else {
            Expr::Constant(Constant::Float(FloatLiteral::new(value)))
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Name { id } => Some(id),
            _ => None,
        }
    }

    /// Truth value of a literal condition, following Python truthiness for
    /// `True`/`False`/`None` and numeric or string literals.
    pub fn literal_truthiness(&self) -> Option<bool> {
        match self {
            Expr::Constant(c) => c.truthiness(),
            _ => None,
        }
    }

    pub fn is_literal_bool(&self, value: bool) -> bool {
        matches!(self, Expr::Constant(Constant::Bool(b)) if *b == value)
    }

    /// Names and literals: expressions with no side effects whose evaluation
    /// can be duplicated or moved freely.
    pub fn is_atomic_operand(&self) -> bool {
        match self {
            Expr::Name { .. } | Expr::Constant(_) => true,
            Expr::UnaryOp {
                op: UnaryOperator::USub | UnaryOperator::UAdd,
                operand,
            } => matches!(**operand, Expr::Constant(_)),
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Expr::BoolOp { .. } => "BoolOp",
            Expr::NamedExpr { .. } => "NamedExpr",
            Expr::BinOp { .. } => "BinOp",
            Expr::UnaryOp { .. } => "UnaryOp",
            Expr::Lambda { .. } => "Lambda",
            Expr::IfExp { .. } => "IfExp",
            Expr::Dict { .. } => "Dict",
            Expr::Set { .. } => "Set",
            Expr::ListComp { .. } => "ListComp",
            Expr::SetComp { .. } => "SetComp",
            Expr::DictComp { .. } => "DictComp",
            Expr::GeneratorExp { .. } => "GeneratorExp",
            Expr::Await { .. } => "Await",
            Expr::Yield { .. } => "Yield",
            Expr::YieldFrom { .. } => "YieldFrom",
            Expr::Compare { .. } => "Compare",
            Expr::Call { .. } => "Call",
            Expr::Constant(_) => "Constant",
            Expr::Attribute { .. } => "Attribute",
            Expr::Subscript { .. } => "Subscript",
            Expr::Starred { .. } => "Starred",
            Expr::Name { .. } => "Name",
            Expr::List { .. } => "List",
            Expr::Tuple { .. } => "Tuple",
            Expr::Slice { .. } => "Slice",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    None,
    Bool(bool),
    Ellipsis,
    Int(IntLiteral),
    Float(FloatLiteral),
    /// Imaginary literal, kept as source text (`3j`).
    Imaginary(String),
    Str(StrLiteral),
    Bytes(StrLiteral),
}

impl Constant {
    pub fn truthiness(&self) -> Option<bool> {
        match self {
            Constant::None => Some(false),
            Constant::Bool(b) => Some(*b),
            Constant::Ellipsis => Some(true),
            Constant::Int(i) => i.value.map(|v| v != 0),
            Constant::Float(f) => Some(f.value != 0.0),
            Constant::Str(s) if s.is_plain() => Some(!s.content().is_empty()),
            _ => None,
        }
    }

    /// Numeric value for constant folding.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Constant::Int(i) => i.value.map(Number::Int),
            Constant::Float(f) => Some(Number::Float(f.value)),
            _ => None,
        }
    }
}

/// Folded numeric value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn into_expr(self) -> Expr {
        match self {
            Number::Int(i) => Expr::int_literal(i),
            Number::Float(f) => Expr::float_literal(f),
        }
    }
}

/// Integer literal with its source spelling (`0xFF`, `1_000`).
#[derive(Debug, Clone, PartialEq)]
pub struct IntLiteral {
    pub text: String,
    /// Parsed value when it fits in an `i64`.
    pub value: Option<i64>,
}

impl IntLiteral {
    pub fn from_unsigned(value: u64) -> Self {
        Self {
            text: value.to_string(),
            value: i64::try_from(value).ok(),
        }
    }

    pub fn parse(text: &str) -> Self {
        let digits: String = text.chars().filter(|c| *c != '_').collect();
        let lower = digits.to_ascii_lowercase();
        let value = if let Some(hex) = lower.strip_prefix("0x") {
            i64::from_str_radix(hex, 16).ok()
        } else if let Some(oct) = lower.strip_prefix("0o") {
            i64::from_str_radix(oct, 8).ok()
        } else if let Some(bin) = lower.strip_prefix("0b") {
            i64::from_str_radix(bin, 2).ok()
        } else {
            lower.parse::<i64>().ok()
        };
        Self {
            text: text.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloatLiteral {
    pub text: String,
    pub value: f64,
}

impl FloatLiteral {
    pub fn new(value: f64) -> Self {
        // Debug formatting is shortest-roundtrip and always a valid Python literal.
        Self {
            text: format!("{value:?}"),
            value,
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let cleaned: String = text.chars().filter(|c| *c != '_').collect();
        cleaned.parse::<f64>().ok().map(|value| Self {
            text: text.to_string(),
            value,
        })
    }
}

/// One or more adjacent string tokens, kept verbatim (prefix and quotes included).
#[derive(Debug, Clone, PartialEq)]
pub struct StrLiteral {
    pub parts: Vec<String>,
}

impl StrLiteral {
    pub fn is_fstring(&self) -> bool {
        self.parts
            .iter()
            .any(|p| string_prefix(p).to_ascii_lowercase().contains('f'))
    }

    /// No f-string parts: the literal's value is fully known from its text.
    pub fn is_plain(&self) -> bool {
        !self.is_fstring()
    }

    /// Approximate contents: quotes and prefixes stripped, escapes left as written.
    pub fn content(&self) -> String {
        self.parts.iter().map(|p| strip_quotes(p)).collect()
    }
}

pub(crate) fn string_prefix(token: &str) -> &str {
    let end = token.find(['\'', '"']).unwrap_or(0);
    &token[..end]
}

fn strip_quotes(token: &str) -> &str {
    let body = &token[string_prefix(token).len()..];
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if body.len() >= 2 * quote.len() && body.starts_with(quote) && body.ends_with(quote) {
            return &body[quote.len()..body.len() - quote.len()];
        }
    }
    body
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOperator {
    And,
    Or,
}

impl BoolOperator {
    pub fn keyword(self) -> &'static str {
        match self {
            BoolOperator::And => "and",
            BoolOperator::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
    FloorDiv,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mult => "*",
            Operator::MatMult => "@",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Pow => "**",
            Operator::LShift => "<<",
            Operator::RShift => ">>",
            Operator::BitOr => "|",
            Operator::BitXor => "^",
            Operator::BitAnd => "&",
            Operator::FloorDiv => "//",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => Operator::Add,
            "-" => Operator::Sub,
            "*" => Operator::Mult,
            "@" => Operator::MatMult,
            "/" => Operator::Div,
            "%" => Operator::Mod,
            "**" => Operator::Pow,
            "<<" => Operator::LShift,
            ">>" => Operator::RShift,
            "|" => Operator::BitOr,
            "^" => Operator::BitXor,
            "&" => Operator::BitAnd,
            "//" => Operator::FloorDiv,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Invert,
    Not,
    UAdd,
    USub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOperator {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

impl CmpOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOperator::Eq => "==",
            CmpOperator::NotEq => "!=",
            CmpOperator::Lt => "<",
            CmpOperator::LtE => "<=",
            CmpOperator::Gt => ">",
            CmpOperator::GtE => ">=",
            CmpOperator::Is => "is",
            CmpOperator::IsNot => "is not",
            CmpOperator::In => "in",
            CmpOperator::NotIn => "not in",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_literal_parsing() {
        assert_eq!(IntLiteral::parse("0xFF").value, Some(255));
        assert_eq!(IntLiteral::parse("1_000").value, Some(1000));
        assert_eq!(IntLiteral::parse("0b101").value, Some(5));
        assert_eq!(IntLiteral::parse("0o17").value, Some(15));
        assert_eq!(IntLiteral::parse("99999999999999999999999").value, None);
    }

    #[test]
    fn test_negative_literals_are_wrapped() {
        match Expr::int_literal(-3) {
            Expr::UnaryOp {
                op: UnaryOperator::USub,
                operand,
            } => assert_eq!(
                *operand,
                Expr::Constant(Constant::Int(IntLiteral::from_unsigned(3)))
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_string_content_and_prefix() {
        let s = StrLiteral {
            parts: vec!["f'{name}'".into(), "\"\"\"doc\"\"\"".into()],
        };
        assert!(s.is_fstring());
        assert_eq!(s.content(), "{name}doc");
        assert_eq!(string_prefix("rb'x'"), "rb");
    }

    #[test]
    fn test_literal_truthiness() {
        assert_eq!(Expr::bool_literal(true).literal_truthiness(), Some(true));
        assert_eq!(
            Expr::Constant(Constant::None).literal_truthiness(),
            Some(false)
        );
        assert_eq!(Expr::int_literal(0).literal_truthiness(), Some(false));
        assert_eq!(
            Expr::Constant(Constant::Int(IntLiteral::parse("0"))).literal_truthiness(),
            Some(false)
        );
        assert_eq!(Expr::name("x").literal_truthiness(), None);
    }

    #[test]
    fn test_alias_bound_name() {
        let plain = Alias {
            name: "os.path".into(),
            asname: None,
        };
        assert_eq!(plain.bound_name(), "os");
        let aliased = Alias {
            name: "numpy".into(),
            asname: Some("np".into()),
        };
        assert_eq!(aliased.bound_name(), "np");
    }
}
