//! Recursive-descent parser from the token stream to [`Module`].
//!
//! Follows the precedence ladder of Python's grammar:
//!
//! - statements: compound statements, then `;`-separated simple statements
//! - expressions: lambda / conditional, `or`, `and`, `not`, comparisons,
//!   `|`, `^`, `&`, shifts, `+ -`, `* / // % @`, unary, `**`, `await`,
//!   primaries (call, attribute, subscript) and atoms
//!
//! Anything outside the modelled subset (e.g. `match` statements, type
//! parameter lists, `except*`) is reported as a [`ParseError`].

use super::ast::*;
use super::lexer::{tokenize, Token, TokenKind};
use crate::errors::ParseError;

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

const AUGMENTED_OPS: &[&str] = &[
    "+=", "-=", "*=", "@=", "/=", "%=", "&=", "|=", "^=", "<<=", ">>=", "**=", "//=",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Parse a complete source unit.
pub fn parse_module(source: &str) -> Result<Module, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.module()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    // =========================================================================
    // Token helpers
    // =========================================================================

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn error_at(&self, tok: &Token, message: impl Into<String>) -> ParseError {
        ParseError::new(message, tok.line, tok.column)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        self.error_at(self.peek(), message)
    }

    fn at_op(&self, op: &str) -> bool {
        let tok = self.peek();
        tok.kind == TokenKind::Op && tok.text == op
    }

    fn at_op_at(&self, offset: usize, op: &str) -> bool {
        let tok = self.peek_at(offset);
        tok.kind == TokenKind::Op && tok.text == op
    }

    fn at_keyword(&self, kw: &str) -> bool {
        self.at_keyword_at(0, kw)
    }

    fn at_keyword_at(&self, offset: usize, kw: &str) -> bool {
        let tok = self.peek_at(offset);
        tok.kind == TokenKind::Name && tok.text == kw
    }

    fn at_kind(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> PResult<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{op}', found {:?}", self.peek().text)))
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> PResult<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{kw}', found {:?}", self.peek().text)))
        }
    }

    fn expect_name(&mut self) -> PResult<String> {
        let tok = self.peek();
        if tok.kind == TokenKind::Name && !is_keyword(&tok.text) {
            Ok(self.advance().text)
        } else {
            Err(self.error(format!("expected identifier, found {:?}", tok.text)))
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline | TokenKind::EndMarker) || self.at_op(";")
    }

    /// Whether the current token can begin an expression.
    fn starts_expression(&self) -> bool {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Number | TokenKind::String => true,
            TokenKind::Name => {
                !is_keyword(&tok.text)
                    || matches!(
                        tok.text.as_str(),
                        "True" | "False" | "None" | "lambda" | "not" | "await"
                    )
            }
            TokenKind::Op => matches!(
                tok.text.as_str(),
                "(" | "[" | "{" | "-" | "+" | "~" | "*" | "..."
            ),
            _ => false,
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn module(&mut self) -> PResult<Module> {
        let mut body = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::EndMarker => break,
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::Indent => return Err(self.error("unexpected indent")),
                _ => body.extend(self.statement()?),
            }
        }
        Ok(Module { body })
    }

    fn statement(&mut self) -> PResult<Vec<Stmt>> {
        if self.at_op("@") {
            return Ok(vec![self.decorated()?]);
        }
        if self.at_kind(TokenKind::Name) {
            let word = self.peek().text.clone();
            match word.as_str() {
                "def" => return Ok(vec![self.function_def(Vec::new(), false)?]),
                "class" => return Ok(vec![self.class_def(Vec::new())?]),
                "if" => return Ok(vec![self.if_stmt()?]),
                "while" => return Ok(vec![self.while_stmt()?]),
                "for" => return Ok(vec![self.for_stmt(false)?]),
                "try" => return Ok(vec![self.try_stmt()?]),
                "with" => return Ok(vec![self.with_stmt(false)?]),
                "async" => return Ok(vec![self.async_stmt(Vec::new())?]),
                "match" if self.looks_like_match_statement() => {
                    return Err(self.error("match statements are not supported"))
                }
                _ => {}
            }
        }
        self.simple_statements()
    }

    fn looks_like_match_statement(&self) -> bool {
        // `match x:` at statement start; a bare name `match` used as a variable
        // is followed by an operator such as `=` or `.` instead.
        let next = self.peek_at(1);
        !(next.kind == TokenKind::Op && !matches!(next.text.as_str(), "(" | "[" | "{" | "-" | "*"))
            && !matches!(next.kind, TokenKind::Newline | TokenKind::EndMarker)
    }

    fn decorated(&mut self) -> PResult<Stmt> {
        let mut decorators = Vec::new();
        while self.eat_op("@") {
            decorators.push(self.named_expression()?);
            if !self.at_kind(TokenKind::Newline) {
                return Err(self.error("expected newline after decorator"));
            }
            self.advance();
        }
        if self.at_keyword("def") {
            self.function_def(decorators, false)
        } else if self.at_keyword("class") {
            self.class_def(decorators)
        } else if self.at_keyword("async") {
            self.async_stmt(decorators)
        } else {
            Err(self.error("expected 'def' or 'class' after decorator"))
        }
    }

    fn async_stmt(&mut self, decorators: Vec<Expr>) -> PResult<Stmt> {
        self.expect_keyword("async")?;
        if self.at_keyword("def") {
            self.function_def(decorators, true)
        } else if !decorators.is_empty() {
            Err(self.error("expected 'def' after decorator"))
        } else if self.at_keyword("for") {
            self.for_stmt(true)
        } else if self.at_keyword("with") {
            self.with_stmt(true)
        } else {
            Err(self.error("expected 'def', 'for' or 'with' after 'async'"))
        }
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect_op(":")?;
        if !self.at_kind(TokenKind::Newline) {
            return self.simple_statements();
        }
        self.advance();
        if !self.at_kind(TokenKind::Indent) {
            return Err(self.error("expected an indented block"));
        }
        self.advance();
        let mut body = Vec::new();
        while !self.at_kind(TokenKind::Dedent) {
            if self.at_kind(TokenKind::EndMarker) {
                return Err(self.error("unexpected end of input in block"));
            }
            if self.at_kind(TokenKind::Newline) {
                self.advance();
                continue;
            }
            body.extend(self.statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn function_def(&mut self, decorators: Vec<Expr>, is_async: bool) -> PResult<Stmt> {
        self.expect_keyword("def")?;
        let name = self.expect_name()?;
        if self.at_op("[") {
            return Err(self.error("type parameter lists are not supported"));
        }
        self.expect_op("(")?;
        let params = self.parameters(")", true)?;
        self.expect_op(")")?;
        let returns = if self.eat_op("->") {
            Some(self.expression()?)
        } else {
            None
        };
        let body = self.block()?;
        Ok(Stmt::FunctionDef(FunctionDef {
            name,
            params,
            body,
            decorators,
            returns,
            is_async,
        }))
    }

    /// Parameter list up to (not including) `closer`.
    fn parameters(&mut self, closer: &str, annotations: bool) -> PResult<Parameters> {
        let mut params = Parameters::default();
        let mut keyword_only = false;
        while !self.at_op(closer) {
            if self.eat_op("/") {
                if keyword_only || !params.posonly.is_empty() {
                    return Err(self.error("misplaced '/' in parameter list"));
                }
                params.posonly = std::mem::take(&mut params.args);
            } else if self.eat_op("**") {
                params.kwarg = Some(self.param(annotations, false)?);
            } else if self.eat_op("*") {
                keyword_only = true;
                if !self.at_op(",") && !self.at_op(closer) {
                    params.vararg = Some(self.param(annotations, false)?);
                }
            } else {
                let param = self.param(annotations, true)?;
                if keyword_only {
                    params.kwonly.push(param);
                } else {
                    params.args.push(param);
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(params)
    }

    fn param(&mut self, annotations: bool, allow_default: bool) -> PResult<Param> {
        let name = self.expect_name()?;
        let annotation = if annotations && self.eat_op(":") {
            Some(self.expression()?)
        } else {
            None
        };
        let default = if allow_default && self.eat_op("=") {
            Some(self.expression()?)
        } else {
            None
        };
        Ok(Param {
            name,
            annotation,
            default,
        })
    }

    fn class_def(&mut self, decorators: Vec<Expr>) -> PResult<Stmt> {
        self.expect_keyword("class")?;
        let name = self.expect_name()?;
        if self.at_op("[") {
            return Err(self.error("type parameter lists are not supported"));
        }
        let (bases, keywords) = if self.eat_op("(") {
            self.call_arguments()?
        } else {
            (Vec::new(), Vec::new())
        };
        let body = self.block()?;
        Ok(Stmt::ClassDef(ClassDef {
            name,
            bases,
            keywords,
            body,
            decorators,
        }))
    }

    fn if_stmt(&mut self) -> PResult<Stmt> {
        // Entered on either `if` or `elif`.
        self.advance();
        let test = self.named_expression()?;
        let body = self.block()?;
        let orelse = if self.at_keyword("elif") {
            vec![self.if_stmt()?]
        } else if self.eat_keyword("else") {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::If { test, body, orelse })
    }

    fn while_stmt(&mut self) -> PResult<Stmt> {
        self.expect_keyword("while")?;
        let test = self.named_expression()?;
        let body = self.block()?;
        let orelse = if self.eat_keyword("else") {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::While { test, body, orelse })
    }

    fn for_stmt(&mut self, is_async: bool) -> PResult<Stmt> {
        self.expect_keyword("for")?;
        let target = self.target_list()?;
        self.expect_keyword("in")?;
        let iter = self.star_expressions()?;
        let body = self.block()?;
        let orelse = if self.eat_keyword("else") {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::For {
            target,
            iter,
            body,
            orelse,
            is_async,
        })
    }

    fn try_stmt(&mut self) -> PResult<Stmt> {
        self.expect_keyword("try")?;
        let body = self.block()?;
        let mut handlers = Vec::new();
        while self.eat_keyword("except") {
            if self.at_op("*") {
                return Err(self.error("except* is not supported"));
            }
            let (typ, name) = if self.at_op(":") {
                (None, None)
            } else {
                let typ = self.expression()?;
                let name = if self.eat_keyword("as") {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                (Some(typ), name)
            };
            let body = self.block()?;
            handlers.push(ExceptHandler { typ, name, body });
        }
        let orelse = if !handlers.is_empty() && self.eat_keyword("else") {
            self.block()?
        } else {
            Vec::new()
        };
        let finalbody = if self.eat_keyword("finally") {
            self.block()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.error("expected 'except' or 'finally' block"));
        }
        Ok(Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    fn with_stmt(&mut self, is_async: bool) -> PResult<Stmt> {
        self.expect_keyword("with")?;
        let items = match self.parenthesized_with_items()? {
            Some(items) => items,
            None => {
                let mut items = vec![self.with_item()?];
                while self.eat_op(",") {
                    items.push(self.with_item()?);
                }
                items
            }
        };
        let body = self.block()?;
        Ok(Stmt::With {
            items,
            body,
            is_async,
        })
    }

    /// `with (a as b, c as d):` form. Backtracks when the parentheses turn
    /// out to belong to an ordinary expression.
    fn parenthesized_with_items(&mut self) -> PResult<Option<Vec<WithItem>>> {
        if !self.at_op("(") {
            return Ok(None);
        }
        let start = self.pos;
        self.advance();
        let attempt = (|| -> PResult<Vec<WithItem>> {
            let mut items = Vec::new();
            while !self.at_op(")") {
                items.push(self.with_item()?);
                if !self.eat_op(",") {
                    break;
                }
            }
            self.expect_op(")")?;
            Ok(items)
        })();
        match attempt {
            Ok(items) if self.at_op(":") && !items.is_empty() => Ok(Some(items)),
            _ => {
                self.pos = start;
                Ok(None)
            }
        }
    }

    fn with_item(&mut self) -> PResult<WithItem> {
        let context_expr = self.expression()?;
        let optional_vars = if self.eat_keyword("as") {
            Some(self.single_target()?)
        } else {
            None
        };
        Ok(WithItem {
            context_expr,
            optional_vars,
        })
    }

    fn simple_statements(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = vec![self.simple_statement()?];
        while self.eat_op(";") {
            if matches!(self.peek().kind, TokenKind::Newline | TokenKind::EndMarker) {
                break;
            }
            stmts.push(self.simple_statement()?);
        }
        match self.peek().kind {
            TokenKind::Newline => {
                self.advance();
            }
            TokenKind::EndMarker => {}
            _ => return Err(self.error(format!("unexpected token {:?}", self.peek().text))),
        }
        Ok(stmts)
    }

    fn simple_statement(&mut self) -> PResult<Stmt> {
        let tok = self.peek().clone();
        if tok.kind == TokenKind::Name {
            match tok.text.as_str() {
                "pass" => {
                    self.advance();
                    return Ok(Stmt::Pass);
                }
                "break" => {
                    self.advance();
                    return Ok(Stmt::Break);
                }
                "continue" => {
                    self.advance();
                    return Ok(Stmt::Continue);
                }
                "return" => {
                    self.advance();
                    let value = if self.at_statement_end() {
                        None
                    } else {
                        Some(self.star_expressions()?)
                    };
                    return Ok(Stmt::Return { value });
                }
                "raise" => {
                    self.advance();
                    let (exc, cause) = if self.at_statement_end() {
                        (None, None)
                    } else {
                        let exc = self.expression()?;
                        let cause = if self.eat_keyword("from") {
                            Some(self.expression()?)
                        } else {
                            None
                        };
                        (Some(exc), cause)
                    };
                    return Ok(Stmt::Raise { exc, cause });
                }
                "global" | "nonlocal" => {
                    self.advance();
                    let mut names = vec![self.expect_name()?];
                    while self.eat_op(",") {
                        names.push(self.expect_name()?);
                    }
                    return Ok(if tok.text == "global" {
                        Stmt::Global { names }
                    } else {
                        Stmt::Nonlocal { names }
                    });
                }
                "del" => {
                    self.advance();
                    let mut targets = vec![self.single_target()?];
                    while self.eat_op(",") {
                        if self.at_statement_end() {
                            break;
                        }
                        targets.push(self.single_target()?);
                    }
                    return Ok(Stmt::Delete { targets });
                }
                "assert" => {
                    self.advance();
                    let test = self.expression()?;
                    let msg = if self.eat_op(",") {
                        Some(self.expression()?)
                    } else {
                        None
                    };
                    return Ok(Stmt::Assert { test, msg });
                }
                "import" => return self.import_stmt(),
                "from" => return self.import_from_stmt(),
                _ => {}
            }
        }
        self.expression_statement()
    }

    fn dotted_name(&mut self) -> PResult<String> {
        let mut name = self.expect_name()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn import_stmt(&mut self) -> PResult<Stmt> {
        self.expect_keyword("import")?;
        let mut names = Vec::new();
        loop {
            let name = self.dotted_name()?;
            let asname = if self.eat_keyword("as") {
                Some(self.expect_name()?)
            } else {
                None
            };
            names.push(Alias { name, asname });
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(Stmt::Import { names })
    }

    fn import_from_stmt(&mut self) -> PResult<Stmt> {
        self.expect_keyword("from")?;
        let mut level = 0u32;
        loop {
            if self.eat_op(".") {
                level += 1;
            } else if self.eat_op("...") {
                level += 3;
            } else {
                break;
            }
        }
        let module = if self.at_keyword("import") {
            None
        } else {
            Some(self.dotted_name()?)
        };
        if module.is_none() && level == 0 {
            return Err(self.error("expected module name"));
        }
        self.expect_keyword("import")?;
        if self.eat_op("*") {
            return Ok(Stmt::ImportFrom {
                module,
                names: vec![Alias {
                    name: "*".into(),
                    asname: None,
                }],
                level,
            });
        }
        let parenthesized = self.eat_op("(");
        let mut names = Vec::new();
        loop {
            if parenthesized && self.at_op(")") {
                break;
            }
            let name = self.expect_name()?;
            let asname = if self.eat_keyword("as") {
                Some(self.expect_name()?)
            } else {
                None
            };
            names.push(Alias { name, asname });
            if !self.eat_op(",") {
                break;
            }
        }
        if parenthesized {
            self.expect_op(")")?;
        }
        if names.is_empty() {
            return Err(self.error("expected imported name"));
        }
        Ok(Stmt::ImportFrom {
            module,
            names,
            level,
        })
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let first = self.star_expressions_or_yield()?;

        if self.at_op(":") {
            self.advance();
            let annotation = self.expression()?;
            let value = if self.eat_op("=") {
                Some(self.star_expressions_or_yield()?)
            } else {
                None
            };
            return Ok(Stmt::AnnAssign {
                target: first,
                annotation,
                value,
            });
        }

        let tok = self.peek();
        if tok.kind == TokenKind::Op && AUGMENTED_OPS.contains(&tok.text.as_str()) {
            let symbol = tok.text.trim_end_matches('=').to_string();
            let op = Operator::from_symbol(&symbol)
                .ok_or_else(|| self.error(format!("unknown operator {symbol}")))?;
            self.advance();
            let value = self.star_expressions_or_yield()?;
            return Ok(Stmt::AugAssign {
                target: first,
                op,
                value,
            });
        }

        if self.at_op("=") {
            let mut targets = vec![first];
            while self.eat_op("=") {
                targets.push(self.star_expressions_or_yield()?);
            }
            let value = targets
                .pop()
                .ok_or_else(|| self.error("assignment without value"))?;
            return Ok(Stmt::Assign { targets, value });
        }

        Ok(Stmt::Expr { value: first })
    }

    // =========================================================================
    // Targets
    // =========================================================================

    /// Comma-separated targets for `for` loops and comprehensions; stops
    /// before `in` because each element is parsed at the bitwise-or level.
    fn target_list(&mut self) -> PResult<Expr> {
        let first = self.star_target()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.at_keyword("in") || self.at_op("=") {
                break;
            }
            elts.push(self.star_target()?);
        }
        Ok(Expr::Tuple { elts })
    }

    fn star_target(&mut self) -> PResult<Expr> {
        if self.eat_op("*") {
            Ok(Expr::Starred {
                value: Box::new(self.bitwise_or()?),
            })
        } else {
            self.bitwise_or()
        }
    }

    fn single_target(&mut self) -> PResult<Expr> {
        self.bitwise_or()
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn star_expressions_or_yield(&mut self) -> PResult<Expr> {
        if self.at_keyword("yield") {
            self.yield_expression()
        } else {
            self.star_expressions()
        }
    }

    fn yield_expression(&mut self) -> PResult<Expr> {
        self.expect_keyword("yield")?;
        if self.eat_keyword("from") {
            return Ok(Expr::YieldFrom {
                value: Box::new(self.expression()?),
            });
        }
        let value = if self.starts_expression() {
            Some(Box::new(self.star_expressions()?))
        } else {
            None
        };
        Ok(Expr::Yield { value })
    }

    fn star_expressions(&mut self) -> PResult<Expr> {
        let first = self.star_expression()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if !self.starts_expression() {
                break;
            }
            elts.push(self.star_expression()?);
        }
        Ok(Expr::Tuple { elts })
    }

    fn star_expression(&mut self) -> PResult<Expr> {
        if self.eat_op("*") {
            Ok(Expr::Starred {
                value: Box::new(self.bitwise_or()?),
            })
        } else {
            self.expression()
        }
    }

    fn star_named_expression(&mut self) -> PResult<Expr> {
        if self.eat_op("*") {
            Ok(Expr::Starred {
                value: Box::new(self.bitwise_or()?),
            })
        } else {
            self.named_expression()
        }
    }

    fn named_expression(&mut self) -> PResult<Expr> {
        let tok = self.peek();
        if tok.kind == TokenKind::Name && !is_keyword(&tok.text) && self.at_op_at(1, ":=") {
            let target = self.advance().text;
            self.advance();
            let value = self.expression()?;
            return Ok(Expr::NamedExpr {
                target,
                value: Box::new(value),
            });
        }
        self.expression()
    }

    fn expression(&mut self) -> PResult<Expr> {
        if self.at_keyword("lambda") {
            return self.lambda();
        }
        let body = self.disjunction()?;
        if self.at_keyword("if") {
            self.advance();
            let test = self.disjunction()?;
            self.expect_keyword("else")?;
            let orelse = self.expression()?;
            return Ok(Expr::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn lambda(&mut self) -> PResult<Expr> {
        self.expect_keyword("lambda")?;
        let params = self.parameters(":", false)?;
        self.expect_op(":")?;
        let body = self.expression()?;
        Ok(Expr::Lambda {
            params: Box::new(params),
            body: Box::new(body),
        })
    }

    fn disjunction(&mut self) -> PResult<Expr> {
        let first = self.conjunction()?;
        if !self.at_keyword("or") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword("or") {
            values.push(self.conjunction()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOperator::Or,
            values,
        })
    }

    fn conjunction(&mut self) -> PResult<Expr> {
        let first = self.inversion()?;
        if !self.at_keyword("and") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword("and") {
            values.push(self.inversion()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOperator::And,
            values,
        })
    }

    fn inversion(&mut self) -> PResult<Expr> {
        if self.eat_keyword("not") {
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(self.inversion()?),
            });
        }
        self.comparison()
    }

    fn comparison_operator(&mut self) -> Option<CmpOperator> {
        let tok = self.peek();
        let (kind, text) = (tok.kind, tok.text.clone());
        let op = match (kind, text.as_str()) {
            (TokenKind::Op, "==") => CmpOperator::Eq,
            (TokenKind::Op, "!=") => CmpOperator::NotEq,
            (TokenKind::Op, "<") => CmpOperator::Lt,
            (TokenKind::Op, "<=") => CmpOperator::LtE,
            (TokenKind::Op, ">") => CmpOperator::Gt,
            (TokenKind::Op, ">=") => CmpOperator::GtE,
            (TokenKind::Name, "in") => CmpOperator::In,
            (TokenKind::Name, "not") if self.at_keyword_at(1, "in") => {
                self.advance();
                CmpOperator::NotIn
            }
            (TokenKind::Name, "is") => {
                if self.at_keyword_at(1, "not") {
                    self.advance();
                    CmpOperator::IsNot
                } else {
                    CmpOperator::Is
                }
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let left = self.bitwise_or()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.comparison_operator() {
            ops.push(op);
            comparators.push(self.bitwise_or()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::Compare {
            left: Box::new(left),
            ops,
            comparators,
        })
    }

    fn binary_level(
        &mut self,
        symbols: &[&str],
        next: fn(&mut Self) -> PResult<Expr>,
    ) -> PResult<Expr> {
        let mut left = next(self)?;
        loop {
            let tok = self.peek();
            if tok.kind != TokenKind::Op || !symbols.contains(&tok.text.as_str()) {
                return Ok(left);
            }
            let op = Operator::from_symbol(&tok.text)
                .ok_or_else(|| self.error(format!("unknown operator {}", tok.text)))?;
            self.advance();
            let right = next(self)?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    fn bitwise_or(&mut self) -> PResult<Expr> {
        self.binary_level(&["|"], Self::bitwise_xor)
    }

    fn bitwise_xor(&mut self) -> PResult<Expr> {
        self.binary_level(&["^"], Self::bitwise_and)
    }

    fn bitwise_and(&mut self) -> PResult<Expr> {
        self.binary_level(&["&"], Self::shift_expr)
    }

    fn shift_expr(&mut self) -> PResult<Expr> {
        self.binary_level(&["<<", ">>"], Self::sum)
    }

    fn sum(&mut self) -> PResult<Expr> {
        self.binary_level(&["+", "-"], Self::term)
    }

    fn term(&mut self) -> PResult<Expr> {
        self.binary_level(&["*", "/", "//", "%", "@"], Self::factor)
    }

    fn factor(&mut self) -> PResult<Expr> {
        let op = if self.at_op("-") {
            Some(UnaryOperator::USub)
        } else if self.at_op("+") {
            Some(UnaryOperator::UAdd)
        } else if self.at_op("~") {
            Some(UnaryOperator::Invert)
        } else {
            None
        };
        if let Some(op) = op {
            self.advance();
            return Ok(Expr::UnaryOp {
                op,
                operand: Box::new(self.factor()?),
            });
        }
        self.power()
    }

    fn power(&mut self) -> PResult<Expr> {
        let base = self.await_primary()?;
        if self.eat_op("**") {
            let exponent = self.factor()?;
            return Ok(Expr::BinOp {
                left: Box::new(base),
                op: Operator::Pow,
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn await_primary(&mut self) -> PResult<Expr> {
        if self.eat_keyword("await") {
            return Ok(Expr::Await {
                value: Box::new(self.primary()?),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> PResult<Expr> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op(".") {
                let attr = self.expect_name()?;
                expr = Expr::Attribute {
                    value: Box::new(expr),
                    attr,
                };
            } else if self.eat_op("(") {
                let (args, keywords) = self.call_arguments()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    keywords,
                };
            } else if self.eat_op("[") {
                let slice = self.slices()?;
                self.expect_op("]")?;
                expr = Expr::Subscript {
                    value: Box::new(expr),
                    slice: Box::new(slice),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    /// Arguments after an opening `(`, consuming the closing `)`.
    fn call_arguments(&mut self) -> PResult<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        while !self.at_op(")") {
            if self.eat_op("**") {
                keywords.push(Keyword {
                    arg: None,
                    value: self.expression()?,
                });
            } else if self.eat_op("*") {
                args.push(Expr::Starred {
                    value: Box::new(self.expression()?),
                });
            } else if self.peek().kind == TokenKind::Name
                && !is_keyword(&self.peek().text)
                && self.at_op_at(1, "=")
            {
                let arg = self.advance().text;
                self.advance();
                keywords.push(Keyword {
                    arg: Some(arg),
                    value: self.expression()?,
                });
            } else {
                let value = self.named_expression()?;
                if self.at_comprehension() {
                    let generators = self.comprehension_clauses()?;
                    args.push(Expr::GeneratorExp {
                        elt: Box::new(value),
                        generators,
                    });
                } else {
                    args.push(value);
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok((args, keywords))
    }

    fn slices(&mut self) -> PResult<Expr> {
        let first = self.slice_item()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.at_op("]") {
                break;
            }
            elts.push(self.slice_item()?);
        }
        Ok(Expr::Tuple { elts })
    }

    fn slice_item(&mut self) -> PResult<Expr> {
        let lower = if self.at_op(":") {
            None
        } else {
            let expr = self.named_expression()?;
            if !self.at_op(":") {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect_op(":")?;
        let upper = if self.starts_expression() {
            Some(Box::new(self.expression()?))
        } else {
            None
        };
        let step = if self.eat_op(":") && self.starts_expression() {
            Some(Box::new(self.expression()?))
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    fn comprehension_clauses(&mut self) -> PResult<Vec<Comprehension>> {
        let mut generators = Vec::new();
        loop {
            let is_async = if self.at_keyword("async") && self.at_keyword_at(1, "for") {
                self.advance();
                true
            } else {
                false
            };
            if !self.eat_keyword("for") {
                break;
            }
            let target = self.target_list()?;
            self.expect_keyword("in")?;
            let iter = self.disjunction()?;
            let mut ifs = Vec::new();
            while self.eat_keyword("if") {
                ifs.push(self.disjunction()?);
            }
            generators.push(Comprehension {
                target,
                iter,
                ifs,
                is_async,
            });
        }
        if generators.is_empty() {
            return Err(self.error("expected 'for' in comprehension"));
        }
        Ok(generators)
    }

    fn at_comprehension(&self) -> bool {
        self.at_keyword("for") || (self.at_keyword("async") && self.at_keyword_at(1, "for"))
    }

    fn atom(&mut self) -> PResult<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Name => match tok.text.as_str() {
                "True" => {
                    self.advance();
                    Ok(Expr::Constant(Constant::Bool(true)))
                }
                "False" => {
                    self.advance();
                    Ok(Expr::Constant(Constant::Bool(false)))
                }
                "None" => {
                    self.advance();
                    Ok(Expr::Constant(Constant::None))
                }
                word if is_keyword(word) => {
                    Err(self.error_at(&tok, format!("unexpected keyword '{word}'")))
                }
                _ => {
                    self.advance();
                    Ok(Expr::Name { id: tok.text })
                }
            },
            TokenKind::Number => {
                self.advance();
                number_literal(&tok).map(Expr::Constant)
            }
            TokenKind::String => self.strings(),
            TokenKind::Op => match tok.text.as_str() {
                "..." => {
                    self.advance();
                    Ok(Expr::Constant(Constant::Ellipsis))
                }
                "(" => self.paren_atom(),
                "[" => self.list_atom(),
                "{" => self.brace_atom(),
                other => Err(self.error_at(&tok, format!("unexpected token {other:?}"))),
            },
            _ => Err(self.error_at(&tok, "unexpected end of line")),
        }
    }

    fn strings(&mut self) -> PResult<Expr> {
        let mut parts = Vec::new();
        while self.at_kind(TokenKind::String) {
            parts.push(self.advance().text);
        }
        let is_bytes = parts
            .first()
            .map(|p| string_prefix(p).to_ascii_lowercase().contains('b'))
            .unwrap_or(false);
        let literal = StrLiteral { parts };
        Ok(Expr::Constant(if is_bytes {
            Constant::Bytes(literal)
        } else {
            Constant::Str(literal)
        }))
    }

    fn paren_atom(&mut self) -> PResult<Expr> {
        self.expect_op("(")?;
        if self.eat_op(")") {
            return Ok(Expr::Tuple { elts: Vec::new() });
        }
        if self.at_keyword("yield") {
            let expr = self.yield_expression()?;
            self.expect_op(")")?;
            return Ok(expr);
        }
        let first = self.star_named_expression()?;
        if self.at_comprehension() {
            let generators = self.comprehension_clauses()?;
            self.expect_op(")")?;
            return Ok(Expr::GeneratorExp {
                elt: Box::new(first),
                generators,
            });
        }
        if self.eat_op(")") {
            if matches!(first, Expr::Starred { .. }) {
                return Err(self.error("starred expression must be in a tuple"));
            }
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.at_op(")") {
                break;
            }
            elts.push(self.star_named_expression()?);
        }
        self.expect_op(")")?;
        Ok(Expr::Tuple { elts })
    }

    fn list_atom(&mut self) -> PResult<Expr> {
        self.expect_op("[")?;
        if self.eat_op("]") {
            return Ok(Expr::List { elts: Vec::new() });
        }
        let first = self.star_named_expression()?;
        if self.at_comprehension() {
            let generators = self.comprehension_clauses()?;
            self.expect_op("]")?;
            return Ok(Expr::ListComp {
                elt: Box::new(first),
                generators,
            });
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.at_op("]") {
                break;
            }
            elts.push(self.star_named_expression()?);
        }
        self.expect_op("]")?;
        Ok(Expr::List { elts })
    }

    fn brace_atom(&mut self) -> PResult<Expr> {
        self.expect_op("{")?;
        if self.eat_op("}") {
            return Ok(Expr::Dict {
                entries: Vec::new(),
            });
        }

        // Dict display or comprehension.
        if self.at_op("**") {
            return self.dict_rest(None);
        }
        let first = self.star_named_expression()?;
        if self.eat_op(":") {
            let value = self.expression()?;
            if self.at_comprehension() {
                let generators = self.comprehension_clauses()?;
                self.expect_op("}")?;
                return Ok(Expr::DictComp {
                    key: Box::new(first),
                    value: Box::new(value),
                    generators,
                });
            }
            return self.dict_rest(Some(DictEntry {
                key: Some(first),
                value,
            }));
        }

        // Set display or comprehension.
        if self.at_comprehension() {
            let generators = self.comprehension_clauses()?;
            self.expect_op("}")?;
            return Ok(Expr::SetComp {
                elt: Box::new(first),
                generators,
            });
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.at_op("}") {
                break;
            }
            elts.push(self.star_named_expression()?);
        }
        self.expect_op("}")?;
        Ok(Expr::Set { elts })
    }

    fn dict_rest(&mut self, first: Option<DictEntry>) -> PResult<Expr> {
        let mut entries: Vec<DictEntry> = first.into_iter().collect();
        if !entries.is_empty() && !self.eat_op(",") {
            self.expect_op("}")?;
            return Ok(Expr::Dict { entries });
        }
        while !self.at_op("}") {
            if self.eat_op("**") {
                entries.push(DictEntry {
                    key: None,
                    value: self.bitwise_or()?,
                });
            } else {
                let key = self.expression()?;
                self.expect_op(":")?;
                let value = self.expression()?;
                entries.push(DictEntry {
                    key: Some(key),
                    value,
                });
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op("}")?;
        Ok(Expr::Dict { entries })
    }
}

fn number_literal(tok: &Token) -> PResult<Constant> {
    let text = tok.text.as_str();
    let lower = text.to_ascii_lowercase();
    if lower.ends_with('j') {
        return Ok(Constant::Imaginary(text.to_string()));
    }
    let is_radix = lower.starts_with("0x") || lower.starts_with("0o") || lower.starts_with("0b");
    if !is_radix && (lower.contains('.') || lower.contains('e')) {
        return FloatLiteral::parse(text)
            .map(Constant::Float)
            .ok_or_else(|| ParseError::new(format!("invalid float {text}"), tok.line, tok.column));
    }
    Ok(Constant::Int(IntLiteral::parse(text)))
}
