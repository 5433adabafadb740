//! Python syntax layer: tokenizer, parser, typed tree, traversal and printer.
//!
//! # Architecture
//!
//! - [`lexer`]: logical-line tokens with INDENT/DEDENT
//! - [`parser`]: recursive descent into [`ast::Module`]
//! - [`visit`]: `Visitor` / `Transformer` traits
//! - [`unparse`]: canonical printer whose output reparses to an equal tree

pub mod ast;
pub mod builtins;
pub mod lexer;
mod parser;
mod unparse;
pub mod visit;

pub use ast::*;
pub use parser::{is_keyword, parse_module};
pub use unparse::{unparse, unparse_expr};

/// True when `source` parses.
pub fn verify_syntax(source: &str) -> bool {
    parse_module(source).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_syntax() {
        assert!(verify_syntax("x = 1\n"));
        assert!(verify_syntax(""));
        assert!(!verify_syntax("def (:\n"));
    }
}
