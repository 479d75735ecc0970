//! Rayforce Compiler: parses source text into an AST (`spec.md` §4.5)
//! and compiles it into bytecode (`spec.md` §4.6).
//!
//! `rayforce-runtime` is the only expected consumer: it calls
//! [`parse`] then [`compile_program`]/[`compile_lambda`] and executes
//! the resulting [`CompiledLambda`] with its VM.

pub mod ast;
pub mod builtins;
pub mod compiler;
pub mod lexer;
pub mod opcode;
pub mod parser;
pub mod spans;

pub use ast::{Expr, Literal, Program, SpanId};
pub use builtins::{is_control_form, is_special_form, known_arity, Arity, CONTROL_FORMS, SPECIAL_FORMS};
pub use compiler::{compile_lambda, compile_program, CompiledLambda};
pub use opcode::{DebugMap, Op};
pub use parser::parse;
pub use spans::SpanTable;
