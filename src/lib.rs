//! Building blocks for small languages: a lexer driven by state functions,
//! an extensible Pratt parser, and a stack machine with a wide-result
//! register file.
//!
//! The stages are independent. A lexer's items feed a [`Parser`]; turning the
//! parsed expressions into [`Vm`] bytecode is left to the language author,
//! with [`ProgramBuilder`] as the usual starting point.

pub mod diagnostics;
pub mod lexer;
pub mod opcode;
pub mod parser;
pub mod program;
pub mod stack;
pub mod token;
pub mod vm;

pub use diagnostics::{Diagnostic, DiagnosticKind, Fault, KilnError, SourceSpan};
pub use lexer::{Item, Lexer, Scanner, StateFn};
pub use opcode::Opcode;
pub use parser::{InfixParselet, Parser, PrefixParselet};
pub use program::{Label, ProgramBuilder, assemble, disassemble};
pub use token::Token;
pub use vm::{Step, Vm, VmConfig};
