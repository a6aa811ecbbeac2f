use std::fmt;

use thiserror::Error;

/// Represents a byte span within the scanned source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Pipeline stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexer,
    Parser,
    Assembler,
    Runtime,
}

/// Terminal error reported by one of the pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<SourceSpan>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    pub fn lexer(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Lexer, message)
    }

    pub fn parser(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Parser, message)
    }

    pub fn assembler(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Assembler, message)
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiagnosticKind::Lexer => "scan",
            DiagnosticKind::Parser => "parse",
            DiagnosticKind::Assembler => "assembly",
            DiagnosticKind::Runtime => "runtime",
        })
    }
}

/// Renders as `parse error at 4..5: message`, one `  = note` line per note.
impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error", self.kind)?;
        if let Some(span) = self.span {
            write!(f, " at {span}")?;
        }
        write!(f, ": {}", self.message)?;
        for note in &self.notes {
            write!(f, "\n  = {note}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Fatal condition raised while executing a program.
///
/// Variants carry the address involved in the fault.
#[derive(Debug, Error)]
pub enum Fault {
    #[error("program counter {pc} is outside the program (length {len})")]
    PcOutOfBounds { pc: i64, len: usize },
    #[error("`{opcode}` at {pc:04} is missing an operand")]
    MissingOperand { pc: usize, opcode: &'static str },
    #[error("unknown opcode {word} at {pc:04}")]
    UnknownOpcode { pc: usize, word: i32 },
    #[error("stack underflow in `{opcode}` at {pc:04}")]
    StackUnderflow { pc: usize, opcode: &'static str },
    #[error("division by zero in `{opcode}` at {pc:04}")]
    DivideByZero { pc: usize, opcode: &'static str },
    #[error("writing program output at {pc:04} failed: {source}")]
    Output {
        pc: usize,
        #[source]
        source: std::io::Error,
    },
}

impl Fault {
    /// Address of the faulting instruction, when it lies inside the program.
    pub fn pc(&self) -> Option<usize> {
        match self {
            Fault::PcOutOfBounds { .. } => None,
            Fault::MissingOperand { pc, .. }
            | Fault::UnknownOpcode { pc, .. }
            | Fault::StackUnderflow { pc, .. }
            | Fault::DivideByZero { pc, .. }
            | Fault::Output { pc, .. } => Some(*pc),
        }
    }
}

impl From<Fault> for Diagnostic {
    fn from(fault: Fault) -> Self {
        let mut diagnostic = Diagnostic::new(DiagnosticKind::Runtime, fault.to_string());
        if let Some(pc) = fault.pc() {
            diagnostic = diagnostic.with_note(format!("faulting address: {pc:04}"));
        }
        diagnostic
    }
}

/// Unified error type for the toolkit.
#[derive(Debug, Error)]
pub enum KilnError {
    #[error("{0}")]
    Diagnostic(#[from] Diagnostic),
    #[error("runtime fault: {0}")]
    Fault(#[from] Fault),
}
