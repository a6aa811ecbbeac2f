use std::{fmt, str::FromStr};

/// Instruction set of the virtual machine.
///
/// Programs are flat `i32` arrays: an opcode word followed by its immediate
/// operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Opcode {
    Halt = 0,
    Nop = 1,
    Push = 2,
    Pop = 3,
    Add = 4,
    /// Wide multiply into `LO`/`HI`. Pushes nothing.
    Mul = 5,
    /// Quotient into `LO`, remainder into `HI`. Pushes nothing.
    Div = 6,
    Mod = 7,
    Print = 8,
    /// `jeq value, address`; compares against the top without popping it.
    Jeq = 9,
    /// `jne value, address`; compares against the top without popping it.
    Jne = 10,
    J = 11,
    Slt = 12,
    Sll = 13,
    Srl = 14,
}

impl Opcode {
    pub const ALL: [Opcode; 15] = [
        Opcode::Halt,
        Opcode::Nop,
        Opcode::Push,
        Opcode::Pop,
        Opcode::Add,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Print,
        Opcode::Jeq,
        Opcode::Jne,
        Opcode::J,
        Opcode::Slt,
        Opcode::Sll,
        Opcode::Srl,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Opcode::Halt => "halt",
            Opcode::Nop => "nop",
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::Add => "add",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::Print => "print",
            Opcode::Jeq => "jeq",
            Opcode::Jne => "jne",
            Opcode::J => "j",
            Opcode::Slt => "slt",
            Opcode::Sll => "sll",
            Opcode::Srl => "srl",
        }
    }

    /// Number of immediate words following the opcode.
    pub const fn operand_count(self) -> usize {
        match self {
            Opcode::Push | Opcode::J | Opcode::Slt => 1,
            Opcode::Jeq | Opcode::Jne => 2,
            _ => 0,
        }
    }

    pub const fn word(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for Opcode {
    type Error = i32;

    fn try_from(word: i32) -> Result<Self, Self::Error> {
        usize::try_from(word)
            .ok()
            .and_then(|index| Opcode::ALL.get(index).copied())
            .ok_or(word)
    }
}

impl From<Opcode> for i32 {
    fn from(opcode: Opcode) -> Self {
        opcode.word()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mnemonic `{0}`")]
pub struct UnknownMnemonic(pub String);

impl FromStr for Opcode {
    type Err = UnknownMnemonic;

    fn from_str(mnemonic: &str) -> Result<Self, Self::Err> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|opcode| opcode.name().eq_ignore_ascii_case(mnemonic))
            .ok_or_else(|| UnknownMnemonic(mnemonic.to_string()))
    }
}

pub const HALT: i32 = Opcode::Halt.word();
pub const NOP: i32 = Opcode::Nop.word();
pub const PUSH: i32 = Opcode::Push.word();
pub const POP: i32 = Opcode::Pop.word();
pub const ADD: i32 = Opcode::Add.word();
pub const MUL: i32 = Opcode::Mul.word();
pub const DIV: i32 = Opcode::Div.word();
pub const MOD: i32 = Opcode::Mod.word();
pub const PRINT: i32 = Opcode::Print.word();
pub const JEQ: i32 = Opcode::Jeq.word();
pub const JNE: i32 = Opcode::Jne.word();
pub const J: i32 = Opcode::J.word();
pub const SLT: i32 = Opcode::Slt.word();
pub const SLL: i32 = Opcode::Sll.word();
pub const SRL: i32 = Opcode::Srl.word();
