use std::io::{self, Write};

use log::debug;

use crate::{
    diagnostics::Fault,
    opcode::Opcode,
    stack::{Stack, StackStats},
};

pub const REGISTER_COUNT: usize = 32;

/// Always zero; nothing writes it.
pub const ZERO: usize = 0;
/// Low word of a wide multiply, or the quotient of a divide.
pub const LO: usize = 1;
/// High word of a wide multiply, or the remainder of a divide.
pub const HI: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct VmConfig {
    /// Print each instruction and the live stack before executing it.
    pub trace: bool,
}

/// Outcome of a single [`Vm::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Halted,
}

/// Stack machine over a flat program of 32-bit words.
///
/// `PRINT` writes one decimal value per line to the output writer, which is
/// also where trace lines go when tracing is enabled.
pub struct Vm<W = io::Stdout> {
    registers: [i32; REGISTER_COUNT],
    code: Vec<i32>,
    pc: usize,
    stack: Stack,
    trace: bool,
    output: W,
    halted: bool,
    steps: u64,
}

impl Vm<io::Stdout> {
    pub fn new(program: impl Into<Vec<i32>>) -> Self {
        Self::with_config(program, VmConfig::default())
    }

    pub fn with_config(program: impl Into<Vec<i32>>, config: VmConfig) -> Self {
        Self::with_output(program, config, io::stdout())
    }
}

impl<W: Write> Vm<W> {
    pub fn with_output(program: impl Into<Vec<i32>>, config: VmConfig, output: W) -> Self {
        Self {
            registers: [0; REGISTER_COUNT],
            code: program.into(),
            pc: 0,
            stack: Stack::new(),
            trace: config.trace,
            output,
            halted: false,
            steps: 0,
        }
    }

    /// Runs until `HALT` or a fault.
    pub fn run(&mut self) -> Result<(), Fault> {
        while self.step()? == Step::Continue {}
        debug!(
            "vm: halted at {:04} after {} steps, {} live",
            self.pc,
            self.steps,
            self.stack.len()
        );
        Ok(())
    }

    /// Executes one instruction.
    pub fn step(&mut self) -> Result<Step, Fault> {
        if self.halted {
            return Ok(Step::Halted);
        }

        // Fetch
        let addr = self.pc;
        let word = *self.code.get(addr).ok_or(Fault::PcOutOfBounds {
            pc: addr as i64,
            len: self.code.len(),
        })?;
        let opcode = match Opcode::try_from(word) {
            Ok(opcode) => opcode,
            Err(word) => {
                if self.trace {
                    self.write_trace(addr, &format!(".word {word}"), 0)?;
                }
                return Err(Fault::UnknownOpcode { pc: addr, word });
            }
        };
        if self.trace {
            self.write_trace(addr, opcode.name(), opcode.operand_count())?;
        }
        self.pc += 1;
        self.steps += 1;

        // Decode and execute
        match opcode {
            Opcode::Halt => {
                self.halted = true;
                return Ok(Step::Halted);
            }
            Opcode::Nop => {}
            Opcode::Push => {
                let value = self.operand(addr, opcode)?;
                self.stack.push(value);
            }
            Opcode::Pop => {
                self.pop(addr, opcode)?;
            }
            Opcode::Add => {
                let (a, b) = self.pop_pair(addr, opcode)?;
                self.stack.push(a.wrapping_add(b));
            }
            Opcode::Mul => {
                let (a, b) = self.pop_pair(addr, opcode)?;
                let product = i64::from(a) * i64::from(b);
                self.registers[LO] = product as i32;
                self.registers[HI] = (product >> 32) as i32;
            }
            Opcode::Div => {
                let (a, b) = self.pop_divisor_pair(addr, opcode)?;
                self.registers[LO] = a.wrapping_div(b);
                self.registers[HI] = a.wrapping_rem(b);
            }
            Opcode::Mod => {
                let (a, b) = self.pop_divisor_pair(addr, opcode)?;
                self.stack.push(a.wrapping_rem(b));
            }
            Opcode::Print => {
                let value = self.pop(addr, opcode)?;
                writeln!(self.output, "{value}")
                    .map_err(|source| Fault::Output { pc: addr, source })?;
            }
            Opcode::Jeq | Opcode::Jne => {
                let value = self.operand(addr, opcode)?;
                let target = self.operand(addr, opcode)?;
                let top = self.stack.top().ok_or(Fault::StackUnderflow {
                    pc: addr,
                    opcode: opcode.name(),
                })?;
                if (top == value) == (opcode == Opcode::Jeq) {
                    self.jump(target)?;
                }
            }
            Opcode::J => {
                let target = self.operand(addr, opcode)?;
                self.jump(target)?;
            }
            Opcode::Slt => {
                let a = self.pop(addr, opcode)?;
                let bound = self.operand(addr, opcode)?;
                self.stack.push(i32::from(a < bound));
            }
            Opcode::Sll => {
                let (a, b) = self.pop_pair(addr, opcode)?;
                let shifted = (a as u32).checked_shl(b as u32).unwrap_or(0);
                self.stack.push(shifted as i32);
            }
            Opcode::Srl => {
                let (a, b) = self.pop_pair(addr, opcode)?;
                let shifted = (a as u32).checked_shr(b as u32).unwrap_or(0);
                self.stack.push(shifted as i32);
            }
        }

        Ok(Step::Continue)
    }

    /// Live stack contents, bottom first.
    pub fn stack(&self) -> &[i32] {
        self.stack.as_slice()
    }

    pub fn top(&self) -> Option<i32> {
        self.stack.top()
    }

    /// Index of the top of the stack, `-1` when empty.
    pub fn sp(&self) -> isize {
        self.stack.sp()
    }

    pub fn stack_capacity(&self) -> usize {
        self.stack.capacity()
    }

    pub fn stats(&self) -> StackStats {
        self.stack.stats()
    }

    pub fn register(&self, index: usize) -> Option<i32> {
        self.registers.get(index).copied()
    }

    pub fn registers(&self) -> &[i32; REGISTER_COUNT] {
        &self.registers
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn program(&self) -> &[i32] {
        &self.code
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Instructions executed so far, `HALT` included.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn operand(&mut self, addr: usize, opcode: Opcode) -> Result<i32, Fault> {
        let word = *self.code.get(self.pc).ok_or(Fault::MissingOperand {
            pc: addr,
            opcode: opcode.name(),
        })?;
        self.pc += 1;
        Ok(word)
    }

    fn pop(&mut self, addr: usize, opcode: Opcode) -> Result<i32, Fault> {
        self.stack.pop().ok_or(Fault::StackUnderflow {
            pc: addr,
            opcode: opcode.name(),
        })
    }

    /// Pops `b` then `a`, returning them in push order.
    fn pop_pair(&mut self, addr: usize, opcode: Opcode) -> Result<(i32, i32), Fault> {
        let b = self.pop(addr, opcode)?;
        let a = self.pop(addr, opcode)?;
        Ok((a, b))
    }

    fn pop_divisor_pair(&mut self, addr: usize, opcode: Opcode) -> Result<(i32, i32), Fault> {
        let (a, b) = self.pop_pair(addr, opcode)?;
        if b == 0 {
            return Err(Fault::DivideByZero {
                pc: addr,
                opcode: opcode.name(),
            });
        }
        Ok((a, b))
    }

    fn jump(&mut self, target: i32) -> Result<(), Fault> {
        self.pc = usize::try_from(target).map_err(|_| Fault::PcOutOfBounds {
            pc: i64::from(target),
            len: self.code.len(),
        })?;
        Ok(())
    }

    fn write_trace(&mut self, addr: usize, name: &str, operand_count: usize) -> Result<(), Fault> {
        let first = (addr + 1).min(self.code.len());
        let last = (first + operand_count).min(self.code.len());
        let operands = &self.code[first..last];
        writeln!(
            self.output,
            "{addr:04}: {name} {operands:?} \t{:?}",
            self.stack.as_slice()
        )
        .map_err(|source| Fault::Output { pc: addr, source })
    }
}
