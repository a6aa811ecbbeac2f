use indexmap::IndexMap;

use crate::{
    diagnostics::{Diagnostic, SourceSpan},
    opcode::{Opcode, UnknownMnemonic},
};

/// Jump target created by [`ProgramBuilder::label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

/// Immediate operand of an instruction being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Word(i32),
    /// Address of a label, patched in by [`ProgramBuilder::finish`].
    Label(Label),
}

impl From<i32> for Operand {
    fn from(word: i32) -> Self {
        Operand::Word(word)
    }
}

impl From<Label> for Operand {
    fn from(label: Label) -> Self {
        Operand::Label(label)
    }
}

/// Incremental builder for VM programs with forward-referenced labels.
///
/// Mistakes (wrong operand count, a label bound twice) are remembered and
/// reported by [`finish`](ProgramBuilder::finish), so calls can be chained.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    code: Vec<i32>,
    labels: Vec<Option<usize>>,
    patches: Vec<(usize, Label)>,
    error: Option<Diagnostic>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address the next instruction will be placed at.
    pub fn address(&self) -> usize {
        self.code.len()
    }

    pub fn instruction(&mut self, opcode: Opcode, operands: &[Operand]) -> &mut Self {
        if operands.len() != opcode.operand_count() {
            let diagnostic = Diagnostic::assembler(format!(
                "`{opcode}` takes {} operand(s) but was given {}",
                opcode.operand_count(),
                operands.len()
            ))
            .with_note(format!("at address {:04}", self.address()));
            self.record(diagnostic);
            return self;
        }
        self.code.push(opcode.word());
        for operand in operands {
            match *operand {
                Operand::Word(word) => self.code.push(word),
                Operand::Label(label) => {
                    self.patches.push((self.code.len(), label));
                    self.code.push(0);
                }
            }
        }
        self
    }

    pub fn emit(&mut self, opcode: Opcode, operands: &[i32]) -> &mut Self {
        let operands: Vec<Operand> = operands.iter().copied().map(Operand::Word).collect();
        self.instruction(opcode, &operands)
    }

    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.instruction(opcode, &[])
    }

    pub fn push(&mut self, value: i32) -> &mut Self {
        self.emit(Opcode::Push, &[value])
    }

    pub fn jump(&mut self, label: Label) -> &mut Self {
        self.instruction(Opcode::J, &[label.into()])
    }

    pub fn jump_if_eq(&mut self, value: i32, label: Label) -> &mut Self {
        self.instruction(Opcode::Jeq, &[value.into(), label.into()])
    }

    pub fn jump_if_ne(&mut self, value: i32, label: Label) -> &mut Self {
        self.instruction(Opcode::Jne, &[value.into(), label.into()])
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Points `label` at the current address.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        let address = self.address();
        let error = match self.labels.get_mut(label.0) {
            Some(slot) if slot.is_some() => {
                Some(Diagnostic::assembler(format!("label {} is bound twice", label.0)))
            }
            Some(slot) => {
                *slot = Some(address);
                None
            }
            None => Some(Diagnostic::assembler(format!(
                "label {} belongs to another builder",
                label.0
            ))),
        };
        if let Some(diagnostic) = error {
            self.record(diagnostic);
        }
        self
    }

    pub fn is_bound(&self, label: Label) -> bool {
        matches!(self.labels.get(label.0), Some(Some(_)))
    }

    /// Resolves label references and returns the finished program.
    pub fn finish(self) -> Result<Vec<i32>, Diagnostic> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let mut code = self.code;
        for (at, label) in self.patches {
            let target = self.labels.get(label.0).copied().flatten().ok_or_else(|| {
                Diagnostic::assembler(format!("label {} is never bound", label.0))
            })?;
            code[at] = i32::try_from(target)
                .map_err(|_| Diagnostic::assembler("program exceeds the addressable range"))?;
        }
        Ok(code)
    }

    fn record(&mut self, diagnostic: Diagnostic) {
        if self.error.is_none() {
            self.error = Some(diagnostic);
        }
    }
}

/// Renders a program one instruction per line, as `0004: jne 17, 2`.
///
/// Words that are not opcodes print as `.word N`. An instruction cut short by
/// the end of the program prints the operands that exist.
pub fn disassemble(program: &[i32]) -> String {
    let mut lines = Vec::new();
    let mut addr = 0;
    while addr < program.len() {
        match Opcode::try_from(program[addr]) {
            Ok(opcode) => {
                let end = (addr + 1 + opcode.operand_count()).min(program.len());
                let operands = &program[addr + 1..end];
                if operands.is_empty() {
                    lines.push(format!("{addr:04}: {opcode}"));
                } else {
                    let operands: Vec<String> = operands.iter().map(i32::to_string).collect();
                    lines.push(format!("{addr:04}: {opcode} {}", operands.join(", ")));
                }
                addr = end;
            }
            Err(word) => {
                lines.push(format!("{addr:04}: .word {word}"));
                addr += 1;
            }
        }
    }
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

/// Assembles the textual form of a program.
///
/// One instruction per line: a mnemonic followed by comma-separated operands.
/// `name:` defines a label that operands may refer to by name, `;` starts a
/// comment, and a leading numeric address such as `0004:` is skipped, so the
/// [`disassemble`] output of a well-formed program assembles back.
pub fn assemble(source: &str) -> Result<Vec<i32>, Diagnostic> {
    let mut builder = ProgramBuilder::new();
    let mut labels: IndexMap<&str, Label> = IndexMap::new();
    let mut offset = 0;

    for (index, raw_line) in source.split_inclusive('\n').enumerate() {
        let span = SourceSpan::new(offset, offset + raw_line.len());
        offset += raw_line.len();
        let line_error = |message: String| {
            Diagnostic::assembler(message)
                .with_span(span)
                .with_note(format!("line {}", index + 1))
        };

        let mut line = raw_line.split(';').next().unwrap_or("").trim();
        while let Some((head, rest)) = line.split_once(':') {
            let head = head.trim();
            if head.chars().all(|ch| ch.is_ascii_digit()) && !head.is_empty() {
                // address column from `disassemble`
            } else if is_label_name(head) {
                let label = *labels.entry(head).or_insert_with(|| builder.label());
                builder.bind(label);
            } else {
                return Err(line_error(format!("invalid label `{head}`")));
            }
            line = rest.trim();
        }
        if line.is_empty() {
            continue;
        }

        let (mnemonic, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let opcode: Opcode = mnemonic
            .parse()
            .map_err(|err: UnknownMnemonic| line_error(err.to_string()))?;
        let mut operands = Vec::new();
        for text in rest.split(',').map(str::trim).filter(|text| !text.is_empty()) {
            let operand = match parse_word(text) {
                Some(word) => Operand::Word(word),
                None if is_label_name(text) => {
                    Operand::Label(*labels.entry(text).or_insert_with(|| builder.label()))
                }
                None => return Err(line_error(format!("invalid operand `{text}`"))),
            };
            operands.push(operand);
        }
        if operands.len() != opcode.operand_count() {
            return Err(line_error(format!(
                "`{opcode}` takes {} operand(s) but was given {}",
                opcode.operand_count(),
                operands.len()
            )));
        }
        builder.instruction(opcode, &operands);
    }

    if let Some(name) = labels
        .iter()
        .find_map(|(name, label)| (!builder.is_bound(*label)).then_some(name))
    {
        return Err(Diagnostic::assembler(format!("label `{name}` is never defined")));
    }
    builder.finish()
}

fn parse_word(text: &str) -> Option<i32> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (radix, digits) = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => (16, hex),
        None => (10, digits),
    };
    // at most one sign, and only the leading `-`
    if !digits.starts_with(|ch: char| ch.is_digit(radix)) {
        return None;
    }
    let magnitude = i64::try_from(u64::from_str_radix(digits, radix).ok()?).ok()?;
    let value = if negative { -magnitude } else { magnitude };
    i32::try_from(value)
        .ok()
        .or_else(|| u32::try_from(value).ok().map(|word| word as i32))
}

fn is_label_name(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(ch) if ch.is_ascii_alphabetic() || ch == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
