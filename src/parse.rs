//! Statement parsing and program assembly.
//!
//! The parser pulls tokens from the scanner and dispatches on the
//! leading token of each statement: label definitions, instructions,
//! and `EQU`/`MEM` directives. Instructions append to a parse list of
//! coerced operand fields; symbolic `SKP` targets are patched in a
//! second pass once every label is known, then the list is padded and
//! packed into the 512 byte image.

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder};
use matches::debug_assert_matches;

use crate::coerce;
use crate::constants::*;
use crate::diag::{Abort, Diagnostic, Diagnostics, Phase};
use crate::encode::{self, Opcode, Program};
use crate::scan::{Token, TokenKind, TokenStream};
use crate::symtab::SymbolTable;
use crate::value::Value;
use crate::Options;

/// One parsed instruction awaiting encoding. Operands are bit fields
/// in packing order; a symbolic skip target is resolved after parsing.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ParsedInstruction {
    pub op: Opcode,
    pub operands: Vec<i64>,
    pub addr: u32,
    pub target: Option<String>,
    pub line: u32,
}

/// State for a single assembly session over one source program.
pub(crate) struct Assembler<'a> {
    pub(crate) opts: Options,
    pub(crate) diag: Diagnostics,
    pub(crate) stream: TokenStream<'a>,
    /// Current token.
    pub(crate) sym: Token,
    /// Line of the previous token, used for operand diagnostics.
    pub(crate) prevline: u32,
    pub(crate) symtbl: SymbolTable,
    pl: Vec<ParsedInstruction>,
    jmptbl: HashMap<String, u32>,
    icnt: u32,
}

impl<'a> Assembler<'a> {
    pub(crate) fn new(source: &'a str, opts: Options) -> Assembler<'a> {
        Assembler {
            stream: TokenStream::new(source, opts.spinreals),
            opts,
            diag: Diagnostics::new(),
            sym: Token::eof(0),
            prevline: 0,
            symtbl: SymbolTable::new(),
            pl: Vec::new(),
            jmptbl: HashMap::new(),
            icnt: 0,
        }
    }

    pub(crate) fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diag.take()
    }

    /// Parse the whole input and build the instruction image. Any
    /// recorded error leaves the image unbuilt.
    pub(crate) fn run(&mut self) -> Result<Program, Abort> {
        self.advance()?;
        while self.sym.kind != TokenKind::Eof {
            match self.sym.kind {
                TokenKind::Target => self.jump_target()?,
                TokenKind::Mnemonic => self.instruction()?,
                TokenKind::Label | TokenKind::Assembler => self.directive()?,
                _ => {
                    let msg = format!("Unexpected input {}", self.sym.describe());
                    self.parse_error(msg)?;
                    self.advance()?;
                }
            }
        }
        self.patch_skip_targets()?;
        if self.diag.error_count() > 0 {
            return Err(Abort::Input);
        }
        Ok(self.emit())
    }

    pub(crate) fn advance(&mut self) -> Result<(), Abort> {
        self.prevline = self.sym.line;
        self.sym = self.stream.next_token(&self.symtbl, &mut self.diag)?;
        Ok(())
    }

    pub(crate) fn warn(&mut self, message: String) {
        self.diag.warning(self.prevline, message);
    }

    pub(crate) fn parse_error(&mut self, message: String) -> Result<(), Abort> {
        self.diag.error(Phase::Parse, self.prevline, message)
    }

    fn parse_error_at(&mut self, line: u32, message: String) -> Result<(), Abort> {
        self.diag.error(Phase::Parse, line, message)
    }

    /// Consume the operand separator, or report a missing operand and
    /// leave the unexpected token for recovery.
    fn accept_argsep(&mut self, opmsg: &str) -> Result<(), Abort> {
        if self.sym.kind == TokenKind::ArgSep {
            self.advance()
        } else {
            self.parse_error(opmsg.to_string())
        }
    }

    /// Skip to the start of the next plausible statement.
    fn resync(&mut self) -> Result<(), Abort> {
        loop {
            match self.sym.kind {
                TokenKind::Eof
                | TokenKind::Mnemonic
                | TokenKind::Assembler
                | TokenKind::Label
                | TokenKind::Target => return Ok(()),
                _ => self.advance()?,
            }
        }
    }

    /// `name:` records the current instruction address as a skip
    /// target. Redefinition is idempotent at the same address only.
    fn jump_target(&mut self) -> Result<(), Abort> {
        let name = self.sym.name.clone();
        if self.symtbl.contains(&name) {
            let msg = format!("Target {:?} already defined as a symbol", self.sym.text);
            self.parse_error(msg)?;
        } else {
            match self.jmptbl.get(&name).copied() {
                Some(addr) if addr != self.icnt => {
                    self.parse_error(format!("Label {} redefined", name))?;
                }
                _ => {
                    self.jmptbl.insert(name, self.icnt);
                }
            }
        }
        self.advance()
    }

    /// `EQU` and `MEM` directives, with the name either side of the
    /// keyword.
    fn directive(&mut self) -> Result<(), Abort> {
        let mut name = None;
        if self.sym.kind == TokenKind::Label {
            name = Some(self.sym.name.clone());
            self.advance()?;
        }
        if self.sym.kind != TokenKind::Assembler {
            let msg = format!("Expected EQU or MEM but saw {}", self.sym.describe());
            self.parse_error(msg)?;
            self.advance()?;
            return Ok(());
        }
        let keyword = self.sym.name.clone();
        self.advance()?;
        let name = match name {
            Some(n) => n,
            None => {
                if self.sym.kind != TokenKind::Label {
                    let msg = format!("Expected NAME but saw {}", self.sym.describe());
                    self.parse_error(msg)?;
                    return Ok(());
                }
                let n = self.sym.name.clone();
                self.advance()?;
                n
            }
        };
        let name = name.trim_end_matches(|c| c == '^' || c == '#').to_string();

        let mut define = true;
        if self.symtbl.is_protected(&name) {
            self.parse_error(format!("Reserved symbol {:?} cannot be redefined", name))?;
            define = false;
        } else if self.symtbl.contains(&name) {
            self.warn(format!("Symbol {:?} re-defined", name));
        }

        if keyword == "MEM" {
            let len = match self.expression()? {
                Value::Int(i) => i,
                v => {
                    let msg = format!("Memory {:?} length {} not integer", name, v);
                    self.parse_error(msg)?;
                    0
                }
            };
            let len = self.clamp_int(len, 0, DELAYSIZE, "memory size", &name)?;
            let remaining = DELAYSIZE - self.symtbl.delaymem();
            if self.symtbl.exhausted() {
                self.parse_error_at(self.prevline, "Delay exhausted.".to_string())?;
            } else if len > remaining {
                let msg = format!(
                    "Delay exhausted: requested {} exceeds {} available",
                    len, remaining
                );
                self.parse_error_at(self.prevline, msg)?;
            } else if define {
                self.symtbl.define_region(&name, len);
            }
        } else {
            let binding = self.expression_or_alias()?;
            if define {
                self.symtbl.bind(&name, binding);
            }
        }
        Ok(())
    }

    /// Parse one instruction's operand shape and append it to the
    /// parse list. Pseudo mnemonics emit their canonical expansion.
    fn instruction(&mut self) -> Result<(), Abort> {
        debug_assert_matches!(self.sym.kind, TokenKind::Mnemonic);
        let mnemonic = self.sym.name.clone();
        let opmsg = format!("Missing required operand for {}", mnemonic);
        let line = self.sym.line;
        self.advance()?;
        if self.icnt as usize >= PROGLEN {
            self.parse_error(format!("Max program exceeded by {}", mnemonic))?;
        }
        match mnemonic.as_str() {
            "AND" | "OR" | "XOR" => {
                let mask = self.fixed_arg(&coerce::S_23, &mnemonic)?;
                let op = match mnemonic.as_str() {
                    "AND" => Opcode::AND,
                    "OR" => Opcode::OR,
                    _ => Opcode::XOR,
                };
                self.push_instruction(op, vec![mask], None, line);
            }
            "SOF" | "EXP" => {
                let mult = self.fixed_arg(&coerce::S1_14, &mnemonic)?;
                self.accept_argsep(&opmsg)?;
                let offset = self.fixed_arg(&coerce::S_10, &mnemonic)?;
                let op = if mnemonic == "SOF" {
                    Opcode::SOF
                } else {
                    Opcode::EXP
                };
                self.push_instruction(op, vec![mult, offset], None, line);
            }
            "LOG" => {
                let mult = self.fixed_arg(&coerce::S1_14, &mnemonic)?;
                self.accept_argsep(&opmsg)?;
                let offset = self.fixed_arg(&coerce::S4_6, &mnemonic)?;
                self.push_instruction(Opcode::LOG, vec![mult, offset], None, line);
            }
            "RDAX" | "WRAX" | "MAXX" | "RDFX" | "WRLX" | "WRHX" => {
                let reg = self.register(&mnemonic)?;
                self.accept_argsep(&opmsg)?;
                let mult = self.fixed_arg(&coerce::S1_14, &mnemonic)?;
                let op = match mnemonic.as_str() {
                    "RDAX" => Opcode::RDAX,
                    "WRAX" => Opcode::WRAX,
                    "MAXX" => Opcode::MAXX,
                    "RDFX" => Opcode::RDFX,
                    "WRLX" => Opcode::WRLX,
                    _ => Opcode::WRHX,
                };
                self.push_instruction(op, vec![reg, mult], None, line);
            }
            "MULX" => {
                let reg = self.register(&mnemonic)?;
                self.push_instruction(Opcode::MULX, vec![reg], None, line);
            }
            "SKP" | "JMP" => {
                let condition = if mnemonic == "SKP" {
                    let c = self.skip_condition(&mnemonic)?;
                    self.accept_argsep(&opmsg)?;
                    c
                } else {
                    0
                };
                let mut target = None;
                let mut offset = 0;
                if self.sym.kind == TokenKind::Label {
                    target = Some(self.sym.name.clone());
                    self.advance()?;
                } else {
                    offset = self.skip_offset(&mnemonic)?;
                }
                self.push_instruction(Opcode::SKP, vec![condition, offset], target, line);
            }
            "RDA" | "WRA" | "WRAP" => {
                let addr = self.delay_addr(&mnemonic)?;
                self.accept_argsep(&opmsg)?;
                let mult = self.fixed_arg(&coerce::S1_9, &mnemonic)?;
                let op = match mnemonic.as_str() {
                    "RDA" => Opcode::RDA,
                    "WRA" => Opcode::WRA,
                    _ => Opcode::WRAP,
                };
                self.push_instruction(op, vec![addr, mult], None, line);
            }
            "RMPA" => {
                let mult = self.fixed_arg(&coerce::S1_9, &mnemonic)?;
                self.push_instruction(Opcode::RMPA, vec![mult], None, line);
            }
            "WLDS" => {
                let lfo = self.lfo_select(&mnemonic)? & 0x01;
                self.accept_argsep(&opmsg)?;
                let freq = self.sin_freq(&mnemonic)?;
                self.accept_argsep(&opmsg)?;
                let amp = self.delay_addr(&mnemonic)?;
                self.push_instruction(Opcode::WLDS, vec![lfo, freq, amp], None, line);
            }
            "WLDR" => {
                let lfo = self.lfo_select(&mnemonic)? | 0x02;
                self.accept_argsep(&opmsg)?;
                let freq = self.ramp_freq(&mnemonic)?;
                self.accept_argsep(&opmsg)?;
                let amp = self.ramp_amp(&mnemonic)?;
                self.push_instruction(Opcode::WLDR, vec![lfo, freq, amp], None, line);
            }
            "CHO" => self.cho_instruction(&opmsg, line)?,
            "JAM" => {
                let lfo = self.lfo_select(&mnemonic)? | 0x02;
                self.push_instruction(Opcode::JAM, vec![lfo], None, line);
            }
            "CLR" => self.push_instruction(Opcode::AND, vec![0], None, line),
            "NOT" => self.push_instruction(Opcode::XOR, vec![M24], None, line),
            "NOP" => self.push_instruction(Opcode::SKP, vec![0, 0], None, line),
            "ABSA" => self.push_instruction(Opcode::MAXX, vec![0, 0], None, line),
            "LDAX" => {
                let reg = self.register(&mnemonic)?;
                self.push_instruction(Opcode::RDFX, vec![reg, 0], None, line);
            }
            "RAW" => {
                let word = self.raw_word(&mnemonic)?;
                self.push_instruction(Opcode::RAW, vec![word], None, line);
            }
            _ => unreachable!(),
        }
        if self.sym.kind == TokenKind::ArgSep {
            self.parse_error(format!("Excess operands for {}", mnemonic))?;
            self.resync()?;
        }
        Ok(())
    }

    /// `CHO` dispatches on an unquoted subtype identifier. `RDAL`
    /// takes optional flags; the other subtypes take flags and a
    /// memory address.
    fn cho_instruction(&mut self, opmsg: &str, line: u32) -> Result<(), Abort> {
        let subtype = match self.sym.name.as_str() {
            "RDA" => Some(0x00),
            "SOF" => Some(0x02),
            "RDAL" => Some(0x03),
            _ => None,
        };
        let subtype = match subtype {
            Some(s) => s,
            None => {
                let msg = format!("Invalid CHO subtype {:?}", self.sym.text);
                self.parse_error(msg)?;
                return Ok(());
            }
        };
        self.advance()?;
        self.accept_argsep(opmsg)?;
        let lfo = self.lfo_select("CHO")?;
        let mut flags = 0b000010;
        let mut addr = 0;
        if subtype != 0x03 {
            self.accept_argsep(opmsg)?;
            flags = self.cho_flags(lfo)?;
            self.accept_argsep(opmsg)?;
            addr = self.fixed_arg(&coerce::S_15, "CHO")?;
        } else if self.sym.kind == TokenKind::ArgSep {
            self.advance()?;
            flags = self.cho_flags(lfo)?;
        }
        self.push_instruction(Opcode::CHO, vec![subtype, lfo, flags, addr], None, line);
        Ok(())
    }

    fn push_instruction(
        &mut self,
        op: Opcode,
        operands: Vec<i64>,
        target: Option<String>,
        line: u32,
    ) {
        if (self.icnt as usize) < PROGLEN {
            self.pl.push(ParsedInstruction {
                op,
                operands,
                addr: self.icnt,
                target,
                line,
            });
            self.icnt += 1;
        }
    }

    /// Resolve symbolic skip targets now every label is known. The
    /// encoded offset is the forward distance minus one; targets must
    /// follow their skip within 63 slots.
    fn patch_skip_targets(&mut self) -> Result<(), Abort> {
        for i in 0..self.pl.len() {
            let target = match &self.pl[i].target {
                Some(t) => t.clone(),
                None => continue,
            };
            let addr = self.pl[i].addr;
            let line = self.pl[i].line;
            match self.jmptbl.get(&target) {
                None => {
                    let msg = format!("Undefined target for SKP {:?}", target);
                    self.diag.error(Phase::Parse, line, msg)?;
                }
                Some(&dest) if dest <= addr => {
                    let msg = format!("Target {:?} does not follow SKP", target);
                    self.diag.error(Phase::Parse, line, msg)?;
                }
                Some(&dest) => {
                    let offset = i64::from(dest) - i64::from(addr) - 1;
                    if offset > M6 {
                        let msg = format!(
                            "Offset from SKP to {:?} ({:#x}) too large",
                            target, offset
                        );
                        self.diag.error(Phase::Parse, line, msg)?;
                    } else {
                        self.pl[i].operands[1] = offset;
                    }
                }
            }
        }
        Ok(())
    }

    /// Pad the parse list with empty skips and pack the image.
    fn emit(&mut self) -> Program {
        self.diag
            .info(format!("Read {} instructions from input", self.pl.len()));
        while self.pl.len() < PROGLEN {
            let addr = self.pl.len() as u32;
            self.pl.push(ParsedInstruction {
                op: Opcode::SKP,
                operands: vec![0, 0],
                addr,
                target: None,
                line: 0,
            });
        }
        let mut bytes = [0u8; PROGRAM_BYTES];
        for (i, instr) in self.pl.iter().enumerate() {
            let word = encode::pack(instr.op, &instr.operands);
            BigEndian::write_u32(&mut bytes[i * 4..i * 4 + 4], word);
        }
        Program::new(bytes)
    }
}
