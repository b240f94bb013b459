//! Assembler for the Spin Semiconductor FV-1 reverb DSP.
//!
//! Assembles a single program written in the FV-1 assembly dialect
//! into the chip's fixed 128 instruction, 512 byte program image.
//!
//! # Source dialect
//!
//! Input is case insensitive and whitespace insensitive; `;` starts a
//! comment that runs to the end of the line. A statement is a label
//! definition (`name:`), an instruction, or an assembler directive:
//!
//! - `name EQU value` binds a name to a value. The value may be any
//!   operand expression, or another name, which is resolved lazily on
//!   each reference.
//! - `name MEM size` allocates `size` cells of delay memory and binds
//!   three labels: `name` (start), `name#` (end) and `name^` (middle).
//!
//! Operands are expressions over integer and real literals with C
//! style operators (`| ^ & << >> + - * / // ** ~ !`), parentheses and
//! a rounding keyword `INT`. Integer literals may be decimal, `0x`/`$`
//! hexadecimal or `0b`/`%` binary, with `_` separators. Real operands
//! are converted to the fixed point format each instruction expects;
//! out of range values are errors unless clamping is enabled.
//!
//! `SKP` takes either an immediate offset or a forward label which is
//! resolved after parsing. Unused program space is padded with empty
//! `SKP` instructions.
//!
//! # Example
//!
//! ```
//! let out = asfv1::assemble("SOF 0.5, 0.0", asfv1::Options::default());
//! let program = out.program.unwrap();
//! assert_eq!(program.as_bytes().len(), 512);
//! ```

mod coerce;
mod constants;
mod diag;
mod encode;
mod expr;
mod parse;
mod scan;
mod symtab;
mod value;

#[cfg(test)]
mod test;

pub mod ihex;

pub use crate::constants::{PROGLEN, PROGRAM_BYTES};
pub use crate::diag::{Abort, Diagnostic, Phase, Severity};
pub use crate::encode::Program;

/// Assembly options.
#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
    /// Clamp out of range operands with a warning instead of
    /// rejecting them.
    pub clamp: bool,
    /// SpinASM compatibility: bare `1` and `2` read as reals, missing
    /// operands are replaced with 0.
    pub spinreals: bool,
}

/// Outcome of one assembly session: the diagnostic log in source
/// order, and the program image unless errors were recorded.
#[derive(Debug)]
pub struct Assembly {
    pub diagnostics: Vec<Diagnostic>,
    pub program: Result<Program, Abort>,
}

/// Assemble one source program.
pub fn assemble(source: &str, options: Options) -> Assembly {
    let mut asm = parse::Assembler::new(source, options);
    let program = asm.run();
    Assembly {
        diagnostics: asm.take_diagnostics(),
        program,
    }
}
