//! Operand coercion into machine bit fields.
//!
//! Each coercer evaluates one operand expression and converts it to an
//! integer field ready for packing. Integer inputs are checked against
//! the raw field range; real inputs are checked against the format's
//! real range and scaled by its reference value. Out of range values
//! are either clamped with a warning or rejected, by option.

use crate::constants::*;
use crate::diag::Abort;
use crate::parse::Assembler;
use crate::value::{round_half_even, Value};

/// One signed fixed point operand format: 1 sign bit, some integer
/// bits, and the fractional bits counted by `reference`.
pub struct Format {
    pub name: &'static str,
    pub reference: f64,
    pub min: f64,
    pub max: f64,
    pub mask: i64,
}

pub const S1_14: Format = Format {
    name: "S1.14",
    reference: 16384.0,
    min: -2.0,
    max: 32767.0 / 16384.0,
    mask: M16,
};

pub const S1_9: Format = Format {
    name: "S1.9",
    reference: 512.0,
    min: -2.0,
    max: 1023.0 / 512.0,
    mask: M11,
};

pub const S_10: Format = Format {
    name: "S.10",
    reference: 1024.0,
    min: -1.0,
    max: 1023.0 / 1024.0,
    mask: M11,
};

pub const S_15: Format = Format {
    name: "S.15",
    reference: 32768.0,
    min: -1.0,
    max: 32767.0 / 32768.0,
    mask: M16,
};

pub const S4_6: Format = Format {
    name: "S4.6",
    reference: 64.0,
    min: -16.0,
    max: 1023.0 / 64.0,
    mask: M11,
};

pub const S_23: Format = Format {
    name: "S.23",
    reference: 8388608.0,
    min: -1.0,
    max: 8388607.0 / 8388608.0,
    mask: M24,
};

/// Integers print in hex like the datasheet tables; negatives read
/// better in decimal.
fn fmt_int(v: i64) -> String {
    if v < 0 {
        format!("{}", v)
    } else {
        format!("{:#x}", v)
    }
}

impl<'a> Assembler<'a> {
    /// Clamp or reject an integer operand outside `lo..=hi`.
    pub(crate) fn clamp_int(
        &mut self,
        v: i64,
        lo: i64,
        hi: i64,
        desc: &str,
        mnemonic: &str,
    ) -> Result<i64, Abort> {
        if v >= lo && v <= hi {
            return Ok(v);
        }
        if self.opts.clamp {
            let clipped = if v < lo { lo } else { hi };
            self.warn(format!(
                "{} clamped for {}: {}",
                desc,
                mnemonic,
                fmt_int(clipped)
            ));
            Ok(clipped)
        } else {
            self.parse_error(format!(
                "Invalid {} for {}: {}",
                desc,
                mnemonic,
                fmt_int(v)
            ))?;
            Ok(0)
        }
    }

    /// Clamp or reject a real operand outside `lo..=hi`.
    fn clamp_real(
        &mut self,
        v: f64,
        lo: f64,
        hi: f64,
        desc: &str,
        mnemonic: &str,
    ) -> Result<f64, Abort> {
        if v >= lo && v <= hi {
            return Ok(v);
        }
        if self.opts.clamp {
            let clipped = if v < lo { lo } else { hi };
            self.warn(format!("{} clamped for {}: {:?}", desc, mnemonic, clipped));
            Ok(clipped)
        } else {
            self.parse_error(format!("Invalid {} for {}: {:?}", desc, mnemonic, v))?;
            Ok(0.0)
        }
    }

    /// Fetch an operand against a fixed point format.
    pub(crate) fn fixed_arg(&mut self, format: &Format, mnemonic: &str) -> Result<i64, Abort> {
        let desc = format!("{} arg", format.name);
        match self.expression()? {
            Value::Int(i) => self.clamp_int(i, 0, format.mask, &desc, mnemonic),
            Value::Real(r) => {
                let r = self.clamp_real(r, format.min, format.max, &desc, mnemonic)?;
                Ok(round_half_even(r * format.reference))
            }
        }
    }

    /// Fetch a register operand, 0..=63 exactly.
    pub(crate) fn register(&mut self, mnemonic: &str) -> Result<i64, Abort> {
        match self.expression()? {
            Value::Int(i) if (0..=M6).contains(&i) => Ok(i),
            v => {
                self.parse_error(format!(
                    "Invalid register definition for {}: {}",
                    mnemonic, v
                ))?;
                Ok(0)
            }
        }
    }

    /// Fetch an immediate skip offset, 0..=63.
    pub(crate) fn skip_offset(&mut self, mnemonic: &str) -> Result<i64, Abort> {
        let mut v = self.expression()?;
        if self.opts.spinreals {
            if let Value::Real(r) = v {
                v = Value::Int(r as i64);
                self.warn(format!(
                    "Converted skip offset to integer for {}: {}",
                    mnemonic, v
                ));
            }
        }
        match v {
            Value::Int(i) if (0..=M6).contains(&i) => Ok(i),
            v => {
                self.parse_error(format!("Invalid skip offset for {}: {}", mnemonic, v))?;
                Ok(0)
            }
        }
    }

    /// Fetch a skip condition code, 0..=31.
    pub(crate) fn skip_condition(&mut self, mnemonic: &str) -> Result<i64, Abort> {
        match self.expression()? {
            Value::Int(i) if (0..=M5).contains(&i) => Ok(i),
            v => {
                self.parse_error(format!(
                    "Invalid skip condition code for {}: {}",
                    mnemonic, v
                ))?;
                Ok(0)
            }
        }
    }

    /// Fetch an LFO selector, 0..=3.
    pub(crate) fn lfo_select(&mut self, mnemonic: &str) -> Result<i64, Abort> {
        match self.expression()? {
            Value::Int(i) if (0..=3).contains(&i) => Ok(i),
            v => {
                self.parse_error(format!("Invalid LFO definition for {}: {}", mnemonic, v))?;
                Ok(0)
            }
        }
    }

    /// Fetch CHO condition flags and mask them against the selected
    /// LFO: ramp LFOs have no wave selector bit, sine LFOs no ramp
    /// specific bits.
    pub(crate) fn cho_flags(&mut self, lfo: i64) -> Result<i64, Abort> {
        let flags = match self.expression()? {
            Value::Int(i) if (0..=M6).contains(&i) => i,
            v => {
                self.parse_error(format!("Invalid condition flags for CHO: {}", v))?;
                0
            }
        };
        let masked = if lfo & 0x02 != 0 {
            flags & 0x3e
        } else {
            flags & 0x0f
        };
        if masked != flags {
            let kind = if lfo & 0x02 != 0 { "Ramp" } else { "Sine" };
            self.warn(format!(
                "Cleared invalid {} LFO flags for CHO: {:#x}",
                kind, masked
            ));
        }
        Ok(masked)
    }

    /// Fetch a 15 bit delay memory address. Integers are taken modulo
    /// the delay size; reals address the memory as a S.15 fraction.
    pub(crate) fn delay_addr(&mut self, mnemonic: &str) -> Result<i64, Abort> {
        match self.expression()? {
            Value::Int(i) => {
                let i = self.clamp_int(i, -0x8000, 0x7fff, "delay address", mnemonic)?;
                Ok(i & M15)
            }
            Value::Real(r) => {
                let r = self.clamp_real(r, S_15.min, S_15.max, "delay address", mnemonic)?;
                Ok(round_half_even(r * S_15.reference) & M15)
            }
        }
    }

    /// Fetch a sine LFO frequency, 0..=511.
    pub(crate) fn sin_freq(&mut self, mnemonic: &str) -> Result<i64, Abort> {
        match self.expression()? {
            Value::Int(i) => self.clamp_int(i, 0, M9, "SIN LFO frequency", mnemonic),
            v => {
                self.parse_error(format!(
                    "Invalid SIN LFO frequency for {}: {}",
                    mnemonic, v
                ))?;
                Ok(0)
            }
        }
    }

    /// Fetch a ramp LFO coefficient, a signed 16 bit integer or a real
    /// scaled as S.15.
    pub(crate) fn ramp_freq(&mut self, mnemonic: &str) -> Result<i64, Abort> {
        match self.expression()? {
            Value::Int(i) => self.clamp_int(i, -0x8000, 0x7fff, "RMP LFO coefficient", mnemonic),
            Value::Real(r) => {
                let r = self.clamp_real(r, S_15.min, S_15.max, "RMP LFO coefficient", mnemonic)?;
                Ok(round_half_even(r * S_15.reference))
            }
        }
    }

    /// Fetch a ramp LFO amplitude. Only the four hardware sizes are
    /// accepted, by cell count or by code.
    pub(crate) fn ramp_amp(&mut self, mnemonic: &str) -> Result<i64, Abort> {
        let v = self.expression()?;
        if let Value::Int(i) = v {
            let code = match i {
                4096 => Some(0),
                2048 => Some(1),
                1024 => Some(2),
                512 => Some(3),
                0..=3 => Some(i),
                _ => None,
            };
            if let Some(code) = code {
                return Ok(code);
            }
        }
        self.parse_error(format!("Invalid RMP LFO amplitude for {}: {}", mnemonic, v))?;
        Ok(0)
    }

    /// Fetch a raw 32 bit word for direct insertion.
    pub(crate) fn raw_word(&mut self, mnemonic: &str) -> Result<i64, Abort> {
        match self.expression()? {
            Value::Int(i) => self.clamp_int(i, 0, M32, "U.32 arg", mnemonic),
            v => {
                self.parse_error(format!("Invalid U.32 arg for {}: {}", mnemonic, v))?;
                Ok(0)
            }
        }
    }
}
