//! Recursive descent operand expression evaluator.
//!
//! Precedence, lowest to highest: `|`, `^`, `&`, `<<`/`>>` (right
//! associative), `+`/`-`, `*`/`//`/`/`, unary `+ - ~ ! INT`, `**`
//! (right associative). Bitwise and shift operators work on integers;
//! a real operand is truncated, silently when it is integer valued.

use crate::diag::Abort;
use crate::parse::Assembler;
use crate::scan::TokenKind;
use crate::symtab::{Binding, LookupError};
use crate::value::{self, round_half_even, ArithError, Value};

impl<'a> Assembler<'a> {
    fn at_operator(&self, name: &str) -> bool {
        self.sym.kind == TokenKind::Operator && self.sym.name == name
    }

    /// Map an arithmetic failure to a parse error, continuing with 0.
    fn checked(&mut self, result: Result<Value, ArithError>) -> Result<Value, Abort> {
        match result {
            Ok(v) => Ok(v),
            Err(e) => {
                self.parse_error(e.to_string())?;
                Ok(Value::Int(0))
            }
        }
    }

    /// Coerce a value to integer for a bitwise or shift operator.
    /// Integer valued reals pass silently, anything else is truncated
    /// toward zero with a warning.
    fn int_operand(&mut self, v: Value, op: &str) -> Result<i64, Abort> {
        match v {
            Value::Int(i) => Ok(i),
            Value::Real(r) => {
                if r.fract() != 0.0 {
                    self.warn(format!("Real operand {:?} truncated for {}", r, op));
                }
                Ok(r as i64)
            }
        }
    }

    pub(crate) fn expression(&mut self) -> Result<Value, Abort> {
        let mut acc = self.xor_expr()?;
        while self.at_operator("|") {
            self.advance()?;
            let rhs = self.xor_expr()?;
            let lhs = self.int_operand(acc, "bitwise or (|)")?;
            let rhs = self.int_operand(rhs, "bitwise or (|)")?;
            acc = Value::Int(lhs | rhs);
        }
        Ok(acc)
    }

    fn xor_expr(&mut self) -> Result<Value, Abort> {
        let mut acc = self.and_expr()?;
        while self.at_operator("^") {
            self.advance()?;
            let rhs = self.and_expr()?;
            let lhs = self.int_operand(acc, "bitwise xor (^)")?;
            let rhs = self.int_operand(rhs, "bitwise xor (^)")?;
            acc = Value::Int(lhs ^ rhs);
        }
        Ok(acc)
    }

    fn and_expr(&mut self) -> Result<Value, Abort> {
        let mut acc = self.shift_expr()?;
        while self.at_operator("&") {
            self.advance()?;
            let rhs = self.shift_expr()?;
            let lhs = self.int_operand(acc, "bitwise and (&)")?;
            let rhs = self.int_operand(rhs, "bitwise and (&)")?;
            acc = Value::Int(lhs & rhs);
        }
        Ok(acc)
    }

    fn shift_expr(&mut self) -> Result<Value, Abort> {
        let acc = self.a_expr()?;
        if self.at_operator("<<") || self.at_operator(">>") {
            let op = self.sym.name.clone();
            self.advance()?;
            let rhs = self.shift_expr()?;
            let desc = format!("shift ({})", op);
            let lhs = self.int_operand(acc, &desc)?;
            let rhs = self.int_operand(rhs, &desc)?;
            if !(0..64).contains(&rhs) {
                return self.checked(Err(ArithError::InvalidShift(rhs)));
            }
            return Ok(Value::Int(if op == "<<" { lhs << rhs } else { lhs >> rhs }));
        }
        Ok(acc)
    }

    fn a_expr(&mut self) -> Result<Value, Abort> {
        let mut acc = self.m_expr()?;
        while self.at_operator("+") || self.at_operator("-") {
            let op = self.sym.name.clone();
            self.advance()?;
            let rhs = self.m_expr()?;
            acc = if op == "+" {
                self.checked(value::add(acc, rhs))?
            } else {
                self.checked(value::sub(acc, rhs))?
            };
        }
        Ok(acc)
    }

    fn m_expr(&mut self) -> Result<Value, Abort> {
        let mut acc = self.u_expr()?;
        while self.at_operator("*") || self.at_operator("//") || self.at_operator("/") {
            let op = self.sym.name.clone();
            self.advance()?;
            let rhs = self.u_expr()?;
            acc = match op.as_str() {
                "*" => self.checked(value::mul(acc, rhs))?,
                "//" => self.checked(value::floor_div(acc, rhs))?,
                _ => self.checked(value::div(acc, rhs))?,
            };
        }
        Ok(acc)
    }

    fn u_expr(&mut self) -> Result<Value, Abort> {
        if self.sym.kind == TokenKind::Operator
            && matches!(self.sym.name.as_str(), "+" | "-" | "~" | "!" | "INT")
        {
            let op = self.sym.name.clone();
            self.advance()?;
            let v = self.u_expr()?;
            return match op.as_str() {
                "+" => Ok(v),
                "-" => self.checked(value::neg(v)),
                "INT" => Ok(Value::Int(round_half_even(v.as_real()))),
                _ => {
                    let i = self.int_operand(v, &format!("unary {}", op))?;
                    Ok(Value::Int(!i))
                }
            };
        }
        self.power()
    }

    fn power(&mut self) -> Result<Value, Abort> {
        let acc = self.atom()?;
        if self.at_operator("**") {
            self.advance()?;
            let exp = self.u_expr()?;
            return self.checked(value::pow(acc, exp));
        }
        Ok(acc)
    }

    fn atom(&mut self) -> Result<Value, Abort> {
        match self.sym.kind {
            TokenKind::Operator if self.sym.name == "(" => {
                self.advance()?;
                let v = self.expression()?;
                if self.at_operator(")") {
                    self.advance()?;
                } else {
                    let msg = format!("Expected ')' but saw {}", self.sym.describe());
                    self.parse_error(msg)?;
                }
                Ok(v)
            }
            TokenKind::Label => {
                if self.symtbl.contains(&self.sym.name) {
                    let name = self.sym.name.clone();
                    let v = self.deref_symbol(&name)?;
                    self.advance()?;
                    Ok(v)
                } else {
                    let msg = format!("Undefined symbol {:?}", self.sym.text);
                    self.parse_error(msg)?;
                    self.advance()?;
                    Ok(Value::Int(0))
                }
            }
            TokenKind::Integer | TokenKind::Float => {
                let v = self.sym.value.unwrap_or(Value::Int(0));
                self.advance()?;
                Ok(v)
            }
            _ => {
                // not consumed: the caller's operand handling resumes here
                if self.opts.spinreals {
                    self.warn("Missing argument replaced with 0".to_string());
                } else {
                    let msg = format!("Expected name or value but saw {}", self.sym.describe());
                    self.parse_error(msg)?;
                }
                Ok(Value::Int(0))
            }
        }
    }

    /// Resolve a symbol reference through the table's alias chains.
    pub(crate) fn deref_symbol(&mut self, name: &str) -> Result<Value, Abort> {
        match self.symtbl.deref(name) {
            Ok(v) => Ok(v),
            Err(LookupError::Circular { symbol }) => {
                self.parse_error(format!("Circular definition of symbol {:?}", symbol))?;
                Ok(Value::Int(0))
            }
            Err(LookupError::Undefined { name, symbol }) => {
                self.parse_error(format!(
                    "Value {:?} undefined for symbol {:?}",
                    name, symbol
                ))?;
                Ok(Value::Int(0))
            }
        }
    }

    /// Fetch the value of an `EQU` directive: a lone identifier binds
    /// lazily as an alias, anything else evaluates eagerly.
    pub(crate) fn expression_or_alias(&mut self) -> Result<Binding, Abort> {
        if self.sym.kind == TokenKind::Label && !self.peek_expression_continues()? {
            let name = self.sym.name.clone();
            self.advance()?;
            return Ok(Binding::Alias(name));
        }
        Ok(Binding::Value(self.expression()?))
    }

    /// Look one token ahead for a binary operator that would extend an
    /// expression past a leading identifier.
    fn peek_expression_continues(&mut self) -> Result<bool, Abort> {
        let token = self.stream.next_token(&self.symtbl, &mut self.diag)?;
        let continues = token.kind == TokenKind::Operator
            && matches!(
                token.name.as_str(),
                "|" | "^" | "&" | "<<" | ">>" | "+" | "-" | "*" | "/" | "//" | "**"
            );
        self.stream.push_back(token);
        Ok(continues)
    }
}
