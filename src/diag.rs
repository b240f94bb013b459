//! Diagnostic collection and terminal status reporting.

use std::fmt;

/// Errors tolerated before assembly is abandoned.
const MAX_ERRORS: usize = 10;

/// Stage that raised an error, reflected in the message prefix and the
/// terminal status when the error limit is reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Scan,
    Parse,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error(Phase),
}

/// One reported condition, in source order.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub line: Option<u32>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let tag = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error(Phase::Scan) => "scan error",
            Severity::Error(Phase::Parse) => "parse error",
        };
        write!(f, "{}: {}", tag, self.message)?;
        if let Some(line) = self.line {
            write!(f, " on line {}", line)?;
        }
        Ok(())
    }
}

/// Terminal failure. Raised mid-run when the error limit is exceeded,
/// or at the end of a run that recorded any error at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Abort {
    Scan,
    Parse,
    Input,
    Internal,
}

impl Abort {
    /// Process status identifying the failed stage.
    pub fn status(self) -> i32 {
        match self {
            Abort::Scan => -1,
            Abort::Parse => -2,
            Abort::Input => -3,
            Abort::Internal => -4,
        }
    }
}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Abort::Scan => write!(f, "too many scan errors"),
            Abort::Parse => write!(f, "too many parse errors"),
            Abort::Input => write!(f, "errors in input"),
            Abort::Internal => write!(f, "internal error"),
        }
    }
}

/// Ordered diagnostic sink shared by the scanner and parser.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    errors: usize,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn info(&mut self, message: String) {
        self.items.push(Diagnostic {
            severity: Severity::Info,
            line: None,
            message,
        });
    }

    pub fn warning(&mut self, line: u32, message: String) {
        self.items.push(Diagnostic {
            severity: Severity::Warning,
            line: Some(line),
            message,
        });
    }

    /// Record an error. Aborts the run once the error limit is passed.
    pub fn error(&mut self, phase: Phase, line: u32, message: String) -> Result<(), Abort> {
        self.items.push(Diagnostic {
            severity: Severity::Error(phase),
            line: Some(line),
            message,
        });
        self.errors += 1;
        if self.errors > MAX_ERRORS {
            Err(match phase {
                Phase::Scan => Abort::Scan,
                Phase::Parse => Abort::Parse,
            })
        } else {
            Ok(())
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.items)
    }
}
