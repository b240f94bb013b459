//! Target machine parameters and field masks.

/// Instruction slots in the program store.
pub const PROGLEN: usize = 128;

/// Size of the assembled image in bytes, one 32 bit word per slot.
pub const PROGRAM_BYTES: usize = PROGLEN * 4;

/// Delay memory cells available to `MEM` declarations.
pub const DELAYSIZE: i64 = 32767;

// Bit masks by operand field width.
pub const M1: i64 = 0x01;
pub const M2: i64 = 0x03;
pub const M5: i64 = 0x1f;
pub const M6: i64 = 0x3f;
pub const M9: i64 = 0x1ff;
pub const M11: i64 = 0x7ff;
pub const M15: i64 = 0x7fff;
pub const M16: i64 = 0xffff;
pub const M24: i64 = 0xff_ffff;
pub const M32: i64 = 0xffff_ffff;
