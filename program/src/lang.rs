//! Languages and registers.
//!
//! A [`Language`] names the instruction set a program is analyzed with. The
//! loader's context-level extension check keys on the processor name and the
//! language size, so both are first-class here.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use crate::address::Endian;

/// A processor register.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Register {
    name: String,
    offset: u32,
    bit_length: u32,
}

impl Register {
    /// Create a register at `offset` in the register file.
    pub fn new(name: &str, offset: u32, bit_length: u32) -> Self {
        Self {
            name: name.to_string(),
            offset,
            bit_length,
        }
    }

    /// Register name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte offset in the register file.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Width in bits.
    pub fn bit_length(&self) -> u32 {
        self.bit_length
    }

    /// Largest value the register can hold.
    pub fn max_value(&self) -> u64 {
        if self.bit_length >= 64 {
            u64::MAX
        } else {
            (1u64 << self.bit_length) - 1
        }
    }
}

/// Processor family name, e.g. `x86`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Processor(String);

impl Processor {
    /// Create a processor name.
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Get as string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An instruction set description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Language {
    id: String,
    processor: Processor,
    size: u32,
    endian: Endian,
    registers: Vec<Register>,
}

impl Language {
    /// Create a language.
    pub fn new(id: &str, processor: &str, size: u32, endian: Endian, registers: Vec<Register>) -> Self {
        Self {
            id: id.to_string(),
            processor: Processor::new(processor),
            size,
            endian,
            registers,
        }
    }

    /// 32-bit protected-mode x86.
    pub fn x86_32() -> Self {
        Self::new("x86:LE:32:default", "x86", 32, Endian::Little, gp_registers(&X86_32_REGS, 32))
    }

    /// x86-64.
    pub fn x86_64() -> Self {
        let mut regs = gp_registers(&X86_64_REGS, 64);
        // 32-bit views share the low half of the 64-bit registers
        regs.extend(X86_32_REGS.iter().enumerate().map(|(i, n)| Register::new(n, i as u32 * 8, 32)));
        Self::new("x86:LE:64:default", "x86", 64, Endian::Little, regs)
    }

    /// 16-bit real-mode x86.
    pub fn x86_16_real() -> Self {
        Self::new("x86:LE:16:Real Mode", "x86", 16, Endian::Little, gp_registers(&X86_16_REGS, 16))
    }

    /// Find a built-in language by id.
    pub fn by_id(id: &str) -> Option<Self> {
        [Self::x86_32(), Self::x86_64(), Self::x86_16_real()]
            .into_iter()
            .find(|l| l.id == id)
    }

    /// Language id, e.g. `x86:LE:32:default`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Processor family.
    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    /// Address/word size in bits.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Byte order.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// All registers.
    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    /// Look up a register by name.
    pub fn register(&self, name: &str) -> Option<&Register> {
        self.registers.iter().find(|r| r.name == name)
    }
}

const X86_16_REGS: [&str; 8] = ["AX", "CX", "DX", "BX", "SP", "BP", "SI", "DI"];
const X86_32_REGS: [&str; 8] = ["EAX", "ECX", "EDX", "EBX", "ESP", "EBP", "ESI", "EDI"];
const X86_64_REGS: [&str; 8] = ["RAX", "RCX", "RDX", "RBX", "RSP", "RBP", "RSI", "RDI"];

fn gp_registers(names: &[&str], bits: u32) -> Vec<Register> {
    let stride = bits / 8;
    names
        .iter()
        .enumerate()
        .map(|(i, n)| Register::new(n, i as u32 * stride, bits))
        .collect()
}
