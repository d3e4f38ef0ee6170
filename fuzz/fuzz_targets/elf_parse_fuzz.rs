//! ELF Reader Fuzzing Target
//!
//! Run with: cargo fuzz run elf_parse_fuzz

#![no_main]

use libfuzzer_sys::fuzz_target;
use marrow_fuzz::elf::ElfParseTarget;
use marrow_fuzz::{FuzzResult, FuzzTarget};

fuzz_target!(|data: &[u8]| {
    if let FuzzResult::Violation(msg) = ElfParseTarget.fuzz(data) {
        panic!("elf_parse: {msg}");
    }
});
