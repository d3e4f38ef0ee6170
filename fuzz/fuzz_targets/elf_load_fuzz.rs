//! ELF Load Pipeline Fuzzing Target
//!
//! Run with: cargo fuzz run elf_load_fuzz

#![no_main]

use libfuzzer_sys::fuzz_target;
use marrow_fuzz::elf::ElfLoadTarget;
use marrow_fuzz::{FuzzResult, FuzzTarget};

fuzz_target!(|data: &[u8]| {
    if let FuzzResult::Violation(msg) = ElfLoadTarget::default().fuzz(data) {
        panic!("elf_load: {msg}");
    }
});
