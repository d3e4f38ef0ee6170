//! Marrow Fuzzing Infrastructure
//!
//! Targets that feed untrusted bytes to the ELF reader and the loader
//! pipeline, a mutator with an ELF-aware dictionary and a small in-process
//! harness for running them without libFuzzer.

#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod elf;

use alloc::string::String;
use alloc::vec::Vec;

use marrow_elf::header::{ELFCLASS32, ELFCLASS64, ELF_MAGIC, PRELINK_TAG};

/// Fuzzing target trait
pub trait FuzzTarget {
    /// Name of the fuzz target
    fn name(&self) -> &str;

    /// Run fuzzing iteration with input
    fn fuzz(&mut self, input: &[u8]) -> FuzzResult;
}

/// Result of a fuzz iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuzzResult {
    /// Input processed successfully
    Ok,
    /// Rejected with an error (expected for malformed input)
    ParseError(String),
    /// Input reached a deeper stage worth keeping in the corpus
    Interesting(String),
    /// Input was accepted but produced state that breaks an invariant
    Violation(String),
}

impl FuzzResult {
    /// Check if this is a violation
    pub fn is_violation(&self) -> bool {
        matches!(self, FuzzResult::Violation(_))
    }
}

/// Fuzzing statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuzzStats {
    /// Total iterations
    pub iterations: u64,
    /// Inputs rejected with an error
    pub parse_errors: u64,
    /// Inputs that reached a deeper stage
    pub interesting: u64,
    /// Invariant violations, with the target and message
    pub violations: Vec<(String, String)>,
}

/// Dictionary entries that steer mutation towards ELF structure.
pub fn elf_dictionary() -> Vec<Vec<u8>> {
    alloc::vec![
        ELF_MAGIC.to_vec(),
        alloc::vec![ELFCLASS32, 1, 1],
        alloc::vec![ELFCLASS64, 1, 1],
        PRELINK_TAG.to_vec(),
        b".plt\0".to_vec(),
        b".plt.sec\0".to_vec(),
        3u32.to_le_bytes().to_vec(),
        0xffff_ffffu32.to_le_bytes().to_vec(),
    ]
}

/// Mutator for input generation
pub struct Mutator {
    /// Current seed
    seed: u64,
    /// Dictionary of interesting values
    dictionary: Vec<Vec<u8>>,
}

impl Mutator {
    /// Create a new mutator
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            dictionary: Vec::new(),
        }
    }

    /// Mutator preloaded with [`elf_dictionary`]
    pub fn for_elf(seed: u64) -> Self {
        let mut mutator = Self::new(seed);
        for entry in elf_dictionary() {
            mutator.add_dictionary(entry);
        }
        mutator
    }

    /// Add dictionary entry
    pub fn add_dictionary(&mut self, entry: Vec<u8>) {
        self.dictionary.push(entry);
    }

    fn random(&mut self) -> u64 {
        self.seed = self.seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.seed >> 33
    }

    fn position(&mut self, len: usize) -> usize {
        (self.random() as usize) % len
    }

    /// Mutate input
    pub fn mutate(&mut self, input: &mut Vec<u8>) {
        if input.is_empty() {
            input.push(0);
        }
        match self.random() % 6 {
            0 => {
                let pos = self.position(input.len());
                input[pos] ^= 1 << (self.random() % 8);
            }
            1 => {
                let pos = self.position(input.len());
                input[pos] = (self.random() & 0xff) as u8;
            }
            2 => {
                // interesting widths for offsets and counts
                const INTERESTING: &[u8] = &[0, 1, 0x7f, 0x80, 0xff];
                let pos = self.position(input.len());
                input[pos] = INTERESTING[self.position(INTERESTING.len())];
            }
            3 => {
                let cut = self.position(input.len());
                input.truncate(cut.max(1));
            }
            4 => self.dictionary_overwrite(input),
            _ => {
                for _ in 0..(self.random() % 8) + 1 {
                    let pos = self.position(input.len());
                    input[pos] = (self.random() & 0xff) as u8;
                }
            }
        }
    }

    fn dictionary_overwrite(&mut self, input: &mut Vec<u8>) {
        if self.dictionary.is_empty() {
            return;
        }
        let idx = self.position(self.dictionary.len());
        let pos = self.position(input.len());
        let entry = self.dictionary[idx].clone();
        for (i, byte) in entry.into_iter().enumerate() {
            match input.get_mut(pos + i) {
                Some(slot) => *slot = byte,
                None => input.push(byte),
            }
        }
    }
}

/// Run `iterations` mutated inputs derived from `seeds` through `targets`.
pub fn run(targets: &mut [&mut dyn FuzzTarget], seeds: &[Vec<u8>], iterations: u64, seed: u64) -> FuzzStats {
    let mut stats = FuzzStats::default();
    let mut mutator = Mutator::for_elf(seed);
    for i in 0..iterations {
        let mut input = match seeds.len() {
            0 => Vec::new(),
            n => seeds[(i as usize) % n].clone(),
        };
        mutator.mutate(&mut input);
        stats.iterations += 1;

        for target in targets.iter_mut() {
            match target.fuzz(&input) {
                FuzzResult::Ok => {}
                FuzzResult::ParseError(_) => stats.parse_errors += 1,
                FuzzResult::Interesting(_) => stats.interesting += 1,
                FuzzResult::Violation(msg) => stats.violations.push((String::from(target.name()), msg)),
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_is_deterministic_and_non_empty() {
        let mut a = Mutator::for_elf(7);
        let mut b = Mutator::for_elf(7);
        let mut x = Vec::new();
        let mut y = Vec::new();
        for _ in 0..100 {
            a.mutate(&mut x);
            b.mutate(&mut y);
            assert!(!x.is_empty());
        }
        assert_eq!(x, y);
    }

    #[test]
    fn dictionary_entries_land_in_input() {
        let mut mutator = Mutator::new(1);
        mutator.add_dictionary(b"PRE ".to_vec());
        let mut input = alloc::vec![0u8; 4];
        for _ in 0..64 {
            mutator.dictionary_overwrite(&mut input);
        }
        assert!(input.windows(4).any(|w| w == b"PRE "));
    }
}
