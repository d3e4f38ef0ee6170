//! Endian- and class-aware bounds-checked reads.

use crate::error::ElfError;
use crate::header::{ElfClass, Endianness};

#[derive(Debug, Clone, Copy)]
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    endian: Endianness,
    class: ElfClass,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8], endian: Endianness, class: ElfClass) -> Self {
        Self { data, endian, class }
    }

    pub(crate) fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub(crate) fn class(&self) -> ElfClass {
        self.class
    }

    /// `len` bytes at `offset`.
    pub(crate) fn bytes(&self, offset: u64, len: u64) -> Result<&'a [u8], ElfError> {
        let truncated = ElfError::Truncated { offset, len };
        let start = usize::try_from(offset).map_err(|_| truncated)?;
        let count = usize::try_from(len).map_err(|_| truncated)?;
        let end = start.checked_add(count).ok_or(truncated)?;
        self.data.get(start..end).ok_or(truncated)
    }

    fn array<const N: usize>(&self, offset: u64) -> Result<[u8; N], ElfError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(offset, N as u64)?);
        Ok(out)
    }

    pub(crate) fn u16(&self, offset: u64) -> Result<u16, ElfError> {
        let b = self.array::<2>(offset)?;
        Ok(match self.endian {
            Endianness::Little => u16::from_le_bytes(b),
            Endianness::Big => u16::from_be_bytes(b),
        })
    }

    pub(crate) fn u32(&self, offset: u64) -> Result<u32, ElfError> {
        let b = self.array::<4>(offset)?;
        Ok(match self.endian {
            Endianness::Little => u32::from_le_bytes(b),
            Endianness::Big => u32::from_be_bytes(b),
        })
    }

    pub(crate) fn u64(&self, offset: u64) -> Result<u64, ElfError> {
        let b = self.array::<8>(offset)?;
        Ok(match self.endian {
            Endianness::Little => u64::from_le_bytes(b),
            Endianness::Big => u64::from_be_bytes(b),
        })
    }

    /// Address-sized unsigned word: 4 bytes for ELF32, 8 for ELF64.
    pub(crate) fn word(&self, offset: u64) -> Result<u64, ElfError> {
        match self.class {
            ElfClass::Elf32 => self.u32(offset).map(u64::from),
            ElfClass::Elf64 => self.u64(offset),
        }
    }

    /// Address-sized signed word, sign-extended.
    pub(crate) fn sword(&self, offset: u64) -> Result<i64, ElfError> {
        match self.class {
            ElfClass::Elf32 => self.u32(offset).map(|v| i64::from(v as i32)),
            ElfClass::Elf64 => self.u64(offset).map(|v| v as i64),
        }
    }

    /// NUL-terminated string starting at `offset` within `table`.
    pub(crate) fn c_str(table: &[u8], offset: u64) -> Option<&[u8]> {
        let start = usize::try_from(offset).ok()?;
        let rest = table.get(start..)?;
        let len = rest.iter().position(|&b| b == 0)?;
        Some(&rest[..len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endianness() {
        let data = [0x12, 0x34, 0x56, 0x78];
        let le = Reader::new(&data, Endianness::Little, ElfClass::Elf32);
        let be = Reader::new(&data, Endianness::Big, ElfClass::Elf32);
        assert_eq!(le.u32(0).unwrap(), 0x7856_3412);
        assert_eq!(be.u32(0).unwrap(), 0x1234_5678);
        assert_eq!(be.u16(2).unwrap(), 0x5678);
    }

    #[test]
    fn test_out_of_bounds_is_truncated() {
        let data = [0u8; 6];
        let r = Reader::new(&data, Endianness::Little, ElfClass::Elf64);
        assert_eq!(r.u64(0), Err(ElfError::Truncated { offset: 0, len: 8 }));
        assert!(r.bytes(u64::MAX, 2).is_err());
        assert!(r.u32(2).is_ok());
    }

    #[test]
    fn test_sword_sign_extends() {
        let data = (-2i32).to_le_bytes();
        let r = Reader::new(&data, Endianness::Little, ElfClass::Elf32);
        assert_eq!(r.sword(0).unwrap(), -2);
    }

    #[test]
    fn test_c_str() {
        let table = b"\0.plt\0.text\0";
        assert_eq!(Reader::c_str(table, 1), Some(&b".plt"[..]));
        assert_eq!(Reader::c_str(table, 0), Some(&b""[..]));
        assert_eq!(Reader::c_str(table, 40), None);
    }
}
