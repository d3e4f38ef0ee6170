//! Register context.
//!
//! The context records, per register, constant values known to hold across
//! address ranges. Loaders paint values (for example the GOT base held in
//! EBX across PLT stubs) and analysis reads them back per address.
//!
//! Painting is last-writer-wins except over committed ranges, which mark
//! instructions already laid down under the current values. Repainting the
//! value already present is always a no-op.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use hashbrown::HashMap;

use crate::address::{Address, AddressRange, SpaceId};
use crate::error::ContextError;
use crate::lang::{Language, Register};

/// A value checked against the width of its register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterValue {
    register: Register,
    value: u64,
}

impl RegisterValue {
    /// Fails with `ValueTooWide` if `value` has bits above the register width.
    pub fn new(register: &Register, value: u64) -> Result<Self, ContextError> {
        if value > register.max_value() {
            return Err(ContextError::ValueTooWide {
                register: register.name().to_string(),
                value,
            });
        }
        Ok(Self {
            register: register.clone(),
            value,
        })
    }

    /// Register being assigned.
    pub fn register(&self) -> &Register {
        &self.register
    }

    /// Assigned value.
    pub fn value(&self) -> u64 {
        self.value
    }
}

/// Non-overlapping inclusive ranges carrying a value, keyed by start.
#[derive(Debug, Clone, Default)]
struct RangeMap<V> {
    entries: BTreeMap<(SpaceId, u64), (u64, V)>,
}

impl<V: Copy + PartialEq> RangeMap<V> {
    fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    fn get(&self, addr: Address) -> Option<V> {
        let (&(space, _), &(end, value)) = self
            .entries
            .range(..=(addr.space(), addr.offset()))
            .next_back()?;
        (space == addr.space() && addr.offset() <= end).then_some(value)
    }

    /// Entries intersecting `[start, end]`, as `(start, end, value)`, ascending.
    fn overlapping(&self, space: SpaceId, start: u64, end: u64) -> Vec<(u64, u64, V)> {
        let mut found: Vec<_> = self
            .entries
            .range((space, 0)..=(space, end))
            .rev()
            .take_while(|(_, (e, _))| *e >= start)
            .map(|(&(_, s), &(e, v))| (s, e, v))
            .collect();
        found.reverse();
        found
    }

    fn clear(&mut self, space: SpaceId, start: u64, end: u64) {
        for (s, e, v) in self.overlapping(space, start, end) {
            self.entries.remove(&(space, s));
            if s < start {
                self.entries.insert((space, s), (start - 1, v));
            }
            if e > end {
                self.entries.insert((space, end + 1), (e, v));
            }
        }
    }

    fn paint(&mut self, space: SpaceId, start: u64, end: u64, value: V) {
        self.clear(space, start, end);
        let mut start = start;
        let mut end = end;

        if let Some(before) = start.checked_sub(1) {
            if let Some((s, _, v)) = self.overlapping(space, before, before).first().copied() {
                if v == value {
                    self.entries.remove(&(space, s));
                    start = s;
                }
            }
        }
        if let Some(after) = end.checked_add(1) {
            if let Some(&(e, v)) = self.entries.get(&(space, after)) {
                if v == value {
                    self.entries.remove(&(space, after));
                    end = e;
                }
            }
        }
        self.entries.insert((space, start), (end, value));
    }

    fn iter(&self) -> impl Iterator<Item = (SpaceId, u64, u64, V)> + '_ {
        self.entries.iter().map(|(&(sp, s), &(e, v))| (sp, s, e, v))
    }
}

fn range_of(space: SpaceId, start: u64, end: u64) -> Result<AddressRange, ContextError> {
    AddressRange::new(Address::new(space, start), Address::new(space, end))
        .map_err(|_| ContextError::InvalidRange)
}

/// Per-register constant values over address ranges.
#[derive(Debug, Clone)]
pub struct ProgramContext {
    registers: Vec<Register>,
    values: HashMap<String, RangeMap<u64>>,
    committed: RangeMap<()>,
}

impl ProgramContext {
    /// Empty context for the registers of `language`.
    pub fn new(language: &Language) -> Self {
        Self {
            registers: language.registers().to_vec(),
            values: HashMap::new(),
            committed: RangeMap::new(),
        }
    }

    /// Look up a register by name.
    pub fn register(&self, name: &str) -> Option<&Register> {
        self.registers.iter().find(|r| r.name() == name)
    }

    fn known(&self, name: &str) -> Result<(), ContextError> {
        self.register(name)
            .map(|_| ())
            .ok_or_else(|| ContextError::UnknownRegister(name.to_string()))
    }

    /// Assign `value` to its register over `[start, end]`.
    ///
    /// Fails with `Conflict` without changing anything if a committed address
    /// in the range already holds a different value.
    pub fn set_register_value(
        &mut self,
        start: Address,
        end: Address,
        value: &RegisterValue,
    ) -> Result<(), ContextError> {
        let range = AddressRange::new(start, end).map_err(|_| ContextError::InvalidRange)?;
        let name = value.register().name();
        self.known(name)?;

        let space = range.space();
        let (s, e) = (range.start().offset(), range.end().offset());
        if let Some(current) = self.values.get(name) {
            for (cs, ce, ()) in self.committed.overlapping(space, s, e) {
                let (cs, ce) = (cs.max(s), ce.min(e));
                if let Some((vs, ve, _)) = current
                    .overlapping(space, cs, ce)
                    .into_iter()
                    .find(|(_, _, v)| *v != value.value())
                {
                    return Err(ContextError::Conflict {
                        register: name.to_string(),
                        range: range_of(space, vs.max(cs), ve.min(ce))?,
                    });
                }
            }
        }

        self.values
            .entry(name.to_string())
            .or_insert_with(RangeMap::new)
            .paint(space, s, e, value.value());
        log::trace!("[marrow/context] {} = {:#x} over {}", name, value.value(), range);
        Ok(())
    }

    /// Mark `[start, end]` as holding laid-down instructions.
    pub fn commit(&mut self, start: Address, end: Address) -> Result<(), ContextError> {
        let range = AddressRange::new(start, end).map_err(|_| ContextError::InvalidRange)?;
        self.committed
            .paint(range.space(), range.start().offset(), range.end().offset(), ());
        Ok(())
    }

    /// Whether `addr` lies in a committed range.
    pub fn is_committed(&self, addr: Address) -> bool {
        self.committed.get(addr).is_some()
    }

    /// Value of `register` at `addr`, if one was painted there.
    pub fn get_value(&self, register: &str, addr: Address) -> Option<u64> {
        self.values.get(register)?.get(addr)
    }

    /// Coalesced ranges holding a value for `register`, ascending.
    pub fn value_ranges(&self, register: &str) -> Vec<(AddressRange, u64)> {
        let Some(map) = self.values.get(register) else {
            return Vec::new();
        };
        map.iter()
            .filter_map(|(sp, s, e, v)| range_of(sp, s, e).ok().map(|r| (r, v)))
            .collect()
    }

    /// Forget any value of `register` over `[start, end]`.
    pub fn remove_value(&mut self, register: &str, start: Address, end: Address) -> Result<(), ContextError> {
        let range = AddressRange::new(start, end).map_err(|_| ContextError::InvalidRange)?;
        self.known(register)?;
        if let Some(map) = self.values.get_mut(register) {
            map.clear(range.space(), range.start().offset(), range.end().offset());
        }
        Ok(())
    }
}
