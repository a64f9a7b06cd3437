//! Generational arena of registered units.

use crate::port::{Direction, Port};
use crate::unit::{Capabilities, Unit, UnitId};

/// A registered unit together with the ports it owns.
pub(crate) struct UnitEntry {
    pub(crate) unit: Box<dyn Unit>,
    pub(crate) title: String,
    pub(crate) enabled: bool,
    /// Processed in the current round.
    pub(crate) bumped: bool,
    pub(crate) capabilities: Capabilities,
    pub(crate) inputs: Vec<Port>,
    pub(crate) outputs: Vec<Port>,
}

impl UnitEntry {
    pub(crate) fn new(mut unit: Box<dyn Unit>) -> Self {
        let capabilities = Capabilities {
            persistent: unit.persistence().is_some(),
        };
        Self {
            title: unit.kind().to_owned(),
            unit,
            enabled: true,
            bumped: false,
            capabilities,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn ports(&self, direction: Direction) -> &Vec<Port> {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    #[inline]
    pub(crate) fn ports_mut(&mut self, direction: Direction) -> &mut Vec<Port> {
        match direction {
            Direction::Input => &mut self.inputs,
            Direction::Output => &mut self.outputs,
        }
    }

    pub(crate) fn all_ports(&self) -> impl Iterator<Item = &Port> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    pub(crate) fn all_ports_mut(&mut self) -> impl Iterator<Item = &mut Port> {
        self.inputs.iter_mut().chain(self.outputs.iter_mut())
    }
}

struct Slot {
    generation: u32,
    entry: Option<UnitEntry>,
}

/// Slots are reused after removal; the generation counter keeps stale ids from
/// resolving to the new occupant.
#[derive(Default)]
pub(crate) struct Units {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl Units {
    pub(crate) fn insert(&mut self, entry: UnitEntry) -> UnitId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return UnitId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        UnitId { index, generation: 0 }
    }

    pub(crate) fn remove(&mut self, id: UnitId) -> Option<UnitEntry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(entry)
    }

    #[inline]
    pub(crate) fn get(&self, id: UnitId) -> Option<&UnitEntry> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: UnitId) -> Option<&mut UnitEntry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    /// Two distinct entries at once.
    pub(crate) fn pair_mut(
        &mut self,
        a: UnitId,
        b: UnitId,
    ) -> Option<(&mut UnitEntry, &mut UnitEntry)> {
        if a.index == b.index {
            return None;
        }
        let (ia, ib) = (a.index as usize, b.index as usize);
        if ia.max(ib) >= self.slots.len() {
            return None;
        }
        let (first, second) = if ia < ib {
            let (lo, hi) = self.slots.split_at_mut(ib);
            (&mut lo[ia], &mut hi[0])
        } else {
            let (lo, hi) = self.slots.split_at_mut(ia);
            (&mut hi[0], &mut lo[ib])
        };
        if first.generation != a.generation || second.generation != b.generation {
            return None;
        }
        Some((first.entry.as_mut()?, second.entry.as_mut()?))
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Upper bound of slot indices, for allocation-free iteration with [`id_at`](Self::id_at).
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Id of the live unit in slot `index`, if any.
    #[inline]
    pub(crate) fn id_at(&self, index: usize) -> Option<UnitId> {
        let slot = self.slots.get(index)?;
        slot.entry.as_ref().map(|_| UnitId {
            index: index as u32,
            generation: slot.generation,
        })
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (UnitId, &UnitEntry)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|entry| {
                (
                    UnitId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    entry,
                )
            })
        })
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (UnitId, &mut UnitEntry)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.entry.as_mut().map(|entry| {
                (
                    UnitId {
                        index: index as u32,
                        generation,
                    },
                    entry,
                )
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::UnitIo;

    struct Nothing;

    impl Unit for Nothing {
        fn kind(&self) -> &str {
            "nothing"
        }

        fn process(&mut self, _io: &mut UnitIo<'_>) {}
    }

    fn entry() -> UnitEntry {
        UnitEntry::new(Box::new(Nothing))
    }

    #[test]
    fn stale_ids_do_not_resolve() {
        let mut units = Units::default();
        let a = units.insert(entry());
        assert!(units.remove(a).is_some());
        let b = units.insert(entry());

        assert_eq!(a.index, b.index);
        assert!(units.get(a).is_none());
        assert!(units.get(b).is_some());
        assert!(units.remove(a).is_none());
        assert_eq!(units.len(), 1);
    }

    #[test]
    fn pair_mut_in_both_orders() {
        let mut units = Units::default();
        let a = units.insert(entry());
        let b = units.insert(entry());

        let (ea, eb) = units.pair_mut(a, b).unwrap();
        ea.title = "a".into();
        eb.title = "b".into();
        let (eb, ea) = units.pair_mut(b, a).unwrap();
        assert_eq!(ea.title, "a");
        assert_eq!(eb.title, "b");
        assert!(units.pair_mut(a, a).is_none());
    }
}
