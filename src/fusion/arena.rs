//! Generational storage for fused tracks
//!
//! Fused tracks are addressed by a permanent [`TrackKey`], while a separate
//! dense order gives each live track its *track number*. Removing a track
//! shifts the numbers of later tracks; keys never change and are never
//! reused with the same generation, so a stale key cannot alias a new track.

/// Stable key of a fused track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackKey {
    slot: u32,
    generation: u32,
}

impl TrackKey {
    /// Creates a key; only meaningful for the arena that issued it.
    #[inline]
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// Slot index.
    #[inline]
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Generation of the slot when the key was issued.
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl core::fmt::Display for TrackKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}v{}", self.slot, self.generation)
    }
}

#[derive(Debug, Clone)]
enum Slot<V> {
    Occupied { generation: u32, dense: usize, value: V },
    Vacant { generation: u32 },
}

/// Generational arena with insertion-ordered dense numbering.
#[derive(Debug, Clone)]
pub struct Arena<V> {
    slots: Vec<Slot<V>>,
    free: Vec<u32>,
    order: Vec<TrackKey>,
}

impl<V> Default for Arena<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Arena<V> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Number of live values.
    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if the arena holds nothing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Keys in dense order.
    #[inline]
    pub fn keys(&self) -> &[TrackKey] {
        &self.order
    }

    /// Inserts a value built from its own key, appending it to the dense order.
    pub fn insert_with(&mut self, build: impl FnOnce(TrackKey, usize) -> V) -> TrackKey {
        let dense = self.order.len();
        let key = match self.free.pop() {
            Some(slot) => {
                let generation = match self.slots[slot as usize] {
                    Slot::Vacant { generation } => generation,
                    Slot::Occupied { generation, .. } => generation,
                };
                TrackKey::new(slot, generation)
            }
            None => {
                self.slots.push(Slot::Vacant { generation: 0 });
                TrackKey::new(self.slots.len() as u32 - 1, 0)
            }
        };
        let value = build(key, dense);
        self.slots[key.slot as usize] = Slot::Occupied {
            generation: key.generation,
            dense,
            value,
        };
        self.order.push(key);
        key
    }

    /// Removes a value, closing the gap in the dense order.
    pub fn remove(&mut self, key: TrackKey) -> Option<V> {
        let dense = self.position(key)?;
        let slot = &mut self.slots[key.slot as usize];
        let old = core::mem::replace(
            slot,
            Slot::Vacant {
                generation: key.generation.wrapping_add(1),
            },
        );
        self.free.push(key.slot);
        self.order.remove(dense);
        for (i, k) in self.order.iter().enumerate().skip(dense) {
            if let Slot::Occupied { dense, .. } = &mut self.slots[k.slot as usize] {
                *dense = i;
            }
        }
        match old {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    /// Dense position of a live key.
    pub fn position(&self, key: TrackKey) -> Option<usize> {
        match self.slots.get(key.slot as usize)? {
            Slot::Occupied {
                generation, dense, ..
            } if *generation == key.generation => Some(*dense),
            _ => None,
        }
    }

    /// True if the key refers to a live value.
    #[inline]
    pub fn contains(&self, key: TrackKey) -> bool {
        self.position(key).is_some()
    }

    /// Shared access by key.
    pub fn get(&self, key: TrackKey) -> Option<&V> {
        match self.slots.get(key.slot as usize)? {
            Slot::Occupied {
                generation, value, ..
            } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    /// Mutable access by key.
    pub fn get_mut(&mut self, key: TrackKey) -> Option<&mut V> {
        match self.slots.get_mut(key.slot as usize)? {
            Slot::Occupied {
                generation, value, ..
            } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    /// Value at a dense position.
    pub fn at(&self, position: usize) -> Option<&V> {
        self.get(*self.order.get(position)?)
    }

    /// Values in dense order.
    pub fn iter(&self) -> impl Iterator<Item = &V> + '_ {
        self.order.iter().filter_map(move |k| self.get(*k))
    }
}
