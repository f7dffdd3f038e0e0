//! Generational slot list holding the wakers parked on a cancellation token.

/// Handle to a slot in an [`EntryList`].
///
/// The generation marker makes a stale handle harmless: once its slot is
/// reused the old handle no longer matches and `take` returns `None`.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Entry {
    id: usize,
    gen: usize,
}

#[derive(Debug)]
pub struct EntryList<T> {
    items: Vec<(usize, Option<T>)>,
    free_entries: Vec<Entry>,
}

impl<T> Default for EntryList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EntryList<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            free_entries: Vec::new(),
        }
    }

    /// active_slots returns how many slots currently hold a value.
    #[inline]
    #[must_use]
    pub fn active_slots(&self) -> usize {
        self.items.len() - self.free_entries.len()
    }

    /// inserts a new value into the list receiving the relevant
    /// `Entry` handle for the item, reusing a vacated slot when possible.
    #[inline]
    pub fn insert(&mut self, item: T) -> Entry {
        let entry = match self.free_entries.pop() {
            Some(mut inner) => {
                inner.gen += 1;
                inner
            }
            None => Entry {
                id: self.items.len(),
                gen: 0,
            },
        };

        if self.items.len() == entry.id {
            self.items.push((entry.gen, Some(item)));
        } else {
            self.items[entry.id] = (entry.gen, Some(item));
        }

        entry
    }

    /// take collects the value pointed to by the `Entry` if it is still
    /// valid and frees the slot for reuse.
    #[inline]
    pub fn take(&mut self, entry: &Entry) -> Option<T> {
        let (gen, value) = self.items.get_mut(entry.id)?;
        if *gen != entry.gen {
            return None;
        }
        let item = value.take()?;
        self.free_entries.push(*entry);
        Some(item)
    }

    /// drain takes every live value out of the list, leaving all
    /// slots free. Handles issued before the drain become stale.
    pub fn drain(&mut self) -> Vec<T> {
        let mut taken = Vec::with_capacity(self.active_slots());
        for (index, (gen, value)) in self.items.iter_mut().enumerate() {
            if let Some(item) = value.take() {
                self.free_entries.push(Entry {
                    id: index,
                    gen: *gen,
                });
                taken.push(item);
            }
        }
        taken
    }
}
