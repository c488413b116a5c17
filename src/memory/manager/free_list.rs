/*!
 * Free Block Index
 * Per-family free blocks ordered for biggest-fit allocation
 */

use crate::core::types::BlockRef;
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Sort key: larger payloads first, then the most recently inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct FreeKey {
    size: Reverse<u32>,
    ticket: Reverse<u64>,
}

impl FreeKey {
    fn new(size: u32, ticket: u64) -> Self {
        Self {
            size: Reverse(size),
            ticket: Reverse(ticket),
        }
    }
}

/// Ordered index of a family's free blocks
///
/// - Insert: O(log n), returns the membership ticket to store in the header
/// - Remove by identity: O(log n) from the header's size and ticket
/// - Largest: O(1) from a cached copy of the first entry
///
/// Equal sizes resolve most-recently-inserted first: tickets grow
/// monotonically and sort descending.
#[derive(Debug, Default)]
pub struct FreeBlockIndex {
    entries: BTreeMap<FreeKey, BlockRef>,
    /// Always equal to the map's first entry
    head: Option<(FreeKey, BlockRef)>,
    next_ticket: u64,
}

impl FreeBlockIndex {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            head: None,
            next_ticket: 1,
        }
    }

    /// Insert a free block, returning its membership ticket (never 0)
    pub fn insert(&mut self, block: BlockRef, size: u32) -> u64 {
        let ticket = self.next_ticket.max(1);
        self.next_ticket = ticket + 1;
        let key = FreeKey::new(size, ticket);
        self.entries.insert(key, block);
        if self.head.map_or(true, |(head, _)| key < head) {
            self.head = Some((key, block));
        }
        ticket
    }

    /// Detach `block`, returning false when no matching entry exists
    pub fn remove(&mut self, block: BlockRef, size: u32, ticket: u64) -> bool {
        let key = FreeKey::new(size, ticket);
        match self.entries.get(&key) {
            Some(found) if *found == block => {
                self.entries.remove(&key);
                if self.head.is_some_and(|(head, _)| head == key) {
                    self.head = self
                        .entries
                        .first_key_value()
                        .map(|(key, block)| (*key, *block));
                }
                true
            }
            _ => false,
        }
    }

    /// Largest free block and its payload size
    pub fn largest(&self) -> Option<(BlockRef, u32)> {
        self.head.map(|(key, block)| (block, key.size.0))
    }

    /// Blocks in allocation-preference order
    pub fn iter(&self) -> impl Iterator<Item = (BlockRef, u32, u64)> + '_ {
        self.entries
            .iter()
            .map(|(key, block)| (*block, key.size.0, key.ticket.0))
    }

    /// Whether `block` is indexed under `ticket`
    pub fn contains(&self, block: BlockRef, size: u32, ticket: u64) -> bool {
        self.entries.get(&FreeKey::new(size, ticket)) == Some(&block)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn total_free_bytes(&self) -> usize {
        self.entries.keys().map(|key| key.size.0 as usize).sum()
    }
}
