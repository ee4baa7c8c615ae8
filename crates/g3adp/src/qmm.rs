// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Queue Management Module (QMM).
//!
//! Bounded doubly-linked queue for frame buffers awaiting transmission or
//! processing. Supports two insertion disciplines:
//!
//! - **FIFO**: new elements always link at the tail
//! - **Priority**: elements link in ascending priority order (lower numeric
//!   value = higher priority), FIFO-stable among equal priorities
//!
//! The list is built on an arena of slots indexed by `u16` rather than
//! raw prev/next pointers. Every link is an `Option<u16>` into the arena,
//! so a stale reference can at worst hit the wrong slot, never dangle.
//! Slot indices are validated against the arena on every access, which
//! subsumes the old opt-in element-address range checking.
//!
//! A queue owns element *placement*; payload ownership transfers to the
//! queue on `append` and back to the caller on removal. An element is in
//! one of three states: `Free` (slot unused), `Detached` (payload held but
//! not linked), `Linked`.
//!
//! Not synchronized: one logical owner drives all mutations. Callers that
//! share a queue across threads must serialize access externally.

use std::fmt;

/// Default priority assigned by plain `append` in Priority mode.
/// Lowest priority, so un-prioritized appends keep FIFO order at the tail.
const DEFAULT_PRIORITY: u8 = u8::MAX;

/// Queue insertion discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// Append at tail, remove at head.
    Fifo,
    /// Ordered by element priority (lower value = higher priority).
    Priority,
}

/// End of the queue addressed by [`Queue::read_or_remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Head,
    Tail,
}

/// Whether [`Queue::read_or_remove`] peeks or unlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Remove,
}

/// Outcome of [`Queue::read_or_remove`].
#[derive(Debug)]
pub enum Accessed<'a, T> {
    /// Borrowed element, still linked.
    Read(&'a T),
    /// Element unlinked and handed back to the caller.
    Removed(T),
}

/// QMM operation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QmmError {
    /// `size >= capacity`; the queue is unmodified and the caller decides
    /// whether to drop or retry (backpressure point).
    QueueFull,
    /// Removal from an empty queue.
    QueueEmpty,
    /// Priority operation on a FIFO queue.
    WrongQueueMode,
    /// Element id does not refer to a live element of this queue.
    InvalidElement,
    /// A link-invariant violation was detected earlier; the queue refuses
    /// further mutation rather than run with corrupted links.
    Poisoned,
}

impl fmt::Display for QmmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "queue full"),
            Self::QueueEmpty => write!(f, "queue empty"),
            Self::WrongQueueMode => write!(f, "wrong queue mode"),
            Self::InvalidElement => write!(f, "invalid element id"),
            Self::Poisoned => write!(f, "queue poisoned by invariant violation"),
        }
    }
}

impl std::error::Error for QmmError {}

/// Handle to an element held by a queue.
///
/// Valid from `append` until the element is removed. Ids of removed
/// elements may be recycled for later appends; holding one across a
/// removal is a caller bug (same contract the element pointers of the
/// original pool design had, minus the memory unsafety).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(u16);

#[derive(Debug)]
struct Slot<T> {
    item: Option<T>,
    linked: bool,
    prev: Option<u16>,
    next: Option<u16>,
    priority: u8,
}

impl<T> Slot<T> {
    fn free() -> Self {
        Self {
            item: None,
            linked: false,
            prev: None,
            next: None,
            priority: DEFAULT_PRIORITY,
        }
    }
}

/// Bounded FIFO/priority queue over an index arena.
#[derive(Debug)]
pub struct Queue<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u16>,
    head: Option<u16>,
    tail: Option<u16>,
    len: u16,
    capacity: u16,
    mode: QueueMode,
    poisoned: bool,
}

impl<T> Queue<T> {
    /// Create an empty queue.
    ///
    /// A capacity of 0 is accepted but can hold no elements.
    pub fn new(capacity: u16, mode: QueueMode) -> Self {
        Self {
            slots: Vec::with_capacity(capacity as usize),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            capacity,
            mode,
            poisoned: false,
        }
    }

    /// Number of linked elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    #[inline]
    pub fn mode(&self) -> QueueMode {
        self.mode
    }

    /// Lower the cap (or raise it). May go below the current size; only
    /// future appends are affected, existing elements are never evicted.
    pub fn set_capacity(&mut self, capacity: u16) {
        self.capacity = capacity;
    }

    /// Append a new element.
    ///
    /// FIFO mode links at the tail. Priority mode links with the lowest
    /// priority, i.e. behind every prioritized element.
    pub fn append(&mut self, item: T) -> Result<ElementId, QmmError> {
        self.append_prio(item, DEFAULT_PRIORITY)
    }

    /// Append a new element with an explicit priority.
    ///
    /// Only valid in Priority mode; fails with `WrongQueueMode` on a FIFO
    /// queue.
    pub fn append_with_priority(&mut self, priority: u8, item: T) -> Result<ElementId, QmmError> {
        if self.mode != QueueMode::Priority {
            return Err(QmmError::WrongQueueMode);
        }
        self.append_prio(item, priority)
    }

    fn append_prio(&mut self, item: T, priority: u8) -> Result<ElementId, QmmError> {
        self.check_poisoned()?;
        if self.len >= self.capacity {
            return Err(QmmError::QueueFull);
        }
        let idx = self.alloc(item, priority);
        self.link(idx);
        self.after_mutation();
        Ok(ElementId(idx))
    }

    /// Re-link an element already owned by this queue.
    ///
    /// **Idempotent**: if the element is currently linked (its own link
    /// state says so, or it is the sole element and identical to `head`),
    /// this is a no-op, not an error. A `Detached` element is linked
    /// according to the queue mode and its stored priority.
    pub fn append_element(&mut self, id: ElementId) -> Result<(), QmmError> {
        self.check_poisoned()?;
        let idx = self.validate(id)?;
        let slot = &self.slots[idx as usize];
        // Linked detection mirrors the legacy check: non-null prev/next,
        // or sole element == head.
        if slot.linked || slot.prev.is_some() || slot.next.is_some() || self.head == Some(idx) {
            return Ok(());
        }
        if self.len >= self.capacity {
            return Err(QmmError::QueueFull);
        }
        self.link(idx);
        self.after_mutation();
        Ok(())
    }

    /// Unlink an element wherever it sits (head/tail/middle) and hand its
    /// payload back. Returns `None` (silent no-op) if the id no longer
    /// refers to a live element.
    pub fn remove(&mut self, id: ElementId) -> Option<T> {
        if self.poisoned {
            return None;
        }
        let idx = self.validate(id).ok()?;
        if self.slots[idx as usize].linked {
            self.unlink_idx(idx);
            self.after_mutation();
        }
        let item = self.slots[idx as usize].item.take();
        if item.is_some() {
            self.release(idx);
        }
        item
    }

    /// Unlink an element but keep its payload in the arena (`Detached`).
    /// A later [`Queue::append_element`] re-links it.
    pub fn unlink(&mut self, id: ElementId) -> Result<(), QmmError> {
        self.check_poisoned()?;
        let idx = self.validate(id)?;
        if self.slots[idx as usize].linked {
            self.unlink_idx(idx);
            self.after_mutation();
        }
        Ok(())
    }

    /// Read or remove the element at one end of the queue.
    ///
    /// Returns `None` if the queue is empty.
    pub fn read_or_remove(
        &mut self,
        access: AccessMode,
        position: Position,
    ) -> Option<Accessed<'_, T>> {
        if self.poisoned {
            return None;
        }
        let idx = match position {
            Position::Head => self.head?,
            Position::Tail => self.tail?,
        };
        match access {
            AccessMode::Read => self.slots[idx as usize].item.as_ref().map(Accessed::Read),
            AccessMode::Remove => {
                self.unlink_idx(idx);
                self.after_mutation();
                let item = self.slots[idx as usize].item.take();
                self.release(idx);
                item.map(Accessed::Removed)
            }
        }
    }

    /// Borrow the element at one end without unlinking it.
    pub fn peek(&self, position: Position) -> Option<&T> {
        let idx = match position {
            Position::Head => self.head?,
            Position::Tail => self.tail?,
        };
        self.slots[idx as usize].item.as_ref()
    }

    /// Remove and return the element at one end.
    pub fn pop(&mut self, position: Position) -> Result<T, QmmError> {
        self.check_poisoned()?;
        match self.read_or_remove(AccessMode::Remove, position) {
            Some(Accessed::Removed(item)) => Ok(item),
            _ => Err(QmmError::QueueEmpty),
        }
    }

    /// Remove all elements one at a time from the head until empty.
    pub fn flush(&mut self) {
        while self
            .read_or_remove(AccessMode::Remove, Position::Head)
            .is_some()
        {}
        debug_assert!(self.head.is_none() && self.tail.is_none() && self.len == 0);
    }

    /// Iterate linked payloads head to tail.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            queue: self,
            cursor: self.head,
        }
    }

    // ------------------------------------------------------------------
    // Arena plumbing
    // ------------------------------------------------------------------

    fn alloc(&mut self, item: T, priority: u8) -> u16 {
        let idx = match self.free.pop() {
            Some(idx) => idx,
            None => {
                self.slots.push(Slot::free());
                (self.slots.len() - 1) as u16
            }
        };
        let slot = &mut self.slots[idx as usize];
        slot.item = Some(item);
        slot.priority = priority;
        slot.prev = None;
        slot.next = None;
        slot.linked = false;
        idx
    }

    fn release(&mut self, idx: u16) {
        let slot = &mut self.slots[idx as usize];
        debug_assert!(slot.item.is_none() && !slot.linked);
        slot.prev = None;
        slot.next = None;
        slot.priority = DEFAULT_PRIORITY;
        self.free.push(idx);
    }

    fn validate(&self, id: ElementId) -> Result<u16, QmmError> {
        let idx = id.0;
        if (idx as usize) < self.slots.len() && self.slots[idx as usize].item.is_some() {
            Ok(idx)
        } else {
            Err(QmmError::InvalidElement)
        }
    }

    fn check_poisoned(&self) -> Result<(), QmmError> {
        if self.poisoned {
            Err(QmmError::Poisoned)
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Link management
    // ------------------------------------------------------------------

    fn link(&mut self, idx: u16) {
        match self.mode {
            QueueMode::Fifo => self.link_tail(idx),
            QueueMode::Priority => self.link_by_priority(idx),
        }
        self.slots[idx as usize].linked = true;
        self.len += 1;
    }

    fn link_tail(&mut self, idx: u16) {
        self.slots[idx as usize].prev = self.tail;
        self.slots[idx as usize].next = None;
        match self.tail {
            Some(t) => self.slots[t as usize].next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    fn link_head(&mut self, idx: u16) {
        self.slots[idx as usize].prev = None;
        self.slots[idx as usize].next = self.head;
        match self.head {
            Some(h) => self.slots[h as usize].prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn link_after(&mut self, after: u16, idx: u16) {
        let next = self.slots[after as usize].next;
        self.slots[idx as usize].prev = Some(after);
        self.slots[idx as usize].next = next;
        self.slots[after as usize].next = Some(idx);
        match next {
            Some(n) => self.slots[n as usize].prev = Some(idx),
            None => self.tail = Some(idx),
        }
    }

    /// Priority insertion: scan from tail toward head. A strictly smaller
    /// (= higher) priority than the scanned element keeps scanning
    /// backward; otherwise insert after the scan point. New elements land
    /// behind every equal-or-higher-priority element, so equal priorities
    /// keep their insertion order and the common lowest-priority append is
    /// O(1) at the tail.
    fn link_by_priority(&mut self, idx: u16) {
        let priority = self.slots[idx as usize].priority;
        let mut cursor = self.tail;
        loop {
            match cursor {
                None => {
                    self.link_head(idx);
                    return;
                }
                Some(c) => {
                    if priority < self.slots[c as usize].priority {
                        cursor = self.slots[c as usize].prev;
                    } else {
                        self.link_after(c, idx);
                        return;
                    }
                }
            }
        }
    }

    fn unlink_idx(&mut self, idx: u16) {
        let (prev, next) = {
            let slot = &self.slots[idx as usize];
            (slot.prev, slot.next)
        };
        match prev {
            Some(p) => self.slots[p as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n as usize].prev = prev,
            None => self.tail = prev,
        }
        let slot = &mut self.slots[idx as usize];
        slot.prev = None;
        slot.next = None;
        slot.linked = false;
        self.len -= 1;
    }

    // ------------------------------------------------------------------
    // Consistency checking
    // ------------------------------------------------------------------

    /// Structural invariants: head has no prev, tail has no next, forward
    /// traversal visits exactly `len` linked slots with mutually consistent
    /// prev/next, and ends at the tail.
    pub fn is_consistent(&self) -> bool {
        if self.len == 0 {
            return self.head.is_none() && self.tail.is_none();
        }
        let (Some(head), Some(tail)) = (self.head, self.tail) else {
            return false;
        };
        if self.slots[head as usize].prev.is_some() || self.slots[tail as usize].next.is_some() {
            return false;
        }
        let mut visited = 0u16;
        let mut cursor = Some(head);
        let mut last = head;
        while let Some(c) = cursor {
            let slot = &self.slots[c as usize];
            if !slot.linked || slot.item.is_none() {
                return false;
            }
            if let Some(n) = slot.next {
                if (n as usize) >= self.slots.len() || self.slots[n as usize].prev != Some(c) {
                    return false;
                }
            }
            visited += 1;
            if visited > self.len {
                // Cycle.
                return false;
            }
            last = c;
            cursor = slot.next;
        }
        visited == self.len && last == tail
    }

    /// Invariant check after every structural mutation. A violation means
    /// a caller bug (stale id reuse): panic in debug builds, log and
    /// poison the queue in release builds so it fails predictably instead
    /// of running with corrupted links.
    fn after_mutation(&mut self) {
        if cfg!(debug_assertions) {
            debug_assert!(self.is_consistent(), "qmm: link invariant violated");
        } else if !self.is_consistent() {
            log::error!("[qmm] link invariant violated, queue poisoned");
            self.poisoned = true;
        }
    }
}

/// Head-to-tail iterator over linked payloads.
pub struct Iter<'a, T> {
    queue: &'a Queue<T>,
    cursor: Option<u16>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let idx = self.cursor?;
        let slot = &self.queue.slots[idx as usize];
        self.cursor = slot.next;
        slot.item.as_ref()
    }
}
