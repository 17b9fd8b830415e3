//! Reentrant, hierarchical read/write locking over the collection tree.
//!
//! Lock holders here are logical [`crate::database::Connection`]s, not
//! threads: a connection may acquire a lock, hand control to another
//! thread, and release it later. That rules out a spin-lock;
//! acquisition blocks on a `Condvar` instead.
//!
//! Locking a document or collection also locks its ancestors, so two
//! operations on unrelated subtrees never contend, while an operation
//! on `/a/b/c` is correctly ordered against one on `/a`. A write lock
//! on the target only takes a *read* lock on its ancestors: two writers
//! under different children of the same parent still proceed
//! concurrently, only writes to the same node serialize.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::types::ObjectId;

/// Identifies the caller of a lock acquisition. Opaque beyond equality;
/// the [`crate::database::Connection`] that owns a `LockManager` handle
/// mints one per logical session.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Holder(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mode {
    Read,
    Write,
}

struct NodeLock {
    // None: free. Some(Write, holder, 1) or Some(Read, holder, n>=1)
    // readers share a slot only when every current reader is the same
    // holder (reentrancy); a second distinct reader simply adds itself
    // to `readers`.
    writer: Option<(Holder, u32)>,
    readers: HashMap<Holder, u32>,
}

impl NodeLock {
    fn new() -> NodeLock {
        NodeLock {
            writer: None,
            readers: HashMap::new(),
        }
    }

    fn can_read(&self, holder: Holder) -> bool {
        match self.writer {
            None => true,
            Some((h, _)) => h == holder,
        }
    }

    fn can_write(&self, holder: Holder) -> bool {
        match self.writer {
            None => self.readers.is_empty() || (self.readers.len() == 1 && self.readers.contains_key(&holder)),
            Some((h, _)) => h == holder,
        }
    }
}

struct State {
    nodes: HashMap<ObjectId, NodeLock>,
}

/// Owns one [`NodeLock`] per collection/document id that has ever been
/// locked, and the single condvar all waiters block on. Acquisition
/// always locks ancestors before the target and releases in reverse,
/// so a deadlock between two operations on overlapping paths cannot
/// form a cycle.
pub struct LockManager {
    state: Mutex<State>,
    cv: Condvar,
}

/// An acquired lock chain; dropping it (or calling [`Guard::release`])
/// unlocks every node in reverse acquisition order.
pub struct Guard<'a> {
    manager: &'a LockManager,
    holder: Holder,
    // innermost last, so release walks it in reverse.
    chain: Vec<(ObjectId, Mode)>,
}

impl<'a> Guard<'a> {
    pub fn release(mut self) {
        self.unlock_all();
    }

    fn unlock_all(&mut self) {
        if self.chain.is_empty() {
            return;
        }
        let mut state = self.manager.state.lock().unwrap();
        release_locked(&mut state, self.holder, &mut self.chain);
        self.manager.cv.notify_all();
    }
}

impl<'a> Drop for Guard<'a> {
    fn drop(&mut self) {
        self.unlock_all();
    }
}

impl LockManager {
    pub fn new() -> LockManager {
        LockManager {
            state: Mutex::new(State {
                nodes: HashMap::new(),
            }),
            cv: Condvar::new(),
        }
    }

    /// Read-lock `id` and every ancestor up to the root, nearest-first
    /// order of acquisition running root-to-leaf (so two paths that
    /// share a prefix always acquire that prefix in the same order).
    pub fn lock_read(
        &self,
        catalog: &Catalog,
        holder: Holder,
        id: ObjectId,
        timeout: Option<Duration>,
    ) -> Result<Guard<'_>> {
        let mut chain = catalog.ancestors(id)?;
        chain.reverse(); // root first
        self.acquire_chain(holder, chain.into_iter().map(|id| (id, Mode::Read)).collect(), timeout)
    }

    /// Write-lock `id`, taking only *read* locks on its ancestors:
    /// two writers to siblings under the same parent do not
    /// contend, only writers to the same node do.
    pub fn lock_write(
        &self,
        catalog: &Catalog,
        holder: Holder,
        id: ObjectId,
        timeout: Option<Duration>,
    ) -> Result<Guard<'_>> {
        let mut ancestors = catalog.ancestors(id)?;
        let target = ancestors.remove(0);
        ancestors.reverse(); // root first, excludes target
        let mut chain: Vec<(ObjectId, Mode)> = ancestors.into_iter().map(|id| (id, Mode::Read)).collect();
        chain.push((target, Mode::Write));
        self.acquire_chain(holder, chain, timeout)
    }

    /// `lockReadDoc`: read-lock `doc_id` itself plus every ancestor of
    /// `parent_id` (which includes `parent_id`) up to the root.
    /// Documents are never keys in the catalog's collection map, so
    /// unlike [`LockManager::lock_read`] this cannot walk `ancestors`
    /// starting from the document id; the caller supplies the parent
    /// separately and it is appended to the chain read-only.
    pub fn lock_read_doc(
        &self,
        catalog: &Catalog,
        holder: Holder,
        doc_id: ObjectId,
        parent_id: ObjectId,
        timeout: Option<Duration>,
    ) -> Result<Guard<'_>> {
        let mut chain = catalog.ancestors(parent_id)?;
        chain.reverse(); // root first
        let mut chain: Vec<(ObjectId, Mode)> = chain.into_iter().map(|id| (id, Mode::Read)).collect();
        chain.push((doc_id, Mode::Read));
        self.acquire_chain(holder, chain, timeout)
    }

    /// `lockWriteDoc`: write-lock `doc_id`, taking only *read* locks on
    /// `parent_id` and its ancestors.
    pub fn lock_write_doc(
        &self,
        catalog: &Catalog,
        holder: Holder,
        doc_id: ObjectId,
        parent_id: ObjectId,
        timeout: Option<Duration>,
    ) -> Result<Guard<'_>> {
        let mut chain = catalog.ancestors(parent_id)?;
        chain.reverse(); // root first
        let mut chain: Vec<(ObjectId, Mode)> = chain.into_iter().map(|id| (id, Mode::Read)).collect();
        chain.push((doc_id, Mode::Write));
        self.acquire_chain(holder, chain, timeout)
    }

    fn acquire_chain(
        &self,
        holder: Holder,
        wanted: Vec<(ObjectId, Mode)>,
        timeout: Option<Duration>,
    ) -> Result<Guard<'_>> {
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut acquired: Vec<(ObjectId, Mode)> = Vec::with_capacity(wanted.len());
        let mut state = self.state.lock().unwrap();

        for (id, mode) in wanted {
            loop {
                let ready = {
                    let node = state.nodes.entry(id).or_insert_with(NodeLock::new);
                    match mode {
                        Mode::Read => node.can_read(holder),
                        Mode::Write => node.can_write(holder),
                    }
                };
                if ready {
                    let node = state.nodes.get_mut(&id).unwrap();
                    match mode {
                        Mode::Read => {
                            *node.readers.entry(holder).or_insert(0) += 1;
                        }
                        Mode::Write => {
                            let count = node.writer.map(|(_, c)| c).unwrap_or(0);
                            node.writer = Some((holder, count + 1));
                        }
                    }
                    acquired.push((id, mode));
                    break;
                }

                match deadline {
                    Some(deadline) => {
                        let now = Instant::now();
                        if now >= deadline {
                            release_locked(&mut state, holder, &mut acquired);
                            self.cv.notify_all();
                            return Err(Error::Timeout(format!("lock on {}", id)));
                        }
                        let (guard, result) = self.cv.wait_timeout(state, deadline - now).unwrap();
                        state = guard;
                        if result.timed_out() {
                            release_locked(&mut state, holder, &mut acquired);
                            self.cv.notify_all();
                            return Err(Error::Timeout(format!("lock on {}", id)));
                        }
                    }
                    None => {
                        state = self.cv.wait(state).unwrap();
                    }
                }
            }
        }
        Ok(Guard {
            manager: self,
            holder,
            chain: acquired,
        })
    }
}

/// Release every node in `acquired` (in reverse) while `state` is
/// already locked. Shared by the timeout-abort path in
/// `acquire_chain` and by `Guard`'s own unlock.
fn release_locked(state: &mut State, holder: Holder, acquired: &mut Vec<(ObjectId, Mode)>) {
    for (id, mode) in acquired.drain(..).rev() {
        if let Some(node) = state.nodes.get_mut(&id) {
            match mode {
                Mode::Read => {
                    let count = node.readers.entry(holder).or_insert(0);
                    if *count > 0 {
                        *count -= 1;
                    }
                    if *count == 0 {
                        node.readers.remove(&holder);
                    }
                }
                Mode::Write => {
                    if let Some((h, count)) = node.writer {
                        if h == holder {
                            node.writer = if count > 1 { Some((h, count - 1)) } else { None };
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "lock_test.rs"]
mod lock_test;
