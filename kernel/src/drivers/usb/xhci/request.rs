//! Transfer requests and the arena that owns them while in flight.
//!
//! Rings never hold requests directly. They keep ordered lists of
//! [`RequestId`]s; the controller's [`RequestArena`] maps an id back to the
//! request body. Ids are generational, so an id kept after its request was
//! completed or cancelled resolves to nothing instead of to a newer request
//! reusing the same slot.

use alloc::vec::Vec;

use super::error::{XhciError, XhciResult};
use super::trb::{Trb, TrbFlags};
use crate::config::MAX_TRB_TRANSFER_LEN;

/// Stable handle to a request held by a [`RequestArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId {
    index: u32,
    generation: u32,
}

/// A transfer descriptor: the TRBs for one driver-level request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    trbs: Vec<Trb>,
    cookie: u64,
}

impl TransferRequest {
    /// Bulk/interrupt transfer of `len` bytes at device address `buffer`.
    ///
    /// The buffer is split into Normal TRBs that never cross a 64 KiB
    /// boundary. Every TRB but the last is chained; the last one interrupts
    /// on completion. A zero-length request yields one empty Normal TRB.
    pub fn normal(buffer: u64, len: usize) -> Self {
        let mut trbs = Vec::new();
        let mut addr = buffer;
        let mut remaining = len;
        loop {
            let to_boundary = MAX_TRB_TRANSFER_LEN - (addr as usize % MAX_TRB_TRANSFER_LEN);
            let chunk = remaining.min(to_boundary);
            trbs.push(Trb::normal(addr, chunk as u32, TrbFlags::CHAIN));
            addr += chunk as u64;
            remaining -= chunk;
            if remaining == 0 {
                break;
            }
        }
        seal(&mut trbs);
        Self { trbs, cookie: 0 }
    }

    /// Request built from descriptors assembled by a higher layer (control
    /// stages, isochronous TDs).
    ///
    /// Cycle bits are ignored; the ring owns them. Link and event TRBs are
    /// rejected, as is an empty list.
    pub fn from_trbs(mut trbs: Vec<Trb>) -> XhciResult<Self> {
        if trbs.is_empty() {
            return Err(XhciError::InvalidDescriptor {
                reason: "empty transfer descriptor",
            });
        }
        for trb in trbs.iter_mut() {
            match trb.trb_type() {
                None => {
                    return Err(XhciError::InvalidDescriptor {
                        reason: "unknown TRB type in transfer",
                    })
                }
                Some(t) if t.is_event() => {
                    return Err(XhciError::InvalidDescriptor {
                        reason: "event TRB in transfer",
                    })
                }
                Some(super::trb::TrbType::Link) => {
                    return Err(XhciError::InvalidDescriptor {
                        reason: "link TRB in transfer",
                    })
                }
                Some(_) => trb.set_cycle(false),
            }
        }
        Ok(Self { trbs, cookie: 0 })
    }

    /// Attach an opaque value handed back on completion.
    pub fn with_cookie(mut self, cookie: u64) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn trbs(&self) -> &[Trb] {
        &self.trbs
    }

    pub fn cookie(&self) -> u64 {
        self.cookie
    }

    /// Total bytes described by the request.
    pub fn len(&self) -> usize {
        self.trbs
            .iter()
            .filter(|t| !t.flags().contains(TrbFlags::IDT))
            .map(|t| t.transfer_len() as usize)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Chain every TRB into the next and interrupt on the last one.
fn seal(trbs: &mut [Trb]) {
    let last = trbs.len() - 1;
    for (i, trb) in trbs.iter_mut().enumerate() {
        let mut flags = trb.flags();
        flags.set(TrbFlags::CHAIN, i != last);
        flags.set(TrbFlags::IOC, i == last);
        trb.set_flags(flags);
    }
}

/// A request together with the endpoint it was submitted to.
#[derive(Debug)]
pub struct TrackedRequest {
    pub request: TransferRequest,
    pub slot: u8,
    pub endpoint: u8,
}

enum Entry {
    Occupied { generation: u32, tracked: TrackedRequest },
    Vacant { generation: u32 },
}

/// Generational arena of in-flight requests.
#[derive(Default)]
pub struct RequestArena {
    entries: Vec<Entry>,
    free: Vec<u32>,
    live: usize,
}

impl RequestArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tracked: TrackedRequest) -> RequestId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            let generation = match entry {
                Entry::Vacant { generation } => generation.wrapping_add(1),
                Entry::Occupied { .. } => unreachable!("free list names an occupied entry"),
            };
            *entry = Entry::Occupied { generation, tracked };
            RequestId { index, generation }
        } else {
            let index = self.entries.len() as u32;
            self.entries.push(Entry::Occupied {
                generation: 0,
                tracked,
            });
            RequestId {
                index,
                generation: 0,
            }
        }
    }

    pub fn get(&self, id: RequestId) -> Option<&TrackedRequest> {
        match self.entries.get(id.index as usize)? {
            Entry::Occupied { generation, tracked } if *generation == id.generation => Some(tracked),
            _ => None,
        }
    }

    /// Take the request out of the arena. Stale ids yield `UnknownRequest`.
    pub fn remove(&mut self, id: RequestId) -> XhciResult<TrackedRequest> {
        let entry = self
            .entries
            .get_mut(id.index as usize)
            .ok_or(XhciError::UnknownRequest)?;
        match entry {
            Entry::Occupied { generation, .. } if *generation == id.generation => {
                let vacant = Entry::Vacant {
                    generation: id.generation,
                };
                let Entry::Occupied { tracked, .. } = core::mem::replace(entry, vacant) else {
                    unreachable!()
                };
                self.free.push(id.index);
                self.live -= 1;
                Ok(tracked)
            }
            _ => Err(XhciError::UnknownRequest),
        }
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live requests.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}
