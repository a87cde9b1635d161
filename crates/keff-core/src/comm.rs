// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Rank Communicator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Message passing between ranks.
//!
//! `Communicator` is the seam for the transport backend: tagged
//! point-to-point byte messages plus a world-wide abort flag. The
//! collectives are provided methods built on top of them and always
//! combine contributions on the root in rank order, so a reduction gives
//! the same bits regardless of message arrival order.
//!
//! `LocalWorld` runs every rank as an OS thread in this process, connected
//! by a full mesh of unbounded channels. An MPI backend would implement
//! the same trait.

use bytemuck::Pod;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use keff_types::error::{KeffError, KeffResult};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Tag = u32;

pub mod tags {
    use super::Tag;

    pub const SOURCE: Tag = 1;
    pub const BARRIER: Tag = 2;
    pub const REDUCE: Tag = 3;
    pub const GATHER: Tag = 4;
    pub const BROADCAST: Tag = 5;
    /// Hand-off messages use `HANDOFF_BASE + face index`.
    pub const HANDOFF_BASE: Tag = 16;
}

pub const ROOT: usize = 0;

/// How often a blocked receive re-checks the abort flag.
const ABORT_POLL: Duration = Duration::from_millis(5);

pub fn encode_pod<T: Pod>(values: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}

pub fn decode_pod<T: Pod>(bytes: &[u8]) -> KeffResult<Vec<T>> {
    let width = std::mem::size_of::<T>();
    if width == 0 || bytes.len() % width != 0 {
        return Err(KeffError::Wire(format!(
            "payload of {} bytes is not a whole number of {width}-byte values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(width)
        .map(bytemuck::pod_read_unaligned::<T>)
        .collect())
}

pub trait Communicator {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Non-blocking send of an owned payload.
    fn send(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> KeffResult<()>;

    /// Block until a message with `tag` from `src` arrives. Messages with
    /// other tags are kept for later receives in arrival order. Returns
    /// `Aborted` once any rank has raised the abort flag.
    fn receive(&self, src: usize, tag: Tag) -> KeffResult<Vec<u8>>;

    /// Raise the world-wide abort flag.
    fn abort(&self, reason: &str);

    fn is_aborted(&self) -> bool;

    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    /// Collect one payload per rank on `root`, indexed by rank.
    fn gather_bytes(
        &self,
        root: usize,
        tag: Tag,
        payload: Vec<u8>,
    ) -> KeffResult<Option<Vec<Vec<u8>>>> {
        if self.rank() != root {
            self.send(root, tag, payload)?;
            return Ok(None);
        }
        let mut parts = Vec::with_capacity(self.size());
        let mut own = Some(payload);
        for src in 0..self.size() {
            if src == root {
                parts.push(own.take().unwrap_or_default());
            } else {
                parts.push(self.receive(src, tag)?);
            }
        }
        Ok(Some(parts))
    }

    /// `root` supplies the payload; every rank returns a copy.
    fn broadcast_bytes(&self, root: usize, payload: Option<Vec<u8>>) -> KeffResult<Vec<u8>> {
        if self.rank() != root {
            return self.receive(root, tags::BROADCAST);
        }
        let payload = payload.ok_or_else(|| KeffError::Communication {
            rank: self.rank(),
            message: "broadcast root has no payload".to_string(),
        })?;
        for dest in (0..self.size()).filter(|&d| d != root) {
            self.send(dest, tags::BROADCAST, payload.clone())?;
        }
        Ok(payload)
    }

    fn barrier(&self) -> KeffResult<()> {
        let gathered = self.gather_bytes(ROOT, tags::BARRIER, Vec::new())?;
        self.broadcast_bytes(ROOT, gathered.map(|_| Vec::new()))?;
        Ok(())
    }

    /// Element-wise sum across ranks, added on the root in rank order.
    fn all_reduce_sum(&self, values: &[f64]) -> KeffResult<Vec<f64>> {
        let gathered = self.gather_bytes(ROOT, tags::REDUCE, encode_pod(values))?;
        let reduced = match gathered {
            Some(parts) => {
                let mut acc = vec![0.0; values.len()];
                for part in parts {
                    let part: Vec<f64> = decode_pod(&part)?;
                    if part.len() != acc.len() {
                        return Err(KeffError::Wire(format!(
                            "reduction length {} != {}",
                            part.len(),
                            acc.len()
                        )));
                    }
                    for (a, v) in acc.iter_mut().zip(part) {
                        *a += v;
                    }
                }
                Some(encode_pod(&acc))
            }
            None => None,
        };
        decode_pod(&self.broadcast_bytes(ROOT, reduced)?)
    }

    fn all_reduce_sum_u64(&self, values: &[u64]) -> KeffResult<Vec<u64>> {
        let gathered = self.gather_bytes(ROOT, tags::REDUCE, encode_pod(values))?;
        let reduced = match gathered {
            Some(parts) => {
                let mut acc = vec![0u64; values.len()];
                for part in parts {
                    let part: Vec<u64> = decode_pod(&part)?;
                    if part.len() != acc.len() {
                        return Err(KeffError::Wire(format!(
                            "reduction length {} != {}",
                            part.len(),
                            acc.len()
                        )));
                    }
                    for (a, v) in acc.iter_mut().zip(part) {
                        *a += v;
                    }
                }
                Some(encode_pod(&acc))
            }
            None => None,
        };
        decode_pod(&self.broadcast_bytes(ROOT, reduced)?)
    }

    /// Every rank learns every rank's value, indexed by rank.
    fn all_gather_u64(&self, value: u64) -> KeffResult<Vec<u64>> {
        let gathered = self.gather_bytes(ROOT, tags::GATHER, encode_pod(&[value]))?;
        let flat = gathered.map(|parts| parts.concat());
        let all: Vec<u64> = decode_pod(&self.broadcast_bytes(ROOT, flat)?)?;
        if all.len() != self.size() {
            return Err(KeffError::Wire(format!(
                "all-gather returned {} values for {} ranks",
                all.len(),
                self.size()
            )));
        }
        Ok(all)
    }

    /// Per-rank f64 vectors collected on `root`.
    fn gather_f64(&self, root: usize, values: &[f64]) -> KeffResult<Option<Vec<Vec<f64>>>> {
        match self.gather_bytes(root, tags::GATHER, encode_pod(values))? {
            Some(parts) => parts
                .iter()
                .map(|p| decode_pod(p))
                .collect::<KeffResult<Vec<_>>>()
                .map(Some),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Default)]
struct AbortState {
    raised: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl AbortState {
    fn raise(&self, rank: usize, reason: &str) {
        let mut slot = self.reason.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_none() {
            *slot = Some(format!("rank {rank}: {reason}"));
        }
        self.raised.store(true, Ordering::SeqCst);
    }

    fn reason(&self) -> String {
        self.reason
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .unwrap_or_else(|| "abort requested".to_string())
    }
}

#[derive(Debug)]
struct Envelope {
    tag: Tag,
    payload: Vec<u8>,
}

/// One rank's endpoint in a `LocalWorld`.
pub struct LocalComm {
    rank: usize,
    size: usize,
    outboxes: Vec<Sender<Envelope>>,
    inboxes: Vec<Receiver<Envelope>>,
    stash: RefCell<Vec<VecDeque<Envelope>>>,
    abort: Arc<AbortState>,
}

impl LocalComm {
    fn aborted_error(&self) -> KeffError {
        KeffError::Aborted {
            rank: self.rank,
            reason: self.abort.reason(),
        }
    }

    fn check_peer(&self, peer: usize) -> KeffResult<()> {
        if peer >= self.size {
            return Err(KeffError::Communication {
                rank: self.rank,
                message: format!("peer {peer} outside world of {} ranks", self.size),
            });
        }
        Ok(())
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> KeffResult<()> {
        self.check_peer(dest)?;
        if self.is_aborted() {
            return Err(self.aborted_error());
        }
        self.outboxes[dest]
            .send(Envelope { tag, payload })
            .map_err(|_| KeffError::Communication {
                rank: self.rank,
                message: format!("rank {dest} is gone (send tag {tag})"),
            })
    }

    fn receive(&self, src: usize, tag: Tag) -> KeffResult<Vec<u8>> {
        self.check_peer(src)?;
        {
            let mut stash = self.stash.borrow_mut();
            let queue = &mut stash[src];
            if let Some(pos) = queue.iter().position(|e| e.tag == tag) {
                if let Some(env) = queue.remove(pos) {
                    return Ok(env.payload);
                }
            }
        }
        loop {
            if self.is_aborted() {
                return Err(self.aborted_error());
            }
            match self.inboxes[src].recv_timeout(ABORT_POLL) {
                Ok(env) if env.tag == tag => return Ok(env.payload),
                Ok(env) => self.stash.borrow_mut()[src].push_back(env),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    if self.is_aborted() {
                        return Err(self.aborted_error());
                    }
                    return Err(KeffError::Communication {
                        rank: self.rank,
                        message: format!("rank {src} hung up while awaiting tag {tag}"),
                    });
                }
            }
        }
    }

    fn abort(&self, reason: &str) {
        self.abort.raise(self.rank, reason);
    }

    fn is_aborted(&self) -> bool {
        self.abort.raised.load(Ordering::SeqCst)
    }
}

/// Raises the abort flag if the rank thread unwinds.
struct PanicGuard<'a> {
    rank: usize,
    abort: &'a AbortState,
}

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.abort.raise(self.rank, "rank thread panicked");
        }
    }
}

/// In-process world of `size` ranks.
#[derive(Debug, Clone, Copy)]
pub struct LocalWorld {
    size: usize,
}

impl LocalWorld {
    pub fn new(size: usize) -> KeffResult<Self> {
        if size == 0 {
            return Err(KeffError::Config("world needs at least one rank".to_string()));
        }
        Ok(LocalWorld { size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn endpoints(&self) -> Vec<LocalComm> {
        let n = self.size;
        let abort = Arc::new(AbortState::default());
        let mut outboxes: Vec<Vec<Sender<Envelope>>> = (0..n).map(|_| Vec::with_capacity(n)).collect();
        let mut inboxes: Vec<Vec<Receiver<Envelope>>> = (0..n).map(|_| Vec::with_capacity(n)).collect();
        // inboxes[dest][src] pairs with outboxes[src][dest]
        for dest_inbox in inboxes.iter_mut() {
            for src_outbox in outboxes.iter_mut() {
                let (tx, rx) = unbounded();
                src_outbox.push(tx);
                dest_inbox.push(rx);
            }
        }
        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| LocalComm {
                rank,
                size: n,
                outboxes,
                inboxes,
                stash: RefCell::new((0..n).map(|_| VecDeque::new()).collect()),
                abort: Arc::clone(&abort),
            })
            .collect()
    }

    /// Run `body` once per rank, each on its own thread, and collect the
    /// per-rank results in rank order. A rank that fails with a primary
    /// error raises the abort flag so its peers stop at their next
    /// blocking call.
    pub fn run<T, F>(&self, body: F) -> Vec<KeffResult<T>>
    where
        T: Send,
        F: Fn(&LocalComm) -> KeffResult<T> + Sync,
    {
        let endpoints = self.endpoints();
        std::thread::scope(|scope| {
            let body = &body;
            let mut handles = Vec::with_capacity(endpoints.len());
            for comm in endpoints {
                let rank = comm.rank;
                let abort = Arc::clone(&comm.abort);
                let spawned = std::thread::Builder::new()
                    .name(format!("rank-{rank}"))
                    .spawn_scoped(scope, move || {
                        let _guard = PanicGuard {
                            rank,
                            abort: &comm.abort,
                        };
                        let result = body(&comm);
                        if let Err(e) = &result {
                            if !e.is_secondary_abort() {
                                comm.abort(&e.to_string());
                            }
                        }
                        result
                    });
                if let Err(e) = &spawned {
                    abort.raise(rank, &format!("failed to spawn rank thread: {e}"));
                }
                handles.push(spawned);
            }
            handles
                .into_iter()
                .enumerate()
                .map(|(rank, spawned)| match spawned {
                    Ok(handle) => handle.join().unwrap_or_else(|_| {
                        Err(KeffError::Communication {
                            rank,
                            message: "rank thread panicked".to_string(),
                        })
                    }),
                    Err(e) => Err(KeffError::Io(e)),
                })
                .collect()
        })
    }
}
