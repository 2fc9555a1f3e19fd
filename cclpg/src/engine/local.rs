//! In-process engine. Every simulated rank lives in the same process and
//! talks through one shared [`LocalFabric`].
//!
//! Communicators are matched across ranks by creation order, and collective
//! calls by their sequence number on the communicator, so every rank must
//! create communicators and issue collectives in the same order (the same
//! contract a real engine imposes). Submission copies the send side;
//! the receive side is written when a rank observes completion through
//! [`Request::test`] or [`Request::wait`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use super::reduce::reduce_bytes;
use super::{
    Communicator, EngineDatatype, EngineError, EngineReduction, EngineResult, Environment,
    RecvBuffer, Request,
};
use crate::tensor::Tensor;
use crate::types::Rank;

/// Shared rendezvous point for all ranks of one simulated job.
pub struct LocalFabric {
    world_size: usize,
    state: Mutex<FabricState>,
    progress: Condvar,
}

#[derive(Default)]
struct FabricState {
    slots: HashMap<SlotKey, Slot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SlotKey {
    comm: usize,
    seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Bcast { root: Rank },
    Allreduce { op: EngineReduction },
    Reduce { op: EngineReduction, root: Rank },
    Allgatherv,
    Alltoall { count: usize },
    Alltoallv,
    Barrier,
}

struct Contribution {
    op: Op,
    dtype: Option<EngineDatatype>,
    send: Vec<u8>,
    send_counts: Vec<usize>,
}

struct Slot {
    contributions: Vec<Option<Contribution>>,
    arrived: usize,
    consumed: usize,
    failure: Option<String>,
}

impl Slot {
    fn new(world_size: usize) -> Self {
        Self {
            contributions: (0..world_size).map(|_| None).collect(),
            arrived: 0,
            consumed: 0,
            failure: None,
        }
    }
}

impl LocalFabric {
    pub fn new(world_size: usize) -> Arc<Self> {
        Arc::new(Self {
            world_size,
            state: Mutex::new(FabricState::default()),
            progress: Condvar::new(),
        })
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// The engine environment as seen by `rank`.
    pub fn environment(self: &Arc<Self>, rank: Rank) -> EngineResult<LocalEnvironment> {
        if rank >= self.world_size {
            return Err(EngineError::new(format!(
                "rank {rank} outside local fabric of size {}",
                self.world_size
            )));
        }
        Ok(LocalEnvironment {
            fabric: Arc::clone(self),
            rank,
            next_comm: AtomicUsize::new(0),
        })
    }

    /// Number of collectives some rank has posted but not every rank has consumed.
    pub fn pending_collectives(&self) -> EngineResult<usize> {
        Ok(self.lock()?.slots.len())
    }

    fn lock(&self) -> EngineResult<MutexGuard<'_, FabricState>> {
        self.state
            .lock()
            .map_err(|_| EngineError::new("local fabric lock poisoned"))
    }

    fn post(&self, key: SlotKey, rank: Rank, contribution: Contribution) -> EngineResult<()> {
        let mut state = self.lock()?;
        let slot = state
            .slots
            .entry(key)
            .or_insert_with(|| Slot::new(self.world_size));
        if let Some(msg) = &slot.failure {
            return Err(EngineError::new(msg.clone()));
        }
        if slot.contributions[rank].is_some() {
            return Err(EngineError::new(format!(
                "rank {rank} posted call {} on communicator {} twice",
                key.seq, key.comm
            )));
        }
        let mismatch = slot
            .contributions
            .iter()
            .enumerate()
            .find_map(|(r, c)| c.as_ref().map(|c| (r, c)))
            .filter(|(_, c)| c.op != contribution.op || c.dtype != contribution.dtype)
            .map(|(r, c)| {
                format!(
                    "collective mismatch on communicator {} call {}: rank {rank} posted {:?}/{:?}, rank {r} posted {:?}/{:?}",
                    key.comm, key.seq, contribution.op, contribution.dtype, c.op, c.dtype
                )
            });
        if let Some(msg) = mismatch {
            slot.failure = Some(msg.clone());
            self.progress.notify_all();
            return Err(EngineError::new(msg));
        }
        slot.contributions[rank] = Some(contribution);
        slot.arrived += 1;
        if slot.arrived == self.world_size {
            self.progress.notify_all();
        }
        Ok(())
    }
}

/// Engine environment of one simulated rank.
pub struct LocalEnvironment {
    fabric: Arc<LocalFabric>,
    rank: Rank,
    next_comm: AtomicUsize,
}

impl LocalEnvironment {
    pub fn rank(&self) -> Rank {
        self.rank
    }
}

impl Environment for LocalEnvironment {
    fn create_communicator(&self) -> EngineResult<Arc<dyn Communicator>> {
        let comm = self.next_comm.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(rank = self.rank, comm, "local engine: communicator created");
        Ok(Arc::new(LocalCommunicator {
            fabric: Arc::clone(&self.fabric),
            rank: self.rank,
            comm,
            next_seq: AtomicU64::new(0),
        }))
    }
}

struct LocalCommunicator {
    fabric: Arc<LocalFabric>,
    rank: Rank,
    comm: usize,
    next_seq: AtomicU64,
}

enum RecvTarget {
    Nothing,
    Flat(Tensor),
    Vector(Vec<Tensor>),
}

impl LocalCommunicator {
    fn submit(
        &self,
        contribution: Contribution,
        target: RecvTarget,
        recv_counts: Vec<usize>,
    ) -> EngineResult<LocalRequest> {
        let key = SlotKey {
            comm: self.comm,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        self.fabric.post(key, self.rank, contribution)?;
        Ok(LocalRequest {
            fabric: Arc::clone(&self.fabric),
            key,
            rank: self.rank,
            target,
            recv_counts,
            done: false,
        })
    }

    fn check_root(&self, root: Rank) -> EngineResult<()> {
        if root >= self.fabric.world_size {
            return Err(EngineError::new(format!(
                "root {root} outside communicator of size {}",
                self.fabric.world_size
            )));
        }
        Ok(())
    }

    fn check_len(&self, what: &str, len: usize) -> EngineResult<()> {
        if len != self.fabric.world_size {
            return Err(EngineError::new(format!(
                "{what} has {len} entries, communicator size is {}",
                self.fabric.world_size
            )));
        }
        Ok(())
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.fabric.world_size
    }

    fn bcast(
        &self,
        buf: &Tensor,
        count: usize,
        dtype: EngineDatatype,
        root: Rank,
    ) -> EngineResult<Box<dyn Request>> {
        self.check_root(root)?;
        let send = if self.rank == root {
            buf.read_raw(count)?
        } else {
            Vec::new()
        };
        let contribution = Contribution {
            op: Op::Bcast { root },
            dtype: Some(dtype),
            send,
            send_counts: Vec::new(),
        };
        Ok(Box::new(self.submit(
            contribution,
            RecvTarget::Flat(buf.clone()),
            vec![count],
        )?))
    }

    fn allreduce(
        &self,
        send: &Tensor,
        recv: &Tensor,
        count: usize,
        dtype: EngineDatatype,
        op: EngineReduction,
    ) -> EngineResult<Box<dyn Request>> {
        let contribution = Contribution {
            op: Op::Allreduce { op },
            dtype: Some(dtype),
            send: send.read_raw(count)?,
            send_counts: Vec::new(),
        };
        Ok(Box::new(self.submit(
            contribution,
            RecvTarget::Flat(recv.clone()),
            vec![count],
        )?))
    }

    fn reduce(
        &self,
        send: &Tensor,
        recv: &Tensor,
        count: usize,
        dtype: EngineDatatype,
        op: EngineReduction,
        root: Rank,
    ) -> EngineResult<Box<dyn Request>> {
        self.check_root(root)?;
        let contribution = Contribution {
            op: Op::Reduce { op, root },
            dtype: Some(dtype),
            send: send.read_raw(count)?,
            send_counts: Vec::new(),
        };
        Ok(Box::new(self.submit(
            contribution,
            RecvTarget::Flat(recv.clone()),
            vec![count],
        )?))
    }

    fn allgatherv(
        &self,
        send: &Tensor,
        send_count: usize,
        recv: RecvBuffer<'_>,
        recv_counts: &[usize],
        dtype: EngineDatatype,
    ) -> EngineResult<Box<dyn Request>> {
        self.check_len("recv_counts", recv_counts.len())?;
        let target = match recv {
            RecvBuffer::Contiguous(t) => RecvTarget::Flat(t.clone()),
            RecvBuffer::Vector(ts) => {
                self.check_len("receive buffer vector", ts.len())?;
                RecvTarget::Vector(ts.to_vec())
            }
        };
        let contribution = Contribution {
            op: Op::Allgatherv,
            dtype: Some(dtype),
            send: send.read_raw(send_count)?,
            send_counts: Vec::new(),
        };
        Ok(Box::new(self.submit(
            contribution,
            target,
            recv_counts.to_vec(),
        )?))
    }

    fn alltoall(
        &self,
        send: &Tensor,
        recv: &Tensor,
        count: usize,
        dtype: EngineDatatype,
    ) -> EngineResult<Box<dyn Request>> {
        let world = self.fabric.world_size;
        let contribution = Contribution {
            op: Op::Alltoall { count },
            dtype: Some(dtype),
            send: send.read_raw(count * world)?,
            send_counts: Vec::new(),
        };
        Ok(Box::new(self.submit(
            contribution,
            RecvTarget::Flat(recv.clone()),
            vec![count; world],
        )?))
    }

    fn alltoallv(
        &self,
        send: &Tensor,
        send_counts: &[usize],
        recv: &Tensor,
        recv_counts: &[usize],
        dtype: EngineDatatype,
    ) -> EngineResult<Box<dyn Request>> {
        self.check_len("send_counts", send_counts.len())?;
        self.check_len("recv_counts", recv_counts.len())?;
        let total: usize = send_counts.iter().sum();
        let contribution = Contribution {
            op: Op::Alltoallv,
            dtype: Some(dtype),
            send: send.read_raw(total)?,
            send_counts: send_counts.to_vec(),
        };
        Ok(Box::new(self.submit(
            contribution,
            RecvTarget::Flat(recv.clone()),
            recv_counts.to_vec(),
        )?))
    }

    fn barrier(&self) -> EngineResult<()> {
        let contribution = Contribution {
            op: Op::Barrier,
            dtype: None,
            send: Vec::new(),
            send_counts: Vec::new(),
        };
        let mut req = self.submit(contribution, RecvTarget::Nothing, Vec::new())?;
        req.wait()
    }
}

struct LocalRequest {
    fabric: Arc<LocalFabric>,
    key: SlotKey,
    rank: Rank,
    target: RecvTarget,
    /// Elements expected from each rank, or the single element count for
    /// rooted and reducing collectives.
    recv_counts: Vec<usize>,
    done: bool,
}

impl LocalRequest {
    fn write_flat(&self, elem_offset: usize, bytes: &[u8]) -> EngineResult<()> {
        match &self.target {
            RecvTarget::Flat(t) => Ok(t.write_raw(elem_offset, bytes)?),
            RecvTarget::Vector(_) | RecvTarget::Nothing => Ok(()),
        }
    }

    /// Compute and write this rank's receive side from every contribution.
    fn deliver(&self, slot: &Slot) -> EngineResult<()> {
        let contribs = slot
            .contributions
            .iter()
            .map(|c| {
                c.as_ref()
                    .ok_or_else(|| EngineError::new("delivery before every rank arrived"))
            })
            .collect::<EngineResult<Vec<_>>>()?;
        let mine = contribs[self.rank];
        let Some(dtype) = mine.dtype else {
            return Ok(());
        };
        let esz = dtype.size_in_bytes();

        match mine.op {
            Op::Barrier => Ok(()),
            Op::Bcast { root } => self.write_flat(0, &contribs[root].send),
            Op::Allreduce { op } => self.write_flat(0, &reduce_all(&contribs, dtype, op)?),
            Op::Reduce { op, root } => {
                if self.rank == root {
                    self.write_flat(0, &reduce_all(&contribs, dtype, op)?)
                } else {
                    Ok(())
                }
            }
            Op::Allgatherv => {
                for (r, c) in contribs.iter().enumerate() {
                    if c.send.len() != self.recv_counts[r] * esz {
                        return Err(EngineError::new(format!(
                            "allgatherv: rank {r} sent {} elements, rank {} expects {}",
                            c.send.len() / esz,
                            self.rank,
                            self.recv_counts[r]
                        )));
                    }
                }
                match &self.target {
                    RecvTarget::Flat(t) => {
                        let mut offset = 0;
                        for (r, c) in contribs.iter().enumerate() {
                            t.write_raw(offset, &c.send)?;
                            offset += self.recv_counts[r];
                        }
                    }
                    RecvTarget::Vector(ts) => {
                        for (t, c) in ts.iter().zip(&contribs) {
                            t.write_raw(0, &c.send)?;
                        }
                    }
                    RecvTarget::Nothing => {}
                }
                Ok(())
            }
            Op::Alltoall { count } => {
                let chunk = count * esz;
                for (r, c) in contribs.iter().enumerate() {
                    let part = c
                        .send
                        .get(self.rank * chunk..(self.rank + 1) * chunk)
                        .ok_or_else(|| {
                            EngineError::new(format!("alltoall: rank {r} sent a short buffer"))
                        })?;
                    self.write_flat(r * count, part)?;
                }
                Ok(())
            }
            Op::Alltoallv => {
                let mut offset = 0;
                for (r, c) in contribs.iter().enumerate() {
                    let start: usize = c.send_counts[..self.rank].iter().sum();
                    let len = c.send_counts[self.rank];
                    if len != self.recv_counts[r] {
                        return Err(EngineError::new(format!(
                            "alltoallv: rank {r} sends {len} elements to rank {}, which expects {}",
                            self.rank, self.recv_counts[r]
                        )));
                    }
                    self.write_flat(offset, &c.send[start * esz..(start + len) * esz])?;
                    offset += len;
                }
                Ok(())
            }
        }
    }

    fn finish(&mut self, state: &mut FabricState) {
        let world = self.fabric.world_size;
        if let Some(slot) = state.slots.get_mut(&self.key) {
            slot.consumed += 1;
            if slot.consumed == world {
                state.slots.remove(&self.key);
            }
        }
        self.done = true;
    }
}

fn reduce_all(
    contribs: &[&Contribution],
    dtype: EngineDatatype,
    op: EngineReduction,
) -> EngineResult<Vec<u8>> {
    let mut acc = contribs[0].send.clone();
    for c in &contribs[1..] {
        reduce_bytes(&mut acc, &c.send, dtype, op)?;
    }
    Ok(acc)
}

impl Request for LocalRequest {
    fn test(&mut self) -> EngineResult<bool> {
        if self.done {
            return Ok(true);
        }
        let fabric = Arc::clone(&self.fabric);
        let mut state = fabric.lock()?;
        let slot = state
            .slots
            .get(&self.key)
            .ok_or_else(|| EngineError::new("request refers to a released collective"))?;
        if let Some(msg) = &slot.failure {
            return Err(EngineError::new(msg.clone()));
        }
        if slot.arrived < fabric.world_size {
            return Ok(false);
        }
        self.deliver(slot)?;
        self.finish(&mut state);
        Ok(true)
    }

    fn wait(&mut self) -> EngineResult<()> {
        if self.done {
            return Ok(());
        }
        let fabric = Arc::clone(&self.fabric);
        let mut state = fabric.lock()?;
        loop {
            let slot = state
                .slots
                .get(&self.key)
                .ok_or_else(|| EngineError::new("request refers to a released collective"))?;
            if let Some(msg) = &slot.failure {
                return Err(EngineError::new(msg.clone()));
            }
            if slot.arrived == fabric.world_size {
                self.deliver(slot)?;
                break;
            }
            state = fabric
                .progress
                .wait(state)
                .map_err(|_| EngineError::new("local fabric lock poisoned"))?;
        }
        self.finish(&mut state);
        Ok(())
    }
}
