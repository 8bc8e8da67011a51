// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! In-process simulated cluster shared by the integration tests.
//!
//! Each simulated rank runs on its own thread and talks to the others
//! through per-scope slot tables, with `std::sync::Barrier` standing in for
//! the backend's synchronization. Collectives follow a deposit / wait /
//! read / wait cadence, so a fast rank can never overwrite a slot before a
//! slow rank has read the previous round.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Barrier, Mutex};

use stampede::data_types::DataType;
use stampede::error::{StampedeError, StampedeResult};
use stampede::net::{CommContext, CommScope};
use stampede::tensor::TensorEntry;
use stampede::timeline::{Activity, Timeline};
use stampede::util::float16;

/// One backend call observed by a simulated rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Allreduce(CommScope),
    Allgatherv(CommScope),
    Broadcast(CommScope),
    Barrier(CommScope),
}

/// Element width the simulated backend reports for a type.
pub fn sim_type_size(dtype: DataType) -> StampedeResult<i32> {
    Ok(match dtype {
        DataType::UInt8 | DataType::Int8 | DataType::Bool | DataType::Byte => 1,
        DataType::UInt16 | DataType::Int16 | DataType::Float16 => 2,
        DataType::UInt32 | DataType::Int32 | DataType::Float32 => 4,
        DataType::UInt64 | DataType::Int64 | DataType::Float64 => 8,
        DataType::Null => return Err(StampedeError::UnsupportedType(dtype.name().to_string())),
    })
}

/// Elementwise summation of `src` into `acc` for the simulated allreduce.
fn sum_typed(dtype: DataType, acc: &mut [u8], src: &[u8]) -> StampedeResult<()> {
    macro_rules! sum_as {
        ($t:ty) => {{
            const W: usize = std::mem::size_of::<$t>();
            for (a, s) in acc.chunks_exact_mut(W).zip(src.chunks_exact(W)) {
                let mut bytes = [0u8; W];
                bytes.copy_from_slice(a);
                let lhs = <$t>::from_ne_bytes(bytes);
                bytes.copy_from_slice(s);
                let rhs = <$t>::from_ne_bytes(bytes);
                a.copy_from_slice(&(lhs.wrapping_add(rhs)).to_ne_bytes());
            }
        }};
    }
    macro_rules! sum_as_float {
        ($t:ty) => {{
            const W: usize = std::mem::size_of::<$t>();
            for (a, s) in acc.chunks_exact_mut(W).zip(src.chunks_exact(W)) {
                let mut bytes = [0u8; W];
                bytes.copy_from_slice(a);
                let lhs = <$t>::from_ne_bytes(bytes);
                bytes.copy_from_slice(s);
                let rhs = <$t>::from_ne_bytes(bytes);
                a.copy_from_slice(&(lhs + rhs).to_ne_bytes());
            }
        }};
    }
    match dtype {
        DataType::UInt8 | DataType::Byte | DataType::Bool => sum_as!(u8),
        DataType::Int8 => sum_as!(i8),
        DataType::UInt16 => sum_as!(u16),
        DataType::Int16 => sum_as!(i16),
        DataType::UInt32 => sum_as!(u32),
        DataType::Int32 => sum_as!(i32),
        DataType::UInt64 => sum_as!(u64),
        DataType::Int64 => sum_as!(i64),
        DataType::Float32 => sum_as_float!(f32),
        DataType::Float64 => sum_as_float!(f64),
        DataType::Float16 => {
            let mut acc16: Vec<u16> = acc
                .chunks_exact(2)
                .map(|c| u16::from_ne_bytes([c[0], c[1]]))
                .collect();
            let src16: Vec<u16> = src
                .chunks_exact(2)
                .map(|c| u16::from_ne_bytes([c[0], c[1]]))
                .collect();
            float16::sum_into(&src16, &mut acc16);
            for (a, v) in acc.chunks_exact_mut(2).zip(&acc16) {
                a.copy_from_slice(&v.to_ne_bytes());
            }
        }
        DataType::Null => return Err(StampedeError::UnsupportedType(dtype.name().to_string())),
    }
    Ok(())
}

/// One synchronization group: all ranks of one scope instance.
struct Group {
    members: Vec<i32>,
    barrier: Barrier,
    slots: Mutex<BTreeMap<i32, Vec<u8>>>,
}

impl Group {
    fn new(members: Vec<i32>) -> Arc<Self> {
        Arc::new(Self {
            barrier: Barrier::new(members.len()),
            slots: Mutex::new(BTreeMap::new()),
            members,
        })
    }

    fn index_of(&self, rank: i32) -> usize {
        self.members
            .iter()
            .position(|&m| m == rank)
            .expect("rank not in group")
    }
}

/// Node-local shared window backing allocate/query/free.
struct Arena {
    buf: Vec<u8>,
    // global rank -> byte offset, in local-rank order
    offsets: BTreeMap<i32, usize>,
}

struct NodeShared {
    sizes: Mutex<BTreeMap<i32, usize>>,
    arena: Mutex<Option<Arena>>,
}

/// Shared state for one simulated cluster, laid out node-major: node 0
/// holds global ranks `0..node_sizes[0]`, and so on.
pub struct SimCluster {
    node_sizes: Vec<usize>,
    global: Arc<Group>,
    locals: Vec<Arc<Group>>,
    crosses: Vec<Arc<Group>>,
    nodes: Vec<Arc<NodeShared>>,
}

impl SimCluster {
    pub fn new(node_sizes: &[usize]) -> Arc<Self> {
        let mut rank = 0;
        let mut locals = Vec::new();
        let mut by_local_rank: BTreeMap<usize, Vec<i32>> = BTreeMap::new();
        let mut all = Vec::new();
        for &n in node_sizes {
            let mut node_members = Vec::new();
            for local in 0..n {
                node_members.push(rank);
                by_local_rank.entry(local).or_default().push(rank);
                all.push(rank);
                rank += 1;
            }
            locals.push(Group::new(node_members));
        }
        let crosses = by_local_rank.into_values().map(Group::new).collect();
        Arc::new(Self {
            node_sizes: node_sizes.to_vec(),
            global: Group::new(all),
            locals,
            crosses,
            nodes: node_sizes
                .iter()
                .map(|_| {
                    Arc::new(NodeShared {
                        sizes: Mutex::new(BTreeMap::new()),
                        arena: Mutex::new(None),
                    })
                })
                .collect(),
        })
    }

    pub fn size(&self) -> usize {
        self.node_sizes.iter().sum()
    }

    /// Backend context for one global rank.
    pub fn context(self: &Arc<Self>, rank: i32) -> Arc<SimContext> {
        let mut node = 0;
        let mut local_rank = rank;
        while local_rank >= self.node_sizes[node] as i32 {
            local_rank -= self.node_sizes[node] as i32;
            node += 1;
        }
        Arc::new(SimContext {
            cluster: self.clone(),
            rank,
            node,
            local_rank,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Run `f` once per rank, each on its own thread. Panics in any rank
    /// (failed assertions included) propagate when the scope joins.
    pub fn run(node_sizes: &[usize], f: impl Fn(Arc<SimContext>) + Send + Sync) {
        let cluster = Self::new(node_sizes);
        std::thread::scope(|s| {
            for rank in 0..cluster.size() as i32 {
                let ctx = cluster.context(rank);
                let f = &f;
                s.spawn(move || f(ctx));
            }
        });
    }
}

/// Per-rank view of a [`SimCluster`], recording every backend call.
pub struct SimContext {
    cluster: Arc<SimCluster>,
    pub rank: i32,
    pub node: usize,
    pub local_rank: i32,
    calls: Mutex<Vec<Call>>,
}

impl SimContext {
    fn group(&self, scope: CommScope) -> Arc<Group> {
        match scope {
            CommScope::Global => self.cluster.global.clone(),
            CommScope::Local => self.cluster.locals[self.node].clone(),
            CommScope::Cross => self.cluster.crosses[self.local_rank as usize].clone(),
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    /// Drain the calls recorded so far.
    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

impl CommContext for SimContext {
    fn rank(&self, scope: CommScope) -> StampedeResult<i32> {
        Ok(self.group(scope).index_of(self.rank) as i32)
    }

    fn size(&self, scope: CommScope) -> StampedeResult<i32> {
        Ok(self.group(scope).members.len() as i32)
    }

    fn type_size(&self, dtype: DataType) -> StampedeResult<i32> {
        sim_type_size(dtype)
    }

    fn allreduce(
        &self,
        buffer: &mut [u8],
        num_elements: i64,
        entry: &TensorEntry,
        send_buf: Option<&[u8]>,
        scope: CommScope,
    ) -> StampedeResult<()> {
        self.record(Call::Allreduce(scope));
        let width = sim_type_size(entry.dtype)? as usize;
        let nbytes = num_elements as usize * width;
        let group = self.group(scope);
        let contribution = match send_buf {
            Some(b) => b[..nbytes].to_vec(),
            None => buffer[..nbytes].to_vec(),
        };
        group.slots.lock().unwrap().insert(self.rank, contribution);
        group.barrier.wait();
        {
            let slots = group.slots.lock().unwrap();
            buffer[..nbytes].fill(0);
            for member in &group.members {
                sum_typed(entry.dtype, &mut buffer[..nbytes], &slots[member])?;
            }
        }
        group.barrier.wait();
        Ok(())
    }

    fn allgatherv(
        &self,
        send_buf: Option<&[u8]>,
        send_count: i32,
        send_type: DataType,
        recv_buf: &mut [u8],
        recv_counts: &[i32],
        displacements: &[i32],
        recv_type: DataType,
        scope: CommScope,
    ) -> StampedeResult<()> {
        self.record(Call::Allgatherv(scope));
        let send_width = sim_type_size(send_type)? as usize;
        let recv_width = sim_type_size(recv_type)? as usize;
        let group = self.group(scope);
        let my_index = group.index_of(self.rank);
        let contribution = match send_buf {
            Some(b) => b[..send_count as usize * send_width].to_vec(),
            None => {
                // In place: this rank's slice of the receive buffer already
                // holds its contribution.
                let offset = displacements[my_index] as usize * recv_width;
                recv_buf[offset..offset + recv_counts[my_index] as usize * recv_width].to_vec()
            }
        };
        group.slots.lock().unwrap().insert(self.rank, contribution);
        group.barrier.wait();
        {
            let slots = group.slots.lock().unwrap();
            for (i, member) in group.members.iter().enumerate() {
                let chunk = &slots[member];
                let offset = displacements[i] as usize * recv_width;
                recv_buf[offset..offset + chunk.len()].copy_from_slice(chunk);
            }
        }
        group.barrier.wait();
        Ok(())
    }

    fn broadcast(
        &self,
        buffer: &mut [u8],
        num_elements: i64,
        dtype: DataType,
        root_rank: i32,
        scope: CommScope,
    ) -> StampedeResult<()> {
        self.record(Call::Broadcast(scope));
        let group = self.group(scope);
        // Every rank validates before touching the barrier, so an invalid
        // root fails everywhere without deadlocking the group.
        if root_rank < 0 || root_rank >= group.members.len() as i32 {
            return Err(StampedeError::invalid(format!(
                "broadcast root {} out of range for {} scope of {} ranks",
                root_rank,
                scope.name(),
                group.members.len()
            )));
        }
        let width = sim_type_size(dtype)? as usize;
        let nbytes = num_elements as usize * width;
        if group.index_of(self.rank) as i32 == root_rank {
            group
                .slots
                .lock()
                .unwrap()
                .insert(self.rank, buffer[..nbytes].to_vec());
        }
        group.barrier.wait();
        {
            let slots = group.slots.lock().unwrap();
            let root_global = group.members[root_rank as usize];
            buffer[..nbytes].copy_from_slice(&slots[&root_global]);
        }
        group.barrier.wait();
        Ok(())
    }

    fn barrier(&self, scope: CommScope) -> StampedeResult<()> {
        self.record(Call::Barrier(scope));
        self.group(scope).barrier.wait();
        Ok(())
    }

    fn allocate_shared(
        &self,
        window_size: i64,
        _element_size: i32,
        scope: CommScope,
    ) -> StampedeResult<*mut u8> {
        if scope != CommScope::Local {
            return Err(StampedeError::UnsupportedScope(scope.name().to_string()));
        }
        let node = &self.cluster.nodes[self.node];
        if node.arena.lock().unwrap().is_some() {
            return Err(StampedeError::invalid("shared window already allocated"));
        }
        let group = self.group(CommScope::Local);
        node.sizes
            .lock()
            .unwrap()
            .insert(self.rank, window_size as usize);
        group.barrier.wait();
        if self.local_rank == 0 {
            let sizes = node.sizes.lock().unwrap();
            let mut offsets = BTreeMap::new();
            let mut total = 0;
            for (&rank, &size) in sizes.iter() {
                offsets.insert(rank, total);
                total += size;
            }
            *node.arena.lock().unwrap() = Some(Arena {
                buf: vec![0; total.max(1)],
                offsets,
            });
        }
        group.barrier.wait();
        let arena = node.arena.lock().unwrap();
        let arena = arena.as_ref().expect("arena built by local leader");
        Ok(unsafe { arena.buf.as_ptr().add(arena.offsets[&self.rank]) as *mut u8 })
    }

    fn query_shared(&self, rank: i32) -> StampedeResult<*mut u8> {
        let node = &self.cluster.nodes[self.node];
        let arena = node.arena.lock().unwrap();
        let arena = arena
            .as_ref()
            .ok_or_else(|| StampedeError::invalid("no shared window allocated"))?;
        let group = self.group(CommScope::Local);
        let global = *group
            .members
            .get(rank as usize)
            .ok_or_else(|| StampedeError::invalid(format!("local rank {} out of range", rank)))?;
        Ok(unsafe { arena.buf.as_ptr().add(arena.offsets[&global]) as *mut u8 })
    }

    fn free_shared(&self) -> StampedeResult<()> {
        let node = &self.cluster.nodes[self.node];
        if node.arena.lock().unwrap().is_none() {
            return Err(StampedeError::invalid("no shared window allocated"));
        }
        let group = self.group(CommScope::Local);
        // The fence: nobody frees until every local participant arrives.
        group.barrier.wait();
        if self.local_rank == 0 {
            *node.arena.lock().unwrap() = None;
            node.sizes.lock().unwrap().clear();
        }
        group.barrier.wait();
        Ok(())
    }
}

/// Backend double that fails every primitive, counting attempts per
/// operation so tests can assert there is no retry.
#[derive(Default)]
pub struct FaultyContext {
    attempts: Mutex<BTreeMap<&'static str, u32>>,
}

impl FaultyContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attempts(&self, op: &str) -> u32 {
        self.attempts.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    fn fail(&self, op: &'static str) -> StampedeError {
        *self.attempts.lock().unwrap().entry(op).or_insert(0) += 1;
        StampedeError::backend(op, "injected failure")
    }
}

impl CommContext for FaultyContext {
    fn rank(&self, _scope: CommScope) -> StampedeResult<i32> {
        Ok(0)
    }

    fn size(&self, _scope: CommScope) -> StampedeResult<i32> {
        Ok(1)
    }

    fn type_size(&self, dtype: DataType) -> StampedeResult<i32> {
        sim_type_size(dtype)
    }

    fn allreduce(
        &self,
        _buffer: &mut [u8],
        _num_elements: i64,
        _entry: &TensorEntry,
        _send_buf: Option<&[u8]>,
        _scope: CommScope,
    ) -> StampedeResult<()> {
        Err(self.fail("allreduce"))
    }

    fn allgatherv(
        &self,
        _send_buf: Option<&[u8]>,
        _send_count: i32,
        _send_type: DataType,
        _recv_buf: &mut [u8],
        _recv_counts: &[i32],
        _displacements: &[i32],
        _recv_type: DataType,
        _scope: CommScope,
    ) -> StampedeResult<()> {
        Err(self.fail("allgatherv"))
    }

    fn broadcast(
        &self,
        _buffer: &mut [u8],
        _num_elements: i64,
        _dtype: DataType,
        _root_rank: i32,
        _scope: CommScope,
    ) -> StampedeResult<()> {
        Err(self.fail("broadcast"))
    }

    fn barrier(&self, _scope: CommScope) -> StampedeResult<()> {
        Err(self.fail("barrier"))
    }

    fn allocate_shared(
        &self,
        _window_size: i64,
        _element_size: i32,
        _scope: CommScope,
    ) -> StampedeResult<*mut u8> {
        Err(self.fail("allocate_shared"))
    }

    fn query_shared(&self, _rank: i32) -> StampedeResult<*mut u8> {
        Err(self.fail("query_shared"))
    }

    fn free_shared(&self) -> StampedeResult<()> {
        Err(self.fail("free_shared"))
    }
}

/// Timeline sink that records events in order for assertions.
#[derive(Default)]
pub struct RecordingTimeline {
    events: Mutex<Vec<String>>,
}

impl RecordingTimeline {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl Timeline for RecordingTimeline {
    fn activity_start_all(&self, entries: &[TensorEntry], activity: Activity) {
        let mut events = self.events.lock().unwrap();
        for entry in entries {
            events.push(format!("start {} [{}]", activity.name(), entry.name));
        }
    }

    fn activity_end_all(&self, entries: &[TensorEntry]) {
        let mut events = self.events.lock().unwrap();
        for entry in entries {
            events.push(format!("end [{}]", entry.name));
        }
    }
}

/// Entry whose buffers are not consulted (allgather/broadcast paths).
pub fn meta_entry(name: &str, dtype: DataType) -> TensorEntry {
    TensorEntry::new(name, dtype, std::ptr::null(), std::ptr::null(), 0)
}
