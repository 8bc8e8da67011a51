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

//! Backend-generic dispatchers for the four collective kinds.
//!
//! Every dispatcher wraps its backend primitive in timing instrumentation:
//! activity start is recorded against every entry before the primitive
//! runs, activity end only after it returns success. On a fatal backend
//! error the end record is skipped, since the run is terminating anyway.

use std::sync::Arc;

use crate::coordination::ReadyResponse;
use crate::ctx::GlobalState;
use crate::data_types::DataType;
use crate::error::{StampedeError, StampedeResult};
use crate::net::{CommContext, CommScope};
use crate::tensor::TensorEntry;
use crate::timeline::Activity;
use crate::tuning::TuningParams;

use super::base_ops::{AllgatherImpl, AllreduceImpl, BroadcastImpl};

/// Plain allreduce over the whole cluster. Always enabled.
pub struct AllreduceOp {
    comm: Arc<dyn CommContext>,
    state: Arc<GlobalState>,
}

impl AllreduceOp {
    pub fn new(comm: Arc<dyn CommContext>, state: Arc<GlobalState>) -> Self {
        Self { comm, state }
    }
}

impl AllreduceImpl for AllreduceOp {
    fn enabled(
        &self,
        _tuning: &TuningParams,
        _entries: &[TensorEntry],
        _response: &ReadyResponse,
    ) -> bool {
        true
    }

    fn do_allreduce(
        &self,
        entries: &[TensorEntry],
        _fused_input: Option<&[u8]>,
        buffer: &mut [u8],
        num_elements: i64,
    ) -> StampedeResult<()> {
        let first = entries
            .first()
            .ok_or_else(|| StampedeError::invalid("allreduce on an empty batch"))?;
        self.state
            .timeline
            .activity_start_all(entries, Activity::Allreduce);
        // With several fused entries, or a single entry whose input aliases
        // its output, the buffer already holds this rank's contribution.
        let send_buf = if entries.len() > 1 || first.is_in_place() {
            None
        } else {
            Some(unsafe { first.input_slice() })
        };
        self.comm
            .allreduce(buffer, num_elements, first, send_buf, CommScope::Global)?;
        self.state.timeline.activity_end_all(entries);
        Ok(())
    }
}

/// Plain allgather over the whole cluster. Always enabled.
pub struct AllgatherOp {
    comm: Arc<dyn CommContext>,
    state: Arc<GlobalState>,
}

impl AllgatherOp {
    pub fn new(comm: Arc<dyn CommContext>, state: Arc<GlobalState>) -> Self {
        Self { comm, state }
    }
}

impl AllgatherImpl for AllgatherOp {
    fn enabled(
        &self,
        _tuning: &TuningParams,
        _entries: &[TensorEntry],
        _response: &ReadyResponse,
    ) -> bool {
        true
    }

    fn do_allgatherv(
        &self,
        entries: &[TensorEntry],
        send_buf: Option<&[u8]>,
        send_count: i32,
        send_type: DataType,
        recv_buf: &mut [u8],
        recv_counts: &[i32],
        displacements: &[i32],
        recv_type: DataType,
    ) -> StampedeResult<()> {
        self.state
            .timeline
            .activity_start_all(entries, Activity::Allgather);
        self.comm.allgatherv(
            send_buf,
            send_count,
            send_type,
            recv_buf,
            recv_counts,
            displacements,
            recv_type,
            CommScope::Global,
        )?;
        self.state.timeline.activity_end_all(entries);
        Ok(())
    }
}

/// Two-phase allgather that keeps node-local data off the network.
///
/// The node-local phase runs through the shared window in the batching
/// layer; this op performs the cross-node exchange and the global
/// synchronization that publishes the gathered data to the ranks that sat
/// it out. Enabled only when the tuning configuration opts in.
pub struct HierarchicalAllgatherOp {
    comm: Arc<dyn CommContext>,
    state: Arc<GlobalState>,
}

impl HierarchicalAllgatherOp {
    pub fn new(comm: Arc<dyn CommContext>, state: Arc<GlobalState>) -> Self {
        Self { comm, state }
    }
}

impl AllgatherImpl for HierarchicalAllgatherOp {
    fn enabled(
        &self,
        tuning: &TuningParams,
        _entries: &[TensorEntry],
        _response: &ReadyResponse,
    ) -> bool {
        tuning.hierarchical_allgather()
    }

    fn do_allgatherv(
        &self,
        entries: &[TensorEntry],
        send_buf: Option<&[u8]>,
        send_count: i32,
        send_type: DataType,
        recv_buf: &mut [u8],
        recv_counts: &[i32],
        displacements: &[i32],
        recv_type: DataType,
    ) -> StampedeResult<()> {
        self.state
            .timeline
            .activity_start_all(entries, Activity::CrossAllgather);
        // In a homogeneous cluster every local rank drives its own
        // cross-node communicator; in a heterogeneous one local rank 0
        // carries the whole node. Either way exactly one rank per node
        // touches each cross communicator, so data placement stays
        // deterministic.
        if self.state.is_homogeneous || self.state.local_rank == 0 {
            self.comm.allgatherv(
                send_buf,
                send_count,
                send_type,
                recv_buf,
                recv_counts,
                displacements,
                recv_type,
                CommScope::Cross,
            )?;
        }
        // Every rank synchronizes, including those that skipped the
        // cross-node stage, before anyone reads the shared window.
        self.comm.barrier(CommScope::Global)?;
        self.state.timeline.activity_end_all(entries);
        Ok(())
    }
}

/// Broadcast from a root rank to the whole cluster. Always enabled.
pub struct BroadcastOp {
    comm: Arc<dyn CommContext>,
    state: Arc<GlobalState>,
}

impl BroadcastOp {
    pub fn new(comm: Arc<dyn CommContext>, state: Arc<GlobalState>) -> Self {
        Self { comm, state }
    }
}

impl BroadcastImpl for BroadcastOp {
    fn enabled(
        &self,
        _tuning: &TuningParams,
        _entries: &[TensorEntry],
        _response: &ReadyResponse,
    ) -> bool {
        true
    }

    fn do_broadcast(
        &self,
        entries: &[TensorEntry],
        buffer: &mut [u8],
        num_elements: i64,
        dtype: DataType,
        root_rank: i32,
    ) -> StampedeResult<()> {
        self.state
            .timeline
            .activity_start_all(entries, Activity::Broadcast);
        self.comm
            .broadcast(buffer, num_elements, dtype, root_rank, CommScope::Global)?;
        self.state.timeline.activity_end_all(entries);
        Ok(())
    }
}
