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

//! Operation dispatch: per-kind candidate lists and a first-enabled
//! selector.

pub mod base_ops;
pub mod collective_ops;

pub use base_ops::{AllgatherImpl, AllreduceImpl, BroadcastImpl};
pub use collective_ops::{AllgatherOp, AllreduceOp, BroadcastOp, HierarchicalAllgatherOp};

use std::sync::Arc;

use crate::coordination::ReadyResponse;
use crate::ctx::GlobalState;
use crate::data_types::DataType;
use crate::error::{StampedeError, StampedeResult};
use crate::net::CommContext;
use crate::tensor::TensorEntry;

/// Candidate implementations for every collective kind, in preference
/// order.
///
/// `execute_*` runs the first candidate whose predicate accepts the batch.
/// The predicates are pure functions of the shared tuning configuration, so
/// every rank selects the same variant. That is a requirement: the selected
/// variant determines which collectives get entered and in what order.
pub struct OperationManager {
    state: Arc<GlobalState>,
    allreduce_ops: Vec<Box<dyn AllreduceImpl>>,
    allgather_ops: Vec<Box<dyn AllgatherImpl>>,
    broadcast_ops: Vec<Box<dyn BroadcastImpl>>,
}

impl OperationManager {
    /// Wire the standard candidates: the hierarchical allgather ahead of
    /// the plain one, single variants for the other kinds.
    pub fn new(comm: Arc<dyn CommContext>, state: Arc<GlobalState>) -> Self {
        Self {
            allreduce_ops: vec![Box::new(AllreduceOp::new(comm.clone(), state.clone()))],
            allgather_ops: vec![
                Box::new(HierarchicalAllgatherOp::new(comm.clone(), state.clone())),
                Box::new(AllgatherOp::new(comm.clone(), state.clone())),
            ],
            broadcast_ops: vec![Box::new(BroadcastOp::new(comm, state.clone()))],
            state,
        }
    }

    pub fn execute_allreduce(
        &self,
        entries: &[TensorEntry],
        response: &ReadyResponse,
        fused_input: Option<&[u8]>,
        buffer: &mut [u8],
        num_elements: i64,
    ) -> StampedeResult<()> {
        for op in &self.allreduce_ops {
            if op.enabled(&self.state.tuning, entries, response) {
                return op.do_allreduce(entries, fused_input, buffer, num_elements);
            }
        }
        Err(StampedeError::invalid(
            "no enabled allreduce implementation for this batch",
        ))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn execute_allgather(
        &self,
        entries: &[TensorEntry],
        response: &ReadyResponse,
        send_buf: Option<&[u8]>,
        send_count: i32,
        send_type: DataType,
        recv_buf: &mut [u8],
        recv_counts: &[i32],
        displacements: &[i32],
        recv_type: DataType,
    ) -> StampedeResult<()> {
        for op in &self.allgather_ops {
            if op.enabled(&self.state.tuning, entries, response) {
                return op.do_allgatherv(
                    entries,
                    send_buf,
                    send_count,
                    send_type,
                    recv_buf,
                    recv_counts,
                    displacements,
                    recv_type,
                );
            }
        }
        Err(StampedeError::invalid(
            "no enabled allgather implementation for this batch",
        ))
    }

    pub fn execute_broadcast(
        &self,
        entries: &[TensorEntry],
        response: &ReadyResponse,
        buffer: &mut [u8],
        num_elements: i64,
        dtype: DataType,
        root_rank: i32,
    ) -> StampedeResult<()> {
        for op in &self.broadcast_ops {
            if op.enabled(&self.state.tuning, entries, response) {
                return op.do_broadcast(entries, buffer, num_elements, dtype, root_rank);
            }
        }
        Err(StampedeError::invalid(
            "no enabled broadcast implementation for this batch",
        ))
    }
}
