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

//! Dispatcher contracts for the closed set of collective kinds.
//!
//! Each logical collective (allreduce, allgather, broadcast) has one or
//! more candidate implementations behind a per-kind trait. The selector
//! asks every candidate whether it is enabled for the batch about to run
//! and executes the first that accepts; the predicate is pure, so the
//! answer is identical on every rank for identical configuration.

use crate::coordination::ReadyResponse;
use crate::data_types::DataType;
use crate::error::StampedeResult;
use crate::tensor::TensorEntry;
use crate::tuning::TuningParams;

/// A candidate implementation of the allreduce collective.
pub trait AllreduceImpl: Send + Sync {
    /// Pure predicate: may this variant run the given batch under the
    /// current tuning configuration?
    fn enabled(
        &self,
        tuning: &TuningParams,
        entries: &[TensorEntry],
        response: &ReadyResponse,
    ) -> bool;

    /// Sum-reduce the fused buffer across the cluster, in place.
    ///
    /// `fused_input` is the staged input region for backends that reduce
    /// out of a separate staging buffer; the plain path derives its send
    /// buffer from the entries instead.
    fn do_allreduce(
        &self,
        entries: &[TensorEntry],
        fused_input: Option<&[u8]>,
        buffer: &mut [u8],
        num_elements: i64,
    ) -> StampedeResult<()>;
}

/// A candidate implementation of the allgather collective.
pub trait AllgatherImpl: Send + Sync {
    fn enabled(
        &self,
        tuning: &TuningParams,
        entries: &[TensorEntry],
        response: &ReadyResponse,
    ) -> bool;

    /// Gather per-rank contributions into `recv_buf` at the caller-supplied
    /// displacements, computed from true tensor sizes by the batching
    /// layer.
    #[allow(clippy::too_many_arguments)]
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
    ) -> StampedeResult<()>;
}

/// A candidate implementation of the broadcast collective.
pub trait BroadcastImpl: Send + Sync {
    fn enabled(
        &self,
        tuning: &TuningParams,
        entries: &[TensorEntry],
        response: &ReadyResponse,
    ) -> bool;

    /// Replicate `buffer` from `root_rank` to every participant.
    fn do_broadcast(
        &self,
        entries: &[TensorEntry],
        buffer: &mut [u8],
        num_elements: i64,
        dtype: DataType,
        root_rank: i32,
    ) -> StampedeResult<()>;
}
