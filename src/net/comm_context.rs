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

//! The contract every collective-communication backend implements.

use crate::data_types::DataType;
use crate::error::StampedeResult;
use crate::tensor::TensorEntry;

use super::CommScope;

/// Backend context: resolved communicators, datatype mapping, and the
/// collective primitives.
///
/// Every call is synchronous and blocking: it returns once the backend
/// reports completion across the targeted scope, and any non-success status
/// surfaces as a fatal [`BackendFailure`](crate::StampedeError::BackendFailure)
/// carrying the primitive's name and the backend's own diagnostic text.
/// There is no cancellation at this layer; stall detection belongs to the
/// readiness coordinator, which decides whether to issue a collective, not
/// whether to abort one in flight.
///
/// Participants must enter collectives on one scope in the same relative
/// order on every rank. This layer never reorders calls; ordering is owned
/// by the batching layer above.
pub trait CommContext: Send + Sync {
    /// Rank of the calling process within `scope`.
    fn rank(&self, scope: CommScope) -> StampedeResult<i32>;

    /// Number of participants in `scope`.
    fn size(&self, scope: CommScope) -> StampedeResult<i32>;

    /// Serialized element size of `dtype` as the backend sees it. Callers
    /// use this to size buffers before entering the collective layer.
    fn type_size(&self, dtype: DataType) -> StampedeResult<i32>;

    /// Sum-reduce `num_elements` elements of the type carried by `entry`
    /// across `scope`, writing the result into `buffer`.
    ///
    /// A `None` send buffer requests an in-place reduction: the caller's
    /// input and output buffers alias and `buffer` already holds this
    /// rank's contribution. Otherwise the reduction reads from `send_buf`
    /// and writes into `buffer`.
    fn allreduce(
        &self,
        buffer: &mut [u8],
        num_elements: i64,
        entry: &TensorEntry,
        send_buf: Option<&[u8]>,
        scope: CommScope,
    ) -> StampedeResult<()>;

    /// Gather variable-length contributions from every member of `scope`
    /// into `recv_buf`, rank `i`'s bytes landing at element offset
    /// `displacements[i]` with length `recv_counts[i]` (both in elements of
    /// `recv_type`).
    ///
    /// A `None` send buffer means this rank's slice of `recv_buf` is
    /// already in place and must not be re-sent.
    #[allow(clippy::too_many_arguments)]
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
    ) -> StampedeResult<()>;

    /// Replicate `num_elements` elements of `dtype` from `root_rank`'s
    /// `buffer` into the same-named buffer on every other member of
    /// `scope`. An out-of-range root fails before any data moves.
    fn broadcast(
        &self,
        buffer: &mut [u8],
        num_elements: i64,
        dtype: DataType,
        root_rank: i32,
        scope: CommScope,
    ) -> StampedeResult<()>;

    /// Block until every member of `scope` has entered the barrier. Pure
    /// synchronization, no data movement.
    fn barrier(&self, scope: CommScope) -> StampedeResult<()>;

    /// Create the node-local shared window, contributing `window_size`
    /// bytes of `element_size`-byte elements from this rank, and return the
    /// base address of this rank's region.
    ///
    /// Exactly one window exists at a time; its lifecycle is
    /// allocate → query → [`free_shared`](Self::free_shared).
    fn allocate_shared(
        &self,
        window_size: i64,
        element_size: i32,
        scope: CommScope,
    ) -> StampedeResult<*mut u8>;

    /// Base address of local rank `rank`'s region within the current
    /// window, for reading a peer's contribution without copying.
    fn query_shared(&self, rank: i32) -> StampedeResult<*mut u8>;

    /// Fence the window, then release it.
    ///
    /// The fence guarantees no local participant still has reads or writes
    /// in flight against the region when the memory goes away.
    fn free_shared(&self) -> StampedeResult<()>;
}
