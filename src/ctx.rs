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

//! Process-wide state shared by every dispatcher.

use std::sync::Arc;

use crate::data_types::DataType;
use crate::error::StampedeResult;
use crate::net::{CommContext, CommScope};
use crate::timeline::Timeline;
use crate::tuning::TuningParams;

/// Immutable per-process view of the cluster plus the shared collaborators.
///
/// Constructed once at startup, after the backend has resolved its
/// communicators, and never mutated afterwards; dispatchers receive it by
/// shared ownership.
pub struct GlobalState {
    pub timeline: Arc<dyn Timeline>,
    pub tuning: Arc<TuningParams>,
    pub rank: i32,
    pub size: i32,
    pub local_rank: i32,
    pub local_size: i32,
    pub cross_rank: i32,
    pub cross_size: i32,
    /// True when every node runs the same number of local ranks.
    pub is_homogeneous: bool,
}

impl GlobalState {
    /// Assemble state from an externally supplied topology.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rank: i32,
        size: i32,
        local_rank: i32,
        local_size: i32,
        cross_rank: i32,
        cross_size: i32,
        is_homogeneous: bool,
        timeline: Arc<dyn Timeline>,
        tuning: Arc<TuningParams>,
    ) -> Self {
        Self {
            timeline,
            tuning,
            rank,
            size,
            local_rank,
            local_size,
            cross_rank,
            cross_size,
            is_homogeneous,
        }
    }

    /// Derive the topology from the backend.
    ///
    /// Homogeneity is established by gathering every rank's node-local
    /// group size and checking that they all agree. The gather runs on the
    /// global scope, so every rank must call this at the same point in its
    /// startup sequence.
    pub fn probe(
        comm: &dyn CommContext,
        timeline: Arc<dyn Timeline>,
        tuning: Arc<TuningParams>,
    ) -> StampedeResult<Self> {
        let rank = comm.rank(CommScope::Global)?;
        let size = comm.size(CommScope::Global)?;
        let local_rank = comm.rank(CommScope::Local)?;
        let local_size = comm.size(CommScope::Local)?;
        let cross_rank = comm.rank(CommScope::Cross)?;
        let cross_size = comm.size(CommScope::Cross)?;

        let send = local_size.to_ne_bytes();
        let mut recv = vec![0u8; size as usize * std::mem::size_of::<i32>()];
        let counts = vec![1i32; size as usize];
        let displacements: Vec<i32> = (0..size).collect();
        comm.allgatherv(
            Some(&send),
            1,
            DataType::Int32,
            &mut recv,
            &counts,
            &displacements,
            DataType::Int32,
            CommScope::Global,
        )?;
        let is_homogeneous = recv
            .chunks_exact(4)
            .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .all(|s| s == local_size);

        log::debug!(
            "topology: rank {}/{}, local {}/{}, cross {}/{}, homogeneous: {}",
            rank,
            size,
            local_rank,
            local_size,
            cross_rank,
            cross_size,
            is_homogeneous
        );

        Ok(Self {
            timeline,
            tuning,
            rank,
            size,
            local_rank,
            local_size,
            cross_rank,
            cross_size,
            is_homogeneous,
        })
    }
}
