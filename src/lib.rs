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

//! stampede: pluggable collective-operation layer for distributed
//! data-parallel training.
//!
//! stampede turns abstract requests ("allreduce these tensors", "allgather
//! these tensors", "broadcast this tensor from rank R") into calls against
//! a concrete collective-communication backend, hiding communicator
//! selection, datatype mapping, and buffer placement behind one contract
//! that higher-level batching and fusion logic can target. It ships an MPI
//! backend (feature `"mpi"`) and a two-tier hierarchical allgather that
//! uses node-local shared memory to keep redundant data off the network.

pub mod coordination;
pub mod ctx;
pub mod data_types;
pub mod error;
pub mod net;
pub mod tensor;
pub mod timeline;
pub mod tuning;
pub mod util;

// Re-export commonly used types
pub use crate::ctx::GlobalState;
pub use crate::data_types::DataType;
pub use crate::error::{StampedeError, StampedeResult};
pub use crate::net::{CommContext, CommScope};
pub use crate::tensor::TensorEntry;
pub use crate::tuning::TuningParams;

/// The main entry point and version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
