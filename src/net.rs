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

//! Communication components: scopes, the backend contract, the operation
//! dispatchers, and the backend implementations.

use std::fmt;

pub mod comm_context;
pub mod ops;

#[cfg(feature = "mpi")]
pub mod mpi;

// Re-exports for convenience
pub use comm_context::CommContext;

/// Logical communicator scope targeted by a collective call.
///
/// The backend resolves a communicator handle for each scope exactly once
/// at construction; the handles stay fixed for the process lifetime, and a
/// resolution failure for any of the three aborts construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommScope {
    /// Every process in the job.
    Global,
    /// Processes co-located on one physical node.
    Local,
    /// One representative per node, used by the cross-node phase of
    /// hierarchical collectives.
    Cross,
}

impl CommScope {
    /// Human-readable name, used in unsupported-scope diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            CommScope::Global => "global",
            CommScope::Local => "local",
            CommScope::Cross => "cross",
        }
    }
}

impl fmt::Display for CommScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
