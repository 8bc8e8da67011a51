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

//! Error handling for stampede operations.
//!
//! Every error raised by this layer is terminal for the current training
//! step. A collective is a cluster-wide synchronization point: when one
//! rank's backend call fails, the surviving ranks are blocked on a call
//! that can never complete, so there is no meaningful local retry and no
//! partial-success outcome. Callers are expected to abort the job with the
//! diagnostic intact rather than continue silently.

/// Main error type for stampede operations.
#[derive(thiserror::Error, Debug)]
pub enum StampedeError {
    /// The requested datatype has no mapping in the active backend.
    #[error("type {0} is not supported by the communication backend")]
    UnsupportedType(String),

    /// The requested communicator scope has no resolved handle in the
    /// active backend.
    #[error("communicator scope {0} is not supported by the communication backend")]
    UnsupportedScope(String),

    /// A backend primitive reported a non-success status. `detail` carries
    /// the backend's native diagnostic text.
    #[error("{op} failed: {detail}")]
    BackendFailure { op: &'static str, detail: String },

    /// Backend construction failed, including double initialization.
    #[error("initialization failed: {0}")]
    Init(String),

    /// Malformed arguments from the caller.
    #[error("invalid operation: {0}")]
    Invalid(String),
}

impl StampedeError {
    /// Fatal backend failure for the named primitive.
    pub fn backend(op: &'static str, detail: impl Into<String>) -> Self {
        StampedeError::BackendFailure {
            op,
            detail: detail.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        StampedeError::Invalid(message.into())
    }
}

/// Type alias for Results using StampedeError.
pub type StampedeResult<T> = Result<T, StampedeError>;
