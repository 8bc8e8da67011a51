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

//! Boundary types for the external readiness coordinator.
//!
//! The coordinator owns the per-tensor readiness table (which ranks have
//! reported a tensor ready, and since when) and decides which batch runs in
//! the current collective round; stall detection lives there too. This
//! layer only consumes the decision. The types are serializable because the
//! decision crosses a process boundary on its way from the coordinating
//! rank.

use serde::{Deserialize, Serialize};

/// Kind of collective the coordinator has cleared a batch for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    Allreduce,
    Allgather,
    Broadcast,
    /// The coordinator detected an inconsistency (e.g. mismatched shapes
    /// across ranks) and the batch must not run.
    Error,
}

/// A coordinator decision for one batch of tensors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyResponse {
    kind: ResponseKind,
    tensor_names: Vec<String>,
    error_message: Option<String>,
}

impl ReadyResponse {
    pub fn new(kind: ResponseKind, tensor_names: Vec<String>) -> Self {
        Self {
            kind,
            tensor_names,
            error_message: None,
        }
    }

    /// An error decision carrying the coordinator's diagnostic.
    pub fn error(tensor_names: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::Error,
            tensor_names,
            error_message: Some(message.into()),
        }
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    /// Tensor names in batch order.
    pub fn tensor_names(&self) -> &[String] {
        &self.tensor_names
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}
