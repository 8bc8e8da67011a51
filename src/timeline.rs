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

//! Timing instrumentation hooks.
//!
//! The timeline sink is an external observability collaborator; this layer
//! records an activity start for every entry in a batch before the backend
//! primitive runs, and an activity end once it returns successfully. A
//! fatal backend error skips the end record; the run is terminating and
//! the half-open activity marks where it died.

use crate::tensor::TensorEntry;

use std::fmt;

/// Operation kind tag attached to activity-start records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Allreduce,
    Allgather,
    /// Cross-node stage of the hierarchical allgather.
    CrossAllgather,
    Broadcast,
}

impl Activity {
    pub fn name(&self) -> &'static str {
        match self {
            Activity::Allreduce => "allreduce",
            Activity::Allgather => "allgather",
            Activity::CrossAllgather => "cross-allgather",
            Activity::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Instrumentation sink for collective activity records.
pub trait Timeline: Send + Sync {
    fn activity_start_all(&self, entries: &[TensorEntry], activity: Activity);
    fn activity_end_all(&self, entries: &[TensorEntry]);
}

/// Discards all records.
pub struct NoopTimeline;

impl Timeline for NoopTimeline {
    fn activity_start_all(&self, _entries: &[TensorEntry], _activity: Activity) {}
    fn activity_end_all(&self, _entries: &[TensorEntry]) {}
}

/// Emits trace-level records through the `log` facade.
pub struct LogTimeline;

impl Timeline for LogTimeline {
    fn activity_start_all(&self, entries: &[TensorEntry], activity: Activity) {
        for entry in entries {
            log::trace!("activity start: {} [{}]", activity, entry.name);
        }
    }

    fn activity_end_all(&self, entries: &[TensorEntry]) {
        for entry in entries {
            log::trace!("activity end: [{}]", entry.name);
        }
    }
}
