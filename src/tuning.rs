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

//! Runtime-adjustable tuning knobs read by the operation-enablement
//! predicates.

use std::sync::atomic::{AtomicBool, Ordering};

/// Environment variable holding the initial hierarchical-allgather setting.
pub const HIERARCHICAL_ALLGATHER_ENV: &str = "STAMPEDE_HIERARCHICAL_ALLGATHER";

/// Tuning configuration shared by all dispatchers.
///
/// The hierarchical-allgather flag may be flipped between collective
/// rounds, e.g. by an external autotuner. Every rank must observe the same
/// value for a given round: the enablement decision feeds collective
/// ordering, which has to agree cluster-wide.
pub struct TuningParams {
    hierarchical_allgather: AtomicBool,
}

impl TuningParams {
    pub fn new(hierarchical_allgather: bool) -> Self {
        Self {
            hierarchical_allgather: AtomicBool::new(hierarchical_allgather),
        }
    }

    /// Read initial values from the environment.
    /// `STAMPEDE_HIERARCHICAL_ALLGATHER` accepts `1`/`true`/`on`
    /// (case-insensitive); anything else leaves hierarchical mode off.
    pub fn from_env() -> Self {
        let enabled = std::env::var(HIERARCHICAL_ALLGATHER_ENV)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "on"))
            .unwrap_or(false);
        Self::new(enabled)
    }

    pub fn hierarchical_allgather(&self) -> bool {
        self.hierarchical_allgather.load(Ordering::Relaxed)
    }

    pub fn set_hierarchical_allgather(&self, enabled: bool) {
        self.hierarchical_allgather.store(enabled, Ordering::Relaxed);
    }
}

impl Default for TuningParams {
    fn default() -> Self {
        Self::new(false)
    }
}
