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

//! Logging utilities built on the standard `log` facade.

/// Initialize logging from the environment (`RUST_LOG`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env().try_init();
}

/// Initialize logging with an explicit level filter.
pub fn init_logging_with_level(level: log::LevelFilter) {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init();
}
