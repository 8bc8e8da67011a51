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

//! Per-call tensor references handed to the dispatchers.

use crate::data_types::DataType;

/// One tensor participating in the current collective call.
///
/// Entries are supplied by the batching layer for the duration of a single
/// call and are never retained past it. The buffer pointers are opaque:
/// the fused buffer that actually moves over the wire is passed to the
/// dispatcher separately, and the per-entry pointers decide between the
/// in-place and out-of-place reduction paths.
#[derive(Debug)]
pub struct TensorEntry {
    /// Stable tensor identifier, shared with the readiness coordinator and
    /// the timeline sink.
    pub name: String,
    pub dtype: DataType,
    /// Base address of the entry's input tensor.
    pub input: *const u8,
    /// Base address of the entry's output tensor.
    pub output: *const u8,
    /// Input tensor length in bytes.
    pub input_len: usize,
}

impl TensorEntry {
    pub fn new(
        name: impl Into<String>,
        dtype: DataType,
        input: *const u8,
        output: *const u8,
        input_len: usize,
    ) -> Self {
        Self {
            name: name.into(),
            dtype,
            input,
            output,
            input_len,
        }
    }

    /// True when the caller's input and output buffers alias, i.e. the
    /// reduction must run in place.
    pub fn is_in_place(&self) -> bool {
        std::ptr::eq(self.input, self.output)
    }

    /// View the input tensor as bytes.
    ///
    /// # Safety
    /// `input` must point to `input_len` bytes that stay valid and
    /// unwritten for the duration of the borrow.
    pub unsafe fn input_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.input, self.input_len)
    }
}
