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

//! Tensor element types exchanged through the collective layer.
//!
//! Every tensor entry carries one of these tags; the backend context maps
//! the tag to a native type handle. The mapping is total except for
//! [`DataType::Null`], which exists so a tensor of unknown type fails fast
//! instead of being coerced silently.

use std::fmt;

/// Element type tag carried by every tensor entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Unsigned 8-bit integer
    UInt8,
    /// Signed 8-bit integer
    Int8,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 16-bit integer
    Int16,
    /// Unsigned 32-bit integer
    UInt32,
    /// Signed 32-bit integer
    Int32,
    /// Unsigned 64-bit integer
    UInt64,
    /// Signed 64-bit integer
    Int64,
    /// 2-byte floating point value; backends without a native half type
    /// carry it as a custom registered type with a custom sum operator
    Float16,
    /// 4-byte floating point value
    Float32,
    /// 8-byte floating point value
    Float64,
    /// Boolean
    Bool,
    /// Raw byte, no numeric interpretation
    Byte,
    /// Marker for tensors whose type is unknown or unsupported; never
    /// mapped to a backend type
    Null,
}

impl DataType {
    /// All tags, in declaration order.
    pub const ALL: [DataType; 14] = [
        DataType::UInt8,
        DataType::Int8,
        DataType::UInt16,
        DataType::Int16,
        DataType::UInt32,
        DataType::Int32,
        DataType::UInt64,
        DataType::Int64,
        DataType::Float16,
        DataType::Float32,
        DataType::Float64,
        DataType::Bool,
        DataType::Byte,
        DataType::Null,
    ];

    /// Human-readable name, used in unsupported-type diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::UInt8 => "uint8",
            DataType::Int8 => "int8",
            DataType::UInt16 => "uint16",
            DataType::Int16 => "int16",
            DataType::UInt32 => "uint32",
            DataType::Int32 => "int32",
            DataType::UInt64 => "uint64",
            DataType::Int64 => "int64",
            DataType::Float16 => "float16",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Bool => "bool",
            DataType::Byte => "byte",
            DataType::Null => "null",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
