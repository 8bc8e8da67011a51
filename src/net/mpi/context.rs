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

//! MPI implementation of the backend contract.
//!
//! Built on rsmpi for initialization and on raw `mpi_sys` calls for the
//! pieces the high-level API does not cover: communicator splits, custom
//! datatypes and reduction operators, shared-memory windows, and
//! variable-length gathers with caller displacements.

use std::ffi::c_void;
use std::mem::MaybeUninit;
use std::os::raw::c_int;
use std::sync::{Arc, Mutex};

use mpi::environment::Universe;
use mpi::traits::*;

use crate::data_types::DataType;
use crate::error::{StampedeError, StampedeResult};
use crate::net::{CommContext, CommScope};
use crate::tensor::TensorEntry;
use crate::util::float16;

/// Render an MPI status code through `MPI_Error_string`.
fn error_string(code: c_int) -> String {
    let mut buf = [0u8; 512];
    let mut len: c_int = 0;
    let status =
        unsafe { mpi_sys::MPI_Error_string(code, buf.as_mut_ptr() as *mut _, &mut len) };
    if status == mpi_sys::MPI_SUCCESS as c_int && len > 0 {
        String::from_utf8_lossy(&buf[..len as usize]).into_owned()
    } else {
        format!("MPI error code {}", code)
    }
}

/// Map a raw status to a fatal backend error carrying the native text.
fn check(op: &'static str, code: c_int) -> StampedeResult<()> {
    if code == mpi_sys::MPI_SUCCESS as c_int {
        Ok(())
    } else {
        Err(StampedeError::backend(op, error_string(code)))
    }
}

/// Reduction callback registered for the custom 16-bit float type.
unsafe extern "C" fn float16_sum(
    invec: *mut c_void,
    inoutvec: *mut c_void,
    len: *mut c_int,
    _dtype: *mut mpi_sys::MPI_Datatype,
) {
    let n = *len as usize;
    let src = std::slice::from_raw_parts(invec as *const u16, n);
    let acc = std::slice::from_raw_parts_mut(inoutvec as *mut u16, n);
    float16::sum_into(src, acc);
}

/// MPI-backed communicator context.
///
/// All three communicator handles and the custom float16 type/operator are
/// resolved in [`make`](Self::make) and immutable afterwards; the shared
/// window is the only mutable slot and is guarded by a mutex.
pub struct MpiContext {
    global_comm: mpi_sys::MPI_Comm,
    local_comm: mpi_sys::MPI_Comm,
    cross_comm: mpi_sys::MPI_Comm,
    float16_t: mpi_sys::MPI_Datatype,
    float16_sum_op: mpi_sys::MPI_Op,
    window: Mutex<Option<mpi_sys::MPI_Win>>,
    rank: i32,
    size: i32,
    local_rank: i32,
    local_size: i32,
    cross_rank: i32,
    cross_size: i32,
    // Dropping the universe finalizes MPI; it must outlive every handle
    // above, so it is released last in Drop.
    _universe: Universe,
}

// Handles are immutable after construction, the window slot is mutex
// guarded, and the MPI library is required to be initialized at (at least)
// serialized thread support by the launcher.
unsafe impl Send for MpiContext {}
unsafe impl Sync for MpiContext {}

impl MpiContext {
    /// Initialize MPI and resolve every communicator scope.
    ///
    /// Fails if MPI is already initialized: the context must be
    /// constructed exactly once per process. Registers the half-precision
    /// wire type and its summation operator; every later resolve reuses
    /// those handles.
    pub fn make() -> StampedeResult<Arc<Self>> {
        let universe = mpi::initialize().ok_or_else(|| {
            StampedeError::Init(
                "MPI is already initialized or the MPI library is unavailable".to_string(),
            )
        })?;
        let world = universe.world();
        let world_rank = world.rank();

        unsafe {
            // Private duplicate of the world communicator, so collectives
            // issued here never collide with other MPI users in the
            // process.
            let mut global_comm = MaybeUninit::<mpi_sys::MPI_Comm>::uninit();
            check(
                "MPI_Comm_dup",
                mpi_sys::MPI_Comm_dup(world.as_raw(), global_comm.as_mut_ptr()),
            )?;
            let global_comm = global_comm.assume_init();

            let mut rank: c_int = 0;
            let mut size: c_int = 0;
            check("MPI_Comm_rank", mpi_sys::MPI_Comm_rank(global_comm, &mut rank))?;
            check("MPI_Comm_size", mpi_sys::MPI_Comm_size(global_comm, &mut size))?;
            if rank < 0 || size < 1 || rank >= size {
                return Err(StampedeError::Init(format!(
                    "malformed rank {} or world size {}",
                    rank, size
                )));
            }

            // Node-local communicator: every rank sharing this host.
            let mut local_comm = MaybeUninit::<mpi_sys::MPI_Comm>::uninit();
            check(
                "MPI_Comm_split_type",
                mpi_sys::MPI_Comm_split_type(
                    global_comm,
                    mpi_sys::MPI_COMM_TYPE_SHARED as c_int,
                    world_rank,
                    mpi_sys::RSMPI_INFO_NULL,
                    local_comm.as_mut_ptr(),
                ),
            )?;
            let local_comm = local_comm.assume_init();

            let mut local_rank: c_int = 0;
            let mut local_size: c_int = 0;
            check(
                "MPI_Comm_rank",
                mpi_sys::MPI_Comm_rank(local_comm, &mut local_rank),
            )?;
            check(
                "MPI_Comm_size",
                mpi_sys::MPI_Comm_size(local_comm, &mut local_size),
            )?;

            // Cross-node communicator: one per local-rank index, spanning
            // the nodes.
            let mut cross_comm = MaybeUninit::<mpi_sys::MPI_Comm>::uninit();
            check(
                "MPI_Comm_split",
                mpi_sys::MPI_Comm_split(global_comm, local_rank, rank, cross_comm.as_mut_ptr()),
            )?;
            let cross_comm = cross_comm.assume_init();

            let mut cross_rank: c_int = 0;
            let mut cross_size: c_int = 0;
            check(
                "MPI_Comm_rank",
                mpi_sys::MPI_Comm_rank(cross_comm, &mut cross_rank),
            )?;
            check(
                "MPI_Comm_size",
                mpi_sys::MPI_Comm_size(cross_comm, &mut cross_size),
            )?;

            // Half precision travels as two contiguous bytes with a custom
            // summation operator; registered once, reused by every call.
            let mut float16_t = MaybeUninit::<mpi_sys::MPI_Datatype>::uninit();
            check(
                "MPI_Type_contiguous",
                mpi_sys::MPI_Type_contiguous(2, mpi_sys::RSMPI_UINT8_T, float16_t.as_mut_ptr()),
            )?;
            let mut float16_t = float16_t.assume_init();
            check("MPI_Type_commit", mpi_sys::MPI_Type_commit(&mut float16_t))?;

            let mut float16_sum_op = MaybeUninit::<mpi_sys::MPI_Op>::uninit();
            check(
                "MPI_Op_create",
                mpi_sys::MPI_Op_create(Some(float16_sum), 1, float16_sum_op.as_mut_ptr()),
            )?;
            let float16_sum_op = float16_sum_op.assume_init();

            log::info!(
                "mpi context up: rank {}/{}, local {}/{}, cross {}/{}",
                rank,
                size,
                local_rank,
                local_size,
                cross_rank,
                cross_size
            );

            Ok(Arc::new(Self {
                global_comm,
                local_comm,
                cross_comm,
                float16_t,
                float16_sum_op,
                window: Mutex::new(None),
                rank,
                size,
                local_rank,
                local_size,
                cross_rank,
                cross_size,
                _universe: universe,
            }))
        }
    }

    fn comm(&self, scope: CommScope) -> mpi_sys::MPI_Comm {
        match scope {
            CommScope::Global => self.global_comm,
            CommScope::Local => self.local_comm,
            CommScope::Cross => self.cross_comm,
        }
    }

    fn mpi_datatype(&self, dtype: DataType) -> StampedeResult<mpi_sys::MPI_Datatype> {
        let handle = unsafe {
            match dtype {
                DataType::UInt8 | DataType::Byte => mpi_sys::RSMPI_UINT8_T,
                DataType::Int8 => mpi_sys::RSMPI_INT8_T,
                DataType::UInt16 => mpi_sys::RSMPI_UINT16_T,
                DataType::Int16 => mpi_sys::RSMPI_INT16_T,
                DataType::UInt32 => mpi_sys::RSMPI_UINT32_T,
                DataType::Int32 => mpi_sys::RSMPI_INT32_T,
                DataType::UInt64 => mpi_sys::RSMPI_UINT64_T,
                DataType::Int64 => mpi_sys::RSMPI_INT64_T,
                DataType::Float16 => self.float16_t,
                DataType::Float32 => mpi_sys::RSMPI_FLOAT,
                DataType::Float64 => mpi_sys::RSMPI_DOUBLE,
                DataType::Bool => mpi_sys::RSMPI_C_BOOL,
                DataType::Null => {
                    return Err(StampedeError::UnsupportedType(dtype.name().to_string()))
                }
            }
        };
        Ok(handle)
    }

    fn sum_op(&self, dtype: DataType) -> mpi_sys::MPI_Op {
        if dtype == DataType::Float16 {
            self.float16_sum_op
        } else {
            unsafe { mpi_sys::RSMPI_SUM }
        }
    }
}

impl CommContext for MpiContext {
    fn rank(&self, scope: CommScope) -> StampedeResult<i32> {
        Ok(match scope {
            CommScope::Global => self.rank,
            CommScope::Local => self.local_rank,
            CommScope::Cross => self.cross_rank,
        })
    }

    fn size(&self, scope: CommScope) -> StampedeResult<i32> {
        Ok(match scope {
            CommScope::Global => self.size,
            CommScope::Local => self.local_size,
            CommScope::Cross => self.cross_size,
        })
    }

    fn type_size(&self, dtype: DataType) -> StampedeResult<i32> {
        let handle = self.mpi_datatype(dtype)?;
        let mut out: c_int = 0;
        check("MPI_Type_size", unsafe {
            mpi_sys::MPI_Type_size(handle, &mut out)
        })?;
        Ok(out)
    }

    fn allreduce(
        &self,
        buffer: &mut [u8],
        num_elements: i64,
        entry: &TensorEntry,
        send_buf: Option<&[u8]>,
        scope: CommScope,
    ) -> StampedeResult<()> {
        let dtype = self.mpi_datatype(entry.dtype)?;
        let op = self.sum_op(entry.dtype);
        let status = unsafe {
            let send_ptr = match send_buf {
                Some(b) => b.as_ptr() as *const c_void,
                None => mpi_sys::RSMPI_IN_PLACE as *const c_void,
            };
            mpi_sys::MPI_Allreduce(
                send_ptr,
                buffer.as_mut_ptr() as *mut c_void,
                num_elements as c_int,
                dtype,
                op,
                self.comm(scope),
            )
        };
        check("MPI_Allreduce", status)
    }

    fn allgatherv(
        &self,
        send_buf: Option<&[u8]>,
        send_count: i32,
        send_type: DataType,
        recv_buf: &mut [u8],
        recv_counts: &[i32],
        displacements: &[i32],
        recv_type: DataType,
        scope: CommScope,
    ) -> StampedeResult<()> {
        let send_type = self.mpi_datatype(send_type)?;
        let recv_type = self.mpi_datatype(recv_type)?;
        let status = unsafe {
            let send_ptr = match send_buf {
                Some(b) => b.as_ptr() as *const c_void,
                None => mpi_sys::RSMPI_IN_PLACE as *const c_void,
            };
            mpi_sys::MPI_Allgatherv(
                send_ptr,
                send_count,
                send_type,
                recv_buf.as_mut_ptr() as *mut c_void,
                recv_counts.as_ptr(),
                displacements.as_ptr(),
                recv_type,
                self.comm(scope),
            )
        };
        check("MPI_Allgatherv", status)
    }

    fn broadcast(
        &self,
        buffer: &mut [u8],
        num_elements: i64,
        dtype: DataType,
        root_rank: i32,
        scope: CommScope,
    ) -> StampedeResult<()> {
        let size = self.size(scope)?;
        if root_rank < 0 || root_rank >= size {
            return Err(StampedeError::invalid(format!(
                "broadcast root {} out of range for {} scope of {} ranks",
                root_rank,
                scope.name(),
                size
            )));
        }
        let dtype = self.mpi_datatype(dtype)?;
        let status = unsafe {
            mpi_sys::MPI_Bcast(
                buffer.as_mut_ptr() as *mut c_void,
                num_elements as c_int,
                dtype,
                root_rank,
                self.comm(scope),
            )
        };
        check("MPI_Bcast", status)
    }

    fn barrier(&self, scope: CommScope) -> StampedeResult<()> {
        check("MPI_Barrier", unsafe {
            mpi_sys::MPI_Barrier(self.comm(scope))
        })
    }

    fn allocate_shared(
        &self,
        window_size: i64,
        element_size: i32,
        scope: CommScope,
    ) -> StampedeResult<*mut u8> {
        let mut window = self.window.lock().unwrap();
        if window.is_some() {
            return Err(StampedeError::invalid("shared window already allocated"));
        }
        let mut base: *mut c_void = std::ptr::null_mut();
        let mut win = MaybeUninit::<mpi_sys::MPI_Win>::uninit();
        let status = unsafe {
            mpi_sys::MPI_Win_allocate_shared(
                window_size as mpi_sys::MPI_Aint,
                element_size,
                mpi_sys::RSMPI_INFO_NULL,
                self.comm(scope),
                &mut base as *mut *mut c_void as *mut c_void,
                win.as_mut_ptr(),
            )
        };
        check("MPI_Win_allocate_shared", status)?;
        *window = Some(unsafe { win.assume_init() });
        Ok(base as *mut u8)
    }

    fn query_shared(&self, rank: i32) -> StampedeResult<*mut u8> {
        let window = self.window.lock().unwrap();
        let win = window
            .ok_or_else(|| StampedeError::invalid("no shared window allocated"))?;
        let mut region_size: mpi_sys::MPI_Aint = 0;
        let mut disp_unit: c_int = 0;
        let mut base: *mut c_void = std::ptr::null_mut();
        let status = unsafe {
            mpi_sys::MPI_Win_shared_query(
                win,
                rank,
                &mut region_size,
                &mut disp_unit,
                &mut base as *mut *mut c_void as *mut c_void,
            )
        };
        check("MPI_Win_shared_query", status)?;
        Ok(base as *mut u8)
    }

    fn free_shared(&self) -> StampedeResult<()> {
        let mut window = self.window.lock().unwrap();
        let mut win = window
            .take()
            .ok_or_else(|| StampedeError::invalid("no shared window allocated"))?;
        // Fence before release, so no local participant still has reads or
        // writes in flight against the region.
        unsafe {
            check("MPI_Win_fence", mpi_sys::MPI_Win_fence(0, win))?;
            check("MPI_Win_free", mpi_sys::MPI_Win_free(&mut win))?;
        }
        Ok(())
    }
}

impl Drop for MpiContext {
    fn drop(&mut self) {
        // Best-effort release of MPI objects before the universe finalizes
        // the library.
        unsafe {
            if let Ok(mut window) = self.window.lock() {
                if let Some(mut win) = window.take() {
                    mpi_sys::MPI_Win_free(&mut win);
                }
            }
            mpi_sys::MPI_Op_free(&mut self.float16_sum_op);
            mpi_sys::MPI_Type_free(&mut self.float16_t);
            mpi_sys::MPI_Comm_free(&mut self.cross_comm);
            mpi_sys::MPI_Comm_free(&mut self.local_comm);
            mpi_sys::MPI_Comm_free(&mut self.global_comm);
        }
    }
}
