// src/ffi.rs
// C ABI for hosts that drive the queue through a foreign function interface.
// Every function takes a queue pointer obtained from `trapq_alloc`.

use libc::{c_double, c_int};
use log::warn;

use crate::coord::{Coord, NUM_AXES};
use crate::trapq::{PullMove, TrapQ, TrapqError};

/// `trapq_extract_old` found more moves than the caller buffer holds.
pub const TRAPQ_ERR_CAPACITY: c_int = -1;
/// Null pointer, negative size or allocation failure.
pub const TRAPQ_ERR_FAILURE: c_int = -2;

fn status(res: Result<(), TrapqError>) -> c_int {
    match res {
        Ok(()) => 0,
        Err(TrapqError::CapacityExceeded { .. }) => TRAPQ_ERR_CAPACITY,
        Err(e) => {
            warn!("trapq: {}", e);
            TRAPQ_ERR_FAILURE
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn trapq_alloc() -> *mut TrapQ {
    Box::into_raw(Box::new(TrapQ::new()))
}

/// # Safety
/// `tq` must be null or a pointer from `trapq_alloc` not yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trapq_free(tq: *mut TrapQ) {
    if !tq.is_null() {
        let tq = unsafe { Box::from_raw(tq) };
        tq.teardown();
    }
}

/// # Safety
/// `tq` must be null or a live pointer from `trapq_alloc`.
#[allow(clippy::too_many_arguments)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trapq_append(
    tq: *mut TrapQ,
    print_time: c_double,
    accel_t: c_double,
    cruise_t: c_double,
    decel_t: c_double,
    start_pos_x: c_double,
    start_pos_y: c_double,
    start_pos_z: c_double,
    start_pos_u: c_double,
    start_pos_v: c_double,
    axes_r_x: c_double,
    axes_r_y: c_double,
    axes_r_z: c_double,
    axes_r_u: c_double,
    axes_r_v: c_double,
    start_v: c_double,
    cruise_v: c_double,
    accel: c_double,
) -> c_int {
    let Some(tq) = (unsafe { tq.as_mut() }) else {
        return TRAPQ_ERR_FAILURE;
    };
    let start_pos = Coord::new(start_pos_x, start_pos_y, start_pos_z, start_pos_u, start_pos_v);
    let axes_r = Coord::new(axes_r_x, axes_r_y, axes_r_z, axes_r_u, axes_r_v);
    status(tq.append(print_time, accel_t, cruise_t, decel_t, start_pos, axes_r, start_v, cruise_v, accel))
}

/// Returns the number of moves finalized.
///
/// # Safety
/// `tq` must be null or a live pointer from `trapq_alloc`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trapq_finalize_moves(tq: *mut TrapQ, print_time: c_double) -> c_int {
    let Some(tq) = (unsafe { tq.as_mut() }) else {
        return TRAPQ_ERR_FAILURE;
    };
    match tq.finalize_moves(print_time) {
        Ok(count) => c_int::try_from(count).unwrap_or(c_int::MAX),
        Err(e) => status(Err(e)),
    }
}

/// Returns the number of history moves freed.
///
/// # Safety
/// `tq` must be null or a live pointer from `trapq_alloc`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trapq_prune_history(tq: *mut TrapQ, clear_history_time: c_double) -> c_int {
    let Some(tq) = (unsafe { tq.as_mut() }) else {
        return TRAPQ_ERR_FAILURE;
    };
    c_int::try_from(tq.prune_history(clear_history_time)).unwrap_or(c_int::MAX)
}

/// # Safety
/// `tq` must be null or a live pointer from `trapq_alloc`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trapq_set_position(
    tq: *mut TrapQ,
    print_time: c_double,
    pos_x: c_double,
    pos_y: c_double,
    pos_z: c_double,
    pos_u: c_double,
    pos_v: c_double,
) -> c_int {
    let Some(tq) = (unsafe { tq.as_mut() }) else {
        return TRAPQ_ERR_FAILURE;
    };
    status(tq.set_position(print_time, Coord::new(pos_x, pos_y, pos_z, pos_u, pos_v)))
}

/// Writes the five axis position at `print_time` into `pos`.
///
/// # Safety
/// `tq` must be null or a live pointer from `trapq_alloc`; `pos` must be null
/// or point to five writable doubles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trapq_get_position(tq: *const TrapQ, print_time: c_double, pos: *mut c_double) -> c_int {
    let Some(tq) = (unsafe { tq.as_ref() }) else {
        return TRAPQ_ERR_FAILURE;
    };
    if pos.is_null() {
        return TRAPQ_ERR_FAILURE;
    }
    let out = unsafe { std::slice::from_raw_parts_mut(pos, NUM_AXES) };
    out.copy_from_slice(&tq.get_position(print_time).to_array());
    0
}

/// Fill `p` with history moves overlapping `[start_time, end_time)`.
/// Returns the number written, or `TRAPQ_ERR_CAPACITY` when more than `max`
/// moves match (nothing is written in that case).
///
/// # Safety
/// `tq` must be null or a live pointer from `trapq_alloc`; `p` must be null or
/// point to `max` writable `PullMove` records.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn trapq_extract_old(
    tq: *const TrapQ,
    p: *mut PullMove,
    max: c_int,
    start_time: c_double,
    end_time: c_double,
) -> c_int {
    let Some(tq) = (unsafe { tq.as_ref() }) else {
        return TRAPQ_ERR_FAILURE;
    };
    let Ok(max) = usize::try_from(max) else {
        return TRAPQ_ERR_FAILURE;
    };
    let out: &mut [PullMove] = if max == 0 {
        &mut []
    } else if p.is_null() {
        return TRAPQ_ERR_FAILURE;
    } else {
        unsafe { std::slice::from_raw_parts_mut(p, max) }
    };
    match tq.extract_into(start_time, end_time, out) {
        Ok(count) => c_int::try_from(count).unwrap_or(c_int::MAX),
        Err(e) => status(Err(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn ffi_round_trip() {
        let tq = trapq_alloc();
        unsafe {
            assert_eq!(
                trapq_append(
                    tq, 0.0, 1.0, 2.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 2.0
                ),
                0
            );
            let mut pos = [0.0; NUM_AXES];
            assert_eq!(trapq_get_position(tq, 3.0, pos.as_mut_ptr()), 0);
            assert_eq!(pos, [5.0, 0.0, 0.0, 0.0, 0.0]);

            assert_eq!(trapq_finalize_moves(tq, 10.0), 3);

            let mut buf = [PullMove::default(); 3];
            assert_eq!(trapq_extract_old(tq, buf.as_mut_ptr(), 2, 0.0, 10.0), TRAPQ_ERR_CAPACITY);
            assert_eq!(trapq_extract_old(tq, buf.as_mut_ptr(), 3, 0.0, 10.0), 3);
            assert_eq!(buf[1].print_time, 1.0);
            assert_eq!(buf[2].accel, -2.0);
            assert_eq!(trapq_extract_old(tq, ptr::null_mut(), 0, 20.0, 30.0), 0);

            assert_eq!(trapq_prune_history(tq, 10.0), 2);
            assert_eq!(trapq_set_position(tq, 11.0, 1.0, 2.0, 3.0, 4.0, 5.0), 0);
            assert_eq!(trapq_get_position(tq, 12.0, pos.as_mut_ptr()), 0);
            assert_eq!(pos, [1.0, 2.0, 3.0, 4.0, 5.0]);
            trapq_free(tq);
        }
    }

    #[test]
    fn ffi_rejects_null_pointers() {
        unsafe {
            assert_eq!(trapq_finalize_moves(ptr::null_mut(), 1.0), TRAPQ_ERR_FAILURE);
            assert_eq!(trapq_set_position(ptr::null_mut(), 0.0, 0.0, 0.0, 0.0, 0.0, 0.0), TRAPQ_ERR_FAILURE);
            let tq = trapq_alloc();
            assert_eq!(trapq_get_position(tq, 0.0, ptr::null_mut()), TRAPQ_ERR_FAILURE);
            assert_eq!(trapq_extract_old(tq, ptr::null_mut(), 4, 0.0, 1.0), TRAPQ_ERR_FAILURE);
            assert_eq!(trapq_extract_old(tq, ptr::null_mut(), -1, 0.0, 1.0), TRAPQ_ERR_FAILURE);
            trapq_free(tq);
            trapq_free(ptr::null_mut());
        }
    }
}
