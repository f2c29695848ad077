//! Sequential fan-out across every ready SubConn of one service.
//!
//! Grounded in spec.md §4.8: iterate `target := 1, 2, 3 ...` up to a cap,
//! stop on the picker's `TargetOver` sentinel, stop and surface any other
//! error. Not parallelized — each iteration fully awaits `f` before
//! advancing, matching the reference's sequential-fan-out contract.

use crate::picker::PickResult;

/// Returned by a broadcast body: either it resolved a pick (the caller
/// performed its RPC and `f` returns normally) or it surfaced an error.
pub type BroadcastFnResult<E> = Result<PickResult, E>;

/// Drive `f(target)` for `target = 1, 2, 3, ...` up to `cap` (10 in the
/// reference). `f` is expected to perform a pick with that target hint,
/// make its call, and return the `PickResult` it picked against (so this
/// helper can detect `TargetOver`). Any error from `f` halts iteration
/// and is returned to the caller.
pub async fn broadcast<F, Fut, E>(cap: u32, mut f: F) -> Result<(), E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = BroadcastFnResult<E>>,
{
    for target in 1..=cap {
        match f(target).await? {
            PickResult::TargetOver => return Ok(()),
            _ => continue,
        }
    }
    Ok(())
}
