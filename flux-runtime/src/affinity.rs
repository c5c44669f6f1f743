//! CPU pinning for `TickDriver` worker threads (§4.7, §6.3's `cpu` list).
//!
//! No safe alternative exists for thread affinity on Linux; this mirrors
//! `seanchatmangpt-knhk/knhk-kernel::platform::unsafe_ops::pin_to_cpu`
//! exactly — same FFI call, same safety argument — since that crate is the
//! pack's other per-core-pinned, low-latency system and already carries the
//! `libc` dependency for it.

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub fn pin_to_cpu(cpu_id: usize) -> Result<(), String> {
    // SAFETY: `pthread_setaffinity_np` is a C FFI call operating on the
    // calling thread's own affinity mask (`pthread_self()`); `cpu_set_t` is
    // zero-initialized before `CPU_SET` writes a single bit into it.
    unsafe {
        let mut cpu_set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(cpu_id, &mut cpu_set);
        let result = libc::pthread_setaffinity_np(
            libc::pthread_self(),
            std::mem::size_of::<libc::cpu_set_t>(),
            &cpu_set,
        );
        if result == 0 {
            Ok(())
        } else {
            Err(format!("failed to pin to CPU {cpu_id}: errno {result}"))
        }
    }
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
pub fn pin_to_cpu(_cpu_id: usize) -> Result<(), String> {
    Err("CPU pinning is not supported on this platform".to_string())
}
