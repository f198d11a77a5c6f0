// FEEDGATE — ENGINE: RUNTIME MODULE
// Infrastructure that supports the gateway but isn't the datapath itself:
// fatal exit diagnostics, the TSC wall clock behind the four packet
// timestamps, and CPU pinning for the gateway thread.

use std::time::Duration;

// ============================================================================
// FATAL EXIT + DIAGNOSTIC ERROR CODES
// ============================================================================

// Convention: 0x10-0x1F = Boot, 0x20-0x2F = Runtime, 0x30-0x3F = Transport

// Boot failures (gateway refuses to start)
pub const E_CPU_COUNT: i32       = 0x10;
pub const E_AFFINITY_FAIL: i32   = 0x11;
pub const E_AFFINITY_VERIFY: i32 = 0x13;
pub const E_RING_INIT: i32       = 0x15;
pub const E_PIPE_WRITE: i32      = 0x16;
pub const E_EPOLL_INIT: i32      = 0x17;
pub const E_BAD_ARGS: i32        = 0x18;

// Transport failures during bootstrap
pub const E_CONNECT: i32         = 0x30;
pub const E_TLS_ESTABLISH: i32   = 0x31;
pub const E_WS_ESTABLISH: i32    = 0x32;
pub const E_FIXED_FILES: i32     = 0x33;
pub const E_SOCKOPT: i32         = 0x34;

/// Structured fatal exit. No heap allocation, no stack unwinding, no string
/// formatting. Writes a fixed-format line to stderr via a single writev, then
/// exits with the diagnostic code.
/// Output: "[FGW FATAL 0xHH] msg\n"
#[inline(never)]
pub fn fatal(code: i32, msg: &str) -> ! {
    let prefix = b"[FGW FATAL 0x";
    let hex = [
        b"0123456789ABCDEF"[((code >> 4) & 0xF) as usize],
        b"0123456789ABCDEF"[(code & 0xF) as usize],
    ];
    let suffix = b"] ";
    let newline = b"\n";
    let iov = [
        libc::iovec { iov_base: prefix.as_ptr() as *mut _, iov_len: prefix.len() },
        libc::iovec { iov_base: hex.as_ptr() as *mut _, iov_len: 2 },
        libc::iovec { iov_base: suffix.as_ptr() as *mut _, iov_len: suffix.len() },
        libc::iovec { iov_base: msg.as_ptr() as *mut _, iov_len: msg.len() },
        libc::iovec { iov_base: newline.as_ptr() as *mut _, iov_len: 1 },
    ];
    // SAFETY: writev(2, iov, 5) writes to stderr (fd 2, always open). All iov
    // entries point to live byte arrays with correct lengths.
    unsafe { libc::writev(2, iov.as_ptr(), 5); }
    std::process::exit(code);
}

// ============================================================================
// TSC WALL CLOCK
// Every queue entry carries four timestamps encoded as nanoseconds since the
// UNIX epoch, so they are comparable with the kernel's SCM_TIMESTAMP. The TSC
// is calibrated once at boot against CLOCK_REALTIME; after that, a timestamp
// is one monotonic hardware counter read plus a fixed-point multiply — the
// wall clock can step under NTP, the calibrated base cannot.
// ============================================================================

#[inline(always)]
pub fn epoch_ns() -> u64 {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: FFI call with a valid mutable reference to timespec.
    unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

/// TSC-to-nanosecond calibration data. Computed once at boot, immutable after.
/// Conversion: ns = epoch_base + ((rdtsc() - tsc_base) * mult) >> shift
#[derive(Clone, Copy)]
pub struct TscCal {
    tsc_base: u64,
    epoch_base: u64,
    mult: u32,
    shift: u32,
    valid: bool,
}

impl TscCal {
    /// Fallback calibration — tsc_epoch_ns() calls clock_gettime instead.
    pub fn fallback() -> Self {
        TscCal { tsc_base: 0, epoch_base: 0, mult: 0, shift: 0, valid: false }
    }
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub fn read_tsc() -> u64 {
    let lo: u32;
    let hi: u32;
    // SAFETY: rdtsc only reads the timestamp counter into registers.
    unsafe {
        core::arch::asm!(
            "rdtsc",
            out("eax") lo,
            out("edx") hi,
            options(nostack, nomem, preserves_flags)
        );
    }
    ((hi as u64) << 32) | (lo as u64)
}

/// ARM equivalent: CNTVCT_EL0 (generic timer virtual count).
#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn read_tsc() -> u64 {
    let cnt: u64;
    // SAFETY: reads the virtual counter register; no memory access.
    unsafe {
        core::arch::asm!(
            "mrs {cnt}, CNTVCT_EL0",
            cnt = out(reg) cnt,
            options(nostack, nomem, preserves_flags)
        );
    }
    cnt
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline(always)]
pub fn read_tsc() -> u64 { epoch_ns() }

/// Convert a raw TSC read to epoch nanoseconds using the boot calibration.
#[inline(always)]
pub fn tsc_epoch_ns(cal: &TscCal) -> u64 {
    if !cal.valid { return epoch_ns(); }
    let delta = read_tsc().wrapping_sub(cal.tsc_base);
    cal.epoch_base.wrapping_add(
        ((delta as u128 * cal.mult as u128) >> cal.shift) as u64
    )
}

/// Calibrate the TSC against CLOCK_REALTIME. Two-point calibration over 100ms,
/// then a validation sweep; falls back to clock_gettime if the fit is worse
/// than 1µs.
pub fn calibrate_tsc() -> TscCal {
    // Warm up caches (discard results)
    for _ in 0..100 {
        let _ = read_tsc();
        let _ = epoch_ns();
    }

    let tsc0 = read_tsc();
    let wall0 = epoch_ns();
    std::thread::sleep(Duration::from_millis(100));
    let tsc1 = read_tsc();
    let wall1 = epoch_ns();

    let tsc_delta = tsc1.wrapping_sub(tsc0);
    let wall_delta = wall1.saturating_sub(wall0);

    if tsc_delta == 0 || wall_delta == 0 {
        eprintln!("[FGW-TSC] WARNING: calibration failed (zero delta). Using clock_gettime fallback.");
        return TscCal::fallback();
    }

    // ns_per_tick as fixed point: mult / 2^shift
    let shift: u32 = 32;
    let mult = ((wall_delta as u128) << shift) / (tsc_delta as u128);
    if mult > u32::MAX as u128 {
        eprintln!("[FGW-TSC] WARNING: counter frequency too low for u32 mult. Using fallback.");
        return TscCal::fallback();
    }
    let mult = mult as u32;

    let tsc_base = read_tsc();
    let epoch_base = epoch_ns();
    let cal = TscCal { tsc_base, epoch_base, mult, shift, valid: true };

    // Validation: compare tsc_epoch_ns() vs epoch_ns() over 1000 samples.
    let mut max_error: i64 = 0;
    for _ in 0..1000 {
        let tsc_time = tsc_epoch_ns(&cal) as i64;
        let wall_time = epoch_ns() as i64;
        let err = (tsc_time - wall_time).abs();
        if err > max_error { max_error = err; }
    }

    let freq_mhz = (tsc_delta as u128 * 1000) / (wall_delta as u128);
    eprintln!("[FGW-TSC] Calibrated: freq={}.{}MHz mult={} shift={} max_err={}ns",
        freq_mhz / 1000, freq_mhz % 1000, mult, shift, max_error);

    if max_error > 1000 {
        eprintln!("[FGW-TSC] WARNING: calibration error {}ns > 1µs. Using clock_gettime fallback.", max_error);
        return TscCal::fallback();
    }

    cal
}

// ============================================================================
// CPU MANAGEMENT
// ============================================================================

/// Number of online CPUs, or 0 if the kernel won't say.
pub fn online_cpus() -> usize {
    // SAFETY: sysconf is always safe to call.
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if n < 0 { 0 } else { n as usize }
}

pub fn pin_to_core(core_id: usize) {
    // SAFETY: cpu_set_t is repr(C) and all-zeroes is a valid bit pattern.
    unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core_id, &mut cpuset);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &cpuset) != 0 {
            fatal(E_AFFINITY_FAIL, "sched_setaffinity failed");
        }
    }
}

/// Re-read the kernel's view of our affinity mask and refuse to run on a
/// mismatch. A silently unpinned gateway thread defeats the latency budget.
pub fn verify_affinity(expected_core: usize) {
    use std::io::BufRead;
    // SAFETY: SYS_gettid always returns a valid TID on Linux.
    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    let path = format!("/proc/self/task/{}/status", tid);
    let file = match std::fs::File::open(&path) {
        Ok(f) => f, Err(_) => match std::fs::File::open("/proc/self/status") {
            Ok(f) => f, Err(_) => fatal(E_AFFINITY_VERIFY, "Cannot open status file"),
        }
    };
    for l in std::io::BufReader::new(file).lines().map_while(Result::ok) {
        if l.starts_with("Cpus_allowed_list:") {
            let mask = l.split_whitespace().last().unwrap_or("");
            if mask != expected_core.to_string() {
                fatal(E_AFFINITY_VERIFY, "Core affinity mismatch");
            }
            return;
        }
    }
    fatal(E_AFFINITY_VERIFY, "Could not verify affinity");
}
