// FEEDGATE — NETWORK: IO_URING READ REACTOR
// One recvmsg in flight per connection, always against a registered file
// slot: the readiness watcher is the gating signal, so no completion
// demultiplexing ever happens on the hot path. With root privileges the
// submission queue is polled by a kernel thread pinned to its own CPU and
// submissions cost no syscall; without root a plain ring is used.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

use io_uring::{opcode, types, IoUring};

pub struct Reactor {
    ring: IoUring,
    sqpoll: bool,
}

impl Reactor {
    /// `sqpoll_cpu` engages kernel submission-queue polling bound to that CPU.
    /// The caller has already verified it differs from the gateway core.
    pub fn new(entries: u32, sqpoll_cpu: Option<u32>) -> io::Result<Reactor> {
        let mut builder = IoUring::builder();
        if let Some(cpu) = sqpoll_cpu {
            builder.setup_sqpoll(2000).setup_sqpoll_cpu(cpu);
        }
        let ring = builder.build(entries)?;
        Ok(Reactor { ring, sqpoll: sqpoll_cpu.is_some() })
    }

    pub fn sqpoll_enabled(&self) -> bool {
        self.sqpoll
    }

    pub fn ring_fd(&self) -> RawFd {
        self.ring.as_raw_fd()
    }

    /// Write the ring FD as 4 raw bytes into the order-management sibling's
    /// pipe so it can share the kernel poll thread across submitters.
    pub fn publish_ring_fd(&self, pipe_fd: RawFd) -> io::Result<()> {
        let fd: i32 = self.ring_fd();
        // SAFETY: pipe_fd is a pipe write end owned by the caller; the buffer
        // is a live i32 on this stack frame.
        let n = unsafe {
            libc::write(
                pipe_fd,
                &fd as *const i32 as *const libc::c_void,
                std::mem::size_of::<i32>(),
            )
        };
        if n != std::mem::size_of::<i32>() as isize {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Register the socket array as fixed files. Connection index == slot
    /// index, so subsequent submissions skip the descriptor-table lookup.
    pub fn register_sockets(&self, fds: &[RawFd]) -> io::Result<()> {
        self.ring.submitter().register_files(fds)
    }

    /// Submit one recvmsg against a fixed-file slot and reap exactly one
    /// completion. `msg` must stay valid until this returns — the caller keeps
    /// it on its stack frame across the synchronous wait. Returns the raw CQE
    /// result: bytes read, 0 on peer close, negative errno on failure.
    pub fn recvmsg_fixed(&mut self, slot: u32, msg: *mut libc::msghdr) -> io::Result<i32> {
        let sqe = opcode::RecvMsg::new(types::Fixed(slot), msg)
            .build()
            .user_data(slot as u64);

        // SAFETY: the msghdr, its iovec, and its control buffer outlive the
        // synchronous submit/reap pair below.
        unsafe {
            while self.ring.submission().push(&sqe).is_err() {
                self.ring.submit()?;
            }
        }
        self.ring.submit_and_wait(1)?;

        let cqe = self
            .ring
            .completion()
            .next()
            .ok_or_else(|| io::Error::other("ring signalled completion but CQ was empty"))?;
        Ok(cqe.result())
    }
}

// ============================================================================
// ANCILLARY TIMESTAMP EXTRACTION
// ============================================================================

/// Control buffer bytes needed for one SCM_TIMESTAMP. Sized generously; the
/// msghdr carries the exact CMSG_SPACE value.
pub const CTRL_BUF_LEN: usize = 64;

/// Pull the kernel receive timestamp out of a reaped recvmsg's control data
/// and compose tv_sec + tv_usec into epoch nanoseconds. Returns 0 when the
/// kernel attached no timestamp — the gateway never fabricates one.
pub fn cmsg_rx_timestamp(msg: &libc::msghdr) -> u64 {
    // SAFETY: CMSG_* walk the control buffer the kernel just filled; the
    // msghdr's msg_control/msg_controllen describe memory owned by the caller.
    unsafe {
        let cmsg = libc::CMSG_FIRSTHDR(msg as *const libc::msghdr);
        if cmsg.is_null() {
            return 0;
        }
        if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_TIMESTAMP {
            let mut tv = libc::timeval { tv_sec: 0, tv_usec: 0 };
            std::ptr::copy_nonoverlapping(
                libc::CMSG_DATA(cmsg) as *const u8,
                &mut tv as *mut libc::timeval as *mut u8,
                std::mem::size_of::<libc::timeval>(),
            );
            return tv.tv_sec as u64 * 1_000_000_000 + tv.tv_usec as u64 * 1_000;
        }
    }
    0
}
