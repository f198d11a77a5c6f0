// FEEDGATE — NETWORK: GATEWAY
// The producer side, whole: pins itself to the gateway core, brings up the
// ring and the N venue connections serially, registers the socket array as
// fixed files, then services a level-triggered epoll set forever. Every
// watcher fire runs one read cycle:
//
//   readiness → recvmsg SQE on the fixed slot → reap completion
//             → feed ciphertext to the record pump → drain plaintext
//             → stamp the timestamp quadruple → push to the SPSC ring
//
// Exactly one cycle is in flight per connection; all per-connection state is
// owned here and touched only by the gateway thread.

use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cryptography::pump::RecordPump;
use crate::engine::runtime::{
    self, calibrate_tsc, fatal, tsc_epoch_ns, TscCal,
    E_CPU_COUNT, E_EPOLL_INIT, E_FIXED_FILES, E_PIPE_WRITE, E_RING_INIT,
};
use crate::engine::spsc::Producer;
use crate::engine::venue::Venue;
use crate::network::reactor::{cmsg_rx_timestamp, Reactor, CTRL_BUF_LEN};
use crate::network::session::{self, TlsConfigs};
use crate::network::{MarketUpdate, RX_BUF_CAPACITY};

const TELEMETRY_INTERVAL_NS: u64 = 1_000_000_000;

pub struct GatewayConfig {
    pub venue: Venue,
    pub symbols: &'static [&'static str],
    pub gateway_cpu: usize,
    pub sqpoll_cpu: u32,
    pub ring_entries: u32,
    pub rx_buf: usize,
    /// Write end of the order manager's pipe for the ring-FD hand-off.
    pub pipe_fd: Option<RawFd>,
}

/// One venue subscription. Establishment is synchronous and serial, so the
/// Connecting/Subscribing stages never outlive bootstrap; at runtime a
/// connection is either serving reads or terminally closed.
struct Connection {
    sock: std::net::TcpStream,
    pump: RecordPump,
    symbol: String,
    open: bool,
}

/// Fixed read-cycle buffers, sized once at bootstrap and never grown. The
/// iovec/msghdr pair is rebuilt on the stack each cycle — the submit/reap pair
/// is synchronous, so nothing needs to outlive the cycle.
struct ReadContext {
    ciphertext: Box<[u8]>,
    ctrl: [u8; CTRL_BUF_LEN],
}

#[derive(Default)]
struct Stats {
    rx: u64,
    published: u64,
    stalls: u64,
    decrypt_fail: u64,
    read_err: u64,
    closed: u64,
}

pub struct Gateway {
    reactor: Reactor,
    epfd: RawFd,
    conns: Vec<Connection>,
    ctxs: Vec<ReadContext>,
    producer: Producer<MarketUpdate>,
    /// Reused queue-entry scratch: the hot path never allocates and never
    /// zeroes 16 KiB per packet.
    scratch: Box<MarketUpdate>,
    cal: TscCal,
    stats: Stats,
    last_report_ns: u64,
    venue: Venue,
}

impl Gateway {
    /// Blocks until all N sockets are established and subscribed. Every
    /// bootstrap failure is fatal with its diagnostic code — nothing partial
    /// survives into the service loop.
    pub fn init(producer: Producer<MarketUpdate>, cfg: GatewayConfig) -> Gateway {
        let cores = runtime::online_cpus();
        if cores == 0 {
            fatal(E_CPU_COUNT, "Unable to determine the number of CPU cores");
        }
        if cores <= cfg.gateway_cpu {
            fatal(E_CPU_COUNT, "Not enough cores for the configured gateway CPU");
        }
        if cfg.rx_buf == 0 || cfg.rx_buf > RX_BUF_CAPACITY {
            fatal(runtime::E_BAD_ARGS, "rx-buf must be in 1..=16384");
        }
        runtime::pin_to_core(cfg.gateway_cpu);
        runtime::verify_affinity(cfg.gateway_cpu);

        // Submission-queue polling needs root; silently fall back otherwise.
        // The sqpoll thread must not share the gateway core.
        // SAFETY: geteuid has no preconditions.
        let is_root = unsafe { libc::geteuid() } == 0;
        let sqpoll = if is_root && cfg.sqpoll_cpu as usize != cfg.gateway_cpu {
            Some(cfg.sqpoll_cpu)
        } else {
            if is_root {
                eprintln!("[FGW-BOOT] sqpoll CPU equals gateway CPU; polling disabled");
            } else {
                eprintln!("[FGW-BOOT] not root: submission queue polling disabled");
            }
            None
        };

        let reactor = match Reactor::new(cfg.ring_entries, sqpoll) {
            Ok(r) => r,
            Err(e) => fatal(E_RING_INIT, &format!("io_uring init failed: {}", e)),
        };

        // The sibling only shares the kernel poll thread, so the hand-off
        // happens exactly when polling is on.
        if reactor.sqpoll_enabled() {
            if let Some(pipe_fd) = cfg.pipe_fd {
                if let Err(e) = reactor.publish_ring_fd(pipe_fd) {
                    fatal(E_PIPE_WRITE, &format!("ring FD pipe write failed: {}", e));
                }
                eprintln!("[FGW-BOOT] ring fd {} published to order manager", reactor.ring_fd());
            }
        }

        // Serial establishment: the next client starts only after the
        // previous one's subscribe frame is out. Slot i == connection i.
        let configs = TlsConfigs::build();
        let mut conns = Vec::with_capacity(cfg.symbols.len());
        for (i, symbol) in cfg.symbols.iter().enumerate() {
            let est = match session::establish(cfg.venue, symbol, &configs) {
                Ok(e) => e,
                Err(e) => fatal(e.code(), &format!("connection {} ({}): {}", i, symbol, e)),
            };
            eprintln!("[FGW-BOOT] {} subscribed ({}/{})", symbol, i + 1, cfg.symbols.len());
            conns.push(Connection {
                pump: RecordPump::new(est.tls, RX_BUF_CAPACITY),
                sock: est.sock,
                symbol: est.symbol,
                open: true,
            });
        }

        let fds: Vec<RawFd> = conns.iter().map(|c| c.sock.as_raw_fd()).collect();
        if let Err(e) = reactor.register_sockets(&fds) {
            fatal(E_FIXED_FILES, &format!("fixed file registration failed: {}", e));
        }

        // SAFETY: epoll_create1 with valid flags.
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            fatal(E_EPOLL_INIT, "epoll_create1 failed");
        }
        for (i, fd) in fds.iter().enumerate() {
            // Level-triggered EPOLLIN; the token is the connection index.
            let mut ev = libc::epoll_event { events: libc::EPOLLIN as u32, u64: i as u64 };
            // SAFETY: epfd and fd are valid; ev is a live stack value.
            if unsafe { libc::epoll_ctl(epfd, libc::EPOLL_CTL_ADD, *fd, &mut ev) } != 0 {
                fatal(E_EPOLL_INIT, "epoll_ctl ADD failed");
            }
        }

        let ctxs = (0..conns.len())
            .map(|_| ReadContext {
                ciphertext: vec![0u8; cfg.rx_buf].into_boxed_slice(),
                ctrl: [0u8; CTRL_BUF_LEN],
            })
            .collect();

        let cal = calibrate_tsc();
        eprintln!(
            "[FGW-BOOT] gateway up: venue={} connections={} core={} sqpoll={}",
            cfg.venue.label(),
            conns.len(),
            cfg.gateway_cpu,
            reactor.sqpoll_enabled(),
        );

        Gateway {
            reactor,
            epfd,
            conns,
            ctxs,
            producer,
            scratch: Box::new(MarketUpdate::EMPTY),
            cal,
            stats: Stats::default(),
            last_report_ns: tsc_epoch_ns(&cal),
            venue: cfg.venue,
        }
    }

    /// Indefinite non-blocking service loop. Only the shutdown flag breaks
    /// it; each cycle is synchronous, so at the loop head no completion is in
    /// flight and teardown is always clean.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        let mut events =
            vec![libc::epoll_event { events: 0, u64: 0 }; self.conns.len().max(1)];

        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            // SAFETY: events is a live buffer of epoll_event; timeout 0 never
            // suspends.
            let n = unsafe {
                libc::epoll_wait(self.epfd, events.as_mut_ptr(), events.len() as i32, 0)
            };
            if n < 0 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                eprintln!("[FGW-RX] epoll_wait failed: {}", err);
                break;
            }

            for i in 0..n as usize {
                let idx = events[i].u64 as usize;
                self.read_cycle(idx);
            }

            // No reconnection: once every peer is gone there is nothing left
            // to serve.
            if self.stats.closed as usize == self.conns.len() {
                eprintln!("[FGW-RX] all {} connections closed; stopping", self.conns.len());
                break;
            }

            let now = tsc_epoch_ns(&self.cal);
            if now.saturating_sub(self.last_report_ns) > TELEMETRY_INTERVAL_NS {
                self.last_report_ns = now;
                eprintln!(
                    "[FGW-TELEMETRY] {} RX:{} PUB:{} STALL:{} DECRYPT_FAIL:{} READ_ERR:{} CLOSED:{}",
                    self.venue.label(),
                    self.stats.rx,
                    self.stats.published,
                    self.stats.stalls,
                    self.stats.decrypt_fail,
                    self.stats.read_err,
                    self.stats.closed,
                );
            }
        }

        eprintln!(
            "[FGW-RX] shutdown. RX:{} PUB:{} STALL:{} DECRYPT_FAIL:{} READ_ERR:{} CLOSED:{}",
            self.stats.rx,
            self.stats.published,
            self.stats.stalls,
            self.stats.decrypt_fail,
            self.stats.read_err,
            self.stats.closed,
        );
    }

    /// One full Idle → Submitted → Decrypting → Publishing pass for the given
    /// connection. Transient failures log and leave the watcher armed; the
    /// next readiness event retries.
    fn read_cycle(&mut self, idx: usize) {
        let conn = &mut self.conns[idx];
        if !conn.open {
            return;
        }
        let ctx = &mut self.ctxs[idx];

        let ts_poll_wake = tsc_epoch_ns(&self.cal);

        // The scatter-gather descriptor and msghdr live on this frame; the
        // submit/reap pair below is synchronous.
        let mut iov = libc::iovec {
            iov_base: ctx.ciphertext.as_mut_ptr() as *mut libc::c_void,
            iov_len: ctx.ciphertext.len(),
        };
        // SAFETY: msghdr is repr(C) and all-zeroes is a valid bit pattern.
        let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = ctx.ctrl.as_mut_ptr() as *mut libc::c_void;
        // SAFETY: CMSG_SPACE is a pure size computation.
        msg.msg_controllen =
            unsafe { libc::CMSG_SPACE(std::mem::size_of::<libc::timeval>() as u32) } as _;

        let res = match self.reactor.recvmsg_fixed(idx as u32, &mut msg) {
            Ok(r) => r,
            Err(e) => {
                self.stats.read_err += 1;
                eprintln!("[FGW-RX] conn {} ({}): ring submit failed: {}", idx, conn.symbol, e);
                return;
            }
        };
        let ts_read_complete = tsc_epoch_ns(&self.cal);
        self.stats.rx += 1;

        if res < 0 {
            self.stats.read_err += 1;
            eprintln!(
                "[FGW-RX] conn {} ({}): recvmsg error: {}",
                idx,
                conn.symbol,
                std::io::Error::from_raw_os_error(-res),
            );
            return;
        }
        if res == 0 {
            // Peer closed. Terminal: tear down the watcher, no reconnection.
            eprintln!("[FGW-RX] conn {} ({}): peer closed", idx, conn.symbol);
            conn.open = false;
            self.stats.closed += 1;
            // SAFETY: removing a registered fd from our epoll set.
            unsafe {
                libc::epoll_ctl(
                    self.epfd,
                    libc::EPOLL_CTL_DEL,
                    conn.sock.as_raw_fd(),
                    std::ptr::null_mut(),
                );
            }
            return;
        }

        let ts_rx_kernel = cmsg_rx_timestamp(&msg);

        let plain_len = match conn.pump.feed(&ctx.ciphertext[..res as usize]) {
            Ok(n) => n,
            Err(e) => {
                self.stats.decrypt_fail += 1;
                eprintln!("[FGW-TLS] conn {} ({}): {}", idx, conn.symbol, e);
                return;
            }
        };
        let ts_decrypt_complete = tsc_epoch_ns(&self.cal);

        // Partial record or handshake residue: nothing to publish this cycle.
        if plain_len == 0 {
            return;
        }

        let entry = &mut *self.scratch;
        entry.ts_rx_kernel = ts_rx_kernel;
        entry.ts_poll_wake = ts_poll_wake;
        entry.ts_read_complete = ts_read_complete;
        entry.ts_decrypt_complete = ts_decrypt_complete;
        entry.len = plain_len as u64;
        entry.payload[..plain_len].copy_from_slice(&conn.pump.plaintext()[..plain_len]);

        // Queue full means the book builder is lagging. Policy: block, never
        // drop — in-order delivery is load-bearing — and surface the stall.
        let mut spun = false;
        while !self.producer.push(&self.scratch) {
            spun = true;
            std::hint::spin_loop();
        }
        if spun {
            self.stats.stalls += 1;
        }
        self.stats.published += 1;
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        // SAFETY: closing an epoll fd we created.
        unsafe { libc::close(self.epfd) };
    }
}
