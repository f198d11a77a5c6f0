// FEEDGATE — Orchestrator
// Wires the pieces together: CLI, signal handling, the SPSC ring, the
// consumer drain thread (standing in for the book builder), and the gateway
// itself on the pinned core.

use std::sync::atomic::{AtomicBool, Ordering};

use feedgate::engine::runtime::E_BAD_ARGS;
use feedgate::engine::spsc::make_spsc;
use feedgate::engine::venue::Venue;
use feedgate::network::gateway::{Gateway, GatewayConfig};
use feedgate::network::{MarketUpdate, DEFAULT_RX_BUF};

/// Entries in the gateway → book-builder ring. 1024 slots × ~16 KiB ≈ 17 MB,
/// sized so a busy venue burst never stalls the producer in practice.
const QUEUE_CAPACITY: usize = 1024;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);
extern "C" fn signal_handler(_sig: i32) { SHUTDOWN.store(true, Ordering::Relaxed); }

fn usage() -> ! {
    eprintln!(
        "Usage: feedgate --venue {{bitmex|bitmex-testnet|kraken|mock-bitmex|mock-kraken}} \
         [--portfolio {{3|50|92|122}}] [--gateway-cpu N] [--sqpoll-cpu N] \
         [--ring-entries N] [--rx-buf BYTES] [--pipe-fd FD]"
    );
    std::process::exit(E_BAD_ARGS);
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    // SAFETY: signal_handler is a valid extern "C" fn with a stable address;
    // it only performs an atomic Relaxed store, async-signal-safe per POSIX.
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as *const () as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as *const () as libc::sighandler_t);
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("[FGW] PANIC: {}", info);
        std::process::exit(1);
    }));

    let mut venue: Option<Venue> = None;
    let mut portfolio: usize = 3;
    let mut gateway_cpu: usize = 1;
    let mut sqpoll_cpu: u32 = 0;
    let mut ring_entries: u32 = 256;
    let mut rx_buf: usize = DEFAULT_RX_BUF;
    let mut pipe_fd: Option<i32> = None;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = args.get(i + 1);
        match (flag, value) {
            ("--venue", Some(v)) => {
                venue = Venue::parse(v);
                if venue.is_none() {
                    eprintln!("[FGW] unknown venue: {}", v);
                    usage();
                }
            }
            ("--portfolio", Some(v)) => portfolio = v.parse().unwrap_or_else(|_| usage()),
            ("--gateway-cpu", Some(v)) => gateway_cpu = v.parse().unwrap_or_else(|_| usage()),
            ("--sqpoll-cpu", Some(v)) => sqpoll_cpu = v.parse().unwrap_or_else(|_| usage()),
            ("--ring-entries", Some(v)) => ring_entries = v.parse().unwrap_or_else(|_| usage()),
            ("--rx-buf", Some(v)) => rx_buf = v.parse().unwrap_or_else(|_| usage()),
            ("--pipe-fd", Some(v)) => pipe_fd = Some(v.parse().unwrap_or_else(|_| usage())),
            _ => usage(),
        }
        i += 2;
    }

    let venue = venue.unwrap_or_else(|| usage());
    let symbols = match venue.portfolio(portfolio) {
        Some(s) => s,
        None => {
            eprintln!("[FGW] venue {} has no portfolio of size {}", venue.label(), portfolio);
            usage();
        }
    };

    let (producer, mut consumer) = make_spsc::<MarketUpdate>(QUEUE_CAPACITY);

    // The book builder lives in its own component; this drain thread stands in
    // for it so the gateway runs end to end, reporting what it pops.
    let drain = std::thread::Builder::new()
        .name("fgw-consumer".into())
        .spawn(move || {
            let mut entry = Box::new(MarketUpdate::EMPTY);
            let mut popped: u64 = 0;
            let mut last_report: u64 = 0;
            loop {
                if consumer.pop(&mut entry) {
                    popped += 1;
                    if popped.wrapping_sub(last_report) >= 1000 {
                        last_report = popped;
                        let decrypt_latency =
                            entry.ts_decrypt_complete.saturating_sub(entry.ts_rx_kernel);
                        eprintln!(
                            "[FGW-CONSUMER] popped {} entries (last: {}B, rx→decrypt {}ns)",
                            popped,
                            entry.len,
                            decrypt_latency,
                        );
                    }
                } else if SHUTDOWN.load(Ordering::Relaxed) {
                    break;
                } else {
                    std::hint::spin_loop();
                }
            }
            eprintln!("[FGW-CONSUMER] drained {} entries total", popped);
        })
        .expect("consumer thread spawn failed");

    let cfg = GatewayConfig {
        venue,
        symbols,
        gateway_cpu,
        sqpoll_cpu,
        ring_entries,
        rx_buf,
        pipe_fd,
    };

    let mut gateway = Gateway::init(producer, cfg);
    gateway.run(&SHUTDOWN);

    SHUTDOWN.store(true, Ordering::Relaxed);
    let _ = drain.join();
}

#[cfg(not(target_os = "linux"))]
compile_error!("feedgate requires Linux (io_uring, epoll, SO_TIMESTAMP)");
