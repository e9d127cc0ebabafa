//! Bourse server binary.
//!
//! `bourse -p <port>`: listen for clients, serve each on its own thread, and
//! on SIGHUP drain everything and exit cleanly: close the listener,
//! half-close every client socket, wait for the session threads to unwind,
//! then tear down the exchange (refunding resting orders).

use bourse::audit::{AuditLog, StdoutAudit};
use bourse::{
    client_service, AccountLedger, ClientRegistry, Exchange, ServerContext, TraderRegistry,
};
use clap::Parser;
use log::{error, info, warn};
use std::net::TcpListener;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

/// Continuous double-auction exchange server for a single instrument.
#[derive(Parser)]
#[command(name = "bourse", version, about)]
struct Args {
    /// TCP port to listen on.
    #[arg(short = 'p', long = "port")]
    port: u16,
}

static SHUTDOWN: AtomicBool = AtomicBool::new(false);
static LISTEN_FD: AtomicI32 = AtomicI32::new(-1);

/// Signal handler: flag the shutdown and close the listening socket so the
/// accept loop unblocks. Only async-signal-safe calls here.
extern "C" fn on_sighup(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
    let fd = LISTEN_FD.swap(-1, Ordering::SeqCst);
    if fd >= 0 {
        unsafe { libc::close(fd) };
    }
}

fn install_sighup_handler() -> std::io::Result<()> {
    let handler: extern "C" fn(libc::c_int) = on_sighup;
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler as usize;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = 0;
        if libc::sigaction(libc::SIGHUP, &action, std::ptr::null_mut()) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = install_sighup_handler() {
        error!("failed to install SIGHUP handler: {}", e);
        std::process::exit(1);
    }

    // Leaf-first construction: connections, accounts, sessions, exchange.
    let clients = Arc::new(ClientRegistry::new());
    let ledger = Arc::new(AccountLedger::new());
    let traders = Arc::new(TraderRegistry::new());
    let audit: Arc<dyn AuditLog> = Arc::new(StdoutAudit);
    let exchange = Exchange::start(Arc::clone(&traders), Arc::clone(&audit));

    let listener = match TcpListener::bind(("0.0.0.0", args.port)) {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind port {}: {}", args.port, e);
            std::process::exit(1);
        }
    };
    LISTEN_FD.store(listener.as_raw_fd(), Ordering::SeqCst);
    info!("bourse server listening on port {}", args.port);

    let ctx = Arc::new(ServerContext {
        ledger,
        traders,
        clients: Arc::clone(&clients),
        exchange: Arc::clone(&exchange),
        audit,
    });

    while !SHUTDOWN.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                info!("accepted client {}", addr);
                let ctx = Arc::clone(&ctx);
                std::thread::spawn(move || client_service(stream, ctx));
            }
            Err(e) => {
                if SHUTDOWN.load(Ordering::SeqCst) {
                    break;
                }
                warn!("accept failed: {}", e);
            }
        }
    }
    // The signal handler already closed the listening socket; the fd may
    // have been reused, so it must not be closed a second time on drop.
    std::mem::forget(listener);

    info!("draining client connections");
    clients.shutdown_all();
    clients.wait_for_empty();
    exchange.shutdown();
    info!("bourse server terminating");
}
