//! Tokio front end: the accept loop and per-connection drivers.
//!
//! All protocol and state work happens synchronously under one lock;
//! the async layer only waits for socket readiness and wakeups, takes
//! the lock, and runs the engine callbacks. The lock is never held
//! across an await.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::Interest;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::{on_readable, on_writable, Transport};
use crate::state::ServerState;
use crate::Result;

/// `Transport` over a tokio `TcpStream`, using the nonblocking
/// `try_read`/`try_write` calls.
struct TcpTransport<'a> {
    stream: &'a TcpStream,
}

impl Transport for TcpTransport<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.try_read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.try_write(buf)
    }
}

pub struct Server {
    state: Arc<Mutex<ServerState>>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState::new(config))),
        }
    }

    pub fn state(&self) -> Arc<Mutex<ServerState>> {
        Arc::clone(&self.state)
    }

    pub async fn run(&self) -> Result<()> {
        let addr = {
            let state = self.state.lock();
            format!("{}:{}", state.config.server.bind, state.config.server.port)
        };
        let listener = TcpListener::bind(&addr).await?;
        info!("Listening on {}", addr);
        self.run_on(listener).await
    }

    pub async fn run_on(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, addr) = listener.accept().await?;
            let id = {
                let mut state = self.state.lock();
                match state.register_connection(addr.ip().to_string()) {
                    Ok(id) => id,
                    Err(e) => {
                        warn!("Rejecting connection from {}: {}", addr, e);
                        continue;
                    }
                }
            };
            info!("Client connected from {}", addr);
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                connection_loop(state, id, stream).await;
            });
        }
    }
}

/// Drives one connection until its user entity quits, then frees it.
async fn connection_loop(state: Arc<Mutex<ServerState>>, id: Uuid, stream: TcpStream) {
    let wakeup = {
        let state = state.lock();
        state.user(id).wakeup_handle()
    };

    loop {
        let (want_write, doomed, quit) = {
            let state = state.lock();
            (state.want_write(id), state.doom_reason(id), state.is_quit(id))
        };
        if quit {
            break;
        }
        if let Some(reason) = doomed {
            let mut state = state.lock();
            state.disconnect_user(id, &reason);
            let mut transport = TcpTransport { stream: &stream };
            let _ = state.flush(id, &mut transport);
            break;
        }

        let interest = if want_write {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };

        tokio::select! {
            ready = stream.ready(interest) => {
                match ready {
                    Ok(ready) => {
                        let mut state = state.lock();
                        let mut transport = TcpTransport { stream: &stream };
                        if ready.is_readable() || ready.is_read_closed() {
                            on_readable(&mut state, id, &mut transport);
                        }
                        if ready.is_writable() {
                            on_writable(&mut state, id, &mut transport);
                        }
                    }
                    Err(e) => {
                        debug!("Socket error: {}", e);
                        let mut state = state.lock();
                        state.disconnect_user(id, "Socket error");
                        break;
                    }
                }
            }
            _ = wakeup.notified() => {
                // Another user queued output for us, or doomed us; the
                // next loop iteration picks either up.
                let mut state = state.lock();
                let mut transport = TcpTransport { stream: &stream };
                on_writable(&mut state, id, &mut transport);
            }
        }
    }

    let mut state = state.lock();
    if !state.is_quit(id) {
        state.disconnect_user(id, "Connection task exited");
    }
    state.release_connection(id);
    debug!("Connection task for {} finished", id);
}
