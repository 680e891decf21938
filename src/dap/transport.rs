//! Single client TCP transport with reconnection.
//!
//! [`DebugTransport::listen`] runs an accept loop on its own thread. Every accepted client
//! is served by the `accept` callback until it returns, after that the next client is awaited.
//! Engine threads may [`DebugTransport::send`] at any moment: frames are serialized under
//! one writer lock and silently dropped while no client is attached.

use crate::dap::codec::{read_frame, write_frame, TransportError};
use crate::dap::tracer::FileTracer;
use crate::debugger::utils::lock;
use log::{debug, info, warn};
use serde_json::Value;
use std::fmt::Display;
use std::io::{self, BufReader};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Default)]
pub struct DebugTransport {
    reader: Mutex<Option<BufReader<TcpStream>>>,
    writer: Mutex<Option<TcpStream>>,
    connected: (Mutex<bool>, Condvar),
    cancelled: AtomicBool,
    tracer: Option<FileTracer>,
}

impl DebugTransport {
    pub fn new(tracer: Option<FileTracer>) -> Self {
        Self {
            tracer,
            ..Default::default()
        }
    }

    /// Bind `addr` and serve clients one at a time with `accept`.
    pub fn listen<A, F, E>(
        self: &Arc<Self>,
        addr: A,
        mut accept: F,
    ) -> Result<Listener, TransportError>
    where
        A: ToSocketAddrs,
        F: FnMut() -> Result<(), E> + Send + 'static,
        E: Display,
    {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        info!(target: "transport", "listening on {local_addr}");

        let transport = self.clone();
        let handle = thread::Builder::new()
            .name("dap-accept".to_string())
            .spawn(move || {
                while !transport.is_cancelled() {
                    match listener.accept() {
                        Ok((stream, peer)) => transport.serve(stream, peer, &mut accept),
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            thread::sleep(ACCEPT_POLL_INTERVAL)
                        }
                        Err(e) => {
                            warn!(target: "transport", "accept failed: {e}");
                            thread::sleep(ACCEPT_POLL_INTERVAL);
                        }
                    }
                }
                debug!(target: "transport", "accept loop stopped");
            })?;

        Ok(Listener {
            local_addr,
            transport: self.clone(),
            handle: Some(handle),
        })
    }

    fn serve<F, E>(&self, stream: TcpStream, peer: SocketAddr, accept: &mut F)
    where
        F: FnMut() -> Result<(), E>,
        E: Display,
    {
        info!(target: "transport", "client connected: {peer}");
        if let Err(e) = self.attach(stream) {
            warn!(target: "transport", "failed to attach client {peer}: {e}");
            return;
        }

        match accept() {
            Ok(()) => info!(target: "transport", "client {peer} disconnected"),
            Err(e) => warn!(target: "transport", "session with {peer} ended: {e}"),
        }
        self.detach();
    }

    fn attach(&self, stream: TcpStream) -> io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);

        *lock(&self.reader) = Some(reader);
        *lock(&self.writer) = Some(stream);

        let (connected, cvar) = &self.connected;
        *lock(connected) = true;
        cvar.notify_all();
        Ok(())
    }

    fn detach(&self) {
        let (connected, _) = &self.connected;
        *lock(connected) = false;

        if let Some(stream) = lock(&self.writer).take() {
            _ = stream.shutdown(Shutdown::Both);
        }
        lock(&self.reader).take();
    }

    /// True while a client is attached.
    pub fn is_connected(&self) -> bool {
        *lock(&self.connected.0)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Block until a client is attached and a whole frame arrives from it.
    pub fn read(&self) -> Result<Value, TransportError> {
        {
            let (connected, cvar) = &self.connected;
            let mut connected = lock(connected);
            while !*connected && !self.is_cancelled() {
                connected = cvar
                    .wait(connected)
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
            }
        }
        if self.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let mut reader = lock(&self.reader);
        let reader = reader.as_mut().ok_or(TransportError::Closed)?;
        let frame = read_frame(reader).map_err(|e| {
            if self.is_cancelled() {
                TransportError::Cancelled
            } else {
                e
            }
        })?;

        if let Some(tracer) = &self.tracer {
            tracer.inbound(&frame);
        }
        Ok(frame)
    }

    /// Write one frame to the attached client, a no-op without a client.
    ///
    /// A failed write tears the connection down, the blocked reader then observes end of stream.
    pub fn send(&self, frame: &Value) -> Result<(), TransportError> {
        let mut writer = lock(&self.writer);
        let Some(stream) = writer.as_mut() else {
            return Ok(());
        };

        if let Some(tracer) = &self.tracer {
            tracer.outbound(frame);
        }
        if let Err(e) = write_frame(stream, frame) {
            if let Some(stream) = writer.take() {
                _ = stream.shutdown(Shutdown::Both);
            }
            return Err(e);
        }
        Ok(())
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(stream) = lock(&self.writer).as_ref() {
            _ = stream.shutdown(Shutdown::Both);
        }

        let (connected, cvar) = &self.connected;
        let _guard = lock(connected);
        cvar.notify_all();
    }
}

/// Handle of a running accept loop.
pub struct Listener {
    local_addr: SocketAddr,
    transport: Arc<DebugTransport>,
    handle: Option<JoinHandle<()>>,
}

impl Listener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, drop the current client and wait for the accept loop to finish.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.transport.cancel();
        if handle.join().is_err() {
            warn!(target: "transport", "accept loop panicked");
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use std::io::{BufRead, Write};
    use std::sync::mpsc;

    #[test]
    fn test_send_without_client() {
        let transport = DebugTransport::new(None);
        assert!(!transport.is_connected());
        transport.send(&json!({"seq": 1})).unwrap();
    }

    #[test]
    fn test_echo_and_reconnect() {
        let transport = Arc::new(DebugTransport::new(None));
        let (tx, rx) = mpsc::channel();

        let echo = transport.clone();
        let mut listener = transport
            .listen("127.0.0.1:0", move || -> Result<(), TransportError> {
                loop {
                    let frame = match echo.read() {
                        Ok(frame) => frame,
                        Err(e) if e.is_disconnect() => return Ok(()),
                        Err(e) => return Err(e),
                    };
                    echo.send(&frame)?;
                    _ = tx.send(frame["seq"].clone());
                }
            })
            .unwrap();

        for seq in [1, 2] {
            let mut stream = TcpStream::connect(listener.local_addr()).unwrap();
            write_frame(&mut stream, &json!({"seq": seq})).unwrap();

            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let back = read_frame(&mut reader).unwrap();
            assert_eq!(back["seq"], seq);
            assert_eq!(rx.recv().unwrap(), json!(seq));

            stream.shutdown(Shutdown::Both).unwrap();
        }

        listener.shutdown();
        assert!(transport.is_cancelled());
    }

    #[test]
    fn test_malformed_frame_drops_client() {
        let transport = Arc::new(DebugTransport::new(None));
        let reader = transport.clone();
        let mut listener = transport
            .listen("127.0.0.1:0", move || reader.read().map(|_| ()))
            .unwrap();

        let mut stream = TcpStream::connect(listener.local_addr()).unwrap();
        stream.write_all(b"Content-Length: nope\r\n\r\n").unwrap();

        // server closes the connection, we see end of stream
        let mut line = String::new();
        let n = BufReader::new(stream).read_line(&mut line).unwrap_or(0);
        assert_eq!(n, 0);

        listener.shutdown();
    }
}
