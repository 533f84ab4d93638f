//! Role-specific socket handling.
//!
//! A [`Link`] owns the OS sockets of one open transport. The worker loops in
//! [`crate::transport`] are written once against this trait; the two
//! implementations differ only in how a peer is obtained and what happens
//! when it goes away.

use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

/// Pause between non-blocking accept attempts while no peer is attached.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Pending connections the listener queues while a peer is served.
const LISTEN_BACKLOG: i32 = 1;

/// Which end of the connection a transport is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Listens and serves one peer at a time.
    Server,
    /// Connects to a listening peer.
    Client,
}

impl Role {
    /// Get the role name used in logs, thread names and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`Link::accept_if_needed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attach {
    /// A peer is attached and can be read from.
    Ready,
    /// A new peer was accepted during this call.
    Accepted(SocketAddr),
    /// No peer yet; try again next cycle.
    Waiting,
}

/// What is left of a link after its peer was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterLoss {
    /// The link keeps listening for the next peer.
    Listening,
    /// The link is finished and must be shut down.
    Finished,
}

/// Socket capability of one transport role.
///
/// Methods take `&self` so the reader and writer workers can use the link
/// concurrently. `drop_peer` and `shutdown` are only called while both
/// direction guards of the owning transport are held.
pub trait Link: Send + Sync + Sized + 'static {
    /// Role implemented by this link.
    const ROLE: Role;

    /// Allocate the socket for `addr`, with `timeout` on blocking operations.
    fn open(addr: SocketAddr, timeout: Duration) -> io::Result<Self>;

    /// Make sure a peer is attached, accepting one if the role requires it.
    ///
    /// Blocks for a bounded time at most.
    fn accept_if_needed(&self) -> io::Result<Attach>;

    /// Send part of `data` to the peer, returning the number of bytes written.
    fn send(&self, data: &[u8]) -> io::Result<usize>;

    /// Receive into `buf`. `Ok(0)` means the peer closed the connection.
    fn receive(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Check if a peer is currently attached.
    fn has_peer(&self) -> bool;

    /// Drop the current peer after it was lost.
    fn drop_peer(&self) -> AfterLoss;

    /// Local address of the socket.
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Shut every socket of the link down.
    fn shutdown(self);
}

fn configure_stream(stream: &TcpStream, timeout: Duration) -> io::Result<()> {
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    stream.set_nodelay(true)?;
    Ok(())
}

/// Bind a non-blocking listener with address reuse and a backlog of one.
fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

fn shutdown_stream(stream: &TcpStream) {
    // The peer may already be gone; nothing left to do in that case.
    let _ = stream.shutdown(Shutdown::Both);
}

/// Listening socket plus at most one accepted peer.
pub struct ServerLink {
    listener: TcpListener,
    peer: RwLock<Option<TcpStream>>,
    timeout: Duration,
}

impl Link for ServerLink {
    const ROLE: Role = Role::Server;

    fn open(addr: SocketAddr, timeout: Duration) -> io::Result<Self> {
        let listener = bind_listener(addr)?;
        Ok(ServerLink {
            listener,
            peer: RwLock::new(None),
            timeout,
        })
    }

    fn accept_if_needed(&self) -> io::Result<Attach> {
        if self.peer.read().is_some() {
            return Ok(Attach::Ready);
        }
        match self.listener.accept() {
            Ok((stream, remote)) => {
                // Accepted sockets inherit non-blocking mode on some platforms.
                stream.set_nonblocking(false)?;
                configure_stream(&stream, self.timeout)?;
                *self.peer.write() = Some(stream);
                Ok(Attach::Accepted(remote))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
                Ok(Attach::Waiting)
            }
            Err(e) => Err(e),
        }
    }

    fn send(&self, data: &[u8]) -> io::Result<usize> {
        match self.peer.read().as_ref() {
            Some(mut stream) => stream.write(data),
            // Nobody to deliver to: the chunk is discarded.
            None => Ok(data.len()),
        }
    }

    fn receive(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self.peer.read().as_ref() {
            Some(mut stream) => stream.read(buf),
            None => Err(ErrorKind::WouldBlock.into()),
        }
    }

    fn has_peer(&self) -> bool {
        self.peer.read().is_some()
    }

    fn drop_peer(&self) -> AfterLoss {
        if let Some(stream) = self.peer.write().take() {
            shutdown_stream(&stream);
        }
        AfterLoss::Listening
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn shutdown(self) {
        if let Some(stream) = self.peer.into_inner() {
            shutdown_stream(&stream);
        }
    }
}

/// Connected client socket.
pub struct ClientLink {
    stream: TcpStream,
}

impl Link for ClientLink {
    const ROLE: Role = Role::Client;

    fn open(addr: SocketAddr, timeout: Duration) -> io::Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        configure_stream(&stream, timeout)?;
        Ok(ClientLink { stream })
    }

    fn accept_if_needed(&self) -> io::Result<Attach> {
        Ok(Attach::Ready)
    }

    fn send(&self, data: &[u8]) -> io::Result<usize> {
        (&self.stream).write(data)
    }

    fn receive(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.stream).read(buf)
    }

    fn has_peer(&self) -> bool {
        true
    }

    fn drop_peer(&self) -> AfterLoss {
        AfterLoss::Finished
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    fn shutdown(self) {
        shutdown_stream(&self.stream);
    }
}
