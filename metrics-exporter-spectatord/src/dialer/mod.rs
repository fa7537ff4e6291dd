use std::{
    fmt, fs,
    io::{self, Write as _},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs as _, UdpSocket},
    path::{Path, PathBuf},
    str::FromStr,
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, TcpKeepalive, Type};
use tracing::{debug, error};

use crate::Error;

mod netns;
use self::netns::NamespaceGuard;

/// Network used to reach spectatord.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    /// Connected UDP datagram socket.
    Udp,

    /// TCP stream, with each message terminated by a newline.
    Tcp,
}

impl Network {
    /// Returns the name of the network, such as `udp`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Network::Udp => "udp",
            Network::Tcp => "tcp",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "udp" => Ok(Network::Udp),
            "tcp" => Ok(Network::Tcp),
            other => Err(format!("unsupported network '{}' (expected 'udp' or 'tcp')", other)),
        }
    }
}

/// Timeouts applied when dialing and writing.
#[derive(Clone, Debug)]
pub struct DialOptions {
    /// Maximum time to wait for a stream connection to be established.
    pub connect_timeout: Duration,

    /// Idle time before TCP keep-alive probes are sent. `None` disables keep-alive.
    pub keep_alive: Option<Duration>,

    /// Maximum time a single write may block. `None` means writes may block indefinitely.
    pub write_timeout: Option<Duration>,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            keep_alive: Some(Duration::from_secs(30)),
            write_timeout: Some(Duration::from_secs(1)),
        }
    }
}

/// An open connection to spectatord.
pub enum Connection {
    /// Connected datagram socket. Each send is a single, atomic datagram.
    Udp(UdpSocket),

    /// Stream socket. Writes are serialized so that messages from concurrent callers do not interleave.
    Tcp(Mutex<TcpStream>),
}

impl Connection {
    /// Sends a single message.
    pub(crate) fn send(&self, msg: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Udp(socket) => socket.send(msg),
            Connection::Tcp(stream) => {
                let mut framed = Vec::with_capacity(msg.len() + 1);
                framed.extend_from_slice(msg);
                framed.push(b'\n');

                stream.lock().write_all(&framed)?;
                Ok(msg.len())
            }
        }
    }

    /// Closes the connection.
    pub(crate) fn close(self) -> io::Result<()> {
        match self {
            Connection::Udp(socket) => {
                drop(socket);
                Ok(())
            }
            Connection::Tcp(stream) => match stream.into_inner().shutdown(Shutdown::Both) {
                // The peer going away first is not a failure to close.
                Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
                result => result,
            },
        }
    }

    /// Returns the network this connection was made over.
    pub fn network(&self) -> Network {
        match self {
            Connection::Udp(_) => Network::Udp,
            Connection::Tcp(_) => Network::Tcp,
        }
    }

    /// Returns the local address of the connection.
    ///
    /// # Errors
    ///
    /// If the address cannot be queried from the underlying socket, an error is returned.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Connection::Udp(socket) => socket.local_addr(),
            Connection::Tcp(stream) => stream.lock().local_addr(),
        }
    }
}

impl From<UdpSocket> for Connection {
    fn from(socket: UdpSocket) -> Self {
        Connection::Udp(socket)
    }
}

impl From<TcpStream> for Connection {
    fn from(stream: TcpStream) -> Self {
        Connection::Tcp(Mutex::new(stream))
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("network", &self.network())
            .field("local_addr", &self.local_addr().ok())
            .finish()
    }
}

/// Dials `address` from the caller's current network namespace.
///
/// Only the first resolved address is tried: there is no fallback between IPv4 and IPv6.
///
/// # Errors
///
/// If the address cannot be resolved, or the socket cannot be created or connected, an error is returned.
pub fn dial(network: Network, address: &str, options: &DialOptions) -> Result<Connection, Error> {
    let dial_error = |source| Error::Dial { network, address: address.to_string(), source };

    let addr = address
        .to_socket_addrs()
        .map_err(dial_error)?
        .next()
        .ok_or_else(|| dial_error(io::Error::new(io::ErrorKind::AddrNotAvailable, "address did not resolve")))?;

    let connection = match network {
        Network::Udp => {
            let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
                .map_err(dial_error)?;
            socket.connect(&addr.into()).map_err(dial_error)?;
            socket.set_write_timeout(options.write_timeout).map_err(dial_error)?;
            Connection::Udp(socket.into())
        }
        Network::Tcp => {
            let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
                .map_err(dial_error)?;
            if let Some(keep_alive) = options.keep_alive {
                socket
                    .set_tcp_keepalive(&TcpKeepalive::new().with_time(keep_alive))
                    .map_err(dial_error)?;
            }
            socket.connect_timeout(&addr.into(), options.connect_timeout).map_err(dial_error)?;
            socket.set_write_timeout(options.write_timeout).map_err(dial_error)?;
            Connection::from(TcpStream::from(socket))
        }
    };

    debug!(%network, address, %addr, "Dialed spectatord.");
    Ok(connection)
}

/// Dials connections from inside a specific, pre-existing network namespace.
///
/// Namespace membership is a property of an OS thread, not of the process. Each dial therefore runs on a dedicated,
/// short-lived thread which enters the target namespace, dials, and switches back before exiting. The caller's own
/// thread never changes namespace, and the dedicated thread is released on every exit path.
#[derive(Clone, Debug)]
pub struct NamespaceDialer {
    path: PathBuf,
    options: DialOptions,
}

impl NamespaceDialer {
    /// Creates a new `NamespaceDialer` for the namespace handle at `path`.
    ///
    /// # Errors
    ///
    /// If nothing exists at `path`, [`Error::UnknownIsolationDomain`] is returned. If `path` cannot be inspected for
    /// any other reason, [`Error::Namespace`] is returned.
    pub fn new<P>(path: P, options: DialOptions) -> Result<Self, Error>
    where
        P: Into<PathBuf>,
    {
        let path = path.into();
        match fs::metadata(&path) {
            Ok(_) => Ok(Self { path, options }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::UnknownIsolationDomain { path }),
            Err(source) => Err(Error::Namespace { path, source }),
        }
    }

    /// Returns the path of the namespace handle.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dials `address` from inside the namespace.
    ///
    /// The original namespace is restored whether or not the dial succeeded. If restoring fails, that error is
    /// returned even when the dial itself succeeded, and the freshly dialed connection is closed.
    ///
    /// # Errors
    ///
    /// If the namespace cannot be entered, the dial fails, or the original namespace cannot be restored, an error is
    /// returned. When both the dial and the restore fail, the dial error is returned.
    pub fn dial(&self, network: Network, address: &str) -> Result<Connection, Error> {
        thread::scope(|scope| {
            let handle = thread::Builder::new()
                .name("spectatord-netns-dialer".to_string())
                .spawn_scoped(scope, || self.dial_on_current_thread(network, address))
                .map_err(|source| Error::NamespaceSwitch { action: "pin", source })?;

            handle.join().unwrap_or_else(|_| {
                Err(Error::NamespaceSwitch {
                    action: "pin",
                    source: io::Error::new(io::ErrorKind::Other, "namespace dialer thread panicked"),
                })
            })
        })
    }

    fn dial_on_current_thread(&self, network: Network, address: &str) -> Result<Connection, Error> {
        let guard = NamespaceGuard::enter(&self.path)?;

        let dialed = dial(network, address, &self.options);
        let restored = guard.restore();

        match (dialed, restored) {
            (Ok(connection), Ok(())) => Ok(connection),
            (Err(e), restored) => {
                if let Err(restore_error) = restored {
                    error!(error = %restore_error, "Failed to restore network namespace after failed dial.");
                }
                Err(e)
            }
            (Ok(connection), Err(e)) => {
                if let Err(close_error) = connection.close() {
                    debug!(error = %close_error, "Failed to close connection after namespace restore failure.");
                }
                Err(e)
            }
        }
    }
}
