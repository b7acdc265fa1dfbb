//! TLS connection context
//!
//! A [`TlsContext`] is one client connection: it owns the socket it
//! connected (or was handed), the engine and its session, and the last
//! error. The handshake is cooperatively suspendable. Every `connect*`
//! call and [`TlsContext::drive`] returns `Status::WantRead` or
//! `Status::WantWrite` when the descriptor is not ready; the caller waits
//! for readiness and calls `drive` (or the same `connect*`) again.
//!
//! # Lifecycle
//!
//! ```text
//! Idle -> Connecting <-> Suspended
//!            |               |
//!            v               v
//!       Established       Aborted
//! ```
//!
//! Any failure other than a state misuse moves the context to `Aborted`
//! and releases the engine session and the owned socket. [`TlsContext::close`]
//! returns a context in any state to `Idle`.

use super::cert::PeerCertificate;
use super::config::TlsConfig;
use super::error::{ErrorKind, ErrorState, TlsError};
use super::handshake::{Engine, EngineSession, FdPair, OpenSslEngine, Status};
use super::verify::check_servername;
use crate::net::resolve::{host_and_port, Resolve};
use crate::net::{literal_addr, Connector};
use socket2::Socket;
use std::os::fd::AsRawFd;
use std::sync::Arc;

/// Which side of the connection a context plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Readiness a suspended handshake waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

/// Lifecycle state of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No connection attempt yet, or closed
    Idle,
    /// Engine session initialized, handshake in progress
    Connecting,
    /// Handshake waiting for the descriptor
    Suspended(Interest),
    /// Handshake complete (and peer identity verified when configured)
    Established,
    /// Failed; only `close` or drop are meaningful now
    Aborted,
}

/// One TLS connection
pub struct TlsContext<E: Engine = OpenSslEngine> {
    config: Arc<TlsConfig>,
    role: Role,
    state: State,
    engine: E,
    // Released before `socket`
    session: Option<E::Session>,
    socket: Option<Socket>,
    fds: Option<FdPair>,
    servername: Option<String>,
    error: ErrorState,
}

impl TlsContext<OpenSslEngine> {
    /// Create a client context using OpenSSL
    pub fn client(config: Arc<TlsConfig>) -> Self {
        Self::with_engine(Role::Client, config, OpenSslEngine::new())
    }

    /// Create a server context using OpenSSL
    ///
    /// Server contexts refuse every client operation.
    pub fn server(config: Arc<TlsConfig>) -> Self {
        Self::with_engine(Role::Server, config, OpenSslEngine::new())
    }
}

impl<E: Engine> TlsContext<E> {
    /// Create a context driving a custom engine
    pub fn with_engine(role: Role, config: Arc<TlsConfig>, engine: E) -> Self {
        TlsContext {
            config,
            role,
            state: State::Idle,
            engine,
            session: None,
            socket: None,
            fds: None,
            servername: None,
            error: ErrorState::default(),
        }
    }

    /// Connect to `host` and verify the peer against `host` itself.
    ///
    /// Without `port`, a port embedded in `host` (`host:port`,
    /// `[v6]:port`) is used, then 443.
    pub fn connect(&mut self, host: &str, port: Option<&str>) -> Result<Status, TlsError> {
        self.connect_servername(host, port, None)
    }

    /// Connect to `host`, verifying the peer against `servername` if given.
    pub fn connect_servername(
        &mut self,
        host: &str,
        port: Option<&str>,
        servername: Option<&str>,
    ) -> Result<Status, TlsError> {
        self.connect_with(&Connector::new(), host, port, servername)
    }

    /// As [`connect_servername`](Self::connect_servername) with a custom connector
    pub fn connect_with<R: Resolve>(
        &mut self,
        connector: &Connector<R>,
        host: &str,
        port: Option<&str>,
        servername: Option<&str>,
    ) -> Result<Status, TlsError> {
        if self.is_handshaking() {
            return self.drive();
        }
        let checked = self.check_startable();
        self.guard(checked)?;

        let (host, port) = host_and_port(host, port);
        let connected = connector.connect(host, port).map_err(TlsError::from);
        let socket = self.guard(connected)?;

        self.connect_socket(socket, Some(servername.unwrap_or(host)))
    }

    /// Run the handshake over an already connected socket.
    ///
    /// The context takes ownership of the socket and closes it on teardown.
    pub fn connect_socket(
        &mut self,
        socket: impl Into<Socket>,
        servername: Option<&str>,
    ) -> Result<Status, TlsError> {
        let socket = socket.into();
        if self.is_handshaking() {
            return self.fail(TlsError::State(
                "handshake already in progress, call drive()".to_string(),
            ));
        }
        let checked = self.check_startable();
        self.guard(checked)?;

        let fd = socket.as_raw_fd();
        self.socket = Some(socket);
        self.connect_fds(fd, fd, servername)
    }

    /// Run the handshake over caller-owned read and write descriptors.
    ///
    /// While a handshake is in progress this resumes it, like [`drive`](Self::drive).
    pub fn connect_fds(
        &mut self,
        fd_read: i32,
        fd_write: i32,
        servername: Option<&str>,
    ) -> Result<Status, TlsError> {
        if self.is_handshaking() {
            return self.drive();
        }
        let started = self.begin(FdPair::new(fd_read, fd_write), servername);
        self.guard(started)?;
        self.drive()
    }

    /// Advance a suspended handshake.
    ///
    /// Returns `Ready` once the connection is established, including on
    /// repeated calls after that.
    pub fn drive(&mut self) -> Result<Status, TlsError> {
        let stepped = self.step();
        self.guard(stepped)
    }

    /// Read application data from an established connection
    pub fn read(&mut self, buf: &mut [u8]) -> Result<Status<usize>, TlsError> {
        let result = match self.established_session() {
            Ok(session) => session.read(buf),
            Err(e) => Err(e),
        };
        self.guard(result)
    }

    /// Write application data to an established connection
    pub fn write(&mut self, buf: &[u8]) -> Result<Status<usize>, TlsError> {
        let result = match self.established_session() {
            Ok(session) => session.write(buf),
            Err(e) => Err(e),
        };
        self.guard(result)
    }

    /// Close the connection and return the context to `Idle`.
    ///
    /// An established session first sends close-notify, which may suspend;
    /// call `close` again once the descriptor is ready.
    pub fn close(&mut self) -> Result<Status, TlsError> {
        if self.state == State::Established {
            if let Some(session) = self.session.as_mut() {
                match session.shutdown() {
                    Ok(Status::Ready(())) => {}
                    Ok(Status::WantRead) => return Ok(Status::WantRead),
                    Ok(Status::WantWrite) => return Ok(Status::WantWrite),
                    Err(e) => {
                        self.error.record(&e);
                        self.reset();
                        return Err(e);
                    }
                }
            }
        }
        self.reset();
        Ok(Status::Ready(()))
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &TlsConfig {
        &self.config
    }

    /// Last recorded error message
    pub fn error(&self) -> Option<&str> {
        self.error.message()
    }

    /// Numeric code of the last recorded error, if it had one
    pub fn error_code(&self) -> Option<i32> {
        self.error.code()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.kind()
    }

    /// Descriptors the handshake runs over, for readiness polling
    pub fn fds(&self) -> Option<FdPair> {
        self.fds
    }

    /// Name the peer is verified against
    pub fn servername(&self) -> Option<&str> {
        self.servername.as_deref()
    }

    /// Engine session, once initialized
    pub fn session(&self) -> Option<&E::Session> {
        self.session.as_ref()
    }

    /// Peer identity of an established connection
    pub fn peer_certificate(&self) -> Option<PeerCertificate> {
        match self.state {
            State::Established => self.session.as_ref()?.peer_certificate(),
            _ => None,
        }
    }

    pub fn is_handshaking(&self) -> bool {
        matches!(self.state, State::Connecting | State::Suspended(_))
    }

    fn check_startable(&self) -> Result<(), TlsError> {
        if self.role != Role::Client {
            return Err(TlsError::config("not a client context"));
        }
        match self.state {
            State::Idle => Ok(()),
            State::Established => Err(TlsError::State("already connected".to_string())),
            State::Aborted => Err(TlsError::State(
                "connection aborted, close it first".to_string(),
            )),
            State::Connecting | State::Suspended(_) => Err(TlsError::State(
                "handshake already in progress".to_string(),
            )),
        }
    }

    fn begin(&mut self, io: FdPair, servername: Option<&str>) -> Result<(), TlsError> {
        self.check_startable()?;
        if !io.is_valid() {
            return Err(TlsError::config("invalid file descriptors"));
        }
        if self.config.verify_name() && servername.is_none() {
            return Err(TlsError::config("server name not specified"));
        }

        // Literal addresses are not permitted in SNI
        let sni = servername.filter(|name| literal_addr(name).is_none());
        let session = self.engine.init(&self.config, io, sni)?;

        self.session = Some(session);
        self.fds = Some(io);
        self.servername = servername.map(str::to_string);
        self.state = State::Connecting;
        tracing::debug!(?servername, sni = sni.is_some(), "handshake initialized");
        Ok(())
    }

    fn step(&mut self) -> Result<Status, TlsError> {
        match self.state {
            State::Connecting | State::Suspended(_) => {}
            State::Established => return Ok(Status::Ready(())),
            State::Idle => return Err(TlsError::State("no handshake in progress".to_string())),
            State::Aborted => return Err(TlsError::State("connection aborted".to_string())),
        }

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| TlsError::State("no engine session".to_string()))?;

        match session.handshake()? {
            Status::Ready(()) => {}
            Status::WantRead => {
                self.state = State::Suspended(Interest::Read);
                tracing::trace!("handshake suspended, want read");
                return Ok(Status::WantRead);
            }
            Status::WantWrite => {
                self.state = State::Suspended(Interest::Write);
                tracing::trace!("handshake suspended, want write");
                return Ok(Status::WantWrite);
            }
        }

        self.state = State::Established;
        tracing::debug!(servername = ?self.servername, "handshake complete");

        if self.config.verify_name() {
            self.verify_peer()?;
        }
        Ok(Status::Ready(()))
    }

    fn verify_peer(&self) -> Result<(), TlsError> {
        let servername = self
            .servername
            .as_deref()
            .ok_or_else(|| TlsError::config("server name not specified"))?;
        let cert = self
            .session
            .as_ref()
            .and_then(|session| session.peer_certificate())
            .ok_or_else(|| TlsError::Verification("no peer certificate".to_string()))?;

        check_servername(&cert, servername).map_err(|e| {
            tracing::warn!(servername, error = %e, "peer identity mismatch");
            e
        })
    }

    fn established_session(&mut self) -> Result<&mut E::Session, TlsError> {
        if self.state != State::Established {
            return Err(TlsError::State(format!(
                "connection not established ({:?})",
                self.state
            )));
        }
        self.session
            .as_mut()
            .ok_or_else(|| TlsError::State("no engine session".to_string()))
    }

    fn guard<T>(&mut self, result: Result<T, TlsError>) -> Result<T, TlsError> {
        result.or_else(|e| self.fail(e))
    }

    /// Record `err`; anything but a state misuse also aborts the connection
    fn fail<T>(&mut self, err: TlsError) -> Result<T, TlsError> {
        tracing::debug!(kind = %err.kind(), error = %err, "tls failure");
        self.error.record(&err);
        if err.kind() != ErrorKind::State {
            self.release();
            self.state = State::Aborted;
        }
        Err(err)
    }

    fn reset(&mut self) {
        self.release();
        self.state = State::Idle;
    }

    fn release(&mut self) {
        self.session = None;
        self.socket = None;
        self.fds = None;
        self.servername = None;
    }
}

impl<E: Engine> Drop for TlsContext<E> {
    fn drop(&mut self) {
        if self.session.is_some() {
            tracing::trace!(state = ?self.state, "releasing tls session");
        }
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::cert::AltName;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::os::unix::net::UnixStream;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Done,
        WantRead,
        WantWrite,
        Fatal,
    }

    #[derive(Default)]
    struct Counters {
        inits: Cell<usize>,
        handshakes: Cell<usize>,
        drops: Cell<usize>,
        sni: RefCell<Vec<Option<String>>>,
    }

    struct MockEngine {
        counters: Rc<Counters>,
        script: Vec<Step>,
        peer: Option<PeerCertificate>,
    }

    struct MockSession {
        counters: Rc<Counters>,
        script: VecDeque<Step>,
        peer: Option<PeerCertificate>,
    }

    impl Engine for MockEngine {
        type Session = MockSession;

        fn init(
            &mut self,
            _config: &TlsConfig,
            _io: FdPair,
            servername: Option<&str>,
        ) -> Result<MockSession, TlsError> {
            self.counters.inits.set(self.counters.inits.get() + 1);
            self.counters
                .sni
                .borrow_mut()
                .push(servername.map(str::to_string));
            Ok(MockSession {
                counters: self.counters.clone(),
                script: self.script.iter().copied().collect(),
                peer: self.peer.clone(),
            })
        }
    }

    impl EngineSession for MockSession {
        fn handshake(&mut self) -> Result<Status, TlsError> {
            self.counters.handshakes.set(self.counters.handshakes.get() + 1);
            match self.script.pop_front().unwrap_or(Step::Done) {
                Step::Done => Ok(Status::Ready(())),
                Step::WantRead => Ok(Status::WantRead),
                Step::WantWrite => Ok(Status::WantWrite),
                Step::Fatal => Err(TlsError::Handshake {
                    message: "sslv3 alert handshake failure".to_string(),
                    code: None,
                }),
            }
        }

        fn read(&mut self, _buf: &mut [u8]) -> Result<Status<usize>, TlsError> {
            Ok(Status::Ready(0))
        }

        fn write(&mut self, buf: &[u8]) -> Result<Status<usize>, TlsError> {
            Ok(Status::Ready(buf.len()))
        }

        fn shutdown(&mut self) -> Result<Status, TlsError> {
            Ok(Status::Ready(()))
        }

        fn peer_certificate(&self) -> Option<PeerCertificate> {
            self.peer.clone()
        }
    }

    impl Drop for MockSession {
        fn drop(&mut self) {
            self.counters.drops.set(self.counters.drops.get() + 1);
        }
    }

    fn peer(names: &[&str]) -> PeerCertificate {
        PeerCertificate {
            common_name: None,
            issuer: None,
            subject_alt_names: names.iter().map(|n| AltName::Dns(n.to_string())).collect(),
        }
    }

    fn context(
        verify_name: bool,
        script: &[Step],
        peer: Option<PeerCertificate>,
    ) -> (TlsContext<MockEngine>, Rc<Counters>) {
        let counters = Rc::new(Counters::default());
        let config = TlsConfig::builder()
            .verify_cert(false)
            .verify_name(verify_name)
            .build()
            .unwrap();
        let engine = MockEngine {
            counters: counters.clone(),
            script: script.to_vec(),
            peer,
        };
        (
            TlsContext::with_engine(Role::Client, Arc::new(config), engine),
            counters,
        )
    }

    fn fds() -> (UnixStream, UnixStream) {
        UnixStream::pair().unwrap()
    }

    #[test]
    fn test_drive_resumes_without_repeating_work() {
        let (ctx_fds, _peer) = fds();
        let fd = ctx_fds.as_raw_fd();
        let (mut ctx, counters) = context(false, &[Step::WantRead, Step::WantWrite], None);

        assert_eq!(ctx.connect_fds(fd, fd, None).unwrap(), Status::WantRead);
        assert_eq!(ctx.state(), State::Suspended(Interest::Read));

        assert_eq!(ctx.drive().unwrap(), Status::WantWrite);
        assert_eq!(ctx.state(), State::Suspended(Interest::Write));

        assert_eq!(ctx.drive().unwrap(), Status::Ready(()));
        assert_eq!(ctx.state(), State::Established);

        // Already established: no further engine work
        assert_eq!(ctx.drive().unwrap(), Status::Ready(()));
        assert_eq!(counters.handshakes.get(), 3);
        assert_eq!(counters.inits.get(), 1);
    }

    #[test]
    fn test_repeated_want_read_is_not_an_error() {
        let (ctx_fds, _peer) = fds();
        let fd = ctx_fds.as_raw_fd();
        let (mut ctx, counters) = context(false, &[Step::WantRead, Step::WantRead], None);

        assert_eq!(ctx.connect_fds(fd, fd, None).unwrap(), Status::WantRead);
        assert_eq!(ctx.drive().unwrap(), Status::WantRead);
        assert!(ctx.error().is_none());
        assert_eq!(ctx.drive().unwrap(), Status::Ready(()));
        assert_eq!(counters.handshakes.get(), 3);
    }

    #[test]
    fn test_connect_fds_resumes_while_suspended() {
        let (ctx_fds, _peer) = fds();
        let fd = ctx_fds.as_raw_fd();
        let (mut ctx, counters) = context(false, &[Step::WantRead], None);

        assert_eq!(ctx.connect_fds(fd, fd, None).unwrap(), Status::WantRead);
        assert_eq!(ctx.connect_fds(fd, fd, None).unwrap(), Status::Ready(()));
        assert_eq!(counters.inits.get(), 1);
    }

    #[test]
    fn test_sni_omitted_for_literal_addresses() {
        for (name, expected) in [
            ("127.0.0.1", None),
            ("::1", None),
            ("example.com", Some("example.com".to_string())),
        ] {
            let (ctx_fds, _peer) = fds();
            let fd = ctx_fds.as_raw_fd();
            let (mut ctx, counters) = context(false, &[], None);

            ctx.connect_fds(fd, fd, Some(name)).unwrap();
            assert_eq!(counters.sni.borrow().as_slice(), &[expected]);
            assert_eq!(ctx.servername(), Some(name));
        }
    }

    #[test]
    fn test_verify_name_requires_servername() {
        let (ctx_fds, _peer) = fds();
        let fd = ctx_fds.as_raw_fd();
        let (mut ctx, counters) = context(true, &[], None);

        let err = ctx.connect_fds(fd, fd, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(ctx.state(), State::Aborted);
        assert_eq!(counters.inits.get(), 0);
        assert!(ctx.error().unwrap().contains("server name"));
    }

    #[test]
    fn test_invalid_descriptors() {
        let (mut ctx, counters) = context(false, &[], None);
        let err = ctx.connect_fds(-1, 3, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(counters.inits.get(), 0);
    }

    #[test]
    fn test_server_context_refuses_to_connect() {
        let counters = Rc::new(Counters::default());
        let engine = MockEngine {
            counters: counters.clone(),
            script: Vec::new(),
            peer: None,
        };
        let mut ctx = TlsContext::with_engine(Role::Server, Arc::default(), engine);

        let (ctx_fds, _peer) = fds();
        let fd = ctx_fds.as_raw_fd();
        let err = ctx.connect_fds(fd, fd, Some("example.com")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(ctx.error(), Some("invalid configuration: not a client context"));
        assert_eq!(counters.inits.get(), 0);
    }

    #[test]
    fn test_identity_match_after_handshake() {
        let (ctx_fds, _peer) = fds();
        let fd = ctx_fds.as_raw_fd();
        let (mut ctx, _) = context(true, &[], Some(peer(&["*.example.com"])));

        assert_eq!(
            ctx.connect_fds(fd, fd, Some("www.example.com")).unwrap(),
            Status::Ready(())
        );
        assert_eq!(ctx.state(), State::Established);
        assert!(ctx.peer_certificate().is_some());
    }

    #[test]
    fn test_identity_mismatch_aborts_despite_handshake() {
        let (ctx_fds, _peer) = fds();
        let fd = ctx_fds.as_raw_fd();
        let (mut ctx, counters) = context(true, &[], Some(peer(&["other.example.com"])));

        let err = ctx.connect_fds(fd, fd, Some("example.com")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Verification);
        assert_eq!(counters.handshakes.get(), 1);
        assert_eq!(ctx.state(), State::Aborted);
        assert_eq!(ctx.error_kind(), Some(ErrorKind::Verification));
        assert!(ctx.error().unwrap().contains("example.com"));
        assert_eq!(counters.drops.get(), 1);
        assert!(ctx.session().is_none());
    }

    #[test]
    fn test_missing_peer_certificate() {
        let (ctx_fds, _peer) = fds();
        let fd = ctx_fds.as_raw_fd();
        let (mut ctx, _) = context(true, &[], None);

        let err = ctx.connect_fds(fd, fd, Some("example.com")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Verification);
        assert_eq!(ctx.error(), Some("verification failed: no peer certificate"));
    }

    #[test]
    fn test_fatal_handshake_error_releases_once() {
        let (ctx_fds, _peer) = fds();
        let fd = ctx_fds.as_raw_fd();
        let (mut ctx, counters) = context(false, &[Step::WantRead, Step::Fatal], None);

        assert_eq!(ctx.connect_fds(fd, fd, None).unwrap(), Status::WantRead);
        let err = ctx.drive().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Handshake);
        assert_eq!(ctx.state(), State::Aborted);
        assert_eq!(counters.drops.get(), 1);

        // No further driving once aborted
        let err = ctx.drive().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(ctx.state(), State::Aborted);
        assert_eq!(counters.handshakes.get(), 2);

        drop(ctx);
        assert_eq!(counters.drops.get(), 1);
    }

    #[test]
    fn test_abandon_while_suspended() {
        let (ctx_fds, _peer) = fds();
        let fd = ctx_fds.as_raw_fd();
        let (mut ctx, counters) = context(false, &[Step::WantWrite], None);

        assert_eq!(ctx.connect_fds(fd, fd, None).unwrap(), Status::WantWrite);
        assert!(ctx.session().is_some());
        drop(ctx);
        assert_eq!(counters.drops.get(), 1);
    }

    #[test]
    fn test_owned_socket_closed_on_abort() {
        use std::io::Read;

        let (ctx_sock, mut peer_sock) = fds();
        let socket = Socket::from(std::os::fd::OwnedFd::from(ctx_sock));
        let (mut ctx, _) = context(false, &[Step::Fatal], None);

        assert!(ctx.connect_socket(socket, None).is_err());
        assert!(ctx.fds().is_none());

        // The context closed its end
        let mut buf = [0u8; 1];
        assert_eq!(peer_sock.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_io_requires_established() {
        let (ctx_fds, _peer) = fds();
        let fd = ctx_fds.as_raw_fd();
        let (mut ctx, _) = context(false, &[Step::WantRead], None);

        let mut buf = [0u8; 4];
        assert_eq!(ctx.read(&mut buf).unwrap_err().kind(), ErrorKind::State);

        ctx.connect_fds(fd, fd, None).unwrap();
        assert_eq!(ctx.write(b"x").unwrap_err().kind(), ErrorKind::State);
        // A misuse does not tear the handshake down
        assert_eq!(ctx.state(), State::Suspended(Interest::Read));

        assert_eq!(ctx.drive().unwrap(), Status::Ready(()));
        assert_eq!(ctx.write(b"abc").unwrap(), Status::Ready(3));
        assert_eq!(ctx.read(&mut buf).unwrap(), Status::Ready(0));

        // The earlier misuse is still on record after later successes
        assert_eq!(ctx.error_kind(), Some(ErrorKind::State));
    }

    #[test]
    fn test_close_allows_reuse() {
        let (ctx_fds, _peer) = fds();
        let fd = ctx_fds.as_raw_fd();
        let (mut ctx, counters) = context(false, &[Step::Fatal], None);

        assert!(ctx.connect_fds(fd, fd, None).is_err());
        assert_eq!(ctx.connect_fds(fd, fd, None).unwrap_err().kind(), ErrorKind::State);

        assert_eq!(ctx.close().unwrap(), Status::Ready(()));
        assert_eq!(ctx.state(), State::Idle);

        // The mock replays its script per session; the second session fails too
        assert!(ctx.connect_fds(fd, fd, None).is_err());
        assert_eq!(counters.inits.get(), 2);
    }

    #[test]
    fn test_close_established() {
        let (ctx_fds, _peer) = fds();
        let fd = ctx_fds.as_raw_fd();
        let (mut ctx, counters) = context(false, &[], None);

        ctx.connect_fds(fd, fd, None).unwrap();
        assert_eq!(ctx.close().unwrap(), Status::Ready(()));
        assert_eq!(ctx.state(), State::Idle);
        assert_eq!(counters.drops.get(), 1);
        assert!(ctx.drive().is_err());
    }
}
