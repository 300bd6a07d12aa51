//! Reactor-style network event loop.
//!
//! One `mio::Poll` drives the listening socket, every accepted client connection,
//! and (on a replica) the single outbound link to the primary. Command execution
//! runs to completion inside the event handler, so the keyspace needs no locking:
//! one decoded command mutates state, produces replies, and fans out to replicas
//! before the next frame is looked at.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::time::Duration;

use ember_common::error::{EmberError, EmberResult};
use ember_core::command::CommandFrame;
use ember_replication::handshake::{HandshakeAction, ReplicaHandshake};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, warn};

use crate::app::{ServerApp, ServerConnection};
use crate::ingress::ingress_connection_bytes;

const LISTENER_TOKEN: Token = Token(0);
const UPSTREAM_TOKEN: Token = Token(1);
const CONNECTION_TOKEN_START: usize = 2;
const READ_CHUNK_BYTES: usize = 8192;
const DEFAULT_WRITE_HIGH_WATERMARK_BYTES: usize = 256 * 1024;
const DEFAULT_WRITE_LOW_WATERMARK_BYTES: usize = 128 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ServerReactorConfig {
    pub(crate) max_events: usize,
    pub(crate) write_high_watermark_bytes: usize,
    pub(crate) write_low_watermark_bytes: usize,
}

impl ServerReactorConfig {
    #[must_use]
    fn normalized_max_events(self) -> usize {
        self.max_events.max(64)
    }

    #[must_use]
    fn normalized_backpressure_watermarks(self) -> (usize, usize) {
        let high = self
            .write_high_watermark_bytes
            .max(DEFAULT_WRITE_HIGH_WATERMARK_BYTES);
        let mut low = self
            .write_low_watermark_bytes
            .max(DEFAULT_WRITE_LOW_WATERMARK_BYTES);
        if low >= high {
            low = high.saturating_sub(1);
        }
        (high, low)
    }
}

/// Readiness data copied out of one `mio` event so handlers can borrow the
/// reactor mutably while iterating.
#[derive(Debug, Clone, Copy)]
struct EventSnapshot {
    token: Token,
    readable: bool,
    writable: bool,
    closed_or_error: bool,
}

impl EventSnapshot {
    fn from_mio_event(event: &mio::event::Event) -> Self {
        Self {
            token: event.token(),
            readable: event.is_readable(),
            writable: event.is_writable(),
            closed_or_error: event.is_read_closed() || event.is_write_closed() || event.is_error(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionLifecycle {
    Active,
    Draining,
    Closing,
}

#[derive(Debug)]
struct ReactorConnection {
    socket: TcpStream,
    logical: ServerConnection,
    write_buffer: Vec<u8>,
    lifecycle: ConnectionLifecycle,
    read_paused_by_backpressure: bool,
    interest: Interest,
}

impl ReactorConnection {
    fn new(socket: TcpStream) -> Self {
        Self {
            socket,
            logical: ServerConnection::new(),
            write_buffer: Vec::new(),
            lifecycle: ConnectionLifecycle::Active,
            read_paused_by_backpressure: false,
            interest: Interest::READABLE,
        }
    }

    fn mark_draining(&mut self) {
        if self.lifecycle == ConnectionLifecycle::Active {
            self.lifecycle = ConnectionLifecycle::Draining;
        }
    }

    fn mark_closing(&mut self) {
        self.lifecycle = ConnectionLifecycle::Closing;
    }

    fn can_read(&self) -> bool {
        self.lifecycle == ConnectionLifecycle::Active && !self.read_paused_by_backpressure
    }

    fn should_try_flush(&self) -> bool {
        !self.write_buffer.is_empty()
    }

    fn should_close_now(&self) -> bool {
        self.lifecycle == ConnectionLifecycle::Closing
            || (self.lifecycle == ConnectionLifecycle::Draining && self.write_buffer.is_empty())
    }

    fn update_backpressure_state(&mut self, high_watermark: usize, low_watermark: usize) {
        if self.read_paused_by_backpressure {
            if self.write_buffer.len() <= low_watermark {
                self.read_paused_by_backpressure = false;
            }
            return;
        }
        if self.write_buffer.len() >= high_watermark {
            self.read_paused_by_backpressure = true;
        }
    }
}

/// Outbound link to the primary on a replica instance.
#[derive(Debug)]
struct UpstreamLink {
    socket: TcpStream,
    handshake: ReplicaHandshake,
    write_buffer: Vec<u8>,
    interest: Interest,
    greeting_sent: bool,
}

/// What one ingress read pass asks the reactor to do beyond replying.
#[derive(Debug, Default)]
struct ReadSideEffects {
    propagate_frames: Vec<Vec<u8>>,
    register_replica: bool,
}

enum UpstreamReadStatus {
    Open,
    Closed,
}

/// One reactor instance owning the listener, all accepted connections, and the
/// optional primary link.
#[derive(Debug)]
pub(crate) struct ServerReactor {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    next_token: usize,
    write_high_watermark: usize,
    write_low_watermark: usize,
    connections: HashMap<Token, ReactorConnection>,
    /// Fan-out targets in registration order.
    replica_tokens: Vec<Token>,
    upstream: Option<UpstreamLink>,
}

impl ServerReactor {
    /// Binds the listener and registers it in the reactor poller.
    ///
    /// # Errors
    ///
    /// Returns `EmberError::Io` if the bind or poll registration fails.
    pub(crate) fn bind(addr: SocketAddr, config: ServerReactorConfig) -> EmberResult<Self> {
        let poll =
            Poll::new().map_err(|error| EmberError::Io(format!("create poll failed: {error}")))?;
        let (write_high_watermark, write_low_watermark) =
            config.normalized_backpressure_watermarks();

        let mut listener = TcpListener::bind(addr)
            .map_err(|error| EmberError::Io(format!("bind listener failed: {error}")))?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(|error| {
                EmberError::Io(format!("register listener in poll failed: {error}"))
            })?;

        Ok(Self {
            poll,
            events: Events::with_capacity(config.normalized_max_events()),
            listener,
            next_token: CONNECTION_TOKEN_START,
            write_high_watermark,
            write_low_watermark,
            connections: HashMap::new(),
            replica_tokens: Vec::new(),
            upstream: None,
        })
    }

    /// Starts the outbound connection to the primary and arms the handshake.
    ///
    /// `listening_port` is the port this instance announces via
    /// `REPLCONF listening-port` during negotiation.
    ///
    /// # Errors
    ///
    /// Returns `EmberError::Io` if the connect or poll registration fails.
    pub(crate) fn connect_upstream(
        &mut self,
        primary_addr: SocketAddr,
        listening_port: u16,
    ) -> EmberResult<()> {
        let mut socket = TcpStream::connect(primary_addr)
            .map_err(|error| EmberError::Io(format!("connect to primary failed: {error}")))?;
        self.poll
            .registry()
            .register(
                &mut socket,
                UPSTREAM_TOKEN,
                Interest::READABLE | Interest::WRITABLE,
            )
            .map_err(|error| {
                EmberError::Io(format!("register primary link in poll failed: {error}"))
            })?;

        self.upstream = Some(UpstreamLink {
            socket,
            handshake: ReplicaHandshake::new(listening_port),
            write_buffer: Vec::new(),
            interest: Interest::READABLE | Interest::WRITABLE,
            greeting_sent: false,
        });
        Ok(())
    }

    /// Processes one readiness cycle and executes every ready command.
    ///
    /// # Errors
    ///
    /// Returns `EmberError::Io` for polling or registration failures and
    /// `EmberError::Handshake` when replication negotiation fails fatally.
    pub(crate) fn poll_once(
        &mut self,
        app: &mut ServerApp,
        timeout: Option<Duration>,
    ) -> EmberResult<usize> {
        self.poll
            .poll(&mut self.events, timeout)
            .map_err(|error| EmberError::Io(format!("poll wait failed: {error}")))?;
        let snapshots = self
            .events
            .iter()
            .map(EventSnapshot::from_mio_event)
            .collect::<Vec<_>>();

        for snapshot in &snapshots {
            match snapshot.token {
                LISTENER_TOKEN => self.accept_new_connections()?,
                UPSTREAM_TOKEN => self.handle_upstream_event(app, *snapshot)?,
                _ => self.handle_connection_event(app, *snapshot)?,
            }
        }

        Ok(snapshots.len())
    }

    #[cfg(test)]
    fn local_addr(&self) -> EmberResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|error| EmberError::Io(format!("query local address failed: {error}")))
    }

    #[cfg(test)]
    fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[cfg(test)]
    fn registered_replica_count(&self) -> usize {
        self.replica_tokens.len()
    }

    #[cfg(test)]
    fn upstream_is_streaming(&self) -> bool {
        self.upstream
            .as_ref()
            .is_some_and(|link| link.handshake.is_streaming())
    }

    fn accept_new_connections(&mut self) -> EmberResult<()> {
        loop {
            match self.listener.accept() {
                Ok((mut socket, _peer)) => {
                    let token = self.allocate_connection_token();
                    self.poll
                        .registry()
                        .register(&mut socket, token, Interest::READABLE)
                        .map_err(|error| {
                            EmberError::Io(format!(
                                "register accepted connection in poll failed: {error}"
                            ))
                        })?;
                    let _ = socket.set_nodelay(true);
                    let _ = self.connections.insert(token, ReactorConnection::new(socket));
                }
                Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(error) => {
                    return Err(EmberError::Io(format!("accept connection failed: {error}")));
                }
            }
        }
    }

    fn handle_connection_event(
        &mut self,
        app: &mut ServerApp,
        snapshot: EventSnapshot,
    ) -> EmberResult<()> {
        let Some(mut connection) = self.connections.remove(&snapshot.token) else {
            return Ok(());
        };

        if snapshot.closed_or_error {
            connection.mark_draining();
        }

        let mut side_effects = ReadSideEffects::default();
        if snapshot.readable && connection.can_read() {
            side_effects = Self::read_connection_bytes(
                app,
                &mut connection,
                self.write_high_watermark,
                self.write_low_watermark,
            );
        }
        if snapshot.writable && connection.should_try_flush() {
            Self::flush_connection_writes(
                &mut connection,
                self.write_high_watermark,
                self.write_low_watermark,
            );
        }

        if connection.should_close_now() {
            self.close_connection(app, snapshot.token, connection)?;
        } else {
            self.refresh_connection_interest(snapshot.token, &mut connection)?;
            let _ = self.connections.insert(snapshot.token, connection);
            if side_effects.register_replica {
                self.register_replica_token(app, snapshot.token);
            }
        }

        // Fan out after the originating connection is settled so a registered
        // origin receives its own write like any other replica.
        self.fan_out_to_replicas(&side_effects.propagate_frames)
    }

    fn read_connection_bytes(
        app: &mut ServerApp,
        connection: &mut ReactorConnection,
        write_high_watermark: usize,
        write_low_watermark: usize,
    ) -> ReadSideEffects {
        let mut side_effects = ReadSideEffects::default();
        let mut chunk = [0_u8; READ_CHUNK_BYTES];
        loop {
            match connection.socket.read(&mut chunk) {
                Ok(0) => {
                    connection.mark_draining();
                    return side_effects;
                }
                Ok(read_len) => {
                    match ingress_connection_bytes(app, &mut connection.logical, &chunk[..read_len])
                    {
                        Ok(outcome) => {
                            for response in outcome.responses {
                                connection.write_buffer.extend_from_slice(&response);
                            }
                            side_effects.propagate_frames.extend(outcome.propagate_frames);
                            side_effects.register_replica |= outcome.register_replica;
                            connection.update_backpressure_state(
                                write_high_watermark,
                                write_low_watermark,
                            );
                            if connection.read_paused_by_backpressure {
                                // Once backpressure arms, leave remaining input in
                                // kernel buffers until the write side drains.
                                return side_effects;
                            }
                        }
                        Err(error) => {
                            connection
                                .write_buffer
                                .extend_from_slice(format!("-ERR {error}\r\n").as_bytes());
                            connection.mark_draining();
                            connection.update_backpressure_state(
                                write_high_watermark,
                                write_low_watermark,
                            );
                            return side_effects;
                        }
                    }
                }
                Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => return side_effects,
                Err(_error) => {
                    connection.mark_closing();
                    return side_effects;
                }
            }
        }
    }

    fn flush_connection_writes(
        connection: &mut ReactorConnection,
        write_high_watermark: usize,
        write_low_watermark: usize,
    ) {
        while !connection.write_buffer.is_empty() {
            match connection.socket.write(connection.write_buffer.as_slice()) {
                Ok(0) => {
                    connection.mark_closing();
                    return;
                }
                Ok(written) => {
                    let _ = connection.write_buffer.drain(..written);
                    connection.update_backpressure_state(write_high_watermark, write_low_watermark);
                }
                Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(_error) => {
                    connection.mark_closing();
                    return;
                }
            }
        }
    }

    fn refresh_connection_interest(
        &self,
        token: Token,
        connection: &mut ReactorConnection,
    ) -> EmberResult<()> {
        let mut next_interest = if connection.can_read() {
            Interest::READABLE
        } else {
            Interest::WRITABLE
        };
        if !connection.write_buffer.is_empty() {
            next_interest |= Interest::WRITABLE;
        }
        if next_interest == connection.interest {
            return Ok(());
        }

        self.poll
            .registry()
            .reregister(&mut connection.socket, token, next_interest)
            .map_err(|error| {
                EmberError::Io(format!("refresh connection poll interest failed: {error}"))
            })?;
        connection.interest = next_interest;
        Ok(())
    }

    fn close_connection(
        &mut self,
        app: &mut ServerApp,
        token: Token,
        mut connection: ReactorConnection,
    ) -> EmberResult<()> {
        self.poll
            .registry()
            .deregister(&mut connection.socket)
            .map_err(|error| {
                EmberError::Io(format!(
                    "deregister closed connection {} failed: {error}",
                    token.0
                ))
            })?;
        self.prune_replica_token(app, token);
        Ok(())
    }

    fn register_replica_token(&mut self, app: &mut ServerApp, token: Token) {
        if self.replica_tokens.contains(&token) {
            return;
        }
        self.replica_tokens.push(token);
        app.replication.note_replica_attached();
        debug!(
            token = token.0,
            replicas = self.replica_tokens.len(),
            "replica registered for write fan-out"
        );
    }

    fn prune_replica_token(&mut self, app: &mut ServerApp, token: Token) {
        let Some(position) = self
            .replica_tokens
            .iter()
            .position(|candidate| *candidate == token)
        else {
            return;
        };
        let _ = self.replica_tokens.remove(position);
        app.replication.note_replica_detached();
        debug!(
            token = token.0,
            replicas = self.replica_tokens.len(),
            "replica removed from write fan-out"
        );
    }

    /// Queues `frames` verbatim on every registered replica connection, in
    /// registration order.
    fn fan_out_to_replicas(&mut self, frames: &[Vec<u8>]) -> EmberResult<()> {
        if frames.is_empty() || self.replica_tokens.is_empty() {
            return Ok(());
        }

        let targets = self.replica_tokens.clone();
        for token in targets {
            let Some(mut connection) = self.connections.remove(&token) else {
                continue;
            };
            for frame in frames {
                connection.write_buffer.extend_from_slice(frame);
            }
            connection
                .update_backpressure_state(self.write_high_watermark, self.write_low_watermark);
            self.refresh_connection_interest(token, &mut connection)?;
            let _ = self.connections.insert(token, connection);
        }
        Ok(())
    }

    fn handle_upstream_event(
        &mut self,
        app: &mut ServerApp,
        snapshot: EventSnapshot,
    ) -> EmberResult<()> {
        let Some(mut link) = self.upstream.take() else {
            return Ok(());
        };

        if snapshot.closed_or_error {
            return self.fail_upstream_link(link, "primary connection closed");
        }

        if snapshot.writable {
            if !link.greeting_sent {
                link.write_buffer
                    .extend_from_slice(&ReplicaHandshake::greeting_frame());
                link.greeting_sent = true;
            }
            if let Err(error) = Self::flush_upstream_writes(&mut link) {
                return self.fail_upstream_link(link, &format!("write to primary failed: {error}"));
            }
        }

        if snapshot.readable {
            match Self::read_upstream_bytes(app, &mut link) {
                Ok(UpstreamReadStatus::Open) => {}
                Ok(UpstreamReadStatus::Closed) => {
                    return self.fail_upstream_link(link, "primary closed the replication stream");
                }
                Err(error) => {
                    let _ = self.poll.registry().deregister(&mut link.socket);
                    return Err(error);
                }
            }
        }

        self.refresh_upstream_interest(&mut link)?;
        self.upstream = Some(link);
        Ok(())
    }

    /// Tears down the primary link. Fatal while negotiating; once streaming, the
    /// replica keeps serving its last applied state.
    fn fail_upstream_link(&mut self, mut link: UpstreamLink, reason: &str) -> EmberResult<()> {
        let _ = self.poll.registry().deregister(&mut link.socket);
        if link.handshake.is_streaming() {
            warn!(reason, "replication link lost; serving last applied state");
            return Ok(());
        }
        Err(EmberError::Handshake(format!(
            "primary link failed during negotiation: {reason}"
        )))
    }

    fn read_upstream_bytes(
        app: &mut ServerApp,
        link: &mut UpstreamLink,
    ) -> EmberResult<UpstreamReadStatus> {
        let mut chunk = [0_u8; READ_CHUNK_BYTES];
        loop {
            match link.socket.read(&mut chunk) {
                Ok(0) => return Ok(UpstreamReadStatus::Closed),
                Ok(read_len) => Self::apply_primary_bytes(app, link, &chunk[..read_len])?,
                Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                    return Ok(UpstreamReadStatus::Open);
                }
                Err(_error) => return Ok(UpstreamReadStatus::Closed),
            }
        }
    }

    fn apply_primary_bytes(
        app: &mut ServerApp,
        link: &mut UpstreamLink,
        bytes: &[u8],
    ) -> EmberResult<()> {
        for action in link.handshake.on_primary_bytes(bytes)? {
            match action {
                HandshakeAction::SendToPrimary(frame) => {
                    link.write_buffer.extend_from_slice(&frame);
                }
                HandshakeAction::ApplyCommand { frame, wire_len } => {
                    let command = CommandFrame::new(frame.name, frame.args);
                    if let Some(ack) = app.execute_replicated_command(&command, wire_len) {
                        link.write_buffer.extend_from_slice(&ack);
                    }
                }
            }
        }
        Ok(())
    }

    fn flush_upstream_writes(link: &mut UpstreamLink) -> std::io::Result<()> {
        while !link.write_buffer.is_empty() {
            match link.socket.write(link.write_buffer.as_slice()) {
                Ok(0) => return Err(std::io::Error::from(std::io::ErrorKind::WriteZero)),
                Ok(written) => {
                    let _ = link.write_buffer.drain(..written);
                }
                Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    fn refresh_upstream_interest(&self, link: &mut UpstreamLink) -> EmberResult<()> {
        let mut next_interest = Interest::READABLE;
        if !link.write_buffer.is_empty() || !link.greeting_sent {
            next_interest |= Interest::WRITABLE;
        }
        if next_interest == link.interest {
            return Ok(());
        }

        self.poll
            .registry()
            .reregister(&mut link.socket, UPSTREAM_TOKEN, next_interest)
            .map_err(|error| {
                EmberError::Io(format!("refresh primary link poll interest failed: {error}"))
            })?;
        link.interest = next_interest;
        Ok(())
    }

    fn allocate_connection_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token = self.next_token.saturating_add(1);
        token
    }
}
