//! Server network layer: accepting players, driving the handshake and running
//! the reconciliation loop.

use crate::client_manager::{ClientManager, ConnectionState, PlayerConnection};
use crate::error::{ServerError, ServerResult};
use crate::game::Reconciler;
use crate::handshake::{compensated_start, introduce, schedule_start};
use futures_util::stream::{self, BoxStream, StreamExt};
use log::{debug, error, info, warn};
use shared::protocol::read_frame;
use shared::{unix_seconds, Chart, JudgmentMessage, ProtocolError, SessionStats, START_LEAD_MS};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval, MissedTickBehavior};
use tokio_stream::StreamMap;

/// What the supervisor loop reads from one player's connection
#[derive(Debug, PartialEq, Eq)]
pub enum Incoming {
    Frame(String),
    Closed,
}

/// Read halves of every active player, keyed by connection id.
type FrameStreams = StreamMap<u32, BoxStream<'static, Incoming>>;

/// Synchronized players ready for gameplay.
struct Session {
    clients: ClientManager,
    streams: FrameStreams,
    /// Latest start instant handed out, in seconds since the Unix epoch.
    latest_start: f64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Connections accepted before the handshake starts (1 or 2).
    pub max_players: usize,
    /// Lead between the handshake barrier and the nominal start instant.
    pub start_lead: Duration,
    /// How often the supervisor checks for the end of the chart.
    pub poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_players: 2,
            start_lead: Duration::from_millis(START_LEAD_MS),
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// An accepted connection that has not finished the handshake yet.
struct PendingPlayer {
    id: u32,
    stream: TcpStream,
    addr: SocketAddr,
    state: ConnectionState,
}

/// Supervisor owning the listener, the player roster and the reconciler
pub struct Server {
    listener: TcpListener,
    reconciler: Arc<Reconciler>,
    config: ServerConfig,
    /// Chart end time in milliseconds after the start instant.
    chart_end: i64,
}

impl Server {
    pub async fn bind(addr: &str, chart: &Chart, config: ServerConfig) -> ServerResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            reconciler: Arc::new(Reconciler::new(chart)),
            config,
            chart_end: chart.end,
        })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn reconciler(&self) -> Arc<Reconciler> {
        Arc::clone(&self.reconciler)
    }

    async fn accept_players(&self) -> ServerResult<Vec<PendingPlayer>> {
        let mut pending = Vec::with_capacity(self.config.max_players);

        while pending.len() < self.config.max_players {
            let (stream, addr) = self.listener.accept().await?;
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Could not disable Nagle for {}: {}", addr, e);
            }
            info!("Accepted connection from {}", addr);
            pending.push(PendingPlayer {
                id: pending.len() as u32 + 1,
                stream,
                addr,
                state: ConnectionState::Accepted,
            });
        }

        Ok(pending)
    }

    /// Introduces every player on its own task, joins them, then schedules a
    /// common start. A failed handshake drops only that connection.
    async fn synchronize(&self, pending: Vec<PendingPlayer>) -> ServerResult<Session> {
        let introductions: Vec<_> = pending
            .into_iter()
            .map(|mut player| {
                player.state = ConnectionState::Handshaking;
                debug!("Connection {} from {} is {:?}", player.id, player.addr, player.state);
                tokio::spawn(async move {
                    let result = introduce(&mut player.stream).await;
                    (player, result)
                })
            })
            .collect();

        let mut introduced = Vec::new();
        for task in introductions {
            match task.await {
                Ok((player, Ok(introduction))) => introduced.push((player, introduction)),
                Ok((player, Err(e))) => {
                    warn!("Dropping connection from {}: handshake failed: {}", player.addr, e)
                }
                Err(e) => error!("Handshake task failed: {}", e),
            }
        }

        let nominal = unix_seconds() + self.config.start_lead.as_secs_f64();
        let schedules: Vec<_> = introduced
            .into_iter()
            .map(|(mut player, introduction)| {
                let start = compensated_start(nominal, introduction.rtt);
                tokio::spawn(async move {
                    let result = schedule_start(&mut player.stream, start).await;
                    (player, introduction, start, result)
                })
            })
            .collect();

        let mut session = Session {
            clients: ClientManager::new(self.config.max_players),
            streams: StreamMap::new(),
            latest_start: nominal,
        };
        for task in schedules {
            match task.await {
                Ok((player, introduction, start, Ok(()))) => {
                    info!(
                        "Player {:?} synchronized, starts at {:.3}",
                        introduction.name, start
                    );
                    let (reader, writer) = player.stream.into_split();
                    let mut connection = PlayerConnection::new(
                        player.id,
                        introduction.name,
                        player.addr,
                        introduction.rtt,
                        Box::new(writer),
                    );
                    connection.activate();
                    if session.clients.add_client(connection) {
                        session.streams.insert(player.id, frame_stream(player.id, reader));
                        session.latest_start = session.latest_start.max(start);
                    }
                }
                Ok((player, introduction, _, Err(e))) => warn!(
                    "Dropping player {:?} from {}: start not acknowledged: {}",
                    introduction.name, player.addr, e
                ),
                Err(e) => error!("Handshake task failed: {}", e),
            }
        }

        if session.clients.is_empty() {
            return Err(ServerError::NoPlayers);
        }
        Ok(session)
    }

    /// Parses one frame, reconciles it and echoes it to everyone when needed.
    /// Returns the players whose echo could not be written.
    async fn handle_frame(
        &self,
        clients: &mut ClientManager,
        client_id: u32,
        payload: &str,
    ) -> ServerResult<Vec<u32>> {
        debug!(
            "Player {} ({}) sent {:?}",
            client_id,
            clients.name(&client_id).unwrap_or("gone"),
            payload
        );

        let message = match JudgmentMessage::parse(payload) {
            Ok(message) => message,
            Err(ProtocolError::MalformedMessage(raw)) => {
                warn!("Skipping malformed message from player {}: {:?}", client_id, raw);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let outcome = match self
            .reconciler
            .reconcile(message.note_id, message.judgment)
            .await
        {
            Ok(outcome) => outcome,
            Err(ServerError::UnknownNote(note_id)) => {
                warn!("Player {} judged unknown note {}", client_id, note_id);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        if outcome.should_broadcast() {
            Ok(clients.broadcast(&message.encode()).await)
        } else {
            Ok(Vec::new())
        }
    }

    /// Accepts players, synchronizes them and reconciles judgments until
    /// every connection has closed or the chart is over. Returns the final
    /// statistics.
    pub async fn run(self) -> ServerResult<SessionStats> {
        let pending = self.accept_players().await?;
        let Session {
            mut clients,
            mut streams,
            latest_start,
        } = self.synchronize(pending).await?;
        let ends_at = latest_start + self.chart_end as f64 / 1000.0;
        info!("Session started with {:?}", clients.names());

        let mut poll = interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !clients.is_empty() {
            tokio::select! {
                Some((client_id, incoming)) = streams.next() => {
                    let dropped = match incoming {
                        Incoming::Frame(payload) => {
                            match self.handle_frame(&mut clients, client_id, &payload).await {
                                Ok(failed) => failed,
                                Err(e) => {
                                    error!("Aborting session: {}", e);
                                    info!("Recorded before abort:\n{}", self.reconciler.stats().await);
                                    return Err(e);
                                }
                            }
                        }
                        Incoming::Closed => vec![client_id],
                    };
                    for id in dropped {
                        streams.remove(&id);
                        clients.remove_client(&id).await;
                    }
                },

                _ = poll.tick() => {
                    if unix_seconds() >= ends_at {
                        info!("Chart end reached with {:?} still connected", clients.names());
                        break;
                    }
                },
            }
        }

        info!("Session over");
        Ok(self.reconciler.stats().await)
    }
}

/// Reads frames from one player until the connection closes, ending with a
/// single `Closed`.
fn frame_stream(client_id: u32, reader: OwnedReadHalf) -> BoxStream<'static, Incoming> {
    stream::unfold(Some(reader), move |state| async move {
        let Some(mut reader) = state else {
            return None;
        };
        match read_frame(&mut reader).await {
            Ok(Some(payload)) => Some((Incoming::Frame(payload), Some(reader))),
            Ok(None) => {
                info!("Player {} closed the connection", client_id);
                Some((Incoming::Closed, None))
            }
            Err(e) => {
                warn!("Lost player {}: {}", client_id, e);
                Some((Incoming::Closed, None))
            }
        }
    })
    .boxed()
}
