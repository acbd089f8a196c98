//! WebSocket Server
//!
//! The accept loop and per-connection protocol handler. Each connection
//! gets a reader task (this handler) and a writer task draining the
//! client's outbound queue, so a slow socket never blocks a room tick.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::game::cars;
use crate::game::state::PlayerId;
use crate::game::track::Track;
use crate::network::protocol::{self, ClientMessage, MapPayload, ServerMessage};
use crate::network::room::{now_seconds, wall_clock_seconds, Room, RoomManager, CLIENT_QUEUE_DEPTH};
use crate::store::leaderboard::LeaderboardStore;
use crate::store::tracks::{TrackCatalog, CUSTOM_TRACK_ID};

/// Server configuration, normally filled from the environment in `main`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    /// Directory holding the leaderboard and track catalog files.
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8090".to_string(),
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Fatal server errors. Per-connection failures are logged, not raised.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The requested address.
        addr: String,
        /// The underlying error.
        source: std::io::Error,
    },

    /// Listener accept failure.
    #[error("accept failed: {0}")]
    Accept(#[from] std::io::Error),
}

/// The racing server: listener, rooms and shared stores.
pub struct RaceServer {
    config: ServerConfig,
    rooms: Arc<RoomManager>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RaceServer {
    /// Build a server, opening the persistent stores under the data dir.
    pub fn new(config: ServerConfig) -> Self {
        let catalog = Arc::new(TrackCatalog::open(config.data_dir.join("tracks.json")));
        let leaderboard = Arc::new(LeaderboardStore::open(
            config.data_dir.join("leaderboard.json"),
        ));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            rooms: Arc::new(RoomManager::new(catalog, leaderboard)),
            shutdown_tx,
        }
    }

    /// The shared room manager.
    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }

    /// Accept connections until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener =
            TcpListener::bind(&self.config.bind_addr)
                .await
                .map_err(|source| ServerError::Bind {
                    addr: self.config.bind_addr.clone(),
                    source,
                })?;
        info!(addr = %self.config.bind_addr, "listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = accepted?;
                    let rooms = Arc::clone(&self.rooms);
                    let shutdown_rx = self.shutdown_tx.subscribe();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(rooms, stream, addr, shutdown_rx).await {
                            debug!(%addr, error = %err, "connection closed with error");
                        }
                    });
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown requested, stopping accept loop");
                    return Ok(());
                }
            }
        }
    }

    /// Signal the accept loop and all connections to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Everything the handler tracks once a client has joined a room.
struct Connection {
    player_id: PlayerId,
    room_id: String,
    player_name: String,
    room: Arc<tokio::sync::RwLock<Room>>,
}

async fn handle_connection(
    rooms: Arc<RoomManager>,
    stream: TcpStream,
    addr: SocketAddr,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    debug!(%addr, "websocket accepted");
    let (mut sink, mut source) = ws.split();

    let (tx, mut rx) = mpsc::channel::<ServerMessage>(CLIENT_QUEUE_DEPTH);

    // Writer task: the only place this socket is written to.
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match protocol::to_json(&message) {
                Ok(text) => text,
                Err(err) => {
                    warn!(error = %err, "failed to serialize frame");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut connection: Option<Connection> = None;

    loop {
        let message = tokio::select! {
            msg = source.next() => msg,
            _ = shutdown_rx.recv() => {
                debug!(%addr, "closing connection for shutdown");
                break;
            }
        };

        let text = match message {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                debug!(%addr, error = %err, "read error");
                break;
            }
        };

        let parsed = match protocol::from_json(&text) {
            Ok(parsed) => parsed,
            Err(err) => {
                send(&tx, error_frame(format!("Invalid message: {err}"))).await;
                continue;
            }
        };

        match (&mut connection, parsed) {
            (None, ClientMessage::Join { room_id, name }) => {
                let (player_id, room) = rooms.join(&room_id, &name, tx.clone()).await;
                let room_id = RoomManager::normalize_room_id(&room_id);

                let welcome = {
                    let guard = room.read().await;
                    ServerMessage::Welcome {
                        player_id: player_id.clone(),
                        room_id: room_id.clone(),
                        map: guard.map_payload(),
                        tracks: rooms.catalog().list(),
                        cars: cars::car_profiles().to_vec(),
                    }
                };
                send(&tx, welcome).await;

                let player_name = {
                    let guard = room.read().await;
                    guard
                        .race
                        .players
                        .get(&player_id)
                        .map(|p| p.name.clone())
                        .unwrap_or_default()
                };
                connection = Some(Connection {
                    player_id,
                    room_id,
                    player_name,
                    room,
                });
            }
            (None, _) => {
                send(&tx, error_frame("Join a room first.".to_string())).await;
            }
            (Some(_), ClientMessage::Join { .. }) => {
                send(&tx, error_frame("Already joined a room.".to_string())).await;
            }
            (Some(conn), message) => {
                dispatch(&rooms, conn, &tx, message).await;
            }
        }
    }

    if let Some(conn) = connection {
        rooms.leave(&conn.room_id, &conn.player_id).await;
        broadcast_state(&rooms, &conn.room).await;
    }
    drop(tx);
    let _ = writer.await;
    debug!(%addr, "connection finished");
    Ok(())
}

/// Handle one post-join client message.
async fn dispatch(
    rooms: &Arc<RoomManager>,
    conn: &Connection,
    tx: &mpsc::Sender<ServerMessage>,
    message: ClientMessage,
) {
    match message {
        ClientMessage::Join { .. } => unreachable!("handled by the caller"),

        ClientMessage::Input { input } => {
            let mut guard = conn.room.write().await;
            if let Some(player) = guard.race.players.get_mut(&conn.player_id) {
                player.input = input.sanitized();
            }
            // No broadcast: the tick loop publishes the result.
        }

        ClientMessage::Garage {
            car_id,
            laps_to_win,
            ready,
        } => {
            {
                let mut guard = conn.room.write().await;
                guard
                    .race
                    .apply_garage(&conn.player_id, car_id, laps_to_win, ready);
            }
            broadcast_state(rooms, &conn.room).await;
        }

        ClientMessage::SetTrack {
            track_id,
            custom_map,
            spawn_rotation_deg,
        } => {
            handle_set_track(rooms, conn, tx, track_id, custom_map, spawn_rotation_deg).await;
        }

        ClientMessage::StartRace => {
            let result = {
                let mut guard = conn.room.write().await;
                guard.race.start_countdown(now_seconds())
            };
            match result {
                Ok(()) => broadcast_state(rooms, &conn.room).await,
                Err(err) => send(tx, error_frame(err.to_string())).await,
            }
        }

        ClientMessage::ResetLobby => {
            {
                let mut guard = conn.room.write().await;
                guard.race.reset_to_lobby();
            }
            broadcast_state(rooms, &conn.room).await;
        }

        ClientMessage::Ping { client_time } => {
            send(
                tx,
                ServerMessage::Pong {
                    client_time,
                    server_time: wall_clock_seconds(),
                },
            )
            .await;
        }
    }
}

/// Validate and apply a track switch, including custom map submissions.
async fn handle_set_track(
    rooms: &Arc<RoomManager>,
    conn: &Connection,
    tx: &mpsc::Sender<ServerMessage>,
    track_id: String,
    custom_map: Option<Vec<String>>,
    spawn_rotation_deg: Option<f32>,
) {
    {
        let guard = conn.room.read().await;
        if !guard.race.phase.allows_setup_changes() {
            drop(guard);
            send(
                tx,
                error_frame("Track can only be changed in lobby or after race finish.".to_string()),
            )
            .await;
            return;
        }
    }

    let track = if track_id == CUSTOM_TRACK_ID {
        let Some(rows) = custom_map else {
            send(tx, error_frame("Custom track needs a map.".to_string())).await;
            return;
        };
        let rotation = spawn_rotation_deg.unwrap_or(crate::game::track::DEFAULT_SPAWN_ROTATION_DEG);
        match Track::new(
            CUSTOM_TRACK_ID,
            format!("Custom by {}", conn.player_name),
            &rows,
            rotation,
        ) {
            Ok(track) => {
                rooms.catalog().register(track.clone());
                track
            }
            Err(err) => {
                send(tx, error_frame(err.to_string())).await;
                return;
            }
        }
    } else {
        match rooms.catalog().get(&track_id) {
            Some(track) => track,
            None => {
                send(tx, error_frame(format!("Unknown track '{track_id}'."))).await;
                return;
            }
        }
    };

    {
        let mut guard = conn.room.write().await;
        if guard.race.set_track(track).is_err() {
            // Phase raced ahead between the check and the write lock.
            drop(guard);
            send(
                tx,
                error_frame("Track can only be changed in lobby or after race finish.".to_string()),
            )
            .await;
            return;
        }
        let frame = ServerMessage::Map {
            map: guard.map_payload(),
            tracks: rooms.catalog().list(),
        };
        guard.broadcast(&frame);
    }

    broadcast_state(rooms, &conn.room).await;
}

/// Push a fresh state frame to everyone in the room.
async fn broadcast_state(rooms: &Arc<RoomManager>, room: &Arc<tokio::sync::RwLock<Room>>) {
    let mut guard = room.write().await;
    let update = guard.build_state_update(rooms.leaderboard(), now_seconds());
    guard.broadcast(&update);
}

async fn send(tx: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
    if tx.send(message).await.is_err() {
        debug!("client queue closed before send");
    }
}

fn error_frame(message: String) -> ServerMessage {
    ServerMessage::Error { message }
}
