//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::ConnectionManager;
use crate::clock::{Clock, SystemClock};
use crate::config::GameConfig;
use crate::game::{GameEvent, GameLoop};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{
    ActionKind, Packet, MAX_CLIENTS, MAX_DATAGRAM_SIZE, MAX_PLAYER_ID_LEN, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::sleep;
use uuid::Uuid;

/// Upper bound on how long the main loop sleeps with no timer pending
const IDLE_WAIT: Duration = Duration::from_millis(250);

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ConnectionTimeout { player_id: String },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    BroadcastPacket { packet: Packet },
}

/// Main server coordinating networking and the round state machine
pub struct Server {
    socket: Arc<UdpSocket>,
    connections: Arc<RwLock<ConnectionManager>>,
    game: GameLoop,
    clock: Arc<dyn Clock>,
    events_rx: mpsc::UnboundedReceiver<GameEvent>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: GameConfig,
        max_clients: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_clock(addr, config, max_clients, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(
        addr: &str,
        config: GameConfig,
        max_clients: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        if max_clients > MAX_CLIENTS {
            warn!(
                "Requested {} clients, capping at {} so snapshots fit one datagram",
                max_clients, MAX_CLIENTS
            );
        }
        let max_clients = max_clients.min(MAX_CLIENTS);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            connections: Arc::new(RwLock::new(ConnectionManager::new(max_clients))),
            game: GameLoop::new(config, Arc::clone(&clock), events_tx),
            clock,
            events_rx,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn game(&self) -> &GameLoop {
        &self.game
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let connections = Arc::clone(&self.connections);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet } => {
                        let addrs = {
                            let connections_guard = connections.read().await;
                            connections_guard.addrs()
                        };

                        for addr in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors connection heartbeats
    async fn spawn_timeout_checker(&self) {
        let connections = Arc::clone(&self.connections);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut connections_guard = connections.write().await;
                    connections_guard.check_timeouts()
                };

                for player_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ConnectionTimeout { player_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let data = serialize(packet)?;
        if data.len() > MAX_DATAGRAM_SIZE {
            return Err(format!("packet of {} bytes exceeds datagram limit", data.len()).into());
        }
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket { packet }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    fn reject(&self, addr: SocketAddr, reason: &str) {
        self.send_packet(
            Packet::Rejected {
                reason: reason.to_string(),
            },
            addr,
        );
    }

    /// Processes incoming packets and forwards actions to the game
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Join {
            client_version,
            player_id,
            nickname,
        } = packet
        {
            self.handle_join(client_version, player_id, nickname, addr)
                .await;
            return;
        }

        let player_id = {
            let mut connections = self.connections.write().await;
            connections.touch(addr)
        };
        let Some(player_id) = player_id else {
            warn!("Packet from unknown address {}", addr);
            self.reject(addr, "Not joined");
            return;
        };

        match packet {
            Packet::UpdateNickname { nickname } => {
                self.game.update_nickname(&player_id, &nickname);
            }
            Packet::SelectRacer { racer_id } => {
                let success = self.game.choose_lizard(&player_id, &racer_id);
                self.send_action_result(ActionKind::SelectRacer, success, addr);
            }
            Packet::Boost { racer_id } => {
                let result = self.game.apply_boost(&player_id, &racer_id);
                self.send_packet(Packet::BoostResult(result), addr);
            }
            Packet::ClaimDailyTicket => {
                let success = self.game.claim_daily_ticket(&player_id);
                self.send_action_result(ActionKind::ClaimDailyTicket, success, addr);
            }
            Packet::BuyTickets { count } => {
                let success = self.game.buy_tickets(&player_id, u64::from(count));
                self.send_action_result(ActionKind::BuyTickets, success, addr);
            }
            Packet::ApplyReferral { code } => {
                let success = self.game.apply_referral(&player_id, &code);
                self.send_action_result(ActionKind::ApplyReferral, success, addr);
            }
            Packet::RequestResult => {
                let result = self.game.get_player_result(&player_id);
                self.send_packet(Packet::PlayerResult(result), addr);
            }
            Packet::Heartbeat => {}
            Packet::Leave => {
                {
                    let mut connections = self.connections.write().await;
                    connections.remove(addr);
                }
                self.game.mark_disconnected(&player_id);
            }
            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn handle_join(
        &mut self,
        client_version: u32,
        player_id: Option<String>,
        nickname: Option<String>,
        addr: SocketAddr,
    ) {
        if client_version != PROTOCOL_VERSION {
            info!(
                "Rejecting client at {} with protocol version {}",
                addr, client_version
            );
            self.reject(addr, "Unsupported client version");
            return;
        }

        let player_id = player_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("player-{}", Uuid::new_v4()));
        if player_id.len() > MAX_PLAYER_ID_LEN {
            self.reject(addr, "Invalid player id");
            return;
        }
        if self.game.get_player(&player_id).is_some_and(|player| player.is_bot) {
            warn!("Client at {} tried to join as bot {}", addr, player_id);
            self.reject(addr, "Invalid player id");
            return;
        }

        let (accepted, displaced) = {
            let mut connections = self.connections.write().await;
            let displaced = connections
                .find_by_addr(addr)
                .filter(|existing| *existing != player_id)
                .map(str::to_string);
            (connections.add(&player_id, addr), displaced)
        };

        if let Some(previous) = displaced {
            self.game.mark_disconnected(&previous);
        }
        if !accepted {
            self.reject(addr, "Server full");
            return;
        }

        let player = self.game.add_player(&player_id, nickname.as_deref());
        self.send_packet(
            Packet::Welcome {
                player_id: player.id,
                nickname: player.nickname,
                selection_id: player.selection_id,
                referral_code: player.referral_code,
            },
            addr,
        );
    }

    fn send_action_result(&self, action: ActionKind, success: bool, addr: SocketAddr) {
        self.send_packet(Packet::ActionResult { action, success }, addr);
    }

    /// Turns game events into outbound packets
    async fn route_event(&self, event: GameEvent) {
        match event {
            GameEvent::State(state) => self.broadcast_packet(Packet::State(state)),
            GameEvent::Progress(progress) => self.broadcast_packet(Packet::RaceProgress(progress)),
            GameEvent::PlayerResult { player_id, result } => {
                let addr = {
                    let connections = self.connections.read().await;
                    connections.addr_of_player(&player_id)
                };
                match addr {
                    Some(addr) => self.send_packet(Packet::PlayerResult(Some(result)), addr),
                    None => debug!("No connection for result of player {}", player_id),
                }
            }
        }
    }

    async fn flush_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.route_event(event).await;
        }
    }

    fn time_until_next_deadline(&self) -> Duration {
        match self.game.next_deadline() {
            Some(due) => {
                Duration::from_millis(due.saturating_sub(self.clock.now_ms())).min(IDLE_WAIT)
            }
            None => IDLE_WAIT,
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        self.game.start();
        self.flush_events().await;

        info!("Server started successfully");

        loop {
            let wait = self.time_until_next_deadline();

            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ConnectionTimeout { player_id }) => {
                            self.game.mark_disconnected(&player_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle timer deadlines
                _ = sleep(wait) => {
                    let fired = self.game.run_due();
                    if fired > 0 {
                        debug!("{} timers fired in {}", fired, self.game.phase());
                    }
                },
            }

            self.flush_events().await;
        }

        Ok(())
    }
}
