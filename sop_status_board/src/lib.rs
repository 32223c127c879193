use std::collections::VecDeque;
use std::time::Duration;

use sop_verify::StatusUpdate;
use sop_verify::pipeline::{StatusSnapshot, VerificationEvent};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::warn;

pub const ALERT_MESSAGE: &str = "Alert: Hand detected out of sequence!";
const ALERT_LOG_LENGTH: usize = 20;
const PROGRESS_BAR_WIDTH: usize = 20;

/// Everything the operator's sidebar shows, folded from the verification service's updates.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "web", derive(serde::Serialize))]
pub struct BoardState {
    pub instructions: Vec<String>,
    /// `None` until the first update arrives.
    pub snapshot: Option<StatusSnapshot>,
    /// Most recent alerts last, bounded.
    pub alert_log: VecDeque<String>,
    /// Events of the latest update.
    pub recent_events: Vec<VerificationEvent>,
}

impl BoardState {
    pub fn new(instructions: Vec<String>) -> Self {
        Self {
            instructions,
            ..Self::default()
        }
    }

    pub fn apply(&mut self, update: &StatusUpdate) {
        for event in &update.events {
            if let VerificationEvent::OutOfSequenceAlert { timestamp, zone } = event {
                if self.alert_log.len() == ALERT_LOG_LENGTH {
                    self.alert_log.pop_front();
                }
                self.alert_log
                    .push_back(format!("{} ({} at {})", ALERT_MESSAGE, zone, format_timestamp(*timestamp)));
            }
        }
        self.recent_events = update.events.clone();
        self.snapshot = Some(update.snapshot.clone());
    }

    /// Renders the sidebar as plain text, one widget per line.
    pub fn render_sidebar(&self) -> String {
        let mut lines = Vec::new();

        if !self.instructions.is_empty() {
            lines.push("Instructions:".to_string());
            for (i, instruction) in self.instructions.iter().enumerate() {
                lines.push(format!("{}. {}", i + 1, instruction));
            }
            lines.push(String::new());
        }

        match &self.snapshot {
            Some(snapshot) => {
                for zone in &snapshot.zones {
                    let status = if zone.verified { "Verified" } else { "Not Verified" };
                    lines.push(format!("{}: {}", zone.name, status));
                }
                lines.push(progress_bar(snapshot.progress));
                lines.push(format!("Assemble Count: {}", snapshot.cycle_count));
                lines.push(match snapshot.current_step {
                    Some(step) => format!("Status: step {} of {}", step + 1, snapshot.step_count),
                    None => "Status: idle".to_string(),
                });
            }
            None => lines.push("Status: waiting for verification to start".to_string()),
        }

        if !self.alert_log.is_empty() {
            lines.push(String::new());
            lines.extend(self.alert_log.iter().cloned());
        }

        lines.join("\n")
    }
}

fn progress_bar(progress: f64) -> String {
    let progress = progress.clamp(0.0, 1.0);
    let filled = (progress * PROGRESS_BAR_WIDTH as f64).round() as usize;
    format!(
        "Progress: [{}{}] {:>3.0}%",
        "#".repeat(filled),
        "-".repeat(PROGRESS_BAR_WIDTH - filled),
        progress * 100.0
    )
}

fn format_timestamp(timestamp: Duration) -> String {
    format!("{:.3}s", timestamp.as_secs_f64())
}

/// Latest board state, shared with any number of readers.
#[derive(Clone)]
pub struct StatusBus {
    pub board_tx: watch::Sender<BoardState>,
}

impl StatusBus {
    pub fn new(initial: BoardState) -> Self {
        let (board_tx, _) = watch::channel(initial);
        Self { board_tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<BoardState> {
        self.board_tx.subscribe()
    }

    pub fn current(&self) -> BoardState {
        self.board_tx.borrow().clone()
    }

    /// Folds service updates into the board until the service shuts down.
    pub fn spawn_listener(&self, mut updates: broadcast::Receiver<StatusUpdate>) -> JoinHandle<()> {
        let board_tx = self.board_tx.clone();
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => board_tx.send_modify(|board| board.apply(&update)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "status board fell behind the verification service");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
}

/// Start/stop requests coming from the operator, `true` meaning "verification running".
#[derive(Clone)]
pub struct ControlHandle {
    pub running_tx: watch::Sender<bool>,
}

#[cfg(feature = "web")]
pub async fn start_server(bus: StatusBus, cfg: ServerConfig, control: ControlHandle) -> anyhow::Result<JoinHandle<()>> {
    use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use tracing::{error, info};

    async fn ws_conn(mut socket: WebSocket, mut board_rx: watch::Receiver<BoardState>) {
        loop {
            let board = board_rx.borrow_and_update().clone();
            let text = match serde_json::to_string(&board) {
                Ok(text) => text,
                Err(e) => {
                    warn!("failed to encode board state: {}", e);
                    break;
                }
            };
            if socket.send(Message::Text(text)).await.is_err() {
                break;
            }
            if board_rx.changed().await.is_err() {
                break;
            }
        }
    }

    fn control_route(tx: watch::Sender<bool>, running: bool) -> axum::routing::MethodRouter {
        post(move || {
            let tx = tx.clone();
            async move {
                let _ = tx.send(running);
                StatusCode::NO_CONTENT
            }
        })
    }

    let bus_status = bus.clone();
    let bus_ws = bus.clone();
    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/status",
            get(move || {
                let bus = bus_status.clone();
                async move { Json(bus.current()) }
            }),
        )
        .route(
            "/ws/status",
            get(move |ws: WebSocketUpgrade| {
                let board_rx = bus_ws.subscribe();
                async move { ws.on_upgrade(move |socket| ws_conn(socket, board_rx)) }
            }),
        )
        .route("/control/start", control_route(control.running_tx.clone(), true))
        .route("/control/stop", control_route(control.running_tx.clone(), false));

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    info!("status board listening on http://{}", cfg.bind_addr);

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("status board server stopped: {}", e);
        }
    });

    Ok(server)
}

#[cfg(not(feature = "web"))]
pub async fn start_server(_bus: StatusBus, _cfg: ServerConfig, _control: ControlHandle) -> anyhow::Result<JoinHandle<()>> {
    Err(anyhow::anyhow!("web feature not enabled for sop_status_board"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sop_verify::core_modules::source::{HandLandmark, LandmarkFrame};
    use sop_verify::{StationConfig, VerificationPipeline, VerificationService};

    fn update(events: Vec<VerificationEvent>, snapshot: StatusSnapshot) -> StatusUpdate {
        StatusUpdate { events, snapshot }
    }

    fn idle_snapshot() -> StatusSnapshot {
        VerificationPipeline::from_config(&StationConfig::default())
            .unwrap()
            .status_snapshot()
    }

    #[test]
    fn renders_zone_lines_progress_and_count() {
        let mut snapshot = idle_snapshot();
        snapshot.session_active = true;
        snapshot.current_step = Some(1);
        snapshot.zones[0].verified = true;
        snapshot.progress = 0.25;
        snapshot.cycle_count = 3;

        let mut board = BoardState::new(vec!["Place the part.".to_string()]);
        board.apply(&update(Vec::new(), snapshot));
        let sidebar = board.render_sidebar();

        assert!(sidebar.contains("1. Place the part."));
        assert!(sidebar.contains("box1: Verified"));
        assert!(sidebar.contains("box2: Not Verified"));
        assert!(sidebar.contains("Progress: [#####---------------]  25%"));
        assert!(sidebar.contains("Assemble Count: 3"));
        assert!(sidebar.contains("Status: step 2 of 3"));
    }

    #[test]
    fn alert_log_is_bounded() {
        let mut board = BoardState::default();
        for i in 0..(ALERT_LOG_LENGTH as u64 + 5) {
            let alert = VerificationEvent::OutOfSequenceAlert {
                timestamp: Duration::from_millis(i * 1500),
                zone: "box4".to_string(),
            };
            board.apply(&update(vec![alert], idle_snapshot()));
        }

        assert_eq!(board.alert_log.len(), ALERT_LOG_LENGTH);
        assert_eq!(
            board.alert_log.back().unwrap(),
            &format!("{} (box4 at 36.000s)", ALERT_MESSAGE)
        );
    }

    #[test]
    fn empty_board_says_it_is_waiting() {
        let board = BoardState::default();
        assert_eq!(board.render_sidebar(), "Status: waiting for verification to start");
    }

    #[tokio::test]
    async fn listener_follows_the_service() {
        let config = StationConfig::default();
        let service = VerificationService::spawn(VerificationPipeline::from_config(&config).unwrap(), 8);
        let bus = StatusBus::new(BoardState::new(config.instructions.clone()));
        let listener = bus.spawn_listener(service.subscribe());
        let handle = service.handle();

        handle.start().await.unwrap();
        let frame = LandmarkFrame::new(Duration::ZERO, vec![HandLandmark::new(100.0 / 640.0, 100.0 / 480.0)]);
        handle.submit_frame(frame).await.unwrap();
        handle.snapshot().await.unwrap();
        service.shutdown().await.unwrap();
        listener.await.unwrap();

        let board = bus.current();
        let snapshot = board.snapshot.as_ref().expect("board received updates");
        assert!(snapshot.zones[0].verified);
        assert_eq!(snapshot.current_step, Some(1));
        assert!(board.render_sidebar().contains("box1: Verified"));
    }

    #[cfg(not(feature = "web"))]
    #[tokio::test]
    async fn server_requires_the_web_feature() {
        let (running_tx, _) = watch::channel(false);
        let result = start_server(
            StatusBus::new(BoardState::default()),
            ServerConfig { bind_addr: "127.0.0.1:0".to_string() },
            ControlHandle { running_tx },
        )
        .await;
        assert!(result.is_err());
    }
}
