//! Player Session
//!
//! One `PlayerSession` per connection. It owns the player's round, the
//! round clock, the cached leaderboard and the pending candidate, and
//! turns client input into the `ServerMessage`s to send back.
//!
//! The session itself never sleeps: `RoundTimer` posts the `RoundId` it
//! was armed for onto a channel and the connection loop feeds those back
//! through `on_tick`. A tick that outlives its round is stale and dropped.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::core::rng::DeterministicRng;
use crate::game::engine::{self, ClickResult, EngineError, TickResult};
use crate::game::state::{CandidateScore, GameRound, RoundConfig, RoundId, RoundPhase, Termination};
use crate::leaderboard::initials::validate_initials;
use crate::leaderboard::manager::{LeaderboardManager, SubmitError};
use crate::leaderboard::record::{Leaderboard, ScoreEntry};
use crate::leaderboard::store::{ScoreStore, LeaderboardSnapshot};
use crate::network::protocol::{
    ErrorCode, LeaderboardView, RoundEndInfo, RoundView, ServerMessage,
};
use crate::TICK_INTERVAL_MS;

/// Appended to the end-of-round message when the score cannot place.
pub const NOT_QUALIFIED_SUFFIX: &str = " You didn't make the top 10. Try again!";

/// Session tuning.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Board size and time limit.
    pub round: RoundConfig,
    /// Clock period.
    pub tick_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            round: RoundConfig::default(),
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
        }
    }
}

// =============================================================================
// ROUND TIMER
// =============================================================================

/// Periodic tick source armed for a single round.
///
/// Aborted on `cancel` or drop, so at most one timer feeds a session.
#[derive(Debug)]
pub struct RoundTimer {
    round: RoundId,
    handle: JoinHandle<()>,
}

impl RoundTimer {
    /// Spawn a timer that sends `round` every `period`, first tick one
    /// period from now.
    pub fn arm(round: RoundId, period: Duration, tx: mpsc::Sender<RoundId>) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(round).await.is_err() {
                    break;
                }
            }
        });
        debug!("Timer armed for {}", round);

        Self { round, handle }
    }

    /// Round this timer ticks for.
    pub fn round(&self) -> RoundId {
        self.round
    }

    /// Stop ticking.
    pub fn cancel(self) {
        debug!("Timer cancelled for {}", self.round);
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// =============================================================================
// PLAYER SESSION
// =============================================================================

/// Per-player controller.
pub struct PlayerSession<S> {
    config: SessionConfig,
    round: GameRound,
    rng: DeterministicRng,
    timer: Option<RoundTimer>,
    tick_tx: mpsc::Sender<RoundId>,
    manager: LeaderboardManager<S>,
    leaderboard: Leaderboard,
    visible: bool,
    /// Qualifying result awaiting initials.
    pending: Option<CandidateScore>,
}

impl<S: ScoreStore> PlayerSession<S> {
    /// Create a session with an idle round. Ticks are delivered on `tick_tx`.
    pub fn new(manager: LeaderboardManager<S>, tick_tx: mpsc::Sender<RoundId>, config: SessionConfig) -> Self {
        Self::with_rng(manager, tick_tx, config, DeterministicRng::from_entropy())
    }

    /// Create a session with a fixed shuffle source.
    pub fn with_rng(
        manager: LeaderboardManager<S>,
        tick_tx: mpsc::Sender<RoundId>,
        config: SessionConfig,
        rng: DeterministicRng,
    ) -> Self {
        let leaderboard = Leaderboard::empty(manager.config());
        Self {
            config,
            round: GameRound::new(RoundId(1), config.round),
            rng,
            timer: None,
            tick_tx,
            manager,
            leaderboard,
            visible: false,
            pending: None,
        }
    }

    /// Current round.
    pub fn round(&self) -> &GameRound {
        &self.round
    }

    /// Cached leaderboard.
    pub fn leaderboard(&self) -> &Leaderboard {
        &self.leaderboard
    }

    /// Result waiting for initials, if any.
    pub fn pending(&self) -> Option<CandidateScore> {
        self.pending
    }

    /// Is a clock armed?
    pub fn timer_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Full board view.
    pub fn round_view(&self) -> ServerMessage {
        ServerMessage::Round(RoundView::from(&self.round))
    }

    /// Leaderboard panel view.
    pub fn leaderboard_view(&self) -> ServerMessage {
        ServerMessage::Leaderboard(LeaderboardView::new(&self.leaderboard, self.visible))
    }

    /// Start a round. A running or finished round is reset first.
    #[instrument(skip(self), fields(round = %self.round.id))]
    pub fn start(&mut self) -> Vec<ServerMessage> {
        if self.round.phase != RoundPhase::Idle {
            self.replace_round();
        }

        if let Err(e) = engine::start(&mut self.round, &mut self.rng) {
            warn!("Failed to start round: {}", e);
            return vec![engine_error(e)];
        }

        let period = self.config.tick_interval;
        self.timer = Some(RoundTimer::arm(self.round.id, period, self.tick_tx.clone()));
        info!("Round {} started", self.round.id);

        vec![self.round_view()]
    }

    /// Abandon the current round and deal a fresh idle one.
    pub fn reset(&mut self) -> Vec<ServerMessage> {
        self.replace_round();
        vec![self.round_view()]
    }

    /// Apply a tile click.
    pub fn click_tile(&mut self, value: u32) -> Vec<ServerMessage> {
        match engine::click_tile(&mut self.round, value) {
            Ok(ClickResult::Found { .. }) => vec![self.round_view()],
            Ok(ClickResult::Ended(termination)) => self.finish(termination),
            Ok(ClickResult::Ignored) | Ok(ClickResult::AlreadyFound) => Vec::new(),
            Err(e) => vec![engine_error(e)],
        }
    }

    /// Apply a clock tick armed for `source`.
    pub fn on_tick(&mut self, source: RoundId) -> Vec<ServerMessage> {
        match engine::tick(&mut self.round, source) {
            TickResult::Running { remaining_seconds } => vec![ServerMessage::Tick {
                round_id: self.round.id.0,
                remaining_seconds,
            }],
            TickResult::Ended(termination) => self.finish(termination),
            TickResult::Stale => {
                debug!("Dropped stale tick from {}", source);
                Vec::new()
            }
            TickResult::Ignored => Vec::new(),
        }
    }

    /// Replace the cached board with a store snapshot.
    pub fn on_snapshot(&mut self, snapshot: LeaderboardSnapshot) -> Vec<ServerMessage> {
        self.leaderboard = Leaderboard::from_snapshot(snapshot.value.as_ref(), self.manager.config());
        vec![self.leaderboard_view()]
    }

    /// Show or hide the leaderboard.
    pub fn toggle_leaderboard(&mut self) -> Vec<ServerMessage> {
        self.visible = !self.visible;
        vec![self.leaderboard_view()]
    }

    /// Submit initials for the pending result.
    ///
    /// Invalid initials keep the result pending so the player can retry.
    /// A store failure also keeps it; nothing is retried automatically.
    pub async fn submit_initials(&mut self, raw: &str) -> Vec<ServerMessage> {
        let Some(candidate) = self.pending else {
            return vec![ServerMessage::error(
                ErrorCode::NothingToSubmit,
                "No score is waiting for initials",
            )];
        };

        let initials = match validate_initials(raw) {
            Ok(initials) => initials,
            Err(e) => {
                debug!("Rejected initials {:?}: {}", raw, e);
                return vec![ServerMessage::error(ErrorCode::InvalidInitials, e.to_string())];
            }
        };

        match self.manager.submit(ScoreEntry::new(initials, candidate)).await {
            Ok(report) => {
                self.pending = None;
                if report.cleanup_failures > 0 {
                    warn!("{} stale records left for the next submission", report.cleanup_failures);
                }
                self.leaderboard = report.leaderboard;
                vec![
                    ServerMessage::SubmitResult {
                        accepted: true,
                        message: report.outcome.message().to_string(),
                    },
                    self.leaderboard_view(),
                ]
            }
            Err(e @ SubmitError::NotBetterThanExisting { .. }) => {
                self.pending = None;
                vec![ServerMessage::SubmitResult {
                    accepted: false,
                    message: e.to_string(),
                }]
            }
            Err(e @ SubmitError::PersistenceFailure(_)) => {
                warn!("Score submission failed: {:?}", e);
                vec![ServerMessage::SubmitResult {
                    accepted: false,
                    message: e.to_string(),
                }]
            }
        }
    }

    fn replace_round(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.pending = None;
        self.round = GameRound::new(self.round.id.next(), self.config.round);
    }

    fn finish(&mut self, termination: Termination) -> Vec<ServerMessage> {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }

        let candidate = termination.candidate(self.config.round.round_seconds);
        let qualifies = self.manager.evaluate_qualification(&candidate, &self.leaderboard);

        let mut message = termination.message.clone();
        if qualifies {
            self.pending = Some(candidate);
        } else {
            message.push_str(NOT_QUALIFIED_SUFFIX);
        }
        info!(
            "Round {} ended: {:?} score={} time={} qualifies={}",
            self.round.id, termination.outcome, candidate.score, candidate.time, qualifies
        );

        vec![
            self.round_view(),
            ServerMessage::RoundEnded(RoundEndInfo::new(self.round.id.0, &termination, qualifies, message)),
        ]
    }
}

fn engine_error(e: EngineError) -> ServerMessage {
    let code = match e {
        EngineError::InvalidPhase { .. } => ErrorCode::InvalidPhase,
        EngineError::UnknownTile(_) => ErrorCode::UnknownTile,
        EngineError::InvalidConfig(_) => ErrorCode::Internal,
    };
    ServerMessage::error(code, e.to_string())
}
