//! Authoritative pong physics.
//!
//! `SimState::step` is a pure function from the previous state plus the
//! per-tick paddle inputs to the next state and the events that occurred
//! during the tick. All I/O, timing and connection concerns live in the
//! session layer; this module never blocks and holds no shared state.
//!
//! Velocities are expressed per tick at the nominal 60 Hz cadence; `dt` is
//! the elapsed fraction of one tick (1.0 for a full fixed step).

use rand::Rng;
use shared::{
    Difficulty, Side, Snapshot, DEFAULT_MAX_SCORE, DEFAULT_WIN_MARGIN, FIELD_HEIGHT, FIELD_WIDTH,
    PADDLE_DEFLECT, PADDLE_HEIGHT, PADDLE_WIDTH, RALLY_SPEEDUP, SERVE_SPEED_X, SERVE_SPEED_Y,
};

/// Match rules fixed at session creation.
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    pub difficulty: Difficulty,
    /// Minimum score required to win.
    pub max_score: u32,
    /// Minimum lead over the opponent required to win (deuce rule).
    pub win_margin: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::Medium,
            max_score: DEFAULT_MAX_SCORE,
            win_margin: DEFAULT_WIN_MARGIN,
        }
    }
}

/// Events produced by a single step, in temporal order within the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    /// Ball contacted the given side's paddle.
    PaddleHit(Side),
    /// Ball left the field on the given side; the opponent scored and the
    /// ball has been re-served from center.
    BallLost(Side),
    /// The win condition was met this tick. Always follows a `BallLost`.
    MatchEnded { winner: Side },
}

/// Ball, paddle and score state for one match.
#[derive(Debug, Clone, PartialEq)]
pub struct SimState {
    pub ball_x: f32,
    pub ball_y: f32,
    pub ball_vx: f32,
    pub ball_vy: f32,
    /// Vertical paddle positions, `Side::index()` order.
    pub paddles: [f32; 2],
    /// Points per side, `Side::index()` order.
    pub scores: [u32; 2],
}

/// Clamps a requested paddle position into the playing field. Out-of-range
/// requests are clamped rather than rejected.
pub fn clamp_paddle(y: f32) -> f32 {
    y.clamp(0.0, FIELD_HEIGHT - PADDLE_HEIGHT)
}

impl SimState {
    /// Creates the initial state for a match: paddles centered, ball served
    /// in a random direction at the configured difficulty's serve speed.
    pub fn new(config: &SimConfig, rng: &mut impl Rng) -> Self {
        let centered = (FIELD_HEIGHT - PADDLE_HEIGHT) / 2.0;
        let mut state = Self {
            ball_x: 0.0,
            ball_y: 0.0,
            ball_vx: 0.0,
            ball_vy: 0.0,
            paddles: [centered, centered],
            scores: [0, 0],
        };
        state.serve(config, rng);
        state
    }

    /// Resets the ball to center with a fresh serve velocity. The serve
    /// speed magnitude is always `base * difficulty`, regardless of how
    /// fast the previous rally got; only the direction is random.
    pub fn serve(&mut self, config: &SimConfig, rng: &mut impl Rng) {
        let multiplier = config.difficulty.speed_multiplier();
        let dir_x: f32 = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let dir_y: f32 = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };

        self.ball_x = FIELD_WIDTH / 2.0;
        self.ball_y = FIELD_HEIGHT / 2.0;
        self.ball_vx = dir_x * SERVE_SPEED_X * multiplier;
        self.ball_vy = dir_y * SERVE_SPEED_Y * multiplier;
    }

    /// Advances the simulation by `dt` ticks with the given requested
    /// paddle positions, returning the next state and this tick's events.
    ///
    /// Order within the tick is fixed: integrate, reflect off the top and
    /// bottom walls, score and re-serve if the ball is out, otherwise test
    /// paddle contact. Reflecting before the paddle test avoids
    /// double-reflection when the ball reaches a corner and a paddle in the
    /// same tick.
    pub fn step(
        &self,
        inputs: [f32; 2],
        dt: f32,
        config: &SimConfig,
        rng: &mut impl Rng,
    ) -> (SimState, Vec<SimEvent>) {
        let mut next = self.clone();
        let mut events = Vec::new();

        next.paddles = [clamp_paddle(inputs[0]), clamp_paddle(inputs[1])];

        next.ball_x += next.ball_vx * dt;
        next.ball_y += next.ball_vy * dt;

        // Top/bottom walls are lossless.
        if next.ball_y <= 0.0 || next.ball_y >= FIELD_HEIGHT {
            next.ball_vy = -next.ball_vy;
        }

        // A ball exactly on the edge coordinate counts as out.
        if next.ball_x <= 0.0 {
            events.push(SimEvent::BallLost(Side::Left));
            next.scores[Side::Right.index()] += 1;
            next.serve(config, rng);
            if let Some(winner) = next.winner(config) {
                events.push(SimEvent::MatchEnded { winner });
            }
        } else if next.ball_x >= FIELD_WIDTH {
            events.push(SimEvent::BallLost(Side::Right));
            next.scores[Side::Left.index()] += 1;
            next.serve(config, rng);
            if let Some(winner) = next.winner(config) {
                events.push(SimEvent::MatchEnded { winner });
            }
        } else {
            let left_y = next.paddles[Side::Left.index()];
            if next.ball_x <= PADDLE_WIDTH
                && next.ball_y >= left_y
                && next.ball_y <= left_y + PADDLE_HEIGHT
            {
                next.ball_vx = next.ball_vx.abs() * RALLY_SPEEDUP;
                let hit_pos = (next.ball_y - left_y) / PADDLE_HEIGHT;
                next.ball_vy = (hit_pos - 0.5) * PADDLE_DEFLECT;
                events.push(SimEvent::PaddleHit(Side::Left));
            }

            let right_y = next.paddles[Side::Right.index()];
            if next.ball_x >= FIELD_WIDTH - PADDLE_WIDTH
                && next.ball_y >= right_y
                && next.ball_y <= right_y + PADDLE_HEIGHT
            {
                next.ball_vx = -next.ball_vx.abs() * RALLY_SPEEDUP;
                let hit_pos = (next.ball_y - right_y) / PADDLE_HEIGHT;
                next.ball_vy = (hit_pos - 0.5) * PADDLE_DEFLECT;
                events.push(SimEvent::PaddleHit(Side::Right));
            }
        }

        (next, events)
    }

    /// Returns the winning side once a side has reached the score limit
    /// with the required lead. Ties at or beyond the limit continue (deuce).
    pub fn winner(&self, config: &SimConfig) -> Option<Side> {
        let [left, right] = self.scores;
        if left >= config.max_score && left >= right + config.win_margin {
            Some(Side::Left)
        } else if right >= config.max_score && right >= left + config.win_margin {
            Some(Side::Right)
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            paddle1_y: self.paddles[Side::Left.index()],
            paddle2_y: self.paddles[Side::Right.index()],
            ball_x: self.ball_x,
            ball_y: self.ball_y,
            score1: self.scores[Side::Left.index()],
            score2: self.scores[Side::Right.index()],
        }
    }
}
