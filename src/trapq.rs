// src/trapq.rs
// Trapezoidal velocity queue: move segments, active/history bookkeeping and
// the flattened records handed to step generation.
//
// Callers must supply well formed input: non-negative durations and finite
// times, velocities and positions. None of this is checked here since every
// call sits on the real-time planning path; violating it gives meaningless
// positions, never memory unsafety.

use std::collections::{TryReserveError, VecDeque};

use log::{debug, trace};

use crate::configfile::{ConfigError, Configfile};
use crate::coord::Coord;

/// Duration of the tail sentinel; effectively "forever" on the print clock.
pub const NEVER_TIME: f64 = 9_999_999_999_999_999.9;

const MAX_NULL_MOVE: f64 = 1.0;
const HISTORY_RETENTION: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapqError {
    /// More history moves matched an extract window than the caller allowed.
    CapacityExceeded { found: usize, max: usize },
    Alloc(TryReserveError),
}

impl std::fmt::Display for TrapqError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrapqError::CapacityExceeded { found, max } => {
                write!(f, "Extract window holds {} moves but capacity is {}", found, max)
            }
            TrapqError::Alloc(e) => write!(f, "Unable to allocate move storage: {}", e),
        }
    }
}

impl std::error::Error for TrapqError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrapqError::Alloc(e) => Some(e),
            TrapqError::CapacityExceeded { .. } => None,
        }
    }
}

impl From<TryReserveError> for TrapqError {
    fn from(e: TryReserveError) -> Self {
        TrapqError::Alloc(e)
    }
}

/// One constant-acceleration segment of a toolhead move.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Move {
    pub print_time: f64,
    pub move_t: f64,
    pub start_v: f64,
    pub half_accel: f64, // half of acceleration for this move segment
    pub start_pos: Coord,
    pub axes_r: Coord, // axis displacement per unit of move distance
}

impl Move {
    pub fn new(
        print_time: f64,
        move_t: f64,
        start_v: f64,
        half_accel: f64,
        start_pos: Coord,
        axes_r: Coord,
    ) -> Self {
        Move {
            print_time,
            move_t,
            start_v,
            half_accel,
            start_pos,
            axes_r,
        }
    }

    /// A zero-motion move holding `pos` for `move_t` seconds.
    pub fn null_move(print_time: f64, move_t: f64, pos: Coord) -> Self {
        Move {
            print_time,
            move_t,
            start_pos: pos,
            ..Move::default()
        }
    }

    pub fn end_time(&self) -> f64 {
        self.print_time + self.move_t
    }

    pub fn is_null(&self) -> bool {
        self.start_v == 0.0 && self.half_accel == 0.0
    }

    /// Distance travelled `move_time` seconds into the move. The time is
    /// clamped to the move so callers may pass neighbouring-segment times.
    pub fn get_distance(&self, move_time: f64) -> f64 {
        let t = move_time.max(0.0).min(self.move_t);
        self.start_v * t + self.half_accel * t * t
    }

    pub fn get_coord(&self, move_time: f64) -> Coord {
        self.start_pos.scale_add(&self.axes_r, self.get_distance(move_time))
    }
}

/// Flattened history record for consumers that do not share our layout.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PullMove {
    pub print_time: f64,
    pub duration: f64,
    pub start_velocity: f64,
    pub accel: f64,
    pub start_x: f64,
    pub start_y: f64,
    pub start_z: f64,
    pub start_u: f64,
    pub start_v: f64,
    pub x_ratio: f64,
    pub y_ratio: f64,
    pub z_ratio: f64,
    pub u_ratio: f64,
    pub v_ratio: f64,
}

impl From<&Move> for PullMove {
    fn from(m: &Move) -> Self {
        PullMove {
            print_time: m.print_time,
            duration: m.move_t,
            start_velocity: m.start_v,
            accel: 2.0 * m.half_accel,
            start_x: m.start_pos.x,
            start_y: m.start_pos.y,
            start_z: m.start_pos.z,
            start_u: m.start_pos.u,
            start_v: m.start_pos.v,
            x_ratio: m.axes_r.x,
            y_ratio: m.axes_r.y,
            z_ratio: m.axes_r.z,
            u_ratio: m.axes_r.u,
            v_ratio: m.axes_r.v,
        }
    }
}

/// Tuning read from the `[trapq]` config section.
#[derive(Debug, Clone, PartialEq)]
pub struct TrapqConfig {
    /// Longest null move placed before the very first move of a queue.
    pub max_null_move: f64,
    /// Insert null moves over time gaps between consecutive moves.
    pub fill_gaps: bool,
    /// Seconds of finalized history kept behind the flush time.
    pub history_retention: f64,
}

impl Default for TrapqConfig {
    fn default() -> Self {
        TrapqConfig {
            max_null_move: MAX_NULL_MOVE,
            fill_gaps: true,
            history_retention: HISTORY_RETENTION,
        }
    }
}

impl TrapqConfig {
    pub const SECTION: &'static str = "trapq";

    /// Reads `[trapq]`; a missing section yields the defaults.
    pub fn from_config(config: &Configfile) -> Result<Self, ConfigError> {
        let defaults = TrapqConfig::default();
        if !config.has_section(Self::SECTION) {
            return Ok(defaults);
        }
        Ok(TrapqConfig {
            max_null_move: config.getfloat(
                Self::SECTION,
                "max_null_move",
                Some(defaults.max_null_move),
                Some(0.0),
                None,
            )?,
            fill_gaps: config.getboolean(Self::SECTION, "fill_gaps", Some(defaults.fill_gaps))?,
            history_retention: config.getfloat(
                Self::SECTION,
                "history_retention",
                Some(defaults.history_retention),
                Some(0.0),
                None,
            )?,
        })
    }
}

/// Active moves waiting to be stepped plus the finalized history behind them.
///
/// Both lists are kept in non-decreasing `print_time` order. The queue owns
/// every move outright; finalizing relocates a move from `moves` to
/// `history`. The head and tail sentinels are zero-motion moves bounding the
/// known plan so that any time lookup resolves to a position.
///
/// There is no internal locking. A host that plans and generates steps on
/// different threads must serialize access to each queue itself.
#[derive(Debug, Clone)]
pub struct TrapQ {
    moves: VecDeque<Move>,
    history: VecDeque<Move>,
    head: Move,
    tail: Move,
    ref_time: f64,
    ref_pos: Coord,
    config: TrapqConfig,
}

impl Default for TrapQ {
    fn default() -> Self {
        Self::new()
    }
}

impl TrapQ {
    pub fn new() -> Self {
        Self::with_config(TrapqConfig::default())
    }

    pub fn with_config(config: TrapqConfig) -> Self {
        let mut tq = TrapQ {
            moves: VecDeque::new(),
            history: VecDeque::new(),
            head: Move::default(),
            tail: Move::default(),
            ref_time: 0.0,
            ref_pos: Coord::ORIGIN,
            config,
        };
        tq.check_sentinels();
        tq
    }

    pub fn config(&self) -> &TrapqConfig {
        &self.config
    }

    pub fn active_len(&self) -> usize {
        self.moves.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn active_moves(&self) -> impl Iterator<Item = &Move> + '_ {
        self.moves.iter()
    }

    pub fn history_moves(&self) -> impl Iterator<Item = &Move> + '_ {
        self.history.iter()
    }

    pub fn head_sentinel(&self) -> &Move {
        &self.head
    }

    pub fn tail_sentinel(&self) -> &Move {
        &self.tail
    }

    /// Print time at which the last known move finishes.
    pub fn last_move_end_time(&self) -> Option<f64> {
        self.last_known().map(Move::end_time)
    }

    fn first_known(&self) -> Option<&Move> {
        match (self.history.front(), self.moves.front()) {
            (Some(h), Some(m)) => Some(if m.print_time < h.print_time { m } else { h }),
            (h, m) => h.or(m),
        }
    }

    fn last_known(&self) -> Option<&Move> {
        match (self.moves.back(), self.history.back()) {
            (Some(m), Some(h)) => Some(if h.end_time() > m.end_time() { h } else { m }),
            (m, h) => m.or(h),
        }
    }

    /// Re-derive the head and tail sentinels from the current first and last
    /// moves across history and the active queue.
    pub fn check_sentinels(&mut self) {
        let head = match self.first_known() {
            Some(first) => Move::null_move(first.print_time, 0.0, first.start_pos),
            None => Move::null_move(self.ref_time, 0.0, self.ref_pos),
        };
        let tail = match self.last_known() {
            Some(last) => Move::null_move(last.end_time(), NEVER_TIME, last.get_coord(last.move_t)),
            None => Move::null_move(self.ref_time, NEVER_TIME, self.ref_pos),
        };
        self.head = head;
        self.tail = tail;
    }

    /// Null move covering the gap between the last known move and `m`.
    fn gap_filler(&self, m: &Move) -> Option<Move> {
        let start = match self.last_known() {
            Some(prev) => {
                let prev_end = prev.end_time();
                if prev_end >= m.print_time {
                    return None;
                }
                prev_end
            }
            None => {
                // Limit the first null move to improve numerical stability
                let max_null = self.config.max_null_move;
                if max_null <= 0.0 || m.print_time <= max_null {
                    return None;
                }
                m.print_time - max_null
            }
        };
        Some(Move::null_move(start, m.print_time - start, m.start_pos))
    }

    /// Insert a fully prepared move into the active queue in time order.
    pub fn add_move(&mut self, m: Move) -> Result<(), TrapqError> {
        self.moves.try_reserve(2)?;
        let in_order = self.moves.back().map_or(true, |last| last.print_time <= m.print_time);
        if in_order {
            if self.config.fill_gaps {
                if let Some(null_move) = self.gap_filler(&m) {
                    trace!("trapq null move {:.6}+{:.6}", null_move.print_time, null_move.move_t);
                    self.moves.push_back(null_move);
                }
            }
            self.moves.push_back(m);
        } else {
            let idx = self.moves.partition_point(|o| o.print_time <= m.print_time);
            trace!("trapq out of order move at {:.6} placed at index {}", m.print_time, idx);
            self.moves.insert(idx, m);
        }
        self.check_sentinels();
        Ok(())
    }

    /// Queue one trapezoidal move as accel, cruise and decel segments.
    /// Phases without duration are skipped; the next phase starts where the
    /// previous one ended.
    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &mut self,
        print_time: f64,
        accel_t: f64,
        cruise_t: f64,
        decel_t: f64,
        start_pos: Coord,
        axes_r: Coord,
        start_v: f64,
        cruise_v: f64,
        accel: f64,
    ) -> Result<(), TrapqError> {
        // Up to three segments and one gap filler
        self.moves.try_reserve(4)?;
        let phases = [
            (accel_t, start_v, 0.5 * accel),
            (cruise_t, cruise_v, 0.0),
            (decel_t, cruise_v, -0.5 * accel),
        ];
        let mut print_time = print_time;
        let mut start_pos = start_pos;
        for (move_t, phase_v, half_accel) in phases {
            if move_t <= 0.0 {
                continue;
            }
            let m = Move::new(print_time, move_t, phase_v, half_accel, start_pos, axes_r);
            self.add_move(m)?;
            print_time += move_t;
            start_pos = m.get_coord(move_t);
        }
        Ok(())
    }

    /// Move every active move that ends at or before `print_time` to history.
    /// Returns how many moves were finalized.
    pub fn finalize_moves(&mut self, print_time: f64) -> Result<usize, TrapqError> {
        let expired = self
            .moves
            .iter()
            .take_while(|m| m.end_time() <= print_time)
            .count();
        if expired == 0 {
            return Ok(0);
        }
        self.history.try_reserve(expired)?;
        self.history.extend(self.moves.drain(..expired));
        trace!("trapq finalized {} moves up to {:.6}", expired, print_time);
        self.check_sentinels();
        Ok(expired)
    }

    /// Free history moves that ended at or before `clear_history_time`.
    /// The most recent history move is always kept.
    pub fn prune_history(&mut self, clear_history_time: f64) -> usize {
        let mut removed = 0;
        while self.history.len() > 1 {
            match self.history.front() {
                Some(m) if m.end_time() <= clear_history_time => {
                    self.history.pop_front();
                    removed += 1;
                }
                _ => break,
            }
        }
        if removed > 0 {
            debug!("trapq pruned {} history moves before {:.6}", removed, clear_history_time);
            self.check_sentinels();
        }
        removed
    }

    /// Finalize up to `print_time` and drop history older than the
    /// configured retention.
    pub fn flush(&mut self, print_time: f64) -> Result<usize, TrapqError> {
        let finalized = self.finalize_moves(print_time)?;
        self.prune_history(print_time - self.config.history_retention);
        Ok(finalized)
    }

    /// Note a position change: discard moves from `print_time` on, both
    /// planned and finalized, and restart the plan at `pos`.
    pub fn set_position(&mut self, print_time: f64, pos: Coord) -> Result<(), TrapqError> {
        self.moves.try_reserve(1)?;
        let keep = self.moves.partition_point(|m| m.print_time < print_time);
        let dropped = self.moves.len() - keep;
        self.moves.truncate(keep);
        // History past the reset is interrupted too; keeps history sorted
        // once the marker is finalized behind it
        let keep = self.history.partition_point(|m| m.print_time < print_time);
        let retired = self.history.len() - keep;
        self.history.truncate(keep);
        // Cut short any move still running at the new position time
        for m in self
            .history
            .back_mut()
            .into_iter()
            .chain(self.moves.iter_mut())
            .filter(|m| m.end_time() > print_time)
        {
            m.move_t = print_time - m.print_time;
        }
        self.moves.push_back(Move::null_move(print_time, 0.0, pos));
        self.ref_time = print_time;
        self.ref_pos = pos;
        self.check_sentinels();
        debug!(
            "trapq set_position at {:.6} to {:?}, {} planned and {} finalized moves dropped",
            print_time, pos, dropped, retired
        );
        Ok(())
    }

    /// The move in effect at `print_time`: the last known move starting at
    /// or before it, or a sentinel outside the known plan.
    pub fn find_move(&self, print_time: f64) -> &Move {
        let found = last_started(&self.moves, print_time)
            .or_else(|| last_started(&self.history, print_time));
        match found {
            None => &self.head,
            Some(_) if print_time >= self.tail.print_time => &self.tail,
            Some(m) => m,
        }
    }

    pub fn get_position(&self, print_time: f64) -> Coord {
        let m = self.find_move(print_time);
        m.get_coord(print_time - m.print_time)
    }

    /// Position at `print_time` according to finalized history only.
    pub fn find_past_position(&self, print_time: f64) -> Option<Coord> {
        match last_started(&self.history, print_time) {
            Some(m) => Some(m.get_coord(print_time - m.print_time)),
            None => self.history.front().map(|m| m.start_pos),
        }
    }

    fn history_window(&self, start_time: f64, end_time: f64) -> impl Iterator<Item = &Move> + '_ {
        self.history
            .iter()
            .take_while(move |m| m.print_time < end_time)
            .filter(move |m| {
                if m.move_t > 0.0 {
                    m.end_time() > start_time
                } else {
                    m.print_time >= start_time
                }
            })
    }

    /// Number of history moves overlapping `[start_time, end_time)`.
    pub fn count_old(&self, start_time: f64, end_time: f64) -> usize {
        self.history_window(start_time, end_time).count()
    }

    /// Return the history moves overlapping `[start_time, end_time)` in time
    /// order. Records describe whole moves, not the part inside the window.
    pub fn extract_old(&self, start_time: f64, end_time: f64, max: usize) -> Result<Vec<PullMove>, TrapqError> {
        let found = self.count_old(start_time, end_time);
        if found > max {
            debug!(
                "trapq extract {:.6}..{:.6}: {} moves exceed capacity {}",
                start_time, end_time, found, max
            );
            return Err(TrapqError::CapacityExceeded { found, max });
        }
        let mut res = Vec::new();
        res.try_reserve_exact(found)?;
        res.extend(self.history_window(start_time, end_time).map(PullMove::from));
        Ok(res)
    }

    /// Like `extract_old`, writing into caller storage. `out` is untouched
    /// when the window holds more moves than it can take.
    pub fn extract_into(&self, start_time: f64, end_time: f64, out: &mut [PullMove]) -> Result<usize, TrapqError> {
        let found = self.count_old(start_time, end_time);
        if found > out.len() {
            return Err(TrapqError::CapacityExceeded { found, max: out.len() });
        }
        for (slot, m) in out.iter_mut().zip(self.history_window(start_time, end_time)) {
            *slot = PullMove::from(m);
        }
        Ok(found)
    }

    /// Release every move. The queue is consumed and cannot be used again.
    pub fn teardown(self) {
        debug!(
            "trapq teardown: {} active, {} history moves released",
            self.moves.len(),
            self.history.len()
        );
    }
}

fn last_started(list: &VecDeque<Move>, print_time: f64) -> Option<&Move> {
    let idx = list.partition_point(|m| m.print_time <= print_time);
    idx.checked_sub(1).and_then(|i| list.get(i))
}
