//! Reel cursor with single-flight transitions.
//!
//! The controller owns the authoritative index into the *visible* list.
//! Three channels feed it: thresholded wheel deltas, keyboard intents and
//! settle reports from the render layer. Wheel and keyboard both end up in
//! [`NavigationController::navigate`]; at most one transition is honored
//! until the render layer reports a settle or the fallback deadline passes.

use crate::feed::ContentItem;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Fallback for a render layer that never reports a settle.
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_millis(800);

/// Wheel deltas below this magnitude are not intents.
pub const DEFAULT_WHEEL_THRESHOLD: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

/// Instruction for the render layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    /// Animate to the index, then report a settle.
    AnimateTo(usize),
    /// Jump without animation (deep-link seek).
    JumpTo(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NavState {
    Idle,
    Transitioning { target: usize, deadline: Instant },
}

#[derive(Debug)]
pub struct NavigationController {
    len: usize,
    current: usize,
    state: NavState,
    timeout: Duration,
    wheel_threshold: f64,
    seek_used: bool,
    settled_once: bool,
    commands: VecDeque<NavCommand>,
}

impl NavigationController {
    /// Create a cursor over `len` visible items, starting at `initial`
    /// (clamped).
    pub fn new(len: usize, initial: usize, timeout: Duration, wheel_threshold: f64) -> Self {
        Self {
            len,
            current: clamp_index(initial, len),
            state: NavState::Idle,
            timeout,
            wheel_threshold: wheel_threshold.abs(),
            seek_used: false,
            settled_once: false,
            commands: VecDeque::new(),
        }
    }

    /// `None` iff the visible list is empty.
    pub fn current_index(&self) -> Option<usize> {
        (self.len > 0).then_some(self.current)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_transitioning(&self) -> bool {
        matches!(self.state, NavState::Transitioning { .. })
    }

    pub fn has_settled(&self) -> bool {
        self.settled_once
    }

    /// Move one step. Returns whether the intent started a transition.
    pub fn navigate(&mut self, direction: Direction) -> bool {
        self.expire(Instant::now());

        if let NavState::Transitioning { target, .. } = self.state {
            tracing::trace!(?direction, target, "Transition in flight, dropping intent");
            return false;
        }
        if self.len == 0 {
            return false;
        }

        let target = match direction {
            Direction::Next => self.current.saturating_add(1).min(self.len - 1),
            Direction::Prev => self.current.saturating_sub(1),
        };
        if target == self.current {
            return false;
        }

        self.current = target;
        self.state = NavState::Transitioning {
            target,
            deadline: Instant::now() + self.timeout,
        };
        self.commands.push_back(NavCommand::AnimateTo(target));
        tracing::debug!(?direction, target, "Transition started");
        true
    }

    /// Wheel channel. Small deltas (high-resolution trackpads) are ignored.
    pub fn wheel(&mut self, delta_y: f64) -> bool {
        if !delta_y.is_finite() || delta_y.abs() < self.wheel_threshold {
            return false;
        }
        let direction = if delta_y > 0.0 {
            Direction::Next
        } else {
            Direction::Prev
        };
        self.navigate(direction)
    }

    /// Keyboard channel. Every keypress is an intent.
    pub fn key(&mut self, direction: Direction) -> bool {
        self.navigate(direction)
    }

    /// Authoritative position from the render layer. Always ends a
    /// transition. Returns whether the index changed.
    pub fn report_settled(&mut self, observed: usize) -> bool {
        let before = self.current;
        self.current = clamp_index(observed, self.len);
        self.state = NavState::Idle;
        self.settled_once = true;
        if before != self.current {
            tracing::debug!(from = before, to = self.current, "Settle corrected cursor");
        }
        before != self.current
    }

    /// Treat earlier settles as provisional, reopening the seek window.
    ///
    /// Used when the list they landed on was a placeholder (a restored
    /// snapshot) and has just been replaced by live data. A seek that was
    /// already used stays used.
    pub fn forget_settles(&mut self) {
        self.settled_once = false;
    }

    /// One-shot deep-link positioning, valid only before the first settle.
    ///
    /// A missing id is a no-op and does not use up the seek.
    pub fn seek(&mut self, item_id: &str, visible: &[ContentItem]) -> bool {
        if self.seek_used || self.settled_once {
            return false;
        }
        let Some(position) = visible.iter().position(|item| item.id == item_id) else {
            return false;
        };

        self.len = visible.len();
        self.current = position;
        self.state = NavState::Idle;
        self.seek_used = true;
        self.commands.push_back(NavCommand::JumpTo(position));
        tracing::debug!(item_id, position, "Deep-link seek");
        true
    }

    /// Visible list changed size. Re-clamps the cursor.
    pub fn set_len(&mut self, len: usize) {
        self.len = len;
        self.current = clamp_index(self.current, len);
        if let NavState::Transitioning { target, .. } = self.state {
            if len == 0 || target >= len {
                self.state = NavState::Idle;
            }
        }
    }

    /// Release a transition whose deadline has passed. Returns true if it did.
    pub fn tick(&mut self) -> bool {
        self.expire(Instant::now())
    }

    fn expire(&mut self, now: Instant) -> bool {
        match self.state {
            NavState::Transitioning { target, deadline } if now >= deadline => {
                tracing::debug!(target, "No settle before deadline, releasing transition lock");
                self.state = NavState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Drain pending render instructions.
    pub fn take_commands(&mut self) -> Vec<NavCommand> {
        self.commands.drain(..).collect()
    }
}

fn clamp_index(index: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        index.min(len - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::test_item;
    use tokio::time;

    fn controller(len: usize) -> NavigationController {
        NavigationController::new(len, 0, DEFAULT_TRANSITION_TIMEOUT, DEFAULT_WHEEL_THRESHOLD)
    }

    #[tokio::test]
    async fn test_navigate_next_starts_transition() {
        let mut nav = controller(3);
        assert!(nav.navigate(Direction::Next));
        assert_eq!(nav.current_index(), Some(1));
        assert!(nav.is_transitioning());
        assert_eq!(nav.take_commands(), vec![NavCommand::AnimateTo(1)]);
    }

    #[tokio::test]
    async fn test_rapid_intents_advance_once() {
        let mut nav = controller(10);
        let accepted: Vec<bool> = (0..5).map(|_| nav.navigate(Direction::Next)).collect();
        assert_eq!(accepted, vec![true, false, false, false, false]);
        assert_eq!(nav.current_index(), Some(1));
        assert_eq!(nav.take_commands().len(), 1);
    }

    #[tokio::test]
    async fn test_edges_are_no_ops() {
        let mut nav = controller(2);
        assert!(!nav.navigate(Direction::Prev));
        assert!(!nav.is_transitioning());

        nav.report_settled(1);
        assert!(!nav.navigate(Direction::Next));
        assert_eq!(nav.current_index(), Some(1));
    }

    #[tokio::test]
    async fn test_empty_list_has_no_cursor() {
        let mut nav = controller(0);
        assert_eq!(nav.current_index(), None);
        assert!(!nav.navigate(Direction::Next));
        nav.report_settled(4);
        assert_eq!(nav.current_index(), None);
    }

    #[tokio::test]
    async fn test_settle_overrides_optimistic_index() {
        let mut nav = controller(10);
        nav.navigate(Direction::Next);
        // Inertial scroll carried the view further than requested
        assert!(nav.report_settled(4));
        assert_eq!(nav.current_index(), Some(4));
        assert!(!nav.is_transitioning());
        // Lock released: the next intent is honored
        assert!(nav.navigate(Direction::Next));
        assert_eq!(nav.current_index(), Some(5));
    }

    #[tokio::test]
    async fn test_settle_clamps_observed_index() {
        let mut nav = controller(3);
        nav.report_settled(99);
        assert_eq!(nav.current_index(), Some(2));
    }

    #[tokio::test]
    async fn test_timeout_releases_lock() {
        time::pause();
        let mut nav = controller(10);
        nav.navigate(Direction::Next);

        time::advance(Duration::from_millis(500)).await;
        assert!(!nav.navigate(Direction::Next));
        assert!(!nav.tick());

        time::advance(Duration::from_millis(400)).await;
        // navigate checks the deadline itself, no tick required
        assert!(nav.navigate(Direction::Next));
        assert_eq!(nav.current_index(), Some(2));
    }

    #[tokio::test]
    async fn test_tick_expires_transition() {
        time::pause();
        let mut nav = controller(10);
        nav.navigate(Direction::Next);
        time::advance(DEFAULT_TRANSITION_TIMEOUT).await;
        assert!(nav.tick());
        assert!(!nav.is_transitioning());
        assert_eq!(nav.current_index(), Some(1));
    }

    #[tokio::test]
    async fn test_wheel_threshold() {
        let mut nav = controller(10);
        assert!(!nav.wheel(12.0));
        assert!(!nav.wheel(-29.9));
        assert!(!nav.wheel(f64::NAN));
        assert!(!nav.is_transitioning());

        assert!(nav.wheel(120.0));
        assert_eq!(nav.current_index(), Some(1));
        nav.report_settled(1);
        assert!(nav.wheel(-45.0));
        assert_eq!(nav.current_index(), Some(0));
    }

    #[tokio::test]
    async fn test_keyboard_is_not_thresholded() {
        let mut nav = controller(3);
        assert!(nav.key(Direction::Next));
        nav.report_settled(1);
        assert!(nav.key(Direction::Next));
        assert_eq!(nav.current_index(), Some(2));
    }

    #[tokio::test]
    async fn test_seek_once_before_settle() {
        let visible: Vec<_> = (40..48)
            .map(|i| test_item(&format!("item-{i}"), "a"))
            .collect();
        let mut nav = controller(visible.len());

        assert!(nav.seek("item-44", &visible));
        assert_eq!(nav.current_index(), Some(4));
        assert_eq!(nav.take_commands(), vec![NavCommand::JumpTo(4)]);

        assert!(!nav.seek("item-46", &visible));
        assert_eq!(nav.current_index(), Some(4));
        assert!(nav.take_commands().is_empty());
    }

    #[tokio::test]
    async fn test_seek_missing_id_is_no_op() {
        let visible = vec![test_item("a", "x"), test_item("b", "x")];
        let mut nav = controller(2);
        assert!(!nav.seek("zzz", &visible));
        assert_eq!(nav.current_index(), Some(0));
        // Still available once the item shows up
        assert!(nav.seek("b", &visible));
        assert_eq!(nav.current_index(), Some(1));
    }

    #[tokio::test]
    async fn test_seek_after_settle_is_no_op() {
        let visible = vec![test_item("a", "x"), test_item("b", "x")];
        let mut nav = controller(2);
        nav.report_settled(0);
        assert!(!nav.seek("b", &visible));
        assert_eq!(nav.current_index(), Some(0));
    }

    #[tokio::test]
    async fn test_forget_settles_reopens_seek_once() {
        let visible = vec![test_item("a", "x"), test_item("b", "x")];
        let mut nav = controller(2);
        nav.report_settled(0);
        nav.forget_settles();
        assert!(!nav.has_settled());
        assert!(nav.seek("b", &visible));
        assert_eq!(nav.take_commands(), vec![NavCommand::JumpTo(1)]);

        nav.forget_settles();
        assert!(!nav.seek("a", &visible));
        assert_eq!(nav.current_index(), Some(1));
    }

    #[tokio::test]
    async fn test_shrink_reclamps_cursor() {
        let mut nav = controller(10);
        nav.report_settled(8);
        nav.set_len(5);
        assert_eq!(nav.current_index(), Some(4));
        nav.set_len(0);
        assert_eq!(nav.current_index(), None);
        nav.set_len(3);
        assert_eq!(nav.current_index(), Some(0));
    }

    #[tokio::test]
    async fn test_shrink_below_target_releases_lock() {
        let mut nav = controller(10);
        nav.report_settled(8);
        nav.navigate(Direction::Next);
        nav.set_len(4);
        assert_eq!(nav.current_index(), Some(3));
        assert!(!nav.is_transitioning());
    }

    #[test]
    fn test_initial_index_is_clamped() {
        let nav = NavigationController::new(3, 10, DEFAULT_TRANSITION_TIMEOUT, 30.0);
        assert_eq!(nav.current_index(), Some(2));
    }
}
