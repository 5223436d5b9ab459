//! Adaptive per-chat send cooldowns.
//!
//! Each chat type has a baseline gap between sends. Timeouts and flood
//! signals raise a chat's multiplier; it decays linearly back to 1× over
//! the decay window. State is updated per key without any cross-key
//! coordination, and concurrent updates to one chat are last-writer-wins:
//! the values are heuristics, so lost updates are acceptable.

use std::time::Duration;

use dashmap::DashMap;
use teloxide::types::Chat;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn of(chat: &Chat) -> Self {
        if chat.is_private() {
            Self::Private
        } else if chat.is_supergroup() {
            Self::Supergroup
        } else if chat.is_channel() {
            Self::Channel
        } else {
            Self::Group
        }
    }

    pub fn baseline(self) -> Duration {
        match self {
            Self::Private => Duration::from_millis(50),
            Self::Group | Self::Supergroup => Duration::from_secs(1),
            Self::Channel => Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ChatRate {
    multiplier: f64,
    last_penalty: Instant,
    next_slot: Option<Instant>,
}

#[derive(Debug)]
pub struct CooldownGovernor {
    rates: DashMap<i64, ChatRate>,
    step: f64,
    max_multiplier: f64,
    decay: Duration,
    fast: Duration,
}

impl Default for CooldownGovernor {
    fn default() -> Self {
        Self {
            rates: DashMap::new(),
            step: 1.5,
            max_multiplier: 8.0,
            decay: Duration::from_secs(5 * 60),
            fast: Duration::from_millis(30),
        }
    }
}

impl CooldownGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    fn effective(&self, rate: &ChatRate, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(rate.last_penalty).as_secs_f64();
        let remaining = (1.0 - elapsed / self.decay.as_secs_f64()).max(0.0);
        1.0 + (rate.multiplier - 1.0) * remaining
    }

    /// Current multiplier for a chat.
    pub fn multiplier(&self, chat_id: i64) -> f64 {
        let now = Instant::now();
        self.rates
            .get(&chat_id)
            .map(|rate| self.effective(&rate, now))
            .unwrap_or(1.0)
    }

    /// Gap between sends to this chat right now.
    pub fn cooldown(&self, chat_id: i64, kind: ChatKind) -> Duration {
        kind.baseline().mul_f64(self.multiplier(chat_id))
    }

    /// Record a timeout or flood signal for the chat.
    pub fn penalize(&self, chat_id: i64) {
        let now = Instant::now();
        let mut rate = self.rates.entry(chat_id).or_insert(ChatRate {
            multiplier: 1.0,
            last_penalty: now,
            next_slot: None,
        });
        let current = self.effective(&rate, now);
        rate.multiplier = (current * self.step).min(self.max_multiplier);
        rate.last_penalty = now;
    }

    /// Wait for this chat's next send slot and claim it.
    ///
    /// `fast` uses the fixed light cooldown instead of the adaptive one.
    pub async fn wait(&self, chat_id: i64, kind: ChatKind, fast: bool) {
        let gap = if fast { self.fast } else { self.cooldown(chat_id, kind) };
        let now = Instant::now();

        let slot = {
            let mut rate = self.rates.entry(chat_id).or_insert(ChatRate {
                multiplier: 1.0,
                last_penalty: now,
                next_slot: None,
            });
            let slot = rate.next_slot.unwrap_or(now).max(now);
            rate.next_slot = Some(slot + gap);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }

    /// Forget chats whose penalty has decayed and whose next slot has
    /// passed. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let before = self.rates.len();
        self.rates.retain(|_, rate| {
            let penalized = self.effective(rate, now) > 1.0;
            let pending = rate.next_slot.is_some_and(|slot| slot > now);
            penalized || pending
        });
        before.saturating_sub(self.rates.len())
    }

    pub fn tracked_chats(&self) -> usize {
        self.rates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_penalty_raises_and_decays() {
        let governor = CooldownGovernor::new();
        assert_eq!(governor.cooldown(1, ChatKind::Group), Duration::from_secs(1));

        governor.penalize(1);
        governor.penalize(1);
        assert!((governor.multiplier(1) - 2.25).abs() < 1e-9);

        tokio::time::advance(Duration::from_secs(150)).await;
        assert!((governor.multiplier(1) - 1.625).abs() < 1e-6);

        tokio::time::advance(Duration::from_secs(200)).await;
        assert_eq!(governor.multiplier(1), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiplier_is_capped() {
        let governor = CooldownGovernor::new();
        for _ in 0..20 {
            governor.penalize(7);
        }
        assert_eq!(governor.multiplier(7), 8.0);
        assert_eq!(governor.cooldown(7, ChatKind::Private), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_are_spaced() {
        let governor = CooldownGovernor::new();
        let start = Instant::now();

        for _ in 0..3 {
            governor.wait(5, ChatKind::Channel, false).await;
        }
        // First send is immediate, then two 1.5s gaps.
        assert_eq!(start.elapsed(), Duration::from_millis(3000));

        let start = Instant::now();
        governor.wait(6, ChatKind::Channel, true).await;
        governor.wait(6, ChatKind::Channel, true).await;
        assert_eq!(start.elapsed(), Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_chats_are_pruned() {
        let governor = CooldownGovernor::new();
        governor.wait(1, ChatKind::Private, false).await;
        governor.penalize(2);
        assert_eq!(governor.tracked_chats(), 2);

        // Chat 1 still holds its next slot.
        assert_eq!(governor.prune(), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(governor.prune(), 1);
        assert_eq!(governor.tracked_chats(), 1);

        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        assert_eq!(governor.prune(), 1);
        assert_eq!(governor.tracked_chats(), 0);
        assert_eq!(governor.multiplier(2), 1.0);
    }

    #[test]
    fn test_baselines_by_tier() {
        assert!(ChatKind::Private.baseline() < ChatKind::Group.baseline());
        assert_eq!(ChatKind::Group.baseline(), ChatKind::Supergroup.baseline());
        assert!(ChatKind::Channel.baseline() > ChatKind::Supergroup.baseline());
    }
}
