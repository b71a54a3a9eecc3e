//! Subscription state machine for the room channel.
//!
//! Pure and side-effect free: [`SubscriptionState::on_event`] takes an
//! event and returns the new state plus the actions the client should
//! perform (subscribe, arm a retry timer, refresh from the store).
//!
//! Retries are bounded. After [`RetryPolicy::max_attempts`] consecutive
//! failures the machine parks in [`SubscriptionState::Failed`] until the
//! page becomes visible again or the caller subscribes afresh.

use std::time::Duration;

/// Backoff schedule for subscription retries.
///
/// Attempt 1 waits `initial_delay`, attempt 2 waits `second_delay`, and
/// each later attempt doubles the previous delay up to `max_delay`. A
/// random jitter in `0..=max_jitter` is added on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Delay before the second retry.
    pub second_delay: Duration,
    /// Upper bound for the base delay.
    pub max_delay: Duration,
    /// Upper bound for the added jitter.
    pub max_jitter: Duration,
    /// Consecutive failures tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            second_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::from_millis(500),
            max_attempts: 8,
        }
    }
}

impl RetryPolicy {
    /// Base delay (no jitter) before retry number `attempt` (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let base = match attempt {
            0 | 1 => self.initial_delay,
            2 => self.second_delay,
            n => {
                let doublings = (n - 2).min(16);
                self.second_delay.saturating_mul(1u32 << doublings)
            }
        };
        base.min(self.max_delay)
    }

    /// Delay before retry number `attempt`, including jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay(attempt)
            .saturating_add(random_jitter(self.max_jitter))
    }
}

/// Random duration in `0..=max`.
///
/// Falls back to no jitter if the OS random source is unavailable.
fn random_jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let mut bytes = [0u8; 8];
    if getrandom::getrandom(&mut bytes).is_err() {
        return Duration::ZERO;
    }
    let raw = u64::from_le_bytes(bytes);
    // `max_ms + 1` is zero only at u64::MAX, where every value is in range
    let jitter = raw.checked_rem(max_ms.wrapping_add(1)).unwrap_or(raw);
    Duration::from_millis(jitter)
}

/// Lifecycle of the room subscription (change feed plus broadcast topic).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubscriptionState {
    /// Nothing subscribed.
    #[default]
    Unsubscribed,
    /// Subscribe in flight.
    Subscribing {
        /// Consecutive failures before this attempt.
        failures: u32,
        /// Whether this attempt recovers a previous subscription.
        recovering: bool,
    },
    /// Receiving changes and broadcasts.
    Subscribed,
    /// Waiting for the retry timer.
    Retrying {
        /// Consecutive failures so far.
        failures: u32,
    },
    /// Gave up after too many failures.
    Failed {
        /// Failures before giving up.
        failures: u32,
    },
}

impl SubscriptionState {
    /// Create a new state machine in `Unsubscribed`.
    pub fn new() -> Self {
        Self::Unsubscribed
    }

    /// Process an event and return the new state plus actions to execute.
    pub fn on_event(self, event: Event, policy: &RetryPolicy) -> (Self, Vec<Action>) {
        match (self, event) {
            // Initial subscribe
            (Self::Unsubscribed, Event::SubscribeRequested) => (
                Self::Subscribing {
                    failures: 0,
                    recovering: false,
                },
                vec![Action::Subscribe],
            ),
            (Self::Failed { .. }, Event::SubscribeRequested) => (
                Self::Subscribing {
                    failures: 0,
                    recovering: true,
                },
                vec![Action::Subscribe],
            ),

            // Subscribe outcome
            (Self::Subscribing { recovering, .. }, Event::SubscribeSucceeded) => {
                if recovering {
                    (
                        Self::Subscribed,
                        vec![
                            Action::RefreshFromStore,
                            Action::EmitEvent(ChannelEvent::Recovered),
                        ],
                    )
                } else {
                    (
                        Self::Subscribed,
                        vec![Action::EmitEvent(ChannelEvent::Subscribed)],
                    )
                }
            }
            (Self::Subscribing { failures, .. }, Event::SubscribeFailed { error }) => {
                retry_or_give_up(failures.saturating_add(1), error, policy)
            }

            // Live channel
            (Self::Subscribed, Event::ChannelError { error }) => {
                let mut actions = vec![
                    Action::Unsubscribe,
                    Action::EmitEvent(ChannelEvent::Interrupted {
                        error: error.clone(),
                    }),
                ];
                let (state, more) = retry_or_give_up(1, error, policy);
                actions.extend(more);
                (state, actions)
            }
            (Self::Subscribed, Event::VisibilityRegained) => (
                Self::Subscribing {
                    failures: 0,
                    recovering: true,
                },
                vec![Action::Unsubscribe, Action::Subscribe],
            ),

            // Backoff
            (Self::Retrying { failures }, Event::RetryTimer) => (
                Self::Subscribing {
                    failures,
                    recovering: true,
                },
                vec![Action::Subscribe],
            ),
            (Self::Retrying { failures }, Event::VisibilityRegained) => (
                Self::Subscribing {
                    failures,
                    recovering: true,
                },
                vec![Action::CancelRetry, Action::Subscribe],
            ),
            (Self::Failed { .. }, Event::VisibilityRegained) => (
                Self::Subscribing {
                    failures: 0,
                    recovering: true,
                },
                vec![Action::Subscribe],
            ),

            // Teardown
            (Self::Subscribed, Event::CloseRequested)
            | (Self::Subscribing { .. }, Event::CloseRequested) => {
                (Self::Unsubscribed, vec![Action::Unsubscribe])
            }
            (Self::Retrying { .. }, Event::CloseRequested) => {
                (Self::Unsubscribed, vec![Action::CancelRetry])
            }
            (Self::Failed { .. }, Event::CloseRequested) => (Self::Unsubscribed, vec![]),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if currently subscribed.
    pub fn is_subscribed(&self) -> bool {
        matches!(self, Self::Subscribed)
    }

    /// Check if a subscribe is in flight or scheduled.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Subscribing { .. } | Self::Retrying { .. })
    }

    /// Check if retries are exhausted.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

fn retry_or_give_up(
    failures: u32,
    error: String,
    policy: &RetryPolicy,
) -> (SubscriptionState, Vec<Action>) {
    if failures >= policy.max_attempts {
        return (
            SubscriptionState::Failed { failures },
            vec![Action::EmitEvent(ChannelEvent::GaveUp {
                attempts: failures,
                error,
            })],
        );
    }
    (
        SubscriptionState::Retrying { failures },
        vec![
            Action::EmitEvent(ChannelEvent::SubscribeFailed {
                attempt: failures,
                error,
            }),
            Action::StartRetryTimer {
                delay: policy.delay_for(failures),
            },
        ],
    )
}

/// Inputs to the subscription state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Caller wants the room channel.
    SubscribeRequested,
    /// Both change feed and broadcast topic are live.
    SubscribeSucceeded,
    /// The subscribe call failed.
    SubscribeFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// A live subscription errored or closed.
    ChannelError {
        /// Error message describing the failure.
        error: String,
    },
    /// Retry timer fired.
    RetryTimer,
    /// Client regained visibility/focus.
    VisibilityRegained,
    /// Caller is leaving the room.
    CloseRequested,
}

/// Actions to be executed by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Subscribe to the change feed and broadcast topic.
    Subscribe,
    /// Drop current subscriptions.
    Unsubscribe,
    /// Arm the retry timer.
    StartRetryTimer {
        /// Delay before the next attempt.
        delay: Duration,
    },
    /// Cancel any armed retry timer.
    CancelRetry,
    /// Read the room from the store and reconcile against it.
    RefreshFromStore,
    /// Surface an event to the session.
    EmitEvent(ChannelEvent),
}

/// Channel events surfaced to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// First subscription is live.
    Subscribed,
    /// Subscription re-established after an interruption.
    Recovered,
    /// A live subscription broke.
    Interrupted {
        /// Error message describing the failure.
        error: String,
    },
    /// One subscribe attempt failed; a retry is scheduled.
    SubscribeFailed {
        /// Consecutive failures so far.
        attempt: u32,
        /// Error message describing the failure.
        error: String,
    },
    /// Retries exhausted.
    GaveUp {
        /// Total consecutive failures.
        attempts: u32,
        /// Last error.
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_jitter: Duration::ZERO,
            ..RetryPolicy::default()
        }
    }

    fn failed(error: &str) -> Event {
        Event::SubscribeFailed {
            error: error.into(),
        }
    }

    // ===========================================
    // Backoff
    // ===========================================

    #[test]
    fn backoff_schedule_starts_at_three_then_five() {
        let p = policy();
        assert_eq!(p.base_delay(1), Duration::from_secs(3));
        assert_eq!(p.base_delay(2), Duration::from_secs(5));
        assert_eq!(p.base_delay(3), Duration::from_secs(10));
        assert_eq!(p.base_delay(4), Duration::from_secs(20));
        assert_eq!(p.base_delay(5), Duration::from_secs(30));
        assert_eq!(p.base_delay(50), Duration::from_secs(30));
    }

    #[test]
    fn backoff_is_never_immediate() {
        let p = policy();
        for attempt in 0..20 {
            assert!(p.delay_for(attempt) >= Duration::from_secs(3));
        }
    }

    #[test]
    fn jitter_stays_within_bound() {
        let p = RetryPolicy::default();
        for _ in 0..50 {
            let delay = p.delay_for(2);
            assert!(delay >= Duration::from_secs(5));
            assert!(delay <= Duration::from_millis(5500));
        }
    }

    #[test]
    fn extreme_bounds_do_not_overflow() {
        let p = RetryPolicy {
            max_delay: Duration::MAX,
            max_jitter: Duration::from_millis(u64::MAX),
            ..RetryPolicy::default()
        };
        for attempt in [1, 2, 20] {
            assert!(p.delay_for(attempt) >= p.base_delay(attempt));
        }
    }

    #[test]
    fn jitter_creates_variance() {
        let p = RetryPolicy {
            max_jitter: Duration::from_secs(5),
            ..RetryPolicy::default()
        };
        let delays: Vec<Duration> = (0..20).map(|_| p.delay_for(3)).collect();
        let min = delays.iter().min().unwrap();
        let max = delays.iter().max().unwrap();
        assert!(
            max.as_millis() - min.as_millis() >= 100,
            "Expected jitter variance, got min={:?} max={:?}",
            min,
            max
        );
    }

    // ===========================================
    // Transitions
    // ===========================================

    #[test]
    fn starts_unsubscribed() {
        assert_eq!(SubscriptionState::new(), SubscriptionState::Unsubscribed);
    }

    #[test]
    fn first_subscribe_does_not_refresh() {
        let p = policy();
        let (state, actions) = SubscriptionState::new().on_event(Event::SubscribeRequested, &p);
        assert_eq!(actions, vec![Action::Subscribe]);

        let (state, actions) = state.on_event(Event::SubscribeSucceeded, &p);
        assert!(state.is_subscribed());
        assert!(!actions.contains(&Action::RefreshFromStore));
        assert!(actions.contains(&Action::EmitEvent(ChannelEvent::Subscribed)));
    }

    #[test]
    fn failure_schedules_retry_then_recovers_with_refresh() {
        let p = policy();
        let state = SubscriptionState::Subscribing {
            failures: 0,
            recovering: false,
        };

        let (state, actions) = state.on_event(failed("timeout"), &p);
        assert_eq!(state, SubscriptionState::Retrying { failures: 1 });
        assert!(actions.contains(&Action::StartRetryTimer {
            delay: Duration::from_secs(3)
        }));

        let (state, actions) = state.on_event(Event::RetryTimer, &p);
        assert!(state.is_pending());
        assert_eq!(actions, vec![Action::Subscribe]);

        let (state, actions) = state.on_event(Event::SubscribeSucceeded, &p);
        assert!(state.is_subscribed());
        assert!(actions.contains(&Action::RefreshFromStore));
    }

    #[test]
    fn second_failure_waits_longer() {
        let p = policy();
        let state = SubscriptionState::Subscribing {
            failures: 1,
            recovering: true,
        };
        let (state, actions) = state.on_event(failed("timeout"), &p);
        assert_eq!(state, SubscriptionState::Retrying { failures: 2 });
        assert!(actions.contains(&Action::StartRetryTimer {
            delay: Duration::from_secs(5)
        }));
    }

    #[test]
    fn retries_are_bounded() {
        let p = RetryPolicy {
            max_attempts: 3,
            ..policy()
        };
        let (mut state, _) = SubscriptionState::new().on_event(Event::SubscribeRequested, &p);

        for _ in 0..2 {
            let (next, _) = state.on_event(failed("down"), &p);
            assert!(matches!(next, SubscriptionState::Retrying { .. }));
            let (next, _) = next.on_event(Event::RetryTimer, &p);
            state = next;
        }

        let (state, actions) = state.on_event(failed("down"), &p);
        assert_eq!(state, SubscriptionState::Failed { failures: 3 });
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::EmitEvent(ChannelEvent::GaveUp { attempts: 3, .. })
        )));
        assert!(!actions
            .iter()
            .any(|a| matches!(a, Action::StartRetryTimer { .. })));

        // Timer events no longer do anything
        let (state, actions) = state.on_event(Event::RetryTimer, &p);
        assert!(state.is_failed());
        assert!(actions.is_empty());
    }

    #[test]
    fn channel_error_backs_off_before_resubscribing() {
        let p = policy();
        let (state, actions) = SubscriptionState::Subscribed.on_event(
            Event::ChannelError {
                error: "socket closed".into(),
            },
            &p,
        );
        assert_eq!(state, SubscriptionState::Retrying { failures: 1 });
        assert_eq!(actions[0], Action::Unsubscribe);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::StartRetryTimer { .. })));
        assert!(!actions.contains(&Action::Subscribe));
    }

    #[test]
    fn visibility_regained_resubscribes_and_refreshes() {
        let p = policy();
        let (state, actions) = SubscriptionState::Subscribed.on_event(Event::VisibilityRegained, &p);
        assert_eq!(actions, vec![Action::Unsubscribe, Action::Subscribe]);

        let (_, actions) = state.on_event(Event::SubscribeSucceeded, &p);
        assert!(actions.contains(&Action::RefreshFromStore));
    }

    #[test]
    fn visibility_regained_cuts_backoff_short() {
        let p = policy();
        let (state, actions) =
            SubscriptionState::Retrying { failures: 4 }.on_event(Event::VisibilityRegained, &p);
        assert_eq!(
            state,
            SubscriptionState::Subscribing {
                failures: 4,
                recovering: true
            }
        );
        assert_eq!(actions, vec![Action::CancelRetry, Action::Subscribe]);
    }

    #[test]
    fn failed_state_can_be_revived() {
        let p = policy();
        let (state, actions) =
            SubscriptionState::Failed { failures: 8 }.on_event(Event::VisibilityRegained, &p);
        assert!(state.is_pending());
        assert_eq!(actions, vec![Action::Subscribe]);
    }

    #[test]
    fn close_from_each_state() {
        let p = policy();
        let (s, a) = SubscriptionState::Subscribed.on_event(Event::CloseRequested, &p);
        assert_eq!((s, a), (SubscriptionState::Unsubscribed, vec![Action::Unsubscribe]));

        let (s, a) = SubscriptionState::Retrying { failures: 2 }.on_event(Event::CloseRequested, &p);
        assert_eq!((s, a), (SubscriptionState::Unsubscribed, vec![Action::CancelRetry]));

        let (s, a) = SubscriptionState::Failed { failures: 8 }.on_event(Event::CloseRequested, &p);
        assert_eq!((s, a), (SubscriptionState::Unsubscribed, vec![]));
    }

    #[test]
    fn unexpected_events_are_ignored() {
        let p = policy();
        let (state, actions) = SubscriptionState::Unsubscribed.on_event(Event::SubscribeSucceeded, &p);
        assert_eq!(state, SubscriptionState::Unsubscribed);
        assert!(actions.is_empty());
    }
}
