//! ICMP reachability probing and the per-device Up/Down state machine.
//!
//! The state machine is Markovian by construction: [`ReachabilityState::transition`]
//! takes only the prior state, the observed probe result, and the flap ring —
//! never wall-clock path history — matching the idempotence law in the
//! testable-properties section.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::Duration;
use surge_ping::{Client, Config, PingIdentifier, PingSequence};
use tracing::debug;

/// Outcome of probing one device in one sweep tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub reachable: bool,
    pub rtt_ms: Option<f64>,
    pub loss_pct: f64,
}

/// Sends ICMP echo requests and reduces them to a [`ProbeResult`] per §4.2:
/// `PING_COUNT` packets, 0.2s spacing, 1s per-packet timeout.
pub struct PingSampler {
    client: Client,
    packet_count: u32,
    packet_interval: Duration,
    packet_timeout: Duration,
}

impl PingSampler {
    pub fn new(packet_count: u32, packet_timeout: Duration) -> Result<Self> {
        let config = Config::default();
        let client = Client::new(&config)
            .map_err(|e| Error::config(format!("failed to create ICMP client: {e}")))?;
        Ok(Self {
            client,
            packet_count,
            packet_interval: Duration::from_millis(200),
            packet_timeout,
        })
    }

    /// Probe a single device: send `packet_count` echoes, return reachability
    /// and timing reduced across whichever replies arrived before their
    /// individual timeouts elapsed.
    pub async fn probe(&self, addr: IpAddr, sequence_base: u16) -> ProbeResult {
        let mut pinger = self
            .client
            .pinger(addr, PingIdentifier(sequence_base))
            .await;
        pinger.timeout(self.packet_timeout);

        let mut received = 0u32;
        let mut rtts = Vec::new();

        for i in 0..self.packet_count {
            let payload = [0u8; 56];
            match pinger.ping(PingSequence(i), &payload).await {
                Ok((_, duration)) => {
                    received += 1;
                    rtts.push(duration.as_secs_f64() * 1000.0);
                }
                Err(e) => {
                    debug!(%addr, sequence = i, error = %e, "ping packet not answered");
                }
            }
            if i + 1 < self.packet_count {
                tokio::time::sleep(self.packet_interval).await;
            }
        }

        let sent = f64::from(self.packet_count);
        let loss_pct = (sent - f64::from(received)) / sent * 100.0;
        ProbeResult {
            reachable: received >= 1,
            rtt_ms: (!rtts.is_empty()).then(|| rtts.iter().sum::<f64>() / rtts.len() as f64),
            loss_pct,
        }
    }
}

/// The two states a device's reachability can be in. Matches §3's
/// `reachability ∈ {Up, Down}` (Unknown is the pre-first-probe absence of a
/// row, not a third transition state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReachabilityState {
    Up,
    Down,
}

/// Effect a single probe tick had on a device, for the caller to persist and
/// to forward to the alert engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub new_state: ReachabilityState,
    pub down_since: Option<DateTime<Utc>>,
    pub event: Option<DeviceEvent>,
    pub is_flapping: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    DeviceDown,
    DeviceUp { downtime: chrono::Duration },
}

/// Bounded ring of recent Up/Down transition timestamps, used for flap
/// detection. Holds at most `capacity` entries; older ones fall off.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionRing {
    transitions: VecDeque<DateTime<Utc>>,
}

const RING_CAPACITY: usize = 32;

impl TransitionRing {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, at: DateTime<Utc>) {
        self.transitions.push_back(at);
        while self.transitions.len() > RING_CAPACITY {
            self.transitions.pop_front();
        }
    }

    /// Count of transitions that occurred within `window` of `now`.
    #[must_use]
    pub fn count_within(&self, now: DateTime<Utc>, window: chrono::Duration) -> usize {
        self.transitions
            .iter()
            .filter(|t| now - **t <= window)
            .count()
    }

    #[must_use]
    pub fn last_transition(&self) -> Option<DateTime<Utc>> {
        self.transitions.back().copied()
    }
}

/// Applies one probe observation to a device's current state, per the §4.2
/// transition table, and reports whether the device should be considered
/// flapping per §4.2 / boundary behavior in §8.
pub fn transition(
    prior: ReachabilityState,
    down_since: Option<DateTime<Utc>>,
    observed_reachable: bool,
    ring: &mut TransitionRing,
    now: DateTime<Utc>,
    flap_k: u32,
    flap_window: chrono::Duration,
    was_flapping: bool,
) -> TransitionOutcome {
    let (new_state, new_down_since, event) = match (prior, observed_reachable) {
        (ReachabilityState::Up, true) => (ReachabilityState::Up, down_since, None),
        (ReachabilityState::Up, false) => {
            ring.push(now);
            (
                ReachabilityState::Down,
                Some(now),
                Some(DeviceEvent::DeviceDown),
            )
        }
        (ReachabilityState::Down, false) => (ReachabilityState::Down, down_since, None),
        (ReachabilityState::Down, true) => {
            ring.push(now);
            let downtime = down_since.map_or(chrono::Duration::zero(), |since| now - since);
            (
                ReachabilityState::Up,
                None,
                Some(DeviceEvent::DeviceUp { downtime }),
            )
        }
    };

    let transitions_in_window = ring.count_within(now, flap_window);
    let is_flapping = if was_flapping {
        // Stays flapping until a full window has elapsed with no further transitions.
        ring.last_transition()
            .is_some_and(|last| now - last < flap_window)
    } else {
        transitions_in_window >= flap_k as usize
    };

    TransitionOutcome {
        new_state,
        down_since: new_down_since,
        event,
        is_flapping,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn up_to_down_sets_down_since_and_emits_event() {
        let mut ring = TransitionRing::new();
        let outcome = transition(
            ReachabilityState::Up,
            None,
            false,
            &mut ring,
            at(0),
            3,
            chrono::Duration::seconds(300),
            false,
        );
        assert_eq!(outcome.new_state, ReachabilityState::Down);
        assert_eq!(outcome.down_since, Some(at(0)));
        assert_eq!(outcome.event, Some(DeviceEvent::DeviceDown));
    }

    #[test]
    fn down_to_up_clears_down_since_and_reports_downtime() {
        let mut ring = TransitionRing::new();
        ring.push(at(0));
        let outcome = transition(
            ReachabilityState::Down,
            Some(at(0)),
            true,
            &mut ring,
            at(120),
            3,
            chrono::Duration::seconds(300),
            false,
        );
        assert_eq!(outcome.new_state, ReachabilityState::Up);
        assert_eq!(outcome.down_since, None);
        assert_eq!(
            outcome.event,
            Some(DeviceEvent::DeviceUp {
                downtime: chrono::Duration::seconds(120)
            })
        );
    }

    #[test]
    fn three_transitions_within_window_trips_flapping() {
        let mut ring = TransitionRing::new();
        let mut state = ReachabilityState::Up;
        let mut down_since = None;
        let mut flapping = false;
        // F, T, F sequence -> 3 transitions.
        for (i, reachable) in [false, true, false].into_iter().enumerate() {
            let outcome = transition(
                state,
                down_since,
                reachable,
                &mut ring,
                at(i as i64 * 60),
                3,
                chrono::Duration::seconds(300),
                flapping,
            );
            state = outcome.new_state;
            down_since = outcome.down_since;
            flapping = outcome.is_flapping;
        }
        assert!(flapping);
    }

    #[test]
    fn flapping_clears_after_a_full_stable_window() {
        let mut ring = TransitionRing::new();
        ring.push(at(0));
        ring.push(at(60));
        ring.push(at(120));
        // Stable (no transition) well past the 300s window since the last flip.
        let outcome = transition(
            ReachabilityState::Up,
            None,
            true,
            &mut ring,
            at(500),
            3,
            chrono::Duration::seconds(300),
            true,
        );
        assert!(!outcome.is_flapping);
    }

    #[test]
    fn two_of_two_packets_lost_one_is_reachable_with_fifty_percent_loss() {
        // Direct construction mirrors what `PingSampler::probe` would compute
        // for PING_COUNT=2 with exactly one reply.
        let result = ProbeResult {
            reachable: true,
            rtt_ms: Some(12.0),
            loss_pct: 50.0,
        };
        assert!(result.reachable);
        assert!((result.loss_pct - 50.0).abs() < f64::EPSILON);
    }
}
