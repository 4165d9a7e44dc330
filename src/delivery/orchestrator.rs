use tracing::{info, warn};

use crate::delivery::{Channel, ChannelAttempt, ChannelSet, SendOutcome};

/// Injected failure simulation, consulted before each channel attempt.
/// Only the chaos policy ever fires; the default is a no-op.
pub trait FailurePolicy: Send + Sync {
    fn should_fail(&self, channel: Channel) -> bool;
}

pub struct NoFailures;

impl FailurePolicy for NoFailures {
    fn should_fail(&self, _channel: Channel) -> bool {
        false
    }
}

/// Transient provider failures with fixed per-channel rates, enabled by
/// the SIMULATE_DELIVERY_FAILURES flag.
pub struct SimulatedFailures;

impl SimulatedFailures {
    fn fail_rate(channel: Channel) -> f64 {
        match channel {
            Channel::Email => 0.15,
            Channel::Sms => 0.2,
            Channel::Telegram => 0.1,
        }
    }
}

impl FailurePolicy for SimulatedFailures {
    fn should_fail(&self, channel: Channel) -> bool {
        rand::random::<f64>() < Self::fail_rate(channel)
    }
}

pub struct Orchestrator {
    channels: ChannelSet,
    policy: Box<dyn FailurePolicy>,
}

/// Preferred channel first, then the remaining channels in fixed
/// priority order.
fn attempt_order(preferred: Channel) -> Vec<Channel> {
    let mut order = vec![preferred];
    order.extend(
        Channel::PRIORITY
            .iter()
            .copied()
            .filter(|channel| *channel != preferred),
    );
    order
}

impl Orchestrator {
    pub fn new(channels: ChannelSet, policy: Box<dyn FailurePolicy>) -> Self {
        Orchestrator { channels, policy }
    }

    /// Try each channel strictly in sequence until one delivers. The
    /// attempt log records every channel tried, in order.
    pub async fn deliver(
        &self,
        recipient: &str,
        photos: &[String],
        preferred: Channel,
    ) -> SendOutcome {
        let mut attempts: Vec<ChannelAttempt> = Vec::new();

        for channel in attempt_order(preferred) {
            if self.policy.should_fail(channel) {
                warn!(%channel, "simulated provider failure");
                attempts.push(ChannelAttempt {
                    channel,
                    success: false,
                    detail: format!("Failed to send via {channel}"),
                    error: Some(format!("{channel} provider unavailable")),
                });
                continue;
            }

            match self.channels.sender(channel).send(recipient, photos).await {
                Ok(detail) => {
                    info!(%channel, "delivery succeeded");
                    attempts.push(ChannelAttempt {
                        channel,
                        success: true,
                        detail,
                        error: None,
                    });
                    return SendOutcome {
                        success: true,
                        attempts,
                    };
                }
                Err(err) => {
                    warn!(%channel, error = %err, "delivery failed, falling back");
                    attempts.push(ChannelAttempt {
                        channel,
                        success: false,
                        detail: format!("Failed to send via {channel}"),
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        SendOutcome {
            success: false,
            attempts,
        }
    }
}
