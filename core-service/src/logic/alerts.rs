//! Alert Gateway - tier change notifications
//!
//! Phát sự kiện khi mức rủi ro của học sinh thay đổi.
//! Delivery (SMS, email, dashboards) lives behind `AlertGateway`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::logic::model::RiskTier;

/// Event names
pub mod events {
    pub const TIER_CHANGED: &str = "risk:tier-changed";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierChangeEvent {
    pub student_id: String,
    pub previous_tier: RiskTier,
    pub new_tier: RiskTier,
    pub probability: f64,
    pub timestamp: DateTime<Utc>,
}

impl TierChangeEvent {
    /// Risk went up
    pub fn is_escalation(&self) -> bool {
        self.new_tier > self.previous_tier
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert channel closed")]
    Closed,
}

pub trait AlertGateway: Send + Sync {
    fn publish(&self, event: &TierChangeEvent) -> Result<(), AlertError>;
}

/// Forwards events into a tokio channel
pub struct ChannelAlertGateway {
    sender: mpsc::UnboundedSender<TierChangeEvent>,
}

impl ChannelAlertGateway {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TierChangeEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl AlertGateway for ChannelAlertGateway {
    fn publish(&self, event: &TierChangeEvent) -> Result<(), AlertError> {
        self.sender.send(event.clone()).map_err(|_| AlertError::Closed)
    }
}

/// Writes events to the log only
#[derive(Debug, Default)]
pub struct LogAlertGateway;

impl AlertGateway for LogAlertGateway {
    fn publish(&self, event: &TierChangeEvent) -> Result<(), AlertError> {
        let payload = serde_json::to_string(event).unwrap_or_default();
        if event.is_escalation() {
            log::warn!("[{}] {}", events::TIER_CHANGED, payload);
        } else {
            log::info!("[{}] {}", events::TIER_CHANGED, payload);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(previous: RiskTier, new: RiskTier) -> TierChangeEvent {
        TierChangeEvent {
            student_id: "S-1".to_string(),
            previous_tier: previous,
            new_tier: new,
            probability: 0.8,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_channel_gateway_delivers() {
        let (gateway, mut rx) = ChannelAlertGateway::new();
        let e = event(RiskTier::Low, RiskTier::High);
        gateway.publish(&e).unwrap();
        assert_eq!(rx.try_recv().unwrap(), e);
    }

    #[test]
    fn test_closed_channel() {
        let (gateway, rx) = ChannelAlertGateway::new();
        drop(rx);
        assert!(matches!(gateway.publish(&event(RiskTier::Low, RiskTier::Medium)), Err(AlertError::Closed)));
    }

    #[test]
    fn test_escalation() {
        assert!(event(RiskTier::Low, RiskTier::High).is_escalation());
        assert!(!event(RiskTier::High, RiskTier::Medium).is_escalation());
        assert!(LogAlertGateway.publish(&event(RiskTier::Medium, RiskTier::Low)).is_ok());
    }
}
