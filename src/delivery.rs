//! # Delivery Coordinator
//! Hands screened messages to an SMS gateway and keeps cumulative counters.
//!
//! - BLOCKED never reaches the gateway.
//! - Warnings are labeled (see [`crate::labels`]) before sending.
//! - Gateway errors and gateway panics become a `failed` result; nothing here
//!   returns an error to the caller.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::DeliveryError;
use crate::labels;
use crate::models::{Decision, DeliveryStatus, MessageDeliveryResult};
use crate::phone::anon_hash;

pub const DEFAULT_SUCCESS_RATE: f64 = 0.98;

pub const BLOCKED_REASON: &str = "Message blocked due to spam detection";

/// Outbound SMS transport.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send(&self, sender: &str, receiver: &str, body: &str) -> Result<(), DeliveryError>;

    fn name(&self) -> &'static str;
}

/// Stand-in gateway: succeeds with probability `success_rate`, no network.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    success_rate: f64,
}

impl SimulatedGateway {
    pub fn new(success_rate: f64) -> Self {
        let success_rate = if success_rate.is_finite() {
            success_rate.clamp(0.0, 1.0)
        } else {
            DEFAULT_SUCCESS_RATE
        };
        Self { success_rate }
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(DEFAULT_SUCCESS_RATE)
    }
}

#[async_trait]
impl SmsGateway for SimulatedGateway {
    async fn send(&self, sender: &str, receiver: &str, body: &str) -> Result<(), DeliveryError> {
        debug!(
            from = %anon_hash(sender),
            to = %anon_hash(receiver),
            len = body.chars().count(),
            "simulated sms send"
        );
        if rand::random::<f64>() < self.success_rate {
            Ok(())
        } else {
            Err(DeliveryError::Undelivered)
        }
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub total_deliveries: u64,
    pub successful_deliveries: u64,
    pub blocked_messages: u64,
    pub failed_deliveries: u64,
    /// Percent of all attempts that were delivered (0 when nothing was attempted).
    pub success_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    delivered: u64,
    blocked: u64,
    failed: u64,
}

pub struct DeliveryCoordinator {
    gateway: Arc<dyn SmsGateway>,
    counters: Mutex<Counters>,
}

impl std::fmt::Debug for DeliveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryCoordinator")
            .field("gateway", &self.gateway.name())
            .field("counters", &*self.counters.lock())
            .finish()
    }
}

impl DeliveryCoordinator {
    pub fn new(gateway: Arc<dyn SmsGateway>) -> Self {
        Self {
            gateway,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub async fn deliver(
        &self,
        receiver: &str,
        text: &str,
        decision: Decision,
        sender: &str,
    ) -> MessageDeliveryResult {
        let delivery_id = new_delivery_id();
        let to = anon_hash(receiver);

        if labels::should_block(decision) {
            warn!(%delivery_id, %to, "message blocked from delivery");
            self.count(DeliveryStatus::Blocked);
            return MessageDeliveryResult {
                delivery_id,
                status: DeliveryStatus::Blocked,
                delivered_message: None,
                error_message: Some(BLOCKED_REASON.to_string()),
                delivery_time: Utc::now(),
            };
        }

        let body = labels::apply_label(text, decision);
        let outcome = AssertUnwindSafe(self.gateway.send(sender, receiver, &body))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(DeliveryError::Gateway("panicked".to_string())));

        let result = match outcome {
            Ok(()) => {
                info!(%delivery_id, %to, decision = decision.as_str(), "message delivered");
                MessageDeliveryResult {
                    delivery_id,
                    status: DeliveryStatus::Delivered,
                    delivered_message: Some(body),
                    error_message: None,
                    delivery_time: Utc::now(),
                }
            }
            Err(e) => {
                error!(%delivery_id, %to, gateway = self.gateway.name(), error = %e, "delivery failed");
                MessageDeliveryResult {
                    delivery_id,
                    status: DeliveryStatus::Failed,
                    delivered_message: None,
                    error_message: Some(e.to_string()),
                    delivery_time: Utc::now(),
                }
            }
        };
        self.count(result.status);
        result
    }

    fn count(&self, status: DeliveryStatus) {
        let mut c = self.counters.lock();
        c.total += 1;
        match status {
            DeliveryStatus::Delivered => c.delivered += 1,
            DeliveryStatus::Blocked => c.blocked += 1,
            DeliveryStatus::Failed => c.failed += 1,
            DeliveryStatus::Pending => {}
        }
    }

    pub fn stats(&self) -> DeliveryStats {
        let c = self.counters.lock();
        let success_rate = if c.total > 0 {
            c.delivered as f64 / c.total as f64 * 100.0
        } else {
            0.0
        };
        DeliveryStats {
            total_deliveries: c.total,
            successful_deliveries: c.delivered,
            blocked_messages: c.blocked,
            failed_deliveries: c.failed,
            success_rate,
        }
    }
}

fn new_delivery_id() -> String {
    format!("del_{:012x}", rand::random::<u64>() & 0xffff_ffff_ffff)
}
