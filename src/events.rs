//! Domain events and their delivery to Discord.
//!
//! Core operations publish onto an [`EventBus`] after their transaction
//! commits. Delivery runs in a background task, so a slow or failing webhook
//! never holds up a payment or a checkout.

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::models::FundingMethod;

const DEFAULT_CAPACITY: usize = 256;

const COLOR_SUCCESS: u32 = 0x2ECC71;
const COLOR_INFO: u32 = 0x3498DB;
const COLOR_WARNING: u32 = 0xF1C40F;
const COLOR_DANGER: u32 = 0xE74C3C;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    IntentCreated {
        intent_id: String,
        user_id: String,
        method: FundingMethod,
        amount: Decimal,
        reference: String,
    },
    PaymentCompleted {
        intent_id: String,
        user_id: String,
        amount: Decimal,
        points: i64,
        new_balance: i64,
    },
    PaymentFailed {
        intent_id: String,
        user_id: String,
        reference: String,
        reason: String,
    },
    IntentExpired {
        intent_id: String,
        user_id: String,
        reference: String,
    },
    TopupReviewed {
        intent_id: String,
        user_id: String,
        approver_id: String,
        approved: bool,
        points: i64,
        new_balance: Option<i64>,
    },
    /// A payment or approval closed an intent whose owner no longer exists.
    CreditLost {
        intent_id: String,
        user_id: String,
        points: i64,
    },
    CheckoutCompleted {
        user_id: String,
        license_count: usize,
        total: i64,
        new_balance: i64,
    },
    LicenseBound {
        license_id: String,
        user_id: String,
        server_address: String,
    },
    /// A verification attempt for a wrong resource or from a foreign server.
    LicenseRejected {
        license_id: String,
        user_id: String,
        server_address: String,
        reason: String,
    },
    PointsAdjusted {
        user_id: String,
        actor_id: String,
        previous: i64,
        current: i64,
    },
}

/// In-process fan-out of domain events. Publishing never blocks and never fails;
/// events published with no subscriber are dropped.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: DomainEvent) {
        tracing::debug!(?event, "Publishing domain event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

#[derive(Debug, Serialize)]
pub struct DiscordMessage {
    pub embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
pub struct DiscordEmbed {
    pub title: String,
    pub color: u32,
    pub fields: Vec<DiscordField>,
}

#[derive(Debug, Serialize)]
pub struct DiscordField {
    pub name: &'static str,
    pub value: String,
    pub inline: bool,
}

fn field(name: &'static str, value: impl ToString) -> DiscordField {
    DiscordField {
        name,
        value: value.to_string(),
        inline: true,
    }
}

/// Render an event as a Discord webhook message.
pub fn discord_message(event: &DomainEvent) -> DiscordMessage {
    let (title, color, fields) = match event {
        DomainEvent::IntentCreated {
            user_id,
            method,
            amount,
            reference,
            ..
        } => (
            match method {
                FundingMethod::Qr => "QR payment created",
                FundingMethod::Slip => "Top-up slip submitted",
            },
            COLOR_INFO,
            vec![
                field("User", user_id),
                field("Amount", format!("{} THB", amount)),
                field("Reference", reference),
            ],
        ),
        DomainEvent::PaymentCompleted {
            user_id,
            amount,
            points,
            new_balance,
            ..
        } => (
            "Payment completed",
            COLOR_SUCCESS,
            vec![
                field("User", user_id),
                field("Amount", format!("{} THB", amount)),
                field("Points", points),
                field("Balance", new_balance),
            ],
        ),
        DomainEvent::PaymentFailed {
            user_id,
            reference,
            reason,
            ..
        } => (
            "Payment failed",
            COLOR_DANGER,
            vec![
                field("User", user_id),
                field("Reference", reference),
                field("Reason", reason),
            ],
        ),
        DomainEvent::IntentExpired {
            user_id, reference, ..
        } => (
            "Payment expired",
            COLOR_WARNING,
            vec![field("User", user_id), field("Reference", reference)],
        ),
        DomainEvent::TopupReviewed {
            user_id,
            approver_id,
            approved,
            points,
            ..
        } => (
            if *approved {
                "Top-up approved"
            } else {
                "Top-up rejected"
            },
            if *approved { COLOR_SUCCESS } else { COLOR_DANGER },
            vec![
                field("User", user_id),
                field("Reviewer", approver_id),
                field("Points", points),
            ],
        ),
        DomainEvent::CreditLost {
            intent_id,
            user_id,
            points,
        } => (
            "Credit lost: account missing",
            COLOR_DANGER,
            vec![
                field("Intent", intent_id),
                field("User", user_id),
                field("Points", points),
            ],
        ),
        DomainEvent::CheckoutCompleted {
            user_id,
            license_count,
            total,
            new_balance,
        } => (
            "Purchase completed",
            COLOR_SUCCESS,
            vec![
                field("User", user_id),
                field("Scripts", license_count),
                field("Total", total),
                field("Balance", new_balance),
            ],
        ),
        DomainEvent::LicenseBound {
            license_id,
            server_address,
            ..
        } => (
            "License bound",
            COLOR_INFO,
            vec![field("License", license_id), field("Server", server_address)],
        ),
        DomainEvent::LicenseRejected {
            license_id,
            server_address,
            reason,
            ..
        } => (
            "License rejected",
            COLOR_DANGER,
            vec![
                field("License", license_id),
                field("Server", server_address),
                field("Reason", reason),
            ],
        ),
        DomainEvent::PointsAdjusted {
            user_id,
            actor_id,
            previous,
            current,
        } => (
            "Points adjusted",
            COLOR_WARNING,
            vec![
                field("User", user_id),
                field("Admin", actor_id),
                field("Before", previous),
                field("After", current),
            ],
        ),
    };

    DiscordMessage {
        embeds: vec![DiscordEmbed {
            title: title.to_string(),
            color,
            fields,
        }],
    }
}

/// Forward every event on the bus to a Discord webhook until the bus closes.
pub fn spawn_discord_notifier(bus: &EventBus, webhook_url: String) -> JoinHandle<()> {
    let mut receiver = bus.subscribe();
    let client = Client::new();

    tokio::spawn(async move {
        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Discord notifier lagged behind the event bus");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let message = discord_message(&event);
            match client.post(&webhook_url).json(&message).send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    tracing::warn!(status = %status, body = %body, "Discord webhook returned error");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to call Discord webhook");
                }
            }
        }
    })
}
