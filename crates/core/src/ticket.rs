use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a customer inquiry, rendered as `T001`, `T002`, ...
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub String);

impl TicketId {
    pub fn from_index(index: usize) -> Self {
        Self(format!("T{index:03}"))
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single customer inquiry to be resolved by the support pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    pub id: TicketId,
    pub body: String,
}

impl Ticket {
    pub fn new(id: TicketId, body: impl Into<String>) -> Self {
        Self { id, body: body.into() }
    }
}

/// Final customer-facing outcome for one ticket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub ticket_id: TicketId,
    pub message: String,
}

/// The fixed demo inquiries processed by `swarmdesk run`.
pub fn demo_tickets() -> Vec<Ticket> {
    [
        "Charged but never used the product – full refund?",
        "How do I cancel my subscription?",
        "App keeps crashing on iPhone 16 – urgent!",
        "What’s the price difference between Pro and Enterprise?",
        "Someone logged in from Russia – lock my account now!!",
    ]
    .into_iter()
    .enumerate()
    .map(|(index, body)| Ticket::new(TicketId::from_index(index + 1), body))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::{demo_tickets, TicketId};

    #[test]
    fn ticket_ids_are_zero_padded() {
        assert_eq!(TicketId::from_index(1).to_string(), "T001");
        assert_eq!(TicketId::from_index(42).to_string(), "T042");
        assert_eq!(TicketId::from_index(117).to_string(), "T117");
    }

    #[test]
    fn demo_fixture_has_five_sequential_tickets() {
        let tickets = demo_tickets();
        assert_eq!(tickets.len(), 5);
        assert_eq!(tickets[0].id, TicketId::from_index(1));
        assert_eq!(tickets[4].id, TicketId::from_index(5));
        assert_eq!(tickets[0].body, "Charged but never used the product – full refund?");
        assert_eq!(tickets[3].body, "What’s the price difference between Pro and Enterprise?");
        assert!(tickets[4].body.contains("lock my account"));
    }
}
