pub mod config;
pub mod ticket;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LlmConfig, LoadOptions, LogFormat};
pub use ticket::{demo_tickets, Resolution, Ticket, TicketId};
