use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn execute(&self, input: Value) -> Result<Value>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|tool| tool.as_ref())
    }

    /// Prompt-ready listing of the named tools, one `- name: description`
    /// line per tool. Unknown names are skipped.
    pub fn describe(&self, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .filter_map(|name| self.get(name))
            .map(|tool| format!("- {}: {}", tool.name(), tool.description()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Static company policy table. The literals are the product of record;
/// anything outside the table routes to a human.
pub struct PolicyLookup;

const POLICY_FALLBACK: &str = "Escalate to human";

fn policy_answer(topic: &str) -> &'static str {
    match topic.trim().to_ascii_lowercase().as_str() {
        "refund" => "Full refund within 7 days",
        "cancel" => "Cancel anytime",
        "pricing" => "Basic $19 → Pro $49 → Enterprise custom",
        _ => POLICY_FALLBACK,
    }
}

#[async_trait]
impl Tool for PolicyLookup {
    fn name(&self) -> &'static str {
        "policy_lookup"
    }

    fn description(&self) -> &'static str {
        "Company policies and pricing"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let Some(topic) = input.get("topic").and_then(Value::as_str) else {
            bail!("policy_lookup expects an input object with a `topic` string");
        };
        Ok(Value::String(policy_answer(topic).to_string()))
    }
}

/// Hands a ticket off to human support.
pub struct EscalateTicket;

#[async_trait]
impl Tool for EscalateTicket {
    fn name(&self) -> &'static str {
        "escalate"
    }

    fn description(&self) -> &'static str {
        "Escalates urgent tickets"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let Some(ticket_id) = input.get("ticket_id").and_then(Value::as_str) else {
            bail!("escalate expects an input object with a `ticket_id` string");
        };
        Ok(Value::String(format!("ESCALATED {ticket_id} to human support")))
    }
}
