use std::sync::Arc;

use anyhow::Result;
use swarmdesk_core::ticket::{Resolution, Ticket};
use tracing::{debug, info};

use crate::crew::{AgentSpec, Crew, TaskSpec};
use crate::llm::LlmClient;
use crate::tools::{EscalateTicket, PolicyLookup, ToolRegistry};

/// The five fixed support agents, in pipeline order.
pub fn support_agents() -> Vec<AgentSpec> {
    vec![
        AgentSpec {
            role: "Triage",
            goal: "Classify urgency & category",
            backstory: "Ex-support lead",
            tools: &["policy_lookup"],
        },
        AgentSpec {
            role: "Research",
            goal: "Find exact policy",
            backstory: "Walking KB",
            tools: &["policy_lookup"],
        },
        AgentSpec {
            role: "Writer",
            goal: "Empathetic reply <120 words",
            backstory: "CX writer",
            tools: &[],
        },
        AgentSpec {
            role: "Guardian",
            goal: "Check tone & compliance",
            backstory: "Compliance pro",
            tools: &["policy_lookup"],
        },
        AgentSpec {
            role: "Closer",
            goal: "Finalize or escalate",
            backstory: "Process nerd",
            tools: &["escalate"],
        },
    ]
}

/// Ticket-level entry point: owns the crew, the tool registry, and the LLM
/// client, and resolves one ticket at a time. Each ticket gets a freshly
/// built task chain, so no state leaks between tickets.
pub struct SupportPipeline {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    crew: Crew,
    verbose: bool,
}

impl SupportPipeline {
    pub fn new(llm: Arc<dyn LlmClient>, verbose: bool) -> Self {
        let mut tools = ToolRegistry::default();
        tools.register(PolicyLookup);
        tools.register(EscalateTicket);

        Self { llm, tools, crew: Crew::new(support_agents()), verbose }
    }

    /// The dependent task chain for one ticket; task N carries the outputs
    /// of tasks 1..N-1 as context.
    pub fn ticket_tasks(ticket: &Ticket) -> Vec<TaskSpec> {
        vec![
            TaskSpec {
                description: format!("Classify: {}", ticket.body),
                expected_output: "Category + urgency",
                agent: 0,
                context: vec![],
            },
            TaskSpec {
                description: "Research policy".to_string(),
                expected_output: "Key facts",
                agent: 1,
                context: vec![0],
            },
            TaskSpec {
                description: "Draft reply".to_string(),
                expected_output: "Kind message",
                agent: 2,
                context: vec![0, 1],
            },
            TaskSpec {
                description: "Review tone/compliance".to_string(),
                expected_output: "Approved reply",
                agent: 3,
                context: vec![0, 1, 2],
            },
            TaskSpec {
                description: "Finalize/escalate".to_string(),
                expected_output: "Customer message",
                agent: 4,
                context: vec![0, 1, 2, 3],
            },
        ]
    }

    pub async fn resolve(&self, ticket: &Ticket) -> Result<Resolution> {
        info!(
            event_name = "pipeline.ticket.started",
            ticket_id = %ticket.id,
            "resolving ticket"
        );

        let tasks = Self::ticket_tasks(ticket);
        let outputs = self.crew.kickoff(self.llm.as_ref(), &self.tools, &tasks, &ticket.id.0).await?;

        if self.verbose {
            for (index, output) in outputs.iter().enumerate() {
                info!(
                    event_name = "pipeline.task.output",
                    ticket_id = %ticket.id,
                    task_index = index,
                    "{output}"
                );
            }
        } else {
            debug!(
                event_name = "pipeline.ticket.outputs",
                ticket_id = %ticket.id,
                task_count = outputs.len(),
                "intermediate outputs suppressed (enable pipeline.verbose)"
            );
        }

        let message = outputs.last().cloned().unwrap_or_default();
        info!(
            event_name = "pipeline.ticket.resolved",
            ticket_id = %ticket.id,
            "ticket resolved"
        );

        Ok(Resolution { ticket_id: ticket.id.clone(), message })
    }
}
