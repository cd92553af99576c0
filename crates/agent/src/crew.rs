use anyhow::{bail, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::llm::{ChatMessage, ChatRequest, LlmClient};
use crate::tools::ToolRegistry;

/// Upper bound on tool round-trips within a single task turn.
const MAX_TOOL_ROUNDS: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentSpec {
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
    pub tools: &'static [&'static str],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskSpec {
    pub description: String,
    pub expected_output: &'static str,
    /// Index into the crew's agent list.
    pub agent: usize,
    /// Indexes of earlier tasks whose outputs feed this one.
    pub context: Vec<usize>,
}

/// Sequential task runner. Tasks execute strictly in order; each task sees
/// the outputs of the tasks its `context` references.
pub struct Crew {
    agents: Vec<AgentSpec>,
}

#[derive(Debug, Deserialize)]
struct ToolDirective {
    tool: String,
    #[serde(default)]
    input: Value,
}

impl Crew {
    pub fn new(agents: Vec<AgentSpec>) -> Self {
        Self { agents }
    }

    /// Runs every task in order and returns all task outputs; the last
    /// element is the crew's final result.
    pub async fn kickoff(
        &self,
        llm: &dyn LlmClient,
        tools: &ToolRegistry,
        tasks: &[TaskSpec],
        correlation_id: &str,
    ) -> Result<Vec<String>> {
        self.validate_tasks(tasks)?;

        let mut outputs: Vec<String> = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            let agent = &self.agents[task.agent];
            debug!(
                event_name = "crew.task.started",
                correlation_id = correlation_id,
                task_index = index,
                role = agent.role,
                "task started"
            );

            let output = self.run_task(llm, tools, tasks, task, &outputs, correlation_id).await?;

            info!(
                event_name = "crew.task.completed",
                correlation_id = correlation_id,
                task_index = index,
                role = agent.role,
                output_chars = output.len(),
                "task completed"
            );
            outputs.push(output);
        }

        Ok(outputs)
    }

    fn validate_tasks(&self, tasks: &[TaskSpec]) -> Result<()> {
        if tasks.is_empty() {
            bail!("crew kickoff requires at least one task");
        }
        for (index, task) in tasks.iter().enumerate() {
            if task.agent >= self.agents.len() {
                bail!("task {index} references unknown agent index {}", task.agent);
            }
            if let Some(bad) = task.context.iter().find(|ctx| **ctx >= index) {
                bail!("task {index} references context task {bad} that has not run yet");
            }
        }
        Ok(())
    }

    async fn run_task(
        &self,
        llm: &dyn LlmClient,
        tools: &ToolRegistry,
        tasks: &[TaskSpec],
        task: &TaskSpec,
        prior_outputs: &[String],
        correlation_id: &str,
    ) -> Result<String> {
        let agent = &self.agents[task.agent];
        let mut messages = vec![
            ChatMessage::system(system_prompt(agent, tools)),
            ChatMessage::user(task_prompt(task, tasks, &self.agents, prior_outputs)),
        ];

        for round in 0..MAX_TOOL_ROUNDS {
            let reply = llm.complete(ChatRequest { messages: messages.clone() }).await?;

            let Some(directive) = parse_tool_directive(&reply) else {
                return Ok(reply);
            };

            if !agent.tools.contains(&directive.tool.as_str()) {
                // The model asked for something this agent does not carry;
                // tell it and let it answer directly.
                messages.push(ChatMessage::assistant(reply));
                messages.push(ChatMessage::user(format!(
                    "Tool `{}` is not available to you. Answer with plain text.",
                    directive.tool
                )));
                continue;
            }

            let Some(tool) = tools.get(&directive.tool) else {
                messages.push(ChatMessage::assistant(reply));
                messages.push(ChatMessage::user(format!(
                    "Tool `{}` is not registered. Answer with plain text.",
                    directive.tool
                )));
                continue;
            };

            let result = tool.execute(directive.input).await?;
            let result_text = value_to_text(&result);
            info!(
                event_name = "crew.tool.executed",
                correlation_id = correlation_id,
                role = agent.role,
                tool = %directive.tool,
                round = round + 1,
                "tool executed"
            );

            // Round budget exhausted: the tool result stands as the output.
            if round + 1 == MAX_TOOL_ROUNDS {
                return Ok(result_text);
            }

            messages.push(ChatMessage::assistant(reply));
            messages.push(ChatMessage::user(format!(
                "Tool `{}` returned:\n{result_text}\n\nUse this to produce your final answer.",
                directive.tool
            )));
        }

        bail!("agent `{}` exceeded the tool round budget without a final answer", agent.role)
    }
}

fn system_prompt(agent: &AgentSpec, tools: &ToolRegistry) -> String {
    let mut prompt = format!(
        "You are {role}. Backstory: {backstory}. Your goal: {goal}.",
        role = agent.role,
        backstory = agent.backstory,
        goal = agent.goal,
    );

    let described = tools.describe(agent.tools);
    if !described.is_empty() {
        prompt.push_str(
            "\n\nYou may call at most one tool per turn by replying with only this JSON: \
             {\"tool\": \"<name>\", \"input\": {...}}. Available tools:\n",
        );
        prompt.push_str(&described.join("\n"));
        prompt.push_str("\n\nWhen you have your final answer, reply with plain text.");
    }

    prompt
}

fn task_prompt(
    task: &TaskSpec,
    tasks: &[TaskSpec],
    agents: &[AgentSpec],
    prior_outputs: &[String],
) -> String {
    let mut prompt = format!(
        "{description}\n\nExpected output: {expected}",
        description = task.description,
        expected = task.expected_output,
    );

    for ctx in &task.context {
        prompt.push_str(&format!(
            "\n\nOutput of task {number} ({role}):\n{output}",
            number = ctx + 1,
            role = agents[tasks[*ctx].agent].role,
            output = prior_outputs[*ctx],
        ));
    }

    prompt
}

fn parse_tool_directive(reply: &str) -> Option<ToolDirective> {
    let trimmed = reply.trim().trim_start_matches("```json").trim_matches('`').trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    serde_json::from_str::<ToolDirective>(trimmed).ok()
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
