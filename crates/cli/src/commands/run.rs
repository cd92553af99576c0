use std::sync::Arc;

use swarmdesk_agent::llm::{GroqClient, LlmClient, OfflineLlm};
use swarmdesk_agent::pipeline::SupportPipeline;
use swarmdesk_core::config::{AppConfig, LoadOptions, LogFormat};
use swarmdesk_core::ticket::demo_tickets;

use crate::commands::CommandResult;

const BANNER: &str = "MULTI-AGENT SUPPORT PIPELINE";
const RULE_WIDTH: usize = 70;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("run", "config_validation", error.to_string(), 2)
        }
    };

    init_logging(&config);

    let llm: Arc<dyn LlmClient> = if config.pipeline.test_mode {
        tracing::info!(event_name = "run.llm.offline", "test mode enabled, using offline stub");
        Arc::new(OfflineLlm)
    } else {
        match GroqClient::new(&config.llm) {
            Ok(client) => Arc::new(client),
            Err(error) => {
                return CommandResult::failure("run", "llm_client", format!("{error:#}"), 3)
            }
        }
    };

    let pipeline = SupportPipeline::new(llm, config.pipeline.verbose);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "run",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                4,
            )
        }
    };

    let mut lines = vec![format!("{BANNER}\n{}", "=".repeat(RULE_WIDTH))];

    // Tickets are processed strictly one after another; each gets its own
    // freshly built task chain.
    for ticket in demo_tickets() {
        match runtime.block_on(pipeline.resolve(&ticket)) {
            Ok(resolution) => {
                lines.push(format!(
                    "\n{id} RESOLVED:\n{message}\n{rule}",
                    id = resolution.ticket_id,
                    message = resolution.message,
                    rule = "-".repeat(RULE_WIDTH),
                ));
            }
            Err(error) => {
                return CommandResult::failure(
                    "run",
                    "pipeline",
                    format!("ticket {} failed: {error:#}", ticket.id),
                    5,
                )
            }
        }
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // try_init so repeated invocations in-process (tests) are harmless.
    let result = match config.logging.format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .compact()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .pretty()
            .try_init(),
        LogFormat::Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().try_init()
        }
    };
    let _ = result;
}
