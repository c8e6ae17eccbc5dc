use super::project_root;
use crate::render::{format_event, summarize};
use clap::Args;
use color_eyre::eyre::eyre;
use colored::Colorize;
use pdca_core::approval::{ApprovalPolicy, ApprovalTicket, ChannelApprovalHandler};
use pdca_core::config::loader::load_config;
use pdca_core::config::models::AppConfig;
use pdca_core::engine::WorkflowOrchestrator;
use pdca_core::executor::{ExecutorRegistry, MockExecutor};
use pdca_protocol::ipc::Event;
use pdca_protocol::stage_models::PipelineDefinition;
use pdca_protocol::workflow_models::RunStatus;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct RunArgs {
    /// Name of the pipeline to run.
    pub pipeline: String,

    /// The request that starts the run.
    #[arg(short, long)]
    pub request: String,

    /// Project root containing `.pdca/` (defaults to the current directory).
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Approve every gated step without prompting.
    #[arg(long)]
    pub auto_approve: bool,

    /// Replace every executor with one that succeeds immediately.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the finished run as JSON instead of progress lines.
    #[arg(long)]
    pub json: bool,
}

/// Run the pipeline and report the outcome.
///
/// Returns whether the run completed.
pub async fn execute(args: RunArgs) -> color_eyre::Result<bool> {
    let root = project_root(args.root.clone())?;
    let config = load_config(&root).await?;

    let definition = config
        .find_pipeline(&args.pipeline)
        .cloned()
        .ok_or_else(|| {
            let available: Vec<&str> = config
                .pipelines
                .iter()
                .map(|pipeline| pipeline.name.as_str())
                .collect();
            eyre!(
                "pipeline '{}' not found (available: {})",
                args.pipeline,
                available.join(", ")
            )
        })?;

    let mut orchestrator = build_orchestrator(&config, &definition, &root, args.dry_run)?;
    let mut prompt = None;
    if args.auto_approve {
        orchestrator = orchestrator.with_approval_policy(ApprovalPolicy {
            auto_approve: true,
            fail_open: config.global.fail_open_approval,
        });
    } else {
        let (handler, tickets) = ChannelApprovalHandler::new(1);
        orchestrator = orchestrator.with_approval_handler(Arc::new(handler));
        prompt = Some(spawn_prompt(tickets));
    }

    let context = orchestrator.initialize(&definition, &args.request)?;

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling run");
                cancel.cancel();
            }
        })
    };

    let (events_tx, mut events_rx) = mpsc::channel::<Event>(1024);
    let quiet = args.json;
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if quiet {
                continue;
            }
            if let Some(line) = format_event(&event) {
                println!("{line}");
            }
        }
    });

    let context = orchestrator
        .run(&definition, context, &events_tx, &cancel, None)
        .await;

    drop(events_tx);
    let _ = printer.await;
    interrupt.abort();
    if let Some(prompt) = prompt {
        prompt.abort();
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&context)?);
    } else {
        print!("{}", summarize(&context));
    }

    Ok(context.status == RunStatus::Completed)
}

fn build_orchestrator(
    config: &AppConfig,
    definition: &PipelineDefinition,
    root: &Path,
    dry_run: bool,
) -> color_eyre::Result<WorkflowOrchestrator> {
    if !dry_run {
        return WorkflowOrchestrator::from_app_config(config, root).map_err(|e| eyre!("{e:#}"));
    }

    let mut registry = ExecutorRegistry::new();
    for name in definition.executor_names() {
        registry.register(name, Arc::new(MockExecutor::success()));
    }
    Ok(WorkflowOrchestrator::from_config(registry, &config.global))
}

/// Answer approval tickets from stdin. End of input declines.
fn spawn_prompt(mut tickets: mpsc::Receiver<ApprovalTicket>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(ticket) = tickets.recv().await {
            eprintln!("{}", ticket.request.message.bold());
            if let Ok(payload) = serde_json::to_string_pretty(&ticket.request.payload) {
                eprintln!("{payload}");
            }
            eprint!("Approve {}? [y/N] ", ticket.request.step_id);

            let approved = match lines.next_line().await {
                Ok(Some(line)) => is_affirmative(&line),
                _ => false,
            };
            let _ = ticket.reply.send(approved);
        }
    })
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
