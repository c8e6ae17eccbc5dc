//! Terminal rendering of progress events and finished runs.

use colored::Colorize;
use pdca_core::state::context::ProjectContext;
use pdca_protocol::ipc::Event;
use pdca_protocol::workflow_models::{RunStatus, StepStatus};

/// One line of progress output for `event`, or `None` for events that are
/// not shown.
pub fn format_event(event: &Event) -> Option<String> {
    let line = match event {
        Event::RunStarted {
            run_id,
            pipeline_name,
        } => format!("{} {pipeline_name} ({run_id})", "Starting".bold()),
        Event::RunStatusUpdate { .. } => return None,
        Event::StepStarted {
            stage, iteration, ..
        } => {
            if *iteration > 0 {
                format!("  {} {stage} (iteration {iteration})", "->".cyan())
            } else {
                format!("  {} {stage}", "->".cyan())
            }
        }
        Event::StepCompleted { stage, .. } => format!("  {} {stage}", "ok".green()),
        Event::StepFailed {
            stage,
            category,
            error,
            ..
        } => format!("  {} {stage} [{category}] {error}", "failed".red()),
        Event::RetryScheduled {
            stage,
            attempt,
            delay_ms,
            error,
            ..
        } => format!(
            "  {} {stage} attempt {attempt} failed, retrying in {delay_ms}ms: {error}",
            "retry".yellow()
        ),
        Event::ApprovalRequested { message, .. } => {
            format!("  {} {message}", "approval".yellow())
        }
        Event::ApprovalResolved {
            step_id, approved, ..
        } => {
            if *approved {
                format!("  {} {step_id}", "approved".green())
            } else {
                format!("  {} {step_id}", "declined".red())
            }
        }
        Event::IterationStarted {
            iteration,
            rework_stage,
            ..
        } => format!(
            "  {} iteration {iteration}, back to {rework_stage}",
            "rework".magenta()
        ),
        Event::RunLogChunk { content, .. } => format!("    {}", content.dimmed()),
        Event::RunCompleted { .. } => format!("{}", "Run completed".green().bold()),
        Event::RunFailed { stage, error, .. } => match stage {
            Some(stage) => format!("{} at {stage}: {error}", "Run failed".red().bold()),
            None => format!("{}: {error}", "Run failed".red().bold()),
        },
    };
    Some(line)
}

/// Human-readable summary of a finished run.
pub fn summarize(context: &ProjectContext) -> String {
    let status = match context.status {
        RunStatus::Completed => "COMPLETED".green().bold(),
        RunStatus::Failed => "FAILED".red().bold(),
        other => format!("{other:?}").yellow().bold(),
    };

    let mut out = format!(
        "\n{} {} ({} of {} iterations used)\n",
        "Status:".bold(),
        status,
        context.iteration_count,
        context.max_iterations
    );

    for step in &context.steps {
        let marker = match step.status {
            StepStatus::Completed => "done".green(),
            StepStatus::Failed => "fail".red(),
            StepStatus::InProgress => "busy".yellow(),
            StepStatus::Pending => "todo".dimmed(),
        };
        out.push_str(&format!(
            "  [{marker}] {} ({}, {} execution(s))\n",
            step.id, step.executor_name, step.executions
        ));
    }

    if !context.errors.is_empty() {
        out.push_str(&format!("{}\n", "Errors:".bold()));
        for entry in &context.errors {
            let category = entry
                .category
                .map(|category| format!(" [{category}]"))
                .unwrap_or_default();
            out.push_str(&format!("  {}{category}: {}\n", entry.stage, entry.message));
        }
    }

    out
}
