use super::project_root;
use colored::Colorize;
use pdca_core::config::loader::{load_config, CONFIG_DIR};
use pdca_core::config::models::AppConfig;
use std::path::PathBuf;

pub async fn execute(root: Option<PathBuf>) -> color_eyre::Result<()> {
    let root = project_root(root)?;
    let config = load_config(&root).await?;

    if config.pipelines.is_empty() {
        println!(
            "No pipelines found in {}",
            root.join(CONFIG_DIR).join("pipelines").display()
        );
        return Ok(());
    }

    print!("{}", describe(&config));
    Ok(())
}

fn describe(config: &AppConfig) -> String {
    let mut out = String::new();

    out.push_str(&format!("{}\n", "Pipelines".bold()));
    for pipeline in &config.pipelines {
        let budget = pipeline
            .max_iterations
            .unwrap_or(config.global.max_iterations);
        out.push_str(&format!(
            "  {} (rework: {}, max iterations: {budget})\n",
            pipeline.name.cyan(),
            pipeline.rework_stage
        ));
        for spec in &pipeline.stages {
            let gate = if spec.requires_approval { " [approval]" } else { "" };
            out.push_str(&format!(
                "    {} -> {}{gate}\n",
                spec.stage, spec.executor_name
            ));
        }
    }

    if !config.executors.is_empty() {
        out.push_str(&format!("{}\n", "Executors".bold()));
        for executor in &config.executors {
            out.push_str(&format!(
                "  {}: {} {}\n",
                executor.name.cyan(),
                executor.command,
                executor.args.join(" ")
            ));
        }
    }

    out
}
