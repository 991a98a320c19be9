//! Submit command handlers
//!
//! Single submission and batch submission. Aliases are resolved (and batch
//! assignment spread across the bucket) before any row is written; both
//! commands finish with a promotion sweep.

use std::io::Read;

use anyhow::{Context, Result, bail};
use colored::*;
use sluice_core::config::GatewayConfig;
use sluice_core::dto::job::SubmitJob;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::service::assign::BatchAssigner;
use crate::service::supervisor::Supervisor;

fn current_dir_string() -> String {
    std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

fn read_stdin_prompt() -> Result<String> {
    let mut prompt = String::new();
    std::io::stdin()
        .read_to_string(&mut prompt)
        .context("Failed to read prompt from stdin")?;
    let prompt = prompt.trim().to_string();
    if prompt.is_empty() {
        bail!("empty prompt: pass it as an argument or on stdin");
    }
    Ok(prompt)
}

/// Submit one prompt
pub async fn handle_submit(
    config: &GatewayConfig,
    pool: &SqlitePool,
    prompt: Option<String>,
    model: &str,
    label: &str,
    force: bool,
) -> Result<()> {
    let concrete = config.resolve(model)?.to_string();
    let prompt_text = match prompt {
        Some(p) => p,
        None => read_stdin_prompt()?,
    };

    let supervisor = Supervisor::new(pool, config);
    let submission = supervisor
        .submit(
            &SubmitJob {
                model: concrete.clone(),
                prompt_text,
                label: label.to_string(),
                cwd: current_dir_string(),
                batch_id: None,
            },
            force,
        )
        .await?;

    if submission.deduplicated {
        println!(
            "{} job {} already active for this prompt",
            "▸".yellow(),
            submission.job_id.to_string().bold()
        );
    } else {
        println!(
            "{} job {} queued on {}",
            "▸".cyan(),
            submission.job_id.to_string().bold(),
            concrete.dimmed()
        );
    }

    supervisor.sweep().await?;
    Ok(())
}

/// Submit a batch of prompts sharing one batch id
pub async fn handle_batch(
    config: &GatewayConfig,
    pool: &SqlitePool,
    mut prompts: Vec<String>,
    model: &str,
    label: &str,
    file: Option<std::path::PathBuf>,
) -> Result<()> {
    if let Some(path) = file {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read prompts from {}", path.display()))?;
        prompts.extend(
            raw.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from),
        );
    }

    if prompts.is_empty() {
        bail!("no prompts given: pass them as arguments or via --file");
    }

    // Spread the batch across the bucket before anything is stored
    let aliases = vec![model.to_string(); prompts.len()];
    let assigned = BatchAssigner::new(config).assign(&aliases)?;

    let batch_id = Uuid::new_v4().simple().to_string()[..8].to_string();
    let cwd = current_dir_string();
    let supervisor = Supervisor::new(pool, config);

    println!(
        "{} batch {} ({} jobs)",
        "▸".cyan(),
        batch_id.bold(),
        prompts.len()
    );

    for (prompt_text, concrete) in prompts.into_iter().zip(assigned) {
        let submission = supervisor
            .submit(
                &SubmitJob {
                    model: concrete.clone(),
                    prompt_text,
                    label: label.to_string(),
                    cwd: cwd.clone(),
                    batch_id: Some(batch_id.clone()),
                },
                // Batch entries are intentionally parallel work; never fold
                true,
            )
            .await?;
        println!(
            "    job {} -> {}",
            submission.job_id.to_string().bold(),
            concrete.dimmed()
        );
    }

    supervisor.sweep().await?;
    Ok(())
}
