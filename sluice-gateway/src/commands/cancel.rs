//! Cancel command handler
//!
//! The target argument is overloaded the way users type it: a number is a
//! job id, the literal ALL (with --model) is everything for one model, and
//! anything else is a batch id.

use anyhow::{Result, bail};
use colored::*;
use sluice_core::config::GatewayConfig;
use sluice_core::dto::job::CancelTarget;
use sqlx::SqlitePool;

use crate::service::supervisor::Supervisor;

fn parse_target(
    config: &GatewayConfig,
    target: &str,
    model: Option<&str>,
) -> Result<CancelTarget> {
    if target.eq_ignore_ascii_case("all") {
        let Some(alias) = model else {
            bail!("cancelling ALL requires --model <alias>");
        };
        return Ok(CancelTarget::Model(config.resolve(alias)?.to_string()));
    }

    if let Ok(id) = target.parse::<i64>() {
        return Ok(CancelTarget::Job(id));
    }

    Ok(CancelTarget::Batch(target.to_string()))
}

/// Cancel jobs by id, batch id, or model
pub async fn handle_cancel(
    config: &GatewayConfig,
    pool: &SqlitePool,
    target: &str,
    model: Option<&str>,
) -> Result<()> {
    let target = parse_target(config, target, model)?;
    let supervisor = Supervisor::new(pool, config);
    let count = supervisor.cancel(&target).await?;

    if count == 0 {
        println!("{}", "No matching active jobs.".yellow());
    } else {
        println!("{} {} job(s) cancelled", "▸".cyan(), count.to_string().bold());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_target_is_a_job_id() {
        let config = GatewayConfig::default();
        assert_eq!(
            parse_target(&config, "42", None).unwrap(),
            CancelTarget::Job(42)
        );
    }

    #[test]
    fn all_requires_model() {
        let config = GatewayConfig::default();
        assert!(parse_target(&config, "ALL", None).is_err());
        assert_eq!(
            parse_target(&config, "ALL", Some("fast")).unwrap(),
            CancelTarget::Model("gemini-2.5-flash".to_string())
        );
    }

    #[test]
    fn unknown_alias_is_rejected() {
        let config = GatewayConfig::default();
        assert!(parse_target(&config, "all", Some("bogus")).is_err());
    }

    #[test]
    fn anything_else_is_a_batch_id() {
        let config = GatewayConfig::default();
        assert_eq!(
            parse_target(&config, "a1b2c3d4", None).unwrap(),
            CancelTarget::Batch("a1b2c3d4".to_string())
        );
    }
}
