//! `risk` commands: inspect and tune the domain risk ledger.

use console::style;

use crate::config::Config;
use crate::models::DomainRisk;
use crate::risk::DomainRiskLedger;

use super::open_store;

async fn ledger(config: &Config) -> anyhow::Result<DomainRiskLedger> {
    let store = open_store(config).await?;
    Ok(DomainRiskLedger::new(store, config.risk.clone()))
}

fn print_risk(risk: &DomainRisk) {
    println!("\n{}", style(format!("Domain Risk: {}", risk.hostname)).bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Friction count:", risk.friction_count);
    println!("{:<20} {}ms", "Recommended delay:", risk.recommended_delay_ms);
    println!(
        "{:<20} {}",
        "Last friction:",
        risk.last_friction_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "{:<20} {}",
        "Updated:",
        risk.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

pub async fn cmd_risk_show(config: &Config, hostname: &str) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    match store.get_domain_risk(&hostname.to_ascii_lowercase()).await? {
        Some(risk) => print_risk(&risk),
        None => println!(
            "{} No risk recorded for {} (default delay {}ms)",
            style("!").yellow(),
            hostname,
            config.risk.min_delay_ms
        ),
    }
    Ok(())
}

pub async fn cmd_risk_list(config: &Config, limit: usize) -> anyhow::Result<()> {
    let risks = ledger(config).await?.list(limit).await?;
    if risks.is_empty() {
        println!("{} No domain risk records", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:<40} {:>9} {:>10} {:>6}  {}",
        "Hostname", "Friction", "Delay(ms)", "Last", "Updated"
    );
    println!("{}", "-".repeat(90));
    for risk in risks {
        println!(
            "{:<40} {:>9} {:>10} {:>6}  {}",
            risk.hostname,
            risk.friction_count,
            risk.recommended_delay_ms,
            risk.last_friction_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            risk.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

pub async fn cmd_risk_set_delay(
    config: &Config,
    hostname: &str,
    delay_ms: u64,
) -> anyhow::Result<()> {
    let risk = ledger(config)
        .await?
        .set_recommended_delay(hostname, delay_ms)
        .await?;
    println!(
        "{} Recommended delay for {} is now {}ms",
        style("✓").green(),
        hostname,
        risk.recommended_delay_ms
    );
    Ok(())
}
