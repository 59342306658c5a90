use crate::session::Session;
use colored::Colorize;
use tidepool_core::QuotaUsage;

pub async fn handle(scope: Option<String>) -> anyhow::Result<()> {
    let session = Session::open().await?;
    let ledger = session.manager.ledger();

    let scopes = match scope {
        Some(scope) => vec![scope],
        None => ledger.scopes(),
    };

    if scopes.is_empty() {
        println!("{}", "No quota usage recorded yet".dimmed());
        return Ok(());
    }

    for scope in scopes {
        println!("{}", format!("Scope {}", scope).bold());
        println!(
            "{}",
            format!(
                "  {:<16} {:>12} {:>12} {:>12}",
                "COUNTER", "USAGE", "LIMIT", "AVAILABLE"
            )
            .dimmed()
        );

        for (name, usage) in ledger.snapshot(&scope) {
            println!(
                "  {:<16} {:>12} {:>12} {}",
                name,
                usage.usage,
                usage
                    .limit
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "unlimited".to_string()),
                available(&usage)
            );
        }
        println!();
    }

    Ok(())
}

fn available(usage: &QuotaUsage) -> colored::ColoredString {
    match usage.available() {
        Some(0) => format!("{:>12}", 0).red(),
        Some(left) => format!("{:>12}", left).green(),
        None => format!("{:>12}", "-").dimmed(),
    }
}
