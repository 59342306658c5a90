use crate::session::Session;
use colored::Colorize;

pub async fn handle() -> anyhow::Result<()> {
    let session = Session::open().await?;
    let provider = session.provider();

    println!(
        "{}",
        format!("Checking {} credentials...", provider.display_name()).blue()
    );

    let status = provider.check_auth().await?;

    if !status.authenticated {
        println!("{}", "✗ Not authenticated".red().bold());
        if let Some(error) = &status.error {
            println!("  {}", error);
        }
        anyhow::bail!("{} authentication failed", provider.name());
    }

    if let Some(account) = &status.account_info {
        println!("Account: {}", account.cyan());
    }

    if status.read_only {
        tracing::warn!(
            alert_type = "token_is_read_only",
            "{} token is read-only",
            provider.display_name()
        );
        println!(
            "{}",
            "⚠ The token is read-only, droplets cannot be changed".yellow()
        );
    } else {
        println!("{}", "✓ Authenticated with write access".green().bold());
    }

    Ok(())
}
