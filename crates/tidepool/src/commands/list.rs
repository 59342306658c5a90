use crate::session::{self, Session};
use crate::utils;
use colored::Colorize;

pub async fn handle(scope: Option<String>, json: bool) -> anyhow::Result<()> {
    let session = Session::open().await?;

    let droplets = match &scope {
        Some(scope) => session.manager.list_scope(scope),
        None => session.manager.list(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&droplets)?);
        return Ok(());
    }

    session::print_config_source(&session.config_path);
    println!();

    if droplets.is_empty() {
        println!("{}", "No droplets".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<20} {:<12} {:<10} {:<14} {:<16} {:<8} {:<10}",
            "NAME", "STATE", "RUNTIME", "SCOPE", "SIZE", "REGION", "BACKEND"
        )
        .bold()
    );
    println!("{}", "─".repeat(96).dimmed());

    for droplet in droplets {
        println!(
            "{:<20} {:<12} {:<10} {:<14} {:<16} {:<8} {:<10}",
            droplet.name.cyan(),
            utils::lifecycle_colored(droplet.lifecycle),
            utils::runtime_colored(droplet.runtime),
            droplet.scope,
            droplet.size,
            droplet.region,
            droplet.backend_id.as_deref().unwrap_or("-").dimmed()
        );
    }

    Ok(())
}
