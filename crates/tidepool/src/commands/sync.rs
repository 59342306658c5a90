use crate::session::Session;
use crate::utils;
use colored::Colorize;

/// Read power states from the provider and apply them to idle droplets
pub async fn handle(droplet: Option<String>) -> anyhow::Result<()> {
    let session = Session::open_locked().await?;

    let targets = match &droplet {
        Some(key) => vec![session.manager.find(key)?],
        None => session.manager.list(),
    };

    println!(
        "{}",
        format!(
            "Syncing {} droplet(s) with {}...",
            targets.len(),
            session.provider().display_name()
        )
        .blue()
    );

    let mut changed = 0;
    for target in targets {
        let Some(backend_id) = target.backend_id.as_deref() else {
            println!("  {} {}", target.name.cyan(), "not provisioned".dimmed());
            continue;
        };

        match session.provider().droplet_status(backend_id).await {
            Ok(status) => {
                let droplet = session.manager.observe_runtime(target.id, status)?;
                if droplet.runtime != target.runtime {
                    changed += 1;
                }
                println!(
                    "  {} {} → {}",
                    droplet.name.cyan(),
                    utils::runtime_colored(target.runtime),
                    utils::runtime_colored(droplet.runtime)
                );
            }
            Err(e) => {
                tracing::warn!(droplet = %target.name, "Could not read droplet status: {}", e);
                println!("  {} {}", target.name.cyan(), e.to_string().red());
            }
        }
    }

    session.close().await?;

    println!();
    println!(
        "{}",
        format!("✓ {} droplet(s) changed", changed).green().bold()
    );
    Ok(())
}
