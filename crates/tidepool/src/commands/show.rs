use crate::session::Session;
use crate::utils;
use colored::Colorize;

pub async fn handle(droplet: String) -> anyhow::Result<()> {
    let session = Session::open().await?;
    let droplet = session.manager.find(&droplet)?;

    println!("{}", droplet.name.cyan().bold());
    println!("  id:       {}", droplet.id);
    println!(
        "  backend:  {}",
        droplet.backend_id.as_deref().unwrap_or("-")
    );
    println!("  scope:    {}", droplet.scope);
    println!("  region:   {}", droplet.region);
    println!("  image:    {}", droplet.image);
    println!(
        "  size:     {} ({} vCPU, {} RAM, {} disk)",
        droplet.size,
        droplet.cores,
        utils::mib(droplet.ram),
        utils::mib(droplet.disk)
    );
    println!(
        "  state:    {} / {}",
        utils::lifecycle_colored(droplet.lifecycle),
        utils::runtime_colored(droplet.runtime)
    );

    if let Some(pending) = &droplet.pending {
        println!(
            "  pending:  {} since {} ({})",
            pending.kind.to_string().yellow(),
            pending.started_at.format("%Y-%m-%d %H:%M:%S"),
            pending.token
        );
    }
    if let Some(message) = &droplet.error_message {
        println!("  error:    {}", message.red());
    }

    println!(
        "  created:  {}",
        droplet.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  updated:  {}",
        droplet.updated_at.format("%Y-%m-%d %H:%M:%S")
    );

    Ok(())
}
