use crate::session::Session;
use crate::utils;
use colored::Colorize;
use tidepool_core::{Command, Dispatch};

/// Start, stop or restart a droplet
pub async fn handle(droplet: String, command: Command) -> anyhow::Result<()> {
    let mut session = Session::open_locked().await?;
    let target = session.manager.find(&droplet)?;
    let kind = command.kind();

    println!(
        "{}",
        format!("Running {} on droplet '{}'...", kind, target.name).yellow()
    );

    let finalized = match session.manager.execute(target.id, command)? {
        Dispatch::Scheduled(intent) => session.run(intent).await?,
        Dispatch::Finished(droplet) => tidepool_core::Finalized::Updated(droplet),
    };
    session.close().await?;

    utils::report(&kind.to_string(), &finalized)
}
