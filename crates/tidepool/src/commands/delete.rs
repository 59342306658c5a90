use crate::session::Session;
use crate::utils;
use colored::Colorize;
use tidepool_core::{Command, Dispatch, Finalized};

pub async fn handle(droplet: String) -> anyhow::Result<()> {
    let mut session = Session::open_locked().await?;
    let target = session.manager.find(&droplet)?;

    println!(
        "{}",
        format!("Deleting droplet '{}'...", target.name).yellow()
    );

    let finalized = match session.manager.execute(target.id, Command::Delete)? {
        Dispatch::Scheduled(intent) => session.run(intent).await?,
        Dispatch::Finished(droplet) => {
            println!(
                "{}",
                "ℹ The droplet was never created on the provider, removing the record".dimmed()
            );
            Finalized::Removed(droplet)
        }
    };
    session.close().await?;

    utils::report("delete", &finalized)
}
