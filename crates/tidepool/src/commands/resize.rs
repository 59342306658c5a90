use crate::session::Session;
use crate::utils;
use colored::Colorize;
use tidepool_core::{Command, Dispatch, Finalized};

pub async fn handle(droplet: String, size: String, permanent: bool) -> anyhow::Result<()> {
    let mut session = Session::open_locked().await?;
    let target = session.manager.find(&droplet)?;
    let size = session.config.catalog.size(&size)?.clone();

    println!(
        "{}",
        format!(
            "Resizing droplet '{}' from {} to {}...",
            target.name, target.size, size.slug
        )
        .yellow()
    );
    if permanent {
        println!(
            "{}",
            "⚠ The disk is resized as well, this cannot be undone".yellow()
        );
    }

    let finalized = match session
        .manager
        .execute(target.id, Command::Resize { size, permanent })?
    {
        Dispatch::Scheduled(intent) => session.run(intent).await?,
        Dispatch::Finished(droplet) => Finalized::Updated(droplet),
    };
    session.close().await?;

    utils::report("resize", &finalized)
}
