use crate::session::Session;
use crate::utils;
use colored::Colorize;
use tidepool_core::CreateDroplet;

pub struct CreateArgs {
    pub name: String,
    pub scope: String,
    pub region: String,
    pub image: String,
    pub size: String,
    pub ssh_key: Option<String>,
}

pub async fn handle(args: CreateArgs) -> anyhow::Result<()> {
    let mut session = Session::open_locked().await?;

    println!(
        "{}",
        format!("Creating droplet '{}'...", args.name).blue()
    );
    println!("Scope: {}", args.scope.cyan());

    let catalog = &session.config.catalog;
    let request = CreateDroplet {
        name: args.name,
        scope: args.scope,
        region: catalog.region(&args.region)?.clone(),
        image: catalog.image(&args.image)?.clone(),
        size: catalog.size(&args.size)?.clone(),
        ssh_key: args.ssh_key,
    };

    println!(
        "  {} / {} / {} ({} vCPU, {} RAM, {} disk)",
        request.region.name,
        request.image,
        request.size.slug,
        request.size.cores,
        utils::mib(request.size.ram),
        utils::mib(request.size.disk)
    );

    let intent = session.manager.create(request)?;
    let finalized = session.run(intent).await?;
    session.close().await?;

    utils::report("create", &finalized)
}
