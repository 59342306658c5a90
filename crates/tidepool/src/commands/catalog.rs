use crate::utils;
use colored::Colorize;
use tidepool_config::Config;

pub fn handle() -> anyhow::Result<()> {
    let (path, config) = Config::discover()?;
    crate::session::print_config_source(&path);
    let catalog = &config.catalog;

    println!();
    println!("{}", "Regions".bold());
    for region in &catalog.regions {
        println!("  {:<10} {}", region.slug.cyan(), region.name);
    }

    println!();
    println!("{}", "Images".bold());
    for image in &catalog.images {
        let ssh = if image.is_ssh_key_mandatory() {
            " (SSH key required)".yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "  {:<24} {} {}{}",
            image.slug.cyan(),
            image.distribution,
            image.name,
            ssh
        );
    }

    println!();
    println!("{}", "Sizes".bold());
    for size in &catalog.sizes {
        println!(
            "  {:<18} {:>2} vCPU {:>8} RAM {:>8} disk",
            size.slug.cyan(),
            size.cores,
            utils::mib(size.ram),
            utils::mib(size.disk)
        );
    }

    Ok(())
}
