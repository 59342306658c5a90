use colored::{ColoredString, Colorize};
use tidepool_core::{Droplet, Finalized, LifecycleState, RuntimeState};

pub fn lifecycle_colored(state: LifecycleState) -> ColoredString {
    let label = state.to_string();
    match state {
        LifecycleState::Ok => label.green(),
        LifecycleState::Erred => label.red(),
        LifecycleState::Creating | LifecycleState::Updating | LifecycleState::Deleting => {
            label.yellow()
        }
    }
}

pub fn runtime_colored(state: RuntimeState) -> ColoredString {
    let label = state.to_string();
    match state {
        RuntimeState::Online => label.green(),
        RuntimeState::Offline => label.dimmed(),
        RuntimeState::Provisioning => label.yellow(),
        RuntimeState::Unknown => label.red(),
    }
}

/// MiB as a short human readable string
pub fn mib(value: u64) -> String {
    if value >= 1024 && value % 1024 == 0 {
        format!("{} GiB", value / 1024)
    } else {
        format!("{} MiB", value)
    }
}

/// Print the result of a finished command, failing when the provider did
pub fn report(action: &str, finalized: &Finalized) -> anyhow::Result<()> {
    match finalized {
        Finalized::Updated(droplet) => {
            if let Some(message) = &droplet.error_message {
                println!();
                println!(
                    "{}",
                    format!("✗ {} of '{}' failed", action, droplet.name)
                        .red()
                        .bold()
                );
                print_states(droplet);
                anyhow::bail!("{}", message);
            }
            println!();
            println!(
                "{}",
                format!("✓ {} of '{}' finished", action, droplet.name)
                    .green()
                    .bold()
            );
            print_states(droplet);
        }
        Finalized::Removed(droplet) => {
            println!();
            println!(
                "{}",
                format!("✓ '{}' has been deleted", droplet.name).green().bold()
            );
        }
        Finalized::Ignored => {
            println!("{}", "ℹ The provider result was no longer expected".dimmed());
        }
    }
    Ok(())
}

pub fn print_states(droplet: &Droplet) {
    println!(
        "  state: {}  runtime: {}",
        lifecycle_colored(droplet.lifecycle),
        runtime_colored(droplet.runtime)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mib() {
        assert_eq!(mib(2048), "2 GiB");
        assert_eq!(mib(512), "512 MiB");
        assert_eq!(mib(1536), "1536 MiB");
    }
}
