use console::style;

use crate::config::AppConfig;
use crate::error::Result;

pub async fn show() -> Result<()> {
    let config_path = AppConfig::config_path()?;
    let config = AppConfig::load()?;

    println!("{}", style("Current Configuration").bold().cyan());
    println!();
    println!("  SSH user:        {}", style(&config.ssh_user).white());
    println!("  SSH port:        {}", style(config.ssh_port).white());
    println!("  SSH key:         {}", style(&config.ssh_key_path).dim());
    println!("  Shell:           {}", style(&config.shell).white());
    println!("  kubectl:         {}", style(&config.kubectl).white());
    println!("  Connect timeout: {}", style(&config.connect_timeout).yellow());
    println!("  Command timeout: {}", style(&config.command_timeout).yellow());
    println!();

    if config.connections.is_empty() {
        println!("  {}", style("No named connections").dim());
    } else {
        println!("{}", style("Connections").bold().cyan());
        for (name, connection) in &config.connections {
            println!(
                "  {} {}",
                style(name).white().bold(),
                style(connection.label()).dim()
            );
        }
    }

    println!();
    if config_path.exists() {
        println!("Config file: {}", style(config_path.display()).dim());
    } else {
        println!(
            "Config file: {} {}",
            style(config_path.display()).dim(),
            style("(not created yet, showing defaults)").dim()
        );
    }

    Ok(())
}

pub async fn set(key: String, value: String) -> Result<()> {
    let mut config = AppConfig::load()?;
    config.set(&key, &value)?;
    config.save()?;

    println!(
        "{} Set {} = {}",
        style("✓").green().bold(),
        style(&key).cyan(),
        style(&value).white()
    );

    Ok(())
}

pub async fn path() -> Result<()> {
    println!("{}", AppConfig::config_path()?.display());
    Ok(())
}
