use anyhow::Result;

use crate::completion::create_completion;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::migrate;

/// Run the `doctor` command: probe each dependency and print a status table.
///
/// Fails only if the completion provider is configured but unreachable or
/// the analysis log cannot be opened.
pub async fn run_doctor(config: &Config) -> Result<()> {
    let mut healthy = true;

    println!("{:<12} {:<28} HEALTHY", "COMPONENT", "STATUS");

    let log_status = match migrate::run_migrations(config).await {
        Ok(()) => ("OK".to_string(), true),
        Err(e) => (format!("ERROR ({})", e), false),
    };
    healthy &= log_status.1;
    println!("{:<12} {:<28} {}", "log", log_status.0, log_status.1);

    let store_status = match config.store.backend.as_str() {
        "memory" => ("OK (memory)".to_string(), true),
        _ if config.store.base_path.exists() => ("OK".to_string(), true),
        _ => ("EMPTY (no collections yet)".to_string(), true),
    };
    println!("{:<12} {:<28} {}", "store", store_status.0, store_status.1);

    let embed_status = match create_embedder(&config.embedding) {
        Ok(e) => (format!("OK ({}, {} dims)", e.model_name(), e.dims()), true),
        Err(e) => (format!("ERROR ({})", e), false),
    };
    healthy &= embed_status.1;
    println!("{:<12} {:<28} {}", "embedding", embed_status.0, embed_status.1);

    let completion_status = match create_completion(&config.completion) {
        Ok(p) if config.completion.provider == "disabled" => (format!("DISABLED ({})", p.name()), true),
        Ok(p) => match p.health_check().await {
            Ok(()) => (format!("OK ({})", config.completion.model), true),
            Err(e) => (format!("UNREACHABLE ({})", e), false),
        },
        Err(e) => (format!("ERROR ({})", e), false),
    };
    healthy &= completion_status.1;
    println!(
        "{:<12} {:<28} {}",
        "completion", completion_status.0, completion_status.1
    );

    println!("{:<12} {:<28} {}", "agents", config.agents.len(), true);

    if !healthy {
        anyhow::bail!("one or more components are unhealthy");
    }
    Ok(())
}
