//! `docchat history`: Saved exchanges.

use docchat_agent::ChatHistory;
use docchat_config::AppConfig;

pub async fn run(clear: bool, show: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let path = config.history_path();
    let history = ChatHistory::open(&path);

    if clear {
        let count = history.len().await;
        history.clear().await?;
        println!("Cleared {count} exchange(s) from {}", path.display());
        return Ok(());
    }

    if let Some(id) = show {
        let record = history
            .get(&id)
            .await
            .ok_or_else(|| format!("No exchange with id {id}"))?;
        println!("{}", record.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
        println!();
        println!("You: {}", record.user);
        println!();
        println!("Assistant: {}", record.assistant);
        return Ok(());
    }

    let records = history.list().await;
    if records.is_empty() {
        println!("No saved exchanges in {}", path.display());
        if !config.history.enabled {
            println!("(history is disabled in config)");
        }
        return Ok(());
    }

    println!("📜 Chat History ({} exchanges)", records.len());
    println!();
    for record in records.iter().rev() {
        println!(
            "  {}  {}  {}",
            record.timestamp.format("%Y-%m-%d %H:%M"),
            record.id,
            record.title
        );
    }

    Ok(())
}
