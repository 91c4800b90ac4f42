use anyhow::Result;
use ollama_chat_core::{ChatClient, Connectivity, format_model_name};

pub async fn probe(client: &ChatClient) -> Result<()> {
    match client.probe().await {
        Connectivity::Connected {
            models,
            default_model,
        } => {
            println!("Connected to {}", client.config().base_url);
            println!("Models installed: {}", models.len());
            match default_model {
                Some(model) => println!("Default model: {} ({model})", format_model_name(&model)),
                None => println!("Default model: none"),
            }
        }
        Connectivity::Disconnected { reason } => {
            println!("Disconnected from {}", client.config().base_url);
            println!("Reason: {reason}");
        }
    }
    Ok(())
}

pub async fn models(client: &ChatClient) -> Result<()> {
    let models = client.list_models().await?;
    if models.is_empty() {
        println!("No models installed.");
    }
    for model in models {
        let size = model
            .size
            .map(|bytes| format!("{:.1} GB", bytes as f64 / 1e9))
            .unwrap_or_default();
        println!("{:<32} {:<24} {size}", model.name, format_model_name(&model.name));
    }
    Ok(())
}
