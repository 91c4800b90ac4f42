use ollama_chat_core::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ChatError> {
    ollama_chat_core::init_observability();
    let client = ChatClient::new(ChatConfig::from_env()?)?;
    let model = client
        .config()
        .model
        .clone()
        .unwrap_or_else(|| "llama3.2".to_string());

    let mut run = client.stream(client.request(model, "Stream a greeting."))?;
    while let Some(update) = run.next_update().await {
        match update {
            SessionUpdate::Render { delta, .. } => print!("{delta}"),
            SessionUpdate::Completed { .. } => println!(),
            SessionUpdate::Failed { message } => eprintln!("generation failed: {message}"),
            SessionUpdate::Cancelled { .. } => eprintln!("cancelled"),
        }
    }
    Ok(())
}
