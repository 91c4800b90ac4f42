use ollama_chat_core::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ChatError> {
    let client = ChatClient::new(ChatConfig::from_env()?)?;
    let model = match client.probe().await {
        ollama_chat_core::Connectivity::Connected {
            default_model: Some(model),
            ..
        } => model,
        other => {
            eprintln!("no model available: {other:?}");
            return Ok(());
        }
    };

    let session = client
        .generate_once(client.request(model, "Say hello in one sentence."))
        .await?;
    match session.state() {
        SessionState::Completed => {
            println!("{}", ollama_chat_core::plain_text(&session.rendered()))
        }
        _ => eprintln!("{}", session.transcript_text()),
    }
    Ok(())
}
