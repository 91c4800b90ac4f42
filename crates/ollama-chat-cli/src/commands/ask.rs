use anyhow::{Result, bail};
use ollama_chat_core::{ChatClient, SessionState};

use crate::output;

#[derive(Debug, clap::Args)]
pub struct AskArgs {
    /// Prompt to send
    #[arg(required = true, num_args = 1..)]
    pub prompt: Vec<String>,

    /// Print the response as HTML
    #[arg(long)]
    pub html: bool,
}

pub async fn ask(client: &ChatClient, args: AskArgs) -> Result<()> {
    let model = super::resolve_model(client).await?;
    let request = client.request(model, args.prompt.join(" "));

    let session = if client.config().stream && !args.html {
        output::stream_to_terminal(client.stream(request)?).await
    } else {
        let session = client.generate_once(request).await?;
        if args.html {
            println!("{}", session.display_html());
        } else {
            output::print_session(&session);
        }
        session
    };

    if session.state() == SessionState::Failed {
        bail!("{}", session.failure().unwrap_or("generation failed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ollama_chat_core::ChatConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn args(prompt: &str) -> AskArgs {
        AskArgs {
            prompt: vec![prompt.to_string()],
            html: false,
        }
    }

    async fn client_for(server: &MockServer) -> ChatClient {
        ChatClient::new(
            ChatConfig::default()
                .base_url(server.uri())
                .model("llama3.2"),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn failed_generation_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = ask(&client_for(&server).await, args("hi"))
            .await
            .expect_err("should fail");
        assert_eq!(err.to_string(), "backend unavailable (status 500): boom");
    }

    #[tokio::test]
    async fn completed_generation_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "{\"response\":\"hello\"}\n{\"response\":\"\",\"done\":true}\n",
                "application/x-ndjson",
            ))
            .mount(&server)
            .await;

        ask(&client_for(&server).await, args("hi"))
            .await
            .expect("ok");
    }
}
