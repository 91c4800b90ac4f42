use std::io::Write as _;

use ollama_chat_core::conversation::format_local;
use ollama_chat_core::session::CANCELLED_MARKER;
use ollama_chat_core::{
    ChatMessage, GenerationRun, GenerationSession, Role, SessionState, SessionUpdate, plain_text,
};

/// Streams a run to stdout until it ends. Ctrl-C cancels the generation.
///
/// Failures are left to the caller; see [`GenerationSession::failure`].
pub async fn stream_to_terminal(mut run: GenerationRun) -> GenerationSession {
    let mut stdout = std::io::stdout();
    let mut printed = false;
    loop {
        let update = tokio::select! {
            update = run.next_update() => update,
            _ = tokio::signal::ctrl_c() => run.cancel(),
        };
        let Some(update) = update else { break };
        match update {
            SessionUpdate::Render { delta, .. } => {
                printed = true;
                let _ = write!(stdout, "{delta}");
                let _ = stdout.flush();
            }
            SessionUpdate::Completed { .. } => {
                let _ = writeln!(stdout);
            }
            SessionUpdate::Cancelled { .. } => {
                let _ = writeln!(stdout, "\n[{CANCELLED_MARKER}]");
            }
            SessionUpdate::Failed { .. } => {
                if printed {
                    let _ = writeln!(stdout);
                }
            }
        }
    }
    run.finish().await
}

/// Prints the response of a completed non-streaming session.
pub fn print_session(session: &GenerationSession) {
    if session.state() == SessionState::Completed {
        println!("{}", plain_text(&session.rendered()).trim_end());
    }
}

/// Prints a stored message with its header.
pub fn print_message(message: &ChatMessage) {
    let who = match message.role {
        Role::User => "You",
        Role::Assistant => "AI",
    };
    println!("{who} ({}):", format_local(message.timestamp));
    match message.role {
        Role::User => println!("{}\n", message.content),
        Role::Assistant => println!(
            "{}\n",
            plain_text(&ollama_chat_core::render(&message.content)).trim_end()
        ),
    }
}
