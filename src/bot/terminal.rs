use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    commands::{self, Origin, TERMINAL_PREFIX},
    handlers::{dispatch, CommandContext, Outcome},
};

/// Qué hacer con una línea escrita en la terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalResponse {
    Ignore,
    Print(String),
    Exit,
}

/// Ejecuta una línea de la terminal; solo las que empiezan con `/` son comandos
pub async fn execute_line(ctx: &CommandContext, line: &str) -> TerminalResponse {
    let Some(parsed) = commands::parse(TERMINAL_PREFIX, line) else {
        return TerminalResponse::Ignore;
    };
    debug!("⌨️ Comando de terminal: {}", parsed.name);

    match dispatch(ctx, &parsed, &Origin::Terminal).await {
        Ok(Outcome::Reply(card)) => TerminalResponse::Print(card.to_plain_text()),
        Ok(Outcome::Silent) => TerminalResponse::Ignore,
        Ok(Outcome::Exit) => TerminalResponse::Exit,
        Err(e) => TerminalResponse::Print(e.to_card().to_plain_text()),
    }
}

/// Lee comandos de stdin hasta `/exit`, EOF o la cancelación de `shutdown`
pub async fn run(ctx: Arc<CommandContext>, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("⌨️ Terminal lista, escribe /help para ver los comandos");

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) => match execute_line(&ctx, &line).await {
                TerminalResponse::Ignore => {}
                TerminalResponse::Print(text) => println!("{}", text),
                TerminalResponse::Exit => {
                    info!("👋 Apagado pedido desde la terminal");
                    shutdown.cancel();
                    break;
                }
            },
            Ok(None) => {
                debug!("stdin cerrado, la terminal deja de leer");
                break;
            }
            Err(e) => {
                warn!("⚠️ Error leyendo stdin: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            testing::{FakeVoice, RecordingChat},
            SessionRegistry, SessionSettings,
        },
        sources::MockTrackResolver,
    };
    use pretty_assertions::assert_eq;

    fn context() -> CommandContext {
        let registry = SessionRegistry::new(
            Arc::new(FakeVoice::default()),
            Arc::new(RecordingChat::default()),
            SessionSettings::default(),
        );
        CommandContext::new(Arc::new(registry), Arc::new(MockTrackResolver::new()), "$")
    }

    #[tokio::test]
    async fn test_plain_lines_are_ignored() {
        let ctx = context();
        assert_eq!(execute_line(&ctx, "hola").await, TerminalResponse::Ignore);
        assert_eq!(execute_line(&ctx, "$ping").await, TerminalResponse::Ignore);
    }

    #[tokio::test]
    async fn test_exit_and_errors() {
        let ctx = context();
        assert_eq!(execute_line(&ctx, "/exit").await, TerminalResponse::Exit);
        assert_eq!(
            execute_line(&ctx, "/nada").await,
            TerminalResponse::Print("Ops!: Comando desconocido: nada".to_string())
        );
        assert_eq!(
            execute_line(&ctx, "/sessions").await,
            TerminalResponse::Print("No hay sesiones activas".to_string())
        );
    }
}
