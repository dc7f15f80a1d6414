//! Command table, parsing and precondition checks.
//!
//! Commands are declared as data: a name, aliases, help text and a set of
//! flags. [`check`] enforces the flags before any handler runs, so handlers
//! never see a terminal origin where they need a guild.

use serenity::model::id::{ChannelId, GuildId};

use crate::{audio::request::Requester, error::CommandError, ui::Card};

/// Prefijo de los comandos escritos en la terminal
pub const TERMINAL_PREFIX: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Play,
    Skip,
    Stop,
    Pause,
    Resume,
    Queue,
    Clear,
    Join,
    Leave,
    Volume,
    Ping,
    Help,
    Sessions,
    Exit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandFlags {
    /// Necesita un servidor
    pub guild_only: bool,
    /// Necesita un mensaje de Discord (autor, canal de texto, canal de voz)
    pub discord_only: bool,
    /// Solo para el operador en la terminal
    pub terminal_only: bool,
    /// Necesita al menos un argumento
    pub requires_args: bool,
}

#[derive(Debug)]
pub struct CommandSpec {
    pub kind: CommandKind,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub description: &'static str,
    pub usage: &'static str,
    pub flags: CommandFlags,
}

const GUILD: CommandFlags = CommandFlags {
    guild_only: true,
    discord_only: false,
    terminal_only: false,
    requires_args: false,
};

const VOICE: CommandFlags = CommandFlags {
    guild_only: true,
    discord_only: true,
    terminal_only: false,
    requires_args: false,
};

const ANYWHERE: CommandFlags = CommandFlags {
    guild_only: false,
    discord_only: false,
    terminal_only: false,
    requires_args: false,
};

const TERMINAL: CommandFlags = CommandFlags {
    guild_only: false,
    discord_only: false,
    terminal_only: true,
    requires_args: false,
};

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        kind: CommandKind::Play,
        name: "play",
        aliases: &["p"],
        description: "Reproduce una canción o la agrega a la cola",
        usage: "play <canción | URL | local:archivo>",
        flags: CommandFlags {
            requires_args: true,
            ..VOICE
        },
    },
    CommandSpec {
        kind: CommandKind::Skip,
        name: "skip",
        aliases: &["s", "next"],
        description: "Salta a la siguiente canción",
        usage: "skip",
        flags: GUILD,
    },
    CommandSpec {
        kind: CommandKind::Stop,
        name: "stop",
        aliases: &["bye"],
        description: "Detiene la música y sale del canal de voz",
        usage: "stop",
        flags: GUILD,
    },
    CommandSpec {
        kind: CommandKind::Pause,
        name: "pause",
        aliases: &[],
        description: "Pausa la canción actual",
        usage: "pause",
        flags: GUILD,
    },
    CommandSpec {
        kind: CommandKind::Resume,
        name: "resume",
        aliases: &["unpause"],
        description: "Reanuda la canción pausada",
        usage: "resume",
        flags: GUILD,
    },
    CommandSpec {
        kind: CommandKind::Queue,
        name: "queue",
        aliases: &["q"],
        description: "Muestra la cola de reproducción",
        usage: "queue [página]",
        flags: GUILD,
    },
    CommandSpec {
        kind: CommandKind::Clear,
        name: "clear",
        aliases: &[],
        description: "Vacía la cola y corta la canción actual",
        usage: "clear",
        flags: GUILD,
    },
    CommandSpec {
        kind: CommandKind::Join,
        name: "join",
        aliases: &["summon"],
        description: "Entra a tu canal de voz",
        usage: "join",
        flags: VOICE,
    },
    CommandSpec {
        kind: CommandKind::Leave,
        name: "leave",
        aliases: &["disconnect"],
        description: "Sale del canal de voz sin borrar la cola",
        usage: "leave",
        flags: GUILD,
    },
    CommandSpec {
        kind: CommandKind::Volume,
        name: "volume",
        aliases: &["vol"],
        description: "Muestra o cambia el volumen (0 a 1)",
        usage: "volume [0.0-1.0]",
        flags: GUILD,
    },
    CommandSpec {
        kind: CommandKind::Ping,
        name: "ping",
        aliases: &["foo"],
        description: "Comprueba que el bot responde",
        usage: "ping",
        flags: ANYWHERE,
    },
    CommandSpec {
        kind: CommandKind::Help,
        name: "help",
        aliases: &["commands"],
        description: "Lista los comandos o explica uno",
        usage: "help [comando]",
        flags: ANYWHERE,
    },
    CommandSpec {
        kind: CommandKind::Sessions,
        name: "sessions",
        aliases: &[],
        description: "Lista las sesiones activas",
        usage: "sessions",
        flags: TERMINAL,
    },
    CommandSpec {
        kind: CommandKind::Exit,
        name: "exit",
        aliases: &["quit"],
        description: "Desconecta todo y apaga el bot",
        usage: "exit",
        flags: TERMINAL,
    },
];

/// Busca un comando por nombre o alias
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    let name = name.to_lowercase();
    COMMANDS
        .iter()
        .find(|spec| spec.name == name || spec.aliases.iter().any(|alias| *alias == name))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
}

/// Separa nombre y argumentos; `None` si el texto no es un comando
pub fn parse(prefix: &str, content: &str) -> Option<ParsedCommand> {
    let rest = content.trim().strip_prefix(prefix)?;
    let mut words = rest.split_whitespace();
    let name = words.next()?.to_lowercase();
    Some(ParsedCommand {
        name,
        args: words.map(str::to_string).collect(),
    })
}

/// Mensaje de Discord que originó un comando
#[derive(Debug, Clone, PartialEq)]
pub struct DiscordOrigin {
    pub guild_id: Option<GuildId>,
    pub text_channel: ChannelId,
    pub author: Requester,
    pub voice_channel: Option<ChannelId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Origin {
    Discord(DiscordOrigin),
    Terminal,
}

impl Origin {
    pub fn guild_id(&self) -> Option<GuildId> {
        match self {
            Self::Discord(origin) => origin.guild_id,
            Self::Terminal => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal)
    }
}

/// Verifica los requisitos declarados del comando
pub fn check(spec: &CommandSpec, origin: &Origin, args: &[String]) -> Result<(), CommandError> {
    if spec.flags.terminal_only && !origin.is_terminal() {
        return Err(CommandError::TerminalOnly(spec.name));
    }
    if spec.flags.discord_only && origin.is_terminal() {
        return Err(CommandError::DiscordOnly(spec.name));
    }
    if spec.flags.guild_only && origin.guild_id().is_none() {
        return Err(CommandError::GuildOnly(spec.name));
    }
    if spec.flags.requires_args && args.is_empty() {
        return Err(CommandError::ArgsRequired(spec.usage));
    }
    Ok(())
}

/// Comandos que tienen sentido desde el origen dado
fn visible_from(origin: &Origin) -> impl Iterator<Item = &'static CommandSpec> + '_ {
    COMMANDS.iter().filter(move |spec| {
        if origin.is_terminal() {
            !spec.flags.discord_only && !spec.flags.guild_only
        } else {
            !spec.flags.terminal_only
        }
    })
}

/// Tarjeta de ayuda general o de un comando
pub fn help_card(prefix: &str, origin: &Origin, topic: Option<&str>) -> Result<Card, CommandError> {
    if let Some(topic) = topic {
        let spec = find(topic.trim_start_matches(prefix))
            .ok_or_else(|| CommandError::Unknown(topic.to_string()))?;
        let mut fields = vec![("Uso".to_string(), format!("`{}{}`", prefix, spec.usage))];
        if !spec.aliases.is_empty() {
            let aliases: Vec<String> = spec
                .aliases
                .iter()
                .map(|alias| format!("`{}{}`", prefix, alias))
                .collect();
            fields.push(("Alias".to_string(), aliases.join(", ")));
        }
        return Ok(Card::Help {
            title: format!("❓ {}{}", prefix, spec.name),
            description: spec.description.to_string(),
            fields,
        });
    }

    Ok(Card::Help {
        title: "🎵 Comandos".to_string(),
        description: format!("Usa `{}help <comando>` para ver los detalles", prefix),
        fields: visible_from(origin)
            .map(|spec| (format!("{}{}", prefix, spec.usage), spec.description.to_string()))
            .collect(),
    })
}
