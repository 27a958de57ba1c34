mod server_api;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::server_api::ChatAction;

#[derive(Parser, Debug)]
#[command(name = "jukebox-cli")]
struct Args {
    /// Base URL of the jukebox server, e.g. http://127.0.0.1:8080
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Print the server greeting.
    Start,
    /// Queue a URL or search terms for a chat.
    Play {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
        #[arg(required = true, trailing_var_arg = true)]
        query: Vec<String>,
    },
    /// Skip the current item.
    Skip {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
    },
    /// Clear the queue and leave the session.
    Stop {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
    },
    Pause {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
    },
    Resume {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
    },
    /// List pending items.
    Queue {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
    },
    /// Show playback state.
    Status {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let server = args.server.as_str();
    let reply = match args.command {
        Command::Start => {
            println!("{}", server_api::greeting(server)?);
            return Ok(());
        }
        Command::Play { chat_id, query } => server_api::play(server, chat_id, &query.join(" "))?,
        Command::Skip { chat_id } => server_api::command(server, chat_id, ChatAction::Skip)?,
        Command::Stop { chat_id } => server_api::command(server, chat_id, ChatAction::Stop)?,
        Command::Pause { chat_id } => server_api::command(server, chat_id, ChatAction::Pause)?,
        Command::Resume { chat_id } => server_api::command(server, chat_id, ChatAction::Resume)?,
        Command::Queue { chat_id } => {
            println!("{}", server_api::queue(server, chat_id)?.message);
            return Ok(());
        }
        Command::Status { chat_id } => {
            let status = server_api::status(server, chat_id)?;
            println!(
                "state: {:?}\nnow playing: {}\nqueued: {}",
                status.state,
                status.now_playing.as_deref().unwrap_or("-"),
                status.queued
            );
            return Ok(());
        }
    };

    println!("{}", reply.message);
    if !reply.ok {
        std::process::exit(1);
    }
    Ok(())
}
