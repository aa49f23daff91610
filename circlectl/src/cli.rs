use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command line client for the circles service.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Base URL of the circles server.
    #[arg(long, env = "CIRCLES_SERVER", default_value = "http://127.0.0.1:8787")]
    pub server: String,
    /// Where the signed-in session is kept.
    #[arg(long, env = "CIRCLECTL_SESSION")]
    pub session_file: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and remember the session.
    Signin {
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the current session.
    Signout,
    /// Show who is signed in.
    Whoami,
    /// Browse and manage circles.
    Circles {
        #[command(subcommand)]
        command: CirclesCommand,
    },
    /// Ask to join a circle as the signed-in user.
    Join { circle: String },
    /// Conversations between a circle and a prospective member.
    Chat {
        #[command(subcommand)]
        command: ChatCommand,
    },
    /// Create an account.
    Register {
        name: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        attribute: Option<String>,
        #[arg(long)]
        age: Option<i64>,
    },
    /// Show a user profile.
    User { id: String },
}

#[derive(Subcommand, Debug)]
pub enum CirclesCommand {
    List {
        #[arg(long)]
        offset: Option<u64>,
        #[arg(long)]
        limit: Option<u64>,
        /// university or amateur
        #[arg(long = "type")]
        circle_type: Option<String>,
        #[arg(long)]
        tag: Option<String>,
    },
    Show { id: String },
    /// Create a circle owned by the signed-in user.
    Create {
        name: String,
        #[arg(long)]
        description: String,
        #[arg(long = "type")]
        circle_type: String,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long, value_delimiter = ',')]
        days: Vec<String>,
    },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum ChatCommand {
    /// Print a conversation. Defaults to your own.
    Show {
        circle: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Post into a conversation as the signed-in user.
    Send {
        circle: String,
        content: String,
        #[arg(long)]
        user: Option<String>,
    },
}
