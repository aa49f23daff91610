use anyhow::Result;
use circle_api::{CreateCircleReq, CreateUserReq, Message};
use clap::Parser;
use std::time::Duration;

use circlectl::{
    cli::{ChatCommand, Cli, CirclesCommand, Command},
    client::ListParams,
    require_session, session, ApiClient, SessionStore,
};

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_messages(messages: &[Message]) {
    for m in messages {
        let marker = if m.system { "*" } else { " " };
        println!("{}{:<12} {}", marker, m.sender_id, m.content);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let store = match cli.session_file.clone() {
        Some(path) => SessionStore::new(path),
        None => SessionStore::new(SessionStore::default_path()?),
    };
    let api = ApiClient::new(cli.server.as_str());

    match cli.command {
        Command::Signin { username, password } => {
            let resp = api.sign_in(&username, &password).await?;
            let ttl = Duration::from_millis(resp.expires_in.max(0) as u64);
            store
                .save(&resp.user.id, &resp.user.name, Some(resp.token), Some(ttl))
                .await?;
            println!("signed in as {} ({})", resp.user.name, resp.user.id);
        }
        Command::Signout => {
            store.clear().await?;
            println!("signed out");
        }
        Command::Whoami => match store.read().await? {
            Some(s) => match session::remaining(&s) {
                Some(left) => println!(
                    "{} ({}), session expires in {} min",
                    s.name,
                    s.user_id,
                    left.as_secs() / 60
                ),
                None => println!("{} ({})", s.name, s.user_id),
            },
            None => println!("not signed in"),
        },
        Command::Circles { command } => match command {
            CirclesCommand::List {
                offset,
                limit,
                circle_type,
                tag,
            } => {
                let page = api
                    .list_circles(&ListParams {
                        offset,
                        limit,
                        circle_type,
                        tag,
                    })
                    .await?;
                for c in &page.data {
                    println!(
                        "{:<38} {:<24} {:<10} {}",
                        c.id,
                        c.name,
                        c.circle_type,
                        c.tags.join(",")
                    );
                }
                println!(
                    "showing {} of {} (offset {})",
                    page.data.len(),
                    page.total,
                    page.offset
                );
            }
            CirclesCommand::Show { id } => print_json(&api.get_circle(&id).await?)?,
            CirclesCommand::Create {
                name,
                description,
                circle_type,
                tags,
                location,
                days,
            } => {
                let me = require_session(&store).await?;
                let circle = api
                    .create_circle(&CreateCircleReq {
                        name: Some(name),
                        description: Some(description),
                        circle_type: Some(circle_type),
                        owner_id: Some(me.user_id),
                        tags: Some(tags),
                        location,
                        active_days: Some(days),
                    })
                    .await?;
                print_json(&circle)?;
            }
            CirclesCommand::Delete { id } => {
                let resp = api.delete_circle(&id).await?;
                println!("{}", resp.message);
            }
        },
        Command::Join { circle } => {
            let me = require_session(&store).await?;
            let resp = api.join_circle(&circle, &me.user_id, &me.name).await?;
            println!("{} (chat {})", resp.message, resp.chat.id);
            print_messages(&resp.chat.messages);
        }
        Command::Chat { command } => match command {
            ChatCommand::Show { circle, user } => {
                let user = match user {
                    Some(u) => u,
                    None => require_session(&store).await?.user_id,
                };
                let history = api.chat_history(&circle, &user).await?;
                if history.chat.is_none() {
                    println!("no conversation yet");
                }
                print_messages(&history.messages);
            }
            ChatCommand::Send {
                circle,
                content,
                user,
            } => {
                let me = require_session(&store).await?;
                let user = user.unwrap_or_else(|| me.user_id.clone());
                let resp = api
                    .send_message(&circle, &user, &me.user_id, &content)
                    .await?;
                print_messages(std::slice::from_ref(&resp.new_message));
            }
        },
        Command::Register {
            name,
            password,
            attribute,
            age,
        } => {
            let user = api
                .register_user(&CreateUserReq {
                    name: Some(name),
                    attribute,
                    age,
                    password: Some(password),
                })
                .await?;
            println!("registered {} ({})", user.name, user.id);
        }
        Command::User { id } => print_json(&api.get_user(&id).await?)?,
    }
    Ok(())
}
