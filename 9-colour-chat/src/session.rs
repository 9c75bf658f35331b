//! Per-connection protocol state machine.
//!
//! A connection starts unauthenticated, moves to chatting after a successful
//! `login` or `register`, and returns to the welcome prompt after `/logout`.
//! The session is the only reader of the connection and the only producer of
//! join and leave events for its hub membership.
//!
//! Outgoing lines go through a bounded queue drained by a [`writer`] task.
//! Once the session has joined the hub, the hub's member entry owns the only
//! strong sender of that queue and the session keeps a weak one, so leaving
//! or being evicted closes the queue and ends the writer.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc::{self, error::SendError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    command::{self, AuthCommand, ChatCommand},
    error::HubClosed,
    hub::{Client, ClientId, HubHandle},
    palette::Colour,
    registry::Registry,
    writer,
};

const LINE_ENDINGS: &[char] = &['\n', '\r'];
/// Longest line accepted from a client, newline included.
const MAX_LINE_BYTES: u64 = 64 * 1024;

const WELCOME: &str = "Welcome! Please login or register!";
const AUTH_PROMPT: &str = "Enter 'login <username> <password>' or 'register <username> <password>'";
const LOGIN_OK: &str = "Login successful!";
const REGISTER_OK: &str =
    "Registration successful! You are now logged in. Your default colour is white";
const READY: &str = "You may now message. Be friendly to others!";
const HELP: &str = "Available commands: /color, /help, /members, /logout, /exit";
const MEMBERS_HEADER: &str = "Current list of users:";
const GOODBYE: &str = "Goodbye!";

type Delivery = Result<(), SendError<String>>;

enum Authenticated {
    User {
        username: String,
        greeting: &'static str,
    },
    Exit,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatEnd {
    Logout,
    Exit,
    Disconnected,
    Evicted,
}

struct Chatter {
    id: ClientId,
    username: String,
    colour: Colour,
    outbox: mpsc::WeakSender<String>,
}

pub struct Session<R> {
    reader: R,
    registry: Arc<Registry>,
    hub: HubHandle,
    queue_capacity: usize,
    peer: Option<SocketAddr>,
}

impl<R> Session<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(
        reader: R,
        registry: Arc<Registry>,
        hub: HubHandle,
        queue_capacity: usize,
        peer: Option<SocketAddr>,
    ) -> Self {
        Self {
            reader,
            registry,
            hub,
            queue_capacity: queue_capacity.max(1),
            peer,
        }
    }

    /// Drives the connection until the user exits or the stream ends.
    ///
    /// `exit` and `/exit` write a goodbye and shut the sink down. End of
    /// stream, a read error or eviction end the session without writing
    /// anything further.
    pub async fn run<W>(mut self, mut sink: W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        loop {
            let (tx, rx) = mpsc::channel(self.queue_capacity);
            let writer = writer::spawn(sink, rx);

            let (username, greeting) = match self.authenticate(&tx).await {
                Authenticated::User { username, greeting } => (username, greeting),
                Authenticated::Exit => {
                    drop(tx);
                    return farewell(reclaim(writer).await?).await;
                }
                Authenticated::Disconnected => {
                    drop(tx);
                    reclaim(writer).await?;
                    debug!(peer = ?self.peer, "connection closed before login");
                    return Ok(());
                }
            };

            let end = self.chat(tx, &username, greeting).await?;
            sink = reclaim(writer).await?;

            match end {
                ChatEnd::Logout => continue,
                ChatEnd::Exit => return farewell(sink).await,
                ChatEnd::Disconnected | ChatEnd::Evicted => return Ok(()),
            }
        }
    }

    async fn authenticate(&mut self, tx: &mpsc::Sender<String>) -> Authenticated {
        if say(tx, WELCOME).await.is_err() || say(tx, AUTH_PROMPT).await.is_err() {
            return Authenticated::Disconnected;
        }

        loop {
            let Some(line) = self.next_line().await else {
                return Authenticated::Disconnected;
            };

            let reply = match command::parse_auth(&line) {
                Ok(AuthCommand::Exit) => return Authenticated::Exit,
                Ok(AuthCommand::Login { username, password }) => {
                    match self.registry.authenticate(username, password).await {
                        Ok(()) => {
                            return Authenticated::User {
                                username: username.to_string(),
                                greeting: LOGIN_OK,
                            }
                        }
                        Err(err) => err.to_string(),
                    }
                }
                Ok(AuthCommand::Register { username, password }) => {
                    match self.registry.register_and_login(username, password).await {
                        Ok(()) => {
                            return Authenticated::User {
                                username: username.to_string(),
                                greeting: REGISTER_OK,
                            }
                        }
                        Err(err) => err.to_string(),
                    }
                }
                Err(err) => err.to_string(),
            };

            if say(tx, reply).await.is_err() {
                return Authenticated::Disconnected;
            }
        }
    }

    /// Runs the chatting state; the account is logged out whichever way it ends.
    async fn chat(
        &mut self,
        tx: mpsc::Sender<String>,
        username: &str,
        greeting: &'static str,
    ) -> Result<ChatEnd, HubClosed> {
        info!(peer = ?self.peer, user = username, "user authenticated");
        let end = self.converse(tx, username, greeting).await;
        self.registry.logout(username).await;
        end
    }

    async fn converse(
        &mut self,
        tx: mpsc::Sender<String>,
        username: &str,
        greeting: &'static str,
    ) -> Result<ChatEnd, HubClosed> {
        if say(&tx, greeting).await.is_err()
            || say(&tx, format!("You are logged in as {username}"))
                .await
                .is_err()
        {
            return Ok(ChatEnd::Disconnected);
        }

        let colour = self.registry.colour(username).await.unwrap_or_default();
        let outbox = tx.downgrade();
        let client = Client::new(username, tx);
        let mut chatter = Chatter {
            id: client.id(),
            username: username.to_string(),
            colour,
            outbox,
        };

        self.hub.join(client).await?;
        self.hub.broadcast(format!("{username} has arrived")).await?;

        let end = match self.greet(&chatter).await {
            Ok(()) => self.chat_loop(&mut chatter).await?,
            Err(_) => ChatEnd::Disconnected,
        };

        self.hub
            .broadcast(format!("{} has left", chatter.username))
            .await?;
        self.hub.leave(chatter.id).await?;
        info!(peer = ?self.peer, user = %chatter.username, ?end, "user left chat");
        Ok(end)
    }

    async fn greet(&self, chatter: &Chatter) -> Delivery {
        let Some(outbox) = chatter.outbox.upgrade() else {
            return Err(SendError(String::new()));
        };
        say(&outbox, READY).await?;
        say(&outbox, format!("Colour is {}", chatter.colour)).await
    }

    async fn chat_loop(&mut self, chatter: &mut Chatter) -> Result<ChatEnd, HubClosed> {
        loop {
            let Some(line) = self.next_line().await else {
                return Ok(ChatEnd::Disconnected);
            };
            let Some(outbox) = chatter.outbox.upgrade() else {
                return Ok(ChatEnd::Evicted);
            };

            let delivery = match command::parse_chat(&line) {
                ChatCommand::Colour(raw) => self.change_colour(chatter, raw, &outbox).await,
                ChatCommand::Help => say(&outbox, HELP).await,
                ChatCommand::Members => self.send_members(&outbox).await,
                ChatCommand::Logout => return Ok(ChatEnd::Logout),
                ChatCommand::Exit => return Ok(ChatEnd::Exit),
                ChatCommand::Say(text) => {
                    let framed = chatter.colour.wrap_chat(&chatter.username, text);
                    self.hub.broadcast(framed).await?;
                    Ok(())
                }
            };

            if delivery.is_err() {
                return Ok(ChatEnd::Disconnected);
            }
        }
    }

    async fn change_colour(
        &self,
        chatter: &mut Chatter,
        raw: &str,
        outbox: &mpsc::Sender<String>,
    ) -> Delivery {
        match raw.parse::<Colour>() {
            Ok(colour) => {
                if !self.registry.set_colour(&chatter.username, colour).await {
                    warn!(user = %chatter.username, "colour change for account missing from registry");
                }
                chatter.colour = colour;
                say(outbox, format!("Color changed to {colour}")).await
            }
            Err(_) => {
                say(
                    outbox,
                    format!("Invalid color. Available colors: {}", Colour::palette_listing()),
                )
                .await
            }
        }
    }

    async fn send_members(&self, outbox: &mpsc::Sender<String>) -> Delivery {
        let names = self.registry.usernames().await;
        say(outbox, MEMBERS_HEADER).await?;
        for name in names {
            say(outbox, name).await?;
        }
        Ok(())
    }

    /// Reads one line, replacing bytes that are not UTF-8. End of stream, an
    /// I/O error or a line longer than [`MAX_LINE_BYTES`] yield `None`.
    async fn next_line(&mut self) -> Option<String> {
        let mut raw = Vec::new();
        let mut limited = (&mut self.reader).take(MAX_LINE_BYTES);
        match limited.read_until(b'\n', &mut raw).await {
            Ok(0) => None,
            Ok(read) if read as u64 == MAX_LINE_BYTES && !raw.ends_with(b"\n") => {
                debug!(peer = ?self.peer, "client line too long");
                None
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&raw);
                Some(line.trim_end_matches(LINE_ENDINGS).to_string())
            }
            Err(err) => {
                debug!(peer = ?self.peer, ?err, "failed to read from client");
                None
            }
        }
    }
}

async fn say(tx: &mpsc::Sender<String>, line: impl Into<String>) -> Delivery {
    tx.send(line.into()).await
}

async fn reclaim<W>(writer: JoinHandle<W>) -> Result<W> {
    writer.await.context("connection writer task failed")
}

async fn farewell<W>(mut sink: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer::write_line(&mut sink, GOODBYE).await?;
    sink.shutdown().await?;
    Ok(())
}
