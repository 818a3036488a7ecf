//! Terminal chat client
//!
//! Entry point for the interactive line-based front-end of the chat core.

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::print_stdout)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_fields_in_debug)]

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::io::{self, BufRead, Write};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Context;
use chrono::Utc;
use dotenvy::dotenv;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use chat_session_core::account::Account;
use chat_session_core::admin::AdminPanel;
use chat_session_core::api::{AccountApi, ApiClient, ConversationApi, Message, MessageRole};
use chat_session_core::config::{AppConfig, LogFormat};
use chat_session_core::credential::{CredentialStore, FileBackend};
use chat_session_core::directory::{Confirmation, format_relative};
use chat_session_core::gate::{GateState, SessionGate};
use chat_session_core::ports::{Dialogs, Navigator, Route};
use chat_session_core::session::SendOutcome;
use chat_session_core::view::ChatView;

const HELP: &str = "\
Commandes :
  /login <email> <mot de passe>     se connecter
  /register <email> <mot de passe>  créer un compte
  /logout                           se déconnecter
  /me                               profil courant
  /list                             conversations
  /new                              nouvelle conversation (brouillon)
  /create [titre]                   créer une conversation
  /open <id|n°>                     ouvrir une conversation
  /rename <id|n°> <titre>           renommer une conversation
  /delete <id|n°>                   supprimer une conversation
  /clear                            effacer tout l'historique
  /users [filtre]                   utilisateurs (admin)
  /deluser <id>                     supprimer un utilisateur (admin)
  /delete-account                   supprimer mon compte
  /quit                             quitter
Toute autre ligne est envoyée comme message.";

/// Navigator that only remembers where the user is.
#[derive(Debug, Default)]
struct TerminalNavigator {
    route: RwLock<Option<Route>>,
}

impl TerminalNavigator {
    fn current(&self) -> Option<Route> {
        *self.route.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Navigator for TerminalNavigator {
    fn navigate(&self, route: Route) {
        let previous = self
            .route
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(route);
        if previous != Some(route) && route == Route::Login {
            println!("» Connexion requise (/login <email> <mot de passe>).");
        }
    }
}

/// Prompts on the controlling terminal.
#[derive(Debug)]
struct TerminalDialogs;

impl Dialogs for TerminalDialogs {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{prompt} [o/N] ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "o" | "oui" | "y" | "yes"),
            Err(_) => false,
        }
    }

    fn alert(&self, message: &str) {
        println!("! {message}");
    }
}

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Login { email: String, password: String },
    Register { email: String, password: String },
    Logout,
    Me,
    List,
    New,
    Create(Option<String>),
    Open(String),
    Rename { target: String, title: String },
    Delete(String),
    Clear,
    Users(String),
    DeleteUser(String),
    DeleteAccount,
    Help,
    Quit,
    Send(String),
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Self::Send(line.to_string()));
        };

        let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let args = args.trim();
        let (first, tail) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
        let first = first.to_string();
        let tail = tail.trim().to_string();

        let command = match name {
            "login" => Self::Login {
                email: first,
                password: tail,
            },
            "register" => Self::Register {
                email: first,
                password: tail,
            },
            "logout" => Self::Logout,
            "me" => Self::Me,
            "list" => Self::List,
            "new" => Self::New,
            "create" => Self::Create((!args.is_empty()).then(|| args.to_string())),
            "open" => Self::Open(first),
            "rename" => Self::Rename {
                target: first,
                title: tail,
            },
            "delete" => Self::Delete(first),
            "clear" => Self::Clear,
            "users" => Self::Users(args.to_string()),
            "deluser" => Self::DeleteUser(first),
            "delete-account" => Self::DeleteAccount,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        };
        Some(command)
    }

    fn needs_session(&self) -> bool {
        !matches!(
            self,
            Self::Login { .. } | Self::Register { .. } | Self::Help | Self::Quit | Self::Unknown(_)
        )
    }
}

struct App {
    config: AppConfig,
    client: Arc<ApiClient>,
    gate: SessionGate,
    navigator: Arc<TerminalNavigator>,
    dialogs: Arc<TerminalDialogs>,
    account: Account,
    view: ChatView,
}

impl App {
    fn new(config: AppConfig) -> anyhow::Result<Self> {
        let store = match &config.credential.path {
            Some(path) => CredentialStore::new(FileBackend::new(path)),
            None => CredentialStore::in_memory(),
        };
        let navigator = Arc::new(TerminalNavigator::default());
        let gate = SessionGate::new(store.clone(), Arc::clone(&navigator) as Arc<dyn Navigator>);
        let client = Arc::new(
            ApiClient::new(&config.api, store)
                .context("invalid API configuration")?
                .with_unauthorized_handler(Arc::new(gate.clone())),
        );
        let dialogs = Arc::new(TerminalDialogs);
        let account = Account::new(Arc::clone(&client) as Arc<dyn AccountApi>, gate.clone());
        let view = Self::fresh_view(&config, &client, &dialogs);

        Ok(Self {
            config,
            client,
            gate,
            navigator,
            dialogs,
            account,
            view,
        })
    }

    fn fresh_view(config: &AppConfig, client: &Arc<ApiClient>, dialogs: &Arc<TerminalDialogs>) -> ChatView {
        ChatView::new(
            Arc::clone(client) as Arc<dyn ConversationApi>,
            Arc::clone(dialogs) as Arc<dyn Dialogs>,
            config.chat.history_page_size,
        )
    }

    /// Mount the chat view: reset it and fetch the conversation list.
    async fn enter_chat(&mut self) {
        self.view = Self::fresh_view(&self.config, &self.client, &self.dialogs);
        if self.view.refresh().await.is_ok() {
            self.print_conversations();
        }
    }

    /// Resolve a list position (1-based) or a raw id.
    fn resolve(&self, target: &str) -> String {
        target
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.view.directory().items().get(i))
            .map_or_else(|| target.to_string(), |c| c.id.clone())
    }

    fn print_conversations(&self) {
        let items = self.view.directory().items();
        if items.is_empty() {
            println!("(aucune conversation)");
            return;
        }
        let now = Utc::now();
        let active = self.view.session().conversation_id();
        for (i, c) in items.iter().enumerate() {
            let marker = if active == Some(c.id.as_str()) { '*' } else { ' ' };
            println!(
                "{marker}{:>3}. {}  [{}]  {}",
                i + 1,
                c.display_title(),
                c.id,
                format_relative(c.updated_at, now)
            );
        }
    }

    fn print_message(message: &Message) {
        let who = match message.role {
            MessageRole::User => "vous",
            MessageRole::Assistant => "assistant",
        };
        println!("{who} > {}", message.content);
    }

    fn print_transcript(&self) {
        println!("── {} ──", self.view.session().title());
        for message in self.view.session().messages() {
            Self::print_message(message);
        }
    }

    /// Run one command. Returns `false` when the user asked to quit.
    async fn handle(&mut self, command: Command) -> bool {
        if command.needs_session() && !self.gate.is_authenticated() {
            println!("Connectez-vous d'abord (/login <email> <mot de passe>).");
            return true;
        }

        match command {
            Command::Quit => return false,
            Command::Help => println!("{HELP}"),
            Command::Unknown(name) => println!("Commande inconnue : /{name} (voir /help)"),
            Command::Login { email, password } => {
                match self.account.login(&email, &password).await {
                    Ok(GateState::Authenticated) => {
                        println!("Connecté.");
                        self.enter_chat().await;
                    }
                    Ok(_) => {}
                    Err(e) => println!("! {}", e.user_message()),
                }
            }
            Command::Register { email, password } => {
                match self.account.register(&email, &password).await {
                    Ok(()) => println!("Compte créé. Vous pouvez vous connecter."),
                    Err(e) => println!("! {}", e.user_message()),
                }
            }
            Command::Logout => {
                self.account.logout();
                println!("Déconnecté.");
            }
            Command::Me => match self.account.current_user().await {
                Ok(me) => println!(
                    "{} ({}){}",
                    me.email,
                    me.id,
                    if me.is_admin() { " [admin]" } else { "" }
                ),
                Err(e) => println!("! {}", e.user_message()),
            },
            Command::List => {
                if self.view.refresh().await.is_ok() {
                    self.print_conversations();
                }
            }
            Command::New => {
                self.view.new_draft();
                println!("Nouvelle conversation.");
            }
            Command::Create(title) => {
                if let Ok(created) = self.view.create_conversation(title).await {
                    println!("Conversation créée : {} [{}]", created.display_title(), created.id);
                }
            }
            Command::Open(target) => {
                let id = self.resolve(&target);
                if self.view.select_conversation(&id).await.is_ok() {
                    self.print_transcript();
                }
            }
            Command::Rename { target, title } => {
                let id = self.resolve(&target);
                if let Ok(renamed) = self.view.rename_conversation(&id, &title).await {
                    println!("Renommée : {}", renamed.display_title());
                }
            }
            Command::Delete(target) => {
                let id = self.resolve(&target);
                if let Ok(Confirmation::Done) = self.view.delete_conversation(&id).await {
                    println!("Conversation supprimée.");
                }
            }
            Command::Clear => {
                if let Err(e) = self.view.clear_history().await {
                    tracing::debug!(name: "client.clear.failed", error = %e, "Clear history failed");
                }
            }
            Command::Users(filter) => {
                if let Some(mut panel) = self.admin_panel().await {
                    if panel.load().await.is_ok() {
                        for u in panel.filtered(&filter) {
                            println!("{}  {}  {}", u.id, u.email, u.role.as_deref().unwrap_or("-"));
                        }
                    }
                }
            }
            Command::DeleteUser(id) => {
                if let Some(mut panel) = self.admin_panel().await {
                    match panel.delete_user(&id, self.dialogs.as_ref()).await {
                        Ok(Confirmation::Done) => println!("Utilisateur supprimé."),
                        Ok(Confirmation::Cancelled) => {}
                        Err(e) => self.dialogs.alert(&e.user_message()),
                    }
                }
            }
            Command::DeleteAccount => {
                match self.account.delete_account(self.dialogs.as_ref()).await {
                    Ok(Confirmation::Done) => println!("Compte supprimé."),
                    Ok(Confirmation::Cancelled) => {}
                    Err(e) => self.dialogs.alert(&e.user_message()),
                }
            }
            Command::Send(text) => match self.view.send(&text).await {
                Ok(outcome) => {
                    if let SendOutcome::Answered { promoted: Some(id) } = &outcome {
                        tracing::debug!(name: "client.conversation.started", conversation_id = %id, "Draft promoted");
                    }
                    if let Some(last) = self.view.session().messages().last() {
                        Self::print_message(last);
                    }
                }
                Err(e) => println!("! {}", e.user_message()),
            },
        }

        if self.navigator.current() == Some(Route::Login) && !self.gate.is_authenticated() {
            self.view = Self::fresh_view(&self.config, &self.client, &self.dialogs);
        }
        true
    }

    async fn admin_panel(&self) -> Option<AdminPanel> {
        match self.account.current_user().await {
            Ok(me) if me.is_admin() => Some(AdminPanel::new(
                Arc::clone(&self.client) as Arc<dyn AccountApi>,
                me.id,
            )),
            Ok(_) => {
                self.dialogs.alert("Accès réservé aux administrateurs.");
                None
            }
            Err(e) => {
                self.dialogs.alert(&e.user_message());
                None
            }
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(io::stderr))
            .init(),
    }
}

async fn read_line() -> anyhow::Result<Option<String>> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        Ok::<_, io::Error>((read > 0).then_some(line))
    })
    .await
    .context("stdin reader panicked")?
    .context("failed to read stdin")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(config.log.format);

    tracing::info!(
        name: "client.config.loaded",
        base_url = %config.api.base_url,
        persistent_credential = config.credential.path.is_some(),
        "Configuration loaded"
    );

    let mut app = App::new(config)?;
    println!("Client de chat ({}). /help pour l'aide.", app.client.base_url());

    if app.gate.mount() == GateState::Authenticated {
        app.enter_chat().await;
    }

    loop {
        let prompt = if app.view.session().is_draft() {
            "nouvelle".to_string()
        } else {
            app.view.session().title().to_string()
        };
        print!("[{prompt}] > ");
        io::stdout().flush()?;

        let Some(line) = read_line().await? else {
            break;
        };
        let Some(command) = Command::parse(&line) else {
            continue;
        };
        if !app.handle(command).await {
            break;
        }
    }

    tracing::info!(name: "client.shutdown", "Bye");
    Ok(())
}
