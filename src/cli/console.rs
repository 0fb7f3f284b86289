//! `zsm console` command implementation

use anyhow::{bail, Result};
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{render, ConsoleDashboard, GlobalArgs};
use crate::api::NewNode;
use crate::refresh::Section;

#[derive(Args)]
pub struct ConsoleArgs {
    /// Section to show after login (dashboard, edge, iot, other)
    #[arg(long, default_value = "dashboard")]
    section: Section,
}

const HELP: &str = "\
Commands:
  deploy                                   start a full deployment
  status                                   show the current deployment
  section <dashboard|edge|iot|other>       switch the visible section
  refresh                                  reload the visible section
  extend | dismiss                         answer the session warning
  login [<user> <password>]                log in again
  logout                                   end the session
  add <name> <ip> <ssh-user> <ssh-pass>    register an IoT node
  add-edge <name> <ip> <ssh-user> <ssh-pass> [--master]
                                           register an edge node
  remove <name>                            delete a node
  help | quit";

#[derive(Debug, PartialEq)]
enum Command {
    Help,
    Deploy,
    Status,
    Section(Section),
    Refresh,
    Extend,
    Dismiss,
    Login(Option<(String, String)>),
    Logout,
    Add(NewNode),
    AddEdge(NewNode),
    Remove(String),
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Option<Command>> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&head, rest)) = words.split_first() else {
            return Ok(None);
        };

        let command = match (head, rest) {
            ("help" | "?", []) => Command::Help,
            ("deploy", []) => Command::Deploy,
            ("status", []) => Command::Status,
            ("section" | "go", [name]) => Command::Section(name.parse()?),
            ("refresh", []) => Command::Refresh,
            ("extend", []) => Command::Extend,
            ("dismiss", []) => Command::Dismiss,
            ("login", []) => Command::Login(None),
            ("login", [user, password]) => {
                Command::Login(Some((user.to_string(), password.to_string())))
            }
            ("logout", []) => Command::Logout,
            ("add", [name, ip, user, password]) => {
                Command::Add(new_node(name, ip, user, password, None))
            }
            ("add-edge", [name, ip, user, password]) => {
                Command::AddEdge(new_node(name, ip, user, password, Some(false)))
            }
            ("add-edge", [name, ip, user, password, "--master"]) => {
                Command::AddEdge(new_node(name, ip, user, password, Some(true)))
            }
            ("remove" | "rm", [name]) => Command::Remove(name.to_string()),
            ("quit" | "exit" | "q", []) => Command::Quit,
            _ => bail!("Unrecognised command '{}'. Type 'help' for a list.", line.trim()),
        };
        Ok(Some(command))
    }
}

fn new_node(name: &str, ip: &str, user: &str, password: &str, is_master: Option<bool>) -> NewNode {
    NewNode {
        name: name.to_string(),
        ip: ip.to_string(),
        ssh_username: user.to_string(),
        ssh_password: password.to_string(),
        is_master,
    }
}

pub async fn run(global: &GlobalArgs, args: ConsoleArgs) -> Result<()> {
    let (dashboard, rx) = super::connect(global)?;
    let renderer = tokio::spawn(render::run(rx));

    super::login(&dashboard, global).await?;
    dashboard.set_section(args.section).await;
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Ok(None) => {}
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => execute(&dashboard, global, command).await,
            Err(e) => eprintln!("{}", e),
        }
    }

    dashboard.shutdown();
    renderer.abort();
    Ok(())
}

async fn execute(dashboard: &ConsoleDashboard, global: &GlobalArgs, command: Command) {
    match command {
        Command::Help => println!("{}", HELP),
        Command::Deploy => {
            if dashboard.flag().get() {
                println!("A deployment is already running. Type 'status' to follow it.");
                return;
            }
            // Progress is rendered as it arrives; keep reading commands.
            let dashboard = dashboard.clone();
            tokio::spawn(async move {
                let _ = dashboard.deploy().await;
            });
        }
        Command::Status => match dashboard.tracker().snapshot() {
            Some(session) => {
                println!("[{:>3}%] {}", session.percent(), session.message());
                for step in crate::progress::StepId::ALL {
                    println!("  {:<28} {:?}", step.label(), session.steps().status(step));
                }
            }
            None => println!("No deployment yet."),
        },
        Command::Section(section) => dashboard.set_section(section).await,
        Command::Refresh => dashboard.refresh().refresh_section().await,
        Command::Extend => {
            if let Err(e) = dashboard.extend_session().await {
                eprintln!("Failed to extend session: {}", e);
            }
        }
        Command::Dismiss => dashboard.dismiss_warning(),
        Command::Login(credentials) => {
            let (username, password) = match credentials {
                Some(credentials) => credentials,
                None => match (&global.username, &global.password) {
                    (Some(user), Some(password)) => (user.clone(), password.clone()),
                    _ => {
                        println!("Usage: login <user> <password>");
                        return;
                    }
                },
            };
            match dashboard.login(&username, &password).await {
                Ok(()) => println!("✓ Logged in as {}", username),
                Err(e) => eprintln!("Login failed: {}", e),
            }
        }
        Command::Logout => dashboard.logout(),
        // Mutation results are reported through the view as notices.
        Command::Add(node) => {
            let _ = dashboard.add_node(node).await;
        }
        Command::AddEdge(node) => {
            let _ = dashboard.add_edge_node(node).await;
        }
        Command::Remove(name) => {
            let _ = dashboard.delete_node(&name).await;
        }
        Command::Quit => {}
    }
}
