use std::fmt::Display;
use std::str::SplitWhitespace;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::device::{Device, Table};
use crate::repl::{Exit, HandleUserInput, HandleUserInputError, Repl};

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Print a table, or write it to the named file.
    List(Table, Option<String>),
    Help,
    Quit,
    None,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command {0:?}. Type help for a list of commands.")]
    Unknown(String),
    #[error("Too many arguments. Usage: {0} [file]")]
    TooManyArgs(String),
}

const HELP: &str = "\
li, interfaces [file]   list interfaces
lr, routes [file]       list the route table
la, arp [file]          list the ARP cache
lm, macs [file]         list learned MAC addresses
ld, drops [file]        list dropped frame counts
help                    show this message
q, quit                 quit";

pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        None => Ok(Command::None),
        Some(cmd) => cmd_arg_handler(cmd, tokens),
    }
}

fn cmd_arg_handler(cmd: &str, mut tokens: SplitWhitespace) -> Result<Command, ParseError> {
    let table = match cmd {
        "li" | "interfaces" => Table::Interfaces,
        "lr" | "routes" => Table::Routes,
        "la" | "arp" => Table::Arp,
        "lm" | "macs" => Table::Macs,
        "ld" | "drops" => Table::Drops,
        "help" => return Ok(Command::Help),
        "q" | "quit" => return Ok(Command::Quit),
        _ => return Err(ParseError::Unknown(cmd.to_string())),
    };

    let file = tokens.next().map(String::from);
    if tokens.next().is_some() {
        return Err(ParseError::TooManyArgs(cmd.to_string()));
    }
    Ok(Command::List(table, file))
}

fn table_name(table: Table) -> &'static str {
    match table {
        Table::Interfaces => "interface",
        Table::Routes => "route",
        Table::Arp => "ARP",
        Table::Macs => "MAC",
        Table::Drops => "drop",
    }
}

pub struct Cli {
    device: Arc<dyn Device>,
}

#[async_trait]
impl HandleUserInput for Cli {
    async fn handle(&mut self, user_input: String) -> Result<(), HandleUserInputError> {
        match parse_command(&user_input) {
            Ok(Command::Quit) => return Err(HandleUserInputError::Terminate),
            Ok(cmd) => self.execute_command(cmd),
            Err(e) => eprintln!("{e}"),
        };

        Ok(())
    }
}

impl Cli {
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self { device }
    }

    /// Serve commands from stdin until the user quits or input ends.
    pub async fn run(self) -> Exit {
        Repl::new(self, Some(">> ".into())).serve_stdin().await
    }

    fn execute_command(&self, cmd: Command) {
        match cmd {
            Command::List(table, file) => self.print_table(table, file),
            Command::Help => println!("{}", HELP),
            Command::None | Command::Quit => (),
        }
    }

    fn print_table(&self, table: Table, file: Option<String>) {
        let rendered = match self.device.render(table) {
            Some(rendered) => rendered,
            None => {
                eprintln!("This device has no {} table", table_name(table));
                return;
            }
        };

        match file {
            Some(file) => write_to(&file, &rendered),
            None => print!("{}", rendered),
        }
    }
}

fn write_to<P: AsRef<std::path::Path> + Display>(path: P, contents: &str) {
    if let Err(e) = std::fs::write(&path, contents) {
        eprintln!("Failed to write {}: {}", path, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::netlinks::{abc, host_mac};
    use crate::fixture::recorder::Recorder;
    use crate::router::{ArpCache, ArpEntry, RouteTable, Router};

    #[test]
    fn parse_list_commands() {
        assert_eq!(
            parse_command("li").unwrap(),
            Command::List(Table::Interfaces, None)
        );
        assert_eq!(
            parse_command("routes out.txt").unwrap(),
            Command::List(Table::Routes, Some("out.txt".into()))
        );
        assert_eq!(parse_command("  la ").unwrap(), Command::List(Table::Arp, None));
        assert_eq!(parse_command("lm").unwrap(), Command::List(Table::Macs, None));
        assert_eq!(parse_command("drops").unwrap(), Command::List(Table::Drops, None));
    }

    #[test]
    fn parse_other_commands() {
        assert_eq!(parse_command("").unwrap(), Command::None);
        assert_eq!(parse_command("q").unwrap(), Command::Quit);
        assert_eq!(parse_command("quit").unwrap(), Command::Quit);
        assert_eq!(parse_command("help").unwrap(), Command::Help);

        assert_eq!(
            parse_command("send 1.2.3.4").unwrap_err(),
            ParseError::Unknown("send".into())
        );
        assert_eq!(
            parse_command("lr a b").unwrap_err(),
            ParseError::TooManyArgs("lr".into())
        );
    }

    #[tokio::test]
    async fn write_table_to_file() {
        let arp_cache = ArpCache::with_entries(vec![ArpEntry::new(
            "10.0.1.2".parse().unwrap(),
            host_mac(2),
        )]);
        let router = Router::new(
            abc::interfaces(),
            RouteTable::default(),
            arp_cache,
            Arc::new(Recorder::default()),
        );
        let mut cli = Cli::new(Arc::new(router));

        let path = std::env::temp_dir().join(format!("vnet-cli-arp-{}", std::process::id()));
        cli.handle(format!("la {}", path.display())).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(written, "IP\t\tMAC\n10.0.1.2\t02:00:00:00:bb:02\n");

        assert_eq!(
            cli.handle("q".into()).await,
            Err(HandleUserInputError::Terminate)
        );
    }
}
