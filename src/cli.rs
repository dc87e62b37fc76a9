use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "resilience")]
#[command(author, version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Commands related to the web server.
    Server {
        #[command(subcommand)]
        command: Option<ServerCommands>,
    },
    /// Runs every configured check once and exits with 0 if the service is healthy.
    Check,
}

#[derive(Subcommand, Debug)]
#[command(arg_required_else_help = true)]
pub enum ServerCommands {
    /// Starts the web server and runs until SIGINT or SIGTERM.
    Start,
    /// Returns whether the web server is running.
    Status,
    /// Prints the health report of the running web server.
    Report,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_start() {
        let cli = Cli::try_parse_from(["resilience", "server", "start"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Server {
                command: Some(ServerCommands::Start)
            })
        ));
    }

    #[test]
    fn test_parse_check() {
        let cli = Cli::try_parse_from(["resilience", "check"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Check)));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["resilience", "server", "restart"]).is_err());
    }
}
