/// One line of shell input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Help,
    Nodes,
    Net,
    Dump,
    PingAll,
    ResetServers,
    Exit,
    Empty,
    /// `<node> <cmd...>`
    NodeCommand { node: String, command: String },
    /// A node name with nothing to run
    MissingNodeCommand(String),
    Unknown(String),
}

impl ShellCommand {
    /// Parse a line. Built-in commands win over node names; `is_node`
    /// decides whether the first word names a node.
    pub fn parse(line: &str, is_node: impl Fn(&str) -> bool) -> Self {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word {
            "" => ShellCommand::Empty,
            "help" | "?" => ShellCommand::Help,
            "nodes" => ShellCommand::Nodes,
            "net" => ShellCommand::Net,
            "dump" => ShellCommand::Dump,
            "pingall" => ShellCommand::PingAll,
            "resetservers" => ShellCommand::ResetServers,
            "exit" | "quit" => ShellCommand::Exit,
            node if is_node(node) => {
                if rest.is_empty() {
                    ShellCommand::MissingNodeCommand(node.to_string())
                } else {
                    ShellCommand::NodeCommand {
                        node: node.to_string(),
                        command: rest.to_string(),
                    }
                }
            }
            other => ShellCommand::Unknown(other.to_string()),
        }
    }
}

pub const HELP: &str = "\
Commands:
  help                 show this message
  nodes                list nodes
  net                  list links
  dump                 show nodes with their interfaces
  pingall              test reachability between all hosts
  resetservers         reset the replay state of every origin server
  <node> <cmd...>      run a command on a node
  exit | quit          leave the shell and stop the network";

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ShellCommand {
        ShellCommand::parse(line, |name| ["router", "dns", "root", "http_a_test_80"].contains(&name))
    }

    #[test]
    fn test_builtins() {
        assert_eq!(parse("help"), ShellCommand::Help);
        assert_eq!(parse("  pingall  "), ShellCommand::PingAll);
        assert_eq!(parse("resetservers"), ShellCommand::ResetServers);
        assert_eq!(parse("quit"), ShellCommand::Exit);
        assert_eq!(parse("exit"), ShellCommand::Exit);
        assert_eq!(parse(""), ShellCommand::Empty);
        assert_eq!(parse("   \t"), ShellCommand::Empty);
    }

    #[test]
    fn test_node_command_keeps_rest_of_line() {
        assert_eq!(
            parse("http_a_test_80 curl -s http://10.0.0.5/ | head"),
            ShellCommand::NodeCommand {
                node: "http_a_test_80".to_string(),
                command: "curl -s http://10.0.0.5/ | head".to_string(),
            }
        );
        assert_eq!(parse("dns"), ShellCommand::MissingNodeCommand("dns".to_string()));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(parse("frobnicate now"), ShellCommand::Unknown("frobnicate".to_string()));
    }
}
