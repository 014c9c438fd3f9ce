/// What a submitted input line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Quit,
    /// Drop the messages of the current conversation.
    Clear,
    New,
    Delete,
    Nav,
    Search(Option<String>),
    Model(Option<String>),
    Stats,
    Attach(Option<String>),
    /// Drop everything staged.
    Detach,
    Help,
    Regenerate,
    /// Anything that is not a command, including unknown `/words`.
    Send(String),
}

impl InputCommand {
    /// `None` for a blank line.
    pub fn parse(input: &str) -> Option<Self> {
        let line = input.trim();
        if line.is_empty() {
            return None;
        }
        match line.to_ascii_lowercase().as_str() {
            "quit" | "exit" => return Some(Self::Quit),
            "clear" => return Some(Self::Clear),
            _ => {}
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Self::Send(line.to_string()));
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim().to_string()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };
        let cmd = match name.to_ascii_lowercase().as_str() {
            "quit" | "exit" | "q" => Self::Quit,
            "clear" => Self::Clear,
            "new" => Self::New,
            "delete" | "del" => Self::Delete,
            "nav" => Self::Nav,
            "search" | "find" => Self::Search(arg),
            "model" => Self::Model(arg),
            "stats" => Self::Stats,
            "attach" | "file" => Self::Attach(arg),
            "detach" => Self::Detach,
            "help" | "?" => Self::Help,
            "regen" | "regenerate" | "retry" => Self::Regenerate,
            _ => Self::Send(line.to_string()),
        };
        Some(cmd)
    }
}
