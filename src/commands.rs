/// Watch loop commands and autocomplete logic

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "scan",
    aliases: &["s", "predict"],
    usage: "scan",
    description: "Request a market signal now",
  },
  Command {
    name: "manual",
    aliases: &["m", "sync"],
    usage: "manual <x1,x2,...>",
    description: "Add a manual override signal",
  },
  Command {
    name: "edit",
    aliases: &["e"],
    usage: "edit <id> <multiplier> <seconds>",
    description: "Override a signal's multiplier and countdown",
  },
  Command {
    name: "signals",
    aliases: &["ls", "radar"],
    usage: "signals",
    description: "List active signals",
  },
  Command {
    name: "markets",
    aliases: &["k", "snapshot"],
    usage: "markets",
    description: "Show the last market snapshot",
  },
  Command {
    name: "help",
    aliases: &["h", "?"],
    usage: "help",
    description: "List commands",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Stop watching",
  },
];

/// A typed line split into its command and the rest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<'a> {
  Command(&'static Command, &'a str),
  Unknown(&'a str),
  Empty,
}

/// Resolve a typed line by exact name or alias.
pub fn parse(line: &str) -> Parsed<'_> {
  let line = line.trim();
  let (head, rest) = match line.split_once(char::is_whitespace) {
    Some((head, rest)) => (head, rest.trim()),
    None => (line, ""),
  };
  if head.is_empty() {
    return Parsed::Empty;
  }

  let head_lower = head.to_lowercase();
  COMMANDS
    .iter()
    .find(|cmd| cmd.name == head_lower || cmd.aliases.contains(&head_lower.as_str()))
    .map(|cmd| Parsed::Command(cmd, rest))
    .unwrap_or(Parsed::Unknown(head))
}

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    if cmd.name == input_lower {
      matches.push((cmd, 0));
      continue;
    }

    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}
