//! Command menu.

use picolink_core::{CommandSpec, LIST_COMMANDS_COMMAND};
use tracing::debug;

/// Runs a command by name.
pub trait CommandExecutor {
    fn execute(&self, command: &str);
}

/// The list of commands offered to the user.
#[derive(Debug, Clone, Default)]
pub struct CommandMenu {
    commands: Vec<CommandSpec>,
}

impl CommandMenu {
    pub fn new(commands: Vec<CommandSpec>) -> Self {
        Self { commands }
    }

    /// Selectable entries. The command that opens this menu is left out.
    pub fn items(&self) -> Vec<&CommandSpec> {
        self.commands
            .iter()
            .filter(|spec| spec.command != LIST_COMMANDS_COMMAND)
            .collect()
    }

    /// Dispatches the selected entry.
    pub fn select(&self, item: &CommandSpec, executor: &dyn CommandExecutor) {
        debug!(command = %item.command, "Menu selection");
        executor.execute(&item.command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picolink_core::indicator::default_commands;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        executed: RefCell<Vec<String>>,
    }

    impl CommandExecutor for Recorder {
        fn execute(&self, command: &str) {
            self.executed.borrow_mut().push(command.to_string());
        }
    }

    #[test]
    fn test_items_exclude_list_commands() {
        let menu = CommandMenu::new(default_commands());
        let items = menu.items();
        assert_eq!(items.len(), default_commands().len() - 1);
        assert!(items.iter().all(|item| item.command != LIST_COMMANDS_COMMAND));
    }

    #[test]
    fn test_select_dispatches_by_name() {
        let menu = CommandMenu::new(default_commands());
        let recorder = Recorder::default();
        let items = menu.items();
        let run = items.iter().find(|item| item.command == "picolink.run").unwrap();

        menu.select(run, &recorder);
        assert_eq!(*recorder.executed.borrow(), vec!["picolink.run".to_string()]);
    }

    #[test]
    fn test_empty_menu() {
        let menu = CommandMenu::default();
        assert!(menu.items().is_empty());
    }
}
