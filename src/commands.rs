use tracing::debug;

use crate::browser::MapBrowser;
use crate::errors::{AppError, AppResult};
use crate::state::LocationId;

/// One line of terminal input, mapped onto the widget's keys and buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Enter,
    Up,
    Down,
    Escape,
    SearchButton,
    AddButton,
    Type(String),
    ClickInput,
    ShowBuiltin,
    ShowUserAdded,
    MapClick,
    MarkerClick(LocationId),
    Select(LocationId),
    Add(String),
    Snapshot,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    Quit,
}

pub const HELP: &str = "commands: enter | up | down | esc | search | add | type <text> | click-input \
| builtin | mine | map-click | marker <id> | select <id> | add-place <name> | show | quit";

/// Parses a command line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> AppResult<Option<UserCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "enter" => UserCommand::Enter,
        "up" => UserCommand::Up,
        "down" => UserCommand::Down,
        "esc" | "escape" => UserCommand::Escape,
        "search" => UserCommand::SearchButton,
        "add" => UserCommand::AddButton,
        "type" => UserCommand::Type(rest.to_string()),
        "click-input" => UserCommand::ClickInput,
        "builtin" => UserCommand::ShowBuiltin,
        "mine" => UserCommand::ShowUserAdded,
        "map-click" => UserCommand::MapClick,
        "marker" => UserCommand::MarkerClick(parse_id(rest)?),
        "select" => UserCommand::Select(parse_id(rest)?),
        "add-place" => UserCommand::Add(rest.to_string()),
        "show" => UserCommand::Snapshot,
        "quit" | "exit" => UserCommand::Quit,
        _ => return Err(AppError::InvalidInput(line.to_string())),
    };
    Ok(Some(command))
}

fn parse_id(raw: &str) -> AppResult<LocationId> {
    raw.parse::<LocationId>()
        .map_err(|_| AppError::InvalidInput(format!("expected a location id, got {raw:?}")))
}

pub async fn dispatch(browser: &MapBrowser, command: UserCommand) -> CommandOutcome {
    match command {
        UserCommand::Enter => browser.on_enter_key().await,
        UserCommand::Up => {
            browser.on_up_arrow();
        }
        UserCommand::Down => {
            browser.on_down_arrow();
        }
        UserCommand::Escape => browser.on_escape(),
        UserCommand::SearchButton => browser.on_search_button(),
        UserCommand::AddButton => browser.on_add_button().await,
        UserCommand::Type(text) => browser.set_input(&text),
        UserCommand::ClickInput => browser.clear_input(),
        UserCommand::ShowBuiltin => browser.show_builtin(),
        UserCommand::ShowUserAdded => browser.show_user_added(),
        UserCommand::MapClick => browser.map_click(),
        UserCommand::MarkerClick(id) => browser.marker_click(id),
        UserCommand::Select(id) => {
            browser.list_select(id);
        }
        UserCommand::Add(name) => {
            if let Err(err) = browser.add_location(&name).await {
                debug!(?err, "add-place rejected");
            }
        }
        UserCommand::Snapshot => {}
        UserCommand::Quit => return CommandOutcome::Quit,
    }
    CommandOutcome::Continue
}
