//! Fixed action vocabulary and its validating parser.
//!
//! Inference output and operator input are plain text, one call per line,
//! e.g. `click(500, 500)` or `write("hello")`. Parsing turns a line into a
//! closed [`Action`] variant; anything outside the vocabulary is rejected.

use std::fmt;
use std::str::FromStr;

use shared_types::ActionCall;
pub use shared_types::Tool;

/// Coordinates live in a normalized 0..=1000 space on both axes.
pub const COORD_MAX: u16 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Click { x: u16, y: u16 },
    RightClick { x: u16, y: u16 },
    DoubleClick { x: u16, y: u16 },
    Drag { x1: u16, y1: u16, x2: u16, y2: u16 },
    Write { text: String },
    Remember { text: String },
    Recall,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ActionParseError {
    #[error("not a call expression: '{0}'")]
    Syntax(String),
    #[error("unknown tool: '{0}'")]
    UnknownTool(String),
    #[error("{tool} takes {expected} argument(s), got {got}")]
    Arity {
        tool: Tool,
        expected: usize,
        got: usize,
    },
    #[error("bad argument for {tool}: {detail}")]
    BadArgument { tool: Tool, detail: String },
}

impl Action {
    pub fn tool(&self) -> Tool {
        match self {
            Action::Click { .. } => Tool::Click,
            Action::RightClick { .. } => Tool::RightClick,
            Action::DoubleClick { .. } => Tool::DoubleClick,
            Action::Drag { .. } => Tool::Drag,
            Action::Write { .. } => Tool::Write,
            Action::Remember { .. } => Tool::Remember,
            Action::Recall => Tool::Recall,
        }
    }

    pub fn to_call(&self) -> ActionCall {
        let args: Vec<serde_json::Value> = match self {
            Action::Click { x, y } | Action::RightClick { x, y } | Action::DoubleClick { x, y } => {
                vec![(*x).into(), (*y).into()]
            }
            Action::Drag { x1, y1, x2, y2 } => {
                vec![(*x1).into(), (*y1).into(), (*x2).into(), (*y2).into()]
            }
            Action::Write { text } | Action::Remember { text } => vec![text.clone().into()],
            Action::Recall => Vec::new(),
        };
        ActionCall {
            name: self.tool().as_str().to_string(),
            args,
        }
    }

    fn from_parts(tool: Tool, args: &[&str]) -> Result<Self, ActionParseError> {
        let expected = match tool {
            Tool::Click | Tool::RightClick | Tool::DoubleClick => 2,
            Tool::Drag => 4,
            Tool::Write | Tool::Remember => 1,
            Tool::Recall => 0,
        };
        if args.len() != expected {
            return Err(ActionParseError::Arity {
                tool,
                expected,
                got: args.len(),
            });
        }

        let coord = |raw: &str| parse_coord(raw).map_err(|detail| bad(tool, detail));
        let text = |raw: &str| parse_string_literal(raw).map_err(|detail| bad(tool, detail));

        Ok(match tool {
            Tool::Click => Action::Click {
                x: coord(args[0])?,
                y: coord(args[1])?,
            },
            Tool::RightClick => Action::RightClick {
                x: coord(args[0])?,
                y: coord(args[1])?,
            },
            Tool::DoubleClick => Action::DoubleClick {
                x: coord(args[0])?,
                y: coord(args[1])?,
            },
            Tool::Drag => Action::Drag {
                x1: coord(args[0])?,
                y1: coord(args[1])?,
                x2: coord(args[2])?,
                y2: coord(args[3])?,
            },
            Tool::Write => Action::Write {
                text: text(args[0])?,
            },
            Tool::Remember => Action::Remember {
                text: text(args[0])?,
            },
            Tool::Recall => Action::Recall,
        })
    }
}

fn bad(tool: Tool, detail: String) -> ActionParseError {
    ActionParseError::BadArgument { tool, detail }
}

impl FromStr for Action {
    type Err = ActionParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (name, inner) = split_call(line)?;
        let tool = Tool::from_name(name)
            .ok_or_else(|| ActionParseError::UnknownTool(name.to_string()))?;
        let args = split_args(inner).ok_or_else(|| {
            bad(tool, "unterminated string literal".to_string())
        })?;
        Action::from_parts(tool, &args)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.tool().as_str();
        match self {
            Action::Click { x, y } | Action::RightClick { x, y } | Action::DoubleClick { x, y } => {
                write!(f, "{name}({x}, {y})")
            }
            Action::Drag { x1, y1, x2, y2 } => write!(f, "{name}({x1}, {y1}, {x2}, {y2})"),
            Action::Write { text } | Action::Remember { text } => {
                let quoted = serde_json::to_string(text).map_err(|_| fmt::Error)?;
                write!(f, "{name}({quoted})")
            }
            Action::Recall => write!(f, "{name}()"),
        }
    }
}

/// Every line of `text` that parses as a vocabulary call, in order.
pub fn extract_actions(text: &str) -> Vec<Action> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.parse::<Action>().ok())
        .collect()
}

/// Loose conversion of an executed-action report line into `{name, args}`.
///
/// Reports come from the execution surface, which may describe calls the
/// vocabulary parser would reject, so this only needs the `name(...)` shape.
/// Integer arguments become numbers, quoted arguments are unquoted, anything
/// else is kept verbatim.
pub fn call_from_report(line: &str) -> Option<ActionCall> {
    let (name, inner) = split_call(line).ok()?;
    let args = split_args(inner)?
        .into_iter()
        .map(|raw| -> serde_json::Value {
            if let Ok(n) = raw.parse::<i64>() {
                n.into()
            } else if let Ok(s) = parse_string_literal(raw) {
                s.into()
            } else {
                raw.to_string().into()
            }
        })
        .collect();
    Some(ActionCall {
        name: name.to_string(),
        args,
    })
}

fn split_call(line: &str) -> Result<(&str, &str), ActionParseError> {
    let trimmed = line.trim();
    let syntax = || ActionParseError::Syntax(trimmed.to_string());

    let open = trimmed.find('(').ok_or_else(syntax)?;
    if !trimmed.ends_with(')') {
        return Err(syntax());
    }
    let name = trimmed[..open].trim();
    let is_ident = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !is_ident {
        return Err(syntax());
    }
    Ok((name, &trimmed[open + 1..trimmed.len() - 1]))
}

/// Split an argument list on top-level commas, respecting quoted strings.
/// Returns `None` on an unterminated quote.
fn split_args(inner: &str) -> Option<Vec<&str>> {
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }

    let mut args = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (idx, c) in inner.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                ',' => {
                    args.push(inner[start..idx].trim());
                    start = idx + 1;
                }
                _ => {}
            },
        }
    }
    if quote.is_some() {
        return None;
    }
    args.push(inner[start..].trim());
    Some(args)
}

fn parse_coord(raw: &str) -> Result<u16, String> {
    let value = match raw.parse::<i64>() {
        Ok(v) => v,
        Err(_) => match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => v.trunc() as i64,
            _ => return Err(format!("expected an integer coordinate, got '{raw}'")),
        },
    };
    Ok(value.clamp(0, i64::from(COORD_MAX)) as u16)
}

fn parse_string_literal(raw: &str) -> Result<String, String> {
    let not_string = || format!("expected a quoted string, got '{raw}'");
    if raw.len() < 2 {
        return Err(not_string());
    }
    if raw.starts_with('"') && raw.ends_with('"') {
        return serde_json::from_str::<String>(raw).map_err(|e| format!("bad string literal: {e}"));
    }
    if raw.starts_with('\'') && raw.ends_with('\'') {
        return Ok(raw[1..raw.len() - 1].replace("\\'", "'"));
    }
    Err(not_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_tool() {
        assert_eq!(
            "click(10, 20)".parse::<Action>().unwrap(),
            Action::Click { x: 10, y: 20 }
        );
        assert_eq!(
            "right_click(1,2)".parse::<Action>().unwrap(),
            Action::RightClick { x: 1, y: 2 }
        );
        assert_eq!(
            "  double_click( 3 , 4 )  ".parse::<Action>().unwrap(),
            Action::DoubleClick { x: 3, y: 4 }
        );
        assert_eq!(
            "drag(1, 2, 3, 4)".parse::<Action>().unwrap(),
            Action::Drag {
                x1: 1,
                y1: 2,
                x2: 3,
                y2: 4
            }
        );
        assert_eq!(
            r#"write("hello, world")"#.parse::<Action>().unwrap(),
            Action::Write {
                text: "hello, world".to_string()
            }
        );
        assert_eq!(
            "remember('the login page')".parse::<Action>().unwrap(),
            Action::Remember {
                text: "the login page".to_string()
            }
        );
        assert_eq!("recall()".parse::<Action>().unwrap(), Action::Recall);
    }

    #[test]
    fn clamps_coordinates_into_normalized_space() {
        assert_eq!(
            "click(-5, 4000)".parse::<Action>().unwrap(),
            Action::Click { x: 0, y: 1000 }
        );
        assert_eq!(
            "click(12.9, 7.1)".parse::<Action>().unwrap(),
            Action::Click { x: 12, y: 7 }
        );
    }

    #[test]
    fn rejects_calls_outside_the_vocabulary() {
        assert_eq!(
            "teleport(1, 2)".parse::<Action>(),
            Err(ActionParseError::UnknownTool("teleport".to_string()))
        );
        assert!(matches!(
            "click(1)".parse::<Action>(),
            Err(ActionParseError::Arity {
                tool: Tool::Click,
                expected: 2,
                got: 1
            })
        ));
        assert!(matches!(
            "click(a, b)".parse::<Action>(),
            Err(ActionParseError::BadArgument { tool: Tool::Click, .. })
        ));
        assert!(matches!(
            "write(hello)".parse::<Action>(),
            Err(ActionParseError::BadArgument { tool: Tool::Write, .. })
        ));
        assert!(matches!(
            r#"write("unterminated)"#.parse::<Action>(),
            Err(ActionParseError::BadArgument { .. })
        ));
        assert!(matches!(
            "I will click the button".parse::<Action>(),
            Err(ActionParseError::Syntax(_))
        ));
        assert!(matches!(
            "click(1, 2) now".parse::<Action>(),
            Err(ActionParseError::Syntax(_))
        ));
    }

    #[test]
    fn display_is_canonical_call_text() {
        let cases = [
            ("click(5,6)", "click(5, 6)"),
            ("drag(0,0,1000,1000)", "drag(0, 0, 1000, 1000)"),
            ("write('say \"hi\"')", r#"write("say \"hi\"")"#),
            ("recall( )", "recall()"),
        ];
        for (input, expected) in cases {
            let action: Action = input.parse().unwrap();
            assert_eq!(action.to_string(), expected);
            assert_eq!(expected.parse::<Action>().unwrap(), action);
        }
    }

    #[test]
    fn extracts_only_recognized_lines() {
        let text = "PART 1: The browser is open on the search page.\n\
                    PART 2:\n\
                    click(120, 45)\n\
                    teleport(1, 1)\n\
                    write(\"rust\")\n";
        let actions = extract_actions(text);
        assert_eq!(
            actions,
            vec![
                Action::Click { x: 120, y: 45 },
                Action::Write {
                    text: "rust".to_string()
                }
            ]
        );
        assert!(extract_actions("").is_empty());
    }

    #[test]
    fn report_lines_become_name_and_args() {
        let call = call_from_report("click(500, 500)").unwrap();
        assert_eq!(call.name, "click");
        assert_eq!(call.args, vec![serde_json::json!(500), serde_json::json!(500)]);

        let call = call_from_report(r#"write("a, b")"#).unwrap();
        assert_eq!(call.args, vec![serde_json::json!("a, b")]);

        let call = call_from_report("recall()").unwrap();
        assert!(call.args.is_empty());

        assert!(call_from_report("not a call").is_none());
    }

    #[test]
    fn to_call_matches_report_shape() {
        let action = Action::Drag {
            x1: 1,
            y1: 2,
            x2: 3,
            y2: 4,
        };
        assert_eq!(
            action.to_call(),
            call_from_report(&action.to_string()).unwrap()
        );
    }
}
