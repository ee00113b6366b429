/// Operator commands accepted on the supervisor prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    /// Send the named bot walking to the coordinates.
    Come { bot: String, x: f64, y: f64, z: f64 },
    /// Abort the named bot's navigation.
    Stop { bot: String },
    /// Log the named bot's current position.
    Pos { bot: String },
}

/// Parse one prompt line. Unknown verbs and malformed arguments yield
/// `None`; the caller logs and ignores them.
pub fn parse(line: &str) -> Option<OperatorCommand> {
    let mut parts = line.split_whitespace();
    let verb = parts.next()?;
    match verb {
        "come" => {
            let bot = parts.next()?.to_string();
            let x = parts.next()?.parse().ok()?;
            let y = parts.next()?.parse().ok()?;
            let z = parts.next()?.parse().ok()?;
            if parts.next().is_some() {
                return None;
            }
            Some(OperatorCommand::Come { bot, x, y, z })
        }
        "stop" => {
            let bot = parts.next()?.to_string();
            if parts.next().is_some() {
                return None;
            }
            Some(OperatorCommand::Stop { bot })
        }
        "pos" => {
            let bot = parts.next()?.to_string();
            if parts.next().is_some() {
                return None;
            }
            Some(OperatorCommand::Pos { bot })
        }
        _ => None,
    }
}
