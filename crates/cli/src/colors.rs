use crossterm::style::Color;
use runwatch_core::status::RunStatus;

/// Trait for converting run statuses to terminal colors
pub trait AsTermColor {
    fn as_crossterm_color(&self) -> Color;
}

impl AsTermColor for RunStatus {
    fn as_crossterm_color(&self) -> Color {
        match self {
            RunStatus::Waiting => Color::Grey,
            RunStatus::Active => Color::Cyan,
            RunStatus::Stopped => Color::DarkYellow,
            RunStatus::Passed => Color::Green,
            RunStatus::Failed | RunStatus::Error => Color::Red,
            RunStatus::Timeout => Color::Magenta,
            RunStatus::Aborted => Color::DarkRed,
            RunStatus::Disabled => Color::DarkGrey,
            RunStatus::Unknown => Color::Reset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_are_red() {
        assert_eq!(RunStatus::Failed.as_crossterm_color(), Color::Red);
        assert_eq!(RunStatus::Error.as_crossterm_color(), Color::Red);
        assert_eq!(RunStatus::Passed.as_crossterm_color(), Color::Green);
    }
}
